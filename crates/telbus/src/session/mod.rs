// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Session engine: connection lifecycle, subscriptions, and data flow.
//!
//! A [`Session`] owns the client side of one middleware connection. It is
//! shared across threads as an `Arc`; every entry point takes `&self`. A
//! coarse `parking_lot::Mutex` serializes state transitions and
//! registry/lease mutation, while delivery and confirmation waits park on
//! per-key promises outside that lock, so the transport's receive loop is
//! never blocked by a slow reader.
//!
//! Inbound traffic enters through [`Session::deliver`] and
//! [`Session::confirm_send`], which the application wires to the
//! transport's receive loop. Those callbacks must not re-enter `get_data`
//! or `send_data` inline.

pub mod key;
pub mod lease;
pub mod promise;
pub mod redirect;
pub mod registry;

use crate::codec::{AttributeValue, CodecError, TagTable};
use crate::config;
use crate::schema::{decode_record, default_record, encode_record, validate_record, SchemaProvider};
use crate::session::key::{DataDescription, SubscriptionKey};
use crate::session::lease::{spawn_sweeper, LeaseTable, SweeperHandle};
use crate::session::promise::{Promise, PromiseWait};
use crate::session::redirect::RedirectionTable;
use crate::session::registry::{
    ReceiverRegistration, ReceiverRole, Registry, SenderRegistration, SenderRole,
};
use crate::telegram::transaction::{
    negotiate, validate_send, InnerCandidate, NegotiatedInnerSet, TransactionRecord,
    TransactionSchema,
};
use crate::telegram::{DataState, Telegram};
use crate::transport::{Authenticator, ConfigStore, Transport, TransportError};
use dashmap::DashMap;
use parking_lot::Mutex;
use std::fmt;
use std::sync::{Arc, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Session-level failure.
#[derive(Debug)]
pub enum Error {
    /// The session was built or used with missing/contradictory settings.
    Config(String),
    /// The operation is not legal in the current session state.
    InvalidState(String),
    /// The session is closed; every parked waiter fails with this.
    ConnectionClosed,
    /// No record arrived within the synchronous wait bound.
    DataTimeout,
    /// The peer denied the send subscription, or never confirmed it.
    SendNotConfirmed,
    /// A send subscription already exists for this key.
    DuplicateSendSubscription,
    /// No send subscription exists for this key.
    NoSendSubscription,
    /// A transaction violated its negotiated inner set.
    InvalidTransactionContent(String),
    /// The record does not fit its declared schema.
    SchemaMismatch(String),
    /// The named attribute still carries its undefined sentinel.
    UndefinedAttribute(String),
    /// The schema provider knows no schema for this attribute group.
    NoSuchSchema(u64),
    /// No usage id is configured for this (attribute group, aspect) pair.
    NoSuchUsage { attribute_group: u64, aspect: u64 },
    /// Wire-level encode/decode failure.
    Codec(CodecError),
    /// The transport or authentication seam failed.
    Transport(TransportError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Config(msg) => write!(f, "configuration error: {}", msg),
            Error::InvalidState(msg) => write!(f, "invalid session state: {}", msg),
            Error::ConnectionClosed => write!(f, "session closed"),
            Error::DataTimeout => write!(f, "timed out waiting for data"),
            Error::SendNotConfirmed => write!(f, "send subscription was not confirmed"),
            Error::DuplicateSendSubscription => {
                write!(f, "a send subscription already exists for this key")
            }
            Error::NoSendSubscription => write!(f, "no send subscription exists for this key"),
            Error::InvalidTransactionContent(msg) => {
                write!(f, "invalid transaction content: {}", msg)
            }
            Error::SchemaMismatch(msg) => write!(f, "schema mismatch: {}", msg),
            Error::UndefinedAttribute(name) => write!(f, "attribute '{}' is undefined", name),
            Error::NoSuchSchema(group) => write!(f, "no schema for attribute group {}", group),
            Error::NoSuchUsage {
                attribute_group,
                aspect,
            } => write!(
                f,
                "no usage id configured for attribute group {} aspect {}",
                attribute_group, aspect
            ),
            Error::Codec(err) => write!(f, "codec error: {}", err),
            Error::Transport(err) => write!(f, "transport error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Codec(err) => Some(err),
            Error::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<CodecError> for Error {
    fn from(err: CodecError) -> Self {
        Error::Codec(err)
    }
}

impl From<TransportError> for Error {
    fn from(err: TransportError) -> Self {
        Error::Transport(err)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

/// Lifecycle of a session. `Closed` is terminal until the next `connect`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    Connected,
    LoggedIn,
    Closed,
}

/// A mutable record on its way out. Produced by [`Session::create_data`]
/// pre-populated with the schema's defaults; the caller fills in the
/// addressing, the timestamp, and the attribute values before
/// [`Session::send_data`].
#[derive(Debug, Clone, PartialEq)]
pub struct DataRecord {
    pub object_id: u64,
    pub description: DataDescription,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub values: Vec<AttributeValue>,
}

/// Confirmation verdict of a send subscription, fed by the peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum ConfirmationState {
    #[default]
    Unknown,
    Granted,
    Denied,
}

/// Per-key confirmation slot: the promise wakes the first waiter, the
/// state carries later verdict changes (a denial can follow a grant).
#[derive(Default)]
struct ConfirmationSlot {
    state: Mutex<ConfirmationState>,
    promise: Promise<bool>,
}

/// State behind the coarse lock.
struct Core {
    state: SessionState,
    registry: Registry,
    leases: LeaseTable,
}

fn require_logged_in(core: &Core) -> Result<()> {
    match core.state {
        SessionState::LoggedIn => Ok(()),
        SessionState::Closed => Err(Error::ConnectionClosed),
        other => Err(Error::InvalidState(format!(
            "requires a logged-in session, state is {:?}",
            other
        ))),
    }
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |d| d.as_millis() as i64)
}

/// Client side of one middleware connection.
pub struct Session {
    /// Self-reference handed to the sweeper thread; never upgraded while
    /// the session is being dropped.
    weak: Weak<Session>,
    transport: Arc<dyn Transport>,
    authenticator: Arc<dyn Authenticator>,
    config: Arc<dyn ConfigStore>,
    schemas: Arc<dyn SchemaProvider>,
    tag_table: TagTable,
    redirection: RedirectionTable,
    core: Mutex<Core>,
    /// Latest delivered record per key.
    cache: DashMap<SubscriptionKey, Arc<Telegram>>,
    /// Parked `get_data` callers per key; delivery takes the slot out and
    /// resolves it, so each slot observes at most one delivery.
    delivery: DashMap<SubscriptionKey, Arc<Promise<Arc<Telegram>>>>,
    confirmations: DashMap<SubscriptionKey, Arc<ConfirmationSlot>>,
    /// Default record per attribute group, computed once per group.
    templates: DashMap<u64, Arc<Vec<AttributeValue>>>,
    sweeper: Mutex<Option<SweeperHandle>>,
    on_close: Mutex<Option<Box<dyn FnOnce() + Send>>>,
    get_data_timeout: Duration,
    send_confirm_timeout: Duration,
    lease_sweep_interval: Duration,
    min_sync_wait: Duration,
}

impl Session {
    pub fn builder() -> SessionBuilder {
        SessionBuilder::new()
    }

    pub fn state(&self) -> SessionState {
        self.core.lock().state
    }

    /// Register the handler invoked once when the session terminates
    /// (explicit disconnect, transport severed, or login rejected).
    pub fn on_close(&self, handler: impl FnOnce() + Send + 'static) {
        *self.on_close.lock() = Some(Box::new(handler));
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Establish the session. Legal from `Disconnected` or `Closed` only;
    /// a reconnect starts from a clean slate: registrations, leases,
    /// cached records, and confirmation state are all discarded, and the
    /// aspect redirection table is reloaded from the configuration store.
    pub fn connect(&self) -> Result<()> {
        {
            let mut core = self.core.lock();
            match core.state {
                SessionState::Disconnected | SessionState::Closed => {}
                other => {
                    return Err(Error::InvalidState(format!(
                        "connect is not legal from {:?}",
                        other
                    )))
                }
            }
            core.registry = Registry::new();
            core.leases.clear();
            core.state = SessionState::Connected;
        }
        self.cache.clear();
        self.delivery.clear();
        self.confirmations.clear();
        self.redirection.reload(self.config.aspect_redirections());

        let weak = Weak::clone(&self.weak);
        let handle = spawn_sweeper(self.lease_sweep_interval, move || {
            if let Some(session) = weak.upgrade() {
                session.sweep_expired();
            }
        });
        *self.sweeper.lock() = Some(handle);
        log::info!("[Session::connect] connected");
        Ok(())
    }

    /// Run the authentication handshake. Legal only when `Connected`. A
    /// rejected login terminates the session (close handler included).
    pub fn login(&self, user: &str, secret: &str) -> Result<()> {
        {
            let core = self.core.lock();
            match core.state {
                SessionState::Connected => {}
                SessionState::LoggedIn => {
                    return Err(Error::InvalidState("already logged in".into()))
                }
                other => {
                    return Err(Error::InvalidState(format!(
                        "login is not legal from {:?}",
                        other
                    )))
                }
            }
        }
        match self.authenticator.login(user, secret) {
            Ok(()) => {
                let mut core = self.core.lock();
                if core.state != SessionState::Connected {
                    return Err(Error::ConnectionClosed);
                }
                core.state = SessionState::LoggedIn;
                log::info!("[Session::login] logged in as {}", user);
                Ok(())
            }
            Err(err) => {
                log::warn!("[Session::login] rejected for {}: {}", user, err);
                self.shutdown("login rejected");
                Err(Error::Transport(err))
            }
        }
    }

    /// Terminate the session: stop the sweeper, fail every parked waiter
    /// with `ConnectionClosed`, invoke the close handler once. Idempotent.
    pub fn disconnect(&self) {
        self.shutdown("disconnect requested");
    }

    /// The transport's notification that the connection is gone. Same
    /// teardown as [`disconnect`](Session::disconnect); the session never
    /// reconnects by itself.
    pub fn connection_lost(&self) {
        self.shutdown("transport severed");
    }

    fn shutdown(&self, reason: &str) {
        {
            let mut core = self.core.lock();
            if core.state == SessionState::Closed {
                return;
            }
            core.state = SessionState::Closed;
            core.registry = Registry::new();
            core.leases.clear();
        }
        // Join outside the coarse lock; a sweep in flight needs it.
        drop(self.sweeper.lock().take());
        for entry in self.delivery.iter() {
            entry.value().close();
        }
        self.delivery.clear();
        for entry in self.confirmations.iter() {
            entry.value().promise.close();
        }
        self.confirmations.clear();
        self.cache.clear();
        log::info!("[Session] closed ({})", reason);
        let handler = self.on_close.lock().take();
        if let Some(handler) = handler {
            handler();
        }
    }

    // ------------------------------------------------------------------
    // Receiving
    // ------------------------------------------------------------------

    /// Read the current record of a channel, subscribing implicitly if no
    /// receive subscription exists yet.
    ///
    /// The implicit subscription is leased: it lives for
    /// `max(lease_duration, min_sync_wait)` past the most recent read and
    /// is torn down by the background sweeper afterwards. Every successful
    /// read renews the lease. If no record has been delivered yet the call
    /// parks until the first delivery, the session closes, or the
    /// synchronous wait bound elapses; concurrent callers on the same key
    /// all wake with the same first-delivered record.
    pub fn get_data(
        &self,
        object_id: u64,
        description: DataDescription,
        lease_duration: Duration,
    ) -> Result<Arc<Telegram>> {
        let key = self.resolve_key(object_id, description)?;
        let lease = lease_duration.max(self.min_sync_wait);
        let promise = {
            let mut core = self.core.lock();
            require_logged_in(&core)?;
            let registered = core.registry.receiver(&key).is_some();
            let implicit = core.registry.receiver(&key).is_some_and(|r| r.implicit);
            if !registered {
                core.registry.register_receiver(
                    key,
                    ReceiverRegistration {
                        role: ReceiverRole::Receiver,
                        objects: vec![object_id],
                        implicit: true,
                        negotiated: None,
                    },
                );
                log::debug!("[Session::get_data] implicit receive subscription for {}", key);
            }
            if !registered || implicit {
                core.leases.insert_or_renew(key, Instant::now() + lease);
            }
            if let Some(cached) = self.cache.get(&key) {
                return Ok(Arc::clone(cached.value()));
            }
            Arc::clone(self.delivery.entry(key).or_default().value())
        };
        // A delivery may have landed between the cache miss and the slot
        // creation; it would have taken a previous slot out, not ours.
        if let Some(cached) = self.cache.get(&key) {
            return Ok(Arc::clone(cached.value()));
        }
        // The lease must outlive the synchronous wait, or the sweeper
        // could tear the subscription down under this parked reader.
        {
            let mut core = self.core.lock();
            if core.leases.contains(&key) {
                let guard = lease.max(self.get_data_timeout);
                core.leases.insert_or_renew(key, Instant::now() + guard);
            }
        }
        match promise.wait_timeout(self.get_data_timeout) {
            PromiseWait::Resolved(first) => {
                {
                    let mut core = self.core.lock();
                    if core.leases.contains(&key) {
                        core.leases.insert_or_renew(key, Instant::now() + lease);
                    }
                }
                Ok(self
                    .cache
                    .get(&key)
                    .map(|entry| Arc::clone(entry.value()))
                    .unwrap_or(first))
            }
            PromiseWait::Closed => Err(Error::ConnectionClosed),
            PromiseWait::TimedOut => {
                // A sweep may have detached this slot; a delivery after
                // that still lands in the cache.
                match self.cache.get(&key) {
                    Some(cached) => Ok(Arc::clone(cached.value())),
                    None => Err(Error::DataTimeout),
                }
            }
        }
    }

    /// Register an explicit receive subscription. Upgrades an implicit one
    /// in place; explicit subscriptions are not leased.
    pub fn register_receiver(
        &self,
        object_id: u64,
        description: DataDescription,
        role: ReceiverRole,
    ) -> Result<()> {
        let key = self.resolve_key(object_id, description)?;
        self.register_receiver_for_key(key, object_id, role, None)
    }

    fn register_receiver_for_key(
        &self,
        key: SubscriptionKey,
        object_id: u64,
        role: ReceiverRole,
        negotiated: Option<NegotiatedInnerSet>,
    ) -> Result<()> {
        let mut core = self.core.lock();
        require_logged_in(&core)?;
        core.registry.register_receiver(
            key,
            ReceiverRegistration {
                role,
                objects: vec![object_id],
                implicit: false,
                negotiated,
            },
        );
        core.leases.remove(&key);
        log::debug!("[Session::register_receiver] {:?} registered for {}", role, key);
        Ok(())
    }

    /// Drop the receive subscription for a channel together with its lease
    /// and cached record. A no-op if none exists.
    pub fn unregister_receiver(&self, object_id: u64, description: DataDescription) -> Result<()> {
        let key = self.resolve_key(object_id, description)?;
        {
            let mut core = self.core.lock();
            core.registry.unregister_receiver(&key);
            core.leases.remove(&key);
        }
        self.cache.remove(&key);
        self.delivery.remove(&key);
        log::debug!("[Session::unregister_receiver] {}", key);
        Ok(())
    }

    /// Decode a received telegram's payload against its attribute group's
    /// schema.
    pub fn decode_payload(
        &self,
        attribute_group: u64,
        telegram: &Telegram,
    ) -> Result<Vec<AttributeValue>> {
        let schema = self
            .schemas
            .schema(attribute_group)
            .ok_or(Error::NoSuchSchema(attribute_group))?;
        let payload = telegram
            .payload
            .as_deref()
            .ok_or_else(|| Error::InvalidState("telegram carries no payload".into()))?;
        Ok(decode_record(&self.tag_table, &schema, payload)?)
    }

    /// Inbound dispatch, wired to the transport's receive loop.
    ///
    /// A telegram that fails to decode is logged and dropped; the session
    /// survives. Must not re-enter `get_data`/`send_data` inline.
    pub fn deliver(&self, bytes: &[u8]) {
        {
            let core = self.core.lock();
            if !matches!(core.state, SessionState::Connected | SessionState::LoggedIn) {
                log::trace!("[Session::deliver] session not active, telegram dropped");
                return;
            }
        }
        let telegram = match Telegram::from_bytes(bytes) {
            Ok(telegram) => Arc::new(telegram),
            Err(err) => {
                log::warn!("[Session::deliver] undecodable telegram dropped: {}", err);
                return;
            }
        };
        log::trace!(
            "[Session::deliver] {} state={:?} seq={}",
            telegram.key,
            telegram.state,
            telegram.sequence_number
        );
        self.cache.insert(telegram.key, Arc::clone(&telegram));
        if let Some((_, promise)) = self.delivery.remove(&telegram.key) {
            promise.resolve(telegram);
        }
    }

    // ------------------------------------------------------------------
    // Sending
    // ------------------------------------------------------------------

    /// Register a send subscription. At most one sender per key; a
    /// `Source` additionally announces itself with an empty "no data yet"
    /// telegram, and the registration is rolled back if that announcement
    /// cannot be sent.
    pub fn register_sender(
        &self,
        object_id: u64,
        description: DataDescription,
        role: SenderRole,
    ) -> Result<()> {
        let key = self.resolve_key(object_id, description)?;
        self.register_sender_for_key(key, object_id, role, None)
    }

    fn register_sender_for_key(
        &self,
        key: SubscriptionKey,
        object_id: u64,
        role: SenderRole,
        negotiated: Option<NegotiatedInnerSet>,
    ) -> Result<()> {
        {
            let mut core = self.core.lock();
            require_logged_in(&core)?;
            core.registry
                .register_sender(
                    key,
                    SenderRegistration {
                        role,
                        objects: vec![object_id],
                        next_sequence: 1,
                        negotiated,
                    },
                )
                .map_err(|()| Error::DuplicateSendSubscription)?;
        }
        if role == SenderRole::Source {
            if let Err(err) = self.announce_source(key) {
                self.core.lock().registry.unregister_sender(&key);
                log::warn!(
                    "[Session::register_sender] source announcement for {} failed, rolled back: {}",
                    key,
                    err
                );
                return Err(err);
            }
        }
        log::debug!("[Session::register_sender] {:?} registered for {}", role, key);
        Ok(())
    }

    fn announce_source(&self, key: SubscriptionKey) -> Result<()> {
        let telegram = Telegram::empty(key, DataState::NoData, now_millis());
        let bytes = telegram.to_bytes()?;
        self.transport.send_telegram(&bytes)?;
        Ok(())
    }

    /// Drop a send subscription and its confirmation state.
    pub fn unregister_sender(&self, object_id: u64, description: DataDescription) -> Result<()> {
        let key = self.resolve_key(object_id, description)?;
        {
            let mut core = self.core.lock();
            if core.registry.unregister_sender(&key).is_none() {
                return Err(Error::NoSendSubscription);
            }
        }
        self.confirmations.remove(&key);
        log::debug!("[Session::unregister_sender] {}", key);
        Ok(())
    }

    /// Publish a record.
    ///
    /// The record must be fully defined and must fit its attribute group's
    /// schema; both are checked before any bytes are produced. The first
    /// send on a fresh registration waits for the peer's confirmation up
    /// to the confirmation bound; a denial fails immediately.
    pub fn send_data(&self, record: &DataRecord) -> Result<()> {
        let group = record.description.attribute_group;
        let schema = self.schemas.schema(group).ok_or(Error::NoSuchSchema(group))?;
        if let Some(index) = record.values.iter().position(|v| !v.is_defined()) {
            let name = schema
                .attributes
                .get(index)
                .map_or_else(|| format!("#{}", index), |def| def.name.clone());
            return Err(Error::UndefinedAttribute(name));
        }
        validate_record(&schema, &record.values).map_err(Error::SchemaMismatch)?;

        let key = self.resolve_key(record.object_id, record.description)?;
        {
            let core = self.core.lock();
            require_logged_in(&core)?;
            if core.registry.sender(&key).is_none() {
                return Err(Error::NoSendSubscription);
            }
        }
        let payload = encode_record(&record.values)?;
        log::debug!(
            "[Session::send_data] {} ({} attributes, {} payload bytes)",
            key,
            record.values.len(),
            payload.len()
        );
        self.send_on_registration(key, payload, record.timestamp)
    }

    fn send_on_registration(
        &self,
        key: SubscriptionKey,
        payload: Vec<u8>,
        timestamp: i64,
    ) -> Result<()> {
        self.await_confirmation(key)?;
        let sequence_number = {
            let mut core = self.core.lock();
            require_logged_in(&core)?;
            let sender = core.registry.sender_mut(&key).ok_or(Error::NoSendSubscription)?;
            let seq = sender.next_sequence;
            sender.next_sequence += 1;
            seq
        };
        let telegram = Telegram {
            key,
            delayed: false,
            sequence_number,
            timestamp,
            state: DataState::Data,
            changed_bitmap: None,
            payload: Some(payload),
        };
        let bytes = telegram.to_bytes()?;
        self.transport.send_telegram(&bytes)?;
        Ok(())
    }

    fn await_confirmation(&self, key: SubscriptionKey) -> Result<()> {
        let slot = Arc::clone(self.confirmations.entry(key).or_default().value());
        match *slot.state.lock() {
            ConfirmationState::Granted => return Ok(()),
            ConfirmationState::Denied => return Err(Error::SendNotConfirmed),
            ConfirmationState::Unknown => {}
        }
        log::debug!("[Session::send_data] waiting for send confirmation on {}", key);
        match slot.promise.wait_timeout(self.send_confirm_timeout) {
            PromiseWait::Closed => return Err(Error::ConnectionClosed),
            PromiseWait::TimedOut => return Err(Error::SendNotConfirmed),
            PromiseWait::Resolved(_) => {}
        }
        // Re-read: a denial may have superseded an earlier grant.
        let verdict = *slot.state.lock();
        match verdict {
            ConfirmationState::Granted => Ok(()),
            _ => Err(Error::SendNotConfirmed),
        }
    }

    /// The peer's verdict on a send subscription, wired to the transport's
    /// receive loop. A later negative verdict overrides an earlier grant.
    pub fn confirm_send(&self, key: SubscriptionKey, granted: bool) {
        let slot = Arc::clone(self.confirmations.entry(key).or_default().value());
        *slot.state.lock() = if granted {
            ConfirmationState::Granted
        } else {
            ConfirmationState::Denied
        };
        slot.promise.resolve(granted);
        log::debug!("[Session::confirm_send] {} granted={}", key, granted);
    }

    /// A fresh record for `attribute_group`, pre-populated with the
    /// schema's defaults. Addressing and timestamp are zeroed; the caller
    /// fills them in.
    pub fn create_data(&self, attribute_group: u64) -> Result<DataRecord> {
        let schema = self
            .schemas
            .schema(attribute_group)
            .ok_or(Error::NoSuchSchema(attribute_group))?;
        let template = Arc::clone(
            self.templates
                .entry(attribute_group)
                .or_insert_with(|| Arc::new(default_record(&schema)))
                .value(),
        );
        Ok(DataRecord {
            object_id: 0,
            description: DataDescription::new(attribute_group, 0, 0),
            timestamp: 0,
            values: (*template).clone(),
        })
    }

    // ------------------------------------------------------------------
    // Transactions
    // ------------------------------------------------------------------

    /// Register as the source of a transaction channel. The candidate set
    /// is negotiated against the transaction schema locally; a violation
    /// fails before any network interaction.
    pub fn subscribe_transaction_source(
        &self,
        object_id: u64,
        description: DataDescription,
        schema: &TransactionSchema,
        candidates: &[InnerCandidate],
    ) -> Result<()> {
        let negotiated =
            negotiate(schema, candidates, object_id).map_err(Error::InvalidTransactionContent)?;
        let key = self.resolve_key(object_id, description)?;
        self.register_sender_for_key(key, object_id, SenderRole::Source, Some(negotiated))
    }

    /// Register as the drain (sole aggregating subscriber) of a
    /// transaction channel, with the same local negotiation as the source
    /// side.
    pub fn subscribe_transaction_drain(
        &self,
        object_id: u64,
        description: DataDescription,
        schema: &TransactionSchema,
        candidates: &[InnerCandidate],
    ) -> Result<()> {
        let negotiated =
            negotiate(schema, candidates, object_id).map_err(Error::InvalidTransactionContent)?;
        let key = self.resolve_key(object_id, description)?;
        self.register_receiver_for_key(key, object_id, ReceiverRole::Drain, Some(negotiated))
    }

    /// Publish a transaction. The record is validated against the
    /// registration's negotiated inner set before any bytes are produced;
    /// the send then follows the regular sender path, confirmation
    /// handshake included.
    pub fn send_transaction(&self, record: &TransactionRecord) -> Result<()> {
        let key = record.outer_key;
        let negotiated = {
            let core = self.core.lock();
            require_logged_in(&core)?;
            let sender = core.registry.sender(&key).ok_or(Error::NoSendSubscription)?;
            sender
                .negotiated
                .clone()
                .ok_or_else(|| Error::InvalidState("send subscription is not a transaction source".into()))?
        };
        validate_send(record, &negotiated).map_err(Error::InvalidTransactionContent)?;
        let payload = record.to_bytes()?;
        log::debug!(
            "[Session::send_transaction] {} ({} inner records, {} payload bytes)",
            key,
            record.inner.len(),
            payload.len()
        );
        self.send_on_registration(key, payload, record.outer_timestamp)
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn resolve_key(&self, object_id: u64, description: DataDescription) -> Result<SubscriptionKey> {
        let effective = self.redirection.substitute(description);
        let usage = self
            .config
            .usage_id(effective.attribute_group, effective.aspect)
            .ok_or(Error::NoSuchUsage {
                attribute_group: effective.attribute_group,
                aspect: effective.aspect,
            })?;
        Ok(SubscriptionKey::new(
            object_id,
            usage,
            effective.simulation_variant,
        ))
    }

    /// One sweeper tick: evict expired leases and their subscriptions.
    fn sweep_expired(&self) {
        let expired = {
            let mut core = self.core.lock();
            let expired = core.leases.take_expired(Instant::now());
            for key in &expired {
                core.registry.unregister_receiver(key);
            }
            expired
        };
        for key in expired {
            self.cache.remove(&key);
            self.delivery.remove(&key);
            log::debug!("[Session::sweep] implicit subscription for {} expired", key);
        }
    }
}

/// Builder for [`Session`]. The four seams are mandatory; the timing
/// parameters default to the values in [`config`](crate::config).
pub struct SessionBuilder {
    transport: Option<Arc<dyn Transport>>,
    authenticator: Option<Arc<dyn Authenticator>>,
    config_store: Option<Arc<dyn ConfigStore>>,
    schema_provider: Option<Arc<dyn SchemaProvider>>,
    tag_table: TagTable,
    get_data_timeout: Duration,
    send_confirm_timeout: Duration,
    lease_sweep_interval: Duration,
    min_sync_wait: Duration,
}

impl SessionBuilder {
    fn new() -> Self {
        Self {
            transport: None,
            authenticator: None,
            config_store: None,
            schema_provider: None,
            tag_table: TagTable::standard(),
            get_data_timeout: config::GET_DATA_TIMEOUT,
            send_confirm_timeout: config::SEND_CONFIRM_TIMEOUT,
            lease_sweep_interval: config::LEASE_SWEEP_INTERVAL,
            min_sync_wait: config::MIN_SYNC_WAIT_FLOOR,
        }
    }

    pub fn transport(mut self, transport: Arc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn Authenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn config_store(mut self, config_store: Arc<dyn ConfigStore>) -> Self {
        self.config_store = Some(config_store);
        self
    }

    pub fn schema_provider(mut self, schema_provider: Arc<dyn SchemaProvider>) -> Self {
        self.schema_provider = Some(schema_provider);
        self
    }

    pub fn tag_table(mut self, tag_table: TagTable) -> Self {
        self.tag_table = tag_table;
        self
    }

    pub fn get_data_timeout(mut self, timeout: Duration) -> Self {
        self.get_data_timeout = timeout;
        self
    }

    pub fn send_confirm_timeout(mut self, timeout: Duration) -> Self {
        self.send_confirm_timeout = timeout;
        self
    }

    pub fn lease_sweep_interval(mut self, interval: Duration) -> Self {
        self.lease_sweep_interval = interval;
        self
    }

    pub fn min_sync_wait(mut self, floor: Duration) -> Self {
        self.min_sync_wait = floor;
        self
    }

    pub fn build(self) -> Result<Arc<Session>> {
        let transport = self
            .transport
            .ok_or_else(|| Error::Config("a transport seam is required".into()))?;
        let authenticator = self
            .authenticator
            .ok_or_else(|| Error::Config("an authenticator seam is required".into()))?;
        let config_store = self
            .config_store
            .ok_or_else(|| Error::Config("a configuration store is required".into()))?;
        let schema_provider = self
            .schema_provider
            .ok_or_else(|| Error::Config("a schema provider is required".into()))?;
        Ok(Arc::new_cyclic(|weak| Session {
            weak: Weak::clone(weak),
            transport,
            authenticator,
            config: config_store,
            schemas: schema_provider,
            tag_table: self.tag_table,
            redirection: RedirectionTable::empty(),
            core: Mutex::new(Core {
                state: SessionState::Disconnected,
                registry: Registry::new(),
                leases: LeaseTable::new(),
            }),
            cache: DashMap::new(),
            delivery: DashMap::new(),
            confirmations: DashMap::new(),
            templates: DashMap::new(),
            sweeper: Mutex::new(None),
            on_close: Mutex::new(None),
            get_data_timeout: self.get_data_timeout,
            send_confirm_timeout: self.send_confirm_timeout,
            lease_sweep_interval: self.lease_sweep_interval,
            min_sync_wait: self.min_sync_wait,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Arc;

    struct NullTransport;
    impl Transport for NullTransport {
        fn send_telegram(&self, _bytes: &[u8]) -> std::result::Result<(), TransportError> {
            Ok(())
        }
    }

    struct NullAuthenticator;
    impl Authenticator for NullAuthenticator {
        fn login(&self, _user: &str, _secret: &str) -> std::result::Result<(), TransportError> {
            Ok(())
        }
    }

    struct NullConfig;
    impl ConfigStore for NullConfig {
        fn aspect_redirections(&self) -> HashMap<u64, u64> {
            HashMap::new()
        }
        fn usage_id(&self, attribute_group: u64, aspect: u64) -> Option<u64> {
            Some(attribute_group * 1000 + aspect)
        }
    }

    struct NullSchemas;
    impl SchemaProvider for NullSchemas {
        fn schema(&self, _group: u64) -> Option<Arc<crate::schema::RecordSchema>> {
            None
        }
    }

    fn session() -> Arc<Session> {
        Session::builder()
            .transport(Arc::new(NullTransport))
            .authenticator(Arc::new(NullAuthenticator))
            .config_store(Arc::new(NullConfig))
            .schema_provider(Arc::new(NullSchemas))
            .build()
            .expect("build session")
    }

    #[test]
    fn test_builder_requires_every_seam() {
        let err = Session::builder().build().err().expect("missing transport");
        assert!(matches!(err, Error::Config(_)), "got {:?}", err);
    }

    #[test]
    fn test_connect_is_illegal_while_connected() {
        let session = session();
        session.connect().expect("first connect");
        assert_eq!(session.state(), SessionState::Connected);
        assert!(matches!(session.connect(), Err(Error::InvalidState(_))));
        session.disconnect();
    }

    #[test]
    fn test_login_requires_connected() {
        let session = session();
        assert!(matches!(
            session.login("user", "secret"),
            Err(Error::InvalidState(_))
        ));
        session.connect().expect("connect");
        session.login("user", "secret").expect("login");
        assert_eq!(session.state(), SessionState::LoggedIn);
        assert!(matches!(
            session.login("user", "secret"),
            Err(Error::InvalidState(_))
        ));
        session.disconnect();
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[test]
    fn test_get_data_requires_login() {
        let session = session();
        session.connect().expect("connect");
        let err = session
            .get_data(1, DataDescription::new(10, 1, 0), Duration::from_secs(1))
            .err()
            .expect("not logged in");
        assert!(matches!(err, Error::InvalidState(_)));
        session.disconnect();
    }

    #[test]
    fn test_disconnect_is_idempotent_and_fires_close_handler_once() {
        use std::sync::atomic::{AtomicUsize, Ordering};
        let session = session();
        let fired = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&fired);
        session.on_close(move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        session.connect().expect("connect");
        session.disconnect();
        session.disconnect();
        assert_eq!(fired.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_reconnect_after_close_is_legal() {
        let session = session();
        session.connect().expect("connect");
        session.disconnect();
        session.connect().expect("reconnect");
        assert_eq!(session.state(), SessionState::Connected);
        session.disconnect();
    }
}

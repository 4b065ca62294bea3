// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Bookkeeping of active sender and receiver registrations.
//!
//! Pure in-memory state, guarded by the session's coarse lock. The session
//! engine orchestrates the side effects around it (initial empty telegram
//! of a source, rollback on its failure, lease handling for implicit
//! receivers).

use crate::session::key::SubscriptionKey;
use crate::telegram::transaction::NegotiatedInnerSet;
use std::collections::HashMap;

/// Publisher roles. A source is the authoritative single publisher of a
/// channel; a plain sender is any publisher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SenderRole {
    Source,
    Sender,
}

/// Subscriber roles. A drain is the sole authoritative aggregator,
/// required for transactions; a receiver is any subscriber.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiverRole {
    Receiver,
    Drain,
}

/// Local sender registration for one key.
#[derive(Debug)]
pub struct SenderRegistration {
    pub role: SenderRole,
    pub objects: Vec<u64>,
    /// Sequence counter for telegrams sent on this registration.
    pub next_sequence: u64,
    /// Present on transaction sources.
    pub negotiated: Option<NegotiatedInnerSet>,
}

/// Local receiver registration for one key.
#[derive(Debug)]
pub struct ReceiverRegistration {
    pub role: ReceiverRole,
    pub objects: Vec<u64>,
    /// Created on demand by `get_data` rather than by explicit API call.
    pub implicit: bool,
    /// Present on transaction drains.
    pub negotiated: Option<NegotiatedInnerSet>,
}

/// Active registrations of one session.
#[derive(Debug, Default)]
pub struct Registry {
    senders: HashMap<SubscriptionKey, SenderRegistration>,
    receivers: HashMap<SubscriptionKey, ReceiverRegistration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a local sender. At most one per key; a second attempt
    /// fails and changes nothing.
    pub fn register_sender(
        &mut self,
        key: SubscriptionKey,
        registration: SenderRegistration,
    ) -> Result<(), ()> {
        if self.senders.contains_key(&key) {
            return Err(());
        }
        self.senders.insert(key, registration);
        Ok(())
    }

    pub fn unregister_sender(&mut self, key: &SubscriptionKey) -> Option<SenderRegistration> {
        self.senders.remove(key)
    }

    pub fn sender(&self, key: &SubscriptionKey) -> Option<&SenderRegistration> {
        self.senders.get(key)
    }

    pub fn sender_mut(&mut self, key: &SubscriptionKey) -> Option<&mut SenderRegistration> {
        self.senders.get_mut(key)
    }

    /// Register (or replace) a local receiver. An explicit registration
    /// upgrades an implicit one in place.
    pub fn register_receiver(&mut self, key: SubscriptionKey, registration: ReceiverRegistration) {
        self.receivers.insert(key, registration);
    }

    pub fn unregister_receiver(&mut self, key: &SubscriptionKey) -> Option<ReceiverRegistration> {
        self.receivers.remove(key)
    }

    pub fn receiver(&self, key: &SubscriptionKey) -> Option<&ReceiverRegistration> {
        self.receivers.get(key)
    }

    pub fn has_receiver(&self, key: &SubscriptionKey) -> bool {
        self.receivers.contains_key(key)
    }

    pub fn sender_count(&self) -> usize {
        self.senders.len()
    }

    pub fn receiver_count(&self) -> usize {
        self.receivers.len()
    }
}

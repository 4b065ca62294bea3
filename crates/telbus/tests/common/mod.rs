// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors
//
// Shared in-memory seams for the integration tests: a recording transport,
// an instant (or rejecting) authenticator, a map-backed configuration
// store, and a map-backed schema provider. The session under test is fully
// exercised without any network.

#![allow(dead_code)]

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use telbus::{
    AttributeDefinition, AttributeKind, Authenticator, ConfigStore, RecordSchema, SchemaProvider,
    Session, SubscriptionKey, Telegram, Transport, TransportError,
};

/// Attribute group used by most tests; see [`test_schema`].
pub const TEST_GROUP: u64 = 7;
/// Aspect used by most tests.
pub const TEST_ASPECT: u64 = 1;

/// Captures every outbound telegram; can be switched to fail sends.
#[derive(Default)]
pub struct RecordingTransport {
    sent: Mutex<Vec<Vec<u8>>>,
    fail_sends: AtomicBool,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().len()
    }

    pub fn sent_telegram(&self, index: usize) -> Telegram {
        let sent = self.sent.lock();
        Telegram::from_bytes(&sent[index]).expect("recorded bytes decode as a telegram")
    }

    pub fn last_telegram(&self) -> Telegram {
        let sent = self.sent.lock();
        let bytes = sent.last().expect("at least one telegram was sent");
        Telegram::from_bytes(bytes).expect("recorded bytes decode as a telegram")
    }
}

impl Transport for RecordingTransport {
    fn send_telegram(&self, bytes: &[u8]) -> Result<(), TransportError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(TransportError::Send("recording transport set to fail".into()));
        }
        self.sent.lock().push(bytes.to_vec());
        Ok(())
    }
}

/// Accepts or rejects every login.
pub struct InstantAuthenticator {
    accept: bool,
}

impl InstantAuthenticator {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self { accept: true })
    }

    pub fn rejecting() -> Arc<Self> {
        Arc::new(Self { accept: false })
    }
}

impl Authenticator for InstantAuthenticator {
    fn login(&self, user: &str, _secret: &str) -> Result<(), TransportError> {
        if self.accept {
            Ok(())
        } else {
            Err(TransportError::LoginRejected(format!(
                "credentials for {} refused",
                user
            )))
        }
    }
}

/// Map-backed configuration store. Usage ids follow the formula
/// `group * 100 + aspect` unless the pair is explicitly removed.
#[derive(Default)]
pub struct MemoryConfigStore {
    redirections: HashMap<u64, u64>,
    unknown_pairs: Vec<(u64, u64)>,
}

impl MemoryConfigStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_redirection(attribute_group: u64, substitute_aspect: u64) -> Arc<Self> {
        let mut redirections = HashMap::new();
        redirections.insert(attribute_group, substitute_aspect);
        Arc::new(Self {
            redirections,
            unknown_pairs: Vec::new(),
        })
    }

    pub fn without_usage(attribute_group: u64, aspect: u64) -> Arc<Self> {
        Arc::new(Self {
            redirections: HashMap::new(),
            unknown_pairs: vec![(attribute_group, aspect)],
        })
    }
}

impl ConfigStore for MemoryConfigStore {
    fn aspect_redirections(&self) -> HashMap<u64, u64> {
        self.redirections.clone()
    }

    fn usage_id(&self, attribute_group: u64, aspect: u64) -> Option<u64> {
        if self.unknown_pairs.contains(&(attribute_group, aspect)) {
            return None;
        }
        Some(attribute_group * 100 + aspect)
    }
}

/// Map-backed schema provider.
#[derive(Default)]
pub struct MemorySchemaProvider {
    schemas: HashMap<u64, Arc<RecordSchema>>,
}

impl MemorySchemaProvider {
    pub fn with_test_schema() -> Arc<Self> {
        let mut schemas = HashMap::new();
        schemas.insert(TEST_GROUP, Arc::new(test_schema()));
        Arc::new(Self { schemas })
    }

    pub fn empty() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

impl SchemaProvider for MemorySchemaProvider {
    fn schema(&self, attribute_group: u64) -> Option<Arc<RecordSchema>> {
        self.schemas.get(&attribute_group).cloned()
    }
}

/// Two-attribute schema: an `Int` named `speed`, a `String` named `label`.
pub fn test_schema() -> RecordSchema {
    RecordSchema::new(
        TEST_GROUP,
        vec![
            AttributeDefinition::new("speed", AttributeKind::Int, false),
            AttributeDefinition::new("label", AttributeKind::String, false),
        ],
    )
}

/// The key `get_data`/`send_data` resolve for (`object_id`, `TEST_GROUP`,
/// `TEST_ASPECT`) with the formula-based configuration store.
pub fn test_key(object_id: u64) -> SubscriptionKey {
    SubscriptionKey::new(object_id, TEST_GROUP * 100 + TEST_ASPECT, 0)
}

/// Session with short timing bounds, connected and logged in, wired to the
/// given recording transport.
pub fn logged_in_session(transport: Arc<RecordingTransport>) -> Arc<Session> {
    let session = Session::builder()
        .transport(transport)
        .authenticator(InstantAuthenticator::accepting())
        .config_store(MemoryConfigStore::new())
        .schema_provider(MemorySchemaProvider::with_test_schema())
        .get_data_timeout(Duration::from_millis(200))
        .send_confirm_timeout(Duration::from_millis(200))
        .lease_sweep_interval(Duration::from_millis(25))
        .min_sync_wait(Duration::from_millis(50))
        .build()
        .expect("build session");
    session.connect().expect("connect");
    session.login("tester", "secret").expect("login");
    session
}

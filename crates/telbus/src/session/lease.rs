// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Implicit-subscription leases and their background sweeper.
//!
//! The first unsubscribed read of a channel creates a lease; every later
//! read renews it. A background thread wakes on a fixed interval and tears
//! down the receive subscriptions of expired leases, bounding the number
//! of long-lived implicit subscriptions.
//!
//! The table is indexed by expiry as well as by key, so a sweep stops at
//! the first still-live lease instead of scanning the whole table.

use crate::session::key::SubscriptionKey;
use crossbeam::channel::{bounded, RecvTimeoutError, Sender};
use std::collections::{BTreeMap, HashMap};
use std::thread;
use std::time::{Duration, Instant};

/// One lease per key; expiry-ordered for the sweeper.
#[derive(Debug, Default)]
pub struct LeaseTable {
    by_key: HashMap<SubscriptionKey, Instant>,
    by_expiry: BTreeMap<(Instant, SubscriptionKey), ()>,
}

impl LeaseTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create the lease or push an existing one's expiry out.
    pub fn insert_or_renew(&mut self, key: SubscriptionKey, expires_at: Instant) {
        if let Some(previous) = self.by_key.insert(key, expires_at) {
            self.by_expiry.remove(&(previous, key));
        }
        self.by_expiry.insert((expires_at, key), ());
    }

    pub fn remove(&mut self, key: &SubscriptionKey) -> bool {
        match self.by_key.remove(key) {
            Some(expires_at) => {
                self.by_expiry.remove(&(expires_at, *key));
                true
            }
            None => false,
        }
    }

    pub fn expires_at(&self, key: &SubscriptionKey) -> Option<Instant> {
        self.by_key.get(key).copied()
    }

    pub fn contains(&self, key: &SubscriptionKey) -> bool {
        self.by_key.contains_key(key)
    }

    /// Remove and return every lease with `expires_at <= now`.
    pub fn take_expired(&mut self, now: Instant) -> Vec<SubscriptionKey> {
        let mut expired = Vec::new();
        while let Some((&(expires_at, key), ())) = self.by_expiry.iter().next() {
            if expires_at > now {
                break;
            }
            self.by_expiry.remove(&(expires_at, key));
            self.by_key.remove(&key);
            expired.push(key);
        }
        expired
    }

    pub fn clear(&mut self) {
        self.by_key.clear();
        self.by_expiry.clear();
    }

    pub fn len(&self) -> usize {
        self.by_key.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_key.is_empty()
    }
}

/// Handle to the running sweeper thread.
///
/// Dropping it signals the thread to stop and joins it.
pub struct SweeperHandle {
    stop: Sender<()>,
    thread: Option<thread::JoinHandle<()>>,
}

impl Drop for SweeperHandle {
    fn drop(&mut self) {
        let _ = self.stop.send(());
        if let Some(handle) = self.thread.take() {
            // The sweeper itself may hold the last session handle and end
            // up dropping us; it cannot join itself.
            if handle.thread().id() != thread::current().id() {
                let _ = handle.join();
            }
        }
    }
}

/// Spawn the sweeper: every `interval` it invokes `sweep` (which takes
/// the session's coarse lock only for the scan/evict itself).
pub fn spawn_sweeper<F>(interval: Duration, sweep: F) -> SweeperHandle
where
    F: Fn() + Send + 'static,
{
    let (stop, ticker) = bounded::<()>(1);
    let thread = thread::Builder::new()
        .name("telbus-lease-sweeper".into())
        .spawn(move || {
            log::debug!("[lease-sweeper] Started with interval {:?}", interval);
            loop {
                match ticker.recv_timeout(interval) {
                    Err(RecvTimeoutError::Timeout) => sweep(),
                    // Stop signal or the session dropped the sender.
                    Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
                }
            }
            log::debug!("[lease-sweeper] Stopped");
        })
        .expect("failed to spawn lease sweeper thread");
    SweeperHandle {
        stop,
        thread: Some(thread),
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Single-resolution promise for delivery and confirmation waits.
//!
//! Replaces a shared-monitor polling loop: each key gets its own slot that
//! the dispatcher resolves exactly once; callers park with a timeout and a
//! close path, so a slow reader never holds a lock the dispatcher needs
//! and a disconnect unblocks every waiter.

use parking_lot::{Condvar, Mutex};
use std::time::{Duration, Instant};

#[derive(Debug)]
enum Slot<T> {
    Pending,
    Resolved(T),
    Closed,
}

/// Outcome of waiting on a [`Promise`].
#[derive(Debug, PartialEq, Eq)]
pub enum PromiseWait<T> {
    Resolved(T),
    /// The promise was closed (session terminated) before resolution.
    Closed,
    TimedOut,
}

/// A slot resolved at most once, observable by any number of waiters.
#[derive(Debug)]
pub struct Promise<T> {
    slot: Mutex<Slot<T>>,
    condvar: Condvar,
}

impl<T: Clone> Promise<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(Slot::Pending),
            condvar: Condvar::new(),
        }
    }

    /// Resolve the promise. The first resolution wins; later calls are
    /// ignored (the first delivered value is the one all waiters see).
    pub fn resolve(&self, value: T) {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Resolved(value);
            self.condvar.notify_all();
        }
    }

    /// Close a still-pending promise, waking every waiter with `Closed`.
    pub fn close(&self) {
        let mut slot = self.slot.lock();
        if matches!(*slot, Slot::Pending) {
            *slot = Slot::Closed;
            self.condvar.notify_all();
        }
    }

    /// Snapshot of the resolved value, if any.
    pub fn peek(&self) -> Option<T> {
        match &*self.slot.lock() {
            Slot::Resolved(value) => Some(value.clone()),
            _ => None,
        }
    }

    /// Park until resolution, close, or `timeout`.
    pub fn wait_timeout(&self, timeout: Duration) -> PromiseWait<T> {
        let deadline = Instant::now() + timeout;
        let mut slot = self.slot.lock();
        loop {
            match &*slot {
                Slot::Resolved(value) => return PromiseWait::Resolved(value.clone()),
                Slot::Closed => return PromiseWait::Closed,
                Slot::Pending => {}
            }
            if self.condvar.wait_until(&mut slot, deadline).timed_out() {
                return match &*slot {
                    Slot::Resolved(value) => PromiseWait::Resolved(value.clone()),
                    Slot::Closed => PromiseWait::Closed,
                    Slot::Pending => PromiseWait::TimedOut,
                };
            }
        }
    }
}

impl<T: Clone> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Global tuning constants - single source of truth.
//!
//! This module centralizes the protocol timeouts, the sweep interval of the
//! implicit-subscription lease sweeper, and the identities of the bootstrap
//! channels that are exempt from aspect redirection. **Never hardcode these
//! elsewhere!** Timeouts can be overridden per session through
//! [`SessionBuilder`](crate::SessionBuilder); the constants here are the
//! defaults.

use std::time::Duration;

/// Floor applied to every implicit-subscription lease duration.
///
/// `get_data` blocks synchronously for data, so a lease shorter than the
/// synchronous wait would let the sweeper tear the subscription down while
/// the caller is still parked on it.
pub const MIN_SYNC_WAIT_FLOOR: Duration = Duration::from_secs(10);

/// Upper bound on the synchronous wait inside `get_data`.
pub const GET_DATA_TIMEOUT: Duration = Duration::from_secs(60);

/// Upper bound on the wait for the first send confirmation in `send_data`.
///
/// Only the *first* send on a fresh sender registration waits; once a
/// confirmation (positive or negative) has arrived, later sends decide
/// immediately.
pub const SEND_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);

/// Wake interval of the background lease sweeper.
pub const LEASE_SWEEP_INTERVAL: Duration = Duration::from_secs(3);

// =======================================================================
// Bootstrap channels
//
// The configuration-query channels are used to resolve schemas and
// redirection rules in the first place. Redirecting them through the very
// table they bootstrap would recurse, so they are pinned to their
// configured aspect no matter what the redirection table says.
// =======================================================================

/// Attribute group carrying configuration queries (schema lookups).
pub const ATG_CONFIG_REQUEST: u64 = 0x0001;

/// Attribute group carrying configuration replies.
pub const ATG_CONFIG_REPLY: u64 = 0x0002;

/// Attribute groups that are never subject to aspect redirection.
pub const REDIRECT_EXEMPT_GROUPS: &[u64] = &[ATG_CONFIG_REQUEST, ATG_CONFIG_REPLY];

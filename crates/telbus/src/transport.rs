// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! External collaborator seams.
//!
//! Socket framing, keep-alives, the authentication handshake primitives,
//! and the configuration/metadata model all live on the other side of
//! these traits. The session engine calls out through them and receives
//! inbound traffic through [`Session::deliver`](crate::Session::deliver)
//! and [`Session::confirm_send`](crate::Session::confirm_send), which the
//! application wires to the transport's receive loop.

use std::collections::HashMap;
use std::fmt;

/// Failure reported by a transport or authentication seam.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The telegram could not be handed to the wire.
    Send(String),
    /// The login handshake was rejected by the peer.
    LoginRejected(String),
    /// The connection is gone.
    Closed,
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Send(reason) => write!(f, "send failed: {}", reason),
            TransportError::LoginRejected(reason) => write!(f, "login rejected: {}", reason),
            TransportError::Closed => write!(f, "connection closed"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Outbound half of the wire. Framing and keep-alive negotiation are the
/// implementor's concern; the session hands over complete logical
/// telegrams.
pub trait Transport: Send + Sync {
    fn send_telegram(&self, bytes: &[u8]) -> Result<(), TransportError>;
}

/// Authentication handshake seam used by `login`.
pub trait Authenticator: Send + Sync {
    fn login(&self, user: &str, secret: &str) -> Result<(), TransportError>;
}

/// Read-only configuration lookups: aspect redirection rules and the
/// mapping from `(attribute group, aspect)` to the wire-level usage id.
pub trait ConfigStore: Send + Sync {
    /// Attribute group to substitute aspect, snapshot taken at connect.
    fn aspect_redirections(&self) -> HashMap<u64, u64>;

    /// Usage id for an `(attribute group, aspect)` pair, or `None` if the
    /// combination is not configured.
    fn usage_id(&self, attribute_group: u64, aspect: u64) -> Option<u64>;
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! # telbus - typed pub/sub telemetry client
//!
//! The application-side client of a telegram-based data-distribution
//! middleware: typed records are published and subscribed on channels
//! identified by an object, an attribute-group usage, and a simulation
//! variant. The crate covers the wire codec, the telegram envelope, the
//! schema-driven record reader/writer, and the session engine with its
//! implicit-subscription leasing, send-confirmation handshake, and
//! transaction aggregation.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use std::time::Duration;
//! use telbus::{DataDescription, Result, Session};
//! # fn seams() -> (Arc<dyn telbus::Transport>, Arc<dyn telbus::Authenticator>,
//! #     Arc<dyn telbus::ConfigStore>, Arc<dyn telbus::SchemaProvider>) { unimplemented!() }
//!
//! fn main() -> Result<()> {
//!     let (transport, authenticator, config, schemas) = seams();
//!     let session = Session::builder()
//!         .transport(transport)
//!         .authenticator(authenticator)
//!         .config_store(config)
//!         .schema_provider(schemas)
//!         .build()?;
//!
//!     session.connect()?;
//!     session.login("operator", "secret")?;
//!
//!     // First read subscribes implicitly; the lease is renewed per read.
//!     let telegram = session.get_data(
//!         42,
//!         DataDescription::new(7, 1, 0),
//!         Duration::from_secs(30),
//!     )?;
//!     let values = session.decode_payload(7, &telegram)?;
//!     println!("{} attributes", values.len());
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------------------------------+
//! |                     Application Layer                        |
//! |     Session -> get_data / send_data / send_transaction       |
//! +--------------------------------------------------------------+
//! |                      Session Engine                          |
//! |  Registry | Leases + Sweeper | Promises | Aspect Redirection |
//! +--------------------------------------------------------------+
//! |                  Record / Envelope Layer                     |
//! |     Schema Reader | Telegram | Transaction Aggregation       |
//! +--------------------------------------------------------------+
//! |                        Wire Codec                            |
//! |   Big-endian cursors | Tagged attribute values | Mod-UTF8    |
//! +--------------------------------------------------------------+
//! ```
//!
//! The transport itself (framing, keep-alive, reconnect backoff), the
//! authentication handshake, and the configuration/metadata backend live
//! behind the seams in [`transport`]; the application wires the receive
//! loop to [`Session::deliver`] and [`Session::confirm_send`].

// Clippy: No blanket suppressions. Fix issues properly or use inline #[allow] with justification.

/// Wire codec: big-endian cursors, tagged attribute values, modified UTF-8.
pub mod codec;
/// Global tuning constants (timeouts, sweep interval, bootstrap channels).
pub mod config;
/// Record schemas and the schema-driven record reader/writer.
pub mod schema;
/// Session engine (lifecycle, subscriptions, leasing, confirmation).
pub mod session;
/// Telegram envelope and transaction aggregation.
pub mod telegram;
/// External seams: transport, authenticator, configuration store.
pub mod transport;

pub use codec::{AttributeList, AttributeValue, CodecError, TagTable};
pub use schema::{AttributeDefinition, AttributeKind, RecordSchema, SchemaProvider};
pub use session::key::{DataDescription, SubscriptionKey};
pub use session::registry::{ReceiverRole, SenderRole};
pub use session::{DataRecord, Error, Result, Session, SessionBuilder, SessionState};
pub use telegram::transaction::{
    IdentificationPattern, InnerCandidate, InnerIdentification, InnerRecord, TransactionRecord,
    TransactionSchema,
};
pub use telegram::{DataState, Telegram};
pub use transport::{Authenticator, ConfigStore, Transport, TransportError};

/// telbus version string.
pub const VERSION: &str = "0.1.0";

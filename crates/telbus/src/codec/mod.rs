// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Recursive tagged-variant codec for typed attribute values.
//!
//! The wire format is big-endian with length prefixes on every
//! variable-size form:
//!
//! - fixed scalars: natural fixed-width encoding, no prefix
//! - strings: modified UTF-8 with a 2-byte byte-count prefix
//! - scalar arrays: 4-byte signed element count, then elements
//! - attribute lists: concatenated children, no prefix (arity is fixed by
//!   the schema)
//! - attribute list arrays: 4-byte count, then list encodings

pub mod cursor;
pub mod value;

pub use cursor::{Cursor, CursorMut};
pub use value::{tags, AttributeList, AttributeValue, TagTable, UNDEFINED_STRING};

use std::fmt;

/// Codec-level error. Always fatal to the current encode/decode, never
/// retried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Ran out of bytes while reading.
    ShortRead { offset: usize },
    /// Ran out of room while writing.
    Overflow { offset: usize },
    /// Tag byte with no registered variant factory.
    UnknownVariant { tag: u8 },
    /// Text exceeds the 2-byte length prefix (65535 encoded bytes).
    StringTooLong { len: usize },
    /// Malformed modified-UTF-8 byte group.
    InvalidUtf { offset: usize },
    /// Element or byte count outside the representable range.
    InvalidCount { count: i64 },
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::ShortRead { offset } => {
                write!(f, "short read at offset {}", offset)
            }
            CodecError::Overflow { offset } => {
                write!(f, "write overflow at offset {}", offset)
            }
            CodecError::UnknownVariant { tag } => {
                write!(f, "unknown variant tag {:#04x}", tag)
            }
            CodecError::StringTooLong { len } => {
                write!(f, "string too long: {} encoded bytes (max 65535)", len)
            }
            CodecError::InvalidUtf { offset } => {
                write!(f, "invalid modified UTF-8 at offset {}", offset)
            }
            CodecError::InvalidCount { count } => {
                write!(f, "invalid count {}", count)
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Result alias used throughout the codec and the wire envelope.
pub type CodecResult<T> = core::result::Result<T, CodecError>;

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Wire envelope for one delivered or transmitted record.
//!
//! A telegram carries the subscription key, delivery metadata, an optional
//! per-attribute change bitmap, and the already-serialized record payload
//! (opaque at this layer). Constructed by the sender, serialized,
//! deserialized by the receiver into the same shape, never mutated after
//! decode.

pub mod transaction;

use crate::codec::{CodecError, CodecResult, Cursor, CursorMut};
use crate::session::key::SubscriptionKey;

/// Fixed part of the wire form: key (18) + delayed flag (1) + sequence (8)
/// + timestamp (8) + state (1) + bitmap length (1) + payload length (4).
pub const FIXED_WIRE_LEN: usize = 41;

/// Delivery state of a channel, one byte on the wire.
///
/// Distinguishes "has data" from the reasons there is none.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataState {
    Data,
    NoData,
    NoSource,
    NoRights,
    ConflictingSubscription,
}

impl DataState {
    pub fn to_wire(self) -> u8 {
        match self {
            DataState::Data => 0,
            DataState::NoData => 1,
            DataState::NoSource => 2,
            DataState::NoRights => 3,
            DataState::ConflictingSubscription => 4,
        }
    }

    pub fn from_wire(code: u8) -> CodecResult<Self> {
        match code {
            0 => Ok(DataState::Data),
            1 => Ok(DataState::NoData),
            2 => Ok(DataState::NoSource),
            3 => Ok(DataState::NoRights),
            4 => Ok(DataState::ConflictingSubscription),
            other => Err(CodecError::UnknownVariant { tag: other }),
        }
    }
}

/// One record on the wire.
#[derive(Debug, Clone, PartialEq)]
pub struct Telegram {
    pub key: SubscriptionKey,
    /// Delivered from a buffer rather than live.
    pub delayed: bool,
    pub sequence_number: u64,
    pub timestamp: i64,
    pub state: DataState,
    /// Bit `i` set means attribute index `i` changed since the previous
    /// delivered value (bit 0 of byte `k` is attribute `8k`).
    pub changed_bitmap: Option<Vec<u8>>,
    /// Serialized record, opaque to the envelope.
    pub payload: Option<Vec<u8>>,
}

impl Telegram {
    /// Envelope carrying `state` and no payload (e.g. the "no data yet"
    /// record a source transmits right after registering).
    pub fn empty(key: SubscriptionKey, state: DataState, timestamp: i64) -> Self {
        Self {
            key,
            delayed: false,
            sequence_number: 0,
            timestamp,
            state,
            changed_bitmap: None,
            payload: None,
        }
    }

    pub fn has_data(&self) -> bool {
        self.state == DataState::Data
    }

    pub fn is_no_source_available(&self) -> bool {
        self.state == DataState::NoSource
    }

    pub fn is_no_rights(&self) -> bool {
        self.state == DataState::NoRights
    }

    pub fn is_conflicting_subscription(&self) -> bool {
        self.state == DataState::ConflictingSubscription
    }

    /// Total wire length; lets the transport pre-size its frame buffer.
    pub fn wire_len(&self) -> usize {
        FIXED_WIRE_LEN
            + self.changed_bitmap.as_ref().map_or(0, Vec::len)
            + self.payload.as_ref().map_or(0, Vec::len)
    }

    pub fn write(&self, out: &mut CursorMut<'_>) -> CodecResult<()> {
        self.key.write(out)?;
        out.write_u8(u8::from(self.delayed))?;
        out.write_u64_be(self.sequence_number)?;
        out.write_i64_be(self.timestamp)?;
        out.write_u8(self.state.to_wire())?;

        let bitmap: &[u8] = self.changed_bitmap.as_deref().unwrap_or(&[]);
        if bitmap.len() > u8::MAX as usize {
            return Err(CodecError::InvalidCount {
                count: bitmap.len() as i64,
            });
        }
        out.write_u8(bitmap.len() as u8)?;
        out.write_bytes(bitmap)?;

        let payload: &[u8] = self.payload.as_deref().unwrap_or(&[]);
        if payload.len() > i32::MAX as usize {
            return Err(CodecError::InvalidCount {
                count: payload.len() as i64,
            });
        }
        out.write_i32_be(payload.len() as i32)?;
        out.write_bytes(payload)
    }

    /// Serialize into a freshly sized buffer.
    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let mut buf = vec![0u8; self.wire_len()];
        let mut out = CursorMut::new(&mut buf);
        self.write(&mut out)?;
        Ok(buf)
    }

    pub fn read(cur: &mut Cursor<'_>) -> CodecResult<Self> {
        let key = SubscriptionKey::read(cur)?;
        let delayed = cur.read_u8()? != 0;
        let sequence_number = cur.read_u64_be()?;
        let timestamp = cur.read_i64_be()?;
        let state = DataState::from_wire(cur.read_u8()?)?;

        let bitmap_len = cur.read_u8()? as usize;
        let changed_bitmap = if bitmap_len == 0 {
            None
        } else {
            Some(cur.read_bytes(bitmap_len)?.to_vec())
        };

        let payload_len = cur.read_i32_be()?;
        if payload_len < 0 {
            return Err(CodecError::InvalidCount {
                count: i64::from(payload_len),
            });
        }
        let payload = if payload_len == 0 {
            None
        } else {
            Some(cur.read_bytes(payload_len as usize)?.to_vec())
        };

        Ok(Self {
            key,
            delayed,
            sequence_number,
            timestamp,
            state,
            changed_bitmap,
            payload,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        Telegram::read(&mut Cursor::new(bytes))
    }
}

/// True if `index` is marked changed in the bitmap.
pub fn bitmap_is_set(bitmap: &[u8], index: usize) -> bool {
    bitmap
        .get(index / 8)
        .is_some_and(|byte| byte & (1 << (index % 8)) != 0)
}

/// Mark attribute `index` as changed, growing the bitmap as needed.
pub fn bitmap_set(bitmap: &mut Vec<u8>, index: usize) {
    let byte = index / 8;
    if byte >= bitmap.len() {
        bitmap.resize(byte + 1, 0);
    }
    bitmap[byte] |= 1 << (index % 8);
}

// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Transaction container: one outer telegram carrying independently
//! addressed inner records.
//!
//! Subscribing as a transaction source or drain negotiates the set of
//! inner identifications the transaction may carry: the transaction's
//! schema metadata lists *required* and *accepted* identification
//! patterns. Negotiation and per-send validation both happen locally,
//! before any bytes reach the transport.

use crate::codec::{CodecError, CodecResult, Cursor, CursorMut};
use crate::session::key::SubscriptionKey;
use std::collections::HashSet;

/// Identification of one inner record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InnerIdentification {
    pub object_id: u64,
    pub attribute_group: u64,
    pub aspect: u64,
}

impl InnerIdentification {
    const WIRE_LEN: usize = 24;

    pub const fn new(object_id: u64, attribute_group: u64, aspect: u64) -> Self {
        Self {
            object_id,
            attribute_group,
            aspect,
        }
    }

    fn write(&self, out: &mut CursorMut<'_>) -> CodecResult<()> {
        out.write_u64_be(self.object_id)?;
        out.write_u64_be(self.attribute_group)?;
        out.write_u64_be(self.aspect)
    }

    fn read(cur: &mut Cursor<'_>) -> CodecResult<Self> {
        Ok(Self {
            object_id: cur.read_u64_be()?,
            attribute_group: cur.read_u64_be()?,
            aspect: cur.read_u64_be()?,
        })
    }
}

/// A candidate inner identification offered at subscribe time, together
/// with the object's type (patterns may constrain it). The type travels
/// only through negotiation, never on the wire.
#[derive(Debug, Clone, Copy)]
pub struct InnerCandidate {
    pub identification: InnerIdentification,
    pub object_type: u64,
}

/// One constraint pattern from the transaction's schema metadata.
///
/// Every populated field must hold for a candidate to match; an all-`None`
/// pattern with `same_object` false matches anything.
#[derive(Debug, Clone, Default)]
pub struct IdentificationPattern {
    /// Candidate's object must be of this type.
    pub object_type: Option<u64>,
    /// Candidate's object must equal the transaction's own object.
    pub same_object: bool,
    pub attribute_group: Option<u64>,
    pub aspect: Option<u64>,
}

impl IdentificationPattern {
    pub fn matches(&self, candidate: &InnerCandidate, transaction_object: u64) -> bool {
        if let Some(object_type) = self.object_type {
            if candidate.object_type != object_type {
                return false;
            }
        }
        if self.same_object && candidate.identification.object_id != transaction_object {
            return false;
        }
        if let Some(attribute_group) = self.attribute_group {
            if candidate.identification.attribute_group != attribute_group {
                return false;
            }
        }
        if let Some(aspect) = self.aspect {
            if candidate.identification.aspect != aspect {
                return false;
            }
        }
        true
    }
}

/// Required/accepted inner identification patterns of a transaction's
/// attribute group, from the schema metadata.
#[derive(Debug, Clone, Default)]
pub struct TransactionSchema {
    pub required: Vec<IdentificationPattern>,
    pub accepted: Vec<IdentificationPattern>,
}

/// The realized result of a successful negotiation, remembered per
/// source/drain registration.
#[derive(Debug, Clone)]
pub struct NegotiatedInnerSet {
    /// Every identification a sent transaction may contain (accepted ∪
    /// required matches).
    pub allowed: HashSet<InnerIdentification>,
    /// Identifications that must be present in every sent transaction.
    pub required: Vec<InnerIdentification>,
}

/// Validate `candidates` against the transaction schema.
///
/// Succeeds only if every candidate matches an accepted-or-required
/// pattern and every required pattern is matched by at least one
/// candidate. Purely local; fails before any network interaction.
pub fn negotiate(
    schema: &TransactionSchema,
    candidates: &[InnerCandidate],
    transaction_object: u64,
) -> Result<NegotiatedInnerSet, String> {
    let mut allowed = HashSet::with_capacity(candidates.len());
    for candidate in candidates {
        let accepted = schema
            .accepted
            .iter()
            .chain(&schema.required)
            .any(|p| p.matches(candidate, transaction_object));
        if !accepted {
            return Err(format!(
                "inner identification {:?} matches no accepted pattern",
                candidate.identification
            ));
        }
        allowed.insert(candidate.identification);
    }

    let mut required = Vec::with_capacity(schema.required.len());
    for pattern in &schema.required {
        let mut matched = None;
        for candidate in candidates {
            if pattern.matches(candidate, transaction_object) {
                matched = Some(candidate.identification);
                break;
            }
        }
        match matched {
            Some(id) => {
                if !required.contains(&id) {
                    required.push(id);
                }
            }
            None => {
                return Err(format!(
                    "required pattern {:?} matched by no candidate",
                    pattern
                ))
            }
        }
    }

    Ok(NegotiatedInnerSet { allowed, required })
}

/// One record inside a transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct InnerRecord {
    pub identification: InnerIdentification,
    pub timestamp: i64,
    pub sequence_number: u64,
    /// Whether the record originally traveled as part of a transaction.
    pub sent_as_transaction: bool,
    pub payload: Option<Vec<u8>>,
}

impl InnerRecord {
    fn wire_len(&self) -> usize {
        InnerIdentification::WIRE_LEN + 8 + 8 + 1 + 4 + self.payload.as_ref().map_or(0, Vec::len)
    }

    fn write(&self, out: &mut CursorMut<'_>) -> CodecResult<()> {
        self.identification.write(out)?;
        out.write_i64_be(self.timestamp)?;
        out.write_u64_be(self.sequence_number)?;
        out.write_u8(u8::from(self.sent_as_transaction))?;
        let payload: &[u8] = self.payload.as_deref().unwrap_or(&[]);
        out.write_i32_be(payload.len() as i32)?;
        out.write_bytes(payload)
    }

    fn read(cur: &mut Cursor<'_>) -> CodecResult<Self> {
        let identification = InnerIdentification::read(cur)?;
        let timestamp = cur.read_i64_be()?;
        let sequence_number = cur.read_u64_be()?;
        let sent_as_transaction = cur.read_u8()? != 0;
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
            identification,
            timestamp,
            sequence_number,
            sent_as_transaction,
            payload,
        })
    }
}

/// One outer telegram's worth of aggregated records.
#[derive(Debug, Clone, PartialEq)]
pub struct TransactionRecord {
    pub outer_key: SubscriptionKey,
    pub outer_timestamp: i64,
    pub inner: Vec<InnerRecord>,
}

impl TransactionRecord {
    /// Size of the serialized payload this record produces.
    pub fn wire_len(&self) -> usize {
        // outer key (simulation variant is its 2-byte tail) + timestamp + inner count
        SubscriptionKey::WIRE_LEN
            + 8
            + 4
            + self.inner.iter().map(InnerRecord::wire_len).sum::<usize>()
    }

    /// Serialize as the payload of the outer telegram.
    ///
    /// The outer key's simulation variant rides along as its own 2-byte
    /// field inside `SubscriptionKey::write`.
    pub fn write(&self, out: &mut CursorMut<'_>) -> CodecResult<()> {
        self.outer_key.write(out)?;
        out.write_i64_be(self.outer_timestamp)?;
        if self.inner.len() > i32::MAX as usize {
            return Err(CodecError::InvalidCount {
                count: self.inner.len() as i64,
            });
        }
        out.write_i32_be(self.inner.len() as i32)?;
        for record in &self.inner {
            record.write(out)?;
        }
        Ok(())
    }

    pub fn to_bytes(&self) -> CodecResult<Vec<u8>> {
        let mut buf = vec![0u8; self.wire_len()];
        let mut out = CursorMut::new(&mut buf);
        self.write(&mut out)?;
        Ok(buf)
    }

    pub fn read(cur: &mut Cursor<'_>) -> CodecResult<Self> {
        let outer_key = SubscriptionKey::read(cur)?;
        let outer_timestamp = cur.read_i64_be()?;
        let raw = cur.read_i32_be()?;
        if raw < 0 {
            return Err(CodecError::InvalidCount {
                count: i64::from(raw),
            });
        }
        let count = raw as usize;
        let mut inner = Vec::with_capacity(count.min(cur.remaining()));
        for _ in 0..count {
            inner.push(InnerRecord::read(cur)?);
        }
        Ok(Self {
            outer_key,
            outer_timestamp,
            inner,
        })
    }

    pub fn from_bytes(bytes: &[u8]) -> CodecResult<Self> {
        TransactionRecord::read(&mut Cursor::new(bytes))
    }
}

/// Per-send validation against the negotiated set.
///
/// Every inner record's identification must be in the allowed set and
/// every required identification must be present among the inners.
/// Returns a message naming the offender; runs before any bytes are
/// produced.
pub fn validate_send(
    record: &TransactionRecord,
    negotiated: &NegotiatedInnerSet,
) -> Result<(), String> {
    for inner in &record.inner {
        if !negotiated.allowed.contains(&inner.identification) {
            return Err(format!(
                "inner identification {:?} is not part of the negotiated set",
                inner.identification
            ));
        }
    }
    for required in &negotiated.required {
        if !record.inner.iter().any(|r| r.identification == *required) {
            return Err(format!(
                "required inner identification {:?} is missing",
                required
            ));
        }
    }
    Ok(())
}

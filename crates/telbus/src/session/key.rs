// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Canonical identity of a data channel.

use crate::codec::{CodecResult, Cursor, CursorMut};
use std::fmt;

/// Unique identity of a data channel: object, attribute-group usage, and
/// simulation variant. Two keys are equal iff all three fields match.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionKey {
    pub object_id: u64,
    pub attribute_group_usage_id: u64,
    pub simulation_variant: i16,
}

impl SubscriptionKey {
    /// Serialized size on the wire.
    pub const WIRE_LEN: usize = 18;

    pub const fn new(object_id: u64, attribute_group_usage_id: u64, simulation_variant: i16) -> Self {
        Self {
            object_id,
            attribute_group_usage_id,
            simulation_variant,
        }
    }

    pub fn write(&self, out: &mut CursorMut<'_>) -> CodecResult<()> {
        out.write_u64_be(self.object_id)?;
        out.write_u64_be(self.attribute_group_usage_id)?;
        out.write_i16_be(self.simulation_variant)
    }

    pub fn read(cur: &mut Cursor<'_>) -> CodecResult<Self> {
        Ok(Self {
            object_id: cur.read_u64_be()?,
            attribute_group_usage_id: cur.read_u64_be()?,
            simulation_variant: cur.read_i16_be()?,
        })
    }
}

impl fmt::Display for SubscriptionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}/{}/{}",
            self.object_id, self.attribute_group_usage_id, self.simulation_variant
        )
    }
}

/// Application-facing addressing triple. The configuration store maps
/// `(attribute_group, aspect)` to the usage id that goes on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DataDescription {
    pub attribute_group: u64,
    pub aspect: u64,
    pub simulation_variant: i16,
}

impl DataDescription {
    pub const fn new(attribute_group: u64, aspect: u64, simulation_variant: i16) -> Self {
        Self {
            attribute_group,
            aspect,
            simulation_variant,
        }
    }

    /// Same description under a different aspect.
    pub const fn with_aspect(self, aspect: u64) -> Self {
        Self { aspect, ..self }
    }
}

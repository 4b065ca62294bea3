// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Record schemas: ordered attribute definitions for an attribute group.
//!
//! A schema fixes the order, kind, and arity of a record's attributes.
//! Composite attributes carry a nested schema and may nest to arbitrary
//! depth. Schemas come from an external provider (the configuration
//! subsystem) and are treated as read-only.

pub mod reader;

pub use reader::{decode_record, default_record, encode_record, validate_record};

use crate::codec::tags;
use std::sync::Arc;

/// Attribute group identity as used by the schema provider.
pub type AttributeGroupId = u64;

/// Element kind of a single attribute.
#[derive(Debug, Clone)]
pub enum AttributeKind {
    Byte,
    Short,
    Int,
    Long,
    Float,
    Double,
    String,
    /// Composite: an ordered attribute list with its own (possibly again
    /// composite) schema.
    List(Arc<RecordSchema>),
}

/// One attribute slot of a record.
#[derive(Debug, Clone)]
pub struct AttributeDefinition {
    pub name: String,
    pub kind: AttributeKind,
    pub is_array: bool,
    /// Declared default; attributes without one start at the kind's
    /// undefined sentinel.
    pub default: Option<crate::codec::AttributeValue>,
}

impl AttributeDefinition {
    pub fn new(name: impl Into<String>, kind: AttributeKind, is_array: bool) -> Self {
        Self {
            name: name.into(),
            kind,
            is_array,
            default: None,
        }
    }

    pub fn with_default(mut self, default: crate::codec::AttributeValue) -> Self {
        self.default = Some(default);
        self
    }
}

/// Ordered attribute definitions of one attribute group.
#[derive(Debug, Clone)]
pub struct RecordSchema {
    pub attribute_group: AttributeGroupId,
    pub attributes: Vec<AttributeDefinition>,
}

impl RecordSchema {
    pub fn new(attribute_group: AttributeGroupId, attributes: Vec<AttributeDefinition>) -> Self {
        Self {
            attribute_group,
            attributes,
        }
    }
}

/// Read-only schema lookup, provided by the configuration subsystem.
pub trait SchemaProvider: Send + Sync {
    /// Ordered attribute definitions for an attribute group, or `None` if
    /// the group is unknown.
    fn schema(&self, attribute_group: AttributeGroupId) -> Option<Arc<RecordSchema>>;
}

/// Wire tag for a (kind, arity) pair.
pub fn wire_tag(kind: &AttributeKind, is_array: bool) -> u8 {
    match (kind, is_array) {
        (AttributeKind::Byte, false) => tags::BYTE,
        (AttributeKind::Short, false) => tags::SHORT,
        (AttributeKind::Int, false) => tags::INT,
        (AttributeKind::Long, false) => tags::LONG,
        (AttributeKind::Float, false) => tags::FLOAT,
        (AttributeKind::Double, false) => tags::DOUBLE,
        (AttributeKind::String, false) => tags::STRING,
        (AttributeKind::Byte, true) => tags::BYTE_ARRAY,
        (AttributeKind::Short, true) => tags::SHORT_ARRAY,
        (AttributeKind::Int, true) => tags::INT_ARRAY,
        (AttributeKind::Long, true) => tags::LONG_ARRAY,
        (AttributeKind::Float, true) => tags::FLOAT_ARRAY,
        (AttributeKind::Double, true) => tags::DOUBLE_ARRAY,
        (AttributeKind::String, true) => tags::STRING_ARRAY,
        (AttributeKind::List(_), false) => tags::ATTRIBUTE_LIST,
        (AttributeKind::List(_), true) => tags::ATTRIBUTE_LIST_ARRAY,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wire_tag_resolution() {
        assert_eq!(wire_tag(&AttributeKind::Int, false), tags::INT);
        assert_eq!(wire_tag(&AttributeKind::Int, true), tags::INT_ARRAY);

        let nested = Arc::new(RecordSchema::new(9, Vec::new()));
        assert_eq!(
            wire_tag(&AttributeKind::List(nested.clone()), false),
            tags::ATTRIBUTE_LIST
        );
        assert_eq!(
            wire_tag(&AttributeKind::List(nested), true),
            tags::ATTRIBUTE_LIST_ARRAY
        );
    }
}

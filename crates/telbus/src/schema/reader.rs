// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Schema-driven record materialization.
//!
//! Walks a schema's ordered attribute definitions and drives the attribute
//! codec to turn a full record into wire bytes and back. Decoding is
//! all-or-nothing: a record either materializes completely or the whole
//! decode is rejected - partial records are never returned.

use super::{wire_tag, AttributeDefinition, AttributeKind, RecordSchema};
use crate::codec::value::UNDEFINED_STRING;
use crate::codec::{
    AttributeList, AttributeValue, CodecError, CodecResult, Cursor, CursorMut, TagTable,
};

/// Decode one record against `schema`.
///
/// Trailing bytes beyond the schema's attributes are tolerated (forward
/// compatibility); running out of bytes mid-record is a `ShortRead`.
pub fn decode_record(
    table: &TagTable,
    schema: &RecordSchema,
    bytes: &[u8],
) -> CodecResult<Vec<AttributeValue>> {
    let mut cur = Cursor::new(bytes);
    let mut values = Vec::with_capacity(schema.attributes.len());
    for def in &schema.attributes {
        values.push(decode_attribute(table, def, &mut cur)?);
    }
    Ok(values)
}

fn decode_attribute(
    table: &TagTable,
    def: &AttributeDefinition,
    cur: &mut Cursor<'_>,
) -> CodecResult<AttributeValue> {
    match (&def.kind, def.is_array) {
        (AttributeKind::List(nested), false) => {
            Ok(AttributeValue::AttributeList(decode_list(table, nested, cur)?))
        }
        (AttributeKind::List(nested), true) => {
            let raw = cur.read_i32_be()?;
            if raw < 0 {
                return Err(CodecError::InvalidCount {
                    count: i64::from(raw),
                });
            }
            let count = raw as usize;
            let mut lists = Vec::with_capacity(count.min(cur.remaining()));
            for _ in 0..count {
                lists.push(Some(decode_list(table, nested, cur)?));
            }
            Ok(AttributeValue::AttributeListArray(lists))
        }
        (kind, is_array) => {
            AttributeValue::read_scalar(table, wire_tag(kind, is_array), cur)
        }
    }
}

fn decode_list(
    table: &TagTable,
    schema: &RecordSchema,
    cur: &mut Cursor<'_>,
) -> CodecResult<AttributeList> {
    let mut items = Vec::with_capacity(schema.attributes.len());
    for def in &schema.attributes {
        items.push(Some(decode_attribute(table, def, cur)?));
    }
    Ok(AttributeList::new(items))
}

/// Encode one record into its wire payload.
///
/// The buffer is sized exactly from the values' encoded lengths; the
/// drive order is the value order, which `validate_record` ties to the
/// schema order.
pub fn encode_record(values: &[AttributeValue]) -> CodecResult<Vec<u8>> {
    let len: usize = values.iter().map(AttributeValue::encoded_len).sum();
    let mut buf = vec![0u8; len];
    let mut out = CursorMut::new(&mut buf);
    for value in values {
        value.write(&mut out)?;
    }
    Ok(buf)
}

/// Check `values` against `schema`: arity, kind, and arity of every nested
/// composite. Returns the offending attribute's name on mismatch.
pub fn validate_record(schema: &RecordSchema, values: &[AttributeValue]) -> Result<(), String> {
    if values.len() != schema.attributes.len() {
        return Err(format!(
            "record has {} attributes, schema {} expects {}",
            values.len(),
            schema.attribute_group,
            schema.attributes.len()
        ));
    }
    for (def, value) in schema.attributes.iter().zip(values) {
        validate_attribute(def, value)?;
    }
    Ok(())
}

fn validate_attribute(def: &AttributeDefinition, value: &AttributeValue) -> Result<(), String> {
    let expected = wire_tag(&def.kind, def.is_array);
    if value.tag() != expected {
        return Err(format!(
            "attribute '{}': expected tag {}, found tag {}",
            def.name,
            expected,
            value.tag()
        ));
    }
    match (&def.kind, value) {
        (AttributeKind::List(nested), AttributeValue::AttributeList(list)) => {
            validate_list(def, nested, list)
        }
        (AttributeKind::List(nested), AttributeValue::AttributeListArray(lists)) => {
            for list in lists.iter().flatten() {
                validate_list(def, nested, list)?;
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn validate_list(
    def: &AttributeDefinition,
    schema: &RecordSchema,
    list: &AttributeList,
) -> Result<(), String> {
    if list.items.len() != schema.attributes.len() {
        return Err(format!(
            "attribute '{}': list has {} children, schema expects {}",
            def.name,
            list.items.len(),
            schema.attributes.len()
        ));
    }
    for (child_def, item) in schema.attributes.iter().zip(&list.items) {
        if let Some(value) = item {
            validate_attribute(child_def, value)?;
        }
    }
    Ok(())
}

/// Build the default record for `schema`: each attribute at its declared
/// default, or the kind's undefined sentinel when none is declared. Array
/// attributes default to the empty array; nested lists are populated
/// recursively.
pub fn default_record(schema: &RecordSchema) -> Vec<AttributeValue> {
    schema.attributes.iter().map(default_attribute).collect()
}

fn default_attribute(def: &AttributeDefinition) -> AttributeValue {
    if let Some(default) = &def.default {
        return default.clone();
    }
    match (&def.kind, def.is_array) {
        (AttributeKind::Byte, false) => AttributeValue::Byte(i8::MIN),
        (AttributeKind::Short, false) => AttributeValue::Short(i16::MIN),
        (AttributeKind::Int, false) => AttributeValue::Int(i32::MIN),
        (AttributeKind::Long, false) => AttributeValue::Long(i64::MIN),
        (AttributeKind::Float, false) => AttributeValue::Float(f32::NAN),
        (AttributeKind::Double, false) => AttributeValue::Double(f64::NAN),
        (AttributeKind::String, false) => AttributeValue::String(UNDEFINED_STRING.to_string()),
        (AttributeKind::Byte, true) => AttributeValue::ByteArray(Vec::new()),
        (AttributeKind::Short, true) => AttributeValue::ShortArray(Vec::new()),
        (AttributeKind::Int, true) => AttributeValue::IntArray(Vec::new()),
        (AttributeKind::Long, true) => AttributeValue::LongArray(Vec::new()),
        (AttributeKind::Float, true) => AttributeValue::FloatArray(Vec::new()),
        (AttributeKind::Double, true) => AttributeValue::DoubleArray(Vec::new()),
        (AttributeKind::String, true) => AttributeValue::StringArray(Vec::new()),
        (AttributeKind::List(nested), false) => AttributeValue::AttributeList(
            AttributeList::defined(default_record(nested)),
        ),
        (AttributeKind::List(_), true) => AttributeValue::AttributeListArray(Vec::new()),
    }
}

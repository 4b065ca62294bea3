// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Tagged attribute values.
//!
//! One sum type covers every wire variant: six fixed scalars, text, seven
//! array forms, and the two composite forms (`AttributeList` and arrays
//! thereof). The tag byte and the in-memory variant always agree by
//! construction; decoding builds the empty variant for a tag first and then
//! populates it from the stream.
//!
//! Composite variants are not self-delimiting - their arity comes from the
//! record schema - so the scalar reader here rejects them and the
//! schema-driven reader in [`crate::schema`] drives their recursion.

use super::cursor::{modified_utf8_len, Cursor, CursorMut};
use super::{CodecError, CodecResult};
use std::collections::HashMap;

/// Stable wire tags, in declaration order of [`AttributeValue`].
pub mod tags {
    pub const BYTE: u8 = 1;
    pub const SHORT: u8 = 2;
    pub const INT: u8 = 3;
    pub const LONG: u8 = 4;
    pub const FLOAT: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const STRING: u8 = 7;
    pub const BYTE_ARRAY: u8 = 8;
    pub const SHORT_ARRAY: u8 = 9;
    pub const INT_ARRAY: u8 = 10;
    pub const LONG_ARRAY: u8 = 11;
    pub const FLOAT_ARRAY: u8 = 12;
    pub const DOUBLE_ARRAY: u8 = 13;
    pub const STRING_ARRAY: u8 = 14;
    pub const ATTRIBUTE_LIST: u8 = 15;
    pub const ATTRIBUTE_LIST_ARRAY: u8 = 16;
}

/// Sentinel marking a string attribute as not yet assigned.
pub const UNDEFINED_STRING: &str = "_Undefined_";

/// Ordered children of a composite attribute.
///
/// Arity and child kinds are fixed by the schema; order is significant.
/// A `None` slot is an unassigned child - the writer silently skips it
/// (the "sparse write" wire quirk, preserved for compatibility).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AttributeList {
    pub items: Vec<Option<AttributeValue>>,
}

impl AttributeList {
    pub fn new(items: Vec<Option<AttributeValue>>) -> Self {
        Self { items }
    }

    /// List with every child assigned.
    pub fn defined(values: Vec<AttributeValue>) -> Self {
        Self {
            items: values.into_iter().map(Some).collect(),
        }
    }

    /// Concatenated child encodings, in order, no length prefix.
    /// Unassigned children contribute no bytes.
    pub fn write(&self, out: &mut CursorMut<'_>) -> CodecResult<()> {
        for item in self.items.iter().flatten() {
            item.write(out)?;
        }
        Ok(())
    }

    pub fn encoded_len(&self) -> usize {
        self.items
            .iter()
            .flatten()
            .map(AttributeValue::encoded_len)
            .sum()
    }

    pub fn is_defined(&self) -> bool {
        self.items
            .iter()
            .all(|i| matches!(i, Some(v) if v.is_defined()))
    }
}

/// A typed attribute value as it travels on the wire.
#[derive(Debug, Clone, PartialEq)]
pub enum AttributeValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(String),
    ByteArray(Vec<i8>),
    ShortArray(Vec<i16>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
    FloatArray(Vec<f32>),
    DoubleArray(Vec<f64>),
    StringArray(Vec<String>),
    AttributeList(AttributeList),
    AttributeListArray(Vec<Option<AttributeList>>),
}

/// Generate array write/read/len arms for fixed-width element types.
macro_rules! write_scalar_array {
    ($out:ident, $values:ident, $write:ident) => {{
        $out.write_i32_be($values.len() as i32)?;
        for v in $values {
            $out.$write(*v)?;
        }
        Ok(())
    }};
}

macro_rules! read_scalar_array {
    ($cur:ident, $slot:ident, $read:ident, $size:expr) => {{
        let count = read_count($cur, $size)?;
        $slot.clear();
        $slot.reserve(count);
        for _ in 0..count {
            $slot.push($cur.$read()?);
        }
        Ok(())
    }};
}

impl AttributeValue {
    /// The stable wire tag of this variant.
    pub fn tag(&self) -> u8 {
        match self {
            AttributeValue::Byte(_) => tags::BYTE,
            AttributeValue::Short(_) => tags::SHORT,
            AttributeValue::Int(_) => tags::INT,
            AttributeValue::Long(_) => tags::LONG,
            AttributeValue::Float(_) => tags::FLOAT,
            AttributeValue::Double(_) => tags::DOUBLE,
            AttributeValue::String(_) => tags::STRING,
            AttributeValue::ByteArray(_) => tags::BYTE_ARRAY,
            AttributeValue::ShortArray(_) => tags::SHORT_ARRAY,
            AttributeValue::IntArray(_) => tags::INT_ARRAY,
            AttributeValue::LongArray(_) => tags::LONG_ARRAY,
            AttributeValue::FloatArray(_) => tags::FLOAT_ARRAY,
            AttributeValue::DoubleArray(_) => tags::DOUBLE_ARRAY,
            AttributeValue::StringArray(_) => tags::STRING_ARRAY,
            AttributeValue::AttributeList(_) => tags::ATTRIBUTE_LIST,
            AttributeValue::AttributeListArray(_) => tags::ATTRIBUTE_LIST_ARRAY,
        }
    }

    /// Append the wire form of this value.
    pub fn write(&self, out: &mut CursorMut<'_>) -> CodecResult<()> {
        match self {
            AttributeValue::Byte(v) => out.write_i8(*v),
            AttributeValue::Short(v) => out.write_i16_be(*v),
            AttributeValue::Int(v) => out.write_i32_be(*v),
            AttributeValue::Long(v) => out.write_i64_be(*v),
            AttributeValue::Float(v) => out.write_f32_be(*v),
            AttributeValue::Double(v) => out.write_f64_be(*v),
            AttributeValue::String(v) => out.write_utf(v),
            AttributeValue::ByteArray(values) => write_scalar_array!(out, values, write_i8),
            AttributeValue::ShortArray(values) => write_scalar_array!(out, values, write_i16_be),
            AttributeValue::IntArray(values) => write_scalar_array!(out, values, write_i32_be),
            AttributeValue::LongArray(values) => write_scalar_array!(out, values, write_i64_be),
            AttributeValue::FloatArray(values) => write_scalar_array!(out, values, write_f32_be),
            AttributeValue::DoubleArray(values) => write_scalar_array!(out, values, write_f64_be),
            AttributeValue::StringArray(values) => {
                out.write_i32_be(values.len() as i32)?;
                for v in values {
                    out.write_utf(v)?;
                }
                Ok(())
            }
            AttributeValue::AttributeList(list) => list.write(out),
            AttributeValue::AttributeListArray(lists) => {
                // Count includes unassigned slots even though they emit no
                // bytes (sparse write, pinned by regression test).
                out.write_i32_be(lists.len() as i32)?;
                for list in lists.iter().flatten() {
                    list.write(out)?;
                }
                Ok(())
            }
        }
    }

    /// Exact number of bytes `write` will produce.
    pub fn encoded_len(&self) -> usize {
        match self {
            AttributeValue::Byte(_) => 1,
            AttributeValue::Short(_) => 2,
            AttributeValue::Int(_) | AttributeValue::Float(_) => 4,
            AttributeValue::Long(_) | AttributeValue::Double(_) => 8,
            AttributeValue::String(v) => 2 + modified_utf8_len(v),
            AttributeValue::ByteArray(v) => 4 + v.len(),
            AttributeValue::ShortArray(v) => 4 + v.len() * 2,
            AttributeValue::IntArray(v) => 4 + v.len() * 4,
            AttributeValue::FloatArray(v) => 4 + v.len() * 4,
            AttributeValue::LongArray(v) => 4 + v.len() * 8,
            AttributeValue::DoubleArray(v) => 4 + v.len() * 8,
            AttributeValue::StringArray(v) => {
                4 + v.iter().map(|s| 2 + modified_utf8_len(s)).sum::<usize>()
            }
            AttributeValue::AttributeList(list) => list.encoded_len(),
            AttributeValue::AttributeListArray(lists) => {
                4 + lists
                    .iter()
                    .flatten()
                    .map(AttributeList::encoded_len)
                    .sum::<usize>()
            }
        }
    }

    /// True if no part of this value is at its "undefined" sentinel.
    ///
    /// Arrays are defined when every element is (the empty array is
    /// defined); lists require every child slot assigned and defined.
    pub fn is_defined(&self) -> bool {
        match self {
            AttributeValue::Byte(v) => *v != i8::MIN,
            AttributeValue::Short(v) => *v != i16::MIN,
            AttributeValue::Int(v) => *v != i32::MIN,
            AttributeValue::Long(v) => *v != i64::MIN,
            AttributeValue::Float(v) => !v.is_nan(),
            AttributeValue::Double(v) => !v.is_nan(),
            AttributeValue::String(v) => v != UNDEFINED_STRING,
            AttributeValue::ByteArray(v) => v.iter().all(|e| *e != i8::MIN),
            AttributeValue::ShortArray(v) => v.iter().all(|e| *e != i16::MIN),
            AttributeValue::IntArray(v) => v.iter().all(|e| *e != i32::MIN),
            AttributeValue::LongArray(v) => v.iter().all(|e| *e != i64::MIN),
            AttributeValue::FloatArray(v) => v.iter().all(|e| !e.is_nan()),
            AttributeValue::DoubleArray(v) => v.iter().all(|e| !e.is_nan()),
            AttributeValue::StringArray(v) => v.iter().all(|e| e != UNDEFINED_STRING),
            AttributeValue::AttributeList(list) => list.is_defined(),
            AttributeValue::AttributeListArray(lists) => lists
                .iter()
                .all(|l| matches!(l, Some(list) if list.is_defined())),
        }
    }

    /// Populate this (empty) variant from the stream.
    ///
    /// Composite variants have no self-delimiting form and fail with
    /// `UnknownVariant`; the schema reader decodes them.
    pub fn read_into(&mut self, cur: &mut Cursor<'_>) -> CodecResult<()> {
        match self {
            AttributeValue::Byte(v) => {
                *v = cur.read_i8()?;
                Ok(())
            }
            AttributeValue::Short(v) => {
                *v = cur.read_i16_be()?;
                Ok(())
            }
            AttributeValue::Int(v) => {
                *v = cur.read_i32_be()?;
                Ok(())
            }
            AttributeValue::Long(v) => {
                *v = cur.read_i64_be()?;
                Ok(())
            }
            AttributeValue::Float(v) => {
                *v = cur.read_f32_be()?;
                Ok(())
            }
            AttributeValue::Double(v) => {
                *v = cur.read_f64_be()?;
                Ok(())
            }
            AttributeValue::String(v) => {
                *v = cur.read_utf()?;
                Ok(())
            }
            AttributeValue::ByteArray(slot) => read_scalar_array!(cur, slot, read_i8, 1),
            AttributeValue::ShortArray(slot) => read_scalar_array!(cur, slot, read_i16_be, 2),
            AttributeValue::IntArray(slot) => read_scalar_array!(cur, slot, read_i32_be, 4),
            AttributeValue::LongArray(slot) => read_scalar_array!(cur, slot, read_i64_be, 8),
            AttributeValue::FloatArray(slot) => read_scalar_array!(cur, slot, read_f32_be, 4),
            AttributeValue::DoubleArray(slot) => read_scalar_array!(cur, slot, read_f64_be, 8),
            AttributeValue::StringArray(slot) => {
                // Prefix is 2 bytes per element at minimum.
                let count = read_count(cur, 2)?;
                slot.clear();
                slot.reserve(count);
                for _ in 0..count {
                    slot.push(cur.read_utf()?);
                }
                Ok(())
            }
            AttributeValue::AttributeList(_) | AttributeValue::AttributeListArray(_) => {
                Err(CodecError::UnknownVariant { tag: self.tag() })
            }
        }
    }

    /// Build the empty variant for `tag` via `table` and fill it from the
    /// stream. Scalar and array tags only.
    pub fn read_scalar(
        table: &TagTable,
        tag: u8,
        cur: &mut Cursor<'_>,
    ) -> CodecResult<AttributeValue> {
        let mut value = table.empty_for(tag)?;
        value.read_into(cur)?;
        Ok(value)
    }
}

/// Read a 4-byte element count and sanity-check it against the bytes left.
///
/// A count that could not possibly fit the remaining buffer is rejected
/// before any allocation happens.
fn read_count(cur: &mut Cursor<'_>, min_elem_size: usize) -> CodecResult<usize> {
    let raw = cur.read_i32_be()?;
    if raw < 0 {
        return Err(CodecError::InvalidCount { count: i64::from(raw) });
    }
    let count = raw as usize;
    if count * min_elem_size > cur.remaining() {
        return Err(CodecError::ShortRead {
            offset: cur.offset(),
        });
    }
    Ok(count)
}

/// Explicit tag-to-factory table for dynamic construction.
///
/// Replaces static singleton dispatch: built once at startup via
/// [`TagTable::standard`], injected wherever decoding happens, and open for
/// extension through [`TagTable::register`].
#[derive(Clone)]
pub struct TagTable {
    factories: HashMap<u8, fn() -> AttributeValue>,
}

impl TagTable {
    /// Table with the sixteen standard variants registered.
    pub fn standard() -> Self {
        let mut table = Self {
            factories: HashMap::with_capacity(16),
        };
        table.register(tags::BYTE, || AttributeValue::Byte(0));
        table.register(tags::SHORT, || AttributeValue::Short(0));
        table.register(tags::INT, || AttributeValue::Int(0));
        table.register(tags::LONG, || AttributeValue::Long(0));
        table.register(tags::FLOAT, || AttributeValue::Float(0.0));
        table.register(tags::DOUBLE, || AttributeValue::Double(0.0));
        table.register(tags::STRING, || AttributeValue::String(String::new()));
        table.register(tags::BYTE_ARRAY, || AttributeValue::ByteArray(Vec::new()));
        table.register(tags::SHORT_ARRAY, || AttributeValue::ShortArray(Vec::new()));
        table.register(tags::INT_ARRAY, || AttributeValue::IntArray(Vec::new()));
        table.register(tags::LONG_ARRAY, || AttributeValue::LongArray(Vec::new()));
        table.register(tags::FLOAT_ARRAY, || AttributeValue::FloatArray(Vec::new()));
        table.register(tags::DOUBLE_ARRAY, || {
            AttributeValue::DoubleArray(Vec::new())
        });
        table.register(tags::STRING_ARRAY, || {
            AttributeValue::StringArray(Vec::new())
        });
        table.register(tags::ATTRIBUTE_LIST, || {
            AttributeValue::AttributeList(AttributeList::default())
        });
        table.register(tags::ATTRIBUTE_LIST_ARRAY, || {
            AttributeValue::AttributeListArray(Vec::new())
        });
        table
    }

    /// Register (or replace) the factory for a tag.
    pub fn register(&mut self, tag: u8, factory: fn() -> AttributeValue) {
        self.factories.insert(tag, factory);
    }

    /// Empty variant for `tag`, or `UnknownVariant`.
    pub fn empty_for(&self, tag: u8) -> CodecResult<AttributeValue> {
        self.factories
            .get(&tag)
            .map(|f| f())
            .ok_or(CodecError::UnknownVariant { tag })
    }
}

impl Default for TagTable {
    fn default() -> Self {
        Self::standard()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn roundtrip_scalar(value: &AttributeValue) -> AttributeValue {
        let mut buf = vec![0u8; value.encoded_len()];
        let mut out = CursorMut::new(&mut buf);
        value.write(&mut out).expect("write value");
        assert_eq!(out.offset(), buf.len(), "encoded_len must be exact");

        let table = TagTable::standard();
        let mut cur = Cursor::new(&buf);
        let decoded = AttributeValue::read_scalar(&table, value.tag(), &mut cur)
            .expect("read value");
        assert!(cur.is_eof(), "decoder must consume every byte");
        decoded
    }

    #[test]
    fn test_tag_agreement() {
        assert_eq!(AttributeValue::Byte(0).tag(), tags::BYTE);
        assert_eq!(AttributeValue::Double(0.0).tag(), tags::DOUBLE);
        assert_eq!(
            AttributeValue::AttributeListArray(Vec::new()).tag(),
            tags::ATTRIBUTE_LIST_ARRAY
        );

        let table = TagTable::standard();
        for tag in 1..=16u8 {
            let empty = table.empty_for(tag).expect("standard tag");
            assert_eq!(empty.tag(), tag, "factory result must carry its tag");
        }
    }

    #[test]
    fn test_scalar_roundtrips() {
        let values = [
            AttributeValue::Byte(-7),
            AttributeValue::Short(512),
            AttributeValue::Int(-123_456),
            AttributeValue::Long(i64::from(i32::MAX) * 3),
            AttributeValue::Float(2.5),
            AttributeValue::Double(-0.125),
            AttributeValue::String("größe".to_string()),
        ];
        for v in &values {
            assert_eq!(&roundtrip_scalar(v), v);
        }
    }

    #[test]
    fn test_array_roundtrips() {
        let values = [
            AttributeValue::ByteArray(vec![1, -1, 127]),
            AttributeValue::ShortArray(vec![0, -42]),
            AttributeValue::IntArray(vec![7; 9]),
            AttributeValue::LongArray(vec![i64::MAX, 0]),
            AttributeValue::FloatArray(vec![1.0, -2.0]),
            AttributeValue::DoubleArray(vec![0.5]),
            AttributeValue::StringArray(vec!["a".into(), String::new(), "b".into()]),
        ];
        for v in &values {
            assert_eq!(&roundtrip_scalar(v), v);
        }
    }

    #[test]
    fn test_encoded_len_per_variant() {
        let cases = [
            (AttributeValue::ByteArray(vec![0; 3]), 4 + 3),
            (AttributeValue::ShortArray(vec![0; 3]), 4 + 6),
            (AttributeValue::IntArray(vec![0; 3]), 4 + 12),
            (AttributeValue::FloatArray(vec![0.0; 3]), 4 + 12),
            (AttributeValue::LongArray(vec![0; 3]), 4 + 24),
            (AttributeValue::DoubleArray(vec![0.0; 3]), 4 + 24),
        ];
        for (value, expected) in &cases {
            assert_eq!(value.encoded_len(), *expected, "{:?}", value);
            let mut buf = vec![0u8; *expected];
            let mut out = CursorMut::new(&mut buf);
            value.write(&mut out).expect("write array");
            assert_eq!(out.offset(), *expected);
        }
    }

    #[test]
    fn test_empty_array_is_four_zero_bytes() {
        let value = AttributeValue::IntArray(Vec::new());
        let mut buf = vec![0xFFu8; 4];
        let mut out = CursorMut::new(&mut buf);
        value.write(&mut out).expect("write empty array");
        assert_eq!(buf, [0, 0, 0, 0]);
        assert_eq!(&roundtrip_scalar(&value), &value);
    }

    #[test]
    fn test_negative_count_rejected() {
        let bytes = [0xFF, 0xFF, 0xFF, 0xFF]; // count -1
        let table = TagTable::standard();
        let mut cur = Cursor::new(&bytes);
        let err =
            AttributeValue::read_scalar(&table, tags::INT_ARRAY, &mut cur).unwrap_err();
        assert_eq!(err, CodecError::InvalidCount { count: -1 });
    }

    #[test]
    fn test_oversized_count_rejected_before_allocation() {
        // Claims 2^30 longs but carries no payload.
        let bytes = [0x40, 0x00, 0x00, 0x00];
        let table = TagTable::standard();
        let mut cur = Cursor::new(&bytes);
        let err =
            AttributeValue::read_scalar(&table, tags::LONG_ARRAY, &mut cur).unwrap_err();
        assert_eq!(err, CodecError::ShortRead { offset: 4 });
    }

    #[test]
    fn test_unknown_tag() {
        let table = TagTable::standard();
        let err = table.empty_for(0x99).unwrap_err();
        assert_eq!(err, CodecError::UnknownVariant { tag: 0x99 });
    }

    #[test]
    fn test_registered_tag_extends_table() {
        let mut table = TagTable::standard();
        table.register(0x20, || AttributeValue::Int(0));
        let empty = table.empty_for(0x20).expect("registered tag");
        assert_eq!(empty, AttributeValue::Int(0));
    }

    #[test]
    fn test_composite_tags_rejected_by_scalar_reader() {
        let table = TagTable::standard();
        let mut cur = Cursor::new(&[]);
        let err =
            AttributeValue::read_scalar(&table, tags::ATTRIBUTE_LIST, &mut cur).unwrap_err();
        assert_eq!(
            err,
            CodecError::UnknownVariant {
                tag: tags::ATTRIBUTE_LIST
            }
        );
    }

    #[test]
    fn test_clone_is_independent() {
        let original = AttributeValue::AttributeList(AttributeList::defined(vec![
            AttributeValue::Int(7),
            AttributeValue::StringArray(vec!["x".into()]),
        ]));
        let mut copy = original.clone();
        assert_eq!(copy, original);

        if let AttributeValue::AttributeList(list) = &mut copy {
            list.items[0] = Some(AttributeValue::Int(8));
        }
        assert_ne!(copy, original, "mutating the clone must not touch the original");
        if let AttributeValue::AttributeList(list) = &original {
            assert_eq!(list.items[0], Some(AttributeValue::Int(7)));
        }
    }

    #[test]
    fn test_sparse_list_write_skips_unassigned_children() {
        // A list with a None child in the middle writes only the defined
        // children, with no placeholder. Pinned wire behavior.
        let list = AttributeList::new(vec![
            Some(AttributeValue::Int(7)),
            None,
            Some(AttributeValue::Byte(1)),
        ]);
        let value = AttributeValue::AttributeList(list);
        assert_eq!(value.encoded_len(), 5);

        let mut buf = vec![0u8; 5];
        let mut out = CursorMut::new(&mut buf);
        value.write(&mut out).expect("write sparse list");
        assert_eq!(buf, [0, 0, 0, 7, 1]);
    }

    #[test]
    fn test_sparse_list_array_count_includes_unassigned_slots() {
        let lists = vec![
            Some(AttributeList::defined(vec![AttributeValue::Byte(9)])),
            None,
        ];
        let value = AttributeValue::AttributeListArray(lists);

        let mut buf = vec![0u8; value.encoded_len()];
        let mut out = CursorMut::new(&mut buf);
        value.write(&mut out).expect("write sparse list array");
        // Count says 2, but only one element's bytes follow.
        assert_eq!(buf, [0, 0, 0, 2, 9]);
    }

    #[test]
    fn test_is_defined_sentinels() {
        assert!(!AttributeValue::Byte(i8::MIN).is_defined());
        assert!(AttributeValue::Byte(0).is_defined());
        assert!(!AttributeValue::Long(i64::MIN).is_defined());
        assert!(!AttributeValue::Double(f64::NAN).is_defined());
        assert!(!AttributeValue::String(UNDEFINED_STRING.into()).is_defined());
        assert!(AttributeValue::IntArray(Vec::new()).is_defined());
        assert!(!AttributeValue::IntArray(vec![1, i32::MIN]).is_defined());

        let sparse = AttributeValue::AttributeList(AttributeList::new(vec![None]));
        assert!(!sparse.is_defined());
        let full = AttributeValue::AttributeList(AttributeList::defined(vec![
            AttributeValue::Int(1),
        ]));
        assert!(full.is_defined());
    }
}

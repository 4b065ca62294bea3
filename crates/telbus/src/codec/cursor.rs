// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 telbus contributors

//! Read/write cursors for wire buffer manipulation.
//!
//! Big-endian throughout; every access is bounds-checked. Text fields use
//! modified UTF-8: a 2-byte length prefix counting *encoded bytes*, with
//! `U+0000` encoded as `0xC0 0x80` and code points above U+FFFF encoded as
//! a CESU-8 surrogate pair (two 3-byte groups).

use super::{CodecError, CodecResult};

/// Generate write methods for primitive types (eliminates code duplication)
///
/// Each generated method:
/// 1. Checks buffer bounds (returns `CodecError::Overflow` if exceeded)
/// 2. Converts value to big-endian bytes via `to_be_bytes()`
/// 3. Copies bytes to buffer
/// 4. Advances offset
macro_rules! impl_write_be {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self, value: $type) -> CodecResult<()> {
            if self.offset + $size > self.buffer.len() {
                return Err(CodecError::Overflow {
                    offset: self.offset,
                });
            }
            let bytes = value.to_be_bytes();
            self.buffer[self.offset..self.offset + $size].copy_from_slice(&bytes);
            self.offset += $size;
            Ok(())
        }
    };
}

/// Generate read methods for primitive types (eliminates code duplication)
///
/// Each generated method:
/// 1. Checks buffer bounds (returns `CodecError::ShortRead` if exceeded)
/// 2. Reads N bytes from buffer
/// 3. Converts bytes to value via `from_be_bytes()`
/// 4. Advances offset
macro_rules! impl_read_be {
    ($name:ident, $type:ty, $size:expr) => {
        pub fn $name(&mut self) -> CodecResult<$type> {
            if self.offset + $size > self.buffer.len() {
                return Err(CodecError::ShortRead {
                    offset: self.offset,
                });
            }
            let mut bytes = [0u8; $size];
            bytes.copy_from_slice(&self.buffer[self.offset..self.offset + $size]);
            self.offset += $size;
            Ok(<$type>::from_be_bytes(bytes))
        }
    };
}

/// Mutable cursor for writing (bounds-checked, zero-copy)
pub struct CursorMut<'a> {
    buffer: &'a mut [u8],
    offset: usize,
}

impl<'a> CursorMut<'a> {
    pub fn new(buffer: &'a mut [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_write_be!(write_u8, u8, 1);
    impl_write_be!(write_i8, i8, 1);
    impl_write_be!(write_u16_be, u16, 2);
    impl_write_be!(write_i16_be, i16, 2);
    impl_write_be!(write_u32_be, u32, 4);
    impl_write_be!(write_i32_be, i32, 4);
    impl_write_be!(write_u64_be, u64, 8);
    impl_write_be!(write_i64_be, i64, 8);

    pub fn write_f32_be(&mut self, value: f32) -> CodecResult<()> {
        self.write_u32_be(value.to_bits())
    }

    pub fn write_f64_be(&mut self, value: f64) -> CodecResult<()> {
        self.write_u64_be(value.to_bits())
    }

    pub fn write_bytes(&mut self, data: &[u8]) -> CodecResult<()> {
        if self.offset + data.len() > self.buffer.len() {
            return Err(CodecError::Overflow {
                offset: self.offset,
            });
        }
        self.buffer[self.offset..self.offset + data.len()].copy_from_slice(data);
        self.offset += data.len();
        Ok(())
    }

    /// Write a length-prefixed modified-UTF-8 string.
    pub fn write_utf(&mut self, text: &str) -> CodecResult<()> {
        let encoded = encode_modified_utf8(text);
        if encoded.len() > u16::MAX as usize {
            return Err(CodecError::StringTooLong { len: encoded.len() });
        }
        self.write_u16_be(encoded.len() as u16)?;
        self.write_bytes(&encoded)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }
}

/// Immutable cursor for reading (bounds-checked, zero-copy)
pub struct Cursor<'a> {
    buffer: &'a [u8],
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buffer: &'a [u8]) -> Self {
        Self { buffer, offset: 0 }
    }

    impl_read_be!(read_u8, u8, 1);
    impl_read_be!(read_i8, i8, 1);
    impl_read_be!(read_u16_be, u16, 2);
    impl_read_be!(read_i16_be, i16, 2);
    impl_read_be!(read_u32_be, u32, 4);
    impl_read_be!(read_i32_be, i32, 4);
    impl_read_be!(read_u64_be, u64, 8);
    impl_read_be!(read_i64_be, i64, 8);

    pub fn read_f32_be(&mut self) -> CodecResult<f32> {
        Ok(f32::from_bits(self.read_u32_be()?))
    }

    pub fn read_f64_be(&mut self) -> CodecResult<f64> {
        Ok(f64::from_bits(self.read_u64_be()?))
    }

    pub fn read_bytes(&mut self, len: usize) -> CodecResult<&'a [u8]> {
        if self.offset + len > self.buffer.len() {
            return Err(CodecError::ShortRead {
                offset: self.offset,
            });
        }
        let slice = &self.buffer[self.offset..self.offset + len];
        self.offset += len;
        Ok(slice)
    }

    /// Read a length-prefixed modified-UTF-8 string.
    pub fn read_utf(&mut self) -> CodecResult<String> {
        let len = self.read_u16_be()? as usize;
        let start = self.offset;
        let bytes = self.read_bytes(len)?;
        decode_modified_utf8(bytes, start)
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn remaining(&self) -> usize {
        self.buffer.len().saturating_sub(self.offset)
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.buffer.len()
    }
}

/// Number of bytes `text` occupies in modified UTF-8, excluding the prefix.
pub fn modified_utf8_len(text: &str) -> usize {
    let mut len = 0usize;
    for c in text.chars() {
        let cp = c as u32;
        len += match cp {
            0x0001..=0x007F => 1,
            0x0000 | 0x0080..=0x07FF => 2,
            0x0800..=0xFFFF => 3,
            // Encoded as a surrogate pair, 3 bytes per half.
            _ => 6,
        };
    }
    len
}

fn encode_modified_utf8(text: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len() + text.len() / 2);
    for c in text.chars() {
        let cp = c as u32;
        match cp {
            0x0001..=0x007F => out.push(cp as u8),
            0x0000 | 0x0080..=0x07FF => {
                out.push(0xC0 | ((cp >> 6) as u8 & 0x1F));
                out.push(0x80 | (cp as u8 & 0x3F));
            }
            0x0800..=0xFFFF => push_three_byte(&mut out, cp),
            _ => {
                let v = cp - 0x1_0000;
                push_three_byte(&mut out, 0xD800 + (v >> 10));
                push_three_byte(&mut out, 0xDC00 + (v & 0x3FF));
            }
        }
    }
    out
}

fn push_three_byte(out: &mut Vec<u8>, unit: u32) {
    out.push(0xE0 | ((unit >> 12) as u8 & 0x0F));
    out.push(0x80 | ((unit >> 6) as u8 & 0x3F));
    out.push(0x80 | (unit as u8 & 0x3F));
}

fn decode_modified_utf8(bytes: &[u8], base_offset: usize) -> CodecResult<String> {
    // Decode byte groups into UTF-16 code units, then combine surrogate
    // pairs. Errors report the absolute buffer offset of the bad group.
    let invalid = |i: usize| CodecError::InvalidUtf {
        offset: base_offset + i,
    };
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0usize;
    while i < bytes.len() {
        let b0 = bytes[i];
        match b0 {
            0x01..=0x7F => {
                units.push(u16::from(b0));
                i += 1;
            }
            0xC0..=0xDF => {
                let b1 = *bytes.get(i + 1).ok_or_else(|| invalid(i))?;
                if b1 & 0xC0 != 0x80 {
                    return Err(invalid(i));
                }
                units.push((u16::from(b0 & 0x1F) << 6) | u16::from(b1 & 0x3F));
                i += 2;
            }
            0xE0..=0xEF => {
                if i + 2 >= bytes.len() {
                    return Err(invalid(i));
                }
                let (b1, b2) = (bytes[i + 1], bytes[i + 2]);
                if b1 & 0xC0 != 0x80 || b2 & 0xC0 != 0x80 {
                    return Err(invalid(i));
                }
                units.push(
                    (u16::from(b0 & 0x0F) << 12)
                        | (u16::from(b1 & 0x3F) << 6)
                        | u16::from(b2 & 0x3F),
                );
                i += 3;
            }
            _ => return Err(invalid(i)),
        }
    }
    String::from_utf16(&units).map_err(|_| invalid(0))
}

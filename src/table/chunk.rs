//! Copyright © 2025-2026 Wenze Wei. All Rights Reserved.
//!
//! This file is part of Small.
//! The Small project belongs to the Dunimd Team.
//!
//! Licensed under the Apache License, Version 2.0 (the "License");
//! You may not use this file except in compliance with the License.
//! You may obtain a copy of the License at
//!
//!     http://www.apache.org/licenses/LICENSE-2.0
//!
//! Unless required by applicable law or agreed to in writing, software
//! distributed under the License is distributed on an "AS IS" BASIS,
//! WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
//! See the License for the specific language governing permissions and
//! limitations under the License.

//! Low-level chunk primitives shared by the table reader, builder and patcher.
//! Every read is bounds-checked and reports `MalformedTable` instead of
//! panicking on truncated input.

use crate::errors::{Result, SmError};

pub(crate) const RES_STRING_POOL_TYPE: u16 = 0x0001;
pub(crate) const RES_TABLE_TYPE: u16 = 0x0002;
pub(crate) const RES_TABLE_PACKAGE_TYPE: u16 = 0x0200;
pub(crate) const RES_TABLE_TYPE_TYPE: u16 = 0x0201;
pub(crate) const RES_TABLE_TYPE_SPEC_TYPE: u16 = 0x0202;
pub(crate) const RES_TABLE_LIBRARY_TYPE: u16 = 0x0203;

pub(crate) const CHUNK_HEADER_SIZE: usize = 8;
pub(crate) const TABLE_HEADER_SIZE: usize = 12;
pub(crate) const STRING_POOL_HEADER_SIZE: usize = 28;
pub(crate) const PACKAGE_HEADER_SIZE: usize = 288;
pub(crate) const TYPE_SPEC_HEADER_SIZE: usize = 16;
/// `TYPE` header without its trailing configuration block.
pub(crate) const TYPE_HEADER_BASE_SIZE: usize = 20;
pub(crate) const LIBRARY_HEADER_SIZE: usize = 12;
pub(crate) const LIBRARY_ENTRY_SIZE: usize = 4 + PACKAGE_NAME_UNITS * 2;
pub(crate) const PACKAGE_NAME_UNITS: usize = 128;
pub(crate) const DEFAULT_CONFIG_SIZE: usize = 64;

// Offsets inside a PACKAGE chunk header.
pub(crate) const PACKAGE_ID_OFFSET: usize = 8;
pub(crate) const PACKAGE_NAME_OFFSET: usize = 12;
pub(crate) const PACKAGE_TYPE_STRINGS_OFFSET: usize = 268;
pub(crate) const PACKAGE_LAST_PUBLIC_TYPE_OFFSET: usize = 272;
pub(crate) const PACKAGE_KEY_STRINGS_OFFSET: usize = 276;
pub(crate) const PACKAGE_LAST_PUBLIC_KEY_OFFSET: usize = 280;

pub(crate) const SIMPLE_ENTRY_SIZE: usize = 8;
pub(crate) const MAP_ENTRY_SIZE: usize = 16;
pub(crate) const MAP_ITEM_SIZE: usize = 12;
pub(crate) const VALUE_SIZE: usize = 8;

pub(crate) const NO_ENTRY: u32 = 0xFFFF_FFFF;
pub(crate) const FLAG_COMPLEX: u16 = 0x0001;
pub(crate) const UTF8_FLAG: u32 = 1 << 8;

pub(crate) const TYPE_NULL: u8 = 0x00;
pub(crate) const TYPE_REFERENCE: u8 = 0x01;
pub(crate) const TYPE_ATTRIBUTE: u8 = 0x02;
pub(crate) const TYPE_STRING: u8 = 0x03;
pub(crate) const TYPE_FLOAT: u8 = 0x04;
pub(crate) const TYPE_DIMENSION: u8 = 0x05;
pub(crate) const TYPE_FRACTION: u8 = 0x06;
pub(crate) const TYPE_DYNAMIC_REFERENCE: u8 = 0x07;
pub(crate) const TYPE_DYNAMIC_ATTRIBUTE: u8 = 0x08;
pub(crate) const TYPE_INT_DEC: u8 = 0x10;
pub(crate) const TYPE_INT_HEX: u8 = 0x11;
pub(crate) const TYPE_INT_BOOLEAN: u8 = 0x12;
pub(crate) const TYPE_INT_COLOR_ARGB8: u8 = 0x1c;
pub(crate) const TYPE_INT_COLOR_RGB4: u8 = 0x1f;

/// Value types whose data word is a resource identifier.
pub(crate) fn is_reference_type(data_type: u8) -> bool {
    matches!(
        data_type,
        TYPE_REFERENCE | TYPE_ATTRIBUTE | TYPE_DYNAMIC_REFERENCE | TYPE_DYNAMIC_ATTRIBUTE
    )
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct SmChunkHeader {
    pub ty: u16,
    pub header_size: u16,
    pub size: u32,
    pub offset: usize,
}

impl SmChunkHeader {
    /// Read a chunk header at `offset`, requiring the whole chunk to fit before `limit`.
    pub fn read(bytes: &[u8], offset: usize, limit: usize) -> Result<Self> {
        let ty = read_u16(bytes, offset)?;
        let header_size = read_u16(bytes, offset + 2)?;
        let size = read_u32(bytes, offset + 4)?;

        if (header_size as usize) < CHUNK_HEADER_SIZE {
            return Err(SmError::malformed(format!(
                "chunk 0x{:04x} at {} has header size {}",
                ty, offset, header_size
            )));
        }
        if (size as usize) < header_size as usize {
            return Err(SmError::malformed(format!(
                "chunk 0x{:04x} at {} is smaller than its header ({} < {})",
                ty, offset, size, header_size
            )));
        }
        let end = offset
            .checked_add(size as usize)
            .ok_or_else(|| SmError::malformed("chunk size overflows"))?;
        if end > limit || limit > bytes.len() {
            return Err(SmError::malformed(format!(
                "chunk 0x{:04x} at {} runs past its parent ({} > {})",
                ty, offset, end, limit
            )));
        }

        Ok(SmChunkHeader {
            ty,
            header_size,
            size,
            offset,
        })
    }

    pub fn body(&self) -> usize {
        self.offset + self.header_size as usize
    }

    pub fn end(&self) -> usize {
        self.offset + self.size as usize
    }

    pub fn expect_header(&self, minimum: usize, what: &str) -> Result<()> {
        if (self.header_size as usize) < minimum {
            return Err(SmError::malformed(format!(
                "{} header at {} is {} bytes, expected at least {}",
                what, self.offset, self.header_size, minimum
            )));
        }
        Ok(())
    }
}

/// Headers of the consecutive child chunks stored in `[start, end)`.
pub(crate) fn children(bytes: &[u8], start: usize, end: usize) -> Result<Vec<SmChunkHeader>> {
    let mut out = Vec::new();
    let mut offset = start;
    while offset < end {
        let header = SmChunkHeader::read(bytes, offset, end)?;
        offset = header.end();
        out.push(header);
    }
    Ok(out)
}

pub(crate) fn read_u8(bytes: &[u8], offset: usize) -> Result<u8> {
    bytes
        .get(offset)
        .copied()
        .ok_or_else(|| SmError::malformed(format!("read of u8 at {} past end", offset)))
}

pub(crate) fn read_u16(bytes: &[u8], offset: usize) -> Result<u16> {
    let raw = bytes
        .get(offset..offset + 2)
        .ok_or_else(|| SmError::malformed(format!("read of u16 at {} past end", offset)))?;
    Ok(u16::from_le_bytes([raw[0], raw[1]]))
}

pub(crate) fn read_u32(bytes: &[u8], offset: usize) -> Result<u32> {
    let raw = bytes
        .get(offset..offset + 4)
        .ok_or_else(|| SmError::malformed(format!("read of u32 at {} past end", offset)))?;
    Ok(u32::from_le_bytes([raw[0], raw[1], raw[2], raw[3]]))
}

pub(crate) fn write_u32(bytes: &mut [u8], offset: usize, value: u32) -> Result<()> {
    let slot = bytes
        .get_mut(offset..offset + 4)
        .ok_or_else(|| SmError::malformed(format!("write of u32 at {} past end", offset)))?;
    slot.copy_from_slice(&value.to_le_bytes());
    Ok(())
}

/// Fixed-width, NUL-terminated UTF-16 name (package and library names).
pub(crate) fn read_utf16_name(bytes: &[u8], offset: usize, units: usize) -> Result<String> {
    let mut buf = Vec::with_capacity(units);
    for i in 0..units {
        let unit = read_u16(bytes, offset + i * 2)?;
        if unit == 0 {
            break;
        }
        buf.push(unit);
    }
    String::from_utf16(&buf)
        .map_err(|_| SmError::malformed(format!("invalid UTF-16 name at {}", offset)))
}

pub(crate) fn push_u8(buf: &mut Vec<u8>, value: u8) {
    buf.push(value);
}

pub(crate) fn push_u16(buf: &mut Vec<u8>, value: u16) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn push_u32(buf: &mut Vec<u8>, value: u32) {
    buf.extend_from_slice(&value.to_le_bytes());
}

pub(crate) fn push_utf16_name(buf: &mut Vec<u8>, name: &str, units: usize) {
    let encoded: Vec<u16> = name.encode_utf16().take(units - 1).collect();
    for unit in &encoded {
        push_u16(buf, *unit);
    }
    for _ in encoded.len()..units {
        push_u16(buf, 0);
    }
}

/// Strings of a `STRING_POOL` chunk. Style spans are not interpreted.
pub(crate) fn read_string_pool(bytes: &[u8], header: &SmChunkHeader) -> Result<Vec<String>> {
    if header.ty != RES_STRING_POOL_TYPE {
        return Err(SmError::malformed(format!(
            "expected string pool at {}, found chunk 0x{:04x}",
            header.offset, header.ty
        )));
    }
    header.expect_header(STRING_POOL_HEADER_SIZE, "string pool")?;

    let count = read_u32(bytes, header.offset + 8)? as usize;
    let flags = read_u32(bytes, header.offset + 16)?;
    let strings_start = read_u32(bytes, header.offset + 20)? as usize;
    let utf8 = flags & UTF8_FLAG != 0;

    if count > (header.size as usize) / 4 {
        return Err(SmError::malformed(format!(
            "string pool at {} claims {} strings in {} bytes",
            header.offset, count, header.size
        )));
    }

    let base = header.offset + strings_start;
    let mut strings = Vec::with_capacity(count);
    for i in 0..count {
        let rel = read_u32(bytes, header.body() + i * 4)? as usize;
        let at = base + rel;
        if at >= header.end() {
            return Err(SmError::malformed(format!(
                "string {} of pool at {} starts past the chunk",
                i, header.offset
            )));
        }
        let value = if utf8 {
            read_utf8_string(bytes, at, header.end())?
        } else {
            read_utf16_string(bytes, at, header.end())?
        };
        strings.push(value);
    }
    Ok(strings)
}

fn read_utf8_length(bytes: &[u8], offset: usize) -> Result<(usize, usize)> {
    let first = read_u8(bytes, offset)? as usize;
    if first & 0x80 != 0 {
        let second = read_u8(bytes, offset + 1)? as usize;
        Ok((((first & 0x7F) << 8) | second, 2))
    } else {
        Ok((first, 1))
    }
}

fn read_utf8_string(bytes: &[u8], offset: usize, limit: usize) -> Result<String> {
    let (_chars, used_chars) = read_utf8_length(bytes, offset)?;
    let (len, used_bytes) = read_utf8_length(bytes, offset + used_chars)?;
    let start = offset + used_chars + used_bytes;
    if start + len > limit {
        return Err(SmError::malformed(format!("string at {} runs past its pool", offset)));
    }
    String::from_utf8(bytes[start..start + len].to_vec())
        .map_err(|_| SmError::malformed(format!("invalid UTF-8 string at {}", offset)))
}

fn read_utf16_string(bytes: &[u8], offset: usize, limit: usize) -> Result<String> {
    let first = read_u16(bytes, offset)? as usize;
    let (len, used) = if first & 0x8000 != 0 {
        let second = read_u16(bytes, offset + 2)? as usize;
        (((first & 0x7FFF) << 16) | second, 4)
    } else {
        (first, 2)
    };
    let start = offset + used;
    if start + len * 2 > limit {
        return Err(SmError::malformed(format!("string at {} runs past its pool", offset)));
    }
    let mut units = Vec::with_capacity(len);
    for i in 0..len {
        units.push(read_u16(bytes, start + i * 2)?);
    }
    String::from_utf16(&units)
        .map_err(|_| SmError::malformed(format!("invalid UTF-16 string at {}", offset)))
}

fn push_utf8_length(buf: &mut Vec<u8>, len: usize) {
    if len > 0x7F {
        buf.push((((len >> 8) & 0x7F) as u8) | 0x80);
        buf.push((len & 0xFF) as u8);
    } else {
        buf.push(len as u8);
    }
}

/// Encode a UTF-8 `STRING_POOL` chunk. Strings longer than 0x7FFF bytes are rejected.
pub(crate) fn encode_string_pool(strings: &[String]) -> Result<Vec<u8>> {
    let mut data = Vec::new();
    let mut offsets = Vec::with_capacity(strings.len());
    for s in strings {
        if s.len() > 0x7FFF {
            return Err(SmError::validation(format!(
                "string of {} bytes does not fit a resource string pool",
                s.len()
            )));
        }
        offsets.push(data.len() as u32);
        push_utf8_length(&mut data, s.chars().count());
        push_utf8_length(&mut data, s.len());
        data.extend_from_slice(s.as_bytes());
        data.push(0);
    }
    while data.len() % 4 != 0 {
        data.push(0);
    }

    let strings_start = STRING_POOL_HEADER_SIZE + offsets.len() * 4;
    let size = strings_start + data.len();

    let mut out = Vec::with_capacity(size);
    push_u16(&mut out, RES_STRING_POOL_TYPE);
    push_u16(&mut out, STRING_POOL_HEADER_SIZE as u16);
    push_u32(&mut out, size as u32);
    push_u32(&mut out, strings.len() as u32);
    push_u32(&mut out, 0);
    push_u32(&mut out, UTF8_FLAG);
    push_u32(&mut out, strings_start as u32);
    push_u32(&mut out, 0);
    for offset in offsets {
        push_u32(&mut out, offset);
    }
    out.extend_from_slice(&data);
    Ok(out)
}

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

//! Compiled table parsing.
//!
//! [`parse_layout`] records the byte offset of every identifier-carrying word
//! so the patcher can rewrite in place. [`SmResourceTable`] is the typed,
//! read-only view handed to resolvers once a bundle is resident.

use std::collections::{BTreeMap, HashMap};

use crate::errors::{Result, SmError};
use crate::table::chunk::{
    children, is_reference_type, read_string_pool, read_u16, read_u32, read_u8, read_utf16_name,
    SmChunkHeader, FLAG_COMPLEX, LIBRARY_ENTRY_SIZE, LIBRARY_HEADER_SIZE, MAP_ENTRY_SIZE,
    MAP_ITEM_SIZE, NO_ENTRY, PACKAGE_HEADER_SIZE, PACKAGE_ID_OFFSET, PACKAGE_KEY_STRINGS_OFFSET,
    PACKAGE_NAME_OFFSET, PACKAGE_NAME_UNITS, PACKAGE_TYPE_STRINGS_OFFSET, RES_STRING_POOL_TYPE,
    RES_TABLE_LIBRARY_TYPE, RES_TABLE_PACKAGE_TYPE, RES_TABLE_TYPE, RES_TABLE_TYPE_TYPE,
    SIMPLE_ENTRY_SIZE, TABLE_HEADER_SIZE, TYPE_ATTRIBUTE, TYPE_DIMENSION, TYPE_DYNAMIC_ATTRIBUTE,
    TYPE_DYNAMIC_REFERENCE, TYPE_FLOAT, TYPE_FRACTION, TYPE_HEADER_BASE_SIZE, TYPE_INT_BOOLEAN,
    TYPE_INT_COLOR_ARGB8, TYPE_INT_COLOR_RGB4, TYPE_INT_DEC, TYPE_INT_HEX, TYPE_NULL,
    TYPE_REFERENCE, TYPE_STRING, VALUE_SIZE,
};
use crate::table::{SmResourceId, SmSlot};

/// A value word together with where its data lives in the table bytes.
#[derive(Clone, Copy, Debug)]
pub(crate) struct SmValueSlot {
    pub data_offset: usize,
    pub data_type: u8,
    pub data: u32,
}

impl SmValueSlot {
    fn read(bytes: &[u8], offset: usize, limit: usize) -> Result<Self> {
        if offset + VALUE_SIZE > limit {
            return Err(SmError::malformed(format!("value at {} runs past its chunk", offset)));
        }
        Ok(SmValueSlot {
            data_offset: offset + 4,
            data_type: read_u8(bytes, offset + 3)?,
            data: read_u32(bytes, offset + 4)?,
        })
    }

    pub fn is_reference(&self) -> bool {
        is_reference_type(self.data_type)
    }
}

#[derive(Clone, Debug)]
pub(crate) struct SmMapItem {
    pub name_offset: usize,
    pub name: u32,
    pub value: SmValueSlot,
}

#[derive(Clone, Debug)]
pub(crate) enum SmEntryBody {
    Simple(SmValueSlot),
    Complex {
        parent_offset: usize,
        parent: u32,
        items: Vec<SmMapItem>,
    },
}

#[derive(Clone, Debug)]
pub(crate) struct SmEntryLayout {
    pub index: u16,
    pub key: u32,
    pub body: SmEntryBody,
}

#[derive(Clone, Debug)]
pub(crate) struct SmTypeLayout {
    pub type_id: u8,
    pub default_config: bool,
    pub entries: Vec<SmEntryLayout>,
}

#[derive(Clone, Debug)]
pub(crate) struct SmLibraryLayout {
    pub package_id_offset: usize,
    pub package_id: u32,
    pub name: String,
}

/// Every identifier-bearing location of a compiled table.
#[derive(Clone, Debug)]
pub(crate) struct SmTableLayout {
    pub package_id_offset: usize,
    pub package_id: u32,
    pub package_name: String,
    pub global_strings: Vec<String>,
    pub type_names: Vec<String>,
    pub key_names: Vec<String>,
    pub types: Vec<SmTypeLayout>,
    pub libraries: Vec<SmLibraryLayout>,
}

impl SmTableLayout {
    pub fn type_name(&self, type_id: u8) -> Option<&str> {
        (type_id as usize)
            .checked_sub(1)
            .and_then(|i| self.type_names.get(i))
            .map(String::as_str)
    }

    pub fn key_name(&self, key: u32) -> Option<&str> {
        self.key_names.get(key as usize).map(String::as_str)
    }
}

pub(crate) fn parse_layout(bytes: &[u8]) -> Result<SmTableLayout> {
    let table = SmChunkHeader::read(bytes, 0, bytes.len())?;
    if table.ty != RES_TABLE_TYPE {
        return Err(SmError::malformed(format!(
            "expected resource table chunk, found 0x{:04x}",
            table.ty
        )));
    }
    table.expect_header(TABLE_HEADER_SIZE, "table")?;
    let package_count = read_u32(bytes, 8)?;
    if package_count != 1 {
        return Err(SmError::malformed(format!(
            "bundle tables carry exactly one package, found {}",
            package_count
        )));
    }

    let mut global_strings = None;
    let mut layout = None;
    for chunk in children(bytes, table.body(), table.end())? {
        match chunk.ty {
            RES_STRING_POOL_TYPE if global_strings.is_none() => {
                global_strings = Some(read_string_pool(bytes, &chunk)?);
            }
            RES_TABLE_PACKAGE_TYPE => {
                if layout.is_some() {
                    return Err(SmError::malformed("table contains more than one package chunk"));
                }
                layout = Some(parse_package(bytes, &chunk)?);
            }
            _ => {}
        }
    }

    let mut layout = layout.ok_or_else(|| SmError::malformed("table has no package chunk"))?;
    layout.global_strings = global_strings.unwrap_or_default();
    Ok(layout)
}

fn parse_package(bytes: &[u8], package: &SmChunkHeader) -> Result<SmTableLayout> {
    package.expect_header(PACKAGE_HEADER_SIZE, "package")?;
    let base = package.offset;
    let package_id = read_u32(bytes, base + PACKAGE_ID_OFFSET)?;
    let package_name = read_utf16_name(bytes, base + PACKAGE_NAME_OFFSET, PACKAGE_NAME_UNITS)?;

    let type_names = match read_u32(bytes, base + PACKAGE_TYPE_STRINGS_OFFSET)? as usize {
        0 => Vec::new(),
        rel => {
            let pool = SmChunkHeader::read(bytes, base + rel, package.end())?;
            read_string_pool(bytes, &pool)?
        }
    };
    let key_names = match read_u32(bytes, base + PACKAGE_KEY_STRINGS_OFFSET)? as usize {
        0 => Vec::new(),
        rel => {
            let pool = SmChunkHeader::read(bytes, base + rel, package.end())?;
            read_string_pool(bytes, &pool)?
        }
    };

    let mut types = Vec::new();
    let mut libraries = Vec::new();
    for chunk in children(bytes, package.body(), package.end())? {
        match chunk.ty {
            RES_TABLE_TYPE_TYPE => types.push(parse_type(bytes, &chunk)?),
            RES_TABLE_LIBRARY_TYPE => libraries.extend(parse_library(bytes, &chunk)?),
            _ => {}
        }
    }

    Ok(SmTableLayout {
        package_id_offset: base + PACKAGE_ID_OFFSET,
        package_id,
        package_name,
        global_strings: Vec::new(),
        type_names,
        key_names,
        types,
        libraries,
    })
}

fn parse_type(bytes: &[u8], chunk: &SmChunkHeader) -> Result<SmTypeLayout> {
    chunk.expect_header(TYPE_HEADER_BASE_SIZE, "type")?;
    let base = chunk.offset;
    let type_id = read_u8(bytes, base + 8)?;
    let entry_count = read_u32(bytes, base + 12)? as usize;
    let entries_start = base + read_u32(bytes, base + 16)? as usize;

    if type_id == 0 {
        return Err(SmError::malformed(format!("type chunk at {} has id 0", base)));
    }

    let config_offset = base + TYPE_HEADER_BASE_SIZE;
    let default_config = if chunk.body() >= config_offset + 4 {
        let config_size = read_u32(bytes, config_offset)? as usize;
        if config_offset + config_size > chunk.body() {
            return Err(SmError::malformed(format!(
                "type {} config of {} bytes overflows its header",
                type_id, config_size
            )));
        }
        bytes[config_offset + 4..config_offset + config_size.max(4)]
            .iter()
            .all(|b| *b == 0)
    } else {
        true
    };

    if chunk.body() + entry_count * 4 > entries_start || entries_start > chunk.end() {
        return Err(SmError::malformed(format!(
            "type {} declares {} entries that do not fit its chunk",
            type_id, entry_count
        )));
    }

    let mut entries = Vec::new();
    for index in 0..entry_count {
        let rel = read_u32(bytes, chunk.body() + index * 4)?;
        if rel == NO_ENTRY {
            continue;
        }
        let at = entries_start + rel as usize;
        if index > u16::MAX as usize {
            return Err(SmError::malformed(format!("type {} has too many entries", type_id)));
        }
        entries.push(parse_entry(bytes, at, index as u16, chunk.end())?);
    }

    Ok(SmTypeLayout {
        type_id,
        default_config,
        entries,
    })
}

fn parse_entry(bytes: &[u8], at: usize, index: u16, limit: usize) -> Result<SmEntryLayout> {
    let size = read_u16(bytes, at)? as usize;
    let flags = read_u16(bytes, at + 2)?;
    let key = read_u32(bytes, at + 4)?;

    let body = if flags & FLAG_COMPLEX != 0 {
        if size < MAP_ENTRY_SIZE {
            return Err(SmError::malformed(format!("map entry at {} is {} bytes", at, size)));
        }
        let parent = read_u32(bytes, at + 8)?;
        let count = read_u32(bytes, at + 12)? as usize;
        let items_start = at + size;
        if items_start + count * MAP_ITEM_SIZE > limit {
            return Err(SmError::malformed(format!(
                "map entry at {} has {} items past its chunk",
                at, count
            )));
        }
        let mut items = Vec::with_capacity(count);
        for i in 0..count {
            let item = items_start + i * MAP_ITEM_SIZE;
            items.push(SmMapItem {
                name_offset: item,
                name: read_u32(bytes, item)?,
                value: SmValueSlot::read(bytes, item + 4, limit)?,
            });
        }
        SmEntryBody::Complex {
            parent_offset: at + 8,
            parent,
            items,
        }
    } else {
        if size < SIMPLE_ENTRY_SIZE {
            return Err(SmError::malformed(format!("entry at {} is {} bytes", at, size)));
        }
        SmEntryBody::Simple(SmValueSlot::read(bytes, at + size, limit)?)
    };

    Ok(SmEntryLayout { index, key, body })
}

fn parse_library(bytes: &[u8], chunk: &SmChunkHeader) -> Result<Vec<SmLibraryLayout>> {
    chunk.expect_header(LIBRARY_HEADER_SIZE, "library")?;
    let count = read_u32(bytes, chunk.offset + 8)? as usize;
    if chunk.body() + count * LIBRARY_ENTRY_SIZE > chunk.end() {
        return Err(SmError::malformed(format!(
            "library chunk at {} declares {} entries past its end",
            chunk.offset, count
        )));
    }
    (0..count)
        .map(|i| {
            let at = chunk.body() + i * LIBRARY_ENTRY_SIZE;
            Ok(SmLibraryLayout {
                package_id_offset: at,
                package_id: read_u32(bytes, at)?,
                name: read_utf16_name(bytes, at + 4, PACKAGE_NAME_UNITS)?,
            })
        })
        .collect()
}

/// Decoded resource value.
#[derive(Clone, Debug, PartialEq)]
pub enum SmResourceValue {
    Null,
    Reference(SmResourceId),
    Attribute(SmResourceId),
    String(String),
    Float(f32),
    Dimension(u32),
    Fraction(u32),
    Int(i32),
    Bool(bool),
    Color(u32),
    Raw { data_type: u8, data: u32 },
}

impl SmResourceValue {
    fn decode(slot: &SmValueSlot, strings: &[String]) -> Result<Self> {
        Ok(match slot.data_type {
            TYPE_NULL => SmResourceValue::Null,
            TYPE_REFERENCE | TYPE_DYNAMIC_REFERENCE => SmResourceValue::Reference(SmResourceId(slot.data)),
            TYPE_ATTRIBUTE | TYPE_DYNAMIC_ATTRIBUTE => SmResourceValue::Attribute(SmResourceId(slot.data)),
            TYPE_STRING => {
                let s = strings.get(slot.data as usize).ok_or_else(|| {
                    SmError::malformed(format!("string index {} outside the global pool", slot.data))
                })?;
                SmResourceValue::String(s.clone())
            }
            TYPE_FLOAT => SmResourceValue::Float(f32::from_bits(slot.data)),
            TYPE_DIMENSION => SmResourceValue::Dimension(slot.data),
            TYPE_FRACTION => SmResourceValue::Fraction(slot.data),
            TYPE_INT_DEC | TYPE_INT_HEX => SmResourceValue::Int(slot.data as i32),
            TYPE_INT_BOOLEAN => SmResourceValue::Bool(slot.data != 0),
            TYPE_INT_COLOR_ARGB8..=TYPE_INT_COLOR_RGB4 => SmResourceValue::Color(slot.data),
            other => SmResourceValue::Raw {
                data_type: other,
                data: slot.data,
            },
        })
    }

    /// Identifier carried by reference and attribute values.
    pub fn reference(&self) -> Option<SmResourceId> {
        match self {
            SmResourceValue::Reference(id) | SmResourceValue::Attribute(id) => Some(*id),
            _ => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum SmResourceBody {
    Value(SmResourceValue),
    /// Style-like entry: optional parent plus attribute/value pairs.
    Bag {
        parent: SmResourceId,
        items: Vec<(SmResourceId, SmResourceValue)>,
    },
}

#[derive(Clone, Debug, PartialEq)]
pub struct SmResourceEntry {
    pub id: SmResourceId,
    pub type_name: String,
    pub name: String,
    pub body: SmResourceBody,
}

impl SmResourceEntry {
    pub fn value(&self) -> Option<&SmResourceValue> {
        match &self.body {
            SmResourceBody::Value(value) => Some(value),
            SmResourceBody::Bag { .. } => None,
        }
    }
}

/// Read-only view over one bundle's compiled resource table.
#[derive(Clone, Debug, Default)]
pub struct SmResourceTable {
    package_id: SmSlot,
    package_name: String,
    entries: BTreeMap<SmResourceId, SmResourceEntry>,
    by_name: HashMap<(String, String), SmResourceId>,
    libraries: Vec<(String, SmSlot)>,
}

impl SmResourceTable {
    /// Parse a compiled table. Only the default configuration is surfaced when
    /// a type carries several configurations of the same entry.
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let layout = parse_layout(bytes)?;
        let package_id = u8::try_from(layout.package_id).map_err(|_| {
            SmError::malformed(format!("package id 0x{:x} does not fit a slot", layout.package_id))
        })?;

        let mut ordered: Vec<&SmTypeLayout> = layout.types.iter().collect();
        ordered.sort_by_key(|t| !t.default_config);

        let mut entries = BTreeMap::new();
        let mut by_name = HashMap::new();
        for ty in ordered {
            let type_name = layout
                .type_name(ty.type_id)
                .ok_or_else(|| SmError::malformed(format!("type id {} has no name", ty.type_id)))?
                .to_string();
            for entry in &ty.entries {
                let id = SmResourceId::new(package_id, ty.type_id, entry.index);
                if entries.contains_key(&id) {
                    continue;
                }
                let name = layout
                    .key_name(entry.key)
                    .ok_or_else(|| SmError::malformed(format!("key {} outside the key pool", entry.key)))?
                    .to_string();
                let body = match &entry.body {
                    SmEntryBody::Simple(slot) => {
                        SmResourceBody::Value(SmResourceValue::decode(slot, &layout.global_strings)?)
                    }
                    SmEntryBody::Complex { parent, items, .. } => SmResourceBody::Bag {
                        parent: SmResourceId(*parent),
                        items: items
                            .iter()
                            .map(|item| {
                                Ok((
                                    SmResourceId(item.name),
                                    SmResourceValue::decode(&item.value, &layout.global_strings)?,
                                ))
                            })
                            .collect::<Result<Vec<_>>>()?,
                    },
                };
                by_name.insert((type_name.clone(), name.clone()), id);
                entries.insert(
                    id,
                    SmResourceEntry {
                        id,
                        type_name: type_name.clone(),
                        name,
                        body,
                    },
                );
            }
        }

        let libraries = layout
            .libraries
            .iter()
            .map(|lib| (lib.name.clone(), (lib.package_id & 0xFF) as SmSlot))
            .collect();

        Ok(SmResourceTable {
            package_id,
            package_name: layout.package_name,
            entries,
            by_name,
            libraries,
        })
    }

    pub fn package_id(&self) -> SmSlot {
        self.package_id
    }

    pub fn package_name(&self) -> &str {
        &self.package_name
    }

    pub fn entry(&self, id: SmResourceId) -> Option<&SmResourceEntry> {
        self.entries.get(&id)
    }

    pub fn find(&self, type_name: &str, name: &str) -> Option<&SmResourceEntry> {
        self.by_name
            .get(&(type_name.to_string(), name.to_string()))
            .and_then(|id| self.entries.get(id))
    }

    /// Entries in identifier order.
    pub fn entries(&self) -> impl Iterator<Item = &SmResourceEntry> {
        self.entries.values()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Shared-library references as `(package name, slot)`.
    pub fn libraries(&self) -> impl Iterator<Item = (&str, SmSlot)> {
        self.libraries.iter().map(|(name, slot)| (name.as_str(), *slot))
    }
}

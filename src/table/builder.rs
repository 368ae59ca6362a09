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

//! # Table Builder
//!
//! Produces a compiled resource table and the matching `R.txt`, the same pair
//! a bundle build emits. Locally defined entries are numbered per type in
//! insertion order. Types are numbered in order of first appearance starting
//! at 1.
//!
//! Resources owned by another bundle or by the host are declared with
//! [`SmTableBuilder::import`]. They receive placeholder identifiers in types
//! `0x40` and up, which never collide with local types, and appear only in the
//! symbol table. The patcher later replaces them by name.
//!
//! ## Example
//!
//! ```rust
//! use small::table::{SmResourceValue, SmTableBuilder};
//!
//! let mut builder = SmTableBuilder::new("app.main");
//! let accent = builder.import("color", "accent");
//! builder.value("color", "title", SmResourceValue::Reference(accent));
//! let table = builder.build().unwrap();
//! let symbols = builder.symbols();
//! ```

use std::collections::HashMap;

use crate::errors::{Result, SmError};
use crate::table::chunk::{
    encode_string_pool, push_u16, push_u32, push_u8, push_utf16_name, DEFAULT_CONFIG_SIZE,
    FLAG_COMPLEX, LIBRARY_ENTRY_SIZE, LIBRARY_HEADER_SIZE, MAP_ENTRY_SIZE,
    PACKAGE_HEADER_SIZE, PACKAGE_NAME_UNITS, RES_TABLE_LIBRARY_TYPE, RES_TABLE_PACKAGE_TYPE,
    RES_TABLE_TYPE, RES_TABLE_TYPE_SPEC_TYPE, RES_TABLE_TYPE_TYPE, SIMPLE_ENTRY_SIZE,
    TABLE_HEADER_SIZE, TYPE_ATTRIBUTE, TYPE_DIMENSION, TYPE_FLOAT, TYPE_FRACTION,
    TYPE_HEADER_BASE_SIZE, TYPE_INT_BOOLEAN, TYPE_INT_COLOR_ARGB8, TYPE_INT_DEC, TYPE_NULL,
    TYPE_REFERENCE, TYPE_SPEC_HEADER_SIZE, TYPE_STRING, VALUE_SIZE,
};
use crate::table::reader::SmResourceValue;
use crate::table::symbols::{SmSymbol, SmSymbolTable};
use crate::table::{SmResourceId, SmSlot, SM_PLACEHOLDER_SLOT};

const FIRST_IMPORT_TYPE: u8 = 0x40;

#[derive(Clone, Debug)]
enum PendingBody {
    Value(SmResourceValue),
    Bag {
        parent: SmResourceId,
        items: Vec<(SmResourceId, SmResourceValue)>,
    },
}

#[derive(Clone, Debug)]
struct PendingEntry {
    type_name: String,
    name: String,
    id: SmResourceId,
    body: PendingBody,
}

#[derive(Clone, Debug)]
pub struct SmTableBuilder {
    package_name: String,
    package_id: SmSlot,
    type_names: Vec<String>,
    entries: Vec<PendingEntry>,
    entry_index: HashMap<(String, String), usize>,
    import_types: Vec<String>,
    imports: Vec<(String, String, SmResourceId)>,
    libraries: Vec<String>,
    styleables: Vec<(String, Vec<SmResourceId>)>,
}

impl SmTableBuilder {
    pub fn new(package_name: impl Into<String>) -> Self {
        SmTableBuilder {
            package_name: package_name.into(),
            package_id: SM_PLACEHOLDER_SLOT,
            type_names: Vec::new(),
            entries: Vec::new(),
            entry_index: HashMap::new(),
            import_types: Vec::new(),
            imports: Vec::new(),
            libraries: Vec::new(),
            styleables: Vec::new(),
        }
    }

    /// Compile against another package id. Must be called before any entry is added.
    pub fn with_package_id(mut self, package_id: SmSlot) -> Self {
        self.package_id = package_id;
        self
    }

    pub fn package_id(&self) -> SmSlot {
        self.package_id
    }

    pub fn value(&mut self, type_name: &str, name: &str, value: SmResourceValue) -> SmResourceId {
        self.insert(type_name, name, PendingBody::Value(value))
    }

    pub fn bag(
        &mut self,
        type_name: &str,
        name: &str,
        parent: SmResourceId,
        items: Vec<(SmResourceId, SmResourceValue)>,
    ) -> SmResourceId {
        self.insert(type_name, name, PendingBody::Bag { parent, items })
    }

    /// Declare a resource defined elsewhere and return its placeholder identifier.
    pub fn import(&mut self, type_name: &str, name: &str) -> SmResourceId {
        if let Some((_, _, id)) = self
            .imports
            .iter()
            .find(|(t, n, _)| t == type_name && n == name)
        {
            return *id;
        }
        let type_slot = match self.import_types.iter().position(|t| t == type_name) {
            Some(at) => at,
            None => {
                self.import_types.push(type_name.to_string());
                self.import_types.len() - 1
            }
        };
        let entry = self.imports.iter().filter(|(t, _, _)| t == type_name).count();
        let id = SmResourceId::new(
            SM_PLACEHOLDER_SLOT,
            FIRST_IMPORT_TYPE.saturating_add(type_slot as u8),
            entry as u16,
        );
        self.imports.push((type_name.to_string(), name.to_string(), id));
        id
    }

    /// Record a shared-library reference to another bundle's package.
    pub fn library(&mut self, package_name: &str) {
        if !self.libraries.iter().any(|l| l == package_name) {
            self.libraries.push(package_name.to_string());
        }
    }

    /// Styleable array; index symbols are named `<styleable>_<attr>`.
    pub fn styleable(&mut self, name: &str, attrs: &[SmResourceId]) {
        self.styleables.push((name.to_string(), attrs.to_vec()));
    }

    fn insert(&mut self, type_name: &str, name: &str, body: PendingBody) -> SmResourceId {
        let key = (type_name.to_string(), name.to_string());
        if let Some(&at) = self.entry_index.get(&key) {
            self.entries[at].body = body;
            return self.entries[at].id;
        }

        let type_id = match self.type_names.iter().position(|t| t == type_name) {
            Some(at) => at + 1,
            None => {
                self.type_names.push(type_name.to_string());
                self.type_names.len()
            }
        };
        let entry = self.entries.iter().filter(|e| e.type_name == type_name).count();
        let id = SmResourceId::new(self.package_id, type_id as u8, entry as u16);

        self.entry_index.insert(key, self.entries.len());
        self.entries.push(PendingEntry {
            type_name: type_name.to_string(),
            name: name.to_string(),
            id,
            body,
        });
        id
    }

    fn name_of(&self, id: SmResourceId) -> Option<&str> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.name.as_str())
            .or_else(|| {
                self.imports
                    .iter()
                    .find(|(_, _, imported)| *imported == id)
                    .map(|(_, n, _)| n.as_str())
            })
    }

    /// Symbol table matching [`build`](Self::build): locals, imports, then styleables.
    pub fn symbols(&self) -> SmSymbolTable {
        let mut table = SmSymbolTable::new();
        for entry in &self.entries {
            table.push(SmSymbol::Id {
                type_name: entry.type_name.clone(),
                name: entry.name.clone(),
                id: entry.id,
            });
        }
        for (type_name, name, id) in &self.imports {
            table.push(SmSymbol::Id {
                type_name: type_name.clone(),
                name: name.clone(),
                id: *id,
            });
        }
        for (name, attrs) in &self.styleables {
            table.push(SmSymbol::Array {
                type_name: "styleable".to_string(),
                name: name.clone(),
                ids: attrs.clone(),
            });
            for (index, attr) in attrs.iter().enumerate() {
                let attr_name = self
                    .name_of(*attr)
                    .map(str::to_string)
                    .unwrap_or_else(|| index.to_string());
                table.push(SmSymbol::Index {
                    type_name: "styleable".to_string(),
                    name: format!("{}_{}", name, attr_name),
                    index: index as u32,
                });
            }
        }
        table
    }

    pub fn build(&self) -> Result<Vec<u8>> {
        if self.type_names.len() >= FIRST_IMPORT_TYPE as usize {
            return Err(SmError::validation(format!(
                "package '{}' declares {} resource types",
                self.package_name,
                self.type_names.len()
            )));
        }

        let mut strings = StringInterner::default();
        let mut keys = StringInterner::default();
        let mut encoded_types = Vec::new();

        for (i, type_name) in self.type_names.iter().enumerate() {
            let type_id = (i + 1) as u8;
            let members: Vec<&PendingEntry> =
                self.entries.iter().filter(|e| &e.type_name == type_name).collect();
            encoded_types.extend(encode_type_spec(type_id, members.len()));
            encoded_types.extend(encode_type(type_id, &members, &mut strings, &mut keys)?);
        }

        let type_pool = encode_string_pool(&self.type_names)?;
        let key_pool = encode_string_pool(&keys.strings)?;
        let library = self.encode_library();

        let package_size =
            PACKAGE_HEADER_SIZE + type_pool.len() + key_pool.len() + encoded_types.len() + library.len();
        let mut package = Vec::with_capacity(package_size);
        push_u16(&mut package, RES_TABLE_PACKAGE_TYPE);
        push_u16(&mut package, PACKAGE_HEADER_SIZE as u16);
        push_u32(&mut package, package_size as u32);
        push_u32(&mut package, self.package_id as u32);
        push_utf16_name(&mut package, &self.package_name, PACKAGE_NAME_UNITS);
        push_u32(&mut package, PACKAGE_HEADER_SIZE as u32);
        push_u32(&mut package, self.type_names.len() as u32);
        push_u32(&mut package, (PACKAGE_HEADER_SIZE + type_pool.len()) as u32);
        push_u32(&mut package, keys.strings.len() as u32);
        push_u32(&mut package, 0);
        package.extend_from_slice(&type_pool);
        package.extend_from_slice(&key_pool);
        package.extend_from_slice(&encoded_types);
        package.extend_from_slice(&library);

        let global_pool = encode_string_pool(&strings.strings)?;
        let table_size = TABLE_HEADER_SIZE + global_pool.len() + package.len();
        let mut table = Vec::with_capacity(table_size);
        push_u16(&mut table, RES_TABLE_TYPE);
        push_u16(&mut table, TABLE_HEADER_SIZE as u16);
        push_u32(&mut table, table_size as u32);
        push_u32(&mut table, 1);
        table.extend_from_slice(&global_pool);
        table.extend_from_slice(&package);
        Ok(table)
    }

    fn encode_library(&self) -> Vec<u8> {
        if self.libraries.is_empty() {
            return Vec::new();
        }
        let size = LIBRARY_HEADER_SIZE + self.libraries.len() * LIBRARY_ENTRY_SIZE;
        let mut out = Vec::with_capacity(size);
        push_u16(&mut out, RES_TABLE_LIBRARY_TYPE);
        push_u16(&mut out, LIBRARY_HEADER_SIZE as u16);
        push_u32(&mut out, size as u32);
        push_u32(&mut out, self.libraries.len() as u32);
        for name in &self.libraries {
            push_u32(&mut out, SM_PLACEHOLDER_SLOT as u32);
            push_utf16_name(&mut out, name, PACKAGE_NAME_UNITS);
        }
        out
    }
}

#[derive(Default)]
struct StringInterner {
    strings: Vec<String>,
    index: HashMap<String, u32>,
}

impl StringInterner {
    fn intern(&mut self, s: &str) -> u32 {
        if let Some(at) = self.index.get(s) {
            return *at;
        }
        let at = self.strings.len() as u32;
        self.strings.push(s.to_string());
        self.index.insert(s.to_string(), at);
        at
    }
}

fn encode_type_spec(type_id: u8, entry_count: usize) -> Vec<u8> {
    let size = TYPE_SPEC_HEADER_SIZE + entry_count * 4;
    let mut out = Vec::with_capacity(size);
    push_u16(&mut out, RES_TABLE_TYPE_SPEC_TYPE);
    push_u16(&mut out, TYPE_SPEC_HEADER_SIZE as u16);
    push_u32(&mut out, size as u32);
    push_u8(&mut out, type_id);
    push_u8(&mut out, 0);
    push_u16(&mut out, 0);
    push_u32(&mut out, entry_count as u32);
    for _ in 0..entry_count {
        push_u32(&mut out, 0);
    }
    out
}

fn encode_type(
    type_id: u8,
    members: &[&PendingEntry],
    strings: &mut StringInterner,
    keys: &mut StringInterner,
) -> Result<Vec<u8>> {
    let mut offsets = Vec::with_capacity(members.len());
    let mut data = Vec::new();
    for entry in members {
        offsets.push(data.len() as u32);
        let key = keys.intern(&entry.name);
        match &entry.body {
            PendingBody::Value(value) => {
                push_u16(&mut data, SIMPLE_ENTRY_SIZE as u16);
                push_u16(&mut data, 0);
                push_u32(&mut data, key);
                push_value(&mut data, value, strings);
            }
            PendingBody::Bag { parent, items } => {
                push_u16(&mut data, MAP_ENTRY_SIZE as u16);
                push_u16(&mut data, FLAG_COMPLEX);
                push_u32(&mut data, key);
                push_u32(&mut data, parent.0);
                push_u32(&mut data, items.len() as u32);
                for (name, value) in items {
                    push_u32(&mut data, name.0);
                    push_value(&mut data, value, strings);
                }
            }
        }
    }

    let header_size = TYPE_HEADER_BASE_SIZE + DEFAULT_CONFIG_SIZE;
    let entries_start = header_size + offsets.len() * 4;
    let size = entries_start + data.len();

    let mut out = Vec::with_capacity(size);
    push_u16(&mut out, RES_TABLE_TYPE_TYPE);
    push_u16(&mut out, header_size as u16);
    push_u32(&mut out, size as u32);
    push_u8(&mut out, type_id);
    push_u8(&mut out, 0);
    push_u16(&mut out, 0);
    push_u32(&mut out, offsets.len() as u32);
    push_u32(&mut out, entries_start as u32);
    push_u32(&mut out, DEFAULT_CONFIG_SIZE as u32);
    out.resize(header_size, 0);
    for offset in offsets {
        push_u32(&mut out, offset);
    }
    out.extend_from_slice(&data);
    if out.len() != size {
        return Err(SmError::internal(format!(
            "type {} encoded to {} bytes, expected {}",
            type_id,
            out.len(),
            size
        )));
    }
    Ok(out)
}

fn push_value(out: &mut Vec<u8>, value: &SmResourceValue, strings: &mut StringInterner) {
    let (data_type, data) = match value {
        SmResourceValue::Null => (TYPE_NULL, 0),
        SmResourceValue::Reference(id) => (TYPE_REFERENCE, id.0),
        SmResourceValue::Attribute(id) => (TYPE_ATTRIBUTE, id.0),
        SmResourceValue::String(s) => (TYPE_STRING, strings.intern(s)),
        SmResourceValue::Float(f) => (TYPE_FLOAT, f.to_bits()),
        SmResourceValue::Dimension(d) => (TYPE_DIMENSION, *d),
        SmResourceValue::Fraction(f) => (TYPE_FRACTION, *f),
        SmResourceValue::Int(i) => (TYPE_INT_DEC, *i as u32),
        SmResourceValue::Bool(b) => (TYPE_INT_BOOLEAN, if *b { 0xFFFF_FFFF } else { 0 }),
        SmResourceValue::Color(c) => (TYPE_INT_COLOR_ARGB8, *c),
        SmResourceValue::Raw { data_type, data } => (*data_type, *data),
    };
    push_u16(out, VALUE_SIZE as u16);
    push_u8(out, 0);
    push_u8(out, data_type);
    push_u32(out, data);
}

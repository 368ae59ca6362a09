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

//! Text symbol tables (`R.txt`).
//!
//! One symbol per line:
//!
//! ```text
//! int color primary 0x7f010000
//! int[] styleable Badge { 0x7f020000, 0x7f020001 }
//! int styleable Badge_label 1
//! ```
//!
//! Hexadecimal values are resource identifiers, decimal values are styleable
//! indices. Blank lines and `#` comments are ignored.

use std::collections::HashMap;
use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SmError};
use crate::table::SmResourceId;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SmSymbol {
    Id {
        type_name: String,
        name: String,
        id: SmResourceId,
    },
    /// Position of an attribute inside a styleable array.
    Index {
        type_name: String,
        name: String,
        index: u32,
    },
    Array {
        type_name: String,
        name: String,
        ids: Vec<SmResourceId>,
    },
}

impl SmSymbol {
    pub fn type_name(&self) -> &str {
        match self {
            SmSymbol::Id { type_name, .. }
            | SmSymbol::Index { type_name, .. }
            | SmSymbol::Array { type_name, .. } => type_name,
        }
    }

    pub fn name(&self) -> &str {
        match self {
            SmSymbol::Id { name, .. } | SmSymbol::Index { name, .. } | SmSymbol::Array { name, .. } => name,
        }
    }

    fn key(&self) -> (String, String) {
        (self.type_name().to_string(), self.name().to_string())
    }
}

/// Ordered symbol table with lookup by `(type, name)`.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SmSymbolTable {
    symbols: Vec<SmSymbol>,
    index: HashMap<(String, String), usize>,
}

impl SmSymbolTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut table = SmSymbolTable::new();
        for (number, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let symbol = parse_line(line).map_err(|message| {
                SmError::malformed(format!("R.txt line {}: {}", number + 1, message))
            })?;
            table.push(symbol);
        }
        Ok(table)
    }

    /// Insert a symbol, replacing any earlier one with the same type and name.
    pub fn push(&mut self, symbol: SmSymbol) {
        let key = symbol.key();
        match self.index.get(&key) {
            Some(&at) => self.symbols[at] = symbol,
            None => {
                self.index.insert(key, self.symbols.len());
                self.symbols.push(symbol);
            }
        }
    }

    pub fn lookup(&self, type_name: &str, name: &str) -> Option<&SmSymbol> {
        self.index
            .get(&(type_name.to_string(), name.to_string()))
            .map(|at| &self.symbols[*at])
    }

    /// Identifier of an `int` symbol.
    pub fn id_of(&self, type_name: &str, name: &str) -> Option<SmResourceId> {
        match self.lookup(type_name, name) {
            Some(SmSymbol::Id { id, .. }) => Some(*id),
            _ => None,
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &SmSymbol> {
        self.symbols.iter()
    }

    pub fn len(&self) -> usize {
        self.symbols.len()
    }

    pub fn is_empty(&self) -> bool {
        self.symbols.is_empty()
    }

    pub fn to_text(&self) -> String {
        let mut out = String::new();
        for symbol in &self.symbols {
            // Writing into a String cannot fail.
            let _ = match symbol {
                SmSymbol::Id { type_name, name, id } => writeln!(out, "int {} {} {}", type_name, name, id),
                SmSymbol::Index { type_name, name, index } => {
                    writeln!(out, "int {} {} {}", type_name, name, index)
                }
                SmSymbol::Array { type_name, name, ids } => {
                    let joined = ids.iter().map(|id| id.to_string()).collect::<Vec<_>>().join(", ");
                    if joined.is_empty() {
                        writeln!(out, "int[] {} {} {{ }}", type_name, name)
                    } else {
                        writeln!(out, "int[] {} {} {{ {} }}", type_name, name, joined)
                    }
                }
            };
        }
        out
    }
}

fn parse_line(line: &str) -> std::result::Result<SmSymbol, String> {
    let mut parts = line.split_whitespace();
    let kind = parts.next().ok_or("missing symbol kind")?;
    let type_name = parts.next().ok_or("missing resource type")?.to_string();
    let name = parts.next().ok_or("missing symbol name")?.to_string();
    let value = parts.collect::<Vec<_>>().join(" ");
    if value.is_empty() {
        return Err("missing symbol value".to_string());
    }
    let value = value.as_str();

    match kind {
        "int" => {
            if let Some(hex) = value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
                let id = u32::from_str_radix(hex, 16).map_err(|e| format!("bad id '{}': {}", value, e))?;
                Ok(SmSymbol::Id {
                    type_name,
                    name,
                    id: SmResourceId(id),
                })
            } else {
                let index = value
                    .parse::<u32>()
                    .map_err(|e| format!("bad index '{}': {}", value, e))?;
                Ok(SmSymbol::Index { type_name, name, index })
            }
        }
        "int[]" => {
            let inner = value
                .strip_prefix('{')
                .and_then(|v| v.strip_suffix('}'))
                .ok_or_else(|| format!("array '{}' is not brace-delimited", value))?;
            let ids = inner
                .split(',')
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .map(|v| {
                    let hex = v
                        .strip_prefix("0x")
                        .or_else(|| v.strip_prefix("0X"))
                        .ok_or_else(|| format!("array element '{}' is not hexadecimal", v))?;
                    u32::from_str_radix(hex, 16)
                        .map(SmResourceId)
                        .map_err(|e| format!("bad array element '{}': {}", v, e))
                })
                .collect::<std::result::Result<Vec<_>, String>>()?;
            Ok(SmSymbol::Array { type_name, name, ids })
        }
        other => Err(format!("unknown symbol kind '{}'", other)),
    }
}

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

//! # Namespace Patcher
//!
//! Rewrites a bundle compiled against the placeholder slot `0x7F` so that it
//! lives in its allocated slot. Only identifier words change: the package id,
//! reference-typed values, bag parents, bag attribute keys and value
//! references, shared-library package ids, and the `int` / `int[]` lines of
//! the symbol table. Every other byte is copied as-is.
//!
//! Placeholder identifiers are assigned an owner by name:
//!
//! 1. names defined by the bundle itself map to its own slot;
//! 2. otherwise the first dependency exporting the name wins, direct
//!    dependencies in declared order before transitive ones;
//! 3. otherwise the host symbol table.
//!
//! Anything left over fails with `UnresolvedDependency`. Patching an already
//! patched table (package id equal to the target slot) returns it unchanged.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SmError};
use crate::table::chunk::write_u32;
use crate::table::reader::{parse_layout, SmEntryBody, SmTableLayout};
use crate::table::symbols::{SmSymbol, SmSymbolTable};
use crate::table::{SmResourceId, SmSlot, SM_HOST_SLOT, SM_PLACEHOLDER_SLOT, SM_PLATFORM_SLOT};

/// Exported view of one dependency: its slot and its patched symbol table.
#[derive(Clone, Debug)]
pub struct SmDependencyExports {
    pub name: String,
    pub slot: Option<SmSlot>,
    pub symbols: Option<Arc<SmSymbolTable>>,
}

impl SmDependencyExports {
    pub fn new(name: impl Into<String>, slot: SmSlot, symbols: Arc<SmSymbolTable>) -> Self {
        SmDependencyExports {
            name: name.into(),
            slot: Some(slot),
            symbols: Some(symbols),
        }
    }

    /// A dependency that is registered but has not been allocated or patched yet.
    pub fn pending(name: impl Into<String>) -> Self {
        SmDependencyExports {
            name: name.into(),
            slot: None,
            symbols: None,
        }
    }
}

pub struct SmPatchRequest<'a> {
    pub bundle: &'a str,
    pub slot: SmSlot,
    pub table: &'a [u8],
    pub symbols: &'a SmSymbolTable,
    /// Direct dependencies in declared order, then transitive ones.
    pub dependencies: &'a [SmDependencyExports],
    pub host: Option<&'a SmSymbolTable>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmPatchStats {
    pub local_rewrites: usize,
    pub dependency_rewrites: usize,
    pub host_references: usize,
    pub already_patched: bool,
}

#[derive(Clone, Debug)]
pub struct SmPatchedTable {
    pub table: Vec<u8>,
    pub symbols: SmSymbolTable,
    pub stats: SmPatchStats,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Owner {
    Local,
    Dependency,
    Host,
}

struct Rewriter<'a> {
    bundle: &'a str,
    slot: SmSlot,
    remap: HashMap<u32, (u32, Owner)>,
    local: HashSet<(u8, u16)>,
    stats: SmPatchStats,
}

impl<'a> Rewriter<'a> {
    fn rewrite(&mut self, raw: u32) -> Result<u32> {
        let id = SmResourceId(raw);
        if id.is_null() || id.slot() != SM_PLACEHOLDER_SLOT {
            return Ok(raw);
        }
        if let Some((target, owner)) = self.remap.get(&raw).copied() {
            self.count(owner);
            return Ok(target);
        }
        if self.local.contains(&(id.type_id(), id.entry())) {
            self.count(Owner::Local);
            return Ok(id.with_slot(self.slot).0);
        }
        Err(SmError::unresolved(self.bundle, id.to_string()))
    }

    fn count(&mut self, owner: Owner) {
        match owner {
            Owner::Local => self.stats.local_rewrites += 1,
            Owner::Dependency => self.stats.dependency_rewrites += 1,
            Owner::Host => self.stats.host_references += 1,
        }
    }
}

pub struct SmTablePatcher;

impl SmTablePatcher {
    pub fn patch(request: &SmPatchRequest<'_>) -> Result<SmPatchedTable> {
        let layout = parse_layout(request.table)?;

        if request.slot == 0 || request.slot == SM_PLATFORM_SLOT || request.slot == SM_HOST_SLOT {
            return Err(SmError::validation(format!(
                "slot 0x{:02x} cannot be assigned to bundle '{}'",
                request.slot, request.bundle
            )));
        }
        for dep in request.dependencies {
            if dep.slot.is_none() || dep.symbols.is_none() {
                return Err(SmError::unresolved(request.bundle, dep.name.clone()));
            }
        }

        if layout.package_id == request.slot as u32 {
            log::debug!(
                "small.table.already_patched: patch skipped - bundle={}, slot=0x{:02x}",
                request.bundle,
                request.slot
            );
            return Ok(SmPatchedTable {
                table: request.table.to_vec(),
                symbols: request.symbols.clone(),
                stats: SmPatchStats {
                    already_patched: true,
                    ..SmPatchStats::default()
                },
            });
        }
        if layout.package_id != SM_PLACEHOLDER_SLOT as u32 {
            return Err(SmError::malformed(format!(
                "bundle '{}' package id 0x{:02x} is neither the placeholder nor slot 0x{:02x}",
                request.bundle, layout.package_id, request.slot
            )));
        }

        let mut rewriter = Rewriter {
            bundle: request.bundle,
            slot: request.slot,
            remap: build_remap(request, &layout)?,
            local: layout
                .types
                .iter()
                .flat_map(|t| t.entries.iter().map(move |e| (t.type_id, e.index)))
                .collect(),
            stats: SmPatchStats::default(),
        };

        let mut out = request.table.to_vec();
        write_u32(&mut out, layout.package_id_offset, request.slot as u32)?;

        for ty in &layout.types {
            for entry in &ty.entries {
                match &entry.body {
                    SmEntryBody::Simple(value) => {
                        if value.is_reference() {
                            let patched = rewriter.rewrite(value.data)?;
                            write_u32(&mut out, value.data_offset, patched)?;
                        }
                    }
                    SmEntryBody::Complex {
                        parent_offset,
                        parent,
                        items,
                    } => {
                        let patched = rewriter.rewrite(*parent)?;
                        write_u32(&mut out, *parent_offset, patched)?;
                        for item in items {
                            let name = rewriter.rewrite(item.name)?;
                            write_u32(&mut out, item.name_offset, name)?;
                            if item.value.is_reference() {
                                let patched = rewriter.rewrite(item.value.data)?;
                                write_u32(&mut out, item.value.data_offset, patched)?;
                            }
                        }
                    }
                }
            }
        }

        for library in &layout.libraries {
            let slot = request
                .dependencies
                .iter()
                .find(|d| d.name == library.name)
                .and_then(|d| d.slot)
                .ok_or_else(|| SmError::unresolved(request.bundle, library.name.clone()))?;
            write_u32(&mut out, library.package_id_offset, slot as u32)?;
        }

        let stats = rewriter.stats;
        let mut symbols = SmSymbolTable::new();
        for symbol in request.symbols.iter() {
            symbols.push(match symbol {
                SmSymbol::Id { type_name, name, id } => SmSymbol::Id {
                    type_name: type_name.clone(),
                    name: name.clone(),
                    id: SmResourceId(rewriter.rewrite(id.0)?),
                },
                SmSymbol::Array { type_name, name, ids } => SmSymbol::Array {
                    type_name: type_name.clone(),
                    name: name.clone(),
                    ids: ids
                        .iter()
                        .map(|id| rewriter.rewrite(id.0).map(SmResourceId))
                        .collect::<Result<Vec<_>>>()?,
                },
                index @ SmSymbol::Index { .. } => index.clone(),
            });
        }

        log::debug!(
            "small.table.patched: identifiers rewritten - bundle={}, slot=0x{:02x}, local={}, dependency={}, host={}",
            request.bundle,
            request.slot,
            stats.local_rewrites,
            stats.dependency_rewrites,
            stats.host_references
        );

        Ok(SmPatchedTable {
            table: out,
            symbols,
            stats,
        })
    }
}

/// Map every placeholder identifier named in the symbol table to its final owner.
fn build_remap(request: &SmPatchRequest<'_>, layout: &SmTableLayout) -> Result<HashMap<u32, (u32, Owner)>> {
    let mut local_names = HashMap::new();
    for ty in &layout.types {
        let type_name = match layout.type_name(ty.type_id) {
            Some(name) => name,
            None => continue,
        };
        for entry in &ty.entries {
            if let Some(key) = layout.key_name(entry.key) {
                local_names.insert(
                    (type_name, key),
                    SmResourceId::new(request.slot, ty.type_id, entry.index),
                );
            }
        }
    }

    let mut remap = HashMap::new();
    for symbol in request.symbols.iter() {
        let (type_name, name, id) = match symbol {
            SmSymbol::Id { type_name, name, id } => (type_name.as_str(), name.as_str(), *id),
            _ => continue,
        };
        if id.is_null() || id.slot() != SM_PLACEHOLDER_SLOT {
            continue;
        }

        let target = if let Some(local) = local_names.get(&(type_name, name)) {
            (local.0, Owner::Local)
        } else if let Some(exported) = request
            .dependencies
            .iter()
            .find_map(|d| d.symbols.as_ref().and_then(|s| s.id_of(type_name, name)))
        {
            (exported.0, Owner::Dependency)
        } else if let Some(hosted) = request.host.and_then(|h| h.id_of(type_name, name)) {
            (hosted.0, Owner::Host)
        } else {
            return Err(SmError::unresolved(
                request.bundle,
                format!("{}/{}", type_name, name),
            ));
        };

        if let Some(previous) = remap.insert(id.0, target) {
            if previous.0 != target.0 {
                return Err(SmError::malformed(format!(
                    "bundle '{}' symbol {} is bound to both 0x{:08x} and 0x{:08x}",
                    request.bundle, id, previous.0, target.0
                )));
            }
        }
    }
    Ok(remap)
}

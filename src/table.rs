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

//! # Compiled Resource Tables
//!
//! Every bundle ships a compiled resource table laid out as little-endian
//! chunks (`TABLE`, `STRING_POOL`, `PACKAGE`, `TYPE_SPEC`, `TYPE`,
//! `LIBRARY`) together with a text symbol table (`R.txt`). Bundles are
//! compiled against the placeholder slot `0x7F`; the patcher rewrites them to
//! their allocated namespace slot before they are installed.
//!
//! - **builder**: produces compiled tables and matching symbol tables
//! - **reader**: read-only, typed view used by the loader and resolvers
//! - **patcher**: in-place namespace rewriting
//! - **symbols**: `R.txt` parsing and rendering

use std::fmt;

use serde::{Deserialize, Serialize};

pub mod builder;
pub(crate) mod chunk;
pub mod patcher;
pub mod reader;
pub mod symbols;

pub use builder::SmTableBuilder;
pub use patcher::{SmDependencyExports, SmPatchRequest, SmPatchStats, SmPatchedTable, SmTablePatcher};
pub use reader::{SmResourceBody, SmResourceEntry, SmResourceTable, SmResourceValue};
pub use symbols::{SmSymbol, SmSymbolTable};

/// High-order identifier byte distinguishing one bundle's resources from another's.
pub type SmSlot = u8;

/// Slot owned by the platform's own resources. Never allocated, never patched.
pub const SM_PLATFORM_SLOT: SmSlot = 0x01;

/// Slot owned by the host application.
pub const SM_HOST_SLOT: SmSlot = 0x7F;

/// Slot every bundle is compiled against before patching.
pub const SM_PLACEHOLDER_SLOT: SmSlot = 0x7F;

/// Resource identifier encoded as `slot << 24 | type << 16 | entry`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SmResourceId(pub u32);

impl SmResourceId {
    pub fn new(slot: SmSlot, type_id: u8, entry: u16) -> Self {
        SmResourceId(((slot as u32) << 24) | ((type_id as u32) << 16) | entry as u32)
    }

    pub fn slot(self) -> SmSlot {
        (self.0 >> 24) as SmSlot
    }

    pub fn type_id(self) -> u8 {
        ((self.0 >> 16) & 0xFF) as u8
    }

    pub fn entry(self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }

    /// Same type and entry index under another namespace slot.
    pub fn with_slot(self, slot: SmSlot) -> Self {
        SmResourceId((self.0 & 0x00FF_FFFF) | ((slot as u32) << 24))
    }

    pub fn is_null(self) -> bool {
        self.0 == 0
    }
}

impl fmt::Display for SmResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl From<u32> for SmResourceId {
    fn from(raw: u32) -> Self {
        SmResourceId(raw)
    }
}

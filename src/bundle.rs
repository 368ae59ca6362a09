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

//! # Bundles
//!
//! - **manifest**: `bundle.json` registration metadata
//! - **package**: reading a bundle from a directory or `.zip` archive
//! - **registry**: the set of known bundles and their dependency graph

use std::sync::Arc;

pub mod manifest;
pub mod package;
pub mod registry;

pub use manifest::{SmBundleManifest, SmBundleRole};
pub use package::{read_bundle_package, SmBundlePackage};
pub use registry::{SmBundle, SmBundleHandle, SmBundleRegistry};

use crate::code::SmCodeArtifact;
use crate::table::{SmPatchStats, SmSymbolTable};

/// Build outputs of a bundle, compiled against the placeholder slot.
#[derive(Clone, Debug, Default)]
pub struct SmBundleArtifacts {
    pub table: Vec<u8>,
    pub symbols: SmSymbolTable,
    pub code: SmCodeArtifact,
}

impl SmBundleArtifacts {
    pub fn new(table: Vec<u8>, symbols: SmSymbolTable, code: SmCodeArtifact) -> Self {
        SmBundleArtifacts { table, symbols, code }
    }
}

/// Artifacts after namespace patching; what the loader attaches.
#[derive(Clone, Debug)]
pub struct SmPatchedArtifacts {
    pub table: Arc<Vec<u8>>,
    /// Final symbol table, exported to dependents.
    pub symbols: Arc<SmSymbolTable>,
    pub code: SmCodeArtifact,
    pub stats: SmPatchStats,
}

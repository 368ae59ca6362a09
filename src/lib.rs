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

//! # Small Core Library
//!
//! Small loads independently built bundles (code plus a compiled resource
//! table) into one host process. Every bundle is compiled against the shared
//! placeholder namespace `0x7F`; at install time it receives a unique slot and
//! its table is rewritten so that resource identifiers of different bundles
//! never collide.
//!
//! ## Module Overview
//!
//! - **allocator**: persistent, stable assignment of namespace slots
//! - **table**: compiled resource tables, `R.txt` symbol tables and the patcher
//! - **dag**: acyclic dependency graph between bundles
//! - **bundle**: manifests, packages and the bundle registry
//! - **code**: class tables, routable units and native bundle code
//! - **host**: the host application's own code and resources
//! - **loader**: at-most-once, dependency-first bundle loading
//! - **resolver**: class and resource resolution chains
//! - **router**: launch URIs and the stub shell pool
//! - **runtime**: the facade tying everything together
//! - **config**: runtime configuration
//!
//! ## Feature Flags
//!
//! - `parallel`: preloads independent bundles with Rayon (default)
//!
//! ## Quick Start
//!
//! ```rust
//! use small::{SmBundleManifest, SmHost, SmRuntime, SmRuntimeConfigBuilder};
//!
//! let config = SmRuntimeConfigBuilder::new().state_path("slots.json").build()?;
//! let runtime = SmRuntime::new(config, SmHost::empty())?;
//!
//! runtime.install_package("bundles/lib.utils")?;
//! runtime.install_package("bundles/app.main")?;
//!
//! let plan = runtime.dispatch("app://app.main/MainUnit?from=Home")?;
//! let unit = plan.launch()?;
//! ```
//!
//! ## Error Handling
//!
//! All operations return `Result<T, SmError>`. Failures are reported to the
//! caller and leave no partially installed or partially loaded bundle behind.

pub mod allocator;
pub mod bundle;
pub mod code;
pub mod config;
pub mod dag;
pub mod errors;
pub mod host;
pub mod loader;
pub mod resolver;
pub mod router;
pub mod runtime;
pub mod table;

pub use errors::{Result, SmError};

pub use allocator::{SmSlotAllocator, SmSlotPool};
pub use bundle::{
    read_bundle_package, SmBundle, SmBundleArtifacts, SmBundleHandle, SmBundleManifest,
    SmBundlePackage, SmBundleRegistry, SmBundleRole, SmPatchedArtifacts,
};
pub use code::{
    SmCodeArtifact, SmCodeEntry, SmCodeHandle, SmCodeOwner, SmCodeSource, SmCodeTable,
    SmNativeCode, SmRoutableUnit, SmUnitFactory,
};
pub use config::{SmRuntimeConfig, SmRuntimeConfigBuilder};
pub use dag::SmDependencyGraph;
pub use host::SmHost;
pub use loader::{SmBundleLoader, SmLoadState, SmResidentBundle};
pub use resolver::{SmResolutionChain, SmResolvedResource};
pub use router::{
    SmLaunchContext, SmLaunchPlan, SmLaunchRequest, SmShellDecl, SmShellKind, SmShellLease,
    SmShellOccupant, SmStubRouter,
};
pub use runtime::{SmInstallReport, SmRuntime};
pub use table::{
    SmDependencyExports, SmPatchRequest, SmPatchStats, SmPatchedTable, SmResourceBody,
    SmResourceEntry, SmResourceId, SmResourceTable, SmResourceValue, SmSlot, SmSymbol,
    SmSymbolTable, SmTableBuilder, SmTablePatcher, SM_HOST_SLOT, SM_PLACEHOLDER_SLOT,
    SM_PLATFORM_SLOT,
};

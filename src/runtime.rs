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

//! # Small Runtime
//!
//! One explicit runtime instance owns the allocator, registry, loader,
//! resolution chain and shell router.
//!
//! Installing a bundle registers it, assigns its namespace slot and patches
//! its resource table against the final exports of its dependencies. A
//! dependency must therefore be installed before its dependents;
//! [`SmRuntime::install_all`] takes care of the order for a batch.
//!
//! ## Usage
//!
//! ```rust
//! use small::{SmHost, SmRuntime, SmRuntimeConfigBuilder};
//!
//! let config = SmRuntimeConfigBuilder::new().state_path("/var/lib/app/slots.json").build()?;
//! let runtime = SmRuntime::new(config, SmHost::empty())?;
//! runtime.install_package("/opt/bundles/lib.utils.zip")?;
//! runtime.install_package("/opt/bundles/app.main")?;
//! let plan = runtime.dispatch("app://app.main/MainUnit?from=Home")?;
//! let unit = plan.launch()?;
//! ```

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::allocator::SmSlotAllocator;
use crate::bundle::{
    read_bundle_package, SmBundleArtifacts, SmBundleHandle, SmBundleManifest, SmBundleRegistry,
    SmPatchedArtifacts,
};
use crate::code::{SmCodeEntry, SmCodeHandle};
use crate::config::SmRuntimeConfig;
use crate::errors::{Result, SmError};
use crate::host::SmHost;
use crate::loader::{SmBundleLoader, SmResidentBundle};
use crate::resolver::{SmResolutionChain, SmResolvedResource};
use crate::router::{
    SmLaunchContext, SmLaunchPlan, SmLaunchRequest, SmShellOccupant, SmStubRouter,
};
use crate::table::{
    SmDependencyExports, SmPatchRequest, SmResourceId, SmResourceValue, SmTablePatcher,
};

/// Outcome of a batch install.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct SmInstallReport {
    /// Installed bundles, dependencies first.
    pub installed: Vec<String>,
    pub failed: Vec<(String, SmError)>,
}

impl SmInstallReport {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }
}

pub struct SmRuntime {
    config: SmRuntimeConfig,
    allocator: SmSlotAllocator,
    registry: Arc<SmBundleRegistry>,
    loader: SmBundleLoader,
    chain: SmResolutionChain,
    router: SmStubRouter,
    install_lock: Mutex<()>,
}

impl SmRuntime {
    pub fn new(config: SmRuntimeConfig, host: SmHost) -> Result<Self> {
        config.validate()?;
        let allocator = SmSlotAllocator::open(&config.state_path, config.slot_pool())?;
        let registry = Arc::new(SmBundleRegistry::new());
        let router = SmStubRouter::new(config.shells.clone())?;

        log::info!(
            "small.runtime.start: runtime ready - state={}, scheme={}, shells={}",
            config.state_path.display(),
            config.scheme,
            config.shells.len()
        );

        Ok(SmRuntime {
            loader: SmBundleLoader::new(registry.clone()),
            chain: SmResolutionChain::new(registry.clone(), host),
            allocator,
            registry,
            router,
            config,
            install_lock: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &SmRuntimeConfig {
        &self.config
    }

    pub fn allocator(&self) -> &SmSlotAllocator {
        &self.allocator
    }

    pub fn registry(&self) -> &Arc<SmBundleRegistry> {
        &self.registry
    }

    pub fn chain(&self) -> &SmResolutionChain {
        &self.chain
    }

    pub fn router(&self) -> &SmStubRouter {
        &self.router
    }

    /// Register, allocate and patch one bundle. Its dependencies must already
    /// be installed. On failure the registration is rolled back.
    pub fn install(&self, manifest: SmBundleManifest, artifacts: SmBundleArtifacts) -> Result<SmBundleHandle> {
        let _guard = self
            .install_lock
            .lock()
            .map_err(|_| SmError::internal("install lock poisoned"))?;

        let handle = self.registry.register_manifest(manifest)?;
        match self.complete_install(&handle, artifacts) {
            Ok(()) => Ok(handle),
            Err(err) => {
                self.registry.remove(handle.name());
                Err(err)
            }
        }
    }

    /// Install a batch in dependency order. Bundles may reference each other
    /// regardless of their position in `bundles`.
    pub fn install_all(&self, bundles: Vec<(SmBundleManifest, SmBundleArtifacts)>) -> Result<SmInstallReport> {
        let _guard = self
            .install_lock
            .lock()
            .map_err(|_| SmError::internal("install lock poisoned"))?;

        let mut report = SmInstallReport::default();
        let mut pending = Vec::new();
        for (manifest, artifacts) in bundles {
            let name = manifest.name.clone();
            match self.registry.register_manifest(manifest) {
                Ok(handle) => pending.push((handle, artifacts)),
                Err(err) => report.failed.push((name, err)),
            }
        }

        let batch: HashSet<String> = pending.iter().map(|(h, _)| h.name().to_string()).collect();
        let order = match self.registry.topological_order() {
            Ok(order) => order,
            Err(err) => {
                for (handle, _) in &pending {
                    self.registry.remove(handle.name());
                }
                return Err(err);
            }
        };

        for name in order.into_iter().filter(|n| batch.contains(n)) {
            let position = match pending.iter().position(|(h, _)| h.name() == name) {
                Some(position) => position,
                None => continue,
            };
            let (handle, artifacts) = pending.swap_remove(position);
            match self.complete_install(&handle, artifacts) {
                Ok(()) => report.installed.push(name),
                Err(err) => {
                    self.registry.remove(&name);
                    report.failed.push((name, err));
                }
            }
        }

        log::info!(
            "small.bundle.install_batch: batch installed - installed={}, failed={}",
            report.installed.len(),
            report.failed.len()
        );
        Ok(report)
    }

    /// Install a bundle package (directory or `.zip`).
    pub fn install_package(&self, path: impl AsRef<Path>) -> Result<SmBundleHandle> {
        let package = read_bundle_package(path, self.config.code_cache_dir.as_deref())?;
        self.install(package.manifest, package.artifacts)
    }

    fn complete_install(&self, handle: &SmBundleHandle, artifacts: SmBundleArtifacts) -> Result<()> {
        let slot = self.allocator.allocate(handle.name())?;
        handle.assign_slot(slot)?;

        let dependencies = self.dependency_exports(handle)?;
        let patched = SmTablePatcher::patch(&SmPatchRequest {
            bundle: handle.name(),
            slot,
            table: &artifacts.table,
            symbols: &artifacts.symbols,
            dependencies: &dependencies,
            host: Some(self.chain.host().symbols()),
        })?;

        log::info!(
            "small.bundle.install: bundle installed - name={}, slot=0x{:02x}, local_rewrites={}, dependency_rewrites={}, host_references={}",
            handle.name(),
            slot,
            patched.stats.local_rewrites,
            patched.stats.dependency_rewrites,
            patched.stats.host_references
        );

        handle.set_artifacts(SmPatchedArtifacts {
            table: Arc::new(patched.table),
            symbols: Arc::new(patched.symbols),
            code: artifacts.code,
            stats: patched.stats,
        })
    }

    /// Direct dependencies in declared order, then the rest of the closure.
    fn dependency_exports(&self, handle: &SmBundleHandle) -> Result<Vec<SmDependencyExports>> {
        let mut names: Vec<String> = handle.dependencies().to_vec();
        for transitive in self.registry.closure_order(handle.name())? {
            if !names.contains(&transitive) {
                names.push(transitive);
            }
        }
        Ok(names
            .into_iter()
            .map(|name| match self.registry.resolve(&name) {
                Ok(dep) => dep.exports(),
                Err(_) => SmDependencyExports::pending(name),
            })
            .collect())
    }

    /// Slot and final symbols of an installed bundle.
    pub fn exports_of(&self, name: &str) -> Result<SmDependencyExports> {
        Ok(self.registry.resolve(name)?.exports())
    }

    pub fn ensure_loaded(&self, name: &str) -> Result<Arc<SmResidentBundle>> {
        self.loader.ensure_loaded(name)
    }

    pub fn preload(&self, names: &[String]) -> Vec<Result<Arc<SmResidentBundle>>> {
        self.loader.preload(names)
    }

    /// Load every registered bundle, one dependency level at a time.
    pub fn preload_all(&self) -> Result<Vec<(String, Result<Arc<SmResidentBundle>>)>> {
        let mut outcomes = Vec::new();
        for level in self.registry.levels()? {
            let results = self.loader.preload(&level);
            outcomes.extend(level.into_iter().zip(results));
        }
        Ok(outcomes)
    }

    pub fn resolve_class(&self, bundle: &str, class: &str) -> Result<SmCodeHandle> {
        self.chain.resolve_class(bundle, class)
    }

    pub fn resolve_resource(&self, bundle: &str, type_name: &str, name: &str) -> Result<SmResolvedResource> {
        self.chain.resolve_resource(bundle, type_name, name)
    }

    pub fn resolve_resource_id(&self, id: SmResourceId) -> Result<SmResolvedResource> {
        self.chain.resolve_resource_id(id)
    }

    pub fn resolve_value(&self, id: SmResourceId) -> Result<SmResourceValue> {
        self.chain.resolve_value(id)
    }

    /// Turn a launch URI into a plan: target bundle loaded, unit class
    /// resolved and a stub shell reserved.
    pub fn dispatch(&self, uri: &str) -> Result<SmLaunchPlan> {
        let request = SmLaunchRequest::parse(uri, &self.config.scheme)?;
        let bundle = self.registry.resolve_alias(&request.host)?;
        self.loader.ensure_loaded(bundle.name())?;

        let manifest = bundle.manifest();
        let unit = match &request.path {
            Some(path) => manifest.unit_for_path(path).to_string(),
            None => manifest
                .default_unit
                .clone()
                .unwrap_or_else(|| self.config.default_unit.clone()),
        };

        let unknown_unit = || SmError::UnknownUnit {
            bundle: bundle.name().to_string(),
            unit: unit.clone(),
        };
        let class = match self.chain.resolve_class(bundle.name(), &unit) {
            Ok(class) => class,
            Err(SmError::ClassNotFound { .. }) => return Err(unknown_unit()),
            Err(err) => return Err(err),
        };
        let shell_kind = match &class.entry {
            SmCodeEntry::Unit { shell_kind, .. } => *shell_kind,
            SmCodeEntry::Class => return Err(unknown_unit()),
        };

        let lease = self.router.acquire(
            shell_kind,
            SmShellOccupant {
                bundle: bundle.name().to_string(),
                unit: unit.clone(),
            },
        )?;

        log::info!(
            "small.router.dispatch: launch planned - uri={}, bundle={}, unit={}, shell={}",
            uri,
            bundle.name(),
            unit,
            lease.shell_id
        );

        Ok(SmLaunchPlan {
            context: SmLaunchContext {
                bundle: bundle.name().to_string(),
                unit,
                shell_id: lease.shell_id.clone(),
                shell_kind,
                params: request.query,
            },
            class,
            lease,
        })
    }

    pub fn release_shell(&self, shell_id: &str) -> Result<Option<SmShellOccupant>> {
        self.router.release(shell_id)
    }
}

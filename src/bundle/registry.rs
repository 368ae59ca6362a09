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

//! # Bundle Registry
//!
//! Owns every registered bundle and the dependency graph between them. The
//! graph is acyclic at all times: a registration that would close a cycle is
//! rejected before anything is inserted.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Condvar, Mutex, OnceLock, RwLock};

use crate::bundle::manifest::{validate_bundle_name, SmBundleManifest, SmBundleRole};
use crate::bundle::SmPatchedArtifacts;
use crate::dag::SmDependencyGraph;
use crate::errors::{Result, SmError};
use crate::loader::{SmLoadState, SmResidentBundle};
use crate::table::{SmDependencyExports, SmSlot};

pub type SmBundleHandle = Arc<SmBundle>;

/// One registered bundle. Slot, patched artifacts and resident handles are
/// each set exactly once.
#[derive(Debug)]
pub struct SmBundle {
    manifest: SmBundleManifest,
    slot: OnceLock<SmSlot>,
    artifacts: OnceLock<SmPatchedArtifacts>,
    pub(crate) state: Mutex<SmLoadState>,
    pub(crate) state_changed: Condvar,
    pub(crate) load_transitions: AtomicUsize,
    pub(crate) resident: OnceLock<Arc<SmResidentBundle>>,
}

impl SmBundle {
    fn new(manifest: SmBundleManifest) -> Self {
        SmBundle {
            manifest,
            slot: OnceLock::new(),
            artifacts: OnceLock::new(),
            state: Mutex::new(SmLoadState::Registered),
            state_changed: Condvar::new(),
            load_transitions: AtomicUsize::new(0),
            resident: OnceLock::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.manifest.name
    }

    pub fn role(&self) -> SmBundleRole {
        self.manifest.role
    }

    pub fn dependencies(&self) -> &[String] {
        &self.manifest.dependencies
    }

    pub fn manifest(&self) -> &SmBundleManifest {
        &self.manifest
    }

    pub fn slot(&self) -> Option<SmSlot> {
        self.slot.get().copied()
    }

    /// Record the allocated slot. Re-assigning the same slot is a no-op.
    pub fn assign_slot(&self, slot: SmSlot) -> Result<()> {
        let current = *self.slot.get_or_init(|| slot);
        if current != slot {
            return Err(SmError::internal(format!(
                "bundle '{}' already owns slot 0x{:02x}, refusing 0x{:02x}",
                self.name(),
                current,
                slot
            )));
        }
        Ok(())
    }

    pub fn artifacts(&self) -> Option<&SmPatchedArtifacts> {
        self.artifacts.get()
    }

    /// Slot assigned and patched artifacts stored.
    pub fn is_installed(&self) -> bool {
        self.slot.get().is_some() && self.artifacts.get().is_some()
    }

    pub(crate) fn set_artifacts(&self, artifacts: SmPatchedArtifacts) -> Result<()> {
        self.artifacts.set(artifacts).map_err(|_| {
            SmError::internal(format!("bundle '{}' artifacts are already installed", self.name()))
        })
    }

    pub fn state(&self) -> SmLoadState {
        self.state
            .lock()
            .map(|state| state.clone())
            .unwrap_or_else(|_| SmLoadState::Failed(SmError::internal("bundle state lock poisoned")))
    }

    /// How many times this bundle entered `Loading`. At most one.
    pub fn load_transitions(&self) -> usize {
        self.load_transitions.load(Ordering::SeqCst)
    }

    pub fn resident(&self) -> Option<Arc<SmResidentBundle>> {
        self.resident.get().cloned()
    }

    /// Slot and final symbols as seen by dependents.
    pub fn exports(&self) -> SmDependencyExports {
        SmDependencyExports {
            name: self.name().to_string(),
            slot: self.slot(),
            symbols: self.artifacts().map(|a| a.symbols.clone()),
        }
    }
}

#[derive(Default)]
struct SmRegistryInner {
    graph: SmDependencyGraph,
    bundles: BTreeMap<String, SmBundleHandle>,
    aliases: HashMap<String, String>,
}

#[derive(Default)]
pub struct SmBundleRegistry {
    inner: RwLock<SmRegistryInner>,
}

impl SmBundleRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        name: &str,
        role: SmBundleRole,
        dependencies: &[&str],
    ) -> Result<SmBundleHandle> {
        let mut manifest = match role {
            SmBundleRole::Application => SmBundleManifest::application(name),
            SmBundleRole::Library => SmBundleManifest::library(name),
        };
        manifest.dependencies = dependencies.iter().map(|d| d.to_string()).collect();
        self.register_manifest(manifest)
    }

    /// Register a bundle. Rejects duplicates, `Library -> Application` edges
    /// and cycles; the registry is unchanged on error.
    pub fn register_manifest(&self, manifest: SmBundleManifest) -> Result<SmBundleHandle> {
        validate_bundle_name(&manifest.name)?;
        for dep in &manifest.dependencies {
            validate_bundle_name(dep)?;
        }

        let mut inner = self
            .inner
            .write()
            .map_err(|_| SmError::internal("bundle registry lock poisoned"))?;

        let name = manifest.name.clone();
        if inner.bundles.contains_key(&name) || inner.aliases.contains_key(&name) {
            return Err(SmError::validation(format!(
                "bundle '{}' is already registered",
                name
            )));
        }
        if let Some(alias) = &manifest.uri {
            if alias != &name && (inner.bundles.contains_key(alias) || inner.aliases.contains_key(alias)) {
                return Err(SmError::validation(format!(
                    "uri alias '{}' of bundle '{}' is already taken",
                    alias, name
                )));
            }
        }

        if manifest.role == SmBundleRole::Library {
            for dep in &manifest.dependencies {
                if let Some(existing) = inner.bundles.get(dep) {
                    if existing.role() == SmBundleRole::Application {
                        return Err(SmError::validation(format!(
                            "library '{}' cannot depend on application '{}'",
                            name, dep
                        )));
                    }
                }
            }
        } else {
            for dependent in inner.graph.dependents(&name) {
                if let Some(existing) = inner.bundles.get(&dependent) {
                    if existing.role() == SmBundleRole::Library {
                        return Err(SmError::validation(format!(
                            "library '{}' cannot depend on application '{}'",
                            dependent, name
                        )));
                    }
                }
            }
        }

        inner.graph.insert(&name, &manifest.dependencies)?;

        if let Some(alias) = &manifest.uri {
            if alias != &name {
                inner.aliases.insert(alias.clone(), name.clone());
            }
        }
        log::info!(
            "small.bundle.register: bundle registered - name={}, role={}, dependencies={}",
            name,
            manifest.role,
            manifest.dependencies.join(",")
        );
        let handle = Arc::new(SmBundle::new(manifest));
        inner.bundles.insert(name, handle.clone());
        Ok(handle)
    }

    pub fn resolve(&self, name: &str) -> Result<SmBundleHandle> {
        self.read()?
            .bundles
            .get(name)
            .cloned()
            .ok_or_else(|| SmError::unknown_bundle(name))
    }

    /// Resolve a URI host: a bundle name first, then a manifest alias.
    pub fn resolve_alias(&self, host: &str) -> Result<SmBundleHandle> {
        let inner = self.read()?;
        if let Some(handle) = inner.bundles.get(host) {
            return Ok(handle.clone());
        }
        inner
            .aliases
            .get(host)
            .and_then(|name| inner.bundles.get(name))
            .cloned()
            .ok_or_else(|| SmError::unknown_bundle(host))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.read().map(|inner| inner.bundles.contains_key(name)).unwrap_or(false)
    }

    pub fn dependencies_of(&self, name: &str) -> Result<Vec<String>> {
        self.read()?
            .graph
            .dependencies(name)
            .map(|deps| deps.to_vec())
            .ok_or_else(|| SmError::unknown_bundle(name))
    }

    /// Transitive dependencies of `name`, dependencies before dependents.
    pub fn closure_order(&self, name: &str) -> Result<Vec<String>> {
        let inner = self.read()?;
        if !inner.graph.contains(name) {
            return Err(SmError::unknown_bundle(name));
        }
        Ok(inner.graph.closure_order(name))
    }

    pub fn topological_order(&self) -> Result<Vec<String>> {
        self.read()?.graph.topological_order()
    }

    /// Topological order grouped into independently loadable levels.
    pub fn levels(&self) -> Result<Vec<Vec<String>>> {
        let inner = self.read()?;
        let sorted = inner.graph.topological_order()?;
        Ok(inner.graph.levels(&sorted))
    }

    pub fn by_slot(&self, slot: SmSlot) -> Option<SmBundleHandle> {
        self.read()
            .ok()?
            .bundles
            .values()
            .find(|b| b.slot() == Some(slot))
            .cloned()
    }

    /// Forget a bundle. Used to roll back a registration whose install failed.
    pub fn remove(&self, name: &str) -> Option<SmBundleHandle> {
        let mut inner = self.inner.write().ok()?;
        inner.graph.remove(name);
        inner.aliases.retain(|_, target| target != name);
        let removed = inner.bundles.remove(name);
        if removed.is_some() {
            log::info!("small.bundle.remove: registration rolled back - name={}", name);
        }
        removed
    }

    pub fn names(&self) -> Vec<String> {
        self.read()
            .map(|inner| inner.bundles.keys().cloned().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.read().map(|inner| inner.bundles.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, SmRegistryInner>> {
        self.inner
            .read()
            .map_err(|_| SmError::internal("bundle registry lock poisoned"))
    }
}

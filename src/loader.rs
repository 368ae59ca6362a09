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

//! # Bundle Loader
//!
//! Makes a bundle's code and resources resident, dependencies first.
//!
//! Each bundle moves `Registered -> Loading -> Loaded | Failed` exactly once.
//! The caller that wins the `Registered -> Loading` transition does the work;
//! every concurrent caller blocks on the bundle's condition variable and then
//! observes the same terminal state, including the same `Arc` handles on
//! success. `Failed` is terminal.
//!
//! A bundle whose install has not completed, or one of whose dependencies is
//! still being installed, is refused with `BundleNotLoaded` and keeps its
//! `Registered` state.

use std::fmt;
use std::sync::atomic::Ordering;
use std::sync::Arc;

use crate::bundle::{SmBundleHandle, SmBundleRegistry};
use crate::code::SmCodeSource;
use crate::errors::{Result, SmError};
use crate::table::{SmResourceTable, SmSlot};

#[derive(Clone, Debug, PartialEq)]
pub enum SmLoadState {
    Registered,
    Loading,
    Loaded,
    Failed(SmError),
}

impl SmLoadState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SmLoadState::Loaded | SmLoadState::Failed(_))
    }
}

/// Immutable handles of a loaded bundle.
pub struct SmResidentBundle {
    pub name: String,
    pub slot: SmSlot,
    pub table: Arc<SmResourceTable>,
    pub code: Arc<dyn SmCodeSource>,
    /// blake3 digest of the attached (patched) resource table.
    pub digest: String,
}

impl fmt::Debug for SmResidentBundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmResidentBundle")
            .field("name", &self.name)
            .field("slot", &format_args!("0x{:02x}", self.slot))
            .field("resources", &self.table.len())
            .field("classes", &self.code.class_names().len())
            .field("digest", &self.digest)
            .finish()
    }
}

pub struct SmBundleLoader {
    registry: Arc<SmBundleRegistry>,
}

impl SmBundleLoader {
    pub fn new(registry: Arc<SmBundleRegistry>) -> Self {
        SmBundleLoader { registry }
    }

    pub fn ensure_loaded(&self, name: &str) -> Result<Arc<SmResidentBundle>> {
        let bundle = self.registry.resolve(name)?;
        self.require_installed(&bundle)?;
        self.ensure_bundle(&bundle)
    }

    /// The bundle and its whole dependency closure must be installed before
    /// any of them may enter `Loading`.
    fn require_installed(&self, bundle: &SmBundleHandle) -> Result<()> {
        if bundle.resident().is_some() {
            return Ok(());
        }
        let mut pending = Vec::new();
        for name in self.registry.closure_order(bundle.name())? {
            match self.registry.resolve(&name) {
                Ok(dep) if dep.is_installed() => {}
                _ => pending.push(name),
            }
        }
        if !bundle.is_installed() {
            pending.push(bundle.name().to_string());
        }
        match pending.into_iter().next() {
            None => Ok(()),
            Some(name) => {
                log::debug!(
                    "small.bundle.load_deferred: install still pending - name={}, waiting_on={}",
                    bundle.name(),
                    name
                );
                Err(SmError::BundleNotLoaded { bundle: name })
            }
        }
    }

    /// Load several bundles, independent ones in parallel. Results follow
    /// the order of `names`.
    pub fn preload(&self, names: &[String]) -> Vec<Result<Arc<SmResidentBundle>>> {
        #[cfg(feature = "parallel")]
        {
            use rayon::prelude::*;
            names.par_iter().map(|name| self.ensure_loaded(name)).collect()
        }
        #[cfg(not(feature = "parallel"))]
        {
            names.iter().map(|name| self.ensure_loaded(name)).collect()
        }
    }

    fn ensure_bundle(&self, bundle: &SmBundleHandle) -> Result<Arc<SmResidentBundle>> {
        {
            let mut state = bundle
                .state
                .lock()
                .map_err(|_| SmError::internal("bundle state lock poisoned"))?;
            while matches!(*state, SmLoadState::Loading) {
                state = bundle
                    .state_changed
                    .wait(state)
                    .map_err(|_| SmError::internal("bundle state lock poisoned"))?;
            }
            match &*state {
                SmLoadState::Loaded => {
                    return bundle.resident().ok_or_else(|| {
                        SmError::internal(format!("bundle '{}' is loaded without handles", bundle.name()))
                    });
                }
                SmLoadState::Failed(err) => return Err(err.clone()),
                SmLoadState::Registered | SmLoadState::Loading => {}
            }
            *state = SmLoadState::Loading;
            bundle.load_transitions.fetch_add(1, Ordering::SeqCst);
        }

        log::info!("small.bundle.load: loading bundle - name={}", bundle.name());
        let outcome = self.load_now(bundle);

        let mut state = bundle
            .state
            .lock()
            .map_err(|_| SmError::internal("bundle state lock poisoned"))?;
        match &outcome {
            Ok(resident) => {
                let _ = bundle.resident.set(resident.clone());
                *state = SmLoadState::Loaded;
                log::info!(
                    "small.bundle.loaded: bundle resident - name={}, slot=0x{:02x}, digest={}",
                    resident.name,
                    resident.slot,
                    resident.digest
                );
            }
            Err(err) => {
                *state = SmLoadState::Failed(err.clone());
                log::error!(
                    "small.bundle.load_failed: bundle failed to load - name={}, error={}",
                    bundle.name(),
                    err
                );
            }
        }
        bundle.state_changed.notify_all();
        drop(state);

        match outcome {
            Ok(_) => bundle
                .resident()
                .ok_or_else(|| SmError::internal(format!("bundle '{}' lost its handles", bundle.name()))),
            Err(err) => Err(err),
        }
    }

    fn load_now(&self, bundle: &SmBundleHandle) -> Result<Arc<SmResidentBundle>> {
        for dep in bundle.dependencies() {
            let loaded = self
                .registry
                .resolve(dep)
                .and_then(|handle| self.ensure_bundle(&handle));
            if let Err(cause) = loaded {
                return Err(SmError::DependencyLoadFailed {
                    bundle: bundle.name().to_string(),
                    dependency: dep.clone(),
                    cause: cause.to_string(),
                });
            }
        }
        attach(bundle)
    }
}

fn attach(bundle: &SmBundleHandle) -> Result<Arc<SmResidentBundle>> {
    let slot = bundle.slot().ok_or_else(|| {
        SmError::validation(format!("bundle '{}' has no namespace slot", bundle.name()))
    })?;
    let artifacts = bundle.artifacts().ok_or_else(|| {
        SmError::validation(format!("bundle '{}' has no installed artifacts", bundle.name()))
    })?;

    let table = SmResourceTable::parse(&artifacts.table)?;
    if table.package_id() != slot {
        return Err(SmError::malformed(format!(
            "bundle '{}' table lives in slot 0x{:02x}, expected 0x{:02x}",
            bundle.name(),
            table.package_id(),
            slot
        )));
    }
    let code = artifacts.code.attach()?;
    let digest = blake3::hash(&artifacts.table).to_hex().to_string();

    Ok(Arc::new(SmResidentBundle {
        name: bundle.name().to_string(),
        slot,
        table: Arc::new(table),
        code,
        digest,
    }))
}

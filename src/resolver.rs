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

//! # Resolution Chain
//!
//! Class lookup from a bundle walks, in order: the bundle's own code, each
//! direct dependency's chain in declared order (recursively), then the host.
//! A bundle never sees classes of bundles that depend on it.
//!
//! Per-bundle results (host step excluded) are memoized, negative results
//! included. Two threads racing on the same miss compute the same answer,
//! so the first insert wins and the second is discarded.
//!
//! Resources resolve by name along the same chain, or by identifier through
//! the slot that owns them.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::bundle::{SmBundleHandle, SmBundleRegistry};
use crate::code::{SmCodeHandle, SmCodeOwner};
use crate::errors::{Result, SmError};
use crate::host::SmHost;
use crate::loader::SmResidentBundle;
use crate::table::{SmResourceEntry, SmResourceId, SmResourceValue, SM_HOST_SLOT};

/// Reference hops followed by [`SmResolutionChain::resolve_value`].
const MAX_REFERENCE_DEPTH: usize = 16;

#[derive(Clone, Debug, PartialEq)]
pub struct SmResolvedResource {
    pub owner: SmCodeOwner,
    pub entry: SmResourceEntry,
}

impl SmResolvedResource {
    pub fn id(&self) -> SmResourceId {
        self.entry.id
    }
}

type SmClassCache = RwLock<HashMap<(String, String), Option<SmCodeHandle>>>;

pub struct SmResolutionChain {
    registry: Arc<SmBundleRegistry>,
    host: SmHost,
    cache: SmClassCache,
}

impl SmResolutionChain {
    pub fn new(registry: Arc<SmBundleRegistry>, host: SmHost) -> Self {
        SmResolutionChain {
            registry,
            host,
            cache: RwLock::new(HashMap::new()),
        }
    }

    pub fn host(&self) -> &SmHost {
        &self.host
    }

    pub fn resolve_class(&self, bundle: &str, class: &str) -> Result<SmCodeHandle> {
        let handle = self.registry.resolve(bundle)?;
        if let Some(found) = self.bundle_chain(&handle, class)? {
            return Ok(found);
        }
        if let Some(entry) = self.host.code().lookup(class) {
            log::debug!(
                "small.resolver.host_class: class resolved from host - bundle={}, class={}",
                bundle,
                class
            );
            return Ok(SmCodeHandle {
                owner: SmCodeOwner::Host,
                class: class.to_string(),
                entry,
            });
        }
        Err(SmError::ClassNotFound {
            bundle: bundle.to_string(),
            class: class.to_string(),
        })
    }

    fn bundle_chain(&self, bundle: &SmBundleHandle, class: &str) -> Result<Option<SmCodeHandle>> {
        let key = (bundle.name().to_string(), class.to_string());
        if let Some(hit) = self
            .cache
            .read()
            .map_err(|_| SmError::internal("class cache lock poisoned"))?
            .get(&key)
        {
            return Ok(hit.clone());
        }

        let resident = resident_of(bundle)?;
        let found = match resident.code.lookup(class) {
            Some(entry) => Some(SmCodeHandle {
                owner: SmCodeOwner::Bundle(bundle.name().to_string()),
                class: class.to_string(),
                entry,
            }),
            None => {
                let mut found = None;
                for dep in bundle.dependencies() {
                    let dep_handle = self.registry.resolve(dep)?;
                    if let Some(hit) = self.bundle_chain(&dep_handle, class)? {
                        found = Some(hit);
                        break;
                    }
                }
                found
            }
        };

        let mut cache = self
            .cache
            .write()
            .map_err(|_| SmError::internal("class cache lock poisoned"))?;
        Ok(cache.entry(key).or_insert(found).clone())
    }

    /// Number of memoized `(bundle, class)` lookups.
    pub fn cached_lookups(&self) -> usize {
        self.cache.read().map(|c| c.len()).unwrap_or(0)
    }

    /// Memoized result for `(bundle, class)`, if any: `Some(None)` is a cached miss.
    pub fn cached(&self, bundle: &str, class: &str) -> Option<Option<SmCodeHandle>> {
        self.cache
            .read()
            .ok()?
            .get(&(bundle.to_string(), class.to_string()))
            .cloned()
    }

    /// Resource by `type/name` as seen from `bundle`: own table, dependency
    /// chains in declared order, then the host table.
    pub fn resolve_resource(&self, bundle: &str, type_name: &str, name: &str) -> Result<SmResolvedResource> {
        let handle = self.registry.resolve(bundle)?;
        if let Some(found) = self.resource_chain(&handle, type_name, name)? {
            return Ok(found);
        }
        if let Some(entry) = self.host.table().and_then(|t| t.find(type_name, name)) {
            return Ok(SmResolvedResource {
                owner: SmCodeOwner::Host,
                entry: entry.clone(),
            });
        }
        Err(SmError::ResourceNotFound {
            bundle: bundle.to_string(),
            resource: format!("{}/{}", type_name, name),
        })
    }

    fn resource_chain(
        &self,
        bundle: &SmBundleHandle,
        type_name: &str,
        name: &str,
    ) -> Result<Option<SmResolvedResource>> {
        let resident = resident_of(bundle)?;
        if let Some(entry) = resident.table.find(type_name, name) {
            return Ok(Some(SmResolvedResource {
                owner: SmCodeOwner::Bundle(bundle.name().to_string()),
                entry: entry.clone(),
            }));
        }
        for dep in bundle.dependencies() {
            let dep_handle = self.registry.resolve(dep)?;
            if let Some(found) = self.resource_chain(&dep_handle, type_name, name)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// Resource by final identifier, located through its slot.
    pub fn resolve_resource_id(&self, id: SmResourceId) -> Result<SmResolvedResource> {
        let not_found = |owner: &str| SmError::ResourceNotFound {
            bundle: owner.to_string(),
            resource: id.to_string(),
        };

        if id.slot() == SM_HOST_SLOT {
            let entry = self
                .host
                .table()
                .and_then(|t| t.entry(id))
                .ok_or_else(|| not_found("<host>"))?;
            return Ok(SmResolvedResource {
                owner: SmCodeOwner::Host,
                entry: entry.clone(),
            });
        }

        let owner = self
            .registry
            .by_slot(id.slot())
            .ok_or_else(|| not_found("<unassigned>"))?;
        let resident = resident_of(&owner)?;
        let entry = resident.table.entry(id).ok_or_else(|| not_found(owner.name()))?;
        Ok(SmResolvedResource {
            owner: SmCodeOwner::Bundle(owner.name().to_string()),
            entry: entry.clone(),
        })
    }

    /// Follow reference values across bundles until a concrete value.
    pub fn resolve_value(&self, id: SmResourceId) -> Result<SmResourceValue> {
        let mut current = id;
        for _ in 0..MAX_REFERENCE_DEPTH {
            let resolved = self.resolve_resource_id(current)?;
            match resolved.entry.value() {
                Some(SmResourceValue::Reference(next)) => current = *next,
                Some(value) => return Ok(value.clone()),
                None => {
                    return Err(SmError::validation(format!(
                        "resource {} is a bag, not a value",
                        current
                    )))
                }
            }
        }
        Err(SmError::validation(format!(
            "resource {} exceeds {} reference hops",
            id, MAX_REFERENCE_DEPTH
        )))
    }
}

fn resident_of(bundle: &SmBundleHandle) -> Result<Arc<SmResidentBundle>> {
    bundle.resident().ok_or_else(|| SmError::BundleNotLoaded {
        bundle: bundle.name().to_string(),
    })
}

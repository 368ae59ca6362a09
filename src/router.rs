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

//! # URI Dispatch and Stub Shells
//!
//! Launch requests look like `scheme://bundle/unit?key=value`. The host is a
//! bundle name or manifest alias, the path a unit class or rule key, and the
//! query becomes the unit's launch parameters.
//!
//! Units are placed into pre-declared stub shells. A shell is reused when it
//! is idle; otherwise the least recently used shell of the requested kind is
//! taken over and its previous occupant is reported as evicted.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::code::{SmCodeHandle, SmRoutableUnit};
use crate::errors::{Result, SmError};

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmShellKind {
    #[default]
    Standard,
    SingleTop,
    SingleTask,
    SingleInstance,
    Translucent,
}

impl fmt::Display for SmShellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SmShellKind::Standard => "standard",
            SmShellKind::SingleTop => "single_top",
            SmShellKind::SingleTask => "single_task",
            SmShellKind::SingleInstance => "single_instance",
            SmShellKind::Translucent => "translucent",
        };
        f.write_str(name)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmShellDecl {
    pub id: String,
    #[serde(default)]
    pub kind: SmShellKind,
}

impl SmShellDecl {
    pub fn new(id: impl Into<String>, kind: SmShellKind) -> Self {
        SmShellDecl { id: id.into(), kind }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmShellOccupant {
    pub bundle: String,
    pub unit: String,
}

impl fmt::Display for SmShellOccupant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.bundle, self.unit)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmShellLease {
    pub shell_id: String,
    pub kind: SmShellKind,
    /// Previous occupant displaced by this acquisition.
    pub evicted: Option<SmShellOccupant>,
}

#[derive(Debug)]
struct SmShellSlot {
    decl: SmShellDecl,
    occupant: Option<SmShellOccupant>,
    last_used: u64,
}

#[derive(Debug)]
struct SmShellPool {
    slots: Vec<SmShellSlot>,
    clock: u64,
}

/// Fixed pool of stub shells declared at startup.
#[derive(Debug)]
pub struct SmStubRouter {
    pool: Mutex<SmShellPool>,
}

impl SmStubRouter {
    pub fn new(shells: Vec<SmShellDecl>) -> Result<Self> {
        let mut slots: Vec<SmShellSlot> = Vec::with_capacity(shells.len());
        for decl in shells {
            if decl.id.trim().is_empty() {
                return Err(SmError::validation("stub shell id cannot be empty"));
            }
            if slots.iter().any(|s| s.decl.id == decl.id) {
                return Err(SmError::validation(format!(
                    "stub shell '{}' is declared twice",
                    decl.id
                )));
            }
            slots.push(SmShellSlot {
                decl,
                occupant: None,
                last_used: 0,
            });
        }
        Ok(SmStubRouter {
            pool: Mutex::new(SmShellPool { slots, clock: 0 }),
        })
    }

    /// Place `occupant` into a shell of `kind`: first idle shell in declared
    /// order, else the least recently used one.
    pub fn acquire(&self, kind: SmShellKind, occupant: SmShellOccupant) -> Result<SmShellLease> {
        let mut pool = self
            .pool
            .lock()
            .map_err(|_| SmError::internal("stub shell pool lock poisoned"))?;
        pool.clock += 1;
        let now = pool.clock;

        let idle = pool
            .slots
            .iter()
            .position(|s| s.decl.kind == kind && s.occupant.is_none());
        let index = match idle {
            Some(index) => index,
            None => pool
                .slots
                .iter()
                .enumerate()
                .filter(|(_, s)| s.decl.kind == kind)
                .min_by_key(|(_, s)| s.last_used)
                .map(|(index, _)| index)
                .ok_or_else(|| SmError::NoShellAvailable {
                    kind: kind.to_string(),
                })?,
        };

        let slot = &mut pool.slots[index];
        let evicted = slot.occupant.replace(occupant.clone());
        slot.last_used = now;

        if let Some(previous) = &evicted {
            log::warn!(
                "small.router.evict: shell taken over - shell={}, evicted={}, occupant={}",
                slot.decl.id,
                previous,
                occupant
            );
        }
        log::debug!(
            "small.router.acquire: shell assigned - shell={}, kind={}, occupant={}",
            slot.decl.id,
            kind,
            occupant
        );

        Ok(SmShellLease {
            shell_id: slot.decl.id.clone(),
            kind,
            evicted,
        })
    }

    /// Mark a shell idle, returning whoever occupied it.
    pub fn release(&self, shell_id: &str) -> Result<Option<SmShellOccupant>> {
        let mut pool = self
            .pool
            .lock()
            .map_err(|_| SmError::internal("stub shell pool lock poisoned"))?;
        let slot = pool
            .slots
            .iter_mut()
            .find(|s| s.decl.id == shell_id)
            .ok_or_else(|| SmError::validation(format!("unknown stub shell '{}'", shell_id)))?;
        Ok(slot.occupant.take())
    }

    pub fn occupant(&self, shell_id: &str) -> Option<SmShellOccupant> {
        let pool = self.pool.lock().ok()?;
        pool.slots
            .iter()
            .find(|s| s.decl.id == shell_id)
            .and_then(|s| s.occupant.clone())
    }

    pub fn shells(&self) -> Vec<SmShellDecl> {
        self.pool
            .lock()
            .map(|pool| pool.slots.iter().map(|s| s.decl.clone()).collect())
            .unwrap_or_default()
    }
}

/// A parsed launch URI.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmLaunchRequest {
    pub uri: String,
    /// Bundle name or alias.
    pub host: String,
    /// Unit class or rule key; `None` selects the default unit.
    pub path: Option<String>,
    pub query: BTreeMap<String, String>,
}

impl SmLaunchRequest {
    /// Parse `uri`. A URI without a scheme is read as `scheme://uri`.
    pub fn parse(uri: &str, scheme: &str) -> Result<Self> {
        let text = if uri.contains("://") {
            uri.to_string()
        } else {
            format!("{}://{}", scheme, uri.trim_start_matches('/'))
        };
        let url = Url::parse(&text).map_err(|err| SmError::invalid_uri(uri, err.to_string()))?;

        if url.scheme() != scheme {
            return Err(SmError::invalid_uri(
                uri,
                format!("expected scheme '{}', found '{}'", scheme, url.scheme()),
            ));
        }
        let host = match url.host_str() {
            Some(host) if !host.is_empty() => host.to_string(),
            _ => return Err(SmError::invalid_uri(uri, "missing bundle host")),
        };

        let trimmed = url.path().trim_matches('/');
        let path = if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        };
        let query = url.query_pairs().into_owned().collect();

        Ok(SmLaunchRequest {
            uri: uri.to_string(),
            host,
            path,
            query,
        })
    }
}

/// Everything a unit learns about the launch that created it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SmLaunchContext {
    pub bundle: String,
    pub unit: String,
    pub shell_id: String,
    pub shell_kind: SmShellKind,
    pub params: BTreeMap<String, String>,
}

impl SmLaunchContext {
    pub fn param(&self, key: &str) -> Option<&str> {
        self.params.get(key).map(String::as_str)
    }
}

/// Resolved launch: which unit class, in which shell, with which parameters.
#[derive(Clone, Debug)]
pub struct SmLaunchPlan {
    pub context: SmLaunchContext,
    pub class: SmCodeHandle,
    pub lease: SmShellLease,
}

impl SmLaunchPlan {
    pub fn bundle(&self) -> &str {
        &self.context.bundle
    }

    pub fn unit(&self) -> &str {
        &self.context.unit
    }

    pub fn shell_id(&self) -> &str {
        &self.lease.shell_id
    }

    /// Instantiate the unit and attach it with the launch context.
    pub fn launch(&self) -> Result<Box<dyn SmRoutableUnit>> {
        let mut unit = self.class.instantiate().ok_or_else(|| SmError::UnknownUnit {
            bundle: self.context.bundle.clone(),
            unit: self.context.unit.clone(),
        })?;
        unit.on_attach(&self.context)?;
        log::info!(
            "small.router.launch: unit attached - bundle={}, unit={}, shell={}",
            self.context.bundle,
            self.context.unit,
            self.lease.shell_id
        );
        Ok(unit)
    }
}

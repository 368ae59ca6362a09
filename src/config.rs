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

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::allocator::SmSlotPool;
use crate::errors::{Result, SmError};
use crate::router::{SmShellDecl, SmShellKind};
use crate::table::SmSlot;

/// Configuration of one runtime instance.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmRuntimeConfig {
    /// Allocator state file.
    pub state_path: PathBuf,
    /// URI scheme accepted by dispatch.
    pub scheme: String,
    /// Unit used when neither the URI path nor the manifest names one.
    pub default_unit: String,
    pub pool_first: SmSlot,
    pub pool_last: SmSlot,
    pub reserved_slots: BTreeSet<SmSlot>,
    pub shells: Vec<SmShellDecl>,
    /// Where native code from archived packages is extracted.
    pub code_cache_dir: Option<PathBuf>,
}

impl Default for SmRuntimeConfig {
    fn default() -> Self {
        SmRuntimeConfig {
            state_path: PathBuf::from("small-slots.json"),
            scheme: "app".to_string(),
            default_unit: "MainUnit".to_string(),
            pool_first: 0x02,
            pool_last: 0x7E,
            reserved_slots: BTreeSet::new(),
            shells: default_shells(),
            code_cache_dir: None,
        }
    }
}

fn default_shells() -> Vec<SmShellDecl> {
    vec![
        SmShellDecl::new("stub.A", SmShellKind::Standard),
        SmShellDecl::new("stub.A1", SmShellKind::Standard),
        SmShellDecl::new("stub.A2", SmShellKind::SingleTop),
        SmShellDecl::new("stub.A3", SmShellKind::SingleTask),
        SmShellDecl::new("stub.A4", SmShellKind::SingleInstance),
        SmShellDecl::new("stub.A5", SmShellKind::Translucent),
    ]
}

impl SmRuntimeConfig {
    pub fn slot_pool(&self) -> SmSlotPool {
        SmSlotPool::new(self.pool_first, self.pool_last).with_reserved(self.reserved_slots.iter().copied())
    }

    pub fn validate(&self) -> Result<()> {
        if self.scheme.is_empty()
            || !self
                .scheme
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'))
        {
            return Err(SmError::validation(format!("invalid uri scheme '{}'", self.scheme)));
        }
        if self.default_unit.trim().is_empty() {
            return Err(SmError::validation("default unit cannot be empty"));
        }
        if self.shells.is_empty() {
            return Err(SmError::validation("at least one stub shell must be declared"));
        }
        self.slot_pool().validate()
    }

    pub fn from_json(value: &Value) -> Result<Self> {
        let builder: SmRuntimeConfigBuilder = serde_json::from_value(value.clone())?;
        builder.build()
    }

    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        let value: Value = serde_json::from_str(&text)?;
        Self::from_json(&value)
    }
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct SmRuntimeConfigBuilder {
    pub state_path: Option<PathBuf>,
    pub scheme: Option<String>,
    pub default_unit: Option<String>,
    pub pool_first: Option<SmSlot>,
    pub pool_last: Option<SmSlot>,
    pub reserved_slots: Option<BTreeSet<SmSlot>>,
    pub shells: Option<Vec<SmShellDecl>>,
    pub code_cache_dir: Option<PathBuf>,
}

impl SmRuntimeConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.state_path = Some(path.into());
        self
    }

    pub fn scheme(mut self, scheme: impl Into<String>) -> Self {
        self.scheme = Some(scheme.into());
        self
    }

    pub fn default_unit(mut self, unit: impl Into<String>) -> Self {
        self.default_unit = Some(unit.into());
        self
    }

    pub fn pool(mut self, first: SmSlot, last: SmSlot) -> Self {
        self.pool_first = Some(first);
        self.pool_last = Some(last);
        self
    }

    pub fn reserved_slots(mut self, slots: impl IntoIterator<Item = SmSlot>) -> Self {
        self.reserved_slots = Some(slots.into_iter().collect());
        self
    }

    pub fn shells(mut self, shells: Vec<SmShellDecl>) -> Self {
        self.shells = Some(shells);
        self
    }

    pub fn code_cache_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.code_cache_dir = Some(dir.into());
        self
    }

    pub fn build(self) -> Result<SmRuntimeConfig> {
        let base = SmRuntimeConfig::default();
        let config = SmRuntimeConfig {
            state_path: self.state_path.unwrap_or(base.state_path),
            scheme: self.scheme.unwrap_or(base.scheme),
            default_unit: self.default_unit.unwrap_or(base.default_unit),
            pool_first: self.pool_first.unwrap_or(base.pool_first),
            pool_last: self.pool_last.unwrap_or(base.pool_last),
            reserved_slots: self.reserved_slots.unwrap_or(base.reserved_slots),
            shells: self.shells.unwrap_or(base.shells),
            code_cache_dir: self.code_cache_dir.or(base.code_cache_dir),
        };
        config.validate()?;
        Ok(config)
    }
}

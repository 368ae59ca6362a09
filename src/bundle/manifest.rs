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

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SmError};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmBundleRole {
    #[serde(alias = "app")]
    Application,
    #[serde(alias = "lib")]
    Library,
}

impl std::fmt::Display for SmBundleRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SmBundleRole::Application => f.write_str("application"),
            SmBundleRole::Library => f.write_str("library"),
        }
    }
}

/// Registration metadata of one bundle (`bundle.json`).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmBundleManifest {
    pub name: String,
    pub role: SmBundleRole,
    #[serde(default)]
    pub dependencies: Vec<String>,
    /// Alternative URI host that routes to this bundle.
    #[serde(default)]
    pub uri: Option<String>,
    #[serde(default)]
    pub default_unit: Option<String>,
    /// URI path to unit class.
    #[serde(default)]
    pub rules: BTreeMap<String, String>,
    /// Native library file name inside the package's `lib/` directory.
    #[serde(default)]
    pub native_library: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SmBundleManifestFile {
    name: String,
    #[serde(alias = "type")]
    role: SmBundleRole,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default)]
    uri: Option<String>,
    #[serde(default)]
    default_unit: Option<String>,
    #[serde(default)]
    rules: BTreeMap<String, String>,
    #[serde(default)]
    native_library: Option<String>,
}

impl SmBundleManifestFile {
    fn into_runtime(self) -> Result<SmBundleManifest> {
        validate_bundle_name(&self.name)?;
        for dep in &self.dependencies {
            validate_bundle_name(dep)?;
            if dep == &self.name {
                return Err(SmError::CyclicDependency {
                    bundle: self.name.clone(),
                    cycle: vec![self.name.clone(), self.name.clone()],
                });
            }
        }
        if let Some(alias) = &self.uri {
            validate_bundle_name(alias)?;
        }
        if let Some(unit) = &self.default_unit {
            if unit.trim().is_empty() {
                return Err(SmError::validation(format!(
                    "bundle '{}' declares an empty default unit",
                    self.name
                )));
            }
        }
        for (path, unit) in &self.rules {
            if unit.trim().is_empty() {
                return Err(SmError::validation(format!(
                    "bundle '{}' rule '{}' maps to an empty unit",
                    self.name, path
                )));
            }
        }
        if let Some(lib) = &self.native_library {
            if lib.contains('/') || lib.contains('\\') || lib.contains("..") {
                return Err(SmError::validation(format!(
                    "bundle '{}' native library '{}' must be a bare file name",
                    self.name, lib
                )));
            }
        }

        Ok(SmBundleManifest {
            name: self.name,
            role: self.role,
            dependencies: self.dependencies,
            uri: self.uri,
            default_unit: self.default_unit,
            rules: self.rules,
            native_library: self.native_library,
        })
    }
}

/// Bundle names are used as URI hosts and file names.
pub fn validate_bundle_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SmError::validation("bundle name cannot be empty"));
    }
    if name.starts_with('.') {
        return Err(SmError::validation(format!(
            "bundle name '{}' cannot start with '.'",
            name
        )));
    }
    if let Some(bad) = name
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-' | '+')))
    {
        return Err(SmError::validation(format!(
            "bundle name '{}' contains invalid character '{}'",
            name, bad
        )));
    }
    Ok(())
}

impl SmBundleManifest {
    pub fn application(name: impl Into<String>) -> Self {
        Self::with_role(name, SmBundleRole::Application)
    }

    pub fn library(name: impl Into<String>) -> Self {
        Self::with_role(name, SmBundleRole::Library)
    }

    fn with_role(name: impl Into<String>, role: SmBundleRole) -> Self {
        SmBundleManifest {
            name: name.into(),
            role,
            dependencies: Vec::new(),
            uri: None,
            default_unit: None,
            rules: BTreeMap::new(),
            native_library: None,
        }
    }

    pub fn depends_on(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    pub fn with_uri(mut self, alias: impl Into<String>) -> Self {
        self.uri = Some(alias.into());
        self
    }

    pub fn with_default_unit(mut self, unit: impl Into<String>) -> Self {
        self.default_unit = Some(unit.into());
        self
    }

    pub fn with_rule(mut self, path: impl Into<String>, unit: impl Into<String>) -> Self {
        self.rules.insert(path.into(), unit.into());
        self
    }

    pub fn from_json_str(text: &str) -> Result<Self> {
        let file: SmBundleManifestFile = serde_json::from_str(text)?;
        file.into_runtime()
    }

    /// Load `bundle.json` from a file or from a package directory.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let meta_path = if path.is_dir() {
            path.join("bundle.json")
        } else {
            path.to_path_buf()
        };
        let text = fs::read_to_string(&meta_path)?;
        Self::from_json_str(&text)
    }

    pub fn validate(&self) -> Result<()> {
        let text = serde_json::to_string(self)?;
        Self::from_json_str(&text).map(|_| ())
    }

    /// Unit class for a URI path segment: rule lookup first, then the path itself.
    pub fn unit_for_path<'a>(&'a self, path: &'a str) -> &'a str {
        self.rules.get(path).map(String::as_str).unwrap_or(path)
    }
}

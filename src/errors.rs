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

//! # Small Error Module
//!
//! This module defines the error type shared by every component of the bundle
//! runtime.
//!
//! ## Error Categories
//!
//! - **Registration**: `PoolExhausted`, `CyclicDependency`
//! - **Patching**: `UnresolvedDependency`, `MalformedTable`
//! - **Loading**: `DependencyLoadFailed`, `BundleNotLoaded`, `Library`
//! - **Resolution**: `ClassNotFound`, `ResourceNotFound`
//! - **Dispatch**: `UnknownBundle`, `UnknownUnit`, `NoShellAvailable`, `InvalidUri`
//! - **Plumbing**: `Io`, `Serde`, `Zip`, `Validation`, `Internal`
//!
//! Errors are `Clone` because a failed bundle load is remembered and handed
//! to every later caller of `ensure_loaded` for that bundle.
//!
//! ## Usage
//!
//! ```rust
//! use small::errors::{Result, SmError};
//!
//! fn pick(name: &str) -> Result<u8> {
//!     if name.is_empty() {
//!         return Err(SmError::validation("bundle name cannot be empty"));
//!     }
//!     Ok(0x02)
//! }
//! ```

use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use zip::result::ZipError;

/// Convenience result type used throughout Small.
pub type Result<T> = std::result::Result<T, SmError>;

/// Canonical error enumeration for the Small runtime.
#[derive(Clone, Debug, Error, PartialEq, Eq, Serialize, Deserialize)]
pub enum SmError {
    /// No free namespace slot remains in the allocation pool.
    #[error("namespace slot pool exhausted while allocating bundle '{bundle}'")]
    PoolExhausted { bundle: String },

    /// Registering the bundle would close a dependency cycle.
    #[error("registering bundle '{bundle}' would create a dependency cycle: {}", .cycle.join(" -> "))]
    CyclicDependency { bundle: String, cycle: Vec<String> },

    /// A dependency (or a resource it should own) has no allocated slot yet.
    #[error("bundle '{bundle}' references unresolved dependency '{dependency}'")]
    UnresolvedDependency { bundle: String, dependency: String },

    /// The compiled resource table could not be parsed.
    #[error("malformed resource table: {message}")]
    MalformedTable { message: String },

    /// A dependency failed to load, so the dependent cannot load either.
    #[error("bundle '{bundle}' failed to load because dependency '{dependency}' failed: {cause}")]
    DependencyLoadFailed {
        bundle: String,
        dependency: String,
        cause: String,
    },

    /// No registered bundle matches the requested name or alias.
    #[error("unknown bundle '{bundle}'")]
    UnknownBundle { bundle: String },

    /// The bundle exists but has no routable unit of that name.
    #[error("bundle '{bundle}' has no routable unit '{unit}'")]
    UnknownUnit { bundle: String, unit: String },

    /// The shell pool has no shell able to host the requested kind.
    #[error("no stub shell available for kind '{kind}'")]
    NoShellAvailable { kind: String },

    /// Class lookup exhausted the whole resolution chain.
    #[error("class '{class}' not visible from bundle '{bundle}'")]
    ClassNotFound { bundle: String, class: String },

    /// Resource lookup exhausted the whole resolution chain.
    #[error("resource '{resource}' not visible from bundle '{bundle}'")]
    ResourceNotFound { bundle: String, resource: String },

    /// The bundle is registered but its code and resources are not resident.
    #[error("bundle '{bundle}' is not loaded")]
    BundleNotLoaded { bundle: String },

    /// The launch URI could not be interpreted.
    #[error("invalid launch uri '{uri}': {message}")]
    InvalidUri { uri: String, message: String },

    /// Errors originating from filesystem IO.
    #[error("io error: {0}")]
    Io(String),

    /// Wrapper for serde-style serialization issues.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Errors originating from ZIP package operations.
    #[error("zip error: {0}")]
    Zip(String),

    /// Errors raised while opening native bundle code.
    #[error("native library error: {0}")]
    Library(String),

    /// Validation errors triggered by invalid parameters or inputs.
    #[error("validation error: {message}")]
    Validation { message: String },

    /// Catch-all variant for unexpected situations.
    #[error("internal error: {0}")]
    Internal(String),
}

impl From<io::Error> for SmError {
    fn from(err: io::Error) -> Self {
        SmError::Io(err.to_string())
    }
}

impl From<serde_json::Error> for SmError {
    fn from(err: serde_json::Error) -> Self {
        SmError::Serde(err.to_string())
    }
}

impl From<ZipError> for SmError {
    fn from(err: ZipError) -> Self {
        SmError::Zip(err.to_string())
    }
}

impl From<libloading::Error> for SmError {
    fn from(err: libloading::Error) -> Self {
        SmError::Library(err.to_string())
    }
}

impl SmError {
    /// Helper to construct simple validation errors.
    pub fn validation<T: Into<String>>(message: T) -> Self {
        SmError::Validation {
            message: message.into(),
        }
    }

    /// Helper to construct table structure errors.
    pub fn malformed<T: Into<String>>(message: T) -> Self {
        SmError::MalformedTable {
            message: message.into(),
        }
    }

    pub fn unresolved(bundle: impl Into<String>, dependency: impl Into<String>) -> Self {
        SmError::UnresolvedDependency {
            bundle: bundle.into(),
            dependency: dependency.into(),
        }
    }

    pub fn unknown_bundle(bundle: impl Into<String>) -> Self {
        SmError::UnknownBundle {
            bundle: bundle.into(),
        }
    }

    pub fn invalid_uri(uri: impl Into<String>, message: impl Into<String>) -> Self {
        SmError::InvalidUri {
            uri: uri.into(),
            message: message.into(),
        }
    }

    /// Helper to construct internal errors.
    pub fn internal<T: Into<String>>(message: T) -> Self {
        SmError::Internal(message.into())
    }
}

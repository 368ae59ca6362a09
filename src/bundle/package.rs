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

//! Bundle packages.
//!
//! A package is a directory or a `.zip` archive laid out as:
//!
//! ```text
//! bundle.json        registration manifest
//! resources.arsc     compiled resource table (placeholder slot)
//! R.txt              compile-time symbol table (optional)
//! lib/<native>       native code named by `native_library` (optional)
//! ```
//!
//! Native libraries inside an archive are extracted into the code cache
//! directory before they can be opened.

use std::fs::{self, File};
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use zip::result::ZipError;
use zip::ZipArchive;

use crate::bundle::manifest::SmBundleManifest;
use crate::bundle::SmBundleArtifacts;
use crate::code::SmCodeArtifact;
use crate::errors::{Result, SmError};
use crate::table::{SmResourceTable, SmSymbolTable};

pub const MANIFEST_FILE: &str = "bundle.json";
pub const TABLE_FILE: &str = "resources.arsc";
pub const SYMBOLS_FILE: &str = "R.txt";
pub const NATIVE_DIR: &str = "lib";

#[derive(Clone, Debug)]
pub struct SmBundlePackage {
    pub manifest: SmBundleManifest,
    pub artifacts: SmBundleArtifacts,
}

/// Read a package from a directory or a `.zip` file.
pub fn read_bundle_package(path: impl AsRef<Path>, code_cache_dir: Option<&Path>) -> Result<SmBundlePackage> {
    let path = path.as_ref();
    let package = if path.is_dir() {
        read_directory(path)?
    } else {
        read_archive(path, code_cache_dir)?
    };
    validate_bundle_package(&package)?;

    log::debug!(
        "small.bundle.package_read: bundle package read - name={}, path={}, table_bytes={}, symbols={}",
        package.manifest.name,
        path.display(),
        package.artifacts.table.len(),
        package.artifacts.symbols.len()
    );
    Ok(package)
}

/// Structural checks that need no registry: the table parses and carries the
/// package name declared by the manifest.
pub fn validate_bundle_package(package: &SmBundlePackage) -> Result<()> {
    package.manifest.validate()?;
    let table = SmResourceTable::parse(&package.artifacts.table)?;
    if table.package_name() != package.manifest.name {
        return Err(SmError::validation(format!(
            "package table is named '{}' but the manifest declares '{}'",
            table.package_name(),
            package.manifest.name
        )));
    }
    Ok(())
}

fn read_directory(dir: &Path) -> Result<SmBundlePackage> {
    let manifest = SmBundleManifest::load_from_path(dir.join(MANIFEST_FILE))?;
    let table = fs::read(dir.join(TABLE_FILE))?;

    let symbols_path = dir.join(SYMBOLS_FILE);
    let symbols = if symbols_path.exists() {
        SmSymbolTable::parse(&fs::read_to_string(&symbols_path)?)?
    } else {
        SmSymbolTable::new()
    };

    let code = match &manifest.native_library {
        Some(lib) => {
            let lib_path = dir.join(NATIVE_DIR).join(lib);
            if !lib_path.is_file() {
                return Err(SmError::validation(format!(
                    "bundle '{}' native library '{}' not found",
                    manifest.name,
                    lib_path.display()
                )));
            }
            SmCodeArtifact::Native(lib_path)
        }
        None => SmCodeArtifact::None,
    };

    Ok(SmBundlePackage {
        manifest,
        artifacts: SmBundleArtifacts::new(table, symbols, code),
    })
}

fn read_archive(path: &Path, code_cache_dir: Option<&Path>) -> Result<SmBundlePackage> {
    let mut archive = ZipArchive::new(File::open(path)?)?;

    let manifest_text = String::from_utf8(read_entry(&mut archive, MANIFEST_FILE)?)
        .map_err(|_| SmError::validation(format!("'{}' is not UTF-8", MANIFEST_FILE)))?;
    let manifest = SmBundleManifest::from_json_str(&manifest_text)?;
    let table = read_entry(&mut archive, TABLE_FILE)?;

    let symbols = match read_optional_entry(&mut archive, SYMBOLS_FILE)? {
        Some(bytes) => {
            let text = String::from_utf8(bytes)
                .map_err(|_| SmError::validation(format!("'{}' is not UTF-8", SYMBOLS_FILE)))?;
            SmSymbolTable::parse(&text)?
        }
        None => SmSymbolTable::new(),
    };

    let code = match &manifest.native_library {
        Some(lib) => {
            let cache = code_cache_dir.ok_or_else(|| {
                SmError::validation(format!(
                    "bundle '{}' ships native code but no code cache directory is configured",
                    manifest.name
                ))
            })?;
            SmCodeArtifact::Native(extract_native(&mut archive, &manifest.name, lib, cache)?)
        }
        None => SmCodeArtifact::None,
    };

    Ok(SmBundlePackage {
        manifest,
        artifacts: SmBundleArtifacts::new(table, symbols, code),
    })
}

fn read_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Vec<u8>> {
    read_optional_entry(archive, name)?
        .ok_or_else(|| SmError::validation(format!("bundle package has no '{}'", name)))
}

fn read_optional_entry(archive: &mut ZipArchive<File>, name: &str) -> Result<Option<Vec<u8>>> {
    let mut entry = match archive.by_name(name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let mut buf = Vec::with_capacity(entry.size() as usize);
    entry.read_to_end(&mut buf)?;
    Ok(Some(buf))
}

fn extract_native(
    archive: &mut ZipArchive<File>,
    bundle: &str,
    lib: &str,
    cache: &Path,
) -> Result<PathBuf> {
    let entry_name = format!("{}/{}", NATIVE_DIR, lib);
    let mut entry = match archive.by_name(&entry_name) {
        Ok(entry) => entry,
        Err(ZipError::FileNotFound) => {
            return Err(SmError::validation(format!(
                "bundle '{}' native library '{}' not found in archive",
                bundle, entry_name
            )))
        }
        Err(err) => return Err(err.into()),
    };

    let target_dir = cache.join(bundle);
    fs::create_dir_all(&target_dir)?;
    let target = target_dir.join(lib);
    let mut out = File::create(&target)?;
    io::copy(&mut entry, &mut out)?;
    out.sync_all()?;
    Ok(target)
}

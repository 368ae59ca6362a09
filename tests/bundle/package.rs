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

#[path = "../common/mod.rs"]
mod common;

use std::fs;

use small::{read_bundle_package, SmBundleManifest, SmBundleRole, SmCodeArtifact, SmError, SmResourceId};
use tempfile::TempDir;

#[test]
fn test_read_directory_package() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("lib.utils");
    common::write_package_dir(&root, &SmBundleManifest::library("lib.utils"), &common::library_table("lib.utils"));

    let package = read_bundle_package(&root, None).unwrap();
    assert_eq!(package.manifest.name, "lib.utils");
    assert_eq!(package.manifest.role, SmBundleRole::Library);
    assert_eq!(
        package.artifacts.symbols.id_of("color", "accent"),
        Some(SmResourceId(0x7F01_0000))
    );
    assert!(matches!(package.artifacts.code, SmCodeArtifact::None));
}

#[test]
fn test_read_archive_package() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("app.main.zip");
    let manifest = SmBundleManifest::application("app.main")
        .depends_on("lib.utils")
        .with_rule("home", "MainUnit");
    common::write_package_zip(&path, &manifest, &common::app_table("app.main"), &[]);

    let package = read_bundle_package(&path, None).unwrap();
    assert_eq!(package.manifest, manifest);
    assert_eq!(package.artifacts.table, common::app_table("app.main").build().unwrap());
    assert_eq!(package.artifacts.symbols, common::app_table("app.main").symbols());
}

#[test]
fn test_archive_native_code_is_extracted_into_the_cache() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("lib.native.zip");
    let cache = dir.path().join("cache");
    let mut manifest = SmBundleManifest::library("lib.native");
    manifest.native_library = Some("libnative.so".to_string());
    common::write_package_zip(
        &path,
        &manifest,
        &common::library_table("lib.native"),
        &[("lib/libnative.so", &b"\x7fELF-not-really"[..])],
    );

    assert!(matches!(
        read_bundle_package(&path, None),
        Err(SmError::Validation { .. })
    ));

    let package = read_bundle_package(&path, Some(&cache)).unwrap();
    let expected = cache.join("lib.native").join("libnative.so");
    match &package.artifacts.code {
        SmCodeArtifact::Native(extracted) => assert_eq!(extracted, &expected),
        other => panic!("expected native code, got {:?}", other),
    }
    assert_eq!(fs::read(&expected).unwrap(), b"\x7fELF-not-really");
}

#[test]
fn test_native_code_never_lands_outside_the_cache() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("escape.zip");
    let cache = dir.path().join("cache");
    let mut manifest = SmBundleManifest::library("..");
    manifest.native_library = Some("libnative.so".to_string());
    common::write_package_zip(
        &path,
        &manifest,
        &common::library_table("lib.native"),
        &[("lib/libnative.so", &b"\x7fELF-not-really"[..])],
    );

    assert!(matches!(
        read_bundle_package(&path, Some(&cache)),
        Err(SmError::Validation { .. })
    ));
    assert!(!dir.path().join("libnative.so").exists());
    assert!(!cache.exists());
}

#[test]
fn test_package_name_must_match_table() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("pkg");
    common::write_package_dir(&root, &SmBundleManifest::library("lib.utils"), &common::library_table("lib.other"));

    assert!(matches!(
        read_bundle_package(&root, None),
        Err(SmError::Validation { .. })
    ));
}

#[test]
fn test_incomplete_packages_are_rejected() {
    let dir = TempDir::new().unwrap();
    let root = dir.path().join("pkg");
    common::write_package_dir(&root, &SmBundleManifest::library("lib.utils"), &common::library_table("lib.utils"));

    fs::write(root.join("resources.arsc"), b"garbage").unwrap();
    assert!(matches!(
        read_bundle_package(&root, None),
        Err(SmError::MalformedTable { .. })
    ));

    fs::remove_file(root.join("resources.arsc")).unwrap();
    assert!(matches!(read_bundle_package(&root, None), Err(SmError::Io(_))));

    fs::write(root.join("bundle.json"), r#"{"name": "lib.utils"}"#).unwrap();
    assert!(matches!(read_bundle_package(&root, None), Err(SmError::Serde(_))));
}

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

//! Fixtures shared by the integration tests.

#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::sync::{Arc, Mutex};

use small::{
    SmBundleArtifacts, SmBundleManifest, SmCodeArtifact, SmCodeTable, SmHost, SmLaunchContext,
    SmResourceValue, SmRoutableUnit, SmRuntime, SmRuntimeConfigBuilder, SmShellKind,
    SmTableBuilder,
};

pub const ACCENT: u32 = 0xFF33_66CC;

pub type LaunchLog = Arc<Mutex<Vec<SmLaunchContext>>>;

pub fn launch_log() -> LaunchLog {
    Arc::new(Mutex::new(Vec::new()))
}

/// Routable unit that records every context it is attached with.
pub struct RecordingUnit {
    log: LaunchLog,
}

impl SmRoutableUnit for RecordingUnit {
    fn on_attach(&mut self, context: &SmLaunchContext) -> small::Result<()> {
        self.log.lock().unwrap().push(context.clone());
        Ok(())
    }
}

pub fn code(units: &[(&str, SmShellKind)], classes: &[&str], log: &LaunchLog) -> SmCodeArtifact {
    let mut table = SmCodeTable::new();
    for (class, kind) in units {
        let log = log.clone();
        table.register_unit(class, *kind, move || {
            Box::new(RecordingUnit { log: log.clone() })
        });
    }
    for class in classes {
        table.register_class(class);
    }
    SmCodeArtifact::Table(Arc::new(table))
}

/// Library table exporting `color/accent` and `string/greeting`.
pub fn library_table(name: &str) -> SmTableBuilder {
    let mut builder = SmTableBuilder::new(name);
    builder.value("color", "accent", SmResourceValue::Color(ACCENT));
    builder.value(
        "string",
        "greeting",
        SmResourceValue::String(format!("hello from {}", name)),
    );
    builder
}

/// Application table whose `color/title` references the imported `color/accent`.
pub fn app_table(name: &str) -> SmTableBuilder {
    let mut builder = SmTableBuilder::new(name);
    let accent = builder.import("color", "accent");
    builder.value("color", "title", SmResourceValue::Reference(accent));
    builder.value("string", "app_name", SmResourceValue::String(name.to_string()));
    builder
}

pub fn artifacts(builder: &SmTableBuilder, code: SmCodeArtifact) -> SmBundleArtifacts {
    SmBundleArtifacts::new(builder.build().unwrap(), builder.symbols(), code)
}

pub fn library_bundle(name: &str, classes: &[&str]) -> (SmBundleManifest, SmBundleArtifacts) {
    let log = launch_log();
    (
        SmBundleManifest::library(name),
        artifacts(&library_table(name), code(&[], classes, &log)),
    )
}

pub fn app_bundle(
    name: &str,
    dependency: &str,
    units: &[(&str, SmShellKind)],
    log: &LaunchLog,
) -> (SmBundleManifest, SmBundleArtifacts) {
    (
        SmBundleManifest::application(name).depends_on(dependency),
        artifacts(&app_table(name), code(units, &[], log)),
    )
}

pub fn runtime_in(dir: &Path) -> SmRuntime {
    runtime_with_host(dir, SmHost::empty())
}

pub fn runtime_with_host(dir: &Path, host: SmHost) -> SmRuntime {
    let config = SmRuntimeConfigBuilder::new()
        .state_path(dir.join("slots.json"))
        .code_cache_dir(dir.join("code"))
        .build()
        .unwrap();
    SmRuntime::new(config, host).unwrap()
}

/// Lay a package out as a directory.
pub fn write_package_dir(dir: &Path, manifest: &SmBundleManifest, builder: &SmTableBuilder) {
    fs::create_dir_all(dir).unwrap();
    fs::write(dir.join("bundle.json"), serde_json::to_vec_pretty(manifest).unwrap()).unwrap();
    fs::write(dir.join("resources.arsc"), builder.build().unwrap()).unwrap();
    fs::write(dir.join("R.txt"), builder.symbols().to_text()).unwrap();
}

/// Lay a package out as a `.zip` archive, with optional extra entries.
pub fn write_package_zip(
    path: &Path,
    manifest: &SmBundleManifest,
    builder: &SmTableBuilder,
    extra: &[(&str, &[u8])],
) {
    let mut zip = zip::ZipWriter::new(File::create(path).unwrap());
    let options = zip::write::FileOptions::default();

    zip.start_file("bundle.json", options).unwrap();
    zip.write_all(&serde_json::to_vec(manifest).unwrap()).unwrap();
    zip.start_file("resources.arsc", options).unwrap();
    zip.write_all(&builder.build().unwrap()).unwrap();
    zip.start_file("R.txt", options).unwrap();
    zip.write_all(builder.symbols().to_text().as_bytes()).unwrap();
    for (name, bytes) in extra {
        zip.start_file(*name, options).unwrap();
        zip.write_all(bytes).unwrap();
    }
    zip.finish().unwrap();
}

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

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

use small::{SmBundleManifest, SmCodeArtifact, SmError, SmLoadState, SmRuntime, SmShellKind};
use tempfile::TempDir;

fn installed(dir: &TempDir) -> SmRuntime {
    let runtime = common::runtime_in(dir.path());
    let log = common::launch_log();
    let (manifest, artifacts) = common::library_bundle("lib.utils", &["Helper"]);
    runtime.install(manifest, artifacts).unwrap();
    let (manifest, artifacts) =
        common::app_bundle("app.main", "lib.utils", &[("MainUnit", SmShellKind::Standard)], &log);
    runtime.install(manifest, artifacts).unwrap();
    runtime
}

#[test]
fn test_loading_brings_dependencies_in_first() {
    let dir = TempDir::new().unwrap();
    let runtime = installed(&dir);

    let app = runtime.ensure_loaded("app.main").unwrap();
    assert_eq!(app.slot, 0x03);
    assert_eq!(app.table.package_id(), 0x03);
    assert_eq!(app.digest.len(), 64);

    let lib = runtime.registry().resolve("lib.utils").unwrap();
    assert_eq!(lib.state(), SmLoadState::Loaded);
    assert_eq!(lib.resident().unwrap().slot, 0x02);
}

#[test]
fn test_concurrent_loads_share_one_transition() {
    let dir = TempDir::new().unwrap();
    let runtime = Arc::new(installed(&dir));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let runtime = runtime.clone();
            thread::spawn(move || runtime.ensure_loaded("app.main").unwrap())
        })
        .collect();
    let residents: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

    for resident in &residents[1..] {
        assert!(Arc::ptr_eq(resident, &residents[0]));
    }
    for name in ["app.main", "lib.utils"] {
        let bundle = runtime.registry().resolve(name).unwrap();
        assert_eq!(bundle.load_transitions(), 1, "{} loaded more than once", name);
        assert_eq!(bundle.state(), SmLoadState::Loaded);
    }
}

#[test]
fn test_failed_dependency_fails_dependents_for_good() {
    let dir = TempDir::new().unwrap();
    let runtime = common::runtime_in(dir.path());
    let log = common::launch_log();

    let broken = common::artifacts(
        &common::library_table("lib.broken"),
        SmCodeArtifact::Native(PathBuf::from("/nonexistent/libbroken.so")),
    );
    runtime.install(SmBundleManifest::library("lib.broken"), broken).unwrap();
    let (manifest, artifacts) =
        common::app_bundle("app.main", "lib.broken", &[("MainUnit", SmShellKind::Standard)], &log);
    runtime.install(manifest, artifacts).unwrap();

    let err = runtime.ensure_loaded("app.main").unwrap_err();
    match &err {
        SmError::DependencyLoadFailed { bundle, dependency, .. } => {
            assert_eq!(bundle, "app.main");
            assert_eq!(dependency, "lib.broken");
        }
        other => panic!("expected a dependency failure, got {:?}", other),
    }

    let lib = runtime.registry().resolve("lib.broken").unwrap();
    assert!(matches!(lib.state(), SmLoadState::Failed(SmError::Library(_))));

    // Failed is terminal: no second attempt, same error.
    assert_eq!(runtime.ensure_loaded("app.main").unwrap_err(), err);
    assert!(matches!(runtime.ensure_loaded("lib.broken"), Err(SmError::Library(_))));
    assert_eq!(lib.load_transitions(), 1);
    assert_eq!(runtime.registry().resolve("app.main").unwrap().load_transitions(), 1);
}

#[test]
fn test_unknown_bundle_cannot_load() {
    let dir = TempDir::new().unwrap();
    let runtime = common::runtime_in(dir.path());
    assert_eq!(
        runtime.ensure_loaded("ghost").unwrap_err(),
        SmError::UnknownBundle {
            bundle: "ghost".to_string()
        }
    );
}

#[test]
fn test_preload_reports_each_bundle() {
    let dir = TempDir::new().unwrap();
    let runtime = installed(&dir);
    let (manifest, artifacts) = common::library_bundle("lib.extra", &[]);
    runtime.install(manifest, artifacts).unwrap();

    let names = vec!["lib.extra".to_string(), "app.main".to_string(), "ghost".to_string()];
    let results = runtime.preload(&names);
    assert_eq!(results.len(), 3);
    assert_eq!(results[0].as_ref().unwrap().name, "lib.extra");
    assert_eq!(results[1].as_ref().unwrap().name, "app.main");
    assert!(matches!(results[2], Err(SmError::UnknownBundle { .. })));

    let all = runtime.preload_all().unwrap();
    assert_eq!(all.len(), 3);
    assert!(all.iter().all(|(_, result)| result.is_ok()));
    assert_eq!(all.last().map(|(name, _)| name.as_str()), Some("app.main"));
}

#[test]
fn test_bundles_mid_install_are_not_loaded() {
    let dir = TempDir::new().unwrap();
    let runtime = common::runtime_in(dir.path());
    let log = common::launch_log();

    // Registered but not yet allocated or patched, as during a batch install.
    let registry = runtime.registry();
    registry.register_manifest(SmBundleManifest::library("L")).unwrap();
    registry
        .register_manifest(SmBundleManifest::application("A").depends_on("L"))
        .unwrap();

    assert_eq!(
        runtime.ensure_loaded("A").unwrap_err(),
        SmError::BundleNotLoaded {
            bundle: "L".to_string()
        }
    );
    assert_eq!(
        runtime.ensure_loaded("L").unwrap_err(),
        SmError::BundleNotLoaded {
            bundle: "L".to_string()
        }
    );
    for name in ["A", "L"] {
        let bundle = registry.resolve(name).unwrap();
        assert_eq!(bundle.state(), SmLoadState::Registered);
        assert_eq!(bundle.load_transitions(), 0);
    }

    registry.remove("A");
    registry.remove("L");
    let report = runtime
        .install_all(vec![
            common::library_bundle("L", &[]),
            common::app_bundle("A", "L", &[("MainUnit", SmShellKind::Standard)], &log),
        ])
        .unwrap();
    assert!(report.is_complete());
    assert_eq!(runtime.ensure_loaded("A").unwrap().slot, 0x03);
}

#[test]
fn test_loading_during_batch_install_recovers_once_installed() {
    let dir = TempDir::new().unwrap();
    let runtime = Arc::new(common::runtime_in(dir.path()));
    let log = common::launch_log();

    let mut batch = vec![common::library_bundle("L", &[])];
    for i in 0..20 {
        batch.push(common::app_bundle(
            &format!("app{:02}", i),
            "L",
            &[("MainUnit", SmShellKind::Standard)],
            &log,
        ));
    }

    let done = Arc::new(AtomicBool::new(false));
    let poller = {
        let runtime = runtime.clone();
        let done = done.clone();
        thread::spawn(move || {
            while !done.load(Ordering::SeqCst) {
                let _ = runtime.ensure_loaded("app19");
                let _ = runtime.ensure_loaded("L");
            }
        })
    };

    let report = runtime.install_all(batch).unwrap();
    done.store(true, Ordering::SeqCst);
    poller.join().unwrap();

    assert!(report.is_complete());
    assert_eq!(report.installed.len(), 21);
    assert!(runtime.ensure_loaded("app19").is_ok());
    assert_eq!(runtime.registry().resolve("L").unwrap().state(), SmLoadState::Loaded);
    assert_eq!(runtime.dispatch("app://app19/MainUnit").unwrap().unit(), "MainUnit");
}

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

use small::{
    SmBundleManifest, SmError, SmHost, SmRuntime, SmRuntimeConfigBuilder, SmShellDecl,
    SmShellKind, SmShellOccupant,
};
use tempfile::TempDir;

fn install(runtime: &SmRuntime, log: &common::LaunchLog) {
    let (manifest, artifacts) = common::library_bundle("lib.utils", &["Helper"]);
    runtime.install(manifest, artifacts).unwrap();

    let manifest = SmBundleManifest::application("app.main")
        .depends_on("lib.utils")
        .with_uri("main")
        .with_default_unit("MainUnit")
        .with_rule("home", "MainUnit")
        .with_rule("dialog", "DialogUnit");
    let code = common::code(
        &[
            ("MainUnit", SmShellKind::Standard),
            ("DialogUnit", SmShellKind::Translucent),
            ("TaskUnit", SmShellKind::SingleTask),
        ],
        &[],
        log,
    );
    runtime
        .install(manifest, common::artifacts(&common::app_table("app.main"), code))
        .unwrap();
}

fn setup(dir: &TempDir) -> (SmRuntime, common::LaunchLog) {
    let runtime = common::runtime_in(dir.path());
    let log = common::launch_log();
    install(&runtime, &log);
    (runtime, log)
}

#[test]
fn test_dispatch_through_alias_and_rule() {
    let dir = TempDir::new().unwrap();
    let (runtime, log) = setup(&dir);

    let plan = runtime.dispatch("app://main/home?from=Home&id=7").unwrap();
    assert_eq!(plan.bundle(), "app.main");
    assert_eq!(plan.unit(), "MainUnit");
    assert_eq!(plan.shell_id(), "stub.A");
    assert_eq!(plan.context.param("from"), Some("Home"));
    assert_eq!(plan.context.param("id"), Some("7"));
    assert_eq!(plan.lease.evicted, None);

    plan.launch().unwrap();
    let seen = log.lock().unwrap();
    assert_eq!(seen.len(), 1);
    assert_eq!(seen[0], plan.context);
}

#[test]
fn test_dispatch_defaults() {
    let dir = TempDir::new().unwrap();
    let (runtime, _log) = setup(&dir);

    let plan = runtime.dispatch("app://app.main").unwrap();
    assert_eq!(plan.unit(), "MainUnit");

    let plan = runtime.dispatch("main/TaskUnit").unwrap();
    assert_eq!(plan.unit(), "TaskUnit");
    assert_eq!(plan.shell_id(), "stub.A3");
    assert_eq!(plan.context.shell_kind, SmShellKind::SingleTask);

    let plan = runtime.dispatch("app://main/dialog").unwrap();
    assert_eq!(plan.unit(), "DialogUnit");
    assert_eq!(plan.shell_id(), "stub.A5");
}

#[test]
fn test_dispatch_failures() {
    let dir = TempDir::new().unwrap();
    let (runtime, _log) = setup(&dir);

    assert_eq!(
        runtime.dispatch("app://app.main/Nope").unwrap_err(),
        SmError::UnknownUnit {
            bundle: "app.main".to_string(),
            unit: "Nope".to_string(),
        }
    );
    // Visible through the chain but not routable.
    assert!(matches!(
        runtime.dispatch("app://app.main/Helper"),
        Err(SmError::UnknownUnit { .. })
    ));
    assert!(matches!(
        runtime.dispatch("app://ghost/MainUnit"),
        Err(SmError::UnknownBundle { .. })
    ));
    assert!(matches!(
        runtime.dispatch("http://app.main/MainUnit"),
        Err(SmError::InvalidUri { .. })
    ));
}

#[test]
fn test_least_recently_used_shell_is_taken_over() {
    let dir = TempDir::new().unwrap();
    let (runtime, _log) = setup(&dir);

    let first = runtime.dispatch("app://main/MainUnit?n=1").unwrap();
    let second = runtime.dispatch("app://main/MainUnit?n=2").unwrap();
    assert_eq!((first.shell_id(), second.shell_id()), ("stub.A", "stub.A1"));

    let third = runtime.dispatch("app://main/MainUnit?n=3").unwrap();
    assert_eq!(third.shell_id(), "stub.A");
    assert_eq!(
        third.lease.evicted,
        Some(SmShellOccupant {
            bundle: "app.main".to_string(),
            unit: "MainUnit".to_string(),
        })
    );

    assert!(runtime.release_shell("stub.A1").unwrap().is_some());
    let fourth = runtime.dispatch("app://main/MainUnit").unwrap();
    assert_eq!(fourth.shell_id(), "stub.A1");
    assert_eq!(fourth.lease.evicted, None);

    assert!(matches!(
        runtime.release_shell("stub.Z"),
        Err(SmError::Validation { .. })
    ));
}

#[test]
fn test_missing_shell_kind() {
    let dir = TempDir::new().unwrap();
    let config = SmRuntimeConfigBuilder::new()
        .state_path(dir.path().join("slots.json"))
        .shells(vec![SmShellDecl::new("stub.only", SmShellKind::Standard)])
        .build()
        .unwrap();
    let runtime = SmRuntime::new(config, SmHost::empty()).unwrap();
    let log = common::launch_log();
    install(&runtime, &log);

    assert_eq!(runtime.dispatch("app://main").unwrap().shell_id(), "stub.only");
    assert_eq!(
        runtime.dispatch("app://main/TaskUnit").unwrap_err(),
        SmError::NoShellAvailable {
            kind: "single_task".to_string()
        }
    );
}

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

use small::{SmBundleManifest, SmBundleRegistry, SmBundleRole, SmError, SmLoadState};

#[test]
fn test_register_and_resolve() {
    let registry = SmBundleRegistry::new();
    registry.register("lib.utils", SmBundleRole::Library, &[]).unwrap();
    let app = registry
        .register("app.main", SmBundleRole::Application, &["lib.utils"])
        .unwrap();

    assert_eq!(app.dependencies(), ["lib.utils".to_string()]);
    assert_eq!(app.state(), SmLoadState::Registered);
    assert_eq!(app.slot(), None);
    assert_eq!(registry.len(), 2);
    assert_eq!(registry.resolve("lib.utils").unwrap().role(), SmBundleRole::Library);
    assert_eq!(
        registry.resolve("missing").unwrap_err(),
        SmError::UnknownBundle {
            bundle: "missing".to_string()
        }
    );
}

#[test]
fn test_dependencies_may_register_later() {
    let registry = SmBundleRegistry::new();
    registry
        .register("app.main", SmBundleRole::Application, &["lib.utils"])
        .unwrap();
    registry.register("lib.utils", SmBundleRole::Library, &[]).unwrap();

    assert_eq!(registry.topological_order().unwrap(), vec!["lib.utils", "app.main"]);
}

#[test]
fn test_cycles_are_rejected_and_leave_registry_unchanged() {
    let registry = SmBundleRegistry::new();
    registry.register("a", SmBundleRole::Library, &["b"]).unwrap();
    registry.register("b", SmBundleRole::Library, &["c"]).unwrap();

    let err = registry.register("c", SmBundleRole::Library, &["a"]).unwrap_err();
    match err {
        SmError::CyclicDependency { bundle, cycle } => {
            assert_eq!(bundle, "c");
            assert_eq!(cycle.first(), cycle.last());
            assert!(cycle.contains(&"a".to_string()));
            assert!(cycle.contains(&"b".to_string()));
        }
        other => panic!("expected a cycle, got {:?}", other),
    }
    assert!(!registry.contains("c"));
    assert_eq!(registry.len(), 2);

    let err = registry.register("d", SmBundleRole::Library, &["d"]).unwrap_err();
    assert!(matches!(err, SmError::CyclicDependency { .. }));
}

#[test]
fn test_duplicates_are_rejected() {
    let registry = SmBundleRegistry::new();
    registry.register("lib.utils", SmBundleRole::Library, &[]).unwrap();
    let err = registry.register("lib.utils", SmBundleRole::Library, &[]).unwrap_err();
    assert!(matches!(err, SmError::Validation { .. }));
}

#[test]
fn test_libraries_cannot_depend_on_applications() {
    let registry = SmBundleRegistry::new();
    registry.register("app.main", SmBundleRole::Application, &[]).unwrap();
    let err = registry
        .register("lib.bad", SmBundleRole::Library, &["app.main"])
        .unwrap_err();
    assert!(matches!(err, SmError::Validation { .. }));

    // The same edge registered in the other order.
    registry
        .register("lib.early", SmBundleRole::Library, &["app.late"])
        .unwrap();
    let err = registry
        .register("app.late", SmBundleRole::Application, &[])
        .unwrap_err();
    assert!(matches!(err, SmError::Validation { .. }));

    // Applications may depend on applications.
    registry
        .register("app.shell", SmBundleRole::Application, &["app.main"])
        .unwrap();
}

#[test]
fn test_aliases_route_to_bundles() {
    let registry = SmBundleRegistry::new();
    registry
        .register_manifest(SmBundleManifest::application("app.main").with_uri("main"))
        .unwrap();

    assert_eq!(registry.resolve_alias("main").unwrap().name(), "app.main");
    assert_eq!(registry.resolve_alias("app.main").unwrap().name(), "app.main");
    assert!(matches!(
        registry.resolve_alias("other"),
        Err(SmError::UnknownBundle { .. })
    ));

    let err = registry
        .register_manifest(SmBundleManifest::application("app.other").with_uri("main"))
        .unwrap_err();
    assert!(matches!(err, SmError::Validation { .. }));

    registry.remove("app.main");
    assert!(registry.resolve_alias("main").is_err());
}

#[test]
fn test_closure_and_levels() {
    let registry = SmBundleRegistry::new();
    registry.register("lib.base", SmBundleRole::Library, &[]).unwrap();
    registry.register("lib.ui", SmBundleRole::Library, &["lib.base"]).unwrap();
    registry.register("lib.net", SmBundleRole::Library, &["lib.base"]).unwrap();
    registry
        .register("app.main", SmBundleRole::Application, &["lib.ui", "lib.net"])
        .unwrap();

    let closure = registry.closure_order("app.main").unwrap();
    assert_eq!(closure.len(), 3);
    assert_eq!(closure.first().map(String::as_str), Some("lib.base"));

    let levels = registry.levels().unwrap();
    assert_eq!(levels[0], vec!["lib.base"]);
    assert_eq!(levels[1], vec!["lib.net", "lib.ui"]);
    assert_eq!(levels[2], vec!["app.main"]);
}

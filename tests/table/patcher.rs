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

use std::sync::Arc;

use small::{
    SmDependencyExports, SmError, SmPatchRequest, SmPatchedTable, SmResourceBody, SmResourceId,
    SmResourceTable, SmResourceValue, SmSymbol, SmSymbolTable, SmTableBuilder, SmTablePatcher,
};

fn patch(
    bundle: &str,
    slot: u8,
    builder: &SmTableBuilder,
    dependencies: &[SmDependencyExports],
    host: Option<&SmSymbolTable>,
) -> small::Result<SmPatchedTable> {
    let table = builder.build().unwrap();
    let symbols = builder.symbols();
    SmTablePatcher::patch(&SmPatchRequest {
        bundle,
        slot,
        table: &table,
        symbols: &symbols,
        dependencies,
        host,
    })
}

fn patched_library() -> SmDependencyExports {
    let lib = patch("lib.utils", 0x02, &common::library_table("lib.utils"), &[], None).unwrap();
    SmDependencyExports::new("lib.utils", 0x02, Arc::new(lib.symbols))
}

#[test]
fn test_local_identifiers_move_to_the_slot() {
    let patched = patch("lib.utils", 0x02, &common::library_table("lib.utils"), &[], None).unwrap();
    let table = SmResourceTable::parse(&patched.table).unwrap();

    assert_eq!(table.package_id(), 0x02);
    let accent = table.find("color", "accent").unwrap();
    assert_eq!(accent.id, SmResourceId(0x0201_0000));
    assert_eq!(accent.value(), Some(&SmResourceValue::Color(common::ACCENT)));
    assert_eq!(patched.symbols.id_of("color", "accent"), Some(SmResourceId(0x0201_0000)));
    assert_eq!(patched.symbols.id_of("string", "greeting"), Some(SmResourceId(0x0202_0000)));
    assert!(!patched.stats.already_patched);
}

#[test]
fn test_dependency_references_take_the_owner_slot() {
    let lib = patched_library();
    let patched = patch("app.main", 0x03, &common::app_table("app.main"), &[lib], None).unwrap();
    let table = SmResourceTable::parse(&patched.table).unwrap();

    let title = table.find("color", "title").unwrap();
    assert_eq!(title.id, SmResourceId(0x0301_0000));
    assert_eq!(
        title.value(),
        Some(&SmResourceValue::Reference(SmResourceId(0x0201_0000)))
    );
    assert_eq!(patched.symbols.id_of("color", "accent"), Some(SmResourceId(0x0201_0000)));
    assert_eq!(patched.symbols.id_of("string", "app_name"), Some(SmResourceId(0x0302_0000)));
    assert!(patched.stats.dependency_rewrites > 0);
    assert_eq!(patched.stats.host_references, 0);
}

#[test]
fn test_only_identifier_bytes_change() {
    let mut builder = common::library_table("lib.utils");
    let accent = builder.value("color", "accent", SmResourceValue::Color(common::ACCENT));
    builder.value("color", "link", SmResourceValue::Reference(accent));

    let original = builder.build().unwrap();
    let patched = patch("lib.utils", 0x05, &builder, &[], None).unwrap();

    assert_eq!(original.len(), patched.table.len());
    let changed: Vec<(u8, u8)> = original
        .iter()
        .zip(patched.table.iter())
        .filter(|(a, b)| a != b)
        .map(|(a, b)| (*a, *b))
        .collect();
    // Package id plus the high byte of the one local reference.
    assert_eq!(changed, vec![(0x7F, 0x05), (0x7F, 0x05)]);
}

#[test]
fn test_patching_twice_is_a_no_op() {
    let once = patch("lib.utils", 0x02, &common::library_table("lib.utils"), &[], None).unwrap();
    let twice = SmTablePatcher::patch(&SmPatchRequest {
        bundle: "lib.utils",
        slot: 0x02,
        table: &once.table,
        symbols: &once.symbols,
        dependencies: &[],
        host: None,
    })
    .unwrap();

    assert!(twice.stats.already_patched);
    assert_eq!(twice.table, once.table);
    assert_eq!(twice.symbols, once.symbols);
}

#[test]
fn test_bags_and_host_references() {
    let mut host = SmSymbolTable::new();
    host.push(SmSymbol::Id {
        type_name: "style".to_string(),
        name: "Theme.Base".to_string(),
        id: SmResourceId(0x7F03_0001),
    });

    let mut builder = SmTableBuilder::new("app.main");
    let base = builder.import("style", "Theme.Base");
    let accent = builder.import("color", "accent");
    let text_color = builder.value("attr", "textColor", SmResourceValue::Int(0));
    builder.bag(
        "style",
        "Theme.Main",
        base,
        vec![(text_color, SmResourceValue::Reference(accent))],
    );

    let patched = patch("app.main", 0x03, &builder, &[patched_library()], Some(&host)).unwrap();
    let table = SmResourceTable::parse(&patched.table).unwrap();
    let theme = table.find("style", "Theme.Main").unwrap();

    match &theme.body {
        SmResourceBody::Bag { parent, items } => {
            assert_eq!(*parent, SmResourceId(0x7F03_0001));
            assert_eq!(
                items,
                &vec![(
                    SmResourceId(0x0301_0000),
                    SmResourceValue::Reference(SmResourceId(0x0201_0000))
                )]
            );
        }
        other => panic!("expected a bag, found {:?}", other),
    }
    assert!(patched.stats.host_references > 0);
    assert!(patched.stats.dependency_rewrites > 0);
}

#[test]
fn test_styleable_arrays_are_rewritten_and_indices_kept() {
    let mut builder = SmTableBuilder::new("app.main");
    let text_color = builder.value("attr", "textColor", SmResourceValue::Int(0));
    let accent = builder.import("color", "accent");
    builder.styleable("Widget", &[text_color, accent]);

    let patched = patch("app.main", 0x03, &builder, &[patched_library()], None).unwrap();

    assert_eq!(
        patched.symbols.lookup("styleable", "Widget"),
        Some(&SmSymbol::Array {
            type_name: "styleable".to_string(),
            name: "Widget".to_string(),
            ids: vec![SmResourceId(0x0301_0000), SmResourceId(0x0201_0000)],
        })
    );
    assert_eq!(
        patched.symbols.lookup("styleable", "Widget_accent"),
        Some(&SmSymbol::Index {
            type_name: "styleable".to_string(),
            name: "Widget_accent".to_string(),
            index: 1,
        })
    );
}

#[test]
fn test_library_chunk_gets_dependency_slot() {
    let mut builder = common::app_table("app.main");
    builder.library("lib.utils");

    let patched = patch("app.main", 0x03, &builder, &[patched_library()], None).unwrap();
    let table = SmResourceTable::parse(&patched.table).unwrap();
    let libraries: Vec<(String, u8)> = table.libraries().map(|(n, s)| (n.to_string(), s)).collect();
    assert_eq!(libraries, vec![("lib.utils".to_string(), 0x02)]);
}

#[test]
fn test_unowned_names_are_unresolved() {
    let err = patch("app.main", 0x03, &common::app_table("app.main"), &[], None).unwrap_err();
    assert_eq!(
        err,
        SmError::UnresolvedDependency {
            bundle: "app.main".to_string(),
            dependency: "color/accent".to_string(),
        }
    );

    let pending = [SmDependencyExports::pending("lib.utils")];
    let err = patch("app.main", 0x03, &common::app_table("app.main"), &pending, None).unwrap_err();
    assert_eq!(
        err,
        SmError::UnresolvedDependency {
            bundle: "app.main".to_string(),
            dependency: "lib.utils".to_string(),
        }
    );
}

#[test]
fn test_rejects_bad_inputs() {
    let builder = common::library_table("lib.utils");
    let table = builder.build().unwrap();

    let truncated = SmTablePatcher::patch(&SmPatchRequest {
        bundle: "lib.utils",
        slot: 0x02,
        table: &table[..table.len() / 2],
        symbols: &builder.symbols(),
        dependencies: &[],
        host: None,
    });
    assert!(matches!(truncated, Err(SmError::MalformedTable { .. })));

    let foreign = SmTableBuilder::new("lib.utils").with_package_id(0x05);
    let err = patch("lib.utils", 0x02, &foreign, &[], None).unwrap_err();
    assert!(matches!(err, SmError::MalformedTable { .. }));

    for slot in [0x00, 0x01, 0x7F] {
        let err = patch("lib.utils", slot, &builder, &[], None).unwrap_err();
        assert!(matches!(err, SmError::Validation { .. }));
    }
}

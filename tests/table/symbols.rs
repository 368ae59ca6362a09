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

use small::{SmError, SmResourceId, SmSymbol, SmSymbolTable};

const SAMPLE: &str = "\
# generated
int color primary 0x7f010000
int attr label 0x7f020000
int attr tint 0x7f020001

int[] styleable Badge { 0x7f020000, 0x7f020001 }
int styleable Badge_label 0
int styleable Badge_tint 1
int[] styleable Empty { }
";

#[test]
fn test_parse_all_symbol_kinds() {
    let table = SmSymbolTable::parse(SAMPLE).unwrap();

    assert_eq!(table.len(), 7);
    assert_eq!(table.id_of("color", "primary"), Some(SmResourceId(0x7F01_0000)));
    assert_eq!(
        table.lookup("styleable", "Badge"),
        Some(&SmSymbol::Array {
            type_name: "styleable".to_string(),
            name: "Badge".to_string(),
            ids: vec![SmResourceId(0x7F02_0000), SmResourceId(0x7F02_0001)],
        })
    );
    assert_eq!(
        table.lookup("styleable", "Badge_tint"),
        Some(&SmSymbol::Index {
            type_name: "styleable".to_string(),
            name: "Badge_tint".to_string(),
            index: 1,
        })
    );
    assert_eq!(table.id_of("styleable", "Badge_tint"), None);
    assert!(matches!(
        table.lookup("styleable", "Empty"),
        Some(SmSymbol::Array { ids, .. }) if ids.is_empty()
    ));
}

#[test]
fn test_text_output_parses_back_to_the_same_table() {
    let table = SmSymbolTable::parse(SAMPLE).unwrap();
    let text = table.to_text();

    assert!(text.contains("int color primary 0x7f010000\n"));
    assert!(text.contains("int[] styleable Empty { }\n"));
    assert_eq!(SmSymbolTable::parse(&text).unwrap(), table);
}

#[test]
fn test_push_replaces_same_name() {
    let mut table = SmSymbolTable::new();
    table.push(SmSymbol::Id {
        type_name: "color".to_string(),
        name: "primary".to_string(),
        id: SmResourceId(0x7F01_0000),
    });
    table.push(SmSymbol::Id {
        type_name: "color".to_string(),
        name: "primary".to_string(),
        id: SmResourceId(0x0201_0000),
    });

    assert_eq!(table.len(), 1);
    assert_eq!(table.id_of("color", "primary"), Some(SmResourceId(0x0201_0000)));
}

#[test]
fn test_malformed_lines_report_their_number() {
    for (text, line) in [
        ("int color primary\n", 1),
        ("int color primary 0x7f010000\nint color accent 0xZZ\n", 2),
        ("int[] styleable Badge 0x7f020000\n", 1),
        ("long color primary 0x7f010000\n", 1),
    ] {
        match SmSymbolTable::parse(text) {
            Err(SmError::MalformedTable { message }) => {
                assert!(
                    message.starts_with(&format!("R.txt line {}:", line)),
                    "unexpected message: {}",
                    message
                );
            }
            other => panic!("expected a malformed table for {:?}, got {:?}", text, other),
        }
    }
}

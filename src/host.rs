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

use std::fmt;
use std::sync::Arc;

use crate::code::{SmCodeSource, SmCodeTable};
use crate::errors::{Result, SmError};
use crate::table::{SmResourceTable, SmSymbolTable, SM_HOST_SLOT};

/// The embedding application: last link of every resolution chain.
#[derive(Clone)]
pub struct SmHost {
    code: Arc<dyn SmCodeSource>,
    symbols: Arc<SmSymbolTable>,
    table: Option<Arc<SmResourceTable>>,
}

impl SmHost {
    pub fn new(code: Arc<dyn SmCodeSource>) -> Self {
        SmHost {
            code,
            symbols: Arc::new(SmSymbolTable::new()),
            table: None,
        }
    }

    pub fn empty() -> Self {
        Self::new(Arc::new(SmCodeTable::new()))
    }

    /// Symbols bundles may reference without declaring a dependency.
    pub fn with_symbols(mut self, symbols: SmSymbolTable) -> Self {
        self.symbols = Arc::new(symbols);
        self
    }

    /// Attach the host's compiled resources, which must live in the host slot.
    pub fn with_resources(mut self, table: &[u8]) -> Result<Self> {
        let parsed = SmResourceTable::parse(table)?;
        if parsed.package_id() != SM_HOST_SLOT {
            return Err(SmError::validation(format!(
                "host resources must use slot 0x{:02x}, found 0x{:02x}",
                SM_HOST_SLOT,
                parsed.package_id()
            )));
        }
        self.table = Some(Arc::new(parsed));
        Ok(self)
    }

    pub fn code(&self) -> &Arc<dyn SmCodeSource> {
        &self.code
    }

    pub fn symbols(&self) -> &Arc<SmSymbolTable> {
        &self.symbols
    }

    pub fn table(&self) -> Option<&Arc<SmResourceTable>> {
        self.table.as_ref()
    }
}

impl Default for SmHost {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for SmHost {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SmHost")
            .field("classes", &self.code.class_names())
            .field("symbols", &self.symbols.len())
            .field("resources", &self.table.as_ref().map(|t| t.len()))
            .finish()
    }
}

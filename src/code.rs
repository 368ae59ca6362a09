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

//! # Bundle Code
//!
//! A bundle's code is a set of named classes. A class is either a plain class
//! (visible to lookups only) or a routable unit, which carries the shell kind
//! it wants and a factory producing a fresh instance per launch.
//!
//! Code arrives either as an in-memory [`SmCodeTable`] or as a native library
//! exporting `small_bundle_register`, which fills a table when opened.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use libloading::Library;

use crate::errors::{Result, SmError};
use crate::router::{SmLaunchContext, SmShellKind};

/// Capability of a class that can be the target of a launch URI.
pub trait SmRoutableUnit: Send {
    /// Called once the unit has been placed in a shell.
    fn on_attach(&mut self, context: &SmLaunchContext) -> Result<()>;
}

pub type SmUnitFactory = Arc<dyn Fn() -> Box<dyn SmRoutableUnit> + Send + Sync>;

#[derive(Clone)]
pub enum SmCodeEntry {
    Unit {
        shell_kind: SmShellKind,
        factory: SmUnitFactory,
    },
    Class,
}

impl SmCodeEntry {
    pub fn is_unit(&self) -> bool {
        matches!(self, SmCodeEntry::Unit { .. })
    }
}

impl fmt::Debug for SmCodeEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmCodeEntry::Unit { shell_kind, .. } => f
                .debug_struct("Unit")
                .field("shell_kind", shell_kind)
                .finish_non_exhaustive(),
            SmCodeEntry::Class => f.write_str("Class"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SmCodeOwner {
    Bundle(String),
    Host,
}

impl fmt::Display for SmCodeOwner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SmCodeOwner::Bundle(name) => f.write_str(name),
            SmCodeOwner::Host => f.write_str("<host>"),
        }
    }
}

/// Result of a class lookup: the class and which code source defined it.
#[derive(Clone, Debug)]
pub struct SmCodeHandle {
    pub owner: SmCodeOwner,
    pub class: String,
    pub entry: SmCodeEntry,
}

impl SmCodeHandle {
    /// Instantiate the unit. `None` for plain classes.
    pub fn instantiate(&self) -> Option<Box<dyn SmRoutableUnit>> {
        match &self.entry {
            SmCodeEntry::Unit { factory, .. } => Some(factory()),
            SmCodeEntry::Class => None,
        }
    }
}

/// Anything that can answer "is this class defined here?".
pub trait SmCodeSource: Send + Sync {
    fn lookup(&self, class: &str) -> Option<SmCodeEntry>;

    fn class_names(&self) -> Vec<String>;
}

#[derive(Clone, Default)]
pub struct SmCodeTable {
    classes: BTreeMap<String, SmCodeEntry>,
}

impl SmCodeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_unit<F>(&mut self, class: &str, shell_kind: SmShellKind, factory: F) -> &mut Self
    where
        F: Fn() -> Box<dyn SmRoutableUnit> + Send + Sync + 'static,
    {
        self.classes.insert(
            class.to_string(),
            SmCodeEntry::Unit {
                shell_kind,
                factory: Arc::new(factory),
            },
        );
        self
    }

    pub fn register_class(&mut self, class: &str) -> &mut Self {
        self.classes.insert(class.to_string(), SmCodeEntry::Class);
        self
    }

    /// Make every unit factory, and every unit it creates, hold `keeper`.
    /// Factories handed out by lookups then cannot outlive it.
    fn retain_with<K: Send + Sync + 'static>(&mut self, keeper: Arc<K>) {
        for entry in self.classes.values_mut() {
            if let SmCodeEntry::Unit { factory, .. } = entry {
                let pinned = SmPinnedFactory {
                    factory: factory.clone(),
                    keeper: keeper.clone(),
                };
                *factory = Arc::new(move || pinned.create());
            }
        }
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }
}

impl fmt::Debug for SmCodeTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.classes.iter()).finish()
    }
}

impl SmCodeSource for SmCodeTable {
    fn lookup(&self, class: &str) -> Option<SmCodeEntry> {
        self.classes.get(class).cloned()
    }

    fn class_names(&self) -> Vec<String> {
        self.classes.keys().cloned().collect()
    }
}

// Fields drop in declaration order: the factory before its keeper.
struct SmPinnedFactory<K> {
    factory: SmUnitFactory,
    keeper: Arc<K>,
}

impl<K: Send + Sync + 'static> SmPinnedFactory<K> {
    fn create(&self) -> Box<dyn SmRoutableUnit> {
        Box::new(SmPinnedUnit {
            unit: (self.factory)(),
            _keeper: self.keeper.clone(),
        })
    }
}

struct SmPinnedUnit<K> {
    unit: Box<dyn SmRoutableUnit>,
    _keeper: Arc<K>,
}

impl<K: Send + Sync> SmRoutableUnit for SmPinnedUnit<K> {
    fn on_attach(&mut self, context: &SmLaunchContext) -> Result<()> {
        self.unit.on_attach(context)
    }
}

#[allow(improper_ctypes_definitions)]
type SmBundleRegisterFn = unsafe extern "C" fn(*mut SmCodeTable) -> bool;

const REGISTER_SYMBOL: &[u8] = b"small_bundle_register\0";

/// Code loaded from a native library.
pub struct SmNativeCode {
    table: SmCodeTable,
    path: PathBuf,
    _library: Arc<Library>,
}

impl SmNativeCode {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let mut table = SmCodeTable::new();
        let library = unsafe {
            let library = Library::new(path)?;
            let register: libloading::Symbol<SmBundleRegisterFn> =
                library.get(REGISTER_SYMBOL).map_err(|err| {
                    SmError::Library(format!(
                        "'{}' is missing symbol 'small_bundle_register': {}",
                        path.display(),
                        err
                    ))
                })?;
            if !register(&mut table as *mut SmCodeTable) {
                return Err(SmError::Library(format!(
                    "'{}' reported a registration failure",
                    path.display()
                )));
            }
            Arc::new(library)
        };
        table.retain_with(library.clone());

        log::debug!(
            "small.code.native_opened: native code registered - path={}, classes={}",
            path.display(),
            table.len()
        );

        Ok(SmNativeCode {
            table,
            path: path.to_path_buf(),
            _library: library,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SmCodeSource for SmNativeCode {
    fn lookup(&self, class: &str) -> Option<SmCodeEntry> {
        self.table.lookup(class)
    }

    fn class_names(&self) -> Vec<String> {
        self.table.class_names()
    }
}

/// Code shipped with a bundle, before it is attached.
#[derive(Clone, Debug, Default)]
pub enum SmCodeArtifact {
    Table(Arc<SmCodeTable>),
    Native(PathBuf),
    #[default]
    None,
}

impl SmCodeArtifact {
    /// Produce the attached code source. `None` attaches an empty table.
    pub fn attach(&self) -> Result<Arc<dyn SmCodeSource>> {
        let source: Arc<dyn SmCodeSource> = match self {
            SmCodeArtifact::Table(table) => table.clone(),
            SmCodeArtifact::Native(path) => Arc::new(SmNativeCode::open(path)?),
            SmCodeArtifact::None => Arc::new(SmCodeTable::new()),
        };
        Ok(source)
    }
}

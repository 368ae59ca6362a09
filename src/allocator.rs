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

//! # Namespace Slot Allocator
//!
//! Hands out one resource namespace slot per bundle and remembers it across
//! process restarts. Assignments live in a small JSON state file:
//!
//! ```json
//! {"format": 1, "assignments": {"lib.utils": 2, "app.main": 3}}
//! ```
//!
//! The allocator lock is held while the state file is rewritten, and the
//! in-memory table only changes once the write has reached disk. Two callers
//! can therefore never observe the same slot for different bundles, and a
//! crash never loses a slot that was already handed out.

use std::collections::{BTreeMap, BTreeSet};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::errors::{Result, SmError};
use crate::table::{SmSlot, SM_HOST_SLOT, SM_PLATFORM_SLOT};

const STATE_FORMAT: u32 = 1;

/// Range of slots the allocator may hand out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SmSlotPool {
    pub first: SmSlot,
    pub last: SmSlot,
    /// Slots inside the range that must never be assigned.
    #[serde(default)]
    pub reserved: BTreeSet<SmSlot>,
}

impl Default for SmSlotPool {
    fn default() -> Self {
        SmSlotPool {
            first: 0x02,
            last: 0x7E,
            reserved: BTreeSet::new(),
        }
    }
}

impl SmSlotPool {
    pub fn new(first: SmSlot, last: SmSlot) -> Self {
        SmSlotPool {
            first,
            last,
            reserved: BTreeSet::new(),
        }
    }

    pub fn with_reserved(mut self, reserved: impl IntoIterator<Item = SmSlot>) -> Self {
        self.reserved.extend(reserved);
        self
    }

    /// Whether `slot` may ever be assigned to a bundle.
    pub fn contains(&self, slot: SmSlot) -> bool {
        slot != 0
            && slot != SM_PLATFORM_SLOT
            && slot != SM_HOST_SLOT
            && slot >= self.first
            && slot <= self.last
            && !self.reserved.contains(&slot)
    }

    pub fn validate(&self) -> Result<()> {
        if self.first > self.last {
            return Err(SmError::validation(format!(
                "slot pool first 0x{:02x} exceeds last 0x{:02x}",
                self.first, self.last
            )));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize)]
struct SmAllocatorStateFile {
    format: u32,
    #[serde(default)]
    assignments: BTreeMap<String, SmSlot>,
}

#[derive(Debug)]
struct SmAllocatorState {
    by_bundle: BTreeMap<String, SmSlot>,
    taken: BTreeSet<SmSlot>,
}

/// Durable bundle-name to slot assignment table.
#[derive(Debug)]
pub struct SmSlotAllocator {
    path: PathBuf,
    pool: SmSlotPool,
    state: Mutex<SmAllocatorState>,
}

impl SmSlotAllocator {
    /// Open (or create) the allocator backed by the state file at `path`.
    ///
    /// Previously persisted assignments are loaded as-is; a slot that falls
    /// outside the current pool is kept for its bundle but not reused.
    pub fn open(path: impl AsRef<Path>, pool: SmSlotPool) -> Result<Self> {
        pool.validate()?;
        let path = path.as_ref().to_path_buf();

        let assignments = if path.exists() {
            let reader = BufReader::new(File::open(&path)?);
            let file: SmAllocatorStateFile = serde_json::from_reader(reader)?;
            if file.format != STATE_FORMAT {
                return Err(SmError::validation(format!(
                    "allocator state '{}' has unsupported format {}",
                    path.display(),
                    file.format
                )));
            }
            file.assignments
        } else {
            BTreeMap::new()
        };

        let mut taken = BTreeSet::new();
        for (bundle, slot) in &assignments {
            if *slot == 0 || *slot == SM_PLATFORM_SLOT || *slot == SM_HOST_SLOT {
                return Err(SmError::validation(format!(
                    "allocator state assigns reserved slot 0x{:02x} to '{}'",
                    slot, bundle
                )));
            }
            if !taken.insert(*slot) {
                return Err(SmError::validation(format!(
                    "allocator state assigns slot 0x{:02x} more than once",
                    slot
                )));
            }
        }

        log::info!(
            "small.slot.state_loaded: slot assignments restored - path={}, assignments={}",
            path.display(),
            assignments.len()
        );

        Ok(SmSlotAllocator {
            path,
            pool,
            state: Mutex::new(SmAllocatorState {
                by_bundle: assignments,
                taken,
            }),
        })
    }

    /// Slot for `bundle`, assigning the lowest free pool slot on first request.
    ///
    /// Idempotent: a bundle that already owns a slot always gets it back.
    pub fn allocate(&self, bundle: &str) -> Result<SmSlot> {
        if bundle.is_empty() {
            return Err(SmError::validation("bundle name cannot be empty"));
        }

        let mut state = self
            .state
            .lock()
            .map_err(|_| SmError::internal("slot allocator lock poisoned"))?;

        if let Some(slot) = state.by_bundle.get(bundle) {
            return Ok(*slot);
        }

        let slot = (self.pool.first..=self.pool.last)
            .find(|candidate| self.pool.contains(*candidate) && !state.taken.contains(candidate))
            .ok_or_else(|| SmError::PoolExhausted {
                bundle: bundle.to_string(),
            })?;

        let mut next = state.by_bundle.clone();
        next.insert(bundle.to_string(), slot);
        self.persist(&next)?;

        state.by_bundle = next;
        state.taken.insert(slot);

        log::info!(
            "small.slot.allocated: slot assigned - bundle={}, slot=0x{:02x}",
            bundle,
            slot
        );
        Ok(slot)
    }

    pub fn slot_of(&self, bundle: &str) -> Option<SmSlot> {
        self.state
            .lock()
            .ok()
            .and_then(|state| state.by_bundle.get(bundle).copied())
    }

    /// Snapshot of every persisted assignment.
    pub fn assignments(&self) -> BTreeMap<String, SmSlot> {
        self.state
            .lock()
            .map(|state| state.by_bundle.clone())
            .unwrap_or_default()
    }

    pub fn pool(&self) -> &SmSlotPool {
        &self.pool
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn persist(&self, assignments: &BTreeMap<String, SmSlot>) -> Result<()> {
        let parent = self
            .path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        fs::create_dir_all(parent)?;

        let stem = self
            .path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or("slots");
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let tmp_path = parent.join(format!(".{}.tmp.{}", stem, timestamp));

        let payload = SmAllocatorStateFile {
            format: STATE_FORMAT,
            assignments: assignments.clone(),
        };

        let write = || -> Result<()> {
            let mut file = File::create(&tmp_path)?;
            {
                let mut writer = BufWriter::new(&mut file);
                serde_json::to_writer_pretty(&mut writer, &payload)?;
                writer.flush()?;
            }
            file.sync_all()?;
            fs::rename(&tmp_path, &self.path)?;
            Ok(())
        };

        if let Err(err) = write() {
            let _ = fs::remove_file(&tmp_path);
            return Err(err);
        }

        if let Ok(dir) = File::open(parent) {
            let _ = dir.sync_all();
        }
        Ok(())
    }
}

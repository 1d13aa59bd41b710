// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Vehicle registry and merge policy.
//!
//! The registry keeps the most recent successful record per terminal, in
//! most-recently-seen-first order. It is the only shared mutable state in the
//! monitor: the poll scheduler, on-demand refreshes and the display all go
//! through [`EntityRegistry::upsert`] and [`EntityRegistry::snapshot_all`].

use std::sync::{Mutex, MutexGuard, PoisonError};

use log::{debug, warn};

use crate::publisher::{Publisher, Snapshot};
use crate::record::{EntityId, LocationRecord};

/// Result of merging one record into the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// A new terminal was added at the head of the list.
    Inserted,
    /// An existing terminal was updated in place.
    Replaced,
    /// The record carried a failure status and was not merged.
    Ignored,
}

impl UpsertOutcome {
    /// Whether the registry changed.
    #[must_use]
    pub fn is_mutation(self) -> bool {
        !matches!(self, Self::Ignored)
    }
}

/// Identity-keyed, ordered collection of the latest record per vehicle.
pub struct EntityRegistry {
    records: Mutex<Vec<LocationRecord>>,
    publisher: Publisher,
}

impl std::fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityRegistry")
            .field("vehicle_count", &self.len())
            .finish_non_exhaustive()
    }
}

impl EntityRegistry {
    /// Create an empty registry that publishes every change through `publisher`.
    #[must_use]
    pub fn new(publisher: Publisher) -> Self {
        Self {
            records: Mutex::new(Vec::new()),
            publisher,
        }
    }

    // Records are replaced whole, so a poisoned lock never guards a half-written entry.
    fn lock(&self) -> MutexGuard<'_, Vec<LocationRecord>> {
        self.records.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Merge a fetched record.
    ///
    /// New terminals go to the front; known terminals are replaced in place.
    /// The full snapshot is published while the lock is still held, so the
    /// display receives snapshots in mutation order.
    pub fn upsert(&self, record: LocationRecord) -> UpsertOutcome {
        if !record.is_success() {
            warn!(
                "Refusing to merge record for {} with status {}",
                record.entity_id, record.status
            );
            return UpsertOutcome::Ignored;
        }

        let mut records = self.lock();
        let outcome = match records
            .iter()
            .position(|r| r.entity_id == record.entity_id)
        {
            Some(index) => {
                debug!("Updating {} at position {}", record.entity_id, index);
                records[index] = record;
                UpsertOutcome::Replaced
            }
            None => {
                debug!("Adding {} to vehicle list", record.entity_id);
                records.insert(0, record);
                UpsertOutcome::Inserted
            }
        };

        let snapshot: Snapshot = records.as_slice().into();
        self.publisher.snapshot(snapshot);

        outcome
    }

    /// Point-in-time copy of every record, in display order.
    #[must_use]
    pub fn snapshot_all(&self) -> Snapshot {
        self.lock().as_slice().into()
    }

    /// Current record for a terminal.
    #[must_use]
    pub fn lookup(&self, id: &EntityId) -> Option<LocationRecord> {
        self.lock().iter().find(|r| &r.entity_id == id).cloned()
    }

    #[must_use]
    pub fn contains(&self, id: &EntityId) -> bool {
        self.lock().iter().any(|r| &r.entity_id == id)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

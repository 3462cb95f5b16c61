// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2025 Daniel Negri
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! Worker entity.
//!
//! Workers carry no balance. They are locked during a session charge only so
//! that a concurrent deletion cannot orphan the new record.

use crate::base::WorkerId;
use crate::error::LedgerError;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// Point-in-time copy of a worker.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Worker {
    pub id: WorkerId,
    /// Login of the external principal this worker is linked to.
    pub login: String,
    pub display_name: String,
    pub created_at: DateTime<Utc>,
}

impl Worker {
    /// Case-insensitive match on login or display name.
    pub fn matches(&self, needle: &str) -> bool {
        let needle = needle.to_lowercase();
        self.login.to_lowercase().contains(&needle)
            || self.display_name.to_lowercase().contains(&needle)
    }
}

#[derive(Debug)]
pub(crate) struct WorkerData {
    worker_id: WorkerId,
    /// Session charges delivered by this worker.
    records: usize,
    deleted: bool,
}

impl WorkerData {
    pub(crate) fn ensure_live(&self) -> Result<(), LedgerError> {
        if self.deleted {
            return Err(LedgerError::WorkerNotFound(self.worker_id));
        }
        Ok(())
    }

    pub(crate) fn has_history(&self) -> bool {
        self.records > 0
    }

    pub(crate) fn record_added(&mut self) {
        self.records += 1;
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }
}

/// Worker guarded by its own lock. The identity is immutable and readable
/// without the lock.
#[derive(Debug)]
pub struct WorkerAccount {
    worker: Worker,
    inner: Mutex<WorkerData>,
}

impl WorkerAccount {
    /// Display name falls back to the login when blank.
    pub fn new(id: WorkerId, login: String, display_name: String, created_at: DateTime<Utc>) -> Self {
        let display_name = if display_name.trim().is_empty() {
            login.clone()
        } else {
            display_name
        };
        Self {
            worker: Worker {
                id,
                login,
                display_name,
                created_at,
            },
            inner: Mutex::new(WorkerData {
                worker_id: id,
                records: 0,
                deleted: false,
            }),
        }
    }

    pub fn worker(&self) -> &Worker {
        &self.worker
    }

    pub(crate) fn mutex(&self) -> &Mutex<WorkerData> {
        &self.inner
    }
}

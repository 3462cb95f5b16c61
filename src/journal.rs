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

//! Append-only store of audit records.

use crate::base::{ClientId, RecordId};
use crate::error::LedgerError;
use crate::record::LedgerRecord;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Journal {
    /// Records by id. Never removed; only the receipt flag is ever rewritten.
    records: DashMap<RecordId, LedgerRecord>,
    /// Last allocated id.
    sequence: AtomicU64,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates the next record id. Callers hold the client lock, which makes
    /// ids of one client increase in commit order.
    pub(crate) fn next_id(&self) -> RecordId {
        RecordId(self.sequence.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// Stores a record.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::DuplicateRecord`] if the id is already taken.
    pub(crate) fn append(&self, record: LedgerRecord) -> Result<(), LedgerError> {
        // Entry API makes check-and-insert atomic
        match self.records.entry(record.id()) {
            Entry::Occupied(_) => Err(LedgerError::DuplicateRecord(record.id())),
            Entry::Vacant(entry) => {
                entry.insert(record);
                Ok(())
            }
        }
    }

    pub fn get(&self, id: RecordId) -> Option<LedgerRecord> {
        self.records.get(&id).map(|r| r.value().clone())
    }

    /// Sets the receipt flag of a session charge.
    ///
    /// Returns `Ok(true)` only for the call that flipped the flag; records
    /// without the flag and already-printed charges return `Ok(false)`.
    pub(crate) fn mark_receipt_printed(&self, id: RecordId) -> Result<bool, LedgerError> {
        let mut record = self
            .records
            .get_mut(&id)
            .ok_or(LedgerError::RecordNotFound(id))?;
        match record.value_mut() {
            LedgerRecord::SessionCharge(charge) if !charge.receipt_printed => {
                charge.receipt_printed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// All records in id order.
    pub fn records(&self) -> Vec<LedgerRecord> {
        let mut records: Vec<_> = self.records.iter().map(|r| r.value().clone()).collect();
        records.sort_by_key(LedgerRecord::id);
        records
    }

    /// Records of one client in commit order.
    pub fn for_client(&self, client_id: ClientId) -> Vec<LedgerRecord> {
        let mut records: Vec<_> = self
            .records
            .iter()
            .filter(|r| r.client_id() == client_id)
            .map(|r| r.value().clone())
            .collect();
        records.sort_by_key(LedgerRecord::id);
        records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

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

//! Error types for ledger operations.

use crate::base::{ClientId, RecordId, WorkerId};
use crate::guard::Entity;
use rust_decimal::Decimal;
use thiserror::Error;

/// Ledger operation errors.
///
/// None of these leave persisted state mutated: validation failures are raised
/// before a unit of work starts, sufficiency failures abort it before any write.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("client {0} not found")]
    ClientNotFound(ClientId),

    #[error("worker {0} not found")]
    WorkerNotFound(WorkerId),

    #[error("record {0} not found")]
    RecordNotFound(RecordId),

    /// Amount is zero, negative, above the column limit or has more than 2 decimals
    #[error("invalid amount (must be positive with at most 2 decimal places)")]
    InvalidAmount,

    /// Malformed numeric string, blank name, inverted date range and the like
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Adjustment removing neither money nor lessons
    #[error("adjustment must remove a positive amount or at least one lesson")]
    EmptyAdjustment,

    #[error("insufficient funds: balance {available}, required {required}")]
    InsufficientFunds { available: Decimal, required: Decimal },

    #[error("insufficient lessons: balance {available}, required {required}")]
    InsufficientLessons { available: u32, required: u32 },

    /// Resulting balance would not fit the storage column
    #[error("balance overflow")]
    BalanceOverflow,

    /// Record id already present in the journal
    #[error("duplicate record {0}")]
    DuplicateRecord(RecordId),

    /// Entity is referenced by audit records and cannot be deleted
    #[error("entity has ledger history and cannot be deleted")]
    HasHistory,

    /// Exclusive lock on an entity was not acquired in time
    #[error("timed out waiting for lock on {0}")]
    LockTimeout(Entity),
}

impl LedgerError {
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            Self::ClientNotFound(_) | Self::WorkerNotFound(_) | Self::RecordNotFound(_)
        )
    }

    /// Whether the same request may succeed if simply retried.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::LockTimeout(_))
    }
}

#[cfg(test)]
mod tests {
    use super::LedgerError;
    use crate::base::{ClientId, RecordId, WorkerId};
    use crate::guard::Entity;
    use rust_decimal_macros::dec;

    #[test]
    fn error_display_messages() {
        assert_eq!(
            LedgerError::ClientNotFound(ClientId(3)).to_string(),
            "client 3 not found"
        );
        assert_eq!(
            LedgerError::WorkerNotFound(WorkerId(4)).to_string(),
            "worker 4 not found"
        );
        assert_eq!(
            LedgerError::RecordNotFound(RecordId(5)).to_string(),
            "record 5 not found"
        );
        assert_eq!(
            LedgerError::InsufficientFunds {
                available: dec!(70.00),
                required: dec!(1000.00),
            }
            .to_string(),
            "insufficient funds: balance 70.00, required 1000.00"
        );
        assert_eq!(
            LedgerError::InsufficientLessons {
                available: 1,
                required: 2,
            }
            .to_string(),
            "insufficient lessons: balance 1, required 2"
        );
        assert_eq!(
            LedgerError::InvalidInput("bad date".into()).to_string(),
            "invalid input: bad date"
        );
        assert_eq!(
            LedgerError::DuplicateRecord(RecordId(8)).to_string(),
            "duplicate record 8"
        );
        assert_eq!(
            LedgerError::LockTimeout(Entity::Client(ClientId(1))).to_string(),
            "timed out waiting for lock on client 1"
        );
    }

    #[test]
    fn classification() {
        assert!(LedgerError::ClientNotFound(ClientId(1)).is_not_found());
        assert!(LedgerError::RecordNotFound(RecordId(1)).is_not_found());
        assert!(!LedgerError::InvalidAmount.is_not_found());
        assert!(LedgerError::LockTimeout(Entity::Worker(WorkerId(1))).is_retryable());
        assert!(!LedgerError::HasHistory.is_retryable());
    }
}

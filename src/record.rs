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

//! Immutable audit records.
//!
//! Every mutating operation appends exactly one record carrying the client's
//! balances immediately after the operation. Balances are mutated in place,
//! so these snapshots are what keep old receipts and reports correct.

use crate::base::{ClientId, RecordId, WorkerId};
use crate::client::Balances;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A session delivered by a worker and paid from the client's balance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCharge {
    pub id: RecordId,
    pub client_id: ClientId,
    pub worker_id: WorkerId,
    pub amount: Decimal,
    pub lessons_count: u32,
    pub balance_after: Decimal,
    pub lessons_balance_after: u32,
    pub created_at: DateTime<Utc>,
    /// Flipped to `true` once, after the first successful receipt emission.
    pub receipt_printed: bool,
}

/// Money and lesson credits added to a client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Deposit {
    pub id: RecordId,
    pub client_id: ClientId,
    pub amount: Decimal,
    pub lessons_added: u32,
    pub balance_after: Decimal,
    pub lessons_balance_after: u32,
    pub created_at: DateTime<Utc>,
}

/// Reversal of previously deposited money or lesson credits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceAdjustment {
    pub id: RecordId,
    pub client_id: ClientId,
    pub amount_removed: Decimal,
    pub lessons_removed: u32,
    pub balance_after: Decimal,
    pub lessons_balance_after: u32,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    SessionCharge,
    Deposit,
    Adjustment,
}

impl fmt::Display for RecordKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::SessionCharge => "Session",
            Self::Deposit => "Deposit",
            Self::Adjustment => "Adjustment",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum LedgerRecord {
    SessionCharge(SessionCharge),
    Deposit(Deposit),
    Adjustment(BalanceAdjustment),
}

impl LedgerRecord {
    pub fn id(&self) -> RecordId {
        match self {
            Self::SessionCharge(r) => r.id,
            Self::Deposit(r) => r.id,
            Self::Adjustment(r) => r.id,
        }
    }

    pub fn client_id(&self) -> ClientId {
        match self {
            Self::SessionCharge(r) => r.client_id,
            Self::Deposit(r) => r.client_id,
            Self::Adjustment(r) => r.client_id,
        }
    }

    /// Only session charges reference a worker.
    pub fn worker_id(&self) -> Option<WorkerId> {
        match self {
            Self::SessionCharge(r) => Some(r.worker_id),
            _ => None,
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        match self {
            Self::SessionCharge(r) => r.created_at,
            Self::Deposit(r) => r.created_at,
            Self::Adjustment(r) => r.created_at,
        }
    }

    pub fn kind(&self) -> RecordKind {
        match self {
            Self::SessionCharge(_) => RecordKind::SessionCharge,
            Self::Deposit(_) => RecordKind::Deposit,
            Self::Adjustment(_) => RecordKind::Adjustment,
        }
    }

    /// Client balances captured right after this record was committed.
    pub fn balances_after(&self) -> Balances {
        let (balance, lessons_balance) = match self {
            Self::SessionCharge(r) => (r.balance_after, r.lessons_balance_after),
            Self::Deposit(r) => (r.balance_after, r.lessons_balance_after),
            Self::Adjustment(r) => (r.balance_after, r.lessons_balance_after),
        };
        Balances {
            balance,
            lessons_balance,
        }
    }

    /// Unsigned amount as written on the record.
    pub fn amount(&self) -> Decimal {
        match self {
            Self::SessionCharge(r) => r.amount,
            Self::Deposit(r) => r.amount,
            Self::Adjustment(r) => r.amount_removed,
        }
    }

    /// Unsigned lesson count as written on the record.
    pub fn lessons(&self) -> u32 {
        match self {
            Self::SessionCharge(r) => r.lessons_count,
            Self::Deposit(r) => r.lessons_added,
            Self::Adjustment(r) => r.lessons_removed,
        }
    }

    /// Effect of this record on the client's money balance.
    pub fn balance_delta(&self) -> Decimal {
        match self {
            Self::Deposit(r) => r.amount,
            Self::SessionCharge(r) => -r.amount,
            Self::Adjustment(r) => -r.amount_removed,
        }
    }

    /// Effect of this record on the client's lesson credits.
    pub fn lessons_delta(&self) -> i64 {
        match self {
            Self::Deposit(r) => i64::from(r.lessons_added),
            Self::SessionCharge(r) => -i64::from(r.lessons_count),
            Self::Adjustment(r) => -i64::from(r.lessons_removed),
        }
    }

    pub fn as_session_charge(&self) -> Option<&SessionCharge> {
        match self {
            Self::SessionCharge(r) => Some(r),
            _ => None,
        }
    }
}

impl From<SessionCharge> for LedgerRecord {
    fn from(record: SessionCharge) -> Self {
        Self::SessionCharge(record)
    }
}

impl From<Deposit> for LedgerRecord {
    fn from(record: Deposit) -> Self {
        Self::Deposit(record)
    }
}

impl From<BalanceAdjustment> for LedgerRecord {
    fn from(record: BalanceAdjustment) -> Self {
        Self::Adjustment(record)
    }
}

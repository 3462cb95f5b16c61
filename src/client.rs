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

//! Client entity and its balance fields.
//!
//! A client's live `balance` and `lessons_balance` sit behind a per-client
//! mutex. Mutations are split in two steps: [`ClientData::debit`] /
//! [`ClientData::credit`] check the operation against the current values and
//! return the prospective [`Balances`] without touching anything, and
//! [`ClientData::commit`] writes them once the audit record is stored.
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use rust_decimal_macros::dec;
//! use studio_ledger::{ClientAccount, ClientId, ClientProfile};
//!
//! let account = ClientAccount::new(ClientId(1), "Aysel".into(), ClientProfile::default(), Utc::now());
//! assert_eq!(account.balance(), dec!(0.00));
//! assert_eq!(account.lessons_balance(), 0);
//! ```

use crate::amount::{MAX_AMOUNT, to_money};
use crate::base::ClientId;
use crate::error::LedgerError;
use chrono::{DateTime, NaiveDate, Utc};
use parking_lot::Mutex;
use rust_decimal::Decimal;
use serde::ser::{SerializeStruct, Serializer};
use serde::{Deserialize, Serialize};

/// Age group of a client. Presentation only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientType {
    Child,
    Teenager,
    #[default]
    Adult,
}

/// Optional contact details. None of these take part in ledger invariants.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClientProfile {
    pub date_of_birth: Option<NaiveDate>,
    pub address: String,
    pub phone: String,
    pub referral_source: String,
    pub client_type: ClientType,
}

/// Money and lesson credits at one point in time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balances {
    pub balance: Decimal,
    pub lessons_balance: u32,
}

/// Point-in-time copy of a client, handed out to callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Client {
    pub id: ClientId,
    pub full_name: String,
    pub balance: Decimal,
    pub lessons_balance: u32,
    pub profile: ClientProfile,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug)]
pub(crate) struct ClientData {
    client_id: ClientId,
    profile: ClientProfile,
    created_at: DateTime<Utc>,
    balance: Decimal,
    lessons_balance: u32,
    /// Timestamp of the latest committed record, keeps `created_at` monotonic.
    last_activity: DateTime<Utc>,
    /// Audit records referencing this client.
    records: usize,
    /// Set once the client is deleted; late lock holders must see it as gone.
    deleted: bool,
}

impl ClientData {
    fn new(client_id: ClientId, profile: ClientProfile, created_at: DateTime<Utc>) -> Self {
        Self {
            client_id,
            profile,
            created_at,
            balance: to_money(Decimal::ZERO),
            lessons_balance: 0,
            last_activity: created_at,
            records: 0,
            deleted: false,
        }
    }

    fn assert_invariants(&self) {
        debug_assert!(
            self.balance >= Decimal::ZERO,
            "Invariant violated: balance went negative: {}",
            self.balance
        );
        debug_assert!(
            self.balance <= MAX_AMOUNT,
            "Invariant violated: balance above column limit: {}",
            self.balance
        );
    }

    pub(crate) fn balances(&self) -> Balances {
        Balances {
            balance: self.balance,
            lessons_balance: self.lessons_balance,
        }
    }

    pub(crate) fn has_history(&self) -> bool {
        self.records > 0
    }

    /// Fails with `ClientNotFound` if the client was deleted while the caller
    /// was waiting for the lock.
    pub(crate) fn ensure_live(&self) -> Result<(), LedgerError> {
        if self.deleted {
            return Err(LedgerError::ClientNotFound(self.client_id));
        }
        Ok(())
    }

    /// Timestamp for the next record: never earlier than the previous one.
    pub(crate) fn stamp(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        now.max(self.last_activity)
    }

    /// Balances after removing `amount` and `lessons`, or the shortfall.
    pub(crate) fn debit(&self, amount: Decimal, lessons: u32) -> Result<Balances, LedgerError> {
        self.ensure_live()?;
        if self.balance < amount {
            return Err(LedgerError::InsufficientFunds {
                available: self.balance,
                required: amount,
            });
        }
        if self.lessons_balance < lessons {
            return Err(LedgerError::InsufficientLessons {
                available: self.lessons_balance,
                required: lessons,
            });
        }
        Ok(Balances {
            balance: to_money(self.balance - amount),
            lessons_balance: self.lessons_balance - lessons,
        })
    }

    /// Balances after adding `amount` and `lessons`.
    pub(crate) fn credit(&self, amount: Decimal, lessons: u32) -> Result<Balances, LedgerError> {
        self.ensure_live()?;
        let balance = self.balance + amount;
        if balance > MAX_AMOUNT {
            return Err(LedgerError::BalanceOverflow);
        }
        let lessons_balance = self
            .lessons_balance
            .checked_add(lessons)
            .ok_or(LedgerError::BalanceOverflow)?;
        Ok(Balances {
            balance: to_money(balance),
            lessons_balance,
        })
    }

    /// Writes balances computed by `debit`/`credit` after their record is stored.
    pub(crate) fn commit(&mut self, after: Balances, at: DateTime<Utc>) {
        self.balance = after.balance;
        self.lessons_balance = after.lessons_balance;
        self.last_activity = at;
        self.records += 1;
        self.assert_invariants();
    }

    pub(crate) fn mark_deleted(&mut self) {
        self.deleted = true;
    }

    fn snapshot(&self, full_name: &str) -> Client {
        Client {
            id: self.client_id,
            full_name: full_name.to_string(),
            balance: self.balance,
            lessons_balance: self.lessons_balance,
            profile: self.profile.clone(),
            created_at: self.created_at,
        }
    }
}

/// Ledger client guarded by its own lock.
///
/// Identity and name never change, so they live outside the lock and can be
/// read without waiting for an in-flight mutation.
#[derive(Debug)]
pub struct ClientAccount {
    id: ClientId,
    full_name: String,
    inner: Mutex<ClientData>,
}

impl ClientAccount {
    pub fn new(
        client_id: ClientId,
        full_name: String,
        profile: ClientProfile,
        created_at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: client_id,
            full_name,
            inner: Mutex::new(ClientData::new(client_id, profile, created_at)),
        }
    }

    pub fn id(&self) -> ClientId {
        self.id
    }

    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn balance(&self) -> Decimal {
        self.inner.lock().balance
    }

    pub fn lessons_balance(&self) -> u32 {
        self.inner.lock().lessons_balance
    }

    pub fn snapshot(&self) -> Client {
        self.inner.lock().snapshot(&self.full_name)
    }

    pub(crate) fn mutex(&self) -> &Mutex<ClientData> {
        &self.inner
    }
}

impl Serialize for ClientAccount {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let data = self.inner.lock();
        let mut state = serializer.serialize_struct("Client", 4)?;
        state.serialize_field("client", &self.id)?;
        state.serialize_field("full_name", &self.full_name)?;
        state.serialize_field("balance", &to_money(data.balance))?;
        state.serialize_field("lessons_balance", &data.lessons_balance)?;
        state.end()
    }
}

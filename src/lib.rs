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

//! # Studio Ledger
//!
//! Balance and lesson-credit ledger for a service business that sells
//! sessions to clients from a prepaid balance.
//!
//! ## Core Components
//!
//! - [`Ledger`]: Balance mutator, entity lifecycle and queries
//! - [`ClientAccount`]: Client balances behind a per-client lock
//! - [`LedgerRecord`]: Immutable audit records with balance snapshots
//! - [`ConcurrencyGuard`]: Timed per-entity exclusive locking
//! - [`LedgerFilter`] / [`LedgerReport`]: Read-only totals and unified log
//! - [`LedgerError`]: Error types for ledger operations
//!
//! ## Example
//!
//! ```
//! use studio_ledger::{Ledger, LedgerFilter, NewClient};
//! use rust_decimal_macros::dec;
//!
//! let ledger = Ledger::new();
//! let client = ledger
//!     .create_client(NewClient::named("Aysel").with_opening_grant(dec!(100.00), 5))
//!     .unwrap();
//! let worker = ledger.register_worker("nigar", "Nigar Aliyeva").unwrap();
//!
//! let charge = ledger
//!     .charge_session(client.id, worker.id, dec!(30.00), 2)
//!     .unwrap();
//! assert_eq!(charge.balance_after, dec!(70.00));
//! assert_eq!(charge.lessons_balance_after, 3);
//!
//! let report = ledger.query_ledger(&LedgerFilter::all());
//! assert_eq!(report.totals.total_income, dec!(30.00));
//! ```
//!
//! ## Thread Safety
//!
//! Every mutation holds the lock of the client it changes for the whole unit
//! of work. Operations on different clients run in parallel; reporting never
//! takes entity locks.

pub mod amount;
mod base;
pub mod client;
pub mod clock;
pub mod config;
mod engine;
pub mod error;
pub mod guard;
mod journal;
pub mod receipt;
mod record;
pub mod report;
pub mod worker;

pub use base::{ClientId, RecordId, WorkerId};
pub use client::{Balances, Client, ClientAccount, ClientProfile, ClientType};
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::LedgerConfig;
pub use engine::{Ledger, NewClient, Reconciliation};
pub use error::LedgerError;
pub use guard::{ConcurrencyGuard, Entity};
pub use journal::Journal;
pub use receipt::{FilePrinter, Receipt, ReceiptError, ReceiptPrinter, SpoolPrinter};
pub use record::{BalanceAdjustment, Deposit, LedgerRecord, RecordKind, SessionCharge};
pub use report::{DateRange, LedgerFilter, LedgerReport, LedgerTotals, LogEntry, Preset};
pub use worker::{Worker, WorkerAccount};

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

//! Read-only ledger reporting.
//!
//! Sums and merges the three record kinds for a filter. Reporting works on a
//! snapshot of the journal and never takes entity locks.

use crate::amount::to_money;
use crate::base::{ClientId, RecordId, WorkerId};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::record::{LedgerRecord, RecordKind};
use chrono::{DateTime, Datelike, NaiveDate, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::str::FromStr;

/// Date format accepted for custom ranges.
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// Quick ranges offered by the reports screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Preset {
    Today,
    /// Monday of the current week through today
    Week,
    /// First of the current month through today
    Month,
}

impl FromStr for Preset {
    type Err = LedgerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "today" => Ok(Self::Today),
            "week" => Ok(Self::Week),
            "month" => Ok(Self::Month),
            other => Err(LedgerError::InvalidInput(format!("unknown preset {other:?}"))),
        }
    }
}

/// Inclusive range of calendar days.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    start: NaiveDate,
    end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, LedgerError> {
        if start > end {
            return Err(LedgerError::InvalidInput(format!(
                "range starts after it ends ({start} > {end})"
            )));
        }
        Ok(Self { start, end })
    }

    /// Parses `YYYY-MM-DD` bounds.
    pub fn parse(start: &str, end: &str) -> Result<Self, LedgerError> {
        Self::new(parse_date(start)?, parse_date(end)?)
    }

    pub fn preset(preset: Preset, today: NaiveDate) -> Self {
        let start = match preset {
            Preset::Today => today,
            Preset::Week => {
                today - TimeDelta::days(i64::from(today.weekday().num_days_from_monday()))
            }
            Preset::Month => today.with_day(1).unwrap_or(today),
        };
        Self { start, end: today }
    }

    pub fn start(&self) -> NaiveDate {
        self.start
    }

    pub fn end(&self) -> NaiveDate {
        self.end
    }

    pub fn contains(&self, day: NaiveDate) -> bool {
        self.start <= day && day <= self.end
    }
}

fn parse_date(input: &str) -> Result<NaiveDate, LedgerError> {
    NaiveDate::parse_from_str(input.trim(), DATE_FORMAT)
        .map_err(|_| LedgerError::InvalidInput(format!("malformed date {input:?}, expected YYYY-MM-DD")))
}

/// Which records a report covers. Empty filter means everything.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LedgerFilter {
    pub range: Option<DateRange>,
    pub client: Option<ClientId>,
    /// Deposits and adjustments have no worker, so a worker filter keeps
    /// session charges only.
    pub worker: Option<WorkerId>,
    pub record: Option<RecordId>,
}

impl LedgerFilter {
    pub fn all() -> Self {
        Self::default()
    }

    pub fn within(mut self, range: DateRange) -> Self {
        self.range = Some(range);
        self
    }

    pub fn for_client(mut self, client: ClientId) -> Self {
        self.client = Some(client);
        self
    }

    pub fn for_worker(mut self, worker: WorkerId) -> Self {
        self.worker = Some(worker);
        self
    }

    pub fn for_record(mut self, record: RecordId) -> Self {
        self.record = Some(record);
        self
    }

    pub fn matches(&self, record: &LedgerRecord, config: &LedgerConfig) -> bool {
        if let Some(range) = self.range
            && !range.contains(config.local_date(record.created_at()))
        {
            return false;
        }
        if self.client.is_some_and(|client| client != record.client_id()) {
            return false;
        }
        if let Some(worker) = self.worker
            && record.worker_id() != Some(worker)
        {
            return false;
        }
        self.record.is_none_or(|id| id == record.id())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerTotals {
    /// Sum of session charges.
    pub total_income: Decimal,
    pub total_deposits: Decimal,
    pub total_adjustments: Decimal,
    /// `total_income + total_deposits - total_adjustments`
    pub net_profit: Decimal,
}

impl Default for LedgerTotals {
    fn default() -> Self {
        let zero = to_money(Decimal::ZERO);
        Self {
            total_income: zero,
            total_deposits: zero,
            total_adjustments: zero,
            net_profit: zero,
        }
    }
}

/// One line of the unified log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LogEntry {
    pub record_id: RecordId,
    pub created_at: DateTime<Utc>,
    pub kind: RecordKind,
    pub description: String,
    /// Positive for charges and deposits, negative for adjustments.
    pub amount: Decimal,
    /// Signed like `amount`.
    pub lessons: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LedgerReport {
    pub totals: LedgerTotals,
    /// Newest first.
    pub entries: Vec<LogEntry>,
}

/// Builds a report from `records`.
///
/// `describe` supplies the human readable description of each record; the
/// caller owns the participant names.
pub fn aggregate<I, F>(
    records: I,
    filter: &LedgerFilter,
    config: &LedgerConfig,
    describe: F,
) -> LedgerReport
where
    I: IntoIterator<Item = LedgerRecord>,
    F: Fn(&LedgerRecord) -> String,
{
    let mut totals = LedgerTotals::default();
    let mut entries = Vec::new();

    for record in records.into_iter().filter(|r| filter.matches(r, config)) {
        let amount = record.amount();
        let lessons = i64::from(record.lessons());
        let (amount, lessons) = match record.kind() {
            RecordKind::SessionCharge => {
                totals.total_income += amount;
                (amount, lessons)
            }
            RecordKind::Deposit => {
                totals.total_deposits += amount;
                (amount, lessons)
            }
            RecordKind::Adjustment => {
                totals.total_adjustments += amount;
                (-amount, -lessons)
            }
        };
        entries.push(LogEntry {
            record_id: record.id(),
            created_at: record.created_at(),
            kind: record.kind(),
            description: describe(&record),
            amount,
            lessons,
        });
    }

    totals.net_profit =
        to_money(totals.total_income + totals.total_deposits - totals.total_adjustments);
    entries.sort_by(|a, b| {
        b.created_at
            .cmp(&a.created_at)
            .then_with(|| b.record_id.cmp(&a.record_id))
    });

    LedgerReport { totals, entries }
}

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

//! Ledger configuration.

use chrono::{DateTime, FixedOffset, NaiveDate, Offset, Utc};
use std::time::Duration;

/// Runtime settings shared by the mutator, the reporting aggregator and
/// receipt rendering.
#[derive(Debug, Clone)]
pub struct LedgerConfig {
    /// How long a mutating operation waits for an entity lock before giving up.
    pub lock_timeout: Duration,
    /// Offset used to decide which calendar day a record belongs to.
    pub utc_offset: FixedOffset,
    /// First line printed on every receipt.
    pub receipt_header: String,
    /// Currency label printed after amounts.
    pub currency: String,
}

impl LedgerConfig {
    pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

    pub fn with_lock_timeout(mut self, lock_timeout: Duration) -> Self {
        self.lock_timeout = lock_timeout;
        self
    }

    pub fn with_utc_offset(mut self, utc_offset: FixedOffset) -> Self {
        self.utc_offset = utc_offset;
        self
    }

    /// Calendar day of an instant in the business's local time.
    pub fn local_date(&self, at: DateTime<Utc>) -> NaiveDate {
        at.with_timezone(&self.utc_offset).date_naive()
    }
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            lock_timeout: Self::DEFAULT_LOCK_TIMEOUT,
            utc_offset: Utc.fix(),
            receipt_header: "STUDIO".to_string(),
            currency: "AZN".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn defaults() {
        let config = LedgerConfig::default();
        assert_eq!(config.lock_timeout, Duration::from_secs(5));
        assert_eq!(config.utc_offset.local_minus_utc(), 0);
        assert_eq!(config.currency, "AZN");
    }

    #[test]
    fn local_date_respects_offset() {
        let late_evening = Utc.with_ymd_and_hms(2025, 3, 31, 21, 30, 0).unwrap();
        let utc = LedgerConfig::default();
        let baku = LedgerConfig::default()
            .with_utc_offset(FixedOffset::east_opt(4 * 3600).unwrap());

        assert_eq!(
            utc.local_date(late_evening),
            NaiveDate::from_ymd_opt(2025, 3, 31).unwrap()
        );
        assert_eq!(
            baku.local_date(late_evening),
            NaiveDate::from_ymd_opt(2025, 4, 1).unwrap()
        );
    }
}

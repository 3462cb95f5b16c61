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

//! Receipt rendering and emission.
//!
//! Emission happens after the financial unit of work has committed. A failed
//! emission is logged and leaves the ledger untouched apart from the
//! `receipt_printed` flag staying `false`.

use crate::base::RecordId;
use crate::config::LedgerConfig;
use crate::record::LedgerRecord;
use crossbeam::queue::SegQueue;
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Width of a thermal receipt line, in characters.
pub const RECEIPT_WIDTH: usize = 32;

#[derive(Error, Debug)]
pub enum ReceiptError {
    #[error("printer unavailable: {0}")]
    Unavailable(String),

    #[error("receipt i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

/// Rendered receipt ready for a printer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Receipt {
    pub record_id: RecordId,
    pub text: String,
}

impl Receipt {
    /// Renders the receipt of `record`.
    ///
    /// Balances come from the record's snapshot, never from the live client,
    /// so a reprint shows what the balance was when the record was made.
    pub fn render(
        record: &LedgerRecord,
        client_name: &str,
        worker_name: Option<&str>,
        config: &LedgerConfig,
    ) -> Self {
        let rule = "─".repeat(RECEIPT_WIDTH);
        let currency = &config.currency;
        let date = record
            .created_at()
            .with_timezone(&config.utc_offset)
            .format("%d.%m.%Y %H:%M:%S");
        let after = record.balances_after();

        let mut lines = vec![
            format!("{:^width$}", config.receipt_header, width = RECEIPT_WIDTH),
            String::new(),
            format!("Date: {date}"),
            rule.clone(),
            format!("Client: {client_name}"),
        ];
        if let Some(worker_name) = worker_name {
            lines.push(format!("Worker: {worker_name}"));
        }
        lines.push(rule.clone());
        lines.push(format!("Service: {}", record.kind()));
        let (amount_label, lessons_label) = match record {
            LedgerRecord::Adjustment(_) => ("Removed", "Lessons removed"),
            _ => ("Amount", "Lessons"),
        };
        lines.push(format!("{amount_label}: {} {currency}", record.amount()));
        lines.push(format!("{lessons_label}: {}", record.lessons()));
        lines.push(rule.clone());
        lines.push(format!("Balance: {} {currency}", after.balance));
        lines.push(format!("Lessons balance: {}", after.lessons_balance));
        lines.push(rule);
        lines.push(format!("{:^width$}", "Thank you!", width = RECEIPT_WIDTH));
        lines.push(format!("Record #: {}", record.id()));

        let mut text = lines.join("\n");
        text.push('\n');

        Self {
            record_id: record.id(),
            text,
        }
    }
}

/// Destination for rendered receipts (thermal printer, document store, ...).
pub trait ReceiptPrinter: Send + Sync {
    fn emit(&self, receipt: &Receipt) -> Result<(), ReceiptError>;
}

/// In-memory FIFO spool, drained by whoever owns the physical printer.
#[derive(Debug, Default)]
pub struct SpoolPrinter {
    spool: SegQueue<Receipt>,
}

impl SpoolPrinter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes every queued receipt, oldest first.
    pub fn drain(&self) -> Vec<Receipt> {
        let mut receipts = Vec::with_capacity(self.spool.len());
        while let Some(receipt) = self.spool.pop() {
            receipts.push(receipt);
        }
        receipts
    }

    pub fn len(&self) -> usize {
        self.spool.len()
    }

    pub fn is_empty(&self) -> bool {
        self.spool.is_empty()
    }
}

impl ReceiptPrinter for SpoolPrinter {
    fn emit(&self, receipt: &Receipt) -> Result<(), ReceiptError> {
        self.spool.push(receipt.clone());
        Ok(())
    }
}

/// Writes each receipt to `<dir>/receipt_<id>.txt`.
#[derive(Debug, Clone)]
pub struct FilePrinter {
    dir: PathBuf,
}

impl FilePrinter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn path_for(&self, record_id: RecordId) -> PathBuf {
        self.dir.join(format!("receipt_{record_id}.txt"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

impl ReceiptPrinter for FilePrinter {
    fn emit(&self, receipt: &Receipt) -> Result<(), ReceiptError> {
        fs::create_dir_all(&self.dir)?;
        fs::write(self.path_for(receipt.record_id), &receipt.text)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::base::{ClientId, WorkerId};
    use crate::record::{BalanceAdjustment, SessionCharge};
    use chrono::{FixedOffset, TimeZone, Utc};
    use rust_decimal_macros::dec;

    fn charge() -> LedgerRecord {
        SessionCharge {
            id: RecordId(12),
            client_id: ClientId(1),
            worker_id: WorkerId(1),
            amount: dec!(30.00),
            lessons_count: 2,
            balance_after: dec!(70.00),
            lessons_balance_after: 3,
            created_at: Utc.with_ymd_and_hms(2025, 5, 6, 10, 15, 0).unwrap(),
            receipt_printed: false,
        }
        .into()
    }

    #[test]
    fn session_receipt_shows_snapshot_balances() {
        let config = LedgerConfig::default();
        let receipt = Receipt::render(&charge(), "Aysel Huseynova", Some("Nigar"), &config);

        assert_eq!(receipt.record_id, RecordId(12));
        assert!(receipt.text.contains("Date: 06.05.2025 10:15:00"));
        assert!(receipt.text.contains("Client: Aysel Huseynova"));
        assert!(receipt.text.contains("Worker: Nigar"));
        assert!(receipt.text.contains("Service: Session"));
        assert!(receipt.text.contains("Amount: 30.00 AZN"));
        assert!(receipt.text.contains("Lessons: 2"));
        assert!(receipt.text.contains("Balance: 70.00 AZN"));
        assert!(receipt.text.contains("Lessons balance: 3"));
        assert!(receipt.text.contains("Record #: 12"));
    }

    #[test]
    fn receipt_date_uses_configured_offset() {
        let config = LedgerConfig::default()
            .with_utc_offset(FixedOffset::east_opt(4 * 3600).unwrap());
        let receipt = Receipt::render(&charge(), "Aysel", Some("Nigar"), &config);
        assert!(receipt.text.contains("Date: 06.05.2025 14:15:00"));
    }

    #[test]
    fn adjustment_receipt_has_no_worker_line() {
        let record: LedgerRecord = BalanceAdjustment {
            id: RecordId(3),
            client_id: ClientId(1),
            amount_removed: dec!(20.00),
            lessons_removed: 1,
            balance_after: dec!(100.00),
            lessons_balance_after: 3,
            created_at: Utc::now(),
        }
        .into();
        let receipt = Receipt::render(&record, "Aysel", None, &LedgerConfig::default());

        assert!(!receipt.text.contains("Worker:"));
        assert!(receipt.text.contains("Removed: 20.00 AZN"));
        assert!(receipt.text.contains("Lessons removed: 1"));
    }

    #[test]
    fn spool_drains_in_fifo_order() {
        let spool = SpoolPrinter::new();
        for id in 1..=3 {
            spool
                .emit(&Receipt {
                    record_id: RecordId(id),
                    text: String::new(),
                })
                .unwrap();
        }
        assert_eq!(spool.len(), 3);
        let ids: Vec<_> = spool.drain().into_iter().map(|r| r.record_id).collect();
        assert_eq!(ids, vec![RecordId(1), RecordId(2), RecordId(3)]);
        assert!(spool.is_empty());
    }

    #[test]
    fn file_printer_writes_one_file_per_record() {
        let dir = std::env::temp_dir().join(format!("studio-ledger-receipts-{}", std::process::id()));
        let printer = FilePrinter::new(&dir);
        let receipt = Receipt::render(&charge(), "Aysel", Some("Nigar"), &LedgerConfig::default());

        printer.emit(&receipt).unwrap();

        let written = fs::read_to_string(printer.path_for(RecordId(12))).unwrap();
        assert_eq!(written, receipt.text);
        fs::remove_dir_all(&dir).unwrap();
    }
}

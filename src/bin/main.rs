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

use chrono::{FixedOffset, Utc};
use clap::Parser;
use csv::{ReaderBuilder, Trim, Writer};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fs::File;
use std::io::{BufReader, Read, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::time::Duration;
use studio_ledger::amount::{parse_amount, parse_lessons, parse_removal};
use studio_ledger::{
    ClientId, DateRange, FilePrinter, Ledger, LedgerConfig, LedgerError, LedgerFilter,
    LedgerReport, NewClient, Preset, WorkerId,
};
use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Studio Ledger - replay ledger operations from a CSV file
///
/// Applies client/worker creation, deposits, session charges and balance
/// adjustments in file order, then prints client balances (default) or the
/// ledger report as CSV to stdout.
#[derive(Parser, Debug)]
#[command(name = "studio-ledger")]
#[command(about = "Replays ledger operations and prints balances or a report", long_about = None)]
struct Args {
    /// Path to CSV file with operations
    ///
    /// Expected format: op,client,worker,amount,lessons,name
    /// Example: cargo run -- operations.csv > balances.csv
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Print the unified ledger log instead of client balances
    #[arg(long)]
    report: bool,

    /// First day of the report range (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "to")]
    from: Option<String>,

    /// Last day of the report range (YYYY-MM-DD)
    #[arg(long, value_name = "DATE", requires = "from")]
    to: Option<String>,

    /// Report range relative to today: today, week or month
    #[arg(long, conflicts_with_all = ["from", "to"])]
    preset: Option<String>,

    /// Only report records of this client
    #[arg(long)]
    client: Option<u32>,

    /// Only report session charges of this worker
    #[arg(long)]
    worker: Option<u32>,

    /// Give up on a contended client after this many milliseconds
    #[arg(long, default_value_t = 5000)]
    lock_timeout_ms: u64,

    /// Offset of local business time from UTC, in hours
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    utc_offset_hours: i32,

    /// Write one receipt file per session charge into this directory
    #[arg(long, value_name = "DIR")]
    receipts: Option<PathBuf>,
}

fn main() {
    // Logs go to stderr so stdout stays valid CSV
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    let ledger = match build_ledger(&args) {
        Ok(ledger) => ledger,
        Err(e) => {
            error!("Invalid configuration: {e}");
            process::exit(2);
        }
    };

    let file = match File::open(&args.input) {
        Ok(f) => f,
        Err(e) => {
            error!("Error opening file '{}': {}", args.input.display(), e);
            process::exit(1);
        }
    };

    if let Err(e) = process_operations(&ledger, BufReader::new(file)) {
        error!("Error processing operations: {e}");
        process::exit(1);
    }

    let result = if args.report {
        let filter = match build_filter(&args, &ledger) {
            Ok(filter) => filter,
            Err(e) => {
                error!("Invalid report filter: {e}");
                process::exit(2);
            }
        };
        let report = ledger.query_ledger(&filter);
        print_totals(&report);
        write_report(&report, std::io::stdout())
    } else {
        write_clients(&ledger, std::io::stdout())
    };

    if let Err(e) = result {
        error!("Error writing output: {e}");
        process::exit(1);
    }
}

fn build_ledger(args: &Args) -> Result<Ledger, LedgerError> {
    let utc_offset = FixedOffset::east_opt(args.utc_offset_hours * 3600).ok_or_else(|| {
        LedgerError::InvalidInput(format!("utc offset {}h out of range", args.utc_offset_hours))
    })?;
    let config = LedgerConfig::default()
        .with_lock_timeout(Duration::from_millis(args.lock_timeout_ms))
        .with_utc_offset(utc_offset);

    let ledger = Ledger::with_config(config);
    Ok(match &args.receipts {
        Some(dir) => {
            info!("Writing receipts to {}", dir.display());
            ledger.with_printer(Arc::new(FilePrinter::new(dir)))
        }
        None => ledger,
    })
}

fn build_filter(args: &Args, ledger: &Ledger) -> Result<LedgerFilter, LedgerError> {
    let mut filter = LedgerFilter::all();
    if let Some(preset) = &args.preset {
        let today = ledger.config().local_date(Utc::now());
        filter = filter.within(DateRange::preset(preset.parse::<Preset>()?, today));
    }
    if let (Some(from), Some(to)) = (&args.from, &args.to) {
        filter = filter.within(DateRange::parse(from, to)?);
    }
    if let Some(client) = args.client {
        filter = filter.for_client(ClientId(client));
    }
    if let Some(worker) = args.worker {
        filter = filter.for_worker(WorkerId(worker));
    }
    Ok(filter)
}

/// Raw CSV row.
///
/// Fields: `op, client, worker, amount, lessons, name`
#[derive(Debug, Deserialize)]
struct CsvRecord {
    op: String,
    #[serde(default)]
    client: Option<u32>,
    #[serde(default)]
    worker: Option<u32>,
    #[serde(default)]
    amount: String,
    #[serde(default)]
    lessons: String,
    #[serde(default)]
    name: String,
}

/// Operation decoded from a row, with amounts already validated.
#[derive(Debug)]
enum Operation {
    Client(NewClient),
    Worker { login: String },
    Deposit { client: ClientId, amount: Decimal, lessons: u32 },
    Charge { client: ClientId, worker: WorkerId, amount: Decimal, lessons: u32 },
    Adjust { client: ClientId, amount: Decimal, lessons: u32 },
}

impl CsvRecord {
    fn client_id(&self) -> Result<ClientId, LedgerError> {
        self.client
            .map(ClientId)
            .ok_or_else(|| LedgerError::InvalidInput("missing client id".into()))
    }

    fn worker_id(&self) -> Result<WorkerId, LedgerError> {
        self.worker
            .map(WorkerId)
            .ok_or_else(|| LedgerError::InvalidInput("missing worker id".into()))
    }

    fn into_operation(self) -> Result<Operation, LedgerError> {
        let lessons = parse_lessons(&self.lessons)?;
        match self.op.to_lowercase().as_str() {
            "client" => Ok(Operation::Client(
                NewClient::named(self.name.as_str())
                    .with_opening_grant(parse_removal(&self.amount)?, lessons),
            )),
            "worker" => Ok(Operation::Worker { login: self.name }),
            "deposit" => Ok(Operation::Deposit {
                client: self.client_id()?,
                amount: parse_amount(&self.amount)?,
                lessons,
            }),
            "charge" => Ok(Operation::Charge {
                client: self.client_id()?,
                worker: self.worker_id()?,
                amount: parse_amount(&self.amount)?,
                lessons,
            }),
            "adjust" => Ok(Operation::Adjust {
                client: self.client_id()?,
                amount: parse_removal(&self.amount)?,
                lessons,
            }),
            other => Err(LedgerError::InvalidInput(format!("unknown operation {other:?}"))),
        }
    }
}

fn apply(ledger: &Ledger, operation: Operation) -> Result<(), LedgerError> {
    match operation {
        Operation::Client(new_client) => ledger.create_client(new_client).map(drop),
        Operation::Worker { login } => ledger.register_worker(&login, "").map(drop),
        Operation::Deposit {
            client,
            amount,
            lessons,
        } => ledger.deposit(client, amount, lessons).map(drop),
        Operation::Charge {
            client,
            worker,
            amount,
            lessons,
        } => ledger.charge_session(client, worker, amount, lessons).map(drop),
        Operation::Adjust {
            client,
            amount,
            lessons,
        } => ledger.adjust_balance(client, amount, lessons).map(drop),
    }
}

/// Applies operations from a CSV reader in file order.
///
/// Rows are streamed, so large files are not loaded into memory. Malformed
/// rows and rejected operations are logged and skipped. Receipts from the
/// built-in spool are drained after every row.
///
/// # CSV Format
///
/// Columns: `op, client, worker, amount, lessons, name`
/// - `op`: client, worker, deposit, charge or adjust
/// - `client` / `worker`: ids as assigned in creation order, starting at 1
/// - `amount`: decimal with up to 2 places (opening grant for `client`)
/// - `lessons`: lesson credits added, consumed or removed
/// - `name`: client full name or worker login
///
/// # Example
///
/// ```csv
/// op,client,worker,amount,lessons,name
/// client,,,100.00,5,Aysel Huseynova
/// worker,,,,,nigar
/// charge,1,1,30.00,2,
/// ```
///
/// # Errors
///
/// Returns a CSV error only if the reader itself fails.
pub fn process_operations<R: Read>(ledger: &Ledger, reader: R) -> Result<(), csv::Error> {
    let mut rdr = ReaderBuilder::new()
        .trim(Trim::All)
        .flexible(true)
        .has_headers(true)
        .from_reader(reader);

    for (line, result) in rdr.deserialize::<CsvRecord>().enumerate() {
        let row = line + 2;
        let record = match result {
            Ok(record) => record,
            Err(e) if e.is_io_error() => return Err(e),
            Err(e) => {
                warn!(row, "Skipping malformed row: {e}");
                continue;
            }
        };
        let operation = match record.into_operation() {
            Ok(operation) => operation,
            Err(e) => {
                warn!(row, "Skipping invalid operation: {e}");
                continue;
            }
        };
        if let Err(e) = apply(ledger, operation) {
            warn!(row, "Operation rejected: {e}");
        }
        flush_receipts(ledger);
    }

    Ok(())
}

/// Hands receipts queued on the built-in spool to the log. With `--receipts`
/// they go to files instead and the spool stays empty.
fn flush_receipts(ledger: &Ledger) {
    for receipt in ledger.drain_receipts() {
        debug!(record = %receipt.record_id, "receipt\n{}", receipt.text);
    }
}

/// Writes client balances as CSV.
///
/// Columns: `client, full_name, balance, lessons_balance`
pub fn write_clients<W: Write>(ledger: &Ledger, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for account in ledger.client_accounts() {
        wtr.serialize(&*account)?;
    }
    wtr.flush()?;
    Ok(())
}

/// Writes the unified log as CSV, newest first.
///
/// Columns: `record_id, created_at, kind, description, amount, lessons`
pub fn write_report<W: Write>(report: &LedgerReport, writer: W) -> Result<(), csv::Error> {
    let mut wtr = Writer::from_writer(writer);
    for entry in &report.entries {
        wtr.serialize(entry)?;
    }
    wtr.flush()?;
    Ok(())
}

fn print_totals(report: &LedgerReport) {
    let totals = &report.totals;
    eprintln!("total_income      {}", totals.total_income);
    eprintln!("total_deposits    {}", totals.total_deposits);
    eprintln!("total_adjustments {}", totals.total_adjustments);
    eprintln!("net_profit        {}", totals.net_profit);
    debug!(entries = report.entries.len(), "report written");
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;
    use std::io::Cursor;

    const HEADER: &str = "op,client,worker,amount,lessons,name\n";

    fn replay(body: &str) -> Ledger {
        let ledger = Ledger::new();
        process_operations(&ledger, Cursor::new(format!("{HEADER}{body}"))).unwrap();
        ledger
    }

    #[test]
    fn creates_clients_with_opening_grant() {
        let ledger = replay("client,,,100.00,5,Aysel Huseynova\n");
        let client = ledger.client(ClientId(1)).unwrap();
        assert_eq!(client.full_name, "Aysel Huseynova");
        assert_eq!(client.balance, dec!(100.00));
        assert_eq!(client.lessons_balance, 5);
    }

    #[test]
    fn replays_documented_scenario() {
        let ledger = replay(
            "client,,,100.00,5,Aysel\n\
             worker,,,,,nigar\n\
             charge,1,1,30.00,2,\n\
             charge,1,1,1000.00,0,\n\
             deposit,1,,50.00,1,\n\
             adjust,1,,20.00,1,\n",
        );
        let client = ledger.client(ClientId(1)).unwrap();
        assert_eq!(client.balance, dec!(100.00));
        assert_eq!(client.lessons_balance, 3);
        assert_eq!(ledger.recent_charges(10).len(), 1);
    }

    #[test]
    fn replay_drains_spooled_receipts() {
        let ledger = replay(
            "client,,,100.00,5,Aysel\n\
             worker,,,,,nigar\n\
             charge,1,1,10.00,1,\n\
             charge,1,1,10.00,1,\n",
        );
        let charges = ledger.recent_charges(10);
        assert_eq!(charges.len(), 2);
        assert!(charges.iter().all(|c| c.receipt_printed));
        assert!(ledger.drain_receipts().is_empty());
    }

    #[test]
    fn skips_malformed_and_invalid_rows() {
        let ledger = replay(
            "client,,,,,Aysel\n\
             deposit,one,,10,,\n\
             deposit,1,,ten,,\n\
             refund,1,,10,,\n\
             deposit,1,,10,-1,\n\
             deposit,1,,25.00,,\n",
        );
        assert_eq!(ledger.client(ClientId(1)).unwrap().balance, dec!(25.00));
        assert_eq!(ledger.journal().len(), 1);
    }

    #[test]
    fn short_rows_are_accepted() {
        let ledger = replay("client,,,50\n");
        assert!(matches!(
            ledger.client(ClientId(1)),
            Err(LedgerError::ClientNotFound(_))
        ));
        let ledger = replay("client,,,50,,Leyla\ndeposit,1,,5\n");
        assert_eq!(ledger.client(ClientId(1)).unwrap().balance, dec!(55.00));
    }

    #[test]
    fn write_clients_to_csv() {
        let ledger = replay("client,,,100.5,2,Aysel\nclient,,,,,Leyla\n");
        let mut output = Vec::new();
        write_clients(&ledger, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        let mut lines = output.lines();
        assert_eq!(lines.next(), Some("client,full_name,balance,lessons_balance"));
        assert_eq!(lines.next(), Some("1,Aysel,100.50,2"));
        assert_eq!(lines.next(), Some("2,Leyla,0.00,0"));
    }

    #[test]
    fn write_report_to_csv() {
        let ledger = replay(
            "client,,,100.00,5,Aysel\n\
             worker,,,,,nigar\n\
             charge,1,1,30.00,2,\n",
        );
        let report = ledger.query_ledger(&LedgerFilter::all());
        let mut output = Vec::new();
        write_report(&report, &mut output).unwrap();

        let output = String::from_utf8(output).unwrap();
        let lines: Vec<_> = output.lines().collect();
        assert_eq!(lines[0], "record_id,created_at,kind,description,amount,lessons");
        assert!(lines[1].starts_with("2,"));
        assert!(lines[1].ends_with(",session_charge,Aysel -> nigar,30.00,2"));
        assert!(lines[2].ends_with(",deposit,Client: Aysel,100.00,5"));
    }
}

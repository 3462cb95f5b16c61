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

//! The ledger: balance mutations, entity lifecycle and queries.
//!
//! Each mutating operation is one unit of work. Inputs are validated first,
//! then the client lock (and worker lock, for charges) is taken through the
//! [`ConcurrencyGuard`], sufficiency is checked against the values seen under
//! the lock, the audit record is appended and only then are the new balances
//! written. A failure at any step leaves both the balances and the journal
//! untouched.

use crate::amount::{validate_amount, validate_removal};
use crate::base::{ClientId, RecordId, WorkerId};
use crate::client::{Balances, Client, ClientAccount, ClientData, ClientProfile};
use crate::clock::{Clock, SystemClock};
use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::guard::{ConcurrencyGuard, Entity};
use crate::journal::Journal;
use crate::receipt::{Receipt, ReceiptPrinter, SpoolPrinter};
use crate::record::{BalanceAdjustment, Deposit, LedgerRecord, SessionCharge};
use crate::report::{self, LedgerFilter, LedgerReport};
use crate::worker::{Worker, WorkerAccount};
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::{debug, info, instrument, warn};

/// Input for [`Ledger::create_client`].
#[derive(Debug, Clone, Default)]
pub struct NewClient {
    pub full_name: String,
    pub profile: ClientProfile,
    /// Opening grant, recorded as an ordinary deposit.
    pub opening_balance: Decimal,
    pub opening_lessons: u32,
}

impl NewClient {
    pub fn named(full_name: impl Into<String>) -> Self {
        Self {
            full_name: full_name.into(),
            ..Self::default()
        }
    }

    pub fn with_profile(mut self, profile: ClientProfile) -> Self {
        self.profile = profile;
        self
    }

    pub fn with_opening_grant(mut self, balance: Decimal, lessons: u32) -> Self {
        self.opening_balance = balance;
        self.opening_lessons = lessons;
        self
    }

    fn has_grant(&self) -> bool {
        !self.opening_balance.is_zero() || self.opening_lessons > 0
    }
}

/// Result of replaying a client's records against its live balances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reconciliation {
    pub client_id: ClientId,
    pub live: Balances,
    /// Sum of deposits minus charges minus adjustments.
    pub replayed_balance: Decimal,
    pub replayed_lessons: i64,
    pub records: usize,
    /// Records whose snapshot differs from the replayed running balance.
    pub snapshot_mismatches: Vec<RecordId>,
}

impl Reconciliation {
    pub fn is_consistent(&self) -> bool {
        self.snapshot_mismatches.is_empty()
            && self.replayed_balance == self.live.balance
            && self.replayed_lessons == i64::from(self.live.lessons_balance)
    }
}

pub struct Ledger {
    clients: DashMap<ClientId, Arc<ClientAccount>>,
    workers: DashMap<WorkerId, Arc<WorkerAccount>>,
    /// Worker logins, for one worker per external principal.
    logins: DashMap<String, WorkerId>,
    journal: Journal,
    next_client: AtomicU32,
    next_worker: AtomicU32,
    guard: ConcurrencyGuard,
    config: LedgerConfig,
    clock: Arc<dyn Clock>,
    printer: Arc<dyn ReceiptPrinter>,
    /// Built-in spool behind `printer`, until a custom printer replaces it.
    spool: Option<Arc<SpoolPrinter>>,
}

impl Ledger {
    /// Creates an empty ledger with default settings, the system clock and an
    /// in-memory receipt spool drained through [`Ledger::drain_receipts`].
    pub fn new() -> Self {
        Self::with_config(LedgerConfig::default())
    }

    pub fn with_config(config: LedgerConfig) -> Self {
        let spool = Arc::new(SpoolPrinter::new());
        Ledger {
            clients: DashMap::new(),
            workers: DashMap::new(),
            logins: DashMap::new(),
            journal: Journal::new(),
            next_client: AtomicU32::new(0),
            next_worker: AtomicU32::new(0),
            guard: ConcurrencyGuard::new(config.lock_timeout),
            config,
            clock: Arc::new(SystemClock),
            printer: Arc::clone(&spool) as Arc<dyn ReceiptPrinter>,
            spool: Some(spool),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_printer(mut self, printer: Arc<dyn ReceiptPrinter>) -> Self {
        self.printer = printer;
        self.spool = None;
        self
    }

    /// Takes the receipts queued on the built-in spool, oldest first.
    ///
    /// Always empty once [`Ledger::with_printer`] installed another printer.
    pub fn drain_receipts(&self) -> Vec<Receipt> {
        self.spool
            .as_ref()
            .map(|spool| spool.drain())
            .unwrap_or_default()
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn journal(&self) -> &Journal {
        &self.journal
    }

    // === Balance mutations ===

    /// Charges a delivered session to the client's balance and lesson credits.
    ///
    /// A receipt is emitted after commit. Emission failure is logged and only
    /// leaves `receipt_printed` false on the returned record.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - `amount` not positive.
    /// - [`LedgerError::ClientNotFound`] / [`LedgerError::WorkerNotFound`].
    /// - [`LedgerError::InsufficientFunds`] / [`LedgerError::InsufficientLessons`].
    /// - [`LedgerError::LockTimeout`] - retryable, nothing was changed.
    #[instrument(skip(self))]
    pub fn charge_session(
        &self,
        client_id: ClientId,
        worker_id: WorkerId,
        amount: Decimal,
        lessons_count: u32,
    ) -> Result<SessionCharge, LedgerError> {
        let amount = validate_amount(amount)?;
        let client = self.client_account(client_id)?;
        let worker = self.worker_account(worker_id)?;

        let charge = {
            let mut data = self.guard.acquire(client.mutex(), Entity::Client(client_id))?;
            data.ensure_live()?;
            let mut worker_data = self.guard.acquire(worker.mutex(), Entity::Worker(worker_id))?;
            worker_data.ensure_live()?;

            let after = data
                .debit(amount, lessons_count)
                .inspect_err(|error| debug!(%error, "session charge rejected"))?;
            let charge = self.append_and_commit(&mut data, after, |id, created_at| SessionCharge {
                id,
                client_id,
                worker_id,
                amount,
                lessons_count,
                balance_after: after.balance,
                lessons_balance_after: after.lessons_balance,
                created_at,
                receipt_printed: false,
            })?;
            worker_data.record_added();
            charge
        };
        info!(
            record = %charge.id,
            %amount,
            lessons_count,
            balance_after = %charge.balance_after,
            "session charged"
        );

        let receipt_printed = self.emit_receipt(&LedgerRecord::from(charge.clone()));
        Ok(SessionCharge {
            receipt_printed,
            ..charge
        })
    }

    /// Adds money and lesson credits to a client. Always accepted once valid.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - `amount` not positive.
    /// - [`LedgerError::ClientNotFound`].
    /// - [`LedgerError::BalanceOverflow`] - balance would exceed the column limit.
    /// - [`LedgerError::LockTimeout`].
    #[instrument(skip(self))]
    pub fn deposit(
        &self,
        client_id: ClientId,
        amount: Decimal,
        lessons_added: u32,
    ) -> Result<Deposit, LedgerError> {
        let amount = validate_amount(amount)?;
        let client = self.client_account(client_id)?;
        let mut data = self.guard.acquire(client.mutex(), Entity::Client(client_id))?;
        let deposit = self.apply_deposit(&mut data, client_id, amount, lessons_added)?;
        drop(data);

        info!(
            record = %deposit.id,
            %amount,
            lessons_added,
            balance_after = %deposit.balance_after,
            "deposit recorded"
        );
        Ok(deposit)
    }

    /// Removes money and/or lesson credits from a client, e.g. to cancel a
    /// deposit. The decrement is against the aggregate balance, not tied to a
    /// particular deposit.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidAmount`] - negative amount.
    /// - [`LedgerError::EmptyAdjustment`] - removes nothing.
    /// - [`LedgerError::ClientNotFound`].
    /// - [`LedgerError::InsufficientFunds`] / [`LedgerError::InsufficientLessons`].
    /// - [`LedgerError::LockTimeout`].
    #[instrument(skip(self))]
    pub fn adjust_balance(
        &self,
        client_id: ClientId,
        amount_removed: Decimal,
        lessons_removed: u32,
    ) -> Result<BalanceAdjustment, LedgerError> {
        let amount_removed = validate_removal(amount_removed)?;
        if amount_removed.is_zero() && lessons_removed == 0 {
            return Err(LedgerError::EmptyAdjustment);
        }
        let client = self.client_account(client_id)?;

        let adjustment = {
            let mut data = self.guard.acquire(client.mutex(), Entity::Client(client_id))?;
            let after = data
                .debit(amount_removed, lessons_removed)
                .inspect_err(|error| debug!(%error, "adjustment rejected"))?;
            self.append_and_commit(&mut data, after, |id, created_at| BalanceAdjustment {
                id,
                client_id,
                amount_removed,
                lessons_removed,
                balance_after: after.balance,
                lessons_balance_after: after.lessons_balance,
                created_at,
            })?
        };
        info!(
            record = %adjustment.id,
            %amount_removed,
            lessons_removed,
            balance_after = %adjustment.balance_after,
            "balance adjusted"
        );
        Ok(adjustment)
    }

    fn apply_deposit(
        &self,
        data: &mut ClientData,
        client_id: ClientId,
        amount: Decimal,
        lessons_added: u32,
    ) -> Result<Deposit, LedgerError> {
        let after = data.credit(amount, lessons_added)?;
        self.append_and_commit(data, after, |id, created_at| Deposit {
            id,
            client_id,
            amount,
            lessons_added,
            balance_after: after.balance,
            lessons_balance_after: after.lessons_balance,
            created_at,
        })
    }

    /// Appends the record built by `build`, then writes `after` to the client.
    /// Must be called with the client lock held.
    fn append_and_commit<R, F>(
        &self,
        data: &mut ClientData,
        after: Balances,
        build: F,
    ) -> Result<R, LedgerError>
    where
        R: Clone + Into<LedgerRecord>,
        F: FnOnce(RecordId, DateTime<Utc>) -> R,
    {
        let created_at = data.stamp(self.clock.now());
        let record = build(self.journal.next_id(), created_at);
        self.journal.append(record.clone().into())?;
        data.commit(after, created_at);
        Ok(record)
    }

    // === Receipts ===

    /// Re-emits the receipt of any record.
    ///
    /// Returns whether emission succeeded. For session charges the first
    /// success also sets `receipt_printed`.
    pub fn print_receipt(&self, record_id: RecordId) -> Result<bool, LedgerError> {
        let record = self.record(record_id)?;
        Ok(self.emit_receipt(&record))
    }

    pub fn render_receipt(&self, record: &LedgerRecord) -> Receipt {
        let client_name = self.client_name(record.client_id());
        let worker_name = record.worker_id().map(|id| self.worker_display_name(id));
        Receipt::render(record, &client_name, worker_name.as_deref(), &self.config)
    }

    fn emit_receipt(&self, record: &LedgerRecord) -> bool {
        let receipt = self.render_receipt(record);
        match self.printer.emit(&receipt) {
            Ok(()) => {
                if let Err(error) = self.journal.mark_receipt_printed(record.id()) {
                    warn!(record = %record.id(), %error, "could not flag receipt as printed");
                }
                true
            }
            Err(error) => {
                warn!(record = %record.id(), %error, "receipt emission failed");
                false
            }
        }
    }

    // === Clients and workers ===

    /// Creates a client, optionally with an opening grant.
    ///
    /// The grant is stored as a regular deposit, so it follows the deposit
    /// rules: a non-zero grant needs a positive amount.
    ///
    /// # Errors
    ///
    /// - [`LedgerError::InvalidInput`] - blank name.
    /// - [`LedgerError::InvalidAmount`] - invalid opening grant.
    #[instrument(skip(self))]
    pub fn create_client(&self, new_client: NewClient) -> Result<Client, LedgerError> {
        let full_name = new_client.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(LedgerError::InvalidInput("client name is required".into()));
        }
        let grant = if new_client.has_grant() {
            Some(validate_amount(new_client.opening_balance)?)
        } else {
            None
        };

        let client_id = ClientId(self.next_client.fetch_add(1, Ordering::SeqCst) + 1);
        let account = Arc::new(ClientAccount::new(
            client_id,
            full_name,
            new_client.profile,
            self.clock.now(),
        ));

        // The grant is applied before the client is published, so nobody can
        // observe the client without it.
        if let Some(amount) = grant {
            let mut data = account.mutex().lock();
            self.apply_deposit(&mut data, client_id, amount, new_client.opening_lessons)?;
        }
        self.clients.insert(client_id, Arc::clone(&account));

        let client = account.snapshot();
        info!(client = %client_id, balance = %client.balance, "client created");
        Ok(client)
    }

    /// Registers the worker profile of an external login.
    ///
    /// # Errors
    ///
    /// [`LedgerError::InvalidInput`] for a blank or already registered login.
    #[instrument(skip(self))]
    pub fn register_worker(&self, login: &str, display_name: &str) -> Result<Worker, LedgerError> {
        let login = login.trim().to_string();
        if login.is_empty() {
            return Err(LedgerError::InvalidInput("worker login is required".into()));
        }

        match self.logins.entry(login.clone()) {
            Entry::Occupied(_) => Err(LedgerError::InvalidInput(format!(
                "login {login:?} already has a worker profile"
            ))),
            Entry::Vacant(entry) => {
                let worker_id = WorkerId(self.next_worker.fetch_add(1, Ordering::SeqCst) + 1);
                let account = Arc::new(WorkerAccount::new(
                    worker_id,
                    login,
                    display_name.trim().to_string(),
                    self.clock.now(),
                ));
                let worker = account.worker().clone();
                self.workers.insert(worker_id, account);
                entry.insert(worker_id);
                info!(worker = %worker_id, login = %worker.login, "worker registered");
                Ok(worker)
            }
        }
    }

    /// Deletes a client without ledger history.
    ///
    /// # Errors
    ///
    /// [`LedgerError::HasHistory`] once any record references the client.
    pub fn delete_client(&self, client_id: ClientId) -> Result<(), LedgerError> {
        let client = self.client_account(client_id)?;
        let mut data = self.guard.acquire(client.mutex(), Entity::Client(client_id))?;
        data.ensure_live()?;
        if data.has_history() {
            return Err(LedgerError::HasHistory);
        }
        data.mark_deleted();
        self.clients.remove(&client_id);
        info!(client = %client_id, "client deleted");
        Ok(())
    }

    /// Deletes a worker without session charges.
    ///
    /// # Errors
    ///
    /// [`LedgerError::HasHistory`] once any session charge references the worker.
    pub fn delete_worker(&self, worker_id: WorkerId) -> Result<(), LedgerError> {
        let worker = self.worker_account(worker_id)?;
        let mut data = self.guard.acquire(worker.mutex(), Entity::Worker(worker_id))?;
        data.ensure_live()?;
        if data.has_history() {
            return Err(LedgerError::HasHistory);
        }
        data.mark_deleted();
        self.workers.remove(&worker_id);
        self.logins.remove(&worker.worker().login);
        info!(worker = %worker_id, "worker deleted");
        Ok(())
    }

    // === Queries ===

    pub fn client(&self, client_id: ClientId) -> Result<Client, LedgerError> {
        Ok(self.client_account(client_id)?.snapshot())
    }

    pub fn worker(&self, worker_id: WorkerId) -> Result<Worker, LedgerError> {
        Ok(self.worker_account(worker_id)?.worker().clone())
    }

    /// Live client accounts ordered by id.
    pub fn client_accounts(&self) -> Vec<Arc<ClientAccount>> {
        let mut accounts: Vec<_> = self.clients.iter().map(|r| Arc::clone(r.value())).collect();
        accounts.sort_by_key(|account| account.id());
        accounts
    }

    pub fn clients(&self) -> Vec<Client> {
        self.client_accounts()
            .iter()
            .map(|account| account.snapshot())
            .collect()
    }

    pub fn workers(&self) -> Vec<Worker> {
        let mut workers: Vec<_> = self.workers.iter().map(|r| r.worker().clone()).collect();
        workers.sort_by_key(|worker| worker.id);
        workers
    }

    /// Clients whose name contains `query`, ignoring case. Blank matches all.
    pub fn search_clients(&self, query: &str) -> Vec<Client> {
        let needle = query.trim().to_lowercase();
        self.client_accounts()
            .iter()
            .filter(|account| account.full_name().to_lowercase().contains(&needle))
            .map(|account| account.snapshot())
            .collect()
    }

    /// Workers whose login or display name contains `query`, ignoring case.
    pub fn search_workers(&self, query: &str) -> Vec<Worker> {
        let needle = query.trim();
        self.workers()
            .into_iter()
            .filter(|worker| worker.matches(needle))
            .collect()
    }

    pub fn record(&self, record_id: RecordId) -> Result<LedgerRecord, LedgerError> {
        self.journal
            .get(record_id)
            .ok_or(LedgerError::RecordNotFound(record_id))
    }

    /// The latest `limit` session charges, newest first.
    pub fn recent_charges(&self, limit: usize) -> Vec<SessionCharge> {
        self.journal
            .records()
            .into_iter()
            .rev()
            .filter_map(|record| match record {
                LedgerRecord::SessionCharge(charge) => Some(charge),
                _ => None,
            })
            .take(limit)
            .collect()
    }

    /// Records of one client in commit order.
    pub fn client_history(&self, client_id: ClientId) -> Result<Vec<LedgerRecord>, LedgerError> {
        self.client_account(client_id)?;
        Ok(self.journal.for_client(client_id))
    }

    /// Replays a client's records from zero and compares every snapshot and
    /// the final result with the live balances.
    ///
    /// Runs under the client lock so no mutation lands mid-replay.
    pub fn reconcile(&self, client_id: ClientId) -> Result<Reconciliation, LedgerError> {
        let client = self.client_account(client_id)?;
        let data = self.guard.acquire(client.mutex(), Entity::Client(client_id))?;
        data.ensure_live()?;
        let records = self.journal.for_client(client_id);

        let mut balance = Decimal::ZERO;
        let mut lessons = 0i64;
        let mut snapshot_mismatches = Vec::new();
        for record in &records {
            balance += record.balance_delta();
            lessons += record.lessons_delta();
            let after = record.balances_after();
            if after.balance != balance || i64::from(after.lessons_balance) != lessons {
                snapshot_mismatches.push(record.id());
            }
        }

        let reconciliation = Reconciliation {
            client_id,
            live: data.balances(),
            replayed_balance: balance,
            replayed_lessons: lessons,
            records: records.len(),
            snapshot_mismatches,
        };
        if !reconciliation.is_consistent() {
            warn!(client = %client_id, ?reconciliation, "ledger drift detected");
        }
        Ok(reconciliation)
    }

    /// Totals and the unified log for `filter`.
    ///
    /// Works on a snapshot of the journal and takes no entity lock.
    pub fn query_ledger(&self, filter: &LedgerFilter) -> LedgerReport {
        report::aggregate(self.journal.records(), filter, &self.config, |record| {
            match record {
                LedgerRecord::SessionCharge(charge) => format!(
                    "{} -> {}",
                    self.client_name(charge.client_id),
                    self.worker_login(charge.worker_id)
                ),
                _ => format!("Client: {}", self.client_name(record.client_id())),
            }
        })
    }

    // === Lookup helpers ===

    // The map guard is released before the caller takes the entity lock.
    fn client_account(&self, client_id: ClientId) -> Result<Arc<ClientAccount>, LedgerError> {
        self.clients
            .get(&client_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(LedgerError::ClientNotFound(client_id))
    }

    fn worker_account(&self, worker_id: WorkerId) -> Result<Arc<WorkerAccount>, LedgerError> {
        self.workers
            .get(&worker_id)
            .map(|r| Arc::clone(r.value()))
            .ok_or(LedgerError::WorkerNotFound(worker_id))
    }

    fn client_name(&self, client_id: ClientId) -> String {
        self.clients
            .get(&client_id)
            .map(|r| r.full_name().to_string())
            .unwrap_or_else(|| format!("#{client_id}"))
    }

    fn worker_login(&self, worker_id: WorkerId) -> String {
        self.workers
            .get(&worker_id)
            .map(|r| r.worker().login.clone())
            .unwrap_or_else(|| format!("#{worker_id}"))
    }

    fn worker_display_name(&self, worker_id: WorkerId) -> String {
        self.workers
            .get(&worker_id)
            .map(|r| r.worker().display_name.clone())
            .unwrap_or_else(|| format!("#{worker_id}"))
    }
}

impl Default for Ledger {
    fn default() -> Self {
        Self::new()
    }
}

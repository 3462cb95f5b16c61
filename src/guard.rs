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

//! Per-entity exclusive locking.
//!
//! Every balance-mutating operation takes the lock of the client it touches
//! (and of the worker, for session charges) before reading balances, and holds
//! it until the record and the new balances are both written. Locks are per
//! entity, so operations on different clients run in parallel.
//!
//! Lock order is always client, then worker. Nothing takes a worker lock and
//! then a client lock, so the order cannot cycle.
//!
//! A session charge holds its worker's lock for the whole unit of work, the
//! same row lock the charge would take in a relational store. Charges by one
//! worker are therefore serialized even across different clients; deposits
//! and adjustments, and charges by different workers, still run in parallel.

use crate::base::{ClientId, WorkerId};
use crate::error::LedgerError;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::time::Duration;
use tracing::{trace, warn};

/// Lockable ledger entity, used in timeout errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Client(ClientId),
    Worker(WorkerId),
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Client(id) => write!(f, "client {id}"),
            Self::Worker(id) => write!(f, "worker {id}"),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ConcurrencyGuard {
    timeout: Duration,
}

impl ConcurrencyGuard {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Blocks until `mutex` is free or the timeout elapses.
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::LockTimeout`], which is retryable. Nothing has
    /// been read or written at that point.
    pub fn acquire<'a, T>(
        &self,
        mutex: &'a Mutex<T>,
        entity: Entity,
    ) -> Result<MutexGuard<'a, T>, LedgerError> {
        if let Some(guard) = mutex.try_lock() {
            return Ok(guard);
        }
        trace!(%entity, "waiting for lock");
        mutex.try_lock_for(self.timeout).ok_or_else(|| {
            warn!(%entity, timeout = ?self.timeout, "lock wait timed out");
            LedgerError::LockTimeout(entity)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::mpsc;
    use std::thread;

    #[test]
    fn acquires_free_lock_immediately() {
        let guard = ConcurrencyGuard::new(Duration::from_millis(10));
        let mutex = Mutex::new(5);
        let value = guard.acquire(&mutex, Entity::Client(ClientId(1))).unwrap();
        assert_eq!(*value, 5);
    }

    #[test]
    fn times_out_while_lock_is_held() {
        let guard = ConcurrencyGuard::new(Duration::from_millis(20));
        let mutex = Mutex::new(());
        let _held = mutex.lock();

        let result = guard.acquire(&mutex, Entity::Worker(WorkerId(7)));
        assert_eq!(
            result.err(),
            Some(LedgerError::LockTimeout(Entity::Worker(WorkerId(7))))
        );
    }

    #[test]
    fn waits_for_release() {
        let guard = ConcurrencyGuard::new(Duration::from_secs(5));
        let mutex = Arc::new(Mutex::new(0u32));
        let (locked_tx, locked_rx) = mpsc::channel();

        let holder = {
            let mutex = Arc::clone(&mutex);
            thread::spawn(move || {
                let mut value = mutex.lock();
                locked_tx.send(()).unwrap();
                thread::sleep(Duration::from_millis(50));
                *value = 1;
            })
        };

        locked_rx.recv().unwrap();
        let value = guard.acquire(&mutex, Entity::Client(ClientId(1))).unwrap();
        assert_eq!(*value, 1);
        drop(value);
        holder.join().unwrap();
    }

    #[test]
    fn entity_labels() {
        assert_eq!(Entity::Client(ClientId(3)).to_string(), "client 3");
        assert_eq!(Entity::Worker(WorkerId(4)).to_string(), "worker 4");
    }
}

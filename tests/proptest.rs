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

//! Property-based tests for the ledger.
//!
//! These tests verify invariants that should hold for any sequence of
//! operations, accepted or rejected.

use proptest::prelude::*;
use rust_decimal::Decimal;
use studio_ledger::{
    ClientId, Ledger, LedgerError, LedgerFilter, LedgerRecord, NewClient, WorkerId,
};

// =============================================================================
// Arbitrary Strategies
// =============================================================================

/// Generate a positive amount (0.01 to 500.00, cent precision).
fn arb_amount() -> impl Strategy<Value = Decimal> {
    (1i64..=50_000i64).prop_map(|cents| Decimal::new(cents, 2))
}

#[derive(Debug, Clone)]
enum Op {
    Charge(Decimal, u32),
    Deposit(Decimal, u32),
    Adjust(Decimal, u32),
}

fn arb_op() -> impl Strategy<Value = Op> {
    prop_oneof![
        (arb_amount(), 0u32..4).prop_map(|(a, l)| Op::Charge(a, l)),
        (arb_amount(), 0u32..4).prop_map(|(a, l)| Op::Deposit(a, l)),
        (arb_amount(), 1u32..3).prop_map(|(a, l)| Op::Adjust(a, l)),
    ]
}

fn setup(opening: Decimal, lessons: u32) -> (Ledger, ClientId, WorkerId) {
    let ledger = Ledger::new();
    let client = ledger
        .create_client(NewClient::named("Aysel").with_opening_grant(opening, lessons))
        .unwrap()
        .id;
    let worker = ledger.register_worker("nigar", "").unwrap().id;
    (ledger, client, worker)
}

fn apply(ledger: &Ledger, client: ClientId, worker: WorkerId, op: &Op) -> Result<(), LedgerError> {
    match *op {
        Op::Charge(amount, lessons) => {
            ledger.charge_session(client, worker, amount, lessons).map(drop)
        }
        Op::Deposit(amount, lessons) => ledger.deposit(client, amount, lessons).map(drop),
        Op::Adjust(amount, lessons) => {
            ledger.adjust_balance(client, amount, lessons).map(drop)
        }
    }
}

// =============================================================================
// Balance Invariant Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(500))]

    /// Live balance equals deposits minus charges minus adjustments.
    #[test]
    fn balance_is_conserved(
        opening in arb_amount(),
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let (ledger, client, worker) = setup(opening, 5);
        for op in &ops {
            let _ = apply(&ledger, client, worker, op);
        }

        let report = ledger.query_ledger(&LedgerFilter::all().for_client(client));
        let totals = report.totals;
        let snapshot = ledger.client(client).unwrap();
        prop_assert_eq!(
            snapshot.balance,
            totals.total_deposits - totals.total_income - totals.total_adjustments
        );
    }

    /// No sequence drives money or lessons below zero, and rejections are
    /// all-or-nothing.
    #[test]
    fn balances_never_negative(
        opening in arb_amount(),
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let (ledger, client, worker) = setup(opening, 2);
        for op in &ops {
            let before = ledger.client(client).unwrap();
            let records = ledger.journal().len();
            match apply(&ledger, client, worker, op) {
                Ok(()) => prop_assert_eq!(ledger.journal().len(), records + 1),
                Err(LedgerError::InsufficientFunds { .. })
                | Err(LedgerError::InsufficientLessons { .. }) => {
                    prop_assert_eq!(ledger.client(client).unwrap(), before);
                    prop_assert_eq!(ledger.journal().len(), records);
                }
                Err(other) => prop_assert!(false, "unexpected error: {}", other),
            }
            let after = ledger.client(client).unwrap();
            prop_assert!(after.balance >= Decimal::ZERO);
        }
    }

    /// Every record's snapshot equals the replayed balance at that point.
    #[test]
    fn snapshots_match_replay(
        opening in arb_amount(),
        ops in prop::collection::vec(arb_op(), 1..40),
    ) {
        let (ledger, client, worker) = setup(opening, 3);
        for op in &ops {
            let _ = apply(&ledger, client, worker, op);
        }

        let mut balance = Decimal::ZERO;
        let mut lessons = 0i64;
        for record in ledger.client_history(client).unwrap() {
            match &record {
                LedgerRecord::Deposit(d) => {
                    balance += d.amount;
                    lessons += i64::from(d.lessons_added);
                }
                LedgerRecord::SessionCharge(c) => {
                    balance -= c.amount;
                    lessons -= i64::from(c.lessons_count);
                }
                LedgerRecord::Adjustment(a) => {
                    balance -= a.amount_removed;
                    lessons -= i64::from(a.lessons_removed);
                }
            }
            let after = record.balances_after();
            prop_assert_eq!(after.balance, balance);
            prop_assert_eq!(i64::from(after.lessons_balance), lessons);
        }

        let reconciliation = ledger.reconcile(client).unwrap();
        prop_assert!(reconciliation.is_consistent());
    }
}

// =============================================================================
// Ordering Tests
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(300))]

    /// Deposits commute: any order lands on the same balance.
    #[test]
    fn deposit_order_independent(
        amounts in prop::collection::vec(arb_amount(), 1..20),
    ) {
        let (forward, a, _) = setup(Decimal::ONE, 0);
        let (backward, b, _) = setup(Decimal::ONE, 0);
        for amount in &amounts {
            forward.deposit(a, *amount, 1).unwrap();
        }
        for amount in amounts.iter().rev() {
            backward.deposit(b, *amount, 1).unwrap();
        }

        let expected: Decimal = Decimal::ONE + amounts.iter().copied().sum::<Decimal>();
        prop_assert_eq!(forward.client(a).unwrap().balance, expected);
        prop_assert_eq!(backward.client(b).unwrap().balance, expected);
    }

    /// Replaying accepted operations alone reproduces the final state.
    #[test]
    fn accepted_operations_replay_serially(
        opening in arb_amount(),
        ops in prop::collection::vec(arb_op(), 1..30),
    ) {
        let (ledger, client, worker) = setup(opening, 4);
        let accepted: Vec<_> = ops
            .iter()
            .filter(|op| apply(&ledger, client, worker, op).is_ok())
            .cloned()
            .collect();

        let (replay, replay_client, replay_worker) = setup(opening, 4);
        for op in &accepted {
            prop_assert!(apply(&replay, replay_client, replay_worker, op).is_ok());
        }
        prop_assert_eq!(
            replay.client(replay_client).unwrap().balance,
            ledger.client(client).unwrap().balance
        );
        prop_assert_eq!(
            replay.client(replay_client).unwrap().lessons_balance,
            ledger.client(client).unwrap().lessons_balance
        );
    }
}

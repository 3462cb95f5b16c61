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

//! Money and lesson-count validation.
//!
//! Balances are fixed point with two fractional digits and at most ten
//! significant digits, the same shape as a `DECIMAL(10, 2)` column.

use crate::error::LedgerError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use std::str::FromStr;

/// Number of fractional digits kept for every amount and balance.
pub const MONEY_SCALE: u32 = 2;

/// Largest representable amount or balance.
pub const MAX_AMOUNT: Decimal = dec!(99999999.99);

/// Rescales a value to [`MONEY_SCALE`] so that `70` displays as `70.00`.
pub fn to_money(mut value: Decimal) -> Decimal {
    value.rescale(MONEY_SCALE);
    value
}

fn check_precision(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount.normalize().scale() > MONEY_SCALE || amount > MAX_AMOUNT {
        return Err(LedgerError::InvalidAmount);
    }
    Ok(to_money(amount))
}

/// Validates a strictly positive amount (session price, deposit).
pub fn validate_amount(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount <= Decimal::ZERO {
        return Err(LedgerError::InvalidAmount);
    }
    check_precision(amount)
}

/// Validates a non-negative amount (money removed by an adjustment).
pub fn validate_removal(amount: Decimal) -> Result<Decimal, LedgerError> {
    if amount < Decimal::ZERO {
        return Err(LedgerError::InvalidAmount);
    }
    check_precision(amount)
}

/// Parses and validates a positive amount typed by an operator.
pub fn parse_amount(input: &str) -> Result<Decimal, LedgerError> {
    validate_amount(parse_decimal(input)?)
}

/// Parses a non-negative amount; an empty field means zero.
pub fn parse_removal(input: &str) -> Result<Decimal, LedgerError> {
    if input.trim().is_empty() {
        return Ok(to_money(Decimal::ZERO));
    }
    validate_removal(parse_decimal(input)?)
}

fn parse_decimal(input: &str) -> Result<Decimal, LedgerError> {
    Decimal::from_str(input.trim())
        .map_err(|_| LedgerError::InvalidInput(format!("malformed amount {input:?}")))
}

/// Parses a lesson count; an empty field means zero.
pub fn parse_lessons(input: &str) -> Result<u32, LedgerError> {
    let input = input.trim();
    if input.is_empty() {
        return Ok(0);
    }
    input
        .parse::<u32>()
        .map_err(|_| LedgerError::InvalidInput(format!("malformed lesson count {input:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_amounts_are_rescaled() {
        assert_eq!(validate_amount(dec!(30)).unwrap().to_string(), "30.00");
        assert_eq!(validate_amount(dec!(0.5)).unwrap().to_string(), "0.50");
        assert_eq!(validate_amount(dec!(12.340)).unwrap().to_string(), "12.34");
    }

    #[test]
    fn rejects_non_positive_amounts() {
        assert_eq!(validate_amount(Decimal::ZERO), Err(LedgerError::InvalidAmount));
        assert_eq!(validate_amount(dec!(-1)), Err(LedgerError::InvalidAmount));
    }

    #[test]
    fn rejects_sub_cent_precision() {
        assert_eq!(validate_amount(dec!(1.005)), Err(LedgerError::InvalidAmount));
    }

    #[test]
    fn rejects_amounts_above_column_limit() {
        assert!(validate_amount(MAX_AMOUNT).is_ok());
        assert_eq!(
            validate_amount(MAX_AMOUNT + dec!(0.01)),
            Err(LedgerError::InvalidAmount)
        );
    }

    #[test]
    fn removal_allows_zero() {
        assert_eq!(validate_removal(Decimal::ZERO).unwrap().to_string(), "0.00");
        assert_eq!(validate_removal(dec!(-0.01)), Err(LedgerError::InvalidAmount));
    }

    #[test]
    fn parse_amount_trims_and_validates() {
        assert_eq!(parse_amount(" 50.00 ").unwrap(), dec!(50.00));
        assert_eq!(parse_amount("0"), Err(LedgerError::InvalidAmount));
        assert!(matches!(
            parse_amount("fifty"),
            Err(LedgerError::InvalidInput(_))
        ));
    }

    #[test]
    fn parse_removal_treats_blank_as_zero() {
        assert_eq!(parse_removal("").unwrap(), Decimal::ZERO);
        assert_eq!(parse_removal("20").unwrap(), dec!(20.00));
    }

    #[test]
    fn parse_lessons_rejects_negative_counts() {
        assert_eq!(parse_lessons("").unwrap(), 0);
        assert_eq!(parse_lessons(" 3 ").unwrap(), 3);
        assert!(matches!(parse_lessons("-1"), Err(LedgerError::InvalidInput(_))));
        assert!(matches!(parse_lessons("1.5"), Err(LedgerError::InvalidInput(_))));
    }
}

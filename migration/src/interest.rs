// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Compound-interest approximation shared with the on-chain implementation.
//!
//! The currency network contract rolls balances forward with a truncating
//! Taylor expansion of `B * exp(r * dt / SECONDS_PER_YEAR)`. Migration
//! correctness depends on computing bit-identical values off-chain: the
//! balance passed to `setAccount` is rolled forward again by the
//! destination contract, and the verifier re-projects the source balance
//! before diffing. All arithmetic is integer with division truncating
//! toward zero.

use crate::error::{MigrationError, MigrationResult};
use crate::types::{INT72_MAX, INT72_MIN};

pub const SECONDS_PER_YEAR: i128 = 60 * 60 * 24 * 365;
/// Rates are per annum in hundredths of a percent: 100 = 1.00%.
pub const INTEREST_RATE_DIVISOR: i128 = 100 * 100;
/// Taylor terms beyond this order are zero for every representable input.
pub const HIGHEST_ORDER: u32 = 15;
/// Observation clock and block clock may disagree by a few seconds; a
/// delta-time down to this value is treated as zero.
pub const DELTA_TIME_MINIMAL_ALLOWED_VALUE: i64 = -60;

/// Clamp a delta-time to non-negative, rejecting anything more negative
/// than `tolerance` (in seconds, itself non-positive).
fn ensure_non_negative_delta_time(delta_time: i64, tolerance: i64) -> MigrationResult<i128> {
    if delta_time < tolerance {
        return Err(MigrationError::Interest(delta_time));
    }
    Ok(delta_time.max(0) as i128)
}

/// Accrued interest on `balance` over `delta_time` seconds at `rate`
/// (hundredths of a percent per annum), truncating-Taylor approximated.
/// Overflow in a term saturates the result to the int72 range.
pub fn calculate_interests(
    balance: i128,
    rate: i16,
    delta_time: i64,
    tolerance: i64,
) -> MigrationResult<i128> {
    let delta_time = ensure_non_negative_delta_time(delta_time, tolerance)?;
    let rate = rate as i128;

    let mut term = balance;
    let mut interests: i128 = 0;
    for order in 1..=HIGHEST_ORDER as i128 {
        let numerator = match term.checked_mul(rate).and_then(|t| t.checked_mul(delta_time)) {
            Some(n) => n,
            // A term overflowed i128; the true value is far beyond the
            // representable balance range either way.
            None => return Ok(saturating_interest_for(balance, rate)),
        };
        // Truncation toward zero, matching the contract.
        term = numerator / (SECONDS_PER_YEAR * INTEREST_RATE_DIVISOR * order);
        if term == 0 {
            break;
        }
        interests = match interests.checked_add(term) {
            Some(i) => i,
            None => return Ok(saturating_interest_for(balance, rate)),
        };
    }
    Ok(interests)
}

/// New balance after `delta_time` seconds of interest. `rate_positive`
/// applies while the balance is positive, `rate_negative` while negative.
/// The result is saturated to int72, and interest never flips the sign of
/// the balance: if it would, the balance is clamped at zero.
pub fn balance_with_interests(
    balance: i128,
    rate_positive: i16,
    rate_negative: i16,
    delta_time: i64,
    tolerance: i64,
) -> MigrationResult<i128> {
    let rate = if balance > 0 {
        rate_positive
    } else {
        rate_negative
    };
    let interests = calculate_interests(balance, rate, delta_time, tolerance)?;
    let total = balance.saturating_add(interests);
    Ok(clamp_result(balance, total))
}

/// Convenience wrapper using the default clock-skew tolerance.
pub fn balance_with_interests_default(
    balance: i128,
    rate_positive: i16,
    rate_negative: i16,
    delta_time: i64,
) -> MigrationResult<i128> {
    balance_with_interests(
        balance,
        rate_positive,
        rate_negative,
        delta_time,
        DELTA_TIME_MINIMAL_ALLOWED_VALUE,
    )
}

fn saturating_interest_for(balance: i128, rate: i128) -> i128 {
    if (balance > 0) == (rate > 0) && balance != 0 && rate != 0 {
        INT72_MAX
    } else {
        INT72_MIN
    }
}

fn clamp_result(original: i128, total: i128) -> i128 {
    // Negative rates decay the balance towards zero but must not cross it.
    let clamped = if original > 0 {
        total.max(0)
    } else if original < 0 {
        total.min(0)
    } else {
        0
    };
    clamped.clamp(INT72_MIN, INT72_MAX)
}

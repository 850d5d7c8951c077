// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Off-chain migration engine for Trustlines currency networks.
//!
//! A frozen source network (a bilateral credit-line graph with interest
//! accrual, pending requests, debts and onboarding relations) is
//! reconstructed behind a new owned contract on a possibly different chain,
//! then unfrozen and disowned. Source state is derived from the historical
//! event log only; the destination is written through the owner-only
//! `setAccount` / `setOnboarder` / `setDebt` / `setTrustlineRequest` calls
//! and verified by an independent read-only pass.

pub mod abi;
pub mod chain;
pub mod config;
pub mod driver;
pub mod entry;
pub mod error;
pub mod event_index;
pub mod events;
pub mod interest;
pub mod metrics;
pub mod state_view;
pub mod translator;
pub mod types;
pub mod verifier;

#[cfg(test)]
pub mod test_utils;

/// Retry an async operation with exponential backoff until it succeeds or
/// `max_elapsed_time` passes. Only the RPC adapter may use this: the engine
/// itself never retries and fails loudly instead.
#[macro_export]
macro_rules! retry_with_max_elapsed_time {
    ($func:expr, $max_elapsed_time:expr) => {{
        // The following delay sequence (in secs) will be used, applied with jitter
        // 0.4, 0.8, 1.6, 3.2, 6.4, 12.8, 25.6, 30, 60, 120, 120 ...
        let backoff = backoff::ExponentialBackoff {
            initial_interval: std::time::Duration::from_millis(400),
            randomization_factor: 0.1,
            multiplier: 2.0,
            max_interval: std::time::Duration::from_secs(120),
            max_elapsed_time: Some($max_elapsed_time),
            ..Default::default()
        };
        backoff::future::retry(backoff, || {
            let fut = async {
                let result = $func.await;
                match result {
                    Ok(_) => {
                        return Ok(result);
                    }
                    Err(e) => {
                        tracing::debug!("Retrying due to error: {:?}", e);
                        return Err(backoff::Error::transient(e));
                    }
                }
            };
            std::boxed::Box::pin(fut)
        })
        .await
    }};
}

// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Migration engine configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MigrationConfig {
    /// Upper bound on in-flight transactions, counted over both chains.
    #[serde(default = "default_max_tx_queue_size")]
    pub max_tx_queue_size: usize,

    /// How long to wait for a transaction receipt before giving up.
    #[serde(default = "default_receipt_timeout_seconds")]
    pub receipt_timeout_seconds: u64,

    /// Interval between receipt polls while draining the window.
    #[serde(default = "default_receipt_poll_interval_ms")]
    pub receipt_poll_interval_ms: u64,

    /// Absolute tolerance for a negative interest delta-time, accommodating
    /// trivial skew between observation clock and block timestamps.
    #[serde(default = "default_clock_skew_tolerance_seconds")]
    pub clock_skew_tolerance_seconds: u64,

    /// Maximum number of blocks per `eth_getLogs` query.
    #[serde(default = "default_log_query_range")]
    pub log_query_range: u64,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            max_tx_queue_size: default_max_tx_queue_size(),
            receipt_timeout_seconds: default_receipt_timeout_seconds(),
            receipt_poll_interval_ms: default_receipt_poll_interval_ms(),
            clock_skew_tolerance_seconds: default_clock_skew_tolerance_seconds(),
            log_query_range: default_log_query_range(),
        }
    }
}

impl MigrationConfig {
    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_secs(self.receipt_timeout_seconds)
    }

    pub fn receipt_poll_interval(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_interval_ms)
    }

    /// Interest delta-time tolerance as the (negative) lower bound.
    pub fn delta_time_tolerance(&self) -> i64 {
        -(self.clock_skew_tolerance_seconds as i64)
    }
}

fn default_max_tx_queue_size() -> usize {
    10
}

fn default_receipt_timeout_seconds() -> u64 {
    120
}

fn default_receipt_poll_interval_ms() -> u64 {
    500
}

fn default_clock_skew_tolerance_seconds() -> u64 {
    60
}

fn default_log_query_range() -> u64 {
    5000
}

// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Normalized, totally ordered event logs.
//!
//! The fold in `event_index` is only deterministic if events are replayed
//! in exactly the order the chain produced them. Order is
//! `(block_number, log_index)`; a log without a log index cannot be placed
//! and is fatal.

use ethers::abi::RawLog;
use ethers::types::Log;

use crate::abi::NetworkEvent;
use crate::error::{MigrationError, MigrationResult};

/// A decoded network event pinned to its position in history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OrderedLog {
    pub block_number: u64,
    pub log_index: u64,
    /// Timestamp of the containing block, seconds since epoch.
    pub timestamp: u64,
    pub event: NetworkEvent,
}

impl OrderedLog {
    /// Decode a provider log. Returns `Ok(None)` for events outside the
    /// currency-network schema. A pending log (no block number) or a log
    /// without a log index is an error: such events cannot be ordered
    /// truthfully.
    pub fn decode(log: &Log, timestamp: u64) -> MigrationResult<Option<Self>> {
        let block_number = log
            .block_number
            .ok_or_else(|| {
                MigrationError::Provider("provider returned log without block_number".to_string())
            })?
            .as_u64();
        let log_index = log
            .log_index
            .ok_or(MigrationError::Order { block_number })?
            .as_u64();
        let raw = RawLog {
            topics: log.topics.clone(),
            data: log.data.to_vec(),
        };
        Ok(NetworkEvent::try_decode(&raw).map(|event| OrderedLog {
            block_number,
            log_index,
            timestamp,
            event,
        }))
    }

    /// Sort key. Log indices are unique within a block, so this is a total
    /// order over one contract's history.
    pub fn position(&self) -> (u64, u64) {
        (self.block_number, self.log_index)
    }
}

/// Sort events chronologically by `(block_number, log_index)`.
pub fn sort_chronologically(logs: &mut [OrderedLog]) {
    logs.sort_by_key(|log| log.position());
}

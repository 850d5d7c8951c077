// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

use ethers::types::H256;

/// Errors surfaced by the migration engine. None of these are caught inside
/// the core; they propagate to the entry points, which render them and exit.
#[derive(Debug, thiserror::Error)]
pub enum MigrationError {
    /// Interest delta-time is more negative than the clock-skew tolerance.
    #[error("delta_time out of bounds: {0} seconds")]
    Interest(i64),
    /// An event is missing its log index, so the stream cannot be ordered
    /// truthfully.
    #[error("no log index, events cannot be ordered truthfully (block {block_number})")]
    Order { block_number: u64 },
    /// An event carries a value the data model cannot represent.
    #[error("invalid event: {0}")]
    InvalidEvent(String),
    /// A driver precondition failed before any transaction was emitted.
    #[error("migration precondition violated: {0}")]
    Precondition(String),
    /// One or more transactions failed or timed out waiting for receipts.
    #[error("transactions failed or timed out: {hashes:?}")]
    TransactionsFailed { hashes: Vec<H256> },
    /// The verifier found a destination field that does not match the
    /// projected source state.
    #[error("unexpected destination state: {0}")]
    UnexpectedState(String),
    /// JSON-RPC transport or node-side failure.
    #[error("provider error: {0}")]
    Provider(String),
    /// ABI encoding or decoding failure.
    #[error("abi error: {0}")]
    Abi(String),
}

impl MigrationError {
    /// Short stable string identifying the error kind, used as a metrics
    /// label.
    pub fn error_type(&self) -> &'static str {
        match self {
            MigrationError::Interest(_) => "interest_delta_out_of_bounds",
            MigrationError::Order { .. } => "event_order",
            MigrationError::InvalidEvent(_) => "invalid_event",
            MigrationError::Precondition(_) => "precondition",
            MigrationError::TransactionsFailed { .. } => "transactions_failed",
            MigrationError::UnexpectedState(_) => "unexpected_state",
            MigrationError::Provider(_) => "provider_error",
            MigrationError::Abi(_) => "abi_error",
        }
    }
}

impl From<ethers::abi::Error> for MigrationError {
    fn from(e: ethers::abi::Error) -> Self {
        MigrationError::Abi(e.to_string())
    }
}

impl From<ethers::abi::AbiError> for MigrationError {
    fn from(e: ethers::abi::AbiError) -> Self {
        MigrationError::Abi(e.to_string())
    }
}

pub type MigrationResult<T> = Result<T, MigrationError>;

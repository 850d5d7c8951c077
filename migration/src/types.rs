// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Value types of the migration engine: trustlines, pending requests, the
//! canonicalized debt book, network settings and handles.

use std::collections::BTreeMap;

use ethers::types::Address;
use serde::{Deserialize, Serialize};

use crate::error::{MigrationError, MigrationResult};

/// Smallest representable int72 balance.
pub const INT72_MIN: i128 = -(1i128 << 71);
/// Largest representable int72 balance.
pub const INT72_MAX: i128 = (1i128 << 71) - 1;

/// Sentinel onboarder for users who joined in a mutual bootstrap with no
/// pre-existing onboarder. Not a real account; preserved literally by the
/// driver, never translated.
pub fn no_onboarder() -> Address {
    let mut bytes = [0u8; 20];
    bytes[19] = 1;
    Address::from(bytes)
}

/// Lexicographically ordered (min, max) address pair, the storage key for a
/// trustline or a debt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CanonicalPair {
    low: Address,
    high: Address,
}

impl CanonicalPair {
    pub fn new(a: Address, b: Address) -> Self {
        if a < b {
            Self { low: a, high: b }
        } else {
            Self { low: b, high: a }
        }
    }

    pub fn low(&self) -> Address {
        self.low
    }

    pub fn high(&self) -> Address {
        self.high
    }

    pub fn contains(&self, user: Address) -> bool {
        self.low == user || self.high == user
    }

    pub fn other(&self, user: Address) -> Address {
        if user == self.low {
            self.high
        } else {
            self.low
        }
    }
}

/// Bilateral credit arrangement between `pair.low()` and `pair.high()`.
///
/// All directed fields are expressed from the perspective of `low`:
/// `creditline_given` is what `low` extends to `high`, `balance` is what
/// `high` owes `low` at `mtime`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trustline {
    pub pair: CanonicalPair,
    pub creditline_given: u64,
    pub creditline_received: u64,
    pub interest_rate_given: i16,
    pub interest_rate_received: i16,
    pub is_frozen: bool,
    pub mtime: u64,
    pub balance: i128,
}

impl Trustline {
    pub fn new(pair: CanonicalPair) -> Self {
        Self {
            pair,
            creditline_given: 0,
            creditline_received: 0,
            interest_rate_given: 0,
            interest_rate_received: 0,
            is_frozen: false,
            mtime: 0,
            balance: 0,
        }
    }
}

/// Proposed trustline update awaiting counterparty acceptance. Directed:
/// `initiator` proposed it to `counterparty`; fields are from the
/// initiator's perspective. At most one live request per unordered pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingTrustlineRequest {
    pub initiator: Address,
    pub counterparty: Address,
    pub creditline_given: u64,
    pub creditline_received: u64,
    pub interest_rate_given: i16,
    pub interest_rate_received: i16,
    pub is_frozen: bool,
    /// Proposed transfer executed on acceptance. Schema v2 only.
    pub transfer: Option<i64>,
}

/// Canonicalized debt book: outer key is the higher address of the pair,
/// inner key the lower, and the sign of the value encodes direction. This
/// is exactly the shape the contract's `setDebt` expects back.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DebtBook {
    debts: BTreeMap<Address, BTreeMap<Address, i128>>,
}

impl DebtBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the new absolute debt of `debtor` towards `creditor`. A zero
    /// value clears the entry.
    pub fn update(
        &mut self,
        debtor: Address,
        creditor: Address,
        new_debt: i128,
    ) -> MigrationResult<()> {
        if new_debt == INT72_MIN {
            return Err(MigrationError::InvalidEvent(format!(
                "debt of {debtor:?} towards {creditor:?} is INT72_MIN, negation unrepresentable"
            )));
        }
        let (outer, inner, value) = if creditor < debtor {
            (debtor, creditor, new_debt)
        } else {
            (creditor, debtor, -new_debt)
        };
        if value == 0 {
            if let Some(entries) = self.debts.get_mut(&outer) {
                entries.remove(&inner);
                if entries.is_empty() {
                    self.debts.remove(&outer);
                }
            }
        } else {
            self.debts.entry(outer).or_default().insert(inner, value);
        }
        Ok(())
    }

    /// Debt of `debtor` towards `creditor`, with direction recovered from
    /// the stored sign. Zero if no entry exists.
    pub fn get(&self, debtor: Address, creditor: Address) -> i128 {
        let (outer, inner, sign) = if creditor < debtor {
            (debtor, creditor, 1)
        } else {
            (creditor, debtor, -1)
        };
        self.debts
            .get(&outer)
            .and_then(|entries| entries.get(&inner))
            .map(|value| sign * value)
            .unwrap_or(0)
    }

    /// Iterate non-zero entries in canonical storage order as
    /// `(debtor_slot, creditor_slot, value)` triples, directly replayable
    /// through `setDebt`.
    pub fn iter(&self) -> impl Iterator<Item = (Address, Address, i128)> + '_ {
        self.debts.iter().flat_map(|(debtor, entries)| {
            entries
                .iter()
                .map(move |(creditor, value)| (*debtor, *creditor, *value))
        })
    }

    pub fn is_empty(&self) -> bool {
        self.debts.is_empty()
    }

    pub fn len(&self) -> usize {
        self.debts.values().map(|entries| entries.len()).sum()
    }
}

/// Contract schema generation. V2 adds the `transfer` field to trustline
/// update requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SchemaVersion {
    #[default]
    V1,
    V2,
}

/// A deployed currency network on some chain. Plain value, passed
/// explicitly; there is no ambient registry of handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkHandle {
    pub address: Address,
    pub chain_id: u64,
    pub version: SchemaVersion,
}

impl NetworkHandle {
    pub fn new(address: Address, chain_id: u64, version: SchemaVersion) -> Self {
        Self {
            address,
            chain_id,
            version,
        }
    }
}

/// Constructor parameters of a currency network.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkSettings {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default)]
    pub fee_divisor: u16,
    #[serde(default)]
    pub default_interest_rate: i16,
    #[serde(default)]
    pub custom_interests: bool,
    #[serde(default)]
    pub prevent_mediator_interests: bool,
    #[serde(default)]
    pub expiration_time: u64,
}

impl NetworkSettings {
    /// Check the cross-field invariants the contract's `init` enforces.
    pub fn validate(&self) -> MigrationResult<()> {
        if self.custom_interests && self.default_interest_rate != 0 {
            return Err(MigrationError::Precondition(
                "custom interests and a nonzero default interest rate are mutually exclusive"
                    .to_string(),
            ));
        }
        if self.prevent_mediator_interests && !self.custom_interests {
            return Err(MigrationError::Precondition(
                "prevent_mediator_interests requires custom interests".to_string(),
            ));
        }
        Ok(())
    }
}

// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Source-to-destination user address mapping.
//!
//! How destination addresses are derived (e.g. counterfactual Gnosis-Safe
//! deployment) is outside the engine; the driver and verifier only require
//! a pure, injected mapping. Sentinel addresses (`ZERO`, `NO_ONBOARDER`)
//! are never passed through a translator.

use std::collections::HashMap;

use ethers::types::Address;

/// Pure mapping from a source-network user to the corresponding
/// destination-network user.
pub trait AddressTranslator: Send + Sync {
    fn translate(&self, source_user: Address) -> Address;
}

/// Same-address migration (same key space on both chains).
#[derive(Debug, Default, Clone, Copy)]
pub struct IdentityTranslator;

impl AddressTranslator for IdentityTranslator {
    fn translate(&self, source_user: Address) -> Address {
        source_user
    }
}

/// Lookup-table translation; unknown users map to themselves.
#[derive(Debug, Default, Clone)]
pub struct TableTranslator {
    table: HashMap<Address, Address>,
}

impl TableTranslator {
    pub fn new(table: HashMap<Address, Address>) -> Self {
        Self { table }
    }
}

impl AddressTranslator for TableTranslator {
    fn translate(&self, source_user: Address) -> Address {
        self.table
            .get(&source_user)
            .copied()
            .unwrap_or(source_user)
    }
}

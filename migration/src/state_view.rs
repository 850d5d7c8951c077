// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Facades over the two sides of a migration.
//!
//! [`SourceStateView`] answers every question from the event index alone;
//! under a network freeze the index is the only trustworthy source. The
//! [`DestinationStateView`] answers the same questions from direct view
//! calls against the destination contract, which is what the driver diffs
//! against when deciding whether a write is still needed, and what the
//! verifier reads back.

use std::collections::{BTreeMap, BTreeSet};

use ethers::types::Address;

use crate::abi::{
    GetAccountCall, GetAccountReturn, GetDebtCall, GetDebtReturn, IsNetworkFrozenCall,
    IsNetworkFrozenReturn, NameCall, NameReturn, OnboarderCall, OnboarderReturn, OwnerCall,
    OwnerReturn,
};
use crate::chain::{call_contract, ChainAdapter};
use crate::error::{MigrationError, MigrationResult};
use crate::event_index::EventIndex;
use crate::types::{CanonicalPair, DebtBook, NetworkHandle, PendingTrustlineRequest, Trustline};

/// What the destination should look like, derived purely from the source
/// network's event history.
pub struct SourceStateView {
    network: NetworkHandle,
    index: EventIndex,
}

impl SourceStateView {
    /// Index the source network's complete history.
    pub async fn load(
        adapter: &dyn ChainAdapter,
        network: NetworkHandle,
        log_query_range: u64,
    ) -> MigrationResult<Self> {
        let index = EventIndex::build(adapter, &network, log_query_range).await?;
        Ok(Self { network, index })
    }

    pub fn from_index(network: NetworkHandle, index: EventIndex) -> Self {
        Self { network, index }
    }

    pub fn network(&self) -> &NetworkHandle {
        &self.network
    }

    /// Number of indexed events.
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    pub fn users(&self) -> BTreeSet<Address> {
        self.index.users()
    }

    pub fn trustlines(&self) -> BTreeSet<CanonicalPair> {
        self.index.trustlines()
    }

    pub fn trustline(&self, pair: CanonicalPair) -> Option<Trustline> {
        self.index.last_trustline_state(pair.low(), pair.high())
    }

    /// Frozen status of the pair as of the last trustline update, i.e.
    /// before any network-level freeze blanketed it.
    pub fn frozen_status(&self, pair: CanonicalPair) -> MigrationResult<bool> {
        self.index
            .last_frozen_status(pair.low(), pair.high())
            .ok_or_else(|| {
                MigrationError::UnexpectedState(format!(
                    "no trustline update between {:?} and {:?}",
                    pair.low(),
                    pair.high()
                ))
            })
    }

    pub fn pending_requests(&self) -> Vec<PendingTrustlineRequest> {
        self.index.pending_requests()
    }

    pub fn debts(&self) -> MigrationResult<DebtBook> {
        self.index.debts()
    }

    pub fn onboarders(&self) -> BTreeMap<Address, Address> {
        self.index.onboarders()
    }

    pub fn onboarder(&self, user: Address) -> Address {
        self.index.onboarder(user)
    }
}

/// Read side of the destination network, in the same shape as the source
/// view. All answers come from `eth_call`; nothing is cached because the
/// driver mutates the contract between reads.
pub struct DestinationStateView<'a> {
    adapter: &'a dyn ChainAdapter,
    network: NetworkHandle,
}

impl<'a> DestinationStateView<'a> {
    pub fn new(adapter: &'a dyn ChainAdapter, network: NetworkHandle) -> Self {
        Self { adapter, network }
    }

    pub fn network(&self) -> &NetworkHandle {
        &self.network
    }

    /// Account tuple between `a` and `b`, from `a`'s perspective.
    pub async fn account(&self, a: Address, b: Address) -> MigrationResult<GetAccountReturn> {
        call_contract(self.adapter, self.network.address, GetAccountCall { a, b }).await
    }

    pub async fn debt(&self, debtor: Address, creditor: Address) -> MigrationResult<i128> {
        let GetDebtReturn(value) = call_contract(
            self.adapter,
            self.network.address,
            GetDebtCall { debtor, creditor },
        )
        .await?;
        Ok(value)
    }

    pub async fn onboarder(&self, user: Address) -> MigrationResult<Address> {
        let OnboarderReturn(onboarder) =
            call_contract(self.adapter, self.network.address, OnboarderCall { user }).await?;
        Ok(onboarder)
    }

    pub async fn is_network_frozen(&self) -> MigrationResult<bool> {
        let IsNetworkFrozenReturn(frozen) =
            call_contract(self.adapter, self.network.address, IsNetworkFrozenCall).await?;
        Ok(frozen)
    }

    pub async fn owner(&self) -> MigrationResult<Address> {
        let OwnerReturn(owner) =
            call_contract(self.adapter, self.network.address, OwnerCall).await?;
        Ok(owner)
    }

    pub async fn name(&self) -> MigrationResult<String> {
        let NameReturn(name) = call_contract(self.adapter, self.network.address, NameCall).await?;
        Ok(name)
    }
}

/// The same view functions against the source network. Only the
/// network-level flags are meaningful on a frozen source (`getAccount`
/// lies about per-pair frozen bits once the network froze), so this type
/// is intentionally narrow.
pub struct SourceContractView<'a> {
    adapter: &'a dyn ChainAdapter,
    network: NetworkHandle,
}

impl<'a> SourceContractView<'a> {
    pub fn new(adapter: &'a dyn ChainAdapter, network: NetworkHandle) -> Self {
        Self { adapter, network }
    }

    pub async fn is_network_frozen(&self) -> MigrationResult<bool> {
        let IsNetworkFrozenReturn(frozen) =
            call_contract(self.adapter, self.network.address, IsNetworkFrozenCall).await?;
        Ok(frozen)
    }

    pub async fn owner(&self) -> MigrationResult<Address> {
        let OwnerReturn(owner) =
            call_contract(self.adapter, self.network.address, OwnerCall).await?;
        Ok(owner)
    }

    pub async fn name(&self) -> MigrationResult<String> {
        let NameReturn(name) = call_contract(self.adapter, self.network.address, NameCall).await?;
        Ok(name)
    }
}

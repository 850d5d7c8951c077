// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Event-driven reconstruction of a currency network's state.
//!
//! A frozen network's view functions cannot be trusted for everything
//! (`getAccount` reports `is_frozen = true` for every trustline once the
//! network froze), so the authoritative source state is a pure fold over
//! the chronologically ordered event log: trustlines, per-pair frozen
//! status, debts, onboarders and the set of still-pending trustline update
//! requests.

use std::collections::{BTreeMap, BTreeSet};

use ethers::types::Address;
use tracing::debug;

use crate::abi::NetworkEvent;
use crate::chain::ChainAdapter;
use crate::error::MigrationResult;
use crate::events::{sort_chronologically, OrderedLog};
use crate::types::{CanonicalPair, DebtBook, NetworkHandle, PendingTrustlineRequest, Trustline};

/// Immutable, totally ordered history of one currency network. All
/// accessors are pure folds over the stored log; the index owns no other
/// state.
pub struct EventIndex {
    logs: Vec<OrderedLog>,
}

impl EventIndex {
    /// Fetch and decode the complete history of `network`, chunked by
    /// `log_query_range` blocks per query.
    pub async fn build(
        adapter: &dyn ChainAdapter,
        network: &NetworkHandle,
        log_query_range: u64,
    ) -> MigrationResult<Self> {
        let latest = adapter.latest_block_number().await?;
        let mut logs = Vec::new();
        let mut from_block = 0u64;
        loop {
            let to_block = from_block.saturating_add(log_query_range - 1).min(latest);
            let raw_logs = adapter
                .get_logs(network.address, from_block, to_block)
                .await?;
            for raw in raw_logs {
                let timestamp = match raw.block_number {
                    Some(number) => adapter.block_timestamp(number.as_u64()).await?,
                    // Decode rejects pending logs; the timestamp is unused.
                    None => 0,
                };
                if let Some(log) = OrderedLog::decode(&raw, timestamp)? {
                    logs.push(log);
                }
            }
            if to_block >= latest {
                break;
            }
            from_block = to_block + 1;
        }
        debug!(
            network = ?network.address,
            events = logs.len(),
            latest_block = latest,
            "built event index"
        );
        Ok(Self::from_logs(logs))
    }

    /// Index a pre-fetched set of logs. Order of the input is irrelevant;
    /// the index sorts by (block number, log index).
    pub fn from_logs(mut logs: Vec<OrderedLog>) -> Self {
        sort_chronologically(&mut logs);
        Self { logs }
    }

    pub fn len(&self) -> usize {
        self.logs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// Every address that ever was party to a trustline update.
    pub fn users(&self) -> BTreeSet<Address> {
        let mut users = BTreeSet::new();
        for log in &self.logs {
            if let NetworkEvent::TrustlineUpdate(event) = &log.event {
                users.insert(event.creditor);
                users.insert(event.debtor);
            }
        }
        users
    }

    /// Canonical pairs of all trustlines that ever existed.
    pub fn trustlines(&self) -> BTreeSet<CanonicalPair> {
        let mut pairs = BTreeSet::new();
        for log in &self.logs {
            if let NetworkEvent::TrustlineUpdate(event) = &log.event {
                pairs.insert(CanonicalPair::new(event.creditor, event.debtor));
            }
        }
        pairs
    }

    pub fn friends(&self, user: Address) -> BTreeSet<Address> {
        self.trustlines()
            .into_iter()
            .filter(|pair| pair.contains(user))
            .map(|pair| pair.other(user))
            .collect()
    }

    /// Fold the trustline between `a` and `b` forward through all updates
    /// and balance changes. `None` if no trustline update ever happened
    /// between the two.
    pub fn last_trustline_state(&self, a: Address, b: Address) -> Option<Trustline> {
        let pair = CanonicalPair::new(a, b);
        let mut trustline = Trustline::new(pair);
        let mut seen_update = false;
        for log in &self.logs {
            match &log.event {
                NetworkEvent::TrustlineUpdate(event)
                    if pair == CanonicalPair::new(event.creditor, event.debtor) =>
                {
                    // Event fields are from the creditor's perspective;
                    // storage is from the canonical low address.
                    if event.creditor == pair.low() {
                        trustline.creditline_given = event.creditline_given;
                        trustline.creditline_received = event.creditline_received;
                        trustline.interest_rate_given = event.interest_rate_given;
                        trustline.interest_rate_received = event.interest_rate_received;
                    } else {
                        trustline.creditline_given = event.creditline_received;
                        trustline.creditline_received = event.creditline_given;
                        trustline.interest_rate_given = event.interest_rate_received;
                        trustline.interest_rate_received = event.interest_rate_given;
                    }
                    trustline.is_frozen = event.is_frozen;
                    trustline.mtime = log.timestamp;
                    seen_update = true;
                }
                NetworkEvent::BalanceUpdate(event)
                    if pair == CanonicalPair::new(event.from, event.to) =>
                {
                    trustline.balance = if event.from == pair.low() {
                        event.value
                    } else {
                        -event.value
                    };
                    trustline.mtime = log.timestamp;
                }
                _ => {}
            }
        }
        seen_update.then_some(trustline)
    }

    /// The `_isFrozen` argument of the latest trustline update between the
    /// two users. This is the pre-network-freeze truth that the frozen
    /// contract's `getAccount` erases.
    pub fn last_frozen_status(&self, a: Address, b: Address) -> Option<bool> {
        self.last_trustline_state(a, b)
            .map(|trustline| trustline.is_frozen)
    }

    /// All trustline update requests that were neither cancelled nor
    /// accepted. At most one per unordered pair; a newer request replaces
    /// an older one regardless of direction.
    pub fn pending_requests(&self) -> Vec<PendingTrustlineRequest> {
        let mut pending: BTreeMap<CanonicalPair, PendingTrustlineRequest> = BTreeMap::new();
        for log in &self.logs {
            match &log.event {
                NetworkEvent::TrustlineUpdateRequest(event) => {
                    pending.insert(
                        CanonicalPair::new(event.creditor, event.debtor),
                        PendingTrustlineRequest {
                            initiator: event.creditor,
                            counterparty: event.debtor,
                            creditline_given: event.creditline_given,
                            creditline_received: event.creditline_received,
                            interest_rate_given: event.interest_rate_given,
                            interest_rate_received: event.interest_rate_received,
                            is_frozen: event.is_frozen,
                            transfer: None,
                        },
                    );
                }
                NetworkEvent::TrustlineUpdateRequestV2(event) => {
                    pending.insert(
                        CanonicalPair::new(event.creditor, event.debtor),
                        PendingTrustlineRequest {
                            initiator: event.creditor,
                            counterparty: event.debtor,
                            creditline_given: event.creditline_given,
                            creditline_received: event.creditline_received,
                            interest_rate_given: event.interest_rate_given,
                            interest_rate_received: event.interest_rate_received,
                            is_frozen: event.is_frozen,
                            transfer: Some(event.transfer),
                        },
                    );
                }
                NetworkEvent::TrustlineUpdateCancel(event) => {
                    // The contract cannot emit a cancel without a live
                    // request, but the fold stays total either way.
                    pending.remove(&CanonicalPair::new(event.initiator, event.counterparty));
                }
                NetworkEvent::TrustlineUpdate(event) => {
                    // An update is the acceptance of whatever was pending.
                    pending.remove(&CanonicalPair::new(event.creditor, event.debtor));
                }
                _ => {}
            }
        }
        pending.into_values().collect()
    }

    /// Canonicalized debt book folded from all debt updates. Non-member
    /// debtors and creditors are included: the contract emits their events
    /// regardless of network membership.
    pub fn debts(&self) -> MigrationResult<DebtBook> {
        let mut book = DebtBook::new();
        for log in &self.logs {
            if let NetworkEvent::DebtUpdate(event) = &log.event {
                book.update(event.debtor, event.creditor, event.new_debt)?;
            }
        }
        Ok(book)
    }

    /// Onboarder of `user` per the network's own Onboard events;
    /// `Address::zero()` if the user was never onboarded. The relation is
    /// write-once on chain, so the first event wins.
    pub fn onboarder(&self, user: Address) -> Address {
        self.onboarders().get(&user).copied().unwrap_or_default()
    }

    pub fn onboarders(&self) -> BTreeMap<Address, Address> {
        let mut onboarders = BTreeMap::new();
        for log in &self.logs {
            if let NetworkEvent::Onboard(event) = &log.event {
                onboarders.entry(event.onboardee).or_insert(event.onboarder);
            }
        }
        onboarders
    }
}

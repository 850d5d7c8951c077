// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! In-memory chain double for engine tests.
//!
//! [`MockChain`] implements [`ChainAdapter`] over a simulated set of
//! currency-network contracts: owner-only setters are decoded from calldata
//! through the same typed call structs the driver encodes with, view calls
//! answer from the simulated storage, and user-level actions (trustline
//! updates, transfers, debts) append properly encoded logs so the event
//! index exercises the real decoding path end to end.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use ethers::abi::{AbiDecode, AbiEncode, Token};
use ethers::contract::EthEvent;
use ethers::types::{Address, Bytes, Log, TransactionReceipt, H256, I256, U256, U64};
use tokio::sync::Mutex;

use crate::abi::{
    BalanceUpdateFilter, DebtUpdateFilter, FreezeNetworkCall, GetAccountCall, GetAccountReturn,
    GetDebtCall, GetDebtReturn, IsNetworkFrozenCall, IsNetworkFrozenReturn, NameCall, NameReturn,
    OnboardFilter, OnboarderCall, OnboarderReturn, OwnerCall, OwnerReturn, RemoveOwnerCall,
    SetAccountCall, SetDebtCall, SetOnboarderCall, SetTrustlineRequestCall,
    SetTrustlineRequestV2Call, TrustlineUpdateCancelFilter, TrustlineUpdateFilter,
    TrustlineUpdateRequestFilter, TrustlineUpdateRequestV2Filter, UnfreezeNetworkCall,
};
use crate::chain::ChainAdapter;
use crate::error::{MigrationError, MigrationResult};
use crate::interest::balance_with_interests_default;
use crate::types::{
    no_onboarder, CanonicalPair, DebtBook, NetworkHandle, PendingTrustlineRequest, SchemaVersion,
    Trustline,
};

/// Install a fmt subscriber honoring `RUST_LOG`; repeated calls are no-ops.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

struct MockNetwork {
    name: String,
    owner: Address,
    version: SchemaVersion,
    is_frozen: bool,
    accounts: BTreeMap<CanonicalPair, Trustline>,
    onboarders: BTreeMap<Address, Address>,
    debts: DebtBook,
    pending: BTreeMap<CanonicalPair, PendingTrustlineRequest>,
}

struct Inner {
    block_number: u64,
    timestamp: u64,
    block_timestamps: HashMap<u64, u64>,
    logs_in_block: u64,
    networks: HashMap<Address, MockNetwork>,
    logs: Vec<Log>,
    receipts: HashMap<H256, TransactionReceipt>,
    pending_nonces: HashMap<Address, U256>,
    tx_counter: u64,
    next_network: u8,
    fail_next: bool,
    withhold_receipts: bool,
}

pub struct MockChain {
    chain_id: u64,
    inner: Mutex<Inner>,
}

impl MockChain {
    pub fn new(chain_id: u64, timestamp: u64) -> Self {
        Self {
            chain_id,
            inner: Mutex::new(Inner {
                block_number: 0,
                timestamp,
                block_timestamps: HashMap::from([(0, timestamp)]),
                logs_in_block: 0,
                networks: HashMap::new(),
                logs: Vec::new(),
                receipts: HashMap::new(),
                pending_nonces: HashMap::new(),
                tx_counter: 0,
                next_network: 0,
                fail_next: false,
                withhold_receipts: false,
            }),
        }
    }

    pub async fn deploy_network(
        &self,
        name: &str,
        owner: Address,
        version: SchemaVersion,
    ) -> NetworkHandle {
        let mut inner = self.inner.lock().await;
        inner.next_network += 1;
        let mut bytes = [0xc0u8; 20];
        bytes[19] = inner.next_network;
        let address = Address::from(bytes);
        inner.networks.insert(
            address,
            MockNetwork {
                name: name.to_string(),
                owner,
                version,
                is_frozen: false,
                accounts: BTreeMap::new(),
                onboarders: BTreeMap::new(),
                debts: DebtBook::new(),
                pending: BTreeMap::new(),
            },
        );
        NetworkHandle::new(address, self.chain_id, version)
    }

    pub async fn set_pending_nonce(&self, sender: Address, nonce: u64) {
        self.inner
            .lock()
            .await
            .pending_nonces
            .insert(sender, nonce.into());
    }

    /// Make the next submitted transaction revert regardless of content.
    pub async fn fail_next_transaction(&self) {
        self.inner.lock().await.fail_next = true;
    }

    /// Stop answering receipt queries, simulating transactions that never
    /// get mined.
    pub async fn withhold_receipts(&self) {
        self.inner.lock().await.withhold_receipts = true;
    }

    /// Reinstate an owner, as if a fresh owned contract were swapped in at
    /// the same address.
    pub async fn set_owner(&self, network: Address, owner: Address) {
        self.inner
            .lock()
            .await
            .networks
            .get_mut(&network)
            .expect("unknown network")
            .owner = owner;
    }

    pub async fn advance_time(&self, seconds: u64) {
        let mut inner = self.inner.lock().await;
        inner.timestamp += seconds;
        inner.next_block();
    }

    // --- user-level actions on the simulated source network -------------

    /// A mutual trustline update: request by the creditor, acceptance by
    /// the debtor, plus onboarding of any first-time participant.
    #[allow(clippy::too_many_arguments)]
    pub async fn update_trustline(
        &self,
        network: Address,
        creditor: Address,
        debtor: Address,
        creditline_given: u64,
        creditline_received: u64,
        interest_rate_given: i16,
        interest_rate_received: i16,
        is_frozen: bool,
    ) {
        let mut inner = self.inner.lock().await;
        inner.next_block();
        inner.push_log(
            network,
            vec![
                TrustlineUpdateRequestFilter::signature(),
                H256::from(creditor),
                H256::from(debtor),
            ],
            trustline_terms_data(
                creditline_given,
                creditline_received,
                interest_rate_given,
                interest_rate_received,
                is_frozen,
                None,
            ),
        );
        inner.push_log(
            network,
            vec![
                TrustlineUpdateFilter::signature(),
                H256::from(creditor),
                H256::from(debtor),
            ],
            trustline_terms_data(
                creditline_given,
                creditline_received,
                interest_rate_given,
                interest_rate_received,
                is_frozen,
                None,
            ),
        );
        let timestamp = inner.timestamp;
        let net = inner.networks.get_mut(&network).expect("unknown network");
        let pair = CanonicalPair::new(creditor, debtor);
        let entry = net.accounts.entry(pair).or_insert_with(|| Trustline::new(pair));
        if creditor == pair.low() {
            entry.creditline_given = creditline_given;
            entry.creditline_received = creditline_received;
            entry.interest_rate_given = interest_rate_given;
            entry.interest_rate_received = interest_rate_received;
        } else {
            entry.creditline_given = creditline_received;
            entry.creditline_received = creditline_given;
            entry.interest_rate_given = interest_rate_received;
            entry.interest_rate_received = interest_rate_given;
        }
        entry.is_frozen = is_frozen;
        entry.mtime = timestamp;
        net.pending.remove(&pair);

        // Onboarding: a first-time participant is onboarded by the
        // counterparty, or by the sentinel when both are new.
        let creditor_new = !net.onboarders.contains_key(&creditor);
        let debtor_new = !net.onboarders.contains_key(&debtor);
        let mut onboard_events = Vec::new();
        if creditor_new && debtor_new {
            net.onboarders.insert(creditor, no_onboarder());
            net.onboarders.insert(debtor, no_onboarder());
            onboard_events.push((no_onboarder(), creditor));
            onboard_events.push((no_onboarder(), debtor));
        } else if creditor_new {
            net.onboarders.insert(creditor, debtor);
            onboard_events.push((debtor, creditor));
        } else if debtor_new {
            net.onboarders.insert(debtor, creditor);
            onboard_events.push((creditor, debtor));
        }
        for (onboarder, onboardee) in onboard_events {
            inner.push_log(
                network,
                vec![
                    OnboardFilter::signature(),
                    H256::from(onboarder),
                    H256::from(onboardee),
                ],
                Vec::new(),
            );
        }
    }

    /// Direct transfer between trustline neighbors. Interest accrued since
    /// the last balance change is applied first, as the contract does.
    pub async fn transfer(&self, network: Address, from: Address, to: Address, value: i128) {
        let mut inner = self.inner.lock().await;
        inner.next_block();
        let now = inner.timestamp;
        let net = inner.networks.get_mut(&network).expect("unknown network");
        let pair = CanonicalPair::new(from, to);
        let trustline = net
            .accounts
            .get_mut(&pair)
            .expect("transfer requires a trustline");
        let delta_time = (now - trustline.mtime) as i64;
        let mut balance = balance_with_interests_default(
            trustline.balance,
            trustline.interest_rate_given,
            trustline.interest_rate_received,
            delta_time,
        )
        .expect("interest application failed");
        // Paying means using credit: the payer's claim shrinks.
        if from == pair.low() {
            balance -= value;
        } else {
            balance += value;
        }
        trustline.balance = balance;
        trustline.mtime = now;
        let reported = if from == pair.low() { balance } else { -balance };
        inner.push_log(
            network,
            vec![
                BalanceUpdateFilter::signature(),
                H256::from(from),
                H256::from(to),
            ],
            ethers::abi::encode(&[Token::Int(I256::from(reported).into_raw())]),
        );
    }

    pub async fn request_trustline(
        &self,
        network: Address,
        creditor: Address,
        debtor: Address,
        creditline_given: u64,
        creditline_received: u64,
    ) {
        let mut inner = self.inner.lock().await;
        inner.next_block();
        let net = inner.networks.get_mut(&network).expect("unknown network");
        net.pending.insert(
            CanonicalPair::new(creditor, debtor),
            PendingTrustlineRequest {
                initiator: creditor,
                counterparty: debtor,
                creditline_given,
                creditline_received,
                interest_rate_given: 0,
                interest_rate_received: 0,
                is_frozen: false,
                transfer: None,
            },
        );
        inner.push_log(
            network,
            vec![
                TrustlineUpdateRequestFilter::signature(),
                H256::from(creditor),
                H256::from(debtor),
            ],
            trustline_terms_data(creditline_given, creditline_received, 0, 0, false, None),
        );
    }

    /// Schema v2 request carrying a transfer to execute on acceptance.
    #[allow(clippy::too_many_arguments)]
    pub async fn request_trustline_with_transfer(
        &self,
        network: Address,
        creditor: Address,
        debtor: Address,
        creditline_given: u64,
        creditline_received: u64,
        transfer: i64,
    ) {
        let mut inner = self.inner.lock().await;
        inner.next_block();
        let net = inner.networks.get_mut(&network).expect("unknown network");
        net.pending.insert(
            CanonicalPair::new(creditor, debtor),
            PendingTrustlineRequest {
                initiator: creditor,
                counterparty: debtor,
                creditline_given,
                creditline_received,
                interest_rate_given: 0,
                interest_rate_received: 0,
                is_frozen: false,
                transfer: Some(transfer),
            },
        );
        inner.push_log(
            network,
            vec![
                TrustlineUpdateRequestV2Filter::signature(),
                H256::from(creditor),
                H256::from(debtor),
            ],
            trustline_terms_data(
                creditline_given,
                creditline_received,
                0,
                0,
                false,
                Some(transfer),
            ),
        );
    }

    pub async fn cancel_request(&self, network: Address, initiator: Address, counterparty: Address) {
        let mut inner = self.inner.lock().await;
        inner.next_block();
        let net = inner.networks.get_mut(&network).expect("unknown network");
        net.pending
            .remove(&CanonicalPair::new(initiator, counterparty));
        inner.push_log(
            network,
            vec![
                TrustlineUpdateCancelFilter::signature(),
                H256::from(initiator),
                H256::from(counterparty),
            ],
            Vec::new(),
        );
    }

    pub async fn increase_debt(
        &self,
        network: Address,
        debtor: Address,
        creditor: Address,
        added: i128,
    ) {
        let mut inner = self.inner.lock().await;
        inner.next_block();
        let net = inner.networks.get_mut(&network).expect("unknown network");
        let new_debt = net.debts.get(debtor, creditor) + added;
        net.debts
            .update(debtor, creditor, new_debt)
            .expect("debt update failed");
        inner.push_log(
            network,
            vec![DebtUpdateFilter::signature()],
            ethers::abi::encode(&[
                Token::Address(debtor),
                Token::Address(creditor),
                Token::Int(I256::from(new_debt).into_raw()),
            ]),
        );
    }

    /// Flip the network-level freeze without a transaction; the contract
    /// does this itself when the expiration time passes.
    pub async fn set_network_frozen(&self, network: Address, frozen: bool) {
        let mut inner = self.inner.lock().await;
        inner
            .networks
            .get_mut(&network)
            .expect("unknown network")
            .is_frozen = frozen;
    }

    // --- inspection ------------------------------------------------------

    pub async fn owner_of(&self, network: Address) -> Address {
        self.inner.lock().await.networks[&network].owner
    }

    pub async fn is_frozen(&self, network: Address) -> bool {
        self.inner.lock().await.networks[&network].is_frozen
    }

    pub async fn trustline_of(&self, network: Address, a: Address, b: Address) -> Option<Trustline> {
        self.inner.lock().await.networks[&network]
            .accounts
            .get(&CanonicalPair::new(a, b))
            .copied()
    }

    pub async fn pending_requests_of(&self, network: Address) -> Vec<PendingTrustlineRequest> {
        self.inner.lock().await.networks[&network]
            .pending
            .values()
            .copied()
            .collect()
    }

    pub async fn onboarder_of(&self, network: Address, user: Address) -> Address {
        self.inner.lock().await.networks[&network]
            .onboarders
            .get(&user)
            .copied()
            .unwrap_or_default()
    }

    pub async fn debt_of(&self, network: Address, debtor: Address, creditor: Address) -> i128 {
        self.inner.lock().await.networks[&network]
            .debts
            .get(debtor, creditor)
    }

    pub async fn transaction_count(&self) -> u64 {
        self.inner.lock().await.tx_counter
    }
}

impl Inner {
    fn next_block(&mut self) {
        self.block_number += 1;
        self.timestamp += 1;
        self.logs_in_block = 0;
        self.block_timestamps
            .insert(self.block_number, self.timestamp);
    }

    fn push_log(&mut self, network: Address, topics: Vec<H256>, data: Vec<u8>) {
        let log = Log {
            address: network,
            topics,
            data: data.into(),
            block_number: Some(U64::from(self.block_number)),
            log_index: Some(U256::from(self.logs_in_block)),
            ..Default::default()
        };
        self.logs_in_block += 1;
        self.logs.push(log);
    }

    /// Execute an owner-only setter. `false` models a revert.
    fn apply_transaction(&mut self, from: Address, to: Address, data: &[u8]) -> bool {
        let Some(net) = self.networks.get(&to) else {
            return false;
        };
        if net.owner != from || net.owner == Address::zero() {
            return false;
        }

        if let Ok(call) = SetAccountCall::decode(data) {
            // The contract rolls the balance forward from the passed mtime
            // to the block it lands in, then stores the current timestamp.
            let now = self.timestamp;
            let delta_time = now as i64 - i64::from(call.mtime);
            let Ok(balance) = balance_with_interests_default(
                call.balance,
                call.interest_rate_given,
                call.interest_rate_received,
                delta_time,
            ) else {
                return false;
            };
            let pair = CanonicalPair::new(call.creditor, call.debtor);
            let mut trustline = Trustline::new(pair);
            if call.creditor == pair.low() {
                trustline.creditline_given = call.creditline_given;
                trustline.creditline_received = call.creditline_received;
                trustline.interest_rate_given = call.interest_rate_given;
                trustline.interest_rate_received = call.interest_rate_received;
                trustline.balance = balance;
            } else {
                trustline.creditline_given = call.creditline_received;
                trustline.creditline_received = call.creditline_given;
                trustline.interest_rate_given = call.interest_rate_received;
                trustline.interest_rate_received = call.interest_rate_given;
                trustline.balance = -balance;
            }
            trustline.is_frozen = call.is_frozen;
            trustline.mtime = now;
            let net = self.networks.get_mut(&to).expect("checked above");
            net.accounts.insert(pair, trustline);
            return true;
        }
        if let Ok(call) = SetOnboarderCall::decode(data) {
            let net = self.networks.get_mut(&to).expect("checked above");
            net.onboarders.insert(call.user, call.on_boarder);
            return true;
        }
        if let Ok(call) = SetDebtCall::decode(data) {
            let net = self.networks.get_mut(&to).expect("checked above");
            return net.debts.update(call.debtor, call.creditor, call.value).is_ok();
        }
        if let Ok(call) = SetTrustlineRequestV2Call::decode(data) {
            if self.networks[&to].version != SchemaVersion::V2 {
                return false;
            }
            self.push_log(
                to,
                vec![
                    TrustlineUpdateRequestV2Filter::signature(),
                    H256::from(call.creditor),
                    H256::from(call.debtor),
                ],
                trustline_terms_data(
                    call.creditline_given,
                    call.creditline_received,
                    call.interest_rate_given,
                    call.interest_rate_received,
                    call.is_frozen,
                    Some(call.transfer),
                ),
            );
            let net = self.networks.get_mut(&to).expect("checked above");
            net.pending.insert(
                CanonicalPair::new(call.creditor, call.debtor),
                PendingTrustlineRequest {
                    initiator: call.creditor,
                    counterparty: call.debtor,
                    creditline_given: call.creditline_given,
                    creditline_received: call.creditline_received,
                    interest_rate_given: call.interest_rate_given,
                    interest_rate_received: call.interest_rate_received,
                    is_frozen: call.is_frozen,
                    transfer: Some(call.transfer),
                },
            );
            return true;
        }
        if let Ok(call) = SetTrustlineRequestCall::decode(data) {
            self.push_log(
                to,
                vec![
                    TrustlineUpdateRequestFilter::signature(),
                    H256::from(call.creditor),
                    H256::from(call.debtor),
                ],
                trustline_terms_data(
                    call.creditline_given,
                    call.creditline_received,
                    call.interest_rate_given,
                    call.interest_rate_received,
                    call.is_frozen,
                    None,
                ),
            );
            let net = self.networks.get_mut(&to).expect("checked above");
            net.pending.insert(
                CanonicalPair::new(call.creditor, call.debtor),
                PendingTrustlineRequest {
                    initiator: call.creditor,
                    counterparty: call.debtor,
                    creditline_given: call.creditline_given,
                    creditline_received: call.creditline_received,
                    interest_rate_given: call.interest_rate_given,
                    interest_rate_received: call.interest_rate_received,
                    is_frozen: call.is_frozen,
                    transfer: None,
                },
            );
            return true;
        }
        if FreezeNetworkCall::decode(data).is_ok() {
            self.networks.get_mut(&to).expect("checked above").is_frozen = true;
            return true;
        }
        if UnfreezeNetworkCall::decode(data).is_ok() {
            self.networks.get_mut(&to).expect("checked above").is_frozen = false;
            return true;
        }
        if RemoveOwnerCall::decode(data).is_ok() {
            self.networks.get_mut(&to).expect("checked above").owner = Address::zero();
            return true;
        }
        false
    }
}

fn trustline_terms_data(
    creditline_given: u64,
    creditline_received: u64,
    interest_rate_given: i16,
    interest_rate_received: i16,
    is_frozen: bool,
    transfer: Option<i64>,
) -> Vec<u8> {
    let mut tokens = vec![
        Token::Uint(creditline_given.into()),
        Token::Uint(creditline_received.into()),
        Token::Int(I256::from(interest_rate_given).into_raw()),
        Token::Int(I256::from(interest_rate_received).into_raw()),
        Token::Bool(is_frozen),
    ];
    if let Some(transfer) = transfer {
        tokens.push(Token::Int(I256::from(transfer).into_raw()));
    }
    ethers::abi::encode(&tokens)
}

#[async_trait]
impl ChainAdapter for MockChain {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, to: Address, data: Bytes) -> MigrationResult<Bytes> {
        let inner = self.inner.lock().await;
        let net = inner
            .networks
            .get(&to)
            .ok_or_else(|| MigrationError::Provider(format!("no contract at {to:?}")))?;
        let data = data.as_ref();
        if let Ok(call) = GetAccountCall::decode(data) {
            let pair = CanonicalPair::new(call.a, call.b);
            let stored = net.accounts.get(&pair).copied();
            let mut result = GetAccountReturn::default();
            if let Some(trustline) = stored {
                if call.a == pair.low() {
                    result.creditline_given = trustline.creditline_given;
                    result.creditline_received = trustline.creditline_received;
                    result.interest_rate_given = trustline.interest_rate_given;
                    result.interest_rate_received = trustline.interest_rate_received;
                    result.balance = trustline.balance;
                } else {
                    result.creditline_given = trustline.creditline_received;
                    result.creditline_received = trustline.creditline_given;
                    result.interest_rate_given = trustline.interest_rate_received;
                    result.interest_rate_received = trustline.interest_rate_given;
                    result.balance = -trustline.balance;
                }
                // A frozen network reports every trustline as frozen.
                result.is_frozen = trustline.is_frozen || net.is_frozen;
                result.mtime = trustline.mtime as u32;
            }
            return Ok(result.encode().into());
        }
        if let Ok(call) = GetDebtCall::decode(data) {
            return Ok(GetDebtReturn(net.debts.get(call.debtor, call.creditor))
                .encode()
                .into());
        }
        if let Ok(call) = OnboarderCall::decode(data) {
            let onboarder = net.onboarders.get(&call.user).copied().unwrap_or_default();
            return Ok(OnboarderReturn(onboarder).encode().into());
        }
        if IsNetworkFrozenCall::decode(data).is_ok() {
            return Ok(IsNetworkFrozenReturn(net.is_frozen).encode().into());
        }
        if OwnerCall::decode(data).is_ok() {
            return Ok(OwnerReturn(net.owner).encode().into());
        }
        if NameCall::decode(data).is_ok() {
            return Ok(NameReturn(net.name.clone()).encode().into());
        }
        Err(MigrationError::Provider("execution reverted".to_string()))
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        _nonce: U256,
    ) -> MigrationResult<H256> {
        let mut inner = self.inner.lock().await;
        inner.next_block();
        inner.tx_counter += 1;
        let hash = H256::from_low_u64_be(inner.tx_counter);
        let success = if std::mem::take(&mut inner.fail_next) {
            false
        } else {
            inner.apply_transaction(from, to, data.as_ref())
        };
        let receipt = TransactionReceipt {
            transaction_hash: hash,
            block_number: Some(U64::from(inner.block_number)),
            status: Some(U64::from(u64::from(success))),
            ..Default::default()
        };
        inner.receipts.insert(hash, receipt);
        Ok(hash)
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> MigrationResult<Option<TransactionReceipt>> {
        let inner = self.inner.lock().await;
        if inner.withhold_receipts {
            return Ok(None);
        }
        Ok(inner.receipts.get(&hash).cloned())
    }

    async fn get_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> MigrationResult<Vec<Log>> {
        let inner = self.inner.lock().await;
        Ok(inner
            .logs
            .iter()
            .filter(|log| {
                let block = log.block_number.map(|number| number.as_u64()).unwrap_or(0);
                log.address == address && block >= from_block && block <= to_block
            })
            .cloned()
            .collect())
    }

    async fn latest_block_number(&self) -> MigrationResult<u64> {
        Ok(self.inner.lock().await.block_number)
    }

    async fn block_timestamp(&self, block_number: u64) -> MigrationResult<u64> {
        self.inner
            .lock()
            .await
            .block_timestamps
            .get(&block_number)
            .copied()
            .ok_or_else(|| MigrationError::Provider(format!("block {block_number} not found")))
    }

    async fn pending_nonce(&self, address: Address) -> MigrationResult<U256> {
        Ok(self
            .inner
            .lock()
            .await
            .pending_nonces
            .get(&address)
            .copied()
            .unwrap_or_default())
    }
}

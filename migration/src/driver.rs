// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Migration sequencer.
//!
//! [`MigrationDriver::migrate_network`] replays the reconstructed source
//! state against a frozen, owned destination network in six strictly
//! ordered steps: accounts, onboarders, debts, pending requests, unfreeze,
//! disown. Within a step, transactions commit in any order (independent
//! keys); step boundaries are drain barriers. Submission runs through a
//! bounded [`TxWindow`] spanning both chains; a failed or timed-out receipt
//! aborts the migration in place. Nothing is retried here.

use std::time::Instant;

use ethers::abi::AbiEncode;
use ethers::types::{Address, Bytes, H256};
use tokio::time::sleep;
use tracing::{debug, info, warn};

use crate::abi::{
    FreezeNetworkCall, GetAccountReturn, RemoveOwnerCall, SetAccountCall, SetDebtCall,
    SetOnboarderCall, SetTrustlineRequestCall, SetTrustlineRequestV2Call, UnfreezeNetworkCall,
};
use crate::chain::{ChainAdapter, NonceTracker};
use crate::config::MigrationConfig;
use crate::error::{MigrationError, MigrationResult};
use crate::interest::balance_with_interests;
use crate::metrics::MigrationMetrics;
use crate::state_view::{DestinationStateView, SourceContractView, SourceStateView};
use crate::translator::AddressTranslator;
use crate::types::{no_onboarder, NetworkHandle, SchemaVersion, Trustline};

/// Bounded set of unconfirmed transactions, counted over both chains.
/// Capacity back-pressure: a submission against a full window first waits
/// for at least one receipt.
pub struct TxWindow<'a> {
    config: &'a MigrationConfig,
    metrics: &'a MigrationMetrics,
    nonces: &'a NonceTracker,
    sender: Address,
    inflight: Vec<Inflight<'a>>,
}

struct Inflight<'a> {
    chain: &'a dyn ChainAdapter,
    hash: H256,
    submitted: Instant,
}

impl<'a> TxWindow<'a> {
    pub fn new(
        config: &'a MigrationConfig,
        metrics: &'a MigrationMetrics,
        nonces: &'a NonceTracker,
        sender: Address,
    ) -> Self {
        Self {
            config,
            metrics,
            nonces,
            sender,
            inflight: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.inflight.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inflight.is_empty()
    }

    pub async fn submit(
        &mut self,
        chain: &'a dyn ChainAdapter,
        to: Address,
        data: Bytes,
        kind: &'static str,
    ) -> MigrationResult<()> {
        while self.inflight.len() >= self.config.max_tx_queue_size {
            let before = self.inflight.len();
            self.poll_once().await?;
            if self.inflight.len() < before {
                break;
            }
            sleep(self.config.receipt_poll_interval()).await;
        }
        let nonce = self.nonces.next_nonce(chain, self.sender).await?;
        let hash = chain
            .send_transaction(self.sender, to, data, nonce)
            .await?;
        debug!(kind, ?hash, %nonce, chain_id = chain.chain_id(), "submitted transaction");
        self.metrics
            .transactions_submitted
            .with_label_values(&[kind])
            .inc();
        self.inflight.push(Inflight {
            chain,
            hash,
            submitted: Instant::now(),
        });
        self.metrics
            .transactions_inflight
            .set(self.inflight.len() as i64);
        Ok(())
    }

    /// Wait until every in-flight transaction has a successful receipt.
    pub async fn drain(&mut self) -> MigrationResult<()> {
        while !self.inflight.is_empty() {
            self.poll_once().await?;
            if !self.inflight.is_empty() {
                sleep(self.config.receipt_poll_interval()).await;
            }
        }
        Ok(())
    }

    /// One receipt-poll pass. A failure receipt or a transaction past the
    /// receipt timeout aborts with every offending hash.
    async fn poll_once(&mut self) -> MigrationResult<()> {
        let timeout = self.config.receipt_timeout();
        let mut failed = Vec::new();
        let mut still_pending = Vec::new();
        for tx in std::mem::take(&mut self.inflight) {
            match tx.chain.transaction_receipt(tx.hash).await? {
                Some(receipt) => {
                    if receipt.status == Some(1u64.into()) {
                        self.metrics.transactions_confirmed.inc();
                    } else {
                        warn!(hash = ?tx.hash, "transaction failed");
                        self.metrics.transactions_failed.inc();
                        failed.push(tx.hash);
                    }
                }
                None if tx.submitted.elapsed() >= timeout => {
                    warn!(hash = ?tx.hash, "timed out waiting for receipt");
                    self.metrics.transactions_failed.inc();
                    failed.push(tx.hash);
                }
                None => still_pending.push(tx),
            }
        }
        self.inflight = still_pending;
        self.metrics
            .transactions_inflight
            .set(self.inflight.len() as i64);
        if !failed.is_empty() {
            return Err(MigrationError::TransactionsFailed { hashes: failed });
        }
        Ok(())
    }
}

pub struct MigrationDriver<'a> {
    source_chain: &'a dyn ChainAdapter,
    destination_chain: &'a dyn ChainAdapter,
    translator: &'a dyn AddressTranslator,
    config: MigrationConfig,
    metrics: MigrationMetrics,
    /// Owner of record of the destination network; also the signing account
    /// for every transaction the driver emits, on either chain.
    owner: Address,
    /// Key that deployed the destination, if known. Must differ from the
    /// owner key.
    deployer: Option<Address>,
    nonces: NonceTracker,
}

impl<'a> MigrationDriver<'a> {
    pub fn new(
        source_chain: &'a dyn ChainAdapter,
        destination_chain: &'a dyn ChainAdapter,
        translator: &'a dyn AddressTranslator,
        config: MigrationConfig,
        metrics: MigrationMetrics,
        owner: Address,
        deployer: Option<Address>,
    ) -> Self {
        Self {
            source_chain,
            destination_chain,
            translator,
            config,
            metrics,
            owner,
            deployer,
            nonces: NonceTracker::new(),
        }
    }

    /// Owner of record of the destination networks this driver writes to.
    pub fn owner(&self) -> Address {
        self.owner
    }

    /// Replay `source` onto `destination` and hand the destination over to
    /// its users. Safe to call again on a partially migrated destination as
    /// long as it is still frozen and owned: committed accounts and
    /// onboarders are detected and skipped. Debts and pending requests do
    /// not self-check; re-running those steps on a half-migrated target
    /// duplicates them, which the preconditions cannot catch.
    pub async fn migrate_network(
        &self,
        source: NetworkHandle,
        destination: NetworkHandle,
    ) -> MigrationResult<()> {
        self.check_preconditions(&source, &destination).await?;

        let mut window = TxWindow::new(&self.config, &self.metrics, &self.nonces, self.owner);
        self.ensure_source_frozen(&mut window, &source).await?;

        info!(source = ?source.address, "indexing source network");
        let source_view =
            SourceStateView::load(self.source_chain, source, self.config.log_query_range).await?;
        self.metrics.events_indexed.inc_by(source_view.len() as u64);
        let destination_view = DestinationStateView::new(self.destination_chain, destination);

        self.migrate_accounts(&mut window, &source_view, &destination_view, &destination)
            .await?;
        self.migrate_onboarders(&mut window, &source_view, &destination_view, &destination)
            .await?;
        self.migrate_debts(&mut window, &source_view, &destination)
            .await?;
        self.migrate_pending_requests(&mut window, &source_view, &destination)
            .await?;

        info!(destination = ?destination.address, "unfreezing destination network");
        window
            .submit(
                self.destination_chain,
                destination.address,
                UnfreezeNetworkCall.encode().into(),
                "unfreeze_network",
            )
            .await?;
        window.drain().await?;

        info!(destination = ?destination.address, "removing destination owner");
        window
            .submit(
                self.destination_chain,
                destination.address,
                RemoveOwnerCall.encode().into(),
                "remove_owner",
            )
            .await?;
        window.drain().await?;

        info!(
            source = ?source.address,
            destination = ?destination.address,
            "migration complete"
        );
        Ok(())
    }

    async fn check_preconditions(
        &self,
        source: &NetworkHandle,
        destination: &NetworkHandle,
    ) -> MigrationResult<()> {
        if source.chain_id != self.source_chain.chain_id()
            || destination.chain_id != self.destination_chain.chain_id()
        {
            return Err(MigrationError::Precondition(
                "network handle does not match the connected chain".to_string(),
            ));
        }
        if let Some(deployer) = self.deployer {
            if deployer == self.owner {
                return Err(MigrationError::Precondition(
                    "destination owner key must differ from the deployer key".to_string(),
                ));
            }
        }

        let destination_view = DestinationStateView::new(self.destination_chain, *destination);
        let (frozen, owner, destination_name) = futures::try_join!(
            destination_view.is_network_frozen(),
            destination_view.owner(),
            destination_view.name(),
        )?;
        if !frozen {
            return Err(MigrationError::Precondition(format!(
                "destination network {:?} is not frozen",
                destination.address
            )));
        }
        if owner != self.owner {
            return Err(MigrationError::Precondition(format!(
                "destination network {:?} is owned by {owner:?}, expected {:?}",
                destination.address, self.owner
            )));
        }

        // Weak guard against a misconfigured pair.
        let source_name = SourceContractView::new(self.source_chain, *source)
            .name()
            .await?;
        if source_name != destination_name {
            return Err(MigrationError::Precondition(format!(
                "network name mismatch: source {source_name:?} vs destination {destination_name:?}"
            )));
        }
        Ok(())
    }

    /// The only source-chain write: freeze the source before indexing so
    /// its history cannot grow under the fold.
    async fn ensure_source_frozen<'w>(
        &'w self,
        window: &mut TxWindow<'w>,
        source: &NetworkHandle,
    ) -> MigrationResult<()> {
        let view = SourceContractView::new(self.source_chain, *source);
        if view.is_network_frozen().await? {
            return Ok(());
        }
        info!(source = ?source.address, "freezing source network");
        window
            .submit(
                self.source_chain,
                source.address,
                FreezeNetworkCall.encode().into(),
                "freeze_network",
            )
            .await?;
        window.drain().await?;
        if !view.is_network_frozen().await? {
            return Err(MigrationError::UnexpectedState(format!(
                "source network {:?} still not frozen after freezeNetwork",
                source.address
            )));
        }
        Ok(())
    }

    async fn migrate_accounts<'w>(
        &'w self,
        window: &mut TxWindow<'w>,
        source_view: &SourceStateView,
        destination_view: &DestinationStateView<'_>,
        destination: &NetworkHandle,
    ) -> MigrationResult<()> {
        let trustlines = source_view.trustlines();
        info!(count = trustlines.len(), "migrating accounts");
        for pair in trustlines {
            let trustline = source_view.trustline(pair).ok_or_else(|| {
                MigrationError::UnexpectedState(format!("no state for trustline {pair:?}"))
            })?;
            let creditor = self.translator.translate(pair.low());
            let debtor = self.translator.translate(pair.high());
            let current = destination_view.account(creditor, debtor).await?;
            if self.account_matches(&trustline, &current)? {
                debug!(?creditor, ?debtor, "account already migrated, skipping");
                self.metrics.accounts_skipped.inc();
                continue;
            }
            let mtime = u32::try_from(trustline.mtime).map_err(|_| {
                MigrationError::UnexpectedState(format!(
                    "trustline mtime {} does not fit uint32",
                    trustline.mtime
                ))
            })?;
            let call = SetAccountCall {
                creditor,
                debtor,
                creditline_given: trustline.creditline_given,
                creditline_received: trustline.creditline_received,
                interest_rate_given: trustline.interest_rate_given,
                interest_rate_received: trustline.interest_rate_received,
                is_frozen: trustline.is_frozen,
                mtime,
                balance: trustline.balance,
            };
            window
                .submit(
                    self.destination_chain,
                    destination.address,
                    call.encode().into(),
                    "set_account",
                )
                .await?;
        }
        window.drain().await
    }

    /// An account is already migrated if all term fields agree and the
    /// destination balance equals the source balance projected to the
    /// destination mtime. While the destination is frozen its view reports
    /// every trustline as frozen, so a reported frozen bit is inconclusive
    /// and only a reported clear bit is compared.
    fn account_matches(
        &self,
        trustline: &Trustline,
        current: &GetAccountReturn,
    ) -> MigrationResult<bool> {
        let frozen_matches = current.is_frozen || !trustline.is_frozen;
        if current.creditline_given != trustline.creditline_given
            || current.creditline_received != trustline.creditline_received
            || current.interest_rate_given != trustline.interest_rate_given
            || current.interest_rate_received != trustline.interest_rate_received
            || !frozen_matches
        {
            return Ok(false);
        }
        let current_mtime = u64::from(current.mtime);
        if current_mtime < trustline.mtime {
            return Ok(false);
        }
        let delta_time = (current_mtime - trustline.mtime) as i64;
        let projected = balance_with_interests(
            trustline.balance,
            trustline.interest_rate_given,
            trustline.interest_rate_received,
            delta_time,
            self.config.delta_time_tolerance(),
        )?;
        Ok(projected == current.balance)
    }

    async fn migrate_onboarders<'w>(
        &'w self,
        window: &mut TxWindow<'w>,
        source_view: &SourceStateView,
        destination_view: &DestinationStateView<'_>,
        destination: &NetworkHandle,
    ) -> MigrationResult<()> {
        let onboarders = source_view.onboarders();
        info!(count = onboarders.len(), "migrating onboarders");
        for (user, onboarder) in onboarders {
            if onboarder == Address::zero() {
                continue;
            }
            let mapped_user = self.translator.translate(user);
            let mapped_onboarder = self.map_onboarder(onboarder);
            if destination_view.onboarder(mapped_user).await? == mapped_onboarder {
                debug!(user = ?mapped_user, "onboarder already migrated, skipping");
                continue;
            }
            let call = SetOnboarderCall {
                user: mapped_user,
                on_boarder: mapped_onboarder,
            };
            window
                .submit(
                    self.destination_chain,
                    destination.address,
                    call.encode().into(),
                    "set_onboarder",
                )
                .await?;
        }
        window.drain().await
    }

    /// The `NO_ONBOARDER` sentinel is not an account and passes through
    /// untranslated.
    fn map_onboarder(&self, onboarder: Address) -> Address {
        if onboarder == no_onboarder() {
            onboarder
        } else {
            self.translator.translate(onboarder)
        }
    }

    async fn migrate_debts<'w>(
        &'w self,
        window: &mut TxWindow<'w>,
        source_view: &SourceStateView,
        destination: &NetworkHandle,
    ) -> MigrationResult<()> {
        let debts = source_view.debts()?;
        info!(count = debts.len(), "migrating debts");
        for (debtor, creditor, value) in debts.iter() {
            let call = SetDebtCall {
                debtor: self.translator.translate(debtor),
                creditor: self.translator.translate(creditor),
                value,
            };
            window
                .submit(
                    self.destination_chain,
                    destination.address,
                    call.encode().into(),
                    "set_debt",
                )
                .await?;
        }
        window.drain().await
    }

    async fn migrate_pending_requests<'w>(
        &'w self,
        window: &mut TxWindow<'w>,
        source_view: &SourceStateView,
        destination: &NetworkHandle,
    ) -> MigrationResult<()> {
        let requests = source_view.pending_requests();
        info!(count = requests.len(), "migrating pending trustline requests");
        for request in requests {
            let creditor = self.translator.translate(request.initiator);
            let debtor = self.translator.translate(request.counterparty);
            let transfer = request.transfer.unwrap_or(0);
            let data: Bytes = match destination.version {
                SchemaVersion::V2 => SetTrustlineRequestV2Call {
                    creditor,
                    debtor,
                    creditline_given: request.creditline_given,
                    creditline_received: request.creditline_received,
                    interest_rate_given: request.interest_rate_given,
                    interest_rate_received: request.interest_rate_received,
                    is_frozen: request.is_frozen,
                    transfer,
                }
                .encode()
                .into(),
                SchemaVersion::V1 => {
                    if transfer != 0 {
                        return Err(MigrationError::Precondition(format!(
                            "pending request {:?} -> {:?} carries transfer {transfer}, \
                             unrepresentable on a v1 destination",
                            request.initiator, request.counterparty
                        )));
                    }
                    SetTrustlineRequestCall {
                        creditor,
                        debtor,
                        creditline_given: request.creditline_given,
                        creditline_received: request.creditline_received,
                        interest_rate_given: request.interest_rate_given,
                        interest_rate_received: request.interest_rate_received,
                        is_frozen: request.is_frozen,
                    }
                    .encode()
                    .into()
                }
            };
            window
                .submit(
                    self.destination_chain,
                    destination.address,
                    data,
                    "set_trustline_request",
                )
                .await?;
        }
        window.drain().await
    }
}

// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Read-only migration verification.
//!
//! The verifier mirrors the driver's walk but emits no transactions: it
//! re-derives the source state from events, projects every balance to the
//! destination's mtime through the shared interest math, and diffs against
//! the destination's views. Mismatches are collected, never short-circuited;
//! a migration counts as complete only when the report is empty.

use std::collections::BTreeMap;
use std::fmt;

use ethers::types::Address;
use tracing::{info, warn};

use crate::chain::ChainAdapter;
use crate::config::MigrationConfig;
use crate::error::MigrationResult;
use crate::event_index::EventIndex;
use crate::interest::balance_with_interests;
use crate::metrics::MigrationMetrics;
use crate::state_view::{DestinationStateView, SourceStateView};
use crate::translator::AddressTranslator;
use crate::types::{no_onboarder, CanonicalPair, NetworkHandle, PendingTrustlineRequest};

/// One field that does not match between reconstructed source state and the
/// destination.
#[derive(Debug)]
pub struct VerificationMismatch {
    /// Metrics label: account, balance, debt, onboarder, pending_request,
    /// network_frozen, network_owner.
    pub field: &'static str,
    pub detail: String,
}

impl fmt::Display for VerificationMismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.field, self.detail)
    }
}

#[derive(Debug, Default)]
pub struct VerificationReport {
    pub mismatches: Vec<VerificationMismatch>,
}

impl VerificationReport {
    pub fn is_ok(&self) -> bool {
        self.mismatches.is_empty()
    }

    pub fn merge(&mut self, other: VerificationReport) {
        self.mismatches.extend(other.mismatches);
    }
}

impl fmt::Display for VerificationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_ok() {
            return write!(f, "verification passed");
        }
        writeln!(f, "{} mismatches:", self.mismatches.len())?;
        for mismatch in &self.mismatches {
            writeln!(f, "  {mismatch}")?;
        }
        Ok(())
    }
}

pub struct MigrationVerifier<'a> {
    source_chain: &'a dyn ChainAdapter,
    destination_chain: &'a dyn ChainAdapter,
    translator: &'a dyn AddressTranslator,
    config: MigrationConfig,
    metrics: MigrationMetrics,
}

impl<'a> MigrationVerifier<'a> {
    pub fn new(
        source_chain: &'a dyn ChainAdapter,
        destination_chain: &'a dyn ChainAdapter,
        translator: &'a dyn AddressTranslator,
        config: MigrationConfig,
        metrics: MigrationMetrics,
    ) -> Self {
        Self {
            source_chain,
            destination_chain,
            translator,
            config,
            metrics,
        }
    }

    pub async fn verify_network(
        &self,
        source: NetworkHandle,
        destination: NetworkHandle,
    ) -> MigrationResult<VerificationReport> {
        info!(source = ?source.address, destination = ?destination.address, "verifying migration");
        let source_view =
            SourceStateView::load(self.source_chain, source, self.config.log_query_range).await?;
        let destination_view = DestinationStateView::new(self.destination_chain, destination);

        let mut report = VerificationReport::default();
        self.verify_accounts(&source_view, &destination_view, &mut report)
            .await?;
        self.verify_onboarders(&source_view, &destination_view, &mut report)
            .await?;
        self.verify_debts(&source_view, &destination_view, &mut report)
            .await?;
        self.verify_pending_requests(&source_view, &destination, &mut report)
            .await?;

        if destination_view.is_network_frozen().await? {
            self.push(
                &mut report,
                "network_frozen",
                format!("destination {:?} is still frozen", destination.address),
            );
        }
        let owner = destination_view.owner().await?;
        if owner != Address::zero() {
            self.push(
                &mut report,
                "network_owner",
                format!(
                    "destination {:?} still has owner {owner:?}",
                    destination.address
                ),
            );
        }

        if report.is_ok() {
            info!(source = ?source.address, "verification passed");
        } else {
            warn!(
                source = ?source.address,
                mismatches = report.mismatches.len(),
                "verification found mismatches"
            );
        }
        Ok(report)
    }

    fn push(&self, report: &mut VerificationReport, field: &'static str, detail: String) {
        self.metrics
            .verification_mismatches
            .with_label_values(&[field])
            .inc();
        report.mismatches.push(VerificationMismatch { field, detail });
    }

    async fn verify_accounts(
        &self,
        source_view: &SourceStateView,
        destination_view: &DestinationStateView<'_>,
        report: &mut VerificationReport,
    ) -> MigrationResult<()> {
        for pair in source_view.trustlines() {
            let Some(trustline) = source_view.trustline(pair) else {
                continue;
            };
            let creditor = self.translator.translate(pair.low());
            let debtor = self.translator.translate(pair.high());
            let current = destination_view.account(creditor, debtor).await?;

            if current.creditline_given != trustline.creditline_given
                || current.creditline_received != trustline.creditline_received
                || current.interest_rate_given != trustline.interest_rate_given
                || current.interest_rate_received != trustline.interest_rate_received
            {
                // is_frozen is deliberately not compared: the source was
                // necessarily frozen while the destination is not.
                self.push(
                    report,
                    "account",
                    format!(
                        "terms of {creditor:?}/{debtor:?} differ: destination \
                         {}/{} @ {}/{}, expected {}/{} @ {}/{}",
                        current.creditline_given,
                        current.creditline_received,
                        current.interest_rate_given,
                        current.interest_rate_received,
                        trustline.creditline_given,
                        trustline.creditline_received,
                        trustline.interest_rate_given,
                        trustline.interest_rate_received,
                    ),
                );
                continue;
            }

            let destination_mtime = u64::from(current.mtime);
            if destination_mtime < trustline.mtime {
                self.push(
                    report,
                    "balance",
                    format!(
                        "mtime of {creditor:?}/{debtor:?} regressed: destination \
                         {destination_mtime}, source {}",
                        trustline.mtime
                    ),
                );
                continue;
            }
            let delta_time = (destination_mtime - trustline.mtime) as i64;
            let projected = balance_with_interests(
                trustline.balance,
                trustline.interest_rate_given,
                trustline.interest_rate_received,
                delta_time,
                self.config.delta_time_tolerance(),
            )?;
            if projected != current.balance {
                self.push(
                    report,
                    "balance",
                    format!(
                        "balance of {creditor:?}/{debtor:?} is {}, expected {projected} \
                         ({} projected over {delta_time}s)",
                        current.balance, trustline.balance
                    ),
                );
            }
        }
        Ok(())
    }

    async fn verify_onboarders(
        &self,
        source_view: &SourceStateView,
        destination_view: &DestinationStateView<'_>,
        report: &mut VerificationReport,
    ) -> MigrationResult<()> {
        for (user, onboarder) in source_view.onboarders() {
            if onboarder == Address::zero() {
                continue;
            }
            let mapped_user = self.translator.translate(user);
            let expected = if onboarder == no_onboarder() {
                onboarder
            } else {
                self.translator.translate(onboarder)
            };
            let current = destination_view.onboarder(mapped_user).await?;
            if current != expected {
                self.push(
                    report,
                    "onboarder",
                    format!("onboarder of {mapped_user:?} is {current:?}, expected {expected:?}"),
                );
            }
        }
        Ok(())
    }

    async fn verify_debts(
        &self,
        source_view: &SourceStateView,
        destination_view: &DestinationStateView<'_>,
        report: &mut VerificationReport,
    ) -> MigrationResult<()> {
        for (debtor, creditor, value) in source_view.debts()?.iter() {
            let mapped_debtor = self.translator.translate(debtor);
            let mapped_creditor = self.translator.translate(creditor);
            let current = destination_view.debt(mapped_debtor, mapped_creditor).await?;
            if current != value {
                self.push(
                    report,
                    "debt",
                    format!(
                        "debt of {mapped_debtor:?} towards {mapped_creditor:?} is {current}, \
                         expected {value}"
                    ),
                );
            }
        }
        Ok(())
    }

    /// Pending requests have no view function; the destination's own
    /// request events are folded the same way as the source's.
    async fn verify_pending_requests(
        &self,
        source_view: &SourceStateView,
        destination: &NetworkHandle,
        report: &mut VerificationReport,
    ) -> MigrationResult<()> {
        let destination_index = EventIndex::build(
            self.destination_chain,
            destination,
            self.config.log_query_range,
        )
        .await?;
        let mut destination_pending: BTreeMap<CanonicalPair, PendingTrustlineRequest> =
            destination_index
                .pending_requests()
                .into_iter()
                .map(|request| {
                    (
                        CanonicalPair::new(request.initiator, request.counterparty),
                        request,
                    )
                })
                .collect();

        for request in source_view.pending_requests() {
            let initiator = self.translator.translate(request.initiator);
            let counterparty = self.translator.translate(request.counterparty);
            let pair = CanonicalPair::new(initiator, counterparty);
            let Some(found) = destination_pending.remove(&pair) else {
                self.push(
                    report,
                    "pending_request",
                    format!("request {initiator:?} -> {counterparty:?} is missing"),
                );
                continue;
            };
            let matches = found.initiator == initiator
                && found.counterparty == counterparty
                && found.creditline_given == request.creditline_given
                && found.creditline_received == request.creditline_received
                && found.interest_rate_given == request.interest_rate_given
                && found.interest_rate_received == request.interest_rate_received
                && found.is_frozen == request.is_frozen
                && found.transfer.unwrap_or(0) == request.transfer.unwrap_or(0);
            if !matches {
                self.push(
                    report,
                    "pending_request",
                    format!("request {initiator:?} -> {counterparty:?} differs: {found:?}"),
                );
            }
        }
        for (_, stray) in destination_pending {
            self.push(
                report,
                "pending_request",
                format!(
                    "destination has an unexpected request {:?} -> {:?}",
                    stray.initiator, stray.counterparty
                ),
            );
        }
        Ok(())
    }
}

// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

use prometheus::{
    register_int_counter_vec_with_registry, register_int_counter_with_registry,
    register_int_gauge_with_registry, IntCounter, IntCounterVec, IntGauge, Registry,
};

#[derive(Clone, Debug)]
pub struct MigrationMetrics {
    /// Transactions submitted, labeled by call kind (set_account, set_debt, ...).
    pub(crate) transactions_submitted: IntCounterVec,
    pub(crate) transactions_confirmed: IntCounter,
    pub(crate) transactions_failed: IntCounter,
    /// Accounts found already migrated and skipped.
    pub(crate) accounts_skipped: IntCounter,
    /// Decoded currency-network events consumed by the fold.
    pub(crate) events_indexed: IntCounter,
    /// Current in-flight window occupancy.
    pub(crate) transactions_inflight: IntGauge,
    /// Verifier findings, labeled by the mismatching field group.
    pub(crate) verification_mismatches: IntCounterVec,
}

impl MigrationMetrics {
    pub fn new(registry: &Registry) -> Self {
        Self {
            transactions_submitted: register_int_counter_vec_with_registry!(
                "migration_transactions_submitted",
                "Total transactions submitted by the migration driver",
                &["kind"],
                registry,
            )
            .unwrap(),
            transactions_confirmed: register_int_counter_with_registry!(
                "migration_transactions_confirmed",
                "Total transactions with a successful receipt",
                registry,
            )
            .unwrap(),
            transactions_failed: register_int_counter_with_registry!(
                "migration_transactions_failed",
                "Total transactions with a failure receipt or receipt timeout",
                registry,
            )
            .unwrap(),
            accounts_skipped: register_int_counter_with_registry!(
                "migration_accounts_skipped",
                "Accounts already present on the destination and skipped",
                registry,
            )
            .unwrap(),
            events_indexed: register_int_counter_with_registry!(
                "migration_events_indexed",
                "Currency-network events decoded and folded",
                registry,
            )
            .unwrap(),
            transactions_inflight: register_int_gauge_with_registry!(
                "migration_transactions_inflight",
                "Transactions currently awaiting a receipt",
                registry,
            )
            .unwrap(),
            verification_mismatches: register_int_counter_vec_with_registry!(
                "migration_verification_mismatches",
                "Mismatches found by the migration verifier",
                &["field"],
                registry,
            )
            .unwrap(),
        }
    }

    pub fn new_for_testing() -> Self {
        let registry = Registry::new();
        Self::new(&registry)
    }
}

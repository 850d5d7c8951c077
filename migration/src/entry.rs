// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! Fan-out entry points: migrate or verify lists of network pairs, and
//! deploy-then-migrate from a list of sources. File handling and the
//! `anyhow` edge live here; everything below speaks `MigrationResult`.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{bail, Context};
use async_trait::async_trait;
use ethers::types::Address;
use ethers::utils::to_checksum;
use tracing::info;

use crate::chain::ChainAdapter;
use crate::driver::MigrationDriver;
use crate::error::MigrationResult;
use crate::state_view::SourceContractView;
use crate::types::NetworkHandle;
use crate::verifier::{MigrationVerifier, VerificationReport};

/// Read two position-matched address-list files (one checksummed address
/// per line). Unequal lengths or a missing file are fatal.
pub fn read_addresses_to_migrate(
    old_path: &Path,
    new_path: &Path,
) -> anyhow::Result<Vec<(Address, Address)>> {
    let old_addresses = read_address_file(old_path)?;
    let new_addresses = read_address_file(new_path)?;
    if old_addresses.len() != new_addresses.len() {
        bail!(
            "address lists are position-matched but have different lengths: {} in {}, {} in {}",
            old_addresses.len(),
            old_path.display(),
            new_addresses.len(),
            new_path.display()
        );
    }
    Ok(old_addresses.into_iter().zip(new_addresses).collect())
}

fn read_address_file(path: &Path) -> anyhow::Result<Vec<Address>> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("could not read address file {}", path.display()))?;
    let mut addresses = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let address: Address = line
            .parse()
            .with_context(|| format!("{}:{}: invalid address", path.display(), index + 1))?;
        if to_checksum(&address, None) != line {
            bail!(
                "{}:{}: address {line} is not checksummed",
                path.display(),
                index + 1
            );
        }
        addresses.push(address);
    }
    Ok(addresses)
}

/// Migrate every pair in order. The first failure aborts the run; already
/// migrated pairs are left as they are.
pub async fn migrate_networks(
    driver: &MigrationDriver<'_>,
    pairs: &[(NetworkHandle, NetworkHandle)],
) -> MigrationResult<()> {
    info!(count = pairs.len(), "migrating networks");
    for (source, destination) in pairs {
        driver.migrate_network(*source, *destination).await?;
    }
    Ok(())
}

/// Verify every pair and merge the reports. Mismatches do not abort the
/// run; callers decide (the CLI exits non-zero on a non-empty report).
pub async fn verify_networks_migrations(
    verifier: &MigrationVerifier<'_>,
    pairs: &[(NetworkHandle, NetworkHandle)],
) -> MigrationResult<VerificationReport> {
    info!(count = pairs.len(), "verifying network migrations");
    let mut report = VerificationReport::default();
    for (source, destination) in pairs {
        report.merge(verifier.verify_network(*source, *destination).await?);
    }
    Ok(report)
}

/// Creates fresh destination networks. The deployed network must come up
/// frozen and owned by the given owner; how the contract gets on chain
/// (proxy mechanics, bytecode) is the implementation's concern.
#[async_trait]
pub trait NetworkDeployer: Send + Sync {
    async fn deploy_network(&self, name: &str, owner: Address) -> MigrationResult<NetworkHandle>;
}

/// Deploy a fresh destination for every source, migrate each pair, and
/// write the source-to-destination address map as JSON.
pub async fn deploy_and_migrate(
    driver: &MigrationDriver<'_>,
    deployer: &dyn NetworkDeployer,
    sources: &[NetworkHandle],
    source_chain: &dyn ChainAdapter,
    output_path: &Path,
) -> anyhow::Result<Vec<(NetworkHandle, NetworkHandle)>> {
    let mut pairs = Vec::with_capacity(sources.len());
    for source in sources {
        let name = SourceContractView::new(source_chain, *source).name().await?;
        let destination = deployer.deploy_network(&name, driver.owner()).await?;
        info!(
            source = ?source.address,
            destination = ?destination.address,
            name,
            "deployed destination network"
        );
        driver.migrate_network(*source, destination).await?;
        pairs.push((*source, destination));
    }

    let map: BTreeMap<String, String> = pairs
        .iter()
        .map(|(source, destination)| {
            (
                to_checksum(&source.address, None),
                to_checksum(&destination.address, None),
            )
        })
        .collect();
    let file = fs::File::create(output_path)
        .with_context(|| format!("could not create {}", output_path.display()))?;
    serde_json::to_writer_pretty(file, &map)?;
    info!(path = %output_path.display(), "wrote address map");
    Ok(pairs)
}

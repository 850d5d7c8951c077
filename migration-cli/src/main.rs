// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

use clap::*;
use prometheus::Registry;
use tlmigrate::chain::{ChainAdapter, EthChainAdapter};
use tlmigrate::driver::MigrationDriver;
use tlmigrate::entry::{migrate_networks, read_addresses_to_migrate, verify_networks_migrations};
use tlmigrate::metrics::MigrationMetrics;
use tlmigrate::verifier::MigrationVerifier;
use tlmigrate_cli::{
    load_migration_config, load_translator, pair_handles, Args, ConnectionArgs, MigrationCommand,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();
    let args = Args::parse();

    match args.command {
        MigrationCommand::Migrate {
            connection,
            old_addresses,
            new_addresses,
        } => {
            let (source_chain, destination_chain) = connect(&connection).await?;
            let pairs = pair_handles(
                read_addresses_to_migrate(&old_addresses, &new_addresses)?,
                source_chain.chain_id(),
                destination_chain.chain_id(),
                &connection,
            );
            let config = load_migration_config(connection.config_path.as_deref())?;
            let translator = load_translator(connection.user_address_map.as_deref())?;
            let metrics = MigrationMetrics::new(&Registry::new());
            let driver = MigrationDriver::new(
                &source_chain,
                &destination_chain,
                translator.as_ref(),
                config,
                metrics,
                connection.owner,
                connection.deployer,
            );
            migrate_networks(&driver, &pairs).await?;
            tracing::info!(count = pairs.len(), "all migrations complete");
        }
        MigrationCommand::Verify {
            connection,
            old_addresses,
            new_addresses,
        } => {
            let (source_chain, destination_chain) = connect(&connection).await?;
            let pairs = pair_handles(
                read_addresses_to_migrate(&old_addresses, &new_addresses)?,
                source_chain.chain_id(),
                destination_chain.chain_id(),
                &connection,
            );
            let config = load_migration_config(connection.config_path.as_deref())?;
            let translator = load_translator(connection.user_address_map.as_deref())?;
            let metrics = MigrationMetrics::new(&Registry::new());
            let verifier = MigrationVerifier::new(
                &source_chain,
                &destination_chain,
                translator.as_ref(),
                config,
                metrics,
            );
            let report = verify_networks_migrations(&verifier, &pairs).await?;
            println!("{report}");
            if !report.is_ok() {
                std::process::exit(1);
            }
        }
    }
    Ok(())
}

async fn connect(
    connection: &ConnectionArgs,
) -> anyhow::Result<(
    EthChainAdapter<ethers::providers::Http>,
    EthChainAdapter<ethers::providers::Http>,
)> {
    let source =
        EthChainAdapter::connect(&connection.source_rpc_url, connection.source_chain_id).await?;
    let destination = EthChainAdapter::connect(
        &connection.destination_rpc_url,
        connection.destination_chain_id,
    )
    .await?;
    Ok((source, destination))
}

// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use clap::*;
use ethers::types::Address;
use tlmigrate::config::MigrationConfig;
use tlmigrate::translator::{AddressTranslator, IdentityTranslator, TableTranslator};
use tlmigrate::types::{NetworkHandle, SchemaVersion};

#[derive(Parser)]
#[clap(rename_all = "kebab-case", version, about = "Trustlines currency-network migration tool")]
pub struct Args {
    #[clap(subcommand)]
    pub command: MigrationCommand,
}

#[derive(Parser)]
#[clap(rename_all = "kebab-case")]
pub enum MigrationCommand {
    /// Migrate frozen source networks onto pre-deployed frozen, owned
    /// destination networks.
    #[clap(name = "migrate")]
    Migrate {
        #[clap(flatten)]
        connection: ConnectionArgs,
        /// File with one checksummed source network address per line.
        #[clap(long = "old-addresses")]
        old_addresses: PathBuf,
        /// Position-matched file of destination network addresses.
        #[clap(long = "new-addresses")]
        new_addresses: PathBuf,
    },
    /// Verify completed migrations; exits non-zero on any mismatch.
    #[clap(name = "verify")]
    Verify {
        #[clap(flatten)]
        connection: ConnectionArgs,
        #[clap(long = "old-addresses")]
        old_addresses: PathBuf,
        #[clap(long = "new-addresses")]
        new_addresses: PathBuf,
    },
}

#[derive(clap::Args)]
pub struct ConnectionArgs {
    /// JSON-RPC endpoint of the source chain.
    #[clap(long = "source-rpc-url")]
    pub source_rpc_url: String,
    /// JSON-RPC endpoint of the destination chain.
    #[clap(long = "destination-rpc-url")]
    pub destination_rpc_url: String,
    /// Expected source chain id; the connection is rejected on mismatch.
    #[clap(long = "source-chain-id")]
    pub source_chain_id: Option<u64>,
    #[clap(long = "destination-chain-id")]
    pub destination_chain_id: Option<u64>,
    /// Owner of record of the destination networks. Also the unlocked
    /// account transactions are sent from.
    #[clap(long = "owner")]
    pub owner: Address,
    /// Account that deployed the destination networks; must differ from
    /// the owner.
    #[clap(long = "deployer")]
    pub deployer: Option<Address>,
    /// Optional JSON file overriding the migration defaults.
    #[clap(long = "config-path")]
    pub config_path: Option<PathBuf>,
    /// Optional JSON object mapping source user addresses to destination
    /// user addresses; unmapped users keep their address.
    #[clap(long = "user-address-map")]
    pub user_address_map: Option<PathBuf>,
    #[clap(long = "source-version", value_enum, default_value_t = SchemaVersionArg::V1)]
    pub source_version: SchemaVersionArg,
    #[clap(long = "destination-version", value_enum, default_value_t = SchemaVersionArg::V1)]
    pub destination_version: SchemaVersionArg,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum SchemaVersionArg {
    V1,
    V2,
}

impl From<SchemaVersionArg> for SchemaVersion {
    fn from(version: SchemaVersionArg) -> Self {
        match version {
            SchemaVersionArg::V1 => SchemaVersion::V1,
            SchemaVersionArg::V2 => SchemaVersion::V2,
        }
    }
}

pub fn load_migration_config(path: Option<&Path>) -> anyhow::Result<MigrationConfig> {
    match path {
        Some(path) => Ok(serde_json::from_str(&fs::read_to_string(path)?)?),
        None => Ok(MigrationConfig::default()),
    }
}

pub fn load_translator(path: Option<&Path>) -> anyhow::Result<Box<dyn AddressTranslator>> {
    match path {
        Some(path) => {
            let table: HashMap<Address, Address> =
                serde_json::from_str(&fs::read_to_string(path)?)?;
            Ok(Box::new(TableTranslator::new(table)))
        }
        None => Ok(Box::new(IdentityTranslator)),
    }
}

/// Turn position-matched address pairs into network handles on the
/// connected chains.
pub fn pair_handles(
    pairs: Vec<(Address, Address)>,
    source_chain_id: u64,
    destination_chain_id: u64,
    connection: &ConnectionArgs,
) -> Vec<(NetworkHandle, NetworkHandle)> {
    pairs
        .into_iter()
        .map(|(source, destination)| {
            (
                NetworkHandle::new(source, source_chain_id, connection.source_version.into()),
                NetworkHandle::new(
                    destination,
                    destination_chain_id,
                    connection.destination_version.into(),
                ),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_args_are_well_formed() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_parse_migrate_command() {
        let args = Args::parse_from([
            "tlmigrate",
            "migrate",
            "--source-rpc-url",
            "http://localhost:8545",
            "--destination-rpc-url",
            "http://localhost:8546",
            "--owner",
            "0x00000000000000000000000000000000000000ee",
            "--destination-version",
            "v2",
            "--old-addresses",
            "old.txt",
            "--new-addresses",
            "new.txt",
        ]);
        match args.command {
            MigrationCommand::Migrate { connection, .. } => {
                assert_eq!(connection.owner, Address::from_low_u64_be(0xee));
                assert_eq!(
                    SchemaVersion::from(connection.destination_version),
                    SchemaVersion::V2
                );
            }
            _ => panic!("expected migrate command"),
        }
    }
}

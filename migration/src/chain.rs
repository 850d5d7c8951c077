// Copyright (c) Trustlines Foundation
// SPDX-License-Identifier: Apache-2.0

//! JSON-RPC adapters.
//!
//! Everything the engine needs from a chain goes through the
//! [`ChainAdapter`] trait: contract calls, raw transaction submission,
//! receipts, logs and block timestamps. The production implementation wraps
//! an ethers `Provider`; tests substitute an in-memory chain. Transient
//! retry policy lives here and only here — the driver and verifier never
//! retry.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::EthCall;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::types::{Address, BlockId, BlockNumber, Bytes, Filter, Log, TransactionReceipt, TransactionRequest, H256, U256};
use tokio::sync::{Mutex, RwLock};

use crate::error::{MigrationError, MigrationResult};
use crate::retry_with_max_elapsed_time;

/// Chain primitives required by the migration engine.
#[async_trait]
pub trait ChainAdapter: Send + Sync {
    /// Chain identifier, fixed at construction.
    fn chain_id(&self) -> u64;

    /// `eth_call` against a contract.
    async fn call(&self, to: Address, data: Bytes) -> MigrationResult<Bytes>;

    /// Submit a transaction with an explicit nonce. Signing is the
    /// adapter's concern (node-managed accounts or a signer middleware).
    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        nonce: U256,
    ) -> MigrationResult<H256>;

    /// Receipt for a submitted transaction, `None` while pending.
    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> MigrationResult<Option<TransactionReceipt>>;

    /// All logs emitted by `address` in the inclusive block range. Callers
    /// are responsible for chunking large ranges.
    async fn get_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> MigrationResult<Vec<Log>>;

    async fn latest_block_number(&self) -> MigrationResult<u64>;

    /// Timestamp of a block, seconds since epoch. Implementations cache:
    /// the fold asks for the same blocks repeatedly.
    async fn block_timestamp(&self, block_number: u64) -> MigrationResult<u64>;

    /// The node's pending nonce for `address`. Consulted once per signing
    /// key on bootstrap; afterwards the driver counts on its own.
    async fn pending_nonce(&self, address: Address) -> MigrationResult<U256>;
}

/// Encode a typed call, execute it and decode the return value.
pub async fn call_contract<C, R>(
    adapter: &dyn ChainAdapter,
    to: Address,
    call: C,
) -> MigrationResult<R>
where
    C: EthCall + AbiEncode,
    R: AbiDecode,
{
    let output = adapter.call(to, call.encode().into()).await?;
    R::decode(output.as_ref()).map_err(MigrationError::from)
}

/// Production adapter over an ethers JSON-RPC provider.
pub struct EthChainAdapter<P> {
    provider: Provider<P>,
    chain_id: u64,
    timestamp_cache: RwLock<HashMap<u64, u64>>,
    max_retry_duration: Duration,
}

impl EthChainAdapter<Http> {
    /// Connect over HTTP and validate the chain id if an expected value is
    /// given.
    pub async fn connect(url: &str, expected_chain_id: Option<u64>) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(url)?;
        Self::new(provider, expected_chain_id).await
    }
}

impl<P> EthChainAdapter<P>
where
    P: JsonRpcClient + 'static,
{
    pub async fn new(provider: Provider<P>, expected_chain_id: Option<u64>) -> anyhow::Result<Self> {
        let chain_id = provider.get_chainid().await?.as_u64();
        if let Some(expected) = expected_chain_id {
            if chain_id != expected {
                return Err(anyhow::anyhow!(
                    "Chain ID mismatch: expected {}, got {}. This could indicate connecting to the wrong network!",
                    expected,
                    chain_id
                ));
            }
            tracing::info!("Connected to chain {} (verified)", chain_id);
        } else {
            tracing::warn!(
                "Connected to chain {} (NOT VERIFIED - no expected chain ID set)",
                chain_id
            );
        }
        Ok(Self {
            provider,
            chain_id,
            timestamp_cache: RwLock::new(HashMap::new()),
            max_retry_duration: Duration::from_secs(30),
        })
    }

    pub fn provider(&self) -> &Provider<P> {
        &self.provider
    }

    fn provider_error(e: impl std::fmt::Debug) -> MigrationError {
        MigrationError::Provider(format!("{e:?}"))
    }
}

#[async_trait]
impl<P> ChainAdapter for EthChainAdapter<P>
where
    P: JsonRpcClient + 'static,
{
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    async fn call(&self, to: Address, data: Bytes) -> MigrationResult<Bytes> {
        let tx = TransactionRequest::new().to(to).data(data);
        self.provider
            .call(&tx.into(), None)
            .await
            .map_err(Self::provider_error)
    }

    async fn send_transaction(
        &self,
        from: Address,
        to: Address,
        data: Bytes,
        nonce: U256,
    ) -> MigrationResult<H256> {
        let tx = TransactionRequest::new()
            .from(from)
            .to(to)
            .data(data)
            .nonce(nonce);
        let pending = self
            .provider
            .send_transaction(tx, None)
            .await
            .map_err(Self::provider_error)?;
        Ok(pending.tx_hash())
    }

    async fn transaction_receipt(
        &self,
        hash: H256,
    ) -> MigrationResult<Option<TransactionReceipt>> {
        self.provider
            .get_transaction_receipt(hash)
            .await
            .map_err(Self::provider_error)
    }

    async fn get_logs(
        &self,
        address: Address,
        from_block: u64,
        to_block: u64,
    ) -> MigrationResult<Vec<Log>> {
        let filter = Filter::new()
            .address(address)
            .from_block(from_block)
            .to_block(to_block);
        let logs = retry_with_max_elapsed_time!(
            self.provider.get_logs(&filter),
            self.max_retry_duration
        )
        .map_err(Self::provider_error)?
        .map_err(Self::provider_error)?;

        // Safeguard: all logs must come from the requested contract.
        if logs.iter().any(|log| log.address != address) {
            return Err(MigrationError::Provider(format!(
                "provider returned logs from a different contract address (expected {address:?})"
            )));
        }
        Ok(logs)
    }

    async fn latest_block_number(&self) -> MigrationResult<u64> {
        Ok(self
            .provider
            .get_block_number()
            .await
            .map_err(Self::provider_error)?
            .as_u64())
    }

    async fn block_timestamp(&self, block_number: u64) -> MigrationResult<u64> {
        if let Some(timestamp) = self.timestamp_cache.read().await.get(&block_number) {
            return Ok(*timestamp);
        }
        let block = self
            .provider
            .get_block(BlockId::Number(BlockNumber::Number(block_number.into())))
            .await
            .map_err(Self::provider_error)?
            .ok_or_else(|| {
                MigrationError::Provider(format!("block {block_number} not found"))
            })?;
        let timestamp = block.timestamp.as_u64();
        self.timestamp_cache
            .write()
            .await
            .insert(block_number, timestamp);
        Ok(timestamp)
    }

    async fn pending_nonce(&self, address: Address) -> MigrationResult<U256> {
        self.provider
            .get_transaction_count(address, Some(BlockId::Number(BlockNumber::Pending)))
            .await
            .map_err(Self::provider_error)
    }
}

/// Client-side monotonic nonce bookkeeping, one counter per
/// (chain, signing key). The node is consulted once on bootstrap; every
/// emission increments locally with no gap tolerance.
#[derive(Default)]
pub struct NonceTracker {
    next: Mutex<HashMap<(u64, Address), U256>>,
}

impl NonceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn next_nonce(
        &self,
        adapter: &dyn ChainAdapter,
        sender: Address,
    ) -> MigrationResult<U256> {
        let mut next = self.next.lock().await;
        let key = (adapter.chain_id(), sender);
        let nonce = match next.get(&key) {
            Some(nonce) => *nonce,
            None => adapter.pending_nonce(sender).await?,
        };
        next.insert(key, nonce + U256::one());
        Ok(nonce)
    }
}

/// Shared adapter handle as used throughout the engine.
pub type SharedChainAdapter = Arc<dyn ChainAdapter>;

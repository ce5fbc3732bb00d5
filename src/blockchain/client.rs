//! Blockchain RPC client with timeout, failover and error classification.
//!
//! # Responsibilities
//! - Connect to JSON-RPC endpoints (primary + failovers) for reads
//! - Sign and broadcast fully specified transactions through the primary endpoint
//! - Query chain state (pending nonce, gas price, receipts)
//! - Translate node error strings into typed errors

use alloy::network::TransactionBuilder;
use alloy::primitives::{Address, TxHash, U256};
use alloy::providers::{Provider, ProviderBuilder};
use alloy::rpc::types::{TransactionReceipt, TransactionRequest};
use alloy::transports::TransportResult;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::timeout;

use crate::blockchain::types::{
    classify_rpc_error, BlockchainConfig, BlockchainError, BlockchainResult, ChainId, TxPayload,
    TxReceipt,
};
use crate::blockchain::wallet::Wallet;

/// The chain operations the dispatcher needs.
///
/// Implemented over JSON-RPC by [`RpcChainClient`] and by in-process fakes in tests.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Address of the signing account.
    fn address(&self) -> Address;

    /// Chain ID used for replay protection.
    fn chain_id(&self) -> u64;

    /// Transaction count of `address` including the pending block.
    async fn get_transaction_count(&self, address: Address) -> BlockchainResult<u64>;

    /// Current market gas price in wei.
    async fn get_gas_price(&self) -> BlockchainResult<U256>;

    /// Gas limit estimate for a payload.
    async fn estimate_gas(&self, tx: &TxPayload) -> BlockchainResult<U256>;

    /// Sign and broadcast a payload, returning its hash once the node accepts it.
    async fn send_transaction(&self, tx: &TxPayload) -> BlockchainResult<TxHash>;

    /// Hash the payload would have once signed, without broadcasting it.
    async fn transaction_hash(&self, tx: &TxPayload) -> BlockchainResult<TxHash>;

    /// Receipt for a mined transaction, `None` while pending or unknown.
    async fn get_transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<TxReceipt>>;
}

type DynProvider = Arc<dyn Provider + Send + Sync>;

/// JSON-RPC chain client with failover support.
#[derive(Clone)]
pub struct RpcChainClient {
    /// Read providers (primary + failovers).
    providers: Vec<DynProvider>,
    /// Primary endpoint with the bonder wallet attached.
    signing_provider: DynProvider,
    wallet: Wallet,
    config: BlockchainConfig,
    timeout_duration: Duration,
}

impl RpcChainClient {
    /// Create a new client.
    ///
    /// Connection problems are logged, not fatal; calls fail individually until
    /// an endpoint becomes reachable.
    pub async fn new(config: BlockchainConfig, wallet: Wallet) -> BlockchainResult<Self> {
        let timeout_duration = Duration::from_secs(config.rpc_timeout_secs);
        let mut providers = Vec::new();

        let primary_url: url::Url = config.rpc_url.parse().map_err(|e| {
            BlockchainError::Rpc(format!("Invalid RPC URL '{}': {}", config.rpc_url, e))
        })?;
        providers.push(Arc::new(ProviderBuilder::new().connect_http(primary_url.clone())) as DynProvider);

        for url_str in &config.failover_urls {
            if let Ok(url) = url_str.parse() {
                providers.push(Arc::new(ProviderBuilder::new().connect_http(url)) as DynProvider);
            } else {
                tracing::warn!(url = %url_str, "Ignoring invalid failover RPC URL");
            }
        }

        let signing_provider = Arc::new(
            ProviderBuilder::new()
                .wallet(wallet.ethereum_wallet())
                .connect_http(primary_url),
        ) as DynProvider;

        let client = Self {
            providers,
            signing_provider,
            wallet,
            config: config.clone(),
            timeout_duration,
        };

        match client.verify_chain_id().await {
            Ok(()) => {
                tracing::info!(
                    rpc_url = %config.rpc_url,
                    chain_id = config.chain_id,
                    address = %client.wallet.address(),
                    "Chain client initialized"
                );
            }
            Err(e) => {
                tracing::warn!(
                    error = %e,
                    "Chain client initialized but chain verification failed"
                );
            }
        }

        Ok(client)
    }

    /// Verify the connected chain ID matches configuration.
    pub async fn verify_chain_id(&self) -> BlockchainResult<()> {
        let chain_id = self.get_chain_id().await?;
        if chain_id.0 != self.config.chain_id {
            return Err(BlockchainError::ChainMismatch {
                expected: self.config.chain_id,
                actual: chain_id.0,
            });
        }
        Ok(())
    }

    /// Get the chain ID from the RPC.
    pub async fn get_chain_id(&self) -> BlockchainResult<ChainId> {
        self.with_failover("get_chain_id", |p| async move { p.get_chain_id().await })
            .await
            .map(ChainId)
    }

    /// Run a read against each provider in order until one answers.
    async fn with_failover<T, F, Fut>(&self, op: &'static str, f: F) -> BlockchainResult<T>
    where
        F: Fn(DynProvider) -> Fut,
        Fut: Future<Output = TransportResult<T>>,
    {
        for (i, provider) in self.providers.iter().enumerate() {
            match timeout(self.timeout_duration, f(provider.clone())).await {
                Ok(Ok(result)) => return Ok(result),
                Ok(Err(e)) => {
                    tracing::warn!(provider_idx = i, op, error = %e, "RPC error, trying next provider");
                }
                Err(_) => {
                    tracing::warn!(provider_idx = i, op, "RPC timeout, trying next provider");
                }
            }
        }
        Err(BlockchainError::Rpc(format!("All RPC providers failed: {}", op)))
    }

    fn to_request(tx: &TxPayload) -> BlockchainResult<TransactionRequest> {
        let gas_price: u128 = tx
            .gas_price
            .try_into()
            .map_err(|_| BlockchainError::InvalidInput(format!("gas price {} overflows u128", tx.gas_price)))?;
        let gas_limit: u64 = tx
            .gas_limit
            .try_into()
            .map_err(|_| BlockchainError::InvalidInput(format!("gas limit {} overflows u64", tx.gas_limit)))?;

        Ok(TransactionRequest::default()
            .with_from(tx.from)
            .with_to(tx.to)
            .with_value(tx.value)
            .with_input(tx.data.clone())
            .with_nonce(tx.nonce)
            .with_gas_price(gas_price)
            .with_gas_limit(gas_limit)
            .with_chain_id(tx.chain_id))
    }
}

fn to_receipt(receipt: TransactionReceipt) -> TxReceipt {
    TxReceipt {
        transaction_hash: receipt.transaction_hash,
        block_number: receipt.block_number,
        status: receipt.status(),
    }
}

#[async_trait]
impl ChainClient for RpcChainClient {
    fn address(&self) -> Address {
        self.wallet.address()
    }

    fn chain_id(&self) -> u64 {
        self.wallet.chain_id()
    }

    async fn get_transaction_count(&self, address: Address) -> BlockchainResult<u64> {
        self.with_failover("get_transaction_count", move |p| async move {
            p.get_transaction_count(address).pending().await
        })
        .await
    }

    async fn get_gas_price(&self) -> BlockchainResult<U256> {
        self.with_failover("get_gas_price", |p| async move { p.get_gas_price().await })
            .await
            .map(U256::from)
    }

    async fn estimate_gas(&self, tx: &TxPayload) -> BlockchainResult<U256> {
        let mut request = Self::to_request(tx)?;
        request.gas = None;
        let fut = self.signing_provider.estimate_gas(request);
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(gas)) => Ok(U256::from(gas)),
            Ok(Err(e)) => Err(BlockchainError::Rpc(format!("estimateGas failed: {}", e))),
            Err(_) => Err(BlockchainError::Timeout(self.config.rpc_timeout_secs)),
        }
    }

    async fn send_transaction(&self, tx: &TxPayload) -> BlockchainResult<TxHash> {
        let request = Self::to_request(tx)?;
        let fut = self.signing_provider.send_transaction(request);
        match timeout(self.timeout_duration, fut).await {
            Ok(Ok(pending)) => Ok(*pending.tx_hash()),
            Ok(Err(e)) => Err(classify_rpc_error(e.to_string())),
            Err(_) => Err(BlockchainError::Timeout(self.config.rpc_timeout_secs)),
        }
    }

    async fn transaction_hash(&self, tx: &TxPayload) -> BlockchainResult<TxHash> {
        let envelope = Self::to_request(tx)?
            .build(&self.wallet.ethereum_wallet())
            .await
            .map_err(|e| BlockchainError::Wallet(format!("Signing failed: {}", e)))?;
        Ok(*envelope.tx_hash())
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<TxReceipt>> {
        self.with_failover("get_transaction_receipt", move |p| async move {
            p.get_transaction_receipt(hash).await
        })
        .await
        .map(|receipt| receipt.map(to_receipt))
    }
}

impl std::fmt::Debug for RpcChainClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcChainClient")
            .field("rpc_url", &self.config.rpc_url)
            .field("chain_id", &self.config.chain_id)
            .field("address", &self.wallet.address())
            .field("timeout_secs", &self.config.rpc_timeout_secs)
            .finish()
    }
}

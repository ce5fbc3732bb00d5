//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the bonder node.
//! All types derive Serde traits for deserialization from config files.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Root configuration for the bonder node.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct BonderConfig {
    /// RPC connection to the chain this node signs for.
    pub blockchain: BlockchainConfig,

    /// Fee-escalation and nonce settings for the transaction dispatcher.
    pub gas_boost: GasBoostConfig,

    /// Persistence backend for nonce, transaction and transfer records.
    pub store: StoreConfig,

    /// Commit-transfer watcher settings.
    pub commit_watcher: CommitWatcherConfig,

    /// Observability settings.
    pub observability: ObservabilityConfig,
}

/// Blockchain integration configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BlockchainConfig {
    /// JSON-RPC endpoint URL.
    pub rpc_url: String,

    /// Failover JSON-RPC endpoint URLs.
    pub failover_urls: Vec<String>,

    /// Chain ID (e.g., 10 for Optimism, 31337 for local Anvil).
    pub chain_id: u64,

    /// RPC request timeout in seconds.
    pub rpc_timeout_secs: u64,
}

impl Default for BlockchainConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://localhost:8545".to_string(),
            failover_urls: Vec::new(),
            chain_id: 31337,
            rpc_timeout_secs: 10,
        }
    }
}

/// Gas boosting configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct GasBoostConfig {
    /// Interval between polls of in-flight attempts, in milliseconds.
    pub poll_ms: u64,

    /// Age an attempt must reach before it is boosted, in milliseconds.
    pub time_til_boost_ms: u64,

    /// Multiplier applied to the previous gas price on each boost.
    pub gas_price_multiplier: f64,

    /// Multiplier applied to the market gas price for the first broadcast.
    pub initial_tx_gas_price_multiplier: f64,

    /// Hard cap on gas price in gwei. Boosts above it are skipped.
    pub max_gas_price_gwei: f64,

    /// Never boost below the current market gas price.
    pub compare_market_gas_price: bool,

    /// Always adopt the chain's pending nonce on startup.
    pub set_latest_nonce_on_start: bool,

    /// A persisted nonce older than this is replaced by the chain's pending count.
    pub nonce_freshness_secs: u64,

    /// Broadcast attempts for a single send before giving up.
    pub max_send_retries: u32,

    /// Rebroadcasts of the latest attempt once the gas cap is reached.
    pub max_rebroadcasts: u32,
}

impl Default for GasBoostConfig {
    fn default() -> Self {
        Self {
            poll_ms: 10_000,
            time_til_boost_ms: 60_000,
            gas_price_multiplier: 1.5,
            initial_tx_gas_price_multiplier: 1.0,
            max_gas_price_gwei: 500.0,
            compare_market_gas_price: true,
            set_latest_nonce_on_start: false,
            nonce_freshness_secs: 5 * 60,
            max_send_retries: 10,
            max_rebroadcasts: 10,
        }
    }
}

/// Persistence configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct StoreConfig {
    /// Path of the JSON store file. In-memory when unset.
    pub path: Option<String>,
}

/// Chain family of the watched bridge, used to pick event finality.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    Arbitrum,
    Optimism,
    Polygon,
    Gnosis,
    #[default]
    Generic,
}

/// Commit-transfer watcher configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CommitWatcherConfig {
    /// Enable the watcher.
    pub enabled: bool,

    /// Address of the L2 bridge contract.
    pub bridge_address: String,

    /// Chain family of the source chain.
    pub chain_family: ChainFamily,

    /// Destination chains tracked from startup, in addition to those seen in events.
    pub destination_chain_ids: Vec<u64>,

    /// Poll loop interval in milliseconds.
    pub poll_interval_ms: u64,

    /// Minimum spacing between commit checks for one chain, in milliseconds.
    pub throttle_ms: u64,

    /// Age after which an unconfirmed commit no longer blocks a new one.
    pub commit_retry_delay_ms: u64,

    /// First block to read events from. Defaults to the current head.
    pub start_block: Option<u64>,

    /// Maximum block span per event query.
    pub event_batch_size: u64,

    /// Compute and persist roots without submitting commits.
    pub dry_mode: bool,

    /// Minimum pending amount (decimal wei) per destination chain id.
    pub min_threshold_amounts: BTreeMap<String, String>,
}

impl Default for CommitWatcherConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bridge_address: String::new(),
            chain_family: ChainFamily::Generic,
            destination_chain_ids: Vec::new(),
            poll_interval_ms: 10_000,
            throttle_ms: 15_000,
            commit_retry_delay_ms: 10 * 60 * 1000,
            start_block: None,
            event_batch_size: 1_000,
            dry_mode: false,
            min_threshold_amounts: BTreeMap::new(),
        }
    }
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,

    /// Emit logs as JSON lines instead of human-readable text.
    pub json_logs: bool,

    /// Enable metrics endpoint.
    pub metrics_enabled: bool,

    /// Metrics endpoint bind address.
    pub metrics_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            json_logs: false,
            metrics_enabled: false,
            metrics_address: "0.0.0.0:9090".to_string(),
        }
    }
}

//! Bonder node.
//!
//! # Architecture Overview
//!
//! ```text
//!   L2 bridge contract ──events──▶ CommitTransfersWatcher ──root──▶ store
//!                                         │
//!                                         ▼ commitTransfers
//!                                  GasBoostSigner (nonce lock)
//!                                         │
//!                                         ▼
//!                                  GasBoostTransaction ──boost/poll──▶ chain RPC
//! ```

use alloy::primitives::Address;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;

use bonder_node::blockchain::{ChainClient, RpcChainClient, Wallet};
use bonder_node::bridge::L2BridgeClient;
use bonder_node::config::loader::load_config;
use bonder_node::config::BonderConfig;
use bonder_node::gasboost::{GasBoostOptions, GasBoostSigner};
use bonder_node::lifecycle::signals::wait_for_shutdown_signal;
use bonder_node::lifecycle::Shutdown;
use bonder_node::observability::{logging, metrics};
use bonder_node::store::{FileStore, MemoryStore, Store};
use bonder_node::watchers::CommitTransfersWatcher;

#[derive(Parser)]
#[command(name = "bonder-node")]
#[command(about = "Commits transfer roots and dispatches bonder transactions", long_about = None)]
struct Cli {
    /// TOML configuration file. Defaults apply when omitted.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Compute and persist roots without sending commits.
    #[arg(long)]
    dry_mode: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config(path)?,
        None => BonderConfig::default(),
    };
    if cli.dry_mode {
        config.commit_watcher.dry_mode = true;
    }

    logging::init_logging(&config.observability)?;
    tracing::info!("bonder-node v{} starting", env!("CARGO_PKG_VERSION"));

    if config.observability.metrics_enabled {
        match config.observability.metrics_address.parse() {
            Ok(addr) => metrics::init_metrics(addr),
            Err(_) => tracing::error!(
                metrics_address = %config.observability.metrics_address,
                "Failed to parse metrics address"
            ),
        }
    }

    let wallet = Wallet::from_env(config.blockchain.chain_id)?;
    let client: Arc<dyn ChainClient> = Arc::new(RpcChainClient::new(config.blockchain.clone(), wallet.clone()).await?);

    let store: Arc<dyn Store> = match &config.store.path {
        Some(path) => Arc::new(FileStore::open(path).await?),
        None => {
            tracing::warn!("No store path configured, state will not survive a restart");
            Arc::new(MemoryStore::new())
        }
    };

    let options = GasBoostOptions::from_config(&config.gas_boost)?;
    let signer = Arc::new(GasBoostSigner::new(client.clone(), store.clone(), options));
    signer.ready().await?;
    tracing::info!(address = %signer.address(), nonce = signer.get_nonce().await?, "Dispatcher ready");
    let resumed = signer.resume_active().await?;
    if !resumed.is_empty() {
        tracing::info!(count = resumed.len(), "Resumed unfinished transactions");
    }

    let shutdown = Shutdown::new();

    let watcher_task = if config.commit_watcher.enabled {
        let bridge_address: Address = config.commit_watcher.bridge_address.parse()?;
        let bridge = Arc::new(L2BridgeClient::new(
            &config.blockchain,
            bridge_address,
            config.commit_watcher.chain_family,
            wallet.address(),
        )?);
        let watcher = CommitTransfersWatcher::new(bridge, signer.clone(), store.clone(), config.commit_watcher.clone())?;
        Some(tokio::spawn(watcher.run(shutdown.clone())))
    } else {
        tracing::info!("Commit transfers watcher disabled");
        None
    };

    wait_for_shutdown_signal().await;
    shutdown.trigger();

    if let Some(task) = watcher_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::error!(error = %e, "Commit transfers watcher exited with error"),
            Err(e) => tracing::error!(error = %e, "Commit transfers watcher task panicked"),
        }
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

//! Chain watchers.
//!
//! # Data Flow
//! ```text
//! bridge events + poll timer
//!     → commit_transfers.rs (pending sets, throttled commit checks)
//!     → merkle (root) → db.rs (root record) → gasboost (commit tx)
//!     → CommitTransfersEvent on confirmation
//!
//! reconcile.rs: historical commits → recomputed roots → mismatch reports
//! ```

pub mod commit_transfers;
pub mod db;
pub mod reconcile;
pub mod throttle;

use alloy::primitives::B256;
use thiserror::Error;

use crate::bridge::BridgeError;
use crate::gasboost::GasBoostError;
use crate::store::StoreError;

pub use commit_transfers::{CommitOutcome, CommitTransfersEvent, CommitTransfersWatcher};
pub use db::{TransferRecord, TransferRootRecord, WatcherDb};
pub use reconcile::{get_recent_transfer_hashes_for_committed_roots, RootReconciliation, RootStatus};

#[derive(Debug, Error)]
pub enum WatcherError {
    #[error(transparent)]
    Bridge(#[from] BridgeError),

    #[error(transparent)]
    Dispatch(#[from] GasBoostError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("transfer root mismatch for chain {chain_id}: on-chain {expected}, recomputed {computed}")]
    RootMismatch { chain_id: u64, expected: B256, computed: B256 },

    #[error("invalid watcher config: {0}")]
    Config(String),
}

pub type WatcherResult<T> = Result<T, WatcherError>;

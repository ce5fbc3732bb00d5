//! Bonder node settlement core.
//!
//! A fee-escalating, nonce-safe transaction dispatcher and the watcher that
//! commits transfer roots for an L2 bridge through it.

pub mod blockchain;
pub mod bridge;
pub mod config;
pub mod gasboost;
pub mod lifecycle;
pub mod merkle;
pub mod observability;
pub mod store;
pub mod watchers;

pub use config::schema::BonderConfig;
pub use gasboost::{GasBoostSigner, GasBoostTransaction};
pub use lifecycle::Shutdown;
pub use watchers::CommitTransfersWatcher;

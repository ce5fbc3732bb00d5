//! Blockchain integration subsystem.
//!
//! # Data Flow
//! ```text
//! Environment Variables (private key) + [blockchain] config (RPC URLs)
//!     → wallet.rs (key loading)
//!     → client.rs (RPC connection with timeouts, signing, broadcast)
//!     → gasboost (nonce allocation, fee escalation, confirmation)
//! ```
//!
//! # Security Constraints
//! - Private keys ONLY from environment variables
//! - Never log private keys or sensitive data
//! - All RPC calls have configurable timeouts

pub mod client;
pub mod types;
pub mod wallet;

pub use client::{ChainClient, RpcChainClient};
pub use types::{BlockchainConfig, BlockchainError, BlockchainResult, ChainId, TxPayload, TxReceipt};
pub use wallet::Wallet;

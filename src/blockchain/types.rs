//! Chain-specific types and error definitions.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use crate::config::schema::BlockchainConfig;

/// Chain ID type for strong typing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChainId(pub u64);

impl From<u64> for ChainId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

impl From<ChainId> for u64 {
    fn from(id: ChainId) -> Self {
        id.0
    }
}

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    /// RPC connection or request failed.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// RPC request timed out.
    #[error("RPC timeout after {0} seconds")]
    Timeout(u64),

    /// The nonce was already consumed by another transaction.
    #[error("Nonce too low: {0}")]
    NonceTooLow(String),

    /// The node already has this exact transaction in its mempool.
    #[error("Transaction already known: {0}")]
    AlreadyKnown(String),

    /// The fee is too low to enter the mempool or replace the pending attempt.
    #[error("Transaction underpriced: {0}")]
    Underpriced(String),

    /// Invalid private key format or derivation error.
    #[error("Wallet error: {0}")]
    Wallet(String),

    /// Chain configuration mismatch.
    #[error("Chain ID mismatch: expected {expected}, got {actual}")]
    ChainMismatch { expected: u64, actual: u64 },

    /// A value could not be represented in the wire format.
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

impl BlockchainError {
    /// Whether re-sending the same payload may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BlockchainError::AlreadyKnown(_)
                | BlockchainError::Underpriced(_)
                | BlockchainError::Timeout(_)
                | BlockchainError::Rpc(_)
        )
    }
}

/// Result type for blockchain operations.
pub type BlockchainResult<T> = Result<T, BlockchainError>;

/// Map a raw node error message to a typed error.
///
/// Nonce errors are checked first: several nodes also report "underpriced"
/// or "already known" for a consumed nonce.
pub fn classify_rpc_error(message: impl Into<String>) -> BlockchainError {
    let message = message.into();
    let lower = message.to_lowercase();

    let nonce_too_low = (lower.contains("nonce") && lower.contains("too low"))
        || lower.contains("same nonce")
        || lower.contains("already been used")
        || lower.contains("nonce_expired")
        || lower.contains("oldnonce")
        || lower.contains("invalid transaction nonce");
    if nonce_too_low {
        return BlockchainError::NonceTooLow(message);
    }
    if lower.contains("already known") || lower.contains("alreadyknown") {
        return BlockchainError::AlreadyKnown(message);
    }
    if lower.contains("underpriced")
        || lower.contains("feetoolowtocompete")
        || lower.contains("replacement fee too low")
    {
        return BlockchainError::Underpriced(message);
    }
    BlockchainError::Rpc(message)
}

/// A fully specified legacy-fee transaction ready for signing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxPayload {
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub nonce: u64,
    pub gas_price: U256,
    pub gas_limit: U256,
    pub chain_id: u64,
}

/// The subset of a transaction receipt the dispatcher relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TxReceipt {
    pub transaction_hash: TxHash,
    pub block_number: Option<u64>,
    /// `true` when execution succeeded.
    pub status: bool,
}

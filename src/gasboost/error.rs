//! Dispatcher error taxonomy.

use alloy::primitives::TxHash;
use thiserror::Error;
use uuid::Uuid;

use crate::blockchain::BlockchainError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum GasBoostError {
    /// Another transaction already used this nonce.
    #[error("nonce {nonce} too low: {message}")]
    NonceTooLow { nonce: u64, message: String },

    /// The nonce was taken by a transaction this dispatcher did not send.
    #[error("nonce {nonce} consumed by another transaction")]
    NonceConsumed { nonce: u64 },

    #[error(transparent)]
    Chain(#[from] BlockchainError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// The transaction has not been broadcast yet.
    #[error("transaction hash not yet assigned")]
    HashUnavailable,

    #[error("transaction {hash} reverted")]
    Reverted { hash: TxHash },

    #[error("transaction record {0} not found")]
    NotFound(Uuid),

    #[error("invalid gas boost options: {0}")]
    InvalidOptions(String),

    #[error("signer not ready: {0}")]
    NotReady(String),
}

pub type GasBoostResult<T> = Result<T, GasBoostError>;

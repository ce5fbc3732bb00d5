//! Bridge facade value types.

use alloy::primitives::{Address, TxHash, B256, U256};
use thiserror::Error;

pub use crate::config::ChainFamily;

impl ChainFamily {
    /// Blocks behind head before an event is treated as final.
    pub fn confirmation_depth(self) -> u64 {
        match self {
            ChainFamily::Arbitrum | ChainFamily::Optimism => 0,
            ChainFamily::Polygon => 64,
            ChainFamily::Gnosis => 12,
            ChainFamily::Generic => 12,
        }
    }
}

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("bridge RPC error: {0}")]
    Rpc(String),

    #[error("bridge decode error: {0}")]
    Decode(String),

    #[error("invalid bridge input: {0}")]
    InvalidInput(String),
}

pub type BridgeResult<T> = Result<T, BridgeError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    TransferSent,
    TransfersCommitted,
}

/// Log query, optionally narrowed to one destination chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EventFilter {
    pub kind: EventKind,
    pub destination_chain_id: Option<u64>,
}

impl EventFilter {
    pub fn transfer_sent(destination_chain_id: Option<u64>) -> Self {
        Self {
            kind: EventKind::TransferSent,
            destination_chain_id,
        }
    }

    pub fn transfers_committed(destination_chain_id: Option<u64>) -> Self {
        Self {
            kind: EventKind::TransfersCommitted,
            destination_chain_id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSentEvent {
    pub transfer_id: B256,
    pub destination_chain_id: u64,
    pub recipient: Address,
    pub amount: U256,
    pub transfer_nonce: B256,
    pub bonder_fee: U256,
    /// Position in the contract's pending list for the destination chain.
    pub index: U256,
    pub amount_out_min: U256,
    pub deadline: U256,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: Option<TxHash>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransfersCommittedEvent {
    pub destination_chain_id: u64,
    pub root_hash: B256,
    pub total_amount: U256,
    pub root_committed_at: u64,
    pub block_number: u64,
    pub log_index: u64,
    pub tx_hash: Option<TxHash>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeEvent {
    TransferSent(TransferSentEvent),
    TransfersCommitted(TransfersCommittedEvent),
}

impl BridgeEvent {
    /// `(block, log index)` ordering key.
    pub fn position(&self) -> (u64, u64) {
        match self {
            BridgeEvent::TransferSent(e) => (e.block_number, e.log_index),
            BridgeEvent::TransfersCommitted(e) => (e.block_number, e.log_index),
        }
    }

    pub fn destination_chain_id(&self) -> u64 {
        match self {
            BridgeEvent::TransferSent(e) => e.destination_chain_id,
            BridgeEvent::TransfersCommitted(e) => e.destination_chain_id,
        }
    }
}

/// Decoded arguments of a bridge `send` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendData {
    pub destination_chain_id: u64,
    pub recipient: Address,
    pub amount: U256,
    pub bonder_fee: U256,
    pub amount_out_min: U256,
    pub deadline: U256,
}

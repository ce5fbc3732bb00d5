//! Persisted and in-memory dispatcher records.

use alloy::primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use uuid::Uuid;

use crate::store::decimal;

/// Store key of the singleton nonce counter.
pub const NONCE_KEY: &str = "nonce";

/// Store key of the broadcast-but-unfinished transaction ids.
///
/// Maps each id to the time it was first broadcast; finished ids are set to
/// `null` so concurrent merges never drop a live entry.
pub const ACTIVE_TX_KEY: &str = "activeTxIds";

/// Milliseconds since the Unix epoch.
pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// Next nonce to assign for the signing account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NonceRecord {
    pub nonce: u64,
    pub updated_at: u64,
}

/// What a caller asks the dispatcher to send.
///
/// Gas price and limit are resolved at broadcast time when absent.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionRequest {
    pub to: Address,
    pub data: Bytes,
    pub value: U256,
    pub gas_price: Option<U256>,
    pub gas_limit: Option<U256>,
}

impl TransactionRequest {
    pub fn new(to: Address, data: Bytes) -> Self {
        Self {
            to,
            data,
            ..Default::default()
        }
    }

    pub fn with_gas_price(mut self, gas_price: U256) -> Self {
        self.gas_price = Some(gas_price);
        self
    }

    pub fn with_gas_limit(mut self, gas_limit: U256) -> Self {
        self.gas_limit = Some(gas_limit);
        self
    }
}

/// One logical transaction, keyed by its UUID rather than a chain hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionRecord {
    pub id: Uuid,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    pub from: Address,
    pub to: Address,
    pub data: Bytes,
    #[serde(with = "decimal::u256")]
    pub value: U256,
    pub nonce: u64,
    #[serde(default, with = "decimal::option_u256", skip_serializing_if = "Option::is_none")]
    pub gas_price: Option<U256>,
    #[serde(default, with = "decimal::option_u256", skip_serializing_if = "Option::is_none")]
    pub gas_limit: Option<U256>,
}

impl TransactionRecord {
    pub fn new(from: Address, request: TransactionRequest, nonce: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            created_at: now_ms(),
            tx_hash: None,
            from,
            to: request.to,
            data: request.data,
            value: request.value,
            nonce,
            gas_price: request.gas_price,
            gas_limit: request.gas_limit,
        }
    }

    /// Store key for this record.
    pub fn key(&self) -> String {
        self.id.to_string()
    }
}

/// One broadcast of a transaction at a specific fee. Never persisted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InFlightAttempt {
    pub hash: TxHash,
    pub gas_price: U256,
    pub sent_at: Instant,
    /// Superseded by a higher-fee attempt.
    pub boosted: bool,
    pub confirmed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxStatus {
    Created,
    Broadcast,
    InFlight,
    Boosted,
    Confirmed,
    /// Another transaction took the nonce and none of ours was mined.
    Replaced,
}

impl TxStatus {
    pub fn is_broadcast(self) -> bool {
        !matches!(self, TxStatus::Created)
    }

    /// No further polling or boosting happens.
    pub fn is_final(self) -> bool {
        matches!(self, TxStatus::Confirmed | TxStatus::Replaced)
    }
}

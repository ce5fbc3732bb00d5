//! Chain bridge facade.
//!
//! # Data Flow
//! ```text
//! L2 bridge contract (logs, views)
//!     → l2_bridge.rs (alloy bindings, decoding)
//!     → events.rs (batched event sequences)
//!     → watchers (pending sets, commit checks, reconciliation)
//! ```
//!
//! Chain families differ only in capabilities such as event finality, so
//! they are a tag on one facade rather than separate bridge types.

pub mod events;
pub mod l2_bridge;
pub mod types;

use alloy::primitives::{Address, B256, U256};
use async_trait::async_trait;

use crate::gasboost::{GasBoostResult, GasBoostSigner, GasBoostTransaction, TransactionRequest};

pub use events::{batch_ranges, event_batches, EventBatch};
pub use l2_bridge::L2BridgeClient;
pub use types::{
    BridgeError, BridgeEvent, BridgeResult, ChainFamily, EventFilter, EventKind, SendData,
    TransferSentEvent, TransfersCommittedEvent,
};

/// Read and write primitives of one L2 bridge deployment.
#[async_trait]
pub trait BridgeFacade: Send + Sync {
    fn chain_family(&self) -> ChainFamily;

    /// Bridge contract address.
    fn address(&self) -> Address;

    async fn source_chain_id(&self) -> BridgeResult<u64>;

    async fn latest_block(&self) -> BridgeResult<u64>;

    /// Matching events in `[from_block, to_block]`, ordered by position.
    async fn query_filter(&self, filter: &EventFilter, from_block: u64, to_block: u64) -> BridgeResult<Vec<BridgeEvent>>;

    /// Authoritative pending transfer ids for a destination, in contract order.
    async fn get_pending_transfers(&self, chain_id: u64) -> BridgeResult<Vec<B256>>;

    async fn get_pending_amount_for_chain_id(&self, chain_id: u64) -> BridgeResult<U256>;

    /// Unix seconds of the last commit for a destination.
    async fn get_last_commit_time_for_chain_id(&self, chain_id: u64) -> BridgeResult<u64>;

    /// Seconds after which anyone may commit.
    async fn get_minimum_force_commit_delay(&self) -> BridgeResult<u64>;

    /// Whether the node's account holds the bonder role.
    async fn is_bonder(&self) -> BridgeResult<bool>;

    /// Unsent `commitTransfers(chain_id)` call against this bridge.
    fn commit_transfers_request(&self, chain_id: u64) -> TransactionRequest {
        TransactionRequest::new(self.address(), l2_bridge::encode_commit_transfers(chain_id))
    }

    /// Decode `send(...)` calldata.
    fn decode_send_data(&self, data: &[u8]) -> BridgeResult<SendData> {
        l2_bridge::decode_send_data(data)
    }
}

/// Submit `commitTransfers(chain_id)` through the dispatcher.
pub async fn commit_transfers(
    bridge: &dyn BridgeFacade,
    signer: &GasBoostSigner,
    chain_id: u64,
) -> GasBoostResult<GasBoostTransaction> {
    signer.send_transaction(bridge.commit_transfers_request(chain_id)).await
}

//! In-process fakes for the chain client and bridge.

#![allow(dead_code)]

use alloy::primitives::{keccak256, Address, TxHash, B256, U256};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bonder_node::blockchain::{BlockchainError, BlockchainResult, ChainClient, TxPayload, TxReceipt};
use bonder_node::bridge::{
    BridgeError, BridgeEvent, BridgeFacade, BridgeResult, ChainFamily, EventFilter, EventKind, TransferSentEvent,
    TransfersCommittedEvent,
};
use bonder_node::gasboost::GasBoostOptions;

pub const GWEI: u64 = 1_000_000_000;
pub const CHAIN_ID: u64 = 31337;

pub fn gwei(amount: u64) -> U256 {
    U256::from(amount * GWEI)
}

pub fn test_options() -> GasBoostOptions {
    GasBoostOptions {
        poll_interval: Duration::from_secs(1),
        time_til_boost: Duration::from_secs(5),
        max_gas_price: gwei(500),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct MockChainState {
    pub pending_count: u64,
    pub gas_price: U256,
    pub sent: Vec<(TxHash, TxPayload)>,
    pub receipts: HashMap<TxHash, TxReceipt>,
    pub send_errors: VecDeque<BlockchainError>,
    pub send_delay: Option<Duration>,
    /// Accept the next broadcast but report a timeout to the caller.
    pub drop_next_response: bool,
}

fn payload_hash(tx: &TxPayload) -> TxHash {
    let mut seed = tx.nonce.to_be_bytes().to_vec();
    seed.extend_from_slice(&tx.gas_price.to_be_bytes::<32>());
    seed.extend_from_slice(&tx.data);
    keccak256(seed)
}

pub struct MockChainClient {
    address: Address,
    state: Mutex<MockChainState>,
}

impl MockChainClient {
    pub fn new(gas_price: U256) -> Arc<Self> {
        Arc::new(Self {
            address: Address::repeat_byte(0xb0),
            state: Mutex::new(MockChainState {
                gas_price,
                ..Default::default()
            }),
        })
    }

    pub fn set_pending_count(&self, count: u64) {
        self.state.lock().unwrap().pending_count = count;
    }

    pub fn set_gas_price(&self, price: U256) {
        self.state.lock().unwrap().gas_price = price;
    }

    pub fn set_send_delay(&self, delay: Duration) {
        self.state.lock().unwrap().send_delay = Some(delay);
    }

    /// Reject the next broadcast with `error`.
    pub fn fail_next_send(&self, error: BlockchainError) {
        self.state.lock().unwrap().send_errors.push_back(error);
    }

    /// The node takes the next broadcast, but its response never arrives.
    pub fn accept_next_then_time_out(&self) {
        self.state.lock().unwrap().drop_next_response = true;
    }

    pub fn sent(&self) -> Vec<(TxHash, TxPayload)> {
        self.state.lock().unwrap().sent.clone()
    }

    pub fn confirm(&self, hash: TxHash) {
        self.state.lock().unwrap().receipts.insert(
            hash,
            TxReceipt {
                transaction_hash: hash,
                block_number: Some(100),
                status: true,
            },
        );
    }
}

#[async_trait]
impl ChainClient for MockChainClient {
    fn address(&self) -> Address {
        self.address
    }

    fn chain_id(&self) -> u64 {
        CHAIN_ID
    }

    async fn get_transaction_count(&self, _address: Address) -> BlockchainResult<u64> {
        Ok(self.state.lock().unwrap().pending_count)
    }

    async fn get_gas_price(&self) -> BlockchainResult<U256> {
        Ok(self.state.lock().unwrap().gas_price)
    }

    async fn estimate_gas(&self, _tx: &TxPayload) -> BlockchainResult<U256> {
        Ok(U256::from(100_000u64))
    }

    async fn send_transaction(&self, tx: &TxPayload) -> BlockchainResult<TxHash> {
        let delay = self.state.lock().unwrap().send_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut state = self.state.lock().unwrap();
        if let Some(error) = state.send_errors.pop_front() {
            return Err(error);
        }

        let hash = payload_hash(tx);
        if state.sent.iter().any(|(sent, _)| *sent == hash) {
            return Err(BlockchainError::AlreadyKnown("already known".into()));
        }

        state.sent.push((hash, tx.clone()));
        if std::mem::take(&mut state.drop_next_response) {
            return Err(BlockchainError::Timeout(10));
        }
        Ok(hash)
    }

    async fn transaction_hash(&self, tx: &TxPayload) -> BlockchainResult<TxHash> {
        Ok(payload_hash(tx))
    }

    async fn get_transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<TxReceipt>> {
        Ok(self.state.lock().unwrap().receipts.get(&hash).cloned())
    }
}

#[derive(Default)]
pub struct MockBridgeState {
    pub source_chain_id: u64,
    pub latest_block: u64,
    pub events: Vec<BridgeEvent>,
    pub pending: HashMap<u64, Vec<B256>>,
    pub pending_amount: HashMap<u64, U256>,
    pub last_commit_time: u64,
    pub force_commit_delay: u64,
    pub is_bonder: bool,
    /// Destinations whose reads fail.
    pub failing_chains: HashSet<u64>,
}

pub struct MockBridge {
    address: Address,
    pub state: Mutex<MockBridgeState>,
}

impl MockBridge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            address: Address::repeat_byte(0xbb),
            state: Mutex::new(MockBridgeState {
                source_chain_id: 10,
                is_bonder: true,
                ..Default::default()
            }),
        })
    }

    /// Set the contract's pending list and amount for a destination.
    pub fn set_pending(&self, chain_id: u64, ids: Vec<B256>, amount: U256) {
        let mut state = self.state.lock().unwrap();
        state.pending.insert(chain_id, ids);
        state.pending_amount.insert(chain_id, amount);
    }

    /// Make every per-destination read for `chain_id` fail.
    pub fn fail_chain(&self, chain_id: u64) {
        self.state.lock().unwrap().failing_chains.insert(chain_id);
    }

    fn check_chain(&self, chain_id: u64) -> BridgeResult<()> {
        if self.state.lock().unwrap().failing_chains.contains(&chain_id) {
            return Err(BridgeError::Rpc(format!("chain {} unavailable", chain_id)));
        }
        Ok(())
    }

    pub fn push_event(&self, event: BridgeEvent) {
        let mut state = self.state.lock().unwrap();
        state.latest_block = state.latest_block.max(event.position().0);
        state.events.push(event);
    }
}

pub fn transfer_sent(transfer_id: B256, destination_chain_id: u64, block_number: u64) -> BridgeEvent {
    BridgeEvent::TransferSent(TransferSentEvent {
        transfer_id,
        destination_chain_id,
        recipient: Address::repeat_byte(0xcc),
        amount: U256::from(1_000u64),
        transfer_nonce: B256::ZERO,
        bonder_fee: U256::from(10u64),
        index: U256::ZERO,
        amount_out_min: U256::ZERO,
        deadline: U256::ZERO,
        block_number,
        log_index: 0,
        tx_hash: None,
    })
}

pub fn transfers_committed(destination_chain_id: u64, root_hash: B256, block_number: u64) -> BridgeEvent {
    BridgeEvent::TransfersCommitted(TransfersCommittedEvent {
        destination_chain_id,
        root_hash,
        total_amount: U256::from(1_000u64),
        root_committed_at: 1_700_000_000,
        block_number,
        log_index: 1,
        tx_hash: None,
    })
}

#[async_trait]
impl BridgeFacade for MockBridge {
    fn chain_family(&self) -> ChainFamily {
        ChainFamily::Optimism
    }

    fn address(&self) -> Address {
        self.address
    }

    async fn source_chain_id(&self) -> BridgeResult<u64> {
        Ok(self.state.lock().unwrap().source_chain_id)
    }

    async fn latest_block(&self) -> BridgeResult<u64> {
        Ok(self.state.lock().unwrap().latest_block)
    }

    async fn query_filter(&self, filter: &EventFilter, from_block: u64, to_block: u64) -> BridgeResult<Vec<BridgeEvent>> {
        let state = self.state.lock().unwrap();
        let mut events: Vec<BridgeEvent> = state
            .events
            .iter()
            .filter(|e| {
                let kind_matches = matches!(
                    (filter.kind, e),
                    (EventKind::TransferSent, BridgeEvent::TransferSent(_))
                        | (EventKind::TransfersCommitted, BridgeEvent::TransfersCommitted(_))
                );
                let block = e.position().0;
                kind_matches
                    && (from_block..=to_block).contains(&block)
                    && filter.destination_chain_id.map_or(true, |id| id == e.destination_chain_id())
            })
            .cloned()
            .collect();
        events.sort_by_key(BridgeEvent::position);
        Ok(events)
    }

    async fn get_pending_transfers(&self, chain_id: u64) -> BridgeResult<Vec<B256>> {
        self.check_chain(chain_id)?;
        Ok(self.state.lock().unwrap().pending.get(&chain_id).cloned().unwrap_or_default())
    }

    async fn get_pending_amount_for_chain_id(&self, chain_id: u64) -> BridgeResult<U256> {
        self.check_chain(chain_id)?;
        Ok(self
            .state
            .lock()
            .unwrap()
            .pending_amount
            .get(&chain_id)
            .copied()
            .unwrap_or_default())
    }

    async fn get_last_commit_time_for_chain_id(&self, chain_id: u64) -> BridgeResult<u64> {
        self.check_chain(chain_id)?;
        Ok(self.state.lock().unwrap().last_commit_time)
    }

    async fn get_minimum_force_commit_delay(&self) -> BridgeResult<u64> {
        Ok(self.state.lock().unwrap().force_commit_delay)
    }

    async fn is_bonder(&self) -> BridgeResult<bool> {
        Ok(self.state.lock().unwrap().is_bonder)
    }
}

//! Fee-escalating transaction.
//!
//! # State machine
//! ```text
//! Created → Broadcast → InFlight → {Boosted}* → Confirmed
//!                                      └──────→ Replaced
//! ```
//!
//! A failed `send()` leaves the transaction `Created`. A broadcast that timed
//! out or came back "already known" may still be in the mempool, so it is
//! tracked as broadcast under its locally computed hash. Once broadcast, a
//! background poller checks every attempt for a receipt and replaces the
//! latest attempt with a higher-fee one when it gets old. The poller stops
//! when one attempt confirms, or when the nonce was taken by a foreign
//! transaction and none of ours has a receipt after [`NONCE_CONSUMED_GRACE`].

use alloy::primitives::{TxHash, U256};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::{sleep, Instant};
use uuid::Uuid;

use crate::blockchain::{BlockchainError, ChainClient, TxPayload, TxReceipt};
use crate::gasboost::backoff::{retry_delay, RETRY_BASE, RETRY_MAX};
use crate::gasboost::error::{GasBoostError, GasBoostResult};
use crate::gasboost::options::{scale_price, GasBoostOptions};
use crate::gasboost::record::{now_ms, InFlightAttempt, TransactionRecord, TxStatus, ACTIVE_TX_KEY};
use crate::observability::metrics;
use crate::store::{update_record, Store};

const EVENT_CAPACITY: usize = 16;

/// How long to keep looking for our receipt after the node reports the nonce as used.
pub const NONCE_CONSUMED_GRACE: Duration = Duration::from_secs(10 * 60);

/// Lifecycle notifications for subscribers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxEvent {
    Boosted {
        hash: TxHash,
        gas_price: U256,
        boost_index: usize,
    },
    MaxGasPriceReached {
        gas_price: U256,
        max_gas_price: U256,
    },
    Confirmed(TxReceipt),
    /// The nonce went to a transaction this dispatcher did not send.
    Replaced { nonce: u64 },
}

#[derive(Debug, Clone)]
enum Outcome {
    Confirmed(TxReceipt),
    Replaced,
}

struct TxState {
    record: TransactionRecord,
    status: TxStatus,
    attempts: Vec<InFlightAttempt>,
    rebroadcasts: u32,
    warned_max_gas_price: bool,
    /// First time a boost or rebroadcast was rejected with `NonceTooLow`.
    nonce_consumed_at: Option<Instant>,
}

struct Inner {
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    options: GasBoostOptions,
    state: Mutex<TxState>,
    outcome: watch::Sender<Option<Outcome>>,
    events: broadcast::Sender<TxEvent>,
    poller_started: AtomicBool,
}

/// Handle to one logical transaction. Clones share state.
#[derive(Clone)]
pub struct GasBoostTransaction {
    inner: Arc<Inner>,
}

impl GasBoostTransaction {
    pub fn new(
        client: Arc<dyn ChainClient>,
        store: Arc<dyn Store>,
        options: GasBoostOptions,
        record: TransactionRecord,
    ) -> Self {
        let (outcome, _) = watch::channel(None);
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                client,
                store,
                options,
                state: Mutex::new(TxState {
                    record,
                    status: TxStatus::Created,
                    attempts: Vec::new(),
                    rebroadcasts: 0,
                    warned_max_gas_price: false,
                    nonce_consumed_at: None,
                }),
                outcome,
                events,
                poller_started: AtomicBool::new(false),
            }),
        }
    }

    // The lock is never held across an await, so a poisoned guard is still consistent.
    fn state(&self) -> MutexGuard<'_, TxState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn id(&self) -> Uuid {
        self.state().record.id
    }

    pub fn nonce(&self) -> u64 {
        self.state().record.nonce
    }

    pub fn status(&self) -> TxStatus {
        self.state().status
    }

    pub fn gas_price(&self) -> Option<U256> {
        self.state().record.gas_price
    }

    /// Snapshot of the broadcast attempts, oldest first.
    pub fn attempts(&self) -> Vec<InFlightAttempt> {
        self.state().attempts.clone()
    }

    /// Hash of the latest broadcast attempt.
    pub fn hash(&self) -> GasBoostResult<TxHash> {
        self.state().record.tx_hash.ok_or(GasBoostError::HashUnavailable)
    }

    /// Current persisted form.
    pub fn marshal(&self) -> TransactionRecord {
        self.state().record.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TxEvent> {
        self.inner.events.subscribe()
    }

    /// Write the current record to the store under its UUID.
    pub async fn save(&self) -> GasBoostResult<()> {
        let record = self.marshal();
        update_record(self.inner.store.as_ref(), &record.key(), &record).await?;
        Ok(())
    }

    /// Broadcast the transaction and start polling for confirmation.
    ///
    /// Calling `send` on an already broadcast transaction returns its latest hash.
    pub async fn send(&self) -> GasBoostResult<TxHash> {
        if let Some(hash) = self.broadcast_hash() {
            return Ok(hash);
        }

        let record = self.marshal();
        let gas_price = match record.gas_price {
            Some(price) => price,
            None => self.initial_gas_price().await?,
        };
        let gas_limit = match record.gas_limit {
            Some(limit) => limit,
            None => {
                let estimate = self.payload(&record, gas_price, U256::ZERO);
                self.inner.client.estimate_gas(&estimate).await?
            }
        };

        let (hash, gas_price) = self.broadcast_with_retries(&record, gas_price, gas_limit).await?;

        {
            let mut state = self.state();
            state.record.gas_price = Some(gas_price);
            state.record.gas_limit = Some(gas_limit);
            state.record.tx_hash = Some(hash);
            state.attempts.push(InFlightAttempt {
                hash,
                gas_price,
                sent_at: Instant::now(),
                boosted: false,
                confirmed: false,
            });
            state.status = TxStatus::Broadcast;
        }

        metrics::record_tx_sent();
        tracing::info!(
            id = %record.id,
            nonce = record.nonce,
            hash = %hash,
            gas_price = %gas_price,
            "Transaction broadcast"
        );

        self.start_poller();
        self.save().await?;
        self.set_active(true).await?;
        Ok(hash)
    }

    /// Resume polling a rehydrated transaction from its last known hash and price.
    pub fn resume(&self) -> GasBoostResult<()> {
        {
            let mut state = self.state();
            if state.status.is_broadcast() {
                return Ok(());
            }
            let (Some(hash), Some(gas_price)) = (state.record.tx_hash, state.record.gas_price) else {
                return Err(GasBoostError::HashUnavailable);
            };
            if state.record.gas_limit.is_none() {
                return Err(GasBoostError::NotReady(format!(
                    "record {} has no gas limit",
                    state.record.id
                )));
            }
            state.attempts.push(InFlightAttempt {
                hash,
                gas_price,
                sent_at: Instant::now(),
                boosted: false,
                confirmed: false,
            });
            state.status = TxStatus::InFlight;
            tracing::info!(id = %state.record.id, nonce = state.record.nonce, hash = %hash, "Resuming transaction");
        }
        self.start_poller();
        Ok(())
    }

    /// Wait for any attempt to confirm. Safe to call repeatedly and concurrently.
    pub async fn wait(&self) -> GasBoostResult<TxReceipt> {
        if !self.status().is_broadcast() {
            return Err(GasBoostError::HashUnavailable);
        }

        let mut rx = self.inner.outcome.subscribe();
        let outcome = {
            let guard = rx
                .wait_for(Option::is_some)
                .await
                .map_err(|_| GasBoostError::NotReady("confirmation channel closed".into()))?;
            guard.clone()
        };

        match outcome.ok_or(GasBoostError::HashUnavailable)? {
            Outcome::Confirmed(receipt) if !receipt.status => Err(GasBoostError::Reverted {
                hash: receipt.transaction_hash,
            }),
            Outcome::Confirmed(receipt) => Ok(receipt),
            Outcome::Replaced => Err(GasBoostError::NonceConsumed { nonce: self.nonce() }),
        }
    }

    /// Add or clear this transaction in the store's unfinished set.
    async fn set_active(&self, active: bool) -> GasBoostResult<()> {
        let value = if active { json!(now_ms()) } else { Value::Null };
        let mut partial = Map::new();
        partial.insert(self.id().to_string(), value);
        self.inner.store.update(ACTIVE_TX_KEY, Value::Object(partial)).await?;
        Ok(())
    }

    fn broadcast_hash(&self) -> Option<TxHash> {
        let state = self.state();
        if state.status.is_broadcast() {
            state.record.tx_hash
        } else {
            None
        }
    }

    fn payload(&self, record: &TransactionRecord, gas_price: U256, gas_limit: U256) -> TxPayload {
        TxPayload {
            from: record.from,
            to: record.to,
            data: record.data.clone(),
            value: record.value,
            nonce: record.nonce,
            gas_price,
            gas_limit,
            chain_id: self.inner.client.chain_id(),
        }
    }

    async fn initial_gas_price(&self) -> GasBoostResult<U256> {
        let market = self.inner.client.get_gas_price().await?;
        let price = scale_price(market, self.inner.options.initial_tx_gas_price_multiplier).max(market);
        Ok(price.min(self.inner.options.max_gas_price))
    }

    /// Next fee for a replacement attempt. Always strictly above `previous`.
    fn bumped_gas_price(&self, previous: U256, market: U256) -> U256 {
        let multiplied = scale_price(previous, self.inner.options.gas_price_multiplier);
        let bumped = if self.inner.options.compare_market_gas_price {
            multiplied.max(market)
        } else {
            multiplied
        };
        bumped.max(previous.saturating_add(U256::from(1u8)))
    }

    async fn broadcast_with_retries(
        &self,
        record: &TransactionRecord,
        gas_price: U256,
        gas_limit: U256,
    ) -> GasBoostResult<(TxHash, U256)> {
        let options = &self.inner.options;
        let mut price = gas_price;
        let mut attempt = 0u32;

        loop {
            let payload = self.payload(record, price, gas_limit);
            match self.inner.client.send_transaction(&payload).await {
                Ok(hash) => return Ok((hash, price)),
                Err(BlockchainError::NonceTooLow(message)) => {
                    return Err(GasBoostError::NonceTooLow {
                        nonce: record.nonce,
                        message,
                    });
                }
                // An earlier try of this exact payload reached the node.
                Err(BlockchainError::AlreadyKnown(_)) => {
                    let hash = self.inner.client.transaction_hash(&payload).await?;
                    tracing::info!(id = %record.id, nonce = record.nonce, hash = %hash, "Broadcast already known to node");
                    return Ok((hash, price));
                }
                Err(e) if e.is_retryable() && attempt < options.max_send_retries => {
                    attempt += 1;
                    if matches!(e, BlockchainError::Underpriced(_)) {
                        let factor = options.gas_price_multiplier * f64::from(attempt);
                        price = scale_price(gas_price, factor).max(price).min(options.max_gas_price);
                    }
                    let delay = retry_delay(attempt, RETRY_BASE, RETRY_MAX);
                    tracing::warn!(
                        id = %record.id,
                        nonce = record.nonce,
                        attempt,
                        error = %e,
                        delay_ms = delay.as_millis() as u64,
                        "Broadcast failed, retrying"
                    );
                    sleep(delay).await;
                }
                // The node may hold the payload; poll it and let boosting replace it if not.
                Err(BlockchainError::Timeout(secs)) => {
                    let hash = self.inner.client.transaction_hash(&payload).await?;
                    tracing::warn!(
                        id = %record.id,
                        nonce = record.nonce,
                        hash = %hash,
                        timeout_secs = secs,
                        "Broadcast unanswered, tracking payload as possibly sent"
                    );
                    return Ok((hash, price));
                }
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn start_poller(&self) {
        if self.inner.poller_started.swap(true, Ordering::SeqCst) {
            return;
        }
        let tx = self.clone();
        tokio::spawn(async move { tx.poll_loop().await });
    }

    async fn poll_loop(self) {
        {
            let mut state = self.state();
            if state.status == TxStatus::Broadcast {
                state.status = TxStatus::InFlight;
            }
        }

        loop {
            sleep(self.inner.options.poll_interval).await;
            if self.status().is_final() {
                break;
            }
            if let Err(e) = self.poll_once().await {
                tracing::warn!(id = %self.id(), error = %e, "Transaction poll failed");
            }
            if self.status().is_final() {
                break;
            }
        }
    }

    async fn poll_once(&self) -> GasBoostResult<()> {
        let hashes: Vec<TxHash> = self.state().attempts.iter().rev().map(|a| a.hash).collect();
        for hash in hashes {
            if let Some(receipt) = self.inner.client.get_transaction_receipt(hash).await? {
                self.handle_confirmation(receipt).await;
                return Ok(());
            }
        }

        let consumed_at = self.state().nonce_consumed_at;
        if let Some(at) = consumed_at {
            // Keep watching our hashes for a while, but stop sending.
            if at.elapsed() >= NONCE_CONSUMED_GRACE {
                self.handle_replaced().await;
            }
            return Ok(());
        }

        let latest = self.state().attempts.last().cloned();
        let Some(latest) = latest else {
            return Ok(());
        };
        if latest.sent_at.elapsed() < self.inner.options.time_til_boost {
            return Ok(());
        }
        self.boost(latest).await
    }

    async fn boost(&self, latest: InFlightAttempt) -> GasBoostResult<()> {
        let market = self.inner.client.get_gas_price().await?;
        let bumped = self.bumped_gas_price(latest.gas_price, market);
        let max_gas_price = self.inner.options.max_gas_price;

        if bumped > max_gas_price {
            let first_warning = {
                let mut state = self.state();
                !std::mem::replace(&mut state.warned_max_gas_price, true)
            };
            if first_warning {
                tracing::warn!(
                    id = %self.id(),
                    gas_price = %bumped,
                    max_gas_price = %max_gas_price,
                    "Boost skipped, max gas price reached"
                );
                metrics::record_max_gas_price_reached();
                let _ = self.inner.events.send(TxEvent::MaxGasPriceReached {
                    gas_price: bumped,
                    max_gas_price,
                });
            }
            return self.rebroadcast(latest).await;
        }

        let record = self.marshal();
        let gas_limit = record.gas_limit.unwrap_or_default();
        let payload = self.payload(&record, bumped, gas_limit);
        let hash = match self.inner.client.send_transaction(&payload).await {
            Ok(hash) => hash,
            Err(BlockchainError::NonceTooLow(message)) => {
                self.mark_nonce_consumed(&message);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let boost_index = {
            let mut state = self.state();
            if state.status.is_final() {
                return Ok(());
            }
            if let Some(previous) = state.attempts.iter_mut().find(|a| a.hash == latest.hash) {
                previous.boosted = true;
            }
            state.attempts.push(InFlightAttempt {
                hash,
                gas_price: bumped,
                sent_at: Instant::now(),
                boosted: false,
                confirmed: false,
            });
            state.record.gas_price = Some(bumped);
            state.record.tx_hash = Some(hash);
            state.status = TxStatus::Boosted;
            state.rebroadcasts = 0;
            state.warned_max_gas_price = false;
            state.attempts.len() - 1
        };

        metrics::record_tx_boosted();
        tracing::info!(
            id = %record.id,
            nonce = record.nonce,
            hash = %hash,
            previous_gas_price = %latest.gas_price,
            gas_price = %bumped,
            boost_index,
            "Transaction boosted"
        );
        let _ = self.inner.events.send(TxEvent::Boosted {
            hash,
            gas_price: bumped,
            boost_index,
        });

        self.save().await
    }

    /// Re-send the latest attempt unchanged while boosting is capped.
    async fn rebroadcast(&self, latest: InFlightAttempt) -> GasBoostResult<()> {
        if self.state().rebroadcasts >= self.inner.options.max_rebroadcasts {
            return Ok(());
        }

        let record = self.marshal();
        let payload = self.payload(&record, latest.gas_price, record.gas_limit.unwrap_or_default());
        match self.inner.client.send_transaction(&payload).await {
            Ok(_) | Err(BlockchainError::AlreadyKnown(_)) => {}
            Err(BlockchainError::NonceTooLow(message)) => {
                self.mark_nonce_consumed(&message);
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        }

        let mut state = self.state();
        state.rebroadcasts += 1;
        if let Some(attempt) = state.attempts.iter_mut().find(|a| a.hash == latest.hash) {
            attempt.sent_at = Instant::now();
        }
        metrics::record_tx_rebroadcast();
        tracing::debug!(id = %record.id, hash = %latest.hash, count = state.rebroadcasts, "Transaction rebroadcast");
        Ok(())
    }

    /// Stop sending once the node reports the nonce as used. Either one of
    /// our attempts was mined and its receipt shows up on a later poll, or a
    /// foreign transaction took the nonce.
    fn mark_nonce_consumed(&self, message: &str) {
        let first = {
            let mut state = self.state();
            let first = state.nonce_consumed_at.is_none();
            state.nonce_consumed_at.get_or_insert_with(Instant::now);
            first
        };
        if first {
            let record = self.marshal();
            tracing::warn!(
                id = %record.id,
                nonce = record.nonce,
                %message,
                grace_secs = NONCE_CONSUMED_GRACE.as_secs(),
                "Nonce already used, waiting for a receipt before giving up"
            );
        }
    }

    async fn handle_replaced(&self) {
        let record = {
            let mut state = self.state();
            if state.status.is_final() {
                return;
            }
            state.status = TxStatus::Replaced;
            state.record.clone()
        };

        tracing::error!(
            id = %record.id,
            nonce = record.nonce,
            "Nonce consumed by another transaction, giving up"
        );
        self.inner.outcome.send_replace(Some(Outcome::Replaced));
        let _ = self.inner.events.send(TxEvent::Replaced { nonce: record.nonce });

        if let Err(e) = self.set_active(false).await {
            tracing::warn!(id = %record.id, error = %e, "Failed to clear replaced transaction");
        }
    }

    /// Mark the transaction confirmed. Only the first receipt has any effect.
    async fn handle_confirmation(&self, receipt: TxReceipt) {
        let record = {
            let mut state = self.state();
            if state.status.is_final() {
                return;
            }
            state.status = TxStatus::Confirmed;
            for attempt in state.attempts.iter_mut() {
                attempt.confirmed = attempt.hash == receipt.transaction_hash;
            }
            state.record.tx_hash = Some(receipt.transaction_hash);
            let confirmed_price = state.attempts.iter().find(|a| a.confirmed).map(|a| a.gas_price);
            if let Some(gas_price) = confirmed_price {
                state.record.gas_price = Some(gas_price);
            }
            state.record.clone()
        };

        metrics::record_tx_confirmed();
        tracing::info!(
            id = %record.id,
            nonce = record.nonce,
            hash = %receipt.transaction_hash,
            block = ?receipt.block_number,
            success = receipt.status,
            "Transaction confirmed"
        );

        self.inner.outcome.send_replace(Some(Outcome::Confirmed(receipt.clone())));
        let _ = self.inner.events.send(TxEvent::Confirmed(receipt));

        if let Err(e) = update_record(self.inner.store.as_ref(), &record.key(), &record).await {
            tracing::warn!(id = %record.id, error = %e, "Failed to persist confirmed transaction");
        }
        if let Err(e) = self.set_active(false).await {
            tracing::warn!(id = %record.id, error = %e, "Failed to clear confirmed transaction");
        }
    }
}

impl std::fmt::Debug for GasBoostTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state();
        f.debug_struct("GasBoostTransaction")
            .field("id", &state.record.id)
            .field("nonce", &state.record.nonce)
            .field("status", &state.status)
            .field("attempts", &state.attempts.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::blockchain::BlockchainResult;
    use crate::gasboost::record::TransactionRequest;
    use crate::store::MemoryStore;
    use alloy::primitives::{keccak256, Address, Bytes};
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::time::Duration;

    const GWEI: u64 = 1_000_000_000;

    #[derive(Default)]
    struct FakeChain {
        gas_price: Mutex<U256>,
        sent: Mutex<Vec<TxPayload>>,
        receipts: Mutex<HashMap<TxHash, TxReceipt>>,
        /// Reject every send after the first as `NonceTooLow`.
        nonce_taken: AtomicBool,
    }

    impl FakeChain {
        fn with_gas_price(gwei: u64) -> Arc<Self> {
            let chain = Self::default();
            *chain.gas_price.lock().unwrap() = U256::from(gwei * GWEI);
            Arc::new(chain)
        }

        fn sent(&self) -> Vec<TxPayload> {
            self.sent.lock().unwrap().clone()
        }

        fn confirm(&self, hash: TxHash) {
            self.receipts.lock().unwrap().insert(
                hash,
                TxReceipt {
                    transaction_hash: hash,
                    block_number: Some(1),
                    status: true,
                },
            );
        }
    }

    #[async_trait]
    impl ChainClient for FakeChain {
        fn address(&self) -> Address {
            Address::repeat_byte(0x11)
        }

        fn chain_id(&self) -> u64 {
            31337
        }

        async fn get_transaction_count(&self, _address: Address) -> BlockchainResult<u64> {
            Ok(0)
        }

        async fn get_gas_price(&self) -> BlockchainResult<U256> {
            Ok(*self.gas_price.lock().unwrap())
        }

        async fn estimate_gas(&self, _tx: &TxPayload) -> BlockchainResult<U256> {
            Ok(U256::from(50_000u64))
        }

        async fn send_transaction(&self, tx: &TxPayload) -> BlockchainResult<TxHash> {
            let taken = {
                let mut sent = self.sent.lock().unwrap();
                sent.push(tx.clone());
                self.nonce_taken.load(Ordering::SeqCst) && sent.len() > 1
            };
            if taken {
                return Err(BlockchainError::NonceTooLow("nonce too low".into()));
            }
            self.transaction_hash(tx).await
        }

        async fn transaction_hash(&self, tx: &TxPayload) -> BlockchainResult<TxHash> {
            let mut seed = tx.nonce.to_be_bytes().to_vec();
            seed.extend_from_slice(&tx.gas_price.to_be_bytes::<32>());
            Ok(keccak256(seed))
        }

        async fn get_transaction_receipt(&self, hash: TxHash) -> BlockchainResult<Option<TxReceipt>> {
            Ok(self.receipts.lock().unwrap().get(&hash).cloned())
        }
    }

    fn options() -> GasBoostOptions {
        GasBoostOptions {
            poll_interval: Duration::from_secs(1),
            time_til_boost: Duration::from_secs(5),
            max_gas_price: U256::from(100 * GWEI),
            ..Default::default()
        }
    }

    fn transaction(chain: Arc<FakeChain>, options: GasBoostOptions) -> GasBoostTransaction {
        let request = TransactionRequest::new(Address::repeat_byte(0x22), Bytes::from_static(b"commit"));
        let record = TransactionRecord::new(chain.address(), request, 7);
        GasBoostTransaction::new(chain, Arc::new(MemoryStore::new()), options, record)
    }

    #[tokio::test(start_paused = true)]
    async fn test_send_resolves_price_and_limit() {
        let chain = FakeChain::with_gas_price(10);
        let tx = transaction(chain.clone(), options());

        assert!(matches!(tx.hash(), Err(GasBoostError::HashUnavailable)));
        assert!(matches!(tx.wait().await, Err(GasBoostError::HashUnavailable)));

        let hash = tx.send().await.unwrap();
        assert_eq!(tx.hash().unwrap(), hash);
        assert_eq!(tx.gas_price(), Some(U256::from(10 * GWEI)));
        assert_eq!(tx.marshal().gas_limit, Some(U256::from(50_000u64)));
        assert_eq!(chain.sent().len(), 1);

        // A second send does not rebroadcast.
        assert_eq!(tx.send().await.unwrap(), hash);
        assert_eq!(chain.sent().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_boost_after_threshold() {
        let chain = FakeChain::with_gas_price(10);
        let tx = transaction(chain.clone(), options());
        let mut events = tx.subscribe();
        tx.send().await.unwrap();

        tokio::time::sleep(Duration::from_secs(7)).await;

        let attempts = tx.attempts();
        assert_eq!(attempts.len(), 2);
        assert!(attempts[0].boosted);
        assert_eq!(attempts[1].gas_price, U256::from(15 * GWEI));
        assert_eq!(tx.status(), TxStatus::Boosted);
        assert!(matches!(events.recv().await.unwrap(), TxEvent::Boosted { boost_index: 1, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_market_price_wins_when_higher() {
        let chain = FakeChain::with_gas_price(10);
        let tx = transaction(chain.clone(), options());
        tx.send().await.unwrap();

        *chain.gas_price.lock().unwrap() = U256::from(40 * GWEI);
        tokio::time::sleep(Duration::from_secs(7)).await;

        assert_eq!(tx.attempts()[1].gas_price, U256::from(40 * GWEI));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cap_skips_boost_and_rebroadcasts() {
        let chain = FakeChain::with_gas_price(90);
        let tx = transaction(chain.clone(), options());
        let mut events = tx.subscribe();
        tx.send().await.unwrap();

        tokio::time::sleep(Duration::from_secs(7)).await;

        assert_eq!(tx.attempts().len(), 1);
        assert!(matches!(events.recv().await.unwrap(), TxEvent::MaxGasPriceReached { .. }));
        // Original broadcast plus one same-fee rebroadcast.
        let sent = chain.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0], sent[1]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rebroadcasts_are_bounded() {
        let chain = FakeChain::with_gas_price(90);
        let mut opts = options();
        opts.max_rebroadcasts = 2;
        let tx = transaction(chain.clone(), opts);
        tx.send().await.unwrap();

        tokio::time::sleep(Duration::from_secs(60)).await;

        assert_eq!(chain.sent().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_resolves_on_confirmation() {
        let chain = FakeChain::with_gas_price(10);
        let tx = transaction(chain.clone(), options());
        let hash = tx.send().await.unwrap();

        let waiter = tokio::spawn({
            let tx = tx.clone();
            async move { tx.wait().await }
        });
        chain.confirm(hash);

        let receipt = waiter.await.unwrap().unwrap();
        assert_eq!(receipt.transaction_hash, hash);
        assert_eq!(tx.status(), TxStatus::Confirmed);
        // Already confirmed: returns immediately.
        assert_eq!(tx.wait().await.unwrap(), receipt);
    }

    #[tokio::test(start_paused = true)]
    async fn test_foreign_nonce_use_ends_in_replaced() {
        let chain = FakeChain::with_gas_price(10);
        chain.nonce_taken.store(true, Ordering::SeqCst);
        let tx = transaction(chain.clone(), options());
        let mut events = tx.subscribe();
        tx.send().await.unwrap();

        // First boost is rejected; nothing else is sent while waiting.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(chain.sent().len(), 2);
        assert_eq!(tx.status(), TxStatus::InFlight);

        tokio::time::sleep(NONCE_CONSUMED_GRACE).await;
        assert_eq!(chain.sent().len(), 2);
        assert_eq!(tx.status(), TxStatus::Replaced);
        assert_eq!(events.recv().await.unwrap(), TxEvent::Replaced { nonce: 7 });
        assert!(matches!(tx.wait().await, Err(GasBoostError::NonceConsumed { nonce: 7 })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_receipt_within_grace_still_confirms() {
        let chain = FakeChain::with_gas_price(10);
        chain.nonce_taken.store(true, Ordering::SeqCst);
        let tx = transaction(chain.clone(), options());
        let hash = tx.send().await.unwrap();

        tokio::time::sleep(Duration::from_secs(30)).await;
        chain.confirm(hash);
        tokio::time::sleep(Duration::from_secs(2)).await;

        assert_eq!(tx.status(), TxStatus::Confirmed);
        assert_eq!(tx.wait().await.unwrap().transaction_hash, hash);
    }

    #[tokio::test(start_paused = true)]
    async fn test_resume_requires_broadcast_record() {
        let chain = FakeChain::with_gas_price(10);
        let tx = transaction(chain, options());
        assert!(matches!(tx.resume(), Err(GasBoostError::HashUnavailable)));
    }
}

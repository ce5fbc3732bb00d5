//! Dispatcher and fee-escalation behaviour against an in-process chain.

mod common;

use alloy::primitives::{Address, Bytes, U256};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bonder_node::blockchain::BlockchainError;
use bonder_node::gasboost::record::now_ms;
use bonder_node::gasboost::{
    GasBoostError, GasBoostOptions, GasBoostSigner, NonceRecord, TransactionRecord, TransactionRequest, TxEvent,
    TxStatus, NONCE_KEY,
};
use bonder_node::store::{get_record, update_record, FileStore, MemoryStore, Store};
use common::{gwei, test_options, MockChainClient};

fn request(tag: u8) -> TransactionRequest {
    TransactionRequest::new(Address::repeat_byte(0x22), Bytes::from(vec![tag]))
}

fn signer_with(chain: Arc<MockChainClient>, store: Arc<dyn Store>, options: GasBoostOptions) -> GasBoostSigner {
    GasBoostSigner::new(chain, store, options)
}

async fn seed_nonce(store: &dyn Store, nonce: u64, age: Duration) {
    let record = NonceRecord {
        nonce,
        updated_at: now_ms() - age.as_millis() as u64,
    };
    update_record(store, NONCE_KEY, &record).await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_sends_get_contiguous_nonces() {
    let chain = MockChainClient::new(gwei(10));
    chain.set_pending_count(5);
    chain.set_send_delay(Duration::from_millis(50));
    let signer = Arc::new(signer_with(chain.clone(), Arc::new(MemoryStore::new()), test_options()));

    let mut handles = Vec::new();
    for i in 0..10u8 {
        let signer = signer.clone();
        handles.push(tokio::spawn(async move { signer.send_transaction(request(i)).await }));
    }

    let mut nonces = Vec::new();
    for handle in handles {
        nonces.push(handle.await.unwrap().unwrap().nonce());
    }
    nonces.sort_unstable();

    assert_eq!(nonces, (5..15).collect::<Vec<u64>>());
    assert_eq!(signer.get_nonce().await.unwrap(), 15);

    let sent_nonces: HashSet<u64> = chain.sent().iter().map(|(_, tx)| tx.nonce).collect();
    assert_eq!(sent_nonces.len(), 10);
}

#[tokio::test(start_paused = true)]
async fn test_boosts_strictly_increase_fee_on_same_payload() {
    let chain = MockChainClient::new(gwei(10));
    let signer = signer_with(chain.clone(), Arc::new(MemoryStore::new()), test_options());

    let tx = signer.send_transaction(request(1)).await.unwrap();
    tokio::time::sleep(Duration::from_secs(21)).await;

    let attempts = tx.attempts();
    assert_eq!(attempts.len(), 5);
    for pair in attempts.windows(2) {
        assert!(pair[1].gas_price > pair[0].gas_price);
        assert!(pair[0].boosted);
    }
    assert_eq!(tx.status(), TxStatus::Boosted);

    let sent = chain.sent();
    let first = &sent[0].1;
    for (_, payload) in &sent {
        assert_eq!(payload.nonce, first.nonce);
        assert_eq!(payload.to, first.to);
        assert_eq!(payload.data, first.data);
        assert_eq!(payload.value, first.value);
    }
    assert_eq!(tx.gas_price(), Some(attempts[4].gas_price));
}

#[tokio::test(start_paused = true)]
async fn test_boost_is_skipped_at_gas_cap() {
    let chain = MockChainClient::new(gwei(10));
    let options = GasBoostOptions {
        max_gas_price: gwei(20),
        max_rebroadcasts: 0,
        ..test_options()
    };
    let signer = signer_with(chain.clone(), Arc::new(MemoryStore::new()), options);

    let tx = signer.send_transaction(request(1)).await.unwrap();
    let mut events = tx.subscribe();
    tokio::time::sleep(Duration::from_secs(30)).await;

    // 10 → 15 gwei, then 22.5 would exceed the 20 gwei cap.
    let prices: Vec<U256> = tx.attempts().iter().map(|a| a.gas_price).collect();
    assert_eq!(prices, vec![gwei(10), gwei(15)]);
    assert!(matches!(events.recv().await.unwrap(), TxEvent::Boosted { .. }));
    assert!(matches!(events.recv().await.unwrap(), TxEvent::MaxGasPriceReached { .. }));
    assert_ne!(tx.status(), TxStatus::Confirmed);
}

#[tokio::test(start_paused = true)]
async fn test_first_confirmation_wins() {
    let chain = MockChainClient::new(gwei(10));
    let signer = signer_with(chain.clone(), Arc::new(MemoryStore::new()), test_options());

    let tx = signer.send_transaction(request(1)).await.unwrap();
    let mut events = tx.subscribe();
    tokio::time::sleep(Duration::from_secs(6)).await;
    assert_eq!(tx.attempts().len(), 2);

    // Both attempts report a receipt.
    for attempt in tx.attempts() {
        chain.confirm(attempt.hash);
    }

    let receipt = tx.wait().await.unwrap();
    tokio::time::sleep(Duration::from_secs(10)).await;

    assert_eq!(tx.status(), TxStatus::Confirmed);
    let confirmed: Vec<_> = tx.attempts().into_iter().filter(|a| a.confirmed).collect();
    assert_eq!(confirmed.len(), 1);
    assert_eq!(confirmed[0].hash, receipt.transaction_hash);
    assert_eq!(tx.hash().unwrap(), receipt.transaction_hash);

    let mut confirmations = 0;
    while let Ok(event) = events.try_recv() {
        if matches!(event, TxEvent::Confirmed(_)) {
            confirmations += 1;
        }
    }
    assert_eq!(confirmations, 1);

    // Polling stopped: no further boosts after confirmation.
    assert_eq!(tx.attempts().len(), 2);
    assert_eq!(tx.wait().await.unwrap(), receipt);
}

#[tokio::test(start_paused = true)]
async fn test_stale_nonce_is_reconciled_with_chain() {
    let chain = MockChainClient::new(gwei(10));
    chain.set_pending_count(8);
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    seed_nonce(store.as_ref(), 5, Duration::from_secs(10 * 60)).await;

    let signer = signer_with(chain, store, test_options());
    signer.ready().await.unwrap();
    assert_eq!(signer.get_nonce().await.unwrap(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_fresh_nonce_is_kept_unless_forced() {
    let chain = MockChainClient::new(gwei(10));
    chain.set_pending_count(8);

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    seed_nonce(store.as_ref(), 5, Duration::from_secs(30)).await;
    let signer = signer_with(chain.clone(), store, test_options());
    signer.ready().await.unwrap();
    assert_eq!(signer.get_nonce().await.unwrap(), 5);

    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    seed_nonce(store.as_ref(), 5, Duration::from_secs(30)).await;
    let forced = GasBoostOptions {
        set_latest_nonce_on_start: true,
        ..test_options()
    };
    let signer = signer_with(chain, store, forced);
    signer.ready().await.unwrap();
    assert_eq!(signer.get_nonce().await.unwrap(), 8);
}

#[tokio::test(start_paused = true)]
async fn test_nonce_too_low_still_advances_nonce() {
    let chain = MockChainClient::new(gwei(10));
    chain.set_pending_count(5);
    chain.fail_next_send(BlockchainError::NonceTooLow("nonce too low".into()));
    let signer = signer_with(chain.clone(), Arc::new(MemoryStore::new()), test_options());

    let err = signer.send_transaction(request(1)).await.unwrap_err();
    assert!(matches!(err, GasBoostError::NonceTooLow { nonce: 5, .. }));
    assert_eq!(signer.get_nonce().await.unwrap(), 6);

    let tx = signer.send_transaction(request(2)).await.unwrap();
    assert_eq!(tx.nonce(), 6);
}

#[tokio::test(start_paused = true)]
async fn test_other_errors_leave_nonce_and_store_untouched() {
    let chain = MockChainClient::new(gwei(10));
    chain.set_pending_count(5);
    chain.fail_next_send(BlockchainError::InvalidInput("bad payload".into()));
    let store = Arc::new(MemoryStore::new());
    let signer = signer_with(chain.clone(), store.clone(), test_options());

    let err = signer.send_transaction(request(1)).await.unwrap_err();
    assert!(matches!(err, GasBoostError::Chain(BlockchainError::InvalidInput(_))));
    assert_eq!(signer.get_nonce().await.unwrap(), 5);
    // Only the nonce record exists.
    assert_eq!(store.len(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_underpriced_send_is_retried_at_higher_fee() {
    let chain = MockChainClient::new(gwei(10));
    chain.fail_next_send(BlockchainError::Underpriced("transaction underpriced".into()));
    let signer = signer_with(chain.clone(), Arc::new(MemoryStore::new()), test_options());

    let tx = signer.send_transaction(request(1)).await.unwrap();
    assert_eq!(tx.gas_price(), Some(gwei(15)));
    assert_eq!(chain.sent().len(), 1);
    assert_eq!(signer.get_nonce().await.unwrap(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_record_is_persisted_and_resumable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bonder.json");
    let chain = MockChainClient::new(gwei(10));

    let store: Arc<dyn Store> = Arc::new(FileStore::open(&path).await.unwrap());
    let signer = signer_with(chain.clone(), store.clone(), test_options());
    let tx = signer.send_transaction(request(7)).await.unwrap();
    let id = tx.id();
    let hash = tx.hash().unwrap();

    let record: TransactionRecord = get_record(store.as_ref(), &id.to_string()).await.unwrap().unwrap();
    assert_eq!(record.tx_hash, Some(hash));
    assert_eq!(record.gas_price, Some(gwei(10)));
    assert_eq!(record.nonce, 0);

    // A fresh process reading the same file.
    let reopened: Arc<dyn Store> = Arc::new(FileStore::open(&path).await.unwrap());
    let restarted = signer_with(chain.clone(), reopened, test_options());
    assert_eq!(restarted.get_nonce().await.unwrap(), 1);

    let resumed = restarted.resume_transaction(id).await.unwrap();
    assert_eq!(resumed.nonce(), 0);
    assert_eq!(resumed.attempts()[0].gas_price, gwei(10));

    chain.confirm(hash);
    let receipt = resumed.wait().await.unwrap();
    assert_eq!(receipt.transaction_hash, hash);
}

#[tokio::test(start_paused = true)]
async fn test_resume_unknown_id_fails() {
    let chain = MockChainClient::new(gwei(10));
    let signer = signer_with(chain, Arc::new(MemoryStore::new()), test_options());
    let id = uuid::Uuid::new_v4();
    assert!(matches!(
        signer.resume_transaction(id).await,
        Err(GasBoostError::NotFound(missing)) if missing == id
    ));
}

#[tokio::test(start_paused = true)]
async fn test_timed_out_broadcast_that_reached_node_is_tracked() {
    let chain = MockChainClient::new(gwei(10));
    chain.accept_next_then_time_out();
    let signer = signer_with(chain.clone(), Arc::new(MemoryStore::new()), test_options());

    let tx = signer.send_transaction(request(1)).await.unwrap();
    let sent = chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(tx.hash().unwrap(), sent[0].0);
    assert!(tx.status().is_broadcast());
    assert_eq!(signer.get_nonce().await.unwrap(), 1);

    let next = signer.send_transaction(request(2)).await.unwrap();
    assert_eq!(next.nonce(), 1);

    chain.confirm(sent[0].0);
    assert_eq!(tx.wait().await.unwrap().transaction_hash, sent[0].0);
}

#[tokio::test(start_paused = true)]
async fn test_unanswered_broadcast_is_boosted_not_dropped() {
    let chain = MockChainClient::new(gwei(10));
    let options = GasBoostOptions {
        max_send_retries: 2,
        ..test_options()
    };
    for _ in 0..3 {
        chain.fail_next_send(BlockchainError::Timeout(10));
    }
    let signer = signer_with(chain.clone(), Arc::new(MemoryStore::new()), options);

    let tx = signer.send_transaction(request(1)).await.unwrap();
    assert!(tx.status().is_broadcast());
    assert!(chain.sent().is_empty());
    assert_eq!(signer.get_nonce().await.unwrap(), 1);

    // The node never saw it, so the first boost is the first real broadcast.
    tokio::time::sleep(Duration::from_secs(7)).await;
    let sent = chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].1.nonce, 0);
    assert_eq!(sent[0].1.gas_price, gwei(15));
}

#[tokio::test(start_paused = true)]
async fn test_unfinished_transactions_resume_after_restart() {
    let chain = MockChainClient::new(gwei(10));
    let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
    let signer = signer_with(chain.clone(), store.clone(), test_options());

    let a = signer.send_transaction(request(1)).await.unwrap();
    let a_hash = a.hash().unwrap();
    let b = signer.send_transaction(request(2)).await.unwrap();
    chain.confirm(b.hash().unwrap());
    b.wait().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let restarted = signer_with(chain.clone(), store.clone(), test_options());
    restarted.ready().await.unwrap();
    let resumed = restarted.resume_active().await.unwrap();
    assert_eq!(resumed.len(), 1);
    assert_eq!(resumed[0].id(), a.id());
    assert_eq!(resumed[0].nonce(), 0);

    chain.confirm(a_hash);
    resumed[0].wait().await.unwrap();
    tokio::time::sleep(Duration::from_secs(2)).await;

    let again = signer_with(chain, store, test_options());
    again.ready().await.unwrap();
    assert!(again.resume_active().await.unwrap().is_empty());
}

//! Nonce-safe dispatcher.
//!
//! Every send holds one lock across read-nonce, build, broadcast and
//! increment, so concurrent callers never observe the same nonce. The lock is
//! released once the node accepts the broadcast, not on confirmation.
//!
//! The nonce lives in the store under [`NONCE_KEY`]. On construction the
//! signer reconciles it with the chain's pending count when the record is
//! missing, older than the freshness window, or reconciliation is forced.
//!
//! Broadcast transactions that have not reached a final state are listed
//! under [`ACTIVE_TX_KEY`] so a restarted node can pick them up again with
//! [`GasBoostSigner::resume_active`].

use alloy::primitives::Address;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::{watch, Mutex};
use uuid::Uuid;

use crate::blockchain::ChainClient;
use crate::gasboost::error::{GasBoostError, GasBoostResult};
use crate::gasboost::factory::TransactionFactory;
use crate::gasboost::options::GasBoostOptions;
use crate::gasboost::record::{now_ms, NonceRecord, TransactionRequest, ACTIVE_TX_KEY, NONCE_KEY};
use crate::gasboost::transaction::GasBoostTransaction;
use crate::observability::metrics;
use crate::store::{get_record, update_record, Store};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Readiness {
    Pending,
    Ready,
    Failed(String),
}

pub struct GasBoostSigner {
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    factory: TransactionFactory,
    send_lock: Mutex<()>,
    ready: watch::Receiver<Readiness>,
}

impl GasBoostSigner {
    /// Create the signer and start nonce reconciliation in the background.
    ///
    /// Must be called inside a Tokio runtime. Sends wait for reconciliation.
    pub fn new(client: Arc<dyn ChainClient>, store: Arc<dyn Store>, options: GasBoostOptions) -> Self {
        let factory = TransactionFactory::new(client.clone(), store.clone(), options.clone());
        let (ready_tx, ready) = watch::channel(Readiness::Pending);

        let init_client = client.clone();
        let init_store = store.clone();
        tokio::spawn(async move {
            let state = match reconcile_nonce(init_client.as_ref(), init_store.as_ref(), &options).await {
                Ok(()) => Readiness::Ready,
                Err(e) => {
                    tracing::error!(error = %e, "Nonce reconciliation failed");
                    Readiness::Failed(e.to_string())
                }
            };
            ready_tx.send_replace(state);
        });

        Self {
            client,
            store,
            factory,
            send_lock: Mutex::new(()),
            ready,
        }
    }

    pub fn address(&self) -> Address {
        self.client.address()
    }

    pub fn factory(&self) -> &TransactionFactory {
        &self.factory
    }

    /// Resolve once startup reconciliation has finished.
    pub async fn ready(&self) -> GasBoostResult<()> {
        let mut rx = self.ready.clone();
        let state = rx
            .wait_for(|s| *s != Readiness::Pending)
            .await
            .map_err(|_| GasBoostError::NotReady("initialization aborted".into()))?
            .clone();
        match state {
            Readiness::Failed(message) => Err(GasBoostError::NotReady(message)),
            _ => Ok(()),
        }
    }

    /// Allocate a nonce, broadcast, and advance the nonce.
    ///
    /// A `NonceTooLow` rejection still advances the nonce before the error is
    /// returned. Other errors leave the nonce untouched unless the broadcast
    /// itself succeeded.
    pub async fn send_transaction(&self, request: TransactionRequest) -> GasBoostResult<GasBoostTransaction> {
        self.ready().await?;
        let _guard = self.send_lock.lock().await;

        let nonce = self.get_nonce().await?;
        let tx = self.factory.create_transaction(request, nonce);
        let result = tx.send().await;

        let consumed = tx.status().is_broadcast() || matches!(result, Err(GasBoostError::NonceTooLow { .. }));
        if consumed {
            self.inc_nonce(nonce).await?;
        }

        match result {
            Ok(_) => Ok(tx),
            Err(e) => {
                tracing::warn!(nonce, id = %tx.id(), error = %e, "Send failed");
                Err(e)
            }
        }
    }

    /// The persisted next nonce.
    pub async fn get_nonce(&self) -> GasBoostResult<u64> {
        let record: NonceRecord = get_record(self.store.as_ref(), NONCE_KEY)
            .await?
            .ok_or_else(|| GasBoostError::NotReady("nonce record missing".into()))?;
        Ok(record.nonce)
    }

    /// Rehydrate a persisted transaction and resume boosting it.
    pub async fn resume_transaction(&self, id: Uuid) -> GasBoostResult<GasBoostTransaction> {
        let tx = self.factory.from_id(id).await?;
        tx.resume()?;
        Ok(tx)
    }

    /// Resume every transaction still listed as unfinished.
    ///
    /// Finished entries are dropped from the list first. Ids that can no
    /// longer be resumed are logged and dropped too.
    pub async fn resume_active(&self) -> GasBoostResult<Vec<GasBoostTransaction>> {
        let listed: BTreeMap<String, Option<u64>> = get_record(self.store.as_ref(), ACTIVE_TX_KEY)
            .await?
            .unwrap_or_default();
        let live: Map<String, Value> = listed
            .into_iter()
            .filter_map(|(id, sent_at)| sent_at.map(|t| (id, Value::from(t))))
            .collect();

        self.store.delete_item(ACTIVE_TX_KEY).await?;
        if live.is_empty() {
            return Ok(Vec::new());
        }
        self.store.update(ACTIVE_TX_KEY, Value::Object(live.clone())).await?;

        let mut resumed = Vec::with_capacity(live.len());
        for key in live.keys() {
            let result = match Uuid::parse_str(key) {
                Ok(id) => self.resume_transaction(id).await,
                Err(_) => Err(GasBoostError::NotReady(format!("malformed transaction id {}", key))),
            };
            match result {
                Ok(tx) => resumed.push(tx),
                Err(e) => {
                    tracing::warn!(id = %key, error = %e, "Dropping unresumable transaction");
                    let mut partial = Map::new();
                    partial.insert(key.clone(), Value::Null);
                    self.store.update(ACTIVE_TX_KEY, Value::Object(partial)).await?;
                }
            }
        }
        Ok(resumed)
    }

    async fn inc_nonce(&self, used: u64) -> GasBoostResult<()> {
        let next = used + 1;
        update_record(
            self.store.as_ref(),
            NONCE_KEY,
            &NonceRecord {
                nonce: next,
                updated_at: now_ms(),
            },
        )
        .await?;
        metrics::record_nonce(next);
        Ok(())
    }
}

async fn reconcile_nonce(client: &dyn ChainClient, store: &dyn Store, options: &GasBoostOptions) -> GasBoostResult<()> {
    let record: Option<NonceRecord> = get_record(store, NONCE_KEY).await?;
    let now = now_ms();
    let freshness_ms = options.nonce_freshness.as_millis() as u64;

    let stale = match &record {
        Some(r) => now.saturating_sub(r.updated_at) > freshness_ms,
        None => true,
    };
    if !stale && !options.set_latest_nonce_on_start {
        if let Some(r) = record {
            tracing::info!(nonce = r.nonce, "Using persisted nonce");
            metrics::record_nonce(r.nonce);
        }
        return Ok(());
    }

    let nonce = client.get_transaction_count(client.address()).await?;
    update_record(store, NONCE_KEY, &NonceRecord { nonce, updated_at: now }).await?;
    metrics::record_nonce(nonce);
    tracing::info!(
        address = %client.address(),
        previous = ?record.map(|r| r.nonce),
        nonce,
        "Nonce reconciled with chain"
    );
    Ok(())
}

//! Commit-transfers watcher.
//!
//! # Per destination chain
//! ```text
//! Idle → Accumulating → Committing → Idle
//! ```
//!
//! Transfer events and the poll timer both funnel into
//! [`CommitTransfersWatcher::trigger_commit_check`], which the per-chain
//! throttle collapses to at most one running check per window. A check reads
//! the authoritative pending list from the bridge, persists the root record,
//! then submits `commitTransfers` through the dispatcher.

use alloy::primitives::{TxHash, B256, U256};
use futures_util::StreamExt;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{broadcast, OnceCell};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use uuid::Uuid;

use crate::bridge::{
    commit_transfers, event_batches, BridgeEvent, BridgeFacade, EventFilter, TransferSentEvent,
};
use crate::config::CommitWatcherConfig;
use crate::gasboost::record::now_ms;
use crate::gasboost::{GasBoostSigner, GasBoostTransaction};
use crate::lifecycle::Shutdown;
use crate::merkle::compute_root;
use crate::observability::metrics;
use crate::store::Store;
use crate::watchers::db::{TransferRecord, TransferRootRecord, WatcherDb};
use crate::watchers::reconcile::{get_recent_transfer_hashes_for_committed_roots, RootReconciliation};
use crate::watchers::throttle::CommitThrottle;
use crate::watchers::{WatcherError, WatcherResult};

const EVENT_CAPACITY: usize = 64;

/// Emitted once a commit transaction confirms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitTransfersEvent {
    pub destination_chain_id: u64,
    pub root_hash: B256,
    pub transfer_hashes: Vec<B256>,
}

/// Result of one commit check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    /// A previous commit is still unconfirmed.
    InFlight,
    BelowThreshold { pending_amount: U256 },
    NothingPending,
    DryRun { root_hash: B256 },
    Submitted { root_hash: B256, tx_id: Uuid },
}

struct Inner {
    bridge: Arc<dyn BridgeFacade>,
    signer: Arc<GasBoostSigner>,
    db: WatcherDb,
    config: CommitWatcherConfig,
    min_thresholds: HashMap<u64, U256>,
    throttle: Arc<CommitThrottle>,
    pending: Mutex<BTreeMap<u64, Vec<B256>>>,
    commit_sent_at: Mutex<HashMap<u64, Instant>>,
    source_chain_id: OnceCell<u64>,
    events: broadcast::Sender<CommitTransfersEvent>,
}

#[derive(Clone)]
pub struct CommitTransfersWatcher {
    inner: Arc<Inner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Parse `chain id -> decimal wei` thresholds.
pub fn parse_min_thresholds(raw: &BTreeMap<String, String>) -> WatcherResult<HashMap<u64, U256>> {
    raw.iter()
        .map(|(chain, amount)| {
            let chain_id = chain
                .parse::<u64>()
                .map_err(|e| WatcherError::Config(format!("threshold chain id '{}': {}", chain, e)))?;
            let amount = U256::from_str_radix(amount, 10)
                .map_err(|e| WatcherError::Config(format!("threshold amount '{}': {}", amount, e)))?;
            Ok((chain_id, amount))
        })
        .collect()
}

impl CommitTransfersWatcher {
    pub fn new(
        bridge: Arc<dyn BridgeFacade>,
        signer: Arc<GasBoostSigner>,
        store: Arc<dyn Store>,
        config: CommitWatcherConfig,
    ) -> WatcherResult<Self> {
        let min_thresholds = parse_min_thresholds(&config.min_threshold_amounts)?;
        let pending = config
            .destination_chain_ids
            .iter()
            .map(|id| (*id, Vec::new()))
            .collect();
        let (events, _) = broadcast::channel(EVENT_CAPACITY);

        Ok(Self {
            inner: Arc::new(Inner {
                bridge,
                signer,
                db: WatcherDb::new(store),
                throttle: CommitThrottle::new(Duration::from_millis(config.throttle_ms)),
                min_thresholds,
                config,
                pending: Mutex::new(pending),
                commit_sent_at: Mutex::new(HashMap::new()),
                source_chain_id: OnceCell::new(),
                events,
            }),
        })
    }

    pub fn subscribe(&self) -> broadcast::Receiver<CommitTransfersEvent> {
        self.inner.events.subscribe()
    }

    pub fn db(&self) -> &WatcherDb {
        &self.inner.db
    }

    /// Locally observed pending transfers for a destination, in arrival order.
    pub fn pending_transfers(&self, chain_id: u64) -> Vec<B256> {
        lock(&self.inner.pending).get(&chain_id).cloned().unwrap_or_default()
    }

    pub fn tracked_chains(&self) -> Vec<u64> {
        lock(&self.inner.pending).keys().copied().collect()
    }

    async fn source_chain_id(&self) -> WatcherResult<u64> {
        let bridge = &self.inner.bridge;
        let id = self
            .inner
            .source_chain_id
            .get_or_try_init(|| async { bridge.source_chain_id().await })
            .await?;
        Ok(*id)
    }

    async fn safe_head(&self) -> WatcherResult<u64> {
        let head = self.inner.bridge.latest_block().await?;
        Ok(head.saturating_sub(self.inner.bridge.chain_family().confirmation_depth()))
    }

    /// Run until shutdown: sync events, then trigger checks for every tracked destination.
    pub async fn run(self, shutdown: Shutdown) -> WatcherResult<()> {
        let mut stop = shutdown.subscribe();
        let source_chain_id = self.source_chain_id().await?;
        let safe_head = self.safe_head().await?;

        let mut next_block = match self.inner.config.start_block {
            Some(start) => {
                if let Err(e) = self.reconcile_range(start, safe_head).await {
                    tracing::warn!(error = %e, "Startup root reconciliation failed");
                }
                start
            }
            None => safe_head + 1,
        };

        tracing::info!(
            bridge = %self.inner.bridge.address(),
            source_chain_id,
            from_block = next_block,
            dry_mode = self.inner.config.dry_mode,
            "Commit transfers watcher started"
        );

        let mut ticker = tokio::time::interval(Duration::from_millis(self.inner.config.poll_interval_ms));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = stop.recv() => {
                    tracing::info!("Commit transfers watcher stopping");
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.sync_events(&mut next_block, source_chain_id).await {
                        tracing::warn!(error = %e, from_block = next_block, "Event sync failed");
                    }
                    self.poll();
                }
            }
        }
    }

    /// Consume finalized events from `next_block` up to the safe head.
    pub async fn sync_events(&self, next_block: &mut u64, source_chain_id: u64) -> WatcherResult<()> {
        let safe_head = self.safe_head().await?;
        if safe_head < *next_block {
            return Ok(());
        }

        let filters = vec![EventFilter::transfer_sent(None), EventFilter::transfers_committed(None)];
        let mut batches = Box::pin(event_batches(
            self.inner.bridge.clone(),
            filters,
            *next_block,
            safe_head,
            self.inner.config.event_batch_size,
        ));

        while let Some(batch) = batches.next().await {
            let batch = batch?;
            for event in &batch.events {
                self.handle_event(event, source_chain_id).await?;
            }
            *next_block = batch.to_block + 1;
        }
        Ok(())
    }

    pub async fn handle_event(&self, event: &BridgeEvent, source_chain_id: u64) -> WatcherResult<()> {
        match event {
            BridgeEvent::TransferSent(e) => self.handle_transfer_sent(e, source_chain_id).await,
            BridgeEvent::TransfersCommitted(e) => {
                // A commit consumes everything pending for the chain up to this point.
                let cleared = {
                    let mut pending = lock(&self.inner.pending);
                    pending.get_mut(&e.destination_chain_id).map(std::mem::take).unwrap_or_default()
                };
                metrics::record_pending_transfers(e.destination_chain_id, 0);
                tracing::info!(
                    chain_id = e.destination_chain_id,
                    root_hash = %e.root_hash,
                    cleared = cleared.len(),
                    "Transfers committed on chain"
                );
                Ok(())
            }
        }
    }

    async fn handle_transfer_sent(&self, event: &TransferSentEvent, source_chain_id: u64) -> WatcherResult<()> {
        let chain_id = event.destination_chain_id;
        let count = {
            let mut pending = lock(&self.inner.pending);
            let list = pending.entry(chain_id).or_default();
            if !list.contains(&event.transfer_id) {
                list.push(event.transfer_id);
            }
            list.len()
        };
        metrics::record_pending_transfers(chain_id, count);

        self.inner
            .db
            .upsert_transfer(&TransferRecord {
                transfer_id: event.transfer_id,
                source_chain_id,
                destination_chain_id: chain_id,
                amount: event.amount,
                tx_hash: event.tx_hash,
                block_number: event.block_number,
                committed: false,
                transfer_root_hash: None,
            })
            .await?;

        tracing::debug!(
            transfer_id = %event.transfer_id,
            chain_id,
            pending = count,
            "Transfer sent"
        );

        self.trigger_commit_check(chain_id);
        Ok(())
    }

    /// Trigger checks for every tracked destination.
    ///
    /// The local list can be empty after a restart while the contract still
    /// holds transfers, so the on-chain pending amount decides instead.
    pub fn poll(&self) -> Vec<JoinHandle<()>> {
        let chains: Vec<u64> = lock(&self.inner.pending).keys().copied().collect();
        chains
            .into_iter()
            .filter_map(|chain_id| self.trigger_commit_check(chain_id))
            .collect()
    }

    /// Start a commit check unless one ran for this chain within the throttle window.
    pub fn trigger_commit_check(&self, chain_id: u64) -> Option<JoinHandle<()>> {
        let Some(guard) = self.inner.throttle.try_begin(chain_id) else {
            tracing::trace!(chain_id, "Commit check throttled");
            return None;
        };

        let watcher = self.clone();
        Some(tokio::spawn(async move {
            let _guard = guard;
            match watcher.check_if_should_commit(chain_id).await {
                Ok(outcome) => tracing::debug!(chain_id, ?outcome, "Commit check finished"),
                Err(e) => tracing::error!(chain_id, error = %e, "Commit check failed"),
            }
        }))
    }

    fn commit_in_flight(&self, chain_id: u64) -> bool {
        let retry_delay = Duration::from_millis(self.inner.config.commit_retry_delay_ms);
        let mut sent_at = lock(&self.inner.commit_sent_at);
        match sent_at.get(&chain_id) {
            Some(at) if at.elapsed() < retry_delay => true,
            Some(_) => {
                sent_at.remove(&chain_id);
                false
            }
            None => false,
        }
    }

    fn clear_commit_sent(&self, chain_id: u64) {
        lock(&self.inner.commit_sent_at).remove(&chain_id);
    }

    pub async fn check_if_should_commit(&self, chain_id: u64) -> WatcherResult<CommitOutcome> {
        if self.commit_in_flight(chain_id) {
            tracing::info!(chain_id, "Commit tx is in mempool");
            return Ok(CommitOutcome::InFlight);
        }

        let bridge = self.inner.bridge.as_ref();

        // On-chain state, since the local view may be incomplete while syncing.
        let pending_amount = bridge.get_pending_amount_for_chain_id(chain_id).await?;
        let threshold = self.inner.min_thresholds.get(&chain_id).copied().unwrap_or_default();
        if pending_amount <= threshold {
            if threshold.is_zero() {
                tracing::debug!(chain_id, "No pending amount");
            } else {
                tracing::warn!(
                    chain_id,
                    pending_amount = %pending_amount,
                    min_threshold = %threshold,
                    "Pending amount below minimum threshold"
                );
            }
            return Ok(CommitOutcome::BelowThreshold { pending_amount });
        }

        let transfer_ids = bridge.get_pending_transfers(chain_id).await?;
        if transfer_ids.is_empty() {
            return Ok(CommitOutcome::NothingPending);
        }

        self.warn_if_force_commit_blocked(chain_id).await?;

        let root_hash = compute_root(&transfer_ids);
        let record = TransferRootRecord {
            root_hash,
            transfer_hashes: transfer_ids.clone(),
            source_chain_id: self.source_chain_id().await?,
            destination_chain_id: chain_id,
            total_amount: pending_amount,
            created_at: now_ms(),
            commit_tx_id: None,
            commit_tx_hash: None,
            committed_at: None,
        };
        self.inner.db.update_transfer_root(&record).await?;
        tracing::info!(
            chain_id,
            root_hash = %root_hash,
            transfers = transfer_ids.len(),
            pending_amount = %pending_amount,
            "Computed transfer root"
        );

        if self.inner.config.dry_mode {
            tracing::warn!(chain_id, root_hash = %root_hash, "Dry mode, skipping commitTransfers");
            return Ok(CommitOutcome::DryRun { root_hash });
        }

        lock(&self.inner.commit_sent_at).insert(chain_id, Instant::now());
        let tx = match commit_transfers(bridge, &self.inner.signer, chain_id).await {
            Ok(tx) => tx,
            Err(e) => {
                self.clear_commit_sent(chain_id);
                return Err(e.into());
            }
        };

        let tx_id = tx.id();
        let tx_hash = tx.hash().ok();
        self.inner.db.set_commit_tx(&root_hash, tx_id, tx_hash).await?;
        metrics::record_commit_submitted(chain_id);
        tracing::info!(
            chain_id,
            root_hash = %root_hash,
            tx_id = %tx_id,
            tx_hash = ?tx_hash,
            "commitTransfers sent"
        );

        self.spawn_confirmation(chain_id, root_hash, transfer_ids, tx);
        Ok(CommitOutcome::Submitted { root_hash, tx_id })
    }

    async fn warn_if_force_commit_blocked(&self, chain_id: u64) -> WatcherResult<()> {
        let bridge = self.inner.bridge.as_ref();
        let last_commit = bridge.get_last_commit_time_for_chain_id(chain_id).await?;
        let delay = bridge.get_minimum_force_commit_delay().await?;
        let is_bonder = bridge.is_bonder().await?;

        let now_secs = now_ms() / 1000;
        if !is_bonder && now_secs < last_commit.saturating_add(delay) {
            tracing::warn!(
                chain_id,
                last_commit,
                min_force_commit_delay = delay,
                "Not a bonder and force commit delay has not elapsed, contract may reject commit"
            );
        }
        Ok(())
    }

    fn spawn_confirmation(&self, chain_id: u64, root_hash: B256, transfer_ids: Vec<B256>, tx: GasBoostTransaction) {
        let watcher = self.clone();
        tokio::spawn(async move {
            let receipt = tx.wait().await;
            watcher.clear_commit_sent(chain_id);
            match receipt {
                Ok(receipt) => {
                    if let Err(e) = watcher
                        .on_commit_confirmed(chain_id, root_hash, transfer_ids, receipt.transaction_hash)
                        .await
                    {
                        tracing::error!(chain_id, root_hash = %root_hash, error = %e, "Failed to record commit");
                    }
                }
                Err(e) => {
                    tracing::error!(chain_id, root_hash = %root_hash, error = %e, "commitTransfers failed");
                }
            }
        });
    }

    async fn on_commit_confirmed(
        &self,
        chain_id: u64,
        root_hash: B256,
        transfer_ids: Vec<B256>,
        tx_hash: TxHash,
    ) -> WatcherResult<()> {
        self.inner.db.mark_root_committed(&root_hash, tx_hash).await?;
        self.inner.db.mark_transfers_committed(&transfer_ids, &root_hash).await?;

        let remaining = {
            let mut pending = lock(&self.inner.pending);
            let list = pending.entry(chain_id).or_default();
            list.retain(|id| !transfer_ids.contains(id));
            list.len()
        };
        metrics::record_pending_transfers(chain_id, remaining);

        tracing::info!(chain_id, root_hash = %root_hash, tx_hash = %tx_hash, "commitTransfers confirmed");
        let _ = self.inner.events.send(CommitTransfersEvent {
            destination_chain_id: chain_id,
            root_hash,
            transfer_hashes: transfer_ids,
        });
        Ok(())
    }

    /// Recompute committed roots in a block range and report mismatches. Never mutates chain state.
    pub async fn reconcile_range(&self, from_block: u64, to_block: u64) -> WatcherResult<Vec<RootReconciliation>> {
        let reports = get_recent_transfer_hashes_for_committed_roots(
            self.inner.bridge.clone(),
            from_block,
            to_block,
            self.inner.config.event_batch_size,
        )
        .await?;

        for report in &reports {
            if let Err(e) = report.check() {
                metrics::record_root_mismatch(report.destination_chain_id);
                tracing::error!(
                    error = %e,
                    transfers = report.transfer_hashes.len(),
                    block = report.committed_block,
                    "Transfer root mismatch, operator attention required"
                );
            }
        }
        Ok(reports)
    }
}

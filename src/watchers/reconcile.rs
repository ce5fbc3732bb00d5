//! Retroactive root verification.
//!
//! Replays `TransferSent` and `TransfersCommitted` events over a block range,
//! regroups transfers per destination chain between consecutive commits, and
//! recomputes each committed root. Results are advisory: mismatches are
//! reported, never corrected or resubmitted.

use alloy::primitives::B256;
use futures_util::StreamExt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::bridge::{event_batches, BridgeEvent, BridgeFacade, EventFilter};
use crate::merkle::compute_root;
use crate::watchers::{WatcherError, WatcherResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootStatus {
    Matched,
    /// Recomputed root differs although the whole batch was observed.
    Mismatch,
    /// The range starts inside the batch, so earlier transfers are missing.
    Incomplete,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootReconciliation {
    pub destination_chain_id: u64,
    pub root_hash: B256,
    pub computed_root: B256,
    pub transfer_hashes: Vec<B256>,
    pub committed_block: u64,
    pub status: RootStatus,
}

impl RootReconciliation {
    /// `Err(RootMismatch)` for a mismatched root.
    pub fn check(&self) -> WatcherResult<()> {
        match self.status {
            RootStatus::Mismatch => Err(WatcherError::RootMismatch {
                chain_id: self.destination_chain_id,
                expected: self.root_hash,
                computed: self.computed_root,
            }),
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
struct PendingBatch {
    transfers: Vec<B256>,
    /// A previous commit for this chain was seen inside the range.
    anchored: bool,
}

/// Pair every commit in `[from_block, to_block]` with the transfers that preceded it.
pub async fn get_recent_transfer_hashes_for_committed_roots(
    bridge: Arc<dyn BridgeFacade>,
    from_block: u64,
    to_block: u64,
    batch_size: u64,
) -> WatcherResult<Vec<RootReconciliation>> {
    let filters = vec![EventFilter::transfer_sent(None), EventFilter::transfers_committed(None)];
    let mut batches = Box::pin(event_batches(bridge, filters, from_block, to_block, batch_size));

    let mut pending: HashMap<u64, PendingBatch> = HashMap::new();
    let mut results = Vec::new();

    while let Some(batch) = batches.next().await {
        for event in batch?.events {
            match event {
                BridgeEvent::TransferSent(e) => {
                    pending
                        .entry(e.destination_chain_id)
                        .or_default()
                        .transfers
                        .push(e.transfer_id);
                }
                BridgeEvent::TransfersCommitted(e) => {
                    let entry = pending.entry(e.destination_chain_id).or_default();
                    let transfer_hashes = std::mem::take(&mut entry.transfers);
                    let computed_root = compute_root(&transfer_hashes);

                    let status = if computed_root == e.root_hash {
                        RootStatus::Matched
                    } else if entry.anchored {
                        RootStatus::Mismatch
                    } else {
                        RootStatus::Incomplete
                    };
                    entry.anchored = true;

                    results.push(RootReconciliation {
                        destination_chain_id: e.destination_chain_id,
                        root_hash: e.root_hash,
                        computed_root,
                        transfer_hashes,
                        committed_block: e.block_number,
                        status,
                    });
                }
            }
        }
    }

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_check_only_fails_on_mismatch() {
        let mut report = RootReconciliation {
            destination_chain_id: 1,
            root_hash: B256::repeat_byte(1),
            computed_root: B256::repeat_byte(2),
            transfer_hashes: vec![],
            committed_block: 3,
            status: RootStatus::Incomplete,
        };
        assert!(report.check().is_ok());

        report.status = RootStatus::Mismatch;
        assert!(matches!(
            report.check(),
            Err(WatcherError::RootMismatch { chain_id: 1, .. })
        ));
    }
}

//! Per-chain throttle for commit checks.
//!
//! A check may start when none is running for the chain and the previous one
//! started at least `window` ago. Concurrent triggers inside the window
//! collapse into the one that won.

use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Default, Clone, Copy)]
struct ChainSlot {
    last_started: Option<Instant>,
    in_progress: bool,
}

#[derive(Debug)]
pub struct CommitThrottle {
    window: Duration,
    slots: DashMap<u64, ChainSlot>,
}

impl CommitThrottle {
    pub fn new(window: Duration) -> Arc<Self> {
        Arc::new(Self {
            window,
            slots: DashMap::new(),
        })
    }

    /// Claim the check for `chain_id`. The claim is released when the guard drops.
    pub fn try_begin(self: &Arc<Self>, chain_id: u64) -> Option<ThrottleGuard> {
        let mut slot = self.slots.entry(chain_id).or_default();
        let now = Instant::now();

        if slot.in_progress {
            return None;
        }
        if let Some(last) = slot.last_started {
            if now.duration_since(last) < self.window {
                return None;
            }
        }

        slot.in_progress = true;
        slot.last_started = Some(now);
        Some(ThrottleGuard {
            throttle: self.clone(),
            chain_id,
        })
    }

    pub fn is_in_progress(&self, chain_id: u64) -> bool {
        self.slots.get(&chain_id).map_or(false, |s| s.in_progress)
    }
}

pub struct ThrottleGuard {
    throttle: Arc<CommitThrottle>,
    chain_id: u64,
}

impl Drop for ThrottleGuard {
    fn drop(&mut self) {
        if let Some(mut slot) = self.throttle.slots.get_mut(&self.chain_id) {
            slot.in_progress = false;
        }
    }
}

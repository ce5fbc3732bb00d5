//! Metrics collection and exposition.
//!
//! # Metrics
//! - `bonder_tx_sent_total` (counter): first broadcasts accepted by the node
//! - `bonder_tx_boosted_total` (counter): fee-bumped replacement broadcasts
//! - `bonder_tx_rebroadcast_total` (counter): same-fee rebroadcasts at the gas cap
//! - `bonder_tx_confirmed_total` (counter): transactions with an observed receipt
//! - `bonder_tx_max_gas_price_reached_total` (counter): boosts skipped by the cap
//! - `bonder_nonce` (gauge): next nonce the dispatcher will assign
//! - `bonder_commit_transfers_total` (counter): commits submitted, by destination chain
//! - `bonder_pending_transfers` (gauge): locally tracked pending transfers, by chain
//! - `bonder_root_mismatch_total` (counter): reconciled roots that did not match

use std::net::SocketAddr;

use metrics::{counter, gauge};
use metrics_exporter_prometheus::PrometheusBuilder;

/// Install the Prometheus exporter and its HTTP listener.
pub fn init_metrics(addr: SocketAddr) {
    match PrometheusBuilder::new().with_http_listener(addr).install() {
        Ok(()) => tracing::info!(address = %addr, "Metrics exporter listening"),
        Err(e) => tracing::error!(error = %e, "Failed to install metrics exporter"),
    }
}

pub fn record_tx_sent() {
    counter!("bonder_tx_sent_total").increment(1);
}

pub fn record_tx_boosted() {
    counter!("bonder_tx_boosted_total").increment(1);
}

pub fn record_tx_rebroadcast() {
    counter!("bonder_tx_rebroadcast_total").increment(1);
}

pub fn record_tx_confirmed() {
    counter!("bonder_tx_confirmed_total").increment(1);
}

pub fn record_max_gas_price_reached() {
    counter!("bonder_tx_max_gas_price_reached_total").increment(1);
}

pub fn record_nonce(nonce: u64) {
    gauge!("bonder_nonce").set(nonce as f64);
}

pub fn record_commit_submitted(chain_id: u64) {
    counter!("bonder_commit_transfers_total", "chain_id" => chain_id.to_string()).increment(1);
}

pub fn record_pending_transfers(chain_id: u64, count: usize) {
    gauge!("bonder_pending_transfers", "chain_id" => chain_id.to_string()).set(count as f64);
}

pub fn record_root_mismatch(chain_id: u64) {
    counter!("bonder_root_mismatch_total", "chain_id" => chain_id.to_string()).increment(1);
}

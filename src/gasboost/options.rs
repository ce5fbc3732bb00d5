//! Runtime tuning for fee escalation.

use alloy::primitives::U256;
use std::time::Duration;

use crate::config::validation::MIN_REPLACEMENT_MULTIPLIER;
use crate::config::GasBoostConfig;
use crate::gasboost::error::{GasBoostError, GasBoostResult};

const WEI_PER_GWEI: f64 = 1_000_000_000.0;
const MULTIPLIER_SCALE: u64 = 10_000;

#[derive(Debug, Clone, PartialEq)]
pub struct GasBoostOptions {
    pub poll_interval: Duration,
    /// Age of the latest attempt after which it is replaced.
    pub time_til_boost: Duration,
    pub gas_price_multiplier: f64,
    pub initial_tx_gas_price_multiplier: f64,
    /// Hard cap in wei. Boosts above it are skipped.
    pub max_gas_price: U256,
    pub compare_market_gas_price: bool,
    pub max_send_retries: u32,
    pub max_rebroadcasts: u32,
    /// Always take the chain's pending count on start.
    pub set_latest_nonce_on_start: bool,
    pub nonce_freshness: Duration,
}

impl GasBoostOptions {
    pub fn from_config(config: &GasBoostConfig) -> GasBoostResult<Self> {
        let options = Self {
            poll_interval: Duration::from_millis(config.poll_ms),
            time_til_boost: Duration::from_millis(config.time_til_boost_ms),
            gas_price_multiplier: config.gas_price_multiplier,
            initial_tx_gas_price_multiplier: config.initial_tx_gas_price_multiplier,
            max_gas_price: gwei_to_wei(config.max_gas_price_gwei)?,
            compare_market_gas_price: config.compare_market_gas_price,
            max_send_retries: config.max_send_retries,
            max_rebroadcasts: config.max_rebroadcasts,
            set_latest_nonce_on_start: config.set_latest_nonce_on_start,
            nonce_freshness: Duration::from_secs(config.nonce_freshness_secs),
        };
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> GasBoostResult<()> {
        if self.poll_interval.is_zero() {
            return Err(GasBoostError::InvalidOptions("poll interval must be non-zero".into()));
        }
        let m = self.gas_price_multiplier;
        if !(m == 1.0 || m >= MIN_REPLACEMENT_MULTIPLIER) {
            return Err(GasBoostError::InvalidOptions(format!(
                "gas price multiplier {} must be 1.0 or at least {}",
                m, MIN_REPLACEMENT_MULTIPLIER
            )));
        }
        if !(self.initial_tx_gas_price_multiplier >= 1.0) {
            return Err(GasBoostError::InvalidOptions(
                "initial gas price multiplier must be at least 1.0".into(),
            ));
        }
        if self.max_gas_price.is_zero() {
            return Err(GasBoostError::InvalidOptions("max gas price must be non-zero".into()));
        }
        Ok(())
    }
}

impl Default for GasBoostOptions {
    fn default() -> Self {
        let config = GasBoostConfig::default();
        Self {
            poll_interval: Duration::from_millis(config.poll_ms),
            time_til_boost: Duration::from_millis(config.time_til_boost_ms),
            gas_price_multiplier: config.gas_price_multiplier,
            initial_tx_gas_price_multiplier: config.initial_tx_gas_price_multiplier,
            max_gas_price: U256::from(500u64) * U256::from(1_000_000_000u64),
            compare_market_gas_price: config.compare_market_gas_price,
            max_send_retries: config.max_send_retries,
            max_rebroadcasts: config.max_rebroadcasts,
            set_latest_nonce_on_start: config.set_latest_nonce_on_start,
            nonce_freshness: Duration::from_secs(config.nonce_freshness_secs),
        }
    }
}

/// Convert a gwei amount to wei.
pub fn gwei_to_wei(gwei: f64) -> GasBoostResult<U256> {
    if !gwei.is_finite() || gwei <= 0.0 {
        return Err(GasBoostError::InvalidOptions(format!("invalid gwei amount {}", gwei)));
    }
    Ok(U256::from((gwei * WEI_PER_GWEI).round() as u128))
}

/// Scale a wei price by a float factor with four decimal places of precision.
pub fn scale_price(price: U256, factor: f64) -> U256 {
    let scaled = (factor.max(0.0) * MULTIPLIER_SCALE as f64).round() as u64;
    price.saturating_mul(U256::from(scaled)) / U256::from(MULTIPLIER_SCALE)
}

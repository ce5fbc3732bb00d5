//! Configuration validation.
//!
//! # Responsibilities
//! - Semantic validation (serde handles syntactic)
//! - Validate value ranges (intervals > 0, multipliers the network accepts)
//! - Validate addresses and decimal amounts before any subsystem starts
//!
//! # Design Decisions
//! - Returns all validation errors, not just first
//! - Validation is pure function: BonderConfig → Result<(), Vec<ValidationError>>
//! - Runs before config is accepted into the system

use alloy::primitives::{Address, U256};
use std::fmt;

use crate::config::schema::BonderConfig;

/// Minimum multiplier nodes accept for a same-nonce replacement.
pub const MIN_REPLACEMENT_MULTIPLIER: f64 = 1.10;

/// A single semantic problem in the configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidationError {
    /// Dotted path of the offending field.
    pub field: String,
    /// Human-readable reason.
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Validate a parsed configuration, collecting every error found.
pub fn validate_config(config: &BonderConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if config.blockchain.rpc_url.parse::<url::Url>().is_err() {
        errors.push(ValidationError::new("blockchain.rpc_url", "not a valid URL"));
    }
    if config.blockchain.rpc_timeout_secs == 0 {
        errors.push(ValidationError::new("blockchain.rpc_timeout_secs", "must be > 0"));
    }

    let gas = &config.gas_boost;
    if gas.poll_ms == 0 {
        errors.push(ValidationError::new("gas_boost.poll_ms", "must be > 0"));
    }
    if gas.gas_price_multiplier != 1.0 && gas.gas_price_multiplier < MIN_REPLACEMENT_MULTIPLIER {
        errors.push(ValidationError::new(
            "gas_boost.gas_price_multiplier",
            format!("must be 1.0 or at least {}", MIN_REPLACEMENT_MULTIPLIER),
        ));
    }
    if gas.initial_tx_gas_price_multiplier < 1.0 {
        errors.push(ValidationError::new(
            "gas_boost.initial_tx_gas_price_multiplier",
            "must be >= 1.0",
        ));
    }
    if !(gas.max_gas_price_gwei > 0.0) {
        errors.push(ValidationError::new("gas_boost.max_gas_price_gwei", "must be > 0"));
    }
    if gas.max_send_retries == 0 {
        errors.push(ValidationError::new("gas_boost.max_send_retries", "must be > 0"));
    }

    let watcher = &config.commit_watcher;
    if watcher.enabled {
        if watcher.bridge_address.parse::<Address>().is_err() {
            errors.push(ValidationError::new(
                "commit_watcher.bridge_address",
                "not a valid address",
            ));
        }
        if watcher.poll_interval_ms == 0 {
            errors.push(ValidationError::new("commit_watcher.poll_interval_ms", "must be > 0"));
        }
        if watcher.event_batch_size == 0 {
            errors.push(ValidationError::new("commit_watcher.event_batch_size", "must be > 0"));
        }
    }
    for (chain_id, amount) in &watcher.min_threshold_amounts {
        if chain_id.parse::<u64>().is_err() {
            errors.push(ValidationError::new(
                "commit_watcher.min_threshold_amounts",
                format!("'{}' is not a chain id", chain_id),
            ));
        }
        if U256::from_str_radix(amount, 10).is_err() {
            errors.push(ValidationError::new(
                "commit_watcher.min_threshold_amounts",
                format!("'{}' is not a decimal amount", amount),
            ));
        }
    }

    if config.observability.metrics_enabled
        && config
            .observability
            .metrics_address
            .parse::<std::net::SocketAddr>()
            .is_err()
    {
        errors.push(ValidationError::new(
            "observability.metrics_address",
            "not a socket address",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

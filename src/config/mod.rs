//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → BonderConfig (validated, immutable)
//!     → sections handed to the dispatcher, store and watcher at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; changes require a restart
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Secrets (the signing key) never live in the config file

pub mod loader;
pub mod schema;
pub mod validation;

pub use schema::BlockchainConfig;
pub use schema::BonderConfig;
pub use schema::ChainFamily;
pub use schema::CommitWatcherConfig;
pub use schema::GasBoostConfig;
pub use schema::ObservabilityConfig;

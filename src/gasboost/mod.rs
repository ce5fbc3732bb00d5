//! Fee-escalating transaction dispatch.
//!
//! # Data Flow
//! ```text
//! TransactionRequest
//!     → signer.rs (serialized nonce allocation)
//!     → factory.rs (record construction / rehydration)
//!     → transaction.rs (broadcast, poll, boost, confirm)
//!     → store (TransactionRecord by UUID, NonceRecord under "nonce",
//!              unfinished ids under "activeTxIds")
//! ```

pub mod backoff;
pub mod error;
pub mod factory;
pub mod options;
pub mod record;
pub mod signer;
pub mod transaction;

pub use error::{GasBoostError, GasBoostResult};
pub use factory::TransactionFactory;
pub use options::GasBoostOptions;
pub use record::{InFlightAttempt, NonceRecord, TransactionRecord, TransactionRequest, TxStatus, ACTIVE_TX_KEY, NONCE_KEY};
pub use signer::GasBoostSigner;
pub use transaction::{GasBoostTransaction, TxEvent};

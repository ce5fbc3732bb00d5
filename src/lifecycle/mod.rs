//! Lifecycle management subsystem.
//!
//! # Data Flow
//! ```text
//! Startup (main.rs):
//!     Load config → Validate → Store → Dispatcher → Resume active txs → Bridge → Watcher
//!
//! Shutdown (shutdown.rs):
//!     Signal received → Watcher loop exits → Store already durable → Exit
//!
//! Signals (signals.rs):
//!     SIGTERM/SIGINT → Trigger graceful shutdown
//! ```
//!
//! In-flight gas boost pollers are not drained on shutdown. Their records and
//! the `activeTxIds` index are persisted, and the next start resumes them.

pub mod shutdown;
pub mod signals;

pub use shutdown::Shutdown;

//! Key-value persistence for dispatcher and watcher records.
//!
//! # Contract
//! - `get_item(key)` returns the stored JSON object, if any
//! - `update(key, partial)` shallow-merges `partial` into the stored object (upsert)
//! - `delete_item(key)` removes the key
//!
//! Writes are durable when the call returns for [`FileStore`]; [`MemoryStore`]
//! loses everything on restart. There is no multi-key transaction; callers
//! write records whose merge is idempotent.

pub mod decimal;
pub mod file;
pub mod memory;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use file::FileStore;
pub use memory::MemoryStore;

/// Errors raised by store backends.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type StoreResult<T> = Result<T, StoreError>;

#[async_trait]
pub trait Store: Send + Sync {
    async fn get_item(&self, key: &str) -> StoreResult<Option<Value>>;

    async fn update(&self, key: &str, partial: Value) -> StoreResult<()>;

    async fn delete_item(&self, key: &str) -> StoreResult<()>;
}

/// Merge the top-level fields of `partial` over `existing`.
///
/// Non-object values replace whatever was stored.
pub fn shallow_merge(existing: Option<Value>, partial: Value) -> Value {
    match (existing, partial) {
        (Some(Value::Object(mut base)), Value::Object(patch)) => {
            for (key, value) in patch {
                base.insert(key, value);
            }
            Value::Object(base)
        }
        (_, partial) => partial,
    }
}

/// Read and decode a typed record.
pub async fn get_record<T: DeserializeOwned>(store: &dyn Store, key: &str) -> StoreResult<Option<T>> {
    match store.get_item(key).await? {
        Some(value) => Ok(Some(serde_json::from_value(value)?)),
        None => Ok(None),
    }
}

/// Encode a typed record and merge it into the store.
pub async fn update_record<T: Serialize>(store: &dyn Store, key: &str, record: &T) -> StoreResult<()> {
    store.update(key, serde_json::to_value(record)?).await
}

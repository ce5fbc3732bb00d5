//! In-memory store backend.

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;

use crate::store::{shallow_merge, Store, StoreResult};

/// A thread-safe, process-local store. Contents are lost on restart.
#[derive(Clone, Default)]
pub struct MemoryStore {
    items: Arc<DashMap<String, Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored keys.
    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.items.get(key).map(|r| r.value().clone()))
    }

    async fn update(&self, key: &str, partial: Value) -> StoreResult<()> {
        // The entry guard holds the shard lock, so concurrent merges on one key serialize.
        let mut entry = self.items.entry(key.to_string()).or_insert(Value::Null);
        let existing = std::mem::take(entry.value_mut());
        let existing = if existing.is_null() { None } else { Some(existing) };
        *entry.value_mut() = shallow_merge(existing, partial);
        Ok(())
    }

    async fn delete_item(&self, key: &str) -> StoreResult<()> {
        self.items.remove(key);
        Ok(())
    }
}

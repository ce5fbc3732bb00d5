//! Durable JSON file store backend.
//!
//! The whole key space lives in one JSON object on disk. Every write replaces
//! the file atomically (write temp file, fsync, rename) before returning.

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

use crate::store::{shallow_merge, Store, StoreResult};

pub struct FileStore {
    path: PathBuf,
    items: Mutex<Map<String, Value>>,
}

impl FileStore {
    /// Open the store at `path`, loading existing contents if the file exists.
    pub async fn open(path: impl AsRef<Path>) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();
        let items = match tokio::fs::read(&path).await {
            Ok(bytes) if !bytes.is_empty() => serde_json::from_slice(&bytes)?,
            Ok(_) => Map::new(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if let Some(parent) = path.parent() {
                    if !parent.as_os_str().is_empty() {
                        tokio::fs::create_dir_all(parent).await?;
                    }
                }
                Map::new()
            }
            Err(e) => return Err(e.into()),
        };

        tracing::info!(path = %path.display(), keys = items.len(), "Opened file store");

        Ok(Self {
            path,
            items: Mutex::new(items),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, items: &Map<String, Value>) -> StoreResult<()> {
        let tmp = self.path.with_extension("tmp");
        let bytes = serde_json::to_vec_pretty(items)?;

        let mut file = tokio::fs::File::create(&tmp).await?;
        file.write_all(&bytes).await?;
        file.sync_all().await?;
        drop(file);

        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl Store for FileStore {
    async fn get_item(&self, key: &str) -> StoreResult<Option<Value>> {
        Ok(self.items.lock().await.get(key).cloned())
    }

    async fn update(&self, key: &str, partial: Value) -> StoreResult<()> {
        let mut items = self.items.lock().await;
        let merged = shallow_merge(items.get(key).cloned(), partial);
        let previous = items.insert(key.to_string(), merged);

        if let Err(e) = self.persist(&items).await {
            // Keep memory consistent with disk.
            match previous {
                Some(value) => items.insert(key.to_string(), value),
                None => items.remove(key),
            };
            return Err(e);
        }
        Ok(())
    }

    async fn delete_item(&self, key: &str) -> StoreResult<()> {
        let mut items = self.items.lock().await;
        if let Some(previous) = items.remove(key) {
            if let Err(e) = self.persist(&items).await {
                items.insert(key.to_string(), previous);
                return Err(e);
            }
        }
        Ok(())
    }
}

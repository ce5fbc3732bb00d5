//! Watcher-owned records: transfer roots and observed transfers.

use alloy::primitives::{TxHash, B256, U256};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;
use uuid::Uuid;

use crate::gasboost::record::now_ms;
use crate::store::{decimal, get_record, update_record, Store, StoreResult};

/// A computed root and the ordered transfer ids it covers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRootRecord {
    pub root_hash: B256,
    pub transfer_hashes: Vec<B256>,
    pub source_chain_id: u64,
    pub destination_chain_id: u64,
    #[serde(with = "decimal::u256")]
    pub total_amount: U256,
    pub created_at: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_tx_id: Option<Uuid>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub commit_tx_hash: Option<TxHash>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub committed_at: Option<u64>,
}

/// A transfer observed from a `TransferSent` event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub transfer_id: B256,
    pub source_chain_id: u64,
    pub destination_chain_id: u64,
    #[serde(with = "decimal::u256")]
    pub amount: U256,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<TxHash>,
    pub block_number: u64,
    #[serde(default)]
    pub committed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_root_hash: Option<B256>,
}

pub fn transfer_root_key(root_hash: &B256) -> String {
    format!("transferRoot:{}", root_hash)
}

pub fn transfer_key(transfer_id: &B256) -> String {
    format!("transfer:{}", transfer_id)
}

#[derive(Clone)]
pub struct WatcherDb {
    store: Arc<dyn Store>,
}

impl WatcherDb {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn update_transfer_root(&self, record: &TransferRootRecord) -> StoreResult<()> {
        update_record(self.store.as_ref(), &transfer_root_key(&record.root_hash), record).await
    }

    pub async fn get_transfer_root(&self, root_hash: &B256) -> StoreResult<Option<TransferRootRecord>> {
        get_record(self.store.as_ref(), &transfer_root_key(root_hash)).await
    }

    pub async fn set_commit_tx(&self, root_hash: &B256, tx_id: Uuid, tx_hash: Option<TxHash>) -> StoreResult<()> {
        let mut partial = json!({ "commitTxId": tx_id });
        if let Some(hash) = tx_hash {
            partial["commitTxHash"] = json!(hash);
        }
        self.store.update(&transfer_root_key(root_hash), partial).await
    }

    pub async fn mark_root_committed(&self, root_hash: &B256, tx_hash: TxHash) -> StoreResult<()> {
        let partial = json!({ "commitTxHash": tx_hash, "committedAt": now_ms() });
        self.store.update(&transfer_root_key(root_hash), partial).await
    }

    /// Insert or refresh a transfer. Never clears its committed state.
    pub async fn upsert_transfer(&self, record: &TransferRecord) -> StoreResult<()> {
        let key = transfer_key(&record.transfer_id);
        match self.get_transfer(&record.transfer_id).await? {
            Some(existing) if existing.committed => Ok(()),
            _ => update_record(self.store.as_ref(), &key, record).await,
        }
    }

    pub async fn get_transfer(&self, transfer_id: &B256) -> StoreResult<Option<TransferRecord>> {
        get_record(self.store.as_ref(), &transfer_key(transfer_id)).await
    }

    pub async fn mark_transfers_committed(&self, transfer_ids: &[B256], root_hash: &B256) -> StoreResult<()> {
        for id in transfer_ids {
            let partial = json!({ "committed": true, "transferRootHash": root_hash });
            self.store.update(&transfer_key(id), partial).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn transfer(id: u8) -> TransferRecord {
        TransferRecord {
            transfer_id: B256::repeat_byte(id),
            source_chain_id: 10,
            destination_chain_id: 1,
            amount: U256::from(100u64),
            tx_hash: None,
            block_number: 5,
            committed: false,
            transfer_root_hash: None,
        }
    }

    #[tokio::test]
    async fn test_root_lifecycle() {
        let db = WatcherDb::new(Arc::new(MemoryStore::new()));
        let root = B256::repeat_byte(0xee);
        let record = TransferRootRecord {
            root_hash: root,
            transfer_hashes: vec![B256::repeat_byte(1), B256::repeat_byte(2)],
            source_chain_id: 10,
            destination_chain_id: 1,
            total_amount: U256::from(200u64),
            created_at: 1,
            commit_tx_id: None,
            commit_tx_hash: None,
            committed_at: None,
        };
        db.update_transfer_root(&record).await.unwrap();

        let tx_id = Uuid::new_v4();
        db.set_commit_tx(&root, tx_id, None).await.unwrap();
        db.mark_root_committed(&root, TxHash::repeat_byte(9)).await.unwrap();

        let stored = db.get_transfer_root(&root).await.unwrap().unwrap();
        assert_eq!(stored.transfer_hashes, record.transfer_hashes);
        assert_eq!(stored.commit_tx_id, Some(tx_id));
        assert_eq!(stored.commit_tx_hash, Some(TxHash::repeat_byte(9)));
        assert!(stored.committed_at.is_some());
    }

    #[tokio::test]
    async fn test_committed_transfer_is_not_reset() {
        let db = WatcherDb::new(Arc::new(MemoryStore::new()));
        let t = transfer(1);
        db.upsert_transfer(&t).await.unwrap();
        db.mark_transfers_committed(&[t.transfer_id], &B256::repeat_byte(0xee)).await.unwrap();
        db.upsert_transfer(&t).await.unwrap();

        let stored = db.get_transfer(&t.transfer_id).await.unwrap().unwrap();
        assert!(stored.committed);
        assert_eq!(stored.transfer_root_hash, Some(B256::repeat_byte(0xee)));
    }
}

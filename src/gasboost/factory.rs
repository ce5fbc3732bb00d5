//! Builds and rehydrates [`GasBoostTransaction`]s.

use std::sync::Arc;
use uuid::Uuid;

use crate::blockchain::ChainClient;
use crate::gasboost::error::{GasBoostError, GasBoostResult};
use crate::gasboost::options::GasBoostOptions;
use crate::gasboost::record::{TransactionRecord, TransactionRequest};
use crate::gasboost::transaction::GasBoostTransaction;
use crate::store::{get_record, Store};

#[derive(Clone)]
pub struct TransactionFactory {
    client: Arc<dyn ChainClient>,
    store: Arc<dyn Store>,
    options: GasBoostOptions,
}

impl TransactionFactory {
    pub fn new(client: Arc<dyn ChainClient>, store: Arc<dyn Store>, options: GasBoostOptions) -> Self {
        Self { client, store, options }
    }

    /// A fresh, unsent transaction at `nonce`.
    pub fn create_transaction(&self, request: TransactionRequest, nonce: u64) -> GasBoostTransaction {
        let record = TransactionRecord::new(self.client.address(), request, nonce);
        self.unmarshal(record)
    }

    /// Rebuild a transaction from its persisted record, keeping nonce and last gas price.
    pub fn unmarshal(&self, record: TransactionRecord) -> GasBoostTransaction {
        GasBoostTransaction::new(self.client.clone(), self.store.clone(), self.options.clone(), record)
    }

    pub async fn from_id(&self, id: Uuid) -> GasBoostResult<GasBoostTransaction> {
        let record: TransactionRecord = get_record(self.store.as_ref(), &id.to_string())
            .await?
            .ok_or(GasBoostError::NotFound(id))?;
        Ok(self.unmarshal(record))
    }
}

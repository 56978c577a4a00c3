//! Ledger facade: the operations a caller needs, over one store.

use chrono::{DateTime, Utc};

use stockledger_core::{ProductId, StoreId};
use stockledger_inventory::{
    InvariantReport, Movement, ReconcileBatch, ReconcileOutcome, RecordBatch, StockBalance,
};

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::reconciliation::{ReconcileReport, ReconciliationEngine};
use crate::recorder::{BatchReceipt, MovementRecorder};
use crate::store::StockStore;

#[derive(Debug, Clone)]
pub struct Ledger<S> {
    store: S,
    recorder: MovementRecorder<S>,
    engine: ReconciliationEngine<S>,
}

impl<S: StockStore + Clone> Ledger<S> {
    pub fn new(store: S, config: &LedgerConfig) -> Self {
        Self {
            recorder: MovementRecorder::new(store.clone()),
            engine: ReconciliationEngine::new(store.clone()).with_retries(config.reconcile_retries),
            store,
        }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub async fn record_batch(&self, batch: &RecordBatch) -> Result<BatchReceipt, LedgerError> {
        self.recorder.record_batch(batch).await
    }

    pub async fn reconcile(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        observed: i64,
        counted_at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, LedgerError> {
        self.engine
            .reconcile(store_id, product_id, observed, counted_at)
            .await
    }

    pub async fn reconcile_batch(
        &self,
        batch: &ReconcileBatch,
    ) -> Result<ReconcileReport, LedgerError> {
        self.engine.reconcile_batch(batch).await
    }

    pub async fn balance(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Option<StockBalance>, LedgerError> {
        Ok(self.store.balance(store_id, product_id).await?)
    }

    /// Quantity on hand, 0 for a key never touched.
    pub async fn quantity(&self, store_id: StoreId, product_id: ProductId) -> Result<i64, LedgerError> {
        Ok(self
            .balance(store_id, product_id)
            .await?
            .map(|b| b.quantity)
            .unwrap_or(0))
    }

    pub async fn list_balances(&self, store_id: StoreId) -> Result<Vec<StockBalance>, LedgerError> {
        Ok(self.store.list_balances(store_id).await?)
    }

    pub async fn movements(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Vec<Movement>, LedgerError> {
        Ok(self.store.movements(store_id, product_id).await?)
    }

    pub async fn verify_invariant(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<InvariantReport, LedgerError> {
        Ok(self.store.verify_invariant(store_id, product_id).await?)
    }
}

//! Reconciliation Engine: explains physical counts with adjustment movements.
//!
//! For each counted product the balance row is locked, the adjustment is
//! planned from the locked quantity, the adjustment (if any) is appended and
//! the balance is set to the counted value. A whole batch runs in one
//! transaction and locks rows in ascending product order.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Span, field, info, instrument, warn};

use stockledger_core::{BatchId, ProductId, StoreId};
use stockledger_inventory::{
    CountLine, Movement, ReconcileBatch, ReconcileOutcome, plan_adjustment,
};

use crate::error::LedgerError;
use crate::store::{StockStore, StockTransaction};
use crate::transaction::settle;

pub const DEFAULT_RETRIES: u32 = 3;

/// What a committed reconciliation did, one outcome per counted product in
/// ascending product order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub batch_id: BatchId,
    pub outcomes: Vec<ReconcileOutcome>,
}

impl ReconcileReport {
    /// Adjustment movements that were appended.
    pub fn adjustments(&self) -> impl Iterator<Item = &Movement> {
        self.outcomes.iter().filter_map(|o| o.movement.as_ref())
    }
}

#[derive(Debug, Clone)]
pub struct ReconciliationEngine<S> {
    store: S,
    retries: u32,
}

impl<S> ReconciliationEngine<S> {
    pub fn new(store: S) -> Self {
        Self {
            store,
            retries: DEFAULT_RETRIES,
        }
    }

    /// Extra attempts after a conflict before it is surfaced.
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

impl<S: StockStore> ReconciliationEngine<S> {
    /// Reconcile one product. `counted_at` stamps the adjustment, the
    /// balance `counted_at` and its `updated_at`.
    ///
    /// Returns the outcome; its `movement` is `None` when the count matched.
    #[instrument(
        skip(self),
        fields(store_id = %store_id, product_id = %product_id),
        err
    )]
    pub async fn reconcile(
        &self,
        store_id: StoreId,
        product_id: ProductId,
        observed: i64,
        counted_at: DateTime<Utc>,
    ) -> Result<ReconcileOutcome, LedgerError> {
        let batch = ReconcileBatch {
            store_id,
            counts: vec![CountLine::new(product_id, observed)],
            counted_at,
            processed_at: counted_at,
        };

        self.reconcile_batch(&batch)
            .await?
            .outcomes
            .pop()
            .ok_or_else(|| LedgerError::Persistence("reconcile produced no outcome".to_string()))
    }

    /// Reconcile every count of `batch` in a single transaction.
    ///
    /// Negative or duplicate counts reject the whole batch up front. A
    /// conflict rolls the transaction back and the batch is retried from
    /// scratch, up to the configured number of retries.
    #[instrument(
        skip(self, batch),
        fields(
            store_id = %batch.store_id,
            counts = batch.counts.len(),
            batch_id = field::Empty
        ),
        err
    )]
    pub async fn reconcile_batch(&self, batch: &ReconcileBatch) -> Result<ReconcileReport, LedgerError> {
        let lines = batch.ordered_counts()?;
        let batch_id = BatchId::new();
        Span::current().record("batch_id", field::display(batch_id));

        let mut attempt = 0;
        loop {
            match self.attempt(batch, &lines, batch_id).await {
                Ok(outcomes) => {
                    let report = ReconcileReport { batch_id, outcomes };
                    info!(
                        adjustments = report.adjustments().count(),
                        attempts = attempt + 1,
                        "counts reconciled"
                    );
                    return Ok(report);
                }
                Err(LedgerError::Conflict(reason)) if attempt < self.retries => {
                    attempt += 1;
                    warn!(attempt, retries = self.retries, %reason, "reconcile conflict, retrying");
                }
                Err(err) => return Err(err),
            }
        }
    }

    async fn attempt(
        &self,
        batch: &ReconcileBatch,
        lines: &[(usize, CountLine)],
        batch_id: BatchId,
    ) -> Result<Vec<ReconcileOutcome>, LedgerError> {
        if lines.is_empty() {
            return Ok(Vec::new());
        }

        let mut tx = self.store.begin().await?;
        let result = apply_counts(tx.as_mut(), batch, lines, batch_id).await;
        settle(tx, result).await
    }
}

async fn apply_counts(
    tx: &mut dyn StockTransaction,
    batch: &ReconcileBatch,
    lines: &[(usize, CountLine)],
    batch_id: BatchId,
) -> Result<Vec<ReconcileOutcome>, LedgerError> {
    let store_id = batch.store_id;
    let mut outcomes = Vec::with_capacity(lines.len());

    // `index` is the caller's position, so failures name the submitted line
    // rather than its place in the lock order.
    for &(index, line) in lines {
        let product_id = line.product_id;

        let recorded = tx
            .lock_balance(store_id, product_id, batch.processed_at)
            .await
            .map_err(|e| LedgerError::at_item(index, product_id, e))?;

        let adjustment = plan_adjustment(recorded, line.observed)
            .map_err(|e| LedgerError::domain_at_item(index, product_id, e))?;

        let movement = match adjustment {
            Some(adjustment) => {
                let pending = adjustment.to_movement(store_id, product_id, batch.counted_at, batch_id);
                let id = tx
                    .append(&pending)
                    .await
                    .map_err(|e| LedgerError::at_item(index, product_id, e))?;
                Some(pending.into_recorded(id))
            }
            None => None,
        };

        tx.upsert_absolute(
            store_id,
            product_id,
            line.observed,
            batch.processed_at,
            Some(batch.counted_at),
        )
        .await
        .map_err(|e| LedgerError::at_item(index, product_id, e))?;

        outcomes.push(ReconcileOutcome {
            product_id,
            recorded,
            observed: line.observed,
            movement,
        });
    }

    Ok(outcomes)
}

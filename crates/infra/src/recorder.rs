//! Movement Recorder: writes a batch of receipts/issues as one unit.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{Span, debug, field, info, instrument};

use stockledger_core::{BatchId, ProductId, StoreId};
use stockledger_inventory::{Movement, NewMovement, RecordBatch};

use crate::error::LedgerError;
use crate::store::{StockStore, StockTransaction};
use crate::transaction::settle;

/// What a committed batch wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BatchReceipt {
    pub batch_id: BatchId,
    /// Appended movements in item order.
    pub movements: Vec<Movement>,
}

#[derive(Debug, Clone)]
pub struct MovementRecorder<S> {
    store: S,
}

impl<S> MovementRecorder<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }
}

impl<S: StockStore> MovementRecorder<S> {
    /// Validate every item, then append the movements and update balances in
    /// one transaction.
    ///
    /// Either every item is written or none is. On validation failure the
    /// error lists each failing item by position.
    #[instrument(
        skip(self, batch),
        fields(
            store_id = %batch.store_id,
            operation = ?batch.operation,
            items = batch.items.len(),
            batch_id = field::Empty
        ),
        err
    )]
    pub async fn record_batch(&self, batch: &RecordBatch) -> Result<BatchReceipt, LedgerError> {
        let batch_id = BatchId::new();
        Span::current().record("batch_id", field::display(batch_id));

        let pending = batch.to_movements(batch_id)?;
        if pending.is_empty() {
            debug!("empty batch, nothing to record");
            return Ok(BatchReceipt {
                batch_id,
                movements: Vec::new(),
            });
        }

        let mut tx = self.store.begin().await?;
        let result = apply(tx.as_mut(), batch.store_id, pending, batch.processed_at).await;
        let movements = settle(tx, result).await?;

        info!(movements = movements.len(), "batch recorded");
        Ok(BatchReceipt {
            batch_id,
            movements,
        })
    }
}

async fn apply(
    tx: &mut dyn StockTransaction,
    store_id: StoreId,
    pending: Vec<NewMovement>,
    processed_at: DateTime<Utc>,
) -> Result<Vec<Movement>, LedgerError> {
    // Balance rows are locked in ascending product order, the same order
    // reconciliation takes them in, before any item is applied.
    // product -> first item index
    let touched: BTreeMap<ProductId, usize> = pending
        .iter()
        .enumerate()
        .rev()
        .map(|(index, m)| (m.product_id, index))
        .collect();
    for (&product_id, &index) in &touched {
        tx.lock_balance(store_id, product_id, processed_at)
            .await
            .map_err(|e| LedgerError::at_item(index, product_id, e))?;
    }

    let mut movements = Vec::with_capacity(pending.len());
    for (index, movement) in pending.into_iter().enumerate() {
        let product_id = movement.product_id;
        let id = tx
            .append(&movement)
            .await
            .map_err(|e| LedgerError::at_item(index, product_id, e))?;
        tx.upsert_delta(store_id, product_id, movement.signed_quantity(), processed_at)
            .await
            .map_err(|e| LedgerError::at_item(index, product_id, e))?;

        movements.push(movement.into_recorded(id));
    }

    Ok(movements)
}

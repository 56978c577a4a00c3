//! Ledger and balance storage boundary.
//!
//! Writes always go through a [`StockTransaction`]: the movement appends and
//! balance updates of one logical operation are staged together and become
//! visible only on [`StockTransaction::commit`]. Dropping a transaction
//! without committing discards everything it staged.
//!
//! Two implementations exist:
//! - [`InMemoryStockStore`] for tests and embedding
//! - [`PostgresStockStore`] backed by `sqlx`

pub mod in_memory;
pub mod postgres;
pub mod schema;

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

use stockledger_core::{DomainError, MovementId, ProductId, StoreId};
use stockledger_inventory::{InvariantReport, Movement, NewMovement, StockBalance};

pub use in_memory::InMemoryStockStore;
pub use postgres::PostgresStockStore;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// The write was refused on its content (non-positive quantity, check
    /// constraint, arithmetic overflow).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A concurrent transaction holds or changed the same balance row.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Anything else the backend reported.
    #[error("persistence error: {0}")]
    Persistence(String),
}

impl StoreError {
    pub fn is_conflict(&self) -> bool {
        matches!(self, StoreError::Conflict(_))
    }
}

impl From<DomainError> for StoreError {
    fn from(value: DomainError) -> Self {
        if value.is_validation() {
            StoreError::Validation(value.to_string())
        } else {
            StoreError::Persistence(value.to_string())
        }
    }
}

/// Append-only movement log.
#[async_trait]
pub trait LedgerStore: Send {
    /// Validate and append one movement, returning its id.
    async fn append(&mut self, movement: &NewMovement) -> Result<MovementId, StoreError>;
}

/// Keyed current-quantity table.
#[async_trait]
pub trait BalanceStore: Send {
    /// Current quantity, 0 when the key has no row yet.
    async fn get(&mut self, store_id: StoreId, product_id: ProductId) -> Result<i64, StoreError>;

    /// Ensure the row exists and hold it until the transaction ends.
    ///
    /// Returns the recorded quantity. A missing row is created with quantity
    /// 0 so that concurrent first-time reconciliations serialize on it too.
    async fn lock_balance(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// Add `delta` in a single insert-or-update and return the new quantity.
    async fn upsert_delta(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        delta: i64,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError>;

    /// Set the quantity unconditionally (insert when absent).
    ///
    /// `counted_at` is only overwritten when `Some`.
    async fn upsert_absolute(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        quantity: i64,
        at: DateTime<Utc>,
        counted_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError>;
}

/// One unit of work over both stores.
#[async_trait]
pub trait StockTransaction: LedgerStore + BalanceStore {
    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Entry point: opens transactions and serves committed reads.
#[async_trait]
pub trait StockStore: Send + Sync {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StoreError>;

    async fn balance(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Option<StockBalance>, StoreError>;

    /// Every balance row of a store, ordered by product id.
    async fn list_balances(&self, store_id: StoreId) -> Result<Vec<StockBalance>, StoreError>;

    /// Movement history of one key in append order.
    async fn movements(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Vec<Movement>, StoreError>;

    /// Recompute the key's balance from its movements, reading both from the
    /// same snapshot.
    async fn verify_invariant(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<InvariantReport, StoreError>;
}

#[async_trait]
impl<S> StockStore for Arc<S>
where
    S: StockStore + ?Sized,
{
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StoreError> {
        (**self).begin().await
    }

    async fn balance(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Option<StockBalance>, StoreError> {
        (**self).balance(store_id, product_id).await
    }

    async fn list_balances(&self, store_id: StoreId) -> Result<Vec<StockBalance>, StoreError> {
        (**self).list_balances(store_id).await
    }

    async fn movements(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Vec<Movement>, StoreError> {
        (**self).movements(store_id, product_id).await
    }

    async fn verify_invariant(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<InvariantReport, StoreError> {
        (**self).verify_invariant(store_id, product_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_by_cause() {
        let err: StoreError = DomainError::invalid_id("ProductId: must be positive, got 0").into();
        assert!(matches!(err, StoreError::Validation(_)));

        let err: StoreError = DomainError::invariant("adjustment overflows i64").into();
        assert!(matches!(err, StoreError::Persistence(_)));
        assert!(!err.is_conflict());
    }
}

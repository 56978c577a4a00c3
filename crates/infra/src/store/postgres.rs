//! Postgres-backed stock store.
//!
//! ## Concurrency
//!
//! `upsert_delta` is a single `INSERT .. ON CONFLICT DO UPDATE` statement, so
//! concurrent receipts/issues on one key never lose updates. Reconciliation
//! reads and then overwrites a balance, so it first takes the row with
//! `lock_balance` (`INSERT .. ON CONFLICT DO NOTHING` followed by
//! `SELECT .. FOR UPDATE`) and holds it until commit.
//!
//! Every transaction sets `lock_timeout`, so a writer stuck behind another
//! one fails with a conflict instead of waiting forever.
//!
//! ## Error Mapping
//!
//! | PostgreSQL Error Code | StoreError | Scenario |
//! |-----------------------|------------|----------|
//! | `40001` | `Conflict` | Serialization failure |
//! | `40P01` | `Conflict` | Deadlock detected |
//! | `55P03` | `Conflict` | Lock not available (`lock_timeout`) |
//! | `23514` | `Validation` | Check constraint (`quantity > 0`, kind) |
//! | `22003` | `Validation` | Balance arithmetic out of `BIGINT` range |
//! | Any other | `Persistence` | Connection, pool, syntax, ... |

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Postgres, Row, Transaction};
use tracing::{Span, debug, field, instrument};

use stockledger_core::{BatchId, MovementId, ProductId, StoreId};
use stockledger_inventory::{InvariantReport, Movement, MovementKind, NewMovement, StockBalance};

use super::{BalanceStore, LedgerStore, StockStore, StockTransaction, StoreError};
use crate::config::LedgerConfig;

/// Postgres stock store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct PostgresStockStore {
    pool: PgPool,
    lock_timeout: Duration,
}

impl PostgresStockStore {
    pub fn new(pool: PgPool, lock_timeout: Duration) -> Self {
        Self { pool, lock_timeout }
    }

    /// Open a pool sized and configured from `config`.
    pub async fn connect(config: &LedgerConfig) -> Result<Self, StoreError> {
        let url = config.require_database_url().map_err(|e| StoreError::Persistence(e.to_string()))?;
        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool, config.lock_timeout))
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// Open Postgres transaction; rolled back by sqlx when dropped uncommitted.
pub struct PostgresTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl LedgerStore for PostgresTransaction {
    #[instrument(
        skip(self, movement),
        fields(
            store_id = %movement.store_id,
            product_id = %movement.product_id,
            kind = %movement.kind,
            movement_id = field::Empty
        ),
        err
    )]
    async fn append(&mut self, movement: &NewMovement) -> Result<MovementId, StoreError> {
        movement.validate()?;

        let row = sqlx::query(
            r#"
            INSERT INTO stock_movements (
                store_id,
                product_id,
                kind,
                quantity,
                reason,
                occurred_at,
                batch_id
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            RETURNING id
            "#,
        )
        .bind(movement.store_id.get())
        .bind(movement.product_id.get())
        .bind(movement.kind.as_str())
        .bind(movement.quantity)
        .bind(&movement.reason)
        .bind(movement.occurred_at)
        .bind(movement.batch_id.as_uuid())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("append_movement", e))?;

        let id: i64 = row
            .try_get("id")
            .map_err(|e| map_sqlx_error("append_movement", e))?;
        Span::current().record("movement_id", id);
        Ok(MovementId::from_raw(id))
    }
}

#[async_trait]
impl BalanceStore for PostgresTransaction {
    async fn get(&mut self, store_id: StoreId, product_id: ProductId) -> Result<i64, StoreError> {
        let quantity: Option<i64> = sqlx::query_scalar(
            r#"
            SELECT quantity
            FROM stock_balances
            WHERE store_id = $1 AND product_id = $2
            "#,
        )
        .bind(store_id.get())
        .bind(product_id.get())
        .fetch_optional(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("get_balance", e))?;

        Ok(quantity.unwrap_or(0))
    }

    #[instrument(skip(self), fields(store_id = %store_id, product_id = %product_id), err)]
    async fn lock_balance(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_balances (store_id, product_id, quantity, updated_at)
            VALUES ($1, $2, 0, $3)
            ON CONFLICT (store_id, product_id) DO NOTHING
            "#,
        )
        .bind(store_id.get())
        .bind(product_id.get())
        .bind(at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("create_balance", e))?;

        sqlx::query_scalar(
            r#"
            SELECT quantity
            FROM stock_balances
            WHERE store_id = $1 AND product_id = $2
            FOR UPDATE
            "#,
        )
        .bind(store_id.get())
        .bind(product_id.get())
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("lock_balance", e))
    }

    #[instrument(skip(self), fields(store_id = %store_id, product_id = %product_id), err)]
    async fn upsert_delta(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        delta: i64,
        at: DateTime<Utc>,
    ) -> Result<i64, StoreError> {
        sqlx::query_scalar(
            r#"
            INSERT INTO stock_balances (store_id, product_id, quantity, updated_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (store_id, product_id)
            DO UPDATE SET
                quantity = stock_balances.quantity + EXCLUDED.quantity,
                updated_at = EXCLUDED.updated_at
            RETURNING quantity
            "#,
        )
        .bind(store_id.get())
        .bind(product_id.get())
        .bind(delta)
        .bind(at)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_delta", e))
    }

    #[instrument(skip(self), fields(store_id = %store_id, product_id = %product_id), err)]
    async fn upsert_absolute(
        &mut self,
        store_id: StoreId,
        product_id: ProductId,
        quantity: i64,
        at: DateTime<Utc>,
        counted_at: Option<DateTime<Utc>>,
    ) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO stock_balances (store_id, product_id, quantity, updated_at, counted_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (store_id, product_id)
            DO UPDATE SET
                quantity = EXCLUDED.quantity,
                updated_at = EXCLUDED.updated_at,
                counted_at = COALESCE(EXCLUDED.counted_at, stock_balances.counted_at)
            "#,
        )
        .bind(store_id.get())
        .bind(product_id.get())
        .bind(quantity)
        .bind(at)
        .bind(counted_at)
        .execute(&mut *self.tx)
        .await
        .map_err(|e| map_sqlx_error("upsert_absolute", e))?;

        Ok(())
    }
}

#[async_trait]
impl StockTransaction for PostgresTransaction {
    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx
            .rollback()
            .await
            .map_err(|e| map_sqlx_error("rollback", e))
    }
}

#[async_trait]
impl StockStore for PostgresStockStore {
    async fn begin(&self) -> Result<Box<dyn StockTransaction>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        // SET cannot take bind parameters; set_config(.., true) is SET LOCAL.
        sqlx::query("SELECT set_config('lock_timeout', $1, true)")
            .bind(format!("{}ms", self.lock_timeout.as_millis()))
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("set_lock_timeout", e))?;

        debug!(lock_timeout_ms = self.lock_timeout.as_millis() as u64, "transaction started");
        Ok(Box::new(PostgresTransaction { tx }))
    }

    #[instrument(skip(self), fields(store_id = %store_id, product_id = %product_id), err)]
    async fn balance(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Option<StockBalance>, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT store_id, product_id, quantity, updated_at, counted_at
            FROM stock_balances
            WHERE store_id = $1 AND product_id = $2
            "#,
        )
        .bind(store_id.get())
        .bind(product_id.get())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_balance", e))?;

        row.as_ref().map(balance_from_row).transpose()
    }

    #[instrument(skip(self), fields(store_id = %store_id, balance_count = field::Empty), err)]
    async fn list_balances(&self, store_id: StoreId) -> Result<Vec<StockBalance>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT store_id, product_id, quantity, updated_at, counted_at
            FROM stock_balances
            WHERE store_id = $1
            ORDER BY product_id ASC
            "#,
        )
        .bind(store_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("list_balances", e))?;

        Span::current().record("balance_count", rows.len());
        rows.iter().map(balance_from_row).collect()
    }

    #[instrument(
        skip(self),
        fields(store_id = %store_id, product_id = %product_id, movement_count = field::Empty),
        err
    )]
    async fn movements(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<Vec<Movement>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, store_id, product_id, kind, quantity, reason, occurred_at, batch_id
            FROM stock_movements
            WHERE store_id = $1 AND product_id = $2
            ORDER BY id ASC
            "#,
        )
        .bind(store_id.get())
        .bind(product_id.get())
        .fetch_all(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("load_movements", e))?;

        Span::current().record("movement_count", rows.len());
        rows.iter().map(movement_from_row).collect()
    }

    #[instrument(skip(self), fields(store_id = %store_id, product_id = %product_id), err)]
    async fn verify_invariant(
        &self,
        store_id: StoreId,
        product_id: ProductId,
    ) -> Result<InvariantReport, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COALESCE(
                    (SELECT quantity FROM stock_balances WHERE store_id = $1 AND product_id = $2),
                    0
                ) AS recorded,
                COALESCE(
                    SUM(CASE kind WHEN 'receipt' THEN quantity ELSE -quantity END),
                    0
                )::TEXT AS derived,
                COUNT(*) AS movement_count
            FROM stock_movements
            WHERE store_id = $1 AND product_id = $2
            "#,
        )
        .bind(store_id.get())
        .bind(product_id.get())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| map_sqlx_error("verify_invariant", e))?;

        let read = |e| map_sqlx_error("verify_invariant", e);
        let movement_count: i64 = row.try_get("movement_count").map_err(read)?;
        // NUMERIC sum, read as text so a drifted total outside i64 still reports.
        let raw_sum: String = row.try_get("derived").map_err(read)?;
        let derived = raw_sum.parse::<i128>().map_err(|e| {
            StoreError::Persistence(format!("verify_invariant: bad movement sum '{raw_sum}': {e}"))
        })?;
        Ok(InvariantReport {
            store_id,
            product_id,
            recorded: row.try_get("recorded").map_err(read)?,
            derived,
            movement_count: usize::try_from(movement_count).unwrap_or(0),
        })
    }
}

fn balance_from_row(row: &PgRow) -> Result<StockBalance, StoreError> {
    let read = |e| map_sqlx_error("read_balance_row", e);
    Ok(StockBalance {
        store_id: StoreId::from_raw(row.try_get("store_id").map_err(read)?),
        product_id: ProductId::from_raw(row.try_get("product_id").map_err(read)?),
        quantity: row.try_get("quantity").map_err(read)?,
        updated_at: row.try_get("updated_at").map_err(read)?,
        counted_at: row.try_get("counted_at").map_err(read)?,
    })
}

fn movement_from_row(row: &PgRow) -> Result<Movement, StoreError> {
    let read = |e| map_sqlx_error("read_movement_row", e);
    let kind: String = row.try_get("kind").map_err(read)?;
    let kind: MovementKind = kind
        .parse()
        .map_err(|e| StoreError::Persistence(format!("corrupt movement row: {e}")))?;
    let batch_id: uuid::Uuid = row.try_get("batch_id").map_err(read)?;

    Ok(Movement {
        id: MovementId::from_raw(row.try_get("id").map_err(read)?),
        kind,
        store_id: StoreId::from_raw(row.try_get("store_id").map_err(read)?),
        product_id: ProductId::from_raw(row.try_get("product_id").map_err(read)?),
        quantity: row.try_get("quantity").map_err(read)?,
        reason: row.try_get("reason").map_err(read)?,
        occurred_at: row.try_get("occurred_at").map_err(read)?,
        batch_id: BatchId::from_uuid(batch_id),
    })
}

/// Map a sqlx error onto the store's error categories.
pub(crate) fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("40001") | Some("40P01") | Some("55P03") => StoreError::Conflict(msg),
                Some("23514") | Some("22003") => StoreError::Validation(msg),
                _ => StoreError::Persistence(msg),
            }
        }
        sqlx::Error::PoolClosed => {
            StoreError::Persistence(format!("connection pool closed in {}", operation))
        }
        sqlx::Error::PoolTimedOut => {
            StoreError::Persistence(format!("timed out waiting for a connection in {}", operation))
        }
        _ => StoreError::Persistence(format!("sqlx error in {}: {}", operation, err)),
    }
}

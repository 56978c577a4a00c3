//! Table bootstrap for the Postgres store.
//!
//! Statements are idempotent, so `apply` can run on every deploy.

use sqlx::PgPool;
use tracing::{info, instrument};

use super::StoreError;
use super::postgres::map_sqlx_error;

const STATEMENTS: &[(&str, &str)] = &[
    // Concurrent bootstraps would otherwise race on the catalog.
    (
        "bootstrap_lock",
        "SELECT pg_advisory_xact_lock(7415021733)",
    ),
    (
        "create_stock_movements",
        r#"
        CREATE TABLE IF NOT EXISTS stock_movements (
            id          BIGSERIAL PRIMARY KEY,
            store_id    BIGINT NOT NULL,
            product_id  BIGINT NOT NULL,
            kind        TEXT NOT NULL CHECK (kind IN ('receipt', 'issue')),
            quantity    BIGINT NOT NULL CHECK (quantity > 0),
            reason      TEXT NOT NULL,
            occurred_at TIMESTAMPTZ NOT NULL,
            batch_id    UUID NOT NULL,
            recorded_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
    ),
    (
        "index_stock_movements_key",
        r#"
        CREATE INDEX IF NOT EXISTS stock_movements_key_idx
            ON stock_movements (store_id, product_id, id)
        "#,
    ),
    (
        "index_stock_movements_batch",
        r#"
        CREATE INDEX IF NOT EXISTS stock_movements_batch_idx
            ON stock_movements (batch_id)
        "#,
    ),
    (
        "create_stock_balances",
        r#"
        CREATE TABLE IF NOT EXISTS stock_balances (
            store_id   BIGINT NOT NULL,
            product_id BIGINT NOT NULL,
            quantity   BIGINT NOT NULL,
            updated_at TIMESTAMPTZ NOT NULL,
            counted_at TIMESTAMPTZ NULL,
            PRIMARY KEY (store_id, product_id)
        )
        "#,
    ),
    (
        "forbid_movement_rewrites_fn",
        r#"
        CREATE OR REPLACE FUNCTION stock_movements_append_only() RETURNS trigger AS $$
        BEGIN
            RAISE EXCEPTION 'stock_movements is append-only';
        END;
        $$ LANGUAGE plpgsql
        "#,
    ),
    (
        "drop_forbid_movement_rewrites",
        "DROP TRIGGER IF EXISTS stock_movements_append_only ON stock_movements",
    ),
    (
        "forbid_movement_rewrites",
        r#"
        CREATE TRIGGER stock_movements_append_only
            BEFORE UPDATE OR DELETE ON stock_movements
            FOR EACH ROW EXECUTE FUNCTION stock_movements_append_only()
        "#,
    ),
];

/// Create tables, indexes and the append-only trigger if missing.
#[instrument(skip(pool), err)]
pub async fn apply(pool: &PgPool) -> Result<(), StoreError> {
    let mut tx = pool
        .begin()
        .await
        .map_err(|e| map_sqlx_error("begin_transaction", e))?;

    for &(name, sql) in STATEMENTS {
        sqlx::query(sql)
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error(name, e))?;
    }

    tx.commit()
        .await
        .map_err(|e| map_sqlx_error("commit_transaction", e))?;

    info!(statements = STATEMENTS.len(), "schema applied");
    Ok(())
}

//! Create or update the ledger schema in the configured database.

use anyhow::Context;

use stockledger_infra::LedgerConfig;
use stockledger_infra::store::{PostgresStockStore, schema};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = LedgerConfig::from_env().context("invalid configuration")?;
    stockledger_observability::init(&config.log);

    let store = PostgresStockStore::connect(&config)
        .await
        .context("failed to connect to Postgres")?;

    schema::apply(store.pool())
        .await
        .context("failed to apply schema")?;

    tracing::info!("stock ledger schema is up to date");
    Ok(())
}

//! Infrastructure layer: stores, ledger services, configuration.
//!
//! Domain rules live in `stockledger-inventory`; this crate persists them.
//! The Movement Recorder and the Reconciliation Engine compose the store
//! traits and know nothing about the backend behind them.

pub mod config;
pub mod error;
pub mod ledger;
pub mod reconciliation;
pub mod recorder;
pub mod store;

mod transaction;


pub use config::{ConfigError, LedgerConfig};
pub use error::LedgerError;
pub use ledger::Ledger;
pub use reconciliation::{ReconcileReport, ReconciliationEngine};
pub use recorder::{BatchReceipt, MovementRecorder};
pub use store::{
    BalanceStore, InMemoryStockStore, LedgerStore, PostgresStockStore, StockStore,
    StockTransaction, StoreError,
};

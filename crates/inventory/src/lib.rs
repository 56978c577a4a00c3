//! Inventory domain module (stock ledger).
//!
//! This crate contains the business rules for stock movements, balances and
//! physical-count reconciliation, implemented purely as deterministic domain
//! logic (no IO, no storage).

pub mod balance;
pub mod batch;
pub mod movement;
pub mod reconciliation;
pub mod reference;

pub use balance::{InvariantReport, StockBalance, signed_sum};
pub use batch::{BatchItem, BatchOperation, BatchRejected, ItemFailure, RecordBatch};
pub use movement::{Movement, MovementKind, NewMovement};
pub use reconciliation::{
    Adjustment, CountLine, ReconcileBatch, ReconcileOutcome, SHORTAGE_REASON, SURPLUS_REASON,
    plan_adjustment,
};
pub use reference::{Product, Store, ValidityAlert};

//! Batch intake: turn externally parsed rows into ledger input.
//!
//! Upload formats (spreadsheets, invoice XML) are parsed elsewhere into
//! header→value records. This crate maps those records onto the ledger's
//! shapes, coerces values, and partitions the input into usable, rejected and
//! dropped rows so the caller can report problems before committing anything.
//! Everything here is pure; nothing touches storage.

pub mod coerce;
pub mod normalize;
pub mod row;

pub use coerce::IntakeOptions;
pub use normalize::{
    DropReason, DroppedRow, Normalized, RejectedRow, RowProblem, normalize, normalize_counts,
};
pub use row::{ColumnAliases, RawRow, RawValue};

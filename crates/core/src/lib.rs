//! `stockledger-core`: shared building blocks for the stock ledger.
//!
//! This crate contains **pure domain** primitives (no infrastructure concerns).

pub mod entity;
pub mod error;
pub mod id;

pub use entity::Entity;
pub use error::DomainError;
pub use id::{BatchId, MovementId, ProductId, StoreId};

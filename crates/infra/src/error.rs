//! Errors surfaced to callers of the ledger services.

use thiserror::Error;

use stockledger_core::{DomainError, ProductId};
use stockledger_inventory::{BatchRejected, ItemFailure};

use crate::store::StoreError;

/// Outcome of a failed ledger operation. Nothing was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LedgerError {
    /// One or more items were refused; `failures` names them.
    #[error("{}", describe_failures(.failures))]
    Validation { failures: Vec<ItemFailure> },

    /// A concurrent writer held or changed the same balance. Try again.
    #[error("conflict, try again: {0}")]
    Conflict(String),

    #[error("persistence error: {0}")]
    Persistence(String),
}

impl LedgerError {
    /// Attribute a store error raised while writing one item.
    pub(crate) fn at_item(index: usize, product_id: ProductId, err: StoreError) -> Self {
        match err {
            StoreError::Validation(msg) => LedgerError::Validation {
                failures: vec![ItemFailure {
                    index,
                    product_id: Some(product_id),
                    error: DomainError::Validation(msg),
                }],
            },
            other => other.into(),
        }
    }

    /// Same as [`LedgerError::at_item`] for domain errors.
    pub(crate) fn domain_at_item(index: usize, product_id: ProductId, err: DomainError) -> Self {
        LedgerError::Validation {
            failures: vec![ItemFailure {
                index,
                product_id: Some(product_id),
                error: err,
            }],
        }
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, LedgerError::Conflict(_))
    }
}

impl From<BatchRejected> for LedgerError {
    fn from(value: BatchRejected) -> Self {
        LedgerError::Validation {
            failures: value.failures,
        }
    }
}

impl From<StoreError> for LedgerError {
    /// Item-scoped validation errors are attributed by the services before
    /// reaching this conversion.
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::Conflict(msg) => LedgerError::Conflict(msg),
            StoreError::Validation(msg) => {
                LedgerError::Persistence(format!("store refused the write: {msg}"))
            }
            StoreError::Persistence(msg) => LedgerError::Persistence(msg),
        }
    }
}

fn describe_failures(failures: &[ItemFailure]) -> String {
    let mut out = format!("validation failed for {} item(s)", failures.len());
    for failure in failures {
        out.push_str("; ");
        out.push_str(&failure.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_message_lists_items() {
        let err = LedgerError::domain_at_item(
            2,
            ProductId::from_raw(9),
            DomainError::validation("movement quantity must be positive, got -1"),
        );
        let text = err.to_string();
        assert!(text.starts_with("validation failed for 1 item(s)"));
        assert!(text.contains("item 2 (product 9)"));
    }

    #[test]
    fn store_conflicts_stay_conflicts() {
        let err: LedgerError = StoreError::Conflict("lock timeout".into()).into();
        assert!(err.is_conflict());
    }

    #[test]
    fn store_validation_is_attributed_to_the_item() {
        let err = LedgerError::at_item(
            0,
            ProductId::from_raw(4),
            StoreError::Validation("balance overflow".into()),
        );
        match err {
            LedgerError::Validation { failures } => {
                assert_eq!(failures[0].product_id, Some(ProductId::from_raw(4)));
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}

//! Physical-count reconciliation planning.
//!
//! Given the recorded balance and the quantity a person actually counted,
//! decide which single movement explains the difference. Applying the plan
//! (and locking the balance row while doing so) is the infrastructure's job.

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{BatchId, DomainError, ProductId, StoreId};

use crate::batch::{BatchRejected, ItemFailure};
use crate::movement::{Movement, MovementKind, NewMovement};

pub const SHORTAGE_REASON: &str = "stock adjustment — shortage";
pub const SURPLUS_REASON: &str = "stock adjustment — surplus";

/// The movement needed to move a balance from `recorded` to `observed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Adjustment {
    pub kind: MovementKind,
    /// Always positive.
    pub quantity: i64,
}

impl Adjustment {
    pub fn reason(&self) -> &'static str {
        match self.kind {
            MovementKind::Issue => SHORTAGE_REASON,
            MovementKind::Receipt => SURPLUS_REASON,
        }
    }

    pub fn to_movement(
        self,
        store_id: StoreId,
        product_id: ProductId,
        occurred_at: DateTime<Utc>,
        batch_id: BatchId,
    ) -> NewMovement {
        NewMovement {
            kind: self.kind,
            store_id,
            product_id,
            quantity: self.quantity,
            reason: self.reason().to_string(),
            occurred_at,
            batch_id,
        }
    }
}

/// Decide the adjustment for a physical count.
///
/// - counted less than recorded: issue of the shortage
/// - counted more than recorded: receipt of the surplus
/// - equal: nothing to append
pub fn plan_adjustment(recorded: i64, observed: i64) -> Result<Option<Adjustment>, DomainError> {
    let delta = recorded
        .checked_sub(observed)
        .ok_or_else(|| DomainError::invariant("adjustment overflows i64"))?;

    let adjustment = match delta.signum() {
        1 => Some(Adjustment {
            kind: MovementKind::Issue,
            quantity: delta,
        }),
        -1 => Some(Adjustment {
            kind: MovementKind::Receipt,
            quantity: delta
                .checked_neg()
                .ok_or_else(|| DomainError::invariant("adjustment overflows i64"))?,
        }),
        _ => None,
    };
    Ok(adjustment)
}

/// One counted product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountLine {
    pub product_id: ProductId,
    pub observed: i64,
}

impl CountLine {
    pub fn new(product_id: ProductId, observed: i64) -> Self {
        Self { product_id, observed }
    }
}

/// Command: reconcile physical counts for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileBatch {
    pub store_id: StoreId,
    pub counts: Vec<CountLine>,
    /// When the count was taken; stamps adjustments and `counted_at`.
    pub counted_at: DateTime<Utc>,
    /// When the request is processed; balance `updated_at`.
    pub processed_at: DateTime<Utc>,
}

impl ReconcileBatch {
    /// Validate counts and return them in ascending product order, each with
    /// its position in `counts`.
    ///
    /// The ordering is the lock order used when applying the batch, so two
    /// batches touching the same products always lock them in the same
    /// sequence.
    pub fn ordered_counts(&self) -> Result<Vec<(usize, CountLine)>, BatchRejected> {
        let mut seen = HashSet::with_capacity(self.counts.len());
        let mut failures = Vec::new();

        for (index, line) in self.counts.iter().enumerate() {
            if line.observed < 0 {
                failures.push(ItemFailure {
                    index,
                    product_id: Some(line.product_id),
                    error: DomainError::validation(format!(
                        "observed count cannot be negative, got {}",
                        line.observed
                    )),
                });
            } else if !seen.insert(line.product_id) {
                failures.push(ItemFailure {
                    index,
                    product_id: Some(line.product_id),
                    error: DomainError::validation("product counted twice in one batch"),
                });
            }
        }

        if !failures.is_empty() {
            return Err(BatchRejected { failures });
        }

        let mut ordered: Vec<_> = self.counts.iter().copied().enumerate().collect();
        ordered.sort_by_key(|(_, c)| c.product_id);
        Ok(ordered)
    }
}

/// What reconciling one product did.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileOutcome {
    pub product_id: ProductId,
    pub recorded: i64,
    pub observed: i64,
    /// The appended adjustment, `None` when the count matched.
    pub movement: Option<Movement>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn now() -> DateTime<Utc> {
        Utc::now()
    }

    #[test]
    fn shortage_emits_issue() {
        let adj = plan_adjustment(100, 70).unwrap().unwrap();
        assert_eq!(adj.kind, MovementKind::Issue);
        assert_eq!(adj.quantity, 30);
        assert_eq!(adj.reason(), SHORTAGE_REASON);
    }

    #[test]
    fn surplus_emits_receipt() {
        let adj = plan_adjustment(50, 80).unwrap().unwrap();
        assert_eq!(adj.kind, MovementKind::Receipt);
        assert_eq!(adj.quantity, 30);
        assert_eq!(adj.reason(), SURPLUS_REASON);
    }

    #[test]
    fn matching_count_needs_no_movement() {
        assert_eq!(plan_adjustment(12, 12).unwrap(), None);
    }

    #[test]
    fn negative_recorded_balance_is_reconciled_upwards() {
        let adj = plan_adjustment(-5, 3).unwrap().unwrap();
        assert_eq!(adj.kind, MovementKind::Receipt);
        assert_eq!(adj.quantity, 8);
    }

    #[test]
    fn overflow_is_reported_not_wrapped() {
        assert!(plan_adjustment(i64::MIN, 1).is_err());
    }

    #[test]
    fn counts_are_ordered_by_product() {
        let batch = ReconcileBatch {
            store_id: StoreId::from_raw(1),
            counts: vec![
                CountLine::new(ProductId::from_raw(9), 1),
                CountLine::new(ProductId::from_raw(2), 0),
                CountLine::new(ProductId::from_raw(5), 4),
            ],
            counted_at: now(),
            processed_at: now(),
        };
        let ordered: Vec<_> = batch
            .ordered_counts()
            .unwrap()
            .into_iter()
            .map(|(index, c)| (index, c.product_id.get()))
            .collect();
        assert_eq!(ordered, vec![(1, 2), (2, 5), (0, 9)]);
    }

    #[test]
    fn negative_and_duplicate_counts_are_rejected() {
        let batch = ReconcileBatch {
            store_id: StoreId::from_raw(1),
            counts: vec![
                CountLine::new(ProductId::from_raw(1), -2),
                CountLine::new(ProductId::from_raw(3), 4),
                CountLine::new(ProductId::from_raw(3), 5),
            ],
            counted_at: now(),
            processed_at: now(),
        };
        let err = batch.ordered_counts().unwrap_err();
        let indexes: Vec<_> = err.failures.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![0, 2]);
    }

    proptest! {
        /// Property: recorded + signed(adjustment) == observed, and the
        /// adjustment quantity is never zero.
        #[test]
        fn adjustment_explains_the_difference(
            recorded in -1_000_000i64..1_000_000i64,
            observed in 0i64..1_000_000i64,
        ) {
            let planned = plan_adjustment(recorded, observed).unwrap();
            let applied = planned.map(|a| a.kind.signed(a.quantity)).unwrap_or(0);
            prop_assert_eq!(recorded + applied, observed);
            if let Some(a) = planned {
                prop_assert!(a.quantity > 0);
            }
        }
    }
}

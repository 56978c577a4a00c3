use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{ProductId, StoreId};

use crate::movement::Movement;

/// Current quantity on hand for one (store, product) pair.
///
/// Derived state: `quantity` must always equal the signed sum of the
/// movements recorded for the same key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockBalance {
    pub store_id: StoreId,
    pub product_id: ProductId,
    /// Not floored at zero; issues may take a balance negative.
    pub quantity: i64,
    pub updated_at: DateTime<Utc>,
    /// When the last physical count was reconciled, if ever.
    pub counted_at: Option<DateTime<Utc>>,
}

/// Signed sum of a movement history (receipts add, issues subtract).
///
/// Accumulated in `i128`: a history may pass outside the `i64` range on the
/// way to a balance that fits.
pub fn signed_sum<'a>(movements: impl IntoIterator<Item = &'a Movement>) -> i128 {
    movements
        .into_iter()
        .map(|m| i128::from(m.signed_quantity()))
        .sum()
}

/// Result of recomputing a balance from its movements.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvariantReport {
    pub store_id: StoreId,
    pub product_id: ProductId,
    /// Balance row quantity (0 when no row exists).
    pub recorded: i64,
    /// Signed sum over the movement history.
    pub derived: i128,
    pub movement_count: usize,
}

impl InvariantReport {
    pub fn new(
        store_id: StoreId,
        product_id: ProductId,
        balance: Option<&StockBalance>,
        movements: &[Movement],
    ) -> Self {
        Self {
            store_id,
            product_id,
            recorded: balance.map(|b| b.quantity).unwrap_or(0),
            derived: signed_sum(movements),
            movement_count: movements.len(),
        }
    }

    pub fn holds(&self) -> bool {
        i128::from(self.recorded) == self.derived
    }
}

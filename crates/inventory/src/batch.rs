//! Batch of intended receipts/issues, validated as one unit.
//!
//! A batch is either applied entirely or not at all, so validation collects
//! every failing item instead of stopping at the first one. The caller gets
//! the full list and can fix the input in one pass.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockledger_core::{BatchId, DomainError, ProductId, StoreId};

use crate::movement::{MovementKind, NewMovement};

/// Entry point that produced a batch; decides the kind and default reason.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchOperation {
    /// Receipts keyed in by hand.
    ManualReceipt,
    /// Receipts taken from invoice line items.
    InvoiceReceipt,
    /// Issues uploaded from the daily issue sheet.
    DailyIssue,
    /// Mixed batch; every item states its own kind.
    Manual,
}

impl BatchOperation {
    /// Kind imposed on every item, or `None` when items carry their own.
    pub fn kind(self) -> Option<MovementKind> {
        match self {
            BatchOperation::ManualReceipt | BatchOperation::InvoiceReceipt => {
                Some(MovementKind::Receipt)
            }
            BatchOperation::DailyIssue => Some(MovementKind::Issue),
            BatchOperation::Manual => None,
        }
    }

    /// Reason recorded when an item does not carry one.
    pub fn default_reason(self, kind: MovementKind) -> &'static str {
        match (self, kind) {
            (BatchOperation::InvoiceReceipt, _) => "receipt via invoice",
            (BatchOperation::DailyIssue, _) => "daily issue",
            (_, MovementKind::Receipt) => "stock receipt",
            (_, MovementKind::Issue) => "stock issue",
        }
    }
}

/// One intended change inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchItem {
    pub product_id: ProductId,
    pub quantity: i64,
    #[serde(default)]
    pub kind: Option<MovementKind>,
    #[serde(default)]
    pub reason: Option<String>,
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
}

impl BatchItem {
    pub fn new(product_id: ProductId, quantity: i64) -> Self {
        Self {
            product_id,
            quantity,
            kind: None,
            reason: None,
            occurred_at: None,
        }
    }

    pub fn with_kind(mut self, kind: MovementKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }
}

/// Command: record a batch of movements for one store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordBatch {
    pub store_id: StoreId,
    pub operation: BatchOperation,
    pub items: Vec<BatchItem>,
    /// Business date applied to items without their own timestamp.
    #[serde(default)]
    pub occurred_at: Option<DateTime<Utc>>,
    /// When the request is processed; also the balance `updated_at`.
    pub processed_at: DateTime<Utc>,
}

impl RecordBatch {
    pub fn new(
        store_id: StoreId,
        operation: BatchOperation,
        items: Vec<BatchItem>,
        processed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            store_id,
            operation,
            items,
            occurred_at: None,
            processed_at,
        }
    }

    pub fn occurred_at(mut self, occurred_at: DateTime<Utc>) -> Self {
        self.occurred_at = Some(occurred_at);
        self
    }

    /// Validate every item and build the movements to append.
    ///
    /// Fails with the complete list of failing items; nothing is returned
    /// for the valid ones in that case.
    pub fn to_movements(&self, batch_id: BatchId) -> Result<Vec<NewMovement>, BatchRejected> {
        let mut movements = Vec::with_capacity(self.items.len());
        let mut failures = Vec::new();

        for (index, item) in self.items.iter().enumerate() {
            match self.build_movement(item, batch_id) {
                Ok(m) => movements.push(m),
                Err(error) => failures.push(ItemFailure {
                    index,
                    product_id: Some(item.product_id),
                    error,
                }),
            }
        }

        if failures.is_empty() {
            Ok(movements)
        } else {
            Err(BatchRejected { failures })
        }
    }

    fn build_movement(&self, item: &BatchItem, batch_id: BatchId) -> Result<NewMovement, DomainError> {
        let kind = match (self.operation.kind(), item.kind) {
            (Some(expected), Some(given)) if expected != given => {
                return Err(DomainError::validation(format!(
                    "item kind '{given}' does not match '{expected}' batch"
                )));
            }
            (Some(kind), _) | (None, Some(kind)) => kind,
            (None, None) => {
                return Err(DomainError::validation("movement kind is required"));
            }
        };

        let reason = item
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| self.operation.default_reason(kind))
            .to_string();

        let movement = NewMovement {
            kind,
            store_id: self.store_id,
            product_id: item.product_id,
            quantity: item.quantity,
            reason,
            occurred_at: item
                .occurred_at
                .or(self.occurred_at)
                .unwrap_or(self.processed_at),
            batch_id,
        };
        movement.validate()?;
        Ok(movement)
    }
}

/// A single item that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemFailure {
    /// Position of the item in the submitted batch.
    pub index: usize,
    pub product_id: Option<ProductId>,
    pub error: DomainError,
}

impl core::fmt::Display for ItemFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self.product_id {
            Some(p) => write!(f, "item {} (product {}): {}", self.index, p, self.error),
            None => write!(f, "item {}: {}", self.index, self.error),
        }
    }
}

/// The batch was refused; lists every failing item.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("batch rejected: {} item(s) failed validation", .failures.len())]
pub struct BatchRejected {
    pub failures: Vec<ItemFailure>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn store() -> StoreId {
        StoreId::from_raw(1)
    }

    fn product(id: i64) -> ProductId {
        ProductId::from_raw(id)
    }

    fn noon() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 2, 12, 0, 0).unwrap()
    }

    #[test]
    fn receipt_batch_uses_default_reason() {
        let batch = RecordBatch::new(
            store(),
            BatchOperation::ManualReceipt,
            vec![BatchItem::new(product(1), 5), BatchItem::new(product(1), 3).with_reason("  ")],
            noon(),
        );

        let movements = batch.to_movements(BatchId::new()).unwrap();
        assert_eq!(movements.len(), 2);
        assert!(movements.iter().all(|m| m.kind == MovementKind::Receipt));
        assert!(movements.iter().all(|m| m.reason == "stock receipt"));
    }

    #[test]
    fn submitted_batches_with_non_positive_ids_do_not_parse() {
        let bad_store = r#"{"store_id":-3,"operation":"manual_receipt","processed_at":"2024-05-02T12:00:00Z","items":[{"product_id":4,"quantity":5}]}"#;
        assert!(serde_json::from_str::<RecordBatch>(bad_store).is_err());

        let bad_product = r#"{"store_id":1,"operation":"manual_receipt","processed_at":"2024-05-02T12:00:00Z","items":[{"product_id":0,"quantity":5}]}"#;
        let err = serde_json::from_str::<RecordBatch>(bad_product).unwrap_err();
        assert!(err.to_string().contains("ProductId"));

        let good = r#"{"store_id":1,"operation":"manual_receipt","processed_at":"2024-05-02T12:00:00Z","items":[{"product_id":4,"quantity":5}]}"#;
        let batch: RecordBatch = serde_json::from_str(good).unwrap();
        assert_eq!(batch.items[0].product_id, product(4));
        assert_eq!(batch.processed_at, noon());
    }

    #[test]
    fn supplied_reason_is_kept() {
        let batch = RecordBatch::new(
            store(),
            BatchOperation::ManualReceipt,
            vec![BatchItem::new(product(1), 5).with_reason("supplier return")],
            noon(),
        );
        let movements = batch.to_movements(BatchId::new()).unwrap();
        assert_eq!(movements[0].reason, "supplier return");
    }

    #[test]
    fn daily_issue_batch_applies_batch_date() {
        let business_day = Utc.with_ymd_and_hms(2024, 4, 30, 9, 0, 0).unwrap();
        let batch = RecordBatch::new(
            store(),
            BatchOperation::DailyIssue,
            vec![BatchItem::new(product(7), 2)],
            noon(),
        )
        .occurred_at(business_day);

        let movements = batch.to_movements(BatchId::new()).unwrap();
        assert_eq!(movements[0].kind, MovementKind::Issue);
        assert_eq!(movements[0].reason, "daily issue");
        assert_eq!(movements[0].occurred_at, business_day);
    }

    #[test]
    fn item_timestamp_wins_over_batch_timestamp() {
        let own = Utc.with_ymd_and_hms(2024, 4, 1, 8, 0, 0).unwrap();
        let batch = RecordBatch::new(
            store(),
            BatchOperation::InvoiceReceipt,
            vec![BatchItem::new(product(7), 2).at(own)],
            noon(),
        )
        .occurred_at(Utc.with_ymd_and_hms(2024, 4, 30, 9, 0, 0).unwrap());

        let movements = batch.to_movements(BatchId::new()).unwrap();
        assert_eq!(movements[0].occurred_at, own);
        assert_eq!(movements[0].reason, "receipt via invoice");
    }

    #[test]
    fn manual_batch_requires_item_kind() {
        let batch = RecordBatch::new(
            store(),
            BatchOperation::Manual,
            vec![
                BatchItem::new(product(1), 1).with_kind(MovementKind::Issue),
                BatchItem::new(product(2), 1),
            ],
            noon(),
        );

        let err = batch.to_movements(BatchId::new()).unwrap_err();
        assert_eq!(err.failures.len(), 1);
        assert_eq!(err.failures[0].index, 1);
    }

    #[test]
    fn conflicting_item_kind_is_rejected() {
        let batch = RecordBatch::new(
            store(),
            BatchOperation::DailyIssue,
            vec![BatchItem::new(product(1), 1).with_kind(MovementKind::Receipt)],
            noon(),
        );
        assert!(batch.to_movements(BatchId::new()).is_err());
    }

    #[test]
    fn every_failing_item_is_reported() {
        let batch = RecordBatch::new(
            store(),
            BatchOperation::ManualReceipt,
            vec![
                BatchItem::new(product(1), 4),
                BatchItem::new(product(2), -1),
                BatchItem::new(product(3), 0),
            ],
            noon(),
        );

        let err = batch.to_movements(BatchId::new()).unwrap_err();
        let indexes: Vec<_> = err.failures.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![1, 2]);
        assert_eq!(err.failures[0].product_id, Some(product(2)));
        assert!(err.to_string().contains("2 item(s)"));
    }

    proptest! {
        /// Property: a batch validates iff all of its quantities are positive.
        #[test]
        fn batch_validates_iff_all_quantities_positive(
            quantities in prop::collection::vec(-5i64..20i64, 1..12)
        ) {
            let items = quantities
                .iter()
                .enumerate()
                .map(|(i, q)| BatchItem::new(product(i as i64 + 1), *q))
                .collect();
            let batch = RecordBatch::new(store(), BatchOperation::DailyIssue, items, noon());

            let all_positive = quantities.iter().all(|q| *q > 0);
            match batch.to_movements(BatchId::new()) {
                Ok(movements) => {
                    prop_assert!(all_positive);
                    prop_assert_eq!(movements.len(), quantities.len());
                }
                Err(rejected) => {
                    prop_assert!(!all_positive);
                    let bad = quantities.iter().filter(|q| **q <= 0).count();
                    prop_assert_eq!(rejected.failures.len(), bad);
                }
            }
        }
    }
}

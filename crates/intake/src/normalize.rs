//! Partition raw rows into usable, rejected and dropped sets.
//!
//! Dropped rows are noise (blank spreadsheet lines, zero quantities) and are
//! only counted. Rejected rows carry data the ledger cannot accept and must be
//! shown to the user. A bad row never aborts the pass.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tracing::debug;

use stockledger_core::ProductId;
use stockledger_inventory::{BatchItem, CountLine};

use crate::coerce::{self, CoerceError, IntakeOptions};
use crate::row::{RawRow, RawValue};

/// Result of one intake pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Normalized<T> {
    pub valid: Vec<T>,
    pub rejected: Vec<RejectedRow>,
    pub dropped: Vec<DroppedRow>,
}

impl<T> Normalized<T> {
    fn new() -> Self {
        Self {
            valid: Vec::new(),
            rejected: Vec::new(),
            dropped: Vec::new(),
        }
    }

    /// True when nothing needs the user's attention.
    pub fn is_clean(&self) -> bool {
        self.rejected.is_empty()
    }
}

/// Why a row could not be used.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RowProblem {
    #[error("invalid product id: {0}")]
    InvalidProductId(String),
    #[error("missing quantity")]
    MissingQuantity,
    #[error("invalid quantity: {0}")]
    InvalidQuantity(CoerceError),
    #[error("quantity cannot be negative, got {0}")]
    NegativeQuantity(i64),
    #[error("unparseable date '{0}'")]
    InvalidDate(String),
    #[error("missing date")]
    MissingDate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedRow {
    /// Position of the row in the input.
    pub index: usize,
    pub problem: RowProblem,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    MissingProductId,
    ZeroQuantity,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DroppedRow {
    pub index: usize,
    pub reason: DropReason,
}

enum Outcome<T> {
    Valid(T),
    Rejected(RowProblem),
    Dropped(DropReason),
}

/// Normalize movement rows (receipts or issues) into batch items.
///
/// - no product id: dropped
/// - quantity zero: dropped
/// - negative, fractional or non-numeric quantity: rejected
/// - date present but unparseable, or absent when required: rejected
pub fn normalize(rows: &[RawRow], options: &IntakeOptions) -> Normalized<BatchItem> {
    let mut out = Normalized::new();

    for (index, row) in rows.iter().enumerate() {
        match movement_row(row, options) {
            Outcome::Valid(item) => out.valid.push(item),
            Outcome::Rejected(problem) => out.rejected.push(RejectedRow { index, problem }),
            Outcome::Dropped(reason) => out.dropped.push(DroppedRow { index, reason }),
        }
    }

    debug!(
        rows = rows.len(),
        valid = out.valid.len(),
        rejected = out.rejected.len(),
        dropped = out.dropped.len(),
        "normalized movement rows"
    );
    out
}

/// Normalize physical-count rows into count lines.
///
/// Zero is a real count and is kept. Negative counts are rejected. When a
/// product appears more than once the last row wins, keeping the position of
/// its first appearance.
pub fn normalize_counts(rows: &[RawRow], options: &IntakeOptions) -> Normalized<CountLine> {
    let mut out = Normalized::new();
    let mut positions: HashMap<ProductId, usize> = HashMap::new();

    for (index, row) in rows.iter().enumerate() {
        match count_row(row, options) {
            Outcome::Valid(line) => match positions.get(&line.product_id) {
                Some(&pos) => out.valid[pos] = line,
                None => {
                    positions.insert(line.product_id, out.valid.len());
                    out.valid.push(line);
                }
            },
            Outcome::Rejected(problem) => out.rejected.push(RejectedRow { index, problem }),
            Outcome::Dropped(reason) => out.dropped.push(DroppedRow { index, reason }),
        }
    }

    debug!(
        rows = rows.len(),
        valid = out.valid.len(),
        rejected = out.rejected.len(),
        dropped = out.dropped.len(),
        "normalized count rows"
    );
    out
}

fn movement_row(row: &RawRow, options: &IntakeOptions) -> Outcome<BatchItem> {
    let product_id = match product_id(row) {
        Ok(Some(id)) => id,
        Ok(None) => return Outcome::Dropped(DropReason::MissingProductId),
        Err(problem) => return Outcome::Rejected(problem),
    };

    let quantity = match quantity(row) {
        Ok(0) => return Outcome::Dropped(DropReason::ZeroQuantity),
        Ok(q) if q < 0 => return Outcome::Rejected(RowProblem::NegativeQuantity(q)),
        Ok(q) => q,
        Err(problem) => return Outcome::Rejected(problem),
    };

    let occurred_at = match occurred_at(row, options) {
        Ok(ts) => ts,
        Err(problem) => return Outcome::Rejected(problem),
    };

    Outcome::Valid(BatchItem {
        product_id,
        quantity,
        kind: None,
        reason: row.reason.clone(),
        occurred_at,
    })
}

fn count_row(row: &RawRow, options: &IntakeOptions) -> Outcome<CountLine> {
    let product_id = match product_id(row) {
        Ok(Some(id)) => id,
        Ok(None) => return Outcome::Dropped(DropReason::MissingProductId),
        Err(problem) => return Outcome::Rejected(problem),
    };

    let observed = match quantity(row) {
        Ok(q) if q < 0 => return Outcome::Rejected(RowProblem::NegativeQuantity(q)),
        Ok(q) => q,
        Err(problem) => return Outcome::Rejected(problem),
    };

    if let Err(problem) = occurred_at(row, options) {
        return Outcome::Rejected(problem);
    }

    Outcome::Valid(CountLine::new(product_id, observed))
}

fn product_id(row: &RawRow) -> Result<Option<ProductId>, RowProblem> {
    let Some(raw) = &row.product_id else {
        return Ok(None);
    };
    let value = coerce::integer(raw).map_err(|e| RowProblem::InvalidProductId(e.to_string()))?;
    ProductId::new(value)
        .map(Some)
        .map_err(|e| RowProblem::InvalidProductId(e.to_string()))
}

fn quantity(row: &RawRow) -> Result<i64, RowProblem> {
    let raw = row.quantity.as_ref().ok_or(RowProblem::MissingQuantity)?;
    coerce::integer(raw).map_err(RowProblem::InvalidQuantity)
}

fn occurred_at(row: &RawRow, options: &IntakeOptions) -> Result<Option<DateTime<Utc>>, RowProblem> {
    match &row.occurred_at {
        Some(raw) => coerce::timestamp(raw, options).map(Some).ok_or_else(|| {
            RowProblem::InvalidDate(match raw {
                RawValue::Text(s) => s.clone(),
                RawValue::Int(i) => i.to_string(),
                RawValue::Float(f) => f.to_string(),
            })
        }),
        None if options.require_date => Err(RowProblem::MissingDate),
        None => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn options() -> IntakeOptions {
        IntakeOptions::new(Utc.with_ymd_and_hms(2024, 5, 10, 12, 0, 0).unwrap())
    }

    #[test]
    fn zero_quantity_rows_are_filtered() {
        let rows = vec![RawRow::new(1, 0), RawRow::new(2, 4)];
        let out = normalize(&rows, &options());

        assert_eq!(out.valid.len(), 1);
        assert_eq!(out.valid[0].product_id, ProductId::from_raw(2));
        assert_eq!(out.valid[0].quantity, 4);
        assert_eq!(
            out.dropped,
            vec![DroppedRow {
                index: 0,
                reason: DropReason::ZeroQuantity
            }]
        );
        assert!(out.is_clean());
    }

    #[test]
    fn rows_without_product_are_dropped() {
        let rows = vec![
            RawRow {
                quantity: Some(RawValue::Int(3)),
                ..RawRow::default()
            },
            RawRow::default(),
        ];
        let out = normalize(&rows, &options());
        assert!(out.valid.is_empty());
        assert!(out.rejected.is_empty());
        assert_eq!(out.dropped.len(), 2);
    }

    #[test]
    fn malformed_rows_are_surfaced_not_dropped() {
        let rows = vec![
            RawRow::new("ABC-1", 2),
            RawRow::new(3, "lots"),
            RawRow::new(4, -2),
            RawRow::new(5, 1.5),
            RawRow::new(6, 1).with_date("next tuesday"),
            RawRow::new(7, "2.0").with_reason("restock"),
        ];
        let out = normalize(&rows, &options());

        assert_eq!(out.valid.len(), 1);
        assert_eq!(out.valid[0].product_id, ProductId::from_raw(7));
        assert_eq!(out.valid[0].quantity, 2);
        assert_eq!(out.valid[0].reason.as_deref(), Some("restock"));

        let problems: Vec<_> = out.rejected.iter().map(|r| (r.index, r.problem.clone())).collect();
        assert!(matches!(problems[0], (0, RowProblem::InvalidProductId(_))));
        assert!(matches!(problems[1], (1, RowProblem::InvalidQuantity(CoerceError::NotANumber(_)))));
        assert_eq!(problems[2], (2, RowProblem::NegativeQuantity(-2)));
        assert!(matches!(problems[3], (3, RowProblem::InvalidQuantity(CoerceError::Fractional(_)))));
        assert_eq!(problems[4], (4, RowProblem::InvalidDate("next tuesday".to_string())));
    }

    #[test]
    fn required_dates_must_be_present() {
        let rows = vec![RawRow::new(1, 2), RawRow::new(2, 2).with_date("2024-05-01 08:00:00")];
        let out = normalize(&rows, &options().require_date(true));

        assert_eq!(out.rejected, vec![RejectedRow { index: 0, problem: RowProblem::MissingDate }]);
        assert_eq!(
            out.valid[0].occurred_at,
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn zero_is_a_valid_count() {
        let rows = vec![RawRow::new(1, 0), RawRow::new(2, -1), RawRow::new(3, 9)];
        let out = normalize_counts(&rows, &options());

        assert_eq!(
            out.valid,
            vec![
                CountLine::new(ProductId::from_raw(1), 0),
                CountLine::new(ProductId::from_raw(3), 9)
            ]
        );
        assert_eq!(out.rejected[0].problem, RowProblem::NegativeQuantity(-1));
    }

    #[test]
    fn duplicate_counts_keep_the_last_value() {
        let rows = vec![RawRow::new(4, 1), RawRow::new(2, 5), RawRow::new(4, 7)];
        let out = normalize_counts(&rows, &options());
        assert_eq!(
            out.valid,
            vec![
                CountLine::new(ProductId::from_raw(4), 7),
                CountLine::new(ProductId::from_raw(2), 5)
            ]
        );
    }

    proptest! {
        /// Property: every row lands in exactly one of the three sets.
        #[test]
        fn rows_are_partitioned(
            cells in prop::collection::vec((prop::option::of(-3i64..6), -3i64..6), 0..40)
        ) {
            let rows: Vec<RawRow> = cells
                .iter()
                .map(|(id, q)| RawRow {
                    product_id: id.map(RawValue::Int),
                    quantity: Some(RawValue::Int(*q)),
                    ..RawRow::default()
                })
                .collect();

            let out = normalize(&rows, &options());
            prop_assert_eq!(out.valid.len() + out.rejected.len() + out.dropped.len(), rows.len());
            prop_assert!(out.valid.iter().all(|i| i.quantity > 0 && i.product_id.get() > 0));
        }
    }
}

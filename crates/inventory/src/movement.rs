use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{BatchId, DomainError, Entity, MovementId, ProductId, StoreId};

/// Direction of a stock movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MovementKind {
    /// Stock coming in (adds to the balance).
    Receipt,
    /// Stock going out (subtracts from the balance).
    Issue,
}

impl MovementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            MovementKind::Receipt => "receipt",
            MovementKind::Issue => "issue",
        }
    }

    /// Signed contribution of `quantity` units of this kind to a balance.
    pub fn signed(self, quantity: i64) -> i64 {
        match self {
            MovementKind::Receipt => quantity,
            MovementKind::Issue => -quantity,
        }
    }
}

impl core::fmt::Display for MovementKind {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for MovementKind {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "receipt" => Ok(MovementKind::Receipt),
            "issue" => Ok(MovementKind::Issue),
            other => Err(DomainError::validation(format!(
                "unknown movement kind '{other}' (expected receipt or issue)"
            ))),
        }
    }
}

/// A movement ready to be appended (not yet assigned an id).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewMovement {
    pub kind: MovementKind,
    pub store_id: StoreId,
    pub product_id: ProductId,
    /// Always positive; direction is carried by `kind`.
    pub quantity: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
    pub batch_id: BatchId,
}

impl NewMovement {
    /// Check the append preconditions shared by every ledger store.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.quantity <= 0 {
            return Err(DomainError::validation(format!(
                "movement quantity must be positive, got {}",
                self.quantity
            )));
        }
        if self.reason.trim().is_empty() {
            return Err(DomainError::validation("movement reason cannot be empty"));
        }
        Ok(())
    }

    pub fn signed_quantity(&self) -> i64 {
        self.kind.signed(self.quantity)
    }

    /// Attach the id assigned by the store.
    pub fn into_recorded(self, id: MovementId) -> Movement {
        Movement {
            id,
            kind: self.kind,
            store_id: self.store_id,
            product_id: self.product_id,
            quantity: self.quantity,
            reason: self.reason,
            occurred_at: self.occurred_at,
            batch_id: self.batch_id,
        }
    }
}

/// An appended, immutable ledger entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Movement {
    pub id: MovementId,
    pub kind: MovementKind,
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub reason: String,
    pub occurred_at: DateTime<Utc>,
    pub batch_id: BatchId,
}

impl Movement {
    pub fn signed_quantity(&self) -> i64 {
        self.kind.signed(self.quantity)
    }
}

impl Entity for Movement {
    type Id = MovementId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movement(kind: MovementKind, quantity: i64) -> NewMovement {
        NewMovement {
            kind,
            store_id: StoreId::from_raw(1),
            product_id: ProductId::from_raw(10),
            quantity,
            reason: "stock receipt".to_string(),
            occurred_at: Utc::now(),
            batch_id: BatchId::new(),
        }
    }

    #[test]
    fn kind_parses_case_insensitively() {
        assert_eq!(" Receipt ".parse::<MovementKind>().unwrap(), MovementKind::Receipt);
        assert_eq!("ISSUE".parse::<MovementKind>().unwrap(), MovementKind::Issue);
    }

    #[test]
    fn unknown_kind_is_a_validation_error() {
        let err = "transfer".parse::<MovementKind>().unwrap_err();
        assert!(matches!(err, DomainError::Validation(msg) if msg.contains("transfer")));
    }

    #[test]
    fn kind_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&MovementKind::Issue).unwrap(), "\"issue\"");
    }

    #[test]
    fn non_positive_quantities_are_rejected() {
        assert!(movement(MovementKind::Receipt, 0).validate().is_err());
        assert!(movement(MovementKind::Issue, -4).validate().is_err());
        assert!(movement(MovementKind::Issue, 4).validate().is_ok());
    }

    #[test]
    fn blank_reason_is_rejected() {
        let mut m = movement(MovementKind::Receipt, 1);
        m.reason = "   ".to_string();
        assert!(m.validate().is_err());
    }

    #[test]
    fn signed_quantity_follows_kind() {
        assert_eq!(movement(MovementKind::Receipt, 7).signed_quantity(), 7);
        assert_eq!(movement(MovementKind::Issue, 7).signed_quantity(), -7);
    }
}

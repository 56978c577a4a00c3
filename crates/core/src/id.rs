//! Strongly-typed identifiers used across the ledger.
//!
//! Stores, products and movements are keyed by positive integers (they come
//! from reference tables and a database sequence); deserializing one goes
//! through the same check as [`ProductId::new`]. Batches are correlated by a
//! time-ordered UUID.

use core::str::FromStr;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DomainError;

/// Identifier of a store (the physical location holding stock).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct StoreId(i64);

/// Identifier of a product.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct ProductId(i64);

/// Identifier of an appended movement (assigned by the ledger store).
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct MovementId(i64);

/// Correlation id shared by every movement written by one request.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BatchId(Uuid);

macro_rules! impl_int_newtype {
    ($t:ty, $name:literal) => {
        impl $t {
            /// Build an identifier, rejecting zero and negative values.
            pub fn new(value: i64) -> Result<Self, DomainError> {
                if value <= 0 {
                    return Err(DomainError::invalid_id(format!(
                        "{}: must be positive, got {}",
                        $name, value
                    )));
                }
                Ok(Self(value))
            }

            /// Wrap a value already known to be valid (e.g. read back from storage).
            pub const fn from_raw(value: i64) -> Self {
                Self(value)
            }

            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl core::fmt::Display for $t {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                core::fmt::Display::fmt(&self.0, f)
            }
        }

        impl From<$t> for i64 {
            fn from(value: $t) -> Self {
                value.0
            }
        }

        impl TryFrom<i64> for $t {
            type Error = DomainError;

            fn try_from(value: i64) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl FromStr for $t {
            type Err = DomainError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let value = s
                    .trim()
                    .parse::<i64>()
                    .map_err(|e| DomainError::invalid_id(format!("{}: {}", $name, e)))?;
                Self::new(value)
            }
        }
    };
}

impl_int_newtype!(StoreId, "StoreId");
impl_int_newtype!(ProductId, "ProductId");
impl_int_newtype!(MovementId, "MovementId");

impl BatchId {
    /// Create a new batch id.
    ///
    /// Uses UUIDv7 (time-ordered). Prefer passing ids explicitly in tests
    /// for determinism.
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for BatchId {
    fn default() -> Self {
        Self::new()
    }
}

impl core::fmt::Display for BatchId {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Display::fmt(&self.0, f)
    }
}

impl From<Uuid> for BatchId {
    fn from(value: Uuid) -> Self {
        Self(value)
    }
}

impl From<BatchId> for Uuid {
    fn from(value: BatchId) -> Self {
        value.0
    }
}

impl FromStr for BatchId {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let uuid =
            Uuid::from_str(s).map_err(|e| DomainError::invalid_id(format!("BatchId: {e}")))?;
        Ok(Self(uuid))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integer_ids_must_be_positive() {
        assert!(ProductId::new(0).is_err());
        assert!(StoreId::new(-3).is_err());
        assert_eq!(ProductId::new(42).unwrap().get(), 42);
    }

    #[test]
    fn integer_ids_parse_trimmed_strings() {
        assert_eq!(" 17 ".parse::<ProductId>().unwrap(), ProductId::from_raw(17));
        assert!(matches!(
            "abc".parse::<StoreId>(),
            Err(DomainError::InvalidId(msg)) if msg.starts_with("StoreId")
        ));
    }

    #[test]
    fn ids_serialize_transparently() {
        let json = serde_json::to_string(&ProductId::from_raw(9)).unwrap();
        assert_eq!(json, "9");
        let back: StoreId = serde_json::from_str("3").unwrap();
        assert_eq!(back, StoreId::from_raw(3));
    }

    #[test]
    fn deserializing_rejects_non_positive_ids() {
        let err = serde_json::from_str::<ProductId>("0").unwrap_err();
        assert!(err.to_string().contains("ProductId: must be positive"));
        assert!(serde_json::from_str::<StoreId>("-3").is_err());
        assert!(serde_json::from_str::<MovementId>("-1").is_err());
    }

    #[test]
    fn batch_ids_round_trip_through_strings() {
        let id = BatchId::new();
        assert_eq!(id.to_string().parse::<BatchId>().unwrap(), id);
    }
}

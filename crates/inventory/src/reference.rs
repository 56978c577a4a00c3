//! Reference data owned outside the ledger.
//!
//! Stores and products are created and edited by other parts of the system;
//! the ledger only refers to them by id. They are modelled here so callers
//! can pass them around with the ledger's identifier types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use stockledger_core::{Entity, ProductId, StoreId};

/// A store (location holding stock).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Store {
    pub id: StoreId,
    pub name: String,
}

impl Entity for Store {
    type Id = StoreId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// A product as listed in the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: String,
    /// Unit of measure, e.g. "un", "kg".
    pub unit: String,
    /// Price in the smallest currency unit (e.g. cents).
    pub price: i64,
}

impl Entity for Product {
    type Id = ProductId;

    fn id(&self) -> &Self::Id {
        &self.id
    }
}

/// Expiry alert registered for a quantity of product at a store.
///
/// Insert-only record kept next to the ledger. Recording or reconciling
/// stock never reads or writes alerts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityAlert {
    pub store_id: StoreId,
    pub product_id: ProductId,
    pub quantity: i64,
    pub expiration: NaiveDate,
    pub lot: Option<String>,
    pub note: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

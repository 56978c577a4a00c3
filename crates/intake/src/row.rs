//! Raw row model and column-alias mapping.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

/// A cell value as produced by the upstream parser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Int(i64),
    Float(f64),
    Text(String),
}

impl RawValue {
    /// Convert a JSON cell; `null` and empty strings count as absent.
    pub fn from_json(value: &JsonValue) -> Option<Self> {
        match value {
            JsonValue::Null => None,
            JsonValue::Number(n) => match n.as_i64() {
                Some(i) => Some(RawValue::Int(i)),
                None => n.as_f64().map(RawValue::Float),
            },
            JsonValue::String(s) if s.trim().is_empty() => None,
            JsonValue::String(s) => Some(RawValue::Text(s.clone())),
            other => Some(RawValue::Text(other.to_string())),
        }
    }
}

impl From<i64> for RawValue {
    fn from(value: i64) -> Self {
        RawValue::Int(value)
    }
}

impl From<i32> for RawValue {
    fn from(value: i32) -> Self {
        RawValue::Int(value.into())
    }
}

impl From<f64> for RawValue {
    fn from(value: f64) -> Self {
        RawValue::Float(value)
    }
}

impl From<&str> for RawValue {
    fn from(value: &str) -> Self {
        RawValue::Text(value.to_string())
    }
}

impl From<String> for RawValue {
    fn from(value: String) -> Self {
        RawValue::Text(value)
    }
}

/// One input row, before coercion.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawRow {
    pub product_id: Option<RawValue>,
    pub quantity: Option<RawValue>,
    pub reason: Option<String>,
    pub occurred_at: Option<RawValue>,
}

impl RawRow {
    pub fn new(product_id: impl Into<RawValue>, quantity: impl Into<RawValue>) -> Self {
        Self {
            product_id: Some(product_id.into()),
            quantity: Some(quantity.into()),
            reason: None,
            occurred_at: None,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn with_date(mut self, occurred_at: impl Into<RawValue>) -> Self {
        self.occurred_at = Some(occurred_at.into());
        self
    }

    /// Build a row from a header→value record using `aliases`.
    ///
    /// Header lookup ignores case and surrounding whitespace. When several
    /// aliases of one field are present, the first alias in the table wins.
    pub fn from_columns(record: &Map<String, JsonValue>, aliases: &ColumnAliases) -> Self {
        let lookup = |names: &[String]| -> Option<&JsonValue> {
            names.iter().find_map(|alias| {
                record
                    .iter()
                    .find(|(header, _)| header.trim().eq_ignore_ascii_case(alias))
                    .map(|(_, v)| v)
            })
        };

        let reason = lookup(&aliases.reason)
            .and_then(RawValue::from_json)
            .map(|v| match v {
                RawValue::Text(s) => s.trim().to_string(),
                RawValue::Int(i) => i.to_string(),
                RawValue::Float(f) => f.to_string(),
            })
            .filter(|s| !s.is_empty());

        Self {
            product_id: lookup(&aliases.product_id).and_then(RawValue::from_json),
            quantity: lookup(&aliases.quantity).and_then(RawValue::from_json),
            reason,
            occurred_at: lookup(&aliases.occurred_at).and_then(RawValue::from_json),
        }
    }
}

/// Accepted header names per field, in priority order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnAliases {
    pub product_id: Vec<String>,
    pub quantity: Vec<String>,
    pub reason: Vec<String>,
    pub occurred_at: Vec<String>,
}

impl Default for ColumnAliases {
    /// Long names first, then the short sheet headers and invoice tags
    /// (`cProd`, `qCom`) seen in uploads.
    fn default() -> Self {
        fn names(list: &[&str]) -> Vec<String> {
            list.iter().map(|s| s.to_string()).collect()
        }

        Self {
            product_id: names(&["product_id", "produto_id", "cod", "code", "cProd"]),
            quantity: names(&["quantity", "quantidade", "qty", "qCom", "novo_valor"]),
            reason: names(&["reason", "motivo"]),
            occurred_at: names(&["occurred_at", "date", "data"]),
        }
    }
}

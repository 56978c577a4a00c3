//! Domain error model.

use thiserror::Error;

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures. Storage and
/// locking failures belong to the infrastructure layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. non-positive quantity, unknown kind).
    #[error("validation failed: {0}")]
    Validation(String),

    /// A domain invariant was violated.
    #[error("invariant violated: {0}")]
    InvariantViolation(String),

    /// An identifier was invalid (e.g. parse failure, non-positive id).
    #[error("invalid identifier: {0}")]
    InvalidId(String),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invariant(msg: impl Into<String>) -> Self {
        Self::InvariantViolation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    /// True for errors caused by the caller's input rather than by state.
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_) | Self::InvalidId(_))
    }
}

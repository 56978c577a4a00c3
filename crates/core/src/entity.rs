//! Entity trait: identity + continuity across state changes.

/// Entity marker + minimal interface.
///
/// Reference data (stores, products) and ledger rows all have a stable
/// identity; two values with the same id describe the same thing.
pub trait Entity {
    /// Strongly-typed entity identifier.
    type Id: Clone + Eq + core::hash::Hash + core::fmt::Debug;

    /// Returns the entity identifier.
    fn id(&self) -> &Self::Id;
}

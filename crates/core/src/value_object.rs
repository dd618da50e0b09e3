//! Value object trait: equality by value, not identity.

/// Marker trait for value objects.
///
/// Value objects carry no identity and are compared by their attributes.
/// Search criteria are the typical example here: two filter sets with the same
/// fields describe the same search.
pub trait ValueObject: Clone + PartialEq + core::fmt::Debug {
    /// Returns `true` when the value carries no meaningful content.
    fn is_empty(&self) -> bool;
}

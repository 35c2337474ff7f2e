//! Specialized collection types

pub use slotmap::{SlotMap, Key};

slotmap::new_key_type! {
    /// Generation-checked key identifying a geometry resource
    ///
    /// A key whose resource has been removed never resolves again, even if
    /// its slot is reused by a later insertion.
    pub struct ResourceKey;
}

/// Handle-based map using slot map for stable references
pub type HandleMap<T> = SlotMap<ResourceKey, T>;

//! Geometry identity

use crate::foundation::collections::{Key, ResourceKey};

/// Kind of resource a [`GeometryHandle`] refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GeometryType {
    /// Static mesh asset with LOD render data
    StaticAsset,
    /// Editable procedural mesh
    ProceduralMesh,
    /// Anything the collision scene cannot read
    #[default]
    Unknown,
}

/// Stable, generation-checked identity of a resource in a
/// [`GeometryLibrary`](super::GeometryLibrary)
///
/// Once its resource is removed the id never resolves again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct ResourceId(ResourceKey);

impl ResourceId {
    /// An id that never resolves
    pub fn null() -> Self {
        Self(ResourceKey::null())
    }

    /// True for [`ResourceId::null`]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    pub(crate) fn from_key(key: ResourceKey) -> Self {
        Self(key)
    }

    pub(crate) fn key(&self) -> ResourceKey {
        self.0
    }
}

/// Deduplication key for a geometry resource
///
/// Equality and hashing cover all three fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct GeometryHandle {
    /// Kind of resource
    pub geometry_type: GeometryType,
    /// Which resource
    pub resource_identity: ResourceId,
    /// Distinguishes several geometries sharing one resource
    pub sub_id: u64,
}

impl GeometryHandle {
    /// Create a handle from its parts
    pub fn new(geometry_type: GeometryType, resource_identity: ResourceId, sub_id: u64) -> Self {
        Self {
            geometry_type,
            resource_identity,
            sub_id,
        }
    }

    /// Handle to a static mesh asset
    pub fn static_asset(resource_identity: ResourceId) -> Self {
        Self::new(GeometryType::StaticAsset, resource_identity, 0)
    }

    /// Handle to a procedural mesh
    pub fn procedural_mesh(resource_identity: ResourceId) -> Self {
        Self::new(GeometryType::ProceduralMesh, resource_identity, 0)
    }

    /// This handle with a different sub id
    pub fn with_sub_id(self, sub_id: u64) -> Self {
        Self { sub_id, ..self }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::collections::HandleMap;
    use std::collections::HashSet;

    #[test]
    fn test_structural_equality() {
        let mut map: HandleMap<()> = HandleMap::with_key();
        let id = ResourceId::from_key(map.insert(()));
        let other = ResourceId::from_key(map.insert(()));

        let a = GeometryHandle::static_asset(id);
        assert_eq!(a, GeometryHandle::static_asset(id));
        assert_ne!(a, GeometryHandle::static_asset(other));
        assert_ne!(a, GeometryHandle::procedural_mesh(id));
        assert_ne!(a, a.with_sub_id(1));

        let set: HashSet<_> = [a, a, a.with_sub_id(1)].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_null_id() {
        assert!(ResourceId::null().is_null());
        assert!(ResourceId::default().is_null());
        assert_eq!(GeometryHandle::default().geometry_type, GeometryType::Unknown);
    }
}

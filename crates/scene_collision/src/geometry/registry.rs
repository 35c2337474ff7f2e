//! Deduplication of geometry handles
//!
//! Every distinct [`GeometryHandle`] gets exactly one [`UniqueGeometry`] with
//! a dense index, assigned in first-seen order and never reused. Side data
//! kept in parallel arrays (colliders) is addressed by that index.

use std::collections::HashMap;
use std::sync::Arc;

use super::handle::GeometryHandle;

/// One distinct geometry known to a scene
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniqueGeometry {
    /// The handle this entry was created for
    pub handle: GeometryHandle,
    /// Dense, append-only index
    pub index: u32,
}

/// Map from handle to its unique entry
///
/// Mutation happens only while a scene is being built, from a single thread.
#[derive(Debug, Default)]
pub struct UniqueGeometryRegistry {
    geometries: HashMap<GeometryHandle, Arc<UniqueGeometry>>,
    next_index: u32,
}

impl UniqueGeometryRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Entry for `handle`, creating it on first sight
    ///
    /// `on_added` runs exactly once per new entry, before this returns.
    pub fn find_or_add<F>(&mut self, handle: GeometryHandle, on_added: F) -> Arc<UniqueGeometry>
    where
        F: FnOnce(&Arc<UniqueGeometry>),
    {
        if let Some(existing) = self.geometries.get(&handle) {
            return Arc::clone(existing);
        }

        let geometry = Arc::new(UniqueGeometry {
            handle,
            index: self.next_index,
        });
        self.next_index += 1;
        self.geometries.insert(handle, Arc::clone(&geometry));

        log::trace!("Registered unique geometry {} for {:?}", geometry.index, handle);
        on_added(&geometry);
        geometry
    }

    /// Entry for `handle` if it has been registered
    pub fn find(&self, handle: &GeometryHandle) -> Option<&Arc<UniqueGeometry>> {
        self.geometries.get(handle)
    }

    /// Number of unique geometries
    pub fn len(&self) -> usize {
        self.geometries.len()
    }

    /// True if nothing has been registered
    pub fn is_empty(&self) -> bool {
        self.geometries.is_empty()
    }

    /// All entries ordered by index
    pub fn in_index_order(&self) -> Vec<Arc<UniqueGeometry>> {
        let mut geometries: Vec<_> = self.geometries.values().cloned().collect();
        geometries.sort_by_key(|geometry| geometry.index);
        geometries
    }
}

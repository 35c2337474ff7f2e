//! Geometry resources and the library that owns them
//!
//! The library is a generation-checked arena. Static assets are immutable
//! and shared through `Arc`; procedural meshes are editable and sit behind
//! their own `RwLock`, which readers take only while copying data out.

use std::sync::{Arc, PoisonError, RwLock};

use crate::foundation::collections::HandleMap;
use crate::foundation::math::Vec3;
use crate::physics::collision::mesh::TriangleMeshSource;
use crate::spatial::Aabb;
use super::handle::{GeometryHandle, GeometryType, ResourceId};

/// Errors raised by resource operations
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum GeometryError {
    /// The id does not resolve (removed, or never inserted)
    #[error("resource {0:?} does not exist")]
    StaleResource(ResourceId),

    /// The resource exists but is of another kind
    #[error("expected a {expected:?} resource, found {found:?}")]
    WrongType {
        /// Kind the caller asked for
        expected: GeometryType,
        /// Kind actually stored
        found: GeometryType,
    },

    /// A triangle references a vertex that is not live
    #[error("vertex {0} does not exist")]
    InvalidVertex(u32),
}

/// Render data of one LOD of a static mesh
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StaticMeshLod {
    /// Vertex positions in model space
    pub positions: Vec<Vec3>,
    /// Flat triangle index list
    pub indices: Vec<u32>,
}

impl StaticMeshLod {
    /// Create LOD render data
    pub fn new(positions: Vec<Vec3>, indices: Vec<u32>) -> Self {
        Self { positions, indices }
    }
}

impl TriangleMeshSource for StaticMeshLod {
    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn vertex(&self, index: usize) -> Vec3 {
        self.positions[index]
    }

    fn triangle(&self, index: usize) -> [u32; 3] {
        let base = index * 3;
        [self.indices[base], self.indices[base + 1], self.indices[base + 2]]
    }
}

/// Immutable static mesh asset
///
/// LODs without render data (not streamed in) are `None`.
#[derive(Debug, Clone, Default)]
pub struct StaticMeshAsset {
    name: String,
    lods: Vec<Option<StaticMeshLod>>,
}

impl StaticMeshAsset {
    /// Create an asset without any LOD
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            lods: Vec::new(),
        }
    }

    /// Create an asset with a single LOD
    pub fn from_lod(name: impl Into<String>, lod: StaticMeshLod) -> Self {
        Self::new(name).with_lod(Some(lod))
    }

    /// Append a LOD (builder style)
    pub fn with_lod(mut self, lod: Option<StaticMeshLod>) -> Self {
        self.lods.push(lod);
        self
    }

    /// Asset name, for logging
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of LOD slots
    pub fn lod_count(&self) -> usize {
        self.lods.len()
    }

    /// The first LOD, starting at LOD 0, that has render data
    pub fn first_lod_with_data(&self) -> Option<&StaticMeshLod> {
        self.lods.iter().flatten().next()
    }

    /// Model-space bounds of the first LOD with render data
    pub fn local_bounds(&self) -> Aabb {
        self.first_lod_with_data()
            .map_or_else(Aabb::empty, |lod| Aabb::from_points(lod.positions.iter().copied()))
    }
}

/// Editable triangle mesh
///
/// Removing vertices or triangles leaves holes, so ids stay stable while
/// editing. Use [`DynamicMesh::compact_view`] to read it as a dense mesh.
#[derive(Debug, Clone, Default)]
pub struct DynamicMesh {
    vertices: Vec<Option<Vec3>>,
    triangles: Vec<Option<[u32; 3]>>,
}

impl DynamicMesh {
    /// Create an empty mesh
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a compact mesh from vertices and a flat index list
    pub fn from_vertices(positions: &[Vec3], indices: &[u32]) -> Result<Self, GeometryError> {
        let mut mesh = Self::new();
        for position in positions {
            mesh.append_vertex(*position);
        }
        for tri in indices.chunks_exact(3) {
            mesh.append_triangle([tri[0], tri[1], tri[2]])?;
        }
        Ok(mesh)
    }

    /// Add a vertex, returns its id
    pub fn append_vertex(&mut self, position: Vec3) -> u32 {
        self.vertices.push(Some(position));
        (self.vertices.len() - 1) as u32
    }

    /// Add a triangle over live vertices, returns its id
    pub fn append_triangle(&mut self, triangle: [u32; 3]) -> Result<u32, GeometryError> {
        if let Some(&vertex) = triangle.iter().find(|&&v| !self.is_vertex(v)) {
            return Err(GeometryError::InvalidVertex(vertex));
        }
        self.triangles.push(Some(triangle));
        Ok((self.triangles.len() - 1) as u32)
    }

    /// Move a live vertex
    pub fn set_vertex(&mut self, vertex: u32, position: Vec3) -> Result<(), GeometryError> {
        match self.vertices.get_mut(vertex as usize) {
            Some(Some(slot)) => {
                *slot = position;
                Ok(())
            }
            _ => Err(GeometryError::InvalidVertex(vertex)),
        }
    }

    /// Remove a triangle, returns false if it was not live
    pub fn remove_triangle(&mut self, triangle: u32) -> bool {
        self.triangles
            .get_mut(triangle as usize)
            .and_then(Option::take)
            .is_some()
    }

    /// Remove a vertex and every triangle using it, returns false if it was not live
    pub fn remove_vertex(&mut self, vertex: u32) -> bool {
        let removed = self
            .vertices
            .get_mut(vertex as usize)
            .and_then(Option::take)
            .is_some();
        if removed {
            for slot in &mut self.triangles {
                if slot.is_some_and(|tri| tri.contains(&vertex)) {
                    *slot = None;
                }
            }
        }
        removed
    }

    /// True if `vertex` is a live vertex id
    pub fn is_vertex(&self, vertex: u32) -> bool {
        matches!(self.vertices.get(vertex as usize), Some(Some(_)))
    }

    /// Number of live vertices
    pub fn vertex_count(&self) -> usize {
        self.vertices.iter().flatten().count()
    }

    /// Number of live triangles
    pub fn triangle_count(&self) -> usize {
        self.triangles.iter().flatten().count()
    }

    /// True if there are no holes in either id range
    pub fn is_compact(&self) -> bool {
        self.vertices.iter().all(Option::is_some) && self.triangles.iter().all(Option::is_some)
    }

    /// Model-space bounds of the live vertices
    pub fn bounds(&self) -> Aabb {
        Aabb::from_points(self.vertices.iter().flatten().copied())
    }

    /// Dense view with vertices and triangles renumbered in id order
    pub fn compact_view(&self) -> CompactDynamicMesh<'_> {
        let mut remap = vec![u32::MAX; self.vertices.len()];
        let mut live_vertices = Vec::with_capacity(self.vertices.len());
        for (id, vertex) in self.vertices.iter().enumerate() {
            if vertex.is_some() {
                remap[id] = live_vertices.len() as u32;
                live_vertices.push(id as u32);
            }
        }

        CompactDynamicMesh {
            mesh: self,
            live_vertices,
            live_triangles: self
                .triangles
                .iter()
                .enumerate()
                .filter_map(|(id, tri)| tri.map(|_| id as u32))
                .collect(),
            remap,
        }
    }
}

/// Dense read view over a possibly non-compact [`DynamicMesh`]
pub struct CompactDynamicMesh<'a> {
    mesh: &'a DynamicMesh,
    live_vertices: Vec<u32>,
    live_triangles: Vec<u32>,
    /// Mesh vertex id to dense index
    remap: Vec<u32>,
}

impl TriangleMeshSource for CompactDynamicMesh<'_> {
    fn vertex_count(&self) -> usize {
        self.live_vertices.len()
    }

    fn triangle_count(&self) -> usize {
        self.live_triangles.len()
    }

    fn vertex(&self, index: usize) -> Vec3 {
        let id = self.live_vertices[index] as usize;
        self.mesh.vertices[id].unwrap_or_else(Vec3::zeros)
    }

    fn triangle(&self, index: usize) -> [u32; 3] {
        let id = self.live_triangles[index] as usize;
        // Live triangles only reference live vertices
        self.mesh.triangles[id].map_or([u32::MAX; 3], |tri| tri.map(|v| self.remap[v as usize]))
    }
}

/// A resource stored in a [`GeometryLibrary`]
#[derive(Debug, Clone)]
pub enum GeometryResource {
    /// Static mesh asset
    StaticMesh(Arc<StaticMeshAsset>),
    /// Procedural mesh
    ProceduralMesh(Arc<RwLock<DynamicMesh>>),
}

impl GeometryResource {
    /// The handle type that refers to this resource
    pub fn geometry_type(&self) -> GeometryType {
        match self {
            Self::StaticMesh(_) => GeometryType::StaticAsset,
            Self::ProceduralMesh(_) => GeometryType::ProceduralMesh,
        }
    }

    /// Model-space bounds
    pub fn local_bounds(&self) -> Aabb {
        match self {
            Self::StaticMesh(asset) => asset.local_bounds(),
            Self::ProceduralMesh(mesh) => mesh.read().unwrap_or_else(PoisonError::into_inner).bounds(),
        }
    }
}

/// Thread-safe, generation-checked store of geometry resources
#[derive(Debug, Default)]
pub struct GeometryLibrary {
    resources: RwLock<HandleMap<GeometryResource>>,
}

impl GeometryLibrary {
    /// Create an empty library
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&self, resource: GeometryResource) -> GeometryHandle {
        let geometry_type = resource.geometry_type();
        let key = self
            .resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(resource);
        GeometryHandle::new(geometry_type, ResourceId::from_key(key), 0)
    }

    /// Add a static mesh asset, returns its handle
    pub fn insert_static_mesh(&self, asset: StaticMeshAsset) -> GeometryHandle {
        self.insert(GeometryResource::StaticMesh(Arc::new(asset)))
    }

    /// Add a procedural mesh, returns its handle and the shared mesh for editing
    pub fn insert_procedural_mesh(&self, mesh: DynamicMesh) -> (GeometryHandle, Arc<RwLock<DynamicMesh>>) {
        let shared = Arc::new(RwLock::new(mesh));
        let handle = self.insert(GeometryResource::ProceduralMesh(Arc::clone(&shared)));
        (handle, shared)
    }

    /// Remove a resource; its id never resolves again
    pub fn remove(&self, id: ResourceId) -> Result<GeometryResource, GeometryError> {
        self.resources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id.key())
            .ok_or(GeometryError::StaleResource(id))
    }

    /// True if `id` resolves
    pub fn contains(&self, id: ResourceId) -> bool {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(id.key())
    }

    /// Number of stored resources
    pub fn len(&self) -> usize {
        self.resources.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// True if no resource is stored
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Look up a resource by id
    pub fn get(&self, id: ResourceId) -> Option<GeometryResource> {
        self.resources
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id.key())
            .cloned()
    }

    /// Look up the resource a handle refers to, checking its type
    pub fn resolve(&self, handle: &GeometryHandle) -> Result<GeometryResource, GeometryError> {
        let resource = self
            .get(handle.resource_identity)
            .ok_or(GeometryError::StaleResource(handle.resource_identity))?;
        if resource.geometry_type() != handle.geometry_type {
            return Err(GeometryError::WrongType {
                expected: handle.geometry_type,
                found: resource.geometry_type(),
            });
        }
        Ok(resource)
    }

    /// Static mesh a handle refers to
    ///
    /// Passing a handle of another type is a programmer error.
    pub fn static_mesh(&self, handle: &GeometryHandle) -> Option<Arc<StaticMeshAsset>> {
        debug_assert_eq!(handle.geometry_type, GeometryType::StaticAsset);
        match self.resolve(handle).ok()? {
            GeometryResource::StaticMesh(asset) => Some(asset),
            GeometryResource::ProceduralMesh(_) => None,
        }
    }

    /// Procedural mesh a handle refers to
    ///
    /// Passing a handle of another type is a programmer error.
    pub fn procedural_mesh(&self, handle: &GeometryHandle) -> Option<Arc<RwLock<DynamicMesh>>> {
        debug_assert_eq!(handle.geometry_type, GeometryType::ProceduralMesh);
        match self.resolve(handle).ok()? {
            GeometryResource::ProceduralMesh(mesh) => Some(mesh),
            GeometryResource::StaticMesh(_) => None,
        }
    }

    /// Model-space bounds of the resource a handle refers to
    pub fn local_bounds(&self, handle: &GeometryHandle) -> Option<Aabb> {
        self.resolve(handle).ok().map(|resource| resource.local_bounds())
    }
}

//! Collision mesh representations
//!
//! Provides the minimal packed mesh copy that colliders are built from, and
//! the adapter trait that resource kinds implement to be packed.

use crate::foundation::math::Vec3;
use crate::spatial::Aabb;
use super::primitives::Triangle;

/// Minimal read-only view over a triangle mesh
///
/// Implemented by each resource kind so that colliders can copy out a
/// dense (vertex, triangle) representation without knowing the storage.
pub trait TriangleMeshSource {
    /// Number of vertices
    fn vertex_count(&self) -> usize;

    /// Number of triangles
    fn triangle_count(&self) -> usize;

    /// Position of vertex `index`
    fn vertex(&self, index: usize) -> Vec3;

    /// Vertex indices of triangle `index`
    fn triangle(&self, index: usize) -> [u32; 3];
}

/// Errors raised while packing a mesh
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    /// A triangle references a vertex that does not exist
    #[error("triangle {triangle} references vertex {vertex}, but the mesh has {vertex_count} vertices")]
    InvalidTriangle {
        /// Triangle index
        triangle: usize,
        /// Offending vertex index
        vertex: u32,
        /// Number of vertices in the mesh
        vertex_count: usize,
    },
}

/// A packed collision mesh stored in MODEL SPACE (local coordinates)
///
/// Vertex and triangle arrays are dense; every triangle index is valid.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PackedMesh {
    positions: Vec<Vec3>,
    triangles: Vec<[u32; 3]>,
}

impl PackedMesh {
    /// Copy a mesh out of any [`TriangleMeshSource`], validating indices
    pub fn from_source<S: TriangleMeshSource + ?Sized>(source: &S) -> Result<Self, MeshError> {
        let vertex_count = source.vertex_count();
        let positions: Vec<Vec3> = (0..vertex_count).map(|k| source.vertex(k)).collect();

        let triangle_count = source.triangle_count();
        let mut triangles = Vec::with_capacity(triangle_count);
        for k in 0..triangle_count {
            let tri = source.triangle(k);
            if let Some(&vertex) = tri.iter().find(|&&v| v as usize >= vertex_count) {
                return Err(MeshError::InvalidTriangle {
                    triangle: k,
                    vertex,
                    vertex_count,
                });
            }
            triangles.push(tri);
        }

        Ok(Self {
            positions,
            triangles,
        })
    }

    /// Creates a packed mesh from MODEL SPACE vertices and a flat index list
    /// A trailing partial triangle is ignored
    pub fn from_vertices(vertices: &[Vec3], indices: &[u32]) -> Result<Self, MeshError> {
        let view = IndexedTriangles { vertices, indices };
        Self::from_source(&view)
    }

    /// Number of vertices
    pub fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    /// Number of triangles
    pub fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    /// True if the mesh has no triangles
    pub fn is_empty(&self) -> bool {
        self.triangles.is_empty()
    }

    /// All vertex positions
    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    /// All triangles as vertex index triples
    pub fn triangles(&self) -> &[[u32; 3]] {
        &self.triangles
    }

    /// Geometry of triangle `index`
    pub fn triangle(&self, index: usize) -> Triangle {
        let [a, b, c] = self.triangles[index];
        Triangle::new(
            self.positions[a as usize],
            self.positions[b as usize],
            self.positions[c as usize],
        )
    }

    /// Bounds of every vertex after mapping it through `local_to_world`
    pub fn bounds_with<F>(&self, local_to_world: F) -> Aabb
    where
        F: Fn(&Vec3) -> Vec3,
    {
        Aabb::from_points(self.positions.iter().map(local_to_world))
    }

    /// Model-space bounds
    pub fn local_bounds(&self) -> Aabb {
        Aabb::from_points(self.positions.iter().copied())
    }
}

impl TriangleMeshSource for PackedMesh {
    fn vertex_count(&self) -> usize {
        self.positions.len()
    }

    fn triangle_count(&self) -> usize {
        self.triangles.len()
    }

    fn vertex(&self, index: usize) -> Vec3 {
        self.positions[index]
    }

    fn triangle(&self, index: usize) -> [u32; 3] {
        self.triangles[index]
    }
}

/// Borrowed vertex + flat index list view
struct IndexedTriangles<'a> {
    vertices: &'a [Vec3],
    indices: &'a [u32],
}

impl TriangleMeshSource for IndexedTriangles<'_> {
    fn vertex_count(&self) -> usize {
        self.vertices.len()
    }

    fn triangle_count(&self) -> usize {
        self.indices.len() / 3
    }

    fn vertex(&self, index: usize) -> Vec3 {
        self.vertices[index]
    }

    fn triangle(&self, index: usize) -> [u32; 3] {
        let base = index * 3;
        [self.indices[base], self.indices[base + 1], self.indices[base + 2]]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn quad() -> (Vec<Vec3>, Vec<u32>) {
        (
            vec![
                Vec3::new(0.0, 0.0, 0.0),
                Vec3::new(2.0, 0.0, 0.0),
                Vec3::new(2.0, 1.0, 0.0),
                Vec3::new(0.0, 1.0, 0.0),
            ],
            vec![0, 1, 2, 0, 2, 3],
        )
    }

    #[test]
    fn test_pack_from_vertices() {
        let (vertices, indices) = quad();
        let mesh = PackedMesh::from_vertices(&vertices, &indices).unwrap();
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.triangle(1).v2, Vec3::new(0.0, 1.0, 0.0));
        assert_eq!(mesh.local_bounds().max, Vec3::new(2.0, 1.0, 0.0));
    }

    #[test]
    fn test_invalid_index_rejected() {
        let (vertices, _) = quad();
        let result = PackedMesh::from_vertices(&vertices, &[0, 1, 7]);
        assert_eq!(
            result,
            Err(MeshError::InvalidTriangle { triangle: 0, vertex: 7, vertex_count: 4 })
        );
    }

    #[test]
    fn test_partial_triangle_ignored() {
        let (vertices, _) = quad();
        let mesh = PackedMesh::from_vertices(&vertices, &[0, 1, 2, 3]).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
    }

    #[test]
    fn test_bounds_with_transform() {
        let (vertices, indices) = quad();
        let mesh = PackedMesh::from_vertices(&vertices, &indices).unwrap();
        let bounds = mesh.bounds_with(|p| p + Vec3::new(0.0, 0.0, 10.0));
        assert_eq!(bounds.min.z, 10.0);
        assert_eq!(bounds.max.x, 2.0);
    }
}

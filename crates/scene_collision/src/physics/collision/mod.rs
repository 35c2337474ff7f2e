//! Collision geometry
//!
//! Shapes are stored in model space and mapped into another space only while
//! a test runs.
//!
//! - [`primitives`] - Rays and triangles with their intersection tests
//! - [`mesh`] - Packed triangle meshes and the adapter trait that produces them

pub mod primitives;
pub mod mesh;

// Re-export commonly used types
pub use primitives::{Ray, Triangle};
pub use mesh::{MeshError, PackedMesh, TriangleMeshSource};

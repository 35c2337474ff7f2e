//! Physics module for collision detection
//!
//! Only geometric queries live here: primitives and packed meshes. There is
//! no simulation.

pub mod collision;

pub use collision::{MeshError, PackedMesh, Ray, Triangle, TriangleMeshSource};

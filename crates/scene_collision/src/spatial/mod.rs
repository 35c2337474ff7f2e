//! Spatial partitioning data structures
//!
//! Provides bounding boxes, the per-mesh triangle hierarchy used by
//! colliders, and the sparse octree used as the scene broad phase.

mod aabb;
pub mod aabb_tree;
mod octree;

pub use aabb::Aabb;
pub use aabb_tree::{AabbTree, TreeRayHit};
pub use octree::{OctreeConfig, SparseOctree};

//! Geometry identity, resources and deduplication

pub mod handle;
pub mod registry;
pub mod resources;

pub use handle::{GeometryHandle, GeometryType, ResourceId};
pub use registry::{UniqueGeometry, UniqueGeometryRegistry};
pub use resources::{
    CompactDynamicMesh, DynamicMesh, GeometryError, GeometryLibrary, GeometryResource, StaticMeshAsset,
    StaticMeshLod,
};

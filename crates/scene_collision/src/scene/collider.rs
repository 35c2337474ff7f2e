//! Per-geometry collision data
//!
//! A [`Collider`] is created for every unique geometry when it is first
//! registered, built once from the resource its handle names, and read-only
//! afterwards. A collider that failed to build, or has not been built yet,
//! never collides and is never hit.

use std::sync::PoisonError;

use crate::foundation::math::{Transform, TransformSequence, Vec3};
use crate::geometry::{GeometryHandle, GeometryLibrary, GeometryType};
use crate::physics::collision::mesh::{MeshError, PackedMesh};
use crate::physics::collision::primitives::Ray;
use crate::scene::source::{ActorRef, ComponentRef};
use crate::spatial::{Aabb, AabbTree};

/// Directions shorter than this cannot be mapped into a collider's space
const MIN_LOCAL_DIRECTION: f64 = 1.0e-12;

/// Reasons a collider fails to build
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum ColliderBuildError {
    /// The handle no longer resolves in the library
    #[error("geometry {0:?} does not resolve to a resource")]
    MissingResource(GeometryHandle),

    /// A static asset without any LOD render data
    #[error("static mesh {0:?} has no LOD with render data")]
    NoRenderData(GeometryHandle),

    /// The mesh has no triangles
    #[error("geometry {0:?} has no triangles")]
    EmptyMesh(GeometryHandle),

    /// The mesh data is inconsistent
    #[error("invalid mesh data: {0}")]
    InvalidMesh(#[from] MeshError),

    /// The handle names a geometry type colliders cannot read
    #[error("geometry type {0:?} is not supported")]
    UnsupportedGeometry(GeometryType),
}

/// Which resource adapter a collider reads from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColliderSource {
    /// Static mesh render data
    StaticMesh,
    /// Live procedural mesh data
    ProceduralMesh,
    /// Nothing readable
    Unsupported,
}

impl From<GeometryType> for ColliderSource {
    fn from(geometry_type: GeometryType) -> Self {
        match geometry_type {
            GeometryType::StaticAsset => Self::StaticMesh,
            GeometryType::ProceduralMesh => Self::ProceduralMesh,
            GeometryType::Unknown => Self::Unsupported,
        }
    }
}

/// Build state of a collider
#[derive(Debug, Clone)]
pub enum ColliderState {
    /// Not built yet
    Pending,
    /// Built and immutable
    Built {
        /// Packed model-space mesh
        mesh: PackedMesh,
        /// Tree over the mesh triangles
        tree: AabbTree,
    },
    /// Build failed, stays failed
    Failed(ColliderBuildError),
}

/// Result of a ray cast against placed geometry
#[derive(Debug, Clone)]
pub struct RayHit {
    /// Distance from the ray origin to the hit, in world units
    pub distance: f64,
    /// Triangle index in the collider's packed mesh
    pub triangle_id: u32,
    /// Barycentric coordinates of the hit on that triangle
    pub barycentric: Vec3,
    /// Hit position in the geometry's model space
    pub local_position: Vec3,
    /// Hit position in world space
    pub world_position: Vec3,
    /// Geometry that was hit
    pub geometry_handle: GeometryHandle,
    /// Transform the geometry was placed with
    pub local_to_world: TransformSequence,
    /// Actor owning the hit instance, filled in by the scene
    pub actor: Option<ActorRef>,
    /// Component owning the hit instance, filled in by the scene
    pub component: Option<ComponentRef>,
    /// Instance slot inside the component, for instanced components
    pub component_instance: Option<usize>,
}

/// Collision data for one unique geometry
#[derive(Debug, Clone)]
pub struct Collider {
    handle: GeometryHandle,
    source: ColliderSource,
    state: ColliderState,
}

impl Collider {
    /// Create an unbuilt collider for `handle`
    pub fn new(handle: GeometryHandle) -> Self {
        Self {
            handle,
            source: ColliderSource::from(handle.geometry_type),
            state: ColliderState::Pending,
        }
    }

    /// Geometry this collider was created for
    pub fn handle(&self) -> &GeometryHandle {
        &self.handle
    }

    /// Adapter this collider reads from
    pub fn source(&self) -> ColliderSource {
        self.source
    }

    /// Current build state
    pub fn state(&self) -> &ColliderState {
        &self.state
    }

    /// True once built successfully
    pub fn is_built(&self) -> bool {
        matches!(self.state, ColliderState::Built { .. })
    }

    /// True until the first build attempt
    pub fn is_pending(&self) -> bool {
        matches!(self.state, ColliderState::Pending)
    }

    /// Error of the failed build, if it failed
    pub fn build_error(&self) -> Option<&ColliderBuildError> {
        match &self.state {
            ColliderState::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Number of triangles, zero unless built
    pub fn triangle_count(&self) -> usize {
        match &self.state {
            ColliderState::Built { mesh, .. } => mesh.triangle_count(),
            _ => 0,
        }
    }

    fn built(&self) -> Option<(&PackedMesh, &AabbTree)> {
        match &self.state {
            ColliderState::Built { mesh, tree } => Some((mesh, tree)),
            _ => None,
        }
    }

    /// Copy the mesh out of its resource and build the tree
    ///
    /// Only the first attempt does any work; later calls report the stored
    /// outcome. Touches no state shared with other colliders.
    pub fn build(&mut self, library: &GeometryLibrary) -> Result<(), ColliderBuildError> {
        match &self.state {
            ColliderState::Built { .. } => return Ok(()),
            ColliderState::Failed(error) => return Err(error.clone()),
            ColliderState::Pending => {}
        }

        let result = self.pack(library).and_then(|mesh| {
            if mesh.is_empty() {
                Err(ColliderBuildError::EmptyMesh(self.handle))
            } else {
                Ok(mesh)
            }
        });

        match result {
            Ok(mesh) => {
                let tree = AabbTree::build(&mesh);
                log::trace!(
                    "Built collider for {:?}: {} triangles, {} tree nodes",
                    self.handle,
                    mesh.triangle_count(),
                    tree.node_count()
                );
                self.state = ColliderState::Built { mesh, tree };
                Ok(())
            }
            Err(error) => {
                self.state = ColliderState::Failed(error.clone());
                Err(error)
            }
        }
    }

    fn pack(&self, library: &GeometryLibrary) -> Result<PackedMesh, ColliderBuildError> {
        match self.source {
            ColliderSource::StaticMesh => {
                let asset = library
                    .static_mesh(&self.handle)
                    .ok_or(ColliderBuildError::MissingResource(self.handle))?;
                let Some(lod) = asset.first_lod_with_data() else {
                    log::debug!("Static mesh '{}' has no LOD with render data", asset.name());
                    return Err(ColliderBuildError::NoRenderData(self.handle));
                };
                log::trace!("Packing static mesh '{}'", asset.name());
                Ok(PackedMesh::from_source(lod)?)
            }
            ColliderSource::ProceduralMesh => {
                let shared = library
                    .procedural_mesh(&self.handle)
                    .ok_or(ColliderBuildError::MissingResource(self.handle))?;
                let mesh = shared.read().unwrap_or_else(PoisonError::into_inner);
                let packed = PackedMesh::from_source(&mesh.compact_view())?;
                Ok(packed)
            }
            ColliderSource::Unsupported => Err(ColliderBuildError::UnsupportedGeometry(self.handle.geometry_type)),
        }
    }

    /// Bounds of every vertex mapped through `local_to_world`, empty unless built
    pub fn world_bounds<F>(&self, local_to_world: F) -> Aabb
    where
        F: Fn(&Vec3) -> Vec3,
    {
        self.built()
            .map_or_else(Aabb::empty, |(mesh, _)| mesh.bounds_with(local_to_world))
    }

    /// Nearest hit of a world-space ray on this geometry placed at `local_to_world`
    pub fn ray_intersect(&self, world_ray: &Ray, local_to_world: &TransformSequence) -> Option<RayHit> {
        let (mesh, tree) = self.built()?;

        let local_origin = local_to_world.inverse_transform_position(&world_ray.origin);
        let local_direction = local_to_world.inverse_transform_vector(&world_ray.direction);
        if local_direction.norm() <= MIN_LOCAL_DIRECTION {
            return None;
        }
        let local_ray = Ray::new(local_origin, local_direction);

        let hit = tree.find_nearest_hit(mesh, &local_ray)?;
        let local_position = local_ray.point_at(hit.distance);
        let world_position = local_to_world.transform_position(&local_position);

        Some(RayHit {
            distance: world_ray.parameter_of(&world_position),
            triangle_id: hit.triangle,
            barycentric: hit.barycentric,
            local_position,
            world_position,
            geometry_handle: self.handle,
            local_to_world: local_to_world.clone(),
            actor: None,
            component: None,
            component_instance: None,
        })
    }

    /// Test this collider against `other`, whose points `other_to_self` maps
    /// into this collider's model space
    pub fn test_intersection<F>(&self, other: &Collider, other_to_self: F) -> bool
    where
        F: Fn(&Vec3) -> Vec3,
    {
        match (self.built(), other.built()) {
            (Some((mesh, tree)), Some((other_mesh, other_tree))) => {
                tree.test_intersection(mesh, other_tree, other_mesh, other_to_self)
            }
            _ => false,
        }
    }

    /// Test this collider placed at `self_to_world` against `other` placed at `other_to_world`
    pub fn test_collision(
        &self,
        self_to_world: &TransformSequence,
        other: &Collider,
        other_to_world: &TransformSequence,
    ) -> bool {
        self.test_intersection(other, |p| {
            self_to_world.inverse_transform_position(&other_to_world.transform_position(p))
        })
    }

    /// Test with both placements given as single transforms
    pub fn test_collision_at(&self, self_to_world: &Transform, other: &Collider, other_to_world: &Transform) -> bool {
        self.test_collision(
            &TransformSequence::from_transform(*self_to_world),
            other,
            &TransformSequence::from_transform(*other_to_world),
        )
    }
}

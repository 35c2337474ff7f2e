//! Boundary between the collision scene and whatever owns the actors
//!
//! A caller hands in actors as trait objects. Each actor reports its
//! components and bounds; each component reports its kind, its geometry
//! handle and its transforms. Nothing here is owned by the scene.

use std::fmt;
use std::sync::Arc;

use crate::foundation::math::{Transform, Vec3};
use crate::geometry::GeometryHandle;
use crate::spatial::Aabb;

/// Stable identity of a scene actor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u64);

/// How a component places its geometry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ComponentKind {
    /// One static mesh placed at the component transform
    Mesh,
    /// Many placements of one static mesh
    InstancedMesh,
    /// Instanced mesh with a culling hierarchy, placed the same way
    HierarchicalInstancedMesh,
    /// One procedural mesh placed at the component transform
    ProceduralMesh,
    /// Not understood by the scene, routed to observer hooks
    Unknown,
}

impl ComponentKind {
    /// True for the kinds that expand into one instance per sub-instance
    pub fn is_instanced(self) -> bool {
        matches!(self, Self::InstancedMesh | Self::HierarchicalInstancedMesh)
    }
}

/// Actor bounds as reported by the actor: center and half-size
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ActorBounds {
    /// Center
    pub origin: Vec3,
    /// Half-size, negative on any axis for an actor without bounds
    pub extent: Vec3,
}

impl ActorBounds {
    /// Bounds of an actor that has nothing to bound
    pub fn empty() -> Self {
        Self {
            origin: Vec3::zeros(),
            extent: Vec3::repeat(-1.0),
        }
    }

    /// Convert from a box
    pub fn from_aabb(bounds: &Aabb) -> Self {
        if bounds.is_empty() {
            Self::empty()
        } else {
            Self {
                origin: bounds.center(),
                extent: bounds.extents(),
            }
        }
    }

    /// Convert to a box, empty when any extent is negative
    pub fn to_aabb(&self) -> Aabb {
        if self.extent.iter().any(|&e| e < 0.0) {
            Aabb::empty()
        } else {
            Aabb::from_center_extents(self.origin, self.extent)
        }
    }
}

/// A component attached to a scene actor
pub trait SceneComponent: fmt::Debug + Send + Sync {
    /// Kind of this component
    fn kind(&self) -> ComponentKind;

    /// Geometry placed by this component, `None` if it has none
    fn geometry_handle(&self) -> Option<GeometryHandle>;

    /// Current component-to-world transform
    fn component_to_world(&self) -> Transform;

    /// World bounds of everything this component places
    fn world_bounds(&self) -> Aabb;

    /// Number of instance slots, including removed ones (instanced kinds only)
    fn instance_count(&self) -> usize {
        0
    }

    /// True if instance slot `index` holds a live instance
    fn is_valid_instance(&self, index: usize) -> bool {
        let _ = index;
        false
    }

    /// Instance-to-component transform of a live instance
    fn instance_transform(&self, index: usize) -> Option<Transform> {
        let _ = index;
        None
    }
}

/// An actor in the scene
pub trait SceneActor: fmt::Debug + Send + Sync {
    /// Identity of this actor
    fn id(&self) -> ActorId;

    /// Components attached to this actor
    fn components(&self) -> Vec<ComponentRef>;

    /// Display name, for logging
    fn name(&self) -> &str {
        ""
    }

    /// Actors attached below this one
    fn child_actors(&self) -> Vec<ActorRef> {
        Vec::new()
    }

    /// Current world bounds of the actor, including its child actors
    fn bounds(&self) -> ActorBounds;
}

/// Shared reference to a scene actor
pub type ActorRef = Arc<dyn SceneActor>;

/// Shared reference to a scene component
pub type ComponentRef = Arc<dyn SceneComponent>;

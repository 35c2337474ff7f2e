//! Scene layer
//!
//! Turns caller-owned actors into placed geometry instances, builds one
//! collider per unique geometry and answers collision and ray queries.

pub mod source;
pub mod basic;
pub mod geometry_scene;
pub mod collider;
pub mod collision_scene;

#[cfg(test)]
mod tests;

pub use source::{ActorBounds, ActorId, ActorRef, ComponentKind, ComponentRef, SceneActor, SceneComponent};
pub use basic::{BasicActor, InstancedMeshComponent, MeshComponent, ProceduralMeshComponent};
pub use geometry_scene::{GeometryActor, GeometryInstance, GeometryScene, GeometrySceneObserver};
pub use collider::{Collider, ColliderBuildError, ColliderSource, ColliderState, RayHit};
pub use collision_scene::{
    BuildOptions, CollisionResult, CollisionScene, PlacedGeometryInstance, SceneBuildState,
};

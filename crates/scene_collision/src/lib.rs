//! # Scene Collision
//!
//! Collision queries over a scene of instanced triangle-mesh geometry, as
//! used by an editor to place and drag objects without interpenetration.
//!
//! ## Features
//!
//! - **Deduplicated colliders**: one packed mesh and AABB tree per unique geometry
//! - **Sparse octree broad phase** over every placed instance
//! - **Parallel narrow phase** with early exit on the first hit
//! - **Bisection solver** for the largest collision-free move
//! - **Ray casts** returning the nearest hit with actor and component
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use scene_collision::prelude::*;
//!
//! let library = Arc::new(GeometryLibrary::new());
//! let mut scene = CollisionScene::new(Arc::clone(&library));
//! // scene.add_actors(&actors);
//! scene.update_build();
//!
//! let free = scene.solve_for_collision_time(ActorId(1), &Vec3::new(5.0, 0.0, 0.0), 10);
//! println!("can move {free} of the way");
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod foundation;
pub mod config;
pub mod spatial;
pub mod physics;
pub mod geometry;
pub mod scene;

/// Common imports for crate users
pub mod prelude {
    pub use crate::{
        config::{Config, ConfigError},
        foundation::math::{Transform, TransformSequence, Vec3, Quat},
        geometry::{
            DynamicMesh, GeometryHandle, GeometryLibrary, GeometryType, StaticMeshAsset, StaticMeshLod,
        },
        physics::{PackedMesh, Ray, TriangleMeshSource},
        scene::{
            ActorId, ActorRef, BasicActor, BuildOptions, CollisionResult, CollisionScene, ComponentRef,
            GeometryScene, GeometrySceneObserver, InstancedMeshComponent, MeshComponent,
            ProceduralMeshComponent, RayHit, SceneActor, SceneBuildState, SceneComponent,
        },
        spatial::{Aabb, OctreeConfig, SparseOctree},
    };
}

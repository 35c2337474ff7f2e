//! Scene-level tests and the fixtures they share

mod properties;

use std::sync::Arc;

use crate::foundation::math::{Transform, Vec3};
use crate::geometry::{GeometryHandle, GeometryLibrary, StaticMeshAsset, StaticMeshLod};
use crate::scene::basic::{BasicActor, MeshComponent};
use crate::scene::source::{ActorId, ActorRef, ComponentRef};
use crate::spatial::Aabb;

/// Render data of an axis-aligned unit cube centered at the origin
pub(super) fn unit_cube_lod() -> StaticMeshLod {
    let positions = (0..8)
        .map(|i| {
            Vec3::new(
                if i & 1 != 0 { 0.5 } else { -0.5 },
                if i & 2 != 0 { 0.5 } else { -0.5 },
                if i & 4 != 0 { 0.5 } else { -0.5 },
            )
        })
        .collect();
    let indices = vec![
        0, 2, 1, 1, 2, 3, // -z
        4, 5, 6, 5, 7, 6, // +z
        0, 1, 4, 1, 5, 4, // -y
        2, 6, 3, 3, 6, 7, // +y
        0, 4, 2, 2, 4, 6, // -x
        1, 3, 5, 3, 7, 5, // +x
    ];
    StaticMeshLod::new(positions, indices)
}

/// Library holding one unit cube asset
pub(super) fn library_with_cube() -> (Arc<GeometryLibrary>, GeometryHandle) {
    crate::foundation::logging::init_for_tests();
    let library = GeometryLibrary::new();
    let cube = library.insert_static_mesh(StaticMeshAsset::from_lod("cube", unit_cube_lod()));
    (Arc::new(library), cube)
}

/// Actor with a single mesh component placing `handle` at `position`
pub(super) fn mesh_actor(
    id: u64,
    library: &GeometryLibrary,
    handle: GeometryHandle,
    position: Vec3,
) -> (ActorRef, Arc<MeshComponent>) {
    let local_bounds = library.local_bounds(&handle).unwrap_or_else(Aabb::empty);
    let component = Arc::new(MeshComponent::new(handle, local_bounds, Transform::from_translation(position)));
    let actor = BasicActor::new(ActorId(id), format!("actor{id}"))
        .with_component(Arc::clone(&component) as ComponentRef)
        .into_ref();
    (actor, component)
}

//! Invariants of the collision scene that hold for any input

use std::sync::Arc;

use super::{library_with_cube, mesh_actor, unit_cube_lod};
use crate::foundation::math::{Transform, Vec3};
use crate::geometry::{DynamicMesh, GeometryHandle, GeometryLibrary, StaticMeshAsset};
use crate::physics::collision::primitives::Ray;
use crate::scene::basic::{BasicActor, InstancedMeshComponent, ProceduralMeshComponent};
use crate::scene::collider::ColliderBuildError;
use crate::scene::collision_scene::{BuildOptions, CollisionScene, SceneBuildState};
use crate::scene::source::{ActorId, ActorRef, ComponentRef};
use crate::spatial::Aabb;
use approx::assert_relative_eq;

/// A grid of cube actors, `count` per side, `spacing` apart
fn cube_grid(library: &GeometryLibrary, cube: GeometryHandle, count: u64, spacing: f64) -> Vec<ActorRef> {
    let mut actors = Vec::new();
    for j in 0..count {
        for i in 0..count {
            let position = Vec3::new(i as f64 * spacing, j as f64 * spacing, 0.0);
            actors.push(mesh_actor(j * count + i + 1, library, cube, position).0);
        }
    }
    actors
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_resource_shares_one_collider() {
        let (library, cube) = library_with_cube();
        let mut scene = CollisionScene::new(Arc::clone(&library));
        scene.add_actors(&cube_grid(&library, cube, 4, 3.0));
        scene.update_build();

        assert_eq!(scene.collider_count(), 1);
        assert_eq!(scene.placed_instances().len(), 16);
        assert!(scene.placed_instances().iter().all(|placed| placed.collider_index == 0));
        let registry = scene.geometry_scene().registry();
        assert_eq!(registry.find(&cube).map(|g| g.index), Some(0));
    }

    #[test]
    fn test_unique_indices_are_stable() {
        let (library, cube) = library_with_cube();
        let second = library.insert_static_mesh(StaticMeshAsset::from_lod("cube2", unit_cube_lod()));
        let third = library.insert_static_mesh(StaticMeshAsset::from_lod("cube3", unit_cube_lod()));

        let mut scene = CollisionScene::new(Arc::clone(&library));
        scene.add_actors(&[mesh_actor(1, &library, second, Vec3::zeros()).0]);
        scene.update_build();
        scene.add_actors(&[
            mesh_actor(2, &library, cube, Vec3::new(5.0, 0.0, 0.0)).0,
            mesh_actor(3, &library, second, Vec3::new(10.0, 0.0, 0.0)).0,
        ]);
        scene.update_build();
        scene.add_actors(&[mesh_actor(4, &library, third, Vec3::new(15.0, 0.0, 0.0)).0]);
        scene.update_build();

        let registry = scene.geometry_scene().registry();
        assert_eq!(registry.find(&second).map(|g| g.index), Some(0));
        assert_eq!(registry.find(&cube).map(|g| g.index), Some(1));
        assert_eq!(registry.find(&third).map(|g| g.index), Some(2));
        for index in 0..3 {
            let collider = scene.collider(index).unwrap();
            assert_eq!(registry.find(collider.handle()).map(|g| g.index), Some(index));
            assert!(collider.is_built());
        }
    }

    #[test]
    fn test_update_build_is_idempotent() {
        let (library, cube) = library_with_cube();
        let mut scene = CollisionScene::new(Arc::clone(&library));
        scene.add_actors(&cube_grid(&library, cube, 5, 2.5));
        scene.update_build();

        let placed = scene.placed_instances().to_vec();
        let bounds = *scene.scene_bounds();
        let queries: Vec<Aabb> = (0..12)
            .map(|k| Aabb::from_center_extents(Vec3::new(k as f64, k as f64 * 0.7, 0.0), Vec3::repeat(1.3)))
            .collect();
        let answers: Vec<Vec<u32>> = queries.iter().map(|q| scene.octree().range_query(q)).collect();

        scene.update_build();
        assert_eq!(scene.placed_instances(), placed.as_slice());
        assert_eq!(*scene.scene_bounds(), bounds);
        let again: Vec<Vec<u32>> = queries.iter().map(|q| scene.octree().range_query(q)).collect();
        assert_eq!(again, answers);
    }

    #[test]
    fn test_never_reports_self() {
        let (library, cube) = library_with_cube();
        let mut scene = CollisionScene::new(Arc::clone(&library));
        let (lonely, _) = mesh_actor(1, &library, cube, Vec3::zeros());
        let (twin_a, _) = mesh_actor(2, &library, cube, Vec3::new(50.0, 0.0, 0.0));
        let (twin_b, _) = mesh_actor(3, &library, cube, Vec3::new(50.0, 0.0, 0.0));
        scene.add_actors(&[lonely, twin_a, twin_b]);
        scene.update_build();

        for delta in [Vec3::zeros(), Vec3::new(0.1, 0.0, 0.0), Vec3::new(0.0, -0.4, 0.2)] {
            assert!(scene.test_collision_with_other_objects(ActorId(1), &delta).is_none());
        }

        let hit = scene.test_collision_with_other_objects(ActorId(2), &Vec3::zeros());
        assert_eq!(hit.map(|r| r.colliding_actor.id()), Some(ActorId(3)));
        let hit = scene.test_collision_with_other_objects(ActorId(3), &Vec3::zeros());
        assert_eq!(hit.map(|r| r.colliding_actor.id()), Some(ActorId(2)));
    }

    #[test]
    fn test_no_candidates_means_no_collision() {
        let (library, cube) = library_with_cube();
        let mut scene = CollisionScene::new(Arc::clone(&library));
        scene.add_actors(&cube_grid(&library, cube, 3, 4.0));
        scene.update_build();

        let delta = Vec3::new(0.0, 0.0, 500.0);
        let source = &scene.actors()[0];
        let query = source.world_bounds.translated(&delta);
        assert!(scene.octree().range_query(&query).is_empty());
        assert!(scene.test_collision_with_other_objects(ActorId(1), &delta).is_none());

        assert!(scene.test_collision_with_other_objects(ActorId(999), &Vec3::zeros()).is_none());
    }

    #[test]
    fn test_degenerate_geometry_is_inert() {
        let (library, cube) = library_with_cube();
        let (empty_handle, empty_mesh) = library.insert_procedural_mesh(DynamicMesh::new());
        let empty_actor = BasicActor::new(ActorId(7), "nothing")
            .with_component(Arc::new(ProceduralMeshComponent::new(
                empty_handle,
                empty_mesh,
                Transform::identity(),
            )) as ComponentRef)
            .into_ref();
        let (solid, _) = mesh_actor(8, &library, cube, Vec3::zeros());

        let mut scene = CollisionScene::new(Arc::clone(&library));
        scene.add_actors(&[empty_actor, solid]);
        scene.update_build();

        let collider = scene.collider(0).unwrap();
        assert_eq!(collider.build_error(), Some(&ColliderBuildError::EmptyMesh(empty_handle)));
        assert_eq!(collider.triangle_count(), 0);

        assert!(scene.test_collision_with_other_objects(ActorId(7), &Vec3::zeros()).is_none());
        assert!(scene.test_collision_with_other_objects(ActorId(8), &Vec3::zeros()).is_none());

        let ray = Ray::new(Vec3::new(0.0, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = scene.find_nearest_ray_intersection(&ray).expect("ray reaches the cube");
        assert_eq!(hit.actor.map(|actor| actor.id()), Some(ActorId(8)));
    }

    #[test]
    fn test_removed_resource_fails_its_collider_only() {
        let (library, cube) = library_with_cube();
        let doomed = library.insert_static_mesh(StaticMeshAsset::from_lod("doomed", unit_cube_lod()));
        let (a, _) = mesh_actor(1, &library, doomed, Vec3::zeros());
        let (b, _) = mesh_actor(2, &library, cube, Vec3::new(0.5, 0.0, 0.0));
        let (c, _) = mesh_actor(3, &library, cube, Vec3::new(1.2, 0.0, 0.0));

        let mut scene = CollisionScene::new(Arc::clone(&library));
        scene.add_actors(&[a, b, c]);
        library.remove(doomed.resource_identity).unwrap();
        scene.update_build();

        assert_eq!(
            scene.collider(0).and_then(|collider| collider.build_error().cloned()),
            Some(ColliderBuildError::MissingResource(doomed))
        );
        assert!(scene.collider(1).unwrap().is_built());
        assert_eq!(scene.placed_instances().len(), 2);

        assert!(scene.test_collision_with_other_objects(ActorId(1), &Vec3::zeros()).is_none());
        let hit = scene.test_collision_with_other_objects(ActorId(2), &Vec3::zeros());
        assert_eq!(hit.map(|r| r.colliding_actor.id()), Some(ActorId(3)));
    }

    #[test]
    fn test_state_transitions() {
        let (library, cube) = library_with_cube();
        let mut scene = CollisionScene::new(Arc::clone(&library));
        assert_eq!(scene.state(), SceneBuildState::Dirty);

        scene.add_actors(&[mesh_actor(1, &library, cube, Vec3::zeros()).0]);
        assert_eq!(scene.pending_build_count(), 1);
        assert_eq!(scene.state(), SceneBuildState::Dirty);

        scene.update_build();
        assert_eq!(scene.pending_build_count(), 0);
        assert_eq!(scene.state(), SceneBuildState::Built);

        // Known geometry only, still dirty until rebuilt
        scene.add_actors(&[mesh_actor(2, &library, cube, Vec3::new(3.0, 0.0, 0.0)).0]);
        assert_eq!(scene.pending_build_count(), 0);
        assert_eq!(scene.state(), SceneBuildState::Dirty);
        scene.update_all_transforms();
        assert_eq!(scene.state(), SceneBuildState::Dirty);
        assert_eq!(scene.placed_instances().len(), 1);

        scene.update_build();
        assert_eq!(scene.state(), SceneBuildState::Built);
        assert_eq!(scene.placed_instances().len(), 2);
    }

    #[test]
    fn test_nearest_ray_hit_over_scene() {
        let (library, cube) = library_with_cube();
        let bounds = library.local_bounds(&cube).unwrap();
        let row = InstancedMeshComponent::new_hierarchical(
            cube,
            bounds,
            Transform::from_translation(Vec3::new(0.0, 0.0, 1.0)),
        );
        for k in 0..4 {
            row.add_instance(Transform::from_translation(Vec3::new(k as f64 * 3.0, 0.0, 0.0)));
        }
        let row_actor = BasicActor::new(ActorId(1), "row").with_component(Arc::new(row) as ComponentRef).into_ref();
        let (near, _) = mesh_actor(2, &library, cube, Vec3::new(-5.0, 0.0, 1.0));

        let mut scene = CollisionScene::new(Arc::clone(&library));
        scene.add_actors(&[row_actor, near]);
        scene.update_build();

        // Along +x from far left: the lone cube comes first
        let ray = Ray::new(Vec3::new(-20.0, 0.1, 1.2), Vec3::new(1.0, 0.0, 0.0));
        let hit = scene.find_nearest_ray_intersection(&ray).expect("ray crosses the row");
        assert_eq!(hit.actor.as_ref().map(|actor| actor.id()), Some(ActorId(2)));
        assert_relative_eq!(hit.distance, 14.5, epsilon = 1e-9);
        assert_relative_eq!(hit.world_position, Vec3::new(-5.5, 0.1, 1.2), epsilon = 1e-9);
        assert!(hit.component_instance.is_none());

        // Straight down onto the third instance of the row
        let ray = Ray::new(Vec3::new(6.2, 0.0, 10.0), Vec3::new(0.0, 0.0, -1.0));
        let hit = scene.find_nearest_ray_intersection(&ray).expect("ray hits an instance");
        assert_eq!(hit.actor.as_ref().map(|actor| actor.id()), Some(ActorId(1)));
        assert_eq!(hit.component_instance, Some(2));
        assert_relative_eq!(hit.distance, 8.5, epsilon = 1e-9);
        assert_eq!(hit.geometry_handle, cube);
        assert_eq!(hit.local_to_world.len(), 2);

        let miss = Ray::new(Vec3::new(0.0, 50.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
        assert!(scene.find_nearest_ray_intersection(&miss).is_none());
    }

    #[test]
    fn test_sequential_and_parallel_agree() {
        let (library, cube) = library_with_cube();
        let actors = cube_grid(&library, cube, 6, 1.5);

        let mut parallel = CollisionScene::new(Arc::clone(&library));
        parallel.add_actors(&actors);
        parallel.update_build();

        let options = BuildOptions {
            parallel_threshold: usize::MAX,
            ..BuildOptions::default()
        };
        let mut sequential = CollisionScene::with_options(Arc::clone(&library), options);
        sequential.add_actors(&actors);
        sequential.update_build();

        assert_eq!(parallel.placed_instances(), sequential.placed_instances());
        for id in 1..=36 {
            for delta in [Vec3::new(0.6, 0.0, 0.0), Vec3::new(0.0, 0.0, 2.0), Vec3::new(-0.3, 0.7, 0.0)] {
                let a = parallel.test_collision_with_other_objects(ActorId(id), &delta).is_some();
                let b = sequential.test_collision_with_other_objects(ActorId(id), &delta).is_some();
                assert_eq!(a, b, "actor {id} delta {delta:?}");
            }
        }
    }

    #[test]
    fn test_initialize_replaces_options() {
        let (library, cube) = library_with_cube();
        let mut scene = CollisionScene::new(Arc::clone(&library));
        let mut options = BuildOptions::default();
        options.octree.max_depth = 1;
        options.octree.min_root_dimension = 64.0;
        scene.initialize(options.clone());
        scene.add_actors(&cube_grid(&library, cube, 2, 2.0));
        scene.update_build();

        assert_eq!(scene.options(), &options);
        assert_eq!(scene.octree().root_dimension(), 64.0);
        assert!(scene.octree().deepest_cell().is_some_and(|depth| depth <= 1));
    }
}

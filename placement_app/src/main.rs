//! Drag Placement Demo
//!
//! Scatters stacks of crates over a procedural ground slab, then drags a
//! single crate around the scene the way an editor gizmo would:
//! - each drag is first tested as a whole
//! - blocked drags are shortened by bisection to the last free position
//! - the crate is dropped onto whatever lies beneath it with a ray cast
//!
//! Pass a `.toml` or `.ron` file as the first argument to override the
//! scene build options.

use std::sync::Arc;
use std::time::Instant;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use scene_collision::foundation::logging;
use scene_collision::prelude::*;

// Scene layout
const GROUND_HALF_SIZE: f64 = 60.0;
const NUM_STACKS: u64 = 40;
const MAX_STACK_HEIGHT: usize = 4;
const CRATE_SIZE: f64 = 2.0;

// Dragging
const NUM_DRAGS: usize = 12;
const MAX_DRAG: f64 = 25.0;
const SOLVER_STEPS: usize = 10;
const DROP_CLEARANCE: f64 = 0.01;

const MOVER_ID: ActorId = ActorId(0);

/// Render data of a crate: an axis-aligned cube of edge `size` resting on z = 0
fn crate_lod(size: f64) -> StaticMeshLod {
    let h = size * 0.5;
    let positions = (0..8)
        .map(|i| {
            Vec3::new(
                if i & 1 != 0 { h } else { -h },
                if i & 2 != 0 { h } else { -h },
                if i & 4 != 0 { size } else { 0.0 },
            )
        })
        .collect();
    let indices = vec![
        0, 2, 1, 1, 2, 3, //
        4, 5, 6, 5, 7, 6, //
        0, 1, 4, 1, 5, 4, //
        2, 6, 3, 3, 6, 7, //
        0, 4, 2, 2, 4, 6, //
        1, 3, 5, 3, 7, 5, //
    ];
    StaticMeshLod::new(positions, indices)
}

/// Flat square ground in the z = 0 plane, split into a grid of quads
fn ground_mesh(half_size: f64, cells: u32) -> DynamicMesh {
    let mut mesh = DynamicMesh::new();
    let step = 2.0 * half_size / f64::from(cells);
    for j in 0..=cells {
        for i in 0..=cells {
            mesh.append_vertex(Vec3::new(
                -half_size + f64::from(i) * step,
                -half_size + f64::from(j) * step,
                0.0,
            ));
        }
    }
    let row = cells + 1;
    for j in 0..cells {
        for i in 0..cells {
            let v = j * row + i;
            for triangle in [[v, v + 1, v + row + 1], [v, v + row + 1, v + row]] {
                if let Err(e) = mesh.append_triangle(triangle) {
                    log::warn!("Skipping ground triangle {:?}: {}", triangle, e);
                }
            }
        }
    }
    mesh
}

/// Stack of crates at a random spot, rotated about the vertical axis
fn random_stack(
    rng: &mut StdRng,
    id: u64,
    handle: GeometryHandle,
    local_bounds: Aabb,
) -> ActorRef {
    let position = Vec3::new(
        rng.gen_range(-GROUND_HALF_SIZE * 0.9..GROUND_HALF_SIZE * 0.9),
        rng.gen_range(-GROUND_HALF_SIZE * 0.9..GROUND_HALF_SIZE * 0.9),
        0.0,
    );
    let yaw = rng.gen_range(0.0..std::f64::consts::TAU);
    let stack = InstancedMeshComponent::new(
        handle,
        local_bounds,
        Transform::from_translation_rotation(position, Quat::from_euler_angles(0.0, 0.0, yaw)),
    );
    for level in 0..rng.gen_range(1..=MAX_STACK_HEIGHT) {
        stack.add_instance(Transform::from_translation(Vec3::new(0.0, 0.0, level as f64 * CRATE_SIZE)));
    }
    BasicActor::new(ActorId(id), format!("stack{id}"))
        .with_component(Arc::new(stack) as ComponentRef)
        .into_ref()
}

fn load_options() -> Result<BuildOptions, ConfigError> {
    match std::env::args().nth(1) {
        Some(path) => {
            log::info!("Loading build options from {}", path);
            BuildOptions::load_from_file(path)
        }
        None => Ok(BuildOptions::default()),
    }
}

/// Drop the mover onto whatever lies below it
fn drop_to_ground(scene: &CollisionScene, mover: &MeshComponent) -> Option<f64> {
    let transform = mover.transform();
    // Start below the crate's own floor so it cannot hit itself
    let origin = transform.translation - Vec3::new(0.0, 0.0, 1.0e-3);
    let hit = scene.find_nearest_ray_intersection(&Ray::new(origin, Vec3::new(0.0, 0.0, -1.0)))?;
    let name = hit
        .actor
        .as_ref()
        .map_or_else(|| "nothing".to_string(), |actor| actor.name().to_string());
    log::info!(
        "Ray down from {:?} hit {} at distance {:.3} (triangle {}, instance {:?})",
        origin,
        name,
        hit.distance,
        hit.triangle_id,
        hit.component_instance
    );
    Some(hit.world_position.z)
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    logging::init(log::LevelFilter::Info);

    println!("=== Drag Placement Demo ===");
    println!("  {NUM_STACKS} crate stacks on a {0}x{0} ground", 2.0 * GROUND_HALF_SIZE);
    println!("  {NUM_DRAGS} random drags, {SOLVER_STEPS} bisection steps each");
    println!();

    let options = load_options()?;
    let library = Arc::new(GeometryLibrary::new());
    let crate_handle = library.insert_static_mesh(StaticMeshAsset::from_lod("crate", crate_lod(CRATE_SIZE)));
    let crate_bounds = library.local_bounds(&crate_handle).unwrap_or_else(Aabb::empty);
    let (ground_handle, ground) = library.insert_procedural_mesh(ground_mesh(GROUND_HALF_SIZE, 8));

    let mut rng = StdRng::seed_from_u64(7);
    let mut actors = vec![BasicActor::new(ActorId(1), "ground")
        .with_component(Arc::new(ProceduralMeshComponent::new(
            ground_handle,
            ground,
            Transform::identity(),
        )) as ComponentRef)
        .into_ref()];
    for id in 0..NUM_STACKS {
        actors.push(random_stack(&mut rng, id + 2, crate_handle, crate_bounds));
    }

    // The mover floats above the ground so the first drop has somewhere to go
    let mover = Arc::new(MeshComponent::new(
        crate_handle,
        crate_bounds,
        Transform::from_translation(Vec3::new(0.0, 0.0, 3.0 * CRATE_SIZE)),
    ));
    actors.push(
        BasicActor::new(MOVER_ID, "mover")
            .with_component(Arc::clone(&mover) as ComponentRef)
            .into_ref(),
    );

    let mut scene = CollisionScene::with_options(Arc::clone(&library), options);
    scene.add_actors(&actors);
    let start = Instant::now();
    scene.update_build();
    println!(
        "Built {} colliders for {} placed instances in {:.2?}",
        scene.collider_count(),
        scene.placed_instances().len(),
        start.elapsed()
    );

    if let Some(ground_z) = drop_to_ground(&scene, &mover) {
        let mut transform = mover.transform();
        transform.translation.z = ground_z + DROP_CLEARANCE;
        mover.set_transform(transform);
        scene.update_all_transforms();
    }

    let mut blocked = 0;
    for drag in 0..NUM_DRAGS {
        let full_delta = Vec3::new(rng.gen_range(-MAX_DRAG..MAX_DRAG), rng.gen_range(-MAX_DRAG..MAX_DRAG), 0.0);

        let start = Instant::now();
        let applied = match scene.test_collision_with_other_objects(MOVER_ID, &full_delta) {
            None => full_delta,
            Some(result) => {
                blocked += 1;
                let solved = scene.solved_move_delta(MOVER_ID, &full_delta, SOLVER_STEPS);
                log::info!(
                    "Drag {} blocked by {}, shortened to {:.1}%",
                    drag,
                    result.colliding_actor.name(),
                    100.0 * solved.norm() / full_delta.norm()
                );
                solved
            }
        };

        let mut transform = mover.transform();
        transform.translation += applied;
        mover.set_transform(transform);
        scene.update_all_transforms();

        println!(
            "Drag {:2}: requested {:>6.2} moved {:>6.2} now at ({:>7.2}, {:>7.2}) [{:.2?}]",
            drag,
            full_delta.norm(),
            applied.norm(),
            transform.translation.x,
            transform.translation.y,
            start.elapsed()
        );
    }

    println!();
    println!("{blocked} of {NUM_DRAGS} drags were blocked");
    drop_to_ground(&scene, &mover);
    Ok(())
}

//! Collision queries over a geometry scene
//!
//! [`CollisionScene`] keeps one [`Collider`] per unique geometry, a flat list
//! of every placed instance with its world bounds, and a sparse octree over
//! those bounds. Mutations mark the scene dirty; [`CollisionScene::update_build`]
//! builds pending colliders and rebuilds the placed list and octree from
//! scratch. Queries never rebuild anything.
//!
//! Building and querying fan out over the rayon thread pool. Each parallel
//! phase writes only its own slot of a pre-sized array.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::foundation::math::{Transform, TransformSequence, Vec3};
use crate::geometry::{GeometryLibrary, UniqueGeometry};
use crate::physics::collision::primitives::Ray;
use crate::spatial::{Aabb, OctreeConfig, SparseOctree};
use super::collider::{Collider, RayHit};
use super::geometry_scene::{GeometryActor, GeometryInstance, GeometryScene, GeometrySceneObserver};
use super::source::{ActorId, ActorRef, ComponentRef};

/// Sentinel stored in the narrow-phase slot while nothing has been found
const NO_COLLISION: i64 = -1;

/// Scene build tuning
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildOptions {
    /// Broad-phase octree settings
    pub octree: OctreeConfig,

    /// Phases with fewer items than this run on the calling thread
    pub parallel_threshold: usize,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            octree: OctreeConfig::default(),
            parallel_threshold: 0,
        }
    }
}

impl Config for BuildOptions {}

/// Whether queries see the current scene
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneBuildState {
    /// Actors were added or colliders are waiting to be built
    Dirty,
    /// Colliders, placed instances and octree are current
    Built,
}

/// One placed instance with a built collider
#[derive(Debug, Clone, PartialEq)]
pub struct PlacedGeometryInstance {
    /// Index of the owning actor in the scene
    pub actor_index: usize,
    /// Index of the instance within that actor
    pub instance_index: usize,
    /// Index of the collider (the unique geometry index)
    pub collider_index: u32,
    /// World bounds at the last update
    pub world_bounds: Aabb,
}

/// The actor a collision query ran into
#[derive(Debug, Clone)]
pub struct CollisionResult {
    /// The other actor
    pub colliding_actor: ActorRef,
    /// Its index in the scene
    pub actor_index: usize,
    /// Index of the placed instance that was hit
    pub placed_instance: usize,
}

/// Colliders indexed by unique geometry index, plus the ones awaiting a build
#[derive(Debug, Default)]
struct ColliderTable {
    colliders: Vec<Collider>,
    pending: Vec<u32>,
}

impl GeometrySceneObserver for ColliderTable {
    fn on_unique_geometry_added(&mut self, geometry: &Arc<UniqueGeometry>) {
        debug_assert_eq!(geometry.index as usize, self.colliders.len());
        self.colliders.push(Collider::new(geometry.handle));
        self.pending.push(geometry.index);
    }
}

/// Forwards hooks to the caller's observer and new geometry to the collider table
struct ChainedObserver<'a, O: ?Sized> {
    colliders: &'a mut ColliderTable,
    inner: &'a mut O,
}

impl<O: GeometrySceneObserver + ?Sized> GeometrySceneObserver for ChainedObserver<'_, O> {
    fn on_unique_geometry_added(&mut self, geometry: &Arc<UniqueGeometry>) {
        self.colliders.on_unique_geometry_added(geometry);
        self.inner.on_unique_geometry_added(geometry);
    }

    fn collect_other_component_instances(
        &mut self,
        actor: &ActorRef,
        component: &ComponentRef,
        instances: &mut Vec<GeometryInstance>,
    ) {
        self.inner.collect_other_component_instances(actor, component, instances);
    }

    fn update_other_instance_transform(&mut self, actor: &ActorRef, instance: &mut GeometryInstance) {
        self.inner.update_other_instance_transform(actor, instance);
    }

    fn on_update_instance_transform(&mut self, actor_index: usize, instance_index: usize, instance: &GeometryInstance) {
        self.inner.on_update_instance_transform(actor_index, instance_index, instance);
    }
}

/// Geometry scene with colliders, a broad phase and collision queries
#[derive(Debug)]
pub struct CollisionScene {
    library: Arc<GeometryLibrary>,
    options: BuildOptions,
    geometry: GeometryScene,
    colliders: ColliderTable,
    placed: Vec<PlacedGeometryInstance>,
    scene_bounds: Aabb,
    octree: SparseOctree,
    actors_changed: bool,
}

impl CollisionScene {
    /// Create an empty scene reading geometry from `library`
    pub fn new(library: Arc<GeometryLibrary>) -> Self {
        Self::with_options(library, BuildOptions::default())
    }

    /// Create an empty scene with explicit build options
    pub fn with_options(library: Arc<GeometryLibrary>, options: BuildOptions) -> Self {
        let octree = SparseOctree::new(options.octree.min_root_dimension, options.octree.clone());
        Self {
            library,
            options,
            geometry: GeometryScene::new(),
            colliders: ColliderTable::default(),
            placed: Vec::new(),
            scene_bounds: Aabb::empty(),
            octree,
            actors_changed: true,
        }
    }

    /// Replace the build options; takes effect at the next rebuild
    pub fn initialize(&mut self, options: BuildOptions) {
        self.options = options;
        self.actors_changed = true;
    }

    /// Add actors; new geometry gets a pending collider
    pub fn add_actors(&mut self, actors: &[ActorRef]) {
        self.geometry.add_actors_with(actors, &mut self.colliders);
        self.actors_changed = true;
    }

    /// Add actors, also reporting to the caller's `observer`
    pub fn add_actors_with<O>(&mut self, actors: &[ActorRef], observer: &mut O)
    where
        O: GeometrySceneObserver + ?Sized,
    {
        let mut chained = ChainedObserver {
            colliders: &mut self.colliders,
            inner: observer,
        };
        self.geometry.add_actors_with(actors, &mut chained);
        self.actors_changed = true;
    }

    fn run_parallel(&self, item_count: usize) -> bool {
        item_count >= self.options.parallel_threshold
    }

    /// Build pending colliders, then rebuild placed instances, bounds and octree
    pub fn update_build(&mut self) {
        self.build_pending_colliders();
        self.rebuild_placed_instances();
        self.update_bounds_and_octree();
        self.actors_changed = false;

        let failed = self
            .colliders
            .colliders
            .iter()
            .filter(|collider| collider.build_error().is_some())
            .count();
        log::info!(
            "Collision scene built: {} colliders ({} failed), {} placed instances, bounds {:?}..{:?}",
            self.colliders.colliders.len(),
            failed,
            self.placed.len(),
            self.scene_bounds.min,
            self.scene_bounds.max
        );
    }

    fn build_pending_colliders(&mut self) {
        let pending = std::mem::take(&mut self.colliders.pending);
        if pending.is_empty() {
            return;
        }

        let parallel = self.run_parallel(pending.len());
        let library = self.library.as_ref();
        let build = |collider: &mut Collider| {
            if let Err(error) = collider.build(library) {
                log::warn!("Failed to build collider for {:?}: {}", collider.handle(), error);
            }
        };

        // Pending entries are exactly the colliders never built
        let colliders = &mut self.colliders.colliders;
        if parallel {
            colliders.par_iter_mut().filter(|c| c.is_pending()).for_each(build);
        } else {
            colliders.iter_mut().filter(|c| c.is_pending()).for_each(build);
        }
        log::debug!("Built {} pending colliders", pending.len());
    }

    fn rebuild_placed_instances(&mut self) {
        let registry = self.geometry.registry();
        let colliders = &self.colliders.colliders;

        let mut placed = Vec::with_capacity(self.geometry.instance_count());
        for (actor_index, actor) in self.geometry.actors().iter().enumerate() {
            for (instance_index, instance) in actor.instances.iter().enumerate() {
                let Some(geometry) = registry.find(&instance.geometry_handle) else {
                    log::debug!(
                        "Instance {} of actor {:?} has unregistered geometry, skipping",
                        instance_index,
                        actor.actor.id()
                    );
                    continue;
                };
                if !colliders[geometry.index as usize].is_built() {
                    log::debug!(
                        "Instance {} of actor {:?} has no built collider, skipping",
                        instance_index,
                        actor.actor.id()
                    );
                    continue;
                }
                placed.push(PlacedGeometryInstance {
                    actor_index,
                    instance_index,
                    collider_index: geometry.index,
                    world_bounds: Aabb::empty(),
                });
            }
        }

        // Group by collider, stable so the order is deterministic
        placed.sort_by_key(|instance| instance.collider_index);
        self.placed = placed;
    }

    fn update_bounds_and_octree(&mut self) {
        let actors = self.geometry.actors();
        let colliders = &self.colliders.colliders;
        let update = |placed: &mut PlacedGeometryInstance| {
            let transform = &actors[placed.actor_index].instances[placed.instance_index].world_transform;
            placed.world_bounds =
                colliders[placed.collider_index as usize].world_bounds(|p| transform.transform_position(p));
        };
        if self.run_parallel(self.placed.len()) {
            self.placed.par_iter_mut().for_each(update);
        } else {
            self.placed.iter_mut().for_each(update);
        }

        self.scene_bounds = self
            .placed
            .iter()
            .fold(Aabb::empty(), |acc, placed| acc.union(&placed.world_bounds));

        let mut octree = SparseOctree::for_scene_bounds(&self.scene_bounds, self.options.octree.clone());
        for (id, placed) in self.placed.iter().enumerate() {
            octree.insert(id as u32, placed.world_bounds);
        }
        log::debug!(
            "Rebuilt octree: root dimension {}, {} objects, {} root cells",
            octree.root_dimension(),
            octree.object_count(),
            octree.root_cell_count()
        );
        self.octree = octree;
    }

    /// Re-read transforms from every source, then refresh bounds and octree
    ///
    /// Pending colliders stay pending.
    pub fn update_all_transforms(&mut self) {
        self.geometry.update_all_transforms();
        self.update_bounds_and_octree();
    }

    /// First actor the given actor would collide with after moving by `translation`
    ///
    /// The actor itself is never reported. Returns `None` for an unknown
    /// actor or one without built colliders. When several actors collide,
    /// which one is reported is unspecified.
    pub fn test_collision_with_other_objects(&self, actor_id: ActorId, translation: &Vec3) -> Option<CollisionResult> {
        let source_index = self.geometry.find_actor(actor_id)?;
        let source_actor = &self.geometry.actors()[source_index];

        let moved = Transform::from_translation(*translation);
        let sources: Vec<(&Collider, TransformSequence)> = source_actor
            .instances
            .iter()
            .filter_map(|instance| {
                let geometry = self.geometry.registry().find(&instance.geometry_handle)?;
                let collider = &self.colliders.colliders[geometry.index as usize];
                collider
                    .is_built()
                    .then(|| (collider, instance.world_transform.appended(moved)))
            })
            .collect();
        if sources.is_empty() {
            return None;
        }

        let query_bounds = source_actor.world_bounds.translated(translation);
        let candidates = self.octree.range_query(&query_bounds);
        if candidates.is_empty() {
            return None;
        }

        let found = AtomicI64::new(NO_COLLISION);
        let test_candidate = |&id: &u32| {
            if found.load(Ordering::Relaxed) != NO_COLLISION {
                return;
            }
            let placed = &self.placed[id as usize];
            if placed.actor_index == source_index {
                return;
            }
            let candidate_actor = &self.geometry.actors()[placed.actor_index];
            if !candidate_actor.world_bounds.intersects(&query_bounds) {
                return;
            }

            let candidate = &self.colliders.colliders[placed.collider_index as usize];
            let candidate_transform = &candidate_actor.instances[placed.instance_index].world_transform;
            for (source, source_transform) in &sources {
                if found.load(Ordering::Relaxed) != NO_COLLISION {
                    return;
                }
                if candidate.test_collision(candidate_transform, source, source_transform) {
                    let _ = found.compare_exchange(NO_COLLISION, i64::from(id), Ordering::AcqRel, Ordering::Relaxed);
                    return;
                }
            }
        };

        if self.run_parallel(candidates.len()) {
            candidates.par_iter().for_each(test_candidate);
        } else {
            candidates.iter().for_each(test_candidate);
        }

        let hit = usize::try_from(found.into_inner()).ok()?;
        let placed = &self.placed[hit];
        Some(CollisionResult {
            colliding_actor: Arc::clone(&self.geometry.actors()[placed.actor_index].actor),
            actor_index: placed.actor_index,
            placed_instance: hit,
        })
    }

    /// Largest fraction of `full_delta` found free of collisions by bisection
    ///
    /// Each step queries from the actor's current position. Returns 0.0 when
    /// no tested fraction is free.
    pub fn solve_for_collision_time(&self, actor_id: ActorId, full_delta: &Vec3, max_steps: usize) -> f64 {
        let mut min_t = 0.0;
        let mut max_t = 1.0;
        let mut last_free_t = 0.0;

        for _ in 0..max_steps {
            let mid_t = (min_t + max_t) * 0.5;
            let delta = full_delta * mid_t;
            if self.test_collision_with_other_objects(actor_id, &delta).is_some() {
                max_t = mid_t;
            } else {
                min_t = mid_t;
                last_free_t = mid_t;
            }
        }

        last_free_t
    }

    /// [`solve_for_collision_time`](Self::solve_for_collision_time) as a translation
    pub fn solved_move_delta(&self, actor_id: ActorId, full_delta: &Vec3, max_steps: usize) -> Vec3 {
        full_delta * self.solve_for_collision_time(actor_id, full_delta, max_steps)
    }

    /// Nearest hit of a world-space ray over all placed instances
    pub fn find_nearest_ray_intersection(&self, world_ray: &Ray) -> Option<RayHit> {
        let actors = self.geometry.actors();
        let cast = |(id, placed): (usize, &PlacedGeometryInstance)| -> Option<(usize, RayHit)> {
            placed.world_bounds.intersect_ray(&world_ray.origin, &world_ray.direction)?;
            let actor = &actors[placed.actor_index];
            let instance = &actor.instances[placed.instance_index];
            let collider = &self.colliders.colliders[placed.collider_index as usize];

            let mut hit = collider.ray_intersect(world_ray, &instance.world_transform)?;
            hit.actor = Some(Arc::clone(&actor.actor));
            hit.component = Some(Arc::clone(&instance.component));
            hit.component_instance = instance.instance_index;
            Some((id, hit))
        };
        let nearer = |a: (usize, RayHit), b: (usize, RayHit)| {
            match a.1.distance.total_cmp(&b.1.distance).then(a.0.cmp(&b.0)) {
                std::cmp::Ordering::Greater => b,
                _ => a,
            }
        };

        let nearest = if self.run_parallel(self.placed.len()) {
            self.placed.par_iter().enumerate().filter_map(cast).reduce_with(nearer)
        } else {
            self.placed.iter().enumerate().filter_map(cast).reduce(nearer)
        };
        nearest.map(|(_, hit)| hit)
    }

    /// Build state
    pub fn state(&self) -> SceneBuildState {
        if self.actors_changed || !self.colliders.pending.is_empty() {
            SceneBuildState::Dirty
        } else {
            SceneBuildState::Built
        }
    }

    /// Number of colliders waiting for [`update_build`](Self::update_build)
    pub fn pending_build_count(&self) -> usize {
        self.colliders.pending.len()
    }

    /// Build options
    pub fn options(&self) -> &BuildOptions {
        &self.options
    }

    /// Resource library
    pub fn library(&self) -> &Arc<GeometryLibrary> {
        &self.library
    }

    /// The underlying geometry scene
    pub fn geometry_scene(&self) -> &GeometryScene {
        &self.geometry
    }

    /// All actors
    pub fn actors(&self) -> &[GeometryActor] {
        self.geometry.actors()
    }

    /// Placed instances as of the last rebuild, the octree's object ids index this
    pub fn placed_instances(&self) -> &[PlacedGeometryInstance] {
        &self.placed
    }

    /// Union of all placed instance bounds
    pub fn scene_bounds(&self) -> &Aabb {
        &self.scene_bounds
    }

    /// Collider for unique geometry `index`
    pub fn collider(&self, index: u32) -> Option<&Collider> {
        self.colliders.colliders.get(index as usize)
    }

    /// Number of colliders (unique geometries)
    pub fn collider_count(&self) -> usize {
        self.colliders.colliders.len()
    }

    /// The broad-phase octree
    pub fn octree(&self) -> &SparseOctree {
        &self.octree
    }
}

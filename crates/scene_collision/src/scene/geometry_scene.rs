//! Actor to instance to geometry relationships
//!
//! [`GeometryScene`] flattens the actors it is given into a list of
//! [`GeometryActor`]s, each holding one [`GeometryInstance`] per placement of
//! a geometry, and registers every placed geometry with a
//! [`UniqueGeometryRegistry`]. Layers built on top attach their own per-geometry
//! and per-instance work through a [`GeometrySceneObserver`].

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::foundation::math::{Transform, TransformSequence};
use crate::geometry::{GeometryHandle, UniqueGeometry, UniqueGeometryRegistry};
use crate::spatial::Aabb;
use super::source::{ActorId, ActorRef, ComponentKind, ComponentRef};

/// One placement of a geometry
#[derive(Debug, Clone)]
pub struct GeometryInstance {
    /// Component that places this geometry
    pub component: ComponentRef,
    /// Kind of that component
    pub component_kind: ComponentKind,
    /// Instance slot inside the component, for instanced kinds
    pub instance_index: Option<usize>,
    /// Local-to-world transform chain
    pub world_transform: TransformSequence,
    /// Geometry placed
    pub geometry_handle: GeometryHandle,
}

impl GeometryInstance {
    /// Instance of a component that places its geometry once
    pub fn single(component: ComponentRef, geometry_handle: GeometryHandle) -> Self {
        let component_kind = component.kind();
        let world_transform = TransformSequence::from_transform(component.component_to_world());
        Self {
            component,
            component_kind,
            instance_index: None,
            world_transform,
            geometry_handle,
        }
    }
}

/// An input actor with all of its geometry placements, its child actors' included
#[derive(Debug, Clone)]
pub struct GeometryActor {
    /// The actor
    pub actor: ActorRef,
    /// Reported world bounds at the last update
    pub world_bounds: Aabb,
    /// Every placement of geometry owned by the actor
    pub instances: Vec<GeometryInstance>,
}

/// Extension hooks for layers built on a [`GeometryScene`]
///
/// Every method defaults to doing nothing.
pub trait GeometrySceneObserver {
    /// Called once for every geometry the registry has not seen before
    fn on_unique_geometry_added(&mut self, geometry: &Arc<UniqueGeometry>) {
        let _ = geometry;
    }

    /// Collect instances for a component of [`ComponentKind::Unknown`]
    fn collect_other_component_instances(
        &mut self,
        actor: &ActorRef,
        component: &ComponentRef,
        instances: &mut Vec<GeometryInstance>,
    ) {
        let _ = (actor, component, instances);
    }

    /// Refresh the transform of an instance of [`ComponentKind::Unknown`]
    fn update_other_instance_transform(&mut self, actor: &ActorRef, instance: &mut GeometryInstance) {
        let _ = (actor, instance);
    }

    /// Called after an instance's transform has been refreshed
    fn on_update_instance_transform(&mut self, actor_index: usize, instance_index: usize, instance: &GeometryInstance) {
        let _ = (actor_index, instance_index, instance);
    }
}

impl GeometrySceneObserver for () {}

/// Flattened view of a set of actors and the geometry they place
#[derive(Debug, Default)]
pub struct GeometryScene {
    actors: Vec<GeometryActor>,
    actor_lookup: HashMap<ActorId, usize>,
    attached: HashSet<ActorId>,
    registry: UniqueGeometryRegistry,
}

impl GeometryScene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self::default()
    }

    /// Add actors, folding each one's child actors into it
    pub fn add_actors(&mut self, actors: &[ActorRef]) {
        self.add_actors_with(actors, &mut ());
    }

    /// Add actors, folding each one's child actors into it, reporting to `observer`
    ///
    /// The components of every child actor, recursively, become instances of
    /// the parent's [`GeometryActor`], so they move with the parent and never
    /// collide with it. A child passed in alongside its parent, or one already
    /// attached to an actor in the scene, is skipped. Actors already in the
    /// scene are skipped. Existing actors are never removed or reordered.
    pub fn add_actors_with<O>(&mut self, actors: &[ActorRef], observer: &mut O)
    where
        O: GeometrySceneObserver + ?Sized,
    {
        let mut owned = HashSet::new();
        for actor in actors.iter().filter(|actor| !self.actor_lookup.contains_key(&actor.id())) {
            collect_descendant_ids(actor, &mut owned);
        }

        for actor in actors {
            let id = actor.id();
            if self.actor_lookup.contains_key(&id) {
                log::debug!("Actor {:?} is already in the scene, skipping", id);
                continue;
            }
            if owned.contains(&id) || self.attached.contains(&id) {
                log::debug!("Actor {:?} is attached to another actor, skipping", id);
                continue;
            }

            let mut instances = Vec::new();
            let mut pending = vec![Arc::clone(actor)];
            let mut visited = HashSet::from([id]);
            while let Some(member) = pending.pop() {
                Self::collect_instances(&member, observer, &mut instances);
                // Depth first, in child order
                for child in member.child_actors().into_iter().rev() {
                    let child_id = child.id();
                    if !visited.insert(child_id) {
                        continue;
                    }
                    if self.actor_lookup.contains_key(&child_id) || self.attached.contains(&child_id) {
                        log::warn!(
                            "Child {:?} of actor {:?} is already in the scene, not attaching it again",
                            child_id,
                            id
                        );
                        continue;
                    }
                    self.attached.insert(child_id);
                    pending.push(child);
                }
            }

            for instance in &instances {
                self.registry
                    .find_or_add(instance.geometry_handle, |geometry| observer.on_unique_geometry_added(geometry));
            }

            log::trace!(
                "Added actor {:?} '{}' with {} geometry instances",
                id,
                actor.name(),
                instances.len()
            );
            let world_bounds = actor.bounds().to_aabb();
            self.actor_lookup.insert(id, self.actors.len());
            self.actors.push(GeometryActor {
                actor: Arc::clone(actor),
                world_bounds,
                instances,
            });
        }
    }

    fn collect_instances<O>(actor: &ActorRef, observer: &mut O, instances: &mut Vec<GeometryInstance>)
    where
        O: GeometrySceneObserver + ?Sized,
    {
        for component in actor.components() {
            let kind = component.kind();
            match kind {
                ComponentKind::Mesh | ComponentKind::ProceduralMesh => {
                    if let Some(handle) = component.geometry_handle() {
                        instances.push(GeometryInstance::single(component, handle));
                    }
                }
                ComponentKind::InstancedMesh | ComponentKind::HierarchicalInstancedMesh => {
                    let Some(handle) = component.geometry_handle() else {
                        continue;
                    };
                    let component_to_world = component.component_to_world();
                    for index in 0..component.instance_count() {
                        if !component.is_valid_instance(index) {
                            continue;
                        }
                        let Some(instance_to_component) = component.instance_transform(index) else {
                            continue;
                        };
                        instances.push(GeometryInstance {
                            component: Arc::clone(&component),
                            component_kind: kind,
                            instance_index: Some(index),
                            world_transform: instanced_transform(instance_to_component, component_to_world),
                            geometry_handle: handle,
                        });
                    }
                }
                ComponentKind::Unknown => {
                    observer.collect_other_component_instances(actor, &component, instances);
                }
            }
        }
    }

    /// Re-derive every instance transform and actor bounds from the sources
    pub fn update_all_transforms(&mut self) {
        self.update_all_transforms_with(&mut ());
    }

    /// Re-derive every instance transform and actor bounds, reporting to `observer`
    pub fn update_all_transforms_with<O>(&mut self, observer: &mut O)
    where
        O: GeometrySceneObserver + ?Sized,
    {
        for (actor_index, geometry_actor) in self.actors.iter_mut().enumerate() {
            for (instance_index, instance) in geometry_actor.instances.iter_mut().enumerate() {
                match instance.component_kind {
                    ComponentKind::Mesh | ComponentKind::ProceduralMesh => {
                        instance.world_transform =
                            TransformSequence::from_transform(instance.component.component_to_world());
                    }
                    ComponentKind::InstancedMesh | ComponentKind::HierarchicalInstancedMesh => {
                        let instance_to_component = instance
                            .instance_index
                            .and_then(|index| instance.component.instance_transform(index));
                        match instance_to_component {
                            Some(instance_to_component) => {
                                instance.world_transform = instanced_transform(
                                    instance_to_component,
                                    instance.component.component_to_world(),
                                );
                            }
                            None => log::debug!(
                                "Instance {:?} of actor {:?} is no longer valid, keeping its last transform",
                                instance.instance_index,
                                geometry_actor.actor.id()
                            ),
                        }
                    }
                    ComponentKind::Unknown => {
                        observer.update_other_instance_transform(&geometry_actor.actor, instance);
                    }
                }
                observer.on_update_instance_transform(actor_index, instance_index, instance);
            }
            geometry_actor.world_bounds = geometry_actor.actor.bounds().to_aabb();
        }
    }

    /// All actors, in the order they were added
    pub fn actors(&self) -> &[GeometryActor] {
        &self.actors
    }

    /// Actor at `index`
    pub fn actor(&self, index: usize) -> Option<&GeometryActor> {
        self.actors.get(index)
    }

    /// Index of the actor with identity `id`
    ///
    /// Child actors folded into a parent have no index of their own.
    pub fn find_actor(&self, id: ActorId) -> Option<usize> {
        self.actor_lookup.get(&id).copied()
    }

    /// Whether `id` was folded into another actor as a child
    pub fn is_attached(&self, id: ActorId) -> bool {
        self.attached.contains(&id)
    }

    /// The geometry registry
    pub fn registry(&self) -> &UniqueGeometryRegistry {
        &self.registry
    }

    /// Total number of instances over all actors
    pub fn instance_count(&self) -> usize {
        self.actors.iter().map(|actor| actor.instances.len()).sum()
    }
}

/// Ids of every actor below `actor`, not including `actor` itself
fn collect_descendant_ids(actor: &ActorRef, ids: &mut HashSet<ActorId>) {
    for child in actor.child_actors() {
        if ids.insert(child.id()) {
            collect_descendant_ids(&child, ids);
        }
    }
}

/// `[instance_to_component, component_to_world]`
fn instanced_transform(instance_to_component: Transform, component_to_world: Transform) -> TransformSequence {
    TransformSequence::from_transform(instance_to_component).appended(component_to_world)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;
    use crate::geometry::{GeometryLibrary, StaticMeshAsset, StaticMeshLod};
    use crate::scene::basic::{BasicActor, InstancedMeshComponent, MeshComponent};
    use crate::scene::source::{ActorBounds, SceneComponent};
    use approx::assert_relative_eq;

    fn library_with_assets(count: usize) -> (GeometryLibrary, Vec<GeometryHandle>) {
        let library = GeometryLibrary::new();
        let handles = (0..count)
            .map(|k| {
                let lod = StaticMeshLod::new(
                    vec![Vec3::zeros(), Vec3::new(1.0, 0.0, 0.0), Vec3::new(0.0, 1.0, 0.0)],
                    vec![0, 1, 2],
                );
                library.insert_static_mesh(StaticMeshAsset::from_lod(format!("asset{k}"), lod))
            })
            .collect();
        (library, handles)
    }

    #[derive(Default)]
    struct Recorder {
        added: Vec<u32>,
        other_components: usize,
        updated: Vec<(usize, usize)>,
    }

    impl GeometrySceneObserver for Recorder {
        fn on_unique_geometry_added(&mut self, geometry: &Arc<UniqueGeometry>) {
            self.added.push(geometry.index);
        }

        fn collect_other_component_instances(
            &mut self,
            _actor: &ActorRef,
            component: &ComponentRef,
            instances: &mut Vec<GeometryInstance>,
        ) {
            self.other_components += 1;
            if let Some(handle) = component.geometry_handle() {
                instances.push(GeometryInstance::single(Arc::clone(component), handle));
            }
        }

        fn on_update_instance_transform(&mut self, actor_index: usize, instance_index: usize, _: &GeometryInstance) {
            self.updated.push((actor_index, instance_index));
        }
    }

    /// Component of a kind the scene does not understand
    #[derive(Debug)]
    struct Marker(GeometryHandle);

    impl SceneComponent for Marker {
        fn kind(&self) -> ComponentKind {
            ComponentKind::Unknown
        }

        fn geometry_handle(&self) -> Option<GeometryHandle> {
            Some(self.0)
        }

        fn component_to_world(&self) -> Transform {
            Transform::identity()
        }

        fn world_bounds(&self) -> Aabb {
            Aabb::empty()
        }
    }

    #[test]
    fn test_instanced_component_expands_valid_instances() {
        let (library, handles) = library_with_assets(1);
        let bounds = library.local_bounds(&handles[0]).unwrap();
        let component = InstancedMeshComponent::new(handles[0], bounds, Transform::identity());
        for k in 0..6 {
            component.add_instance(Transform::from_translation(Vec3::new(k as f64 * 3.0, 0.0, 0.0)));
        }
        component.remove_instance(2);

        let actor = BasicActor::new(ActorId(1), "forest").with_component(Arc::new(component)).into_ref();
        let mut scene = GeometryScene::new();
        scene.add_actors(&[actor]);

        let instances = &scene.actors()[0].instances;
        assert_eq!(instances.len(), 5);
        let slots: Vec<_> = instances.iter().map(|i| i.instance_index).collect();
        assert_eq!(slots, vec![Some(0), Some(1), Some(3), Some(4), Some(5)]);
        assert_eq!(instances[2].world_transform.len(), 2);
        assert_eq!(scene.registry().len(), 1);
    }

    #[test]
    fn test_child_actors_fold_into_parent() {
        let (library, handles) = library_with_assets(3);
        let bounds = library.local_bounds(&handles[0]).unwrap();
        let grandchild = BasicActor::new(ActorId(3), "grandchild")
            .with_component(Arc::new(MeshComponent::new(
                handles[2],
                bounds,
                Transform::from_translation(Vec3::new(0.0, 0.0, 4.0)),
            )))
            .into_ref();
        let child = BasicActor::new(ActorId(2), "child")
            .with_component(Arc::new(MeshComponent::new(handles[1], bounds, Transform::identity())))
            .with_child(Arc::clone(&grandchild))
            .into_ref();
        let parent = BasicActor::new(ActorId(1), "parent")
            .with_component(Arc::new(MeshComponent::new(handles[0], bounds, Transform::identity())))
            .with_child(Arc::clone(&child))
            .into_ref();

        // The child comes first in the batch but still belongs to its parent
        let mut recorder = Recorder::default();
        let mut scene = GeometryScene::new();
        scene.add_actors_with(&[Arc::clone(&child), Arc::clone(&parent)], &mut recorder);

        assert_eq!(scene.actors().len(), 1);
        assert_eq!(scene.find_actor(ActorId(1)), Some(0));
        assert_eq!(scene.find_actor(ActorId(2)), None);
        assert!(scene.is_attached(ActorId(2)));
        assert!(scene.is_attached(ActorId(3)));
        assert_eq!(scene.instance_count(), 3);
        let placed: Vec<_> = scene.actors()[0].instances.iter().map(|i| i.geometry_handle).collect();
        assert_eq!(placed, handles);
        assert_eq!(recorder.added, vec![0, 1, 2]);
        assert_eq!(scene.actors()[0].world_bounds.max.z, 4.0 + bounds.max.z);

        // Adding again, or adding a child on its own later, changes nothing
        scene.add_actors_with(&[parent, grandchild], &mut recorder);
        assert_eq!(scene.actors().len(), 1);
        assert_eq!(recorder.added, vec![0, 1, 2]);
    }

    #[test]
    fn test_child_without_parent_is_own_actor() {
        let (library, handles) = library_with_assets(1);
        let bounds = library.local_bounds(&handles[0]).unwrap();
        let child = BasicActor::new(ActorId(2), "child")
            .with_component(Arc::new(MeshComponent::new(handles[0], bounds, Transform::identity())))
            .into_ref();
        let _parent = BasicActor::new(ActorId(1), "parent").with_child(Arc::clone(&child));

        let mut scene = GeometryScene::new();
        scene.add_actors(&[child]);
        assert_eq!(scene.find_actor(ActorId(2)), Some(0));
        assert!(!scene.is_attached(ActorId(2)));
    }

    #[test]
    fn test_unknown_components_use_hook() {
        let (_library, handles) = library_with_assets(1);
        let actor = BasicActor::new(ActorId(5), "custom").with_component(Arc::new(Marker(handles[0]))).into_ref();

        let mut recorder = Recorder::default();
        let mut scene = GeometryScene::new();
        scene.add_actors_with(&[actor], &mut recorder);
        assert_eq!(recorder.other_components, 1);
        assert_eq!(scene.instance_count(), 1);
        assert_eq!(recorder.added, vec![0]);

        // Without a hook, unknown components place nothing
        let plain = BasicActor::new(ActorId(6), "custom").with_component(Arc::new(Marker(handles[0]))).into_ref();
        let mut bare = GeometryScene::new();
        bare.add_actors(&[plain]);
        assert_eq!(bare.instance_count(), 0);
    }

    #[test]
    fn test_update_all_transforms_follows_components() {
        let (library, handles) = library_with_assets(1);
        let bounds = library.local_bounds(&handles[0]).unwrap();
        let component = Arc::new(MeshComponent::new(handles[0], bounds, Transform::identity()));
        let actor = BasicActor::new(ActorId(1), "mover")
            .with_component(Arc::clone(&component) as ComponentRef)
            .into_ref();

        let mut scene = GeometryScene::new();
        scene.add_actors(&[actor]);

        component.set_transform(Transform::from_translation(Vec3::new(0.0, 0.0, 7.0)));
        let mut recorder = Recorder::default();
        scene.update_all_transforms_with(&mut recorder);

        let moved = scene.actors()[0].instances[0]
            .world_transform
            .transform_position(&Vec3::zeros());
        assert_relative_eq!(moved, Vec3::new(0.0, 0.0, 7.0));
        assert_eq!(scene.actors()[0].world_bounds.min.z, 7.0);
        assert_eq!(recorder.updated, vec![(0, 0)]);
        assert_eq!(ActorBounds::from_aabb(&scene.actors()[0].world_bounds).origin.z, 7.0);
    }
}

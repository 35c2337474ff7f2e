//! In-memory actors and components
//!
//! Plain implementations of [`SceneActor`] and [`SceneComponent`] whose
//! transforms can be edited in place through shared references, the way an
//! editor moves things between scene updates.

use std::sync::{Arc, PoisonError, RwLock};

use crate::foundation::math::Transform;
use crate::geometry::{DynamicMesh, GeometryHandle};
use crate::spatial::Aabb;
use super::source::{ActorBounds, ActorId, ActorRef, ComponentKind, ComponentRef, SceneActor, SceneComponent};

fn bounds_under(local_bounds: &Aabb, transform: &Transform) -> Aabb {
    local_bounds.transformed(|p| transform.transform_point(p))
}

/// Component placing one static mesh
#[derive(Debug)]
pub struct MeshComponent {
    handle: GeometryHandle,
    local_bounds: Aabb,
    transform: RwLock<Transform>,
}

impl MeshComponent {
    /// Create a component; `local_bounds` are the mesh's model-space bounds
    pub fn new(handle: GeometryHandle, local_bounds: Aabb, transform: Transform) -> Self {
        Self {
            handle,
            local_bounds,
            transform: RwLock::new(transform),
        }
    }

    /// Current transform
    pub fn transform(&self) -> Transform {
        *self.transform.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the component
    pub fn set_transform(&self, transform: Transform) {
        *self.transform.write().unwrap_or_else(PoisonError::into_inner) = transform;
    }
}

impl SceneComponent for MeshComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::Mesh
    }

    fn geometry_handle(&self) -> Option<GeometryHandle> {
        Some(self.handle)
    }

    fn component_to_world(&self) -> Transform {
        self.transform()
    }

    fn world_bounds(&self) -> Aabb {
        bounds_under(&self.local_bounds, &self.transform())
    }
}

/// Component placing one procedural mesh, bounded by the live mesh data
#[derive(Debug)]
pub struct ProceduralMeshComponent {
    handle: GeometryHandle,
    mesh: Arc<RwLock<DynamicMesh>>,
    transform: RwLock<Transform>,
}

impl ProceduralMeshComponent {
    /// Create a component over a shared procedural mesh
    pub fn new(handle: GeometryHandle, mesh: Arc<RwLock<DynamicMesh>>, transform: Transform) -> Self {
        Self {
            handle,
            mesh,
            transform: RwLock::new(transform),
        }
    }

    /// Current transform
    pub fn transform(&self) -> Transform {
        *self.transform.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the component
    pub fn set_transform(&self, transform: Transform) {
        *self.transform.write().unwrap_or_else(PoisonError::into_inner) = transform;
    }
}

impl SceneComponent for ProceduralMeshComponent {
    fn kind(&self) -> ComponentKind {
        ComponentKind::ProceduralMesh
    }

    fn geometry_handle(&self) -> Option<GeometryHandle> {
        Some(self.handle)
    }

    fn component_to_world(&self) -> Transform {
        self.transform()
    }

    fn world_bounds(&self) -> Aabb {
        let local_bounds = self.mesh.read().unwrap_or_else(PoisonError::into_inner).bounds();
        bounds_under(&local_bounds, &self.transform())
    }
}

/// Component placing many copies of one static mesh
///
/// Removed instances leave an empty slot, so indices of the remaining
/// instances do not shift.
#[derive(Debug)]
pub struct InstancedMeshComponent {
    handle: GeometryHandle,
    local_bounds: Aabb,
    hierarchical: bool,
    transform: RwLock<Transform>,
    instances: RwLock<Vec<Option<Transform>>>,
}

impl InstancedMeshComponent {
    /// Create an instanced component without instances
    pub fn new(handle: GeometryHandle, local_bounds: Aabb, transform: Transform) -> Self {
        Self {
            handle,
            local_bounds,
            hierarchical: false,
            transform: RwLock::new(transform),
            instances: RwLock::new(Vec::new()),
        }
    }

    /// Create a hierarchical instanced component without instances
    pub fn new_hierarchical(handle: GeometryHandle, local_bounds: Aabb, transform: Transform) -> Self {
        Self {
            hierarchical: true,
            ..Self::new(handle, local_bounds, transform)
        }
    }

    /// Add an instance, returns its index
    pub fn add_instance(&self, instance_to_component: Transform) -> usize {
        let mut instances = self.instances.write().unwrap_or_else(PoisonError::into_inner);
        instances.push(Some(instance_to_component));
        instances.len() - 1
    }

    /// Remove an instance, returns false if it was not live
    pub fn remove_instance(&self, index: usize) -> bool {
        self.instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(index)
            .and_then(Option::take)
            .is_some()
    }

    /// Move a live instance, returns false if it was not live
    pub fn set_instance_transform(&self, index: usize, instance_to_component: Transform) -> bool {
        match self
            .instances
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .get_mut(index)
        {
            Some(Some(slot)) => {
                *slot = instance_to_component;
                true
            }
            _ => false,
        }
    }

    /// Current component transform
    pub fn transform(&self) -> Transform {
        *self.transform.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the whole component
    pub fn set_transform(&self, transform: Transform) {
        *self.transform.write().unwrap_or_else(PoisonError::into_inner) = transform;
    }
}

impl SceneComponent for InstancedMeshComponent {
    fn kind(&self) -> ComponentKind {
        if self.hierarchical {
            ComponentKind::HierarchicalInstancedMesh
        } else {
            ComponentKind::InstancedMesh
        }
    }

    fn geometry_handle(&self) -> Option<GeometryHandle> {
        Some(self.handle)
    }

    fn component_to_world(&self) -> Transform {
        self.transform()
    }

    fn world_bounds(&self) -> Aabb {
        let component = self.transform();
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .flatten()
            .fold(Aabb::empty(), |acc, instance| {
                let bounds = self
                    .local_bounds
                    .transformed(|p| component.transform_point(&instance.transform_point(p)));
                acc.union(&bounds)
            })
    }

    fn instance_count(&self) -> usize {
        self.instances.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    fn is_valid_instance(&self, index: usize) -> bool {
        self.instance_transform(index).is_some()
    }

    fn instance_transform(&self, index: usize) -> Option<Transform> {
        self.instances
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(index)
            .copied()
            .flatten()
    }
}

/// Actor made of a list of components and child actors
///
/// Reported bounds are the union of its components' bounds and the bounds
/// of its child actors.
#[derive(Debug)]
pub struct BasicActor {
    id: ActorId,
    name: String,
    components: Vec<ComponentRef>,
    children: Vec<ActorRef>,
}

impl BasicActor {
    /// Create an actor without components
    pub fn new(id: ActorId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
            components: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Attach a component (builder style)
    pub fn with_component(mut self, component: ComponentRef) -> Self {
        self.components.push(component);
        self
    }

    /// Attach a child actor (builder style)
    pub fn with_child(mut self, child: ActorRef) -> Self {
        self.children.push(child);
        self
    }

    /// Wrap into a shared actor reference
    pub fn into_ref(self) -> ActorRef {
        Arc::new(self)
    }
}

impl SceneActor for BasicActor {
    fn id(&self) -> ActorId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn components(&self) -> Vec<ComponentRef> {
        self.components.clone()
    }

    fn child_actors(&self) -> Vec<ActorRef> {
        self.children.clone()
    }

    fn bounds(&self) -> ActorBounds {
        let own = self
            .components
            .iter()
            .fold(Aabb::empty(), |acc, component| acc.union(&component.world_bounds()));
        let bounds = self
            .children
            .iter()
            .fold(own, |acc, child| acc.union(&child.bounds().to_aabb()));
        ActorBounds::from_aabb(&bounds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec3;

    fn unit_bounds() -> Aabb {
        Aabb::from_center_extents(Vec3::zeros(), Vec3::repeat(0.5))
    }

    #[test]
    fn test_mesh_component_follows_transform() {
        let component = MeshComponent::new(GeometryHandle::default(), unit_bounds(), Transform::identity());
        component.set_transform(Transform::from_translation(Vec3::new(10.0, 0.0, 0.0)));
        assert_eq!(component.world_bounds().center(), Vec3::new(10.0, 0.0, 0.0));
    }

    #[test]
    fn test_instanced_component_slots() {
        let component = InstancedMeshComponent::new(GeometryHandle::default(), unit_bounds(), Transform::identity());
        let first = component.add_instance(Transform::identity());
        let second = component.add_instance(Transform::from_translation(Vec3::new(4.0, 0.0, 0.0)));
        assert!(component.remove_instance(first));
        assert!(!component.remove_instance(first));

        assert_eq!(component.instance_count(), 2);
        assert!(!component.is_valid_instance(first));
        assert!(component.is_valid_instance(second));
        assert!(!component.set_instance_transform(first, Transform::identity()));
        assert_eq!(component.world_bounds().center(), Vec3::new(4.0, 0.0, 0.0));
    }

    #[test]
    fn test_actor_bounds_union() {
        let a = MeshComponent::new(GeometryHandle::default(), unit_bounds(), Transform::identity());
        let b = MeshComponent::new(
            GeometryHandle::default(),
            unit_bounds(),
            Transform::from_translation(Vec3::new(2.0, 0.0, 0.0)),
        );
        let actor = BasicActor::new(ActorId(1), "pair")
            .with_component(Arc::new(a))
            .with_component(Arc::new(b));
        let bounds = actor.bounds().to_aabb();
        assert_eq!(bounds.min, Vec3::new(-0.5, -0.5, -0.5));
        assert_eq!(bounds.max, Vec3::new(2.5, 0.5, 0.5));

        assert!(BasicActor::new(ActorId(2), "empty").bounds().to_aabb().is_empty());
    }

    #[test]
    fn test_actor_bounds_include_children() {
        let grandchild = BasicActor::new(ActorId(3), "grandchild")
            .with_component(Arc::new(MeshComponent::new(
                GeometryHandle::default(),
                unit_bounds(),
                Transform::from_translation(Vec3::new(0.0, 0.0, 6.0)),
            )))
            .into_ref();
        let child = BasicActor::new(ActorId(2), "child").with_child(grandchild).into_ref();
        let parent = BasicActor::new(ActorId(1), "parent")
            .with_component(Arc::new(MeshComponent::new(
                GeometryHandle::default(),
                unit_bounds(),
                Transform::identity(),
            )))
            .with_child(child);

        assert_eq!(parent.name(), "parent");
        let bounds = parent.bounds().to_aabb();
        assert_eq!(bounds.min, Vec3::new(-0.5, -0.5, -0.5));
        assert_eq!(bounds.max, Vec3::new(0.5, 0.5, 6.5));
    }
}

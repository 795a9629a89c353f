//! The [`World`]: entity registry and component store behind one API.
//!
//! Every operation that takes an [`EntityId`] checks it against the registry
//! first, so stale identifiers never read or write records that belong to a
//! later occupant of the same slot.

use tracing::trace;

use crate::component::{
    Component, ComponentData, ComponentDescriptor, ComponentTypeId, ComponentValue, SerializeFn,
};
use crate::entity::{EntityId, EntityRegistry};
use crate::error::EcsError;
use crate::query::QueryDescriptor;
use crate::store::ComponentStore;

/// Initial components for [`World::create`], as `(kind, optional init data)`.
pub type ComponentMap = Vec<(ComponentTypeId, Option<ComponentData>)>;

/// Entity and component state for one side of the connection.
#[derive(Debug, Default)]
pub struct World {
    registry: EntityRegistry,
    store: ComponentStore,
}

impl World {
    /// Create an empty world with no registered component kinds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    // ── Registration ────────────────────────────────────────────────────────

    /// Register a component kind.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidComponentOptions`] for an inconsistent
    /// option set or a name that is already registered.
    pub fn register_type(
        &mut self,
        descriptor: ComponentDescriptor,
    ) -> Result<ComponentTypeId, EcsError> {
        let name = descriptor.name.clone();
        let ty = self.store.register(descriptor)?;
        trace!(component = %name, %ty, "registered component type");
        Ok(ty)
    }

    /// Register the Rust component type `T` using its default descriptor.
    ///
    /// # Errors
    ///
    /// See [`World::register_type`].
    pub fn register<T: Component>(&mut self) -> Result<ComponentTypeId, EcsError> {
        self.register_type(T::descriptor())
    }

    /// Returns the handle registered under `T::type_name()`.
    #[must_use]
    pub fn type_of<T: Component>(&self) -> Option<ComponentTypeId> {
        self.store.type_by_name(T::type_name())
    }

    /// Returns the handle registered under `name`.
    #[must_use]
    pub fn type_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.store.type_by_name(name)
    }

    /// Returns the descriptor for a registered kind.
    #[must_use]
    pub fn descriptor(&self, ty: ComponentTypeId) -> Option<&ComponentDescriptor> {
        self.store.descriptor(ty)
    }

    /// Iterates over the kinds marked replicated, in registration order.
    pub fn replicated_types(&self) -> impl Iterator<Item = (ComponentTypeId, &str, &SerializeFn)> {
        self.store.types().filter_map(|(ty, descriptor)| {
            let serialize = descriptor.options.serialize.as_ref()?;
            descriptor
                .options
                .replicated
                .then_some((ty, descriptor.name.as_str(), serialize))
        })
    }

    // ── Entity lifecycle ────────────────────────────────────────────────────

    /// Allocate an entity with no components.
    pub fn spawn_empty(&mut self) -> EntityId {
        self.registry.allocate()
    }

    /// Allocate an entity and attach the given components in order.
    ///
    /// If any component fails to attach, the entity is destroyed again (running
    /// the removal hooks of the components already attached) and the error is
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponentType`] or
    /// [`EcsError::DuplicateComponent`] from the failing attachment.
    pub fn create(&mut self, components: ComponentMap) -> Result<EntityId, EcsError> {
        let entity = self.registry.allocate();
        for (ty, init) in components {
            if let Err(err) = self.store.insert(entity, ty, init) {
                self.store.remove_all(entity);
                self.registry.release(entity);
                return Err(err);
            }
        }
        trace!(%entity, "created entity");
        Ok(entity)
    }

    /// Destroy an entity: remove all of its components, then invalidate the
    /// identifier and recycle the slot.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] if `entity` is not live.
    pub fn destroy(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.ensure_valid(entity)?;
        let removed = self.store.remove_all(entity);
        self.registry.release(entity);
        trace!(%entity, removed, "destroyed entity");
        Ok(())
    }

    /// Returns `true` if `entity` is live.
    #[must_use]
    pub fn is_valid(&self, entity: EntityId) -> bool {
        self.registry.is_valid(entity)
    }

    fn ensure_valid(&self, entity: EntityId) -> Result<(), EcsError> {
        if self.registry.is_valid(entity) {
            Ok(())
        } else {
            Err(EcsError::InvalidEntity(entity))
        }
    }

    /// Iterates over live entities in ascending slot order.
    pub fn entities(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.registry.iter()
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.registry.len()
    }

    // ── Components ──────────────────────────────────────────────────────────

    /// Attach a component built by the kind's factory from `init`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`], [`EcsError::UnknownComponentType`]
    /// or [`EcsError::DuplicateComponent`].
    pub fn add(
        &mut self,
        entity: EntityId,
        ty: ComponentTypeId,
        init: Option<ComponentData>,
    ) -> Result<(), EcsError> {
        self.ensure_valid(entity)?;
        self.store.insert(entity, ty, init)
    }

    /// Attach a typed component value.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponentName`] if `T` is not registered, or
    /// any error from [`World::add`].
    pub fn insert<T: Component>(&mut self, entity: EntityId, value: T) -> Result<(), EcsError> {
        let ty = self.registered::<T>()?;
        self.add(entity, ty, Some(Box::new(value)))
    }

    fn registered<T: Component>(&self) -> Result<ComponentTypeId, EcsError> {
        self.type_of::<T>()
            .ok_or_else(|| EcsError::UnknownComponentName(T::type_name().to_string()))
    }

    /// Replace an existing component value without running hooks.
    ///
    /// Returns `false` if the component was absent.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] or [`EcsError::UnknownComponentType`].
    pub fn overwrite(
        &mut self,
        entity: EntityId,
        ty: ComponentTypeId,
        data: ComponentData,
    ) -> Result<bool, EcsError> {
        self.ensure_valid(entity)?;
        self.store.overwrite(entity, ty, data)
    }

    /// Detach a component. Absent components are a successful no-op.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`] or [`EcsError::UnknownComponentType`].
    pub fn remove(&mut self, entity: EntityId, ty: ComponentTypeId) -> Result<(), EcsError> {
        self.ensure_valid(entity)?;
        self.store.remove(entity, ty)?;
        Ok(())
    }

    /// Detach every component of `entity`, keeping the entity alive.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidEntity`].
    pub fn remove_all(&mut self, entity: EntityId) -> Result<(), EcsError> {
        self.ensure_valid(entity)?;
        self.store.remove_all(entity);
        Ok(())
    }

    /// Returns `true` if a live `entity` carries kind `ty`.
    #[must_use]
    pub fn has(&self, entity: EntityId, ty: ComponentTypeId) -> bool {
        self.is_valid(entity) && self.store.contains(entity, ty)
    }

    /// Borrow a component value.
    #[must_use]
    pub fn get(&self, entity: EntityId, ty: ComponentTypeId) -> Option<&ComponentValue> {
        if !self.is_valid(entity) {
            return None;
        }
        self.store.get(entity, ty)
    }

    /// Mutably borrow a component value.
    #[must_use]
    pub fn get_mut(
        &mut self,
        entity: EntityId,
        ty: ComponentTypeId,
    ) -> Option<&mut ComponentValue> {
        if !self.is_valid(entity) {
            return None;
        }
        self.store.get_mut(entity, ty)
    }

    /// Borrow a typed component.
    #[must_use]
    pub fn component<T: Component>(&self, entity: EntityId) -> Option<&T> {
        let ty = self.type_of::<T>()?;
        self.get(entity, ty)?.downcast_ref::<T>()
    }

    /// Mutably borrow a typed component.
    #[must_use]
    pub fn component_mut<T: Component>(&mut self, entity: EntityId) -> Option<&mut T> {
        let ty = self.type_of::<T>()?;
        self.get_mut(entity, ty)?.downcast_mut::<T>()
    }

    /// Serialise a component with its registered serialiser.
    ///
    /// Returns `Ok(None)` if the component is absent or the kind has no
    /// serialiser.
    ///
    /// # Errors
    ///
    /// Propagates serialiser failures.
    pub fn serialize_component(
        &self,
        entity: EntityId,
        ty: ComponentTypeId,
    ) -> Result<Option<Vec<u8>>, EcsError> {
        let Some(serialize) = self
            .store
            .descriptor(ty)
            .and_then(|descriptor| descriptor.options.serialize.as_ref())
        else {
            return Ok(None);
        };
        self.get(entity, ty).map(|value| serialize(value)).transpose()
    }

    /// Rebuild a component value from bytes with the kind's deserialiser.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponentType`], or
    /// [`EcsError::InvalidComponentOptions`] if the kind has no deserialiser,
    /// or propagates decode failures.
    pub fn deserialize_component(
        &self,
        ty: ComponentTypeId,
        bytes: &[u8],
    ) -> Result<ComponentData, EcsError> {
        let descriptor = self
            .store
            .descriptor(ty)
            .ok_or(EcsError::UnknownComponentType(ty))?;
        let deserialize = descriptor.options.deserialize.as_ref().ok_or_else(|| {
            EcsError::InvalidComponentOptions(format!("'{}' has no deserializer", descriptor.name))
        })?;
        deserialize(bytes)
    }

    // ── Queries ─────────────────────────────────────────────────────────────

    /// Returns the live entities matching `query`, in ascending slot order.
    #[must_use]
    pub fn query(&self, query: &QueryDescriptor) -> Vec<EntityId> {
        self.registry
            .iter()
            .filter(|&entity| query.matches(|ty| self.store.contains(entity, ty)))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Health {
        current: f32,
    }

    impl Component for Health {
        fn type_name() -> &'static str {
            "Health"
        }
    }

    #[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
    struct Mana(u32);

    impl Component for Mana {
        fn type_name() -> &'static str {
            "Mana"
        }
    }

    fn counted(added: &Arc<AtomicUsize>, removed: &Arc<AtomicUsize>) -> ComponentDescriptor {
        let added = added.clone();
        let removed = removed.clone();
        Health::descriptor()
            .on_added(move |_, _| {
                added.fetch_add(1, Ordering::SeqCst);
            })
            .on_removed(move |_, _| {
                removed.fetch_add(1, Ordering::SeqCst);
            })
    }

    #[test]
    fn test_destroy_invalidates_and_clears() {
        let mut world = World::new();
        let health = world.register::<Health>().unwrap();
        let e = world.create(vec![(health, None)]).unwrap();
        assert!(world.has(e, health));

        world.destroy(e).unwrap();
        assert!(!world.is_valid(e));
        assert!(!world.has(e, health));
        assert!(world.get(e, health).is_none());
        assert!(matches!(world.destroy(e), Err(EcsError::InvalidEntity(_))));

        let reused = world.spawn_empty();
        assert_eq!(reused.index(), e.index());
        assert_ne!(reused, e);
        assert!(!world.has(reused, health));
    }

    #[test]
    fn test_add_remove_add_runs_hooks_once_per_call() {
        let added = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        let mut world = World::new();
        let ty = world.register_type(counted(&added, &removed)).unwrap();
        let e = world.spawn_empty();

        world.add(e, ty, None).unwrap();
        world.remove(e, ty).unwrap();
        world.add(e, ty, None).unwrap();
        assert_eq!(added.load(Ordering::SeqCst), 2);
        assert_eq!(removed.load(Ordering::SeqCst), 1);

        assert!(matches!(
            world.add(e, ty, None),
            Err(EcsError::DuplicateComponent { .. })
        ));
        assert_eq!(added.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let added = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        let mut world = World::new();
        let ty = world.register_type(counted(&added, &removed)).unwrap();
        let e = world.spawn_empty();
        world.remove(e, ty).unwrap();
        assert_eq!(removed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_destroy_runs_each_removal_hook_once() {
        let added = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        let mut world = World::new();
        let ty = world.register_type(counted(&added, &removed)).unwrap();
        let e = world.create(vec![(ty, None)]).unwrap();
        world.destroy(e).unwrap();
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_on_added_sees_constructed_value() {
        let seen = Arc::new(std::sync::Mutex::new(None));
        let mut world = World::new();
        let sink = seen.clone();
        let ty = world
            .register_type(Health::descriptor().on_added(move |_, value| {
                *sink.lock().unwrap() = value.downcast_ref::<Health>().cloned();
            }))
            .unwrap();
        let e = world.spawn_empty();
        world
            .add(e, ty, Some(Box::new(Health { current: 12.0 })))
            .unwrap();
        assert_eq!(*seen.lock().unwrap(), Some(Health { current: 12.0 }));
    }

    #[test]
    fn test_add_to_invalid_entity_fails() {
        let mut world = World::new();
        let ty = world.register::<Health>().unwrap();
        let e = world.spawn_empty();
        world.destroy(e).unwrap();
        assert!(matches!(
            world.add(e, ty, None),
            Err(EcsError::InvalidEntity(_))
        ));
    }

    #[test]
    fn test_create_rolls_back_on_failure() {
        let added = Arc::new(AtomicUsize::new(0));
        let removed = Arc::new(AtomicUsize::new(0));
        let mut world = World::new();
        let ty = world.register_type(counted(&added, &removed)).unwrap();
        let result = world.create(vec![(ty, None), (ty, None)]);
        assert!(matches!(result, Err(EcsError::DuplicateComponent { .. })));
        assert_eq!(world.entity_count(), 0);
        assert_eq!(removed.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_typed_access() {
        let mut world = World::new();
        world.register::<Health>().unwrap();
        let e = world.spawn_empty();
        world.insert(e, Health { current: 3.0 }).unwrap();
        world.component_mut::<Health>(e).unwrap().current = 4.0;
        assert_eq!(world.component::<Health>(e), Some(&Health { current: 4.0 }));
        assert!(matches!(
            world.insert(e, Mana(1)),
            Err(EcsError::UnknownComponentName(_))
        ));
    }

    #[test]
    fn test_query_with_without() {
        let mut world = World::new();
        let health = world.register::<Health>().unwrap();
        let mana = world.register::<Mana>().unwrap();
        let a = world.create(vec![(health, None)]).unwrap();
        let b = world.create(vec![(health, None), (mana, None)]).unwrap();
        let _c = world.create(vec![(mana, None)]).unwrap();

        let q = QueryDescriptor::new().with(health);
        assert_eq!(world.query(&q), vec![a, b]);

        let q = QueryDescriptor::new().with(health).without(mana);
        assert_eq!(world.query(&q), vec![a]);
    }

    #[test]
    fn test_replicated_types_and_serialization() {
        let mut world = World::new();
        let health = world
            .register_type(Health::descriptor().replicated())
            .unwrap();
        world.register::<Mana>().unwrap();

        let names: Vec<_> = world.replicated_types().map(|(_, name, _)| name).collect();
        assert_eq!(names, vec!["Health"]);

        let e = world.spawn_empty();
        assert_eq!(world.serialize_component(e, health).unwrap(), None);
        world.insert(e, Health { current: 9.0 }).unwrap();
        let bytes = world.serialize_component(e, health).unwrap().unwrap();
        let restored = world.deserialize_component(health, &bytes).unwrap();
        assert_eq!(
            restored.downcast_ref::<Health>(),
            Some(&Health { current: 9.0 })
        );
    }
}

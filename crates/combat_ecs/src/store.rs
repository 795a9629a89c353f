//! Type-erased component storage.
//!
//! The [`ComponentStore`] keeps one table per registered component kind, in
//! registration order. Each table maps an entity slot index to its value.
//! Entity validity is the caller's concern; the [`World`](crate::World)
//! checks identifiers before touching the store.

use std::collections::HashMap;

use crate::component::{ComponentData, ComponentDescriptor, ComponentTypeId, ComponentValue};
use crate::entity::EntityId;
use crate::error::EcsError;

#[derive(Debug)]
struct TypeTable {
    id: ComponentTypeId,
    descriptor: ComponentDescriptor,
    records: HashMap<u32, ComponentData>,
}

/// Storage for all component records of a world.
#[derive(Debug, Default)]
pub struct ComponentStore {
    tables: Vec<TypeTable>,
    by_id: HashMap<ComponentTypeId, usize>,
    by_name: HashMap<String, ComponentTypeId>,
}

impl ComponentStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a component kind and returns its fresh handle.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidComponentOptions`] if the options are
    /// inconsistent or the name is already taken.
    pub fn register(
        &mut self,
        descriptor: ComponentDescriptor,
    ) -> Result<ComponentTypeId, EcsError> {
        descriptor.options.validate(&descriptor.name)?;
        if self.by_name.contains_key(&descriptor.name) {
            return Err(EcsError::InvalidComponentOptions(format!(
                "'{}' is already registered",
                descriptor.name
            )));
        }

        let id = ComponentTypeId::next();
        self.by_id.insert(id, self.tables.len());
        self.by_name.insert(descriptor.name.clone(), id);
        self.tables.push(TypeTable {
            id,
            descriptor,
            records: HashMap::new(),
        });
        Ok(id)
    }

    fn table(&self, ty: ComponentTypeId) -> Result<&TypeTable, EcsError> {
        self.by_id
            .get(&ty)
            .map(|&idx| &self.tables[idx])
            .ok_or(EcsError::UnknownComponentType(ty))
    }

    fn table_mut(&mut self, ty: ComponentTypeId) -> Result<&mut TypeTable, EcsError> {
        match self.by_id.get(&ty) {
            Some(&idx) => Ok(&mut self.tables[idx]),
            None => Err(EcsError::UnknownComponentType(ty)),
        }
    }

    /// Returns the descriptor a kind was registered with.
    #[must_use]
    pub fn descriptor(&self, ty: ComponentTypeId) -> Option<&ComponentDescriptor> {
        self.table(ty).ok().map(|table| &table.descriptor)
    }

    /// Looks up a kind by its registered name.
    #[must_use]
    pub fn type_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.by_name.get(name).copied()
    }

    /// Iterates over registered kinds in registration order.
    pub fn types(&self) -> impl Iterator<Item = (ComponentTypeId, &ComponentDescriptor)> {
        self.tables.iter().map(|table| (table.id, &table.descriptor))
    }

    /// Constructs a value through the kind's factory, stores it, then runs
    /// `on_added`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponentType`] or
    /// [`EcsError::DuplicateComponent`].
    pub fn insert(
        &mut self,
        entity: EntityId,
        ty: ComponentTypeId,
        init: Option<ComponentData>,
    ) -> Result<(), EcsError> {
        let table = self.table_mut(ty)?;
        if table.records.contains_key(&entity.index()) {
            return Err(EcsError::DuplicateComponent {
                entity,
                component: ty,
            });
        }

        let value = (table.descriptor.factory)(init);
        let hook = table.descriptor.options.on_added.clone();
        let stored = table.records.entry(entity.index()).or_insert(value);
        if let Some(hook) = hook {
            hook(entity, &**stored);
        }
        Ok(())
    }

    /// Replaces an existing value without running hooks.
    ///
    /// Returns `false` if the entity had no value of this kind.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponentType`].
    pub fn overwrite(
        &mut self,
        entity: EntityId,
        ty: ComponentTypeId,
        data: ComponentData,
    ) -> Result<bool, EcsError> {
        let table = self.table_mut(ty)?;
        match table.records.get_mut(&entity.index()) {
            Some(slot) => {
                *slot = data;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Runs `on_removed` and drops the value. Absent values are a no-op.
    ///
    /// Returns `true` if a value was removed.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponentType`].
    pub fn remove(&mut self, entity: EntityId, ty: ComponentTypeId) -> Result<bool, EcsError> {
        let table = self.table_mut(ty)?;
        Ok(Self::remove_from(table, entity))
    }

    fn remove_from(table: &mut TypeTable, entity: EntityId) -> bool {
        let Some(value) = table.records.get(&entity.index()) else {
            return false;
        };
        if let Some(hook) = &table.descriptor.options.on_removed {
            hook(entity, &**value);
        }
        table.records.remove(&entity.index());
        true
    }

    /// Removes every value owned by `entity`, in registration order.
    pub fn remove_all(&mut self, entity: EntityId) -> usize {
        self.tables
            .iter_mut()
            .map(|table| Self::remove_from(table, entity))
            .filter(|removed| *removed)
            .count()
    }

    /// Returns `true` if `entity` has a value of kind `ty`.
    #[must_use]
    pub fn contains(&self, entity: EntityId, ty: ComponentTypeId) -> bool {
        self.table(ty)
            .is_ok_and(|table| table.records.contains_key(&entity.index()))
    }

    /// Borrows a stored value.
    #[must_use]
    pub fn get(&self, entity: EntityId, ty: ComponentTypeId) -> Option<&ComponentValue> {
        self.table(ty)
            .ok()?
            .records
            .get(&entity.index())
            .map(|value| &**value)
    }

    /// Mutably borrows a stored value.
    #[must_use]
    pub fn get_mut(
        &mut self,
        entity: EntityId,
        ty: ComponentTypeId,
    ) -> Option<&mut ComponentValue> {
        self.table_mut(ty)
            .ok()?
            .records
            .get_mut(&entity.index())
            .map(|value| &mut **value)
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;

    fn counter_descriptor(name: &str, removed: Arc<AtomicUsize>) -> ComponentDescriptor {
        ComponentDescriptor::new(name, |init| {
            init.unwrap_or_else(|| Box::new(0u32) as ComponentData)
        })
            .on_removed(move |_, _| {
                removed.fetch_add(1, Ordering::SeqCst);
            })
    }

    #[test]
    fn test_register_duplicate_name_fails() {
        let mut store = ComponentStore::new();
        let removed = Arc::new(AtomicUsize::new(0));
        store
            .register(counter_descriptor("A", removed.clone()))
            .unwrap();
        assert!(matches!(
            store.register(counter_descriptor("A", removed)),
            Err(EcsError::InvalidComponentOptions(_))
        ));
    }

    #[test]
    fn test_remove_all_runs_hooks_in_registration_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let mut store = ComponentStore::new();
        let mut ids = Vec::new();
        for name in ["First", "Second", "Third"] {
            let order = order.clone();
            let descriptor = ComponentDescriptor::new(name, |_| Box::new(()) as ComponentData)
                .on_removed(move |_, _| order.lock().unwrap().push(name));
            ids.push(store.register(descriptor).unwrap());
        }

        let entity = EntityId::from_parts(0, 0);
        store.insert(entity, ids[2], None).unwrap();
        store.insert(entity, ids[0], None).unwrap();
        store.insert(entity, ids[1], None).unwrap();

        assert_eq!(store.remove_all(entity), 3);
        assert_eq!(*order.lock().unwrap(), vec!["First", "Second", "Third"]);
    }

    #[test]
    fn test_overwrite_skips_hooks() {
        let removed = Arc::new(AtomicUsize::new(0));
        let mut store = ComponentStore::new();
        let ty = store
            .register(counter_descriptor("Counter", removed.clone()))
            .unwrap();
        let entity = EntityId::from_parts(3, 0);

        assert!(!store.overwrite(entity, ty, Box::new(1u32)).unwrap());
        store.insert(entity, ty, None).unwrap();
        assert!(store.overwrite(entity, ty, Box::new(9u32)).unwrap());
        assert_eq!(
            store.get(entity, ty).and_then(|v| v.downcast_ref::<u32>()),
            Some(&9)
        );
        assert_eq!(removed.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_unknown_type_is_reported() {
        let mut store = ComponentStore::new();
        let bogus = ComponentTypeId::next();
        let entity = EntityId::from_parts(0, 0);
        assert!(matches!(
            store.insert(entity, bogus, None),
            Err(EcsError::UnknownComponentType(_))
        ));
        assert!(!store.contains(entity, bogus));
    }
}

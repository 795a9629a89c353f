//! Entity identifiers and the generational registry that hands them out.
//!
//! An [`EntityId`] is a pair of `(index, generation)`. The index addresses a
//! slot in the [`EntityRegistry`]; the generation is bumped every time the
//! slot is released, so identifiers held across a destroy never alias the
//! entity that later reuses the slot.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tracing::trace;

/// A generational entity identifier.
///
/// Entities are pure identifiers and carry no data of their own. Components
/// are attached to entities through the [`World`](crate::World).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId {
    index: u32,
    generation: u32,
}

impl EntityId {
    /// Build an identifier from its raw parts.
    #[must_use]
    pub const fn from_parts(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    /// The slot index in the registry.
    #[must_use]
    pub const fn index(self) -> u32 {
        self.index
    }

    /// The generation of the slot at the time this identifier was issued.
    #[must_use]
    pub const fn generation(self) -> u32 {
        self.generation
    }
}

impl std::fmt::Display for EntityId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Entity({}v{})", self.index, self.generation)
    }
}

#[derive(Debug, Clone, Copy)]
struct Slot {
    generation: u32,
    alive: bool,
}

/// Allocates and recycles generational entity identifiers.
///
/// Released slots go onto a free list and the lowest free index is reused
/// first, which keeps allocation deterministic for replays and tests.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    slots: Vec<Slot>,
    free: BTreeSet<u32>,
    live: usize,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocates a fresh identifier, reusing the lowest free slot if any.
    pub fn allocate(&mut self) -> EntityId {
        self.live += 1;
        if let Some(index) = self.free.pop_first() {
            let slot = &mut self.slots[index as usize];
            slot.alive = true;
            return EntityId::from_parts(index, slot.generation);
        }

        let index = self.slots.len() as u32;
        self.slots.push(Slot {
            generation: 0,
            alive: true,
        });
        EntityId::from_parts(index, 0)
    }

    /// Invalidates `entity` and returns its slot to the free list.
    ///
    /// A slot whose generation cannot advance any further is retired instead
    /// and never handed out again.
    ///
    /// Returns `false` if the identifier was already stale.
    pub fn release(&mut self, entity: EntityId) -> bool {
        if !self.is_valid(entity) {
            return false;
        }
        let slot = &mut self.slots[entity.index as usize];
        slot.alive = false;
        self.live -= 1;
        match slot.generation.checked_add(1) {
            Some(next) => {
                slot.generation = next;
                self.free.insert(entity.index);
            }
            None => trace!(index = entity.index, "slot generations exhausted, index retired"),
        }
        true
    }

    /// Returns `true` if `entity` refers to a live slot with a matching
    /// generation.
    #[must_use]
    pub fn is_valid(&self, entity: EntityId) -> bool {
        self.slots
            .get(entity.index as usize)
            .is_some_and(|slot| slot.alive && slot.generation == entity.generation)
    }

    /// Returns the live identifier currently occupying `index`, if any.
    #[must_use]
    pub fn resolve(&self, index: u32) -> Option<EntityId> {
        self.slots
            .get(index as usize)
            .filter(|slot| slot.alive)
            .map(|slot| EntityId::from_parts(index, slot.generation))
    }

    /// Iterates over all live identifiers in ascending index order.
    pub fn iter(&self) -> impl Iterator<Item = EntityId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter(|(_, slot)| slot.alive)
            .map(|(index, slot)| EntityId::from_parts(index as u32, slot.generation))
    }

    /// Returns the number of live entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.live
    }

    /// Returns `true` if no entity is alive.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.live == 0
    }
}

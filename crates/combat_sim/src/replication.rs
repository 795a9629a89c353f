//! Authority → peer component replication.
//!
//! The [`Replicator`] runs on the authority. After each step it serialises
//! every replicated component and diffs the bytes against what it last sent,
//! producing [`ReplicationMessage`]s. A peer that connects late receives a
//! full snapshot of the last sent state.
//!
//! The [`ReplicationMirror`] runs on the peer. It owns a shadow [`World`] with
//! the same component kinds registered, maps authority entity ids to local
//! ones, and maintains reverse indices from external keys (character handle,
//! owning peer) to local entities. Data for entities the mirror has not seen
//! spawn is dropped.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use combat_ecs::{Component, ComponentValue, EntityId, World};
use combat_net::ReplicationMessage;
use tracing::{debug, trace, warn};

// ── Authority side ──────────────────────────────────────────────────────────

/// Diffs replicated component state against the last payloads sent.
#[derive(Debug, Default)]
pub struct Replicator {
    sent: BTreeMap<EntityId, BTreeMap<String, Vec<u8>>>,
}

impl Replicator {
    /// A replicator that has sent nothing yet.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages that bring a peer holding the last sent state up to date
    /// with `world`. Updates the sent state.
    pub fn diff(&mut self, world: &World) -> Vec<ReplicationMessage> {
        let mut out = Vec::new();

        let destroyed: Vec<EntityId> = self
            .sent
            .keys()
            .filter(|entity| !world.is_valid(**entity))
            .copied()
            .collect();
        for entity in destroyed {
            self.sent.remove(&entity);
            out.push(ReplicationMessage::Destroyed { entity });
        }

        for entity in world.entities() {
            let current = replicated_state(world, entity);
            if current.is_empty() && !self.sent.contains_key(&entity) {
                continue;
            }
            let previous = self.sent.entry(entity).or_insert_with(|| {
                out.push(ReplicationMessage::Spawned { entity });
                BTreeMap::new()
            });
            for (component, data) in &current {
                if previous.get(component) != Some(data) {
                    out.push(ReplicationMessage::ComponentUpdated {
                        entity,
                        component: component.clone(),
                        data: data.clone(),
                    });
                }
            }
            for component in previous.keys() {
                if !current.contains_key(component) {
                    out.push(ReplicationMessage::ComponentRemoved {
                        entity,
                        component: component.clone(),
                    });
                }
            }
            *previous = current;
        }
        out
    }

    /// The full last sent state, for a newly connected peer.
    #[must_use]
    pub fn snapshot(&self) -> Vec<ReplicationMessage> {
        let mut out = Vec::new();
        for (entity, components) in &self.sent {
            out.push(ReplicationMessage::Spawned { entity: *entity });
            out.extend(components.iter().map(|(component, data)| {
                ReplicationMessage::ComponentUpdated {
                    entity: *entity,
                    component: component.clone(),
                    data: data.clone(),
                }
            }));
        }
        out
    }

    /// Number of entities currently mirrored.
    #[must_use]
    pub fn tracked(&self) -> usize {
        self.sent.len()
    }
}

fn replicated_state(world: &World, entity: EntityId) -> BTreeMap<String, Vec<u8>> {
    let mut state = BTreeMap::new();
    for (ty, name, serialize) in world.replicated_types() {
        let Some(value) = world.get(entity, ty) else {
            continue;
        };
        match serialize(value) {
            Ok(bytes) => {
                state.insert(name.to_string(), bytes);
            }
            Err(err) => warn!(%entity, component = name, %err, "failed to serialise component"),
        }
    }
    state
}

// ── Peer side ───────────────────────────────────────────────────────────────

type KeyFn = Arc<dyn Fn(&ComponentValue) -> Option<u64> + Send + Sync>;

struct ReverseIndex {
    component: String,
    key_of: KeyFn,
    by_key: HashMap<u64, EntityId>,
    by_entity: HashMap<EntityId, u64>,
}

impl ReverseIndex {
    fn set(&mut self, entity: EntityId, key: Option<u64>) {
        if let Some(old) = self.by_entity.remove(&entity) {
            self.by_key.remove(&old);
        }
        if let Some(key) = key {
            if let Some(previous) = self.by_key.insert(key, entity) {
                if previous != entity {
                    self.by_entity.remove(&previous);
                }
            }
            self.by_entity.insert(entity, key);
        }
    }
}

/// Peer-side read-only shadow of the authority's replicated components.
pub struct ReplicationMirror {
    world: World,
    local: HashMap<EntityId, EntityId>,
    remote: HashMap<EntityId, EntityId>,
    indices: Vec<ReverseIndex>,
}

impl ReplicationMirror {
    /// Mirror into `world`, which must have the replicated kinds registered.
    #[must_use]
    pub fn new(world: World) -> Self {
        Self {
            world,
            local: HashMap::new(),
            remote: HashMap::new(),
            indices: Vec::new(),
        }
    }

    /// The shadow world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Local id of an authority entity.
    #[must_use]
    pub fn local_id(&self, remote: EntityId) -> Option<EntityId> {
        self.local.get(&remote).copied()
    }

    /// Authority id of a local entity.
    #[must_use]
    pub fn remote_id(&self, local: EntityId) -> Option<EntityId> {
        self.remote.get(&local).copied()
    }

    /// Maintain a reverse index from a key derived from component `T`.
    ///
    /// Entities already mirrored are indexed immediately.
    pub fn index_by<T, F>(&mut self, key_of: F)
    where
        T: Component,
        F: Fn(&T) -> u64 + Send + Sync + 'static,
    {
        let key_of: KeyFn =
            Arc::new(move |value: &ComponentValue| value.downcast_ref::<T>().map(&key_of));
        let mut index = ReverseIndex {
            component: T::type_name().to_string(),
            key_of,
            by_key: HashMap::new(),
            by_entity: HashMap::new(),
        };
        if let Some(ty) = self.world.type_of::<T>() {
            for entity in self.world.entities() {
                let key = self.world.get(entity, ty).and_then(|value| (index.key_of)(value));
                index.set(entity, key);
            }
        }
        self.indices.retain(|existing| existing.component != index.component);
        self.indices.push(index);
    }

    /// Local entity whose `T` maps to `key`.
    #[must_use]
    pub fn entity_for<T: Component>(&self, key: u64) -> Option<EntityId> {
        self.index::<T>()?.by_key.get(&key).copied()
    }

    /// Key of a local entity in the `T` index.
    #[must_use]
    pub fn key_for<T: Component>(&self, entity: EntityId) -> Option<u64> {
        self.index::<T>()?.by_entity.get(&entity).copied()
    }

    fn index<T: Component>(&self) -> Option<&ReverseIndex> {
        self.indices
            .iter()
            .find(|index| index.component == T::type_name())
    }

    /// Apply one replication message.
    pub fn apply(&mut self, message: &ReplicationMessage) {
        match message {
            ReplicationMessage::Spawned { entity } => {
                if self.local.contains_key(entity) {
                    trace!(%entity, "duplicate spawn ignored");
                    return;
                }
                let local = self.world.spawn_empty();
                self.local.insert(*entity, local);
                self.remote.insert(local, *entity);
                debug!(remote = %entity, %local, "mirrored entity spawned");
            }
            ReplicationMessage::ComponentUpdated {
                entity,
                component,
                data,
            } => self.update(*entity, component, data),
            ReplicationMessage::ComponentRemoved { entity, component } => {
                let (Some(local), Some(ty)) =
                    (self.local_id(*entity), self.world.type_by_name(component))
                else {
                    trace!(%entity, %component, "removal for unknown entity or kind dropped");
                    return;
                };
                if let Err(err) = self.world.remove(local, ty) {
                    warn!(%entity, %component, %err, "failed to remove mirrored component");
                }
                self.reindex(local, component);
            }
            ReplicationMessage::Destroyed { entity } => {
                let Some(local) = self.local.remove(entity) else {
                    trace!(%entity, "destroy for unknown entity dropped");
                    return;
                };
                self.remote.remove(&local);
                for index in &mut self.indices {
                    index.set(local, None);
                }
                if let Err(err) = self.world.destroy(local) {
                    warn!(%entity, %err, "failed to destroy mirrored entity");
                }
                debug!(remote = %entity, %local, "mirrored entity destroyed");
            }
        }
    }

    fn update(&mut self, entity: EntityId, component: &str, data: &[u8]) {
        let Some(local) = self.local_id(entity) else {
            trace!(%entity, component, "update for unknown entity dropped");
            return;
        };
        let Some(ty) = self.world.type_by_name(component) else {
            warn!(%entity, component, "update for unregistered component dropped");
            return;
        };
        let value = match self.world.deserialize_component(ty, data) {
            Ok(value) => value,
            Err(err) => {
                warn!(%entity, component, %err, "failed to decode mirrored component");
                return;
            }
        };
        let result = if self.world.has(local, ty) {
            self.world.overwrite(local, ty, value).map(|_| ())
        } else {
            self.world.add(local, ty, Some(value))
        };
        if let Err(err) = result {
            warn!(%entity, component, %err, "failed to store mirrored component");
            return;
        }
        self.reindex(local, component);
    }

    fn reindex(&mut self, local: EntityId, component: &str) {
        let Some(ty) = self.world.type_by_name(component) else {
            return;
        };
        for index in self.indices.iter_mut().filter(|index| index.component == component) {
            let key = self.world.get(local, ty).and_then(|value| (index.key_of)(value));
            index.set(local, key);
        }
    }
}

impl std::fmt::Debug for ReplicationMirror {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplicationMirror")
            .field("entities", &self.local.len())
            .field("indices", &self.indices.len())
            .finish_non_exhaustive()
    }
}

//! The authority simulation: world, clock, engines and peer outbox.

use std::collections::BTreeSet;

use combat_ecs::{ComponentData, ComponentMap, ComponentTypeId, EntityId, World};
use combat_net::{AuthorityMessage, PeerFrame, PeerId, PeerMessage, SkillAction, SlotIndex};
use tracing::{debug, info, warn};

use crate::clock::SimClock;
use crate::components::{
    BuiltinTypes, CancelKind, PeerOwner, Skills, SlotState, StatusEffectInstance, StatusEffects,
    register_builtin,
};
use crate::error::SkillError;
use crate::outbox::Outbox;
use crate::replication::Replicator;
use crate::skills::{Origin, SkillDef, SkillEngine, SkillEnv};
use crate::status::{self, Application, StatusEffectDef, StatusEngine};

/// Authority-side combat simulation.
///
/// Everything a step produces for peers (skill signals and replication
/// deltas) lands in one outbox, in order, and is taken with
/// [`drain_outbox`](Self::drain_outbox).
#[derive(Debug)]
pub struct Simulation {
    world: World,
    types: BuiltinTypes,
    clock: SimClock,
    skills: SkillEngine,
    status: StatusEngine,
    replicator: Replicator,
    peers: BTreeSet<PeerId>,
    outbox: Outbox,
}

impl Simulation {
    /// A simulation with the built-in components registered.
    ///
    /// # Errors
    ///
    /// Returns an ECS error if registration fails.
    pub fn new() -> Result<Self, SkillError> {
        Self::with_world(World::new())
    }

    /// Wrap an existing world, registering the built-in components in it.
    ///
    /// # Errors
    ///
    /// Returns an ECS error if a built-in name is already taken.
    pub fn with_world(mut world: World) -> Result<Self, SkillError> {
        let types = register_builtin(&mut world)?;
        Ok(Self {
            world,
            types,
            clock: SimClock::new(),
            skills: SkillEngine::new(),
            status: StatusEngine::new(),
            replicator: Replicator::new(),
            peers: BTreeSet::new(),
            outbox: Outbox::default(),
        })
    }

    /// The authority world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// Mutable access to the authority world.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// Handles of the built-in component kinds.
    #[must_use]
    pub fn types(&self) -> BuiltinTypes {
        self.types
    }

    /// Current simulation time in seconds.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.clock.now()
    }

    /// The simulation clock.
    #[must_use]
    pub fn clock(&self) -> SimClock {
        self.clock
    }

    /// Register an authority skill definition.
    pub fn register_skill(&mut self, def: SkillDef) {
        self.skills.register(def);
    }

    /// Register status-effect hooks.
    pub fn register_effect(&mut self, def: StatusEffectDef) {
        self.status.register(def);
    }

    fn env(&mut self) -> (SkillEnv<'_>, &SkillEngine) {
        (
            SkillEnv {
                world: &mut self.world,
                outbox: &mut self.outbox,
                now: self.clock.now(),
            },
            &self.skills,
        )
    }

    // ── Characters ──────────────────────────────────────────────────────────

    /// Create a combat character from `components`, adding empty [`Skills`]
    /// and [`StatusEffects`] unless given, plus [`PeerOwner`] when owned.
    ///
    /// # Errors
    ///
    /// Returns an ECS error if creation fails; nothing is left behind.
    pub fn spawn_character(
        &mut self,
        owner: Option<PeerId>,
        mut components: ComponentMap,
    ) -> Result<EntityId, SkillError> {
        let present = |components: &ComponentMap, ty: ComponentTypeId| {
            components.iter().any(|(t, _)| *t == ty)
        };
        if !present(&components, self.types.skills) {
            components.push((self.types.skills, None));
        }
        if !present(&components, self.types.status_effects) {
            components.push((self.types.status_effects, None));
        }
        if let Some(peer) = owner {
            components.retain(|(ty, _)| *ty != self.types.peer_owner);
            components.push((
                self.types.peer_owner,
                Some(Box::new(PeerOwner(peer)) as ComponentData),
            ));
        }
        let entity = self.world.create(components)?;
        debug!(%entity, owner = ?owner, "character spawned");
        Ok(entity)
    }

    /// Reject every slot that is not idle, remove every status effect, then
    /// destroy the entity.
    ///
    /// Active slots run their cancel and stop routines and the owner gets a
    /// `SkillReject` for each of them.
    ///
    /// # Errors
    ///
    /// Returns an ECS error if the entity is invalid.
    pub fn destroy(&mut self, entity: EntityId) -> Result<(), SkillError> {
        let busy: Vec<SlotIndex> = self
            .world
            .component::<Skills>(entity)
            .map(|skills| {
                skills
                    .slots
                    .iter()
                    .enumerate()
                    .filter(|(_, slot)| slot.state != SlotState::Idle)
                    .filter_map(|(index, _)| SlotIndex::try_from(index).ok())
                    .collect()
            })
            .unwrap_or_default();
        for slot in busy {
            let (mut env, engine) = self.env();
            if let Err(err) = engine.cancel_skill(&mut env, entity, slot, CancelKind::Reject) {
                warn!(%entity, slot, %err, "failed to cancel slot of destroyed entity");
            }
        }
        self.status.remove_all(&mut self.world, entity)?;
        self.world.destroy(entity)?;
        debug!(%entity, "character destroyed");
        Ok(())
    }

    // ── Skills ──────────────────────────────────────────────────────────────

    /// Bind a registered skill to a slot.
    ///
    /// # Errors
    ///
    /// See [`SkillEngine::set_slot`].
    pub fn set_slot(
        &mut self,
        entity: EntityId,
        slot: SlotIndex,
        skill: &str,
    ) -> Result<(), SkillError> {
        self.skills.set_slot(&mut self.world, entity, slot, Some(skill))
    }

    /// Unbind a slot.
    ///
    /// # Errors
    ///
    /// See [`SkillEngine::set_slot`].
    pub fn clear_slot(&mut self, entity: EntityId, slot: SlotIndex) -> Result<(), SkillError> {
        self.skills.set_slot(&mut self.world, entity, slot, None)
    }

    /// State of a slot, `None` if it does not exist.
    #[must_use]
    pub fn slot_state(&self, entity: EntityId, slot: SlotIndex) -> Option<SlotState> {
        self.skills.slot_state(&self.world, entity, slot)
    }

    /// Seconds until a slot can start again.
    ///
    /// # Errors
    ///
    /// See [`SkillEngine::cooldown_remaining`].
    pub fn get_cooldown_remaining(
        &self,
        entity: EntityId,
        slot: SlotIndex,
    ) -> Result<f64, SkillError> {
        self.skills
            .cooldown_remaining(&self.world, self.clock.now(), entity, slot)
    }

    /// Start a slot from server-side logic.
    ///
    /// # Errors
    ///
    /// See [`SkillEngine::start_skill`].
    pub fn start_skill(
        &mut self,
        entity: EntityId,
        slot: SlotIndex,
    ) -> Result<SlotState, SkillError> {
        let (mut env, engine) = self.env();
        engine.start_skill(&mut env, entity, slot, Origin::Authority)
    }

    /// Stop a running slot.
    ///
    /// # Errors
    ///
    /// See [`SkillEngine::stop_skill`].
    pub fn stop_skill(&mut self, entity: EntityId, slot: SlotIndex) -> Result<(), SkillError> {
        let (mut env, engine) = self.env();
        engine.stop_skill(&mut env, entity, slot, Origin::Authority)
    }

    /// Cancel a slot, running its cancel and stop routines.
    ///
    /// # Errors
    ///
    /// See [`SkillEngine::cancel_skill`].
    pub fn cancel_skill(&mut self, entity: EntityId, slot: SlotIndex) -> Result<(), SkillError> {
        let (mut env, engine) = self.env();
        engine.cancel_skill(&mut env, entity, slot, CancelKind::Reject)
    }

    /// Reject a slot without running routines.
    ///
    /// # Errors
    ///
    /// See [`SkillEngine::reject_skill`].
    pub fn reject_skill(&mut self, entity: EntityId, slot: SlotIndex) -> Result<(), SkillError> {
        let (mut env, engine) = self.env();
        engine.reject_skill(&mut env, entity, slot)
    }

    // ── Status effects ──────────────────────────────────────────────────────

    /// Apply or stack a status effect.
    ///
    /// # Errors
    ///
    /// See [`StatusEngine::apply`].
    pub fn apply_effect(
        &mut self,
        entity: EntityId,
        name: &str,
        application: &Application,
    ) -> Result<(), SkillError> {
        self.status.apply(&mut self.world, entity, name, application)
    }

    /// Remove a status effect. Returns `false` if it was not active.
    ///
    /// # Errors
    ///
    /// See [`StatusEngine::remove`].
    pub fn remove_effect(&mut self, entity: EntityId, name: &str) -> Result<bool, SkillError> {
        self.status.remove(&mut self.world, entity, name)
    }

    /// Remove every status effect from an entity.
    ///
    /// # Errors
    ///
    /// See [`StatusEngine::remove_all`].
    pub fn remove_all_effects(&mut self, entity: EntityId) -> Result<usize, SkillError> {
        self.status.remove_all(&mut self.world, entity)
    }

    /// An active status effect instance.
    #[must_use]
    pub fn effect(&self, entity: EntityId, name: &str) -> Option<&StatusEffectInstance> {
        status::effect(&self.world, entity, name)
    }

    /// Names of the active effects on an entity, in name order.
    #[must_use]
    pub fn effect_names(&self, entity: EntityId) -> Vec<String> {
        self.world
            .component::<StatusEffects>(entity)
            .map(|effects| effects.effects.keys().cloned().collect())
            .unwrap_or_default()
    }

    // ── Peers ───────────────────────────────────────────────────────────────

    /// Start replicating to `peer`, beginning with a full snapshot.
    pub fn connect_peer(&mut self, peer: PeerId) {
        if self.peers.contains(&peer) {
            return;
        }
        self.replicate();
        for message in self.replicator.snapshot() {
            self.outbox.push(peer, AuthorityMessage::Replication(message));
        }
        self.peers.insert(peer);
        info!(%peer, "peer connected");
    }

    /// Stop replicating to `peer`.
    pub fn disconnect_peer(&mut self, peer: PeerId) {
        if self.peers.remove(&peer) {
            info!(%peer, "peer disconnected");
        }
    }

    /// Connected peers.
    pub fn peers(&self) -> impl Iterator<Item = PeerId> + '_ {
        self.peers.iter().copied()
    }

    /// Apply a frame received from a peer.
    ///
    /// # Errors
    ///
    /// Returns the error of the requested transition, including
    /// [`SkillError::NotOwner`] for entities the sender does not control.
    pub fn handle_peer_frame(&mut self, frame: &PeerFrame) -> Result<(), SkillError> {
        let peer = frame.peer;
        let PeerMessage::Action {
            entity,
            slot,
            action,
        } = frame.message;
        let (mut env, engine) = self.env();
        match action {
            SkillAction::Start => engine
                .start_skill(&mut env, entity, slot, Origin::Peer(peer))
                .map(|_| ()),
            SkillAction::Stop => engine.stop_skill(&mut env, entity, slot, Origin::Peer(peer)),
            SkillAction::Confirm => engine.confirm(&mut env, entity, slot, peer).map(|_| ()),
        }
    }

    // ── Stepping ────────────────────────────────────────────────────────────

    /// Advance the simulation by `dt` seconds.
    ///
    /// Order: clock, stun/pause gating, status-effect tick, replication.
    pub fn step(&mut self, dt: f64) {
        self.clock.advance(dt);
        {
            let (mut env, engine) = self.env();
            engine.gate(&mut env);
        }
        self.status.tick(&mut self.world, dt);
        self.replicate();
    }

    /// Diff replicated state and queue deltas for every connected peer.
    pub fn replicate(&mut self) {
        let deltas = self.replicator.diff(&self.world);
        if deltas.is_empty() {
            return;
        }
        for peer in &self.peers {
            for message in &deltas {
                self.outbox
                    .push(*peer, AuthorityMessage::Replication(message.clone()));
            }
        }
    }

    /// Take every queued peer-bound message.
    pub fn drain_outbox(&mut self) -> Vec<(PeerId, AuthorityMessage)> {
        self.outbox.drain()
    }
}

//! Authority-side skill state machine.
//!
//! Slot lifecycle:
//!
//! ```text
//! Idle ─start(peer-owned, authority)─▶ Pending ─Confirm─▶ Active ─stop─▶ Idle
//! Idle ─start(peer request / npc)────────────────────────▶ Active
//! Active ─stun/cancel─▶ Cancelling(Reject) ─▶ Idle (rejected)
//! Active ─pause-state─▶ Cancelling(Pause)  ─▶ Paused ─pause clears─▶ start again
//! ```
//!
//! Every transition that concerns the owning peer queues exactly one signal
//! in the [`Outbox`]. Signals for one slot are queued in the order the
//! transitions happen.

use std::sync::Arc;

use combat_ecs::{EcsError, EntityId, QueryDescriptor, World};
use combat_net::{AuthorityMessage, PeerId, SlotIndex};
use tracing::{debug, trace, warn};

use super::context::{SkillCommand, SkillContext, SkillPhase, SlotTarget};
use super::definition::{AuthorityRoutine, SkillDef, SkillRegistry};
use crate::components::{
    CancelKind, PeerOwner, SkillSlot, Skills, SlotEnd, SlotState, StatusEffects,
};
use crate::error::SkillError;
use crate::outbox::Outbox;

/// Who initiated a start or stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Server-side game logic.
    Authority,
    /// An `Action` frame from a peer.
    Peer(PeerId),
    /// Automatic restart of a paused slot.
    Resume,
}

/// What a skill operation may touch.
pub struct SkillEnv<'a> {
    /// The authority world.
    pub world: &'a mut World,
    /// Queue for peer-bound signals.
    pub outbox: &'a mut Outbox,
    /// Current simulation time.
    pub now: f64,
}

/// Drives skill slots on the authority.
#[derive(Debug, Default)]
pub struct SkillEngine {
    registry: SkillRegistry,
}

impl SkillEngine {
    /// An engine with no skills registered.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a skill definition.
    pub fn register(&mut self, def: SkillDef) {
        self.registry.register(def);
    }

    /// The definitions known to this engine.
    #[must_use]
    pub fn registry(&self) -> &SkillRegistry {
        &self.registry
    }

    // ── Slot binding ────────────────────────────────────────────────────────

    /// Bind `skill` to a slot, or unbind it with `None`.
    ///
    /// Binding a slot that does not exist yet grows the slot list. A paused
    /// slot loses its pending resume.
    ///
    /// # Errors
    ///
    /// Returns [`SkillError::UnknownSkill`] for unregistered names,
    /// [`SkillError::SkillBusy`] if the slot is running,
    /// [`SkillError::NoSkillBound`] if the entity has no [`Skills`] component,
    /// or an ECS error if the entity is invalid.
    pub fn set_slot(
        &self,
        world: &mut World,
        entity: EntityId,
        slot: SlotIndex,
        skill: Option<&str>,
    ) -> Result<(), SkillError> {
        if let Some(name) = skill {
            if !self.registry.contains(name) {
                return Err(SkillError::UnknownSkill(name.to_string()));
            }
        }
        ensure_valid(world, entity)?;
        let skills = world
            .component_mut::<Skills>(entity)
            .ok_or(SkillError::NoSkillBound { entity, slot })?;
        let entry = skills.slot_or_grow(usize::from(slot));
        if !entry.state.is_idle() {
            return Err(SkillError::SkillBusy { entity, slot });
        }
        entry.skill = skill.map(str::to_string);
        entry.state = SlotState::Idle;
        debug!(%entity, slot, skill = ?skill, "slot bound");
        Ok(())
    }

    /// Current state of a slot.
    #[must_use]
    pub fn slot_state(
        &self,
        world: &World,
        entity: EntityId,
        slot: SlotIndex,
    ) -> Option<SlotState> {
        slot_ref(world, entity, slot).ok().map(|s| s.state)
    }

    /// Seconds until the slot's cooldown expires, never negative.
    ///
    /// # Errors
    ///
    /// Returns an ECS error for invalid entities and
    /// [`SkillError::NoSkillBound`] for slots that do not exist.
    pub fn cooldown_remaining(
        &self,
        world: &World,
        now: f64,
        entity: EntityId,
        slot: SlotIndex,
    ) -> Result<f64, SkillError> {
        Ok(slot_ref(world, entity, slot)?.cooldown_remaining(now))
    }

    // ── Transitions ─────────────────────────────────────────────────────────

    /// Start the skill bound to a slot.
    ///
    /// A start initiated by the authority on a peer-owned entity parks the
    /// slot in `Pending` and sends `SkillStart`; the start routine runs on
    /// [`confirm`](Self::confirm). A start requested by the owning peer, or
    /// on an entity without an owner, becomes `Active` immediately. Resumes
    /// skip the cooldown check.
    ///
    /// Returns the slot state after the call.
    ///
    /// # Errors
    ///
    /// [`SkillError::NoSkillBound`], [`SkillError::UnknownSkill`],
    /// [`SkillError::NotOwner`], [`SkillError::SkillBusy`],
    /// [`SkillError::OnCooldown`] or [`SkillError::Blocked`].
    pub fn start_skill(
        &self,
        env: &mut SkillEnv<'_>,
        entity: EntityId,
        slot: SlotIndex,
        origin: Origin,
    ) -> Result<SlotState, SkillError> {
        let (def, target, state) = self.resolve(env.world, entity, slot)?;
        if let Origin::Peer(peer) = origin {
            check_owner(&target, peer)?;
        }
        if !state.is_idle() {
            return Err(SkillError::SkillBusy { entity, slot });
        }
        if origin != Origin::Resume {
            let remaining = slot_ref(env.world, entity, slot)?.cooldown_remaining(env.now);
            if remaining > 0.0 {
                return Err(SkillError::OnCooldown { remaining });
            }
        }
        if let Some(effect) = active_effect(env.world, entity, def.stun_states()) {
            return Err(SkillError::Blocked { effect });
        }

        match target.owner {
            Some(peer) if !matches!(origin, Origin::Peer(_)) => {
                slot_mut(env.world, entity, slot)?.state = SlotState::Pending;
                env.outbox.push(peer, start_signal(&target));
                debug!(%entity, slot, skill = %target.skill, ?origin, "skill pending");
                Ok(SlotState::Pending)
            }
            owner => {
                if let Some(peer) = owner {
                    env.outbox.push(peer, start_signal(&target));
                }
                self.activate(env, &def, &target)
            }
        }
    }

    /// Handle a peer's `Confirm` for a pending slot.
    ///
    /// Returns `false` if the slot was no longer pending and the confirm was
    /// ignored, or if a stun-state arrived while pending and the slot was
    /// rejected instead of activated.
    ///
    /// # Errors
    ///
    /// [`SkillError::NotOwner`] if `peer` does not own the entity, or a
    /// resolution error if the slot has no skill.
    pub fn confirm(
        &self,
        env: &mut SkillEnv<'_>,
        entity: EntityId,
        slot: SlotIndex,
        peer: PeerId,
    ) -> Result<bool, SkillError> {
        let (def, target, state) = self.resolve(env.world, entity, slot)?;
        check_owner(&target, peer)?;
        if state != SlotState::Pending {
            trace!(%entity, slot, ?state, "confirm ignored");
            return Ok(false);
        }
        if let Some(effect) = active_effect(env.world, entity, def.stun_states()) {
            debug!(%entity, slot, skill = %target.skill, %effect, "stunned before confirm");
            reject_slot(env, &target)?;
            return Ok(false);
        }
        self.activate(env, &def, &target)?;
        Ok(true)
    }

    /// Stop a running skill normally.
    ///
    /// The owner receives `SkillStop`. The authority stop routine runs only
    /// if the slot was `Active`.
    ///
    /// # Errors
    ///
    /// [`SkillError::NotRunning`] if the slot is neither pending nor active,
    /// or [`SkillError::NotOwner`] for a peer that does not own the entity.
    pub fn stop_skill(
        &self,
        env: &mut SkillEnv<'_>,
        entity: EntityId,
        slot: SlotIndex,
        origin: Origin,
    ) -> Result<(), SkillError> {
        let (def, target, state) = self.resolve(env.world, entity, slot)?;
        if let Origin::Peer(peer) = origin {
            check_owner(&target, peer)?;
        }
        if !state.is_running() {
            return Err(SkillError::NotRunning { entity, slot });
        }

        if let Some(peer) = target.owner {
            env.outbox.push(peer, AuthorityMessage::SkillStop { entity, slot });
        }
        let entry = slot_mut(env.world, entity, slot)?;
        entry.state = SlotState::Idle;
        entry.last_end = Some(SlotEnd::Stopped);
        debug!(%entity, slot, skill = %target.skill, "skill stopped");

        if state == SlotState::Active {
            let commands = run_routine(env, &target, SkillPhase::Stop, false, def.stop_routine())?;
            self.apply_commands(env, &target, commands)?;
        }
        Ok(())
    }

    /// Force-cancel a slot.
    ///
    /// An `Active` slot runs its cancel and stop routines after the owner
    /// has been signalled; a pending or paused slot ends without running
    /// any routine. [`CancelKind::Pause`] leaves the slot `Paused`.
    ///
    /// # Errors
    ///
    /// [`SkillError::NotRunning`] if there is nothing to cancel.
    pub fn cancel_skill(
        &self,
        env: &mut SkillEnv<'_>,
        entity: EntityId,
        slot: SlotIndex,
        kind: CancelKind,
    ) -> Result<(), SkillError> {
        let (def, target, state) = self.resolve(env.world, entity, slot)?;
        match (state, kind) {
            (SlotState::Active, _) => self.cancel_active(env, &def, &target, kind),
            (SlotState::Pending | SlotState::Paused, CancelKind::Reject) => {
                reject_slot(env, &target)
            }
            _ => Err(SkillError::NotRunning { entity, slot }),
        }
    }

    /// End a pending, active or paused slot immediately as rejected,
    /// without running any routine.
    ///
    /// # Errors
    ///
    /// [`SkillError::NotRunning`] if the slot is idle.
    pub fn reject_skill(
        &self,
        env: &mut SkillEnv<'_>,
        entity: EntityId,
        slot: SlotIndex,
    ) -> Result<(), SkillError> {
        let (_, target, state) = self.resolve(env.world, entity, slot)?;
        match state {
            SlotState::Pending | SlotState::Active | SlotState::Paused => reject_slot(env, &target),
            _ => Err(SkillError::NotRunning { entity, slot }),
        }
    }

    // ── Gating ──────────────────────────────────────────────────────────────

    /// Apply stun and pause effects to every slot.
    ///
    /// Stun-states reject pending and active slots and drop pending resumes.
    /// Pause-states pause active slots. Paused slots whose pause-states have
    /// all cleared start again. Stun takes precedence over pause.
    pub fn gate(&self, env: &mut SkillEnv<'_>) {
        let Some(skills_ty) = env.world.type_of::<Skills>() else {
            return;
        };
        for entity in env.world.query(&QueryDescriptor::new().with(skills_ty)) {
            let slots: Vec<(SlotIndex, SlotState, String)> = env
                .world
                .component::<Skills>(entity)
                .map(|skills| {
                    skills
                        .slots
                        .iter()
                        .enumerate()
                        .filter_map(|(index, slot)| {
                            let index = SlotIndex::try_from(index).ok()?;
                            Some((index, slot.state, slot.skill.clone()?))
                        })
                        .collect()
                })
                .unwrap_or_default();

            for (slot, state, skill) in slots {
                let Some(def) = self.registry.get(&skill) else {
                    continue;
                };
                let stun = active_effect(env.world, entity, def.stun_states());
                let pause = active_effect(env.world, entity, def.pause_states());
                let result = match (state, stun, pause) {
                    (
                        SlotState::Pending | SlotState::Active | SlotState::Paused,
                        Some(effect),
                        _,
                    ) => {
                        debug!(%entity, slot, %skill, %effect, "stunned");
                        self.cancel_skill(env, entity, slot, CancelKind::Reject)
                    }
                    (SlotState::Active, None, Some(effect)) => {
                        debug!(%entity, slot, %skill, %effect, "paused");
                        self.cancel_skill(env, entity, slot, CancelKind::Pause)
                    }
                    (SlotState::Paused, None, None) => {
                        debug!(%entity, slot, %skill, "resuming");
                        self.start_skill(env, entity, slot, Origin::Resume).map(|_| ())
                    }
                    _ => Ok(()),
                };
                if let Err(err) = result {
                    warn!(%entity, slot, %skill, %err, "gating failed");
                }
            }
        }
    }

    // ── Internals ───────────────────────────────────────────────────────────

    fn resolve(
        &self,
        world: &World,
        entity: EntityId,
        slot: SlotIndex,
    ) -> Result<(Arc<SkillDef>, SlotTarget, SlotState), SkillError> {
        let entry = slot_ref(world, entity, slot)?;
        let skill = entry
            .skill
            .clone()
            .ok_or(SkillError::NoSkillBound { entity, slot })?;
        let def = self
            .registry
            .get(&skill)
            .ok_or_else(|| SkillError::UnknownSkill(skill.clone()))?;
        let target = SlotTarget {
            entity,
            slot,
            skill,
            owner: world.component::<PeerOwner>(entity).map(|owner| owner.0),
        };
        Ok((def, target, entry.state))
    }

    fn activate(
        &self,
        env: &mut SkillEnv<'_>,
        def: &SkillDef,
        target: &SlotTarget,
    ) -> Result<SlotState, SkillError> {
        slot_mut(env.world, target.entity, target.slot)?.state = SlotState::Active;
        debug!(entity = %target.entity, slot = target.slot, skill = %target.skill, "skill active");
        let commands = run_routine(env, target, SkillPhase::Start, false, def.start_routine())?;
        self.apply_commands(env, target, commands)?;
        Ok(slot_ref(env.world, target.entity, target.slot)?.state)
    }

    fn cancel_active(
        &self,
        env: &mut SkillEnv<'_>,
        def: &SkillDef,
        target: &SlotTarget,
        kind: CancelKind,
    ) -> Result<(), SkillError> {
        let paused = kind == CancelKind::Pause;
        slot_mut(env.world, target.entity, target.slot)?.state = SlotState::Cancelling(kind);
        if let Some(peer) = target.owner {
            let (entity, slot) = (target.entity, target.slot);
            let signal = if paused {
                AuthorityMessage::SkillPause { entity, slot }
            } else {
                AuthorityMessage::SkillReject { entity, slot }
            };
            env.outbox.push(peer, signal);
        }

        if def.is_cancel_parallel() {
            let cancel = def.cancel_routine();
            let mut commands = run_routine(env, target, SkillPhase::Cancel, paused, cancel)?;
            let stop = def.stop_routine();
            commands.extend(run_routine(env, target, SkillPhase::Stop, paused, stop)?);
            self.apply_commands(env, target, commands)?;
        } else {
            let cancel = def.cancel_routine();
            let commands = run_routine(env, target, SkillPhase::Cancel, paused, cancel)?;
            self.apply_commands(env, target, commands)?;
            let commands = run_routine(env, target, SkillPhase::Stop, paused, def.stop_routine())?;
            self.apply_commands(env, target, commands)?;
        }

        let entry = slot_mut(env.world, target.entity, target.slot)?;
        if paused {
            entry.state = SlotState::Paused;
        } else {
            entry.state = SlotState::Idle;
            entry.last_end = Some(SlotEnd::Rejected);
        }
        debug!(
            entity = %target.entity,
            slot = target.slot,
            skill = %target.skill,
            ?kind,
            "skill cancelled"
        );
        Ok(())
    }

    fn apply_commands(
        &self,
        env: &mut SkillEnv<'_>,
        target: &SlotTarget,
        commands: Vec<SkillCommand>,
    ) -> Result<(), SkillError> {
        let (entity, slot) = (target.entity, target.slot);
        for command in commands {
            match command {
                SkillCommand::SetCooldown(seconds) => {
                    slot_mut(env.world, entity, slot)?.cooldown_expiry = env.now + seconds;
                }
                SkillCommand::IncrementCooldown(seconds) => {
                    let entry = slot_mut(env.world, entity, slot)?;
                    entry.cooldown_expiry = entry.cooldown_expiry.max(env.now) + seconds;
                }
                SkillCommand::SendMessage { name, payload } => {
                    let running = slot_ref(env.world, entity, slot)?.state.is_running();
                    match target.owner {
                        Some(peer) if running => env.outbox.push(
                            peer,
                            AuthorityMessage::SkillMessage {
                                entity,
                                slot,
                                name,
                                payload,
                            },
                        ),
                        _ => trace!(%entity, slot, %name, "skill message dropped"),
                    }
                }
                SkillCommand::Reject => {
                    if slot_ref(env.world, entity, slot)?.state.is_running() {
                        reject_slot(env, target)?;
                    }
                }
            }
        }
        Ok(())
    }
}

fn ensure_valid(world: &World, entity: EntityId) -> Result<(), SkillError> {
    if world.is_valid(entity) {
        Ok(())
    } else {
        Err(EcsError::InvalidEntity(entity).into())
    }
}

fn slot_ref(world: &World, entity: EntityId, slot: SlotIndex) -> Result<&SkillSlot, SkillError> {
    ensure_valid(world, entity)?;
    world
        .component::<Skills>(entity)
        .and_then(|skills| skills.slot(usize::from(slot)))
        .ok_or(SkillError::NoSkillBound { entity, slot })
}

fn slot_mut(
    world: &mut World,
    entity: EntityId,
    slot: SlotIndex,
) -> Result<&mut SkillSlot, SkillError> {
    ensure_valid(world, entity)?;
    world
        .component_mut::<Skills>(entity)
        .and_then(|skills| skills.slot_mut(usize::from(slot)))
        .ok_or(SkillError::NoSkillBound { entity, slot })
}

fn check_owner(target: &SlotTarget, peer: PeerId) -> Result<(), SkillError> {
    if target.owner == Some(peer) {
        Ok(())
    } else {
        Err(SkillError::NotOwner {
            entity: target.entity,
            peer,
        })
    }
}

fn active_effect(world: &World, entity: EntityId, names: &[String]) -> Option<String> {
    world
        .component::<StatusEffects>(entity)?
        .first_active(names)
        .map(str::to_string)
}

fn start_signal(target: &SlotTarget) -> AuthorityMessage {
    AuthorityMessage::SkillStart {
        entity: target.entity,
        slot: target.slot,
        skill: target.skill.clone(),
    }
}

fn reject_slot(env: &mut SkillEnv<'_>, target: &SlotTarget) -> Result<(), SkillError> {
    let entry = slot_mut(env.world, target.entity, target.slot)?;
    entry.state = SlotState::Idle;
    entry.last_end = Some(SlotEnd::Rejected);
    if let Some(peer) = target.owner {
        env.outbox.push(
            peer,
            AuthorityMessage::SkillReject {
                entity: target.entity,
                slot: target.slot,
            },
        );
    }
    debug!(entity = %target.entity, slot = target.slot, skill = %target.skill, "skill rejected");
    Ok(())
}

fn run_routine(
    env: &mut SkillEnv<'_>,
    target: &SlotTarget,
    phase: SkillPhase,
    paused: bool,
    routine: Option<&AuthorityRoutine>,
) -> Result<Vec<SkillCommand>, SkillError> {
    let Some(routine) = routine else {
        return Ok(Vec::new());
    };
    let expiry = slot_ref(env.world, target.entity, target.slot)?.cooldown_expiry;
    let mut ctx = SkillContext::new(env.world, target, phase, paused, env.now, expiry);
    routine(&mut ctx);
    Ok(ctx.into_commands())
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::components::{StatusEffectInstance, register_builtin, PERMANENT};

    const OWNER: PeerId = PeerId(7);

    struct Fixture {
        world: World,
        outbox: Outbox,
        engine: SkillEngine,
        now: f64,
    }

    impl Fixture {
        fn new(defs: Vec<SkillDef>) -> Self {
            let mut world = World::new();
            register_builtin(&mut world).unwrap();
            let mut engine = SkillEngine::new();
            for def in defs {
                engine.register(def);
            }
            Self {
                world,
                outbox: Outbox::default(),
                engine,
                now: 0.0,
            }
        }

        fn character(&mut self, owner: Option<PeerId>, skill: &str) -> EntityId {
            let entity = self.world.spawn_empty();
            self.world.insert(entity, Skills::with_slots(1)).unwrap();
            self.world.insert(entity, StatusEffects::default()).unwrap();
            if let Some(peer) = owner {
                self.world.insert(entity, PeerOwner(peer)).unwrap();
            }
            self.engine
                .set_slot(&mut self.world, entity, 0, Some(skill))
                .unwrap();
            entity
        }

        fn env(&mut self) -> (SkillEnv<'_>, &SkillEngine) {
            (
                SkillEnv {
                    world: &mut self.world,
                    outbox: &mut self.outbox,
                    now: self.now,
                },
                &self.engine,
            )
        }

        fn start(&mut self, entity: EntityId, origin: Origin) -> Result<SlotState, SkillError> {
            let (mut env, engine) = self.env();
            engine.start_skill(&mut env, entity, 0, origin)
        }

        fn state(&self, entity: EntityId) -> Option<SlotState> {
            self.engine.slot_state(&self.world, entity, 0)
        }

        fn effect(&mut self, entity: EntityId, name: &str) {
            self.world
                .component_mut::<StatusEffects>(entity)
                .unwrap()
                .effects
                .insert(name.into(), StatusEffectInstance::new(PERMANENT, serde_json::Value::Null));
        }

        fn clear_effect(&mut self, entity: EntityId, name: &str) {
            self.world
                .component_mut::<StatusEffects>(entity)
                .unwrap()
                .effects
                .remove(name);
        }

        fn gate(&mut self) {
            let (mut env, engine) = self.env();
            engine.gate(&mut env);
        }
    }

    type Routine = Box<dyn Fn(&mut SkillContext<'_>) + Send + Sync>;

    fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&str) -> Routine) {
        let log = Arc::new(Mutex::new(Vec::new()));
        let handle = log.clone();
        let make = move |label: &str| {
            let log = handle.clone();
            let label = label.to_string();
            Box::new(move |ctx: &mut SkillContext<'_>| {
                log.lock().unwrap().push(format!("{label}:{}", ctx.is_paused()));
            }) as Routine
        };
        (log, make)
    }

    fn logged_def(name: &str) -> (Arc<Mutex<Vec<String>>>, SkillDef) {
        let (log, make) = recorder();
        let start = make("start");
        let stop = make("stop");
        let cancel = make("cancel");
        let def = SkillDef::new(name)
            .stunned_by("Stun")
            .paused_by("Frozen")
            .on_start(move |ctx| start(ctx))
            .on_stop(move |ctx| stop(ctx))
            .on_cancel(move |ctx| cancel(ctx));
        (log, def)
    }

    #[test]
    fn test_set_slot_rejects_unknown_skill() {
        let mut fx = Fixture::new(vec![SkillDef::new("Dash")]);
        let entity = fx.character(None, "Dash");
        assert!(matches!(
            fx.engine.set_slot(&mut fx.world, entity, 0, Some("Blink")),
            Err(SkillError::UnknownSkill(_))
        ));
    }

    #[test]
    fn test_npc_start_is_immediately_active() {
        let (log, def) = logged_def("Slash");
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(None, "Slash");

        assert_eq!(fx.start(entity, Origin::Authority).unwrap(), SlotState::Active);
        assert_eq!(*log.lock().unwrap(), vec!["start:false"]);
        assert!(fx.outbox.is_empty());
    }

    #[test]
    fn test_authority_start_waits_for_confirm() {
        let (log, def) = logged_def("Slash");
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(Some(OWNER), "Slash");

        assert_eq!(fx.start(entity, Origin::Authority).unwrap(), SlotState::Pending);
        assert!(log.lock().unwrap().is_empty());
        assert!(matches!(
            fx.outbox.pending(),
            [(OWNER, AuthorityMessage::SkillStart { skill, .. })] if skill == "Slash"
        ));

        let (mut env, engine) = fx.env();
        assert!(matches!(
            engine.confirm(&mut env, entity, 0, PeerId(99)),
            Err(SkillError::NotOwner { .. })
        ));
        assert!(engine.confirm(&mut env, entity, 0, OWNER).unwrap());
        assert!(!engine.confirm(&mut env, entity, 0, OWNER).unwrap());
        assert_eq!(fx.state(entity), Some(SlotState::Active));
        assert_eq!(*log.lock().unwrap(), vec!["start:false"]);
    }

    #[test]
    fn test_confirm_after_stun_rejects() {
        let starts = Arc::new(Mutex::new(0));
        let counter = starts.clone();
        let def = SkillDef::new("Slash").stunned_by("Stun").on_start(move |ctx| {
            *counter.lock().unwrap() += 1;
            ctx.set_cooldown(5.0);
        });
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(Some(OWNER), "Slash");

        assert_eq!(fx.start(entity, Origin::Authority).unwrap(), SlotState::Pending);
        fx.outbox.drain();
        fx.effect(entity, "Stun");

        let (mut env, engine) = fx.env();
        assert!(!engine.confirm(&mut env, entity, 0, OWNER).unwrap());
        assert_eq!(fx.state(entity), Some(SlotState::Idle));
        assert_eq!(*starts.lock().unwrap(), 0);
        assert_eq!(fx.engine.cooldown_remaining(&fx.world, 0.0, entity, 0).unwrap(), 0.0);
        assert!(matches!(
            fx.outbox.pending(),
            [(OWNER, AuthorityMessage::SkillReject { .. })]
        ));
    }

    #[test]
    fn test_peer_start_requires_ownership() {
        let mut fx = Fixture::new(vec![SkillDef::new("Dash")]);
        let entity = fx.character(Some(OWNER), "Dash");
        assert!(matches!(
            fx.start(entity, Origin::Peer(PeerId(1))),
            Err(SkillError::NotOwner { .. })
        ));
        assert_eq!(fx.start(entity, Origin::Peer(OWNER)).unwrap(), SlotState::Active);
        assert_eq!(fx.outbox.len(), 1);
    }

    #[test]
    fn test_busy_and_unbound_slots() {
        let mut fx = Fixture::new(vec![SkillDef::new("Dash")]);
        let entity = fx.character(None, "Dash");
        fx.start(entity, Origin::Authority).unwrap();
        assert!(matches!(
            fx.start(entity, Origin::Authority),
            Err(SkillError::SkillBusy { .. })
        ));
        assert!(matches!(
            fx.engine.set_slot(&mut fx.world, entity, 0, None),
            Err(SkillError::SkillBusy { .. })
        ));

        let (mut env, engine) = fx.env();
        assert!(matches!(
            engine.start_skill(&mut env, entity, 4, Origin::Authority),
            Err(SkillError::NoSkillBound { .. })
        ));
    }

    #[test]
    fn test_cooldown_blocks_restart() {
        let def = SkillDef::new("Bolt").on_start(|ctx| ctx.set_cooldown(3.0));
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(None, "Bolt");

        fx.start(entity, Origin::Authority).unwrap();
        {
            let (mut env, engine) = fx.env();
            engine.stop_skill(&mut env, entity, 0, Origin::Authority).unwrap();
        }
        fx.now = 1.0;
        assert!(matches!(
            fx.start(entity, Origin::Authority),
            Err(SkillError::OnCooldown { remaining }) if (remaining - 2.0).abs() < 1e-9
        ));
        fx.now = 3.0;
        assert_eq!(fx.start(entity, Origin::Authority).unwrap(), SlotState::Active);
    }

    #[test]
    fn test_increment_cooldown_from_expired() {
        let def = SkillDef::new("Bolt").on_start(|ctx| {
            ctx.increment_cooldown(1.0);
            ctx.increment_cooldown(1.0);
        });
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(None, "Bolt");
        fx.now = 10.0;
        fx.start(entity, Origin::Authority).unwrap();
        let remaining = fx.engine.cooldown_remaining(&fx.world, 10.0, entity, 0).unwrap();
        assert!((remaining - 2.0).abs() < 1e-9);
    }

    #[test]
    fn test_stun_blocks_start() {
        let (_, def) = logged_def("Slash");
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(None, "Slash");
        fx.effect(entity, "Stun");
        assert!(matches!(
            fx.start(entity, Origin::Authority),
            Err(SkillError::Blocked { effect }) if effect == "Stun"
        ));
    }

    #[test]
    fn test_stop_sends_signal_and_runs_stop_routine() {
        let (log, def) = logged_def("Slash");
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(Some(OWNER), "Slash");
        fx.start(entity, Origin::Peer(OWNER)).unwrap();
        fx.outbox.drain();

        let (mut env, engine) = fx.env();
        engine.stop_skill(&mut env, entity, 0, Origin::Peer(OWNER)).unwrap();
        assert!(matches!(
            engine.stop_skill(&mut env, entity, 0, Origin::Authority),
            Err(SkillError::NotRunning { .. })
        ));
        assert!(matches!(fx.outbox.pending(), [(OWNER, AuthorityMessage::SkillStop { .. })]));
        assert_eq!(*log.lock().unwrap(), vec!["start:false", "stop:false"]);
    }

    #[test]
    fn test_reject_while_pending_sends_single_reject() {
        let (log, def) = logged_def("Slash");
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(Some(OWNER), "Slash");
        fx.start(entity, Origin::Authority).unwrap();
        fx.outbox.drain();

        let (mut env, engine) = fx.env();
        engine.reject_skill(&mut env, entity, 0).unwrap();
        assert!(matches!(fx.outbox.pending(), [(OWNER, AuthorityMessage::SkillReject { .. })]));
        assert_eq!(fx.state(entity), Some(SlotState::Idle));
        assert!(log.lock().unwrap().is_empty());

        let skills = fx.world.component::<Skills>(entity).unwrap();
        assert_eq!(skills.slots[0].last_end, Some(SlotEnd::Rejected));
    }

    #[test]
    fn test_routine_reject_ends_slot() {
        let def = SkillDef::new("Fizzle").on_start(|ctx| ctx.reject());
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(Some(OWNER), "Fizzle");
        assert_eq!(fx.start(entity, Origin::Peer(OWNER)).unwrap(), SlotState::Idle);
        assert!(matches!(
            fx.outbox.pending(),
            [
                (OWNER, AuthorityMessage::SkillStart { .. }),
                (OWNER, AuthorityMessage::SkillReject { .. })
            ]
        ));
    }

    #[test]
    fn test_messages_follow_start_signal() {
        let def = SkillDef::new("Combo").on_start(|ctx| {
            ctx.send_message("hit", &1u8).unwrap();
            ctx.send_message("hit", &2u8).unwrap();
        });
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(Some(OWNER), "Combo");
        fx.start(entity, Origin::Peer(OWNER)).unwrap();

        let kinds: Vec<_> = fx
            .outbox
            .pending()
            .iter()
            .map(|(_, message)| match message {
                AuthorityMessage::SkillStart { .. } => "start",
                AuthorityMessage::SkillMessage { .. } => "message",
                _ => "other",
            })
            .collect();
        assert_eq!(kinds, vec!["start", "message", "message"]);
    }

    #[test]
    fn test_gate_stun_cancels_active_slot() {
        let (log, def) = logged_def("Slash");
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(Some(OWNER), "Slash");
        fx.start(entity, Origin::Peer(OWNER)).unwrap();
        fx.outbox.drain();

        fx.effect(entity, "Stun");
        fx.gate();
        assert_eq!(fx.state(entity), Some(SlotState::Idle));
        assert!(matches!(fx.outbox.pending(), [(OWNER, AuthorityMessage::SkillReject { .. })]));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:false", "cancel:false", "stop:false"]
        );
    }

    #[test]
    fn test_gate_pause_then_resume() {
        let (log, def) = logged_def("Channel");
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(Some(OWNER), "Channel");
        fx.start(entity, Origin::Peer(OWNER)).unwrap();
        fx.outbox.drain();

        fx.effect(entity, "Frozen");
        fx.gate();
        assert_eq!(fx.state(entity), Some(SlotState::Paused));
        assert!(matches!(
            fx.outbox.drain().as_slice(),
            [(OWNER, AuthorityMessage::SkillPause { .. })]
        ));

        fx.gate();
        assert_eq!(fx.state(entity), Some(SlotState::Paused));
        assert!(fx.outbox.is_empty());

        fx.clear_effect(entity, "Frozen");
        fx.gate();
        assert_eq!(fx.state(entity), Some(SlotState::Pending));
        assert!(matches!(fx.outbox.pending(), [(OWNER, AuthorityMessage::SkillStart { .. })]));
        assert_eq!(
            *log.lock().unwrap(),
            vec!["start:false", "cancel:true", "stop:true"]
        );
    }

    #[test]
    fn test_stun_overrides_pause() {
        let (_, def) = logged_def("Channel");
        let mut fx = Fixture::new(vec![def]);
        let entity = fx.character(Some(OWNER), "Channel");
        fx.start(entity, Origin::Peer(OWNER)).unwrap();
        fx.effect(entity, "Frozen");
        fx.gate();
        fx.outbox.drain();

        fx.effect(entity, "Stun");
        fx.clear_effect(entity, "Frozen");
        fx.gate();
        assert_eq!(fx.state(entity), Some(SlotState::Idle));
        assert!(matches!(fx.outbox.pending(), [(OWNER, AuthorityMessage::SkillReject { .. })]));
    }

    #[test]
    fn test_sequential_cancel_sees_cancel_cooldown() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let make = |parallel: bool| {
            let seen = seen.clone();
            SkillDef::new(if parallel { "Par" } else { "Seq" })
                .stunned_by("Stun")
                .cancel_parallel(parallel)
                .on_cancel(|ctx| ctx.set_cooldown(5.0))
                .on_stop(move |ctx| seen.lock().unwrap().push(ctx.cooldown_remaining()))
        };
        let mut fx = Fixture::new(vec![make(true), make(false)]);
        let par = fx.character(None, "Par");
        let seq = fx.character(None, "Seq");
        fx.start(par, Origin::Authority).unwrap();
        fx.start(seq, Origin::Authority).unwrap();

        fx.effect(par, "Stun");
        fx.effect(seq, "Stun");
        fx.gate();
        assert_eq!(*seen.lock().unwrap(), vec![0.0, 5.0]);
    }
}

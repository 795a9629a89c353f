//! Execution context handed to authority skill routines.
//!
//! Routines run synchronously inside the step that triggers them. They read
//! and mutate the world directly; slot-level effects (cooldowns, messages to
//! the peer, rejection) are recorded as [`SkillCommand`]s and applied by the
//! engine once the routine returns.

use combat_ecs::{EntityId, World};
use combat_net::{PeerId, SlotIndex};
use serde::Serialize;

use crate::error::SkillError;

/// Which routine a context was built for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkillPhase {
    /// `on_start`.
    Start,
    /// `on_stop`, either after a normal stop or as part of a cancel.
    Stop,
    /// `on_cancel`.
    Cancel,
}

/// A slot-level effect requested by a routine.
#[derive(Debug, Clone, PartialEq)]
pub enum SkillCommand {
    /// Cooldown expires `seconds` from now.
    SetCooldown(f64),
    /// Extend the cooldown by `seconds`, counting from now if already expired.
    IncrementCooldown(f64),
    /// Deliver a named message to the owning peer's awaits.
    SendMessage {
        /// Message name.
        name: String,
        /// MessagePack-encoded payload.
        payload: Vec<u8>,
    },
    /// Reject the running skill.
    Reject,
}

/// The `(entity, slot)` a routine runs for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotTarget {
    /// The entity owning the slot.
    pub entity: EntityId,
    /// The slot.
    pub slot: SlotIndex,
    /// The bound skill name.
    pub skill: String,
    /// The controlling peer, if any.
    pub owner: Option<PeerId>,
}

/// Context for one routine invocation.
pub struct SkillContext<'w> {
    world: &'w mut World,
    target: &'w SlotTarget,
    phase: SkillPhase,
    paused: bool,
    now: f64,
    cooldown_expiry: f64,
    commands: Vec<SkillCommand>,
}

impl<'w> SkillContext<'w> {
    pub(crate) fn new(
        world: &'w mut World,
        target: &'w SlotTarget,
        phase: SkillPhase,
        paused: bool,
        now: f64,
        cooldown_expiry: f64,
    ) -> Self {
        Self {
            world,
            target,
            phase,
            paused,
            now,
            cooldown_expiry,
            commands: Vec::new(),
        }
    }

    /// The entity the skill runs on.
    #[must_use]
    pub fn entity(&self) -> EntityId {
        self.target.entity
    }

    /// The slot the skill is bound to.
    #[must_use]
    pub fn slot(&self) -> SlotIndex {
        self.target.slot
    }

    /// The bound skill name.
    #[must_use]
    pub fn skill(&self) -> &str {
        &self.target.skill
    }

    /// The controlling peer, if any.
    #[must_use]
    pub fn owner(&self) -> Option<PeerId> {
        self.target.owner
    }

    /// Which routine is running.
    #[must_use]
    pub fn phase(&self) -> SkillPhase {
        self.phase
    }

    /// `true` if this cancel or stop is caused by a pause-state.
    #[must_use]
    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Current simulation time.
    #[must_use]
    pub fn now(&self) -> f64 {
        self.now
    }

    /// Read access to the world.
    #[must_use]
    pub fn world(&self) -> &World {
        &*self.world
    }

    /// Write access to the world.
    pub fn world_mut(&mut self) -> &mut World {
        &mut *self.world
    }

    /// Set the cooldown to expire `seconds` from now.
    pub fn set_cooldown(&mut self, seconds: f64) {
        self.cooldown_expiry = self.now + seconds;
        self.commands.push(SkillCommand::SetCooldown(seconds));
    }

    /// Extend the cooldown by `seconds`.
    pub fn increment_cooldown(&mut self, seconds: f64) {
        self.cooldown_expiry = self.cooldown_expiry.max(self.now) + seconds;
        self.commands.push(SkillCommand::IncrementCooldown(seconds));
    }

    /// Cooldown left, including changes made earlier in this routine.
    #[must_use]
    pub fn cooldown_remaining(&self) -> f64 {
        (self.cooldown_expiry - self.now).max(0.0)
    }

    /// Send a named message to the peer's awaits on this slot.
    ///
    /// Dropped if the entity has no owning peer.
    ///
    /// # Errors
    ///
    /// Returns [`SkillError::Net`] if the payload cannot be encoded.
    pub fn send_message<T: Serialize>(
        &mut self,
        name: &str,
        payload: &T,
    ) -> Result<(), SkillError> {
        let payload = combat_net::encode_payload(payload)?;
        self.send_raw(name, payload);
        Ok(())
    }

    /// Send a pre-encoded message.
    pub fn send_raw(&mut self, name: &str, payload: Vec<u8>) {
        self.commands.push(SkillCommand::SendMessage {
            name: name.to_string(),
            payload,
        });
    }

    /// Reject the running skill once this routine returns.
    pub fn reject(&mut self) {
        self.commands.push(SkillCommand::Reject);
    }

    /// Returns `true` if this routine has called [`reject`](Self::reject).
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.commands.contains(&SkillCommand::Reject)
    }

    pub(crate) fn into_commands(self) -> Vec<SkillCommand> {
        self.commands
    }
}

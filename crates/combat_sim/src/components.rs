//! Built-in components carried by combat characters.
//!
//! [`Skills`] holds the per-slot skill state the authority drives,
//! [`StatusEffects`] the active effect instances, and [`PeerOwner`] /
//! [`Character`] tie an entity to the peer that controls it and to the
//! game-level character handle. All four are replicated so peers can render
//! cooldowns and effects and resolve their own characters.

use std::collections::BTreeMap;

use combat_ecs::{Component, ComponentTypeId, EcsError, World};
use combat_net::PeerId;
use serde::{Deserialize, Serialize};

/// Effect duration meaning "never expires".
pub const PERMANENT: f64 = -1.0;

// ── Skills ──────────────────────────────────────────────────────────────────

/// Why a slot is being cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CancelKind {
    /// Stun-state or programmatic cancel; the slot ends.
    Reject,
    /// Pause-state; the slot resumes once the pause clears.
    Pause,
}

/// Lifecycle state of a skill slot.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotState {
    /// Nothing running.
    #[default]
    Idle,
    /// Waiting for the owning peer to confirm an authority-initiated start.
    Pending,
    /// Start routine has run; the skill is live.
    Active,
    /// Cancel and stop routines are running.
    Cancelling(CancelKind),
    /// Idle with a resume scheduled for when the pause-state clears.
    Paused,
}

impl SlotState {
    /// `Idle` and `Paused` both accept a new start.
    #[must_use]
    pub fn is_idle(self) -> bool {
        matches!(self, Self::Idle | Self::Paused)
    }

    /// `Pending` or `Active`.
    #[must_use]
    pub fn is_running(self) -> bool {
        matches!(self, Self::Pending | Self::Active)
    }
}

/// How the last run of a slot ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SlotEnd {
    /// Stopped normally.
    Stopped,
    /// Rejected by a stun-state, a routine or the caller.
    Rejected,
}

/// One skill slot.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SkillSlot {
    /// Registered name of the bound skill definition.
    pub skill: Option<String>,
    /// Absolute simulation time the cooldown expires at.
    pub cooldown_expiry: f64,
    /// Current lifecycle state.
    pub state: SlotState,
    /// Outcome of the most recent run.
    pub last_end: Option<SlotEnd>,
}

impl SkillSlot {
    /// Seconds of cooldown left at `now`, never negative.
    #[must_use]
    pub fn cooldown_remaining(&self, now: f64) -> f64 {
        (self.cooldown_expiry - now).max(0.0)
    }
}

/// Skill slots of an entity, addressed by [`SlotIndex`](combat_net::SlotIndex).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Skills {
    /// Slots in index order.
    pub slots: Vec<SkillSlot>,
}

impl Skills {
    /// `count` empty slots.
    #[must_use]
    pub fn with_slots(count: usize) -> Self {
        Self {
            slots: vec![SkillSlot::default(); count],
        }
    }

    /// Borrow a slot.
    #[must_use]
    pub fn slot(&self, index: usize) -> Option<&SkillSlot> {
        self.slots.get(index)
    }

    /// Mutably borrow a slot.
    #[must_use]
    pub fn slot_mut(&mut self, index: usize) -> Option<&mut SkillSlot> {
        self.slots.get_mut(index)
    }

    /// Mutably borrow a slot, growing the slot list as needed.
    pub fn slot_or_grow(&mut self, index: usize) -> &mut SkillSlot {
        if self.slots.len() <= index {
            self.slots.resize_with(index + 1, SkillSlot::default);
        }
        &mut self.slots[index]
    }
}

impl Component for Skills {
    fn type_name() -> &'static str {
        "Skills"
    }

    fn descriptor() -> combat_ecs::ComponentDescriptor {
        combat_ecs::ComponentDescriptor::of::<Self>().replicated()
    }
}

// ── Status effects ──────────────────────────────────────────────────────────

/// One active status effect on an entity.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusEffectInstance {
    /// Seconds left; negative means permanent.
    pub remaining: f64,
    /// Stack count, starting at 1.
    pub stacks: u32,
    /// Effect-specific data.
    pub data: serde_json::Value,
}

impl StatusEffectInstance {
    /// A single stack lasting `duration` seconds.
    #[must_use]
    pub fn new(duration: f64, data: serde_json::Value) -> Self {
        Self {
            remaining: duration,
            stacks: 1,
            data,
        }
    }

    /// Returns `true` if the instance never expires.
    #[must_use]
    pub fn is_permanent(&self) -> bool {
        self.remaining < 0.0
    }
}

/// Active status effects keyed by effect name. At most one instance per name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StatusEffects {
    /// Instances in name order.
    pub effects: BTreeMap<String, StatusEffectInstance>,
}

impl StatusEffects {
    /// Returns `true` if an instance named `name` is active.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.effects.contains_key(name)
    }

    /// The first of `names` that is active.
    #[must_use]
    pub fn first_active<'a>(&self, names: &'a [String]) -> Option<&'a str> {
        names
            .iter()
            .find(|name| self.contains(name))
            .map(String::as_str)
    }
}

impl Component for StatusEffects {
    fn type_name() -> &'static str {
        "StatusEffects"
    }

    fn descriptor() -> combat_ecs::ComponentDescriptor {
        combat_ecs::ComponentDescriptor::of::<Self>().replicated()
    }
}

// ── Ownership ───────────────────────────────────────────────────────────────

/// The peer that controls an entity's skills.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerOwner(pub PeerId);

impl Component for PeerOwner {
    fn type_name() -> &'static str {
        "PeerOwner"
    }

    fn descriptor() -> combat_ecs::ComponentDescriptor {
        combat_ecs::ComponentDescriptor::of::<Self>().replicated()
    }
}

/// External character handle the rest of the game refers to this entity by.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Character(pub u64);

impl Component for Character {
    fn type_name() -> &'static str {
        "Character"
    }

    fn descriptor() -> combat_ecs::ComponentDescriptor {
        combat_ecs::ComponentDescriptor::of::<Self>().replicated()
    }
}

/// Handles of the built-in component kinds in one world.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BuiltinTypes {
    /// [`Skills`].
    pub skills: ComponentTypeId,
    /// [`StatusEffects`].
    pub status_effects: ComponentTypeId,
    /// [`PeerOwner`].
    pub peer_owner: ComponentTypeId,
    /// [`Character`].
    pub character: ComponentTypeId,
}

/// Register the built-in components with `world`.
///
/// # Errors
///
/// Returns [`EcsError::InvalidComponentOptions`] if any of the names is
/// already taken.
pub fn register_builtin(world: &mut World) -> Result<BuiltinTypes, EcsError> {
    Ok(BuiltinTypes {
        skills: world.register::<Skills>()?,
        status_effects: world.register::<StatusEffects>()?,
        peer_owner: world.register::<PeerOwner>()?,
        character: world.register::<Character>()?,
    })
}

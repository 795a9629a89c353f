//! Error types for skill and status-effect operations.

use combat_ecs::{EcsError, EntityId};
use combat_net::{NetError, PeerId, SlotIndex};

/// Errors returned by the skill and status-effect engines.
///
/// Every variant is a local, recoverable condition reported to the caller.
#[derive(Debug, thiserror::Error)]
pub enum SkillError {
    /// An entity or component operation failed.
    #[error(transparent)]
    Ecs(#[from] EcsError),

    /// The slot has no skill definition bound.
    #[error("{entity} slot {slot} has no skill bound")]
    NoSkillBound {
        /// The entity.
        entity: EntityId,
        /// The slot.
        slot: SlotIndex,
    },

    /// The slot's cooldown has not expired yet.
    #[error("skill on cooldown for {remaining:.3}s")]
    OnCooldown {
        /// Seconds until the cooldown expires.
        remaining: f64,
    },

    /// A stun-state effect blocks the skill.
    #[error("skill blocked by status effect '{effect}'")]
    Blocked {
        /// The blocking status effect.
        effect: String,
    },

    /// The slot is not idle.
    #[error("{entity} slot {slot} is busy")]
    SkillBusy {
        /// The entity.
        entity: EntityId,
        /// The slot.
        slot: SlotIndex,
    },

    /// Stop, cancel or reject on a slot that is not running.
    #[error("{entity} slot {slot} is not running")]
    NotRunning {
        /// The entity.
        entity: EntityId,
        /// The slot.
        slot: SlotIndex,
    },

    /// A peer acted on an entity it does not own.
    #[error("peer {peer} does not own {entity}")]
    NotOwner {
        /// The entity.
        entity: EntityId,
        /// The offending peer.
        peer: PeerId,
    },

    /// No skill definition is registered under this name.
    #[error("unknown skill '{0}'")]
    UnknownSkill(String),

    /// A skill message payload could not be encoded.
    #[error(transparent)]
    Net(#[from] NetError),
}

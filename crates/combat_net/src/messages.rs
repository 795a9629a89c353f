//! Messages exchanged between the authority and its peers.
//!
//! Every skill message is addressed to one `(entity, slot)` pair. The
//! transport keeps messages of one pair in send order; nothing is promised
//! across pairs. Replication traffic rides the same authority→peer channel.

use combat_ecs::EntityId;
use serde::{Deserialize, Serialize};

/// Index of a skill slot on an entity.
pub type SlotIndex = u8;

/// Identifies a remote peer (one connected client).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct PeerId(pub u64);

impl PeerId {
    /// Generate a random peer identifier.
    #[must_use]
    pub fn random() -> Self {
        Self(uuid::Uuid::new_v4().as_u64_pair().0)
    }
}

impl std::fmt::Display for PeerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}

// ── Peer → authority ────────────────────────────────────────────────────────

/// What a peer asks the authority to do with a slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkillAction {
    /// Start the skill bound to the slot.
    Start,
    /// Stop the running skill.
    Stop,
    /// Confirm an authority-initiated start.
    Confirm,
}

/// A message sent by a peer to the authority.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Slot action for an entity the peer controls.
    Action {
        /// Target entity (authority identifier).
        entity: EntityId,
        /// Target slot.
        slot: SlotIndex,
        /// Requested action.
        action: SkillAction,
    },
}

/// A peer message tagged with its sender, as published to the authority inbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerFrame {
    /// The sending peer.
    pub peer: PeerId,
    /// The message body.
    pub message: PeerMessage,
}

/// Published once by a peer when it connects.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerHello {
    /// The connecting peer.
    pub peer: PeerId,
}

// ── Authority → peer ────────────────────────────────────────────────────────

/// A message sent by the authority to a peer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AuthorityMessage {
    /// Run the peer-side start routine. Also sent when a paused slot resumes.
    SkillStart {
        /// Target entity (authority identifier).
        entity: EntityId,
        /// Target slot.
        slot: SlotIndex,
        /// Registered skill name.
        skill: String,
    },
    /// Resolve one outstanding message await on the slot.
    SkillMessage {
        /// Target entity (authority identifier).
        entity: EntityId,
        /// Target slot.
        slot: SlotIndex,
        /// Message name the peer awaits on.
        name: String,
        /// MessagePack-encoded payload.
        payload: Vec<u8>,
    },
    /// Resolve all outstanding awaits as rejected and run the cancel callback
    /// with `is_paused = false`.
    SkillReject {
        /// Target entity (authority identifier).
        entity: EntityId,
        /// Target slot.
        slot: SlotIndex,
    },
    /// Run the cancel callback with `is_paused = true`; a `SkillStart`
    /// follows once the pause clears.
    SkillPause {
        /// Target entity (authority identifier).
        entity: EntityId,
        /// Target slot.
        slot: SlotIndex,
    },
    /// Run the peer-side stop routine.
    SkillStop {
        /// Target entity (authority identifier).
        entity: EntityId,
        /// Target slot.
        slot: SlotIndex,
    },
    /// Component mirror update.
    Replication(ReplicationMessage),
}

impl AuthorityMessage {
    /// Returns the `(entity, slot)` a skill message addresses, or `None` for
    /// replication traffic.
    #[must_use]
    pub fn skill_target(&self) -> Option<(EntityId, SlotIndex)> {
        match self {
            Self::SkillStart { entity, slot, .. }
            | Self::SkillMessage { entity, slot, .. }
            | Self::SkillReject { entity, slot }
            | Self::SkillPause { entity, slot }
            | Self::SkillStop { entity, slot } => Some((*entity, *slot)),
            Self::Replication(_) => None,
        }
    }
}

/// Snapshot and delta messages for the peer-side component mirror.
///
/// Component kinds are identified by their registered name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ReplicationMessage {
    /// An entity became visible to the peer.
    Spawned {
        /// Authority identifier.
        entity: EntityId,
    },
    /// A replicated component was added or changed.
    ComponentUpdated {
        /// Authority identifier.
        entity: EntityId,
        /// Registered component name.
        component: String,
        /// Serialised component value.
        data: Vec<u8>,
    },
    /// A replicated component was removed.
    ComponentRemoved {
        /// Authority identifier.
        entity: EntityId,
        /// Registered component name.
        component: String,
    },
    /// The entity was destroyed on the authority.
    Destroyed {
        /// Authority identifier.
        entity: EntityId,
    },
}

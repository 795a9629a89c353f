//! # combat_sim
//!
//! Server-authoritative combat simulation.
//!
//! This crate provides:
//!
//! - [`components`]: built-in `Skills`, `StatusEffects`, `PeerOwner` and `Character` components.
//! - [`skills`]: skill definitions, the authority state machine and the peer skill host.
//! - [`status`]: status-effect application, stacking, ticking and expiry.
//! - [`replication`]: authority diffing and the peer-side component mirror.
//! - [`simulation`]: the [`Simulation`] facade driven by the server tick loop.
//! - [`clock`]: the monotonic simulation clock.
//! - [`error`]: skill and status-effect error types.

pub mod clock;
pub mod components;
pub mod error;
pub mod outbox;
pub mod replication;
pub mod simulation;
pub mod skills;
pub mod status;

pub use clock::SimClock;
pub use components::{
    BuiltinTypes, CancelKind, Character, PERMANENT, PeerOwner, SkillSlot, Skills, SlotEnd,
    SlotState,
    StatusEffectInstance, StatusEffects, register_builtin,
};
pub use error::SkillError;
pub use outbox::Outbox;
pub use replication::{ReplicationMirror, Replicator};
pub use simulation::Simulation;
pub use skills::{
    MessageResult, Origin, PeerSkillContext, PeerSkillDef, PeerSkillHost, SkillContext, SkillDef,
    SkillEngine,
};
pub use status::{Application, EffectContext, StatusEffectDef, StatusEngine};

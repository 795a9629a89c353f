//! Skill execution: definitions, the authority state machine, and the peer
//! host with its per-slot mailboxes.

pub mod context;
pub mod definition;
pub mod engine;
pub mod mailbox;
pub mod peer;

pub use context::{SkillCommand, SkillContext, SkillPhase, SlotTarget};
pub use definition::{AuthorityRoutine, SkillDef, SkillRegistry};
pub use engine::{Origin, SkillEngine, SkillEnv};
pub use mailbox::{Mailbox, MessageResult};
pub use peer::{PeerSkillContext, PeerSkillDef, PeerSkillHost};

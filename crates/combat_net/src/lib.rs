//! # combat_net
//!
//! Wire protocol between the combat authority and its peers.
//!
//! This crate provides:
//!
//! - [`messages`]: skill actions, skill signals and replication messages.
//! - [`codec`]: MessagePack serialisation/deserialisation helpers.
//! - [`subjects`]: NATS subject constants and builders.
//! - [`connection`]: NATS connection management.
//! - [`error`]: Network-layer error types.

pub mod codec;
pub mod connection;
pub mod error;
pub mod messages;
pub mod subjects;

pub use codec::{decode, encode, encode_payload};
pub use connection::NatsConnection;
pub use error::NetError;
pub use messages::{
    AuthorityMessage, PeerFrame, PeerHello, PeerId, PeerMessage, ReplicationMessage, SkillAction,
    SlotIndex,
};

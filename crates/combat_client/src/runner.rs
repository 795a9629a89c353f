//! Peer runner: the harness that turns a [`PeerSkillHost`] into a
//! NATS-connected process.
//!
//! The runner owns a shadow world fed by replication messages, so it can find
//! the character its peer controls, and the host that runs peer routines.

use anyhow::Result;
use futures::StreamExt;
use tracing::{debug, info, warn};

use combat_ecs::{EntityId, World};
use combat_net::{AuthorityMessage, NatsConnection, PeerFrame, PeerId, SlotIndex};
use combat_sim::{
    Character, PeerOwner, PeerSkillDef, PeerSkillHost, ReplicationMirror, SkillError,
    register_builtin,
};

use crate::config::ClientConfig;

/// Mirrors authority state for one peer and runs its skill routines.
///
/// Call [`PeerRunner::run`] to connect and process authority messages.
#[derive(Debug)]
pub struct PeerRunner {
    /// Peer configuration.
    config: ClientConfig,
    /// Shadow of the authority's replicated components.
    mirror: ReplicationMirror,
    /// Peer-side skill routines.
    host: PeerSkillHost,
}

impl PeerRunner {
    /// Create a runner with an empty shadow world.
    ///
    /// # Errors
    ///
    /// Returns [`SkillError::Ecs`] if the built-in components fail to register.
    pub fn new(config: ClientConfig) -> Result<Self, SkillError> {
        let mut world = World::new();
        register_builtin(&mut world)?;
        let mut mirror = ReplicationMirror::new(world);
        mirror.index_by::<PeerOwner, _>(|owner| owner.0.0);
        mirror.index_by::<Character, _>(|character| character.0);
        let host = PeerSkillHost::new(config.peer);
        Ok(Self { config, mirror, host })
    }

    /// Returns this runner's peer id.
    #[must_use]
    pub fn peer(&self) -> PeerId {
        self.config.peer
    }

    /// Returns the shadow world mirror.
    #[must_use]
    pub fn mirror(&self) -> &ReplicationMirror {
        &self.mirror
    }

    /// Returns the skill host.
    #[must_use]
    pub fn host(&self) -> &PeerSkillHost {
        &self.host
    }

    /// Register a peer skill definition.
    pub fn register(&mut self, def: PeerSkillDef) {
        self.host.register(def);
    }

    /// Authority id of the character this peer controls, once replicated.
    #[must_use]
    pub fn character(&self) -> Option<EntityId> {
        let local = self.mirror.entity_for::<PeerOwner>(self.config.peer.0)?;
        self.mirror.remote_id(local)
    }

    /// Ask the authority to start a slot on this peer's character.
    ///
    /// Returns `false` if the character has not been replicated yet.
    pub fn request_start(&mut self, slot: SlotIndex) -> bool {
        let Some(entity) = self.character() else {
            return false;
        };
        self.host.request_start(entity, slot);
        true
    }

    /// Ask the authority to stop a slot on this peer's character.
    ///
    /// Returns `false` if the character has not been replicated yet.
    pub fn request_stop(&mut self, slot: SlotIndex) -> bool {
        let Some(entity) = self.character() else {
            return false;
        };
        self.host.request_stop(entity, slot);
        true
    }

    /// Apply one authority message to the mirror and the host.
    pub fn handle(&mut self, message: &AuthorityMessage) {
        if let AuthorityMessage::Replication(replication) = message {
            self.mirror.apply(replication);
        }
        self.host.handle(message);
    }

    /// Frames queued for the authority.
    pub fn drain_outbox(&mut self) -> Vec<PeerFrame> {
        self.host.drain_outbox()
    }

    /// Run the peer lifecycle.
    ///
    /// 1. Connect to NATS.
    /// 2. Subscribe to this peer's inbox.
    /// 3. Announce the peer to the authority.
    /// 4. Loop: receive → apply → call `on_message` → publish queued frames.
    ///
    /// # Errors
    ///
    /// Returns an error if NATS connection or publishing fails.
    pub async fn run<F>(mut self, mut on_message: F) -> Result<()>
    where
        F: FnMut(&mut PeerRunner),
    {
        let url = self.config.nats_url();
        let peer = self.config.peer;
        info!(%peer, %url, "peer starting");

        let conn = NatsConnection::connect_to(&url).await?;

        let inbox = combat_net::subjects::peer_inbox(peer);
        let mut sub = conn.subscribe(&inbox).await?;
        info!(subject = %inbox, "subscribed to peer inbox");

        conn.announce(peer).await?;
        info!(%peer, "announced to authority");

        while let Some(msg) = sub.next().await {
            let message: AuthorityMessage = match combat_net::decode(&msg.payload) {
                Ok(message) => message,
                Err(err) => {
                    warn!(%err, "malformed authority message dropped");
                    continue;
                }
            };
            debug!(?message, "authority message");
            self.handle(&message);
            on_message(&mut self);

            for frame in self.drain_outbox() {
                conn.send_to_authority(&frame).await?;
            }
        }

        Ok(())
    }
}

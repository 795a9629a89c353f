//! Peer configuration.

use combat_net::PeerId;

/// Configuration for a peer process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Identity announced to the authority.
    pub peer: PeerId,
    /// Optional NATS URL override (defaults to `NATS_URL` env or localhost).
    pub nats_url: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self::new()
    }
}

impl ClientConfig {
    /// A config with a freshly generated peer id.
    #[must_use]
    pub fn new() -> Self {
        Self {
            peer: PeerId::random(),
            nats_url: None,
        }
    }

    /// Use a fixed peer id.
    #[must_use]
    pub fn with_peer(mut self, peer: PeerId) -> Self {
        self.peer = peer;
        self
    }

    /// Override the NATS URL for this peer.
    #[must_use]
    pub fn with_nats_url(mut self, url: impl Into<String>) -> Self {
        self.nats_url = Some(url.into());
        self
    }

    /// The NATS URL to connect to.
    #[must_use]
    pub fn nats_url(&self) -> String {
        combat_net::connection::resolve_url(self.nats_url.as_deref())
    }
}

//! NATS connection management.
//!
//! Wraps an `async-nats` client with the publish/subscribe calls the
//! authority and peer processes need, all framed with [`crate::codec`].

use tracing::{debug, info};

use crate::error::NetError;
use crate::messages::{AuthorityMessage, PeerFrame, PeerHello, PeerId};
use crate::subjects;

/// Default NATS server URL.
pub const DEFAULT_NATS_URL: &str = "nats://localhost:4222";

/// The environment variable used to override the NATS URL.
pub const NATS_URL_ENV: &str = "NATS_URL";

/// Resolve the NATS URL: explicit override, then `NATS_URL`, then the default.
#[must_use]
pub fn resolve_url(explicit: Option<&str>) -> String {
    explicit.map_or_else(
        || std::env::var(NATS_URL_ENV).unwrap_or_else(|_| DEFAULT_NATS_URL.to_string()),
        str::to_string,
    )
}

/// A connected NATS client.
#[derive(Debug, Clone)]
pub struct NatsConnection {
    client: async_nats::Client,
}

impl NatsConnection {
    /// Connect to NATS at the specified URL.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Connect`] if the connection cannot be established.
    pub async fn connect_to(url: &str) -> Result<Self, NetError> {
        info!(url, "connecting to NATS");
        let client = async_nats::connect(url).await?;
        info!("NATS connection established");
        Ok(Self { client })
    }

    /// Publish a MessagePack-encoded frame to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if encoding or publishing fails.
    pub async fn publish<T: serde::Serialize>(
        &self,
        subject: &str,
        message: &T,
    ) -> Result<(), NetError> {
        let payload = crate::codec::encode(message)?;
        self.client
            .publish(subject.to_string(), payload.into())
            .await?;
        Ok(())
    }

    /// Send an authority message to one peer.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if encoding or publishing fails.
    pub async fn send_to_peer(
        &self,
        peer: PeerId,
        message: &AuthorityMessage,
    ) -> Result<(), NetError> {
        debug!(%peer, ?message, "authority -> peer");
        self.publish(&subjects::peer_inbox(peer), message).await
    }

    /// Send a peer frame to the authority.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if encoding or publishing fails.
    pub async fn send_to_authority(&self, frame: &PeerFrame) -> Result<(), NetError> {
        debug!(peer = %frame.peer, message = ?frame.message, "peer -> authority");
        self.publish(subjects::AUTHORITY_INBOX, frame).await
    }

    /// Announce a peer to the authority.
    ///
    /// # Errors
    ///
    /// Returns [`NetError`] if encoding or publishing fails.
    pub async fn announce(&self, peer: PeerId) -> Result<(), NetError> {
        self.publish(subjects::AUTHORITY_JOIN, &PeerHello { peer }).await
    }

    /// Subscribe to a subject.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Subscribe`] if the subscription fails.
    pub async fn subscribe(&self, subject: &str) -> Result<async_nats::Subscriber, NetError> {
        let sub = self.client.subscribe(subject.to_string()).await?;
        Ok(sub)
    }

    /// Flush buffered publishes.
    ///
    /// # Errors
    ///
    /// Returns [`NetError::Flush`] if the flush fails.
    pub async fn flush(&self) -> Result<(), NetError> {
        self.client
            .flush()
            .await
            .map_err(|err| NetError::Flush(err.to_string()))
    }
}

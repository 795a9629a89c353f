//! NATS receive tasks feeding the tick loop.
//!
//! Hellos and peer frames arrive on their own subscriptions and are forwarded
//! over one channel, so the tick loop consumes them between ticks without
//! awaiting the network.

use std::sync::Arc;

use futures::StreamExt;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use combat_net::{NatsConnection, NetError, PeerFrame, PeerHello, PeerId, subjects};

use crate::registry::PeerRegistry;

/// Something a peer did since the last tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A new peer said hello.
    Joined(PeerId),
    /// A skill action from a joined peer.
    Frame(PeerFrame),
}

/// Subscribe to the authority subjects and spawn the forwarding tasks.
///
/// # Errors
///
/// Returns [`NetError::Subscribe`] if either subscription fails.
pub async fn spawn(
    conn: &NatsConnection,
    registry: Arc<PeerRegistry>,
) -> Result<mpsc::UnboundedReceiver<Inbound>, NetError> {
    let (tx, rx) = mpsc::unbounded_channel();
    let mut joins = conn.subscribe(subjects::AUTHORITY_JOIN).await?;
    let mut frames = conn.subscribe(subjects::AUTHORITY_INBOX).await?;

    let join_tx = tx.clone();
    let join_registry = registry.clone();
    tokio::spawn(async move {
        while let Some(message) = joins.next().await {
            let hello: PeerHello = match combat_net::decode(&message.payload) {
                Ok(hello) => hello,
                Err(err) => {
                    warn!(%err, "malformed peer hello dropped");
                    continue;
                }
            };
            if !join_registry.join(hello.peer) {
                debug!(peer = %hello.peer, "duplicate hello ignored");
                continue;
            }
            if join_tx.send(Inbound::Joined(hello.peer)).is_err() {
                break;
            }
        }
    });

    tokio::spawn(async move {
        while let Some(message) = frames.next().await {
            let frame: PeerFrame = match combat_net::decode(&message.payload) {
                Ok(frame) => frame,
                Err(err) => {
                    warn!(%err, "malformed peer frame dropped");
                    continue;
                }
            };
            if !registry.record_frame(frame.peer) {
                warn!(peer = %frame.peer, "frame from unknown peer dropped");
                continue;
            }
            if tx.send(Inbound::Frame(frame)).is_err() {
                break;
            }
        }
    });

    Ok(rx)
}

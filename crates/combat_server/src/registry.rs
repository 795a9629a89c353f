//! Peer registry: which peers have joined and what they have sent.
//!
//! Shared between the NATS receive tasks, which register peers and count
//! frames, and the tick loop, which reads it.

use dashmap::DashMap;

use combat_net::PeerId;

/// Bookkeeping for one connected peer.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PeerInfo {
    /// Frames received from this peer.
    pub frames: u64,
}

/// Concurrent registry of known peers.
#[derive(Debug, Default)]
pub struct PeerRegistry {
    peers: DashMap<PeerId, PeerInfo>,
}

impl PeerRegistry {
    /// Create a new empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a peer. Returns `true` if it was not known yet.
    pub fn join(&self, peer: PeerId) -> bool {
        let mut fresh = false;
        self.peers.entry(peer).or_insert_with(|| {
            fresh = true;
            PeerInfo::default()
        });
        fresh
    }

    /// Count a frame from `peer`. Returns `false` for unknown peers.
    pub fn record_frame(&self, peer: PeerId) -> bool {
        match self.peers.get_mut(&peer) {
            Some(mut info) => {
                info.frames += 1;
                true
            }
            None => false,
        }
    }

    /// Frames received from `peer` so far.
    #[cfg(test)]
    #[must_use]
    pub fn frames(&self, peer: PeerId) -> Option<u64> {
        self.peers.get(&peer).map(|info| info.frames)
    }

    /// Known peers in id order.
    #[must_use]
    pub fn ids(&self) -> Vec<PeerId> {
        let mut ids: Vec<PeerId> = self.peers.iter().map(|entry| *entry.key()).collect();
        ids.sort_unstable();
        ids
    }

}

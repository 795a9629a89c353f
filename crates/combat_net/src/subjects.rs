//! NATS subject hierarchy.
//!
//! All subjects are prefixed with `combat.` to namespace within a shared
//! NATS cluster. A single publisher per subject keeps per-slot ordering.

use crate::messages::PeerId;

/// Root prefix for all combat NATS subjects.
pub const PREFIX: &str = "combat";

/// Peer frames ([`PeerFrame`](crate::messages::PeerFrame)). Peers → Authority.
pub const AUTHORITY_INBOX: &str = "combat.authority.inbox";

/// Peer hello ([`PeerHello`](crate::messages::PeerHello)). Peers → Authority.
pub const AUTHORITY_JOIN: &str = "combat.authority.join";

/// Build the subject a peer receives authority messages on.
///
/// `combat.peer.<peer_id>`
#[must_use]
pub fn peer_inbox(peer: PeerId) -> String {
    format!("{PREFIX}.peer.{peer}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_peer_inbox_subject() {
        assert_eq!(peer_inbox(PeerId(0xab)), "combat.peer.00000000000000ab");
    }

    #[test]
    fn test_static_subjects_share_prefix() {
        assert!(AUTHORITY_INBOX.starts_with(PREFIX));
        assert!(AUTHORITY_JOIN.starts_with(PREFIX));
    }
}

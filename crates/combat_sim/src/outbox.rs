//! Queue of authority → peer messages produced during a step.

use combat_net::{AuthorityMessage, PeerId};

/// Messages waiting to be handed to the transport, in dispatch order.
#[derive(Debug, Default)]
pub struct Outbox {
    messages: Vec<(PeerId, AuthorityMessage)>,
}

impl Outbox {
    /// Queue a message for a peer.
    pub fn push(&mut self, peer: PeerId, message: AuthorityMessage) {
        self.messages.push((peer, message));
    }

    /// Take every queued message.
    pub fn drain(&mut self) -> Vec<(PeerId, AuthorityMessage)> {
        std::mem::take(&mut self.messages)
    }

    /// Messages queued so far.
    #[must_use]
    pub fn pending(&self) -> &[(PeerId, AuthorityMessage)] {
        &self.messages
    }

    /// Returns the number of queued messages.
    #[must_use]
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    /// Returns `true` if nothing is queued.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

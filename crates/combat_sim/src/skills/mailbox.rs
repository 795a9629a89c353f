//! Per-slot message mailbox on the peer.
//!
//! A peer routine awaits named messages from the authority. Each await is a
//! one-shot channel parked in FIFO order; an arriving message resolves the
//! oldest live await with the same name, or is buffered until one shows up.
//! Closing the mailbox resolves every parked await as
//! [`MessageResult::Rejected`] and makes later awaits resolve immediately.

use std::collections::VecDeque;

use futures::channel::oneshot;
use serde::de::DeserializeOwned;

/// Outcome of awaiting a skill message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageResult {
    /// The authority sent the message; MessagePack payload.
    Message(Vec<u8>),
    /// The skill was rejected, paused or stopped before the message arrived.
    Rejected,
}

impl MessageResult {
    /// Returns `true` for [`MessageResult::Rejected`].
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        matches!(self, Self::Rejected)
    }

    /// Decode the payload. `None` if rejected or malformed.
    #[must_use]
    pub fn decode<T: DeserializeOwned>(&self) -> Option<T> {
        match self {
            Self::Message(payload) => combat_net::decode(payload).ok(),
            Self::Rejected => None,
        }
    }
}

/// Awaits and buffered messages of one running slot.
#[derive(Debug, Default)]
pub struct Mailbox {
    buffered: VecDeque<(String, Vec<u8>)>,
    waiters: VecDeque<(String, oneshot::Sender<MessageResult>)>,
    closed: bool,
}

impl Mailbox {
    /// An open, empty mailbox.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Park an await for `name`.
    pub fn wait(&mut self, name: &str) -> oneshot::Receiver<MessageResult> {
        let (tx, rx) = oneshot::channel();
        if self.closed {
            let _ = tx.send(MessageResult::Rejected);
            return rx;
        }
        let buffered = self.buffered.iter().position(|(queued, _)| queued == name);
        match buffered.and_then(|pos| self.buffered.remove(pos)) {
            Some((_, payload)) => {
                let _ = tx.send(MessageResult::Message(payload));
            }
            None => self.waiters.push_back((name.to_string(), tx)),
        }
        rx
    }

    /// Hand a message to the oldest live await for `name`, or buffer it.
    ///
    /// Returns `true` if an await was resolved.
    pub fn deliver(&mut self, name: &str, payload: Vec<u8>) -> bool {
        if self.closed {
            return false;
        }
        self.waiters.retain(|(_, tx)| !tx.is_canceled());
        let waiter = self.waiters.iter().position(|(queued, _)| queued == name);
        if let Some((_, tx)) = waiter.and_then(|pos| self.waiters.remove(pos)) {
            return tx.send(MessageResult::Message(payload)).is_ok();
        }
        self.buffered.push_back((name.to_string(), payload));
        false
    }

    /// Reject every parked await and refuse later ones.
    ///
    /// Returns the number of awaits resolved.
    pub fn close(&mut self) -> usize {
        self.closed = true;
        self.buffered.clear();
        self.waiters
            .drain(..)
            .filter(|(_, tx)| !tx.is_canceled())
            .map(|(_, tx)| tx.send(MessageResult::Rejected))
            .filter(Result::is_ok)
            .count()
    }

    /// Returns `true` once [`close`](Self::close) has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Number of parked awaits.
    #[must_use]
    pub fn pending(&self) -> usize {
        self.waiters.iter().filter(|(_, tx)| !tx.is_canceled()).count()
    }
}

//! Addressed protocol messages

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::core::{Message, NodeId};

/// A [`Message`] together with its sender and recipient.
///
/// The transport routes on `to`; the recipient answers to `from`.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Envelope<V> {
    pub from: NodeId,
    pub to: NodeId,
    pub message: Message<V>,
}

impl<V> Envelope<V> {
    #[must_use]
    pub fn new(from: NodeId, to: NodeId, message: Message<V>) -> Self {
        Self { from, to, message }
    }

    /// An envelope carrying `message` back to this envelope's sender.
    #[must_use]
    pub fn reply(&self, message: Message<V>) -> Self {
        Self {
            from: self.to,
            to: self.from,
            message,
        }
    }
}

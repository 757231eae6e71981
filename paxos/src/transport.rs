//! In-process transport over tokio channels
//!
//! Every member gets a [`LocalTransport`] that can reach all members and a
//! [`Mailbox`] holding its own inbound envelopes. Delivery is reliable, exactly
//! once, and FIFO per sender.

use std::collections::VecDeque;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use error_stack::Report;
use futures::Stream;
use tokio::sync::mpsc;

use crate::core::{MessageKind, NodeId};
use crate::error::TransportError;
use crate::messages::Envelope;
use crate::traits::Transport;

/// Build a fully connected network of `size` members.
///
/// Element `i` belongs to node `i`.
#[must_use]
pub fn local_network<V>(size: usize) -> Vec<(LocalTransport<V>, Mailbox<V>)> {
    let (senders, receivers): (Vec<_>, Vec<_>) =
        (0..size).map(|_| mpsc::unbounded_channel()).unzip();
    let inboxes: Arc<[_]> = senders.into();

    receivers
        .into_iter()
        .map(|rx| {
            (
                LocalTransport {
                    inboxes: Arc::clone(&inboxes),
                },
                Mailbox::new(rx),
            )
        })
        .collect()
}

/// Sending half of the in-process network.
pub struct LocalTransport<V> {
    inboxes: Arc<[mpsc::UnboundedSender<Envelope<V>>]>,
}

impl<V> Clone for LocalTransport<V> {
    fn clone(&self) -> Self {
        Self {
            inboxes: Arc::clone(&self.inboxes),
        }
    }
}

impl<V: Send + 'static> Transport<V> for LocalTransport<V> {
    fn send(&self, envelope: Envelope<V>) -> Result<(), Report<TransportError>> {
        let to = envelope.to;
        let Some(inbox) = self.inboxes.get(to) else {
            return Err(Report::new(TransportError).attach(format!(
                "node {to} is not a member of this {}-node network",
                self.inboxes.len()
            )));
        };
        inbox
            .send(envelope)
            .map_err(|_| Report::new(TransportError).attach(format!("mailbox of node {to} is closed")))
    }
}

/// Selects envelopes by sender and/or message kind.
///
/// The default filter matches everything.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MessageFilter {
    source: Option<NodeId>,
    kind: Option<MessageKind>,
}

impl MessageFilter {
    #[must_use]
    pub fn any() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn from(mut self, source: NodeId) -> Self {
        self.source = Some(source);
        self
    }

    #[must_use]
    pub fn kind(mut self, kind: MessageKind) -> Self {
        self.kind = Some(kind);
        self
    }

    #[must_use]
    pub fn matches<V>(&self, envelope: &Envelope<V>) -> bool {
        self.source.is_none_or(|source| source == envelope.from)
            && self.kind.is_none_or(|kind| kind == envelope.message.kind())
    }
}

/// Receiving half of one member's connection to the in-process network.
///
/// Envelopes skipped by [`recv_matching`](Self::recv_matching) are held back
/// and delivered first, in arrival order, by later receives.
pub struct Mailbox<V> {
    rx: mpsc::UnboundedReceiver<Envelope<V>>,
    deferred: VecDeque<Envelope<V>>,
}

impl<V> Mailbox<V> {
    fn new(rx: mpsc::UnboundedReceiver<Envelope<V>>) -> Self {
        Self {
            rx,
            deferred: VecDeque::new(),
        }
    }

    /// Next envelope from any sender.
    ///
    /// Returns `None` once every transport handle is gone and nothing is
    /// buffered.
    pub async fn recv(&mut self) -> Option<Envelope<V>> {
        if let Some(envelope) = self.deferred.pop_front() {
            return Some(envelope);
        }
        self.rx.recv().await
    }

    /// Block until an envelope matching `filter` arrives.
    ///
    /// # Cancellation Safety
    ///
    /// Cancellation safe: non-matching envelopes received so far stay buffered.
    pub async fn recv_matching(&mut self, filter: MessageFilter) -> Option<Envelope<V>> {
        if let Some(index) = self.deferred.iter().position(|e| filter.matches(e)) {
            return self.deferred.remove(index);
        }
        loop {
            let envelope = self.rx.recv().await?;
            if filter.matches(&envelope) {
                return Some(envelope);
            }
            self.deferred.push_back(envelope);
        }
    }

    /// Number of envelopes held back by filtered receives.
    #[must_use]
    pub fn deferred(&self) -> usize {
        self.deferred.len()
    }
}

// Envelopes are never pinned in place
impl<V> Unpin for Mailbox<V> {}

impl<V> Stream for Mailbox<V> {
    type Item = Envelope<V>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if let Some(envelope) = this.deferred.pop_front() {
            return Poll::Ready(Some(envelope));
        }
        this.rx.poll_recv(cx)
    }
}

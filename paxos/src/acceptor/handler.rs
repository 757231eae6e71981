//! Acceptor handler for processing Paxos protocol messages.

use tracing::{debug, trace};

use crate::config::AcceptorConfig;
use crate::core::{AcceptorCore, Ballot, ConsensusRecord, Message, NodeId};

/// The acceptor role of one node: [`AcceptorCore`] plus logging.
#[derive(Debug, Clone)]
pub struct AcceptorHandler<V> {
    node_id: NodeId,
    core: AcceptorCore<V>,
}

impl<V> AcceptorHandler<V>
where
    V: Clone + std::fmt::Debug,
{
    #[must_use]
    pub fn new(node_id: NodeId, config: AcceptorConfig) -> Self {
        Self {
            node_id,
            core: AcceptorCore::new(config.on_accept),
        }
    }

    #[must_use]
    pub fn promised(&self) -> Option<Ballot> {
        self.core.promised()
    }

    #[must_use]
    pub fn accepted(&self) -> Option<&(Ballot, V)> {
        self.core.accepted()
    }

    /// Answer a PREPARE or ACCEPT from `from`.
    ///
    /// Returns the reply for the sender, or `None` for messages that are not
    /// acceptor requests. A first acceptance is written to `record`.
    pub(crate) fn handle(
        &mut self,
        from: NodeId,
        message: &Message<V>,
        record: &mut ConsensusRecord<V>,
    ) -> Option<Message<V>> {
        let first_decision = !record.is_decided();
        let reply = self.core.handle(message, record)?;
        self.log(from, message, &reply);
        if first_decision && record.is_decided() {
            debug!(node_id = self.node_id, value = ?record.value(), "recorded first accepted value");
        }
        Some(reply)
    }

    /// Answer a request from this node's own proposer.
    ///
    /// The acceptor state moves exactly as for a peer, but the record is left
    /// to the proposer, which writes it only on commit.
    pub(crate) fn vote(&mut self, message: &Message<V>) -> Option<Message<V>> {
        let reply = self.core.respond(message)?;
        self.log(self.node_id, message, &reply);
        Some(reply)
    }

    fn log(&self, from: NodeId, message: &Message<V>, reply: &Message<V>) {
        match reply {
            Message::Promise { ballot, accepted } => {
                trace!(node_id = self.node_id, from, %ballot, ?accepted, "promised");
            }
            Message::Accepted { ballot, value } => {
                trace!(node_id = self.node_id, from, %ballot, ?value, "accepted");
            }
            Message::Nack { ballot, promised } => {
                debug!(
                    node_id = self.node_id,
                    from,
                    kind = %message.kind(),
                    %ballot,
                    %promised,
                    "rejected - outdated"
                );
            }
            Message::Prepare { .. } | Message::Accept { .. } => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::PromiseOnAccept;

    #[test]
    fn test_handler_answers_requests() {
        let mut handler = AcceptorHandler::new(
            1,
            AcceptorConfig {
                on_accept: PromiseOnAccept::Raise,
            },
        );
        let mut record = ConsensusRecord::new();

        let reply = handler.handle(
            0,
            &Message::Prepare {
                ballot: Ballot::new(3),
            },
            &mut record,
        );
        assert_eq!(
            reply,
            Some(Message::Promise {
                ballot: Ballot::new(3),
                accepted: None
            })
        );

        let reply = handler.handle(
            0,
            &Message::Accept {
                ballot: Ballot::new(3),
                value: 'X',
            },
            &mut record,
        );
        assert_eq!(
            reply,
            Some(Message::Accepted {
                ballot: Ballot::new(3),
                value: 'X'
            })
        );
        assert_eq!(handler.promised(), Some(Ballot::new(3)));
        assert_eq!(handler.accepted(), Some(&(Ballot::new(3), 'X')));
        assert_eq!(record.value(), Some(&'X'));
    }

    #[test]
    fn test_handler_ignores_replies() {
        let mut handler: AcceptorHandler<&str> =
            AcceptorHandler::new(0, AcceptorConfig::default());
        let mut record = ConsensusRecord::new();
        let reply = handler.handle(
            2,
            &Message::Nack {
                ballot: Ballot::new(3),
                promised: Ballot::new(5),
            },
            &mut record,
        );
        assert_eq!(reply, None);
        assert_eq!(handler.promised(), None);
    }

    #[test]
    fn test_vote_does_not_record() {
        let mut handler = AcceptorHandler::new(0, AcceptorConfig::default());
        let reply = handler.vote(&Message::Accept {
            ballot: Ballot::new(3),
            value: "X",
        });
        assert_eq!(
            reply,
            Some(Message::Accepted {
                ballot: Ballot::new(3),
                value: "X"
            })
        );
        assert_eq!(handler.accepted(), Some(&(Ballot::new(3), "X")));
    }
}

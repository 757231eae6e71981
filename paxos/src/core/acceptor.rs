//! Pure acceptor state machine - no I/O, no async, no synchronization
//!
//! This module contains the core state transition logic for a Paxos acceptor.

use super::record::ConsensusRecord;
use super::types::{Ballot, Message};

/// Whether a successful accept also raises the promised ballot.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum PromiseOnAccept {
    /// Leave `promised` untouched on accept.
    Keep,
    /// Set `promised = max(promised, ballot)` on every successful accept, so
    /// PREPAREs at or below an accepted ballot are refused.
    #[default]
    Raise,
}

/// Pure acceptor state - no I/O, no async, no synchronization
///
/// Tracks the highest promised ballot and the last accepted (ballot, value)
/// pair. Nothing here is ever rolled back.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct AcceptorCore<V> {
    /// Highest promised ballot; `None` is below every valid ballot
    promised: Option<Ballot>,
    /// Last accepted (ballot, value)
    accepted: Option<(Ballot, V)>,
    on_accept: PromiseOnAccept,
}

/// Result of handling a Prepare request
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PrepareResult<V> {
    /// Promised - carries the currently accepted pair (if any)
    Promised { accepted: Option<(Ballot, V)> },
    /// Rejected - an equal or higher ballot was already promised
    Rejected { promised: Ballot },
}

/// Result of handling an Accept request
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AcceptResult {
    Accepted,
    /// Rejected - a higher ballot was already promised
    Rejected { promised: Ballot },
}

impl<V: Clone> AcceptorCore<V> {
    #[must_use]
    pub fn new(on_accept: PromiseOnAccept) -> Self {
        Self {
            promised: None,
            accepted: None,
            on_accept,
        }
    }

    #[must_use]
    pub fn promised(&self) -> Option<Ballot> {
        self.promised
    }

    #[must_use]
    pub fn accepted(&self) -> Option<&(Ballot, V)> {
        self.accepted.as_ref()
    }

    /// Handle a Prepare request - pure state transition
    ///
    /// Succeeds only for a ballot strictly greater than the current promise.
    pub fn prepare(&mut self, ballot: Ballot) -> PrepareResult<V> {
        match self.promised {
            Some(promised) if ballot <= promised => PrepareResult::Rejected { promised },
            _ => {
                self.promised = Some(ballot);
                PrepareResult::Promised {
                    accepted: self.accepted.clone(),
                }
            }
        }
    }

    /// Handle an Accept request - pure state transition
    ///
    /// Succeeds for a ballot greater than or equal to the current promise.
    /// Re-accepting the same (ballot, value) is a no-op.
    pub fn accept(&mut self, ballot: Ballot, value: V) -> AcceptResult {
        match self.promised {
            Some(promised) if ballot < promised => AcceptResult::Rejected { promised },
            _ => {
                self.accepted = Some((ballot, value));
                if self.on_accept == PromiseOnAccept::Raise {
                    self.promised = self.promised.max(Some(ballot));
                }
                AcceptResult::Accepted
            }
        }
    }

    /// Answer a request with exactly one reply to its sender.
    ///
    /// A successful accept also writes `record` if it is still empty.
    /// Replies (PROMISE, ACCEPTED, NACK) are not for the acceptor and yield `None`.
    pub fn handle(
        &mut self,
        message: &Message<V>,
        record: &mut ConsensusRecord<V>,
    ) -> Option<Message<V>> {
        let reply = self.respond(message)?;
        if let Message::Accepted { value, .. } = &reply {
            record.record(value);
        }
        Some(reply)
    }

    /// Like [`handle`](Self::handle) without touching the record.
    ///
    /// A proposer votes through its own acceptor this way: its record is only
    /// written once the proposal commits.
    pub fn respond(&mut self, message: &Message<V>) -> Option<Message<V>> {
        match message {
            Message::Prepare { ballot } => {
                let ballot = *ballot;
                Some(match self.prepare(ballot) {
                    PrepareResult::Promised { accepted } => Message::Promise { ballot, accepted },
                    PrepareResult::Rejected { promised } => Message::Nack { ballot, promised },
                })
            }
            Message::Accept { ballot, value } => {
                let ballot = *ballot;
                Some(match self.accept(ballot, value.clone()) {
                    AcceptResult::Accepted => Message::Accepted {
                        ballot,
                        value: value.clone(),
                    },
                    AcceptResult::Rejected { promised } => Message::Nack { ballot, promised },
                })
            }
            Message::Promise { .. } | Message::Accepted { .. } | Message::Nack { .. } => None,
        }
    }
}

//! Pure proposer state machine - no I/O, no async
//!
//! Drives one proposal attempt: collect promises, pick the safe value, collect
//! acceptances. The caller does the sending and feeds every reply back in,
//! including the reply of the proposer's own acceptor.

use std::fmt;

use super::quorum::{Quorum, Tally};
use super::types::{Ballot, Message, NodeId};

/// Pure proposer state for a single attempt
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ProposerCore<V> {
    ballot: Ballot,
    /// Candidate value (replaced by an adopted value after Phase 1)
    value: V,
    quorum: Quorum,
    phase: ProposerPhase<V>,
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
enum ProposerPhase<V> {
    /// Collecting promises (Phase 1)
    Preparing {
        tally: Tally,
        /// Highest (ballot, value) disclosed by a promise so far
        highest_accepted: Option<(Ballot, V)>,
    },
    /// Collecting acceptances (Phase 2)
    Accepting { tally: Tally },
    Committed,
    Failed(Failure),
}

/// The two protocol phases.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// Phase 1: PREPARE / PROMISE
    Prepare,
    /// Phase 2: ACCEPT / ACCEPTED
    Accept,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prepare => "phase 1 (prepare)",
            Self::Accept => "phase 2 (accept)",
        })
    }
}

/// Why an attempt did not commit.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Failure {
    /// The phase that fell short
    pub phase: Phase,
    /// Grants collected, the proposer's own included
    pub votes: usize,
    /// Grants needed
    pub majority: usize,
    /// Highest ballot a NACK said was in the way
    pub rejected_by: Option<Ballot>,
    /// The phase ended on its deadline rather than on a full set of replies
    pub timed_out: bool,
}

impl Failure {
    /// At least one member refused this ballot in favor of a higher one.
    #[must_use]
    pub fn is_rejected(&self) -> bool {
        self.rejected_by.is_some()
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed with {}/{} votes", self.phase, self.votes, self.majority)?;
        if let Some(ballot) = self.rejected_by {
            write!(f, ", rejected by ballot {ballot}")?;
        }
        if self.timed_out {
            f.write_str(", timed out")?;
        }
        Ok(())
    }
}

/// What the caller must do after feeding the core an event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step<V> {
    /// Keep waiting
    Pending,
    /// Phase 1 reached quorum: send ACCEPT(ballot, value) to every member
    Accept { ballot: Ballot, value: V },
    /// Phase 2 reached quorum
    Committed { ballot: Ballot, value: V },
    Failed(Failure),
}

impl<V: Clone> ProposerCore<V> {
    /// Create a new proposer core in the Preparing phase
    #[must_use]
    pub fn new(ballot: Ballot, value: V, quorum: Quorum) -> Self {
        Self {
            ballot,
            value,
            quorum,
            phase: ProposerPhase::Preparing {
                tally: Tally::new(quorum),
                highest_accepted: None,
            },
        }
    }

    #[must_use]
    pub fn ballot(&self) -> Ballot {
        self.ballot
    }

    /// The candidate value; after Phase 1 this is the value actually proposed.
    #[must_use]
    pub fn value(&self) -> &V {
        &self.value
    }

    /// The phase still collecting replies, or `None` once resolved.
    #[must_use]
    pub fn phase(&self) -> Option<Phase> {
        match self.phase {
            ProposerPhase::Preparing { .. } => Some(Phase::Prepare),
            ProposerPhase::Accepting { .. } => Some(Phase::Accept),
            ProposerPhase::Committed | ProposerPhase::Failed(_) => None,
        }
    }

    /// Feed a reply from `from`.
    ///
    /// Replies for another ballot, and replies that do not belong to the
    /// current phase, are ignored.
    pub fn handle_reply(&mut self, from: NodeId, reply: &Message<V>) -> Step<V> {
        if reply.ballot() != self.ballot {
            return Step::Pending;
        }

        match (&mut self.phase, reply) {
            (
                ProposerPhase::Preparing {
                    tally,
                    highest_accepted,
                },
                Message::Promise { accepted, .. },
            ) => {
                if tally.grant(from)
                    && let Some((ballot, value)) = accepted
                    && highest_accepted.as_ref().is_none_or(|(b, _)| b < ballot)
                {
                    *highest_accepted = Some((*ballot, value.clone()));
                }
            }
            (ProposerPhase::Accepting { tally }, Message::Accepted { .. }) => {
                tally.grant(from);
            }
            (
                ProposerPhase::Preparing { tally, .. } | ProposerPhase::Accepting { tally },
                Message::Nack { promised, .. },
            ) => {
                tally.refuse(from, Some(*promised));
            }
            _ => return Step::Pending,
        }

        self.evaluate()
    }

    /// Count `member` as answered without a grant, e.g. because the request
    /// could not be sent.
    ///
    /// Takes effect at the next evaluation. Record unreachable members before
    /// feeding the proposer's own reply for the phase.
    pub fn mark_unreachable(&mut self, member: NodeId) {
        if let ProposerPhase::Preparing { tally, .. } | ProposerPhase::Accepting { tally } =
            &mut self.phase
        {
            tally.refuse(member, None);
        }
    }

    /// Give up on the current phase with whatever has been collected.
    pub fn time_out(&mut self) -> Step<V> {
        let (phase, tally) = match &self.phase {
            ProposerPhase::Preparing { tally, .. } => (Phase::Prepare, tally),
            ProposerPhase::Accepting { tally } => (Phase::Accept, tally),
            ProposerPhase::Committed | ProposerPhase::Failed(_) => return Step::Pending,
        };
        let failure = Failure {
            timed_out: true,
            ..Self::failure(self.quorum, phase, tally)
        };
        self.phase = ProposerPhase::Failed(failure.clone());
        Step::Failed(failure)
    }

    fn failure(quorum: Quorum, phase: Phase, tally: &Tally) -> Failure {
        Failure {
            phase,
            votes: tally.votes(),
            majority: quorum.majority(),
            rejected_by: tally.rejected_by(),
            timed_out: false,
        }
    }

    fn evaluate(&mut self) -> Step<V> {
        match &mut self.phase {
            ProposerPhase::Preparing {
                tally,
                highest_accepted,
            } => {
                if tally.has_quorum() {
                    // Safe value selection: a value accepted under an earlier
                    // ballot overrides our own
                    if let Some((_, value)) = highest_accepted.take() {
                        self.value = value;
                    }
                    self.phase = ProposerPhase::Accepting {
                        tally: Tally::new(self.quorum),
                    };
                    Step::Accept {
                        ballot: self.ballot,
                        value: self.value.clone(),
                    }
                } else if tally.is_exhausted() {
                    let failure = Self::failure(self.quorum, Phase::Prepare, tally);
                    self.phase = ProposerPhase::Failed(failure.clone());
                    Step::Failed(failure)
                } else {
                    Step::Pending
                }
            }
            ProposerPhase::Accepting { tally } => {
                if tally.has_quorum() {
                    self.phase = ProposerPhase::Committed;
                    Step::Committed {
                        ballot: self.ballot,
                        value: self.value.clone(),
                    }
                } else if tally.is_exhausted() {
                    let failure = Self::failure(self.quorum, Phase::Accept, tally);
                    self.phase = ProposerPhase::Failed(failure.clone());
                    Step::Failed(failure)
                } else {
                    Step::Pending
                }
            }
            ProposerPhase::Committed | ProposerPhase::Failed(_) => Step::Pending,
        }
    }
}

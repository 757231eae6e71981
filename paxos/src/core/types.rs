//! Core type definitions for the Paxos protocol
//!
//! These types are shared between the async runtime and the model checker.

use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::config::ClusterConfig;

/// Zero-based rank of a cluster member.
pub type NodeId = usize;

// =============================================================================
// BALLOT
// =============================================================================

/// Totally ordered proposal identifier.
///
/// Ballots issued by [`BallotGenerator`] have the form `rank + k * cluster_size`
/// with `k >= 1`, so two members never issue the same ballot.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Ballot(u64);

impl Ballot {
    #[must_use]
    pub const fn new(value: u64) -> Self {
        Self(value)
    }

    #[must_use]
    pub const fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for Ballot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

/// Issues this node's strictly increasing sequence of ballots.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct BallotGenerator {
    rank: u64,
    cluster_size: u64,
    /// Number of ballots issued so far (`k` of the last ballot)
    issued: u64,
}

impl BallotGenerator {
    #[must_use]
    pub fn new(cluster: ClusterConfig) -> Self {
        Self {
            rank: cluster.node_id() as u64,
            cluster_size: cluster.cluster_size() as u64,
            issued: 0,
        }
    }

    /// The `k`-th ballot of this node, `rank + k * cluster_size`.
    ///
    /// Saturates at `u64::MAX`.
    #[must_use]
    pub fn nth(&self, k: u64) -> Ballot {
        Ballot(k.saturating_mul(self.cluster_size).saturating_add(self.rank))
    }

    /// Issue the next ballot in sequence.
    pub fn next(&mut self) -> Ballot {
        self.issued = self.issued.saturating_add(1);
        self.nth(self.issued)
    }

    /// Issue the first ballot of this node's sequence that is strictly greater
    /// than `floor`, skipping the ones in between.
    pub fn next_above(&mut self, floor: Ballot) -> Ballot {
        let min_k = if floor.0 < self.rank {
            1
        } else {
            ((floor.0 - self.rank) / self.cluster_size).saturating_add(1)
        };
        self.issued = self.issued.saturating_add(1).max(min_k);
        self.nth(self.issued)
    }

    /// The most recently issued ballot, if any.
    #[must_use]
    pub fn last(&self) -> Option<Ballot> {
        (self.issued > 0).then(|| self.nth(self.issued))
    }
}

// =============================================================================
// CORE MESSAGE TYPES
// =============================================================================

/// Protocol message exchanged between proposers and acceptors.
///
/// Every reply names the ballot it answers so a proposer can tell replies to
/// its current attempt from late replies to an earlier one.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Message<V> {
    /// Phase 1a
    Prepare { ballot: Ballot },
    /// Phase 1b: the acceptor promised `ballot` and discloses its last acceptance
    Promise {
        ballot: Ballot,
        accepted: Option<(Ballot, V)>,
    },
    /// Phase 2a
    Accept { ballot: Ballot, value: V },
    /// Phase 2b
    Accepted { ballot: Ballot, value: V },
    /// Refusal of `ballot` because `promised` is in the way
    Nack { ballot: Ballot, promised: Ballot },
}

impl<V> Message<V> {
    #[must_use]
    pub fn kind(&self) -> MessageKind {
        match self {
            Self::Prepare { .. } => MessageKind::Prepare,
            Self::Promise { .. } => MessageKind::Promise,
            Self::Accept { .. } => MessageKind::Accept,
            Self::Accepted { .. } => MessageKind::Accepted,
            Self::Nack { .. } => MessageKind::Nack,
        }
    }

    /// The ballot this message proposes or answers.
    #[must_use]
    pub fn ballot(&self) -> Ballot {
        match self {
            Self::Prepare { ballot }
            | Self::Promise { ballot, .. }
            | Self::Accept { ballot, .. }
            | Self::Accepted { ballot, .. }
            | Self::Nack { ballot, .. } => *ballot,
        }
    }
}

/// Message tag, used for dispatch and filtering.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MessageKind {
    Prepare,
    Promise,
    Accept,
    Accepted,
    Nack,
}

/// The role on a node that consumes a message kind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Role {
    Acceptor,
    Proposer,
}

impl MessageKind {
    #[must_use]
    pub fn role(self) -> Role {
        match self {
            Self::Prepare | Self::Accept => Role::Acceptor,
            Self::Promise | Self::Accepted | Self::Nack => Role::Proposer,
        }
    }
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Prepare => "PREPARE",
            Self::Promise => "PROMISE",
            Self::Accept => "ACCEPT",
            Self::Accepted => "ACCEPTED",
            Self::Nack => "NACK",
        })
    }
}

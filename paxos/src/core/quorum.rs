//! Quorum arithmetic and per-phase reply counting

use std::collections::BTreeSet;

use super::types::{Ballot, NodeId};

/// Majority arithmetic for a fixed cluster size.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Quorum {
    cluster_size: usize,
}

impl Quorum {
    #[must_use]
    pub const fn new(cluster_size: usize) -> Self {
        Self { cluster_size }
    }

    #[must_use]
    pub const fn cluster_size(self) -> usize {
        self.cluster_size
    }

    /// `floor(N / 2) + 1`
    #[must_use]
    pub const fn majority(self) -> usize {
        self.cluster_size / 2 + 1
    }
}

/// Replies gathered during one phase of one attempt.
///
/// Every member, the proposer's own acceptor included, answers once. Duplicate
/// answers from a member are ignored.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub(crate) struct Tally {
    quorum: Quorum,
    granted: BTreeSet<NodeId>,
    refused: BTreeSet<NodeId>,
    /// Highest ballot named by a refusal
    rejected_by: Option<Ballot>,
}

impl Tally {
    pub(crate) fn new(quorum: Quorum) -> Self {
        Self {
            quorum,
            granted: BTreeSet::new(),
            refused: BTreeSet::new(),
            rejected_by: None,
        }
    }

    fn answered(&self, member: NodeId) -> bool {
        self.granted.contains(&member) || self.refused.contains(&member)
    }

    /// Returns false if `member` already answered.
    pub(crate) fn grant(&mut self, member: NodeId) -> bool {
        !self.answered(member) && self.granted.insert(member)
    }

    pub(crate) fn refuse(&mut self, member: NodeId, promised: Option<Ballot>) -> bool {
        if self.answered(member) {
            return false;
        }
        self.refused.insert(member);
        self.rejected_by = self.rejected_by.max(promised);
        true
    }

    pub(crate) fn votes(&self) -> usize {
        self.granted.len()
    }

    pub(crate) fn rejected_by(&self) -> Option<Ballot> {
        self.rejected_by
    }

    pub(crate) fn has_quorum(&self) -> bool {
        self.granted.len() >= self.quorum.majority()
    }

    /// Every member has answered one way or the other.
    pub(crate) fn is_exhausted(&self) -> bool {
        self.granted.len() + self.refused.len() >= self.quorum.cluster_size()
    }
}

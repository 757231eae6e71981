//! Proposer role of a node
//!
//! - [`ProposeOutcome`]: what a single proposal attempt produced
//! - [`propose_with_retry`]: re-proposes with a higher ballot after failures
//!
//! The attempt itself runs inside the node task (see [`crate::node`]); a
//! caller only ever sees the outcome.

mod retry;

use tokio::sync::oneshot;
use tokio::time::Instant;

use crate::core::{Ballot, ProposerCore};
pub use crate::core::{Failure, Phase};
pub use retry::propose_with_retry;

/// Result of one call to `propose`.
///
/// A failed attempt is an ordinary outcome, not an error: the cluster simply
/// did not let this ballot through.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProposeOutcome<V> {
    /// A majority accepted `value` under `ballot`. `value` may differ from the
    /// one proposed if an earlier value had to be adopted.
    Committed { ballot: Ballot, value: V },
    Failed { ballot: Ballot, failure: Failure },
}

impl<V> ProposeOutcome<V> {
    #[must_use]
    pub fn committed(&self) -> bool {
        matches!(self, Self::Committed { .. })
    }

    /// The value a majority agreed on, if this attempt committed.
    #[must_use]
    pub fn decided_value(&self) -> Option<&V> {
        match self {
            Self::Committed { value, .. } => Some(value),
            Self::Failed { .. } => None,
        }
    }

    #[must_use]
    pub fn ballot(&self) -> Ballot {
        match self {
            Self::Committed { ballot, .. } | Self::Failed { ballot, .. } => *ballot,
        }
    }

    #[must_use]
    pub fn failure(&self) -> Option<&Failure> {
        match self {
            Self::Committed { .. } => None,
            Self::Failed { failure, .. } => Some(failure),
        }
    }
}

/// The proposal a node is currently driving.
pub(crate) struct Attempt<V> {
    pub(crate) core: ProposerCore<V>,
    reply: oneshot::Sender<ProposeOutcome<V>>,
    /// When the current phase gives up (None = never)
    deadline: Option<Instant>,
}

impl<V> Attempt<V> {
    pub(crate) fn new(core: ProposerCore<V>, reply: oneshot::Sender<ProposeOutcome<V>>) -> Self {
        Self {
            core,
            reply,
            deadline: None,
        }
    }

    pub(crate) fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub(crate) fn set_deadline(&mut self, deadline: Option<Instant>) {
        self.deadline = deadline;
    }

    /// Hand `outcome` to the caller. Returns false if the caller stopped waiting.
    pub(crate) fn complete(self, outcome: ProposeOutcome<V>) -> bool {
        self.reply.send(outcome).is_ok()
    }
}

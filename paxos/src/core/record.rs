//! Sticky per-node record of the decided value

/// The value this node has observed as decided.
///
/// The first write wins for the lifetime of the process and is never cleared.
/// Both the proposer role (on reaching quorum) and the acceptor role (on its
/// first acceptance of a peer's proposal) write it.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct ConsensusRecord<V> {
    decided: Option<V>,
}

impl<V> Default for ConsensusRecord<V> {
    fn default() -> Self {
        Self { decided: None }
    }
}

impl<V: Clone> ConsensusRecord<V> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `value` unless something was already decided.
    ///
    /// Returns true if this call set the record.
    pub fn record(&mut self, value: &V) -> bool {
        if self.decided.is_some() {
            return false;
        }
        self.decided = Some(value.clone());
        true
    }

    #[must_use]
    pub fn is_decided(&self) -> bool {
        self.decided.is_some()
    }

    #[must_use]
    pub fn value(&self) -> Option<&V> {
        self.decided.as_ref()
    }
}

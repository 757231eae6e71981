//! Node, proposer and acceptor configuration

use std::time::Duration;

use error_stack::Report;
use rand::Rng;
use tracing::warn;

use crate::core::{NodeId, PromiseOnAccept, Quorum};
use crate::error::ConfigError;

/// Static identity of this node within a fixed-size cluster.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ClusterConfig {
    node_id: NodeId,
    cluster_size: usize,
}

impl ClusterConfig {
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the cluster is empty or `node_id` is not a
    /// rank within it.
    pub fn new(node_id: NodeId, cluster_size: usize) -> Result<Self, Report<ConfigError>> {
        if cluster_size == 0 {
            return Err(Report::new(ConfigError).attach("cluster size must be at least 1"));
        }
        if node_id >= cluster_size {
            return Err(Report::new(ConfigError).attach(format!(
                "node id {node_id} is out of range for a cluster of {cluster_size}"
            )));
        }
        if cluster_size < 3 {
            warn!(cluster_size, "cluster has no fault tolerance below 3 members");
        }
        Ok(Self {
            node_id,
            cluster_size,
        })
    }

    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    #[must_use]
    pub fn cluster_size(&self) -> usize {
        self.cluster_size
    }

    #[must_use]
    pub fn quorum(&self) -> Quorum {
        Quorum::new(self.cluster_size)
    }

    /// Every other member of the cluster.
    pub fn peers(&self) -> impl Iterator<Item = NodeId> + use<> {
        let node_id = self.node_id;
        (0..self.cluster_size).filter(move |&id| id != node_id)
    }
}

/// Acceptor behavior
#[derive(Debug, Clone, Copy, Default)]
pub struct AcceptorConfig {
    pub on_accept: PromiseOnAccept,
}

/// Proposer behavior
#[derive(Debug, Clone, Copy, Default)]
pub struct ProposerConfig {
    /// Fail a phase that has not resolved after this long (None = wait forever)
    pub phase_timeout: Option<Duration>,
}

/// Configuration for exponential backoff with jitter
#[derive(Debug, Clone)]
pub struct BackoffConfig {
    /// Initial backoff duration
    pub initial: Duration,
    /// Maximum backoff duration
    pub max: Duration,
    /// Multiplier for each retry (typically 2.0)
    pub multiplier: f64,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(10),
            max: Duration::from_secs(1),
            multiplier: 2.0,
        }
    }
}

impl BackoffConfig {
    /// Calculate backoff duration for a given retry count with jitter
    #[must_use]
    pub fn duration(&self, retries: u32, rng: &mut impl Rng) -> Duration {
        let base = self.initial.as_secs_f64() * self.multiplier.powi(retries.cast_signed());
        let capped = base.min(self.max.as_secs_f64());
        // Add jitter: 50% to 150% of the base duration
        let jitter_factor = rng.random_range(0.5..1.5);
        Duration::from_secs_f64(capped * jitter_factor)
    }
}

/// Retry policy for [`propose_with_retry`](crate::proposer::propose_with_retry)
#[derive(Debug, Clone)]
pub struct RetryConfig {
    pub backoff: BackoffConfig,
    /// Total attempts including the first (at least one is always made)
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffConfig::default(),
            max_attempts: 8,
        }
    }
}

/// Everything a node needs besides its cluster identity and transport
#[derive(Debug, Clone, Copy)]
pub struct NodeConfig {
    pub acceptor: AcceptorConfig,
    pub proposer: ProposerConfig,
    /// Capacity of the channel between handles and the node task
    pub command_buffer: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            acceptor: AcceptorConfig::default(),
            proposer: ProposerConfig::default(),
            command_buffer: 16,
        }
    }
}

//! Single-decree Paxos
//!
//! A fixed cluster of N nodes agrees on one value. Every node is both an
//! acceptor and a potential proposer.
//!
//! # Architecture
//!
//! - [`core`]: pure, I/O-free state machines (acceptor, proposer, ballots,
//!   quorum arithmetic), shared by the node runtime and the model checker
//! - [`node`]: one tokio task per member, dispatching inbound messages by kind
//!   while a proposal is in flight
//! - [`transport`]: in-process network implementing [`Transport`]
//! - [`proposer`]: proposal outcomes and the retry controller
//!
//! # Quick Start
//!
//! ```ignore
//! use single_decree_paxos::{NodeConfig, spawn_local_cluster};
//!
//! let cluster = spawn_local_cluster(3, NodeConfig::default())?;
//! let outcome = cluster.handles()[0].propose("ALPHA").await?;
//! assert_eq!(outcome.decided_value(), Some(&"ALPHA"));
//! ```

#![warn(clippy::pedantic)]

pub mod acceptor;
pub mod config;
pub mod core;
mod error;
mod messages;
pub mod node;
pub mod proposer;
mod traits;
pub mod transport;

pub use config::{
    AcceptorConfig, BackoffConfig, ClusterConfig, NodeConfig, ProposerConfig, RetryConfig,
};
pub use crate::core::{Ballot, Message, MessageKind, NodeId, PromiseOnAccept};
pub use error::{ConfigError, NodeError, TransportError};
pub use messages::Envelope;
pub use node::{LocalCluster, Node, NodeContext, NodeHandle, NodeState, spawn_local_cluster};
pub use proposer::{Failure, Phase, ProposeOutcome, propose_with_retry};
pub use traits::Transport;
pub use transport::{LocalTransport, Mailbox, MessageFilter, local_network};

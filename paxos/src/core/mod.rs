//! Pure state machine core for Paxos - no I/O, no async
//!
//! This module contains the core state transition logic that is shared between:
//! - The async node runtime
//! - The Stateright model checker tests
//!
//! By extracting this logic, we ensure the model checker verifies the exact
//! same state transitions as the production code.
//!
//! # Modules
//!
//! - [`types`]: Ballots, ballot generation and protocol messages
//! - [`acceptor`]: Acceptor state machine (`AcceptorCore`)
//! - [`proposer`]: Proposer state machine (`ProposerCore`)
//! - [`quorum`]: Majority arithmetic (`Quorum`)
//! - [`record`]: Sticky decided value (`ConsensusRecord`)

pub(crate) mod acceptor;
pub(crate) mod proposer;
pub(crate) mod quorum;
pub(crate) mod record;
pub(crate) mod types;

pub use acceptor::{AcceptResult, AcceptorCore, PrepareResult, PromiseOnAccept};
pub use proposer::{Failure, Phase, ProposerCore, Step};
pub use quorum::Quorum;
pub use record::ConsensusRecord;
pub use types::{Ballot, BallotGenerator, Message, MessageKind, NodeId, Role};

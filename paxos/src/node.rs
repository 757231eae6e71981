//! Node runtime: one tokio task per cluster member
//!
//! A [`Node`] plays both roles. Its task multiplexes three sources:
//!
//! - the inbox: PREPARE and ACCEPT are always answered by the acceptor role,
//!   also while a proposal of this node is waiting for replies. PROMISE,
//!   ACCEPTED and NACK are fed to the proposal in flight.
//! - commands from [`NodeHandle`]s: proposals are queued and run one at a time.
//! - the deadline of the current phase, if a phase timeout is configured.
//!
//! A proposal counts the node's own acceptor as one voter: PREPARE and ACCEPT
//! are applied locally and the local reply is tallied like a peer reply.

use std::collections::VecDeque;
use std::fmt;

use error_stack::{Report, ResultExt};
use futures::{Stream, StreamExt};
use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::Instant;
use tracing::{debug, info, instrument, trace, warn};

use crate::acceptor::AcceptorHandler;
use crate::config::{ClusterConfig, NodeConfig, ProposerConfig, RetryConfig};
use crate::core::{
    Ballot, BallotGenerator, ConsensusRecord, Message, NodeId, ProposerCore, Role, Step,
};
use crate::error::{ConfigError, NodeError};
use crate::messages::Envelope;
use crate::proposer::{Attempt, ProposeOutcome};
use crate::traits::Transport;
use crate::transport::local_network;

/// Everything a node needs to know about its surroundings.
pub struct NodeContext<T> {
    pub cluster: ClusterConfig,
    pub transport: T,
}

/// Snapshot of a node's protocol state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeState<V> {
    pub promised_ballot: Option<Ballot>,
    pub accepted_ballot: Option<Ballot>,
    pub accepted_value: Option<V>,
    pub decided_value: Option<V>,
}

impl<V> NodeState<V> {
    #[must_use]
    pub fn decided(&self) -> bool {
        self.decided_value.is_some()
    }
}

struct ProposeRequest<V> {
    value: V,
    /// Ballot the attempt must exceed (None = next in sequence)
    floor: Option<Ballot>,
    reply: oneshot::Sender<ProposeOutcome<V>>,
}

enum Command<V> {
    Propose(ProposeRequest<V>),
    State(oneshot::Sender<NodeState<V>>),
}

/// A cluster member.
pub struct Node<V, T> {
    cluster: ClusterConfig,
    transport: T,
    proposer: ProposerConfig,
    command_buffer: usize,
    acceptor: AcceptorHandler<V>,
    record: ConsensusRecord<V>,
    ballots: BallotGenerator,
    attempt: Option<Attempt<V>>,
    queue: VecDeque<ProposeRequest<V>>,
}

impl<V, T> Node<V, T>
where
    V: Clone + fmt::Debug + PartialEq + Send + 'static,
    T: Transport<V>,
{
    #[must_use]
    pub fn new(context: NodeContext<T>, config: NodeConfig) -> Self {
        let NodeContext { cluster, transport } = context;
        Self {
            cluster,
            transport,
            proposer: config.proposer,
            command_buffer: config.command_buffer.max(1),
            acceptor: AcceptorHandler::new(cluster.node_id(), config.acceptor),
            record: ConsensusRecord::new(),
            ballots: BallotGenerator::new(cluster),
            attempt: None,
            queue: VecDeque::new(),
        }
    }

    #[must_use]
    pub fn id(&self) -> NodeId {
        self.cluster.node_id()
    }

    #[must_use]
    pub fn state(&self) -> NodeState<V> {
        let accepted = self.acceptor.accepted();
        NodeState {
            promised_ballot: self.acceptor.promised(),
            accepted_ballot: accepted.map(|(ballot, _)| *ballot),
            accepted_value: accepted.map(|(_, value)| value.clone()),
            decided_value: self.record.value().cloned(),
        }
    }

    /// Process one inbound envelope.
    ///
    /// PREPARE and ACCEPT return the reply addressed to the sender. Replies
    /// go to the proposal in flight and return `None`; replies for another
    /// ballot, or with no proposal in flight, are dropped.
    pub fn handle(&mut self, envelope: Envelope<V>) -> Option<Envelope<V>> {
        if envelope.to != self.id() {
            warn!(to = envelope.to, from = envelope.from, "dropping misrouted envelope");
            return None;
        }
        match envelope.message.kind().role() {
            Role::Acceptor => {
                let reply = self
                    .acceptor
                    .handle(envelope.from, &envelope.message, &mut self.record)?;
                Some(envelope.reply(reply))
            }
            Role::Proposer => {
                self.on_reply(envelope.from, &envelope.message);
                self.start_next();
                None
            }
        }
    }

    /// Run the node on its own task, reading from `inbox`.
    ///
    /// The task ends when `inbox` ends. Dropping every handle only stops new
    /// proposals; the acceptor role keeps serving.
    pub fn spawn<S>(self, inbox: S) -> (NodeHandle<V>, JoinHandle<()>)
    where
        S: Stream<Item = Envelope<V>> + Unpin + Send + 'static,
    {
        let (handle, task) = self.into_task(inbox);
        (handle, tokio::spawn(task))
    }

    fn into_task<S>(self, inbox: S) -> (NodeHandle<V>, impl Future<Output = ()> + Send + 'static)
    where
        S: Stream<Item = Envelope<V>> + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(self.command_buffer);
        let handle = NodeHandle {
            node_id: self.id(),
            commands: tx,
        };
        (handle, self.run(inbox, rx))
    }

    #[instrument(skip_all, name = "node", fields(node_id = self.id()))]
    async fn run<S>(mut self, mut inbox: S, mut commands: mpsc::Receiver<Command<V>>)
    where
        S: Stream<Item = Envelope<V>> + Unpin,
    {
        debug!(cluster_size = self.cluster.cluster_size(), "node started");
        let mut accepting_commands = true;

        loop {
            let deadline = self.attempt.as_ref().and_then(Attempt::deadline);
            tokio::select! {
                biased;
                envelope = inbox.next() => {
                    let Some(envelope) = envelope else {
                        debug!("inbox closed, stopping");
                        break;
                    };
                    trace!(from = envelope.from, kind = %envelope.message.kind(), "received");
                    if let Some(reply) = self.handle(envelope) {
                        self.send(reply);
                    }
                }
                command = commands.recv(), if accepting_commands => match command {
                    Some(command) => self.on_command(command),
                    None => {
                        debug!("all handles dropped, serving acceptor role only");
                        accepting_commands = false;
                    }
                },
                () = sleep_until(deadline) => self.on_phase_timeout(),
            }
        }
    }

    fn on_command(&mut self, command: Command<V>) {
        match command {
            Command::Propose(request) => {
                trace!(queued = self.queue.len(), "proposal requested");
                self.queue.push_back(request);
                self.start_next();
            }
            Command::State(reply) => {
                let _ = reply.send(self.state());
            }
        }
    }

    /// Start queued proposals until one is left waiting for replies.
    fn start_next(&mut self) {
        while self.attempt.is_none() {
            let Some(request) = self.queue.pop_front() else {
                return;
            };
            if request.reply.is_closed() {
                trace!("caller gone, skipping queued proposal");
                continue;
            }
            self.begin(request);
        }
    }

    fn begin(&mut self, request: ProposeRequest<V>) {
        let ballot = match request.floor {
            Some(floor) => self.ballots.next_above(floor),
            None => self.ballots.next(),
        };
        debug!(%ballot, value = ?request.value, "starting proposal");

        let core = ProposerCore::new(ballot, request.value, self.cluster.quorum());
        let mut attempt = Attempt::new(core, request.reply);
        attempt.set_deadline(self.phase_deadline());
        self.attempt = Some(attempt);

        self.broadcast(&Message::Prepare { ballot });
    }

    fn phase_deadline(&self) -> Option<Instant> {
        self.proposer.phase_timeout.map(|timeout| Instant::now() + timeout)
    }

    /// Send `request` to every peer, then apply it to the local acceptor and
    /// count the local reply as this node's vote. The self vote never writes
    /// the record.
    fn broadcast(&mut self, request: &Message<V>) {
        let node_id = self.id();
        for peer in self.cluster.peers() {
            if !self.send(Envelope::new(node_id, peer, request.clone()))
                && let Some(attempt) = &mut self.attempt
            {
                attempt.core.mark_unreachable(peer);
            }
        }

        if let Some(reply) = self.acceptor.vote(request) {
            self.on_reply(node_id, &reply);
        }
    }

    fn send(&self, envelope: Envelope<V>) -> bool {
        let (to, kind) = (envelope.to, envelope.message.kind());
        match self.transport.send(envelope) {
            Ok(()) => {
                trace!(to, %kind, "sent");
                true
            }
            Err(report) => {
                warn!(to, %kind, ?report, "failed to send");
                false
            }
        }
    }

    fn on_reply(&mut self, from: NodeId, reply: &Message<V>) {
        let Some(attempt) = self.attempt.as_mut() else {
            trace!(from, kind = %reply.kind(), ballot = %reply.ballot(), "no proposal in flight, dropping reply");
            return;
        };
        let ballot = attempt.core.ballot();
        if reply.ballot() != ballot {
            trace!(
                from,
                kind = %reply.kind(),
                ballot = %reply.ballot(),
                current = %ballot,
                "dropping stale reply"
            );
            return;
        }

        let step = attempt.core.handle_reply(from, reply);
        self.advance(ballot, step);
    }

    fn advance(&mut self, ballot: Ballot, step: Step<V>) {
        match step {
            Step::Pending => {}
            Step::Accept { ballot, value } => {
                debug!(%ballot, ?value, "phase 1 complete, requesting acceptance");
                let deadline = self.phase_deadline();
                if let Some(attempt) = &mut self.attempt {
                    attempt.set_deadline(deadline);
                }
                self.broadcast(&Message::Accept { ballot, value });
            }
            Step::Committed { ballot, value } => {
                info!(%ballot, ?value, "consensus reached");
                if !self.record.record(&value) && self.record.value() != Some(&value) {
                    warn!(
                        %ballot,
                        ?value,
                        recorded = ?self.record.value(),
                        "committed value differs from recorded value"
                    );
                }
                self.finish(ProposeOutcome::Committed { ballot, value });
            }
            Step::Failed(failure) => {
                debug!(%ballot, %failure, "proposal failed");
                self.finish(ProposeOutcome::Failed { ballot, failure });
            }
        }
    }

    fn finish(&mut self, outcome: ProposeOutcome<V>) {
        if let Some(attempt) = self.attempt.take()
            && !attempt.complete(outcome)
        {
            debug!("caller stopped waiting for the outcome");
        }
    }

    fn on_phase_timeout(&mut self) {
        let Some(attempt) = self.attempt.as_mut() else {
            return;
        };
        let ballot = attempt.core.ballot();
        debug!(%ballot, phase = ?attempt.core.phase(), "phase timed out");
        let step = attempt.core.time_out();
        self.advance(ballot, step);
        self.start_next();
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

/// Cloneable handle to a running [`Node`].
pub struct NodeHandle<V> {
    node_id: NodeId,
    commands: mpsc::Sender<Command<V>>,
}

impl<V> Clone for NodeHandle<V> {
    fn clone(&self) -> Self {
        Self {
            node_id: self.node_id,
            commands: self.commands.clone(),
        }
    }
}

impl<V: Send + 'static> NodeHandle<V> {
    #[must_use]
    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    /// Run one proposal attempt for `value` with this node's next ballot.
    ///
    /// Proposals on the same node run one after another.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] if the node task is no longer running.
    pub async fn propose(&self, value: V) -> Result<ProposeOutcome<V>, Report<NodeError>> {
        self.submit(value, None).await
    }

    /// Like [`propose`](Self::propose), with a ballot strictly above `floor`.
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] if the node task is no longer running.
    pub async fn propose_above(
        &self,
        value: V,
        floor: Ballot,
    ) -> Result<ProposeOutcome<V>, Report<NodeError>> {
        self.submit(value, Some(floor)).await
    }

    /// See [`crate::proposer::propose_with_retry`].
    ///
    /// # Errors
    ///
    /// Returns [`NodeError`] if the node task is no longer running.
    pub async fn propose_with_retry(
        &self,
        value: V,
        retry: &RetryConfig,
        rng: &mut impl Rng,
    ) -> Result<ProposeOutcome<V>, Report<NodeError>>
    where
        V: Clone,
    {
        crate::proposer::propose_with_retry(self, value, retry, rng).await
    }

    /// # Errors
    ///
    /// Returns [`NodeError`] if the node task is no longer running.
    pub async fn state(&self) -> Result<NodeState<V>, Report<NodeError>> {
        let (tx, rx) = oneshot::channel();
        self.request(Command::State(tx), rx).await
    }

    async fn submit(
        &self,
        value: V,
        floor: Option<Ballot>,
    ) -> Result<ProposeOutcome<V>, Report<NodeError>> {
        let (tx, rx) = oneshot::channel();
        let request = ProposeRequest {
            value,
            floor,
            reply: tx,
        };
        self.request(Command::Propose(request), rx).await
    }

    async fn request<R>(
        &self,
        command: Command<V>,
        reply: oneshot::Receiver<R>,
    ) -> Result<R, Report<NodeError>> {
        self.commands.send(command).await.map_err(|_| {
            Report::new(NodeError).attach(format!("node {} is not accepting requests", self.node_id))
        })?;
        reply
            .await
            .change_context(NodeError)
            .attach_with(|| format!("node {} stopped before replying", self.node_id))
    }
}

/// A full cluster running in this process over [`local_network`].
///
/// Dropping the cluster stops every node.
pub struct LocalCluster<V> {
    handles: Vec<NodeHandle<V>>,
    tasks: JoinSet<()>,
}

impl<V> LocalCluster<V> {
    #[must_use]
    pub fn handles(&self) -> &[NodeHandle<V>] {
        &self.handles
    }

    #[must_use]
    pub fn node(&self, node_id: NodeId) -> Option<&NodeHandle<V>> {
        self.handles.get(node_id)
    }

    #[must_use]
    pub fn size(&self) -> usize {
        self.handles.len()
    }

    /// Stop every node and wait for the tasks to end.
    pub async fn shutdown(mut self) {
        self.tasks.abort_all();
        while self.tasks.join_next().await.is_some() {}
    }
}

/// Spawn `size` nodes connected by an in-process network.
///
/// # Errors
///
/// Returns [`ConfigError`] if `size` is zero.
pub fn spawn_local_cluster<V>(
    size: usize,
    config: NodeConfig,
) -> Result<LocalCluster<V>, Report<ConfigError>>
where
    V: Clone + fmt::Debug + PartialEq + Send + 'static,
{
    if size == 0 {
        return Err(Report::new(ConfigError).attach("cluster size must be at least 1"));
    }

    let mut handles = Vec::with_capacity(size);
    let mut tasks = JoinSet::new();
    for (node_id, (transport, mailbox)) in local_network(size).into_iter().enumerate() {
        let cluster = ClusterConfig::new(node_id, size)?;
        let node = Node::new(NodeContext { cluster, transport }, config);
        let (handle, task) = node.into_task(mailbox);
        tasks.spawn(task);
        handles.push(handle);
    }
    debug!(size, "spawned local cluster");

    Ok(LocalCluster { handles, tasks })
}

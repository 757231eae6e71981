//! Node 0 runs for real; nodes 1 and 2 are scripted by the test through their
//! transports and mailboxes.

use std::time::Duration;

use rand::SeedableRng;
use rand::rngs::StdRng;
use single_decree_paxos::{
    BackoffConfig, Ballot, ClusterConfig, Envelope, Failure, LocalTransport, Mailbox, Message,
    MessageFilter, MessageKind, Node, NodeConfig, NodeContext, NodeHandle, Phase, ProposeOutcome,
    ProposerConfig, RetryConfig, Transport, local_network,
};
use tokio::task::JoinHandle;

type Value = &'static str;

/// Initialize tracing for tests. Call at the start of each test.
/// Uses `RUST_LOG` for filtering (defaults to "debug" for this crate).
fn init_tracing() -> impl Sized {
    use tracing::Dispatch;
    use tracing_subscriber::fmt::format::FmtSpan;
    use tracing_subscriber::{EnvFilter, fmt};

    let subscriber = fmt::Subscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("single_decree_paxos=debug")),
        )
        .with_span_events(FmtSpan::CLOSE)
        .with_test_writer()
        .finish();

    let dispatch = Dispatch::new(subscriber);
    tracing::dispatcher::set_default(&dispatch)
}

/// A scripted cluster member.
struct Peer {
    id: usize,
    transport: LocalTransport<Value>,
    mailbox: Mailbox<Value>,
}

impl Peer {
    fn send(&self, message: Message<Value>) {
        self.transport
            .send(Envelope::new(self.id, 0, message))
            .unwrap();
    }

    /// Next message of `kind` from node 0.
    async fn expect(&mut self, kind: MessageKind) -> Message<Value> {
        let filter = MessageFilter::any().from(0).kind(kind);
        let envelope = tokio::time::timeout(Duration::from_secs(5), self.mailbox.recv_matching(filter))
            .await
            .expect("timed out waiting for node 0")
            .expect("network closed");
        assert_eq!(envelope.to, self.id);
        envelope.message
    }
}

/// Spawn node 0 of a three-node cluster and hand back the other two members.
fn spawn_node(config: NodeConfig) -> (NodeHandle<Value>, JoinHandle<()>, Vec<Peer>) {
    let mut network = local_network(3).into_iter();
    let (transport, mailbox) = network.next().unwrap();
    let context = NodeContext {
        cluster: ClusterConfig::new(0, 3).unwrap(),
        transport,
    };
    let (handle, task) = Node::new(context, config).spawn(mailbox);

    let peers = network
        .enumerate()
        .map(|(i, (transport, mailbox))| Peer {
            id: i + 1,
            transport,
            mailbox,
        })
        .collect();
    (handle, task, peers)
}

fn b(n: u64) -> Ballot {
    Ballot::new(n)
}

#[tokio::test]
async fn test_serves_prepare_while_proposal_waits() {
    let _guard = init_tracing();

    let (handle, task, mut peers) = spawn_node(NodeConfig::default());
    let proposal = tokio::spawn({
        let handle = handle.clone();
        async move { handle.propose("ALPHA").await }
    });

    for peer in &mut peers {
        assert_eq!(peer.expect(MessageKind::Prepare).await, Message::Prepare { ballot: b(3) });
    }

    // Node 1 starts its own proposal while node 0 is still waiting for promises
    peers[0].send(Message::Prepare { ballot: b(4) });
    assert_eq!(
        peers[0].expect(MessageKind::Promise).await,
        Message::Promise {
            ballot: b(4),
            accepted: None
        }
    );

    // One peer promise plus node 0's own is a majority
    peers[0].send(Message::Promise {
        ballot: b(3),
        accepted: None,
    });
    for peer in &mut peers {
        assert_eq!(
            peer.expect(MessageKind::Accept).await,
            Message::Accept {
                ballot: b(3),
                value: "ALPHA"
            }
        );
    }

    // Node 0's own acceptor promised ballot 4, so it refuses its own ACCEPT
    // and both peers are needed
    peers[0].send(Message::Accepted {
        ballot: b(3),
        value: "ALPHA",
    });
    peers[1].send(Message::Accepted {
        ballot: b(3),
        value: "ALPHA",
    });

    let outcome = proposal.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        ProposeOutcome::Committed {
            ballot: b(3),
            value: "ALPHA"
        }
    );

    let state = handle.state().await.unwrap();
    assert_eq!(state.promised_ballot, Some(b(4)));
    assert_eq!(state.accepted_ballot, None);
    assert_eq!(state.decided_value, Some("ALPHA"));

    task.abort();
}

#[tokio::test]
async fn test_serves_accept_while_proposal_waits() {
    let _guard = init_tracing();

    let (handle, task, mut peers) = spawn_node(NodeConfig::default());
    let proposal = tokio::spawn({
        let handle = handle.clone();
        async move { handle.propose("ALPHA").await }
    });

    for peer in &mut peers {
        assert_eq!(peer.expect(MessageKind::Prepare).await, Message::Prepare { ballot: b(3) });
    }

    // Node 1 already won Phase 1 for ballot 4 and asks node 0 to accept
    peers[0].send(Message::Accept {
        ballot: b(4),
        value: "BETA",
    });
    assert_eq!(
        peers[0].expect(MessageKind::Accepted).await,
        Message::Accepted {
            ballot: b(4),
            value: "BETA"
        }
    );

    peers[0].send(Message::Nack {
        ballot: b(3),
        promised: b(4),
    });
    peers[1].send(Message::Nack {
        ballot: b(3),
        promised: b(4),
    });

    let outcome = proposal.await.unwrap().unwrap();
    assert_eq!(outcome.failure().unwrap().rejected_by, Some(b(4)));

    let state = handle.state().await.unwrap();
    assert_eq!(state.promised_ballot, Some(b(4)));
    assert_eq!(state.accepted_ballot, Some(b(4)));
    assert_eq!(state.decided_value, Some("BETA"));

    task.abort();
}

#[tokio::test]
async fn test_nacks_fail_phase_one() {
    let _guard = init_tracing();

    let (handle, task, mut peers) = spawn_node(NodeConfig::default());
    let proposal = tokio::spawn({
        let handle = handle.clone();
        async move { handle.propose("X").await }
    });

    for peer in &mut peers {
        peer.expect(MessageKind::Prepare).await;
    }
    peers[0].send(Message::Nack {
        ballot: b(3),
        promised: b(7),
    });
    peers[1].send(Message::Nack {
        ballot: b(3),
        promised: b(5),
    });

    let outcome = proposal.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        ProposeOutcome::Failed {
            ballot: b(3),
            failure: Failure {
                phase: Phase::Prepare,
                votes: 1,
                majority: 2,
                rejected_by: Some(b(7)),
                timed_out: false,
            }
        }
    );
    // Only the local acceptor promised; nothing was accepted
    let state = handle.state().await.unwrap();
    assert_eq!(state.promised_ballot, Some(b(3)));
    assert!(!state.decided());

    task.abort();
}

#[tokio::test]
async fn test_phase_two_failure() {
    let _guard = init_tracing();

    let (handle, task, mut peers) = spawn_node(NodeConfig::default());
    let proposal = tokio::spawn({
        let handle = handle.clone();
        async move { handle.propose("X").await }
    });

    for peer in &mut peers {
        peer.expect(MessageKind::Prepare).await;
    }
    peers[1].send(Message::Promise {
        ballot: b(3),
        accepted: None,
    });
    for peer in &mut peers {
        peer.expect(MessageKind::Accept).await;
    }
    peers[0].send(Message::Nack {
        ballot: b(3),
        promised: b(10),
    });
    peers[1].send(Message::Nack {
        ballot: b(3),
        promised: b(10),
    });

    let outcome = proposal.await.unwrap().unwrap();
    let failure = outcome.failure().unwrap();
    assert_eq!(failure.phase, Phase::Accept);
    assert_eq!(failure.votes, 1);
    assert_eq!(failure.rejected_by, Some(b(10)));
    assert!(failure.is_rejected());

    // Node 0's own acceptor took the value, but nothing was chosen
    let state = handle.state().await.unwrap();
    assert_eq!(state.accepted_value, Some("X"));
    assert!(!state.decided());

    task.abort();
}

#[tokio::test]
async fn test_adopts_value_disclosed_by_promise() {
    let _guard = init_tracing();

    let (handle, task, mut peers) = spawn_node(NodeConfig::default());
    // Node 2 already got "EARLIER" accepted under its ballot 5
    let proposal = tokio::spawn({
        let handle = handle.clone();
        async move { handle.propose_above("MINE", b(5)).await }
    });

    for peer in &mut peers {
        assert_eq!(peer.expect(MessageKind::Prepare).await, Message::Prepare { ballot: b(6) });
    }
    peers[1].send(Message::Promise {
        ballot: b(6),
        accepted: Some((b(5), "EARLIER")),
    });
    for peer in &mut peers {
        assert_eq!(
            peer.expect(MessageKind::Accept).await,
            Message::Accept {
                ballot: b(6),
                value: "EARLIER"
            }
        );
    }
    peers[1].send(Message::Accepted {
        ballot: b(6),
        value: "EARLIER",
    });

    let outcome = proposal.await.unwrap().unwrap();
    assert_eq!(outcome.ballot(), b(6));
    assert_eq!(outcome.decided_value(), Some(&"EARLIER"));
    assert_eq!(
        handle.state().await.unwrap().accepted_value,
        Some("EARLIER")
    );

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_phase_timeout_and_stale_replies() {
    let _guard = init_tracing();

    let config = NodeConfig {
        proposer: ProposerConfig {
            phase_timeout: Some(Duration::from_millis(100)),
        },
        ..NodeConfig::default()
    };
    let (handle, task, mut peers) = spawn_node(config);

    // Nobody answers ballot 3
    let outcome = handle.propose("X").await.unwrap();
    assert_eq!(
        outcome.failure(),
        Some(&Failure {
            phase: Phase::Prepare,
            votes: 1,
            majority: 2,
            rejected_by: None,
            timed_out: true,
        })
    );

    let proposal = tokio::spawn({
        let handle = handle.clone();
        async move { handle.propose("X").await }
    });
    for peer in &mut peers {
        assert_eq!(peer.expect(MessageKind::Prepare).await, Message::Prepare { ballot: b(3) });
        assert_eq!(peer.expect(MessageKind::Prepare).await, Message::Prepare { ballot: b(6) });
    }

    // A late promise for ballot 3 must not count towards ballot 6
    peers[0].send(Message::Promise {
        ballot: b(3),
        accepted: None,
    });
    peers[0].send(Message::Nack {
        ballot: b(6),
        promised: b(7),
    });
    peers[1].send(Message::Nack {
        ballot: b(6),
        promised: b(7),
    });

    let outcome = proposal.await.unwrap().unwrap();
    let failure = outcome.failure().unwrap();
    assert_eq!(outcome.ballot(), b(6));
    assert_eq!(failure.votes, 1);
    assert!(!failure.timed_out);

    task.abort();
}

#[tokio::test(start_paused = true)]
async fn test_retry_skips_past_rejecting_ballot() {
    let _guard = init_tracing();

    let (handle, task, mut peers) = spawn_node(NodeConfig::default());
    let proposal = tokio::spawn({
        let handle = handle.clone();
        async move {
            let retry = RetryConfig {
                backoff: BackoffConfig::default(),
                max_attempts: 3,
            };
            let mut rng = StdRng::seed_from_u64(0);
            handle.propose_with_retry("X", &retry, &mut rng).await
        }
    });

    for peer in &mut peers {
        peer.expect(MessageKind::Prepare).await;
        peer.send(Message::Nack {
            ballot: b(3),
            promised: b(13),
        });
    }

    // The retry ballot is the first of node 0's sequence above 13
    for peer in &mut peers {
        assert_eq!(peer.expect(MessageKind::Prepare).await, Message::Prepare { ballot: b(15) });
    }
    peers[0].send(Message::Promise {
        ballot: b(15),
        accepted: None,
    });
    for peer in &mut peers {
        peer.expect(MessageKind::Accept).await;
    }
    peers[0].send(Message::Accepted {
        ballot: b(15),
        value: "X",
    });

    let outcome = proposal.await.unwrap().unwrap();
    assert_eq!(
        outcome,
        ProposeOutcome::Committed {
            ballot: b(15),
            value: "X"
        }
    );

    task.abort();
}

#[tokio::test]
async fn test_serves_acceptor_role_after_handles_drop() {
    let _guard = init_tracing();

    let (handle, task, mut peers) = spawn_node(NodeConfig::default());
    drop(handle);

    peers[1].send(Message::Prepare { ballot: b(5) });
    assert_eq!(
        peers[1].expect(MessageKind::Promise).await,
        Message::Promise {
            ballot: b(5),
            accepted: None
        }
    );
    peers[1].send(Message::Accept {
        ballot: b(5),
        value: "Y",
    });
    assert_eq!(
        peers[1].expect(MessageKind::Accepted).await,
        Message::Accepted {
            ballot: b(5),
            value: "Y"
        }
    );
    assert!(!task.is_finished());

    task.abort();
}

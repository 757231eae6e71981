//! Runs the classic Paxos scenarios against an in-process cluster.

use std::fmt;
use std::time::Duration;

use clap::{Parser, ValueEnum};
use error_stack::{Report, ResultExt};
use single_decree_paxos::{
    LocalCluster, NodeConfig, NodeError, NodeHandle, ProposeOutcome, RetryConfig,
    spawn_local_cluster,
};
use tracing::{info, warn};

type Value = &'static str;

#[derive(Parser, Debug)]
#[command(name = "paxos-demo")]
#[command(about = "Run single-decree Paxos scenarios over an in-process network")]
struct Args {
    /// Cluster size (at least 3)
    #[arg(short, long, default_value_t = 3)]
    nodes: usize,

    #[arg(short, long, value_enum, default_value_t = Scenario::All)]
    scenario: Scenario,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
enum Scenario {
    All,
    /// Node 0 proposes ALPHA
    Single,
    /// Node 1 proposes BETA after node 0
    Sequential,
    /// Nodes 0 and 1 propose GAMMA and DELTA at the same time
    Simultaneous,
}

#[derive(Debug)]
struct DemoError;

impl fmt::Display for DemoError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("demo failed")
    }
}

impl std::error::Error for DemoError {}

#[tokio::main]
async fn main() -> Result<(), Report<DemoError>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.nodes < 3 {
        return Err(Report::new(DemoError)
            .attach(format!("got {} nodes", args.nodes))
            .attach("Paxos needs at least 3 nodes for fault tolerance"));
    }

    let cluster: LocalCluster<Value> =
        spawn_local_cluster(args.nodes, NodeConfig::default()).change_context(DemoError)?;
    info!(nodes = cluster.size(), majority = cluster.size() / 2 + 1, "cluster started");

    let run_all = args.scenario == Scenario::All;
    if run_all || args.scenario == Scenario::Single {
        info!("scenario 1: node 0 proposes ALPHA");
        report(0, cluster.handles()[0].propose("ALPHA").await)?;
    }
    if run_all || args.scenario == Scenario::Sequential {
        info!("scenario 2: node 1 proposes BETA");
        report(1, cluster.handles()[1].propose("BETA").await)?;
    }
    if run_all || args.scenario == Scenario::Simultaneous {
        info!("scenario 3: nodes 0 and 1 propose simultaneously");
        simultaneous(&cluster.handles()[0], &cluster.handles()[1]).await?;
    }

    // Let in-flight ACCEPTs land before reading state
    tokio::time::sleep(Duration::from_millis(50)).await;
    print_final_state(&cluster).await?;

    cluster.shutdown().await;
    Ok(())
}

async fn simultaneous(
    first: &NodeHandle<Value>,
    second: &NodeHandle<Value>,
) -> Result<(), Report<DemoError>> {
    let retry = RetryConfig::default();
    let mut first_rng = rand::rng();
    let mut second_rng = rand::rng();

    let (gamma, delta) = tokio::join!(
        async {
            tokio::time::sleep(Duration::from_millis(100)).await;
            first.propose_with_retry("GAMMA", &retry, &mut first_rng).await
        },
        async {
            tokio::time::sleep(Duration::from_millis(150)).await;
            second.propose_with_retry("DELTA", &retry, &mut second_rng).await
        },
    );
    report(first.node_id(), gamma)?;
    report(second.node_id(), delta)
}

fn report(
    node_id: usize,
    outcome: Result<ProposeOutcome<Value>, Report<NodeError>>,
) -> Result<(), Report<DemoError>> {
    match outcome.change_context(DemoError)? {
        ProposeOutcome::Committed { ballot, value } => {
            info!(node_id, %ballot, value, "proposal committed");
        }
        ProposeOutcome::Failed { ballot, failure } => {
            warn!(node_id, %ballot, %failure, "proposal failed");
        }
    }
    Ok(())
}

async fn print_final_state(cluster: &LocalCluster<Value>) -> Result<(), Report<DemoError>> {
    println!("{}", "=".repeat(70));
    println!("FINAL CONSENSUS STATE");
    println!("{}", "=".repeat(70));

    for handle in cluster.handles() {
        let state = handle
            .state()
            .await
            .change_context(DemoError)
            .attach_with(|| format!("reading state of node {}", handle.node_id()))?;
        let show = |v: Option<String>| v.unwrap_or_else(|| "-".to_string());
        println!(
            "node {}: promised={} accepted={} value={} decided={}",
            handle.node_id(),
            show(state.promised_ballot.map(|b| b.to_string())),
            show(state.accepted_ballot.map(|b| b.to_string())),
            show(state.accepted_value.map(str::to_string)),
            show(state.decided_value.map(str::to_string)),
        );
    }

    println!("{}", "=".repeat(70));
    Ok(())
}

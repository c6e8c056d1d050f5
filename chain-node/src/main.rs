use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::json;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use chain_core::{Amount, Identity, PeerId};
use chain_ledger::{ClusterConfig, LedgerConfig, LedgerEngine};

mod cluster;

use cluster::LocalCluster;

#[derive(Parser)]
#[command(author, version, about = "Proof-of-stake ledger node")]
struct Cli {
    /// Emit logs as JSON lines
    #[arg(long, env = "CHAIN_JSON_LOGS", global = true, default_value_t = false)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an in-process cluster with a random exchange workload
    Simulate(SimulateArgs),
    /// Write a default ledger configuration file
    GenerateConfig {
        #[arg(short, long, default_value = "config/ledger.json")]
        path: PathBuf,
    },
    /// Create a node key, or print the public key of an existing one
    Keygen {
        #[arg(short, long, default_value = "keys/node.key")]
        path: PathBuf,
    },
}

#[derive(Debug, clap::Args)]
struct SimulateArgs {
    /// Ledger configuration file; overrides the sizing flags below
    #[arg(short, long, env = "CHAIN_CONFIG")]
    config: Option<PathBuf>,

    /// Number of nodes
    #[arg(long, env = "CHAIN_NODES", default_value_t = 5)]
    nodes: usize,

    /// Transactions per block
    #[arg(long, env = "CHAIN_CAPACITY", default_value_t = 5)]
    capacity: usize,

    /// Amount the distributor sends to every other node
    #[arg(long, default_value_t = 1000)]
    initial_amount: Amount,

    /// Initial stake of every node
    #[arg(long, default_value_t = 10)]
    stake: Amount,

    /// Number of random transactions after the distribution
    #[arg(long, default_value_t = 50)]
    transactions: usize,

    /// Time to let messages settle before reporting, in milliseconds
    #[arg(long, default_value_t = 500)]
    settle_ms: u64,

    /// Seed for the workload generator
    #[arg(long)]
    seed: Option<u64>,

    /// Write the generated cluster file here
    #[arg(long)]
    cluster_out: Option<PathBuf>,

    /// Print the full chain of the first node
    #[arg(long, default_value_t = false)]
    dump_chain: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.json_logs);

    match cli.command {
        Commands::Simulate(args) => simulate(args).await?,
        Commands::GenerateConfig { path } => generate_config(path)?,
        Commands::Keygen { path } => keygen(path)?,
    }

    Ok(())
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn simulate(args: SimulateArgs) -> Result<()> {
    let config = match &args.config {
        Some(path) => LedgerConfig::load_from_file(path)?,
        None => {
            let config = LedgerConfig::new(args.nodes, args.capacity)
                .with_initial_amount(args.initial_amount);
            config.validate()?;
            config
        }
    };
    if config.peer_count < 2 {
        bail!("a simulation needs at least two nodes");
    }

    let identities: Vec<Identity> = (0..config.peer_count).map(|_| Identity::generate()).collect();
    let snapshot = LocalCluster::genesis_snapshot(&identities, &config, args.stake);
    if let Some(path) = &args.cluster_out {
        ClusterConfig::from_snapshot(&snapshot).save_to_file(path)?;
        info!(?path, "wrote cluster file");
    }

    let cluster = LocalCluster::start(identities, snapshot, config.clone())?;
    let settle = Duration::from_millis(args.settle_ms);

    let mut funded = 0;
    for engine in cluster.engines() {
        funded += engine.initial_distribution()?;
    }
    info!("Initial distribution sent {} transactions", funded);
    tokio::time::sleep(settle).await;

    let seed = args.seed.unwrap_or_else(rand::random);
    info!("Running {} random transactions (seed {})", args.transactions, seed);
    run_workload(cluster.engines(), args.transactions, config.initial_amount, seed).await;
    tokio::time::sleep(settle).await;

    // nodes that fell behind catch up from the longest chain
    if let Some(longest) = cluster.longest_chain() {
        longest.broadcast_blockchain();
    }
    tokio::time::sleep(settle).await;

    let nodes: Vec<_> = cluster
        .engines()
        .iter()
        .map(|engine| {
            let balance = engine.balance();
            json!({
                "id": engine.local_id(),
                "balance": balance.balance,
                "stake": balance.stake,
                "chain_length": engine.chain_len(),
                "pending": engine.pool_len(),
                "inbox": engine.inbox().len(),
                "tip": engine.tip_hash().to_hex(),
            })
        })
        .collect();
    let mut report = json!({ "seed": seed, "nodes": nodes });
    if args.dump_chain {
        report["chain"] = serde_json::to_value(cluster.engines()[0].chain_dump())?;
        report["last_block"] = serde_json::to_value(cluster.engines()[0].last_block())?;
    }
    println!("{}", serde_json::to_string_pretty(&report)?);

    let handled = cluster.shutdown().await;
    info!("Cluster handled {} messages", handled);
    Ok(())
}

/// Every node sends its share of random exchanges and stake changes
async fn run_workload(
    engines: &[Arc<LedgerEngine>],
    transactions: usize,
    max_amount: Amount,
    seed: u64,
) {
    let count = engines.len();
    let tasks = engines.iter().enumerate().map(|(i, engine)| {
        let engine = engine.clone();
        let share = transactions / count + usize::from(i < transactions % count);
        tokio::spawn(async move {
            let mut rng = StdRng::seed_from_u64(seed.wrapping_add(i as u64));
            for _ in 0..share {
                let result = if rng.random_bool(0.1) {
                    engine.stake(rng.random_range(1..=20))
                } else {
                    let mut to = rng.random_range(0..count - 1);
                    if to >= i {
                        to += 1;
                    }
                    let amount = rng.random_range(1..=max_amount.max(10) / 10);
                    let message = rng
                        .random_bool(0.3)
                        .then(|| format!("hello from {}", engine.local_id()));
                    engine.transfer(&PeerId::indexed(to), amount, message)
                };
                if let Err(e) = result {
                    debug!("{} skipped a transaction: {}", engine.local_id(), e);
                }
                tokio::task::yield_now().await;
            }
        })
    });

    for joined in join_all(tasks).await {
        if let Err(e) = joined {
            tracing::warn!("Workload task failed: {}", e);
        }
    }
}

fn generate_config(path: PathBuf) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    LedgerConfig::default().save_to_file(&path)?;
    info!(?path, "wrote default configuration");
    Ok(())
}

fn keygen(path: PathBuf) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let identity = Identity::load_or_generate(&path)?;
    info!(?path, "node key ready");
    println!("{}", identity.public_key().to_hex());
    Ok(())
}

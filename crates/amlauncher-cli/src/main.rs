use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::Utc;
use clap::Parser;
use tokio::sync::mpsc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use amlauncher_core::domain::{
    AmAllocation, AppAttempt, ApplicationId, AttemptIdentity, ContainerId, NodeId, RemoteError,
    Resource,
};
use amlauncher_core::impls::{HmacTokenIssuer, InMemoryNodeManager, StaticEndpointResolver};
use amlauncher_core::{LauncherBuilder, LauncherConfig, LoggingConfig};

/// Drive the AM launcher against an in-memory node agent.
#[derive(Debug, Parser)]
#[command(name = "amlauncher", version)]
struct Cli {
    /// TOML config file. Defaults apply when omitted.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of application attempts to launch and clean up.
    #[arg(long, default_value_t = 3)]
    attempts: u32,

    /// Refuse this many start_container calls before the node agent recovers.
    #[arg(long, default_value_t = 0)]
    flaky_starts: usize,
}

fn init_tracing(logging: &LoggingConfig) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&logging.level));

    match logging.format.as_str() {
        "json" => tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init(),
        _ => tracing_subscriber::fmt().with_env_filter(filter).init(),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => LauncherConfig::load(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => LauncherConfig::default(),
    };
    init_tracing(&config.logging);

    let node_id = NodeId::new("localhost", 8041);
    let node = Arc::new(InMemoryNodeManager::new());
    node.fail_next_starts(
        (0..cli.flaky_starts).map(|_| RemoteError::ConnectionRefused(node_id.to_string())),
    )
    .await;
    let resolver = StaticEndpointResolver::new().with(node_id.clone(), node.clone());

    let (tx, mut outcomes) = mpsc::unbounded_channel();
    let launcher = LauncherBuilder::new(config)
        .resolver(Arc::new(resolver))
        .token_issuer(Arc::new(HmacTokenIssuer::random()))
        .outcomes(tx)
        .build()?;

    let cluster_ts = Utc::now().timestamp_millis();
    let attempts: Vec<Arc<AppAttempt>> = (1..=cli.attempts)
        .map(|seq| {
            let app = ApplicationId::new(cluster_ts, seq);
            let allocation = AmAllocation::new(
                ContainerId::new(app, 1, 1),
                node_id.clone(),
                Resource::new(1024, 1),
            )
            .with_command(["bin/appmaster", "--demo"]);
            Arc::new(AppAttempt::new(
                AttemptIdentity::new(app, 1),
                allocation,
                Utc::now(),
            ))
        })
        .collect();

    for attempt in &attempts {
        launcher.launch(Arc::clone(attempt))?;
    }
    for attempt in &attempts {
        launcher.cleanup(Arc::clone(attempt))?;
    }

    // One LAUNCH and one CLEANUP outcome per attempt.
    for _ in 0..attempts.len() * 2 {
        let Some(outcome) = outcomes.recv().await else {
            break;
        };
        println!("{}", serde_json::to_string(&outcome)?);
    }

    launcher.shutdown().await;
    let counts = launcher.counts();
    info!(start_calls = node.start_calls().await, "demo finished");
    println!("{}", serde_json::to_string_pretty(&counts)?);
    Ok(())
}

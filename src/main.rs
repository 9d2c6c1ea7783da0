//! Nodus - simulate cluster nodes and run scheduling scenarios

use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::signal::unix::{signal, SignalKind};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use nodus::client::{self, KubeInfo};
use nodus::config::{NodeConfig, PodConfig};
use nodus::dynamic::DynamicClient;
use nodus::fleet::Fleet;
use nodus::runner::ScenarioRunner;
use nodus::scenario::Scenario;

/// Simulate fleets of cluster nodes and test scheduling scenarios
#[derive(Parser, Debug)]
#[command(name = "nodus", version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a fleet of fake nodes until interrupted
    Fleet(FleetArgs),

    /// Run a scenario against the control plane
    Scenario(ScenarioArgs),
}

/// Connection options shared by both modes
#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Kubernetes API server URL
    #[arg(long, env = "NP_MASTER")]
    master: Option<String>,

    /// Kubernetes client config file
    #[arg(long, env = "NP_KCONFIG_PATH")]
    kubeconfig: Option<PathBuf>,

    /// Enable debug logs
    #[arg(long)]
    verbose: bool,
}

/// Fleet mode arguments
#[derive(Args, Debug)]
struct FleetArgs {
    /// Nodes config file
    #[arg(long)]
    nodes: PathBuf,

    #[command(flatten)]
    connection: ConnectionArgs,
}

/// Scenario mode arguments
#[derive(Args, Debug)]
struct ScenarioArgs {
    /// Scenario config file
    #[arg(long)]
    scenario: PathBuf,

    /// Nodes config file
    #[arg(long)]
    nodes: Option<PathBuf>,

    /// Pods config file
    #[arg(long)]
    pods: Option<PathBuf>,

    /// Namespace to use for tests
    #[arg(long, default_value = "default")]
    namespace: String,

    #[command(flatten)]
    connection: ConnectionArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let verbose = match &cli.command {
        Commands::Fleet(args) => args.connection.verbose,
        Commands::Scenario(args) => args.connection.verbose,
    };
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    match cli.command {
        Commands::Fleet(args) => run_fleet(args).await,
        Commands::Scenario(args) => run_scenario(args).await,
    }
}

/// Run fake nodes until an interrupt or terminate signal arrives.
async fn run_fleet(args: FleetArgs) -> anyhow::Result<()> {
    let node_config = NodeConfig::from_file(&args.nodes)
        .await
        .context("failed to read node config")?;

    let info = KubeInfo::new(args.connection.master, args.connection.kubeconfig);
    let general = client::general_client(&info)
        .await
        .context("failed to construct kubernetes client")?;
    let heartbeat = client::heartbeat_client(&info)
        .await
        .context("failed to construct heartbeat client")?;
    let events = client::event_client(&info)
        .await
        .context("failed to construct event client")?;

    tracing::info!("creating nodes");
    let mut fleet = Fleet::new(&node_config);
    fleet
        .start(&general, &heartbeat, &events)
        .await
        .context("failed to start nodes")?;

    tracing::info!(nodes = fleet.len(), "registered fake nodes, waiting for shutdown signal");
    wait_for_shutdown().await?;

    tracing::info!("shutting down (deleting fake nodes)");
    fleet.stop().await;
    Ok(())
}

/// Run one scenario to completion.
async fn run_scenario(args: ScenarioArgs) -> anyhow::Result<()> {
    let scenario = Scenario::from_file(&args.scenario)
        .await
        .context("failed to read scenario config")?;

    let node_config = match &args.nodes {
        Some(path) => Some(
            NodeConfig::from_file(path)
                .await
                .context("failed to read node config")?,
        ),
        None => None,
    };
    let pod_config = match &args.pods {
        Some(path) => Some(
            PodConfig::from_file(path)
                .await
                .context("failed to read pod config")?,
        ),
        None => None,
    };

    let info = KubeInfo::new(args.connection.master, args.connection.kubeconfig);
    let general = client::general_client(&info)
        .await
        .context("failed to construct kubernetes client")?;
    let heartbeat = client::heartbeat_client(&info)
        .await
        .context("failed to construct heartbeat client")?;
    let events = client::event_client(&info)
        .await
        .context("failed to construct event client")?;
    let dynamic = DynamicClient::new(general.clone(), args.namespace.clone());

    let mut runner = ScenarioRunner::new(
        general,
        heartbeat,
        events,
        args.namespace,
        node_config,
        pod_config,
        dynamic,
    );
    runner
        .run_scenario(&scenario)
        .await
        .context("failed to complete scenario")?;
    Ok(())
}

async fn wait_for_shutdown() -> anyhow::Result<()> {
    let mut terminate = signal(SignalKind::terminate())?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result?,
        _ = terminate.recv() => {}
    }
    Ok(())
}

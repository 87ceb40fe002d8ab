//! topokit - provision ephemeral test topologies.
//!
//! Selects a backend, provisions the topology's server groups, then its
//! gateway groups in front of the first running server, and prints a
//! per-node report for each step.
//!
//! # Usage
//!
//! ```bash
//! # Three servers on the local Docker engine, ports published on the host
//! topokit --topology topology.yml --expose-ports
//!
//! # Same topology on a swarm reached through two engines
//! topokit --provider swarm --client tcp://mgr-1:2375 --client tcp://mgr-2:2375 \
//!     --topology topology.yml
//!
//! # Addresses from providers/file/lab.yml, nothing launched
//! topokit --provider file:lab.yml --topology topology.yml
//! ```

mod config;

use anyhow::{Context, Result};
use clap::Parser;
use config::RunConfig;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use topokit_orchestrator::{build_provider, DockerConnector, NodeProvider, ProvisionReport};

/// CLI arguments for topokit.
#[derive(Parser, Debug)]
#[command(
    name = "topokit",
    about = "Provision ephemeral server and gateway topologies for test runs",
    version
)]
pub struct CliArgs {
    /// Path to the run configuration file.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Backend selector: docker, swarm, file[:hostfile] or dev[:endpoint].
    #[arg(short, long, value_name = "SELECTOR", env = "TOPOKIT_PROVIDER")]
    provider: Option<String>,

    /// Network to create and join (docker only).
    #[arg(short, long, value_name = "NAME")]
    network: Option<String>,

    /// Engine endpoint; repeat for several engines.
    #[arg(long, value_name = "URL", env = "DOCKER_HOST")]
    client: Vec<String>,

    /// Publish node ports on the host.
    #[arg(long)]
    expose_ports: bool,

    /// Provider options file, relative to the root.
    #[arg(short, long, value_name = "FILE")]
    options: Option<PathBuf>,

    /// Topology file.
    #[arg(short, long, value_name = "FILE")]
    topology: Option<PathBuf>,

    /// Root of the configuration tree.
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Join barrier timeout in seconds.
    #[arg(long, value_name = "SECS")]
    barrier_timeout_secs: Option<u64>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(short, long, value_name = "LEVEL")]
    log_level: Option<String>,

    /// Enable JSON log output.
    #[arg(long)]
    json_logs: bool,

    /// Print reports as JSON instead of tables.
    #[arg(long)]
    json_report: bool,

    /// Print the default configuration and exit.
    #[arg(long)]
    print_config: bool,
}

/// Initialize tracing/logging.
fn init_tracing(config: &config::LoggingConfig, json_logs: bool) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .context("Failed to parse log filter")?;

    let format = if json_logs {
        "json"
    } else {
        config.format.as_str()
    };

    match format {
        "json" => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json())
            .try_init(),
        "pretty" => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().pretty())
            .try_init(),
        _ => tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().compact())
            .try_init(),
    }
    .map_err(|e| anyhow::anyhow!("Failed to initialize tracing: {}", e))
}

fn print_report(report: &ProvisionReport, json: bool) -> Result<()> {
    if json {
        println!("{}", serde_json::to_string_pretty(report)?);
    } else {
        println!("{report}");
    }
    Ok(())
}

async fn run(config: &RunConfig, json_report: bool) -> Result<usize> {
    let settings = config.provider_settings();
    let topology = &config.topology;

    let provider = build_provider(&settings, topology, &DockerConnector::default())
        .await
        .with_context(|| format!("Failed to set up provider {:?}", settings.selector))?;

    let servers = provider
        .provision_servers(config.provider.options.as_deref(), &topology.servers)
        .await
        .context("Failed to provision servers")?;
    print_report(&servers, json_report)?;
    let mut problems = servers.problems().count();

    if !topology.gateways.is_empty() {
        let gateways = provider
            .provision_gateways(&topology.gateways, &servers.server_endpoints())
            .await
            .context("Failed to provision gateways")?;
        print_report(&gateways, json_report)?;
        problems += gateways.problems().count();
    }

    Ok(problems)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();

    if args.print_config {
        println!("{}", serde_yaml::to_string(&RunConfig::default())?);
        return Ok(());
    }

    let mut config = if let Some(ref config_path) = args.config {
        RunConfig::from_file(config_path)
            .with_context(|| format!("Failed to load config from {:?}", config_path))?
    } else {
        RunConfig::default()
    };

    config.merge_cli_args(&args)?;
    config.validate().context("Invalid configuration")?;

    init_tracing(&config.logging, args.json_logs)?;

    info!(
        version = env!("CARGO_PKG_VERSION"),
        selector = %config.provider.selector,
        servers = config.topology.server_count(),
        "topokit starting"
    );

    if config.topology.servers.is_empty() {
        warn!("Topology has no server groups");
    }

    match run(&config, args.json_report).await {
        Ok(0) => {
            info!("All nodes running");
            Ok(())
        }
        Ok(problems) => {
            error!(problems, "Some nodes are not running");
            anyhow::bail!("{} node(s) did not start", problems)
        }
        Err(e) => {
            error!(error = %e, "Provisioning failed");
            Err(e)
        }
    }
}

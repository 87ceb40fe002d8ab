//! Run configuration.
//!
//! A run is configured from an optional YAML file, then overridden by CLI
//! arguments. The topology may live inline under `topology:` or in its own
//! file passed with `--topology`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use topokit_core::Topology;
use topokit_orchestrator::ProviderSettings;

/// Run configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    /// Backend selection and engine access.
    pub provider: ProviderConfig,

    /// Requested topology.
    pub topology: Topology,

    /// Barrier and retry timing.
    pub timing: TimingConfig,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Backend selection and engine access.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProviderConfig {
    /// Backend selector, `kind[:argument]`.
    pub selector: String,

    /// Network to create and join.
    pub network: Option<String>,

    /// Engine endpoints; empty means the local engine.
    pub clients: Vec<String>,

    /// Whether to publish node ports on the host.
    pub expose_ports: bool,

    /// Provider options file, relative to the root.
    pub options: Option<PathBuf>,

    /// Root of the configuration tree.
    pub root: PathBuf,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            selector: "docker".to_string(),
            network: None,
            clients: Vec::new(),
            expose_ports: false,
            options: None,
            root: PathBuf::from("."),
        }
    }
}

/// Barrier and retry timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingConfig {
    /// Join barrier timeout in seconds.
    pub barrier_timeout_secs: u64,

    /// Join barrier poll interval in milliseconds.
    pub barrier_poll_ms: u64,

    /// Delay after the join barrier in seconds.
    pub settle_delay_secs: u64,

    /// Address lookups retried after the first one.
    pub address_retries: u32,

    /// Delay between address lookups in seconds.
    pub address_backoff_secs: u64,

    /// Attempt budget for cluster service creation.
    pub service_attempts: u32,
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            barrier_timeout_secs: 600,
            barrier_poll_ms: 1000,
            settle_delay_secs: 5,
            address_retries: 5,
            address_backoff_secs: 3,
            service_attempts: 30,
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    pub level: String,

    /// Log format (pretty, json, compact).
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "compact".to_string(),
        }
    }
}

impl RunConfig {
    /// Loads configuration from a YAML file.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Merges CLI arguments into the configuration.
    pub fn merge_cli_args(&mut self, args: &super::CliArgs) -> anyhow::Result<()> {
        if let Some(ref selector) = args.provider {
            self.provider.selector = selector.clone();
        }
        if let Some(ref network) = args.network {
            self.provider.network = Some(network.clone());
        }
        if !args.client.is_empty() {
            self.provider.clients = args.client.clone();
        }
        if args.expose_ports {
            self.provider.expose_ports = true;
        }
        if let Some(ref options) = args.options {
            self.provider.options = Some(options.clone());
        }
        if let Some(ref root) = args.root {
            self.provider.root = root.clone();
        }
        if let Some(secs) = args.barrier_timeout_secs {
            self.timing.barrier_timeout_secs = secs;
        }
        if let Some(ref level) = args.log_level {
            self.logging.level = level.clone();
        }
        if let Some(ref path) = args.topology {
            self.topology = load_topology(path)?;
        }
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> anyhow::Result<()> {
        let valid_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_levels.contains(&self.logging.level.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log level: {}", self.logging.level);
        }

        let valid_formats = ["pretty", "json", "compact"];
        if !valid_formats.contains(&self.logging.format.to_lowercase().as_str()) {
            anyhow::bail!("Invalid log format: {}", self.logging.format);
        }

        if self.timing.barrier_poll_ms == 0 {
            anyhow::bail!("Barrier poll interval must be positive");
        }

        let gateways = self.topology.gateway_groups();
        for group in self.topology.servers.iter().chain(&gateways) {
            group
                .validate()
                .with_context(|| format!("Invalid node group {:?}", group.name))?;
        }

        Ok(())
    }

    /// Returns the provider settings for this run.
    pub fn provider_settings(&self) -> ProviderSettings {
        let timing = &self.timing;
        let mut builder = ProviderSettings::builder()
            .selector(&self.provider.selector)
            .network(self.provider.network.clone().unwrap_or_default())
            .expose_ports(self.provider.expose_ports)
            .config_root(&self.provider.root)
            .barrier_timeout(Duration::from_secs(timing.barrier_timeout_secs))
            .barrier_poll_interval(Duration::from_millis(timing.barrier_poll_ms))
            .settle_delay(Duration::from_secs(timing.settle_delay_secs))
            .address_retries(
                timing.address_retries,
                Duration::from_secs(timing.address_backoff_secs),
            )
            .service_attempts(timing.service_attempts);

        for client in &self.provider.clients {
            builder = builder.endpoint(client);
        }
        builder.build()
    }
}

/// Loads a topology from a YAML file.
pub fn load_topology(path: &Path) -> anyhow::Result<Topology> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read topology from {:?}", path))?;
    let topology: Topology = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse topology in {:?}", path))?;
    Ok(topology)
}

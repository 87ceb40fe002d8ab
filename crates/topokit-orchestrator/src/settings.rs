//! Provider settings.
//!
//! Everything a provider needs beyond the topology itself: which backend to
//! use, how to reach it, where the configuration tree lives, and the timing
//! of the barrier and address retries.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::options::DEFAULT_OPTIONS_PATH;
use crate::registry::BarrierConfig;

/// Default backend selector.
pub const DEFAULT_SELECTOR: &str = "docker";

/// Settings for building and running a provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Backend selector, `kind[:argument]`.
    pub selector: String,

    /// Network to create and join (engine backends only).
    pub network: Option<String>,

    /// Engine endpoints; empty means the local engine.
    pub endpoints: Vec<String>,

    /// Whether to publish node ports on the host.
    pub expose_ports: bool,

    /// Root of the configuration tree; relative paths resolve against it.
    pub config_root: PathBuf,

    /// Interval between join barrier checks.
    pub barrier_poll_interval: Duration,

    /// Maximum time the join barrier waits.
    pub barrier_timeout: Duration,

    /// Delay after the join barrier before returning.
    pub settle_delay: Duration,

    /// Address lookups retried after the first one on the multi-host backend.
    pub address_retries: u32,

    /// Delay between address lookups.
    pub address_backoff: Duration,

    /// Attempt budget for cluster service creation.
    pub service_attempts: u32,
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            selector: DEFAULT_SELECTOR.to_string(),
            network: None,
            endpoints: Vec::new(),
            expose_ports: false,
            config_root: PathBuf::from("."),
            barrier_poll_interval: Duration::from_secs(1),
            barrier_timeout: Duration::from_secs(600),
            settle_delay: Duration::from_secs(5),
            address_retries: 5,
            address_backoff: Duration::from_secs(3),
            service_attempts: 30,
        }
    }
}

impl ProviderSettings {
    /// Creates a new settings builder.
    pub fn builder() -> ProviderSettingsBuilder {
        ProviderSettingsBuilder::default()
    }

    /// Resolves a path against the configuration root.
    pub fn resolve(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.config_root.join(path)
        }
    }

    /// Returns the options file to load, falling back to the default path.
    pub fn options_path(&self, requested: Option<&Path>) -> PathBuf {
        match requested {
            Some(path) if !path.as_os_str().is_empty() => self.resolve(path),
            _ => self.resolve(DEFAULT_OPTIONS_PATH),
        }
    }

    /// Returns the join barrier parameters.
    pub fn barrier(&self) -> BarrierConfig {
        BarrierConfig {
            poll_interval: self.barrier_poll_interval,
            timeout: self.barrier_timeout,
        }
    }
}

/// Builder for `ProviderSettings`.
#[derive(Debug, Default)]
pub struct ProviderSettingsBuilder {
    settings: ProviderSettings,
}

impl ProviderSettingsBuilder {
    /// Sets the backend selector.
    pub fn selector(mut self, selector: impl Into<String>) -> Self {
        self.settings.selector = selector.into();
        self
    }

    /// Sets the network; an empty name means none.
    pub fn network(mut self, network: impl Into<String>) -> Self {
        let network = network.into();
        self.settings.network = (!network.is_empty()).then_some(network);
        self
    }

    /// Adds an engine endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.settings.endpoints.push(endpoint.into());
        self
    }

    /// Sets whether node ports are published on the host.
    pub fn expose_ports(mut self, expose: bool) -> Self {
        self.settings.expose_ports = expose;
        self
    }

    /// Sets the configuration root.
    pub fn config_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.settings.config_root = root.into();
        self
    }

    /// Sets the join barrier poll interval.
    pub fn barrier_poll_interval(mut self, interval: Duration) -> Self {
        self.settings.barrier_poll_interval = interval;
        self
    }

    /// Sets the join barrier timeout.
    pub fn barrier_timeout(mut self, timeout: Duration) -> Self {
        self.settings.barrier_timeout = timeout;
        self
    }

    /// Sets the settle delay.
    pub fn settle_delay(mut self, delay: Duration) -> Self {
        self.settings.settle_delay = delay;
        self
    }

    /// Sets the address retry count and backoff.
    pub fn address_retries(mut self, retries: u32, backoff: Duration) -> Self {
        self.settings.address_retries = retries;
        self.settings.address_backoff = backoff;
        self
    }

    /// Sets the service creation attempt budget.
    pub fn service_attempts(mut self, attempts: u32) -> Self {
        self.settings.service_attempts = attempts;
        self
    }

    /// Builds the settings.
    pub fn build(self) -> ProviderSettings {
        self.settings
    }
}

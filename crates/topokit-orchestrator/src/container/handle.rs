//! Handles and inspection results returned by the container engine.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Name of the overlay network that carries cluster service traffic.
pub const INGRESS_NETWORK: &str = "ingress";

/// Handle to a launched container or service task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeHandle {
    /// Container ID assigned by the engine.
    pub id: String,

    /// Container name, without the engine's leading `/`.
    pub name: String,

    /// Engine host that runs the container, when the session spans several.
    pub host: Option<String>,
}

impl NodeHandle {
    /// Creates a handle for a container on the session's primary host.
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: strip_name(&name.into()).to_string(),
            host: None,
        }
    }

    /// Records the host that owns the container.
    pub fn on_host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// Returns the short container ID (first 12 characters).
    pub fn short_id(&self) -> &str {
        if self.id.len() > 12 {
            &self.id[..12]
        } else {
            &self.id
        }
    }
}

/// Summary entry from a container listing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerSummary {
    /// Container ID.
    pub id: String,

    /// Container names, as reported by the engine.
    pub names: Vec<String>,

    /// Image reference.
    pub image: String,

    /// Labels.
    pub labels: HashMap<String, String>,
}

impl ContainerSummary {
    /// Returns the first container name without the leading `/`.
    pub fn name(&self) -> &str {
        self.names.first().map(|n| strip_name(n)).unwrap_or_default()
    }
}

/// Details from inspecting a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerDetail {
    /// Container ID.
    pub id: String,

    /// Container name, without the leading `/`.
    pub name: String,

    /// Address on the default bridge network (empty if none).
    pub bridge_address: String,

    /// Address per attached network.
    pub network_addresses: HashMap<String, String>,
}

impl ContainerDetail {
    /// Returns the address on the cluster ingress network, if assigned.
    pub fn ingress_address(&self) -> Option<&str> {
        self.network_addresses
            .get(INGRESS_NETWORK)
            .map(String::as_str)
            .filter(|a| !a.is_empty())
    }
}

/// Filter for container listings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerFilter {
    /// Include stopped containers.
    pub all: bool,

    /// Match on container name.
    pub name: Option<String>,

    /// Match on `key=value` labels.
    pub labels: Vec<String>,
}

impl ContainerFilter {
    /// Matches containers by name.
    pub fn by_name(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    /// Matches containers, running or not, that carry `key=value`.
    pub fn by_label(key: &str, value: &str) -> Self {
        Self {
            all: true,
            labels: vec![format!("{key}={value}")],
            ..Default::default()
        }
    }

    /// Returns the engine filter map.
    pub fn to_filters(&self) -> HashMap<String, Vec<String>> {
        let mut filters = HashMap::new();
        if let Some(name) = &self.name {
            filters.insert("name".to_string(), vec![name.clone()]);
        }
        if !self.labels.is_empty() {
            filters.insert("label".to_string(), self.labels.clone());
        }
        filters
    }

    /// Returns true if `summary` passes this filter.
    ///
    /// Name matching is exact here; the engine's own name filter is a
    /// substring match, so callers re-check listings with this.
    pub fn matches(&self, summary: &ContainerSummary) -> bool {
        if let Some(name) = &self.name {
            if summary.name() != name {
                return false;
            }
        }
        self.labels.iter().all(|pair| {
            let (key, value) = pair.split_once('=').unwrap_or((pair.as_str(), ""));
            summary.labels.get(key).map(String::as_str) == Some(value)
        })
    }
}

/// Output from executing a command in a container.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecOutput {
    /// Standard output from the command.
    pub stdout: String,

    /// Standard error from the command.
    pub stderr: String,

    /// Exit code of the command (0 when detached).
    pub exit_code: i64,
}

impl ExecOutput {
    /// Creates a new exec output.
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>, exit_code: i64) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
        }
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

fn strip_name(name: &str) -> &str {
    name.strip_prefix('/').unwrap_or(name)
}

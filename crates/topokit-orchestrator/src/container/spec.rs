//! Launch and build specifications handed to the container manager.
//!
//! Providers describe what they want launched with these types; the
//! [`ContainerManager`](crate::manager::ContainerManager) turns them into
//! engine calls.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

use crate::build_args::BuildArg;
use crate::options::{ProviderOptions, Ulimit};
use topokit_core::NodeRole;

/// Label carrying the node role of every launched unit.
pub const LABEL_ROLE: &str = "topokit.role";

/// Label carrying the node name of every launched unit.
pub const LABEL_NODE: &str = "topokit.node";

/// Resource limits for a launched node.
///
/// A limit is only set when its configured value is non-zero; unset limits
/// fall back to the engine defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceLimits {
    /// CPU period in microseconds.
    pub cpu_period: Option<i64>,

    /// CPU quota in microseconds per period.
    pub cpu_quota: Option<i64>,

    /// Memory limit in bytes.
    pub memory_bytes: Option<i64>,

    /// Memory plus swap in bytes (-1 for unlimited).
    pub memory_swap_bytes: Option<i64>,

    /// Ulimits.
    pub ulimits: Vec<Ulimit>,
}

impl ResourceLimits {
    /// Builds limits from provider options.
    pub fn from_options(options: &ProviderOptions) -> Self {
        Self {
            cpu_period: (options.cpu_period > 0).then_some(options.cpu_period),
            cpu_quota: (options.cpu_quota > 0).then_some(options.cpu_quota),
            memory_bytes: (options.memory > 0).then_some(options.memory),
            memory_swap_bytes: (options.memory_swap != 0).then_some(options.memory_swap),
            ulimits: options.ulimits.clone(),
        }
    }

    /// Returns the CPU limit in NanoCPUs, for engines that take a single
    /// CPU figure instead of period and quota.
    pub fn nano_cpus(&self) -> Option<i64> {
        match (self.cpu_period, self.cpu_quota) {
            (Some(period), Some(quota)) => Some(quota.saturating_mul(1_000_000_000) / period),
            _ => None,
        }
    }

    /// Returns true if no limit is set.
    pub fn is_unbounded(&self) -> bool {
        *self == Self::default()
    }
}

/// A container port published on a host port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortBinding {
    /// Port inside the container.
    pub container_port: u16,

    /// Port on the host.
    pub host_port: u16,
}

impl PortBinding {
    /// Creates a TCP port binding.
    pub fn tcp(container_port: u16, host_port: u16) -> Self {
        Self {
            container_port,
            host_port,
        }
    }

    /// Returns the engine key for the container side, e.g. `8091/tcp`.
    pub fn container_key(&self) -> String {
        format!("{}/tcp", self.container_port)
    }
}

/// A bare container to run on a single engine host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerLaunch {
    /// Container name.
    pub name: String,

    /// Image reference.
    pub image: String,

    /// Labels to apply.
    pub labels: HashMap<String, String>,

    /// Resource limits.
    pub limits: ResourceLimits,

    /// Published ports.
    pub ports: Vec<PortBinding>,

    /// Legacy links to other containers.
    pub links: Vec<String>,

    /// Network to join instead of the default bridge.
    pub network: Option<String>,

    /// Whether the container runs privileged.
    pub privileged: bool,
}

impl ContainerLaunch {
    /// Creates a privileged launch for a node of the given role.
    pub fn new(name: impl Into<String>, image: impl Into<String>, role: NodeRole) -> Self {
        let name = name.into();
        Self {
            labels: node_labels(&name, role),
            name,
            image: image.into(),
            limits: ResourceLimits::default(),
            ports: Vec::new(),
            links: Vec::new(),
            network: None,
            privileged: true,
        }
    }

    /// Sets the resource limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Adds a port binding.
    pub fn port(mut self, binding: PortBinding) -> Self {
        self.ports.push(binding);
        self
    }

    /// Sets the links.
    pub fn links(mut self, links: Vec<String>) -> Self {
        self.links = links;
        self
    }

    /// Joins a named network.
    pub fn network(mut self, network: Option<String>) -> Self {
        self.network = network;
        self
    }
}

/// A replicated service to schedule on a multi-host cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceLaunch {
    /// Service name (the node name with `.` replaced by `-`).
    pub name: String,

    /// Node name the service backs.
    pub node_name: String,

    /// Image reference.
    pub image: String,

    /// Labels to apply to the service containers.
    pub labels: HashMap<String, String>,

    /// Resource limits.
    pub limits: ResourceLimits,

    /// Placement constraints.
    pub constraints: Vec<String>,

    /// Ports published through the cluster routing mesh.
    pub published_ports: Vec<PortBinding>,
}

impl ServiceLaunch {
    /// Creates a service launch for a node of the given role.
    pub fn new(node_name: impl Into<String>, image: impl Into<String>, role: NodeRole) -> Self {
        let node_name = node_name.into();
        Self {
            name: service_name(&node_name),
            labels: node_labels(&node_name, role),
            node_name,
            image: image.into(),
            limits: ResourceLimits::default(),
            constraints: Vec::new(),
            published_ports: Vec::new(),
        }
    }

    /// Sets the resource limits.
    pub fn limits(mut self, limits: ResourceLimits) -> Self {
        self.limits = limits;
        self
    }

    /// Pins the service to hosts labelled with `zone`.
    pub fn zone(mut self, zone: &str) -> Self {
        self.constraints.push(format!("node.labels.zone == {zone}"));
        self
    }

    /// Publishes a port.
    pub fn publish(mut self, binding: PortBinding) -> Self {
        self.published_ports.push(binding);
        self
    }
}

/// A request to build an image from a local context directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageBuild {
    /// Image tag to produce.
    pub name: String,

    /// Build context directory.
    pub context_dir: PathBuf,

    /// Build arguments, in order.
    pub build_args: Vec<BuildArg>,
}

/// Returns the cluster service name for a node name.
pub fn service_name(node_name: &str) -> String {
    node_name.replace('.', "-")
}

fn node_labels(name: &str, role: NodeRole) -> HashMap<String, String> {
    HashMap::from([
        (LABEL_ROLE.to_string(), role.name().to_string()),
        (LABEL_NODE.to_string(), name.to_string()),
    ])
}

//! Per-node provisioning reports.
//!
//! Every provisioning call returns one entry per requested node, so a run
//! that is only partly successful says so explicitly.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::provider::{ProviderKind, RestUrl, ServerEndpoint};
use topokit_core::NodeRole;

/// Final state of one requested node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum NodeStatus {
    /// The node is running.
    Running,

    /// The backend had no address for the node.
    Unmapped,

    /// The node's launch failed.
    Failed {
        /// Failure reason.
        reason: String,
    },

    /// The node had not registered when the join barrier gave up.
    Missing,
}

impl NodeStatus {
    /// Returns a short label for display.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Unmapped => "unmapped",
            Self::Failed { .. } => "failed",
            Self::Missing => "missing",
        }
    }
}

/// Report entry for one node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeReport {
    /// Node name.
    pub name: String,

    /// Node role.
    pub role: NodeRole,

    /// Final status.
    pub status: NodeStatus,

    /// Service URL, when the node is running.
    pub url: Option<RestUrl>,

    /// Upstream server, for gateways.
    pub upstream: Option<String>,
}

impl NodeReport {
    /// A running node reachable at `url`.
    pub fn running(name: impl Into<String>, role: NodeRole, url: RestUrl) -> Self {
        Self::with_status(name, role, NodeStatus::Running, Some(url))
    }

    /// A node the backend could not map to an address.
    pub fn unmapped(name: impl Into<String>, role: NodeRole) -> Self {
        Self::with_status(name, role, NodeStatus::Unmapped, None)
    }

    /// A node whose launch failed.
    pub fn failed(name: impl Into<String>, role: NodeRole, reason: impl Into<String>) -> Self {
        let status = NodeStatus::Failed {
            reason: reason.into(),
        };
        Self::with_status(name, role, status, None)
    }

    /// A node that never registered.
    pub fn missing(name: impl Into<String>, role: NodeRole) -> Self {
        Self::with_status(name, role, NodeStatus::Missing, None)
    }

    /// Sets the upstream server.
    pub fn with_upstream(mut self, upstream: impl Into<String>) -> Self {
        self.upstream = Some(upstream.into());
        self
    }

    /// Returns true if the node runs and its URL has a host.
    pub fn is_reachable(&self) -> bool {
        self.status == NodeStatus::Running
            && self.url.as_ref().map(RestUrl::is_reachable).unwrap_or(false)
    }

    fn with_status(
        name: impl Into<String>,
        role: NodeRole,
        status: NodeStatus,
        url: Option<RestUrl>,
    ) -> Self {
        Self {
            name: name.into(),
            role,
            status,
            url,
            upstream: None,
        }
    }
}

/// Result of one provisioning call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProvisionReport {
    /// Provider that ran the call.
    pub provider: ProviderKind,

    /// Role of the provisioned nodes.
    pub role: NodeRole,

    /// When the call started.
    pub started_at: DateTime<Utc>,

    /// When the call finished.
    pub finished_at: Option<DateTime<Utc>>,

    /// One entry per requested node, in request order.
    pub nodes: Vec<NodeReport>,
}

impl ProvisionReport {
    /// Starts a report.
    pub fn new(provider: ProviderKind, role: NodeRole) -> Self {
        Self {
            provider,
            role,
            started_at: Utc::now(),
            finished_at: None,
            nodes: Vec::new(),
        }
    }

    /// Appends a node entry.
    pub fn push(&mut self, node: NodeReport) {
        self.nodes.push(node);
    }

    /// Marks the report finished.
    pub fn finish(mut self) -> Self {
        self.finished_at = Some(Utc::now());
        self
    }

    /// Gets the entry for a node.
    pub fn node(&self, name: &str) -> Option<&NodeReport> {
        self.nodes.iter().find(|n| n.name == name)
    }

    /// Returns the number of running nodes.
    pub fn running_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| n.status == NodeStatus::Running)
            .count()
    }

    /// Returns the entries that did not end up running.
    pub fn problems(&self) -> impl Iterator<Item = &NodeReport> {
        self.nodes.iter().filter(|n| n.status != NodeStatus::Running)
    }

    /// Returns true if every requested node is running.
    pub fn is_complete(&self) -> bool {
        self.problems().next().is_none()
    }

    /// Returns the running servers in launch order.
    ///
    /// The first entry is the upstream for gateway provisioning.
    pub fn server_endpoints(&self) -> Vec<ServerEndpoint> {
        self.nodes
            .iter()
            .filter(|n| n.role == NodeRole::Server && n.status == NodeStatus::Running)
            .map(|n| ServerEndpoint::new(&n.name, NodeRole::Server.service_port()))
            .collect()
    }
}

impl fmt::Display for ProvisionReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} {}s: {}/{} running",
            self.provider,
            self.role,
            self.running_count(),
            self.nodes.len()
        )?;
        for node in &self.nodes {
            let url = node
                .url
                .as_ref()
                .filter(|u| u.is_reachable())
                .map(RestUrl::http)
                .unwrap_or_else(|| "-".to_string());
            write!(f, "  {:<24} {:<9} {}", node.name, node.status.label(), url)?;
            if let Some(upstream) = &node.upstream {
                write!(f, " -> {upstream}")?;
            }
            if let NodeStatus::Failed { reason } = &node.status {
                write!(f, " ({reason})")?;
            }
            writeln!(f)?;
        }
        Ok(())
    }
}

//! Node group specifications.
//!
//! Groups are decoded from the run's topology file and are read-only from
//! then on. A group describes `count` interchangeable nodes named after a
//! pattern such as `node_$`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::ops::Deref;

use crate::error::TopologyError;
use crate::naming::expand_name;

/// One logical group of identical nodes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeGroupSpec {
    /// Name pattern; `$` is replaced by the node's ordinal.
    pub name: String,

    /// Number of nodes in the group.
    #[serde(default)]
    pub count: u32,

    /// Ordinal offset; the first node is numbered `count_offset + 1`.
    #[serde(default, alias = "countoffset")]
    pub count_offset: u32,

    /// Service roles keyed by expanded node name.
    #[serde(default, alias = "services")]
    pub node_services: HashMap<String, Vec<String>>,
}

impl NodeGroupSpec {
    /// Creates a group with no offset and no service assignments.
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self {
            name: name.into(),
            count,
            ..Default::default()
        }
    }

    /// Sets the ordinal offset.
    pub fn with_offset(mut self, offset: u32) -> Self {
        self.count_offset = offset;
        self
    }

    /// Assigns service roles to one expanded node name.
    pub fn with_services<I, S>(mut self, node: impl Into<String>, services: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.node_services
            .insert(node.into(), services.into_iter().map(Into::into).collect());
        self
    }

    /// Returns the expanded node names of this group, in order.
    pub fn names(&self) -> Vec<String> {
        expand_name(&self.name, self.count, self.count_offset)
    }

    /// Returns the service roles assigned to `node`.
    pub fn services_for(&self, node: &str) -> &[String] {
        self.node_services
            .get(node)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Checks the group is well formed.
    pub fn validate(&self) -> Result<(), TopologyError> {
        if self.name.trim().is_empty() {
            return Err(TopologyError::invalid_group(&self.name, "empty name pattern"));
        }
        Ok(())
    }
}

/// A group of gateway nodes.
///
/// Same shape as [`NodeGroupSpec`], but gateways depend on at least one
/// server already running.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GatewaySpec(pub NodeGroupSpec);

impl GatewaySpec {
    /// Creates a gateway group with no offset.
    pub fn new(name: impl Into<String>, count: u32) -> Self {
        Self(NodeGroupSpec::new(name, count))
    }
}

impl Deref for GatewaySpec {
    type Target = NodeGroupSpec;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl From<NodeGroupSpec> for GatewaySpec {
    fn from(group: NodeGroupSpec) -> Self {
        Self(group)
    }
}

/// A requested topology: server groups plus the gateways that depend on them.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Topology {
    /// Server groups, in declaration order.
    pub servers: Vec<NodeGroupSpec>,

    /// Gateway groups, in declaration order.
    #[serde(alias = "sync_gateways")]
    pub gateways: Vec<GatewaySpec>,
}

impl Topology {
    /// Creates a topology of server groups only.
    pub fn with_servers(servers: Vec<NodeGroupSpec>) -> Self {
        Self {
            servers,
            gateways: Vec::new(),
        }
    }

    /// Returns the gateway groups as plain node groups.
    pub fn gateway_groups(&self) -> Vec<NodeGroupSpec> {
        self.gateways.iter().map(|g| g.0.clone()).collect()
    }

    /// Returns the total number of server nodes requested.
    pub fn server_count(&self) -> usize {
        self.servers.iter().map(|g| g.count as usize).sum()
    }
}

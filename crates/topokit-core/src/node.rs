//! Node roles and resolved per-node assignments.
//!
//! An [`ExpandedNode`] is what a node group turns into once its name pattern
//! has been expanded: one concrete name, its position in the run, and the
//! service roles assigned to it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The role a provisioned node plays in the topology.
///
/// # Examples
///
/// ```
/// use topokit_core::NodeRole;
///
/// assert_eq!(NodeRole::Server.name(), "server");
/// assert_eq!(NodeRole::Gateway.service_port(), 4984);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeRole {
    /// A database server node.
    Server,

    /// A companion gateway node that talks to a server upstream.
    Gateway,
}

impl NodeRole {
    /// Returns the name of this role.
    pub const fn name(self) -> &'static str {
        match self {
            Self::Server => "server",
            Self::Gateway => "gateway",
        }
    }

    /// Returns the port the node's primary service listens on.
    pub const fn service_port(self) -> u16 {
        match self {
            Self::Server => 8091,
            Self::Gateway => 4984,
        }
    }
}

impl fmt::Display for NodeRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A single node produced by expanding a group pattern.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpandedNode {
    /// Concrete node name.
    pub name: String,

    /// Position of this node across every group of the call (0-based).
    pub global_index: usize,

    /// Index of the group this node came from.
    pub group_index: usize,

    /// Service roles assigned to this node, in declaration order.
    pub services: Vec<String>,
}

impl ExpandedNode {
    /// Returns the first service role, if any.
    ///
    /// The multi-host backend uses this as the node's placement zone.
    pub fn first_service(&self) -> Option<&str> {
        self.services.first().map(String::as_str)
    }
}

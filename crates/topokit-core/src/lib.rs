//! Core topology types for topokit.
//!
//! This crate holds the pure data that describes a requested test topology
//! (node groups, gateway groups, per-node service assignments) and the name
//! expander that turns a group pattern into concrete node names. Nothing in
//! here talks to a container engine.
//!
//! # Example
//!
//! ```
//! use topokit_core::{expand_groups, NodeGroupSpec};
//!
//! let groups = vec![NodeGroupSpec::new("node_$", 3)];
//! let nodes = expand_groups(&groups).unwrap();
//!
//! let names: Vec<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
//! assert_eq!(names, vec!["node_1", "node_2", "node_3"]);
//! ```

#![warn(missing_docs)]

pub mod error;
pub mod naming;
pub mod node;
pub mod topology;

pub use error::TopologyError;
pub use naming::{expand_groups, expand_groups_from, expand_name, NAME_PLACEHOLDER};
pub use node::{ExpandedNode, NodeRole};
pub use topology::{GatewaySpec, NodeGroupSpec, Topology};

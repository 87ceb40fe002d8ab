//! Provisioning of ephemeral test topologies.
//!
//! This crate turns a requested topology (server groups plus gateway groups)
//! into running nodes on one of several interchangeable backends, and
//! resolves where each node can be reached for the rest of the test run.
//!
//! # Overview
//!
//! - **Provider selection**: a `kind[:argument]` selector picks the backend
//!   once per run
//! - **Images**: node images are built from local contexts when absent
//! - **Launch**: containers are launched one by one on a single engine host,
//!   or as concurrent cluster services behind a join barrier
//! - **Addressing**: node addresses are resolved through an active-node
//!   registry, with bounded retries on the cluster backend
//! - **Reporting**: every provisioning call returns a per-node report
//!
//! # Architecture
//!
//! - [`provider`]: the [`Provider`] variants and the [`NodeProvider`] trait
//! - [`factory`]: selector parsing and provider construction
//! - [`manager`]: the [`ContainerManager`] seam and its bollard implementation
//! - [`container`]: launch specifications and engine handles
//! - [`registry`]: the active-node registry and join barrier
//! - [`images`] and [`build_args`]: image naming and build arguments
//! - [`options`] and [`settings`]: provider options and run settings
//! - [`report`]: provisioning reports
//!
//! # Example
//!
//! ```ignore
//! use topokit_orchestrator::{build_provider, DockerConnector, NodeProvider, ProviderSettings};
//! use topokit_core::{NodeGroupSpec, Topology};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let topology = Topology::with_servers(vec![NodeGroupSpec::new("node_$", 3)]);
//!     let settings = ProviderSettings::builder()
//!         .selector("docker")
//!         .expose_ports(true)
//!         .build();
//!
//!     let provider = build_provider(&settings, &topology, &DockerConnector::default()).await?;
//!     let servers = provider.provision_servers(None, &topology.servers).await?;
//!     println!("{servers}");
//!
//!     let url = provider.rest_url("node_1").await?;
//!     println!("node_1 at {}", url.http());
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(rustdoc::missing_crate_level_docs)]

pub mod build_args;
pub mod container;
pub mod error;
pub mod factory;
pub mod images;
pub mod manager;
pub mod options;
pub mod provider;
pub mod registry;
pub mod report;
pub mod settings;

#[cfg(test)]
mod testing;

// Re-export commonly used types at the crate root
pub use error::{ProvisionError, Result};
pub use factory::{build_provider, DockerConnector, Selector, SessionConnector};
pub use manager::{ContainerManager, DockerSession, DockerSessionConfig, SessionKind};
pub use options::{OsFamily, ProviderOptions};
pub use provider::{
    AddressResolution, NodeProvider, Provider, ProviderKind, RestUrl, ServerEndpoint,
};
pub use registry::{ActiveNodeRegistry, BarrierConfig, BarrierOutcome};
pub use report::{NodeReport, NodeStatus, ProvisionReport};
pub use settings::ProviderSettings;

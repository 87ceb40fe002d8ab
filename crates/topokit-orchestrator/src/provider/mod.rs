//! Topology providers.
//!
//! A provider decides what backs each requested node and records where it
//! can be reached. There is one provider per backend:
//!
//! - [`StaticFileProvider`]: addresses read from a host file
//! - [`DevClusterProvider`]: a local multi-node install on one endpoint
//! - [`SingleHostProvider`]: containers on one engine host
//! - [`MultiHostProvider`]: services on an engine cluster
//!
//! [`Provider`] is the closed set of these, built once per run by
//! [`build_provider`](crate::factory::build_provider).

mod address;
mod dev_cluster;
mod multi_host;
mod session;
mod single_host;
mod static_file;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;

use crate::error::{ProvisionError, Result};
use crate::report::ProvisionReport;
use topokit_core::{GatewaySpec, NodeGroupSpec};

pub use address::{AddressResolution, RestUrl, ServerEndpoint};
pub use dev_cluster::{DevClusterProvider, DEFAULT_DEV_ENDPOINT, DEV_BASE_PORT};
pub use multi_host::{MultiHostProvider, SINGLE_HOST_ZONE};
pub use session::EngineSession;
pub use single_host::{SingleHostProvider, GATEWAY_ENTRYPOINT};
pub use static_file::{StaticFileProvider, DEFAULT_HOST_FILE, HOST_FILE_DIR};

/// Backend kind of a provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    /// Addresses from a static host file.
    File,

    /// A local development cluster.
    Dev,

    /// A single engine host.
    Docker,

    /// An engine cluster.
    Swarm,
}

impl ProviderKind {
    /// Returns the selector name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Dev => "dev",
            Self::Docker => "docker",
            Self::Swarm => "swarm",
        }
    }

    /// Returns true if this backend can provision gateways.
    pub const fn supports_gateways(self) -> bool {
        matches!(self, Self::Docker)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Operations every provider implements.
#[async_trait]
pub trait NodeProvider: Send + Sync {
    /// Provisions server nodes for `groups`.
    ///
    /// `options_path` selects the provider options file for engine
    /// backends; `None` uses the default path.
    async fn provision_servers(
        &self,
        options_path: Option<&Path>,
        groups: &[NodeGroupSpec],
    ) -> Result<ProvisionReport>;

    /// Provisions gateway nodes in front of running servers.
    ///
    /// The first entry of `upstream` is the server every gateway talks to.
    async fn provision_gateways(
        &self,
        gateways: &[GatewaySpec],
        upstream: &[ServerEndpoint],
    ) -> Result<ProvisionReport>;

    /// Resolves a node's address.
    async fn host_address(&self, name: &str) -> Result<AddressResolution>;

    /// Resolves a node's REST endpoint.
    ///
    /// An unresolved node yields a URL with an empty host rather than an
    /// error.
    async fn rest_url(&self, name: &str) -> Result<RestUrl>;

    /// Returns the backend kind.
    fn kind(&self) -> ProviderKind;
}

/// A provider for one of the supported backends.
pub enum Provider {
    /// Static host file.
    StaticFile(StaticFileProvider),

    /// Local development cluster.
    DevCluster(DevClusterProvider),

    /// Single engine host.
    SingleHost(SingleHostProvider),

    /// Engine cluster.
    MultiHost(MultiHostProvider),
}

impl Provider {
    fn variant(&self) -> &dyn NodeProvider {
        match self {
            Self::StaticFile(p) => p,
            Self::DevCluster(p) => p,
            Self::SingleHost(p) => p,
            Self::MultiHost(p) => p,
        }
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Provider").field(&self.kind()).finish()
    }
}

#[async_trait]
impl NodeProvider for Provider {
    async fn provision_servers(
        &self,
        options_path: Option<&Path>,
        groups: &[NodeGroupSpec],
    ) -> Result<ProvisionReport> {
        self.variant().provision_servers(options_path, groups).await
    }

    async fn provision_gateways(
        &self,
        gateways: &[GatewaySpec],
        upstream: &[ServerEndpoint],
    ) -> Result<ProvisionReport> {
        self.variant().provision_gateways(gateways, upstream).await
    }

    async fn host_address(&self, name: &str) -> Result<AddressResolution> {
        self.variant().host_address(name).await
    }

    async fn rest_url(&self, name: &str) -> Result<RestUrl> {
        self.variant().rest_url(name).await
    }

    fn kind(&self) -> ProviderKind {
        self.variant().kind()
    }
}

/// Returns `base + index` as a port.
pub(crate) fn port_at(base: u16, index: usize) -> Result<u16> {
    u16::try_from(index)
        .ok()
        .and_then(|i| base.checked_add(i))
        .ok_or_else(|| {
            ProvisionError::configuration(format!("port {base} + {index} is out of range"))
        })
}

/// Rejects a non-empty gateway list on backends without gateway support.
pub(crate) fn reject_gateways(kind: ProviderKind, gateways: &[GatewaySpec]) -> Result<()> {
    if !gateways.is_empty() {
        return Err(ProvisionError::gateways_unsupported(kind.as_str()));
    }
    Ok(())
}

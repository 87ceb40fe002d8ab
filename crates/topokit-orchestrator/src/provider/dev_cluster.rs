//! Local development cluster provider.
//!
//! Models a multi-node install already running on one endpoint, where nodes
//! differ only by port: the i-th node of the run listens on `9000 + i`.

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::Path;
use tokio::sync::RwLock;
use tracing::info;

use super::{
    port_at, reject_gateways, AddressResolution, NodeProvider, ProviderKind, RestUrl,
    ServerEndpoint,
};
use crate::error::Result;
use crate::report::{NodeReport, ProvisionReport};
use topokit_core::{expand_groups, GatewaySpec, NodeGroupSpec, NodeRole};

/// Endpoint used when the selector names none.
pub const DEFAULT_DEV_ENDPOINT: &str = "127.0.0.1";

/// Port of the first node.
pub const DEV_BASE_PORT: u16 = 9000;

/// Provider for a local development cluster.
#[derive(Debug)]
pub struct DevClusterProvider {
    endpoint: String,
    servers: Vec<NodeGroupSpec>,
    assigned: RwLock<HashMap<String, RestUrl>>,
}

impl DevClusterProvider {
    /// Creates a provider for `endpoint` serving the run's server groups.
    pub fn new(endpoint: impl Into<String>, servers: Vec<NodeGroupSpec>) -> Self {
        Self {
            endpoint: endpoint.into(),
            servers,
            assigned: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the cluster endpoint.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the URL assigned to `name` by the last provisioning call.
    pub async fn assigned(&self, name: &str) -> Option<RestUrl> {
        self.assigned.read().await.get(name).cloned()
    }

    // Position of `name` across the run's server groups, first match wins.
    fn position_of(&self, name: &str) -> Option<usize> {
        self.servers
            .iter()
            .flat_map(|group| group.names())
            .position(|candidate| candidate == name)
    }
}

#[async_trait]
impl NodeProvider for DevClusterProvider {
    async fn provision_servers(
        &self,
        _options_path: Option<&Path>,
        groups: &[NodeGroupSpec],
    ) -> Result<ProvisionReport> {
        let nodes = expand_groups(groups)?;
        let mut report = ProvisionReport::new(self.kind(), NodeRole::Server);
        let mut assigned = self.assigned.write().await;

        for node in nodes {
            let url = RestUrl::new(&self.endpoint, port_at(DEV_BASE_PORT, node.global_index)?);
            info!(node = %node.name, url = %url.http(), role = "server", "start couchbase");
            assigned.insert(node.name.clone(), url.clone());
            report.push(NodeReport::running(node.name, NodeRole::Server, url));
        }

        Ok(report.finish())
    }

    async fn provision_gateways(
        &self,
        gateways: &[GatewaySpec],
        _upstream: &[ServerEndpoint],
    ) -> Result<ProvisionReport> {
        reject_gateways(self.kind(), gateways)?;
        Ok(ProvisionReport::new(self.kind(), NodeRole::Gateway).finish())
    }

    async fn host_address(&self, name: &str) -> Result<AddressResolution> {
        Ok(match self.position_of(name) {
            Some(_) => AddressResolution::Resolved(self.endpoint.clone()),
            None => AddressResolution::Unresolvable,
        })
    }

    async fn rest_url(&self, name: &str) -> Result<RestUrl> {
        match self.position_of(name) {
            Some(index) => Ok(RestUrl::new(&self.endpoint, port_at(DEV_BASE_PORT, index)?)),
            None => Ok(RestUrl::unresolved(DEV_BASE_PORT)),
        }
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Dev
    }
}

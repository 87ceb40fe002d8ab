//! Engine cluster provider.
//!
//! Every node becomes a cluster service, launched concurrently with one
//! task per node. The call returns once every node has registered or
//! failed, or the join barrier times out.

use async_trait::async_trait;
use futures::future::join_all;
use std::path::Path;
use tracing::{debug, error, info, warn};

use super::{
    port_at, reject_gateways, AddressResolution, EngineSession, NodeProvider, ProviderKind,
    RestUrl, ServerEndpoint,
};
use crate::container::{
    ContainerFilter, NodeHandle, PortBinding, ResourceLimits, ServiceLaunch, LABEL_NODE,
};
use crate::error::{ProvisionError, Result};
use crate::registry::BarrierOutcome;
use crate::report::{NodeReport, ProvisionReport};
use topokit_core::{expand_groups_from, ExpandedNode, GatewaySpec, NodeGroupSpec, NodeRole};

/// Placement zone used when the cluster has a single host.
pub const SINGLE_HOST_ZONE: &str = "client";

const SERVER_PORT: u16 = NodeRole::Server.service_port();

/// Provider for an engine cluster.
#[derive(Clone)]
pub struct MultiHostProvider {
    session: EngineSession,
}

impl MultiHostProvider {
    /// Creates a provider over `session`.
    pub fn new(session: EngineSession) -> Self {
        Self { session }
    }

    /// Returns the engine session.
    pub fn session(&self) -> &EngineSession {
        &self.session
    }

    /// Returns the placement zone for `node`.
    ///
    /// The zone is the node's first service, or [`SINGLE_HOST_ZONE`] when
    /// the cluster has one host.
    pub fn zone_for(&self, node: &ExpandedNode) -> String {
        if self.session.manager().participant_count() == 1 {
            return SINGLE_HOST_ZONE.to_string();
        }
        match node.first_service() {
            Some(zone) => zone.to_string(),
            None => {
                warn!(node = %node.name, zone = SINGLE_HOST_ZONE, "No service assigned, using default zone");
                SINGLE_HOST_ZONE.to_string()
            }
        }
    }

    fn service_for(
        &self,
        node: &ExpandedNode,
        image: &str,
        limits: &ResourceLimits,
    ) -> Result<ServiceLaunch> {
        let mut launch = ServiceLaunch::new(&node.name, image, NodeRole::Server)
            .limits(limits.clone())
            .zone(&self.zone_for(node));
        if self.session.expose_ports() {
            let published = port_at(SERVER_PORT, node.global_index)?;
            launch = launch.publish(PortBinding::tcp(SERVER_PORT, published));
        }
        Ok(launch)
    }

    // Launches one service in the background. The outcome lands in the
    // registry either way, so the barrier never waits on a failed node.
    fn spawn_launch(&self, launch: ServiceLaunch) {
        let session = self.session.clone();
        let attempts = session.settings().service_attempts;

        tokio::spawn(async move {
            let node = launch.node_name.clone();
            match session.manager().run_service(&launch, attempts).await {
                Ok(handle) => {
                    debug!(
                        node = %node,
                        container = %handle.short_id(),
                        host = ?handle.host,
                        "Service task running"
                    );
                    session.registry().register(node, handle).await;
                }
                Err(e) => {
                    error!(node = %node, service = %launch.name, error = %e, "Failed to launch service");
                    session.registry().mark_failed(node, e.to_string()).await;
                }
            }
        });
    }

    async fn node_report(&self, node: &ExpandedNode, outcome: &BarrierOutcome) -> NodeReport {
        if let Some(reason) = outcome.failed.get(&node.name) {
            return NodeReport::failed(&node.name, NodeRole::Server, reason.clone());
        }
        if outcome.missing.contains(&node.name) {
            return NodeReport::missing(&node.name, NodeRole::Server);
        }

        let url = match self.rest_url(&node.name).await {
            Ok(url) => url,
            Err(e) => {
                warn!(node = %node.name, error = %e, "Address lookup failed");
                RestUrl::unresolved(SERVER_PORT)
            }
        };
        if !url.is_reachable() {
            warn!(node = %node.name, "No ingress address after retries");
            return NodeReport::unmapped(&node.name, NodeRole::Server);
        }

        info!(node = %node.name, url = %url.http(), role = "server", "start couchbase");
        NodeReport::running(&node.name, NodeRole::Server, url)
    }

    // Registered handle, or the container labelled with the node name on
    // whichever host runs it.
    async fn lookup(&self, name: &str) -> Result<Option<NodeHandle>> {
        if let Some(handle) = self.session.registry().get(name).await {
            return Ok(Some(handle));
        }
        let found = self
            .session
            .manager()
            .locate_containers(&ContainerFilter::by_label(LABEL_NODE, name))
            .await?;
        Ok(found.into_iter().next())
    }

    // Transient engine errors count as "not ready" so the caller retries.
    async fn resolve_once(&self, name: &str) -> Result<AddressResolution> {
        match self.host_address(name).await {
            Err(e) if e.is_retryable() => {
                debug!(node = %name, error = %e, "Address lookup failed, retrying");
                Ok(AddressResolution::NotReady)
            }
            other => other,
        }
    }
}

#[async_trait]
impl NodeProvider for MultiHostProvider {
    async fn provision_servers(
        &self,
        options_path: Option<&Path>,
        groups: &[NodeGroupSpec],
    ) -> Result<ProvisionReport> {
        let session = &self.session;
        let settings = session.settings();
        let options = session.load_options(options_path)?;
        let offset = session.existing_server_count().await?;
        let nodes = expand_groups_from(groups, offset)?;
        let limits = ResourceLimits::from_options(&options);

        let image = session
            .images()
            .ensure(session.manager(), NodeRole::Server, &options)
            .await;

        let launches = nodes
            .iter()
            .map(|node| self.service_for(node, &image, &limits))
            .collect::<Result<Vec<_>>>()?;

        info!(
            nodes = nodes.len(),
            offset,
            hosts = session.manager().participant_count(),
            image = %image,
            "Launching services"
        );
        for launch in launches {
            self.spawn_launch(launch);
        }

        let expected: Vec<String> = nodes.iter().map(|n| n.name.clone()).collect();
        let outcome = session.registry().wait_for(&expected, &settings.barrier()).await;
        if !nodes.is_empty() {
            tokio::time::sleep(settings.settle_delay).await;
        }

        let entries = join_all(nodes.iter().map(|node| self.node_report(node, &outcome))).await;
        let mut report = ProvisionReport::new(self.kind(), NodeRole::Server);
        for entry in entries {
            report.push(entry);
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
        let Some(handle) = self.lookup(name).await? else {
            return Ok(AddressResolution::Unresolvable);
        };

        let client = self.session.manager().client_for_handle(&handle);
        let detail = match client.inspect_container(&handle.id).await {
            Ok(detail) => detail,
            Err(ProvisionError::ContainerNotFound(_)) => {
                debug!(node = %name, host = %client.host(), "Container not on owning host");
                return Ok(AddressResolution::Unresolvable);
            }
            Err(e) => return Err(e),
        };

        Ok(match detail.ingress_address() {
            Some(address) => AddressResolution::Resolved(address.to_string()),
            None => AddressResolution::NotReady,
        })
    }

    async fn rest_url(&self, name: &str) -> Result<RestUrl> {
        let settings = self.session.settings();
        let mut resolution = self.resolve_once(name).await?;
        let mut retries = 0;

        while resolution.is_retryable() && retries < settings.address_retries {
            retries += 1;
            debug!(node = %name, attempt = retries, "Ingress address not assigned yet");
            tokio::time::sleep(settings.address_backoff).await;
            resolution = self.resolve_once(name).await?;
        }

        Ok(resolution.into_rest_url(SERVER_PORT))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Swarm
    }
}

//! Single engine host provider.
//!
//! Nodes are plain containers launched one after another. Host ports start
//! at `8091 + n`, where `n` is the number of server containers already on
//! the host, so a second run next to a live one does not collide.

use async_trait::async_trait;
use std::path::Path;
use tracing::{debug, error, info, warn};

use super::{
    port_at, AddressResolution, EngineSession, NodeProvider, ProviderKind, RestUrl,
    ServerEndpoint,
};
use crate::container::{ContainerFilter, ContainerLaunch, NodeHandle, PortBinding, ResourceLimits};
use crate::error::{ProvisionError, Result};
use crate::options::OsFamily;
use crate::report::{NodeReport, ProvisionReport};
use topokit_core::{expand_groups, expand_groups_from, GatewaySpec, NodeGroupSpec, NodeRole};

/// Bootstrap command run inside every gateway container.
pub const GATEWAY_ENTRYPOINT: &str = "./entrypoint.sh";

const SERVER_PORT: u16 = NodeRole::Server.service_port();

/// Provider for a single engine host.
#[derive(Clone)]
pub struct SingleHostProvider {
    session: EngineSession,
}

impl SingleHostProvider {
    /// Creates a provider over `session`.
    pub fn new(session: EngineSession) -> Self {
        Self { session }
    }

    /// Returns the engine session.
    pub fn session(&self) -> &EngineSession {
        &self.session
    }

    // Registered handle, or the container of that exact name on the host.
    async fn lookup(&self, name: &str) -> Result<Option<NodeHandle>> {
        if let Some(handle) = self.session.registry().get(name).await {
            return Ok(Some(handle));
        }
        let found = self
            .session
            .manager()
            .list_containers(&ContainerFilter::by_name(name))
            .await?;
        Ok(found.first().map(|s| NodeHandle::new(&s.id, s.name())))
    }

    async fn url_or_unresolved(&self, name: &str) -> RestUrl {
        match self.rest_url(name).await {
            Ok(url) => url,
            Err(e) => {
                warn!(node = %name, error = %e, "Address lookup failed");
                RestUrl::unresolved(SERVER_PORT)
            }
        }
    }

    async fn link_pairs(&self) -> Vec<String> {
        if self.session.network().is_some() {
            return Vec::new();
        }
        self.session
            .registry()
            .names()
            .await
            .into_iter()
            .map(|name| format!("{name}:{name}"))
            .collect()
    }
}

#[async_trait]
impl NodeProvider for SingleHostProvider {
    async fn provision_servers(
        &self,
        options_path: Option<&Path>,
        groups: &[NodeGroupSpec],
    ) -> Result<ProvisionReport> {
        let session = &self.session;
        let options = session.load_options(options_path)?;
        let offset = session.existing_server_count().await?;
        let nodes = expand_groups_from(groups, offset)?;
        let limits = ResourceLimits::from_options(&options);

        let image = session
            .images()
            .ensure(session.manager(), NodeRole::Server, &options)
            .await;

        debug!(offset, nodes = nodes.len(), image = %image, "Provisioning servers");
        let mut report = ProvisionReport::new(self.kind(), NodeRole::Server);

        for node in &nodes {
            let host_port = port_at(SERVER_PORT, node.global_index)?;
            let mut launch = ContainerLaunch::new(&node.name, &image, NodeRole::Server)
                .limits(limits.clone())
                .network(session.network().map(str::to_string));
            if session.expose_ports() {
                launch = launch.port(PortBinding::tcp(SERVER_PORT, host_port));
            }

            match session.manager().run_container(&launch).await {
                Ok(handle) => {
                    session
                        .registry()
                        .register(handle.name.clone(), handle.clone())
                        .await;
                    let url = self.url_or_unresolved(&handle.name).await;
                    if !url.is_reachable() {
                        warn!(node = %node.name, "Container has no address");
                        report.push(NodeReport::unmapped(&node.name, NodeRole::Server));
                        continue;
                    }
                    info!(
                        node = %handle.name,
                        url = %url.http(),
                        host_port,
                        role = "server",
                        "start couchbase"
                    );
                    report.push(NodeReport::running(&node.name, NodeRole::Server, url));
                }
                Err(e) => {
                    error!(node = %node.name, error = %e, "Failed to launch server");
                    session.registry().mark_failed(&node.name, e.to_string()).await;
                    report.push(NodeReport::failed(&node.name, NodeRole::Server, e.to_string()));
                }
            }
        }

        Ok(report.finish())
    }

    async fn provision_gateways(
        &self,
        gateways: &[GatewaySpec],
        upstream: &[ServerEndpoint],
    ) -> Result<ProvisionReport> {
        let mut report = ProvisionReport::new(self.kind(), NodeRole::Gateway);
        if gateways.is_empty() {
            return Ok(report.finish());
        }

        let session = &self.session;
        let options = session.load_options(None)?;
        if options.os != OsFamily::CentOs {
            return Err(ProvisionError::UnsupportedGatewayOs(options.os.to_string()));
        }
        let upstream = upstream.first().ok_or(ProvisionError::MissingUpstream)?;

        let groups: Vec<NodeGroupSpec> = gateways.iter().map(|g| g.0.clone()).collect();
        let nodes = expand_groups(&groups)?;

        let image = session
            .images()
            .ensure(session.manager(), NodeRole::Gateway, &options)
            .await;

        for node in &nodes {
            let launch = ContainerLaunch::new(&node.name, &image, NodeRole::Gateway)
                .links(self.link_pairs().await)
                .network(session.network().map(str::to_string));

            let handle = match session.manager().run_container(&launch).await {
                Ok(handle) => handle,
                Err(e) => {
                    error!(node = %node.name, error = %e, "Failed to launch gateway");
                    session.registry().mark_failed(&node.name, e.to_string()).await;
                    report.push(NodeReport::failed(&node.name, NodeRole::Gateway, e.to_string()));
                    continue;
                }
            };
            session
                .registry()
                .register(handle.name.clone(), handle.clone())
                .await;

            let url = RestUrl::new(&handle.name, NodeRole::Gateway.service_port());
            info!(
                node = %handle.name,
                url = %url.http(),
                upstream = %upstream.url(),
                role = "gateway",
                "start sync_gateway"
            );

            let cmd = vec![GATEWAY_ENTRYPOINT.to_string(), upstream.name.clone()];
            debug!(container = %handle.short_id(), cmd = ?cmd, "Bootstrapping gateway");
            let entry = match session.manager().exec_in_container(&handle.id, &cmd, false).await {
                Ok(_) if !self.url_or_unresolved(&handle.name).await.is_reachable() => {
                    warn!(node = %node.name, "Gateway container has no address");
                    NodeReport::unmapped(&node.name, NodeRole::Gateway)
                }
                Ok(_) => NodeReport::running(&node.name, NodeRole::Gateway, url),
                Err(e) => {
                    error!(node = %node.name, error = %e, "Gateway bootstrap failed");
                    NodeReport::failed(&node.name, NodeRole::Gateway, e.to_string())
                }
            };
            report.push(entry.with_upstream(upstream.url()));
        }

        Ok(report.finish())
    }

    async fn host_address(&self, name: &str) -> Result<AddressResolution> {
        let Some(handle) = self.lookup(name).await? else {
            return Ok(AddressResolution::Unresolvable);
        };

        let detail = match self.session.manager().inspect_container(&handle.id).await {
            Ok(detail) => detail,
            Err(ProvisionError::ContainerNotFound(_)) => return Ok(AddressResolution::Unresolvable),
            Err(e) => return Err(e),
        };

        Ok(match self.session.network() {
            Some(_) => AddressResolution::from_address(detail.name),
            None => AddressResolution::from_address(detail.bridge_address),
        })
    }

    async fn rest_url(&self, name: &str) -> Result<RestUrl> {
        Ok(self.host_address(name).await?.into_rest_url(SERVER_PORT))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::Docker
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::NodeStatus;
    use crate::settings::ProviderSettings;
    use crate::testing::{config_root, MockManager, Op};
    use std::sync::Arc;

    const SERVER_OPTIONS: &str = "build: 4.5.0-2601\nmemory: 1000000000\n";
    const GATEWAY_OPTIONS: &str =
        "build: 4.5.0-2601\nsync_gateway_version: 1.3.0-274\nos: centos7\n";

    fn provider(manager: &MockManager, root: &Path, network: Option<&str>) -> SingleHostProvider {
        let settings = ProviderSettings::builder()
            .config_root(root)
            .expose_ports(true)
            .network(network.unwrap_or_default())
            .build();
        SingleHostProvider::new(EngineSession::new(Arc::new(manager.clone()), settings))
    }

    #[tokio::test]
    async fn test_three_servers_on_fresh_host() {
        let root = config_root(SERVER_OPTIONS);
        let manager = MockManager::new();
        let provider = provider(&manager, root.path(), None);

        let report = provider
            .provision_servers(None, &[NodeGroupSpec::new("node_$", 3)])
            .await
            .unwrap();

        let launches = manager.launches();
        let names: Vec<&str> = launches.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec!["node_1", "node_2", "node_3"]);
        let ports: Vec<u16> = launches.iter().map(|l| l.ports[0].host_port).collect();
        assert_eq!(ports, vec![8091, 8092, 8093]);
        assert!(launches.iter().all(|l| l.ports[0].container_port == 8091));
        assert!(launches.iter().all(|l| l.privileged));
        assert_eq!(launches[0].limits.memory_bytes, Some(1_000_000_000));
        assert_eq!(launches[0].image, "couchbase_4.5.0-2601.ubuntu14");

        assert!(report.is_complete());
        assert_eq!(provider.session().registry().len().await, 3);
        let url = provider.rest_url("node_1").await.unwrap();
        assert!(url.is_reachable());
        assert_eq!(url.port, 8091);
    }

    #[tokio::test]
    async fn test_port_offset_counts_existing_servers() {
        let root = config_root(SERVER_OPTIONS);
        let manager = MockManager::new()
            .with_existing("old_1", NodeRole::Server)
            .with_existing("old_2", NodeRole::Server)
            .with_unlabelled("couchbase_sidecar");
        let provider = provider(&manager, root.path(), None);

        provider
            .provision_servers(None, &[NodeGroupSpec::new("node_$", 2)])
            .await
            .unwrap();

        let ports: Vec<u16> = manager
            .launches()
            .iter()
            .map(|l| l.ports[0].host_port)
            .collect();
        assert_eq!(ports, vec![8093, 8094]);
    }

    #[tokio::test]
    async fn test_ports_not_bound_without_expose() {
        let root = config_root(SERVER_OPTIONS);
        let manager = MockManager::new();
        let settings = ProviderSettings::builder().config_root(root.path()).build();
        let provider =
            SingleHostProvider::new(EngineSession::new(Arc::new(manager.clone()), settings));

        provider
            .provision_servers(None, &[NodeGroupSpec::new("node_$", 2)])
            .await
            .unwrap();
        assert!(manager.launches().iter().all(|l| l.ports.is_empty()));
    }

    #[tokio::test]
    async fn test_launch_failure_is_reported_and_others_continue() {
        let root = config_root(SERVER_OPTIONS);
        let manager = MockManager::new().failing_launch("node_2");
        let provider = provider(&manager, root.path(), None);

        let report = provider
            .provision_servers(None, &[NodeGroupSpec::new("node_$", 3)])
            .await
            .unwrap();

        assert_eq!(report.running_count(), 2);
        assert!(matches!(
            report.node("node_2").unwrap().status,
            NodeStatus::Failed { .. }
        ));
        assert_eq!(manager.launches().len(), 3);
        assert_eq!(
            provider.session().registry().failure("node_2").await.as_deref(),
            Some("failed to launch node_2: mock launch failure")
        );
    }

    #[tokio::test]
    async fn test_build_failure_does_not_stop_launch() {
        let root = config_root(SERVER_OPTIONS);
        let manager = MockManager::new().failing_build("couchbase_4.5.0-2601.ubuntu14");
        let provider = provider(&manager, root.path(), None);

        let report = provider
            .provision_servers(None, &[NodeGroupSpec::new("node_$", 1)])
            .await
            .unwrap();
        assert_eq!(manager.builds().len(), 1);
        assert_eq!(manager.launches().len(), 1);
        assert!(report.is_complete());
    }

    #[tokio::test]
    async fn test_invalid_version_still_launches() {
        let root = config_root("build: 4.5.0\n");
        let manager = MockManager::new();
        let provider = provider(&manager, root.path(), None);

        provider
            .provision_servers(None, &[NodeGroupSpec::new("node_$", 1)])
            .await
            .unwrap();
        assert!(manager.builds().is_empty());
        assert_eq!(manager.launches()[0].image, "couchbase_4.5.0.ubuntu14");
    }

    #[tokio::test]
    async fn test_server_without_address_is_unmapped() {
        let root = config_root(SERVER_OPTIONS);
        let manager = MockManager::new().without_address("node_2");
        let provider = provider(&manager, root.path(), None);

        let report = provider
            .provision_servers(None, &[NodeGroupSpec::new("node_$", 2)])
            .await
            .unwrap();

        assert_eq!(report.node("node_1").unwrap().status, NodeStatus::Running);
        let node_2 = report.node("node_2").unwrap();
        assert_eq!(node_2.status, NodeStatus::Unmapped);
        assert!(node_2.url.is_none());
        assert!(!report.is_complete());
        assert_eq!(
            report.server_endpoints(),
            vec![ServerEndpoint::new("node_1", 8091)]
        );
    }

    #[tokio::test]
    async fn test_network_addressing_uses_container_name() {
        let root = config_root(SERVER_OPTIONS);
        let manager = MockManager::new();
        let provider = provider(&manager, root.path(), Some("testnet"));

        provider
            .provision_servers(None, &[NodeGroupSpec::new("node_$", 1)])
            .await
            .unwrap();

        assert_eq!(manager.launches()[0].network.as_deref(), Some("testnet"));
        assert_eq!(
            provider.rest_url("node_1").await.unwrap().to_string(),
            "node_1:8091"
        );
    }

    #[tokio::test]
    async fn test_address_of_unregistered_container() {
        let root = config_root(SERVER_OPTIONS);
        let manager = MockManager::new().with_existing("old_1", NodeRole::Server);
        let provider = provider(&manager, root.path(), None);

        let address = provider.host_address("old_1").await.unwrap();
        assert!(matches!(address, AddressResolution::Resolved(ref a) if a.starts_with("172.17.0.")));
        assert_eq!(
            provider.host_address("ghost").await.unwrap(),
            AddressResolution::Unresolvable
        );
    }

    #[tokio::test]
    async fn test_gateways_link_to_every_launched_node() {
        let root = config_root(GATEWAY_OPTIONS);
        let manager = MockManager::new();
        let provider = provider(&manager, root.path(), None);

        let servers = provider
            .provision_servers(None, &[NodeGroupSpec::new("node_$", 2)])
            .await
            .unwrap();
        let report = provider
            .provision_gateways(&[GatewaySpec::new("sg_$", 2)], &servers.server_endpoints())
            .await
            .unwrap();

        let launches = manager.launches();
        let first_gateway = &launches[2];
        assert_eq!(first_gateway.image, "sync_gateway_1.3.0-274.centos7");
        assert_eq!(first_gateway.links, vec!["node_1:node_1", "node_2:node_2"]);
        assert_eq!(
            launches[3].links,
            vec!["node_1:node_1", "node_2:node_2", "sg_1:sg_1"]
        );

        let execs = manager.execs();
        assert_eq!(execs.len(), 2);
        assert_eq!(execs[0].1, vec!["./entrypoint.sh", "node_1"]);
        assert!(!execs[0].2);

        assert!(report.is_complete());
        let sg = report.node("sg_1").unwrap();
        assert_eq!(sg.url.as_ref().unwrap().to_string(), "sg_1:4984");
        assert_eq!(sg.upstream.as_deref(), Some("http://node_1:8091"));

        let builds = manager.builds();
        assert_eq!(builds[1].build_args.len(), 2);
    }

    #[tokio::test]
    async fn test_gateways_on_network_have_no_links() {
        let root = config_root(GATEWAY_OPTIONS);
        let manager = MockManager::new();
        let provider = provider(&manager, root.path(), Some("testnet"));

        let servers = provider
            .provision_servers(None, &[NodeGroupSpec::new("node_$", 1)])
            .await
            .unwrap();
        provider
            .provision_gateways(&[GatewaySpec::new("sg_$", 1)], &servers.server_endpoints())
            .await
            .unwrap();

        let gateway = &manager.launches()[1];
        assert!(gateway.links.is_empty());
        assert_eq!(gateway.network.as_deref(), Some("testnet"));
    }

    #[tokio::test]
    async fn test_gateway_requires_centos() {
        let root = config_root(SERVER_OPTIONS);
        let manager = MockManager::new();
        let provider = provider(&manager, root.path(), None);

        let err = provider
            .provision_gateways(
                &[GatewaySpec::new("sg_$", 1)],
                &[ServerEndpoint::new("node_1", 8091)],
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::UnsupportedGatewayOs(ref os) if os == "ubuntu14"));
        assert!(!manager.has_side_effects());
    }

    #[tokio::test]
    async fn test_gateway_requires_upstream() {
        let root = config_root(GATEWAY_OPTIONS);
        let manager = MockManager::new();
        let provider = provider(&manager, root.path(), None);

        let err = provider
            .provision_gateways(&[GatewaySpec::new("sg_$", 1)], &[])
            .await
            .unwrap_err();
        assert!(matches!(err, ProvisionError::MissingUpstream));
        assert!(!manager.has_side_effects());
    }

    #[tokio::test]
    async fn test_gateway_launch_failure_is_reported_and_others_continue() {
        let root = config_root(GATEWAY_OPTIONS);
        let manager = MockManager::new().failing_launch("sg_1");
        let provider = provider(&manager, root.path(), None);

        let report = provider
            .provision_gateways(
                &[GatewaySpec::new("sg_$", 2)],
                &[ServerEndpoint::new("node_1", 8091)],
            )
            .await
            .unwrap();

        assert!(matches!(
            report.node("sg_1").unwrap().status,
            NodeStatus::Failed { ref reason } if reason.contains("mock launch failure")
        ));
        assert_eq!(report.node("sg_2").unwrap().status, NodeStatus::Running);
        assert_eq!(manager.launches().len(), 2);

        let execs = manager.execs();
        assert_eq!(execs.len(), 1);
        assert_eq!(execs[0].1, vec!["./entrypoint.sh", "node_1"]);
        assert!(provider.session().registry().failure("sg_1").await.is_some());
    }

    #[tokio::test]
    async fn test_gateway_image_uses_gateway_build_args_only() {
        let root = config_root("build: 4.5.0\nsync_gateway_version: 1.3.0-274\nos: centos7\n");
        let manager = MockManager::new();
        let provider = provider(&manager, root.path(), None);

        provider
            .provision_gateways(
                &[GatewaySpec::new("sg_$", 1)],
                &[ServerEndpoint::new("node_1", 8091)],
            )
            .await
            .unwrap();

        let builds = manager.builds();
        assert_eq!(builds.len(), 1);
        assert_eq!(builds[0].name, "sync_gateway_1.3.0-274.centos7");
        assert!(builds[0].context_dir.ends_with("containers/syncgateway/CentOS7"));
        let args: Vec<(&str, &str)> = builds[0]
            .build_args
            .iter()
            .map(|a| (a.name.as_str(), a.value.as_str()))
            .collect();
        assert_eq!(args, vec![("VERSION", "1.3.0"), ("BUILD_NO", "274")]);
    }

    #[tokio::test]
    async fn test_gateway_version_without_build_number_skips_build() {
        let root = config_root("build: 4.5.0-2601\nsync_gateway_version: 1.3.0\nos: centos7\n");
        let manager = MockManager::new();
        let provider = provider(&manager, root.path(), None);

        let report = provider
            .provision_gateways(
                &[GatewaySpec::new("sg_$", 1)],
                &[ServerEndpoint::new("node_1", 8091)],
            )
            .await
            .unwrap();

        assert!(manager.builds().is_empty());
        assert_eq!(manager.launches()[0].image, "sync_gateway_1.3.0.centos7");
        assert_eq!(report.node("sg_1").unwrap().status, NodeStatus::Running);
    }

    #[tokio::test]
    async fn test_gateway_without_address_is_unmapped() {
        let root = config_root(GATEWAY_OPTIONS);
        let manager = MockManager::new().without_address("sg_1");
        let provider = provider(&manager, root.path(), None);

        let report = provider
            .provision_gateways(
                &[GatewaySpec::new("sg_$", 1)],
                &[ServerEndpoint::new("node_1", 8091)],
            )
            .await
            .unwrap();

        let sg = report.node("sg_1").unwrap();
        assert_eq!(sg.status, NodeStatus::Unmapped);
        assert_eq!(sg.upstream.as_deref(), Some("http://node_1:8091"));
        assert!(!report.is_complete());
    }

    #[tokio::test]
    async fn test_gateway_bootstrap_failure_is_fatal_for_node() {
        let root = config_root(GATEWAY_OPTIONS);
        let manager = MockManager::new().failing_exec();
        let provider = provider(&manager, root.path(), None);

        let report = provider
            .provision_gateways(
                &[GatewaySpec::new("sg_$", 1)],
                &[ServerEndpoint::new("node_1", 8091)],
            )
            .await
            .unwrap();
        assert!(matches!(
            report.node("sg_1").unwrap().status,
            NodeStatus::Failed { .. }
        ));
        assert!(manager
            .ops()
            .iter()
            .any(|op| matches!(op, Op::Exec { detached: false, .. })));
    }
}

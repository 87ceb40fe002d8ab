//! Static host file provider.
//!
//! Node names are mapped positionally onto a list of addresses read from a
//! host file. Nothing is launched.

use async_trait::async_trait;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::sync::RwLock;
use tracing::{debug, info};

use super::{reject_gateways, AddressResolution, NodeProvider, ProviderKind, RestUrl, ServerEndpoint};
use crate::error::Result;
use crate::report::{NodeReport, ProvisionReport};
use topokit_core::{expand_groups, GatewaySpec, NodeGroupSpec, NodeRole};

/// Directory of host files, relative to the config root.
pub const HOST_FILE_DIR: &str = "providers/file";

/// Host file used when the selector names none.
pub const DEFAULT_HOST_FILE: &str = "default.yml";

#[derive(Deserialize)]
#[serde(untagged)]
enum HostList {
    Line(String),
    List(Vec<String>),
}

/// Provider that maps nodes onto addresses from a host file.
#[derive(Debug)]
pub struct StaticFileProvider {
    host_file: PathBuf,
    addresses: RwLock<HashMap<String, String>>,
}

impl StaticFileProvider {
    /// Creates a provider reading `host_file`.
    pub fn new(host_file: impl Into<PathBuf>) -> Self {
        Self {
            host_file: host_file.into(),
            addresses: RwLock::new(HashMap::new()),
        }
    }

    /// Returns the host file path.
    pub fn host_file(&self) -> &Path {
        &self.host_file
    }

    /// Loads the address list.
    ///
    /// The file holds a YAML string of whitespace-separated addresses, or a
    /// YAML list of addresses.
    pub fn load_hosts(&self) -> Result<Vec<String>> {
        let content = std::fs::read_to_string(&self.host_file)?;
        let hosts = match serde_yaml::from_str::<Option<HostList>>(&content)? {
            Some(HostList::Line(line)) => line.split_whitespace().map(str::to_string).collect(),
            Some(HostList::List(list)) => list,
            None => Vec::new(),
        };
        debug!(path = %self.host_file.display(), hosts = hosts.len(), "Loaded host file");
        Ok(hosts)
    }

    /// Returns the address mapped to `name`, or an empty string.
    pub async fn address_of(&self, name: &str) -> String {
        self.addresses
            .read()
            .await
            .get(name)
            .cloned()
            .unwrap_or_default()
    }
}

#[async_trait]
impl NodeProvider for StaticFileProvider {
    async fn provision_servers(
        &self,
        _options_path: Option<&Path>,
        groups: &[NodeGroupSpec],
    ) -> Result<ProvisionReport> {
        let hosts = self.load_hosts()?;
        let nodes = expand_groups(groups)?;
        let mut report = ProvisionReport::new(self.kind(), NodeRole::Server);
        let mut addresses = self.addresses.write().await;

        for node in nodes {
            match hosts.get(node.global_index) {
                Some(address) => {
                    let url = RestUrl::new(address, NodeRole::Server.service_port());
                    info!(node = %node.name, url = %url.http(), role = "server", "start couchbase");
                    addresses.insert(node.name.clone(), address.clone());
                    report.push(NodeReport::running(node.name, NodeRole::Server, url));
                }
                None => {
                    debug!(node = %node.name, "No address left in host file");
                    report.push(NodeReport::unmapped(node.name, NodeRole::Server));
                }
            }
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
        let address = self.address_of(name).await;
        Ok(if address.is_empty() {
            AddressResolution::Unresolvable
        } else {
            AddressResolution::Resolved(address)
        })
    }

    async fn rest_url(&self, name: &str) -> Result<RestUrl> {
        Ok(self
            .host_address(name)
            .await?
            .into_rest_url(NodeRole::Server.service_port()))
    }

    fn kind(&self) -> ProviderKind {
        ProviderKind::File
    }
}

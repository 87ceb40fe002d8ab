//! Provider selection.
//!
//! A run picks its backend once, from a selector string of the form
//! `kind[:argument]`:
//!
//! | Selector            | Provider                                        |
//! |---------------------|-------------------------------------------------|
//! | `docker`            | single engine host, or cluster if swarm is on   |
//! | `swarm`             | engine cluster                                  |
//! | `file[:hosts.yml]`  | static host file under `providers/file/`        |
//! | `dev[:endpoint]`    | local development cluster                       |

use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{info, warn};

use crate::error::{ProvisionError, Result};
use crate::manager::{DockerSession, DockerSessionConfig, SessionKind, SharedManager};
use crate::provider::{
    DevClusterProvider, EngineSession, MultiHostProvider, NodeProvider, Provider, ProviderKind,
    SingleHostProvider, StaticFileProvider, DEFAULT_DEV_ENDPOINT, DEFAULT_HOST_FILE, HOST_FILE_DIR,
};
use crate::settings::ProviderSettings;
use topokit_core::Topology;

/// A parsed backend selector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selector {
    /// Engine backend; becomes a cluster provider when the engine is a swarm.
    Docker,

    /// Engine cluster backend.
    Swarm,

    /// Static host file, relative to `providers/file/`.
    File {
        /// Host file name.
        host_file: String,
    },

    /// Local development cluster.
    Dev {
        /// Cluster endpoint.
        endpoint: String,
    },
}

impl Selector {
    /// Returns the provider kind the selector asks for.
    ///
    /// `docker` may still end up as [`ProviderKind::Swarm`] once the engine
    /// has reported whether it runs a swarm.
    pub fn kind(&self) -> ProviderKind {
        match self {
            Self::Docker => ProviderKind::Docker,
            Self::Swarm => ProviderKind::Swarm,
            Self::File { .. } => ProviderKind::File,
            Self::Dev { .. } => ProviderKind::Dev,
        }
    }
}

impl FromStr for Selector {
    type Err = ProvisionError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, argument) = match s.split_once(':') {
            Some((kind, argument)) => (kind, argument.trim()),
            None => (s, ""),
        };
        let or_default = |default: &str| {
            if argument.is_empty() {
                default.to_string()
            } else {
                argument.to_string()
            }
        };

        match kind.trim() {
            "docker" => Ok(Self::Docker),
            "swarm" => Ok(Self::Swarm),
            "file" => Ok(Self::File {
                host_file: or_default(DEFAULT_HOST_FILE),
            }),
            "dev" => Ok(Self::Dev {
                endpoint: or_default(DEFAULT_DEV_ENDPOINT),
            }),
            _ => Err(ProvisionError::UnknownProvider(s.to_string())),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Docker => f.write_str("docker"),
            Self::Swarm => f.write_str("swarm"),
            Self::File { host_file } => write!(f, "file:{host_file}"),
            Self::Dev { endpoint } => write!(f, "dev:{endpoint}"),
        }
    }
}

/// Opens an engine session for the engine-backed providers.
#[async_trait]
pub trait SessionConnector: Send + Sync {
    /// Connects to the engine described by `settings`.
    async fn connect(&self, settings: &ProviderSettings) -> Result<SharedManager>;
}

/// Connects to Docker engines through bollard.
#[derive(Debug, Clone, Default)]
pub struct DockerConnector {
    config: DockerSessionConfig,
}

impl DockerConnector {
    /// Creates a connector with the given base session configuration.
    ///
    /// Endpoints in the provider settings take precedence over the ones
    /// in `config`.
    pub fn new(config: DockerSessionConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl SessionConnector for DockerConnector {
    async fn connect(&self, settings: &ProviderSettings) -> Result<SharedManager> {
        let mut config = self.config.clone();
        if !settings.endpoints.is_empty() {
            config.endpoints = settings.endpoints.clone();
        }
        let session = DockerSession::connect(config).await?;
        Ok(Arc::new(session))
    }
}

/// Builds the provider for a run.
///
/// Configuration problems fail here, before anything is launched.
pub async fn build_provider(
    settings: &ProviderSettings,
    topology: &Topology,
    connector: &dyn SessionConnector,
) -> Result<Provider> {
    let selector: Selector = settings.selector.parse()?;
    let network = settings.network.as_deref();

    let provider = match &selector {
        Selector::Docker => {
            let manager = connector.connect(settings).await?;
            if let Some(name) = network {
                manager.create_network(name).await?;
            }
            let kind = manager.session_kind();
            let session = EngineSession::new(manager, settings.clone());
            match kind {
                SessionKind::MultiHost => Provider::MultiHost(MultiHostProvider::new(session)),
                SessionKind::SingleHost => Provider::SingleHost(SingleHostProvider::new(session)),
            }
        }
        Selector::Swarm => {
            if let Some(name) = network {
                return Err(ProvisionError::unsupported_network(
                    ProviderKind::Swarm.as_str(),
                    name,
                ));
            }
            let manager = connector.connect(settings).await?;
            Provider::MultiHost(MultiHostProvider::new(EngineSession::new(
                manager,
                settings.clone(),
            )))
        }
        Selector::File { host_file } => {
            let path = settings.resolve(HOST_FILE_DIR).join(host_file);
            Provider::StaticFile(StaticFileProvider::new(path))
        }
        Selector::Dev { endpoint } => {
            Provider::DevCluster(DevClusterProvider::new(endpoint, topology.servers.clone()))
        }
    };

    if !topology.gateways.is_empty() && !provider.kind().supports_gateways() {
        warn!(
            provider = %provider.kind(),
            gateways = topology.gateways.len(),
            "Topology requests gateways this provider cannot provision"
        );
    }

    info!(
        selector = %selector,
        provider = %provider.kind(),
        network = ?network,
        servers = topology.server_count(),
        "Provider ready"
    );
    Ok(provider)
}

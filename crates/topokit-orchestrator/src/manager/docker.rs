//! Docker engine session.
//!
//! A session wraps one bollard client per configured endpoint. With a single
//! endpoint that is not part of an active swarm the session is single-host;
//! otherwise it schedules services across the swarm and resolves containers
//! through the client of the host that runs them.

use async_trait::async_trait;
use bollard::container::{
    Config, CreateContainerOptions, InspectContainerOptions, ListContainersOptions,
    StartContainerOptions,
};
use bollard::exec::{CreateExecOptions, StartExecOptions, StartExecResults};
use bollard::image::BuildImageOptions;
use bollard::models::{
    EndpointPortConfig, EndpointSpec, Limit, LocalNodeState, ResourcesUlimits, ServiceSpec,
    TaskSpec, TaskSpecContainerSpec, TaskSpecPlacement, TaskSpecResources,
};
use bollard::network::{CreateNetworkOptions, ListNetworksOptions};
use bollard::{Docker, API_DEFAULT_VERSION};
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::container::{
    ContainerDetail, ContainerFilter, ContainerLaunch, ContainerSummary, ExecOutput, ImageBuild,
    NodeHandle, ServiceLaunch,
};
use crate::error::{ProvisionError, Result};
use crate::manager::r#trait::{ContainerManager, EngineClient, SessionKind};

/// Endpoint value meaning "the local engine socket".
pub const LOCAL_ENDPOINT: &str = "local";

/// Label the engine puts on every container of a cluster service.
pub const SERVICE_NAME_LABEL: &str = "com.docker.swarm.service.name";

/// Configuration for a Docker session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DockerSessionConfig {
    /// Engine endpoints; empty means the local engine.
    pub endpoints: Vec<String>,

    /// Timeout for engine API calls in seconds.
    pub timeout_secs: u64,

    /// Maximum time an image build may take.
    pub build_timeout: Duration,

    /// Interval between task lookups while waiting for a service container.
    pub task_poll_interval: Duration,
}

impl Default for DockerSessionConfig {
    fn default() -> Self {
        Self {
            endpoints: Vec::new(),
            timeout_secs: 120,
            build_timeout: Duration::from_secs(1800),
            task_poll_interval: Duration::from_secs(1),
        }
    }
}

impl DockerSessionConfig {
    /// Creates a new configuration builder.
    pub fn builder() -> DockerSessionConfigBuilder {
        DockerSessionConfigBuilder::default()
    }
}

/// Builder for `DockerSessionConfig`.
#[derive(Debug, Default)]
pub struct DockerSessionConfigBuilder {
    config: DockerSessionConfig,
}

impl DockerSessionConfigBuilder {
    /// Adds an engine endpoint.
    pub fn endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.config.endpoints.push(endpoint.into());
        self
    }

    /// Sets all engine endpoints.
    pub fn endpoints(mut self, endpoints: Vec<String>) -> Self {
        self.config.endpoints = endpoints;
        self
    }

    /// Sets the API timeout.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.config.timeout_secs = secs;
        self
    }

    /// Sets the image build timeout.
    pub fn build_timeout(mut self, timeout: Duration) -> Self {
        self.config.build_timeout = timeout;
        self
    }

    /// Builds the configuration.
    pub fn build(self) -> DockerSessionConfig {
        self.config
    }
}

/// A bollard client bound to one engine host.
pub struct DockerClient {
    docker: Docker,
    host: String,
    swarm_nodes: Option<usize>,
}

impl DockerClient {
    /// Connects to an endpoint and reads the engine's host name.
    pub async fn connect(endpoint: &str, timeout_secs: u64) -> Result<Self> {
        let docker = if endpoint.is_empty() || endpoint == LOCAL_ENDPOINT {
            Docker::connect_with_local_defaults()?
        } else if let Some(path) = endpoint.strip_prefix("unix://") {
            Docker::connect_with_socket(path, timeout_secs, API_DEFAULT_VERSION)?
        } else {
            Docker::connect_with_http(endpoint, timeout_secs, API_DEFAULT_VERSION)?
        };

        docker.ping().await?;
        let info = docker.info().await?;

        let host = info.name.unwrap_or_else(|| endpoint.to_string());
        let swarm_nodes = info
            .swarm
            .filter(|swarm| swarm.local_node_state == Some(LocalNodeState::ACTIVE))
            .map(|swarm| swarm.nodes.unwrap_or(1).max(1) as usize);

        info!(
            endpoint = %endpoint,
            host = %host,
            swarm = swarm_nodes.is_some(),
            "Connected to Docker daemon"
        );

        Ok(Self {
            docker,
            host,
            swarm_nodes,
        })
    }

}

#[async_trait]
impl EngineClient for DockerClient {
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>> {
        let options = ListContainersOptions {
            all: filter.all,
            filters: filter.to_filters(),
            ..Default::default()
        };

        let summaries = self
            .docker
            .list_containers(Some(options))
            .await?
            .into_iter()
            .map(|s| ContainerSummary {
                id: s.id.unwrap_or_default(),
                names: s.names.unwrap_or_default(),
                image: s.image.unwrap_or_default(),
                labels: s.labels.unwrap_or_default(),
            })
            .filter(|s| filter.matches(s))
            .collect();

        Ok(summaries)
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
        let inspect = match self
            .docker
            .inspect_container(id, None::<InspectContainerOptions>)
            .await
        {
            Ok(inspect) => inspect,
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => return Err(ProvisionError::container_not_found(id)),
            Err(e) => return Err(e.into()),
        };

        let settings = inspect.network_settings.unwrap_or_default();
        let network_addresses = settings
            .networks
            .unwrap_or_default()
            .into_iter()
            .map(|(name, endpoint)| (name, endpoint.ip_address.unwrap_or_default()))
            .collect();

        Ok(ContainerDetail {
            id: inspect.id.unwrap_or_else(|| id.to_string()),
            name: inspect
                .name
                .map(|n| n.trim_start_matches('/').to_string())
                .unwrap_or_default(),
            bridge_address: settings.ip_address.unwrap_or_default(),
            network_addresses,
        })
    }

    fn host(&self) -> &str {
        &self.host
    }
}

/// Container manager over one or more Docker engines.
pub struct DockerSession {
    primary: Arc<DockerClient>,
    clients: HashMap<String, Arc<DockerClient>>,
    config: DockerSessionConfig,
    kind: SessionKind,
    participants: usize,
}

impl DockerSession {
    /// Connects to every configured endpoint.
    pub async fn connect(config: DockerSessionConfig) -> Result<Self> {
        let endpoints = if config.endpoints.is_empty() {
            vec![LOCAL_ENDPOINT.to_string()]
        } else {
            config.endpoints.clone()
        };

        let mut connected = Vec::with_capacity(endpoints.len());
        for endpoint in &endpoints {
            connected.push(Arc::new(
                DockerClient::connect(endpoint, config.timeout_secs).await?,
            ));
        }

        let primary = connected
            .first()
            .cloned()
            .ok_or_else(|| ProvisionError::configuration("no engine endpoints"))?;

        let swarm_nodes = connected.iter().find_map(|c| c.swarm_nodes);
        let kind = if swarm_nodes.is_some() || connected.len() > 1 {
            SessionKind::MultiHost
        } else {
            SessionKind::SingleHost
        };
        let participants = swarm_nodes.unwrap_or(connected.len()).max(connected.len());

        let clients = connected
            .into_iter()
            .map(|c| (c.host.clone(), c))
            .collect();

        debug!(kind = %kind, participants, "Docker session ready");

        Ok(Self {
            primary,
            clients,
            config,
            kind,
            participants,
        })
    }

    // Primary first, then every other connected host.
    fn participant_clients(&self) -> impl Iterator<Item = &Arc<DockerClient>> {
        std::iter::once(&self.primary).chain(
            self.clients
                .values()
                .filter(|c| c.host != self.primary.host),
        )
    }

    async fn service_container(&self, launch: &ServiceLaunch) -> Result<Option<NodeHandle>> {
        let filter = ContainerFilter::by_label(SERVICE_NAME_LABEL, &launch.name);
        let found = self.locate_containers(&filter).await?;
        Ok(found.into_iter().next().map(|handle| {
            let host = handle.host.unwrap_or_else(|| self.primary.host.clone());
            NodeHandle::new(handle.id, &launch.node_name).on_host(host)
        }))
    }

    fn service_spec(launch: &ServiceLaunch) -> ServiceSpec {
        let ports: Vec<EndpointPortConfig> = launch
            .published_ports
            .iter()
            .map(|p| EndpointPortConfig {
                target_port: Some(i64::from(p.container_port)),
                published_port: Some(i64::from(p.host_port)),
                ..Default::default()
            })
            .collect();

        ServiceSpec {
            name: Some(launch.name.clone()),
            labels: Some(launch.labels.clone()),
            task_template: Some(TaskSpec {
                container_spec: Some(TaskSpecContainerSpec {
                    image: Some(launch.image.clone()),
                    labels: Some(launch.labels.clone()),
                    hostname: Some(launch.node_name.clone()),
                    ..Default::default()
                }),
                placement: Some(TaskSpecPlacement {
                    constraints: Some(launch.constraints.clone()),
                    ..Default::default()
                }),
                resources: (!launch.limits.is_unbounded()).then(|| TaskSpecResources {
                    limits: Some(Limit {
                        nano_cpus: launch.limits.nano_cpus(),
                        memory_bytes: launch.limits.memory_bytes,
                        ..Default::default()
                    }),
                    ..Default::default()
                }),
                ..Default::default()
            }),
            endpoint_spec: (!ports.is_empty()).then(|| EndpointSpec {
                ports: Some(ports),
                ..Default::default()
            }),
            ..Default::default()
        }
    }
}

#[async_trait]
impl ContainerManager for DockerSession {
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>> {
        self.primary.list_containers(filter).await
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
        self.primary.inspect_container(id).await
    }

    async fn locate_containers(&self, filter: &ContainerFilter) -> Result<Vec<NodeHandle>> {
        let mut handles = Vec::new();
        for client in self.participant_clients() {
            for summary in client.list_containers(filter).await? {
                handles.push(NodeHandle::new(&summary.id, summary.name()).on_host(&client.host));
            }
        }
        Ok(handles)
    }

    async fn image_exists(&self, name: &str) -> Result<bool> {
        match self.primary.docker.inspect_image(name).await {
            Ok(_) => Ok(true),
            Err(bollard::errors::Error::DockerResponseServerError {
                status_code: 404, ..
            }) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn build_image(&self, build: &ImageBuild) -> Result<()> {
        if !build.context_dir.is_dir() {
            return Err(ProvisionError::image_build_failed(
                &build.name,
                format!("build context {} not found", build.context_dir.display()),
            ));
        }

        let context = build.context_dir.clone();
        let archive = tokio::task::spawn_blocking(move || context_archive(&context))
            .await
            .map_err(|e| ProvisionError::image_build_failed(&build.name, e.to_string()))??;

        let options = BuildImageOptions {
            dockerfile: "Dockerfile".to_string(),
            t: build.name.clone(),
            rm: true,
            buildargs: build
                .build_args
                .iter()
                .map(|arg| (arg.name.clone(), arg.value.clone()))
                .collect(),
            ..Default::default()
        };

        info!(image = %build.name, context = %build.context_dir.display(), "Building image");

        let mut output = self
            .primary
            .docker
            .build_image(options, None, Some(archive.into()));
        let streamed = tokio::time::timeout(self.config.build_timeout, async {
            while let Some(item) = output.next().await {
                let info =
                    item.map_err(|e| ProvisionError::image_build_failed(&build.name, e.to_string()))?;
                if let Some(reason) = info.error_detail.and_then(|d| d.message).or(info.error) {
                    return Err(ProvisionError::image_build_failed(&build.name, reason));
                }
                if let Some(line) = info.stream.as_deref().map(str::trim_end) {
                    if !line.is_empty() {
                        debug!(image = %build.name, "{}", line);
                    }
                }
            }
            Ok::<(), ProvisionError>(())
        })
        .await
        .map_err(|_| ProvisionError::timeout(format!("image build {}", build.name)))?;
        streamed?;

        info!(image = %build.name, "Built image");
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        let filters = HashMap::from([("name".to_string(), vec![name.to_string()])]);
        let existing = self
            .primary
            .docker
            .list_networks(Some(ListNetworksOptions { filters }))
            .await?;

        if existing.iter().any(|n| n.name.as_deref() == Some(name)) {
            info!(network = %name, "Using existing network");
            return Ok(());
        }

        let driver = match self.kind {
            SessionKind::SingleHost => "bridge",
            SessionKind::MultiHost => "overlay",
        };
        let options = CreateNetworkOptions {
            name,
            driver,
            attachable: self.kind == SessionKind::MultiHost,
            ..Default::default()
        };

        let response = self.primary.docker.create_network(options).await?;
        info!(network = %name, id = %response.id, driver, "Created network");
        Ok(())
    }

    async fn run_container(&self, launch: &ContainerLaunch) -> Result<NodeHandle> {
        let exposed_ports: HashMap<String, HashMap<(), ()>> = launch
            .ports
            .iter()
            .map(|p| (p.container_key(), HashMap::new()))
            .collect();

        let port_bindings: HashMap<String, Option<Vec<bollard::service::PortBinding>>> = launch
            .ports
            .iter()
            .map(|p| {
                let binding = bollard::service::PortBinding {
                    host_ip: None,
                    host_port: Some(p.host_port.to_string()),
                };
                (p.container_key(), Some(vec![binding]))
            })
            .collect();

        let ulimits: Vec<ResourcesUlimits> = launch
            .limits
            .ulimits
            .iter()
            .map(|u| ResourcesUlimits {
                name: Some(u.name.clone()),
                soft: Some(u.soft),
                hard: Some(u.hard),
            })
            .collect();

        let host_config = bollard::service::HostConfig {
            privileged: Some(launch.privileged),
            port_bindings: (!port_bindings.is_empty()).then_some(port_bindings),
            links: (!launch.links.is_empty()).then(|| launch.links.clone()),
            network_mode: launch.network.clone(),
            cpu_period: launch.limits.cpu_period,
            cpu_quota: launch.limits.cpu_quota,
            memory: launch.limits.memory_bytes,
            memory_swap: launch.limits.memory_swap_bytes,
            ulimits: (!ulimits.is_empty()).then_some(ulimits),
            ..Default::default()
        };

        let config = Config {
            image: Some(launch.image.clone()),
            hostname: Some(launch.name.clone()),
            labels: Some(launch.labels.clone()),
            exposed_ports: (!exposed_ports.is_empty()).then_some(exposed_ports),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: launch.name.as_str(),
            platform: None,
        };

        let response = self
            .primary
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| ProvisionError::launch_failed(&launch.name, e.to_string()))?;

        debug!(container = %launch.name, id = %response.id, "Created container");

        self.primary
            .docker
            .start_container(&response.id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| ProvisionError::launch_failed(&launch.name, e.to_string()))?;

        Ok(NodeHandle::new(response.id, &launch.name).on_host(&self.primary.host))
    }

    async fn run_service(&self, launch: &ServiceLaunch, attempts: u32) -> Result<NodeHandle> {
        let attempts = attempts.max(1);
        let spec = Self::service_spec(launch);

        let mut last_error = String::new();
        let mut created = false;
        for attempt in 1..=attempts {
            match self.primary.docker.create_service(spec.clone(), None).await {
                Ok(response) => {
                    debug!(
                        service = %launch.name,
                        id = ?response.id,
                        attempt,
                        "Created service"
                    );
                    created = true;
                    break;
                }
                Err(e) => {
                    warn!(service = %launch.name, attempt, error = %e, "Service creation failed");
                    last_error = e.to_string();
                    tokio::time::sleep(self.config.task_poll_interval).await;
                }
            }
        }
        if !created {
            return Err(ProvisionError::service_creation_failed(
                &launch.name,
                attempts,
                last_error,
            ));
        }

        for attempt in 1..=attempts {
            if let Some(handle) = self.service_container(launch).await? {
                debug!(
                    service = %launch.name,
                    container = %handle.short_id(),
                    host = ?handle.host,
                    attempt,
                    "Service task scheduled"
                );
                return Ok(handle);
            }
            tokio::time::sleep(self.config.task_poll_interval).await;
        }

        Err(ProvisionError::service_creation_failed(
            &launch.name,
            attempts,
            "no task container was scheduled",
        ))
    }

    async fn exec_in_container(
        &self,
        id: &str,
        cmd: &[String],
        detached: bool,
    ) -> Result<ExecOutput> {
        debug!(container = %id, cmd = ?cmd, detached, "Executing command");

        let exec_options = CreateExecOptions {
            cmd: Some(cmd.to_vec()),
            attach_stdout: Some(!detached),
            attach_stderr: Some(!detached),
            ..Default::default()
        };

        let exec = self
            .primary
            .docker
            .create_exec(id, exec_options)
            .await
            .map_err(|e| ProvisionError::exec_failed(id, e.to_string()))?;

        let start_options = StartExecOptions {
            detach: detached,
            ..Default::default()
        };
        let start_result = self
            .primary
            .docker
            .start_exec(&exec.id, Some(start_options))
            .await
            .map_err(|e| ProvisionError::exec_failed(id, e.to_string()))?;

        let mut stdout = String::new();
        let mut stderr = String::new();

        match start_result {
            StartExecResults::Detached => return Ok(ExecOutput::default()),
            StartExecResults::Attached { mut output, .. } => {
                while let Some(result) = output.next().await {
                    match result {
                        Ok(bollard::container::LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(bollard::container::LogOutput::StdErr { message }) => {
                            stderr.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(_) => {}
                        Err(e) => return Err(ProvisionError::exec_failed(id, e.to_string())),
                    }
                }
            }
        }

        let exec_inspect = self.primary.docker.inspect_exec(&exec.id).await?;
        let output = ExecOutput::new(stdout, stderr, exec_inspect.exit_code.unwrap_or(-1));

        if !output.success() {
            return Err(ProvisionError::exec_failed(
                id,
                format!("exit code {}: {}", output.exit_code, output.stderr.trim()),
            ));
        }
        Ok(output)
    }

    fn client_for_handle(&self, handle: &NodeHandle) -> Arc<dyn EngineClient> {
        let client = handle
            .host
            .as_deref()
            .and_then(|host| self.clients.get(host))
            .unwrap_or(&self.primary);
        Arc::clone(client) as Arc<dyn EngineClient>
    }

    fn session_kind(&self) -> SessionKind {
        self.kind
    }

    fn participant_count(&self) -> usize {
        self.participants
    }
}

/// Packs a build context directory into an in-memory tar archive.
fn context_archive(dir: &Path) -> Result<Vec<u8>> {
    let mut archive = tar::Builder::new(Vec::new());
    archive.append_dir_all(".", dir)?;
    Ok(archive.into_inner()?)
}

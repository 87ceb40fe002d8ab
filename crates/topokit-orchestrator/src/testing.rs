//! Recording container manager for tests.

#![allow(missing_docs)]

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::container::{
    ContainerDetail, ContainerFilter, ContainerLaunch, ContainerSummary, ExecOutput, ImageBuild,
    NodeHandle, ServiceLaunch, INGRESS_NETWORK, LABEL_NODE, LABEL_ROLE,
};
use crate::error::{ProvisionError, Result};
use crate::manager::{ContainerManager, EngineClient, SessionKind};
use topokit_core::NodeRole;

/// Host name of the mock's primary engine.
pub const MOCK_HOST: &str = "mock-host-0";

/// A recorded manager call.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    ListContainers(ContainerFilter),
    InspectContainer(String),
    ImageExists(String),
    BuildImage(ImageBuild),
    CreateNetwork(String),
    RunContainer(ContainerLaunch),
    RunService(ServiceLaunch, u32),
    Exec {
        id: String,
        cmd: Vec<String>,
        detached: bool,
    },
    ClientFor(Option<String>),
}

struct MockContainer {
    summary: ContainerSummary,
    detail: ContainerDetail,
    host: String,
    pending_inspects: u32,
    failing_inspects: u32,
}

#[derive(Default)]
struct MockState {
    ops: Vec<Op>,
    images: HashSet<String>,
    failing_builds: HashSet<String>,
    failing_launches: HashSet<String>,
    stalled: HashSet<String>,
    address_delays: HashMap<String, u32>,
    inspect_failures: HashMap<String, u32>,
    unaddressable: HashSet<String>,
    failing_exec: bool,
    containers: Vec<MockContainer>,
    next_id: usize,
}

impl MockState {
    #[allow(clippy::too_many_arguments)]
    fn add_container(
        &mut self,
        name: &str,
        display_name: String,
        image: &str,
        labels: HashMap<String, String>,
        network_addresses: HashMap<String, String>,
        bridge: bool,
        host: String,
    ) -> String {
        self.next_id += 1;
        let n = self.next_id;
        let id = format!("{n:04x}{}", "0".repeat(60));
        let pending_inspects = self.address_delays.get(name).copied().unwrap_or(0);
        let failing_inspects = self.inspect_failures.get(name).copied().unwrap_or(0);
        let (bridge, network_addresses) = if self.unaddressable.contains(name) {
            (false, HashMap::new())
        } else {
            (bridge, network_addresses)
        };

        self.containers.push(MockContainer {
            summary: ContainerSummary {
                id: id.clone(),
                names: vec![format!("/{display_name}")],
                image: image.to_string(),
                labels,
            },
            detail: ContainerDetail {
                id: id.clone(),
                name: display_name,
                bridge_address: if bridge {
                    format!("172.17.0.{}", n + 1)
                } else {
                    String::new()
                },
                network_addresses,
            },
            host,
            pending_inspects,
            failing_inspects,
        });
        id
    }

    fn list(&mut self, filter: &ContainerFilter, host: &str) -> Vec<ContainerSummary> {
        self.ops.push(Op::ListContainers(filter.clone()));
        self.containers
            .iter()
            .filter(|c| c.host == host && filter.matches(&c.summary))
            .map(|c| c.summary.clone())
            .collect()
    }

    fn inspect(&mut self, id: &str, host: Option<&str>) -> Result<ContainerDetail> {
        self.ops.push(Op::InspectContainer(id.to_string()));
        let container = self
            .containers
            .iter_mut()
            .filter(|c| host.map(|h| h == c.host).unwrap_or(true))
            .find(|c| c.detail.id == id || c.detail.name == id)
            .ok_or_else(|| ProvisionError::container_not_found(id))?;

        if container.failing_inspects > 0 {
            container.failing_inspects -= 1;
            return Err(ProvisionError::timeout(format!("inspect {id}")));
        }
        if container.pending_inspects > 0 {
            container.pending_inspects -= 1;
            let mut detail = container.detail.clone();
            detail.network_addresses.clear();
            return Ok(detail);
        }
        Ok(container.detail.clone())
    }
}

/// Container manager that records every call and simulates an engine.
#[derive(Clone)]
pub struct MockManager {
    state: Arc<Mutex<MockState>>,
    kind: SessionKind,
    participants: usize,
}

impl Default for MockManager {
    fn default() -> Self {
        Self::new()
    }
}

impl MockManager {
    /// A single-host engine.
    pub fn new() -> Self {
        Self {
            state: Arc::new(Mutex::new(MockState::default())),
            kind: SessionKind::SingleHost,
            participants: 1,
        }
    }

    /// A cluster of `participants` hosts.
    pub fn multi_host(participants: usize) -> Self {
        Self {
            kind: SessionKind::MultiHost,
            participants: participants.max(1),
            ..Self::new()
        }
    }

    pub fn with_image(self, name: &str) -> Self {
        self.state.lock().unwrap().images.insert(name.to_string());
        self
    }

    pub fn failing_build(self, image: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_builds
            .insert(image.to_string());
        self
    }

    /// Fails container or service launches for `name`.
    pub fn failing_launch(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .failing_launches
            .insert(name.to_string());
        self
    }

    pub fn failing_exec(self) -> Self {
        self.state.lock().unwrap().failing_exec = true;
        self
    }

    /// Makes the service for `name` never finish launching.
    pub fn stalled(self, name: &str) -> Self {
        self.state.lock().unwrap().stalled.insert(name.to_string());
        self
    }

    /// Hides the ingress address of `name` for its first `inspects` lookups.
    pub fn address_after(self, name: &str, inspects: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .address_delays
            .insert(name.to_string(), inspects);
        self
    }

    /// Fails the first `inspects` lookups of `name` with a transient error.
    pub fn inspect_errors(self, name: &str, inspects: u32) -> Self {
        self.state
            .lock()
            .unwrap()
            .inspect_failures
            .insert(name.to_string(), inspects);
        self
    }

    /// Launches `name` without any address on the bridge or a network.
    pub fn without_address(self, name: &str) -> Self {
        self.state
            .lock()
            .unwrap()
            .unaddressable
            .insert(name.to_string());
        self
    }

    /// Adds a container left over from an earlier run.
    pub fn with_existing(self, name: &str, role: NodeRole) -> Self {
        let labels = HashMap::from([
            (LABEL_ROLE.to_string(), role.name().to_string()),
            (LABEL_NODE.to_string(), name.to_string()),
        ]);
        self.state.lock().unwrap().add_container(
            name,
            name.to_string(),
            "couchbase_old.ubuntu14",
            labels,
            HashMap::new(),
            true,
            MOCK_HOST.to_string(),
        );
        self
    }

    /// Adds an unrelated container whose image looks like a server image.
    pub fn with_unlabelled(self, name: &str) -> Self {
        self.state.lock().unwrap().add_container(
            name,
            name.to_string(),
            "couchbase_lookalike",
            HashMap::new(),
            HashMap::new(),
            true,
            MOCK_HOST.to_string(),
        );
        self
    }

    pub fn ops(&self) -> Vec<Op> {
        self.state.lock().unwrap().ops.clone()
    }

    pub fn builds(&self) -> Vec<ImageBuild> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::BuildImage(build) => Some(build),
                _ => None,
            })
            .collect()
    }

    pub fn launches(&self) -> Vec<ContainerLaunch> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::RunContainer(launch) => Some(launch),
                _ => None,
            })
            .collect()
    }

    pub fn services(&self) -> Vec<ServiceLaunch> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::RunService(launch, _) => Some(launch),
                _ => None,
            })
            .collect()
    }

    pub fn execs(&self) -> Vec<(String, Vec<String>, bool)> {
        self.ops()
            .into_iter()
            .filter_map(|op| match op {
                Op::Exec { id, cmd, detached } => Some((id, cmd, detached)),
                _ => None,
            })
            .collect()
    }

    /// Returns true if any call changed engine state.
    pub fn has_side_effects(&self) -> bool {
        self.ops().iter().any(|op| {
            matches!(
                op,
                Op::BuildImage(_)
                    | Op::CreateNetwork(_)
                    | Op::RunContainer(_)
                    | Op::RunService(..)
                    | Op::Exec { .. }
            )
        })
    }
}

struct MockClient {
    state: Arc<Mutex<MockState>>,
    host: String,
}

#[async_trait]
impl EngineClient for MockClient {
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>> {
        Ok(self.state.lock().unwrap().list(filter, &self.host))
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
        self.state.lock().unwrap().inspect(id, Some(&self.host))
    }

    fn host(&self) -> &str {
        &self.host
    }
}

#[async_trait]
impl ContainerManager for MockManager {
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>> {
        Ok(self.state.lock().unwrap().list(filter, MOCK_HOST))
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail> {
        self.state.lock().unwrap().inspect(id, None)
    }

    async fn locate_containers(&self, filter: &ContainerFilter) -> Result<Vec<NodeHandle>> {
        let mut state = self.state.lock().unwrap();
        let mut handles = Vec::new();
        for n in 0..self.participants {
            let host = format!("mock-host-{n}");
            for summary in state.list(filter, &host) {
                handles.push(NodeHandle::new(&summary.id, summary.name()).on_host(&host));
            }
        }
        Ok(handles)
    }

    async fn image_exists(&self, name: &str) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::ImageExists(name.to_string()));
        Ok(state.images.contains(name))
    }

    async fn build_image(&self, build: &ImageBuild) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::BuildImage(build.clone()));
        if state.failing_builds.contains(&build.name) {
            return Err(ProvisionError::image_build_failed(&build.name, "mock build failure"));
        }
        state.images.insert(build.name.clone());
        Ok(())
    }

    async fn create_network(&self, name: &str) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .ops
            .push(Op::CreateNetwork(name.to_string()));
        Ok(())
    }

    async fn run_container(&self, launch: &ContainerLaunch) -> Result<NodeHandle> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::RunContainer(launch.clone()));

        if state.failing_launches.contains(&launch.name) {
            return Err(ProvisionError::launch_failed(&launch.name, "mock launch failure"));
        }
        if state.containers.iter().any(|c| c.detail.name == launch.name) {
            return Err(ProvisionError::launch_failed(&launch.name, "name already in use"));
        }

        let n = state.next_id + 1;
        let networks = launch
            .network
            .iter()
            .map(|net| (net.clone(), format!("10.10.0.{}", n + 1)))
            .collect();
        let id = state.add_container(
            &launch.name,
            launch.name.clone(),
            &launch.image,
            launch.labels.clone(),
            networks,
            launch.network.is_none(),
            MOCK_HOST.to_string(),
        );
        Ok(NodeHandle::new(id, &launch.name).on_host(MOCK_HOST))
    }

    async fn run_service(&self, launch: &ServiceLaunch, attempts: u32) -> Result<NodeHandle> {
        let stalled = {
            let mut state = self.state.lock().unwrap();
            state.ops.push(Op::RunService(launch.clone(), attempts));
            state.stalled.contains(&launch.node_name)
        };
        if stalled {
            std::future::pending::<()>().await;
        }

        // Yield so concurrent launches interleave.
        tokio::task::yield_now().await;

        let mut state = self.state.lock().unwrap();
        if state.failing_launches.contains(&launch.node_name) {
            return Err(ProvisionError::service_creation_failed(
                &launch.name,
                attempts,
                "mock scheduling failure",
            ));
        }

        let n = state.next_id + 1;
        let host = format!("mock-host-{}", n % self.participants);
        let networks = HashMap::from([(INGRESS_NETWORK.to_string(), format!("10.255.0.{}", n + 1))]);
        let id = state.add_container(
            &launch.node_name,
            format!("{}.1.task{n}", launch.name),
            &launch.image,
            launch.labels.clone(),
            networks,
            false,
            host.clone(),
        );
        Ok(NodeHandle::new(id, &launch.node_name).on_host(host))
    }

    async fn exec_in_container(
        &self,
        id: &str,
        cmd: &[String],
        detached: bool,
    ) -> Result<ExecOutput> {
        let mut state = self.state.lock().unwrap();
        state.ops.push(Op::Exec {
            id: id.to_string(),
            cmd: cmd.to_vec(),
            detached,
        });
        if state.failing_exec {
            return Err(ProvisionError::exec_failed(id, "exit code 1: bootstrap failed"));
        }
        Ok(ExecOutput::new("", "", 0))
    }

    fn client_for_handle(&self, handle: &NodeHandle) -> Arc<dyn EngineClient> {
        self.state
            .lock()
            .unwrap()
            .ops
            .push(Op::ClientFor(handle.host.clone()));
        Arc::new(MockClient {
            state: Arc::clone(&self.state),
            host: handle.host.clone().unwrap_or_else(|| MOCK_HOST.to_string()),
        })
    }

    fn session_kind(&self) -> SessionKind {
        self.kind
    }

    fn participant_count(&self) -> usize {
        self.participants
    }
}

/// Creates a config root holding `providers/docker/options.yml`.
pub fn config_root(options_yaml: &str) -> tempfile::TempDir {
    let dir = tempfile::tempdir().unwrap();
    write_file(dir.path(), crate::options::DEFAULT_OPTIONS_PATH, options_yaml);
    dir
}

/// Writes `content` to `relative` under `root`, creating parent directories.
pub fn write_file(root: &Path, relative: &str, content: &str) {
    let path = root.join(relative);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(path, content).unwrap();
}

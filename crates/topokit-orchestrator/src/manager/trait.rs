//! Container manager trait definition.
//!
//! The container manager owns the engine session. Providers never talk to
//! the engine directly; they describe launches and builds and hand them to
//! a manager through this trait.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::container::{
    ContainerDetail, ContainerFilter, ContainerLaunch, ContainerSummary, ExecOutput, ImageBuild,
    NodeHandle, ServiceLaunch,
};
use crate::error::Result;

/// Read-only access to one engine host.
///
/// A multi-host session holds one client per host; a container can only
/// be inspected through the client of the host that runs it.
#[async_trait]
pub trait EngineClient: Send + Sync {
    /// Lists containers matching `filter`.
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>>;

    /// Inspects a container by ID or name.
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail>;

    /// Returns the host name of this client's engine.
    fn host(&self) -> &str;
}

/// Whether a session drives a single engine host or a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionKind {
    /// One engine host.
    SingleHost,

    /// A cluster of engine hosts scheduling services.
    MultiHost,
}

impl SessionKind {
    /// Returns the name of this kind.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SingleHost => "single-host",
            Self::MultiHost => "multi-host",
        }
    }
}

impl fmt::Display for SessionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Engine operations the providers depend on.
///
/// # Thread Safety
///
/// Implementations must be `Send + Sync`; the multi-host provider calls a
/// shared manager from one task per node.
#[async_trait]
pub trait ContainerManager: Send + Sync {
    /// Lists containers on the session's primary host.
    async fn list_containers(&self, filter: &ContainerFilter) -> Result<Vec<ContainerSummary>>;

    /// Inspects a container on the session's primary host.
    async fn inspect_container(&self, id: &str) -> Result<ContainerDetail>;

    /// Finds matching containers on every participant host.
    ///
    /// Each handle records the host it was found on, so
    /// [`client_for_handle`](Self::client_for_handle) resolves to the owner.
    async fn locate_containers(&self, filter: &ContainerFilter) -> Result<Vec<NodeHandle>>;

    /// Returns true if an image with this exact tag exists.
    async fn image_exists(&self, name: &str) -> Result<bool>;

    /// Builds an image from a local context directory.
    async fn build_image(&self, build: &ImageBuild) -> Result<()>;

    /// Creates a named network, reusing one that already exists.
    async fn create_network(&self, name: &str) -> Result<()>;

    /// Creates and starts a container.
    async fn run_container(&self, launch: &ContainerLaunch) -> Result<NodeHandle>;

    /// Creates a cluster service and waits for its task container.
    ///
    /// Creation is attempted at most `attempts` times.
    async fn run_service(&self, launch: &ServiceLaunch, attempts: u32) -> Result<NodeHandle>;

    /// Runs a command inside a container.
    ///
    /// When `detached` is false the call waits for the command and fails on
    /// a non-zero exit code.
    async fn exec_in_container(
        &self,
        id: &str,
        cmd: &[String],
        detached: bool,
    ) -> Result<ExecOutput>;

    /// Returns the client for the host that owns `handle`.
    fn client_for_handle(&self, handle: &NodeHandle) -> Arc<dyn EngineClient>;

    /// Returns whether the session is a single host or a cluster.
    fn session_kind(&self) -> SessionKind;

    /// Returns the number of hosts taking part in the session.
    fn participant_count(&self) -> usize;
}

/// A shared container manager.
pub type SharedManager = Arc<dyn ContainerManager>;

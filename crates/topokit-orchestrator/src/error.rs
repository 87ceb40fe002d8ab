//! Error types for the orchestrator crate.
//!
//! Configuration errors abort a provisioning call. Build errors are logged
//! by the callers and do not stop a launch. Launch and engine errors are
//! fatal for the node they belong to.

use thiserror::Error;
use topokit_core::TopologyError;

/// Result type for provisioning operations.
pub type Result<T> = std::result::Result<T, ProvisionError>;

/// Errors that can occur while provisioning a topology.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// The backend selector names no known provider.
    #[error("unknown provider: {0}")]
    UnknownProvider(String),

    /// The backend cannot create the requested network.
    #[error("network {network} is not supported on the {provider} provider")]
    UnsupportedNetwork {
        /// Provider kind.
        provider: String,
        /// Requested network name.
        network: String,
    },

    /// Gateways were requested with an OS family other than CentOS.
    #[error("gateway nodes only support centos7, got {0}")]
    UnsupportedGatewayOs(String),

    /// Gateways were requested on a backend that cannot provision them.
    #[error("gateway provisioning is not supported on the {0} provider")]
    GatewaysUnsupported(String),

    /// Gateways were requested before any server was running.
    #[error("gateway provisioning requires at least one running server")]
    MissingUpstream,

    /// A version string lacks the `-<build>` suffix.
    #[error("unexpected build format: [{0}] i.e '4.5.0-1221' required")]
    InvalidVersionFormat(String),

    /// A version is older than every known flavor.
    #[error("unsupported version: {0}")]
    UnsupportedVersion(String),

    /// Image build failed.
    #[error("failed to build image {image}: {reason}")]
    ImageBuildFailed {
        /// Image name.
        image: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Container creation or start failed.
    #[error("failed to launch {name}: {reason}")]
    LaunchFailed {
        /// Node name.
        name: String,
        /// Reason for the failure.
        reason: String,
    },

    /// Cluster service creation failed after the attempt budget.
    #[error("failed to create service {name} after {attempts} attempts: {reason}")]
    ServiceCreationFailed {
        /// Service name.
        name: String,
        /// Attempts made.
        attempts: u32,
        /// Last failure.
        reason: String,
    },

    /// Exec returned a non-zero exit code or could not run.
    #[error("exec failed in container {container_id}: {reason}")]
    ExecFailed {
        /// Container ID.
        container_id: String,
        /// Reason for the failure.
        reason: String,
    },

    /// No container matches a name or ID.
    #[error("container not found: {0}")]
    ContainerNotFound(String),

    /// Timeout waiting for a condition.
    #[error("timeout waiting for {condition}")]
    Timeout {
        /// The condition that timed out.
        condition: String,
    },

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Topology error.
    #[error(transparent)]
    Topology(#[from] TopologyError),

    /// Docker API error.
    #[error("Docker API error: {0}")]
    DockerApi(#[from] bollard::errors::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl ProvisionError {
    /// Creates an unsupported network error.
    pub fn unsupported_network(provider: impl Into<String>, network: impl Into<String>) -> Self {
        Self::UnsupportedNetwork {
            provider: provider.into(),
            network: network.into(),
        }
    }

    /// Creates a gateways unsupported error.
    pub fn gateways_unsupported(provider: impl Into<String>) -> Self {
        Self::GatewaysUnsupported(provider.into())
    }

    /// Creates an image build failed error.
    pub fn image_build_failed(image: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ImageBuildFailed {
            image: image.into(),
            reason: reason.into(),
        }
    }

    /// Creates a launch failed error.
    pub fn launch_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::LaunchFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Creates a service creation failed error.
    pub fn service_creation_failed(
        name: impl Into<String>,
        attempts: u32,
        reason: impl Into<String>,
    ) -> Self {
        Self::ServiceCreationFailed {
            name: name.into(),
            attempts,
            reason: reason.into(),
        }
    }

    /// Creates an exec failed error.
    pub fn exec_failed(id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::ExecFailed {
            container_id: id.into(),
            reason: reason.into(),
        }
    }

    /// Creates a container not found error.
    pub fn container_not_found(id: impl Into<String>) -> Self {
        Self::ContainerNotFound(id.into())
    }

    /// Creates a timeout error.
    pub fn timeout(condition: impl Into<String>) -> Self {
        Self::Timeout {
            condition: condition.into(),
        }
    }

    /// Creates a configuration error.
    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration(reason.into())
    }

    /// Returns true if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::DockerApi(_) | Self::Io(_) | Self::LaunchFailed { .. }
        )
    }

    /// Returns true if this error must abort the whole provisioning call.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownProvider(_)
                | Self::UnsupportedNetwork { .. }
                | Self::UnsupportedGatewayOs(_)
                | Self::GatewaysUnsupported(_)
                | Self::MissingUpstream
                | Self::Configuration(_)
                | Self::Topology(_)
        )
    }
}

impl From<serde_json::Error> for ProvisionError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for ProvisionError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

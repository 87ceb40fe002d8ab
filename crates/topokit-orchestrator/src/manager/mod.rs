//! Container engine managers.
//!
//! The [`ContainerManager`] trait is the seam between the providers and the
//! container engine. [`DockerSession`] implements it over bollard.

mod docker;
mod r#trait;

pub use docker::{
    DockerClient, DockerSession, DockerSessionConfig, DockerSessionConfigBuilder, LOCAL_ENDPOINT,
};
pub use r#trait::{ContainerManager, EngineClient, SessionKind, SharedManager};

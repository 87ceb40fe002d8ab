//! Container launch specifications and engine handles.
//!
//! This module provides the types providers use to describe launches and
//! builds, and the handles and inspection results the engine hands back.

mod handle;
mod spec;

pub use handle::{
    ContainerDetail, ContainerFilter, ContainerSummary, ExecOutput, NodeHandle, INGRESS_NETWORK,
};
pub use spec::{
    service_name, ContainerLaunch, ImageBuild, PortBinding, ResourceLimits, ServiceLaunch,
    LABEL_NODE, LABEL_ROLE,
};

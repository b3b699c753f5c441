//! Backend selection, startup and readiness.
//!
//! A [`Manager`] turns a service name and version into a [`Starter`]. The
//! starter brings up one backend (a container or a driver process) and returns
//! a [`SessionHandle`] carrying the endpoint and the teardown action. The
//! [`ReadinessWaiter`] then polls the endpoint until it answers.
//!
//! ```text
//!   find(name, version) ──► Starter ──► start_with_cancel() ──► SessionHandle
//!                                                                   │
//!                                          ReadinessWaiter::wait(endpoint)
//! ```

pub mod container;
pub mod descriptor;
pub mod engine;
pub mod handle;
pub mod manager;
pub mod process;
pub mod readiness;

use std::fmt;

use async_trait::async_trait;

pub use container::ContainerStarter;
pub use descriptor::{BackendSpec, ResolvedService, ServiceDescriptor, ServiceLookup};
pub use engine::{
    ContainerEngine, ContainerLogConfig, ContainerNetwork, ContainerSpec, DockerEngine,
    connect_docker,
};
pub use handle::{BackendId, CancelHandle, SessionHandle};
pub use manager::DefaultManager;
pub use process::ProcessStarter;
pub use readiness::{HttpProbe, Probe, ReadinessState, ReadinessWaiter};

use crate::error::StartError;

/// Which kind of backend a starter produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    /// A container from an image.
    Container,
    /// A locally spawned driver process.
    Process,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container => write!(f, "container"),
            Self::Process => write!(f, "process"),
        }
    }
}

/// Brings up one backend per call.
#[async_trait]
pub trait Starter: Send + Sync {
    /// Backend kind, for diagnostics.
    fn kind(&self) -> BackendKind;

    /// Start a backend and return its endpoint with a teardown handle.
    ///
    /// On error, nothing started by this call is left running.
    async fn start_with_cancel(&self) -> Result<SessionHandle, StartError>;
}

/// Chooses a starter for a requested service.
pub trait Manager: Send + Sync {
    /// `None` when the service is unknown or cannot run in this configuration.
    fn find(&self, name: &str, version: Option<&str>) -> Option<Box<dyn Starter>>;
}

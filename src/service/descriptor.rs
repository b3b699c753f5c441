//! Service descriptors and the lookup contract.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// How a service backend is instantiated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum BackendSpec {
    /// Container image reference, e.g. `selenoid/chrome:90.0`.
    ContainerImage(String),
    /// Driver executable followed by its arguments.
    DriverCommand(Vec<String>),
}

/// Everything needed to start one version of a service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServiceDescriptor {
    /// Backend payload.
    pub image: BackendSpec,
    /// Port the backend listens on inside its container.
    #[serde(default = "default_port")]
    pub port: String,
    /// Path appended to the endpoint URL.
    #[serde(default)]
    pub path: String,
    /// tmpfs mounts for containers (mount point to options).
    #[serde(default)]
    pub tmpfs: BTreeMap<String, String>,
    /// Extra `KEY=value` environment entries.
    #[serde(default)]
    pub env: Vec<String>,
    /// Shared memory size for containers, in bytes.
    #[serde(default)]
    pub shm_size: Option<i64>,
    /// Run the container privileged.
    #[serde(default)]
    pub privileged: bool,
}

fn default_port() -> String {
    "4444".to_string()
}

impl ServiceDescriptor {
    /// Descriptor for a container image with default settings.
    pub fn container(image: impl Into<String>) -> Self {
        Self::with_spec(BackendSpec::ContainerImage(image.into()))
    }

    /// Descriptor for a driver command with default settings.
    pub fn driver<I, S>(command: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::with_spec(BackendSpec::DriverCommand(
            command.into_iter().map(Into::into).collect(),
        ))
    }

    fn with_spec(image: BackendSpec) -> Self {
        Self {
            image,
            port: default_port(),
            path: String::new(),
            tmpfs: BTreeMap::new(),
            env: Vec::new(),
            shm_size: None,
            privileged: false,
        }
    }

    /// Set the endpoint path.
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self
    }

    /// Set the service port.
    pub fn with_port(mut self, port: impl Into<String>) -> Self {
        self.port = port.into();
        self
    }
}

/// A lookup hit: the descriptor plus the concrete version it resolved to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedService {
    /// Service name as requested.
    pub name: String,
    /// Version the request resolved to.
    pub version: String,
    /// Descriptor for that version.
    pub descriptor: ServiceDescriptor,
}

/// Resolves a service name and optional version to a descriptor.
///
/// Implementations must be free of side effects.
pub trait ServiceLookup: Send + Sync {
    /// Find the descriptor for `name`, `None` when nothing matches.
    fn find(&self, name: &str, version: Option<&str>) -> Option<ResolvedService>;
}

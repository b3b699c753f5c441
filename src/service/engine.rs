//! Container engine contract and its Docker implementation.

use std::collections::{BTreeMap, HashMap};

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    Config, CreateContainerOptions, RemoveContainerOptions, StartContainerOptions,
};
use bollard::models::{HostConfig, HostConfigLogConfig, PortBinding};

use crate::error::EngineError;

/// Default shared memory size for containers (256 MiB).
pub const DEFAULT_SHM_SIZE: i64 = 256 * 1024 * 1024;

/// Log routing for created containers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerLogConfig {
    /// Log driver name (`json-file`, `syslog`, ...). `None` keeps the daemon default.
    pub driver: Option<String>,
    /// Driver options.
    pub options: BTreeMap<String, String>,
}

/// Parameters for creating a service container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Container name, if any.
    pub name: Option<String>,
    /// Image reference.
    pub image: String,
    /// Port exposed by the service, without protocol suffix.
    pub port: String,
    /// `KEY=value` environment entries.
    pub env: Vec<String>,
    /// tmpfs mounts.
    pub tmpfs: BTreeMap<String, String>,
    /// Shared memory size in bytes.
    pub shm_size: i64,
    /// Whether the container runs privileged.
    pub privileged: bool,
    /// Log routing.
    pub log_config: ContainerLogConfig,
}

/// Network facts about a started container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerNetwork {
    /// Address of the container on its network, if it has one.
    pub ip_address: Option<String>,
    /// Host ports the service port is published on.
    pub host_ports: Vec<String>,
}

/// The subset of a container engine the broker needs.
///
/// Shared across concurrent sessions; implementations must tolerate
/// concurrent calls.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Create a container and return its ID.
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    /// Start a created container.
    async fn start_container(&self, id: &str) -> Result<(), EngineError>;

    /// Report where `port` of a running container can be reached.
    async fn inspect_network(&self, id: &str, port: &str) -> Result<ContainerNetwork, EngineError>;

    /// Stop and remove a container.
    async fn remove_container(&self, id: &str) -> Result<(), EngineError>;
}

/// Connect to the local Docker daemon and check that it answers.
///
/// Tries bollard's local defaults (`DOCKER_HOST` or the standard socket) first,
/// then the rootless socket under `$XDG_RUNTIME_DIR`.
pub async fn connect_docker() -> Result<Docker, EngineError> {
    let default_error = match Docker::connect_with_local_defaults() {
        Ok(docker) => match docker.ping().await {
            Ok(_) => return Ok(docker),
            Err(e) => e.to_string(),
        },
        Err(e) => e.to_string(),
    };

    #[cfg(unix)]
    if let Some(runtime_dir) = std::env::var_os("XDG_RUNTIME_DIR") {
        let socket = std::path::Path::new(&runtime_dir).join("docker.sock");
        if socket.exists() {
            let socket = socket.to_string_lossy().into_owned();
            if let Ok(docker) =
                Docker::connect_with_socket(&socket, 120, bollard::API_DEFAULT_VERSION)
                && docker.ping().await.is_ok()
            {
                tracing::debug!(socket = %socket, "Connected to rootless Docker");
                return Ok(docker);
            }
        }
    }

    Err(EngineError::Unavailable {
        reason: default_error,
    })
}

/// [`ContainerEngine`] backed by the Docker API.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Wrap an existing connection.
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect to the local daemon.
    pub async fn connect() -> Result<Self, EngineError> {
        Ok(Self::new(connect_docker().await?))
    }
}

fn request_error(operation: &'static str, e: bollard::errors::Error) -> EngineError {
    EngineError::Request {
        operation,
        reason: e.to_string(),
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        let exposed = format!("{}/tcp", spec.port);

        // Publish on all interfaces with a dynamic host port.
        let port_bindings = HashMap::from([(
            exposed.clone(),
            Some(vec![PortBinding {
                host_ip: Some("0.0.0.0".to_string()),
                host_port: None,
            }]),
        )]);

        let log_config = spec.log_config.driver.as_ref().map(|driver| HostConfigLogConfig {
            typ: Some(driver.clone()),
            config: if spec.log_config.options.is_empty() {
                None
            } else {
                Some(spec.log_config.options.clone().into_iter().collect())
            },
        });

        let host_config = HostConfig {
            port_bindings: Some(port_bindings),
            log_config,
            tmpfs: if spec.tmpfs.is_empty() {
                None
            } else {
                Some(spec.tmpfs.clone().into_iter().collect())
            },
            shm_size: Some(spec.shm_size),
            privileged: Some(spec.privileged),
            // Removal is explicit so cancel() controls the lifetime.
            auto_remove: Some(false),
            ..Default::default()
        };

        let config = Config {
            image: Some(spec.image.clone()),
            hostname: Some("localhost".to_string()),
            env: if spec.env.is_empty() {
                None
            } else {
                Some(spec.env.clone())
            },
            exposed_ports: Some(HashMap::from([(exposed, HashMap::new())])),
            host_config: Some(host_config),
            ..Default::default()
        };

        let options = spec.name.as_ref().map(|name| CreateContainerOptions {
            name: name.clone(),
            ..Default::default()
        });

        let response = self
            .docker
            .create_container(options, config)
            .await
            .map_err(|e| request_error("create", e))?;

        for warning in &response.warnings {
            tracing::warn!(container_id = %response.id, "Docker: {}", warning);
        }

        Ok(response.id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .start_container(id, None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| request_error("start", e))
    }

    async fn inspect_network(&self, id: &str, port: &str) -> Result<ContainerNetwork, EngineError> {
        let info = self
            .docker
            .inspect_container(id, None)
            .await
            .map_err(|e| request_error("inspect", e))?;

        let settings = info.network_settings.unwrap_or_default();
        let key = format!("{port}/tcp");

        let host_ports = settings
            .ports
            .as_ref()
            .and_then(|ports| ports.get(&key))
            .and_then(Option::as_ref)
            .map(|bindings| {
                bindings
                    .iter()
                    .filter_map(|binding| binding.host_port.clone())
                    .filter(|port| !port.is_empty())
                    .collect()
            })
            .unwrap_or_default();

        Ok(ContainerNetwork {
            ip_address: settings.ip_address.filter(|ip| !ip.is_empty()),
            host_ports,
        })
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        self.docker
            .remove_container(
                id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await
            .map_err(|e| request_error("remove", e))
    }
}

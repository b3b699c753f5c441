//! Default backend selection.

use std::sync::Arc;

use crate::service::{
    BackendSpec, ContainerEngine, ContainerLogConfig, ContainerStarter, Manager, ProcessStarter,
    ServiceLookup, Starter,
};

/// Picks a container or process starter from the looked-up descriptor.
///
/// Container images need an engine; without one they are reported as not found.
pub struct DefaultManager {
    ip: Option<String>,
    engine: Option<Arc<dyn ContainerEngine>>,
    lookup: Arc<dyn ServiceLookup>,
    log_config: ContainerLogConfig,
}

impl DefaultManager {
    /// Manager without a container engine; only driver commands can start.
    pub fn new(lookup: Arc<dyn ServiceLookup>) -> Self {
        Self {
            ip: None,
            engine: None,
            lookup,
            log_config: ContainerLogConfig::default(),
        }
    }

    /// Use `engine` for container-backed services.
    pub fn with_engine(mut self, engine: Arc<dyn ContainerEngine>) -> Self {
        self.engine = Some(engine);
        self
    }

    /// Reach containers through `ip` and their published ports.
    pub fn with_host_ip(mut self, ip: impl Into<String>) -> Self {
        self.ip = Some(ip.into());
        self
    }

    /// Apply `log_config` to every created container.
    pub fn with_log_config(mut self, log_config: ContainerLogConfig) -> Self {
        self.log_config = log_config;
        self
    }
}

impl Manager for DefaultManager {
    fn find(&self, name: &str, version: Option<&str>) -> Option<Box<dyn Starter>> {
        tracing::info!(service = %name, version = version.unwrap_or_default(), "Locating service");

        let Some(service) = self.lookup.find(name, version) else {
            tracing::info!(service = %name, "Service not found");
            return None;
        };

        match service.descriptor.image.clone() {
            BackendSpec::ContainerImage(image) => {
                let Some(engine) = &self.engine else {
                    tracing::info!(
                        service = %name,
                        image = %image,
                        "Container engine not configured, cannot start image"
                    );
                    return None;
                };
                tracing::info!(
                    service = %name,
                    version = %service.version,
                    image = %image,
                    "Using container"
                );
                Some(Box::new(ContainerStarter::new(
                    self.ip.clone(),
                    Arc::clone(engine),
                    service,
                    image,
                    self.log_config.clone(),
                )))
            }
            BackendSpec::DriverCommand(command) => {
                tracing::info!(
                    service = %name,
                    version = %service.version,
                    command = ?command,
                    "Using driver"
                );
                Some(Box::new(ProcessStarter::new(service, command)))
            }
        }
    }
}

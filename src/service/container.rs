//! Container-backed sessions.

use std::sync::Arc;

use async_trait::async_trait;
use url::Url;
use uuid::Uuid;

use crate::error::StartError;
use crate::service::engine::{
    ContainerEngine, ContainerLogConfig, ContainerNetwork, ContainerSpec, DEFAULT_SHM_SIZE,
};
use crate::service::handle::{BackendId, CancelHandle, SessionHandle, endpoint_url, join_host_port};
use crate::service::{BackendKind, ResolvedService, Starter};

/// Starts one container per session.
pub struct ContainerStarter {
    ip: Option<String>,
    engine: Arc<dyn ContainerEngine>,
    service: ResolvedService,
    image: String,
    log_config: ContainerLogConfig,
}

impl ContainerStarter {
    /// Create a starter for `image`.
    ///
    /// With `ip` set, the endpoint is `ip` plus the published host port;
    /// otherwise it is the container's own address plus the service port.
    pub fn new(
        ip: Option<String>,
        engine: Arc<dyn ContainerEngine>,
        service: ResolvedService,
        image: String,
        log_config: ContainerLogConfig,
    ) -> Self {
        Self {
            ip,
            engine,
            service,
            image,
            log_config,
        }
    }

    fn container_spec(&self, session_id: Uuid) -> ContainerSpec {
        let descriptor = &self.service.descriptor;
        ContainerSpec {
            name: Some(format!("session-broker-{session_id}")),
            image: self.image.clone(),
            port: descriptor.port.clone(),
            env: descriptor.env.clone(),
            tmpfs: descriptor.tmpfs.clone(),
            shm_size: descriptor.shm_size.unwrap_or(DEFAULT_SHM_SIZE),
            privileged: descriptor.privileged,
            log_config: self.log_config.clone(),
        }
    }

    /// Start the created container and work out its endpoint.
    async fn publish(&self, id: &str) -> Result<Url, StartError> {
        let port = &self.service.descriptor.port;
        let start_failed = |source| StartError::ContainerStartFailed {
            id: id.to_string(),
            source,
        };

        self.engine.start_container(id).await.map_err(start_failed)?;
        let network = self
            .engine
            .inspect_network(id, port)
            .await
            .map_err(start_failed)?;

        let authority = self.authority(id, &network)?;
        endpoint_url(&authority, &self.service.descriptor.path)
    }

    fn authority(&self, id: &str, network: &ContainerNetwork) -> Result<String, StartError> {
        let port = &self.service.descriptor.port;
        let not_published = || StartError::PortNotPublished {
            id: id.to_string(),
            port: port.clone(),
        };

        match &self.ip {
            Some(ip) => {
                let host_port = network.host_ports.first().ok_or_else(not_published)?;
                Ok(join_host_port(ip, host_port))
            }
            None => {
                let address = network.ip_address.as_ref().ok_or_else(not_published)?;
                Ok(join_host_port(address, port))
            }
        }
    }
}

async fn remove_container(engine: &dyn ContainerEngine, id: &str) {
    match engine.remove_container(id).await {
        Ok(()) => tracing::info!(container_id = %id, "Removed container"),
        Err(e) => tracing::warn!(container_id = %id, error = %e, "Failed to remove container"),
    }
}

#[async_trait]
impl Starter for ContainerStarter {
    fn kind(&self) -> BackendKind {
        BackendKind::Container
    }

    async fn start_with_cancel(&self) -> Result<SessionHandle, StartError> {
        let session_id = Uuid::new_v4();
        let spec = self.container_spec(session_id);

        let id = self
            .engine
            .create_container(&spec)
            .await
            .map_err(|source| StartError::ContainerCreationFailed {
                image: self.image.clone(),
                source,
            })?;
        tracing::debug!(container_id = %id, image = %self.image, "Created container");

        let endpoint = match self.publish(&id).await {
            Ok(endpoint) => endpoint,
            Err(e) => {
                remove_container(self.engine.as_ref(), &id).await;
                return Err(e);
            }
        };

        tracing::info!(
            service = %self.service.name,
            version = %self.service.version,
            container_id = %id,
            endpoint = %endpoint,
            "Started container"
        );

        let engine = Arc::clone(&self.engine);
        let container_id = id.clone();
        let cancel = CancelHandle::new(BackendId::Container(id), move || async move {
            remove_container(engine.as_ref(), &container_id).await;
        });

        Ok(SessionHandle::new(session_id, endpoint, cancel))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::service::ServiceDescriptor;
    use crate::testing::{FakeEngine, FakeEngineBehavior};

    fn resolved(descriptor: ServiceDescriptor) -> ResolvedService {
        ResolvedService {
            name: "chrome".to_string(),
            version: "90.0".to_string(),
            descriptor,
        }
    }

    fn starter(engine: Arc<FakeEngine>, ip: Option<&str>) -> ContainerStarter {
        ContainerStarter::new(
            ip.map(str::to_string),
            engine,
            resolved(ServiceDescriptor::container("selenoid/chrome:90.0").with_path("/wd/hub")),
            "selenoid/chrome:90.0".to_string(),
            ContainerLogConfig::default(),
        )
    }

    #[tokio::test]
    async fn test_endpoint_uses_host_ip_and_published_port() {
        let engine = Arc::new(FakeEngine::new(FakeEngineBehavior {
            host_port: Some("32768".to_string()),
            ..Default::default()
        }));

        let handle = starter(Arc::clone(&engine), Some("10.0.0.5"))
            .start_with_cancel()
            .await
            .unwrap();

        assert_eq!(handle.endpoint.as_str(), "http://10.0.0.5:32768/wd/hub");
        assert!(matches!(handle.backend(), BackendId::Container(_)));
        assert_eq!(engine.running().len(), 1);

        handle.cancel().await;
        assert!(engine.containers().is_empty());
    }

    #[tokio::test]
    async fn test_endpoint_without_host_ip_uses_container_address() {
        let engine = Arc::new(FakeEngine::new(FakeEngineBehavior {
            ip_address: Some("172.17.0.3".to_string()),
            ..Default::default()
        }));

        let handle = starter(Arc::clone(&engine), None)
            .start_with_cancel()
            .await
            .unwrap();
        assert_eq!(handle.endpoint.as_str(), "http://172.17.0.3:4444/wd/hub");
        handle.cancel().await;
    }

    #[tokio::test]
    async fn test_container_spec_from_descriptor() {
        let engine = Arc::new(FakeEngine::new(FakeEngineBehavior {
            host_port: Some("32768".to_string()),
            ..Default::default()
        }));
        let mut descriptor = ServiceDescriptor::container("selenoid/chrome:90.0");
        descriptor.tmpfs.insert("/tmp".to_string(), "size=64m".to_string());
        descriptor.env.push("TZ=UTC".to_string());
        descriptor.privileged = true;

        let log_config = ContainerLogConfig {
            driver: Some("syslog".to_string()),
            ..Default::default()
        };
        let starter = ContainerStarter::new(
            Some("127.0.0.1".to_string()),
            Arc::clone(&engine) as Arc<dyn ContainerEngine>,
            resolved(descriptor),
            "selenoid/chrome:90.0".to_string(),
            log_config.clone(),
        );

        starter.start_with_cancel().await.unwrap().cancel().await;

        let specs = engine.created_specs();
        assert_eq!(specs.len(), 1);
        let spec = &specs[0];
        assert_eq!(spec.image, "selenoid/chrome:90.0");
        assert_eq!(spec.port, "4444");
        assert_eq!(spec.env, vec!["TZ=UTC".to_string()]);
        assert_eq!(spec.tmpfs.get("/tmp").map(String::as_str), Some("size=64m"));
        assert_eq!(spec.shm_size, DEFAULT_SHM_SIZE);
        assert_eq!(spec.log_config, log_config);
        assert!(spec.privileged);
        assert!(spec.name.as_deref().is_some_and(|n| n.starts_with("session-broker-")));
    }

    #[tokio::test]
    async fn test_unprivileged_by_default() {
        let engine = Arc::new(FakeEngine::new(FakeEngineBehavior {
            host_port: Some("32768".to_string()),
            ..Default::default()
        }));

        starter(Arc::clone(&engine), Some("127.0.0.1"))
            .start_with_cancel()
            .await
            .unwrap()
            .cancel()
            .await;

        assert!(!engine.created_specs()[0].privileged);
    }

    #[tokio::test]
    async fn test_create_failure_leaves_nothing() {
        let engine = Arc::new(FakeEngine::new(FakeEngineBehavior {
            fail_create: true,
            ..Default::default()
        }));

        let err = starter(Arc::clone(&engine), Some("127.0.0.1"))
            .start_with_cancel()
            .await
            .unwrap_err();
        assert!(matches!(err, StartError::ContainerCreationFailed { .. }));
        assert!(engine.containers().is_empty());
    }

    #[tokio::test]
    async fn test_start_failure_removes_container() {
        let engine = Arc::new(FakeEngine::new(FakeEngineBehavior {
            fail_start: true,
            host_port: Some("32768".to_string()),
            ..Default::default()
        }));

        let err = starter(Arc::clone(&engine), Some("127.0.0.1"))
            .start_with_cancel()
            .await
            .unwrap_err();
        assert!(matches!(err, StartError::ContainerStartFailed { .. }));
        assert!(engine.containers().is_empty());
        assert_eq!(engine.removed().len(), 1);
    }

    #[tokio::test]
    async fn test_missing_port_binding_removes_container() {
        let engine = Arc::new(FakeEngine::new(FakeEngineBehavior::default()));

        let err = starter(Arc::clone(&engine), Some("127.0.0.1"))
            .start_with_cancel()
            .await
            .unwrap_err();
        assert!(matches!(err, StartError::PortNotPublished { ref port, .. } if port == "4444"));
        assert!(engine.running().is_empty());
        assert!(engine.containers().is_empty());
    }
}

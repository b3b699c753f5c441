//! In-memory fakes for exercising the broker without Docker.
//!
//! Provides:
//! - [`FakeEngine`]: a [`ContainerEngine`] that records containers in memory
//! - [`FakeEngineBehavior`]: what the fake reports and which calls fail
//! - [`StaticLookup`]: a [`ServiceLookup`] built in code
//!
//! # Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use session_broker::service::{DefaultManager, ServiceDescriptor};
//! use session_broker::testing::{FakeEngine, FakeEngineBehavior, StaticLookup};
//!
//! let engine = Arc::new(FakeEngine::new(FakeEngineBehavior {
//!     host_port: Some("32768".to_string()),
//!     ..Default::default()
//! }));
//! let lookup = StaticLookup::default()
//!     .with("chrome", "90.0", ServiceDescriptor::container("selenoid/chrome:90.0"));
//! let manager = DefaultManager::new(Arc::new(lookup))
//!     .with_engine(engine)
//!     .with_host_ip("127.0.0.1");
//! ```

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::error::EngineError;
use crate::service::{
    ContainerEngine, ContainerNetwork, ContainerSpec, ResolvedService, ServiceDescriptor,
    ServiceLookup,
};

/// How a [`FakeEngine`] responds.
#[derive(Debug, Clone, Default)]
pub struct FakeEngineBehavior {
    /// Fail `create_container`.
    pub fail_create: bool,
    /// Fail `start_container`.
    pub fail_start: bool,
    /// Fail `inspect_network`.
    pub fail_inspect: bool,
    /// Host port reported for the service port.
    pub host_port: Option<String>,
    /// Container address reported by inspection.
    pub ip_address: Option<String>,
}

#[derive(Debug, Clone)]
struct FakeContainer {
    spec: ContainerSpec,
    running: bool,
}

/// Container engine that keeps everything in memory.
#[derive(Debug, Default)]
pub struct FakeEngine {
    behavior: FakeEngineBehavior,
    next_id: AtomicU32,
    containers: Mutex<BTreeMap<String, FakeContainer>>,
    created: Mutex<Vec<ContainerSpec>>,
    removed: Mutex<Vec<String>>,
}

impl FakeEngine {
    pub fn new(behavior: FakeEngineBehavior) -> Self {
        Self {
            behavior,
            ..Default::default()
        }
    }

    /// IDs of containers that exist (created and not removed).
    pub fn containers(&self) -> Vec<String> {
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// IDs of containers that are started and not removed.
    pub fn running(&self) -> Vec<String> {
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(_, c)| c.running)
            .map(|(id, _)| id.clone())
            .collect()
    }

    /// IDs passed to `remove_container`, in call order.
    pub fn removed(&self) -> Vec<String> {
        self.removed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Every spec passed to `create_container`, including failed ones.
    pub fn created_specs(&self) -> Vec<ContainerSpec> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn rejected(operation: &'static str) -> EngineError {
        EngineError::Request {
            operation,
            reason: "rejected by fake engine".to_string(),
        }
    }

    fn missing(operation: &'static str, id: &str) -> EngineError {
        EngineError::Request {
            operation,
            reason: format!("no such container: {id}"),
        }
    }
}

#[async_trait]
impl ContainerEngine for FakeEngine {
    async fn create_container(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        self.created
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(spec.clone());
        if self.behavior.fail_create {
            return Err(Self::rejected("create"));
        }

        let id = format!("fake-{}", self.next_id.fetch_add(1, Ordering::SeqCst));
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id.clone(),
                FakeContainer {
                    spec: spec.clone(),
                    running: false,
                },
            );
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), EngineError> {
        if self.behavior.fail_start {
            return Err(Self::rejected("start"));
        }
        let mut containers = self.containers.lock().unwrap_or_else(PoisonError::into_inner);
        let container = containers
            .get_mut(id)
            .ok_or_else(|| Self::missing("start", id))?;
        container.running = true;
        Ok(())
    }

    async fn inspect_network(&self, id: &str, port: &str) -> Result<ContainerNetwork, EngineError> {
        if self.behavior.fail_inspect {
            return Err(Self::rejected("inspect"));
        }
        let containers = self.containers.lock().unwrap_or_else(PoisonError::into_inner);
        let container = containers
            .get(id)
            .ok_or_else(|| Self::missing("inspect", id))?;

        // Only the exposed port is published.
        let host_ports = match &self.behavior.host_port {
            Some(host_port) if container.spec.port == port => vec![host_port.clone()],
            _ => Vec::new(),
        };
        Ok(ContainerNetwork {
            ip_address: self.behavior.ip_address.clone(),
            host_ports,
        })
    }

    async fn remove_container(&self, id: &str) -> Result<(), EngineError> {
        self.removed
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(id.to_string());
        self.containers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .map(|_| ())
            .ok_or_else(|| Self::missing("remove", id))
    }
}

/// Lookup table built in code.
///
/// Versions match exactly. Without a version, the first one registered for
/// the service is used.
#[derive(Debug, Clone, Default)]
pub struct StaticLookup {
    entries: Vec<ResolvedService>,
}

impl StaticLookup {
    /// Register `descriptor` as `name`/`version`.
    pub fn with(
        mut self,
        name: impl Into<String>,
        version: impl Into<String>,
        descriptor: ServiceDescriptor,
    ) -> Self {
        self.entries.push(ResolvedService {
            name: name.into(),
            version: version.into(),
            descriptor,
        });
        self
    }
}

impl ServiceLookup for StaticLookup {
    fn find(&self, name: &str, version: Option<&str>) -> Option<ResolvedService> {
        self.entries
            .iter()
            .filter(|entry| entry.name == name)
            .find(|entry| match version {
                Some(v) if !v.is_empty() => entry.version == v,
                _ => true,
            })
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::ContainerLogConfig;

    fn spec(port: &str) -> ContainerSpec {
        ContainerSpec {
            name: None,
            image: "selenoid/chrome:90.0".to_string(),
            port: port.to_string(),
            env: Vec::new(),
            tmpfs: BTreeMap::new(),
            shm_size: 0,
            privileged: false,
            log_config: ContainerLogConfig::default(),
        }
    }

    #[tokio::test]
    async fn test_fake_engine_lifecycle() {
        let engine = FakeEngine::new(FakeEngineBehavior {
            host_port: Some("32768".to_string()),
            ..Default::default()
        });

        let id = engine.create_container(&spec("4444")).await.unwrap();
        assert!(engine.running().is_empty());

        engine.start_container(&id).await.unwrap();
        assert_eq!(engine.running(), vec![id.clone()]);

        let network = engine.inspect_network(&id, "4444").await.unwrap();
        assert_eq!(network.host_ports, vec!["32768".to_string()]);
        let network = engine.inspect_network(&id, "5555").await.unwrap();
        assert!(network.host_ports.is_empty());

        engine.remove_container(&id).await.unwrap();
        assert!(engine.containers().is_empty());
        assert!(engine.remove_container(&id).await.is_err());
    }

    #[test]
    fn test_static_lookup() {
        let lookup = StaticLookup::default()
            .with("chrome", "90", ServiceDescriptor::container("selenoid/chrome:90"))
            .with("chrome", "91", ServiceDescriptor::container("selenoid/chrome:91"));

        assert_eq!(lookup.find("chrome", Some("91")).unwrap().version, "91");
        assert_eq!(lookup.find("chrome", None).unwrap().version, "90");
        assert!(lookup.find("chrome", Some("92")).is_none());
        assert!(lookup.find("firefox", None).is_none());
    }
}

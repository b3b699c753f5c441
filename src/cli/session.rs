//! `start` and `probe` commands.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::config::{BrokerConfig, ServiceCatalog};
use crate::error::SessionError;
use crate::service::{DefaultManager, DockerEngine, ReadinessWaiter};
use crate::session::SessionBroker;

/// Wire a manager from configuration.
///
/// Docker is optional: when it cannot be reached, container images are
/// reported as unavailable and driver commands still work.
pub async fn build_manager(config: &BrokerConfig, catalog: ServiceCatalog) -> DefaultManager {
    let mut manager =
        DefaultManager::new(Arc::new(catalog)).with_log_config(config.log_config.clone());

    if let Some(ip) = &config.host_ip {
        manager = manager.with_host_ip(ip.clone());
    }

    if config.docker_enabled {
        match DockerEngine::connect().await {
            Ok(engine) => manager = manager.with_engine(Arc::new(engine)),
            Err(e) => tracing::warn!("Docker unavailable, container images disabled: {}", e),
        }
    }

    manager
}

/// Start a session, print its endpoint and hold it until Ctrl-C.
pub async fn run_start_command(
    config: &BrokerConfig,
    name: &str,
    version: Option<&str>,
    timeout: Option<u64>,
    no_wait: bool,
) -> anyhow::Result<()> {
    let catalog = config.load_catalog()?;
    let manager = build_manager(config, catalog).await;
    let startup_timeout = timeout
        .map(Duration::from_secs)
        .unwrap_or(config.startup_timeout);
    let broker = SessionBroker::new(Arc::new(manager), ReadinessWaiter::new(), startup_timeout);

    let started = if no_wait {
        broker.start_without_wait(name, version).await
    } else {
        broker.start_session(name, version).await
    };

    let handle = match started {
        Ok(handle) => handle,
        Err(SessionError::NotReady { handle, source }) => {
            tracing::warn!(backend = %handle.backend(), "Stopping backend that never became ready");
            handle.cancel().await;
            return Err(source.into());
        }
        Err(e) => return Err(e.into()),
    };

    println!("{}", handle.endpoint);
    eprintln!("Session {} running, press Ctrl-C to stop", handle.id);

    let signal = tokio::signal::ctrl_c().await;
    handle.cancel().await;
    signal?;
    Ok(())
}

/// Wait for `url` to answer.
pub async fn run_probe_command(url: &Url, timeout: Duration) -> anyhow::Result<()> {
    ReadinessWaiter::new().wait(url, timeout).await?;
    println!("{url} is ready");
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::config::ServiceEntry;
    use crate::service::{BackendKind, Manager, ServiceDescriptor};

    fn catalog() -> ServiceCatalog {
        let versions = BTreeMap::from([
            ("90".to_string(), ServiceDescriptor::driver(["/usr/bin/chromedriver"])),
        ]);
        ServiceCatalog::new(BTreeMap::from([(
            "chromedriver".to_string(),
            ServiceEntry {
                default: "90".to_string(),
                versions,
            },
        )]))
    }

    #[tokio::test]
    async fn test_manager_without_docker_serves_drivers() {
        let config = BrokerConfig {
            docker_enabled: false,
            ..Default::default()
        };

        let manager = build_manager(&config, catalog()).await;
        let starter = manager.find("chromedriver", None).unwrap();
        assert_eq!(starter.kind(), BackendKind::Process);
    }

    #[tokio::test]
    async fn test_probe_rejects_unsupported_scheme() {
        let url = Url::parse("ftp://127.0.0.1/").unwrap();
        assert!(run_probe_command(&url, Duration::from_millis(50)).await.is_err());
    }
}

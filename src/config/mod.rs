//! Broker configuration.
//!
//! Settings come from environment variables (optionally loaded from `.env`
//! by the binary); CLI flags may override them afterwards. The service
//! catalog is a separate file referenced by `BROKER_CATALOG`.

mod catalog;
pub(crate) mod helpers;

use std::path::PathBuf;
use std::time::Duration;

pub use catalog::{ServiceCatalog, ServiceEntry};

use crate::config::helpers::{optional_env, parse_bool, parse_key_values, parse_value};
use crate::error::ConfigError;
use crate::service::ContainerLogConfig;

/// Runtime configuration for the broker.
#[derive(Debug, Clone)]
pub struct BrokerConfig {
    /// Path to the service catalog (`.json` or `.toml`).
    pub catalog_path: PathBuf,
    /// Host address used to reach published container ports.
    ///
    /// When unset, containers are reached on their own network address.
    pub host_ip: Option<String>,
    /// Whether to connect to Docker for container-backed services.
    pub docker_enabled: bool,
    /// How long a new backend may take to answer its first probe.
    pub startup_timeout: Duration,
    /// Log routing applied to every created container.
    pub log_config: ContainerLogConfig,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            catalog_path: PathBuf::from("browsers.json"),
            host_ip: None,
            docker_enabled: true,
            startup_timeout: Duration::from_secs(30),
            log_config: ContainerLogConfig::default(),
        }
    }
}

impl BrokerConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::resolve(optional_env)
    }

    /// Resolve configuration through `lookup`, which returns `None` for unset keys.
    pub(crate) fn resolve<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Result<Option<String>, ConfigError>,
    {
        let defaults = Self::default();

        let log_options = match lookup("BROKER_LOG_OPTS")? {
            Some(raw) => parse_key_values("BROKER_LOG_OPTS", &raw)?,
            None => Default::default(),
        };

        Ok(Self {
            catalog_path: lookup("BROKER_CATALOG")?
                .map(PathBuf::from)
                .unwrap_or(defaults.catalog_path),
            host_ip: lookup("BROKER_HOST_IP")?,
            docker_enabled: parse_bool(
                "BROKER_DOCKER_ENABLED",
                lookup("BROKER_DOCKER_ENABLED")?,
                defaults.docker_enabled,
            )?,
            startup_timeout: Duration::from_secs(parse_value(
                "BROKER_STARTUP_TIMEOUT_SECS",
                lookup("BROKER_STARTUP_TIMEOUT_SECS")?,
                defaults.startup_timeout.as_secs(),
            )?),
            log_config: ContainerLogConfig {
                driver: lookup("BROKER_LOG_DRIVER")?,
                options: log_options,
            },
        })
    }

    /// Load the service catalog this configuration points at.
    pub fn load_catalog(&self) -> Result<ServiceCatalog, ConfigError> {
        ServiceCatalog::load(&self.catalog_path)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn resolve_with(vars: &[(&str, &str)]) -> Result<BrokerConfig, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        BrokerConfig::resolve(|key| Ok(vars.get(key).cloned()))
    }

    #[test]
    fn test_defaults_when_unset() {
        let config = resolve_with(&[]).unwrap();
        assert_eq!(config.catalog_path, PathBuf::from("browsers.json"));
        assert!(config.host_ip.is_none());
        assert!(config.docker_enabled);
        assert_eq!(config.startup_timeout, Duration::from_secs(30));
        assert!(config.log_config.driver.is_none());
    }

    #[test]
    fn test_env_overrides() {
        let config = resolve_with(&[
            ("BROKER_CATALOG", "/etc/broker/browsers.toml"),
            ("BROKER_HOST_IP", "10.0.0.5"),
            ("BROKER_DOCKER_ENABLED", "false"),
            ("BROKER_STARTUP_TIMEOUT_SECS", "90"),
            ("BROKER_LOG_DRIVER", "syslog"),
            ("BROKER_LOG_OPTS", "tag=broker"),
        ])
        .unwrap();

        assert_eq!(config.catalog_path, PathBuf::from("/etc/broker/browsers.toml"));
        assert_eq!(config.host_ip.as_deref(), Some("10.0.0.5"));
        assert!(!config.docker_enabled);
        assert_eq!(config.startup_timeout, Duration::from_secs(90));
        assert_eq!(config.log_config.driver.as_deref(), Some("syslog"));
        assert_eq!(
            config.log_config.options.get("tag").map(String::as_str),
            Some("broker")
        );
    }

    #[test]
    fn test_invalid_timeout_is_reported() {
        let err = resolve_with(&[("BROKER_STARTUP_TIMEOUT_SECS", "-1")]).unwrap_err();
        assert!(matches!(
            err,
            ConfigError::InvalidValue { ref key, .. } if key == "BROKER_STARTUP_TIMEOUT_SECS"
        ));
    }
}

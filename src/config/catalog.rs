//! Service catalog: the file-backed descriptor lookup.
//!
//! The catalog maps a service name to its versions:
//!
//! ```json
//! {
//!   "chrome": {
//!     "default": "90.0",
//!     "versions": {
//!       "90.0": { "image": "selenoid/chrome:90.0", "port": "4444" }
//!     }
//!   },
//!   "chromedriver": {
//!     "default": "90",
//!     "versions": {
//!       "90": { "image": ["/usr/bin/chromedriver"], "path": "/" }
//!     }
//!   }
//! }
//! ```
//!
//! A string `image` is a container image, a list of strings is a driver
//! command. Anything else is rejected when the file is parsed.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::service::{ResolvedService, ServiceDescriptor, ServiceLookup};

/// All versions of one service.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServiceEntry {
    /// Version used when the caller does not ask for one.
    #[serde(default)]
    pub default: String,
    /// Descriptors keyed by version.
    #[serde(default)]
    pub versions: BTreeMap<String, ServiceDescriptor>,
}

/// Services keyed by name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServiceCatalog {
    services: BTreeMap<String, ServiceEntry>,
}

impl ServiceCatalog {
    /// Build a catalog from already-parsed entries.
    pub fn new(services: BTreeMap<String, ServiceEntry>) -> Self {
        Self { services }
    }

    /// Load a catalog file. `.toml` files are parsed as TOML, everything else as JSON.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::CatalogRead {
            path: path.to_path_buf(),
            source,
        })?;

        let is_toml = path
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
        let parsed = if is_toml {
            toml::from_str::<Self>(&content).map_err(|e| e.to_string())
        } else {
            serde_json::from_str::<Self>(&content).map_err(|e| e.to_string())
        };
        let catalog = parsed.map_err(|reason| ConfigError::InvalidCatalog {
            path: path.to_path_buf(),
            reason,
        })?;

        catalog.warn_dangling_defaults();
        tracing::info!(
            path = %path.display(),
            services = catalog.services.len(),
            "Loaded service catalog"
        );
        Ok(catalog)
    }

    /// Iterate over services in name order.
    pub fn services(&self) -> impl Iterator<Item = (&str, &ServiceEntry)> {
        self.services.iter().map(|(name, entry)| (name.as_str(), entry))
    }

    /// Whether the catalog has no services.
    pub fn is_empty(&self) -> bool {
        self.services.is_empty()
    }

    /// Services whose default resolves to no version, in name order.
    fn dangling_defaults(&self) -> Vec<&str> {
        self.services
            .iter()
            .filter(|(_, entry)| {
                !entry.default.is_empty()
                    && !entry
                        .versions
                        .keys()
                        .any(|version| version.starts_with(&entry.default))
            })
            .map(|(name, _)| name.as_str())
            .collect()
    }

    fn warn_dangling_defaults(&self) {
        for name in self.dangling_defaults() {
            tracing::warn!(
                service = %name,
                default = %self.services[name].default,
                "Default version matches no listed version"
            );
        }
    }
}

impl ServiceLookup for ServiceCatalog {
    fn find(&self, name: &str, version: Option<&str>) -> Option<ResolvedService> {
        let entry = self.services.get(name)?;

        let requested = match version {
            Some(v) if !v.is_empty() => v,
            _ => {
                if entry.default.is_empty() {
                    return None;
                }
                tracing::debug!(service = %name, version = %entry.default, "Using default version");
                entry.default.as_str()
            }
        };

        // Exact match first, then the first version with the requested prefix.
        let (resolved, descriptor) = entry.versions.get_key_value(requested).or_else(|| {
            entry
                .versions
                .iter()
                .find(|(candidate, _)| candidate.starts_with(requested))
        })?;

        Some(ResolvedService {
            name: name.to_string(),
            version: resolved.clone(),
            descriptor: descriptor.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::service::BackendSpec;

    const CATALOG: &str = r#"{
        "chrome": {
            "default": "90.0",
            "versions": {
                "89.0": { "image": "selenoid/chrome:89.0", "port": "4444" },
                "90.0": {
                    "image": "selenoid/chrome:90.0",
                    "port": "4444",
                    "privileged": true,
                    "tmpfs": { "/tmp": "size=128m" }
                }
            }
        },
        "chromedriver": {
            "default": "90",
            "versions": {
                "90": { "image": ["/usr/bin/chromedriver", "--verbose"], "path": "/wd/hub" }
            }
        },
        "opera": {
            "versions": { "76.0": { "image": "browsers/opera:76.0" } }
        }
    }"#;

    fn catalog() -> ServiceCatalog {
        serde_json::from_str(CATALOG).unwrap()
    }

    #[test]
    fn test_payload_shapes() {
        let catalog = catalog();

        let chrome = catalog.find("chrome", Some("90.0")).unwrap();
        assert_eq!(
            chrome.descriptor.image,
            BackendSpec::ContainerImage("selenoid/chrome:90.0".to_string())
        );
        assert_eq!(
            chrome.descriptor.tmpfs.get("/tmp").map(String::as_str),
            Some("size=128m")
        );
        assert!(chrome.descriptor.privileged);
        assert!(!catalog.find("chrome", Some("89.0")).unwrap().descriptor.privileged);

        let driver = catalog.find("chromedriver", Some("90")).unwrap();
        assert_eq!(
            driver.descriptor.image,
            BackendSpec::DriverCommand(vec![
                "/usr/bin/chromedriver".to_string(),
                "--verbose".to_string()
            ])
        );
        assert_eq!(driver.descriptor.path, "/wd/hub");
    }

    #[test]
    fn test_default_version() {
        let catalog = catalog();

        let resolved = catalog.find("chrome", None).unwrap();
        assert_eq!(resolved.version, "90.0");

        let resolved = catalog.find("chrome", Some("")).unwrap();
        assert_eq!(resolved.version, "90.0");

        // No default configured.
        assert!(catalog.find("opera", None).is_none());
        assert!(catalog.find("opera", Some("76.0")).is_some());
    }

    #[test]
    fn test_prefix_match() {
        let resolved = catalog().find("chrome", Some("89")).unwrap();
        assert_eq!(resolved.version, "89.0");
        assert_eq!(resolved.name, "chrome");
    }

    #[test]
    fn test_unknown_service_or_version() {
        let catalog = catalog();
        assert!(catalog.find("firefox", Some("88.0")).is_none());
        assert!(catalog.find("chrome", Some("91")).is_none());
    }

    #[test]
    fn test_dangling_defaults() {
        let parsed: ServiceCatalog = serde_json::from_str(
            r#"{
                "chrome": {
                    "default": "90",
                    "versions": { "90.0": { "image": "selenoid/chrome:90.0" } }
                },
                "firefox": {
                    "default": "88.0",
                    "versions": { "87.0": { "image": "selenoid/firefox:87.0" } }
                },
                "opera": {
                    "versions": { "76.0": { "image": "browsers/opera:76.0" } }
                }
            }"#,
        )
        .unwrap();

        // A prefix default still resolves, so only firefox is reported.
        assert_eq!(parsed.dangling_defaults(), vec!["firefox"]);
        assert_eq!(parsed.find("chrome", None).unwrap().version, "90.0");
        assert!(parsed.find("firefox", None).is_none());
        assert!(catalog().dangling_defaults().is_empty());
    }

    #[test]
    fn test_rejects_unrecognized_payload() {
        let result = serde_json::from_str::<ServiceCatalog>(
            r#"{ "chrome": { "versions": { "90.0": { "image": 42 } } } }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_load_json_file() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(CATALOG.as_bytes()).unwrap();

        let loaded = ServiceCatalog::load(file.path()).unwrap();
        assert_eq!(loaded, catalog());
    }

    #[test]
    fn test_load_toml_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        file.write_all(
            br#"
[chromedriver]
default = "90"

[chromedriver.versions."90"]
image = ["/usr/bin/chromedriver"]
port = "9515"
"#,
        )
        .unwrap();

        let loaded = ServiceCatalog::load(file.path()).unwrap();
        let resolved = loaded.find("chromedriver", None).unwrap();
        assert_eq!(resolved.descriptor.port, "9515");
        assert!(matches!(resolved.descriptor.image, BackendSpec::DriverCommand(_)));
    }

    #[test]
    fn test_load_reports_path() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        file.write_all(b"{ not json").unwrap();

        let err = ServiceCatalog::load(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidCatalog { .. }));
        assert!(err.to_string().contains(&file.path().display().to_string()));

        let missing = ServiceCatalog::load(Path::new("/nonexistent/browsers.json")).unwrap_err();
        assert!(matches!(missing, ConfigError::CatalogRead { .. }));
    }
}

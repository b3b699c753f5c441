//! Error types for session brokering.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::service::SessionHandle;

/// Configuration errors (environment and service catalog).
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable holds an unusable value.
    #[error("Invalid value for {key}: {message}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// What was wrong with it.
        message: String,
    },

    /// The catalog file could not be read.
    #[error("Failed to read service catalog {path}: {source}")]
    CatalogRead {
        /// Catalog path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The catalog file could not be parsed.
    #[error("Invalid service catalog {path}: {reason}")]
    InvalidCatalog {
        /// Catalog path.
        path: PathBuf,
        /// Parser message, including the error position.
        reason: String,
    },
}

/// Errors reported by a container engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The engine cannot be reached.
    #[error("Container engine not available: {reason}")]
    Unavailable {
        /// Reason why the engine is unavailable.
        reason: String,
    },

    /// An engine call was rejected.
    #[error("Container engine {operation} failed: {reason}")]
    Request {
        /// Operation name (create, start, inspect, remove).
        operation: &'static str,
        /// Reason for failure.
        reason: String,
    },
}

/// Backend start failures.
///
/// Every variant is returned only after partially created resources are gone.
#[derive(Debug, Error)]
pub enum StartError {
    /// The container could not be created.
    #[error("Failed to create container from '{image}': {source}")]
    ContainerCreationFailed {
        /// Image reference.
        image: String,
        /// Engine error.
        #[source]
        source: EngineError,
    },

    /// The container was created but did not start, or could not be inspected.
    #[error("Failed to start container {id}: {source}")]
    ContainerStartFailed {
        /// Container ID.
        id: String,
        /// Engine error.
        #[source]
        source: EngineError,
    },

    /// The service port has no usable address.
    #[error("Container {id} does not publish port {port}")]
    PortNotPublished {
        /// Container ID.
        id: String,
        /// Exposed port inside the container.
        port: String,
    },

    /// The driver command list is empty.
    #[error("Driver command for '{service}' is empty")]
    EmptyCommand {
        /// Service name.
        service: String,
    },

    /// The driver process could not be spawned.
    #[error("Failed to spawn '{program}': {source}")]
    SpawnFailed {
        /// Program path.
        program: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A `--port=` argument does not hold a port number.
    #[error("Invalid driver port '{value}'")]
    InvalidPort {
        /// Text after `--port=`.
        value: String,
    },

    /// No local port could be allocated for the driver.
    #[error("Failed to allocate a local port: {0}")]
    PortAllocation(#[source] std::io::Error),

    /// The backend address does not form a valid URL.
    #[error("Invalid endpoint '{endpoint}': {source}")]
    InvalidEndpoint {
        /// The rejected address.
        endpoint: String,
        /// Parse error.
        #[source]
        source: url::ParseError,
    },
}

/// Readiness wait failures.
#[derive(Debug, Error)]
pub enum WaitError {
    /// No probe succeeded before the deadline.
    #[error("{url} does not respond in {timeout:?}")]
    Timeout {
        /// Probed URL.
        url: String,
        /// The bound that elapsed.
        timeout: Duration,
    },

    /// The URL cannot be probed.
    #[error("Invalid readiness URL '{url}': {reason}")]
    InvalidUrl {
        /// The rejected URL.
        url: String,
        /// Reason it was rejected.
        reason: String,
    },

    /// The polling task ended without reporting an outcome.
    #[error("Readiness poller for {url} stopped unexpectedly")]
    PollerStopped {
        /// Probed URL.
        url: String,
    },
}

/// Errors from the end-to-end session start.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Unknown service, or no backend can run it in this configuration.
    #[error("Service '{name}' version '{version}' is not available")]
    NotFound {
        /// Requested name.
        name: String,
        /// Requested version (empty when unspecified).
        version: String,
    },

    /// The backend failed to start.
    #[error(transparent)]
    Start(#[from] StartError),

    /// The backend started but never became ready.
    ///
    /// The backend is still running; the caller owns `handle` and decides
    /// whether to cancel it.
    #[error("Session backend at {} is not ready: {source}", handle.endpoint)]
    NotReady {
        /// Live backend.
        handle: Box<SessionHandle>,
        /// Readiness failure.
        #[source]
        source: WaitError,
    },
}

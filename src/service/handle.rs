//! Session handles and their teardown actions.

use std::fmt;
use std::future::Future;
use std::sync::{Mutex, PoisonError};

use futures::FutureExt;
use futures::future::BoxFuture;
use url::Url;
use uuid::Uuid;

use crate::error::StartError;

/// Identity of a running backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendId {
    /// Container ID.
    Container(String),
    /// Process ID of the driver.
    Process(u32),
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Container(id) => write!(f, "container {id}"),
            Self::Process(pid) => write!(f, "process {pid}"),
        }
    }
}

type Teardown = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// Tears a backend down. Consumed by [`cancel`](Self::cancel), so it runs at most once.
///
/// Dropping the handle without `cancel()` leaves a container running. A
/// driver process is still killed, because its teardown owns the child.
pub struct CancelHandle {
    backend: BackendId,
    // Uncontended; keeps the handle Sync.
    teardown: Mutex<Option<Teardown>>,
}

impl CancelHandle {
    /// Wrap a teardown action for `backend`.
    pub fn new<F, Fut>(backend: BackendId, teardown: F) -> Self
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        Self {
            backend,
            teardown: Mutex::new(Some(Box::new(move || teardown().boxed()))),
        }
    }

    /// The backend this handle tears down.
    pub fn backend(&self) -> &BackendId {
        &self.backend
    }

    /// Run the teardown action.
    pub async fn cancel(mut self) {
        if let Some(teardown) = self.take_teardown() {
            tracing::debug!(backend = %self.backend, "Cancelling session backend");
            teardown().await;
        }
    }

    fn drop_warning(&self) -> &'static str {
        match self.backend {
            BackendId::Container(_) => {
                "Session dropped without cancel(), container may remain running"
            }
            BackendId::Process(_) => "Session dropped without cancel(), killing driver process",
        }
    }

    fn take_teardown(&mut self) -> Option<Teardown> {
        self.teardown
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }
}

impl fmt::Debug for CancelHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let pending = self
            .teardown
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some();
        f.debug_struct("CancelHandle")
            .field("backend", &self.backend)
            .field("pending", &pending)
            .finish()
    }
}

impl Drop for CancelHandle {
    fn drop(&mut self) {
        if self.take_teardown().is_some() {
            tracing::warn!(backend = %self.backend, "{}", self.drop_warning());
        }
    }
}

/// A started backend: where to reach it and how to stop it.
#[derive(Debug)]
pub struct SessionHandle {
    /// Session identifier, for logs.
    pub id: Uuid,
    /// Backend endpoint.
    pub endpoint: Url,
    cancel: CancelHandle,
}

impl SessionHandle {
    /// Assemble a handle.
    pub fn new(id: Uuid, endpoint: Url, cancel: CancelHandle) -> Self {
        Self {
            id,
            endpoint,
            cancel,
        }
    }

    /// The backend behind this session.
    pub fn backend(&self) -> &BackendId {
        self.cancel.backend()
    }

    /// Split into the endpoint and the teardown handle.
    pub fn into_parts(self) -> (Url, CancelHandle) {
        (self.endpoint, self.cancel)
    }

    /// Tear the backend down.
    pub async fn cancel(self) {
        self.cancel.cancel().await;
    }
}

/// Build `http://<authority>/<path>`.
pub(crate) fn endpoint_url(authority: &str, path: &str) -> Result<Url, StartError> {
    let raw = format!("http://{}/{}", authority, path.trim_start_matches('/'));
    Url::parse(&raw).map_err(|source| StartError::InvalidEndpoint {
        endpoint: raw,
        source,
    })
}

/// Join a host and port, bracketing IPv6 literals.
pub(crate) fn join_host_port(host: &str, port: &str) -> String {
    if host.contains(':') && !host.starts_with('[') {
        format!("[{host}]:{port}")
    } else {
        format!("{host}:{port}")
    }
}

//! End-to-end session start: find a backend, start it, wait for it.

use std::sync::Arc;
use std::time::Duration;

use crate::error::SessionError;
use crate::service::{Manager, ReadinessWaiter, SessionHandle, Starter};

/// Starts sessions on demand.
pub struct SessionBroker {
    manager: Arc<dyn Manager>,
    waiter: ReadinessWaiter,
    startup_timeout: Duration,
}

impl SessionBroker {
    pub fn new(
        manager: Arc<dyn Manager>,
        waiter: ReadinessWaiter,
        startup_timeout: Duration,
    ) -> Self {
        Self {
            manager,
            waiter,
            startup_timeout,
        }
    }

    /// Start a backend for `name`/`version` and wait until it answers.
    ///
    /// If the backend starts but does not answer in time, it is handed back in
    /// [`SessionError::NotReady`] and keeps running until the caller cancels it.
    pub async fn start_session(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<SessionHandle, SessionError> {
        let handle = self.start_without_wait(name, version).await?;

        tracing::debug!(
            session_id = %handle.id,
            url = %handle.endpoint,
            timeout = ?self.startup_timeout,
            "Waiting for session backend"
        );
        match self.waiter.wait(&handle.endpoint, self.startup_timeout).await {
            Ok(()) => {
                tracing::info!(session_id = %handle.id, url = %handle.endpoint, "Session ready");
                Ok(handle)
            }
            Err(source) => Err(SessionError::NotReady {
                handle: Box::new(handle),
                source,
            }),
        }
    }

    /// Start a backend for `name`/`version` without waiting for it.
    pub async fn start_without_wait(
        &self,
        name: &str,
        version: Option<&str>,
    ) -> Result<SessionHandle, SessionError> {
        let starter = self.find(name, version)?;
        let handle = starter.start_with_cancel().await?;
        tracing::info!(
            session_id = %handle.id,
            service = %name,
            backend = %handle.backend(),
            url = %handle.endpoint,
            "Session backend started"
        );
        Ok(handle)
    }

    fn find(&self, name: &str, version: Option<&str>) -> Result<Box<dyn Starter>, SessionError> {
        self.manager
            .find(name, version)
            .ok_or_else(|| SessionError::NotFound {
                name: name.to_string(),
                version: version.unwrap_or_default().to_string(),
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::service::{DefaultManager, ServiceDescriptor};
    use crate::testing::StaticLookup;

    fn broker() -> SessionBroker {
        let lookup = StaticLookup::default()
            .with("chrome", "90", ServiceDescriptor::container("selenoid/chrome:90"))
            .with("broken", "1", ServiceDescriptor::driver(Vec::<String>::new()));
        SessionBroker::new(
            Arc::new(DefaultManager::new(Arc::new(lookup))),
            ReadinessWaiter::default(),
            Duration::from_millis(200),
        )
    }

    #[tokio::test]
    async fn test_unknown_service_is_not_found() {
        let err = broker().start_session("firefox", Some("88.0")).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::NotFound { ref name, ref version }
                if name == "firefox" && version == "88.0"
        ));
    }

    #[tokio::test]
    async fn test_container_without_engine_is_not_found() {
        let err = broker().start_session("chrome", None).await.unwrap_err();
        assert!(matches!(err, SessionError::NotFound { ref version, .. } if version.is_empty()));
    }

    #[tokio::test]
    async fn test_start_error_is_propagated() {
        let err = broker().start_without_wait("broken", None).await.unwrap_err();
        assert!(matches!(
            err,
            SessionError::Start(crate::error::StartError::EmptyCommand { .. })
        ));
    }
}

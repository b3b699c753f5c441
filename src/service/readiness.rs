//! Readiness polling for freshly started backends.
//!
//! The poller runs on its own task and probes the endpoint right away, then
//! every [`POLL_INTERVAL`]. The caller races the poller's `ready` signal
//! against the deadline; whichever way it goes, the poller is told to stop
//! (dropping any in-flight probe) and joined before [`ReadinessWaiter::wait`]
//! returns.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::oneshot;
use tokio::time::MissedTickBehavior;
use url::Url;

use crate::error::WaitError;

/// Delay between probes.
pub(crate) const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Upper bound for a single HTTP probe.
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Lifecycle of one wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReadinessState {
    /// Probes are still being issued.
    Polling,
    /// A probe got an answer.
    Ready,
    /// Polling was stopped before any probe got an answer.
    TimedOut,
}

/// One liveness check against an endpoint.
#[async_trait]
pub trait Probe: Send + Sync {
    /// `true` when the endpoint answered.
    async fn probe(&self, url: &Url) -> bool;
}

/// HEAD request probe. Any HTTP response counts, whatever its status.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .no_proxy()
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self { client }
    }
}

impl Default for HttpProbe {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Probe for HttpProbe {
    async fn probe(&self, url: &Url) -> bool {
        match self.client.head(url.clone()).send().await {
            Ok(response) => {
                tracing::debug!(url = %url, status = %response.status(), "Endpoint answered");
                true
            }
            Err(e) => {
                tracing::trace!(url = %url, error = %e, "Endpoint not answering yet");
                false
            }
        }
    }
}

/// Blocks callers until an endpoint answers or a deadline passes.
#[derive(Clone)]
pub struct ReadinessWaiter {
    probe: Arc<dyn Probe>,
    interval: Duration,
}

impl Default for ReadinessWaiter {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadinessWaiter {
    /// Waiter using [`HttpProbe`].
    pub fn new() -> Self {
        Self::with_probe(Arc::new(HttpProbe::new()))
    }

    /// Waiter using a custom probe.
    pub fn with_probe(probe: Arc<dyn Probe>) -> Self {
        Self {
            probe,
            interval: POLL_INTERVAL,
        }
    }

    #[cfg(test)]
    fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Wait until `url` answers a probe, for at most `timeout`.
    pub async fn wait(&self, url: &Url, timeout: Duration) -> Result<(), WaitError> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(WaitError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }

        let (ready_tx, ready_rx) = oneshot::channel();
        let (stop_tx, stop_rx) = oneshot::channel();
        let poller = tokio::spawn(poll(
            Arc::clone(&self.probe),
            url.clone(),
            self.interval,
            ready_tx,
            stop_rx,
        ));

        let outcome = tokio::time::timeout(timeout, ready_rx).await;

        // The poller may already be gone after signalling ready.
        let _ = stop_tx.send(());
        match poller.await {
            Ok(state) => {
                tracing::debug!(url = %url, state = ?state, "Readiness poller finished")
            }
            Err(e) => tracing::warn!(url = %url, error = %e, "Readiness poller failed"),
        }

        match outcome {
            Ok(Ok(())) => Ok(()),
            Ok(Err(_)) => Err(WaitError::PollerStopped {
                url: url.to_string(),
            }),
            Err(_) => {
                tracing::warn!(url = %url, timeout = ?timeout, "Endpoint did not become ready");
                Err(WaitError::Timeout {
                    url: url.to_string(),
                    timeout,
                })
            }
        }
    }
}

/// Wait for `url` with the default HTTP probe.
pub async fn wait(url: &Url, timeout: Duration) -> Result<(), WaitError> {
    ReadinessWaiter::new().wait(url, timeout).await
}

async fn poll(
    probe: Arc<dyn Probe>,
    url: Url,
    interval: Duration,
    ready: oneshot::Sender<()>,
    mut stop: oneshot::Receiver<()>,
) -> ReadinessState {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut state = ReadinessState::Polling;

    while state == ReadinessState::Polling {
        // First tick completes immediately.
        tokio::select! {
            _ = &mut stop => state = ReadinessState::TimedOut,
            _ = ticker.tick() => {
                tokio::select! {
                    _ = &mut stop => state = ReadinessState::TimedOut,
                    alive = probe.probe(&url) => {
                        if alive {
                            state = ReadinessState::Ready;
                        }
                    }
                }
            }
        }
    }

    if state == ReadinessState::Ready {
        let _ = ready.send(());
    }
    state
}

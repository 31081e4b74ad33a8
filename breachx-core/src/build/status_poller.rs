//! Fixed-interval polling of one build's status record.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use breachx_model::{BuildConfig, BuildId, BuildStatus, BuildStatusResponse, RepositoryId};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::Result;

#[async_trait]
pub trait BuildStatusSource: Send + Sync {
    async fn build_status(
        &self,
        build_id: &BuildId,
    ) -> Result<BuildStatusResponse>;
}

#[async_trait]
pub trait RepositoryRefresher: Send + Sync {
    async fn refresh(&self, repository: &RepositoryId) -> Result<BuildConfig>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildStatusPollerConfig {
    pub interval_ms: u64,
    /// Stop after the first terminal status instead of polling on.
    pub stop_on_terminal: bool,
}

impl Default for BuildStatusPollerConfig {
    fn default() -> Self {
        Self {
            interval_ms: 10_000,
            stop_on_terminal: true,
        }
    }
}

/// Observations reported to the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildStatusEvent {
    Status(BuildStatusResponse),
    /// Repository settings re-read after the build reached a terminal state.
    Refreshed(BuildConfig),
    Error(String),
}

pub struct BuildStatusPoller {
    source: Arc<dyn BuildStatusSource>,
    refresher: Arc<dyn RepositoryRefresher>,
    config: BuildStatusPollerConfig,
}

impl fmt::Debug for BuildStatusPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildStatusPoller")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BuildStatusPoller {
    pub fn new(
        source: Arc<dyn BuildStatusSource>,
        refresher: Arc<dyn RepositoryRefresher>,
        config: BuildStatusPollerConfig,
    ) -> Self {
        Self {
            source,
            refresher,
            config,
        }
    }

    /// Poll until cancelled or, with `stop_on_terminal`, until the build
    /// finishes. Errors are reported and the loop keeps its interval.
    ///
    /// Returns the last status observed.
    pub async fn run<F>(
        &self,
        build_id: &BuildId,
        repository: &RepositoryId,
        cancel: CancellationToken,
        mut on_event: F,
    ) -> Option<BuildStatus>
    where
        F: FnMut(BuildStatusEvent) + Send,
    {
        let interval = Duration::from_millis(self.config.interval_ms);
        let mut last: Option<BuildStatus> = None;

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.source.build_status(build_id).await {
                Ok(record) => {
                    let status = record.status;
                    let changed = last != Some(status);
                    last = Some(status);
                    debug!(build_id = %build_id, %status, "build status polled");
                    on_event(BuildStatusEvent::Status(record));

                    if status.is_terminal() && changed {
                        info!(build_id = %build_id, %status, "build reached terminal status");
                        match self.refresher.refresh(repository).await {
                            Ok(config) => on_event(BuildStatusEvent::Refreshed(config)),
                            Err(err) => {
                                warn!(repository = %repository, "repository refresh failed: {err}");
                                on_event(BuildStatusEvent::Error(err.to_string()));
                            }
                        }
                    }
                    if status.is_terminal() && self.config.stop_on_terminal {
                        break;
                    }
                }
                Err(err) => {
                    warn!(build_id = %build_id, "error polling build status: {err}");
                    on_event(BuildStatusEvent::Error(err.to_string()));
                }
            }

            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        last
    }
}

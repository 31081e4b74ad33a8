//! Tails the remote log stream of one build and forwards it to a client.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use breachx_model::{
    BuildId, BuildInfo, BuildStatus, LogLevel, LogRecord, RecordKind,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::ports::{BuildExecutor, LogEventPage, LogStorage};
use crate::streaming::completion::{
    CompletionPredicate, DEFAULT_COMPLETION_PHRASES, PhraseCompletion,
};
use crate::streaming::dedupe::RecordDeduper;
use crate::streaming::transport::LogTransport;

/// Tuning for build log streaming. Durations are milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildLogStreamConfig {
    /// Delay between attempts to locate the build's log stream.
    pub discovery_interval_ms: u64,
    /// Attempts before discovery gives up with a single error record.
    pub discovery_attempts: u32,
    /// Steady-state delay between log fetches.
    pub poll_interval_ms: u64,
    /// Lines that mark a finished build when seen in the output.
    pub completion_phrases: Vec<String>,
    /// When set, only the build status ends the stream and completion
    /// phrases are logged as confirmation. When unset, a completion phrase
    /// ends the stream on its own.
    pub status_authoritative: bool,
    /// Grace period between the final record and closing the transport.
    pub close_delay_ms: u64,
}

impl Default for BuildLogStreamConfig {
    fn default() -> Self {
        Self {
            discovery_interval_ms: 1_000,
            discovery_attempts: 30,
            poll_interval_ms: 3_000,
            completion_phrases: DEFAULT_COMPLETION_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
            status_authoritative: true,
            close_delay_ms: 5_000,
        }
    }
}

/// How a build stream ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamOutcome {
    /// The build finished; carries the terminal status when it was read.
    Completed(Option<BuildStatus>),
    DiscoveryTimedOut,
    FetchFailed,
    /// The client went away first.
    Cancelled,
}

#[derive(Debug)]
struct LogLocation {
    group: String,
    stream: String,
    project: Option<String>,
}

/// Streams build output over any [`LogTransport`].
///
/// Discovery polls the build service for a log location at a fixed
/// interval until the retry ceiling. Streaming then fetches forward from
/// the last cursor on a fixed interval, forwarding each new line once.
/// Every wait races the transport's close token, so a disconnect ends the
/// loop without leaving a timer behind.
#[derive(Clone)]
pub struct BuildLogProducer {
    builds: Arc<dyn BuildExecutor>,
    logs: Arc<dyn LogStorage>,
    completion: Arc<dyn CompletionPredicate>,
    config: BuildLogStreamConfig,
}

impl fmt::Debug for BuildLogProducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildLogProducer")
            .field("completion", &self.completion)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BuildLogProducer {
    pub fn new(
        builds: Arc<dyn BuildExecutor>,
        logs: Arc<dyn LogStorage>,
        config: BuildLogStreamConfig,
    ) -> Self {
        let completion =
            Arc::new(PhraseCompletion::new(config.completion_phrases.clone()));
        Self {
            builds,
            logs,
            completion,
            config,
        }
    }

    pub fn with_completion(
        mut self,
        completion: Arc<dyn CompletionPredicate>,
    ) -> Self {
        self.completion = completion;
        self
    }

    pub fn config(&self) -> &BuildLogStreamConfig {
        &self.config
    }

    pub async fn stream(
        &self,
        build_id: &BuildId,
        transport: Arc<dyn LogTransport>,
    ) -> StreamOutcome {
        info!(build_id = %build_id, "starting build log stream");
        transport.send_record(LogRecord::info(format!(
            "Locating log stream for build {build_id}"
        )));

        let location = match self.discover(build_id, transport.as_ref()).await
        {
            Discovery::Found(location) => location,
            Discovery::Cancelled => return StreamOutcome::Cancelled,
            Discovery::Exhausted => {
                warn!(
                    build_id = %build_id,
                    attempts = self.config.discovery_attempts,
                    "build log stream was never located"
                );
                transport.send_record(LogRecord::error(format!(
                    "Log stream for build {build_id} was not available after {} attempts",
                    self.config.discovery_attempts
                )));
                transport.close();
                return StreamOutcome::DiscoveryTimedOut;
            }
        };

        transport.send_record(LogRecord::info(format!(
            "Starting log stream for build {build_id} of project {}",
            location.project.as_deref().unwrap_or("unknown")
        )));

        let outcome = self
            .tail(build_id, &location, transport.as_ref())
            .await;
        debug!(build_id = %build_id, ?outcome, "build log stream finished");
        outcome
    }

    async fn discover(
        &self,
        build_id: &BuildId,
        transport: &dyn LogTransport,
    ) -> Discovery {
        let interval = Duration::from_millis(self.config.discovery_interval_ms);
        let closed = transport.closed();

        for attempt in 1..=self.config.discovery_attempts {
            if !transport.is_open() {
                return Discovery::Cancelled;
            }

            match self.locate(build_id).await {
                Ok(Some(location)) => {
                    debug!(
                        build_id = %build_id,
                        attempt,
                        group = %location.group,
                        stream = %location.stream,
                        "located build log stream"
                    );
                    return Discovery::Found(location);
                }
                Ok(None) => {
                    debug!(build_id = %build_id, attempt, "log stream not ready");
                }
                Err(err) => {
                    debug!(build_id = %build_id, attempt, "log stream lookup failed: {err}");
                }
            }

            if attempt == self.config.discovery_attempts {
                break;
            }
            if attempt % 5 == 0 {
                transport.send_record(LogRecord::info(format!(
                    "Still waiting for build logs (attempt {attempt}/{})",
                    self.config.discovery_attempts
                )));
            }

            tokio::select! {
                _ = closed.cancelled() => return Discovery::Cancelled,
                _ = tokio::time::sleep(interval) => {}
            }
        }

        Discovery::Exhausted
    }

    async fn locate(&self, build_id: &BuildId) -> Result<Option<LogLocation>> {
        let build = self.builds.get_build(build_id).await?;
        let Some((group, stream)) = build.log_location() else {
            return Ok(None);
        };
        let streams = self.logs.list_streams(group, stream).await?;
        if !streams.iter().any(|s| s.name == stream) {
            return Ok(None);
        }
        Ok(Some(LogLocation {
            group: group.to_string(),
            stream: stream.to_string(),
            project: build.project_name.clone(),
        }))
    }

    async fn tail(
        &self,
        build_id: &BuildId,
        location: &LogLocation,
        transport: &dyn LogTransport,
    ) -> StreamOutcome {
        let interval = Duration::from_millis(self.config.poll_interval_ms);
        let closed = transport.closed();
        let mut cursor: Option<String> = None;
        let mut dedupe = RecordDeduper::new();
        let mut phrase_seen = false;

        loop {
            if !transport.is_open() {
                return StreamOutcome::Cancelled;
            }

            let page = match self.fetch(location, cursor.as_deref()).await {
                Ok(page) => page,
                Err(err) => {
                    warn!(build_id = %build_id, "error fetching build logs: {err}");
                    transport.send_record(LogRecord::error(format!(
                        "Log fetch error: {err}"
                    )));
                    transport.close();
                    return StreamOutcome::FetchFailed;
                }
            };

            let forwarded = self.forward(
                &page,
                &mut dedupe,
                &mut phrase_seen,
                transport,
            );
            if let Some(token) = page.next_token {
                cursor = Some(token);
            }
            if !transport.is_open() {
                return StreamOutcome::Cancelled;
            }

            if self.config.status_authoritative {
                let status = self.builds.get_build(build_id).await;
                if !transport.is_open() {
                    return StreamOutcome::Cancelled;
                }
                match status {
                    Ok(build) if build.status.is_terminal() => {
                        self.drain(location, cursor.as_deref(), &mut dedupe, transport)
                            .await;
                        self.finish_with_status(&build, transport).await;
                        return StreamOutcome::Completed(Some(build.status));
                    }
                    Ok(_) if phrase_seen => {
                        debug!(
                            build_id = %build_id,
                            "completion phrase seen before terminal status"
                        );
                    }
                    Ok(_) => {}
                    Err(err) => {
                        warn!(build_id = %build_id, "build status check failed: {err}");
                    }
                }
            } else if phrase_seen {
                info!(build_id = %build_id, "completion phrase detected");
                transport.send_record(LogRecord::info(format!(
                    "Build {build_id} finished"
                )));
                self.close_after_grace(transport).await;
                return StreamOutcome::Completed(None);
            }

            if forwarded == 0 {
                transport.send_record(LogRecord::heartbeat(
                    "Waiting for new logs...",
                ));
            }

            tokio::select! {
                _ = closed.cancelled() => return StreamOutcome::Cancelled,
                _ = tokio::time::sleep(interval) => {}
            }
        }
    }

    async fn fetch(
        &self,
        location: &LogLocation,
        cursor: Option<&str>,
    ) -> Result<LogEventPage> {
        self.logs
            .get_log_events(&location.group, &location.stream, cursor)
            .await
    }

    fn forward(
        &self,
        page: &LogEventPage,
        dedupe: &mut RecordDeduper,
        phrase_seen: &mut bool,
        transport: &dyn LogTransport,
    ) -> usize {
        let mut forwarded = 0;
        for event in &page.events {
            if !transport.is_open() {
                break;
            }
            if event.message.trim().is_empty() {
                continue;
            }
            let record = LogRecord::new(
                RecordKind::Log,
                LogLevel::from_build_line(&event.message),
                event.message.clone(),
                event.timestamp,
            );
            if !dedupe.admit(&record) {
                continue;
            }
            *phrase_seen |= self.completion.is_complete(&record.message);
            transport.send_record(record);
            forwarded += 1;
        }
        forwarded
    }

    /// One last fetch so trailing lines written before the status flipped
    /// are not lost.
    async fn drain(
        &self,
        location: &LogLocation,
        cursor: Option<&str>,
        dedupe: &mut RecordDeduper,
        transport: &dyn LogTransport,
    ) {
        match self.fetch(location, cursor).await {
            Ok(page) => {
                let mut ignored = false;
                self.forward(&page, dedupe, &mut ignored, transport);
            }
            Err(err) => warn!("final build log fetch failed: {err}"),
        }
    }

    async fn finish_with_status(
        &self,
        build: &BuildInfo,
        transport: &dyn LogTransport,
    ) {
        info!(build_id = %build.id, status = %build.status, "build finished");
        for phase in build.failed_phases() {
            transport.send_record(LogRecord::error(phase.failure_message()));
        }
        transport.send_record(LogRecord::info(format!(
            "Build {} completed with status: {}",
            build.id, build.status
        )));
        self.close_after_grace(transport).await;
    }

    async fn close_after_grace(&self, transport: &dyn LogTransport) {
        let grace = Duration::from_millis(self.config.close_delay_ms);
        if !grace.is_zero() {
            let closed = transport.closed();
            tokio::select! {
                _ = closed.cancelled() => return,
                _ = tokio::time::sleep(grace) => {}
            }
        }
        transport.close();
    }
}

enum Discovery {
    Found(LogLocation),
    Exhausted,
    Cancelled,
}

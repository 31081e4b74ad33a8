//! Client-paced polling of scan logs, as an explicit state machine.
//!
//! [`ScanLogPoller::step`] performs one poll and reports the delay before
//! the next one, so transitions can be exercised without timers.
//! [`ScanLogPoller::run`] drives `step` on the tokio clock until the scan
//! finishes or the transport closes.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use breachx_model::{
    CompletionSummary, LogLevel, LogRecord, PollStatus, ScanId, ScanLogBatch,
    ScanLogFailure, ScanLogPollResponse, TaskStatus,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::scan::backoff::{Backoff, BackoffPolicy};
use crate::scan::source::ScanLogSource;
use crate::streaming::{LogTransport, RecordDeduper, StreamFrame};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPollerConfig {
    pub backoff: BackoffPolicy,
    /// Give up after this many failures in a row. `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
    /// Retries granted to a final-looking failure while the last observed
    /// task status says the scan is still alive.
    pub live_failure_retries: u32,
}

impl Default for ScanPollerConfig {
    fn default() -> Self {
        Self {
            backoff: BackoffPolicy::default(),
            max_consecutive_failures: None,
            live_failure_retries: 5,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollerState {
    /// No scan attached yet.
    Initializing,
    WaitingForStream,
    Streaming,
    /// The task is stopping; one more fetch drains trailing lines.
    Completing,
    Done,
    ErrorRetry,
}

/// What the driver should do after a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue(Duration),
    /// Nothing to poll until a scan is attached.
    Idle,
    Finished,
}

pub struct ScanLogPoller {
    source: Arc<dyn ScanLogSource>,
    transport: Arc<dyn LogTransport>,
    config: ScanPollerConfig,
    state: PollerState,
    scan_id: Option<ScanId>,
    next_token: Option<String>,
    dedupe: RecordDeduper,
    backoff: Backoff,
    consecutive_failures: u32,
    live_failure_retries: u32,
    draining: bool,
    last_task_status: Option<TaskStatus>,
}

impl fmt::Debug for ScanLogPoller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScanLogPoller")
            .field("state", &self.state)
            .field("scan_id", &self.scan_id)
            .field("next_token", &self.next_token)
            .field("consecutive_failures", &self.consecutive_failures)
            .field("draining", &self.draining)
            .finish_non_exhaustive()
    }
}

impl ScanLogPoller {
    pub fn new(
        source: Arc<dyn ScanLogSource>,
        transport: Arc<dyn LogTransport>,
        config: ScanPollerConfig,
    ) -> Self {
        Self {
            source,
            transport,
            config,
            state: PollerState::Initializing,
            scan_id: None,
            next_token: None,
            dedupe: RecordDeduper::new(),
            backoff: Backoff::new(config.backoff),
            consecutive_failures: 0,
            live_failure_retries: 0,
            draining: false,
            last_task_status: None,
        }
    }

    pub fn state(&self) -> PollerState {
        self.state
    }

    pub fn scan_id(&self) -> Option<ScanId> {
        self.scan_id
    }

    pub fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }

    /// Launch a scan through the source and attach to it.
    pub async fn start(&mut self, target: &str) -> Result<ScanId> {
        match self.source.start_scan(target).await {
            Ok(started) => {
                info!(scan_id = %started.scan_id, task = %started.task_arn, "scan launched");
                self.attach(started.scan_id);
                Ok(started.scan_id)
            }
            Err(err) => {
                self.transport.send_record(LogRecord::error(format!(
                    "Failed to start security scan: {err}"
                )));
                Err(err)
            }
        }
    }

    /// Follow an already running scan.
    pub fn attach(&mut self, scan_id: ScanId) {
        self.scan_id = Some(scan_id);
        self.next_token = None;
        self.dedupe = RecordDeduper::new();
        self.backoff.reset();
        self.consecutive_failures = 0;
        self.live_failure_retries = 0;
        self.draining = false;
        self.last_task_status = None;
        self.state = PollerState::WaitingForStream;
        self.transport
            .send_record(LogRecord::info("Connected to scan logs stream"));
        self.transport
            .send_record(LogRecord::info("Waiting for scan to initialize..."));
    }

    pub async fn step(&mut self) -> Step {
        let scan_id = match (self.state, self.scan_id) {
            (PollerState::Done, _) => return Step::Finished,
            (PollerState::Initializing, _) | (_, None) => return Step::Idle,
            (_, Some(scan_id)) => scan_id,
        };
        if !self.transport.is_open() {
            self.state = PollerState::Done;
            return Step::Finished;
        }

        let response = self
            .source
            .poll_logs(&scan_id, self.next_token.as_deref())
            .await;

        match response {
            Ok(ScanLogPollResponse::Ready(batch)) => {
                self.on_batch(scan_id, batch).await
            }
            Ok(ScanLogPollResponse::Failed(failure)) if failure.should_retry => {
                self.on_retryable(scan_id, &failure.error, failure.task_status)
            }
            Ok(ScanLogPollResponse::Failed(failure))
                if self.may_still_appear(&failure) =>
            {
                self.live_failure_retries += 1;
                debug!(
                    scan_id = %scan_id,
                    retry = self.live_failure_retries,
                    "task still live, retrying final failure"
                );
                self.on_retryable(scan_id, &failure.error, failure.task_status)
            }
            Ok(ScanLogPollResponse::Failed(failure)) => {
                self.on_fatal(scan_id, &failure)
            }
            Err(err) => self.on_retryable(scan_id, &err.to_string(), None),
        }
    }

    /// Drive the machine until it finishes, goes idle, or the transport
    /// closes.
    pub async fn run(mut self) -> PollerState {
        let closed = self.transport.closed();
        loop {
            match self.step().await {
                Step::Continue(delay) => {
                    tokio::select! {
                        _ = closed.cancelled() => {
                            debug!(scan_id = ?self.scan_id, "scan log transport closed");
                            return self.state;
                        }
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
                Step::Idle | Step::Finished => return self.state,
            }
        }
    }

    /// A session the server cannot find may reappear while the task was
    /// last seen starting or running (a restarted server, say).
    fn may_still_appear(&self, failure: &ScanLogFailure) -> bool {
        self.live_failure_retries < self.config.live_failure_retries
            && failure
                .task_status
                .or(self.last_task_status)
                .is_some_and(|status| status.is_plausibly_live())
    }

    async fn on_batch(&mut self, scan_id: ScanId, batch: ScanLogBatch) -> Step {
        self.backoff.reset();
        self.consecutive_failures = 0;
        self.live_failure_retries = 0;
        if batch.task_status.is_some() {
            self.last_task_status = batch.task_status;
        }
        let delay = Duration::from_millis(batch.next_poll_delay);

        match batch.status {
            PollStatus::Waiting => {
                self.state = PollerState::WaitingForStream;
                let message = batch
                    .message
                    .unwrap_or_else(|| "Waiting for scan to initialize...".into());
                self.transport.send_record(LogRecord::info(message));
                Step::Continue(delay)
            }
            PollStatus::Success => {
                let forwarded = self.forward(batch.logs);
                if let Some(token) = batch.next_token {
                    self.next_token = Some(token);
                }

                if self.draining {
                    self.complete(scan_id).await;
                    return Step::Finished;
                }

                if batch.task_status.is_some_and(|s| s.is_finishing()) {
                    debug!(scan_id = %scan_id, "task finishing, draining trailing logs");
                    self.draining = true;
                    self.state = PollerState::Completing;
                    return Step::Continue(delay);
                }

                if self.state == PollerState::Streaming && forwarded == 0 {
                    self.transport
                        .send_record(LogRecord::heartbeat("Waiting for new logs..."));
                }
                self.state = PollerState::Streaming;
                Step::Continue(delay)
            }
        }
    }

    fn forward(&mut self, logs: Vec<LogRecord>) -> usize {
        let mut forwarded = 0;
        for record in logs {
            if !self.dedupe.admit(&record) {
                continue;
            }
            self.transport.send_record(record);
            forwarded += 1;
        }
        forwarded
    }

    fn on_retryable(
        &mut self,
        scan_id: ScanId,
        error: &str,
        task_status: Option<TaskStatus>,
    ) -> Step {
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        if task_status.is_some() {
            self.last_task_status = task_status;
        }

        if let Some(limit) = self.config.max_consecutive_failures
            && self.consecutive_failures >= limit
        {
            warn!(scan_id = %scan_id, failures = self.consecutive_failures, "giving up on scan logs");
            self.transport.send_record(LogRecord::error(format!(
                "Giving up after {} consecutive failures: {error}",
                self.consecutive_failures
            )));
            self.finish_closed();
            return Step::Finished;
        }

        let delay = self.backoff.next_delay();
        debug!(
            scan_id = %scan_id,
            attempt = self.backoff.attempts(),
            delay_ms = delay.as_millis() as u64,
            "retrying scan log poll: {error}"
        );
        self.state = PollerState::ErrorRetry;
        self.transport.send_record(LogRecord::status(
            LogLevel::Warning,
            format!(
                "Retrying in {}s (attempt {}): {error}",
                delay.as_secs(),
                self.backoff.attempts()
            ),
        ));
        Step::Continue(delay)
    }

    fn on_fatal(&mut self, scan_id: ScanId, failure: &ScanLogFailure) -> Step {
        warn!(scan_id = %scan_id, error = %failure.error, "scan log polling failed");
        self.transport.send_record(LogRecord::error(failure.error.clone()));
        self.finish_closed();
        Step::Finished
    }

    async fn complete(&mut self, scan_id: ScanId) {
        let report = match self.source.latest_report().await {
            Ok(Some(report)) => {
                self.transport.send_record(LogRecord::status(
                    LogLevel::Success,
                    format!("Security report available: {}", report.report_url),
                ));
                Some(report)
            }
            Ok(None) => {
                self.transport.send_record(LogRecord::info("No report found"));
                None
            }
            Err(err) => {
                warn!(scan_id = %scan_id, "report lookup failed: {err}");
                self.transport.send_record(LogRecord::status(
                    LogLevel::Warning,
                    format!("Could not fetch security report: {err}"),
                ));
                None
            }
        };

        let status = self.last_task_status.unwrap_or(TaskStatus::Stopped);
        info!(scan_id = %scan_id, %status, "scan log stream complete");
        self.transport.send(StreamFrame::Complete(
            CompletionSummary::for_task(status).with_report(report),
        ));
        self.finish_closed();
    }

    fn finish_closed(&mut self) {
        self.state = PollerState::Done;
        self.transport.close();
    }
}

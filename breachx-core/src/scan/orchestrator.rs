//! Launching scan tasks and serving their status and incremental logs.

use std::fmt;
use std::sync::Arc;

use breachx_model::{
    EnvironmentVariable, LogRecord, PollStatus, ScanId, ScanLogBatch,
    ScanLogPollResponse, ScanSession, TaskStatus,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{CoreError, Result};
use crate::ports::{LogStorage, NetworkSettings, TaskExecutor, TaskLaunch};
use crate::scan::registry::ScanSessionRegistry;

/// Where and how scan containers run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanTaskConfig {
    pub cluster: String,
    pub task_definition: String,
    pub container: String,
    pub launch_type: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
    pub log_group: String,
    /// Stream names are `<stream_prefix>/<task id>`.
    pub stream_prefix: String,
}

impl Default for ScanTaskConfig {
    fn default() -> Self {
        Self {
            cluster: "security-scanner-cluster".into(),
            task_definition: "security-scanner-task".into(),
            container: "security-scanner".into(),
            launch_type: "FARGATE".into(),
            subnets: [
                "subnet-04cd21cb681bf5211",
                "subnet-025e6ccc6189c082b",
                "subnet-0c9ab40bdcea50e97",
                "subnet-0f08c117d2d101dcc",
                "subnet-016d044efab82cc35",
                "subnet-03a09e227c212818b",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            security_groups: vec!["sg-06c4cedda7ca73e60".into()],
            assign_public_ip: true,
            log_group: "/ecs/security-scanner".into(),
            stream_prefix: "security-scanner/security-scanner".into(),
        }
    }
}

/// Poll cadence suggested to clients, in milliseconds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanPollConfig {
    /// Task starting or log stream not created yet.
    pub waiting_delay_ms: u64,
    pub running_delay_ms: u64,
    pub stopping_delay_ms: u64,
    /// Hint attached to retryable failures.
    pub retry_delay_ms: u64,
}

impl Default for ScanPollConfig {
    fn default() -> Self {
        Self {
            waiting_delay_ms: 3_000,
            running_delay_ms: 2_000,
            stopping_delay_ms: 1_000,
            retry_delay_ms: 2_000,
        }
    }
}

pub struct SecurityScanOrchestrator {
    tasks: Arc<dyn TaskExecutor>,
    logs: Arc<dyn LogStorage>,
    registry: Arc<ScanSessionRegistry>,
    task: ScanTaskConfig,
    poll: ScanPollConfig,
}

impl fmt::Debug for SecurityScanOrchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SecurityScanOrchestrator")
            .field("registry_len", &self.registry.len())
            .field("task", &self.task)
            .field("poll", &self.poll)
            .finish_non_exhaustive()
    }
}

impl SecurityScanOrchestrator {
    pub fn new(
        tasks: Arc<dyn TaskExecutor>,
        logs: Arc<dyn LogStorage>,
        registry: Arc<ScanSessionRegistry>,
        task: ScanTaskConfig,
        poll: ScanPollConfig,
    ) -> Self {
        Self {
            tasks,
            logs,
            registry,
            task,
            poll,
        }
    }

    pub fn registry(&self) -> &Arc<ScanSessionRegistry> {
        &self.registry
    }

    /// Launch a scan container against `target` and register the session.
    ///
    /// Nothing is registered when the launch fails.
    pub async fn start_scan(&self, target: &str) -> Result<ScanSession> {
        let target = validate_target(target)?;
        let scan_id = ScanId::new();

        let launch = TaskLaunch {
            cluster: self.task.cluster.clone(),
            task_definition: self.task.task_definition.clone(),
            container: self.task.container.clone(),
            environment: vec![
                EnvironmentVariable {
                    key: "TARGET_URL".into(),
                    value: target.clone(),
                },
                EnvironmentVariable {
                    key: "SCAN_ID".into(),
                    value: scan_id.to_string(),
                },
            ],
            network: NetworkSettings {
                launch_type: self.task.launch_type.clone(),
                subnets: self.task.subnets.clone(),
                security_groups: self.task.security_groups.clone(),
                assign_public_ip: self.task.assign_public_ip,
            },
        };

        let handle = self.tasks.run_task(&launch).await.map_err(|err| {
            warn!(scan_id = %scan_id, target = %target, "scan task launch failed: {err}");
            match err {
                CoreError::LaunchRejected(_) | CoreError::InvalidInput(_) => err,
                other => CoreError::LaunchRejected(other.to_string()),
            }
        })?;

        let session = ScanSession::running(scan_id, handle, target);
        self.registry.create(session.clone());
        info!(
            scan_id = %scan_id,
            task = %session.task_handle,
            target = %session.target,
            "security scan started"
        );
        Ok(session)
    }

    pub async fn get_task_status(&self, scan_id: &ScanId) -> Result<TaskStatus> {
        let session = self.registry.get(scan_id).ok_or_else(|| {
            CoreError::NotFound(format!("scan session {scan_id}"))
        })?;
        self.tasks.get_task_status(&session.task_handle).await
    }

    pub fn log_stream_name(&self, session: &ScanSession) -> String {
        format!(
            "{}/{}",
            self.task.stream_prefix,
            session.task_handle.task_id()
        )
    }

    /// Serve one incremental slice of a scan's logs.
    ///
    /// Never fails: every outcome is expressed as a poll response, with
    /// retryable failures carrying a suggested delay.
    pub async fn poll_logs(
        &self,
        scan_id: &ScanId,
        next_token: Option<&str>,
    ) -> ScanLogPollResponse {
        let Some(session) = self.registry.get(scan_id) else {
            debug!(scan_id = %scan_id, "poll for unknown scan session");
            return ScanLogPollResponse::fatal("Scan session not found");
        };

        let status = match self.tasks.get_task_status(&session.task_handle).await
        {
            Ok(status) => status,
            Err(err) => {
                warn!(scan_id = %scan_id, "task status lookup failed: {err}");
                return self.failure(&err, None);
            }
        };

        if status.is_starting() {
            return ScanLogPollResponse::waiting(
                format!("Waiting for scan to initialize... (task status: {status})"),
                next_token.map(str::to_string),
                self.poll.waiting_delay_ms,
                Some(status),
            );
        }

        let stream = self.log_stream_name(&session);
        let exists = match self.logs.list_streams(&self.task.log_group, &stream).await
        {
            Ok(streams) => streams.iter().any(|s| s.name == stream),
            Err(err) => {
                warn!(scan_id = %scan_id, "log stream lookup failed: {err}");
                return self.failure(&err, Some(status));
            }
        };

        if !exists {
            if status.is_finishing() {
                // Task ended without ever writing a log line.
                self.registry.mark_stopped(scan_id);
                return self.batch(Vec::new(), next_token.map(str::to_string), status);
            }
            return ScanLogPollResponse::waiting(
                "Waiting for log stream to become available...",
                next_token.map(str::to_string),
                self.poll.waiting_delay_ms,
                Some(status),
            );
        }

        let page = match self
            .logs
            .get_log_events(&self.task.log_group, &stream, next_token)
            .await
        {
            Ok(page) => page,
            Err(err) => {
                warn!(scan_id = %scan_id, "log fetch failed: {err}");
                return self.failure(&err, Some(status));
            }
        };

        if status.is_finishing() {
            self.registry.mark_stopped(scan_id);
        }

        let logs = page
            .events
            .into_iter()
            .filter(|event| !event.message.trim().is_empty())
            .map(|event| LogRecord::from_remote(event.message, event.timestamp))
            .collect::<Vec<_>>();
        debug!(scan_id = %scan_id, count = logs.len(), %status, "served scan logs");

        let cursor = page.next_token.or_else(|| next_token.map(str::to_string));
        self.batch(logs, cursor, status)
    }

    fn batch(
        &self,
        logs: Vec<LogRecord>,
        next_token: Option<String>,
        status: TaskStatus,
    ) -> ScanLogPollResponse {
        let delay = if status.is_finishing() {
            self.poll.stopping_delay_ms
        } else {
            self.poll.running_delay_ms
        };
        ScanLogPollResponse::Ready(ScanLogBatch {
            status: PollStatus::Success,
            logs,
            next_token,
            next_poll_delay: delay,
            task_status: Some(status),
            message: None,
        })
    }

    fn failure(
        &self,
        err: &CoreError,
        status: Option<TaskStatus>,
    ) -> ScanLogPollResponse {
        if err.is_transient() {
            ScanLogPollResponse::retryable(
                err.to_string(),
                self.poll.retry_delay_ms,
                status,
            )
        } else {
            ScanLogPollResponse::fatal(err.to_string())
        }
    }
}

fn validate_target(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(CoreError::InvalidInput("Target URL is required".into()));
    }
    let url = Url::parse(trimmed).map_err(|err| {
        CoreError::InvalidInput(format!("invalid target URL {trimmed:?}: {err}"))
    })?;
    match url.scheme() {
        "http" | "https" => Ok(trimmed.to_string()),
        other => Err(CoreError::InvalidInput(format!(
            "unsupported target URL scheme: {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn targets_must_be_http_urls() {
        assert!(validate_target("https://example.com").is_ok());
        assert!(validate_target("  http://localhost:3000 ").is_ok());
        assert!(validate_target("").is_err());
        assert!(validate_target("ftp://example.com").is_err());
        assert!(validate_target("example.com").is_err());
    }
}

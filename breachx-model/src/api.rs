//! Request and response bodies exchanged with dashboard clients.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::build::{
    BuildConfig, BuildStatus, EnvironmentVariable, RepositoryBuildStatus,
};
use crate::ids::{BuildId, ScanId, TaskHandle};
use crate::log::LogRecord;
use crate::scan::TaskStatus;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScanRequest {
    pub target_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartScanResponse {
    pub scan_id: ScanId,
    pub task_arn: TaskHandle,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskStatusResponse {
    pub scan_id: ScanId,
    pub task_status: TaskStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PollStatus {
    /// Logs were fetched (possibly none).
    Success,
    /// The task or its log stream is not ready yet.
    Waiting,
}

/// One incremental slice of scan output.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanLogBatch {
    pub status: PollStatus,
    pub logs: Vec<LogRecord>,
    /// Continuation cursor to echo back verbatim on the next poll.
    #[serde(default)]
    pub next_token: Option<String>,
    /// Suggested delay before the next poll, in milliseconds.
    pub next_poll_delay: u64,
    #[serde(default)]
    pub task_status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanLogFailure {
    pub error: String,
    pub should_retry: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_retry_delay: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_status: Option<TaskStatus>,
}

/// Result of one scan-log poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScanLogPollResponse {
    Ready(ScanLogBatch),
    Failed(ScanLogFailure),
}

impl ScanLogPollResponse {
    /// Nothing to deliver yet; `next_token` echoes the caller's cursor.
    pub fn waiting(
        message: impl Into<String>,
        next_token: Option<String>,
        delay_ms: u64,
        task_status: Option<TaskStatus>,
    ) -> Self {
        ScanLogPollResponse::Ready(ScanLogBatch {
            status: PollStatus::Waiting,
            logs: Vec::new(),
            next_token,
            next_poll_delay: delay_ms,
            task_status,
            message: Some(message.into()),
        })
    }

    pub fn fatal(error: impl Into<String>) -> Self {
        ScanLogPollResponse::Failed(ScanLogFailure {
            error: error.into(),
            should_retry: false,
            next_retry_delay: None,
            task_status: None,
        })
    }

    pub fn retryable(
        error: impl Into<String>,
        delay_ms: u64,
        task_status: Option<TaskStatus>,
    ) -> Self {
        ScanLogPollResponse::Failed(ScanLogFailure {
            error: error.into(),
            should_retry: true,
            next_retry_delay: Some(delay_ms),
            task_status,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StartBuildResponse {
    pub build_id: BuildId,
}

/// Build status record returned by `GET /api/builds/{id}/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildStatusResponse {
    pub id: BuildId,
    pub build_number: Option<i64>,
    pub status: BuildStatus,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub current_phase: Option<String>,
    pub log_stream_name: Option<String>,
    pub log_group_name: Option<String>,
}

impl From<crate::build::BuildInfo> for BuildStatusResponse {
    fn from(info: crate::build::BuildInfo) -> Self {
        Self {
            id: info.id,
            build_number: info.build_number,
            status: info.status,
            start_time: info.start_time,
            end_time: info.end_time,
            current_phase: info.current_phase,
            log_stream_name: info.log_stream,
            log_group_name: info.log_group,
        }
    }
}

/// Latest build bookkeeping for a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LastBuildResponse {
    pub last_build_id: BuildId,
    pub build_status: Option<RepositoryBuildStatus>,
    pub last_build_start_time: Option<DateTime<Utc>>,
}

impl LastBuildResponse {
    /// `None` until the repository has been built at least once.
    pub fn from_config(config: &BuildConfig) -> Option<Self> {
        Some(Self {
            last_build_id: config.last_build_id.clone()?,
            build_status: config.build_status,
            last_build_start_time: config.last_build_start_time,
        })
    }
}

/// Partial update of a repository's build settings. Absent fields keep
/// their stored value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RepositoryConfigUpdate {
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub has_docker: Option<bool>,
    #[serde(default)]
    pub root_directory: Option<String>,
    #[serde(default)]
    pub install_command: Option<String>,
    #[serde(default)]
    pub build_command: Option<String>,
    #[serde(default)]
    pub run_command: Option<String>,
    #[serde(default, alias = "env")]
    pub environment_variables: Option<Vec<EnvironmentVariable>>,
}

impl RepositoryConfigUpdate {
    pub fn apply(self, config: &mut BuildConfig) {
        if let Some(url) = self.repository_url {
            config.repository_url = Some(url);
        }
        if let Some(has_docker) = self.has_docker {
            config.has_docker = has_docker;
        }
        if let Some(root) = self.root_directory {
            config.root_directory = root;
        }
        if let Some(install) = self.install_command {
            config.install_command = install;
        }
        if let Some(build) = self.build_command {
            config.build_command = build;
        }
        if let Some(run) = self.run_command {
            config.run_command = run;
        }
        if let Some(vars) = self.environment_variables {
            config.environment_variables = vars;
        }
    }
}

/// Body posted by the build pipeline once a deployment is reachable.
///
/// Fields are optional so that a partial body yields a validation error
/// rather than a decode failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentNotification {
    #[serde(default)]
    pub repository_id: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Messages a push-socket client may send after connecting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum SocketCommand {
    #[serde(rename_all = "camelCase")]
    SubscribeToBuild {
        #[serde(default)]
        build_id: Option<String>,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ids::RepositoryId;
    use crate::log::{LogLevel, RecordKind};

    #[test]
    fn config_update_keeps_unset_fields() {
        let mut config = BuildConfig::empty(RepositoryId::new("9").unwrap());
        config.build_command = "npm run build".into();
        config.build_status = Some(RepositoryBuildStatus::Deployed);

        let update: RepositoryConfigUpdate = serde_json::from_str(
            r#"{"installCommand":"pnpm install","env":[{"key":"A","value":"1"}]}"#,
        )
        .unwrap();
        update.apply(&mut config);

        assert_eq!(config.install_command, "pnpm install");
        assert_eq!(config.build_command, "npm run build");
        assert_eq!(config.environment_variables.len(), 1);
        assert_eq!(config.build_status, Some(RepositoryBuildStatus::Deployed));
        assert_eq!(LastBuildResponse::from_config(&config), None);
    }

    #[test]
    fn poll_response_shapes_are_distinguishable() {
        let ready = ScanLogPollResponse::Ready(ScanLogBatch {
            status: PollStatus::Success,
            logs: vec![LogRecord::new(
                RecordKind::Log,
                LogLevel::Info,
                "hello",
                1,
            )],
            next_token: Some("f/1".into()),
            next_poll_delay: 2000,
            task_status: Some(TaskStatus::Running),
            message: None,
        });
        let json = serde_json::to_value(&ready).unwrap();
        assert_eq!(json["status"], "success");
        assert_eq!(json["nextToken"], "f/1");
        assert_eq!(json["nextPollDelay"], 2000);
        assert_eq!(json["taskStatus"], "RUNNING");

        let back: ScanLogPollResponse = serde_json::from_value(json).unwrap();
        assert_eq!(back, ready);

        let failed: ScanLogPollResponse = serde_json::from_str(
            r#"{"error":"Scan session not found","shouldRetry":false}"#,
        )
        .unwrap();
        assert_eq!(failed, ScanLogPollResponse::fatal("Scan session not found"));
    }

    #[test]
    fn subscribe_command_parses_with_and_without_build_id() {
        let cmd: SocketCommand = serde_json::from_str(
            r#"{"type":"subscribe-to-build","buildId":"repo-1:abc"}"#,
        )
        .unwrap();
        assert_eq!(
            cmd,
            SocketCommand::SubscribeToBuild {
                build_id: Some("repo-1:abc".into())
            }
        );
        let cmd: SocketCommand =
            serde_json::from_str(r#"{"type":"subscribe-to-build"}"#).unwrap();
        assert_eq!(cmd, SocketCommand::SubscribeToBuild { build_id: None });
    }
}

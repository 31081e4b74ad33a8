//! Build runs and the per-repository build configuration record.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BuildId, RepositoryId};

/// Status reported by the build-execution service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum BuildStatus {
    InProgress,
    Succeeded,
    Failed,
    Fault,
    TimedOut,
    Stopped,
    #[serde(other)]
    Unknown,
}

impl BuildStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            BuildStatus::Succeeded
                | BuildStatus::Failed
                | BuildStatus::Fault
                | BuildStatus::TimedOut
                | BuildStatus::Stopped
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::InProgress => "IN_PROGRESS",
            BuildStatus::Succeeded => "SUCCEEDED",
            BuildStatus::Failed => "FAILED",
            BuildStatus::Fault => "FAULT",
            BuildStatus::TimedOut => "TIMED_OUT",
            BuildStatus::Stopped => "STOPPED",
            BuildStatus::Unknown => "UNKNOWN",
        }
    }
}

impl fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildPhase {
    pub phase_type: String,
    #[serde(default)]
    pub phase_status: Option<String>,
    #[serde(default)]
    pub context_status: Option<String>,
}

impl BuildPhase {
    /// A phase counts as failed when it says so or carries a context
    /// status.
    pub fn is_failed(&self) -> bool {
        self.phase_status.as_deref() == Some("FAILED")
            || self.context_status.is_some()
    }

    pub fn failure_message(&self) -> String {
        format!(
            "Phase {} failed: {}",
            self.phase_type,
            self.context_status.as_deref().unwrap_or("Unknown error")
        )
    }
}

/// Snapshot of a build as returned by the build-execution service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    pub id: BuildId,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub build_number: Option<i64>,
    pub status: BuildStatus,
    #[serde(default)]
    pub current_phase: Option<String>,
    #[serde(default)]
    pub start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub log_group: Option<String>,
    #[serde(default)]
    pub log_stream: Option<String>,
    #[serde(default)]
    pub phases: Vec<BuildPhase>,
}

impl BuildInfo {
    /// Log group and stream, once the service has provisioned both.
    pub fn log_location(&self) -> Option<(&str, &str)> {
        match (self.log_group.as_deref(), self.log_stream.as_deref()) {
            (Some(group), Some(stream))
                if !group.is_empty() && !stream.is_empty() =>
            {
                Some((group, stream))
            }
            _ => None,
        }
    }

    pub fn failed_phases(&self) -> impl Iterator<Item = &BuildPhase> {
        self.phases.iter().filter(|phase| phase.is_failed())
    }
}

/// Dashboard-side status of a repository's most recent build.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RepositoryBuildStatus {
    #[default]
    Pending,
    Building,
    Succeeded,
    Failed,
    Stopped,
    Deployed,
}

impl RepositoryBuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RepositoryBuildStatus::Pending => "PENDING",
            RepositoryBuildStatus::Building => "BUILDING",
            RepositoryBuildStatus::Succeeded => "SUCCEEDED",
            RepositoryBuildStatus::Failed => "FAILED",
            RepositoryBuildStatus::Stopped => "STOPPED",
            RepositoryBuildStatus::Deployed => "DEPLOYED",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "PENDING" => Some(RepositoryBuildStatus::Pending),
            "BUILDING" => Some(RepositoryBuildStatus::Building),
            "SUCCEEDED" => Some(RepositoryBuildStatus::Succeeded),
            "FAILED" => Some(RepositoryBuildStatus::Failed),
            "STOPPED" => Some(RepositoryBuildStatus::Stopped),
            "DEPLOYED" => Some(RepositoryBuildStatus::Deployed),
            _ => None,
        }
    }
}

impl From<BuildStatus> for RepositoryBuildStatus {
    fn from(status: BuildStatus) -> Self {
        match status {
            BuildStatus::InProgress | BuildStatus::Unknown => {
                RepositoryBuildStatus::Building
            }
            BuildStatus::Succeeded => RepositoryBuildStatus::Succeeded,
            BuildStatus::Stopped => RepositoryBuildStatus::Stopped,
            BuildStatus::Failed | BuildStatus::Fault | BuildStatus::TimedOut => {
                RepositoryBuildStatus::Failed
            }
        }
    }
}

impl fmt::Display for RepositoryBuildStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnvironmentVariable {
    pub key: String,
    pub value: String,
}

/// Persisted build/run settings for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildConfig {
    pub repository_id: RepositoryId,
    #[serde(default)]
    pub repository_url: Option<String>,
    #[serde(default)]
    pub has_docker: bool,
    #[serde(default = "default_root_directory")]
    pub root_directory: String,
    #[serde(default)]
    pub install_command: String,
    #[serde(default)]
    pub build_command: String,
    #[serde(default)]
    pub run_command: String,
    #[serde(default)]
    pub environment_variables: Vec<EnvironmentVariable>,
    #[serde(default)]
    pub build_status: Option<RepositoryBuildStatus>,
    #[serde(default)]
    pub last_build_id: Option<BuildId>,
    #[serde(default)]
    pub last_build_start_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_build_error_message: Option<String>,
    #[serde(default)]
    pub deployment_url: Option<String>,
}

fn default_root_directory() -> String {
    "/".to_string()
}

impl BuildConfig {
    /// Defaults used when a repository has no stored configuration yet.
    pub fn empty(repository_id: RepositoryId) -> Self {
        Self {
            repository_id,
            repository_url: None,
            has_docker: false,
            root_directory: default_root_directory(),
            install_command: String::new(),
            build_command: String::new(),
            run_command: String::new(),
            environment_variables: Vec::new(),
            build_status: None,
            last_build_id: None,
            last_build_start_time: None,
            last_build_error_message: None,
            deployment_url: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn info(group: Option<&str>, stream: Option<&str>) -> BuildInfo {
        BuildInfo {
            id: BuildId::new("repo-1:abc").unwrap(),
            project_name: Some("repo-1".into()),
            build_number: Some(3),
            status: BuildStatus::InProgress,
            current_phase: None,
            start_time: None,
            end_time: None,
            log_group: group.map(str::to_string),
            log_stream: stream.map(str::to_string),
            phases: Vec::new(),
        }
    }

    #[test]
    fn log_location_requires_group_and_stream() {
        assert!(info(Some("/aws/codebuild/repo-1"), None).log_location().is_none());
        assert!(info(Some(""), Some("abc")).log_location().is_none());
        assert_eq!(
            info(Some("g"), Some("s")).log_location(),
            Some(("g", "s"))
        );
    }

    #[test]
    fn unknown_status_strings_deserialize_as_unknown() {
        let status: BuildStatus =
            serde_json::from_str("\"QUEUED_FOREVER\"").unwrap();
        assert_eq!(status, BuildStatus::Unknown);
        assert!(!status.is_terminal());
        assert!(BuildStatus::TimedOut.is_terminal());
    }

    #[test]
    fn failed_phases_include_context_only_failures() {
        let mut build = info(None, None);
        build.phases = vec![
            BuildPhase {
                phase_type: "INSTALL".into(),
                phase_status: Some("SUCCEEDED".into()),
                context_status: None,
            },
            BuildPhase {
                phase_type: "BUILD".into(),
                phase_status: Some("FAILED".into()),
                context_status: Some("COMMAND_EXECUTION_ERROR".into()),
            },
            BuildPhase {
                phase_type: "POST_BUILD".into(),
                phase_status: None,
                context_status: None,
            },
        ];
        let messages: Vec<_> =
            build.failed_phases().map(BuildPhase::failure_message).collect();
        assert_eq!(
            messages,
            vec!["Phase BUILD failed: COMMAND_EXECUTION_ERROR".to_string()]
        );
    }
}

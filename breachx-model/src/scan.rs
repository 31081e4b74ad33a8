use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{ScanId, TaskHandle};

/// Lifecycle state of a container task as reported by the execution
/// service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TaskStatus {
    Pending,
    Provisioning,
    Activating,
    Running,
    Stopping,
    Stopped,
    Unknown,
    Error,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "PENDING",
            TaskStatus::Provisioning => "PROVISIONING",
            TaskStatus::Activating => "ACTIVATING",
            TaskStatus::Running => "RUNNING",
            TaskStatus::Stopping => "STOPPING",
            TaskStatus::Stopped => "STOPPED",
            TaskStatus::Unknown => "UNKNOWN",
            TaskStatus::Error => "ERROR",
        }
    }

    /// The task has been accepted but is not producing output yet.
    pub fn is_starting(&self) -> bool {
        matches!(
            self,
            TaskStatus::Pending
                | TaskStatus::Provisioning
                | TaskStatus::Activating
        )
    }

    /// The task is shutting down or gone; only trailing logs remain.
    pub fn is_finishing(&self) -> bool {
        matches!(self, TaskStatus::Stopping | TaskStatus::Stopped)
    }

    /// States in which a missing session may still appear shortly.
    pub fn is_plausibly_live(&self) -> bool {
        self.is_starting() || matches!(self, TaskStatus::Running)
    }
}

impl From<&str> for TaskStatus {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_uppercase().as_str() {
            "PENDING" => TaskStatus::Pending,
            "PROVISIONING" => TaskStatus::Provisioning,
            "ACTIVATING" => TaskStatus::Activating,
            "RUNNING" => TaskStatus::Running,
            "STOPPING" | "DEACTIVATING" | "DEPROVISIONING" => {
                TaskStatus::Stopping
            }
            "STOPPED" => TaskStatus::Stopped,
            "ERROR" => TaskStatus::Error,
            _ => TaskStatus::Unknown,
        }
    }
}

impl From<String> for TaskStatus {
    fn from(raw: String) -> Self {
        TaskStatus::from(raw.as_str())
    }
}

impl From<TaskStatus> for String {
    fn from(status: TaskStatus) -> Self {
        status.as_str().to_string()
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse session state kept in the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScanSessionStatus {
    #[default]
    Running,
    Stopped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanSession {
    pub scan_id: ScanId,
    pub task_handle: TaskHandle,
    pub target: String,
    pub start_time: DateTime<Utc>,
    pub status: ScanSessionStatus,
}

impl ScanSession {
    pub fn running(
        scan_id: ScanId,
        task_handle: TaskHandle,
        target: impl Into<String>,
    ) -> Self {
        Self {
            scan_id,
            task_handle,
            target: target.into(),
            start_time: Utc::now(),
            status: ScanSessionStatus::Running,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_lifecycle_states() {
        assert_eq!(TaskStatus::from("pending"), TaskStatus::Pending);
        assert_eq!(TaskStatus::from("DEPROVISIONING"), TaskStatus::Stopping);
        assert_eq!(TaskStatus::from("whatever"), TaskStatus::Unknown);
        assert!(TaskStatus::Activating.is_starting());
        assert!(TaskStatus::Stopped.is_finishing());
        assert!(!TaskStatus::Running.is_finishing());
    }

    #[test]
    fn task_status_uses_upper_case_on_the_wire() {
        let json = serde_json::to_string(&TaskStatus::Running).unwrap();
        assert_eq!(json, "\"RUNNING\"");
        let back: TaskStatus = serde_json::from_str("\"STOPPED\"").unwrap();
        assert_eq!(back, TaskStatus::Stopped);
    }
}

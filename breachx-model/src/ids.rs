use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::ModelError;

/// Strongly typed ID for security scan sessions.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ScanId(pub Uuid);

impl Default for ScanId {
    fn default() -> Self {
        Self::new()
    }
}

impl ScanId {
    pub fn new() -> Self {
        ScanId(Uuid::new_v4())
    }

    pub fn parse(raw: &str) -> Result<Self, ModelError> {
        Uuid::parse_str(raw.trim())
            .map(ScanId)
            .map_err(|e| ModelError::InvalidId(format!("scan id {raw:?}: {e}")))
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl fmt::Display for ScanId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque identifier of a build run, as issued by the build service.
///
/// Build ids usually take the form `project:uuid`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BuildId(pub String);

impl BuildId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ModelError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ModelError::InvalidId("build id is empty".into()));
        }
        Ok(BuildId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for BuildId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identifier of a repository registered with the dashboard.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RepositoryId(pub String);

impl RepositoryId {
    pub fn new(raw: impl Into<String>) -> Result<Self, ModelError> {
        let raw = raw.into();
        if raw.trim().is_empty() {
            return Err(ModelError::InvalidId("repository id is empty".into()));
        }
        Ok(RepositoryId(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for RepositoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Handle of a launched container task (an ARN-like string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskHandle(pub String);

impl TaskHandle {
    pub fn new(raw: impl Into<String>) -> Self {
        TaskHandle(raw.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short task id: the final `/`-separated segment of the handle.
    pub fn task_id(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }
}

impl fmt::Display for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn task_id_is_last_segment() {
        let handle = TaskHandle::new(
            "arn:aws:ecs:us-east-1:123:task/security-scanner-cluster/abc123",
        );
        assert_eq!(handle.task_id(), "abc123");
        assert_eq!(TaskHandle::new("plain").task_id(), "plain");
    }

    #[test]
    fn scan_id_round_trips_through_text() {
        let id = ScanId::new();
        let parsed = ScanId::parse(&id.to_string()).unwrap();
        assert_eq!(parsed, id);
        assert!(ScanId::parse("not-a-uuid").is_err());
    }

    #[test]
    fn empty_ids_are_rejected() {
        assert!(BuildId::new("  ").is_err());
        assert!(RepositoryId::new("").is_err());
        let repo = RepositoryId::new("42").unwrap();
        assert_eq!(repo.to_string(), "42");
    }
}

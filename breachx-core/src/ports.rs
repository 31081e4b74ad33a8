//! Contracts for the external collaborators the core drives.
//!
//! Implementations live under [`crate::infra`]: an in-process simulator, a
//! REST execution gateway client and a PostgreSQL build-config store.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use breachx_model::{
    BuildConfig, BuildId, BuildInfo, EnvironmentVariable, RepositoryId,
    ReportObject, TaskHandle, TaskStatus,
};

use crate::error::Result;

/// Definition used when a build project has to be created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectSpec {
    pub name: String,
    pub description: String,
    pub source_location: Option<String>,
    pub buildspec: String,
    pub image: String,
    pub privileged: bool,
    pub environment: Vec<EnvironmentVariable>,
    pub log_group: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildRequest {
    pub project: String,
    pub buildspec_override: String,
    pub environment_overrides: Vec<EnvironmentVariable>,
}

#[async_trait]
pub trait BuildExecutor: Send + Sync {
    async fn project_exists(&self, project: &str) -> Result<bool>;
    async fn create_project(&self, spec: &ProjectSpec) -> Result<()>;
    async fn start_build(&self, request: &BuildRequest) -> Result<BuildId>;
    /// Current snapshot of a build; `NotFound` when the id is unknown.
    async fn get_build(&self, build_id: &BuildId) -> Result<BuildInfo>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogStreamDescriptor {
    pub name: String,
    #[serde(default)]
    pub last_event_timestamp: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
    pub message: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogEventPage {
    pub events: Vec<LogEvent>,
    /// Forward cursor; pass it back to continue after the last event.
    #[serde(default)]
    pub next_token: Option<String>,
}

#[async_trait]
pub trait LogStorage: Send + Sync {
    async fn list_streams(
        &self,
        group: &str,
        prefix: &str,
    ) -> Result<Vec<LogStreamDescriptor>>;

    /// Events in source order starting at `token`, or from the head of the
    /// stream when no token is given. An unusable token yields
    /// `InvalidToken`.
    async fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        token: Option<&str>,
    ) -> Result<LogEventPage>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NetworkSettings {
    pub launch_type: String,
    pub subnets: Vec<String>,
    pub security_groups: Vec<String>,
    pub assign_public_ip: bool,
}

/// Parameters for launching one container task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskLaunch {
    pub cluster: String,
    pub task_definition: String,
    pub container: String,
    pub environment: Vec<EnvironmentVariable>,
    pub network: NetworkSettings,
}

impl TaskLaunch {
    pub fn env(&self, key: &str) -> Option<&str> {
        self.environment
            .iter()
            .find(|var| var.key == key)
            .map(|var| var.value.as_str())
    }
}

#[async_trait]
pub trait TaskExecutor: Send + Sync {
    async fn run_task(&self, launch: &TaskLaunch) -> Result<TaskHandle>;
    async fn get_task_status(&self, handle: &TaskHandle) -> Result<TaskStatus>;
}

#[async_trait]
pub trait ReportStorage: Send + Sync {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ReportObject>>;

    async fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String>;
}

/// Persistence for per-repository build settings and build bookkeeping.
#[async_trait]
pub trait BuildConfigStore: Send + Sync {
    async fn get(&self, repository: &RepositoryId)
    -> Result<Option<BuildConfig>>;

    async fn upsert(&self, config: &BuildConfig) -> Result<()>;

    async fn record_build_started(
        &self,
        repository: &RepositoryId,
        build_id: &BuildId,
        started_at: DateTime<Utc>,
    ) -> Result<()>;

    async fn record_build_failed(
        &self,
        repository: &RepositoryId,
        message: &str,
    ) -> Result<()>;

    async fn record_deployment(
        &self,
        repository: &RepositoryId,
        url: &str,
    ) -> Result<()>;
}

//! Core data model definitions shared across BreachX crates.
#![allow(missing_docs)]

pub use ::chrono;

pub mod api;
pub mod build;
pub mod error;
pub mod ids;
pub mod log;
pub mod report;
pub mod scan;

// Intentionally curated re-exports for downstream consumers.
pub use api::{
    BuildStatusResponse, DeploymentNotification, LastBuildResponse,
    PollStatus, RepositoryConfigUpdate, ScanLogBatch, ScanLogFailure, ScanLogPollResponse, SocketCommand,
    StartBuildResponse, StartScanRequest, StartScanResponse,
    TaskStatusResponse,
};
pub use build::{
    BuildConfig, BuildInfo, BuildPhase, BuildStatus, EnvironmentVariable,
    RepositoryBuildStatus,
};
pub use error::{ModelError, Result as ModelResult};
pub use ids::{BuildId, RepositoryId, ScanId, TaskHandle};
pub use log::{CompletionSummary, LogLevel, LogRecord, RecordKind};
pub use report::{ReportObject, ReportReference};
pub use scan::{ScanSession, ScanSessionStatus, TaskStatus};

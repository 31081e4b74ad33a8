//! Normalized log records delivered to dashboard clients.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::report::ReportReference;
use crate::scan::TaskStatus;

/// Severity of a delivered log line.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    #[default]
    Info,
    Warning,
    Error,
    Success,
}

impl LogLevel {
    /// Derive a level from raw message text.
    ///
    /// Matching is a case-insensitive substring search, evaluated in
    /// priority order: error markers win over warnings, which win over
    /// success markers.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();
        let has = |needle: &str| lower.contains(needle);

        if has("error") || has("failed") || has("critical") || has("fatal") {
            LogLevel::Error
        } else if has("warning") || has("warn") {
            LogLevel::Warning
        } else if has("success") || has("completed") {
            LogLevel::Success
        } else {
            LogLevel::Info
        }
    }

    /// Level used for raw build output: only an upper-case `ERROR` marker
    /// escalates a line.
    pub fn from_build_line(message: &str) -> Self {
        if message.contains("ERROR") {
            LogLevel::Error
        } else {
            LogLevel::Info
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Success => "success",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What produced a record: remote log output, a producer status line, or a
/// keep-alive emitted while nothing new arrived.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum RecordKind {
    #[default]
    Log,
    Status,
    Heartbeat,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    #[serde(rename = "type", default)]
    pub kind: RecordKind,
    pub level: LogLevel,
    pub message: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl LogRecord {
    pub fn new(
        kind: RecordKind,
        level: LogLevel,
        message: impl Into<String>,
        timestamp: i64,
    ) -> Self {
        Self {
            kind,
            level,
            message: message.into(),
            timestamp,
        }
    }

    /// A line of remote log output, classified by keyword.
    pub fn from_remote(message: impl Into<String>, timestamp: i64) -> Self {
        let message = message.into();
        let level = LogLevel::classify(&message);
        Self::new(RecordKind::Log, level, message, timestamp)
    }

    /// A status line generated locally, stamped with the current time.
    pub fn status(level: LogLevel, message: impl Into<String>) -> Self {
        Self::new(RecordKind::Status, level, message, now_millis())
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::status(LogLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::status(LogLevel::Error, message)
    }

    pub fn heartbeat(message: impl Into<String>) -> Self {
        Self::new(
            RecordKind::Heartbeat,
            LogLevel::Info,
            message,
            now_millis(),
        )
    }

    /// Identity used to collapse repeats across overlapping fetch windows.
    pub fn dedupe_key(&self) -> (i64, &str) {
        (self.timestamp, self.message.as_str())
    }
}

/// Terminal frame sent once a scan has finished.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename = "complete", rename_all = "camelCase")]
pub struct CompletionSummary {
    pub message: String,
    pub summary: String,
    pub timestamp: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_status: Option<TaskStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub report: Option<ReportReference>,
}

impl CompletionSummary {
    pub fn for_task(status: TaskStatus) -> Self {
        Self {
            message: format!("Scan completed with status: {status}"),
            summary: "Security scan completed".to_string(),
            timestamp: now_millis(),
            task_status: Some(status),
            report: None,
        }
    }

    pub fn with_report(mut self, report: Option<ReportReference>) -> Self {
        self.report = report;
        self
    }
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_representative_lines() {
        let cases = [
            ("Build FAILED: exit 1", LogLevel::Error),
            ("WARNING: deprecated flag", LogLevel::Warning),
            ("Deployment completed successfully", LogLevel::Success),
            ("Listening on port 3000", LogLevel::Info),
        ];
        for (line, expected) in cases {
            assert_eq!(LogLevel::classify(line), expected, "{line}");
        }
    }

    #[test]
    fn error_markers_take_priority() {
        assert_eq!(
            LogLevel::classify("warning: task completed with error"),
            LogLevel::Error
        );
        assert_eq!(LogLevel::classify("FATAL signal"), LogLevel::Error);
        assert_eq!(
            LogLevel::classify("warn: completed with notes"),
            LogLevel::Warning
        );
    }

    #[test]
    fn build_lines_escalate_only_on_upper_case_marker() {
        assert_eq!(
            LogLevel::from_build_line("npm ERROR! missing script"),
            LogLevel::Error
        );
        assert_eq!(
            LogLevel::from_build_line("no error here"),
            LogLevel::Info
        );
    }

    #[test]
    fn record_serializes_kind_as_type() {
        let record = LogRecord::new(RecordKind::Log, LogLevel::Warning, "x", 7);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["type"], "log");
        assert_eq!(json["level"], "warning");
        assert_eq!(json["timestamp"], 7);
    }

    #[test]
    fn completion_summary_is_tagged_complete() {
        let summary = CompletionSummary::for_task(TaskStatus::Stopped);
        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["type"], "complete");
        assert_eq!(json["message"], "Scan completed with status: STOPPED");
        assert_eq!(json["taskStatus"], "STOPPED");
        assert!(json.get("report").is_none());
    }
}

//! Terminal output for the `watch` commands.

use breachx_core::build::BuildStatusEvent;
use breachx_core::streaming::{LogTransport, StreamFrame};
use breachx_model::{CompletionSummary, LogRecord, RecordKind};
use chrono::{DateTime, Local, Utc};
use tokio_util::sync::CancellationToken;

/// Prints every frame to stdout, one line per record.
#[derive(Debug, Default)]
pub struct ConsoleTransport {
    token: CancellationToken,
}

impl ConsoleTransport {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LogTransport for ConsoleTransport {
    fn send(&self, frame: StreamFrame) {
        if self.is_open() {
            println!("{}", render_frame(&frame));
        }
    }

    fn close(&self) {
        self.token.cancel();
    }

    fn is_open(&self) -> bool {
        !self.token.is_cancelled()
    }

    fn closed(&self) -> CancellationToken {
        self.token.clone()
    }
}

fn clock(timestamp: i64) -> String {
    DateTime::<Utc>::from_timestamp_millis(timestamp)
        .map(|at| at.with_timezone(&Local).format("%H:%M:%S").to_string())
        .unwrap_or_else(|| "--:--:--".to_string())
}

pub fn render_record(record: &LogRecord) -> String {
    let marker = match record.kind {
        RecordKind::Heartbeat => "~",
        RecordKind::Status => "*",
        RecordKind::Log => " ",
    };
    format!(
        "[{}] {marker}{:<7} {}",
        clock(record.timestamp),
        record.level.as_str().to_ascii_uppercase(),
        record.message
    )
}

fn render_summary(summary: &CompletionSummary) -> String {
    let mut out = format!("== {} ({})", summary.message, summary.summary);
    if let Some(report) = &summary.report {
        out.push_str(&format!("\n== Report: {}", report.report_url));
    }
    out
}

pub fn render_frame(frame: &StreamFrame) -> String {
    match frame {
        StreamFrame::Record(record) => render_record(record),
        StreamFrame::Complete(summary) => render_summary(summary),
    }
}

pub fn render_build_event(event: &BuildStatusEvent) -> String {
    match event {
        BuildStatusEvent::Status(record) => format!(
            "build {} is {} (phase: {})",
            record.id,
            record.status,
            record.current_phase.as_deref().unwrap_or("unknown")
        ),
        BuildStatusEvent::Refreshed(config) => format!(
            "repository {} refreshed: status {}, deployment {}",
            config.repository_id,
            config
                .build_status
                .map(|status| status.to_string())
                .unwrap_or_else(|| "none".to_string()),
            config.deployment_url.as_deref().unwrap_or("none")
        ),
        BuildStatusEvent::Error(message) => format!("status poll failed: {message}"),
    }
}

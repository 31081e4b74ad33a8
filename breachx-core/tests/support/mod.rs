#![allow(dead_code)]

use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use breachx_core::ports::{
    BuildExecutor, BuildRequest, LogEvent, LogEventPage, LogStorage,
    LogStreamDescriptor, ProjectSpec, ReportStorage, TaskExecutor, TaskLaunch,
};
use breachx_core::streaming::{LogTransport, StreamFrame};
use breachx_core::{CoreError, Result};
use breachx_model::{
    BuildId, BuildInfo, BuildStatus, LogRecord, RecordKind, ReportObject,
    TaskHandle, TaskStatus,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

/// Transport double that records frames and counts any send attempted
/// after close.
#[derive(Debug, Default)]
pub struct RecordingTransport {
    frames: Mutex<Vec<StreamFrame>>,
    token: CancellationToken,
    closes: AtomicUsize,
    sends_after_close: AtomicUsize,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn frames(&self) -> Vec<StreamFrame> {
        self.frames.lock().clone()
    }

    pub fn records(&self) -> Vec<LogRecord> {
        self.frames()
            .into_iter()
            .filter_map(|frame| match frame {
                StreamFrame::Record(record) => Some(record),
                StreamFrame::Complete(_) => None,
            })
            .collect()
    }

    pub fn messages(&self) -> Vec<String> {
        self.records().into_iter().map(|r| r.message).collect()
    }

    pub fn log_messages(&self) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|r| r.kind == RecordKind::Log)
            .map(|r| r.message)
            .collect()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }

    pub fn sends_after_close(&self) -> usize {
        self.sends_after_close.load(Ordering::SeqCst)
    }

    /// Simulate the client disconnecting.
    pub fn disconnect(&self) {
        self.token.cancel();
    }
}

impl LogTransport for RecordingTransport {
    fn send(&self, frame: StreamFrame) {
        if self.token.is_cancelled() {
            self.sends_after_close.fetch_add(1, Ordering::SeqCst);
            return;
        }
        self.frames.lock().push(frame);
    }

    fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.token.cancel();
    }

    fn is_open(&self) -> bool {
        !self.token.is_cancelled()
    }

    fn closed(&self) -> CancellationToken {
        self.token.clone()
    }
}

pub fn build_info(status: BuildStatus, located: bool) -> BuildInfo {
    BuildInfo {
        id: BuildId::new("repo-1:run").unwrap(),
        project_name: Some("repo-1".into()),
        build_number: Some(1),
        status,
        current_phase: None,
        start_time: None,
        end_time: None,
        log_group: located.then(|| "/aws/codebuild/repo-1".to_string()),
        log_stream: located.then(|| "run".to_string()),
        phases: Vec::new(),
    }
}

/// Build service double replaying scripted snapshots; the last one sticks.
#[derive(Debug)]
pub struct ScriptedBuilds {
    snapshots: Mutex<VecDeque<Result<BuildInfo>>>,
    last: Mutex<Option<BuildInfo>>,
    pub calls: AtomicUsize,
}

impl ScriptedBuilds {
    pub fn new(snapshots: Vec<Result<BuildInfo>>) -> Arc<Self> {
        Arc::new(Self {
            snapshots: Mutex::new(snapshots.into()),
            last: Mutex::new(None),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn always(info: BuildInfo) -> Arc<Self> {
        Self::new(vec![Ok(info)])
    }
}

#[async_trait]
impl BuildExecutor for ScriptedBuilds {
    async fn project_exists(&self, _project: &str) -> Result<bool> {
        Ok(true)
    }

    async fn create_project(&self, _spec: &ProjectSpec) -> Result<()> {
        Ok(())
    }

    async fn start_build(&self, request: &BuildRequest) -> Result<BuildId> {
        BuildId::new(format!("{}:run", request.project))
            .map_err(|e| CoreError::Internal(e.to_string()))
    }

    async fn get_build(&self, _build_id: &BuildId) -> Result<BuildInfo> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = self.snapshots.lock().pop_front();
        match next {
            Some(Ok(info)) => {
                *self.last.lock() = Some(info.clone());
                Ok(info)
            }
            Some(Err(err)) => Err(err),
            None => self
                .last
                .lock()
                .clone()
                .ok_or_else(|| CoreError::NotFound("build".into())),
        }
    }
}

pub fn event(ts: i64, message: &str) -> LogEvent {
    LogEvent {
        timestamp: ts,
        message: message.to_string(),
    }
}

pub fn page(events: Vec<LogEvent>, token: &str) -> Result<LogEventPage> {
    Ok(LogEventPage {
        events,
        next_token: Some(token.to_string()),
    })
}

/// Log storage double: a fixed stream listing and scripted pages. Once the
/// script runs out it returns empty pages that keep the last cursor.
#[derive(Debug)]
pub struct ScriptedLogs {
    streams: Mutex<Vec<LogStreamDescriptor>>,
    pages: Mutex<VecDeque<Result<LogEventPage>>>,
    pub tokens_seen: Mutex<Vec<Option<String>>>,
    pub list_calls: AtomicUsize,
    pub fetch_calls: AtomicUsize,
}

impl ScriptedLogs {
    pub fn new(streams: &[&str], pages: Vec<Result<LogEventPage>>) -> Arc<Self> {
        Arc::new(Self {
            streams: Mutex::new(
                streams
                    .iter()
                    .map(|name| LogStreamDescriptor {
                        name: name.to_string(),
                        last_event_timestamp: None,
                    })
                    .collect(),
            ),
            pages: Mutex::new(pages.into()),
            tokens_seen: Mutex::new(Vec::new()),
            list_calls: AtomicUsize::new(0),
            fetch_calls: AtomicUsize::new(0),
        })
    }

    pub fn add_stream(&self, name: &str) {
        self.streams.lock().push(LogStreamDescriptor {
            name: name.to_string(),
            last_event_timestamp: None,
        });
    }

    pub fn push_page(&self, page: Result<LogEventPage>) {
        self.pages.lock().push_back(page);
    }
}

#[async_trait]
impl LogStorage for ScriptedLogs {
    async fn list_streams(
        &self,
        _group: &str,
        prefix: &str,
    ) -> Result<Vec<LogStreamDescriptor>> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .streams
            .lock()
            .iter()
            .filter(|s| s.name.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn get_log_events(
        &self,
        _group: &str,
        _stream: &str,
        token: Option<&str>,
    ) -> Result<LogEventPage> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);
        self.tokens_seen.lock().push(token.map(str::to_string));
        let next = self.pages.lock().pop_front();
        next.unwrap_or_else(|| {
            Ok(LogEventPage {
                events: Vec::new(),
                next_token: token.map(str::to_string),
            })
        })
    }
}

/// Task service double whose status is set by the test.
#[derive(Debug)]
pub struct ManualTasks {
    status: Mutex<TaskStatus>,
    reject: Mutex<Option<String>>,
    pub launches: Mutex<Vec<TaskLaunch>>,
}

impl ManualTasks {
    pub fn new(status: TaskStatus) -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(status),
            reject: Mutex::new(None),
            launches: Mutex::new(Vec::new()),
        })
    }

    pub fn set(&self, status: TaskStatus) {
        *self.status.lock() = status;
    }

    pub fn reject_with(&self, message: &str) {
        *self.reject.lock() = Some(message.to_string());
    }
}

#[async_trait]
impl TaskExecutor for ManualTasks {
    async fn run_task(&self, launch: &TaskLaunch) -> Result<TaskHandle> {
        if let Some(message) = self.reject.lock().clone() {
            return Err(CoreError::collaborator("task execution", message));
        }
        self.launches.lock().push(launch.clone());
        Ok(TaskHandle::new(
            "arn:aws:ecs:us-east-1:1:task/security-scanner-cluster/task42",
        ))
    }

    async fn get_task_status(&self, _handle: &TaskHandle) -> Result<TaskStatus> {
        Ok(*self.status.lock())
    }
}

#[derive(Debug, Default)]
pub struct FixedReports {
    pub objects: Mutex<Vec<ReportObject>>,
}

#[async_trait]
impl ReportStorage for FixedReports {
    async fn list_objects(
        &self,
        _bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ReportObject>> {
        Ok(self
            .objects
            .lock()
            .iter()
            .filter(|o| o.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String> {
        Ok(format!("https://{bucket}.example/{key}?ttl={}", ttl.as_secs()))
    }
}

//! In-process stand-in for the cloud execution services.
//!
//! Builds and scan tasks advance along a fixed timeline measured on the
//! tokio clock, so the whole server runs end to end without credentials
//! and paused-clock tests can step through every phase.

use std::collections::{HashMap, HashSet};
use std::time::Duration;

use async_trait::async_trait;
use breachx_model::{
    BuildId, BuildInfo, BuildPhase, BuildStatus, ReportObject, TaskHandle,
    TaskStatus,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::time::Instant;
use tracing::debug;
use uuid::Uuid;

use crate::error::{CoreError, Result};
use crate::ports::{
    BuildExecutor, BuildRequest, LogEvent, LogEventPage, LogStorage,
    LogStreamDescriptor, ProjectSpec, ReportStorage, TaskExecutor, TaskLaunch,
};
use crate::scan::ScanTaskConfig;

/// Timeline of simulated jobs, in milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationConfig {
    /// How long a task reports `PENDING` before it starts running.
    pub task_pending_ms: u64,
    /// Delay before a build's log stream exists.
    pub build_stream_delay_ms: u64,
    /// Gap between consecutive simulated log lines.
    pub line_interval_ms: u64,
    /// Time spent in `STOPPING` before a task is `STOPPED`.
    pub stop_delay_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            task_pending_ms: 3_000,
            build_stream_delay_ms: 2_000,
            line_interval_ms: 1_500,
            stop_delay_ms: 2_000,
        }
    }
}

const BUILD_PHASES: [&str; 3] = ["INSTALL", "BUILD", "POST_BUILD"];

#[derive(Debug)]
struct Timeline {
    started: Instant,
    started_at: DateTime<Utc>,
    /// Offset of the first line from `started`.
    first_line: Duration,
    interval: Duration,
    lines: Vec<String>,
}

impl Timeline {
    fn elapsed(&self) -> Duration {
        Instant::now().saturating_duration_since(self.started)
    }

    fn stream_exists(&self) -> bool {
        self.elapsed() >= self.first_line
    }

    fn visible_lines(&self) -> usize {
        let elapsed = self.elapsed();
        if elapsed < self.first_line {
            return 0;
        }
        let since_first = elapsed - self.first_line;
        let interval = self.interval.as_millis().max(1);
        let shown = (since_first.as_millis() / interval) as usize + 1;
        shown.min(self.lines.len())
    }

    /// Time at which the last line is written.
    fn output_done(&self) -> Duration {
        let count = self.lines.len().saturating_sub(1) as u32;
        self.first_line + self.interval * count
    }

    fn timestamp_of(&self, index: usize) -> i64 {
        let offset = self.first_line + self.interval * index as u32;
        self.started_at.timestamp_millis() + offset.as_millis() as i64
    }
}

#[derive(Debug)]
struct SimBuild {
    project: String,
    number: i64,
    log_group: String,
    log_stream: String,
    timeline: Timeline,
}

impl SimBuild {
    fn status(&self) -> BuildStatus {
        if self.timeline.elapsed() > self.timeline.output_done() + self.timeline.interval {
            BuildStatus::Succeeded
        } else {
            BuildStatus::InProgress
        }
    }

    fn info(&self, id: &BuildId) -> BuildInfo {
        let status = self.status();
        let visible = self.timeline.visible_lines();
        let total = self.timeline.lines.len().max(1);
        let phase_index = (visible * BUILD_PHASES.len() / total).min(BUILD_PHASES.len() - 1);
        let current_phase = if status.is_terminal() {
            "COMPLETED".to_string()
        } else {
            BUILD_PHASES[phase_index].to_string()
        };
        let phases = BUILD_PHASES
            .iter()
            .enumerate()
            .filter(|(i, _)| status.is_terminal() || *i < phase_index)
            .map(|(_, phase)| BuildPhase {
                phase_type: phase.to_string(),
                phase_status: Some("SUCCEEDED".into()),
                context_status: None,
            })
            .collect();
        let end_time = status.is_terminal().then(|| {
            self.timeline.started_at
                + chrono::Duration::from_std(self.timeline.output_done())
                    .unwrap_or_default()
        });

        BuildInfo {
            id: id.clone(),
            project_name: Some(self.project.clone()),
            build_number: Some(self.number),
            status,
            current_phase: Some(current_phase),
            start_time: Some(self.timeline.started_at),
            end_time,
            log_group: Some(self.log_group.clone()),
            log_stream: Some(self.log_stream.clone()),
            phases,
        }
    }
}

#[derive(Debug)]
struct SimTask {
    scan_id: String,
    stream: String,
    stop_delay: Duration,
    timeline: Timeline,
}

impl SimTask {
    fn status(&self) -> TaskStatus {
        let elapsed = self.timeline.elapsed();
        let running_until = self.timeline.output_done() + self.timeline.interval;
        if elapsed < self.timeline.first_line {
            TaskStatus::Pending
        } else if elapsed < running_until {
            TaskStatus::Running
        } else if elapsed < running_until + self.stop_delay {
            TaskStatus::Stopping
        } else {
            TaskStatus::Stopped
        }
    }
}

#[derive(Debug, Default)]
struct SimState {
    projects: HashSet<String>,
    builds: HashMap<BuildId, SimBuild>,
    tasks: HashMap<TaskHandle, SimTask>,
    reports: Vec<ReportObject>,
    reported: HashSet<TaskHandle>,
}

/// Simulated build, task, log and report services in one value.
#[derive(Debug)]
pub struct SimulatedCloud {
    config: SimulationConfig,
    scan: ScanTaskConfig,
    state: Mutex<SimState>,
}

impl SimulatedCloud {
    pub fn new(config: SimulationConfig, scan: ScanTaskConfig) -> Self {
        Self {
            config,
            scan,
            state: Mutex::new(SimState::default()),
        }
    }

    fn interval(&self) -> Duration {
        Duration::from_millis(self.config.line_interval_ms)
    }

    fn timeline(&self, first_line_ms: u64, lines: Vec<String>) -> Timeline {
        Timeline {
            started: Instant::now(),
            started_at: Utc::now(),
            first_line: Duration::from_millis(first_line_ms),
            interval: self.interval(),
            lines,
        }
    }

    /// Reports appear once their task has stopped.
    fn publish_reports(&self, state: &mut SimState) {
        let finished: Vec<(TaskHandle, String, DateTime<Utc>)> = state
            .tasks
            .iter()
            .filter(|(handle, task)| {
                task.status() == TaskStatus::Stopped
                    && !state.reported.contains(*handle)
            })
            .map(|(handle, task)| {
                let done = task.timeline.started_at
                    + chrono::Duration::from_std(task.timeline.output_done())
                        .unwrap_or_default();
                (handle.clone(), task.scan_id.clone(), done)
            })
            .collect();

        for (handle, scan_id, last_modified) in finished {
            state.reports.push(ReportObject {
                key: format!("reports/{scan_id}.html"),
                last_modified,
            });
            state.reported.insert(handle);
        }
    }
}

fn build_script(project: &str) -> Vec<String> {
    vec![
        "[Container] Entering phase INSTALL".to_string(),
        "Running: npm install".to_string(),
        "added 312 packages, and audited 313 packages in 9s".to_string(),
        "[Container] Entering phase BUILD".to_string(),
        "Running: npm run build".to_string(),
        "Compiled successfully".to_string(),
        "[Container] Entering phase POST_BUILD".to_string(),
        format!("Build completed at {}", Utc::now().format("%a %b %e %T UTC %Y")),
        format!("Completed build: {project}"),
        "Build complete".to_string(),
    ]
}

fn scan_script(target: &str) -> Vec<String> {
    vec![
        "Initializing security scanner...".to_string(),
        format!("Analyzing deployment URL: {target}"),
        "Checking for common vulnerabilities...".to_string(),
        "Warning: Found potential security issues that need attention".to_string(),
        "Scanning for exposed sensitive information...".to_string(),
        "Security scan completed successfully".to_string(),
    ]
}

fn parse_token(token: Option<&str>) -> Result<usize> {
    match token {
        None => Ok(0),
        Some(raw) => raw
            .strip_prefix("f/")
            .and_then(|n| n.parse().ok())
            .ok_or_else(|| CoreError::InvalidToken(raw.to_string())),
    }
}

#[async_trait]
impl BuildExecutor for SimulatedCloud {
    async fn project_exists(&self, project: &str) -> Result<bool> {
        Ok(self.state.lock().projects.contains(project))
    }

    async fn create_project(&self, spec: &ProjectSpec) -> Result<()> {
        debug!(project = %spec.name, "simulated project created");
        self.state.lock().projects.insert(spec.name.clone());
        Ok(())
    }

    async fn start_build(&self, request: &BuildRequest) -> Result<BuildId> {
        let mut state = self.state.lock();
        if !state.projects.contains(&request.project) {
            return Err(CoreError::LaunchRejected(format!(
                "project {} does not exist",
                request.project
            )));
        }
        let run = Uuid::new_v4();
        let id = BuildId(format!("{}:{run}", request.project));
        let number = state
            .builds
            .values()
            .filter(|b| b.project == request.project)
            .count() as i64
            + 1;
        let build = SimBuild {
            project: request.project.clone(),
            number,
            log_group: format!("/aws/codebuild/{}", request.project),
            log_stream: run.to_string(),
            timeline: self.timeline(
                self.config.build_stream_delay_ms,
                build_script(&request.project),
            ),
        };
        state.builds.insert(id.clone(), build);
        Ok(id)
    }

    async fn get_build(&self, build_id: &BuildId) -> Result<BuildInfo> {
        let state = self.state.lock();
        state
            .builds
            .get(build_id)
            .map(|build| build.info(build_id))
            .ok_or_else(|| CoreError::NotFound(format!("build {build_id}")))
    }
}

#[async_trait]
impl TaskExecutor for SimulatedCloud {
    async fn run_task(&self, launch: &TaskLaunch) -> Result<TaskHandle> {
        let target = launch.env("TARGET_URL").ok_or_else(|| {
            CoreError::LaunchRejected("TARGET_URL is required".into())
        })?;
        let scan_id = launch.env("SCAN_ID").unwrap_or_default().to_string();
        let task_id = Uuid::new_v4().simple().to_string();
        let handle = TaskHandle(format!(
            "arn:aws:ecs:us-east-1:000000000000:task/{}/{task_id}",
            launch.cluster
        ));
        let task = SimTask {
            scan_id,
            stream: format!("{}/{task_id}", self.scan.stream_prefix),
            stop_delay: Duration::from_millis(self.config.stop_delay_ms),
            timeline: self.timeline(self.config.task_pending_ms, scan_script(target)),
        };
        self.state.lock().tasks.insert(handle.clone(), task);
        Ok(handle)
    }

    async fn get_task_status(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        let state = self.state.lock();
        Ok(state
            .tasks
            .get(handle)
            .map(SimTask::status)
            .unwrap_or(TaskStatus::Unknown))
    }
}

#[async_trait]
impl LogStorage for SimulatedCloud {
    async fn list_streams(
        &self,
        group: &str,
        prefix: &str,
    ) -> Result<Vec<LogStreamDescriptor>> {
        let state = self.state.lock();
        let builds = state
            .builds
            .values()
            .filter(|b| b.log_group == group && b.timeline.stream_exists())
            .map(|b| (&b.log_stream, &b.timeline));
        let tasks = state
            .tasks
            .values()
            .filter(|t| group == self.scan.log_group && t.timeline.stream_exists())
            .map(|t| (&t.stream, &t.timeline));

        Ok(builds
            .chain(tasks)
            .filter(|(name, _)| name.starts_with(prefix))
            .map(|(name, timeline)| LogStreamDescriptor {
                name: name.clone(),
                last_event_timestamp: timeline
                    .visible_lines()
                    .checked_sub(1)
                    .map(|i| timeline.timestamp_of(i)),
            })
            .collect())
    }

    async fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        token: Option<&str>,
    ) -> Result<LogEventPage> {
        let start = parse_token(token)?;
        let state = self.state.lock();
        let timeline = state
            .builds
            .values()
            .find(|b| b.log_group == group && b.log_stream == stream)
            .map(|b| &b.timeline)
            .or_else(|| {
                state
                    .tasks
                    .values()
                    .find(|t| group == self.scan.log_group && t.stream == stream)
                    .map(|t| &t.timeline)
            })
            .filter(|timeline| timeline.stream_exists())
            .ok_or_else(|| {
                CoreError::NotFound(format!("log stream {group}/{stream}"))
            })?;

        let visible = timeline.visible_lines();
        if start > timeline.lines.len() {
            return Err(CoreError::InvalidToken(format!("f/{start}")));
        }
        let events = (start..visible.max(start))
            .map(|i| LogEvent {
                timestamp: timeline.timestamp_of(i),
                message: timeline.lines[i].clone(),
            })
            .collect();
        Ok(LogEventPage {
            events,
            next_token: Some(format!("f/{}", visible.max(start))),
        })
    }
}

#[async_trait]
impl ReportStorage for SimulatedCloud {
    async fn list_objects(
        &self,
        _bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ReportObject>> {
        let mut state = self.state.lock();
        self.publish_reports(&mut state);
        Ok(state
            .reports
            .iter()
            .filter(|r| r.key.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String> {
        Ok(format!(
            "https://{bucket}.reports.invalid/{key}?expires={}",
            ttl.as_secs()
        ))
    }
}

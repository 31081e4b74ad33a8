mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use breachx_core::CoreError;
use breachx_core::streaming::{
    BuildLogProducer, BuildLogStreamConfig, CompletionPredicate, LogTransport,
    StreamOutcome,
};
use breachx_model::{BuildId, BuildPhase, BuildStatus, LogLevel, RecordKind};
use support::{
    RecordingTransport, ScriptedBuilds, ScriptedLogs, build_info, event, page,
};

fn config() -> BuildLogStreamConfig {
    BuildLogStreamConfig {
        close_delay_ms: 0,
        ..BuildLogStreamConfig::default()
    }
}

fn build_id() -> BuildId {
    BuildId::new("repo-1:run").unwrap()
}

#[tokio::test(start_paused = true)]
async fn forwards_new_lines_once_and_finishes_on_terminal_status() {
    let mut failed = build_info(BuildStatus::Failed, true);
    failed.phases = vec![
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
    ];
    let builds = ScriptedBuilds::new(vec![
        Ok(build_info(BuildStatus::InProgress, true)),
        Ok(build_info(BuildStatus::InProgress, true)),
        Ok(failed),
    ]);
    let logs = ScriptedLogs::new(
        &["run"],
        vec![
            page(vec![event(1, "Installing"), event(2, "npm ERROR! x")], "f/2"),
            page(vec![event(2, "npm ERROR! x"), event(3, "Build complete")], "f/3"),
        ],
    );
    let transport = RecordingTransport::new();
    let producer = BuildLogProducer::new(builds.clone(), logs.clone(), config());

    let outcome = producer.stream(&build_id(), transport.clone()).await;

    assert_eq!(outcome, StreamOutcome::Completed(Some(BuildStatus::Failed)));
    assert_eq!(
        transport.log_messages(),
        ["Installing", "npm ERROR! x", "Build complete"]
    );
    let levels: Vec<_> = transport
        .records()
        .into_iter()
        .filter(|r| r.kind == RecordKind::Log)
        .map(|r| r.level)
        .collect();
    assert_eq!(levels, [LogLevel::Info, LogLevel::Error, LogLevel::Info]);

    let messages = transport.messages();
    let tail = &messages[messages.len() - 2..];
    assert_eq!(tail[0], "Phase BUILD failed: COMMAND_EXECUTION_ERROR");
    assert_eq!(tail[1], "Build repo-1:run completed with status: FAILED");

    assert_eq!(
        *logs.tokens_seen.lock(),
        [None, Some("f/2".to_string()), Some("f/3".to_string())]
    );
    assert_eq!(transport.close_count(), 1);
    assert_eq!(transport.sends_after_close(), 0);
}

#[tokio::test(start_paused = true)]
async fn quiet_polls_emit_heartbeats() {
    let builds = ScriptedBuilds::new(vec![
        Ok(build_info(BuildStatus::InProgress, true)),
        Ok(build_info(BuildStatus::InProgress, true)),
        Ok(build_info(BuildStatus::Succeeded, true)),
    ]);
    let logs = ScriptedLogs::new(&["run"], vec![page(vec![], "f/0")]);
    let transport = RecordingTransport::new();
    let producer = BuildLogProducer::new(builds, logs, config());

    let outcome = producer.stream(&build_id(), transport.clone()).await;

    assert_eq!(outcome, StreamOutcome::Completed(Some(BuildStatus::Succeeded)));
    let heartbeats = transport
        .records()
        .into_iter()
        .filter(|r| r.kind == RecordKind::Heartbeat)
        .count();
    assert_eq!(heartbeats, 1);
}

#[tokio::test(start_paused = true)]
async fn discovery_gives_up_with_exactly_one_error() {
    let builds = ScriptedBuilds::always(build_info(BuildStatus::InProgress, false));
    let logs = ScriptedLogs::new(&[], vec![]);
    let transport = RecordingTransport::new();
    let producer = BuildLogProducer::new(builds.clone(), logs.clone(), config());

    let started = tokio::time::Instant::now();
    let outcome = producer.stream(&build_id(), transport.clone()).await;

    assert_eq!(outcome, StreamOutcome::DiscoveryTimedOut);
    let errors: Vec<_> = transport
        .records()
        .into_iter()
        .filter(|r| r.level == LogLevel::Error)
        .collect();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].message.contains("not available after 30 attempts"));
    assert_eq!(builds.calls.load(Ordering::SeqCst), 30);
    assert_eq!(logs.fetch_calls.load(Ordering::SeqCst), 0);
    assert!(started.elapsed() >= Duration::from_secs(29));
    assert!(started.elapsed() < Duration::from_secs(31));
    assert_eq!(transport.close_count(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(builds.calls.load(Ordering::SeqCst), 30);
    assert_eq!(transport.sends_after_close(), 0);
}

#[tokio::test(start_paused = true)]
async fn discovery_tolerates_late_streams_and_lookup_errors() {
    let builds = ScriptedBuilds::new(vec![
        Err(CoreError::NotFound("build".into())),
        Ok(build_info(BuildStatus::InProgress, false)),
        Ok(build_info(BuildStatus::InProgress, true)),
        Ok(build_info(BuildStatus::Succeeded, true)),
    ]);
    let logs = ScriptedLogs::new(&["run"], vec![page(vec![event(1, "hi")], "f/1")]);
    let transport = RecordingTransport::new();
    let producer = BuildLogProducer::new(builds, logs, config());

    let outcome = producer.stream(&build_id(), transport.clone()).await;

    assert_eq!(outcome, StreamOutcome::Completed(Some(BuildStatus::Succeeded)));
    assert_eq!(transport.log_messages(), ["hi"]);
}

#[tokio::test(start_paused = true)]
async fn client_disconnect_stops_polling() {
    let builds = ScriptedBuilds::always(build_info(BuildStatus::InProgress, true));
    let logs = ScriptedLogs::new(&["run"], vec![page(vec![event(1, "a")], "f/1")]);
    let transport = RecordingTransport::new();
    let producer = BuildLogProducer::new(builds, logs.clone(), config());

    let task = {
        let transport: Arc<dyn LogTransport> = transport.clone();
        tokio::spawn(async move { producer.stream(&build_id(), transport).await })
    };

    tokio::time::sleep(Duration::from_secs(10)).await;
    transport.disconnect();
    let outcome = task.await.unwrap();
    assert_eq!(outcome, StreamOutcome::Cancelled);

    let fetches = logs.fetch_calls.load(Ordering::SeqCst);
    assert!(fetches >= 3);
    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(logs.fetch_calls.load(Ordering::SeqCst), fetches);
    assert_eq!(transport.sends_after_close(), 0);
}

#[tokio::test(start_paused = true)]
async fn fetch_error_ends_stream_with_one_error() {
    let builds = ScriptedBuilds::always(build_info(BuildStatus::InProgress, true));
    let logs = ScriptedLogs::new(
        &["run"],
        vec![
            page(vec![event(1, "a")], "f/1"),
            Err(CoreError::collaborator("log storage", "throttled")),
        ],
    );
    let transport = RecordingTransport::new();
    let producer = BuildLogProducer::new(builds, logs.clone(), config());

    let outcome = producer.stream(&build_id(), transport.clone()).await;

    assert_eq!(outcome, StreamOutcome::FetchFailed);
    let errors: Vec<_> = transport
        .records()
        .into_iter()
        .filter(|r| r.level == LogLevel::Error)
        .map(|r| r.message)
        .collect();
    assert_eq!(errors, ["Log fetch error: log storage error: throttled"]);
    assert_eq!(logs.fetch_calls.load(Ordering::SeqCst), 2);
    assert_eq!(transport.close_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn completion_phrase_ends_stream_when_status_is_not_authoritative() {
    let builds = ScriptedBuilds::always(build_info(BuildStatus::InProgress, true));
    let logs = ScriptedLogs::new(
        &["run"],
        vec![page(vec![event(1, "Completed build: repo-1")], "f/1")],
    );
    let transport = RecordingTransport::new();
    let producer = BuildLogProducer::new(
        builds.clone(),
        logs,
        BuildLogStreamConfig {
            status_authoritative: false,
            ..config()
        },
    );

    let outcome = producer.stream(&build_id(), transport.clone()).await;

    assert_eq!(outcome, StreamOutcome::Completed(None));
    assert_eq!(builds.calls.load(Ordering::SeqCst), 1);
    assert_eq!(
        transport.messages().last().map(String::as_str),
        Some("Build repo-1:run finished")
    );
}

#[derive(Debug)]
struct DeployMarker;

impl CompletionPredicate for DeployMarker {
    fn is_complete(&self, message: &str) -> bool {
        message.starts_with("DEPLOYED ")
    }
}

#[tokio::test(start_paused = true)]
async fn custom_completion_predicate_replaces_phrases() {
    let builds = ScriptedBuilds::always(build_info(BuildStatus::InProgress, true));
    let logs = ScriptedLogs::new(
        &["run"],
        vec![
            page(vec![event(1, "Build complete")], "f/1"),
            page(vec![event(2, "DEPLOYED https://app.example.com")], "f/2"),
        ],
    );
    let transport = RecordingTransport::new();
    let producer = BuildLogProducer::new(
        builds,
        logs.clone(),
        BuildLogStreamConfig {
            status_authoritative: false,
            ..config()
        },
    )
    .with_completion(Arc::new(DeployMarker));

    let outcome = producer.stream(&build_id(), transport.clone()).await;

    assert_eq!(outcome, StreamOutcome::Completed(None));
    assert_eq!(
        transport.log_messages(),
        ["Build complete", "DEPLOYED https://app.example.com"]
    );
    assert_eq!(logs.fetch_calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        transport.messages().last().map(String::as_str),
        Some("Build repo-1:run finished")
    );
}

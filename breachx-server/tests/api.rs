use axum::http::StatusCode;
use serde_json::{Value, json};

mod support;

async fn configure_repository(server: &axum_test::TestServer, repository: &str) {
    server
        .put(&format!("/api/repositories/{repository}/config"))
        .json(&json!({
            "repositoryUrl": "https://github.com/acme/storefront.git",
            "buildCommand": "npm run build",
        }))
        .await
        .assert_status_ok();
}

fn event_lines(body: &str) -> Vec<&str> {
    body.lines()
        .filter_map(|line| line.strip_prefix("event:"))
        .map(str::trim)
        .collect()
}

#[tokio::test]
async fn health_reports_backend_store_and_sessions() {
    let server = support::server(support::state());

    let ping = server.get("/ping").await;
    ping.assert_status_ok();

    let health = server.get("/health").await;
    health.assert_status_ok();
    let body: Value = health.json();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["backend"], "simulated");
    assert_eq!(body["store"], "memory");
    assert_eq!(body["scanSessions"], 0);
}

#[tokio::test]
async fn repository_config_is_created_then_partially_updated() {
    let server = support::server(support::state());
    configure_repository(&server, "42").await;

    let updated = server
        .put("/api/repositories/42/config")
        .json(&json!({ "installCommand": "npm ci" }))
        .await;
    updated.assert_status_ok();
    let body: Value = updated.json();
    assert_eq!(body["repositoryId"], "42");
    assert_eq!(body["installCommand"], "npm ci");
    assert_eq!(body["buildCommand"], "npm run build");
    assert_eq!(body["rootDirectory"], "/");

    let read: Value = server.get("/api/repositories/42/config").await.json();
    assert_eq!(read, body);
}

#[tokio::test]
async fn unknown_repository_config_is_not_found() {
    let server = support::server(support::state());
    server
        .get("/api/repositories/missing/config")
        .await
        .assert_status(StatusCode::NOT_FOUND);
    server
        .post("/api/repositories/missing/build")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn starting_a_build_records_last_build() {
    let server = support::server(support::state());
    configure_repository(&server, "42").await;

    let before = server.get("/api/repositories/42/lastbuild").await;
    before.assert_status(StatusCode::NOT_FOUND);
    let error: Value = before.json();
    assert_eq!(
        error["error"]["message"],
        "No builds found for this repository"
    );

    let started = server.post("/api/repositories/42/build").await;
    started.assert_status_ok();
    let build_id = started.json::<Value>()["buildId"]
        .as_str()
        .unwrap()
        .to_string();
    assert!(build_id.starts_with("repo-42:"), "{build_id}");

    let last: Value = server.get("/api/repositories/42/lastbuild").await.json();
    assert_eq!(last["lastBuildId"], build_id.as_str());
    assert_eq!(last["buildStatus"], "BUILDING");
    assert!(last["lastBuildStartTime"].is_string());

    let status = server.get(&format!("/api/builds/{build_id}/status")).await;
    status.assert_status_ok();
    let status: Value = status.json();
    assert_eq!(status["id"], build_id.as_str());
    assert_eq!(status["status"], "IN_PROGRESS");
    assert_eq!(status["logGroupName"], "/aws/codebuild/repo-42");
}

#[tokio::test]
async fn unknown_build_status_is_not_found() {
    let server = support::server(support::state());
    server
        .get("/api/builds/repo-42:nope/status")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn deployment_webhook_validates_and_records() {
    let server = support::server(support::state());
    configure_repository(&server, "42").await;

    let missing = server
        .post("/api/webhooks/deployment")
        .json(&json!({ "repositoryId": "42" }))
        .await;
    missing.assert_status(StatusCode::BAD_REQUEST);
    assert_eq!(
        missing.json::<Value>()["error"]["message"],
        "Missing required fields"
    );

    server
        .post("/api/webhooks/deployment")
        .json(&json!({ "repositoryId": "42", "url": "https://storefront.example.com" }))
        .await
        .assert_status_ok();

    let config: Value = server.get("/api/repositories/42/config").await.json();
    assert_eq!(config["buildStatus"], "DEPLOYED");
    assert_eq!(config["deploymentUrl"], "https://storefront.example.com");
}

#[tokio::test]
async fn scan_start_rejects_bad_targets() {
    let server = support::server(support::state());

    server
        .post("/api/security-scan")
        .json(&json!({ "targetUrl": "" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .post("/api/security-scan")
        .json(&json!({}))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .post("/api/security-scan")
        .json(&json!({ "targetUrl": "ftp://files.example.com" }))
        .await
        .assert_status(StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn started_scan_is_pending_and_polls_as_waiting() {
    let state = support::state();
    let server = support::server(state.clone());

    let started = server
        .post("/api/security-scan")
        .json(&json!({ "targetUrl": "https://storefront.example.com" }))
        .await;
    started.assert_status_ok();
    let started: Value = started.json();
    let scan_id = started["scanId"].as_str().unwrap().to_string();
    assert!(started["taskArn"].as_str().unwrap().contains(":task/"));
    assert_eq!(state.registry().len(), 1);

    let status: Value = server
        .get(&format!("/api/security-scan/{scan_id}/status"))
        .await
        .json();
    assert_eq!(status["taskStatus"], "PENDING");

    let poll = server
        .get("/api/security-scan/logs")
        .add_query_param("scanId", &scan_id)
        .await;
    poll.assert_status_ok();
    let poll: Value = poll.json();
    assert_eq!(poll["status"], "waiting");
    assert_eq!(poll["nextPollDelay"], 3000);
    assert_eq!(poll["logs"], json!([]));
}

#[tokio::test]
async fn scan_poll_failures_carry_the_poll_body() {
    let server = support::server(support::state());

    let missing = server.get("/api/security-scan/logs").await;
    missing.assert_status(StatusCode::BAD_REQUEST);
    let body: Value = missing.json();
    assert_eq!(body["error"], "Scan ID is required");
    assert_eq!(body["shouldRetry"], false);

    let unknown = server
        .get("/api/security-scan/logs")
        .add_query_param("scanId", "6f1c0c2e-5d5b-4d47-9a59-0f4f8f0e3a11")
        .await;
    unknown.assert_status(StatusCode::NOT_FOUND);
    let body: Value = unknown.json();
    assert_eq!(body["error"], "Scan session not found");
    assert_eq!(body["shouldRetry"], false);

    server
        .get("/api/security-scan/6f1c0c2e-5d5b-4d47-9a59-0f4f8f0e3a11/status")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn report_is_not_found_before_any_scan_finishes() {
    let server = support::server(support::state());
    let response = server.get("/api/security-scan/report").await;
    response.assert_status(StatusCode::NOT_FOUND);
    let body: Value = response.json();
    assert_eq!(body, json!({ "error": "No reports found in bucket" }));
}

#[tokio::test]
async fn event_streams_require_an_id() {
    let server = support::server(support::state());
    server
        .get("/api/build-logs")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .get("/api/security-scan/logs/stream")
        .await
        .assert_status(StatusCode::BAD_REQUEST);
    server
        .get("/api/security-scan/logs/stream")
        .add_query_param("scanId", "6f1c0c2e-5d5b-4d47-9a59-0f4f8f0e3a11")
        .await
        .assert_status(StatusCode::NOT_FOUND);
}

#[tokio::test(start_paused = true)]
async fn scan_event_stream_ends_with_completion_summary() {
    let mut config = support::config();
    config.simulation = support::fast_simulation();
    let server = support::server(support::state_with(config));

    let started: Value = server
        .post("/api/security-scan")
        .json(&json!({ "targetUrl": "https://storefront.example.com" }))
        .await
        .json();
    let scan_id = started["scanId"].as_str().unwrap().to_string();

    let response = server
        .get("/api/security-scan/logs/stream")
        .add_query_param("scanId", &scan_id)
        .await;
    response.assert_status_ok();
    let body = response.text();

    assert!(body.contains("Connected to scan logs stream"), "{body}");
    assert!(
        body.contains("Analyzing deployment URL: https://storefront.example.com"),
        "{body}"
    );
    assert!(body.contains("Security scan completed successfully"), "{body}");
    assert_eq!(event_lines(&body), vec!["complete"]);
    assert!(body.contains("Scan completed with status: STOPPED"), "{body}");
    assert!(body.contains(&format!("reports/{scan_id}.html")), "{body}");

    let report: Value = server.get("/api/security-scan/report").await.json();
    assert!(
        report["reportUrl"]
            .as_str()
            .unwrap()
            .contains(&format!("reports/{scan_id}.html"))
    );
}

#[tokio::test(start_paused = true)]
async fn build_event_stream_follows_build_to_completion() {
    let mut config = support::config();
    config.simulation = support::fast_simulation();
    config.streaming.close_delay_ms = 0;
    let server = support::server(support::state_with(config));
    configure_repository(&server, "42").await;

    let build_id = server.post("/api/repositories/42/build").await.json::<Value>()
        ["buildId"]
        .as_str()
        .unwrap()
        .to_string();

    let response = server
        .get("/api/build-logs")
        .add_query_param("buildId", &build_id)
        .await;
    response.assert_status_ok();
    let body = response.text();

    assert!(body.contains("Locating log stream for build"), "{body}");
    assert!(body.contains("Compiled successfully"), "{body}");
    assert!(
        body.contains(&format!("Build {build_id} completed with status: SUCCEEDED")),
        "{body}"
    );
    assert_eq!(body.matches("Compiled successfully").count(), 1);
}

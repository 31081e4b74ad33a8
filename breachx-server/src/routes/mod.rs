use axum::{
    Router,
    routing::{get, post},
};

use crate::{
    AppState,
    handlers::{build_logs, builds, scans},
};

/// Create the API router
pub fn create_api_router() -> Router<AppState> {
    Router::new().nest(
        "/api",
        Router::new()
            .merge(build_routes())
            .merge(scan_routes()),
    )
}

fn build_routes() -> Router<AppState> {
    Router::new()
        .route(
            "/repositories/{id}/build",
            post(builds::start_build_handler),
        )
        .route(
            "/repositories/{id}/config",
            get(builds::get_repository_config_handler)
                .put(builds::put_repository_config_handler),
        )
        .route(
            "/repositories/{id}/lastbuild",
            get(builds::last_build_handler),
        )
        .route("/builds/{id}/status", get(builds::build_status_handler))
        .route("/ws/build-logs", get(build_logs::build_logs_socket_handler))
        .route("/build-logs", get(build_logs::build_logs_sse_handler))
        .route(
            "/webhooks/deployment",
            post(builds::deployment_webhook_handler),
        )
}

fn scan_routes() -> Router<AppState> {
    Router::new()
        .route("/security-scan", post(scans::start_scan_handler))
        .route(
            "/security-scan/{scan_id}/status",
            get(scans::scan_status_handler),
        )
        .route("/security-scan/logs", get(scans::poll_scan_logs_handler))
        .route(
            "/security-scan/logs/stream",
            get(scans::scan_logs_sse_handler),
        )
        .route("/security-scan/report", get(scans::latest_report_handler))
}

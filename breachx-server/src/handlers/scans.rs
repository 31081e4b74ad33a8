use std::{convert::Infallible, sync::Arc};

use axum::{
    extract::{Path, Query, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Json, Response, Sse, sse::Event},
};
use breachx_core::scan::ScanLogPoller;
use breachx_core::streaming::{EventStreamTransport, LogTransport};
use breachx_model::{
    ScanId, ScanLogPollResponse, StartScanRequest, StartScanResponse,
    TaskStatusResponse,
};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::handlers::build_logs::{default_keep_alive, frame_stream};
use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScanLogQuery {
    #[serde(default)]
    pub scan_id: Option<String>,
    #[serde(default)]
    pub next_token: Option<String>,
}

fn parse_scan_id(raw: Option<&str>) -> Result<ScanId, String> {
    match raw.map(str::trim).filter(|raw| !raw.is_empty()) {
        None => Err("Scan ID is required".to_string()),
        Some(raw) => ScanId::parse(raw).map_err(|err| err.to_string()),
    }
}

pub async fn start_scan_handler(
    State(state): State<AppState>,
    body: Result<Json<StartScanRequest>, JsonRejection>,
) -> AppResult<Json<StartScanResponse>> {
    let Json(request) =
        body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let session = state.scans.start_scan(&request.target_url).await?;
    Ok(Json(StartScanResponse {
        scan_id: session.scan_id,
        task_arn: session.task_handle,
    }))
}

pub async fn scan_status_handler(
    State(state): State<AppState>,
    Path(scan_id): Path<String>,
) -> AppResult<Json<TaskStatusResponse>> {
    let scan_id = parse_scan_id(Some(&scan_id)).map_err(AppError::bad_request)?;
    let task_status = state.scans.get_task_status(&scan_id).await?;
    Ok(Json(TaskStatusResponse {
        scan_id,
        task_status,
    }))
}

/// Every outcome carries the poll body; the status code mirrors it.
pub async fn poll_scan_logs_handler(
    State(state): State<AppState>,
    Query(query): Query<ScanLogQuery>,
) -> Response {
    let scan_id = match parse_scan_id(query.scan_id.as_deref()) {
        Ok(scan_id) => scan_id,
        Err(message) => {
            return (
                StatusCode::BAD_REQUEST,
                Json(ScanLogPollResponse::fatal(message)),
            )
                .into_response();
        }
    };

    let next_token = query.next_token.as_deref().filter(|t| !t.is_empty());
    let response = state.scans.poll_logs(&scan_id, next_token).await;
    let status = match &response {
        ScanLogPollResponse::Ready(_) => StatusCode::OK,
        ScanLogPollResponse::Failed(failure) if failure.should_retry => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ScanLogPollResponse::Failed(_) if state.registry().get(&scan_id).is_none() => {
            StatusCode::NOT_FOUND
        }
        ScanLogPollResponse::Failed(_) => StatusCode::BAD_REQUEST,
    };
    (status, Json(response)).into_response()
}

/// Follow a running scan from the server and push its logs as events,
/// ending with a `complete` event.
pub async fn scan_logs_sse_handler(
    State(state): State<AppState>,
    Query(query): Query<ScanLogQuery>,
) -> AppResult<Sse<impl tokio_stream::Stream<Item = Result<Event, Infallible>>>> {
    let scan_id =
        parse_scan_id(query.scan_id.as_deref()).map_err(AppError::bad_request)?;
    if state.registry().get(&scan_id).is_none() {
        return Err(AppError::not_found("Scan session not found"));
    }

    let (transport, rx) = EventStreamTransport::new();
    let guard = transport.closed().drop_guard();
    let mut poller = ScanLogPoller::new(
        state.scan_source.clone(),
        Arc::new(transport),
        state.config().poller.scan,
    );
    poller.attach(scan_id);
    tokio::spawn(async move {
        let finished = poller.run().await;
        debug!(scan_id = %scan_id, ?finished, "scan log stream finished");
    });
    info!(scan_id = %scan_id, "scan log event stream opened");

    Ok(Sse::new(frame_stream(rx, guard)).keep_alive(default_keep_alive()))
}

pub async fn latest_report_handler(
    State(state): State<AppState>,
) -> AppResult<Response> {
    match state.reports.latest_report().await? {
        Some(report) => Ok(Json(report).into_response()),
        None => Ok((
            StatusCode::NOT_FOUND,
            Json(json!({ "error": "No reports found in bucket" })),
        )
            .into_response()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scan_ids_are_required_and_must_be_uuids() {
        assert_eq!(parse_scan_id(None), Err("Scan ID is required".to_string()));
        assert_eq!(parse_scan_id(Some("  ")), Err("Scan ID is required".to_string()));
        assert!(parse_scan_id(Some("not-a-uuid")).is_err());
        let id = ScanId::new();
        assert_eq!(parse_scan_id(Some(&id.to_string())), Ok(id));
    }
}

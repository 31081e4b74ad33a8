use axum::{
    extract::{Path, State, rejection::JsonRejection},
    response::Json,
};
use breachx_model::{
    BuildConfig, BuildId, BuildStatusResponse, DeploymentNotification,
    LastBuildResponse, RepositoryConfigUpdate, RepositoryId,
    StartBuildResponse,
};
use serde_json::{Value, json};
use tracing::info;

use crate::infra::{
    app_state::AppState,
    errors::{AppError, AppResult},
};

fn repository_id(raw: String) -> AppResult<RepositoryId> {
    Ok(RepositoryId::new(raw)?)
}

pub async fn start_build_handler(
    State(state): State<AppState>,
    Path(repository): Path<String>,
) -> AppResult<Json<StartBuildResponse>> {
    let repository = repository_id(repository)?;
    let build_id = state.builds.start_build(&repository).await?;
    info!(repository = %repository, build_id = %build_id, "build started");
    Ok(Json(StartBuildResponse { build_id }))
}

pub async fn get_repository_config_handler(
    State(state): State<AppState>,
    Path(repository): Path<String>,
) -> AppResult<Json<BuildConfig>> {
    let repository = repository_id(repository)?;
    Ok(Json(state.builds.repository_config(&repository).await?))
}

pub async fn put_repository_config_handler(
    State(state): State<AppState>,
    Path(repository): Path<String>,
    body: Result<Json<RepositoryConfigUpdate>, JsonRejection>,
) -> AppResult<Json<BuildConfig>> {
    let repository = repository_id(repository)?;
    let Json(update) =
        body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    Ok(Json(
        state
            .builds
            .save_repository_config(&repository, update)
            .await?,
    ))
}

pub async fn last_build_handler(
    State(state): State<AppState>,
    Path(repository): Path<String>,
) -> AppResult<Json<LastBuildResponse>> {
    let repository = repository_id(repository)?;
    Ok(Json(state.builds.last_build(&repository).await?))
}

pub async fn build_status_handler(
    State(state): State<AppState>,
    Path(build_id): Path<String>,
) -> AppResult<Json<BuildStatusResponse>> {
    let build_id = BuildId::new(build_id)?;
    Ok(Json(state.builds.build_status(&build_id).await?))
}

pub async fn deployment_webhook_handler(
    State(state): State<AppState>,
    body: Result<Json<DeploymentNotification>, JsonRejection>,
) -> AppResult<Json<Value>> {
    let Json(notification) =
        body.map_err(|rejection| AppError::bad_request(rejection.body_text()))?;
    let repository = state.builds.record_deployment(&notification).await?;
    Ok(Json(json!({
        "success": true,
        "repositoryId": repository,
    })))
}

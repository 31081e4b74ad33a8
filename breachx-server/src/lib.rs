//! # BreachX Server
//!
//! Dashboard backend for build and security-scan output.
//!
//! - **Builds**: trigger builds, read their status, and stream their logs
//!   over a WebSocket or server-sent events
//! - **Security scans**: launch scan containers, serve incremental log
//!   polls, and push a server-driven event stream ending in a summary
//! - **Watch CLI**: follow a scan or a build against a running server

pub mod console;
pub mod handlers;
pub mod infra;
pub mod routes;

use axum::{
    Router,
    extract::State,
    http::{HeaderName, HeaderValue, Method, StatusCode},
    response::Json,
    routing::get,
};
use serde_json::{Value, json};
use tower_http::{
    cors::{AllowHeaders, AllowMethods, AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::debug;

pub use infra::app_state::AppState;

pub fn create_app(state: AppState) -> Router {
    let api = routes::create_api_router();

    Router::new()
        .route("/ping", get(ping_handler))
        .route("/health", get(health_handler))
        .merge(api)
        .layer(cors_layer(&state))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

fn cors_layer(state: &AppState) -> CorsLayer {
    let cors = &state.config().cors;
    let allow_origin = if cors.is_wildcard_included() {
        AllowOrigin::any()
    } else {
        let origins: Vec<HeaderValue> = cors
            .allowed_origins
            .iter()
            .filter_map(|s| HeaderValue::from_str(s).ok())
            .collect();
        if origins.is_empty() {
            AllowOrigin::any()
        } else {
            AllowOrigin::list(origins)
        }
    };

    // Methods and headers were validated during config load.
    let methods: Vec<Method> = cors
        .allowed_methods
        .iter()
        .filter_map(|m| Method::from_bytes(m.as_bytes()).ok())
        .collect();
    let headers: Vec<HeaderName> = cors
        .allowed_headers
        .iter()
        .filter_map(|h| HeaderName::from_bytes(h.as_bytes()).ok())
        .collect();

    let mut layer = CorsLayer::new()
        .allow_origin(allow_origin)
        .allow_methods(AllowMethods::list(methods))
        .allow_headers(AllowHeaders::list(headers));

    if cors.allow_credentials && !cors.is_wildcard_included() {
        layer = layer.allow_credentials(true);
    }

    layer
}

async fn ping_handler() -> Result<Json<Value>, StatusCode> {
    debug!("Ping endpoint called");
    Ok(Json(json!({
        "status": "ok",
        "message": "BreachX server is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    })))
}

async fn health_handler(
    State(state): State<AppState>,
) -> Result<Json<Value>, StatusCode> {
    Ok(Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "backend": state.backend_kind().as_str(),
        "store": state.store_kind.as_str(),
        "scanSessions": state.registry().len(),
    })))
}

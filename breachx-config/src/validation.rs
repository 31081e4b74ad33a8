use axum::http::{Method, header::HeaderName};
use thiserror::Error;
use url::Url;

use crate::models::{BackendKind, Config, CorsConfig};

#[derive(Debug, Error)]
pub enum ConfigGuardRailError {
    #[error("gateway backend selected but {reason}")]
    InvalidGateway { reason: String },
    #[error("invalid CORS configuration: {reason}")]
    InvalidCorsConfig { reason: String },
    #[error("backoff cap {max_ms}ms is below the base delay {base_ms}ms")]
    BackoffCapBelowBase { base_ms: u64, max_ms: u64 },
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
}

#[derive(Debug, Clone)]
pub struct ConfigWarning {
    pub message: String,
    pub hint: Option<String>,
}

#[derive(Debug, Default, Clone)]
pub struct ConfigWarnings {
    pub items: Vec<ConfigWarning>,
}

impl ConfigWarnings {
    pub fn push<S: Into<String>>(&mut self, message: S) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: None,
        });
    }

    pub fn push_with_hint<S: Into<String>, H: Into<String>>(
        &mut self,
        message: S,
        hint: H,
    ) {
        self.items.push(ConfigWarning {
            message: message.into(),
            hint: Some(hint.into()),
        });
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn extend(&mut self, other: ConfigWarnings) {
        self.items.extend(other.items);
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConfigWarning> {
        self.items.iter()
    }
}

pub fn apply_guard_rails(
    config: &Config,
) -> Result<ConfigWarnings, ConfigGuardRailError> {
    let mut warnings = ConfigWarnings::default();

    if config.backend.kind == BackendKind::Gateway {
        validate_gateway_url(&config.backend.gateway.base_url)?;
        if config.backend.gateway.token.is_none() {
            warnings.push_with_hint(
                "Gateway backend configured without a bearer token",
                "Set GATEWAY_TOKEN if the execution gateway requires authentication",
            );
        }
    }

    validate_cors(&config.cors)?;

    let backoff = config.poller.scan.backoff;
    if backoff.base_ms == 0 {
        return Err(ConfigGuardRailError::ZeroInterval {
            field: "poller.backoff_base_ms",
        });
    }
    if backoff.max_ms < backoff.base_ms {
        return Err(ConfigGuardRailError::BackoffCapBelowBase {
            base_ms: backoff.base_ms,
            max_ms: backoff.max_ms,
        });
    }

    for (field, value) in [
        ("streaming.poll_interval_ms", config.streaming.poll_interval_ms),
        (
            "streaming.discovery_interval_ms",
            config.streaming.discovery_interval_ms,
        ),
        (
            "poller.build_status_interval_ms",
            config.poller.build_status.interval_ms,
        ),
        (
            "registry.sweep_interval_secs",
            config.registry.sweep_interval_secs,
        ),
    ] {
        if value == 0 {
            return Err(ConfigGuardRailError::ZeroInterval { field });
        }
    }

    if config.streaming.discovery_attempts == 0 {
        warnings.push(
            "streaming.discovery_attempts is 0; build log streams will give up immediately",
        );
    }

    if !config.streaming.status_authoritative
        && config.streaming.completion_phrases.is_empty()
    {
        warnings.push_with_hint(
            "Build status is not authoritative and no completion phrases are set; build log streams only end on disconnect",
            "Add streaming.completion_phrases or set streaming.status_authoritative = true",
        );
    }

    if config.database.url.is_none() {
        warnings.push_with_hint(
            "DATABASE_URL not configured; repository build configs are kept in memory",
            "Set DATABASE_URL to persist build configs across restarts",
        );
    }

    if config.cors.allow_credentials && config.cors.is_wildcard_included() {
        warnings.push(
            "CORS credentials allowed alongside wildcard origin; browsers will reject such configuration",
        );
    }

    Ok(warnings)
}

fn validate_gateway_url(raw: &str) -> Result<(), ConfigGuardRailError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigGuardRailError::InvalidGateway {
            reason: "GATEWAY_URL is empty".into(),
        });
    }
    let url = Url::parse(trimmed).map_err(|err| {
        ConfigGuardRailError::InvalidGateway {
            reason: format!("GATEWAY_URL `{trimmed}` is not a valid URL: {err}"),
        }
    })?;
    match url.scheme() {
        "http" | "https" => Ok(()),
        other => Err(ConfigGuardRailError::InvalidGateway {
            reason: format!("GATEWAY_URL scheme `{other}` is not supported"),
        }),
    }
}

fn validate_cors(cors: &CorsConfig) -> Result<(), ConfigGuardRailError> {
    if cors.allowed_methods.is_empty() {
        return Err(ConfigGuardRailError::InvalidCorsConfig {
            reason:
                "CORS_ALLOWED_METHODS must include at least one HTTP method"
                    .into(),
        });
    }

    for method in &cors.allowed_methods {
        Method::from_bytes(method.as_bytes()).map_err(|_| {
            ConfigGuardRailError::InvalidCorsConfig {
                reason: format!(
                    "invalid HTTP method `{method}` in CORS_ALLOWED_METHODS"
                ),
            }
        })?;
    }

    for header in &cors.allowed_headers {
        HeaderName::from_bytes(header.as_bytes()).map_err(|_| {
            ConfigGuardRailError::InvalidCorsConfig {
                reason: format!(
                    "invalid header name `{header}` in CORS_ALLOWED_HEADERS"
                ),
            }
        })?;
    }

    Ok(())
}

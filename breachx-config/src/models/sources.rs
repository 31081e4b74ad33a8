use std::path::PathBuf;

use breachx_core::build::BuildServiceConfig;
use breachx_core::infra::SimulationConfig;
use breachx_core::reports::ReportConfig;
use breachx_core::streaming::BuildLogStreamConfig;
use serde::{Deserialize, Serialize};

use super::{BackendKind, RegistryConfig, ScanConfig};
use crate::util::{parse_bool_var, parse_csv_var, parse_var, string_var};

/// Raw configuration as defined in a TOML file.
#[derive(Debug, Default, Clone, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub struct FileConfig {
    #[serde(default)]
    pub server: FileServerConfig,
    #[serde(default)]
    pub database: FileDatabaseConfig,
    #[serde(default)]
    pub backend: FileBackendConfig,
    #[serde(default)]
    pub cors: FileCorsConfig,
    #[serde(default)]
    pub poller: FilePollerConfig,
    pub streaming: Option<BuildLogStreamConfig>,
    pub scan: Option<ScanConfig>,
    pub registry: Option<RegistryConfig>,
    pub reports: Option<ReportConfig>,
    pub build: Option<BuildServiceConfig>,
    pub simulation: Option<SimulationConfig>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileServerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port: Option<u16>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileDatabaseConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_connections: Option<u32>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileBackendConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<BackendKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_token: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gateway_timeout_ms: Option<u64>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FileCorsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_origins: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_methods: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_headers: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allow_credentials: Option<bool>,
}

#[derive(Debug, Default, Clone, Deserialize, Serialize)]
pub struct FilePollerConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_base_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backoff_max_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_consecutive_failures: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub build_status_interval_ms: Option<u64>,
}

/// Environment-derived configuration values.
#[derive(Debug, Default, Clone)]
pub struct EnvConfig {
    pub config_path: Option<PathBuf>,
    pub server_host: Option<String>,
    pub server_port: Option<u16>,
    pub database_url: Option<String>,
    pub database_max_connections: Option<u32>,
    pub backend: Option<BackendKind>,
    pub gateway_url: Option<String>,
    pub gateway_token: Option<String>,
    pub cors_allowed_origins: Option<Vec<String>>,
    pub cors_allowed_methods: Option<Vec<String>>,
    pub cors_allowed_headers: Option<Vec<String>>,
    pub cors_allow_credentials: Option<bool>,
    pub build_log_poll_interval_ms: Option<u64>,
    pub build_status_authoritative: Option<bool>,
    pub scan_log_group: Option<String>,
    pub scan_cluster: Option<String>,
    pub scan_max_consecutive_failures: Option<u32>,
    pub session_ttl_secs: Option<u64>,
    pub reports_bucket: Option<String>,
    pub webhook_base_url: Option<String>,
}

impl EnvConfig {
    pub fn gather() -> Self {
        Self {
            config_path: string_var("BREACHX_CONFIG").map(PathBuf::from),
            server_host: string_var("SERVER_HOST"),
            server_port: parse_var("SERVER_PORT"),
            database_url: string_var("DATABASE_URL"),
            database_max_connections: parse_var("DATABASE_MAX_CONNECTIONS"),
            backend: parse_var("BREACHX_BACKEND"),
            gateway_url: string_var("GATEWAY_URL"),
            gateway_token: string_var("GATEWAY_TOKEN"),

            cors_allowed_origins: parse_csv_var("CORS_ALLOWED_ORIGINS"),
            cors_allowed_methods: parse_csv_var("CORS_ALLOWED_METHODS"),
            cors_allowed_headers: parse_csv_var("CORS_ALLOWED_HEADERS"),
            cors_allow_credentials: parse_bool_var("CORS_ALLOW_CREDENTIALS"),

            build_log_poll_interval_ms: parse_var("BUILD_LOG_POLL_INTERVAL_MS"),
            build_status_authoritative: parse_bool_var(
                "BUILD_STATUS_AUTHORITATIVE",
            ),
            scan_log_group: string_var("SCAN_LOG_GROUP"),
            scan_cluster: string_var("SCAN_CLUSTER"),
            scan_max_consecutive_failures: parse_var(
                "SCAN_MAX_CONSECUTIVE_FAILURES",
            ),
            session_ttl_secs: parse_var("SCAN_SESSION_TTL_SECS"),
            reports_bucket: string_var("REPORTS_BUCKET"),
            webhook_base_url: string_var("WEBHOOK_BASE_URL"),
        }
    }
}

pub mod sources;

use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use breachx_core::build::{BuildServiceConfig, BuildStatusPollerConfig};
use breachx_core::infra::{GatewayConfig, SimulationConfig};
use breachx_core::reports::ReportConfig;
use breachx_core::scan::{ScanPollConfig, ScanPollerConfig, ScanTaskConfig};
use breachx_core::streaming::BuildLogStreamConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub backend: BackendConfig,
    pub cors: CorsConfig,
    pub streaming: BuildLogStreamConfig,
    pub scan: ScanConfig,
    pub poller: PollerConfig,
    pub registry: RegistryConfig,
    pub reports: ReportConfig,
    pub build: BuildServiceConfig,
    pub simulation: SimulationConfig,
    pub metadata: ConfigMetadata,
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// Build configs live in memory when unset.
    pub url: Option<String>,
    pub max_connections: u32,
}

/// Which execution services the server talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    /// In-process simulator; no credentials needed.
    #[default]
    Simulated,
    /// REST execution gateway fronting the cloud services.
    Gateway,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BackendKind::Simulated => "simulated",
            BackendKind::Gateway => "gateway",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for BackendKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "simulated" | "simulation" | "sim" => Ok(BackendKind::Simulated),
            "gateway" => Ok(BackendKind::Gateway),
            other => Err(format!("unknown backend '{other}'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub kind: BackendKind,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allowed_methods: Vec<String>,
    pub allowed_headers: Vec<String>,
    pub allow_credentials: bool,
}

impl CorsConfig {
    pub fn is_wildcard_included(&self) -> bool {
        self.allowed_origins
            .iter()
            .any(|origin| origin.trim() == "*")
    }
}

/// Scan container placement plus the poll cadence handed to clients.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    #[serde(flatten)]
    pub task: ScanTaskConfig,
    #[serde(flatten)]
    pub poll: ScanPollConfig,
}

#[derive(Debug, Clone, Default)]
pub struct PollerConfig {
    pub scan: ScanPollerConfig,
    pub build_status: BuildStatusPollerConfig,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Sessions are dropped this long after they started.
    pub session_ttl_secs: u64,
    pub sweep_interval_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            session_ttl_secs: 6 * 60 * 60,
            sweep_interval_secs: 5 * 60,
        }
    }
}

impl RegistryConfig {
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    pub fn sweep_interval(&self) -> Duration {
        Duration::from_secs(self.sweep_interval_secs)
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConfigMetadata {
    pub config_path: Option<PathBuf>,
    pub env_file_loaded: bool,
}

pub fn default_cors_origins() -> Vec<String> {
    vec![
        "http://localhost:3000".to_string(),
        "http://127.0.0.1:3000".to_string(),
    ]
}

pub fn default_cors_methods() -> Vec<String> {
    ["GET", "POST", "OPTIONS"]
        .into_iter()
        .map(String::from)
        .collect()
}

pub fn default_cors_headers() -> Vec<String> {
    ["content-type", "authorization"]
        .into_iter()
        .map(String::from)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_kind_parses_loosely() {
        assert_eq!("Gateway".parse::<BackendKind>(), Ok(BackendKind::Gateway));
        assert_eq!(" sim ".parse::<BackendKind>(), Ok(BackendKind::Simulated));
        assert!("aws".parse::<BackendKind>().is_err());
    }

    #[test]
    fn scan_section_reads_task_and_poll_keys_side_by_side() {
        let scan: ScanConfig = toml::from_str(
            r#"
            cluster = "staging-scanners"
            log_group = "/ecs/scanner-staging"
            running_delay_ms = 1500
            "#,
        )
        .unwrap();

        assert_eq!(scan.task.cluster, "staging-scanners");
        assert_eq!(scan.task.log_group, "/ecs/scanner-staging");
        assert_eq!(scan.task.container, ScanTaskConfig::default().container);
        assert_eq!(scan.poll.running_delay_ms, 1_500);
        assert_eq!(scan.poll.stopping_delay_ms, 1_000);
    }
}

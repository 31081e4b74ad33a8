use std::fs;
use std::path::PathBuf;
use std::sync::LazyLock;

use breachx_core::infra::GatewayConfig;
use thiserror::Error;
use tracing::debug;

use crate::models::sources::{EnvConfig, FileConfig};
use crate::models::{
    BackendConfig, Config, ConfigMetadata, CorsConfig, DatabaseConfig,
    PollerConfig, ServerConfig, default_cors_headers, default_cors_methods,
    default_cors_origins,
};
use crate::validation::{self, ConfigGuardRailError, ConfigWarnings};

static DEFAULT_CONFIG_LOCATIONS: LazyLock<Vec<PathBuf>> = LazyLock::new(|| {
    vec![
        PathBuf::from("breachx.toml"),
        PathBuf::from("config/breachx.toml"),
    ]
});

#[derive(Debug, Default, Clone)]
pub struct ConfigLoaderOptions {
    pub config_path: Option<PathBuf>,
    pub env_file: Option<PathBuf>,
}

/// Loaded configuration plus the non-fatal findings collected on the way.
#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub warnings: ConfigWarnings,
}

#[derive(Debug, Default)]
pub struct ConfigLoader {
    options: ConfigLoaderOptions,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ConfigLoaderOptions) -> Self {
        Self { options }
    }

    pub fn with_config_path<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.config_path = Some(path.into());
        self
    }

    pub fn with_env_file<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.options.env_file = Some(path.into());
        self
    }

    /// Read `.env`, the process environment and the TOML file.
    pub fn load(&self) -> Result<ConfigLoad, ConfigLoadError> {
        let env_file_loaded = match &self.options.env_file {
            Some(path) => dotenvy::from_path(path).map(|_| true).or_else(
                |err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                },
            )?,
            None => {
                dotenvy::dotenv().map(|_| true).or_else(|err| match err {
                    dotenvy::Error::Io(_) => Ok(false),
                    _ => Err(err),
                })?
            }
        };

        let mut load = self.load_with_env(EnvConfig::gather())?;
        load.config.metadata.env_file_loaded = env_file_loaded;
        Ok(load)
    }

    /// Compose from an already gathered environment; `.env` is not read.
    pub fn load_with_env(
        &self,
        env: EnvConfig,
    ) -> Result<ConfigLoad, ConfigLoadError> {
        let (file_config, config_path) = self.load_file_config(&env)?;
        let mut warnings = ConfigWarnings::default();
        if config_path.is_none() {
            warnings.push_with_hint(
                "No breachx.toml detected; using environment variables and defaults",
                "Create breachx.toml or point BREACHX_CONFIG at a configuration file",
            );
        }

        let config = compose_config(file_config.unwrap_or_default(), env, config_path);
        warnings.extend(validation::apply_guard_rails(&config)?);
        Ok(ConfigLoad { config, warnings })
    }

    fn load_file_config(
        &self,
        env: &EnvConfig,
    ) -> Result<(Option<FileConfig>, Option<PathBuf>), ConfigLoadError> {
        let (path, explicit) = match (&self.options.config_path, &env.config_path)
        {
            (Some(path), _) | (None, Some(path)) => (path.clone(), true),
            (None, None) => match DEFAULT_CONFIG_LOCATIONS
                .iter()
                .find(|candidate| candidate.exists())
            {
                Some(found) => (found.clone(), false),
                None => return Ok((None, None)),
            },
        };

        if !path.exists() {
            if explicit {
                return Err(ConfigLoadError::MissingConfig { path });
            }
            return Ok((None, None));
        }

        let contents =
            fs::read_to_string(&path).map_err(|source| ConfigLoadError::Io {
                path: path.clone(),
                source,
            })?;
        let file_config: FileConfig =
            toml::from_str(&contents).map_err(|source| ConfigLoadError::Parse {
                path: path.clone(),
                source,
            })?;
        debug!(path = %path.display(), "configuration file loaded");

        Ok((Some(file_config), Some(path)))
    }
}

fn compose_config(
    file: FileConfig,
    env: EnvConfig,
    config_path: Option<PathBuf>,
) -> Config {
    let FileConfig {
        server: file_server,
        database: file_database,
        backend: file_backend,
        cors: file_cors,
        poller: file_poller,
        streaming: file_streaming,
        scan: file_scan,
        registry: file_registry,
        reports: file_reports,
        build: file_build,
        simulation: file_simulation,
    } = file;

    let server = ServerConfig {
        host: env
            .server_host
            .or(file_server.host)
            .unwrap_or_else(|| "0.0.0.0".to_string()),
        port: env.server_port.or(file_server.port).unwrap_or(3000),
    };

    let database = DatabaseConfig {
        url: env
            .database_url
            .or(file_database.url)
            .filter(|url| !url.trim().is_empty()),
        max_connections: env
            .database_max_connections
            .or(file_database.max_connections)
            .unwrap_or(5),
    };

    let gateway_defaults = GatewayConfig::default();
    let backend = BackendConfig {
        kind: env.backend.or(file_backend.kind).unwrap_or_default(),
        gateway: GatewayConfig {
            base_url: env
                .gateway_url
                .or(file_backend.gateway_url)
                .unwrap_or(gateway_defaults.base_url),
            token: env.gateway_token.or(file_backend.gateway_token),
            timeout_ms: file_backend
                .gateway_timeout_ms
                .unwrap_or(gateway_defaults.timeout_ms),
        },
    };

    let cors = CorsConfig {
        allowed_origins: env
            .cors_allowed_origins
            .or(file_cors.allowed_origins)
            .unwrap_or_else(default_cors_origins),
        allowed_methods: env
            .cors_allowed_methods
            .or(file_cors.allowed_methods)
            .unwrap_or_else(default_cors_methods),
        allowed_headers: env
            .cors_allowed_headers
            .or(file_cors.allowed_headers)
            .unwrap_or_else(default_cors_headers),
        allow_credentials: env
            .cors_allow_credentials
            .or(file_cors.allow_credentials)
            .unwrap_or(false),
    };

    let mut streaming = file_streaming.unwrap_or_default();
    if let Some(interval) = env.build_log_poll_interval_ms {
        streaming.poll_interval_ms = interval;
    }
    if let Some(authoritative) = env.build_status_authoritative {
        streaming.status_authoritative = authoritative;
    }

    let mut scan = file_scan.unwrap_or_default();
    if let Some(group) = env.scan_log_group {
        scan.task.log_group = group;
    }
    if let Some(cluster) = env.scan_cluster {
        scan.task.cluster = cluster;
    }

    let mut poller = PollerConfig::default();
    let scan_poller = &mut poller.scan;
    if let Some(base) = file_poller.backoff_base_ms {
        scan_poller.backoff.base_ms = base;
    }
    if let Some(max) = file_poller.backoff_max_ms {
        scan_poller.backoff.max_ms = max;
    }
    scan_poller.max_consecutive_failures = env
        .scan_max_consecutive_failures
        .or(file_poller.max_consecutive_failures);
    if let Some(interval) = file_poller.build_status_interval_ms {
        poller.build_status.interval_ms = interval;
    }

    let mut registry = file_registry.unwrap_or_default();
    if let Some(ttl) = env.session_ttl_secs {
        registry.session_ttl_secs = ttl;
    }

    let mut reports = file_reports.unwrap_or_default();
    if let Some(bucket) = env.reports_bucket {
        reports.bucket = bucket;
    }

    let mut build = file_build.unwrap_or_default();
    if let Some(base) = env.webhook_base_url {
        build.webhook_base_url = base;
    }

    Config {
        server,
        database,
        backend,
        cors,
        streaming,
        scan,
        poller,
        registry,
        reports,
        build,
        simulation: file_simulation.unwrap_or_default(),
        metadata: ConfigMetadata {
            config_path,
            env_file_loaded: false,
        },
    }
}

#[derive(Debug, Error)]
pub enum ConfigLoadError {
    #[error("configuration file missing: {path}")]
    MissingConfig { path: PathBuf },
    #[error("failed to read configuration {path}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse configuration {path}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error(transparent)]
    GuardRail(#[from] ConfigGuardRailError),
    #[error(transparent)]
    EnvFile(#[from] dotenvy::Error),
}

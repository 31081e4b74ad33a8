//! # BreachX Server
//!
//! Serves the dashboard API and, through `watch`, follows scans and builds
//! on a running server from the terminal.

use std::{net::SocketAddr, sync::Arc};

use anyhow::{Context, bail};
use breachx_config::{Config, ConfigLoad, ConfigLoader};
use breachx_core::build::{BuildStatusPoller, BuildStatusPollerConfig};
use breachx_core::client::DashboardClient;
use breachx_core::infra::PostgresBuildConfigStore;
use breachx_core::scan::{BackoffPolicy, ScanLogPoller, ScanPollerConfig};
use breachx_core::streaming::LogTransport;
use breachx_model::{BuildId, RepositoryId};
use breachx_server::{
    console::{self, ConsoleTransport},
    create_app,
    infra::{
        startup::{ProdStartupHooks, StartupHooks},
        wiring,
    },
};
use clap::{Args as ClapArgs, Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// CLI entry point
#[derive(Parser, Debug)]
#[command(name = "breachx-server")]
#[command(about = "Build log streaming and security scan orchestration server")]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    #[command(flatten)]
    serve: ServeArgs,
}

#[derive(ClapArgs, Debug, Clone)]
struct ServeArgs {
    /// Server port (overrides config)
    #[arg(short, long, env = "SERVER_PORT")]
    port: Option<u16>,

    /// Server host (overrides config)
    #[arg(long, env = "SERVER_HOST")]
    host: Option<String>,
}

#[derive(Debug, Subcommand)]
enum Command {
    #[command(subcommand)]
    Db(DbCommand),
    /// Follow a scan or build on a running server
    #[command(subcommand)]
    Watch(WatchCommand),
}

#[derive(Debug, Subcommand)]
enum DbCommand {
    /// Apply database migrations and exit
    Migrate,
}

#[derive(Debug, Subcommand)]
enum WatchCommand {
    /// Start a security scan and print its logs until it completes
    Scan(WatchScanArgs),
    /// Poll a build's status and refresh the repository once it finishes
    Build(WatchBuildArgs),
}

#[derive(ClapArgs, Debug)]
struct WatchScanArgs {
    /// Base URL of the dashboard server
    #[arg(long, env = "BREACHX_SERVER", default_value = "http://localhost:3000")]
    server: String,

    /// Deployment URL to scan
    #[arg(long)]
    target: String,

    /// Stop after this many failed polls in a row (retries forever if unset)
    #[arg(long)]
    max_failures: Option<u32>,

    /// First retry delay in milliseconds
    #[arg(long, default_value_t = 2_000)]
    backoff_base_ms: u64,

    /// Retry delay ceiling in milliseconds
    #[arg(long, default_value_t = 30_000)]
    backoff_max_ms: u64,
}

#[derive(ClapArgs, Debug)]
struct WatchBuildArgs {
    /// Base URL of the dashboard server
    #[arg(long, env = "BREACHX_SERVER", default_value = "http://localhost:3000")]
    server: String,

    #[arg(long)]
    build_id: String,

    #[arg(long)]
    repository: String,

    /// Poll interval in milliseconds
    #[arg(long, default_value_t = 10_000)]
    interval_ms: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Some(Command::Db(DbCommand::Migrate)) => run_db_migrate(&cli.serve).await,
        Some(Command::Watch(WatchCommand::Scan(args))) => {
            init_tracing("warn,breachx_core=warn");
            watch_scan(args).await
        }
        Some(Command::Watch(WatchCommand::Build(args))) => {
            init_tracing("warn,breachx_core=warn");
            watch_build(args).await
        }
        None => run_server(cli.serve).await,
    }
}

fn init_tracing(default_filter: &str) {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}

fn load_runtime_config(args: &ServeArgs) -> anyhow::Result<Config> {
    let ConfigLoad {
        mut config,
        warnings,
    } = ConfigLoader::new()
        .load()
        .context("failed to load configuration")?;

    if let Some(port) = args.port {
        config.server.port = port;
    }
    if let Some(host) = args.host.clone() {
        config.server.host = host;
    }

    // Quieter defaults; override via RUST_LOG.
    init_tracing("info,breachx_core=info,tower_http=warn");

    if config.metadata.env_file_loaded {
        info!("loaded .env file");
    }
    if let Some(path) = config.metadata.config_path.as_ref() {
        info!(path = %path.display(), "configuration file loaded");
    }

    for warning in warnings.iter() {
        match &warning.hint {
            Some(hint) => {
                warn!(message = %warning.message, hint = %hint, "configuration warning")
            }
            None => {
                warn!(message = %warning.message, "configuration warning")
            }
        }
    }

    info!(
        backend = %config.backend.kind,
        streaming.poll_interval_ms = config.streaming.poll_interval_ms,
        streaming.status_authoritative = config.streaming.status_authoritative,
        registry.session_ttl_secs = config.registry.session_ttl_secs,
        scan.max_consecutive_failures = ?config.poller.scan.max_consecutive_failures,
        "configuration in effect"
    );

    Ok(config)
}

async fn run_db_migrate(args: &ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(args)?;
    let Some(url) = config.database.url.as_deref() else {
        bail!("DATABASE_URL is required to run migrations");
    };
    let store =
        PostgresBuildConfigStore::connect(url, config.database.max_connections)
            .await
            .context("failed to connect to PostgreSQL for migration")?;
    store
        .initialize_schema()
        .await
        .context("database migration failed")?;
    info!("Database migrations applied successfully");
    Ok(())
}

async fn run_server(args: ServeArgs) -> anyhow::Result<()> {
    let config = load_runtime_config(&args)?;
    let bind_address = config.server.bind_address();

    let state = wiring::build_state(config).await?;
    let shutdown = CancellationToken::new();
    ProdStartupHooks
        .run(&state, shutdown.clone())
        .await
        .context("startup hooks failed")?;

    let router = create_app(state);
    let listener = tokio::net::TcpListener::bind(&bind_address)
        .await
        .with_context(|| format!("failed to bind {bind_address}"))?;
    info!("BreachX server listening on http://{bind_address}");

    let signal = shutdown.clone();
    axum::serve(
        listener,
        router.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("shutdown requested");
        }
        signal.cancel();
    })
    .await
    .context("server error")?;

    shutdown.cancel();
    Ok(())
}

fn cancel_on_ctrl_c(token: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            token.cancel();
        }
    });
}

async fn watch_scan(args: WatchScanArgs) -> anyhow::Result<()> {
    let client = Arc::new(DashboardClient::new(&args.server)?);
    let transport = Arc::new(ConsoleTransport::new());
    let config = ScanPollerConfig {
        backoff: BackoffPolicy {
            base_ms: args.backoff_base_ms,
            max_ms: args.backoff_max_ms,
        },
        max_consecutive_failures: args.max_failures,
        ..ScanPollerConfig::default()
    };

    let mut poller = ScanLogPoller::new(client, transport.clone(), config);
    let scan_id = poller
        .start(&args.target)
        .await
        .context("failed to start security scan")?;
    println!("Scan {scan_id} started against {}", args.target);

    cancel_on_ctrl_c(transport.closed());
    let state = poller.run().await;
    info!(?state, "scan watch finished");
    Ok(())
}

async fn watch_build(args: WatchBuildArgs) -> anyhow::Result<()> {
    let client = Arc::new(DashboardClient::new(&args.server)?);
    let build_id = BuildId::new(args.build_id)?;
    let repository = RepositoryId::new(args.repository)?;
    let poller = BuildStatusPoller::new(
        client.clone(),
        client,
        BuildStatusPollerConfig {
            interval_ms: args.interval_ms,
            stop_on_terminal: true,
        },
    );

    let cancel = CancellationToken::new();
    cancel_on_ctrl_c(cancel.clone());
    let last = poller
        .run(&build_id, &repository, cancel, |event| {
            println!("{}", console::render_build_event(&event));
        })
        .await;

    match last {
        Some(status) => println!("Build {build_id} last seen as {status}"),
        None => println!("Build {build_id} was never observed"),
    }
    Ok(())
}

//! Chooses collaborators and the build-config store from configuration.

use std::sync::Arc;

use anyhow::Context;
use breachx_config::{BackendKind, Config};
use breachx_core::infra::{
    GatewayClient, InMemoryBuildConfigStore, PostgresBuildConfigStore,
    SimulatedCloud,
};
use breachx_core::ports::BuildConfigStore;
use tracing::{info, warn};

use crate::infra::app_state::{AppState, Collaborators, StoreKind};

impl Collaborators {
    /// Every port served by one in-process simulator.
    pub fn simulated(config: &Config) -> Self {
        let cloud = Arc::new(SimulatedCloud::new(
            config.simulation.clone(),
            config.scan.task.clone(),
        ));
        Self {
            builds: cloud.clone(),
            logs: cloud.clone(),
            tasks: cloud.clone(),
            reports: cloud,
        }
    }

    pub fn gateway(config: &Config) -> anyhow::Result<Self> {
        let client = Arc::new(
            GatewayClient::new(&config.backend.gateway)
                .context("failed to create execution gateway client")?,
        );
        Ok(Self {
            builds: client.clone(),
            logs: client.clone(),
            tasks: client.clone(),
            reports: client,
        })
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        match config.backend.kind {
            BackendKind::Simulated => {
                info!("using simulated execution backend");
                Ok(Self::simulated(config))
            }
            BackendKind::Gateway => {
                info!(url = %config.backend.gateway.base_url, "using execution gateway");
                Self::gateway(config)
            }
        }
    }
}

/// Postgres when `DATABASE_URL` is set, otherwise an in-memory store.
pub async fn open_store(
    config: &Config,
) -> anyhow::Result<(Arc<dyn BuildConfigStore>, StoreKind)> {
    let Some(url) = config.database.url.as_deref() else {
        warn!("no database configured; repository settings are kept in memory");
        return Ok((Arc::new(InMemoryBuildConfigStore::new()), StoreKind::Memory));
    };

    let store =
        PostgresBuildConfigStore::connect(url, config.database.max_connections)
            .await
            .context("failed to connect to PostgreSQL")?;
    store
        .initialize_schema()
        .await
        .context("database migration failed")?;
    Ok((Arc::new(store), StoreKind::Postgres))
}

pub async fn build_state(config: Config) -> anyhow::Result<AppState> {
    let collaborators = Collaborators::from_config(&config)?;
    let (store, store_kind) = open_store(&config).await?;
    Ok(AppState::new(Arc::new(config), collaborators, store, store_kind))
}

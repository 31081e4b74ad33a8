#![allow(dead_code)]

use std::sync::Arc;

use axum_test::TestServer;
use breachx_config::{Config, ConfigLoad, ConfigLoader, models::sources::EnvConfig};
use breachx_core::infra::{InMemoryBuildConfigStore, SimulationConfig};
use breachx_server::{
    AppState, create_app,
    infra::app_state::{Collaborators, StoreKind},
};

/// Defaults only: no config file, no environment.
pub fn config() -> Config {
    let ConfigLoad { config, .. } = ConfigLoader::new()
        .load_with_env(EnvConfig::default())
        .expect("default configuration loads");
    config
}

/// Short simulated timelines so paused-clock tests finish quickly.
pub fn fast_simulation() -> SimulationConfig {
    SimulationConfig {
        task_pending_ms: 1_000,
        build_stream_delay_ms: 500,
        line_interval_ms: 100,
        stop_delay_ms: 100,
    }
}

pub fn state_with(config: Config) -> AppState {
    let collaborators = Collaborators::simulated(&config);
    AppState::new(
        Arc::new(config),
        collaborators,
        Arc::new(InMemoryBuildConfigStore::new()),
        StoreKind::Memory,
    )
}

pub fn state() -> AppState {
    state_with(config())
}

pub fn server(state: AppState) -> TestServer {
    TestServer::new(create_app(state)).expect("test server starts")
}

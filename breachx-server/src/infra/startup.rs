use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use breachx_core::scan::ScanSessionRegistry;
use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::infra::app_state::AppState;

#[async_trait]
pub trait StartupHooks: Send + Sync {
    async fn run(&self, state: &AppState, shutdown: CancellationToken) -> Result<()>;
}

#[derive(Debug, Default)]
pub struct ProdStartupHooks;

#[async_trait]
impl StartupHooks for ProdStartupHooks {
    async fn run(&self, state: &AppState, shutdown: CancellationToken) -> Result<()> {
        let registry = state.config().registry;
        info!(
            ttl_secs = registry.session_ttl_secs,
            sweep_secs = registry.sweep_interval_secs,
            "starting scan session sweeper"
        );
        spawn_registry_sweeper(
            Arc::clone(state.registry()),
            registry.sweep_interval(),
            shutdown,
        );
        Ok(())
    }
}

/// Evict expired scan sessions every `every` until `shutdown` fires.
pub fn spawn_registry_sweeper(
    registry: Arc<ScanSessionRegistry>,
    every: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    debug!("scan session sweeper stopped");
                    break;
                }
                _ = interval.tick() => {
                    registry.evict_expired(Utc::now());
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use breachx_model::{ScanId, ScanSession, TaskHandle};

    #[tokio::test(start_paused = true)]
    async fn sweeper_evicts_expired_sessions_until_shutdown() {
        let registry = Arc::new(ScanSessionRegistry::new(Duration::ZERO));
        registry.create(ScanSession::running(
            ScanId::new(),
            TaskHandle::new("arn:task/cluster/abc"),
            "https://example.com",
        ));

        let shutdown = CancellationToken::new();
        let handle = spawn_registry_sweeper(
            Arc::clone(&registry),
            Duration::from_secs(60),
            shutdown.clone(),
        );

        tokio::time::sleep(Duration::from_secs(61)).await;
        assert!(registry.is_empty());

        shutdown.cancel();
        handle.await.unwrap();
    }
}

use std::collections::HashMap;

use async_trait::async_trait;
use breachx_model::{BuildConfig, BuildId, RepositoryBuildStatus, RepositoryId};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;

use crate::error::{CoreError, Result};
use crate::ports::BuildConfigStore;

/// Process-local build-config store, used when no database is configured.
#[derive(Debug, Default)]
pub struct InMemoryBuildConfigStore {
    records: RwLock<HashMap<RepositoryId, BuildConfig>>,
}

impl InMemoryBuildConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_configs(configs: impl IntoIterator<Item = BuildConfig>) -> Self {
        let records = configs
            .into_iter()
            .map(|config| (config.repository_id.clone(), config))
            .collect();
        Self {
            records: RwLock::new(records),
        }
    }

    fn update<F>(&self, repository: &RepositoryId, apply: F) -> Result<()>
    where
        F: FnOnce(&mut BuildConfig),
    {
        let mut records = self.records.write();
        let record = records.get_mut(repository).ok_or_else(|| {
            CoreError::NotFound(format!("repository {repository}"))
        })?;
        apply(record);
        Ok(())
    }
}

#[async_trait]
impl BuildConfigStore for InMemoryBuildConfigStore {
    async fn get(
        &self,
        repository: &RepositoryId,
    ) -> Result<Option<BuildConfig>> {
        Ok(self.records.read().get(repository).cloned())
    }

    async fn upsert(&self, config: &BuildConfig) -> Result<()> {
        self.records
            .write()
            .insert(config.repository_id.clone(), config.clone());
        Ok(())
    }

    async fn record_build_started(
        &self,
        repository: &RepositoryId,
        build_id: &BuildId,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        self.update(repository, |record| {
            record.build_status = Some(RepositoryBuildStatus::Building);
            record.last_build_id = Some(build_id.clone());
            record.last_build_start_time = Some(started_at);
            record.last_build_error_message = None;
        })
    }

    async fn record_build_failed(
        &self,
        repository: &RepositoryId,
        message: &str,
    ) -> Result<()> {
        self.update(repository, |record| {
            record.build_status = Some(RepositoryBuildStatus::Failed);
            record.last_build_error_message = Some(message.to_string());
        })
    }

    async fn record_deployment(
        &self,
        repository: &RepositoryId,
        url: &str,
    ) -> Result<()> {
        self.update(repository, |record| {
            record.build_status = Some(RepositoryBuildStatus::Deployed);
            record.deployment_url = Some(url.to_string());
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn bookkeeping_updates_existing_records_only() {
        let repo = RepositoryId::new("1").unwrap();
        let store =
            InMemoryBuildConfigStore::with_configs([BuildConfig::empty(repo.clone())]);

        let build = BuildId::new("repo-1:abc").unwrap();
        store
            .record_build_started(&repo, &build, Utc::now())
            .await
            .unwrap();
        store
            .record_deployment(&repo, "https://app.example.com")
            .await
            .unwrap();

        let record = store.get(&repo).await.unwrap().unwrap();
        assert_eq!(record.build_status, Some(RepositoryBuildStatus::Deployed));
        assert_eq!(record.last_build_id, Some(build));
        assert_eq!(
            record.deployment_url.as_deref(),
            Some("https://app.example.com")
        );

        let missing = RepositoryId::new("2").unwrap();
        assert!(matches!(
            store.record_build_failed(&missing, "boom").await,
            Err(CoreError::NotFound(_))
        ));
    }
}

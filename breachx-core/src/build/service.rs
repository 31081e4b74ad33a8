//! Build triggering and the build bookkeeping around it.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use breachx_model::{
    BuildConfig, BuildId, BuildStatusResponse, DeploymentNotification,
    EnvironmentVariable, LastBuildResponse, RepositoryConfigUpdate,
    RepositoryId,
};
use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::build::buildspec;
use crate::build::status_poller::{BuildStatusSource, RepositoryRefresher};
use crate::error::{CoreError, Result};
use crate::ports::{BuildConfigStore, BuildExecutor, BuildRequest, ProjectSpec};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildServiceConfig {
    /// Projects are named `<project_prefix><repository id>`.
    pub project_prefix: String,
    /// Public base URL of the dashboard, used for the deployment webhook.
    pub webhook_base_url: String,
    pub image: String,
    pub nodejs_version: String,
    pub log_group_prefix: String,
}

impl Default for BuildServiceConfig {
    fn default() -> Self {
        Self {
            project_prefix: "repo-".into(),
            webhook_base_url: "http://localhost:3000".into(),
            image: "aws/codebuild/standard:6.0".into(),
            nodejs_version: "16".into(),
            log_group_prefix: "/aws/codebuild/".into(),
        }
    }
}

impl BuildServiceConfig {
    pub fn webhook_url(&self) -> String {
        format!(
            "{}/api/webhooks/deployment",
            self.webhook_base_url.trim_end_matches('/')
        )
    }
}

pub struct BuildService {
    executor: Arc<dyn BuildExecutor>,
    store: Arc<dyn BuildConfigStore>,
    config: BuildServiceConfig,
}

impl fmt::Debug for BuildService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuildService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl BuildService {
    pub fn new(
        executor: Arc<dyn BuildExecutor>,
        store: Arc<dyn BuildConfigStore>,
        config: BuildServiceConfig,
    ) -> Self {
        Self {
            executor,
            store,
            config,
        }
    }

    pub fn project_name(&self, repository: &RepositoryId) -> String {
        format!("{}{}", self.config.project_prefix, repository)
    }

    pub async fn repository_config(
        &self,
        repository: &RepositoryId,
    ) -> Result<BuildConfig> {
        self.store.get(repository).await?.ok_or_else(|| {
            CoreError::NotFound(format!("repository {repository}"))
        })
    }

    /// Create or update the stored settings; build bookkeeping is kept.
    pub async fn save_repository_config(
        &self,
        repository: &RepositoryId,
        update: RepositoryConfigUpdate,
    ) -> Result<BuildConfig> {
        let mut config = self
            .store
            .get(repository)
            .await?
            .unwrap_or_else(|| BuildConfig::empty(repository.clone()));
        update.apply(&mut config);
        self.store.upsert(&config).await?;
        info!(repository = %repository, "repository config saved");
        Ok(config)
    }

    pub async fn last_build(
        &self,
        repository: &RepositoryId,
    ) -> Result<LastBuildResponse> {
        let config = self.repository_config(repository).await?;
        LastBuildResponse::from_config(&config).ok_or_else(|| {
            CoreError::NotFound("No builds found for this repository".into())
        })
    }

    /// Start a build for `repository` and record it as the latest build.
    ///
    /// A failed launch is recorded against the repository before the error
    /// is returned.
    pub async fn start_build(&self, repository: &RepositoryId) -> Result<BuildId> {
        let config = self.repository_config(repository).await?;
        info!(repository = %repository, "triggering build");

        match self.launch(&config).await {
            Ok(build_id) => {
                self.store
                    .record_build_started(repository, &build_id, Utc::now())
                    .await?;
                info!(repository = %repository, build_id = %build_id, "build started");
                Ok(build_id)
            }
            Err(err) => {
                error!(repository = %repository, "error starting build: {err}");
                if let Err(store_err) = self
                    .store
                    .record_build_failed(repository, &err.to_string())
                    .await
                {
                    warn!(
                        repository = %repository,
                        "failed to record build failure: {store_err}"
                    );
                }
                Err(err)
            }
        }
    }

    async fn launch(&self, config: &BuildConfig) -> Result<BuildId> {
        let project = self.project_name(&config.repository_id);
        let spec = buildspec::render(config, &self.config.nodejs_version);

        if !self.executor.project_exists(&project).await? {
            info!(project = %project, "build project missing, creating");
            self.executor
                .create_project(&ProjectSpec {
                    name: project.clone(),
                    description: format!(
                        "Build project for repository {}",
                        config.repository_id
                    ),
                    source_location: config.repository_url.clone(),
                    buildspec: spec.clone(),
                    image: self.config.image.clone(),
                    privileged: config.has_docker,
                    environment: config.environment_variables.clone(),
                    log_group: format!("{}{project}", self.config.log_group_prefix),
                })
                .await?;
            if !self.executor.project_exists(&project).await? {
                return Err(CoreError::LaunchRejected(format!(
                    "project {project} missing after creation"
                )));
            }
        }

        let request = BuildRequest {
            project,
            buildspec_override: spec,
            environment_overrides: vec![
                env("WEBHOOK_URL", self.config.webhook_url()),
                env("DEBUG", "true"),
                env(
                    "BUILD_TIMESTAMP",
                    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true),
                ),
            ],
        };
        self.executor.start_build(&request).await
    }

    pub async fn build_status(
        &self,
        build_id: &BuildId,
    ) -> Result<BuildStatusResponse> {
        let info = self.executor.get_build(build_id).await?;
        Ok(BuildStatusResponse::from(info))
    }

    /// Apply the pipeline's deployment callback.
    pub async fn record_deployment(
        &self,
        notification: &DeploymentNotification,
    ) -> Result<RepositoryId> {
        let (Some(repository), Some(url)) = (
            notification.repository_id.as_deref().filter(|s| !s.trim().is_empty()),
            notification.url.as_deref().filter(|s| !s.trim().is_empty()),
        ) else {
            return Err(CoreError::InvalidInput("Missing required fields".into()));
        };
        let repository = RepositoryId::new(repository)
            .map_err(|err| CoreError::InvalidInput(err.to_string()))?;

        self.store.record_deployment(&repository, url).await?;
        info!(repository = %repository, url = %url, "deployment recorded");
        Ok(repository)
    }
}

fn env(key: &str, value: impl Into<String>) -> EnvironmentVariable {
    EnvironmentVariable {
        key: key.to_string(),
        value: value.into(),
    }
}

#[async_trait]
impl BuildStatusSource for BuildService {
    async fn build_status(
        &self,
        build_id: &BuildId,
    ) -> Result<BuildStatusResponse> {
        BuildService::build_status(self, build_id).await
    }
}

#[async_trait]
impl RepositoryRefresher for BuildService {
    async fn refresh(&self, repository: &RepositoryId) -> Result<BuildConfig> {
        self.repository_config(repository).await
    }
}

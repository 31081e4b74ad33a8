use async_trait::async_trait;
use breachx_model::{
    BuildConfig, BuildId, EnvironmentVariable, RepositoryBuildStatus,
    RepositoryId,
};
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::types::Json;
use sqlx::Row;
use tracing::{info, warn};

use crate::error::{CoreError, Result};
use crate::ports::BuildConfigStore;

const SELECT_CONFIG: &str = r#"
    SELECT repository_id, repository_url, has_docker, root_directory,
           install_command, build_command, run_command, environment_variables,
           build_status, last_build_id, last_build_start_time,
           last_build_error_message, deployment_url
    FROM repository_configs
    WHERE repository_id = $1
"#;

/// Build-config store backed by the `repository_configs` table.
#[derive(Debug, Clone)]
pub struct PostgresBuildConfigStore {
    pool: PgPool,
}

impl PostgresBuildConfigStore {
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await?;
        info!(max_connections, "connected to PostgreSQL");
        Ok(Self { pool })
    }

    pub async fn initialize_schema(&self) -> Result<()> {
        crate::MIGRATOR.run(&self.pool).await.map_err(|e| {
            CoreError::Internal(format!("Migration failed: {}", e))
        })
    }

    fn row_to_config(row: &PgRow) -> Result<BuildConfig> {
        let repository_id: String = row.try_get("repository_id")?;
        let build_status: Option<String> = row.try_get("build_status")?;
        let last_build_id: Option<String> = row.try_get("last_build_id")?;
        let Json(environment_variables): Json<Vec<EnvironmentVariable>> =
            row.try_get("environment_variables")?;

        let build_status = build_status.and_then(|raw| {
            let parsed = RepositoryBuildStatus::parse(&raw);
            if parsed.is_none() {
                warn!(repository = %repository_id, status = %raw, "ignoring unknown build status");
            }
            parsed
        });

        Ok(BuildConfig {
            repository_id: RepositoryId(repository_id),
            repository_url: row.try_get("repository_url")?,
            has_docker: row.try_get("has_docker")?,
            root_directory: row.try_get("root_directory")?,
            install_command: row.try_get("install_command")?,
            build_command: row.try_get("build_command")?,
            run_command: row.try_get("run_command")?,
            environment_variables,
            build_status,
            last_build_id: last_build_id.map(BuildId),
            last_build_start_time: row.try_get("last_build_start_time")?,
            last_build_error_message: row.try_get("last_build_error_message")?,
            deployment_url: row.try_get("deployment_url")?,
        })
    }

    fn expect_row(
        affected: u64,
        repository: &RepositoryId,
    ) -> Result<()> {
        if affected == 0 {
            return Err(CoreError::NotFound(format!("repository {repository}")));
        }
        Ok(())
    }
}

#[async_trait]
impl BuildConfigStore for PostgresBuildConfigStore {
    async fn get(
        &self,
        repository: &RepositoryId,
    ) -> Result<Option<BuildConfig>> {
        let row = sqlx::query(SELECT_CONFIG)
            .bind(repository.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(Self::row_to_config).transpose()
    }

    async fn upsert(&self, config: &BuildConfig) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO repository_configs (
                repository_id, repository_url, has_docker, root_directory,
                install_command, build_command, run_command,
                environment_variables, build_status, last_build_id,
                last_build_start_time, last_build_error_message,
                deployment_url, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, NOW())
            ON CONFLICT (repository_id) DO UPDATE SET
                repository_url = EXCLUDED.repository_url,
                has_docker = EXCLUDED.has_docker,
                root_directory = EXCLUDED.root_directory,
                install_command = EXCLUDED.install_command,
                build_command = EXCLUDED.build_command,
                run_command = EXCLUDED.run_command,
                environment_variables = EXCLUDED.environment_variables,
                build_status = EXCLUDED.build_status,
                last_build_id = EXCLUDED.last_build_id,
                last_build_start_time = EXCLUDED.last_build_start_time,
                last_build_error_message = EXCLUDED.last_build_error_message,
                deployment_url = EXCLUDED.deployment_url,
                updated_at = NOW()
            "#,
        )
        .bind(config.repository_id.as_str())
        .bind(config.repository_url.as_deref())
        .bind(config.has_docker)
        .bind(&config.root_directory)
        .bind(&config.install_command)
        .bind(&config.build_command)
        .bind(&config.run_command)
        .bind(Json(&config.environment_variables))
        .bind(config.build_status.map(|s| s.as_str()))
        .bind(config.last_build_id.as_ref().map(BuildId::as_str))
        .bind(config.last_build_start_time)
        .bind(config.last_build_error_message.as_deref())
        .bind(config.deployment_url.as_deref())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn record_build_started(
        &self,
        repository: &RepositoryId,
        build_id: &BuildId,
        started_at: DateTime<Utc>,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE repository_configs
            SET build_status = $2, last_build_id = $3,
                last_build_start_time = $4, last_build_error_message = NULL,
                updated_at = NOW()
            WHERE repository_id = $1
            "#,
        )
        .bind(repository.as_str())
        .bind(RepositoryBuildStatus::Building.as_str())
        .bind(build_id.as_str())
        .bind(started_at)
        .execute(&self.pool)
        .await?;
        Self::expect_row(result.rows_affected(), repository)
    }

    async fn record_build_failed(
        &self,
        repository: &RepositoryId,
        message: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE repository_configs
            SET build_status = $2, last_build_error_message = $3,
                updated_at = NOW()
            WHERE repository_id = $1
            "#,
        )
        .bind(repository.as_str())
        .bind(RepositoryBuildStatus::Failed.as_str())
        .bind(message)
        .execute(&self.pool)
        .await?;
        Self::expect_row(result.rows_affected(), repository)
    }

    async fn record_deployment(
        &self,
        repository: &RepositoryId,
        url: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE repository_configs
            SET build_status = $2, deployment_url = $3, updated_at = NOW()
            WHERE repository_id = $1
            "#,
        )
        .bind(repository.as_str())
        .bind(RepositoryBuildStatus::Deployed.as_str())
        .bind(url)
        .execute(&self.pool)
        .await?;
        Self::expect_row(result.rows_affected(), repository)
    }
}

//! REST client for a remote execution gateway fronting the build, task,
//! log and report services.
//!
//! Routes (relative to the configured base URL):
//!
//! | Call | Route |
//! |---|---|
//! | project exists / create | `GET /projects/{name}`, `POST /projects` |
//! | start build / describe | `POST /builds`, `GET /builds/{id}` |
//! | list streams | `GET /logs/streams?group=&prefix=` |
//! | log events | `GET /logs/events?group=&stream=&nextToken=` |
//! | run task / status | `POST /tasks`, `GET /tasks/status?taskArn=` |
//! | list reports / sign | `GET /reports?bucket=&prefix=`, `POST /reports/sign` |

use std::time::Duration;

use async_trait::async_trait;
use breachx_model::{
    BuildId, BuildInfo, ReportObject, TaskHandle, TaskStatus,
};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;
use url::Url;

use crate::error::{CoreError, Result};
use crate::ports::{
    BuildExecutor, BuildRequest, LogEventPage, LogStorage,
    LogStreamDescriptor, ProjectSpec, ReportStorage, TaskExecutor, TaskLaunch,
};

const SERVICE: &str = "execution gateway";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub base_url: String,
    pub token: Option<String>,
    pub timeout_ms: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:4000".into(),
            token: None,
            timeout_ms: 30_000,
        }
    }
}

#[derive(Debug, Clone)]
pub struct GatewayClient {
    http: reqwest::Client,
    base: Url,
    token: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct BuildStarted {
    id: BuildId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskStarted {
    task_arn: TaskHandle,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct TaskState {
    last_status: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignRequest<'a> {
    bucket: &'a str,
    key: &'a str,
    expires_in_secs: u64,
}

#[derive(Deserialize)]
struct SignedUrl {
    url: String,
}

impl GatewayClient {
    pub fn new(config: &GatewayConfig) -> Result<Self> {
        let mut base = Url::parse(&config.base_url).map_err(|err| {
            CoreError::InvalidInput(format!(
                "invalid gateway URL {}: {err}",
                config.base_url
            ))
        })?;
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|err| {
                CoreError::Internal(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self {
            http,
            base,
            token: config.token.clone(),
        })
    }

    fn url(&self, path: &str, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = self.base.join(path).map_err(|err| {
            CoreError::Internal(format!("invalid gateway path {path}: {err}"))
        })?;
        if !query.is_empty() {
            url.query_pairs_mut().extend_pairs(query);
        }
        Ok(url)
    }

    fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.http.request(method, url);
        match &self.token {
            Some(token) => builder.bearer_auth(token),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let response = builder
            .send()
            .await
            .map_err(|err| CoreError::collaborator(SERVICE, err.to_string()))?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        debug!(%status, body = %body, "gateway request failed");
        Err(match status {
            StatusCode::NOT_FOUND => CoreError::NotFound(body),
            StatusCode::BAD_REQUEST if body.contains("token") => {
                CoreError::InvalidToken(body)
            }
            StatusCode::BAD_REQUEST | StatusCode::UNPROCESSABLE_ENTITY => {
                CoreError::LaunchRejected(body)
            }
            _ => CoreError::collaborator(SERVICE, format!("{status}: {body}")),
        })
    }

    async fn json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        self.send(builder)
            .await?
            .json::<T>()
            .await
            .map_err(|err| CoreError::invalid_response(SERVICE, err.to_string()))
    }

    fn segment(value: &str) -> String {
        url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
    }
}

#[async_trait]
impl BuildExecutor for GatewayClient {
    async fn project_exists(&self, project: &str) -> Result<bool> {
        let url = self.url(&format!("projects/{}", Self::segment(project)), &[])?;
        match self.send(self.request(Method::GET, url)).await {
            Ok(_) => Ok(true),
            Err(CoreError::NotFound(_)) => Ok(false),
            Err(err) => Err(err),
        }
    }

    async fn create_project(&self, spec: &ProjectSpec) -> Result<()> {
        let url = self.url("projects", &[])?;
        self.send(self.request(Method::POST, url).json(spec)).await?;
        Ok(())
    }

    async fn start_build(&self, request: &BuildRequest) -> Result<BuildId> {
        let url = self.url("builds", &[])?;
        let started: BuildStarted =
            self.json(self.request(Method::POST, url).json(request)).await?;
        Ok(started.id)
    }

    async fn get_build(&self, build_id: &BuildId) -> Result<BuildInfo> {
        let url =
            self.url(&format!("builds/{}", Self::segment(build_id.as_str())), &[])?;
        self.json(self.request(Method::GET, url)).await
    }
}

#[async_trait]
impl LogStorage for GatewayClient {
    async fn list_streams(
        &self,
        group: &str,
        prefix: &str,
    ) -> Result<Vec<LogStreamDescriptor>> {
        let url = self.url("logs/streams", &[("group", group), ("prefix", prefix)])?;
        self.json(self.request(Method::GET, url)).await
    }

    async fn get_log_events(
        &self,
        group: &str,
        stream: &str,
        token: Option<&str>,
    ) -> Result<LogEventPage> {
        let mut query = vec![("group", group), ("stream", stream)];
        if let Some(token) = token {
            query.push(("nextToken", token));
        }
        let url = self.url("logs/events", &query)?;
        self.json(self.request(Method::GET, url)).await
    }
}

#[async_trait]
impl TaskExecutor for GatewayClient {
    async fn run_task(&self, launch: &TaskLaunch) -> Result<TaskHandle> {
        let url = self.url("tasks", &[])?;
        let started: TaskStarted =
            self.json(self.request(Method::POST, url).json(launch)).await?;
        Ok(started.task_arn)
    }

    async fn get_task_status(&self, handle: &TaskHandle) -> Result<TaskStatus> {
        let url = self.url("tasks/status", &[("taskArn", handle.as_str())])?;
        match self.json::<TaskState>(self.request(Method::GET, url)).await {
            Ok(state) => Ok(state
                .last_status
                .map(TaskStatus::from)
                .unwrap_or(TaskStatus::Unknown)),
            Err(CoreError::NotFound(_)) => Ok(TaskStatus::Unknown),
            Err(err) => Err(err),
        }
    }
}

#[async_trait]
impl ReportStorage for GatewayClient {
    async fn list_objects(
        &self,
        bucket: &str,
        prefix: &str,
    ) -> Result<Vec<ReportObject>> {
        let url = self.url("reports", &[("bucket", bucket), ("prefix", prefix)])?;
        self.json(self.request(Method::GET, url)).await
    }

    async fn signed_url(
        &self,
        bucket: &str,
        key: &str,
        ttl: Duration,
    ) -> Result<String> {
        let url = self.url("reports/sign", &[])?;
        let body = SignRequest {
            bucket,
            key,
            expires_in_secs: ttl.as_secs(),
        };
        let signed: SignedUrl =
            self.json(self.request(Method::POST, url).json(&body)).await?;
        Ok(signed.url)
    }
}

//! HTTP access to a running dashboard server, used by the client-side
//! pollers.

use std::time::Duration;

use async_trait::async_trait;
use breachx_model::{
    BuildConfig, BuildId, BuildStatusResponse, ReportReference,
    RepositoryId, ScanId, ScanLogPollResponse, StartScanRequest,
    StartScanResponse,
};
use reqwest::{Response, StatusCode};
use serde::de::DeserializeOwned;
use url::Url;

use crate::build::{BuildStatusSource, RepositoryRefresher};
use crate::error::{CoreError, Result};
use crate::scan::ScanLogSource;

const SERVICE: &str = "dashboard API";

/// Thin typed client over the dashboard's JSON routes.
#[derive(Debug, Clone)]
pub struct DashboardClient {
    http: reqwest::Client,
    base: Url,
}

impl DashboardClient {
    pub fn new(base_url: &str) -> Result<Self> {
        let base = Url::parse(base_url).map_err(|err| {
            CoreError::InvalidInput(format!("invalid server URL {base_url}: {err}"))
        })?;
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| {
                CoreError::Internal(format!("failed to build HTTP client: {err}"))
            })?;
        Ok(Self { http, base })
    }

    fn url(&self, path: &str) -> Result<Url> {
        self.base.join(path).map_err(|err| {
            CoreError::Internal(format!("invalid API path {path}: {err}"))
        })
    }

    async fn decode<T: DeserializeOwned>(response: Response) -> Result<T> {
        response
            .json::<T>()
            .await
            .map_err(|err| CoreError::invalid_response(SERVICE, err.to_string()))
    }

    async fn check(response: Response) -> Result<Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(match status {
            StatusCode::NOT_FOUND => CoreError::NotFound(body),
            StatusCode::BAD_REQUEST => CoreError::InvalidInput(body),
            _ => CoreError::collaborator(SERVICE, format!("{status}: {body}")),
        })
    }

    fn transport_error(err: reqwest::Error) -> CoreError {
        CoreError::collaborator(SERVICE, err.to_string())
    }
}

#[async_trait]
impl ScanLogSource for DashboardClient {
    async fn start_scan(&self, target: &str) -> Result<StartScanResponse> {
        let response = self
            .http
            .post(self.url("api/security-scan")?)
            .json(&StartScanRequest {
                target_url: target.to_string(),
            })
            .send()
            .await
            .map_err(Self::transport_error)?;
        let response = Self::check(response).await.map_err(|err| match err {
            CoreError::Collaborator { message, .. } => {
                CoreError::LaunchRejected(message)
            }
            other => other,
        })?;
        Self::decode(response).await
    }

    /// Both poll shapes come back as a body, including 404 and 5xx
    /// failures, so the status code is not inspected here.
    async fn poll_logs(
        &self,
        scan_id: &ScanId,
        next_token: Option<&str>,
    ) -> Result<ScanLogPollResponse> {
        let mut url = self.url("api/security-scan/logs")?;
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("scanId", &scan_id.to_string());
            if let Some(token) = next_token {
                query.append_pair("nextToken", token);
            }
        }
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::decode(response).await
    }

    async fn latest_report(&self) -> Result<Option<ReportReference>> {
        let response = self
            .http
            .get(self.url("api/security-scan/report")?)
            .send()
            .await
            .map_err(Self::transport_error)?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let response = Self::check(response).await?;
        Self::decode(response).await.map(Some)
    }
}

#[async_trait]
impl BuildStatusSource for DashboardClient {
    async fn build_status(
        &self,
        build_id: &BuildId,
    ) -> Result<BuildStatusResponse> {
        let mut url = self.url("api/builds/")?;
        url.path_segments_mut()
            .map_err(|_| CoreError::Internal("server URL cannot be a base".into()))?
            .pop_if_empty()
            .extend([build_id.as_str(), "status"]);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::decode(Self::check(response).await?).await
    }
}

#[async_trait]
impl RepositoryRefresher for DashboardClient {
    async fn refresh(&self, repository: &RepositoryId) -> Result<BuildConfig> {
        let mut url = self.url("api/repositories/")?;
        url.path_segments_mut()
            .map_err(|_| CoreError::Internal("server URL cannot be a base".into()))?
            .pop_if_empty()
            .extend([repository.as_str(), "config"]);
        let response = self
            .http
            .get(url)
            .send()
            .await
            .map_err(Self::transport_error)?;
        Self::decode(Self::check(response).await?).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_paths_resolve_against_server_root() {
        let client = DashboardClient::new("http://localhost:3000").unwrap();
        assert_eq!(
            client.url("api/security-scan").unwrap().as_str(),
            "http://localhost:3000/api/security-scan"
        );
    }
}

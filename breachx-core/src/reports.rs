use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use breachx_model::ReportReference;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::Result;
use crate::ports::ReportStorage;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportConfig {
    pub bucket: String,
    pub prefix: String,
    pub signed_url_ttl_secs: u64,
}

impl Default for ReportConfig {
    fn default() -> Self {
        Self {
            bucket: "security-scan-insight-reports".into(),
            prefix: "reports/".into(),
            signed_url_ttl_secs: 3_600,
        }
    }
}

/// Finds the newest scan report and hands out a time-limited link to it.
pub struct ReportService {
    storage: Arc<dyn ReportStorage>,
    config: ReportConfig,
}

impl fmt::Debug for ReportService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReportService")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ReportService {
    pub fn new(storage: Arc<dyn ReportStorage>, config: ReportConfig) -> Self {
        Self { storage, config }
    }

    /// `None` when the prefix holds no report objects.
    pub async fn latest_report(&self) -> Result<Option<ReportReference>> {
        let objects = self
            .storage
            .list_objects(&self.config.bucket, &self.config.prefix)
            .await?;

        let Some(latest) = objects
            .into_iter()
            .filter(|object| object.key != self.config.prefix)
            .max_by_key(|object| object.last_modified)
        else {
            debug!(prefix = %self.config.prefix, "no reports found");
            return Ok(None);
        };

        let ttl = Duration::from_secs(self.config.signed_url_ttl_secs);
        let report_url = self
            .storage
            .signed_url(&self.config.bucket, &latest.key, ttl)
            .await?;

        Ok(Some(ReportReference {
            report_url,
            last_modified: latest.last_modified,
        }))
    }
}

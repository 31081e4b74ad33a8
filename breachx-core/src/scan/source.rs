use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use breachx_model::{
    ReportReference, ScanId, ScanLogPollResponse, StartScanResponse,
};

use crate::error::Result;
use crate::reports::ReportService;
use crate::scan::orchestrator::SecurityScanOrchestrator;

/// What a [`ScanLogPoller`](crate::scan::ScanLogPoller) talks to: the
/// dashboard API over HTTP, or the orchestrator directly when the poller
/// runs inside the server.
#[async_trait]
pub trait ScanLogSource: Send + Sync {
    async fn start_scan(&self, target: &str) -> Result<StartScanResponse>;

    async fn poll_logs(
        &self,
        scan_id: &ScanId,
        next_token: Option<&str>,
    ) -> Result<ScanLogPollResponse>;

    async fn latest_report(&self) -> Result<Option<ReportReference>>;
}

/// In-process source backed by the orchestrator and report service.
#[derive(Clone)]
pub struct LocalScanSource {
    orchestrator: Arc<SecurityScanOrchestrator>,
    reports: Arc<ReportService>,
}

impl fmt::Debug for LocalScanSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LocalScanSource")
            .field("orchestrator", &self.orchestrator)
            .finish_non_exhaustive()
    }
}

impl LocalScanSource {
    pub fn new(
        orchestrator: Arc<SecurityScanOrchestrator>,
        reports: Arc<ReportService>,
    ) -> Self {
        Self {
            orchestrator,
            reports,
        }
    }
}

#[async_trait]
impl ScanLogSource for LocalScanSource {
    async fn start_scan(&self, target: &str) -> Result<StartScanResponse> {
        let session = self.orchestrator.start_scan(target).await?;
        Ok(StartScanResponse {
            scan_id: session.scan_id,
            task_arn: session.task_handle,
        })
    }

    async fn poll_logs(
        &self,
        scan_id: &ScanId,
        next_token: Option<&str>,
    ) -> Result<ScanLogPollResponse> {
        Ok(self.orchestrator.poll_logs(scan_id, next_token).await)
    }

    async fn latest_report(&self) -> Result<Option<ReportReference>> {
        self.reports.latest_report().await
    }
}

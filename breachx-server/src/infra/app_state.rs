use std::{fmt, sync::Arc};

use breachx_config::{BackendKind, Config};
use breachx_core::build::BuildService;
use breachx_core::ports::{
    BuildConfigStore, BuildExecutor, LogStorage, ReportStorage, TaskExecutor,
};
use breachx_core::reports::ReportService;
use breachx_core::scan::{
    LocalScanSource, ScanSessionRegistry, SecurityScanOrchestrator,
};
use breachx_core::streaming::BuildLogProducer;

/// Where repository build settings are persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreKind {
    Memory,
    Postgres,
}

impl StoreKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StoreKind::Memory => "memory",
            StoreKind::Postgres => "postgres",
        }
    }
}

/// Execution collaborators shared by every service.
#[derive(Clone)]
pub struct Collaborators {
    pub builds: Arc<dyn BuildExecutor>,
    pub logs: Arc<dyn LogStorage>,
    pub tasks: Arc<dyn TaskExecutor>,
    pub reports: Arc<dyn ReportStorage>,
}

impl fmt::Debug for Collaborators {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Collaborators").finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub builds: Arc<BuildService>,
    pub build_logs: Arc<BuildLogProducer>,
    pub scans: Arc<SecurityScanOrchestrator>,
    pub reports: Arc<ReportService>,
    pub scan_source: Arc<LocalScanSource>,
    pub store_kind: StoreKind,
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState")
            .field("backend", &self.config.backend.kind)
            .field("store", &self.store_kind)
            .finish_non_exhaustive()
    }
}

impl AppState {
    /// Assemble the services over the given collaborators and store.
    pub fn new(
        config: Arc<Config>,
        collaborators: Collaborators,
        store: Arc<dyn BuildConfigStore>,
        store_kind: StoreKind,
    ) -> Self {
        let registry =
            Arc::new(ScanSessionRegistry::new(config.registry.session_ttl()));
        let builds = Arc::new(BuildService::new(
            Arc::clone(&collaborators.builds),
            store,
            config.build.clone(),
        ));
        let build_logs = Arc::new(BuildLogProducer::new(
            Arc::clone(&collaborators.builds),
            Arc::clone(&collaborators.logs),
            config.streaming.clone(),
        ));
        let scans = Arc::new(SecurityScanOrchestrator::new(
            collaborators.tasks,
            collaborators.logs,
            registry,
            config.scan.task.clone(),
            config.scan.poll,
        ));
        let reports = Arc::new(ReportService::new(
            collaborators.reports,
            config.reports.clone(),
        ));
        let scan_source = Arc::new(LocalScanSource::new(
            Arc::clone(&scans),
            Arc::clone(&reports),
        ));

        Self {
            config,
            builds,
            build_logs,
            scans,
            reports,
            scan_source,
            store_kind,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn config_handle(&self) -> Arc<Config> {
        Arc::clone(&self.config)
    }

    pub fn registry(&self) -> &Arc<ScanSessionRegistry> {
        self.scans.registry()
    }

    pub fn backend_kind(&self) -> BackendKind {
        self.config.backend.kind
    }
}

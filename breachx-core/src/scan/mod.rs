//! Security scans: launch, session bookkeeping and log polling.

pub mod backoff;
pub mod orchestrator;
pub mod poller;
pub mod registry;
pub mod source;

pub use backoff::{Backoff, BackoffPolicy};
pub use orchestrator::{ScanPollConfig, ScanTaskConfig, SecurityScanOrchestrator};
pub use poller::{PollerState, ScanLogPoller, ScanPollerConfig, Step};
pub use registry::ScanSessionRegistry;
pub use source::{LocalScanSource, ScanLogSource};

//! Build triggering, status polling and buildspec rendering.

pub mod buildspec;
pub mod service;
pub mod status_poller;

pub use service::{BuildService, BuildServiceConfig};
pub use status_poller::{
    BuildStatusEvent, BuildStatusPoller, BuildStatusPollerConfig,
    BuildStatusSource, RepositoryRefresher,
};

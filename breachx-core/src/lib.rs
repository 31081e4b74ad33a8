//! Log streaming and build/scan orchestration for the BreachX dashboard.
//!
//! The crate is organised around a handful of collaborator ports (see
//! [`ports`]) so that every long-running loop can be driven against the
//! in-process simulator, the REST execution gateway, or a scripted test
//! double without change.

pub mod build;
pub mod client;
pub mod error;
pub mod infra;
pub mod ports;
pub mod reports;
pub mod scan;
pub mod streaming;

pub use breachx_model as model;

pub use error::{CoreError, Result};

#[cfg(feature = "database")]
pub static MIGRATOR: sqlx::migrate::Migrator = sqlx::migrate!("./migrations");

//! Collaborator adapters.

pub mod gateway;
pub mod memory;
#[cfg(feature = "database")]
pub mod postgres;
pub mod simulation;

pub use gateway::{GatewayClient, GatewayConfig};
pub use memory::InMemoryBuildConfigStore;
#[cfg(feature = "database")]
pub use postgres::PostgresBuildConfigStore;
pub use simulation::{SimulatedCloud, SimulationConfig};

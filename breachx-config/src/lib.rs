//! Configuration for the breachx server and CLI.
//!
//! Values are layered: environment variables win over the TOML file, which
//! wins over built-in defaults. A `.env` file is read first when present.
//! Guard rails reject settings the services cannot run with and collect
//! softer findings as [`ConfigWarnings`].

pub mod loader;
pub mod models;
pub mod util;
pub mod validation;

pub use loader::{ConfigLoad, ConfigLoadError, ConfigLoader, ConfigLoaderOptions};
pub use models::{
    BackendConfig, BackendKind, Config, ConfigMetadata, CorsConfig,
    DatabaseConfig, PollerConfig, RegistryConfig, ScanConfig, ServerConfig,
};
pub use validation::{ConfigGuardRailError, ConfigWarning, ConfigWarnings};

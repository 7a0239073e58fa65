//! Domain layer for homegw-server.
//!
//! Pure configuration types with serde defaults.  Reading the file from disk
//! is the infrastructure layer's job (`infrastructure::config_file`).

pub mod config;

pub use config::{
    DiscoverySettings, GatewayConfig, ServerSettings, SessionTimeouts, TimeoutSettings, UserEntry,
};

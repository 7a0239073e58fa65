//! Gateway configuration schema.
//!
//! [`GatewayConfig`] is the single source of truth for runtime settings.  It
//! is deserialized from TOML, and every field has a serde default so a
//! partial (or missing) file still produces a working configuration:
//!
//! ```toml
//! [server]
//! bind_address = "0.0.0.0"
//! port = 8443
//! cert_path = "cert.pem"
//! key_path = "key.pem"
//!
//! [timeouts]
//! http_idle_secs = 12
//! shutdown_stage_secs = 6
//! channel_write_secs = 12
//! token_ttl_secs = 3600
//!
//! [discovery]
//! port = 20801
//! node_name = "homegw"
//!
//! [[users]]
//! name = "admin"
//! password = "admin"
//! level = "admin"
//! ```
//!
//! Build the struct once at startup and share it behind an `Arc`; nothing in
//! the gateway reads configuration from ambient global state.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use homegw_core::AccessLevel;
use serde::{Deserialize, Serialize};

/// Top-level gateway configuration.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct GatewayConfig {
    #[serde(default)]
    pub server: ServerSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub discovery: DiscoverySettings,
    /// Accounts accepted by the built-in credential store.
    #[serde(default = "default_users")]
    pub users: Vec<UserEntry>,
}

/// Listener and TLS material.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerSettings {
    /// IP address to bind the TLS listener to.  `"0.0.0.0"` binds all interfaces.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port of the TLS listener.
    #[serde(default = "default_port")]
    pub port: u16,
    /// PEM certificate chain.
    #[serde(default = "default_cert_path")]
    pub cert_path: PathBuf,
    /// PEM private key.
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
    /// Directory served for unmatched `GET` requests; no static assets when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub www_root: Option<PathBuf>,
    /// `tracing` level used when `RUST_LOG` is unset.
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

/// Deadlines applied by the session state machines.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TimeoutSettings {
    /// Maximum wait for one HTTP request (and for the TLS handshake).
    #[serde(default = "default_http_idle_secs")]
    pub http_idle_secs: u64,
    /// Deadline of each shutdown stage (close frame, TLS close_notify).
    #[serde(default = "default_shutdown_stage_secs")]
    pub shutdown_stage_secs: u64,
    /// Longest a single channel write may wait on a peer that is not reading.
    #[serde(default = "default_channel_write_secs")]
    pub channel_write_secs: u64,
    /// Lifetime of a bearer token issued by `/auth`.
    #[serde(default = "default_token_ttl_secs")]
    pub token_ttl_secs: u64,
}

/// UDP discovery beacon.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DiscoverySettings {
    /// Whether the responder is started at all.
    #[serde(default = "default_true")]
    pub enabled: bool,
    /// Fixed UDP port queries are sent to.
    #[serde(default = "default_discovery_port")]
    pub port: u16,
    /// Node name reported in every reply.
    #[serde(default = "default_node_name")]
    pub node_name: String,
    /// Host clients outside the LAN should connect to.
    #[serde(default = "default_external_host")]
    pub external_host: String,
    /// Port clients outside the LAN should connect to.
    #[serde(default = "default_port")]
    pub external_port: u16,
}

/// One account of the built-in credential store.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct UserEntry {
    pub name: String,
    pub password: String,
    #[serde(default = "default_user_level")]
    pub level: AccessLevel,
}

/// Durations derived from [`TimeoutSettings`], handed to every session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTimeouts {
    /// Per-request read deadline of an HTTP session.
    pub http_idle: Duration,
    /// Deadline of each shutdown stage.
    pub shutdown_stage: Duration,
    /// Deadline of one queued write on a channel session.
    pub channel_write: Duration,
}

impl Default for SessionTimeouts {
    fn default() -> Self {
        TimeoutSettings::default().session_timeouts()
    }
}

impl GatewayConfig {
    /// The socket address the TLS listener binds to.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `bind_address` is not an IP address.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.bind_address, self.server.port).parse()
    }

    /// The socket address the discovery responder binds to.
    ///
    /// # Errors
    ///
    /// Returns the parse error when `bind_address` is not an IP address.
    pub fn discovery_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        format!("{}:{}", self.server.bind_address, self.discovery.port).parse()
    }
}

impl TimeoutSettings {
    /// Converts the second counts into [`SessionTimeouts`].
    pub fn session_timeouts(&self) -> SessionTimeouts {
        SessionTimeouts {
            http_idle: Duration::from_secs(self.http_idle_secs),
            shutdown_stage: Duration::from_secs(self.shutdown_stage_secs),
            channel_write: Duration::from_secs(self.channel_write_secs),
        }
    }
}

impl DiscoverySettings {
    /// The `host:port` string advertised in beacon replies.
    pub fn external_endpoint(&self) -> String {
        format!("{}:{}", self.external_host, self.external_port)
    }
}

// ── Default helpers ───────────────────────────────────────────────────────────

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8443
}
fn default_cert_path() -> PathBuf {
    PathBuf::from("cert.pem")
}
fn default_key_path() -> PathBuf {
    PathBuf::from("key.pem")
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_http_idle_secs() -> u64 {
    12
}
fn default_shutdown_stage_secs() -> u64 {
    6
}
fn default_channel_write_secs() -> u64 {
    12
}
fn default_token_ttl_secs() -> u64 {
    60 * 60
}
fn default_true() -> bool {
    true
}
fn default_discovery_port() -> u16 {
    20801
}
fn default_node_name() -> String {
    "homegw".to_string()
}
fn default_external_host() -> String {
    "127.0.0.1".to_string()
}
fn default_user_level() -> AccessLevel {
    AccessLevel::Control
}
fn default_users() -> Vec<UserEntry> {
    vec![UserEntry {
        name: "admin".to_string(),
        password: "admin".to_string(),
        level: AccessLevel::Admin,
    }]
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            server: ServerSettings::default(),
            timeouts: TimeoutSettings::default(),
            discovery: DiscoverySettings::default(),
            users: default_users(),
        }
    }
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            cert_path: default_cert_path(),
            key_path: default_key_path(),
            www_root: None,
            log_level: default_log_level(),
        }
    }
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            http_idle_secs: default_http_idle_secs(),
            shutdown_stage_secs: default_shutdown_stage_secs(),
            channel_write_secs: default_channel_write_secs(),
            token_ttl_secs: default_token_ttl_secs(),
        }
    }
}

impl Default for DiscoverySettings {
    fn default() -> Self {
        Self {
            enabled: default_true(),
            port: default_discovery_port(),
            node_name: default_node_name(),
            external_host: default_external_host(),
            external_port: default_port(),
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

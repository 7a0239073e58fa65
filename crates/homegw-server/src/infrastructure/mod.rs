//! Infrastructure layer: everything that touches a socket, a file or a timer.
//!
//! - **`tls`** – PEM loading into a shared `rustls::ServerConfig`
//! - **`listener`** – the accept loop; one task per connection
//! - **`http_session`** – REST routes, authentication, WebSocket upgrade
//! - **`deadline_io`** – stall deadlines under every HTTP read and write
//! - **`channel_session`** – the JSON channel with its single-writer queue
//! - **`discovery`** – the UDP beacon responder
//! - **`assets`** – static files below `www_root`
//! - **`config_file`** – TOML load/save of [`GatewayConfig`](crate::domain::GatewayConfig)
//! - **`context`**, **`shutdown`**, **`error`** – shared plumbing

pub mod assets;
pub mod channel_session;
pub mod config_file;
pub mod context;
pub mod deadline_io;
pub mod discovery;
pub mod error;
pub mod http_session;
pub mod listener;
pub mod shutdown;
pub mod tls;

pub use assets::DirAssets;
pub use channel_session::ChannelSession;
pub use config_file::{load_config, save_config, ConfigError};
pub use context::GatewayContext;
pub use deadline_io::{DeadlineStream, Deadlines};
pub use discovery::{answer_queries, beacon_reply, BeaconSocket, DiscoveryResponder};
pub use error::GatewayError;
pub use http_session::HttpSession;
pub use listener::Listener;
pub use shutdown::{shutdown_channel, Shutdown, ShutdownTrigger};
pub use tls::load_tls_config;

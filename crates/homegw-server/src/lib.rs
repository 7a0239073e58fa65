//! homegw-server library crate.
//!
//! The network-facing gateway of a home-automation control server.  It
//! terminates TLS, serves a small REST surface, upgrades authenticated
//! connections to a JSON channel and fans state-change notifications out to
//! every open channel.
//!
//! # Architecture (clean architecture)
//!
//! ```text
//! Client (HTTPS / WSS)            LAN query (UDP)
//!         ↕                              ↕
//! [homegw-server]
//!   ├── domain/           Pure types: GatewayConfig and its sections
//!   ├── application/      Authentication, credential store, command table,
//!   │                     session registry, sample home domain
//!   └── infrastructure/
//!         ├── tls/            PEM loading → rustls ServerConfig
//!         ├── listener/       accept loop + TLS handshake
//!         ├── http_session/   hyper HTTP/1 connection: REST routes, auth, upgrade
//!         ├── deadline_io/    stall deadlines under the HTTP transport
//!         ├── channel_session/ JSON channel over WebSocket framing
//!         ├── discovery/      UDP beacon responder
//!         ├── assets/         static files
//!         └── config_file/    TOML load/save
//! ```
//!
//! # Layer rules
//!
//! - `domain` has no I/O.
//! - `application` depends on `domain` and `homegw-core`; it never touches a
//!   socket.  Sessions are reached only through [`application::SessionHandle`].
//! - `infrastructure` owns every socket and every timer.
//!
//! # Ownership of a connection
//!
//! A connection has exactly one owner at a time and ownership only moves
//! forward: the listener accepts it, the TLS handshake wraps it, an
//! [`infrastructure::HttpSession`] lends it to hyper, and on upgrade the
//! session takes it back (with any bytes hyper had buffered) and moves it
//! into an [`infrastructure::ChannelSession`] without doing any further I/O.

/// Domain layer: configuration types (no I/O).
pub mod domain;

/// Application layer: authentication, dispatch, registry, home domain.
pub mod application;

/// Infrastructure layer: TLS, sockets, session state machines.
pub mod infrastructure;

//! # homegw-core
//!
//! Shared library for the HomeGW gateway containing the channel message
//! envelope, the HTTP reply helpers, and the identity types bound to
//! authenticated connections.
//!
//! This crate has zero dependencies on sockets, TLS, or async runtimes.  The
//! server crate owns all I/O; everything here is a pure function or a plain
//! data type, so it can be unit tested without a network.
//!
//! # Architecture overview
//!
//! - **`protocol`** – How bytes travel over the wire.  The channel protocol is
//!   JSON text frames carrying `{msgid, msg, ...}` envelopes; the REST surface
//!   replies with JSON, HTML or plain text built on the `http` crate's types.
//!
//! - **`domain`** – The `Principal` and `AccessLevel` that authentication
//!   produces and that every session carries immutably.

pub mod domain;
pub mod protocol;

// Re-export the most-used types at the crate root so callers can write
// `homegw_core::Principal` instead of `homegw_core::domain::identity::Principal`.
pub use domain::identity::{AccessLevel, Principal};
pub use protocol::envelope::{ChannelRequest, CommandResponse, ProtocolViolation, PushEvent};
pub use protocol::http::{MAX_BODY_BYTES, MAX_HEAD_BYTES};

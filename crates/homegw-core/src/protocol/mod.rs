//! Wire formats spoken by the gateway.
//!
//! - **`envelope`** – JSON channel messages: requests, ack/nack responses and
//!   server push events.
//! - **`http`** – Reply builders and WebSocket upgrade checks over `http` types.

pub mod envelope;
pub mod http;

pub use envelope::{ChannelRequest, CommandResponse, ProtocolViolation, PushEvent};
pub use http::{MAX_BODY_BYTES, MAX_HEAD_BYTES};

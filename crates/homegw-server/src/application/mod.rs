//! Application layer for homegw-server.
//!
//! The application layer knows *what* the gateway does with a request, but
//! never *how* bytes reach the socket.
//!
//! # Responsibilities
//!
//! - Resolving `Authorization` headers into a [`Principal`](homegw_core::Principal)
//! - The credential store that backs authentication
//! - The command dispatch table consulted by channel sessions
//! - The session registry and `broadcast`
//! - The collaborator traits for REST resources and static assets
//! - A small in-memory home domain used by the binary and the tests
//!
//! # What does NOT belong here?
//!
//! - Opening sockets, TLS, WebSocket framing (infrastructure)
//! - Timers and deadlines (infrastructure); the credential store only reads
//!   the clock to age tokens

pub mod auth;
pub mod credentials;
pub mod dispatch;
pub mod home;
pub mod registry;
pub mod resources;

pub use auth::{resolve_authorization, AuthError, Authenticator};
pub use credentials::{CredentialStore, DEFAULT_TOKEN_TTL, MAX_TOKENS_PER_ACCOUNT};
pub use dispatch::{register_core_commands, CommandContext, CommandError, CommandTable};
pub use home::HomeState;
pub use registry::{SessionHandle, SessionRegistry, SessionState, OUTBOUND_QUEUE_LIMIT};
pub use resources::{
    Asset, AssetStore, NoResources, ResourceError, ResourceHandler, ResourceReply, ResourceRequest,
};

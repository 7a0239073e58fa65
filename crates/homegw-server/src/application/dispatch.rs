//! Command dispatch table for channel requests.
//!
//! The channel session knows nothing about business rules.  It parses a
//! [`ChannelRequest`], looks its `msg` up in a [`CommandTable`] built once at
//! start-up, and sends back whatever [`CommandResponse`] the handler produced.
//!
//! ```text
//! {"msgid":4,"msg":"setdevice",...}
//!        │
//!        ▼  CommandTable::dispatch
//!   handler(ctx, &mut response) ──Err(CommandError)──▶ nack {"error": code}
//!        │ Ok
//!        ▼
//!   ack {"msgid":4, ...result}
//! ```
//!
//! A name missing from the table is an ordinary lookup miss answered with a
//! `nack`, never a reason to close the connection.

use std::collections::HashMap;
use std::sync::Arc;

use homegw_core::{ChannelRequest, CommandResponse, Principal};
use thiserror::Error;
use tracing::debug;

use super::registry::SessionHandle;

/// A command failure reported in-band as a `nack`.
#[derive(Debug, Error, PartialEq)]
pub enum CommandError {
    /// Unknown command or missing/ill-typed parameters.
    #[error("invalid arguments")]
    InvalidArguments,

    /// The session's principal lacks the required access level.
    #[error("access denied")]
    Forbidden,

    /// The addressed entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// The handler ran but could not complete.
    #[error("failed: {0}")]
    Failed(String),
}

impl CommandError {
    /// The short code placed in the response's `error` field.
    pub fn code(&self) -> &'static str {
        match self {
            CommandError::InvalidArguments => "invalid arguments",
            CommandError::Forbidden => "access denied",
            CommandError::NotFound(_) => "not found",
            CommandError::Failed(_) => "failed",
        }
    }
}

/// Everything a handler may look at while serving one request.
pub struct CommandContext<'a> {
    /// Identity bound to the session at upgrade time.
    pub principal: &'a Principal,
    /// The validated request.
    pub request: &'a ChannelRequest,
    /// The requesting session, for extra out-of-band sends.
    pub session: &'a Arc<SessionHandle>,
}

type Handler =
    Arc<dyn Fn(&CommandContext<'_>, &mut CommandResponse) -> Result<(), CommandError> + Send + Sync>;

/// Mapping from command name to handler.
#[derive(Default, Clone)]
pub struct CommandTable {
    handlers: HashMap<String, Handler>,
}

impl std::fmt::Debug for CommandTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandTable")
            .field("commands", &self.names())
            .finish()
    }
}

impl CommandTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` under `name`, replacing any previous entry.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F)
    where
        F: Fn(&CommandContext<'_>, &mut CommandResponse) -> Result<(), CommandError>
            + Send
            + Sync
            + 'static,
    {
        self.handlers.insert(name.into(), Arc::new(handler));
    }

    /// Registered command names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Returns `true` when `name` has a handler.
    pub fn contains(&self, name: &str) -> bool {
        self.handlers.contains_key(name)
    }

    /// Runs the handler for `request` and returns exactly one response
    /// carrying the request's `msgid`.
    pub fn dispatch(
        &self,
        principal: &Principal,
        request: &ChannelRequest,
        session: &Arc<SessionHandle>,
    ) -> CommandResponse {
        let mut response = CommandResponse::new(request.msgid);

        let Some(handler) = self.handlers.get(&request.command) else {
            debug!("unknown command {:?} from {}", request.command, session.peer());
            response.fail(CommandError::InvalidArguments.code());
            return response;
        };

        let ctx = CommandContext {
            principal,
            request,
            session,
        };
        if let Err(e) = handler(&ctx, &mut response) {
            debug!("command {:?} failed: {e}", request.command);
            response.fail(e.code());
        }
        response
    }
}

/// Registers the diagnostics every gateway answers: `ping` and `whoami`.
pub fn register_core_commands(table: &mut CommandTable) {
    table.register("ping", |_ctx, response| {
        response.insert("pong", true);
        Ok(())
    });
    table.register("whoami", |ctx, response| {
        response.insert("name", ctx.principal.name.clone());
        response.insert("level", ctx.principal.level.as_str());
        Ok(())
    });
}

// ── Tests ─────────────────────────────────────────────────────────────────────

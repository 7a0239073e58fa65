//! Collaborators shared by every session.
//!
//! Built once in `main` (or in a test) and handed to the listener behind an
//! `Arc`.  Sessions only ever read from it.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use crate::application::{
    register_core_commands, AssetStore, Authenticator, CommandTable, CredentialStore, HomeState,
    ResourceHandler, SessionRegistry,
};
use crate::domain::{GatewayConfig, SessionTimeouts};

use super::assets::DirAssets;
use super::shutdown::Shutdown;

/// Read-only dependencies of the HTTP and channel sessions.
#[derive(Clone)]
pub struct GatewayContext {
    pub authenticator: Arc<dyn Authenticator>,
    pub resources: Arc<dyn ResourceHandler>,
    pub assets: Arc<dyn AssetStore>,
    pub commands: Arc<CommandTable>,
    pub registry: Arc<SessionRegistry>,
    pub timeouts: SessionTimeouts,
    /// Fires when the process is shutting down; open channels close with 1001.
    pub shutdown: Shutdown,
}

impl std::fmt::Debug for GatewayContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayContext")
            .field("commands", &self.commands)
            .field("registry", &self.registry)
            .field("timeouts", &self.timeouts)
            .finish_non_exhaustive()
    }
}

impl GatewayContext {
    /// Wires the built-in collaborators from `config`: the credential store,
    /// an in-memory home with a lamp and a thermostat, the core and home
    /// commands, and static files below `www_root`.
    pub fn from_config(config: &GatewayConfig, shutdown: Shutdown) -> Self {
        let registry = Arc::new(SessionRegistry::new());
        let home = Arc::new(HomeState::new(
            Arc::clone(&registry),
            [("lamp", json!(false)), ("thermostat", json!(20))],
        ));

        let mut commands = CommandTable::new();
        register_core_commands(&mut commands);
        home.register_commands(&mut commands);

        Self {
            authenticator: Arc::new(
                CredentialStore::from_users(&config.users)
                    .with_token_ttl(Duration::from_secs(config.timeouts.token_ttl_secs)),
            ),
            resources: home,
            assets: Arc::new(DirAssets::new(config.server.www_root.clone())),
            commands: Arc::new(commands),
            registry,
            timeouts: config.timeouts.session_timeouts(),
            shutdown,
        }
    }

    /// Text served by `GET /help`.
    pub fn help_text(&self) -> String {
        let mut text = String::from(
            "HomeGW gateway\n\
             \n\
             Routes:\n\
             \x20 GET  /ping        liveness check\n\
             \x20 GET  /help        this text\n\
             \x20 GET  /auth        exchange Basic/Bearer credentials for a token\n\
             \x20 GET  /ws          upgrade to the JSON channel (authenticated)\n\
             \x20 *    /res/...     domain resources (authenticated)\n\
             \n\
             Channel commands:\n",
        );
        for name in self.commands.names() {
            text.push_str("  ");
            text.push_str(name);
            text.push('\n');
        }
        text.push_str(&format!("\nOpen channels: {}\n", self.registry.len()));
        text
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_config_registers_core_and_home_commands() {
        // Arrange / Act
        let ctx = GatewayContext::from_config(&GatewayConfig::default(), Shutdown::never());

        // Assert
        assert_eq!(
            ctx.commands.names(),
            vec!["getdevices", "ping", "setdevice", "whoami"]
        );
        assert!(ctx.registry.is_empty());
    }

    #[test]
    fn test_help_text_lists_routes_and_commands() {
        let ctx = GatewayContext::from_config(&GatewayConfig::default(), Shutdown::never());

        let help = ctx.help_text();

        assert!(help.contains("/res/"));
        assert!(help.contains("  setdevice\n"));
        assert!(help.contains("Open channels: 0"));
    }
}

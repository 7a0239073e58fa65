//! HomeGW gateway — entry point.
//!
//! Loads the TOML configuration, applies command-line overrides, and runs the
//! TLS listener (plus the UDP discovery responder) until Ctrl+C.
//!
//! # Usage
//!
//! ```text
//! homegw [OPTIONS]
//!
//! Options:
//!   --config <PATH>   TOML configuration file [default: homegw.toml]
//!   --bind   <IP>     Override server.bind_address
//!   --port   <PORT>   Override server.port
//!   --cert   <PATH>   Override server.cert_path
//!   --key    <PATH>   Override server.key_path
//! ```
//!
//! Every option can also be set through the environment (`HOMEGW_CONFIG`,
//! `HOMEGW_BIND`, `HOMEGW_PORT`, `HOMEGW_CERT`, `HOMEGW_KEY`).  CLI args take
//! precedence over the environment, which takes precedence over the file.
//!
//! # Shutdown
//!
//! Ctrl+C fires the shared shutdown signal.  The accept loop stops, the
//! discovery responder stops, and every open channel sends a `1001` close
//! frame.  `main` then waits (bounded) for the registry to drain so those
//! close frames actually reach the wire before the runtime is torn down.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use tokio::time::{sleep, Instant};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use homegw_server::domain::GatewayConfig;
use homegw_server::infrastructure::{
    load_config, load_tls_config, shutdown_channel, DiscoveryResponder, GatewayContext, Listener,
};

/// How often the drain wait re-checks the registry.
const DRAIN_POLL: Duration = Duration::from_millis(100);

// ── CLI argument definitions ──────────────────────────────────────────────────

/// Home-automation gateway: TLS REST surface, JSON channel, LAN discovery.
#[derive(Debug, Parser)]
#[command(name = "homegw", about = "Home-automation gateway server", version)]
struct Cli {
    /// Path of the TOML configuration file.  A missing file means defaults.
    #[arg(long, default_value = "homegw.toml", env = "HOMEGW_CONFIG")]
    config: PathBuf,

    /// IP address to bind the TLS listener (and discovery socket) to.
    #[arg(long, env = "HOMEGW_BIND")]
    bind: Option<String>,

    /// TCP port of the TLS listener.
    #[arg(long, env = "HOMEGW_PORT")]
    port: Option<u16>,

    /// PEM certificate chain.
    #[arg(long, env = "HOMEGW_CERT")]
    cert: Option<PathBuf>,

    /// PEM private key.
    #[arg(long, env = "HOMEGW_KEY")]
    key: Option<PathBuf>,
}

impl Cli {
    /// Writes every override that was given into `config`.
    fn apply(&self, config: &mut GatewayConfig) {
        if let Some(bind) = &self.bind {
            config.server.bind_address = bind.clone();
        }
        if let Some(port) = self.port {
            config.server.port = port;
        }
        if let Some(cert) = &self.cert {
            config.server.cert_path = cert.clone();
        }
        if let Some(key) = &self.key {
            config.server.key_path = key.clone();
        }
    }
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = load_config(&cli.config)
        .with_context(|| format!("failed to load configuration from {}", cli.config.display()))?;
    cli.apply(&mut config);

    // `RUST_LOG` wins; otherwise the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.server.log_level)),
        )
        .init();

    let bind_addr = config
        .bind_addr()
        .with_context(|| format!("invalid bind address '{}'", config.server.bind_address))?;
    let tls = load_tls_config(&config.server.cert_path, &config.server.key_path)
        .context("failed to load TLS material")?;

    let (trigger, shutdown) = shutdown_channel();
    let ctx = Arc::new(GatewayContext::from_config(&config, shutdown.clone()));
    let registry = Arc::clone(&ctx.registry);

    let listener = Listener::bind(bind_addr, tls, Arc::clone(&ctx)).await?;

    // ── Discovery ─────────────────────────────────────────────────────────────
    //
    // Discovery is a convenience; a busy UDP port must not keep the gateway
    // itself from starting.
    if config.discovery.enabled {
        match config.discovery_addr() {
            Ok(addr) => match DiscoveryResponder::bind(
                addr,
                config.discovery.node_name.clone(),
                config.discovery.external_endpoint(),
            )
            .await
            {
                Ok(responder) => {
                    tokio::spawn(responder.run(shutdown.clone()));
                }
                Err(e) => error!("discovery disabled: {e}"),
            },
            Err(e) => error!("discovery disabled: invalid address: {e}"),
        }
    }

    // ── Ctrl+C ────────────────────────────────────────────────────────────────
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                info!("received Ctrl+C, shutting down");
                trigger.trigger();
            }
            Err(e) => error!("failed to listen for Ctrl+C signal: {e}"),
        }
    });

    info!("homegw started");
    listener.run().await;

    // ── Drain ─────────────────────────────────────────────────────────────────
    let deadline = Instant::now() + ctx.timeouts.shutdown_stage * 2;
    while !registry.is_empty() {
        if Instant::now() >= deadline {
            warn!("{} channel(s) still open at exit", registry.len());
            break;
        }
        sleep(DRAIN_POLL).await;
    }

    info!("homegw stopped");
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_default_config_path() {
        // Arrange: parse with no arguments (all defaults apply)
        let cli = Cli::parse_from(["homegw"]);

        // Assert
        assert_eq!(cli.config, PathBuf::from("homegw.toml"));
    }

    #[test]
    fn test_cli_without_overrides_leaves_config_untouched() {
        // Arrange
        let cli = Cli::parse_from(["homegw"]);
        let mut config = GatewayConfig::default();

        // Act
        cli.apply(&mut config);

        // Assert
        assert_eq!(config, GatewayConfig::default());
    }

    #[test]
    fn test_cli_port_override() {
        let cli = Cli::parse_from(["homegw", "--port", "9443"]);
        let mut config = GatewayConfig::default();

        cli.apply(&mut config);

        assert_eq!(config.server.port, 9443);
        assert_eq!(config.bind_addr().unwrap().port(), 9443);
    }

    #[test]
    fn test_cli_bind_and_tls_overrides() {
        // Arrange
        let cli = Cli::parse_from([
            "homegw",
            "--bind",
            "127.0.0.1",
            "--cert",
            "/etc/homegw/cert.pem",
            "--key",
            "/etc/homegw/key.pem",
        ]);
        let mut config = GatewayConfig::default();

        // Act
        cli.apply(&mut config);

        // Assert
        assert_eq!(config.server.bind_address, "127.0.0.1");
        assert_eq!(config.server.cert_path, PathBuf::from("/etc/homegw/cert.pem"));
        assert_eq!(config.server.key_path, PathBuf::from("/etc/homegw/key.pem"));
    }

    #[test]
    fn test_invalid_bind_override_surfaces_as_parse_error() {
        let cli = Cli::parse_from(["homegw", "--bind", "not.an.ip"]);
        let mut config = GatewayConfig::default();

        cli.apply(&mut config);

        assert!(config.bind_addr().is_err());
    }

    #[test]
    fn test_cli_rejects_non_numeric_port() {
        let result = Cli::try_parse_from(["homegw", "--port", "https"]);
        assert!(result.is_err());
    }
}

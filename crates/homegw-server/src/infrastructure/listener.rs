//! Connection acceptor: the TLS listener's accept loop.
//!
//! # Never starve the backlog
//!
//! The loop does nothing with an accepted socket except hand it to a freshly
//! spawned task; the next `accept()` is issued immediately after.  The TLS
//! handshake, request parsing and everything else happen on the connection's
//! own task, so a client that opens a TCP connection and then stalls cannot
//! hold up anybody else:
//!
//! ```text
//! loop {
//!     (tcp, peer) = accept()            ← re-armed right away
//!     spawn {
//!         tls = handshake(tcp)  (≤ idle deadline, failure → log + drop)
//!         HttpSession::new(tls).run()
//!     }
//! }
//! ```
//!
//! Accept errors (e.g. `EMFILE`) are logged and followed by a short pause
//! before the next attempt, so a persistent failure cannot spin a core.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_rustls::rustls::ServerConfig;
use tokio_rustls::TlsAcceptor;
use tracing::{debug, error, info};

use super::context::GatewayContext;
use super::error::GatewayError;
use super::http_session::HttpSession;

/// Pause after a failed `accept()`.
pub const ACCEPT_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// The bound TLS listener.
pub struct Listener {
    listener: TcpListener,
    acceptor: TlsAcceptor,
    ctx: Arc<GatewayContext>,
}

impl Listener {
    /// Binds `addr`.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Bind`] if the address is in use or not permitted.
    pub async fn bind(
        addr: SocketAddr,
        tls: Arc<ServerConfig>,
        ctx: Arc<GatewayContext>,
    ) -> Result<Self, GatewayError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| GatewayError::Bind { addr, source })?;
        info!("gateway listening on {addr} (TLS)");
        Ok(Self {
            listener,
            acceptor: TlsAcceptor::from(tls),
            ctx,
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    /// Accepts connections until the shutdown signal fires.
    pub async fn run(self) {
        let shutdown = self.ctx.shutdown.clone();
        let stop = shutdown.wait();
        tokio::pin!(stop);

        loop {
            let accepted = tokio::select! {
                r = self.listener.accept() => r,
                _ = &mut stop => break,
            };

            match accepted {
                Ok((tcp, peer)) => {
                    debug!("accepted {peer}");
                    tokio::spawn(serve_connection(
                        tcp,
                        peer,
                        self.acceptor.clone(),
                        Arc::clone(&self.ctx),
                    ));
                }
                Err(e) => {
                    error!("accept error: {e}");
                    sleep(ACCEPT_ERROR_BACKOFF).await;
                }
            }
        }
        info!("accept loop stopped");
    }
}

/// Runs on the connection's own task: handshake, then the HTTP session.
async fn serve_connection(
    tcp: TcpStream,
    peer: SocketAddr,
    acceptor: TlsAcceptor,
    ctx: Arc<GatewayContext>,
) {
    if let Err(e) = tcp.set_nodelay(true) {
        debug!("{peer}: set_nodelay failed: {e}");
    }

    let tls = match timeout(ctx.timeouts.http_idle, acceptor.accept(tcp)).await {
        Ok(Ok(tls)) => tls,
        Ok(Err(e)) => {
            debug!("{peer}: TLS handshake failed: {e}");
            return;
        }
        Err(_) => {
            debug!("{peer}: TLS handshake timed out");
            return;
        }
    };

    HttpSession::new(tls, peer, ctx).run().await;
}

// ── Tests ─────────────────────────────────────────────────────────────────────

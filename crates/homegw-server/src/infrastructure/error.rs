//! Start-up errors of the gateway.
//!
//! Everything in here is fatal and surfaces in `main`.  Per-connection
//! failures (handshake, I/O, timeouts) never become a [`GatewayError`]; they
//! are logged by the session that hit them and the session is dropped.

use std::net::SocketAddr;
use std::path::PathBuf;

use thiserror::Error;

/// A failure that prevents the gateway from starting.
#[derive(Debug, Error)]
pub enum GatewayError {
    /// The TLS listener could not bind its address.
    #[error("failed to bind listener on {addr}: {source}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },

    /// A certificate or key file is missing, unreadable or empty.
    #[error("TLS material {path}: {reason}")]
    Tls { path: PathBuf, reason: String },

    /// rustls rejected the certificate/key combination.
    #[error("TLS configuration rejected: {0}")]
    TlsConfig(#[from] tokio_rustls::rustls::Error),

    /// The discovery responder could not bind its UDP socket.
    #[error("failed to bind discovery socket on {addr}: {source}")]
    Discovery {
        addr: SocketAddr,
        #[source]
        source: std::io::Error,
    },
}

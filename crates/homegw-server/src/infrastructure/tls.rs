//! TLS context provider.
//!
//! Loads the PEM certificate chain and private key once at start-up and
//! builds a `rustls::ServerConfig` that every connection shares read-only
//! through an `Arc`.
//!
//! # PEM in brief
//!
//! A PEM file is base64 DER wrapped in `-----BEGIN ...-----` markers.  The
//! certificate file may hold a chain (leaf first); the key file must hold one
//! private key in PKCS#8, PKCS#1 (RSA) or SEC1 (EC) form.  `rustls-pemfile`
//! recognises all three.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::sync::Arc;

use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::{CertificateDer, PrivateKeyDer};
use tokio_rustls::rustls::ServerConfig;
use tracing::info;

use super::error::GatewayError;

/// Builds the shared server TLS configuration from PEM files.
///
/// No client certificates are requested; ALPN advertises `http/1.1` only.
///
/// # Errors
///
/// [`GatewayError::Tls`] naming the file when it cannot be read or holds no
/// usable PEM item, [`GatewayError::TlsConfig`] when rustls rejects the pair.
pub fn load_tls_config(cert_path: &Path, key_path: &Path) -> Result<Arc<ServerConfig>, GatewayError> {
    let certs = load_certs(cert_path)?;
    let key = load_key(key_path)?;

    let mut config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()?
        .with_no_client_auth()
        .with_single_cert(certs, key)?;
    config.alpn_protocols = vec![b"http/1.1".to_vec()];

    info!("loaded TLS certificate {}", cert_path.display());
    Ok(Arc::new(config))
}

fn open(path: &Path) -> Result<BufReader<File>, GatewayError> {
    File::open(path)
        .map(BufReader::new)
        .map_err(|e| GatewayError::Tls {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
}

fn load_certs(path: &Path) -> Result<Vec<CertificateDer<'static>>, GatewayError> {
    let mut reader = open(path)?;
    let certs = rustls_pemfile::certs(&mut reader)
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| GatewayError::Tls {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if certs.is_empty() {
        return Err(GatewayError::Tls {
            path: path.to_path_buf(),
            reason: "no certificate found".to_string(),
        });
    }
    Ok(certs)
}

fn load_key(path: &Path) -> Result<PrivateKeyDer<'static>, GatewayError> {
    let mut reader = open(path)?;
    rustls_pemfile::private_key(&mut reader)
        .map_err(|e| GatewayError::Tls {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?
        .ok_or_else(|| GatewayError::Tls {
            path: path.to_path_buf(),
            reason: "no private key found".to_string(),
        })
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Resolution of the `Authorization` header into a [`Principal`].
//!
//! Two schemes are accepted:
//!
//! ```text
//! Authorization: Bearer <token>                    → Authenticator::verify_token
//! Authorization: Basic <base64(name:password)>     → Authenticator::verify_password
//! ```
//!
//! Every failure (missing header, unknown scheme, undecodable payload, wrong
//! password, unknown token) is an [`AuthError`].  The HTTP layer maps all of
//! them to the same generic 400 reply so a client can never learn which
//! check failed.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use homegw_core::Principal;
use thiserror::Error;

/// Why authentication failed.  Only ever logged, never sent to the client.
#[derive(Debug, Error, PartialEq)]
pub enum AuthError {
    #[error("missing Authorization header")]
    MissingHeader,
    #[error("unsupported authorization scheme")]
    UnknownScheme,
    #[error("malformed credentials")]
    Malformed,
    #[error("invalid credentials")]
    BadCredentials,
    #[error("unknown or expired token")]
    UnknownToken,
}

/// The credential authority consulted by HTTP sessions.
///
/// Infrastructure never implements business rules itself; it asks this trait.
/// [`CredentialStore`](super::CredentialStore) is the shipped implementation.
#[async_trait]
pub trait Authenticator: Send + Sync {
    /// Resolves a bearer token previously issued by [`issue_token`](Self::issue_token).
    async fn verify_token(&self, token: &str) -> Result<Principal, AuthError>;

    /// Checks a name/password pair.
    async fn verify_password(&self, name: &str, password: &str) -> Result<Principal, AuthError>;

    /// Mints an opaque token bound to `principal`.
    async fn issue_token(&self, principal: &Principal) -> Result<String, AuthError>;
}

/// Resolves an `Authorization` header value through `authenticator`.
///
/// # Errors
///
/// Returns [`AuthError`] for any missing, malformed or rejected credentials.
pub async fn resolve_authorization(
    header: Option<&str>,
    authenticator: &dyn Authenticator,
) -> Result<Principal, AuthError> {
    let header = header.ok_or(AuthError::MissingHeader)?.trim();
    let (scheme, payload) = header.split_once(' ').ok_or(AuthError::Malformed)?;
    let payload = payload.trim();

    if scheme.eq_ignore_ascii_case("Bearer") {
        if payload.is_empty() {
            return Err(AuthError::Malformed);
        }
        authenticator.verify_token(payload).await
    } else if scheme.eq_ignore_ascii_case("Basic") {
        let (name, password) = decode_basic(payload)?;
        authenticator.verify_password(&name, &password).await
    } else {
        Err(AuthError::UnknownScheme)
    }
}

/// Decodes `base64(name:password)`, splitting on the first `:`.
fn decode_basic(payload: &str) -> Result<(String, String), AuthError> {
    let raw = STANDARD.decode(payload).map_err(|_| AuthError::Malformed)?;
    let text = String::from_utf8(raw).map_err(|_| AuthError::Malformed)?;
    let (name, password) = text.split_once(':').ok_or(AuthError::Malformed)?;
    Ok((name.to_string(), password.to_string()))
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Reply construction and upgrade checks for the gateway's REST surface.
//!
//! Request parsing and response framing belong to the HTTP connection in the
//! server crate.  This module only knows the shapes the gateway speaks, as
//! plain [`http`] types:
//!
//! ```text
//! 200 application/json        {"pong":true}
//! 400 application/json        {"error":"authentication failed"}   Connection: close
//! 101 Switching Protocols     Upgrade: websocket, Sec-WebSocket-Accept: ...
//! ```
//!
//! The request head is limited to [`MAX_HEAD_BYTES`] and the body to
//! [`MAX_BODY_BYTES`]; the connection enforces both.

use bytes::Bytes;
use http::header::{self, AsHeaderName, HeaderMap, HeaderValue};
use http::{Method, Response, StatusCode};
use serde_json::Value;

/// Upper bound on the request line plus headers.
pub const MAX_HEAD_BYTES: usize = 16 * 1024;

/// Upper bound on a request body.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const JSON: &str = "application/json";
const HTML: &str = "text/html; charset=utf-8";
const TEXT: &str = "text/plain; charset=utf-8";

// ── Request inspection ────────────────────────────────────────────────────────

/// Returns `true` if any `name` header carries `token` in its comma-separated
/// list (case-insensitive).
pub fn header_has_token<K: AsHeaderName>(headers: &HeaderMap, name: K, token: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .any(|part| part.trim().eq_ignore_ascii_case(token))
}

/// Returns the `Sec-WebSocket-Key` when the request is a valid version-13
/// WebSocket upgrade, `None` otherwise.
///
/// # Examples
///
/// ```rust
/// use homegw_core::protocol::http::websocket_key;
/// use http::{HeaderMap, Method};
///
/// let mut headers = HeaderMap::new();
/// headers.insert("upgrade", "websocket".parse().unwrap());
/// headers.insert("connection", "keep-alive, Upgrade".parse().unwrap());
/// headers.insert("sec-websocket-version", "13".parse().unwrap());
/// headers.insert("sec-websocket-key", "dGhlIHNhbXBsZSBub25jZQ==".parse().unwrap());
///
/// assert_eq!(websocket_key(&Method::GET, &headers), Some("dGhlIHNhbXBsZSBub25jZQ=="));
/// assert_eq!(websocket_key(&Method::POST, &headers), None);
/// ```
pub fn websocket_key<'a>(method: &Method, headers: &'a HeaderMap) -> Option<&'a str> {
    let upgrade = header_has_token(headers, header::UPGRADE, "websocket");
    let connection = header_has_token(headers, header::CONNECTION, "upgrade");
    let version = headers
        .get(header::SEC_WEBSOCKET_VERSION)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.trim() == "13");
    if !(upgrade && connection && version && method == Method::GET) {
        return None;
    }
    headers
        .get(header::SEC_WEBSOCKET_KEY)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|key| !key.is_empty())
}

// ── Replies ───────────────────────────────────────────────────────────────────

/// A reply with an arbitrary body and content type.
pub fn reply(status: StatusCode, content_type: &str, body: impl Into<Bytes>) -> Response<Bytes> {
    let mut resp = Response::new(body.into());
    *resp.status_mut() = status;
    let content_type = HeaderValue::from_str(content_type)
        .unwrap_or(HeaderValue::from_static("application/octet-stream"));
    resp.headers_mut().insert(header::CONTENT_TYPE, content_type);
    resp
}

/// A JSON reply.
pub fn json(status: StatusCode, value: &Value) -> Response<Bytes> {
    reply(status, JSON, value.to_string())
}

/// An HTML reply.
pub fn html(status: StatusCode, body: &str) -> Response<Bytes> {
    reply(status, HTML, body.to_string())
}

/// A plain-text reply.
pub fn text(status: StatusCode, body: &str) -> Response<Bytes> {
    reply(status, TEXT, body.to_string())
}

/// The uniform request-level error: `400 {"error": message}` with
/// `Connection: close`.
pub fn error(message: &str) -> Response<Bytes> {
    let mut resp = json(StatusCode::BAD_REQUEST, &serde_json::json!({ "error": message }));
    resp.headers_mut()
        .insert(header::CONNECTION, HeaderValue::from_static("close"));
    resp
}

/// The `101 Switching Protocols` reply completing a WebSocket upgrade.
///
/// Falls back to [`error`] if `accept_key` is not a legal header value,
/// which a derived accept key never is.
pub fn switching_protocols(accept_key: &str) -> Response<Bytes> {
    let Ok(accept) = HeaderValue::from_str(accept_key) else {
        return error("invalid upgrade request");
    };
    let mut resp = Response::new(Bytes::new());
    *resp.status_mut() = StatusCode::SWITCHING_PROTOCOLS;
    let headers = resp.headers_mut();
    headers.insert(header::UPGRADE, HeaderValue::from_static("websocket"));
    headers.insert(header::CONNECTION, HeaderValue::from_static("Upgrade"));
    headers.insert(header::SEC_WEBSOCKET_ACCEPT, accept);
    resp
}

/// Whether the reply ends the connection once written.
pub fn closes_connection<B>(resp: &Response<B>) -> bool {
    header_has_token(resp.headers(), header::CONNECTION, "close")
}

// ── Tests ─────────────────────────────────────────────────────────────────────

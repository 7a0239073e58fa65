//! HTTP session: the per-connection REST surface.
//!
//! # States
//!
//! ```text
//! AwaitingRequest ──▶ Parsed ──▶ Authenticating ──▶ Handling ──▶ Writing
//!        ▲                                                         │
//!        └────────────── keep-alive ◀──────────────────────────────┤
//!                                                                  ▼
//!                                                    ShuttingDown ──▶ Closed
//! ```
//!
//! hyper's HTTP/1 connection owns parsing, framing and keep-alive; this
//! module routes each request.  The transport sits inside a
//! [`DeadlineStream`], so a read stalled past the idle deadline (12 s by
//! default) or a write the peer never drains ends the connection.  The
//! request head is capped at [`MAX_HEAD_BYTES`] and the body at
//! [`MAX_BODY_BYTES`].
//!
//! # Routes (prefix match, first match wins)
//!
//! | Prefix  | Auth | Behaviour                                            |
//! |---------|------|------------------------------------------------------|
//! | `/res/` | yes  | delegated to the [`ResourceHandler`](crate::application::ResourceHandler) |
//! | `/auth` | yes  | `200 {"token": "..."}`                               |
//! | `/ws`   | yes  | `101`, then the stream moves into a [`ChannelSession`] |
//! | `/ping` | no   | fixed JSON                                           |
//! | `/help` | no   | diagnostic text                                      |
//! | *other* | no   | static asset, else fixed 404 page                    |
//!
//! Every authentication failure produces the same `400 {"error":
//! "authentication failed"}`; which check failed is only logged.
//!
//! # Upgrade hand-off
//!
//! The `/ws` route parks the authenticated principal and hyper's upgrade
//! future in a slot and answers `101`.  Once hyper releases the connection,
//! [`HttpSession::run`] takes the slot back, unwraps the transport and the
//! bytes hyper had already buffered, and hands both to a [`ChannelSession`]
//! on the same task.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use bytes::Bytes;
use homegw_core::protocol::http as reply;
use homegw_core::{Principal, MAX_BODY_BYTES, MAX_HEAD_BYTES};
use http_body_util::{BodyExt, Full, Limited};
use hyper::body::Incoming;
use hyper::header::{HeaderMap, AUTHORIZATION};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::upgrade::OnUpgrade;
use hyper::{Method, Request, Response, StatusCode};
use hyper_util::rt::{TokioIo, TokioTimer};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_tungstenite::tungstenite::handshake::derive_accept_key;
use tracing::{debug, info, warn};

use super::channel_session::ChannelSession;
use super::context::GatewayContext;
use super::deadline_io::{DeadlineStream, Deadlines};
use crate::application::{resolve_authorization, ResourceRequest};

/// Body substituted when a resource handler returns zero bytes.
pub const EMPTY_BODY_FILLER: &[u8] = b"{}";

/// The generic error text for every authentication failure.
pub const AUTH_FAILED: &str = "authentication failed";

const NOT_FOUND_HTML: &str = "<!DOCTYPE html>\n<html><head><title>404 Not Found</title></head>\
<body><h1>404 Not Found</h1><p>The requested resource does not exist.</p></body></html>\n";

/// A `/ws` request that was answered with `101`.
struct PendingUpgrade {
    principal: Principal,
    on_upgrade: OnUpgrade,
}

/// One accepted (and, in production, TLS-wrapped) connection.
pub struct HttpSession<S> {
    stream: S,
    peer: SocketAddr,
    ctx: Arc<GatewayContext>,
}

impl<S> HttpSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    pub fn new(stream: S, peer: SocketAddr, ctx: Arc<GatewayContext>) -> Self {
        Self { stream, peer, ctx }
    }

    /// Serves requests until the connection closes or is upgraded.
    pub async fn run(self) {
        let Self { stream, peer, ctx } = self;
        let timeouts = ctx.timeouts;
        let io = TokioIo::new(DeadlineStream::new(
            stream,
            Deadlines {
                read: timeouts.http_idle,
                write: timeouts.http_idle,
                shutdown: timeouts.shutdown_stage,
            },
        ));

        let router = Arc::new(Router {
            peer,
            ctx: Arc::clone(&ctx),
            upgrade: Mutex::new(None),
        });
        let service = {
            let router = Arc::clone(&router);
            service_fn(move |request| {
                let router = Arc::clone(&router);
                async move { Ok::<_, Infallible>(router.route(request).await) }
            })
        };

        let served = http1::Builder::new()
            .timer(TokioTimer::new())
            .header_read_timeout(timeouts.http_idle)
            .max_buf_size(MAX_HEAD_BYTES)
            .serve_connection(io, service)
            .with_upgrades()
            .await;
        if let Err(e) = served {
            debug!("{peer}: connection ended: {e}");
        }

        match router.take_upgrade() {
            Some(pending) => Self::upgrade(pending, peer, ctx).await,
            None => debug!("{peer}: connection closed"),
        }
    }

    /// Moves an upgraded connection into a [`ChannelSession`].
    async fn upgrade(pending: PendingUpgrade, peer: SocketAddr, ctx: Arc<GatewayContext>) {
        let upgraded = match pending.on_upgrade.await {
            Ok(upgraded) => upgraded,
            Err(e) => {
                debug!("{peer}: upgrade failed: {e}");
                return;
            }
        };
        let parts = match upgraded.downcast::<TokioIo<DeadlineStream<S>>>() {
            Ok(parts) => parts,
            Err(_) => {
                warn!("{peer}: upgraded connection has an unexpected transport");
                return;
            }
        };
        let stream = parts.io.into_inner().into_inner();
        let channel =
            ChannelSession::accept(stream, parts.read_buf.to_vec(), pending.principal, peer, ctx)
                .await;
        channel.run().await;
    }
}

// ── Routing ───────────────────────────────────────────────────────────────────

/// Per-connection request handler shared with hyper's service.
struct Router {
    peer: SocketAddr,
    ctx: Arc<GatewayContext>,
    upgrade: Mutex<Option<PendingUpgrade>>,
}

impl Router {
    fn take_upgrade(&self) -> Option<PendingUpgrade> {
        self.upgrade
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    async fn route(&self, request: Request<Incoming>) -> Response<Full<Bytes>> {
        debug!("{}: {} {}", self.peer, request.method(), request.uri().path());
        let path = request.uri().path().to_string();
        let response = if path == "/res" || path.starts_with("/res/") {
            self.handle_resource(request).await
        } else if path.starts_with("/auth") {
            self.handle_auth(request.headers()).await
        } else if path.starts_with("/ws") {
            self.handle_upgrade(request).await
        } else if path.starts_with("/ping") {
            reply::json(StatusCode::OK, &json!({ "pong": true }))
        } else if path.starts_with("/help") {
            reply::text(StatusCode::OK, &self.ctx.help_text())
        } else {
            self.handle_static(request.method(), &path).await
        };
        response.map(Full::new)
    }

    async fn authenticate(&self, headers: &HeaderMap) -> Option<Principal> {
        let header = headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok());
        match resolve_authorization(header, self.ctx.authenticator.as_ref()).await {
            Ok(principal) => Some(principal),
            Err(e) => {
                warn!("{}: {AUTH_FAILED}: {e}", self.peer);
                None
            }
        }
    }

    async fn handle_resource(&self, request: Request<Incoming>) -> Response<Bytes> {
        let Some(principal) = self.authenticate(request.headers()).await else {
            return reply::error(AUTH_FAILED);
        };
        let (parts, body) = request.into_parts();
        let body = match Limited::new(body, MAX_BODY_BYTES).collect().await {
            Ok(collected) => collected.to_bytes(),
            Err(e) => {
                warn!("{}: unreadable request body: {e}", self.peer);
                return reply::error("invalid request body");
            }
        };

        let path = parts.uri.path();
        let rest = path.strip_prefix("/res").unwrap_or(path).trim_start_matches('/');
        let resource = ResourceRequest {
            method: parts.method.as_str().to_ascii_uppercase(),
            path: rest.to_string(),
            query: parts.uri.query().map(str::to_string),
            body: body.to_vec(),
        };

        match self.ctx.resources.handle(&principal, resource).await {
            Ok(out) => {
                let status = StatusCode::from_u16(out.status)
                    .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
                if out.body.is_empty() {
                    reply::reply(status, "application/json", EMPTY_BODY_FILLER)
                } else {
                    reply::reply(status, &out.content_type, out.body)
                }
            }
            Err(e) => {
                debug!("{}: resource error: {e}", self.peer);
                reply::error(&e.to_string())
            }
        }
    }

    async fn handle_auth(&self, headers: &HeaderMap) -> Response<Bytes> {
        let Some(principal) = self.authenticate(headers).await else {
            return reply::error(AUTH_FAILED);
        };
        match self.ctx.authenticator.issue_token(&principal).await {
            Ok(token) => {
                info!("{}: issued token for {}", self.peer, principal.name);
                reply::json(StatusCode::OK, &json!({ "token": token }))
            }
            Err(e) => {
                warn!("{}: token issue failed: {e}", self.peer);
                reply::error(AUTH_FAILED)
            }
        }
    }

    async fn handle_upgrade(&self, mut request: Request<Incoming>) -> Response<Bytes> {
        let Some(key) = reply::websocket_key(request.method(), request.headers()) else {
            return reply::error("invalid upgrade request");
        };
        let accept_key = derive_accept_key(key.as_bytes());
        let Some(principal) = self.authenticate(request.headers()).await else {
            return reply::error(AUTH_FAILED);
        };
        let on_upgrade = hyper::upgrade::on(&mut request);
        *self.upgrade.lock().unwrap_or_else(PoisonError::into_inner) = Some(PendingUpgrade {
            principal,
            on_upgrade,
        });
        reply::switching_protocols(&accept_key)
    }

    async fn handle_static(&self, method: &Method, path: &str) -> Response<Bytes> {
        if method == Method::GET {
            if let Some(asset) = self.ctx.assets.lookup(path).await {
                return reply::reply(StatusCode::OK, &asset.content_type, asset.body);
            }
        }
        reply::html(StatusCode::NOT_FOUND, NOT_FOUND_HTML)
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

//! Channel session: the long-lived JSON channel over WebSocket framing.
//!
//! # Lifecycle
//!
//! ```text
//! Accepting ──▶ Open ──▶ Closing ──▶ ShuttingDownTLS ──▶ Closed
//!   │             │         │               │
//!   │ register    │ read /  │ close frame   │ TLS close_notify
//!   │ (weak)      │ dispatch│ (≤ 6 s)       │ (≤ 6 s), then drop
//! ```
//!
//! # One task, one lane
//!
//! Each session runs as a single Tokio task, so nothing in it ever executes
//! concurrently with anything else in it.  The task multiplexes two sources
//! with `tokio::select!`:
//!
//! - the outbound queue (`mpsc`) fed by [`SessionHandle::send`], which both
//!   command responses and broadcasts go through, and
//! - the next inbound frame.
//!
//! A queued buffer is written *inside* its select branch and awaited to
//! completion before the loop polls either source again.  That is what keeps
//! at most one write outstanding and preserves FIFO order across responses
//! and broadcasts: there is exactly one writer and one queue.
//!
//! That one write still races the shutdown signal and carries its own
//! deadline (`channel_write`, 12 s by default).  A peer that stops reading
//! therefore ends its session as `Broken` instead of pinning the task, and a
//! peer that lets the bounded queue overflow is closed with 1008.
//!
//! # Faults
//!
//! A binary frame, invalid UTF-8, or a text message that is not a well-formed
//! request envelope closes the session with code 1007 and a reason starting
//! with `"bad payload"`.  No response is sent for the offending message.  An
//! unknown command is *not* a fault; it is answered with a `nack`.

use std::borrow::Cow;
use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use homegw_core::protocol::envelope::BAD_PAYLOAD_REASON;
use homegw_core::{ChannelRequest, Principal, ProtocolViolation};
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::protocol::frame::coding::CloseCode;
use tokio_tungstenite::tungstenite::protocol::{CloseFrame, Role, WebSocketConfig};
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tokio_tungstenite::WebSocketStream;
use tracing::{debug, info, warn};

use super::context::GatewayContext;
use crate::application::{SessionHandle, SessionState};

/// Largest complete (reassembled) message accepted from a client.
pub const MAX_MESSAGE_BYTES: usize = 1024 * 1024;

/// Close reasons are limited to 123 bytes by RFC 6455.
const MAX_CLOSE_REASON: usize = 123;

/// How the read loop ended.
#[derive(Debug)]
enum Exit {
    /// Send this close frame, then shut TLS down.
    Close(CloseFrame<'static>),
    /// The peer closed; flush our close reply, then shut TLS down.
    PeerClosed,
    /// The transport failed; skip the close frame.
    Broken,
}

/// One upgraded connection.
pub struct ChannelSession<S> {
    ws: WebSocketStream<S>,
    handle: Arc<SessionHandle>,
    outbound: mpsc::Receiver<String>,
    ctx: Arc<GatewayContext>,
}

impl<S> ChannelSession<S>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Completes the `Accepting` state.
    ///
    /// The caller has already written the `101` reply.  `leftover` holds any
    /// bytes the client sent after its upgrade request; they are the start of
    /// the first WebSocket frame and are fed to the framer before the socket.
    /// The new session is registered for broadcasts before this returns.
    pub async fn accept(
        stream: S,
        leftover: Vec<u8>,
        principal: Principal,
        peer: SocketAddr,
        ctx: Arc<GatewayContext>,
    ) -> Self {
        let mut config = WebSocketConfig::default();
        config.max_message_size = Some(MAX_MESSAGE_BYTES);
        config.max_frame_size = Some(MAX_MESSAGE_BYTES);

        let ws =
            WebSocketStream::from_partially_read(stream, leftover, Role::Server, Some(config)).await;
        let (handle, outbound) = SessionHandle::new(principal, peer);
        ctx.registry.register(&handle);
        info!(
            "channel {} open for {} ({}) from {peer}",
            handle.id(),
            handle.principal().name,
            handle.principal().level.as_str()
        );

        Self {
            ws,
            handle,
            outbound,
            ctx,
        }
    }

    /// The handle other code uses to reach this session.
    pub fn handle(&self) -> &Arc<SessionHandle> {
        &self.handle
    }

    /// Runs the session until it is closed.
    pub async fn run(mut self) {
        let exit = self.serve().await;
        self.shutdown(exit).await;
    }

    /// The `Open` state: writes queued buffers and dispatches requests.
    async fn serve(&mut self) -> Exit {
        let shutdown = self.ctx.shutdown.clone();
        let stop = shutdown.wait();
        tokio::pin!(stop);

        loop {
            if self.handle.state() != SessionState::Open {
                return Exit::Close(CloseFrame {
                    code: CloseCode::Policy,
                    reason: Cow::Borrowed("send queue overflow"),
                });
            }

            tokio::select! {
                biased;

                Some(text) = self.outbound.recv() => {
                    let id = self.handle.id();
                    let limit = self.ctx.timeouts.channel_write;
                    tokio::select! {
                        biased;

                        _ = &mut stop => return going_away(),

                        written = timeout(limit, self.ws.send(Message::Text(text))) => match written {
                            Ok(Ok(())) => {}
                            Ok(Err(e)) => {
                                debug!("channel {id} write failed: {e}");
                                return Exit::Broken;
                            }
                            Err(_) => {
                                warn!("channel {id} write stalled for {limit:?}, dropping peer");
                                return Exit::Broken;
                            }
                        },
                    }
                }

                frame = self.ws.next() => {
                    if let Some(exit) = self.on_frame(frame) {
                        return exit;
                    }
                }

                _ = &mut stop => return going_away(),
            }
        }
    }

    /// Handles one inbound frame; `Some` ends the `Open` state.
    fn on_frame(&self, frame: Option<Result<Message, WsError>>) -> Option<Exit> {
        let id = self.handle.id();
        match frame {
            None => {
                debug!("channel {id}: peer went away");
                Some(Exit::Broken)
            }
            Some(Ok(Message::Text(text))) => match ChannelRequest::parse(&text) {
                Ok(request) => {
                    let response =
                        self.ctx
                            .commands
                            .dispatch(self.handle.principal(), &request, &self.handle);
                    self.handle.send(response.to_text());
                    None
                }
                Err(violation) => Some(bad_payload(id, &violation)),
            },
            Some(Ok(Message::Binary(_) | Message::Frame(_))) => {
                Some(bad_payload(id, &ProtocolViolation::NonTextFrame))
            }
            // The framer answers pings itself.
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => None,
            Some(Ok(Message::Close(frame))) => {
                debug!("channel {id}: peer closed ({frame:?})");
                Some(Exit::PeerClosed)
            }
            Some(Err(WsError::Utf8)) => Some(bad_payload(id, &ProtocolViolation::InvalidUtf8)),
            Some(Err(e @ (WsError::Protocol(_) | WsError::Capacity(_)))) => {
                warn!("channel {id}: framing error: {e}");
                Some(Exit::Close(CloseFrame {
                    code: CloseCode::Invalid,
                    reason: Cow::Owned(close_reason(&format!("{BAD_PAYLOAD_REASON}: {e}"))),
                }))
            }
            Some(Err(e)) => {
                debug!("channel {id}: read failed: {e}");
                Some(Exit::Broken)
            }
        }
    }

    /// `Closing` → `ShuttingDownTLS` → `Closed`.  Each stage has its own
    /// deadline and a failed stage never stops the next one.
    async fn shutdown(mut self, exit: Exit) {
        let id = self.handle.id();
        let stage = self.ctx.timeouts.shutdown_stage;
        self.handle.set_state(SessionState::Closing);

        let frame = match exit {
            Exit::Close(frame) => Some(Some(frame)),
            Exit::PeerClosed => Some(None),
            Exit::Broken => None,
        };
        if let Some(frame) = frame {
            match timeout(stage, self.ws.close(frame)).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => debug!("channel {id}: close frame failed: {e}"),
                Err(_) => debug!("channel {id}: close frame timed out"),
            }
        }

        match timeout(stage, self.ws.get_mut().shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("channel {id}: transport shutdown failed: {e}"),
            Err(_) => debug!("channel {id}: transport shutdown timed out"),
        }

        self.handle.set_state(SessionState::Closed);
        info!("channel {id} closed");
    }
}

fn going_away() -> Exit {
    Exit::Close(CloseFrame {
        code: CloseCode::Away,
        reason: Cow::Borrowed("server shutting down"),
    })
}

fn bad_payload(id: uuid::Uuid, violation: &ProtocolViolation) -> Exit {
    warn!("channel {id}: {violation}");
    Exit::Close(CloseFrame {
        code: CloseCode::Invalid,
        reason: Cow::Owned(close_reason(&format!("{BAD_PAYLOAD_REASON}: {violation}"))),
    })
}

/// Truncates `reason` to the close-frame limit on a char boundary.
fn close_reason(reason: &str) -> String {
    if reason.len() <= MAX_CLOSE_REASON {
        return reason.to_string();
    }
    let mut end = MAX_CLOSE_REASON;
    while !reason.is_char_boundary(end) {
        end -= 1;
    }
    reason[..end].to_string()
}

// ── Tests ─────────────────────────────────────────────────────────────────────

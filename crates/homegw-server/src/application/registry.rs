//! Session registry and broadcast fan-out.
//!
//! Every open channel session owns an `Arc<SessionHandle>`; the registry keeps
//! only `Weak` references to those handles.  A session's lifetime is therefore
//! governed by its own connection, never by the registry.
//!
//! ```text
//! ChannelSession task ──owns──▶ Arc<SessionHandle> ◀──weak── SessionRegistry
//!         ▲                             │
//!         └────── outbound queue ◀──────┘  send() / broadcast()
//! ```
//!
//! # Locking
//!
//! The registry's mutex guards the `Vec<Weak<_>>` only.  `broadcast` upgrades
//! the live entries and prunes the dead ones while holding the lock, releases
//! it, and only then calls [`SessionHandle::send`] on each session.  No lock
//! is ever held across a call into session code, so a command handler may
//! call `broadcast` from inside its own session without deadlocking.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex, Weak};

use homegw_core::{Principal, PushEvent};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace, warn};
use uuid::Uuid;

/// Buffers a session may have queued before it counts as stalled.
pub const OUTBOUND_QUEUE_LIMIT: usize = 1024;

/// Liveness of a channel session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Reading requests, accepting sends.
    Open = 0,
    /// Shutdown in progress (or the queue overflowed); sends are refused.
    Closing = 1,
    /// Socket closed.
    Closed = 2,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            0 => SessionState::Open,
            1 => SessionState::Closing,
            _ => SessionState::Closed,
        }
    }
}

/// The only way code outside a channel session may reach it.
///
/// A handle carries the session's immutable principal and the producer side
/// of its outbound FIFO queue.  [`send`](Self::send) never blocks and never
/// touches the socket: the session's own task drains the queue and keeps at
/// most one write outstanding.
#[derive(Debug)]
pub struct SessionHandle {
    id: Uuid,
    principal: Principal,
    peer: SocketAddr,
    state: AtomicU8,
    outbound: mpsc::Sender<String>,
}

impl SessionHandle {
    /// Creates a handle and the receiver its session drains.
    pub fn new(principal: Principal, peer: SocketAddr) -> (Arc<Self>, mpsc::Receiver<String>) {
        let (tx, rx) = mpsc::channel(OUTBOUND_QUEUE_LIMIT);
        let handle = Arc::new(Self {
            id: Uuid::new_v4(),
            principal,
            peer,
            state: AtomicU8::new(SessionState::Open as u8),
            outbound: tx,
        });
        (handle, rx)
    }

    /// Unique id used in log lines.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// The principal established at upgrade time.
    pub fn principal(&self) -> &Principal {
        &self.principal
    }

    /// Remote address of the connection.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Current liveness state.
    pub fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Moves the session to `state`.  Only the owning session calls this;
    /// [`send`](Self::send) itself only ever moves `Open` to `Closing`.
    pub fn set_state(&self, state: SessionState) {
        self.state.store(state as u8, Ordering::Release);
    }

    /// Appends one serialized text buffer to the outbound queue.
    ///
    /// Buffers reach the wire in call order.  Returns `false` (and drops the
    /// buffer) once the session has left [`SessionState::Open`].
    ///
    /// A peer that lets [`OUTBOUND_QUEUE_LIMIT`] buffers pile up is not
    /// reading: the buffer is dropped and the session moves to
    /// [`SessionState::Closing`], which its own task turns into a close.
    pub fn send(&self, text: String) -> bool {
        if self.state() != SessionState::Open {
            return false;
        }
        match self.outbound.try_send(text) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) => {
                warn!("session {} send queue overflow, closing", self.id);
                self.set_state(SessionState::Closing);
                false
            }
            Err(TrySendError::Closed(_)) => false,
        }
    }
}

/// Process-wide set of weakly referenced channel sessions.
///
/// Construct one at startup and share it behind an `Arc`.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: Mutex<Vec<Weak<SessionHandle>>>,
}

impl SessionRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a session.  Called once per session, right after the
    /// upgrade handshake completed.
    pub fn register(&self, handle: &Arc<SessionHandle>) {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        sessions.push(Arc::downgrade(handle));
        debug!(
            "registered session {} ({} entries)",
            handle.id(),
            sessions.len()
        );
    }

    /// Serializes `event` once and queues it on every open session.
    ///
    /// Returns the number of sessions that accepted the event.  With no
    /// registered sessions this is a no-op returning `0`.
    pub fn broadcast(&self, event: &PushEvent) -> usize {
        let text = event.to_text();
        trace!("broadcast {}", event.name());
        self.broadcast_text(&text)
    }

    /// Queues an already serialized event on every open session.
    pub fn broadcast_text(&self, text: &str) -> usize {
        let targets = self.live_sessions();
        targets
            .iter()
            .filter(|session| session.send(text.to_string()))
            .count()
    }

    /// Number of registered sessions that are still alive.
    pub fn len(&self) -> usize {
        self.live_sessions().len()
    }

    /// Returns `true` when no live session is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Upgrades live entries and prunes expired ones in place.
    ///
    /// The lock is released before the caller touches any session.
    fn live_sessions(&self) -> Vec<Arc<SessionHandle>> {
        let mut sessions = self
            .sessions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut live = Vec::with_capacity(sessions.len());
        sessions.retain(|weak| match weak.upgrade() {
            Some(strong) => {
                live.push(strong);
                true
            }
            None => false,
        });
        live
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

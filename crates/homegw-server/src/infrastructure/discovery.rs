//! UDP discovery responder.
//!
//! Control panels on the LAN find the gateway by broadcasting any datagram to
//! the discovery port (default 20801).  Every datagram is answered with one
//! unicast JSON reply to its sender:
//!
//! ```text
//! {"key": "<base64 SHA-256 of the query>", "name": "homegw", "ext": "hub.example.net:8443"}
//! ```
//!
//! The responder is stateless: no ordering, no retries, no per-client state.
//! Note that `key` is derived from the query bytes, so it is *not* a stable
//! per-node identifier; clients must not treat it as one.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::net::UdpSocket;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::error::GatewayError;
use super::shutdown::Shutdown;

/// Largest query we read; longer datagrams are truncated by the kernel.
const MAX_QUERY_BYTES: usize = 2048;

/// Pause after a failed receive, so a persistent socket error cannot spin.
pub const RECV_ERROR_BACKOFF: Duration = Duration::from_millis(100);

/// The datagram operations the responder needs.
#[async_trait]
pub trait BeaconSocket: Send + Sync {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)>;
    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize>;
}

#[async_trait]
impl BeaconSocket for UdpSocket {
    async fn recv_from(&self, buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
        UdpSocket::recv_from(self, buf).await
    }

    async fn send_to(&self, buf: &[u8], target: SocketAddr) -> io::Result<usize> {
        UdpSocket::send_to(self, buf, target).await
    }
}

/// Builds the reply for one query payload.
pub fn beacon_reply(payload: &[u8], name: &str, ext: &str) -> Value {
    let digest = Sha256::digest(payload);
    json!({
        "key": STANDARD.encode(digest),
        "name": name,
        "ext": ext,
    })
}

/// A bound, broadcast-enabled discovery socket.
#[derive(Debug)]
pub struct DiscoveryResponder {
    socket: UdpSocket,
    node_name: String,
    external: String,
}

impl DiscoveryResponder {
    /// Binds the discovery socket.
    ///
    /// # Errors
    ///
    /// [`GatewayError::Discovery`] when the socket cannot be bound or
    /// switched to broadcast mode.
    pub async fn bind(
        addr: SocketAddr,
        node_name: impl Into<String>,
        external: impl Into<String>,
    ) -> Result<Self, GatewayError> {
        let to_err = |source| GatewayError::Discovery { addr, source };
        let socket = UdpSocket::bind(addr).await.map_err(to_err)?;
        socket.set_broadcast(true).map_err(to_err)?;
        info!("discovery responder listening on UDP {addr}");
        Ok(Self {
            socket,
            node_name: node_name.into(),
            external: external.into(),
        })
    }

    /// The address actually bound (useful with port 0).
    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Answers queries until `shutdown` fires.
    pub async fn run(self, shutdown: Shutdown) {
        answer_queries(&self.socket, &self.node_name, &self.external, shutdown).await;
        info!("discovery responder stopped");
    }
}

/// The responder loop over any [`BeaconSocket`].
///
/// Send errors are logged and the next receive is re-armed; receive errors
/// are logged and followed by [`RECV_ERROR_BACKOFF`].
pub async fn answer_queries<S>(socket: &S, node_name: &str, external: &str, shutdown: Shutdown)
where
    S: BeaconSocket + ?Sized,
{
    let mut buf = vec![0u8; MAX_QUERY_BYTES];
    let stop = shutdown.wait();
    tokio::pin!(stop);
    loop {
        let received = tokio::select! {
            r = socket.recv_from(&mut buf) => r,
            _ = &mut stop => break,
        };

        let (len, src) = match received {
            Ok(pair) => pair,
            Err(e) => {
                warn!("discovery recv error: {e}");
                tokio::select! {
                    _ = sleep(RECV_ERROR_BACKOFF) => continue,
                    _ = &mut stop => break,
                }
            }
        };

        debug!("discovery query from {src} ({len} bytes)");
        let reply = beacon_reply(&buf[..len], node_name, external).to_string();
        if let Err(e) = socket.send_to(reply.as_bytes(), src).await {
            warn!("discovery reply to {src} failed: {e}");
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::shutdown::shutdown_channel;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// A socket whose every receive fails at once.
    #[derive(Default)]
    struct BrokenSocket {
        recv_calls: AtomicUsize,
    }

    #[async_trait]
    impl BeaconSocket for BrokenSocket {
        async fn recv_from(&self, _buf: &mut [u8]) -> io::Result<(usize, SocketAddr)> {
            self.recv_calls.fetch_add(1, Ordering::SeqCst);
            Err(io::ErrorKind::ConnectionReset.into())
        }

        async fn send_to(&self, _buf: &[u8], _target: SocketAddr) -> io::Result<usize> {
            unreachable!("nothing was received")
        }
    }

    #[test]
    fn test_reply_key_is_base64_sha256_of_payload() {
        // Arrange: SHA-256("") is a well-known constant
        let expected = "47DEQpj8HBSa+/TImW+5JCeuQeRkm5NMpJWZG3hSuFU=";

        // Act
        let reply = beacon_reply(b"", "homegw", "127.0.0.1:8443");

        // Assert
        assert_eq!(reply["key"], expected);
        assert_eq!(reply["name"], "homegw");
        assert_eq!(reply["ext"], "127.0.0.1:8443");
    }

    #[test]
    fn test_key_depends_on_query_bytes() {
        let a = beacon_reply(b"query-a", "n", "e");
        let b = beacon_reply(b"query-b", "n", "e");
        assert_ne!(a["key"], b["key"]);
    }

    #[tokio::test]
    async fn test_responder_answers_each_datagram_and_stops() {
        // Arrange
        let responder = DiscoveryResponder::bind("127.0.0.1:0".parse().unwrap(), "attic", "h:1")
            .await
            .unwrap();
        let target = responder.local_addr().unwrap();
        let (trigger, shutdown) = shutdown_channel();
        let task = tokio::spawn(responder.run(shutdown));
        let client = UdpSocket::bind("127.0.0.1:0").await.unwrap();

        // Act
        let mut replies = Vec::new();
        for query in [&b"one"[..], &b"two"[..]] {
            client.send_to(query, target).await.unwrap();
            let mut buf = [0u8; 512];
            let (n, _) = tokio::time::timeout(Duration::from_secs(5), client.recv_from(&mut buf))
                .await
                .unwrap()
                .unwrap();
            replies.push(serde_json::from_slice::<Value>(&buf[..n]).unwrap());
        }
        trigger.trigger();

        // Assert
        assert_eq!(replies[0], beacon_reply(b"one", "attic", "h:1"));
        assert_eq!(replies[1], beacon_reply(b"two", "attic", "h:1"));
        tokio::time::timeout(Duration::from_secs(5), task)
            .await
            .unwrap()
            .unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_receive_backs_off_instead_of_spinning() {
        // Arrange
        let socket = BrokenSocket::default();

        // Act: one second of (paused) time against a socket that always errors
        let result = tokio::time::timeout(
            Duration::from_secs(1),
            answer_queries(&socket, "n", "e", Shutdown::never()),
        )
        .await;

        // Assert: one attempt per backoff period, not thousands
        assert!(result.is_err(), "the loop only ends on shutdown");
        let calls = socket.recv_calls.load(Ordering::SeqCst);
        assert!((5..=11).contains(&calls), "{calls} receives in 1s");
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_interrupts_backoff() {
        let socket = BrokenSocket::default();
        let (trigger, shutdown) = shutdown_channel();
        trigger.trigger();

        tokio::time::timeout(
            Duration::from_millis(50),
            answer_queries(&socket, "n", "e", shutdown),
        )
        .await
        .unwrap();
    }
}

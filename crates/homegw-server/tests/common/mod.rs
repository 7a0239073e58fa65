//! Shared harness for the end-to-end tests: a real gateway on a loopback port
//! with a throwaway self-signed certificate, plus a TLS client that trusts it.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use futures_util::StreamExt;
use homegw_core::AccessLevel;
use serde_json::Value;
use tempfile::TempDir;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_rustls::client::TlsStream;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use homegw_server::domain::{GatewayConfig, UserEntry};
use homegw_server::infrastructure::{
    load_tls_config, shutdown_channel, GatewayContext, Listener, ShutdownTrigger,
};

pub type Channel = WebSocketStream<TlsStream<TcpStream>>;

/// A running gateway bound to `127.0.0.1:<ephemeral>`.
pub struct Gateway {
    pub addr: SocketAddr,
    pub ctx: Arc<GatewayContext>,
    connector: TlsConnector,
    trigger: ShutdownTrigger,
    task: JoinHandle<()>,
    _dir: TempDir,
}

impl Gateway {
    /// Generates a certificate, builds the production context and starts the
    /// accept loop.  Accounts: `admin/admin` (admin), `guest/guest` (guest).
    pub async fn start() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let generated = rcgen::generate_simple_self_signed(vec!["localhost".to_string()]).unwrap();
        let cert_path = dir.path().join("cert.pem");
        let key_path = dir.path().join("key.pem");
        std::fs::write(&cert_path, generated.cert.pem()).unwrap();
        std::fs::write(&key_path, generated.key_pair.serialize_pem()).unwrap();

        let mut config = GatewayConfig::default();
        config.users.push(UserEntry {
            name: "guest".to_string(),
            password: "guest".to_string(),
            level: AccessLevel::Guest,
        });

        let (trigger, shutdown) = shutdown_channel();
        let ctx = Arc::new(GatewayContext::from_config(&config, shutdown));
        let tls = load_tls_config(&cert_path, &key_path).unwrap();
        let listener = Listener::bind("127.0.0.1:0".parse().unwrap(), tls, Arc::clone(&ctx))
            .await
            .unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(listener.run());

        let mut roots = RootCertStore::empty();
        roots.add(generated.cert.der().clone()).unwrap();
        let client_config =
            ClientConfig::builder_with_provider(Arc::new(ring::default_provider()))
                .with_safe_default_protocol_versions()
                .unwrap()
                .with_root_certificates(roots)
                .with_no_client_auth();

        Self {
            addr,
            ctx,
            connector: TlsConnector::from(Arc::new(client_config)),
            trigger,
            task,
            _dir: dir,
        }
    }

    /// Opens a TLS connection to the gateway.
    pub async fn connect(&self) -> TlsStream<TcpStream> {
        let tcp = TcpStream::connect(self.addr).await.unwrap();
        let name = ServerName::try_from("localhost").unwrap();
        self.connector.connect(name, tcp).await.unwrap()
    }

    /// Opens a TLS connection and upgrades it to a channel with the given
    /// `Authorization` header value.
    pub async fn channel(&self, authorization: &str) -> Channel {
        let tls = self.connect().await;
        let mut request = "wss://localhost/ws".into_client_request().unwrap();
        request
            .headers_mut()
            .insert("Authorization", authorization.parse().unwrap());
        let (ws, response) = tokio_tungstenite::client_async(request, tls).await.unwrap();
        assert_eq!(response.status().as_u16(), 101);
        ws
    }

    /// Fires the shutdown signal and waits for the accept loop to return.
    pub async fn stop(self) {
        self.trigger.trigger();
        tokio::time::timeout(Duration::from_secs(5), self.task)
            .await
            .unwrap()
            .unwrap();
    }
}

pub fn basic(user: &str, pass: &str) -> String {
    format!("Basic {}", STANDARD.encode(format!("{user}:{pass}")))
}

/// One parsed HTTP response.
pub struct Reply {
    pub status: u16,
    pub head: String,
    pub body: Vec<u8>,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_slice(&self.body).unwrap()
    }

    /// First header named `name`; header names are matched case-insensitively.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.lines().skip(1).find_map(|line| {
            let (key, value) = line.split_once(':')?;
            key.trim()
                .eq_ignore_ascii_case(name)
                .then(|| value.trim())
        })
    }
}

/// Reads exactly one response, byte by byte through the head so nothing past
/// it is consumed.
pub async fn read_reply<R: AsyncRead + Unpin>(stream: &mut R) -> Reply {
    let mut head = Vec::new();
    while !head.ends_with(b"\r\n\r\n") {
        let mut byte = [0u8; 1];
        let n = stream.read(&mut byte).await.unwrap();
        assert_eq!(n, 1, "connection closed mid-head");
        head.push(byte[0]);
    }
    let head = String::from_utf8(head).unwrap();
    let status = head[9..12].parse().unwrap();
    let mut reply = Reply {
        status,
        head,
        body: Vec::new(),
    };
    let len = reply
        .header("content-length")
        .map(|v| v.parse().unwrap())
        .unwrap_or(0);
    reply.body = vec![0u8; len];
    stream.read_exact(&mut reply.body).await.unwrap();
    reply
}

/// Next text frame as JSON, with a deadline so a missing message fails the
/// test instead of hanging it.
pub async fn next_json(ws: &mut Channel) -> Value {
    let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("no frame within 5s")
        .expect("channel ended")
        .expect("channel error");
    match frame {
        Message::Text(text) => serde_json::from_str(&text).unwrap(),
        other => panic!("expected a text frame, got {other:?}"),
    }
}

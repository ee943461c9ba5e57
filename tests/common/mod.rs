#![allow(dead_code)]

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures_util::StreamExt;
use peer_relay::api;
use peer_relay::app_state::AppState;
use peer_relay::config::SessionLimits;
use peer_relay::domain::{DropPolicy, Hub, IdentitySource, SessionId};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

/// Client side of a relay connection.
pub type Client = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Issues `peer-1`, `peer-2`, ... in connection order.
#[derive(Debug, Default)]
pub struct SequentialIdentity {
    issued: AtomicU64,
}

impl IdentitySource for SequentialIdentity {
    fn next_id(&self) -> SessionId {
        let n = self.issued.fetch_add(1, Ordering::Relaxed) + 1;
        SessionId::from(format!("peer-{n}"))
    }
}

/// Starts a relay on an ephemeral port and returns its `host:port`.
pub async fn spawn_relay(limits: SessionLimits, static_dir: &Path) -> String {
    let state = AppState {
        hub: Hub::spawn(64, DropPolicy::Announce),
        identities: Arc::new(SequentialIdentity::default()),
        limits,
    };
    let app = api::build_app(state, static_dir);
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("local addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.expect("serve");
    });
    addr.to_string()
}

/// Starts a relay with default limits and no static files.
pub async fn spawn_default_relay() -> String {
    spawn_relay(SessionLimits::default(), Path::new("./does-not-exist")).await
}

/// Connects a client and returns it with the identity from its greeting.
pub async fn connect(addr: &str) -> (Client, String) {
    let (mut ws, _) = connect_async(format!("ws://{addr}/ws"))
        .await
        .expect("websocket connect");
    let greeting = next_json(&mut ws).await;
    assert_eq!(greeting["type"], "yourId", "first frame must be the greeting");
    let id = greeting["id"].as_str().expect("greeting id").to_string();
    (ws, id)
}

/// Returns the next text frame, skipping control frames.
pub async fn next_text(ws: &mut Client) -> String {
    loop {
        let frame = tokio::time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for a frame")
            .expect("stream ended")
            .expect("websocket error");
        match frame {
            Message::Text(text) => return text.as_str().to_string(),
            Message::Ping(_) | Message::Pong(_) => continue,
            other => panic!("unexpected frame: {other:?}"),
        }
    }
}

/// Returns the next text frame parsed as JSON.
pub async fn next_json(ws: &mut Client) -> serde_json::Value {
    let text = next_text(ws).await;
    serde_json::from_str(&text).expect("text frame is JSON")
}

/// Polls `/api/v1/sessions` until the hub holds exactly `count` sessions.
pub async fn wait_for_sessions(addr: &str, count: usize) {
    let url = format!("http://{addr}/api/v1/sessions");
    for _ in 0..100 {
        let body: serde_json::Value = reqwest::get(&url)
            .await
            .expect("GET sessions")
            .json()
            .await
            .expect("sessions JSON");
        if body["count"] == count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    panic!("hub never reached {count} sessions");
}

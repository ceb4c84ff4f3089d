use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use tokio::time;
use tokio_tungstenite::tungstenite;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};

use realtime_api::config::{service, Config};
use realtime_api::error::{AuthError, StoreError};
use realtime_api::gateway::bus::{self, BroadcastBus};
use realtime_api::gateway::registry::ConnectionRegistry;
use realtime_api::gateway::rooms::RoomMembership;
use realtime_api::identity::{IdentityProvider, Principal};
use realtime_api::metrics::RealtimeMetrics;
use realtime_api::store::{KeyValueStore, MemoryStore};
use realtime_api::AppState;

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Scriptable identity backend: tokens, collection access, and read
/// permissions are plain in-memory tables the tests mutate directly.
pub struct StubIdentity {
    tokens: Mutex<HashMap<String, Principal>>,
    collections: Mutex<HashMap<String, Vec<String>>>,
    readable: Mutex<HashSet<(String, String)>>,
    collections_down: Mutex<bool>,
}

impl StubIdentity {
    pub fn new() -> Self {
        Self {
            tokens: Mutex::new(HashMap::new()),
            collections: Mutex::new(HashMap::new()),
            readable: Mutex::new(HashSet::new()),
            collections_down: Mutex::new(false),
        }
    }

    /// Registers a token for `user_id` with read access to `collections`.
    pub fn add_user(&self, token: &str, user_id: &str, team_id: &str, collections: &[&str]) {
        self.tokens.lock().insert(
            token.to_string(),
            Principal {
                id: user_id.to_string(),
                team_id: team_id.to_string(),
            },
        );
        self.collections.lock().insert(
            user_id.to_string(),
            collections.iter().map(|c| c.to_string()).collect(),
        );
        let mut readable = self.readable.lock();
        for collection_id in collections {
            readable.insert((user_id.to_string(), collection_id.to_string()));
        }
    }

    pub fn grant_read(&self, user_id: &str, collection_id: &str) {
        self.readable
            .lock()
            .insert((user_id.to_string(), collection_id.to_string()));
    }

    pub fn revoke_read(&self, user_id: &str, collection_id: &str) {
        self.readable
            .lock()
            .remove(&(user_id.to_string(), collection_id.to_string()));
    }

    /// Makes every subsequent collection lookup fail.
    pub fn break_collection_lookups(&self) {
        *self.collections_down.lock() = true;
    }
}

#[async_trait]
impl IdentityProvider for StubIdentity {
    async fn resolve_token(&self, token: &str) -> Result<Principal, AuthError> {
        self.tokens
            .lock()
            .get(token)
            .cloned()
            .ok_or_else(|| AuthError::new("Invalid or expired token"))
    }

    async fn collection_ids(&self, user_id: &str) -> Result<Vec<String>, AuthError> {
        if *self.collections_down.lock() {
            return Err(AuthError::new("Collection lookup failed"));
        }
        Ok(self
            .collections
            .lock()
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn can_read_collection(
        &self,
        user_id: &str,
        collection_id: &str,
    ) -> Result<bool, AuthError> {
        Ok(self
            .readable
            .lock()
            .contains(&(user_id.to_string(), collection_id.to_string())))
    }
}

/// Store backend where every operation fails, as when the shared store is
/// unreachable.
pub struct FailingStore;

#[async_trait]
impl KeyValueStore for FailingStore {
    async fn set_ex(&self, _key: &str, _value: &str, _ttl_secs: u64) -> Result<(), StoreError> {
        Err(StoreError::new("store offline"))
    }

    async fn get(&self, _key: &str) -> Result<Option<String>, StoreError> {
        Err(StoreError::new("store offline"))
    }

    async fn del(&self, _key: &str) -> Result<(), StoreError> {
        Err(StoreError::new("store offline"))
    }
}

/// A running gateway bound to an ephemeral port.
pub struct TestServer {
    pub addr: SocketAddr,
    pub state: AppState,
}

/// Helper: start a gateway on 127.0.0.1 with its relay wired to `bus`.
/// Sharing one bus across several servers models a multi-process fleet.
pub async fn start_server(bus: Arc<dyn BroadcastBus>, identity: Arc<StubIdentity>) -> TestServer {
    start_server_with_store(bus, identity, Arc::new(MemoryStore::new())).await
}

/// Helper: like `start_server`, with the registry over a caller-chosen store.
pub async fn start_server_with_store(
    bus: Arc<dyn BroadcastBus>,
    identity: Arc<StubIdentity>,
    store: Arc<dyn KeyValueStore>,
) -> TestServer {
    let config = Arc::new(Config {
        api_url: "http://127.0.0.1:0".to_string(),
        services: vec![service::WEBSOCKETS.to_string()],
        port: 0,
    });
    let rooms = Arc::new(RoomMembership::new());
    let state = AppState {
        config,
        identity,
        registry: Arc::new(ConnectionRegistry::new(store)),
        rooms: rooms.clone(),
        metrics: Arc::new(RealtimeMetrics::new()),
    };

    // Subscribe before serving so the relay misses nothing.
    let bus_rx = bus.subscribe();
    tokio::spawn(bus::run_relay(bus_rx, rooms));

    let app = realtime_api::routes::router().with_state(state.clone());
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    TestServer { addr, state }
}

/// Helper: open a WebSocket against the gateway endpoint.
pub async fn connect(addr: SocketAddr) -> WsClient {
    let url = format!("ws://{addr}/realtime");
    let (ws, _) = tokio_tungstenite::connect_async(&url)
        .await
        .expect("ws connect");
    ws
}

/// Helper: connect, authenticate with `token`, and consume the ack.
pub async fn connect_and_authenticate(addr: SocketAddr, token: &str) -> WsClient {
    let mut ws = connect(addr).await;
    send_json(
        &mut ws,
        serde_json::json!({ "type": "authentication", "token": token }),
    )
    .await;

    let ack = recv_json(&mut ws).await;
    assert_eq!(ack["type"], "authenticated");
    assert_eq!(ack["data"], true);
    ws
}

/// Helper: send a JSON value as a text frame.
pub async fn send_json(ws: &mut WsClient, value: serde_json::Value) {
    ws.send(tungstenite::Message::Text(value.to_string().into()))
        .await
        .expect("ws send");
}

/// Helper: read the next text frame and parse it.
pub async fn recv_json(ws: &mut WsClient) -> serde_json::Value {
    let msg = time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("timeout waiting for message")
        .expect("stream ended")
        .expect("ws read error");
    let text = msg.into_text().expect("not text");
    serde_json::from_str(&text).expect("parse message")
}

/// Helper: read frames until the server closes, returning the close frame.
pub async fn recv_close(ws: &mut WsClient) -> Option<tungstenite::protocol::CloseFrame> {
    loop {
        let msg = time::timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timeout waiting for close")
            .expect("stream ended")
            .expect("ws read error");
        match msg {
            tungstenite::Message::Close(frame) => return frame,
            _ => continue,
        }
    }
}

/// Helper: assert that no frame arrives within `window`.
pub async fn expect_silence(ws: &mut WsClient, window: Duration) {
    match time::timeout(window, ws.next()).await {
        Err(_) => {}
        Ok(msg) => panic!("expected silence, got: {msg:?}"),
    }
}

/// Helper: poll `cond` until it holds, for up to a second.
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..100 {
        if cond() {
            return;
        }
        time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition not reached in time");
}

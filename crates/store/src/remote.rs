//! WebSocket client for the remote real-time document store.
//!
//! [`RemoteStore`] speaks a small JSON frame protocol: the client
//! subscribes to collections (`sub`) and issues keyed writes (`put`,
//! `patch`, `patchMulti`, `del`), the server pushes the full collection
//! contents (`snap`) after every change and acknowledges writes
//! (`result`). Snapshots are mirrored locally so `get` is always
//! answerable; the mirror may be empty before the first snapshot arrives.
//!
//! A dropped connection flips the connectivity flag and enters an
//! exponential-backoff reconnect loop; on success every previously
//! watched collection is re-subscribed. Writes in flight across a drop
//! fail with a connection error.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, mpsc, oneshot, watch, RwLock};
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;

use crate::document::{CollectionSnapshot, DocumentStore};
use crate::error::StoreError;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Buffer capacity for each collection's snapshot channel.
const CHANNEL_CAPACITY: usize = 64;

/// Connection profile for one tenant's store.
#[derive(Debug, Clone)]
pub struct RemoteConfig {
    /// WebSocket base URL, e.g. `wss://sync.example.com`.
    pub endpoint: String,
    pub api_key: String,
    pub project_id: String,
}

// ---------------------------------------------------------------------------
// Wire frames
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ClientFrame {
    #[serde(rename_all = "camelCase")]
    Sub { collection: String },
    #[serde(rename_all = "camelCase")]
    Put {
        id: u64,
        collection: String,
        key: String,
        value: Value,
    },
    #[serde(rename_all = "camelCase")]
    Patch {
        id: u64,
        collection: String,
        key: String,
        fields: serde_json::Map<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    PatchMulti {
        id: u64,
        updates: HashMap<String, Value>,
    },
    #[serde(rename_all = "camelCase")]
    Del {
        id: u64,
        collection: String,
        key: String,
    },
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
enum ServerFrame {
    #[serde(rename_all = "camelCase")]
    Snap {
        collection: String,
        entries: CollectionSnapshot,
    },
    #[serde(rename_all = "camelCase")]
    Result {
        id: u64,
        ok: bool,
        #[serde(default)]
        error: Option<String>,
    },
}

// ---------------------------------------------------------------------------
// Reconnect backoff
// ---------------------------------------------------------------------------

/// Tunable parameters for the reconnect backoff strategy.
pub struct ReconnectConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(30),
            multiplier: 2.0,
        }
    }
}

/// Next backoff delay, clamped to the configured maximum.
pub fn next_delay(current: Duration, config: &ReconnectConfig) -> Duration {
    let next_ms = (current.as_millis() as f64 * config.multiplier) as u64;
    Duration::from_millis(next_ms).min(config.max_delay)
}

// ---------------------------------------------------------------------------
// RemoteStore
// ---------------------------------------------------------------------------

struct RemoteInner {
    config: RemoteConfig,
    outbound: mpsc::UnboundedSender<ClientFrame>,
    pending: Mutex<HashMap<u64, oneshot::Sender<Result<(), StoreError>>>>,
    mirror: RwLock<HashMap<String, CollectionSnapshot>>,
    channels: Mutex<HashMap<String, broadcast::Sender<CollectionSnapshot>>>,
    watched: Mutex<HashSet<String>>,
    connected: watch::Sender<bool>,
    next_id: AtomicU64,
    cancel: CancellationToken,
}

/// A live connection to the remote document store.
pub struct RemoteStore {
    inner: Arc<RemoteInner>,
}

impl RemoteStore {
    /// Open the store connection for a tenant profile.
    ///
    /// Fails fast with [`StoreError::Connection`] when the endpoint is
    /// unreachable — the caller uses this to distinguish "tenant chosen
    /// but store unreachable" from normal operation. After the initial
    /// handshake, later drops are handled by the reconnect loop.
    pub async fn connect(config: RemoteConfig) -> Result<Self, StoreError> {
        let url = session_url(&config);
        let (ws, _response) = connect_async(&url).await.map_err(|e| {
            StoreError::Connection(format!("failed to reach store at {}: {e}", config.endpoint))
        })?;

        tracing::info!(project = %config.project_id, "Connected to remote store");

        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (connected, _) = watch::channel(true);
        let inner = Arc::new(RemoteInner {
            config,
            outbound,
            pending: Mutex::new(HashMap::new()),
            mirror: RwLock::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            watched: Mutex::new(HashSet::new()),
            connected,
            next_id: AtomicU64::new(1),
            cancel: CancellationToken::new(),
        });

        tokio::spawn(drive(Arc::clone(&inner), ws, outbound_rx));

        Ok(Self { inner })
    }

    /// Close the connection and stop the reconnect loop.
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    /// Issue a write frame and wait for the server's acknowledgement.
    async fn write(&self, make: impl FnOnce(u64) -> ClientFrame) -> Result<(), StoreError> {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        self.inner
            .pending
            .lock()
            .expect("pending map poisoned")
            .insert(id, tx);

        if self.inner.outbound.send(make(id)).is_err() {
            self.inner.pending.lock().expect("pending map poisoned").remove(&id);
            return Err(StoreError::Connection("store connection closed".into()));
        }

        match rx.await {
            Ok(result) => result,
            // The driver dropped the sender: connection lost mid-write.
            Err(_) => Err(StoreError::Connection(
                "connection lost before write was acknowledged".into(),
            )),
        }
    }
}

impl Drop for RemoteStore {
    fn drop(&mut self) {
        self.inner.cancel.cancel();
    }
}

#[async_trait]
impl DocumentStore for RemoteStore {
    async fn get(&self, collection: &str) -> Result<CollectionSnapshot, StoreError> {
        self.inner.ensure_watched(collection);
        let mirror = self.inner.mirror.read().await;
        Ok(mirror.get(collection).cloned().unwrap_or_default())
    }

    async fn put(&self, collection: &str, key: &str, value: Value) -> Result<(), StoreError> {
        let (collection, key) = (collection.to_string(), key.to_string());
        self.write(|id| ClientFrame::Put {
            id,
            collection,
            key,
            value,
        })
        .await
    }

    async fn patch(
        &self,
        collection: &str,
        key: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        let (collection, key) = (collection.to_string(), key.to_string());
        self.write(|id| ClientFrame::Patch {
            id,
            collection,
            key,
            fields,
        })
        .await
    }

    async fn patch_multi(&self, updates: HashMap<String, Value>) -> Result<(), StoreError> {
        self.write(|id| ClientFrame::PatchMulti { id, updates }).await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        let (collection, key) = (collection.to_string(), key.to_string());
        self.write(|id| ClientFrame::Del {
            id,
            collection,
            key,
        })
        .await
    }

    fn watch(&self, collection: &str) -> broadcast::Receiver<CollectionSnapshot> {
        self.inner.ensure_watched(collection);
        self.inner.sender(collection).subscribe()
    }

    fn watch_connection(&self) -> watch::Receiver<bool> {
        self.inner.connected.subscribe()
    }
}

impl RemoteInner {
    fn sender(&self, collection: &str) -> broadcast::Sender<CollectionSnapshot> {
        let mut channels = self.channels.lock().expect("channel map poisoned");
        channels
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Register interest in a collection and send the `sub` frame once.
    fn ensure_watched(&self, collection: &str) {
        let mut watched = self.watched.lock().expect("watched set poisoned");
        if watched.insert(collection.to_string()) {
            let _ = self.outbound.send(ClientFrame::Sub {
                collection: collection.to_string(),
            });
        }
    }

    /// Fail every in-flight write; called when the connection drops.
    fn fail_pending(&self) {
        let mut pending = self.pending.lock().expect("pending map poisoned");
        for (_, tx) in pending.drain() {
            let _ = tx.send(Err(StoreError::Connection(
                "connection lost before write was acknowledged".into(),
            )));
        }
    }

    async fn handle_frame(&self, frame: ServerFrame) {
        match frame {
            ServerFrame::Snap {
                collection,
                entries,
            } => {
                self.mirror
                    .write()
                    .await
                    .insert(collection.clone(), entries.clone());
                let _ = self.sender(&collection).send(entries);
            }
            ServerFrame::Result { id, ok, error } => {
                let waiter = self.pending.lock().expect("pending map poisoned").remove(&id);
                if let Some(tx) = waiter {
                    let result = if ok {
                        Ok(())
                    } else {
                        Err(StoreError::Rejected(
                            error.unwrap_or_else(|| "write rejected".into()),
                        ))
                    };
                    let _ = tx.send(result);
                } else {
                    tracing::warn!(id, "Acknowledgement for unknown write");
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Connection driver
// ---------------------------------------------------------------------------

/// Own the socket for its whole life: pump frames both ways, and on a
/// drop run the backoff reconnect loop and re-subscribe.
async fn drive(
    inner: Arc<RemoteInner>,
    first: WsStream,
    mut outbound_rx: mpsc::UnboundedReceiver<ClientFrame>,
) {
    let reconnect = ReconnectConfig::default();
    let mut session = Some(first);

    loop {
        let ws = match session.take() {
            Some(ws) => ws,
            None => match reconnect_loop(&inner, &reconnect).await {
                Some(ws) => ws,
                None => break,
            },
        };

        let _ = inner.connected.send(true);
        resubscribe(&inner);

        pump(&inner, ws, &mut outbound_rx).await;

        let _ = inner.connected.send(false);
        inner.fail_pending();

        if inner.cancel.is_cancelled() {
            break;
        }
        tracing::warn!(project = %inner.config.project_id, "Store connection lost");
    }
}

/// Replay `sub` frames for every collection watched so far.
fn resubscribe(inner: &RemoteInner) {
    let watched = inner.watched.lock().expect("watched set poisoned");
    for collection in watched.iter() {
        let _ = inner.outbound.send(ClientFrame::Sub {
            collection: collection.clone(),
        });
    }
}

/// Pump one established socket until it drops or the store shuts down.
async fn pump(
    inner: &RemoteInner,
    ws: WsStream,
    outbound_rx: &mut mpsc::UnboundedReceiver<ClientFrame>,
) {
    let (mut sink, mut stream) = ws.split();

    loop {
        tokio::select! {
            _ = inner.cancel.cancelled() => {
                let _ = sink.send(Message::Close(None)).await;
                return;
            }
            frame = outbound_rx.recv() => {
                let Some(frame) = frame else { return };
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(error) => {
                        tracing::error!(%error, "Failed to encode frame");
                        continue;
                    }
                };
                if sink.send(Message::Text(text)).await.is_err() {
                    return;
                }
            }
            message = stream.next() => {
                match message {
                    Some(Ok(Message::Text(text))) => {
                        match serde_json::from_str::<ServerFrame>(&text) {
                            Ok(frame) => inner.handle_frame(frame).await,
                            Err(error) => {
                                tracing::warn!(%error, "Undecodable server frame");
                            }
                        }
                    }
                    Some(Ok(Message::Ping(_) | Message::Pong(_))) => {}
                    Some(Ok(Message::Close(_))) | Some(Err(_)) | None => return,
                    Some(Ok(_)) => {}
                }
            }
        }
    }
}

/// Retry the connection with exponential backoff until it succeeds or
/// the store is shut down.
async fn reconnect_loop(inner: &RemoteInner, config: &ReconnectConfig) -> Option<WsStream> {
    let url = session_url(&inner.config);
    let mut delay = config.initial_delay;
    let mut attempt = 0u32;

    loop {
        attempt += 1;

        tokio::select! {
            _ = inner.cancel.cancelled() => return None,
            result = connect_async(&url) => match result {
                Ok((ws, _response)) => {
                    tracing::info!(
                        project = %inner.config.project_id,
                        attempt,
                        "Reconnected to remote store",
                    );
                    return Some(ws);
                }
                Err(error) => {
                    tracing::warn!(
                        project = %inner.config.project_id,
                        attempt,
                        %error,
                        "Reconnect attempt failed",
                    );
                }
            }
        }

        tokio::select! {
            _ = inner.cancel.cancelled() => return None,
            _ = tokio::time::sleep(delay) => {}
        }

        delay = next_delay(delay, config);
    }
}

/// Session URL with credentials and a fresh client ID.
fn session_url(config: &RemoteConfig) -> String {
    format!(
        "{}/sync?project={}&apiKey={}&client={}",
        config.endpoint,
        config.project_id,
        config.api_key,
        uuid::Uuid::new_v4()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn backoff_doubles_and_clamps() {
        let config = ReconnectConfig::default();
        let mut delay = config.initial_delay;
        let expected = [1, 2, 4, 8, 16, 30, 30];
        for &secs in &expected {
            assert_eq!(delay.as_secs(), secs);
            delay = next_delay(delay, &config);
        }
    }

    #[test]
    fn client_frames_serialize_with_type_tags() {
        let frame = ClientFrame::Put {
            id: 7,
            collection: "requests".into(),
            key: "r1".into(),
            value: json!({"title": "t"}),
        };
        let text = serde_json::to_string(&frame).unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["type"], "put");
        assert_eq!(value["id"], 7);
        assert_eq!(value["collection"], "requests");
    }

    #[test]
    fn server_snap_frame_round_trips() {
        let text = r#"{"type":"snap","collection":"users","entries":{"u1":{"name":"Dana"}}}"#;
        let frame: ServerFrame = serde_json::from_str(text).unwrap();
        match frame {
            ServerFrame::Snap {
                collection,
                entries,
            } => {
                assert_eq!(collection, "users");
                assert_eq!(entries["u1"]["name"], "Dana");
            }
            other => panic!("expected snap frame, got {other:?}"),
        }
    }

    #[test]
    fn result_frame_defaults_error_to_none() {
        let text = r#"{"type":"result","id":3,"ok":true}"#;
        let frame: ServerFrame = serde_json::from_str(text).unwrap();
        match frame {
            ServerFrame::Result { id, ok, error } => {
                assert_eq!(id, 3);
                assert!(ok);
                assert!(error.is_none());
            }
            other => panic!("expected result frame, got {other:?}"),
        }
    }

    #[test]
    fn session_url_carries_credentials() {
        let config = RemoteConfig {
            endpoint: "wss://sync.example.com".into(),
            api_key: "key123".into(),
            project_id: "acme".into(),
        };
        let url = session_url(&config);
        assert!(url.starts_with("wss://sync.example.com/sync?project=acme&apiKey=key123"));
    }
}

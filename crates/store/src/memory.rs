//! In-process document store.
//!
//! [`MemoryStore`] implements the full [`DocumentStore`] contract against
//! process-local state. It backs demo mode (where no remote store exists
//! at all) and the test suite. Every successful write is echoed as a
//! subscription push for the touched collection, reproducing the remote
//! store's "the push reflects the just-written value" semantics that the
//! optimistic layer converges on.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, watch, RwLock};

use crate::document::{split_path, CollectionSnapshot, DocumentStore};
use crate::error::StoreError;

/// Buffer capacity for each collection's snapshot channel.
const CHANNEL_CAPACITY: usize = 64;

/// A process-local [`DocumentStore`].
///
/// Collections are `BTreeMap`s so key order (and therefore "most recent
/// N by key" semantics) matches the remote store.
pub struct MemoryStore {
    data: RwLock<HashMap<String, BTreeMap<String, Value>>>,
    channels: Mutex<HashMap<String, broadcast::Sender<CollectionSnapshot>>>,
    connected: watch::Sender<bool>,
}

impl MemoryStore {
    /// Create an empty store reporting as connected.
    pub fn new() -> Self {
        let (connected, _) = watch::channel(true);
        Self {
            data: RwLock::new(HashMap::new()),
            channels: Mutex::new(HashMap::new()),
            connected,
        }
    }

    /// Flip the simulated connectivity flag (tests only observe this;
    /// writes still succeed).
    pub fn set_connected(&self, connected: bool) {
        let _ = self.connected.send(connected);
    }

    fn sender(&self, collection: &str) -> broadcast::Sender<CollectionSnapshot> {
        let mut channels = self.channels.lock().expect("channel map poisoned");
        channels
            .entry(collection.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }

    /// Push the current contents of a collection to its subscribers.
    async fn publish(&self, collection: &str) {
        let snapshot = self.snapshot(collection).await;
        // SendError only means there are no subscribers yet.
        let _ = self.sender(collection).send(snapshot);
    }

    async fn snapshot(&self, collection: &str) -> CollectionSnapshot {
        let data = self.data.read().await;
        data.get(collection)
            .map(|entries| {
                entries
                    .iter()
                    .map(|(key, value)| (key.clone(), value.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, collection: &str) -> Result<CollectionSnapshot, StoreError> {
        Ok(self.snapshot(collection).await)
    }

    async fn put(&self, collection: &str, key: &str, value: Value) -> Result<(), StoreError> {
        {
            let mut data = self.data.write().await;
            data.entry(collection.to_string())
                .or_default()
                .insert(key.to_string(), value);
        }
        self.publish(collection).await;
        Ok(())
    }

    async fn patch(
        &self,
        collection: &str,
        key: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        {
            let mut data = self.data.write().await;
            let entry = data
                .entry(collection.to_string())
                .or_default()
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
            let Value::Object(existing) = entry else {
                return Err(StoreError::Rejected(format!(
                    "cannot patch non-object value at {collection}/{key}"
                )));
            };
            for (field, value) in fields {
                existing.insert(field, value);
            }
        }
        self.publish(collection).await;
        Ok(())
    }

    async fn patch_multi(&self, updates: HashMap<String, Value>) -> Result<(), StoreError> {
        // Validate every path before touching state so a malformed update
        // map is rejected whole, never half-applied.
        for path in updates.keys() {
            if split_path(path).is_none() {
                return Err(StoreError::Rejected(format!("invalid path: {path}")));
            }
        }

        let mut touched: Vec<String> = Vec::new();
        {
            let mut data = self.data.write().await;
            for (path, value) in &updates {
                let (collection, key, field) = split_path(path).expect("path pre-validated");
                if !touched.iter().any(|c| c == collection) {
                    touched.push(collection.to_string());
                }
                apply_path(&mut data, collection, key, field, value.clone());
            }
        }

        for collection in touched {
            self.publish(&collection).await;
        }
        Ok(())
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        {
            let mut data = self.data.write().await;
            if let Some(entries) = data.get_mut(collection) {
                entries.remove(key);
            }
        }
        self.publish(collection).await;
        Ok(())
    }

    fn watch(&self, collection: &str) -> broadcast::Receiver<CollectionSnapshot> {
        self.sender(collection).subscribe()
    }

    fn watch_connection(&self) -> watch::Receiver<bool> {
        self.connected.subscribe()
    }
}

/// Apply one path-addressed write. `null` deletes the location; a value
/// at a bare collection path replaces the whole collection.
fn apply_path(
    data: &mut HashMap<String, BTreeMap<String, Value>>,
    collection: &str,
    key: Option<&str>,
    field: Option<&str>,
    value: Value,
) {
    match (key, field) {
        (None, _) => {
            if value.is_null() {
                data.remove(collection);
            } else if let Value::Object(entries) = value {
                data.insert(collection.to_string(), entries.into_iter().collect());
            }
        }
        (Some(key), None) => {
            let entries = data.entry(collection.to_string()).or_default();
            if value.is_null() {
                entries.remove(key);
            } else {
                entries.insert(key.to_string(), value);
            }
        }
        (Some(key), Some(field)) => {
            let entries = data.entry(collection.to_string()).or_default();
            let entry = entries
                .entry(key.to_string())
                .or_insert_with(|| Value::Object(Default::default()));
            if let Value::Object(fields) = entry {
                if value.is_null() {
                    fields.remove(field);
                } else {
                    fields.insert(field.to_string(), value);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    #[tokio::test]
    async fn put_echoes_a_snapshot() {
        let store = MemoryStore::new();
        let mut rx = store.watch("requests");

        store
            .put("requests", "r1", json!({"title": "Broken chair"}))
            .await
            .unwrap();

        let snapshot = rx.recv().await.unwrap();
        assert_eq!(snapshot["r1"]["title"], "Broken chair");
    }

    #[tokio::test]
    async fn patch_merges_fields() {
        let store = MemoryStore::new();
        store
            .put("requests", "r1", json!({"title": "t", "status": "SENT"}))
            .await
            .unwrap();

        let mut fields = serde_json::Map::new();
        fields.insert("status".into(), json!("RESOLVED"));
        store.patch("requests", "r1", fields).await.unwrap();

        let snapshot = store.get("requests").await.unwrap();
        assert_eq!(snapshot["r1"]["status"], "RESOLVED");
        assert_eq!(snapshot["r1"]["title"], "t");
    }

    #[tokio::test]
    async fn patch_multi_touches_several_collections_at_once() {
        let store = MemoryStore::new();
        store.put("requests", "r1", json!({"status": "SENT"})).await.unwrap();
        store.put("comments", "m1", json!({"content": "x"})).await.unwrap();

        let updates = HashMap::from([
            ("requests/r1/status".to_string(), json!("RESOLVED")),
            ("comments".to_string(), Value::Null),
        ]);
        store.patch_multi(updates).await.unwrap();

        assert_eq!(
            store.get("requests").await.unwrap()["r1"]["status"],
            "RESOLVED"
        );
        assert!(store.get("comments").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn patch_multi_rejects_invalid_paths_whole() {
        let store = MemoryStore::new();
        store.put("requests", "r1", json!({"status": "SENT"})).await.unwrap();

        let updates = HashMap::from([
            ("requests/r1/status".to_string(), json!("RESOLVED")),
            ("a/b/c/d".to_string(), json!(1)),
        ]);
        let err = store.patch_multi(updates).await.unwrap_err();
        assert_matches!(err, StoreError::Rejected(_));

        // Nothing was applied.
        assert_eq!(store.get("requests").await.unwrap()["r1"]["status"], "SENT");
    }

    #[tokio::test]
    async fn collection_replace_via_one_segment_path() {
        let store = MemoryStore::new();
        store.put("units", "old", json!({"name": "Old"})).await.unwrap();

        let updates = HashMap::from([(
            "units".to_string(),
            json!({"fresh": {"name": "Default unit"}}),
        )]);
        store.patch_multi(updates).await.unwrap();

        let snapshot = store.get("units").await.unwrap();
        assert!(snapshot.get("old").is_none());
        assert_eq!(snapshot["fresh"]["name"], "Default unit");
    }

    #[tokio::test]
    async fn delete_removes_and_echoes() {
        let store = MemoryStore::new();
        store.put("units", "u1", json!({"name": "HQ"})).await.unwrap();
        let mut rx = store.watch("units");

        store.delete("units", "u1").await.unwrap();
        let snapshot = rx.recv().await.unwrap();
        assert!(snapshot.is_empty());
    }

    #[tokio::test]
    async fn connectivity_flag_is_observable() {
        let store = MemoryStore::new();
        let rx = store.watch_connection();
        assert!(*rx.borrow());
        store.set_connected(false);
        assert!(!*rx.borrow());
    }
}

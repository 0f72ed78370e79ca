//! Typed adapter over any [`DocumentStore`].
//!
//! Owns the key/ID mapping contract: every record retrieved gains an `id`
//! equal to its store key; every record written has its `id` stripped
//! before persisting. The key and the embedded ID can therefore never
//! diverge.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{broadcast, mpsc, watch};
use tokio_util::sync::CancellationToken;

use deskline_core::Record;

use crate::document::{CollectionSnapshot, DocumentStore};
use crate::error::StoreError;

/// Handle for one live collection subscription.
///
/// Dropping the handle unsubscribes; [`unsubscribe`](Self::unsubscribe)
/// does so explicitly. Both are synchronous and idempotent — required so
/// that a tenant switch can tear down every listener before the new
/// profile's subscriptions attach.
#[derive(Debug)]
pub struct Subscription {
    cancel: CancellationToken,
}

impl Subscription {
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

/// The typed store layer the synchronization engine talks to.
#[derive(Clone)]
pub struct StoreAdapter {
    store: Arc<dyn DocumentStore>,
}

impl StoreAdapter {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// The underlying raw store.
    pub fn raw(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    /// One-shot fetch of a whole collection.
    ///
    /// Fails soft: on any store error the cause is logged and an empty
    /// list is returned, so a read never takes the caller down.
    pub async fn get_all<T: Record>(&self) -> Vec<T> {
        match self.store.get(T::COLLECTION).await {
            Ok(snapshot) => decode::<T>(&snapshot, None),
            Err(error) => {
                tracing::warn!(collection = T::COLLECTION, %error, "Collection fetch failed");
                Vec::new()
            }
        }
    }

    /// Open a live typed subscription to a collection.
    ///
    /// The receiver first yields the collection's current contents, then
    /// the recomputed full list after every remote change.
    pub fn subscribe<T: Record>(&self) -> (Subscription, mpsc::UnboundedReceiver<Vec<T>>) {
        self.subscribe_inner(None)
    }

    /// Like [`subscribe`](Self::subscribe), but bounded to the most
    /// recent `limit` entries by key order. Generated keys lead with a
    /// creation timestamp, so key order is creation order; this bounds
    /// memory for high-volume collections.
    pub fn subscribe_recent<T: Record>(
        &self,
        limit: usize,
    ) -> (Subscription, mpsc::UnboundedReceiver<Vec<T>>) {
        self.subscribe_inner(Some(limit))
    }

    fn subscribe_inner<T: Record>(
        &self,
        limit: Option<usize>,
    ) -> (Subscription, mpsc::UnboundedReceiver<Vec<T>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();
        let store = Arc::clone(&self.store);

        tokio::spawn(async move {
            // Register for pushes before the initial fetch so no change
            // can fall between the two.
            let mut pushes = store.watch(T::COLLECTION);

            match store.get(T::COLLECTION).await {
                Ok(snapshot) => {
                    if tx.send(decode::<T>(&snapshot, limit)).is_err() {
                        return;
                    }
                }
                Err(error) => {
                    tracing::warn!(collection = T::COLLECTION, %error, "Initial fetch failed");
                    if tx.send(Vec::new()).is_err() {
                        return;
                    }
                }
            }

            loop {
                tokio::select! {
                    _ = task_cancel.cancelled() => break,
                    result = pushes.recv() => match result {
                        Ok(snapshot) => {
                            if tx.send(decode::<T>(&snapshot, limit)).is_err() {
                                break;
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(skipped)) => {
                            // The next push carries the full collection
                            // again, so lag only costs intermediate frames.
                            tracing::warn!(
                                collection = T::COLLECTION,
                                skipped,
                                "Subscription lagged"
                            );
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    },
                }
            }
        });

        (Subscription { cancel }, rx)
    }

    /// Full replace of one record. The `id` field is stripped before
    /// persisting; the store key carries it.
    pub async fn set<T: Record>(&self, record: &T) -> Result<(), StoreError> {
        let value = to_store_value(record)?;
        self.store.put(T::COLLECTION, record.id(), value).await
    }

    /// Shallow-merge patch of one record's fields.
    pub async fn update(
        &self,
        collection: &str,
        id: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.store.patch(collection, id, fields).await
    }

    /// One combined write across several paths.
    pub async fn update_multi(
        &self,
        updates: std::collections::HashMap<String, Value>,
    ) -> Result<(), StoreError> {
        self.store.patch_multi(updates).await
    }

    /// Delete one record.
    pub async fn remove(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.store.delete(collection, id).await
    }

    /// Live connectivity flag.
    pub fn watch_connection(&self) -> watch::Receiver<bool> {
        self.store.watch_connection()
    }
}

/// Decode a snapshot into typed records, injecting the store key as each
/// record's `id`. Entries that fail to decode are logged and skipped
/// rather than poisoning the whole list.
fn decode<T: Record>(snapshot: &CollectionSnapshot, limit: Option<usize>) -> Vec<T> {
    let skip = limit
        .map(|limit| snapshot.len().saturating_sub(limit))
        .unwrap_or(0);

    snapshot
        .iter()
        .skip(skip)
        .filter_map(|(key, value)| match serde_json::from_value::<T>(value.clone()) {
            Ok(mut record) => {
                record.set_id(key.clone());
                Some(record)
            }
            Err(error) => {
                tracing::warn!(
                    collection = T::COLLECTION,
                    key,
                    %error,
                    "Skipping undecodable record"
                );
                None
            }
        })
        .collect()
}

/// Serialize a record to its on-store shape: the `id` field is removed,
/// since the store key carries it. Used by [`StoreAdapter::set`] and by
/// callers composing multi-path writes that place whole records.
pub fn to_store_value<T: Record>(record: &T) -> Result<Value, StoreError> {
    let mut value = serde_json::to_value(record)?;
    if let Value::Object(fields) = &mut value {
        fields.remove("id");
    }
    Ok(value)
}

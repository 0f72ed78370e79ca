//! Shared test fixtures: a store that records every durable write and
//! can be told to reject them, plus builders for the usual fixtures.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use deskline_core::models::{NewComment, NewRequest, User};
use deskline_core::roles::Role;
use deskline_core::status::Priority;
use deskline_engine::{EngineMode, SyncEngine, TenantProfile};
use deskline_store::{
    CollectionSnapshot, DocumentStore, MemoryStore, StoreAdapter, StoreError,
};

/// One durable write observed by the [`RecordingStore`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Put { collection: String, key: String },
    Patch { collection: String, key: String },
    PatchMulti { paths: Vec<String> },
    Delete { collection: String, key: String },
}

/// A [`MemoryStore`] wrapper that logs writes and can reject them.
pub struct RecordingStore {
    inner: MemoryStore,
    calls: Mutex<Vec<Call>>,
    fail_writes: AtomicBool,
}

impl RecordingStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: MemoryStore::new(),
            calls: Mutex::new(Vec::new()),
            fail_writes: AtomicBool::new(false),
        })
    }

    /// Make every subsequent durable write fail with a rejection.
    pub fn reject_writes(&self, reject: bool) {
        self.fail_writes.store(reject, Ordering::SeqCst);
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    pub fn multi_calls(&self) -> Vec<Vec<String>> {
        self.calls()
            .into_iter()
            .filter_map(|call| match call {
                Call::PatchMulti { paths } => Some(paths),
                _ => None,
            })
            .collect()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn gate(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            Err(StoreError::Rejected("injected failure".into()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl DocumentStore for RecordingStore {
    async fn get(&self, collection: &str) -> Result<CollectionSnapshot, StoreError> {
        self.inner.get(collection).await
    }

    async fn put(&self, collection: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.record(Call::Put {
            collection: collection.into(),
            key: key.into(),
        });
        self.gate()?;
        self.inner.put(collection, key, value).await
    }

    async fn patch(
        &self,
        collection: &str,
        key: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError> {
        self.record(Call::Patch {
            collection: collection.into(),
            key: key.into(),
        });
        self.gate()?;
        self.inner.patch(collection, key, fields).await
    }

    async fn patch_multi(&self, updates: HashMap<String, Value>) -> Result<(), StoreError> {
        let mut paths: Vec<String> = updates.keys().cloned().collect();
        paths.sort();
        self.record(Call::PatchMulti { paths });
        self.gate()?;
        self.inner.patch_multi(updates).await
    }

    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError> {
        self.record(Call::Delete {
            collection: collection.into(),
            key: key.into(),
        });
        self.gate()?;
        self.inner.delete(collection, key).await
    }

    fn watch(&self, collection: &str) -> broadcast::Receiver<CollectionSnapshot> {
        self.inner.watch(collection)
    }

    fn watch_connection(&self) -> watch::Receiver<bool> {
        self.inner.watch_connection()
    }
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub fn tenant() -> TenantProfile {
    TenantProfile {
        slug: "acme".into(),
        endpoint: "wss://unused.test".into(),
        api_key: "key".into(),
        project_id: "proj".into(),
        upload: None,
    }
}

/// Engine attached to a fresh recording store, with fixtures seeded
/// before the subscriptions attach.
pub async fn engine_with_store() -> (SyncEngine, Arc<RecordingStore>) {
    let store = RecordingStore::new();
    let engine = SyncEngine::new();
    engine
        .start_with_store(
            EngineMode::Connected(tenant()),
            store.clone() as Arc<dyn DocumentStore>,
        )
        .await;
    settle().await;
    (engine, store)
}

pub async fn seed_user(store: &Arc<RecordingStore>, id: &str, role: Role) {
    let adapter = StoreAdapter::new(store.clone() as Arc<dyn DocumentStore>);
    adapter
        .set(&User {
            id: id.into(),
            company_id: "c1".into(),
            unit_id: (role != Role::Admin).then(|| "u1".into()),
            name: format!("User {id}"),
            email: format!("{id}@acme.test"),
            role,
            external_id: None,
        })
        .await
        .unwrap();
}

pub fn draft_request(title: &str) -> NewRequest {
    NewRequest {
        company_id: "c1".into(),
        unit_id: "u1".into(),
        creator_id: "p1".into(),
        title: title.into(),
        description: "Something needs fixing".into(),
        product_url: None,
        priority: Priority::Medium,
        attachments: Vec::new(),
    }
}

pub fn draft_comment(request_id: &str, content: &str, internal: bool) -> NewComment {
    NewComment {
        request_id: request_id.into(),
        user_id: "p1".into(),
        content: content.into(),
        is_internal: internal,
    }
}

/// Let spawned pump tasks drain their channels.
pub async fn settle() {
    tokio::time::sleep(std::time::Duration::from_millis(40)).await;
}

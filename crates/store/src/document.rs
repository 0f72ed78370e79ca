//! The raw document-store contract.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::{broadcast, watch};

use crate::error::StoreError;

/// The full keyed contents of one collection, as pushed by a live
/// subscription after every remote change. Keys are store keys (entity
/// IDs); values never embed their own key.
pub type CollectionSnapshot = serde_json::Map<String, Value>;

/// A real-time document store of flat `key -> value` collections.
///
/// Multi-path updates address individual locations with a path of the
/// form `collection`, `collection/key`, or `collection/key/field`. A
/// `null` value at any path deletes that location; a non-null value at a
/// one-segment path replaces the whole collection. This is the primitive
/// behind bulk status changes and system reset, where partial application
/// would be observably inconsistent.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// One-shot fetch of a collection's full keyed contents.
    async fn get(&self, collection: &str) -> Result<CollectionSnapshot, StoreError>;

    /// Full replace of one value.
    async fn put(&self, collection: &str, key: &str, value: Value) -> Result<(), StoreError>;

    /// Shallow-merge patch of one value's top-level fields.
    async fn patch(
        &self,
        collection: &str,
        key: &str,
        fields: serde_json::Map<String, Value>,
    ) -> Result<(), StoreError>;

    /// Apply several path-addressed writes as one combined call.
    async fn patch_multi(&self, updates: HashMap<String, Value>) -> Result<(), StoreError>;

    /// Delete one value.
    async fn delete(&self, collection: &str, key: &str) -> Result<(), StoreError>;

    /// Open a live subscription to a collection.
    ///
    /// The receiver yields the full [`CollectionSnapshot`] after every
    /// change. Safe to call before the store is connected; snapshots
    /// simply start flowing once it is.
    fn watch(&self, collection: &str) -> broadcast::Receiver<CollectionSnapshot>;

    /// Live connectivity flag from the store's own heartbeat.
    ///
    /// Observed, never written by the application; distinguishes "never
    /// configured" from "configured but offline".
    fn watch_connection(&self) -> watch::Receiver<bool>;
}

/// Split a multi-path key into its `(collection, key, field)` segments.
///
/// Returns `None` for empty or over-deep paths.
pub(crate) fn split_path(path: &str) -> Option<(&str, Option<&str>, Option<&str>)> {
    let mut parts = path.split('/').filter(|segment| !segment.is_empty());
    let collection = parts.next()?;
    let key = parts.next();
    let field = parts.next();
    if parts.next().is_some() {
        return None;
    }
    Some((collection, key, field))
}

//! Remote document-store boundary.
//!
//! The durable owner of all Deskline data is an external real-time
//! document store: flat collections of `key -> JSON value`, live
//! subscriptions that push the full collection after every change, and a
//! multi-path write primitive for atomic-as-supported updates spanning
//! several locations.
//!
//! This crate wraps that contract:
//!
//! - [`DocumentStore`] — the raw store trait (what the external client
//!   provides).
//! - [`MemoryStore`] — in-process implementation; backs demo mode and
//!   tests, echoing every write as a subscription push.
//! - [`RemoteStore`] — WebSocket client with reconnect backoff.
//! - [`StoreAdapter`] — the typed layer the engine talks to, owning the
//!   key/ID mapping contract.
//! - [`AssetUploader`] — image upload with inline data-URL fallback.

pub mod adapter;
pub mod assets;
pub mod document;
pub mod error;
pub mod memory;
pub mod remote;

pub use adapter::{to_store_value, StoreAdapter, Subscription};
pub use assets::{AssetUploader, UploadProfile};
pub use document::{CollectionSnapshot, DocumentStore};
pub use error::StoreError;
pub use memory::MemoryStore;
pub use remote::{RemoteConfig, RemoteStore};

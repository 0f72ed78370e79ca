//! Synchronized entity models and their DTOs.
//!
//! Each entity mirrors one flat remote-store collection. The store key is
//! the authoritative ID: the `id` field on every model is
//! `#[serde(default)]` so records deserialize cleanly from store values
//! (which never embed their key) and the adapter injects the key
//! afterwards via [`Record::set_id`].

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::types::EntityId;

pub mod comment;
pub mod company;
pub mod request;
pub mod unit;
pub mod user;

pub use comment::{Comment, NewComment};
pub use company::Company;
pub use request::{Attachment, NewRequest, RequestTicket, UpdateRequest};
pub use unit::{NewUnit, Unit};
pub use user::{NewUser, UpdateUser, User};

/// A record synchronized with one remote-store collection.
pub trait Record:
    Clone + std::fmt::Debug + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Flat store namespace this record lives in.
    const COLLECTION: &'static str;

    /// Human-readable entity name for error messages.
    const ENTITY: &'static str;

    fn id(&self) -> &str;

    /// Called by the adapter after deserialization to inject the store key.
    fn set_id(&mut self, id: EntityId);
}

//! Request ticket model and DTOs.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::Record;
use crate::status::{Priority, Status};
use crate::types::{EntityId, Timestamp};

/// A helpdesk request ticket.
///
/// Invariant: `updated_at >= created_at` whenever `updated_at` is set;
/// every mutation (status change, content edit, new comment on the
/// thread) refreshes `updated_at`. `updated_at` is optional on the wire —
/// records written by older clients may lack it, and consumers fall back
/// to `created_at` (see [`last_activity`](Self::last_activity)).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestTicket {
    #[serde(default)]
    pub id: EntityId,
    pub company_id: EntityId,
    pub unit_id: EntityId,
    pub creator_id: EntityId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assignee_id: Option<EntityId>,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_url: Option<String>,
    pub status: Status,
    pub priority: Priority,
    pub created_at: Timestamp,
    #[serde(default)]
    pub updated_at: Option<Timestamp>,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub viewed_by_assignee: bool,
}

impl RequestTicket {
    /// Canonical activity timestamp: `updated_at`, falling back to
    /// `created_at` when absent. Drives the "most recently active first"
    /// ordering used everywhere.
    pub fn last_activity(&self) -> Timestamp {
        self.updated_at.unwrap_or(self.created_at)
    }
}

impl Record for RequestTicket {
    const COLLECTION: &'static str = "requests";
    const ENTITY: &'static str = "Request";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }
}

/// A file attached to a request. Immutable once attached.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: EntityId,
    pub name: String,
    /// Either a durable asset URL or an inline data URL fallback.
    pub url: String,
    /// Type tag, e.g. `"image"`.
    pub kind: String,
}

/// DTO for creating a request ticket.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewRequest {
    pub company_id: EntityId,
    pub unit_id: EntityId,
    pub creator_id: EntityId,
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub description: String,
    /// Must carry a scheme when present (`https://...`).
    #[validate(url(message = "Product URL must be a full URL including its scheme"))]
    pub product_url: Option<String>,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
}

/// DTO for partially updating a request. All fields are optional; only
/// present fields are patched.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    /// Must carry a scheme when present, as on creation.
    #[validate(url(message = "Product URL must be a full URL including its scheme"))]
    pub product_url: Option<String>,
    pub priority: Option<Priority>,
    pub assignee_id: Option<EntityId>,
}

//! Comment thread entry model and DTO.

use serde::{Deserialize, Serialize};

use crate::models::Record;
use crate::types::{EntityId, Timestamp};

/// A threaded comment on a request ticket.
///
/// Comments flagged `is_internal` are visible only to privileged roles
/// (admin/leader); the requester never sees them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    #[serde(default)]
    pub id: EntityId,
    pub request_id: EntityId,
    pub user_id: EntityId,
    pub content: String,
    pub created_at: Timestamp,
    #[serde(default)]
    pub is_internal: bool,
}

impl Record for Comment {
    const COLLECTION: &'static str = "comments";
    const ENTITY: &'static str = "Comment";

    fn id(&self) -> &str {
        &self.id
    }

    fn set_id(&mut self, id: EntityId) {
        self.id = id;
    }
}

/// DTO for adding a comment to a ticket's thread.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewComment {
    pub request_id: EntityId,
    pub user_id: EntityId,
    pub content: String,
    #[serde(default)]
    pub is_internal: bool,
}

//! Role-scoped access levels.
//!
//! Every user profile carries exactly one [`Role`]. Role checks gate which
//! mutation methods the surrounding application invokes; the engine itself
//! only re-validates roles where data visibility depends on them (internal
//! comments).

use serde::{Deserialize, Serialize};

/// Access level of a user within their company.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Role {
    /// Administrative staff: full CRUD over units, users, and tickets.
    Admin,
    /// Unit leader: sees the whole unit's tickets and internal comments.
    Leader,
    /// Standard user: submits and tracks their own unit's tickets.
    User,
}

impl Role {
    /// Whether this role may see comments flagged `is_internal`.
    pub fn sees_internal_comments(self) -> bool {
        matches!(self, Role::Admin | Role::Leader)
    }

    /// Whether this role requires a `unit_id` on its user profile.
    /// Admins operate across units; everyone else belongs to one.
    pub fn requires_unit(self) -> bool {
        !matches!(self, Role::Admin)
    }
}

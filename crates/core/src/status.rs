//! Ticket workflow status and priority.

use serde::{Deserialize, Serialize};

/// Fixed ticket workflow state.
///
/// New tickets always start in [`Status::Sent`]. The canonical forward
/// path is Sent → Received → InProgress → Resolved → Closed, with OnHold
/// as a side track out of and back into InProgress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Status {
    Sent,
    Received,
    InProgress,
    OnHold,
    Resolved,
    Closed,
}

impl Status {
    /// Whether the fixed workflow allows moving from `self` to `next`.
    ///
    /// This is advisory: bulk administrative operations may force any
    /// status, so the engine does not reject writes based on it.
    pub fn can_transition(self, next: Status) -> bool {
        use Status::*;
        matches!(
            (self, next),
            (Sent, Received)
                | (Received, InProgress)
                | (Received, OnHold)
                | (InProgress, OnHold)
                | (InProgress, Resolved)
                | (OnHold, InProgress)
                | (Resolved, Closed)
                | (Resolved, InProgress)
        )
    }

    /// Whether the ticket still needs attention from the admin side.
    pub fn is_open(self) -> bool {
        !matches!(self, Status::Resolved | Status::Closed)
    }
}

/// Urgency assigned by the ticket creator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Priority {
    Low,
    Medium,
    High,
    Critical,
}

impl Default for Priority {
    fn default() -> Self {
        Priority::Medium
    }
}

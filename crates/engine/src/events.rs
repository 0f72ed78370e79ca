//! Engine event bus.
//!
//! Synchronization pumps publish an event whenever a push introduces
//! something new; observers (notification router, session binder)
//! subscribe without ever writing back. The bus is a plain tokio
//! broadcast channel: slow observers lag and skip, they never block the
//! pumps.

use serde_json::Value;
use tokio::sync::broadcast;

use deskline_core::types::{EntityId, Timestamp};

/// Capacity of the broadcast channel backing the bus.
const BUS_CAPACITY: usize = 256;

/// What a push introduced.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A request ticket not previously present in the local mirror.
    RequestAppeared,
    /// A comment not previously present in the local mirror.
    CommentAppeared,
    /// The users collection changed shape (profiles added, edited or
    /// removed). Carries no entity; the session binder re-resolves.
    UsersChanged,
}

impl EventKind {
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::RequestAppeared => "request.appeared",
            EventKind::CommentAppeared => "comment.appeared",
            EventKind::UsersChanged => "users.changed",
        }
    }
}

/// One event on the bus.
#[derive(Debug, Clone)]
pub struct EngineEvent {
    pub kind: EventKind,
    /// The entity the event is about, when it is about one.
    pub entity_id: Option<EntityId>,
    /// Kind-specific details (title, snippet, author).
    pub payload: Value,
    pub timestamp: Timestamp,
}

impl EngineEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            entity_id: None,
            payload: Value::Null,
            timestamp: chrono::Utc::now(),
        }
    }

    pub fn with_entity(mut self, entity_id: impl Into<EntityId>) -> Self {
        self.entity_id = Some(entity_id.into());
        self
    }

    pub fn with_payload(mut self, payload: Value) -> Self {
        self.payload = payload;
        self
    }
}

/// Fan-out channel for [`EngineEvent`]s.
pub struct EventBus {
    sender: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        let (sender, _) = broadcast::channel(BUS_CAPACITY);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }

    /// Publish an event. A send error only means nobody is listening,
    /// which is fine; events are advisory.
    pub fn publish(&self, event: EngineEvent) {
        tracing::trace!(kind = event.kind.name(), entity = ?event.entity_id, "Event published");
        let _ = self.sender.send(event);
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

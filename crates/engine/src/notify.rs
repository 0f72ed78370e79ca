//! Notification routing.
//!
//! A read-only observer on the engine event bus: new requests and new
//! comments become transient [`Notification`]s on an outbound channel,
//! deduplicated by entity so a replayed push never notifies twice. The
//! router never writes back into the engine.

use std::collections::HashSet;

use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use deskline_core::types::{EntityId, Timestamp};

use crate::events::{EngineEvent, EventKind};

/// A transient user-facing notification.
#[derive(Debug, Clone)]
pub struct Notification {
    pub kind: EventKind,
    pub entity_id: EntityId,
    pub message: String,
    pub timestamp: Timestamp,
}

/// Turns engine events into notifications.
pub struct NotificationRouter {
    seen: HashSet<EntityId>,
}

impl NotificationRouter {
    pub fn new() -> Self {
        Self {
            seen: HashSet::new(),
        }
    }

    /// Consume events until the bus closes, sending notifications to
    /// `out`. Lag is tolerated: missed events are missed notifications,
    /// never an error.
    pub fn run(
        mut self,
        mut events: broadcast::Receiver<EngineEvent>,
        out: mpsc::UnboundedSender<Notification>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        if let Some(notification) = self.route(event) {
                            if out.send(notification).is_err() {
                                break;
                            }
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "Notification router lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        })
    }

    fn route(&mut self, event: EngineEvent) -> Option<Notification> {
        let entity_id = event.entity_id?;
        let message = match event.kind {
            EventKind::RequestAppeared => {
                let title = event.payload["title"].as_str().unwrap_or("(untitled)");
                format!("New request: {title}")
            }
            EventKind::CommentAppeared => {
                if event.payload["isInternal"].as_bool().unwrap_or(false) {
                    "New internal comment".to_string()
                } else {
                    "New comment".to_string()
                }
            }
            EventKind::UsersChanged => return None,
        };
        if !self.seen.insert(entity_id.clone()) {
            return None;
        }
        Some(Notification {
            kind: event.kind,
            entity_id,
            message,
            timestamp: event.timestamp,
        })
    }
}

impl Default for NotificationRouter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn request_event(id: &str) -> EngineEvent {
        EngineEvent::new(EventKind::RequestAppeared)
            .with_entity(id)
            .with_payload(json!({"title": "Broken chair"}))
    }

    #[test]
    fn new_request_notifies_once() {
        let mut router = NotificationRouter::new();
        let first = router.route(request_event("r1")).unwrap();
        assert_eq!(first.message, "New request: Broken chair");
        assert!(router.route(request_event("r1")).is_none());
        assert!(router.route(request_event("r2")).is_some());
    }

    #[test]
    fn internal_comments_do_not_leak_content() {
        let mut router = NotificationRouter::new();
        let event = EngineEvent::new(EventKind::CommentAppeared)
            .with_entity("c1")
            .with_payload(json!({"requestId": "r1", "isInternal": true}));
        let notification = router.route(event).unwrap();
        assert_eq!(notification.message, "New internal comment");
    }

    #[test]
    fn bookkeeping_events_are_silent() {
        let mut router = NotificationRouter::new();
        assert!(router
            .route(EngineEvent::new(EventKind::UsersChanged).with_entity("x"))
            .is_none());
    }

    #[tokio::test]
    async fn router_forwards_over_the_channel() {
        let (bus_tx, bus_rx) = broadcast::channel(8);
        let (out_tx, mut out_rx) = mpsc::unbounded_channel();
        let handle = NotificationRouter::new().run(bus_rx, out_tx);

        bus_tx.send(request_event("r1")).unwrap();
        let notification = out_rx.recv().await.unwrap();
        assert_eq!(notification.entity_id, "r1");

        drop(bus_tx);
        handle.await.unwrap();
    }
}

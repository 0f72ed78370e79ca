//! End-to-end ticket behavior: creation defaults, sanitization,
//! activity-based ordering, thread visibility.

mod common;

use assert_matches::assert_matches;
use common::{draft_comment, draft_request, engine_with_store, settle};
use deskline_core::models::UpdateRequest;
use deskline_core::roles::Role;
use deskline_core::status::{Priority, Status};
use deskline_engine::EngineError;

#[tokio::test]
async fn new_ticket_starts_sent_fresh_and_unseen() {
    let (engine, _store) = engine_with_store().await;

    let mut draft = draft_request("<script>alert(1)</script> please fix");
    draft.description = "See <b>photo</b>".into();
    let ticket = engine.add_request(draft).await.unwrap();

    assert_eq!(ticket.title, "alert(1)/ please fix");
    assert_eq!(ticket.description, "See bphoto/b");
    assert_eq!(ticket.status, Status::Sent);
    assert_eq!(ticket.priority, Priority::Medium);
    assert_eq!(ticket.updated_at, Some(ticket.created_at));
    assert!(!ticket.viewed_by_assignee);
    assert!(ticket.assignee_id.is_none());

    // The durable echo carries the same record back, id injected from
    // the store key.
    settle().await;
    let mirrored = engine.request(&ticket.id).await.unwrap();
    assert_eq!(mirrored.title, ticket.title);
    assert_eq!(mirrored.status, Status::Sent);
}

#[tokio::test]
async fn invalid_draft_is_rejected_before_any_write() {
    let (engine, store) = engine_with_store().await;

    let mut draft = draft_request("");
    draft.product_url = Some("example.com/no-scheme".into());
    let err = engine.add_request(draft).await;
    assert_matches!(err, Err(EngineError::Core(_)));

    assert!(engine.sorted_requests().await.is_empty());
    assert!(store.calls().is_empty(), "nothing may reach the store");
}

#[tokio::test]
async fn activity_orders_most_recent_first() {
    let (engine, _store) = engine_with_store().await;
    let first = engine.add_request(draft_request("First")).await.unwrap();
    let second = engine.add_request(draft_request("Second")).await.unwrap();
    settle().await;

    let ids: Vec<String> = engine
        .sorted_requests()
        .await
        .iter()
        .map(|r| r.id.clone())
        .collect();
    assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);

    // A comment on the older ticket bubbles it back to the top.
    engine
        .add_comment(draft_comment(&first.id, "Any update?", false))
        .await
        .unwrap();
    settle().await;

    let ids: Vec<String> = engine
        .sorted_requests()
        .await
        .iter()
        .map(|r| r.id.clone())
        .collect();
    assert_eq!(ids, vec![first.id, second.id]);
}

#[tokio::test]
async fn status_change_refreshes_activity() {
    let (engine, _store) = engine_with_store().await;
    let ticket = engine.add_request(draft_request("Broken chair")).await.unwrap();
    let before = ticket.last_activity();

    engine
        .update_request_status(&ticket.id, Status::Received)
        .await
        .unwrap();

    let after = engine.request(&ticket.id).await.unwrap();
    assert_eq!(after.status, Status::Received);
    assert!(after.last_activity() >= before);
}

#[tokio::test]
async fn viewing_is_not_activity() {
    let (engine, _store) = engine_with_store().await;
    let ticket = engine.add_request(draft_request("Broken chair")).await.unwrap();
    let before = engine.request(&ticket.id).await.unwrap().updated_at;

    engine.mark_request_viewed(&ticket.id).await.unwrap();

    let after = engine.request(&ticket.id).await.unwrap();
    assert!(after.viewed_by_assignee);
    assert_eq!(after.updated_at, before, "viewing must not reorder the list");
}

#[tokio::test]
async fn edits_are_sanitized_and_partial() {
    let (engine, _store) = engine_with_store().await;
    let ticket = engine.add_request(draft_request("Broken chair")).await.unwrap();

    engine
        .update_request(
            &ticket.id,
            UpdateRequest {
                description: Some("Now with <script>details</script>".into()),
                priority: Some(Priority::Critical),
                ..UpdateRequest::default()
            },
        )
        .await
        .unwrap();

    let after = engine.request(&ticket.id).await.unwrap();
    assert_eq!(after.title, "Broken chair", "untouched fields stay");
    assert_eq!(after.description, "Now with details/");
    assert_eq!(after.priority, Priority::Critical);
}

#[tokio::test]
async fn edits_reject_scheme_less_urls_like_creation_does() {
    let (engine, _store) = engine_with_store().await;
    let ticket = engine.add_request(draft_request("Broken chair")).await.unwrap();

    let err = engine
        .update_request(
            &ticket.id,
            UpdateRequest {
                product_url: Some("example.com/no-scheme".into()),
                ..UpdateRequest::default()
            },
        )
        .await;
    assert_matches!(err, Err(EngineError::Core(_)));

    let after = engine.request(&ticket.id).await.unwrap();
    assert!(after.product_url.is_none(), "rejected edit leaves the ticket untouched");
}

#[tokio::test]
async fn internal_comments_are_hidden_from_requesters() {
    let (engine, _store) = engine_with_store().await;
    let ticket = engine.add_request(draft_request("Broken chair")).await.unwrap();

    engine
        .add_comment(draft_comment(&ticket.id, "We are on it", false))
        .await
        .unwrap();
    engine
        .add_comment(draft_comment(&ticket.id, "Creator seems impatient", true))
        .await
        .unwrap();
    settle().await;

    let admin_view = engine.comments_for_request(&ticket.id, Role::Admin).await;
    assert_eq!(admin_view.len(), 2);

    let leader_view = engine.comments_for_request(&ticket.id, Role::Leader).await;
    assert_eq!(leader_view.len(), 2);

    let requester_view = engine.comments_for_request(&ticket.id, Role::User).await;
    assert_eq!(requester_view.len(), 1);
    assert_eq!(requester_view[0].content, "We are on it");
}

#[tokio::test]
async fn empty_comment_after_sanitization_is_rejected() {
    let (engine, _store) = engine_with_store().await;
    let ticket = engine.add_request(draft_request("Broken chair")).await.unwrap();

    let err = engine
        .add_comment(draft_comment(&ticket.id, "<script></script>", false))
        .await;
    assert_matches!(err, Err(EngineError::Core(_)));
}

#[tokio::test]
async fn attachments_travel_with_the_request() {
    let (engine, _store) = engine_with_store().await;

    let attachment = engine
        .upload_attachment("chair <photo>.jpg", "image/jpeg", b"not really a jpeg".to_vec())
        .await
        .unwrap();
    assert_eq!(attachment.name, "chair photo.jpg");
    assert_eq!(attachment.kind, "image");
    assert!(attachment.url.starts_with("data:image/jpeg;base64,"));

    let mut draft = draft_request("Broken chair");
    draft.attachments = vec![attachment.clone()];
    let ticket = engine.add_request(draft).await.unwrap();
    settle().await;

    let mirrored = engine.request(&ticket.id).await.unwrap();
    assert_eq!(mirrored.attachments.len(), 1);
    assert_eq!(mirrored.attachments[0].url, attachment.url);
}

#[tokio::test]
async fn deleting_a_ticket_leaves_its_thread() {
    let (engine, _store) = engine_with_store().await;
    let ticket = engine.add_request(draft_request("Broken chair")).await.unwrap();
    engine
        .add_comment(draft_comment(&ticket.id, "Noted", false))
        .await
        .unwrap();
    settle().await;

    engine.delete_request(&ticket.id).await.unwrap();
    settle().await;

    assert!(engine.request(&ticket.id).await.is_none());
    // References are never cascade-cleaned.
    let orphaned = engine.comments_for_request(&ticket.id, Role::Admin).await;
    assert_eq!(orphaned.len(), 1);
}

//! The write-policy contract: rejected creations and deletions roll the
//! local mirror back exactly; rejected patches keep the local change.

mod common;

use assert_matches::assert_matches;
use common::{draft_comment, draft_request, engine_with_store, settle};
use deskline_core::status::Status;
use deskline_engine::EngineError;

#[tokio::test]
async fn rejected_add_request_leaves_no_phantom_ticket() {
    let (engine, store) = engine_with_store().await;

    store.reject_writes(true);
    let err = engine.add_request(draft_request("Broken chair")).await;
    assert_matches!(err, Err(EngineError::NotSaved(_)));

    assert!(engine.sorted_requests().await.is_empty());
    settle().await;
    assert!(engine.sorted_requests().await.is_empty());
}

#[tokio::test]
async fn rejected_delete_restores_the_ticket_in_place() {
    let (engine, store) = engine_with_store().await;
    engine.add_request(draft_request("First")).await.unwrap();
    engine.add_request(draft_request("Second")).await.unwrap();
    engine.add_request(draft_request("Third")).await.unwrap();
    settle().await;

    let before: Vec<String> = engine
        .sorted_requests()
        .await
        .iter()
        .map(|r| r.id.clone())
        .collect();
    let victim = before[1].clone();

    store.reject_writes(true);
    let err = engine.delete_request(&victim).await;
    assert_matches!(err, Err(EngineError::NotSaved(_)));

    let after: Vec<String> = engine
        .sorted_requests()
        .await
        .iter()
        .map(|r| r.id.clone())
        .collect();
    assert_eq!(before, after, "rollback must restore the original order");
}

#[tokio::test]
async fn rejected_comment_rolls_back_the_parent_touch_too() {
    let (engine, store) = engine_with_store().await;
    let ticket = engine.add_request(draft_request("Flaky light")).await.unwrap();
    settle().await;
    let before = engine.request(&ticket.id).await.unwrap().updated_at;

    store.reject_writes(true);
    let err = engine
        .add_comment(draft_comment(&ticket.id, "On it", false))
        .await;
    assert_matches!(err, Err(EngineError::NotSaved(_)));

    let after = engine.request(&ticket.id).await.unwrap();
    assert_eq!(after.updated_at, before, "activity timestamp must revert");

    let thread = engine
        .comments_for_request(&ticket.id, deskline_core::roles::Role::Admin)
        .await;
    assert!(thread.is_empty(), "no phantom comment may remain");
}

#[tokio::test]
async fn rejected_status_patch_keeps_the_local_change() {
    let (engine, store) = engine_with_store().await;
    let ticket = engine.add_request(draft_request("Broken chair")).await.unwrap();
    settle().await;

    store.reject_writes(true);
    engine
        .update_request_status(&ticket.id, Status::Received)
        .await
        .expect("best-effort patches report success");

    let local = engine.request(&ticket.id).await.unwrap();
    assert_eq!(local.status, Status::Received);
}

#[tokio::test]
async fn rejected_viewed_flag_keeps_the_local_change() {
    let (engine, store) = engine_with_store().await;
    let ticket = engine.add_request(draft_request("Broken chair")).await.unwrap();
    settle().await;

    store.reject_writes(true);
    engine.mark_request_viewed(&ticket.id).await.unwrap();
    assert!(engine.request(&ticket.id).await.unwrap().viewed_by_assignee);
}

#[tokio::test]
async fn mutations_without_a_session_fail_cleanly() {
    let engine = deskline_engine::SyncEngine::new();
    let err = engine.add_request(draft_request("Nowhere to go")).await;
    assert_matches!(err, Err(EngineError::NotStarted));
}

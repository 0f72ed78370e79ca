//! Multi-path write behavior: bulk status sweeps and system reset must
//! each leave the engine as exactly one combined store write.

mod common;

use common::{draft_comment, draft_request, engine_with_store, seed_user, settle, Call};
use deskline_core::roles::Role;
use deskline_core::status::Status;
use deskline_engine::mutations::DEFAULT_UNIT_NAME;

#[tokio::test]
async fn bulk_status_sweep_is_one_combined_write() {
    let (engine, store) = engine_with_store().await;
    let a = engine.add_request(draft_request("A")).await.unwrap();
    let b = engine.add_request(draft_request("B")).await.unwrap();
    let c = engine.add_request(draft_request("C")).await.unwrap();
    settle().await;

    let before = store.multi_calls().len();
    engine
        .bulk_update_request_status(&[a.id.clone(), b.id.clone(), c.id.clone()], Status::Closed)
        .await
        .unwrap();

    let multi = store.multi_calls();
    assert_eq!(multi.len(), before + 1, "exactly one combined write");
    let paths = &multi[before];
    assert_eq!(paths.len(), 6, "status and activity per ticket");
    for id in [&a.id, &b.id, &c.id] {
        assert!(paths.contains(&format!("requests/{id}/status")));
        assert!(paths.contains(&format!("requests/{id}/updatedAt")));
    }

    // Local mirrors move immediately; the echo agrees.
    for id in [&a.id, &b.id, &c.id] {
        assert_eq!(engine.request(id).await.unwrap().status, Status::Closed);
    }
    settle().await;
    for id in [&a.id, &b.id, &c.id] {
        assert_eq!(engine.request(id).await.unwrap().status, Status::Closed);
    }
}

#[tokio::test]
async fn empty_bulk_sweep_writes_nothing() {
    let (engine, store) = engine_with_store().await;
    engine
        .bulk_update_request_status(&[], Status::Closed)
        .await
        .unwrap();
    assert!(store.multi_calls().is_empty());
}

#[tokio::test]
async fn reset_keeps_only_the_acting_admin() {
    let (engine, store) = engine_with_store().await;
    seed_user(&store, "boss", Role::Admin).await;
    seed_user(&store, "dana", Role::User).await;
    let ticket = engine.add_request(draft_request("Old noise")).await.unwrap();
    engine
        .add_comment(draft_comment(&ticket.id, "Old thread", false))
        .await
        .unwrap();
    settle().await;
    assert_eq!(engine.users().await.len(), 2);

    let before = store.multi_calls().len();
    engine.reset_system("boss").await.unwrap();
    settle().await;

    let multi = store.multi_calls();
    assert_eq!(multi.len(), before + 1, "reset is one combined write");
    assert_eq!(multi[before], vec!["comments", "requests", "units", "users"]);

    assert!(engine.sorted_requests().await.is_empty());
    assert!(
        engine
            .comments_for_request(&ticket.id, Role::Admin)
            .await
            .is_empty()
    );

    let users = engine.users().await;
    assert_eq!(users.len(), 1);
    assert_eq!(users[0].id, "boss");

    let units = engine.units().await;
    assert_eq!(units.len(), 1);
    assert_eq!(units[0].name, DEFAULT_UNIT_NAME);
}

#[tokio::test]
async fn rejected_reset_changes_nothing() {
    let (engine, store) = engine_with_store().await;
    seed_user(&store, "boss", Role::Admin).await;
    engine.add_request(draft_request("Survivor")).await.unwrap();
    settle().await;

    store.reject_writes(true);
    assert!(engine.reset_system("boss").await.is_err());
    store.reject_writes(false);
    settle().await;

    assert_eq!(engine.sorted_requests().await.len(), 1);
    assert_eq!(engine.users().await.len(), 1);
    assert!(!store
        .calls()
        .iter()
        .any(|call| matches!(call, Call::Delete { .. })));
}

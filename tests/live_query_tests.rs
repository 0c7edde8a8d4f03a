use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use arabshield_portal::{
    LiveQuery, MemoryStore, Portal, QueryState, StoreClient, StoreError,
};

fn portal_with_store() -> (Portal, MemoryStore) {
    let _ = tracing_subscriber::fmt().with_test_writer().try_init();
    let store = MemoryStore::new();
    let portal = Portal::new(Arc::new(store.clone()) as Arc<dyn StoreClient>);
    (portal, store)
}

async fn wait_for<T, F>(query: &mut LiveQuery<T>, cond: F) -> QueryState<T>
where
    T: Clone,
    F: Fn(&QueryState<T>) -> bool,
{
    tokio::time::timeout(Duration::from_secs(2), async {
        loop {
            let state = query.current();
            if cond(&state) {
                return state;
            }
            assert!(query.changed().await, "live query task ended early");
        }
    })
    .await
    .expect("timed out waiting for live query state")
}

fn project_fields(owner: &str, title: &str, created_at: &str) -> serde_json::Value {
    json!({
        "title": title,
        "ownerId": owner,
        "status": "active",
        "progress": 10,
        "createdAt": created_at,
    })
}

#[tokio::test]
async fn absent_scope_publishes_empty_state_without_store_calls() {
    let (portal, store) = portal_with_store();

    let projects = portal.projects(None);
    let state = projects.current();
    assert!(state.items.is_empty());
    assert!(!state.loading);
    assert!(state.error.is_none());

    let invoices = portal.invoices(None);
    assert!(!invoices.current().loading);
    let messages = portal.project_messages(None);
    assert!(!messages.current().loading);

    assert_eq!(store.subscribe_calls(), 0);
    assert_eq!(store.active_subscriptions(), 0);
}

#[tokio::test]
async fn snapshots_replace_the_full_list() {
    let (portal, store) = portal_with_store();
    store.insert("projects", "p1", project_fields("u1", "A", "2025-01-01T00:00:00Z"));
    store.insert("projects", "p2", project_fields("u1", "B", "2025-01-02T00:00:00Z"));
    store.insert("projects", "p3", project_fields("u1", "C", "2025-01-03T00:00:00Z"));

    let mut projects = portal.projects(Some("u1"));
    let state = wait_for(&mut projects, |s| !s.loading && s.items.len() == 3).await;
    // Descending by createdAt.
    assert_eq!(state.items[0].title, "C");

    // A shrinking snapshot must not leave stale entries behind.
    store.remove("projects", "p2");
    let state = wait_for(&mut projects, |s| s.items.len() == 2).await;
    assert!(state.items.iter().all(|p| p.title != "B"));
}

#[tokio::test]
async fn scoping_filters_out_other_owners() {
    let (portal, store) = portal_with_store();
    store.insert("projects", "p1", project_fields("u1", "Mine", "2025-01-01T00:00:00Z"));
    store.insert("projects", "p2", project_fields("u2", "Theirs", "2025-01-02T00:00:00Z"));

    let mut projects = portal.projects(Some("u1"));
    let state = wait_for(&mut projects, |s| !s.loading).await;
    assert_eq!(state.items.len(), 1);
    assert_eq!(state.items[0].title, "Mine");
}

#[tokio::test]
async fn subscription_error_keeps_loaded_items_and_localizes_message() {
    let (portal, store) = portal_with_store();
    store.insert("projects", "p1", project_fields("u1", "A", "2025-01-01T00:00:00Z"));

    let mut projects = portal.projects(Some("u1"));
    wait_for(&mut projects, |s| !s.loading && s.items.len() == 1).await;

    store.fail_subscribers("projects", StoreError::PermissionDenied);
    let state = wait_for(&mut projects, |s| s.error.is_some()).await;

    // Stale-but-present beats blank: the loaded list survives the failure.
    assert_eq!(state.items.len(), 1);
    assert!(!state.loading);
    // Generic localized message, no backend detail.
    let message = state.error.unwrap();
    assert_eq!(message, "فشل في تحميل المشاريع");
    assert!(!message.contains("permission"));
}

#[tokio::test]
async fn error_before_first_snapshot_settles_loading() {
    let (portal, store) = portal_with_store();
    let mut projects = portal.projects(Some("u1"));
    store.fail_subscribers("projects", StoreError::Unavailable("offline".to_string()));
    let state = wait_for(&mut projects, |s| s.error.is_some()).await;
    assert!(!state.loading);
    assert!(state.items.is_empty());
}

#[tokio::test]
async fn dropping_the_handle_unsubscribes_exactly_once() {
    let (portal, store) = portal_with_store();

    let projects = portal.projects(Some("u1"));
    let tickets = portal.support_tickets(Some("u1"));
    assert_eq!(store.subscribe_calls(), 2);
    assert_eq!(store.active_subscriptions(), 2);

    drop(projects);
    assert_eq!(store.active_subscriptions(), 1);
    drop(tickets);
    assert_eq!(store.active_subscriptions(), 0);

    // A detached query has no subscription to release.
    let detached = portal.projects(None);
    drop(detached);
    assert_eq!(store.subscribe_calls(), 2);
}

#[tokio::test]
async fn chat_messages_arrive_in_chronological_order() {
    let (portal, store) = portal_with_store();
    let collection = "messages/proj-1/messages";
    store.insert(
        collection,
        "m2",
        json!({
            "senderId": "u1", "senderName": "Sara", "projectId": "proj-1",
            "message": "later", "timestamp": "2025-01-02T00:00:00Z"
        }),
    );
    store.insert(
        collection,
        "m1",
        json!({
            "senderId": "u2", "senderName": "Omar", "projectId": "proj-1",
            "message": "first", "timestamp": "2025-01-01T00:00:00Z"
        }),
    );

    let mut messages = portal.project_messages(Some("proj-1"));
    let state = wait_for(&mut messages, |s| !s.loading && s.items.len() == 2).await;
    assert_eq!(state.items[0].message, "first");
    assert_eq!(state.items[1].message, "later");
}

#[tokio::test]
async fn malformed_documents_are_dropped_from_snapshots() {
    let (portal, store) = portal_with_store();
    store.insert("projects", "ok", project_fields("u1", "Good", "2025-01-01T00:00:00Z"));
    store.insert("projects", "bad", json!({"ownerId": "u1", "title": "No status"}));

    let mut projects = portal.projects(Some("u1"));
    let state = wait_for(&mut projects, |s| !s.loading).await;
    assert_eq!(state.items.len(), 1);
    assert_eq!(state.items[0].title, "Good");
}

#[tokio::test]
async fn activities_feed_is_capped_and_descending() {
    let (portal, store) = portal_with_store();
    for i in 0..25 {
        store.insert(
            "activities",
            &format!("a{}", i),
            json!({
                "type": "order_created",
                "description": format!("activity {}", i),
                "timestamp": format!("2025-01-01T00:00:{:02}Z", i % 60),
                "userId": "u1",
            }),
        );
    }

    let mut activities = portal.activities(Some("u1"));
    let state = wait_for(&mut activities, |s| !s.loading && !s.items.is_empty()).await;
    assert_eq!(state.items.len(), 20);
    assert_eq!(state.items[0].description, "activity 24");
}

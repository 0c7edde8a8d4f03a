use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering as AtomicOrdering};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::mpsc;

use crate::store::{
    resolve_server_timestamps, Direction, Query, SnapshotEvent, StoreClient, StoreError,
    StoredDoc, Subscription, SubscriptionGuard,
};
use crate::utils::now_rfc3339;

struct Subscriber {
    id: u64,
    query: Query,
    tx: mpsc::UnboundedSender<SnapshotEvent>,
}

#[derive(Default)]
struct Shared {
    collections: Mutex<HashMap<String, Vec<StoredDoc>>>,
    subscribers: Mutex<Vec<Subscriber>>,
    next_subscriber: AtomicU64,
    subscribe_calls: AtomicUsize,
}

/// In-process document store with push subscriptions; every write
/// re-evaluates matching subscriber queries and pushes a complete snapshot.
#[derive(Clone, Default)]
pub struct MemoryStore {
    shared: Arc<Shared>,
}

// Guarded data stays a valid snapshot even if a writer panicked, so a
// poisoned lock is recovered rather than propagated.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }

    /// Seeds or replaces a document without going through the async write
    /// path. Broadcasts like a normal write.
    pub fn insert(&self, collection: &str, id: &str, fields: Value) {
        {
            let mut collections = lock(&self.shared.collections);
            let docs = collections.entry(collection.to_string()).or_default();
            let doc = StoredDoc {
                id: id.to_string(),
                fields,
            };
            match docs.iter_mut().find(|d| d.id == id) {
                Some(existing) => *existing = doc,
                None => docs.push(doc),
            }
        }
        self.broadcast(collection);
    }

    pub fn remove(&self, collection: &str, id: &str) {
        {
            let mut collections = lock(&self.shared.collections);
            if let Some(docs) = collections.get_mut(collection) {
                docs.retain(|d| d.id != id);
            }
        }
        self.broadcast(collection);
    }

    /// Pushes an error event to every subscriber of the collection.
    /// Test hook for permission-denied / network-loss scenarios.
    pub fn fail_subscribers(&self, collection: &str, error: StoreError) {
        let subscribers = lock(&self.shared.subscribers);
        for subscriber in subscribers.iter() {
            if subscriber.query.collection == collection {
                let _ = subscriber.tx.send(SnapshotEvent::Error(error.clone()));
            }
        }
    }

    /// Total number of `subscribe` calls ever made against this store.
    pub fn subscribe_calls(&self) -> usize {
        self.shared.subscribe_calls.load(AtomicOrdering::SeqCst)
    }

    /// Subscriptions whose guard has not been released yet.
    pub fn active_subscriptions(&self) -> usize {
        lock(&self.shared.subscribers).len()
    }

    fn evaluate(&self, query: &Query) -> Vec<StoredDoc> {
        let collections = lock(&self.shared.collections);
        let mut docs: Vec<StoredDoc> = collections
            .get(&query.collection)
            .map(|docs| {
                docs.iter()
                    .filter(|doc| matches_filters(doc, query))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if let Some(order) = &query.order_by {
            docs.sort_by(|a, b| {
                let ordering = compare_values(
                    a.fields.get(&order.field).unwrap_or(&Value::Null),
                    b.fields.get(&order.field).unwrap_or(&Value::Null),
                );
                match order.direction {
                    Direction::Asc => ordering,
                    Direction::Desc => ordering.reverse(),
                }
            });
        }
        if let Some(limit) = query.limit {
            docs.truncate(limit);
        }
        docs
    }

    fn broadcast(&self, collection: &str) {
        let snapshots: Vec<(mpsc::UnboundedSender<SnapshotEvent>, Vec<StoredDoc>)> = {
            let subscribers = lock(&self.shared.subscribers);
            subscribers
                .iter()
                .filter(|s| s.query.collection == collection)
                .map(|s| (s.tx.clone(), self.evaluate(&s.query)))
                .collect()
        };
        for (tx, docs) in snapshots {
            let _ = tx.send(SnapshotEvent::Snapshot(docs));
        }
    }
}

fn matches_filters(doc: &StoredDoc, query: &Query) -> bool {
    query
        .filters
        .iter()
        .all(|filter| doc.fields.get(&filter.field) == Some(&filter.value))
}

fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (a.as_f64(), b.as_f64()) {
        (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
        _ => {
            let a = a.as_str().unwrap_or_default();
            let b = b.as_str().unwrap_or_default();
            a.cmp(b)
        }
    }
}

#[async_trait]
impl StoreClient for MemoryStore {
    fn subscribe(&self, query: Query) -> Subscription {
        self.shared
            .subscribe_calls
            .fetch_add(1, AtomicOrdering::SeqCst);
        let (tx, events) = mpsc::unbounded_channel();

        // Initial full snapshot before any change events.
        let _ = tx.send(SnapshotEvent::Snapshot(self.evaluate(&query)));

        let id = self
            .shared
            .next_subscriber
            .fetch_add(1, AtomicOrdering::SeqCst);
        lock(&self.shared.subscribers).push(Subscriber { id, query, tx });

        let shared = self.shared.clone();
        let guard = SubscriptionGuard::new(move || {
            lock(&shared.subscribers).retain(|s| s.id != id);
        });
        Subscription { events, guard }
    }

    async fn get_docs(&self, query: Query) -> Result<Vec<StoredDoc>, StoreError> {
        Ok(self.evaluate(&query))
    }

    async fn add_doc(&self, collection: &str, mut fields: Value) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().to_string();
        resolve_server_timestamps(&mut fields, &now_rfc3339());
        self.insert(collection, &id, fields);
        Ok(id)
    }

    async fn update_doc(
        &self,
        collection: &str,
        id: &str,
        mut fields: Value,
    ) -> Result<(), StoreError> {
        resolve_server_timestamps(&mut fields, &now_rfc3339());
        {
            let mut collections = lock(&self.shared.collections);
            let doc = collections
                .get_mut(collection)
                .and_then(|docs| docs.iter_mut().find(|d| d.id == id))
                .ok_or_else(|| StoreError::NotFound(format!("{}/{}", collection, id)))?;
            match (doc.fields.as_object_mut(), fields.as_object()) {
                (Some(existing), Some(updates)) => {
                    for (key, value) in updates {
                        existing.insert(key.clone(), value.clone());
                    }
                }
                _ => {
                    return Err(StoreError::InvalidQuery(
                        "update fields must be an object".to_string(),
                    ))
                }
            }
        }
        self.broadcast(collection);
        Ok(())
    }

    async fn delete_doc(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        self.remove(collection, id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::server_timestamp;
    use serde_json::json;

    #[tokio::test]
    async fn writes_broadcast_full_snapshots() {
        let store = MemoryStore::new();
        let query = Query::collection("projects").filter_eq("ownerId", "u1");
        let mut sub = store.subscribe(query);

        // Initial empty snapshot.
        match sub.events.recv().await.unwrap() {
            SnapshotEvent::Snapshot(docs) => assert!(docs.is_empty()),
            other => panic!("unexpected event: {:?}", other),
        }

        store.insert("projects", "p1", json!({"ownerId": "u1", "title": "A"}));
        store.insert("projects", "p2", json!({"ownerId": "u2", "title": "B"}));

        match sub.events.recv().await.unwrap() {
            SnapshotEvent::Snapshot(docs) => {
                assert_eq!(docs.len(), 1);
                assert_eq!(docs[0].id, "p1");
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn guard_release_removes_subscriber() {
        let store = MemoryStore::new();
        let sub = store.subscribe(Query::collection("projects"));
        assert_eq!(store.active_subscriptions(), 1);
        drop(sub);
        assert_eq!(store.active_subscriptions(), 0);
        assert_eq!(store.subscribe_calls(), 1);
    }

    #[tokio::test]
    async fn add_doc_resolves_server_timestamp() {
        let store = MemoryStore::new();
        let id = store
            .add_doc("invoices", json!({"createdAt": server_timestamp(), "amount": 10.0}))
            .await
            .unwrap();
        let docs = store.get_docs(Query::collection("invoices")).await.unwrap();
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0].id, id);
        assert!(docs[0].fields["createdAt"].is_string());
    }

    #[tokio::test]
    async fn ordering_and_limit_apply() {
        let store = MemoryStore::new();
        store.insert("messages", "m1", json!({"timestamp": "2025-01-02T00:00:00Z"}));
        store.insert("messages", "m2", json!({"timestamp": "2025-01-01T00:00:00Z"}));
        store.insert("messages", "m3", json!({"timestamp": "2025-01-03T00:00:00Z"}));

        let docs = store
            .get_docs(
                Query::collection("messages")
                    .order_by("timestamp", Direction::Asc)
                    .limit(2),
            )
            .await
            .unwrap();
        assert_eq!(docs.len(), 2);
        assert_eq!(docs[0].id, "m2");
        assert_eq!(docs[1].id, "m1");
    }
}

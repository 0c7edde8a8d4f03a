pub mod memory;
pub mod rest;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::mpsc;

pub use memory::MemoryStore;
pub use rest::{RestConfig, RestStore};

#[derive(Debug, Clone, Error)]
pub enum StoreError {
    #[error("permission denied")]
    PermissionDenied,
    #[error("document not found: {0}")]
    NotFound(String),
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("backend error {status}: {message}")]
    Backend { status: u16, message: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Asc,
    Desc,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Filter {
    pub field: String,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderBy {
    pub field: String,
    pub direction: Direction,
}

/// Collection paths and filter field names must match the hosted store
/// exactly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Query {
    pub collection: String,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub order_by: Option<OrderBy>,
    #[serde(default)]
    pub limit: Option<usize>,
}

impl Query {
    pub fn collection(path: impl Into<String>) -> Self {
        Query {
            collection: path.into(),
            filters: Vec::new(),
            order_by: None,
            limit: None,
        }
    }

    pub fn filter_eq(mut self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push(Filter {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    pub fn order_by(mut self, field: impl Into<String>, direction: Direction) -> Self {
        self.order_by = Some(OrderBy {
            field: field.into(),
            direction,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }
}

/// A raw document as the store returns it: an id plus untyped fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDoc {
    pub id: String,
    pub fields: Value,
}

#[derive(Debug, Clone)]
pub enum SnapshotEvent {
    /// Complete materialization of the query's matching documents.
    Snapshot(Vec<StoredDoc>),
    Error(StoreError),
}

/// Tears down a live subscription exactly once, via `cancel` or on drop.
pub struct SubscriptionGuard {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl SubscriptionGuard {
    pub fn new(cancel: impl FnOnce() + Send + 'static) -> Self {
        SubscriptionGuard {
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn cancel(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

pub struct Subscription {
    pub events: mpsc::UnboundedReceiver<SnapshotEvent>,
    pub guard: SubscriptionGuard,
}

#[async_trait]
pub trait StoreClient: Send + Sync + 'static {
    /// The initial full snapshot is delivered first, then a fresh snapshot
    /// on every underlying change until the guard is released.
    fn subscribe(&self, query: Query) -> Subscription;

    async fn get_docs(&self, query: Query) -> Result<Vec<StoredDoc>, StoreError>;

    async fn add_doc(&self, collection: &str, fields: Value) -> Result<String, StoreError>;

    async fn update_doc(&self, collection: &str, id: &str, fields: Value)
        -> Result<(), StoreError>;

    async fn delete_doc(&self, collection: &str, id: &str) -> Result<(), StoreError>;
}

const SERVER_TIMESTAMP_KEY: &str = "__serverTimestamp";

/// Sentinel resolved to an authoritative time on the store side.
pub fn server_timestamp() -> Value {
    json!({ SERVER_TIMESTAMP_KEY: true })
}

pub(crate) fn resolve_server_timestamps(fields: &mut Value, now: &str) {
    if let Some(map) = fields.as_object_mut() {
        for value in map.values_mut() {
            let is_sentinel = value
                .as_object()
                .map(|o| o.contains_key(SERVER_TIMESTAMP_KEY))
                .unwrap_or(false);
            if is_sentinel {
                *value = Value::String(now.to_string());
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_builder_accumulates_predicates() {
        let query = Query::collection("projects")
            .filter_eq("ownerId", "u1")
            .order_by("createdAt", Direction::Desc)
            .limit(10);
        assert_eq!(query.collection, "projects");
        assert_eq!(query.filters.len(), 1);
        assert_eq!(query.filters[0].field, "ownerId");
        assert_eq!(query.limit, Some(10));
    }

    #[test]
    fn server_timestamp_sentinel_resolves_on_write() {
        let mut fields = json!({
            "status": "pending",
            "createdAt": server_timestamp(),
        });
        resolve_server_timestamps(&mut fields, "2025-01-01T00:00:00+00:00");
        assert_eq!(fields["createdAt"], "2025-01-01T00:00:00+00:00");
        assert_eq!(fields["status"], "pending");
    }
}

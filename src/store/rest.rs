use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tokio::sync::{mpsc, Notify};

use crate::store::{
    Query, SnapshotEvent, StoreClient, StoreError, StoredDoc, Subscription, SubscriptionGuard,
};

#[derive(Debug, Clone)]
pub struct RestConfig {
    pub base_url: String,
    pub api_token: Option<String>,
    /// Subscription poll cadence. The gateway has no push channel, so live
    /// queries re-run on this interval and emit only when the result changes.
    pub poll_interval: Duration,
}

impl RestConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        RestConfig {
            base_url: base_url.into(),
            api_token: None,
            poll_interval: Duration::from_secs(5),
        }
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }
}

struct Inner {
    client: reqwest::Client,
    config: RestConfig,
}

/// Store client against the portal's document gateway.
pub struct RestStore {
    inner: Arc<Inner>,
}

#[derive(Deserialize)]
struct CreatedDoc {
    id: String,
}

impl RestStore {
    pub fn new(config: RestConfig) -> Self {
        RestStore {
            inner: Arc::new(Inner {
                client: reqwest::Client::new(),
                config,
            }),
        }
    }
}

impl Inner {
    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let url = format!("{}/{}", self.config.base_url.trim_end_matches('/'), path);
        let mut builder = self.client.request(method, url);
        if let Some(token) = &self.config.api_token {
            builder = builder.bearer_auth(token);
        }
        builder
    }

    async fn run_query(&self, query: &Query) -> Result<Vec<StoredDoc>, StoreError> {
        let response = self
            .request(reqwest::Method::POST, "v1/query")
            .json(query)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let response = check_status(response).await?;
        response
            .json::<Vec<StoredDoc>>()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))
    }
}

async fn check_status(response: reqwest::Response) -> Result<reqwest::Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        400 => StoreError::InvalidQuery(message),
        401 | 403 => StoreError::PermissionDenied,
        404 => StoreError::NotFound(message),
        code => StoreError::Backend {
            status: code,
            message,
        },
    })
}

#[async_trait]
impl StoreClient for RestStore {
    fn subscribe(&self, query: Query) -> Subscription {
        let (tx, events) = mpsc::unbounded_channel();
        let cancel = Arc::new(Notify::new());
        let inner = self.inner.clone();
        let stop = cancel.clone();

        tokio::spawn(async move {
            let interval = inner.config.poll_interval;
            let mut last: Option<Vec<StoredDoc>> = None;
            let mut failing = false;
            loop {
                match inner.run_query(&query).await {
                    Ok(docs) => {
                        failing = false;
                        if last.as_ref() != Some(&docs) {
                            last = Some(docs.clone());
                            if tx.send(SnapshotEvent::Snapshot(docs)).is_err() {
                                break;
                            }
                        }
                    }
                    Err(err) => {
                        // One error event per failure streak; the next
                        // successful poll resumes snapshots.
                        if !failing {
                            failing = true;
                            tracing::warn!(
                                collection = %query.collection,
                                error = %err,
                                "live query poll failed"
                            );
                            if tx.send(SnapshotEvent::Error(err)).is_err() {
                                break;
                            }
                        }
                    }
                }
                tokio::select! {
                    _ = tokio::time::sleep(interval) => {}
                    _ = stop.notified() => break,
                }
            }
        });

        let guard = SubscriptionGuard::new(move || cancel.notify_one());
        Subscription { events, guard }
    }

    async fn get_docs(&self, query: Query) -> Result<Vec<StoredDoc>, StoreError> {
        self.inner.run_query(&query).await
    }

    async fn add_doc(&self, collection: &str, fields: Value) -> Result<String, StoreError> {
        let response = self
            .inner
            .request(reqwest::Method::POST, &format!("v1/{}", collection))
            .json(&fields)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        let response = check_status(response).await?;
        let created: CreatedDoc = response
            .json()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(created.id)
    }

    async fn update_doc(
        &self,
        collection: &str,
        id: &str,
        fields: Value,
    ) -> Result<(), StoreError> {
        let response = self
            .inner
            .request(reqwest::Method::PATCH, &format!("v1/{}/{}", collection, id))
            .json(&fields)
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }

    async fn delete_doc(&self, collection: &str, id: &str) -> Result<(), StoreError> {
        let response = self
            .inner
            .request(reqwest::Method::DELETE, &format!("v1/{}/{}", collection, id))
            .send()
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        check_status(response).await?;
        Ok(())
    }
}

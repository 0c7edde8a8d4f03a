use tokio::sync::watch;

use crate::services::decode::{decode_snapshot, Decode};
use crate::store::{SnapshotEvent, Subscription, SubscriptionGuard};

/// `loading` starts true and flips false on the first settlement (snapshot
/// or error). `error` carries only a localized generic message.
#[derive(Debug, Clone)]
pub struct QueryState<T> {
    pub items: Vec<T>,
    pub loading: bool,
    pub error: Option<String>,
}

impl<T> QueryState<T> {
    fn loading() -> Self {
        QueryState {
            items: Vec::new(),
            loading: true,
            error: None,
        }
    }

    fn empty() -> Self {
        QueryState {
            items: Vec::new(),
            loading: false,
            error: None,
        }
    }
}

/// Handle to one live subscription. Each snapshot replaces the item list
/// wholesale; dropping the handle releases the subscription.
pub struct LiveQuery<T> {
    rx: watch::Receiver<QueryState<T>>,
    _guard: Option<SubscriptionGuard>,
}

impl<T: Clone> LiveQuery<T> {
    pub fn current(&self) -> QueryState<T> {
        self.rx.borrow().clone()
    }

    pub fn watch(&self) -> watch::Receiver<QueryState<T>> {
        self.rx.clone()
    }

    /// Returns false once the subscription task has shut down.
    pub async fn changed(&mut self) -> bool {
        self.rx.changed().await.is_ok()
    }
}

impl<T> LiveQuery<T> {
    /// Scope-absent short circuit: no store call made.
    pub(crate) fn detached() -> Self {
        let (_tx, rx) = watch::channel(QueryState::empty());
        LiveQuery { rx, _guard: None }
    }

    pub(crate) fn spawn(subscription: Subscription, error_message: &'static str) -> Self
    where
        T: Decode + Clone,
    {
        let (tx, rx) = watch::channel(QueryState::loading());
        let Subscription { mut events, guard } = subscription;

        tokio::spawn(async move {
            while let Some(event) = events.recv().await {
                let next = match event {
                    SnapshotEvent::Snapshot(docs) => QueryState {
                        items: decode_snapshot::<T>(&docs),
                        loading: false,
                        error: None,
                    },
                    SnapshotEvent::Error(err) => {
                        tracing::error!(error = %err, "live query subscription error");
                        // Keep whatever loaded before the failure on screen.
                        QueryState {
                            items: tx.borrow().items.clone(),
                            loading: false,
                            error: Some(error_message.to_string()),
                        }
                    }
                };
                if tx.send(next).is_err() {
                    break;
                }
            }
        });

        LiveQuery {
            rx,
            _guard: Some(guard),
        }
    }
}

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use super::{DocPath, Document, DocumentStore, Snapshot, Subscription};
use crate::error::StoreError;

const CHANGE_FEED_CAPACITY: usize = 256;

/// Process-local document store. Every write is fanned out to subscribers of the
/// written path.
#[derive(Clone)]
pub struct InMemoryStore {
    inner: Arc<Inner>,
}

struct Inner {
    docs: RwLock<HashMap<DocPath, Document>>,
    changes: broadcast::Sender<Snapshot>,
    offline: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        let (changes, _) = broadcast::channel(CHANGE_FEED_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                docs: RwLock::new(HashMap::new()),
                changes,
                offline: AtomicBool::new(false),
            }),
        }
    }

    /// While offline every write fails with [`StoreError::Write`]. Reads and
    /// subscriptions keep working from the last state.
    #[cfg(test)]
    pub(crate) fn set_offline(&self, offline: bool) {
        self.inner.offline.store(offline, Ordering::SeqCst);
    }

    fn check_online(&self, path: &DocPath) -> Result<(), StoreError> {
        if self.inner.offline.load(Ordering::SeqCst) {
            return Err(StoreError::write(path, "document store is offline"));
        }
        Ok(())
    }

    async fn write(
        &self,
        path: &DocPath,
        apply: impl FnOnce(Option<&mut Document>) -> Document,
    ) -> Result<(), StoreError> {
        self.check_online(path)?;

        let mut docs = self.inner.docs.write().await;
        let updated = apply(docs.get_mut(path));
        docs.insert(path.clone(), updated.clone());

        // Sent under the write lock so subscribers observe writes in commit order.
        let receivers = self
            .inner
            .changes
            .send(Snapshot::new(path.clone(), Some(updated)))
            .unwrap_or(0);
        debug!(%path, receivers, "document written");
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn get_document(&self, path: &DocPath) -> Result<Option<Document>, StoreError> {
        Ok(self.inner.docs.read().await.get(path).cloned())
    }

    async fn set_document(&self, path: &DocPath, data: Document) -> Result<(), StoreError> {
        self.write(path, move |_| data).await
    }

    async fn update_document(&self, path: &DocPath, fields: Document) -> Result<(), StoreError> {
        self.write(path, move |existing| {
            let mut doc = existing.map(|d| d.clone()).unwrap_or_default();
            doc.extend(fields);
            doc
        })
        .await
    }

    async fn add_document(&self, collection: &str, data: Document) -> Result<String, StoreError> {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let path = DocPath::new(collection, id.clone());
        self.write(&path, move |_| data).await?;
        Ok(id)
    }

    async fn subscribe_document(&self, path: &DocPath) -> Result<Subscription, StoreError> {
        // Join the change feed before reading so no write can slip in between.
        let mut changes = self.inner.changes.subscribe();
        let current = self.get_document(path).await?;

        let (tx, subscription) = Subscription::channel(path.clone());
        let inner = self.inner.clone();
        let path = path.clone();

        let task = tokio::spawn(async move {
            if tx
                .send(Ok(Snapshot::new(path.clone(), current)))
                .await
                .is_err()
            {
                return;
            }

            loop {
                let snapshot = match changes.recv().await {
                    Ok(snapshot) if snapshot.path == path => snapshot,
                    Ok(_) => continue,
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(%path, skipped, "subscriber lagged; resending current state");
                        let data = inner.docs.read().await.get(&path).cloned();
                        Snapshot::new(path.clone(), data)
                    }
                    Err(RecvError::Closed) => break,
                };

                if tx.send(Ok(snapshot)).await.is_err() {
                    break;
                }
            }
        });

        Ok(subscription.with_task(task))
    }
}

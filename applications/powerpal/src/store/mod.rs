//! Hosted document store abstraction.
//!
//! Documents are JSON objects addressed by `collection/id`. The dashboard only ever touches
//! three places: `users/{uid}`, the shared `realtime_data/latest` document and the
//! write-only `loads` collection.

pub mod memory;
pub mod postgres;

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::fmt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::StoreError;

pub use memory::InMemoryStore;
pub use postgres::PostgresStore;

pub type Document = Map<String, Value>;

pub const USERS_COLLECTION: &str = "users";
pub const CREDENTIALS_COLLECTION: &str = "credentials";
pub const REALTIME_COLLECTION: &str = "realtime_data";
pub const LATEST_DOCUMENT: &str = "latest";
pub const LOADS_COLLECTION: &str = "loads";

/// Field of `realtime_data/latest` holding the device array.
pub const LOADS_FIELD: &str = "loads";

const SUBSCRIPTION_BUFFER: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DocPath {
    pub collection: String,
    pub id: String,
}

impl DocPath {
    pub fn new(collection: impl Into<String>, id: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            id: id.into(),
        }
    }

    /// `realtime_data/latest`
    pub fn latest_loads() -> Self {
        Self::new(REALTIME_COLLECTION, LATEST_DOCUMENT)
    }

    pub fn user(uid: &str) -> Self {
        Self::new(USERS_COLLECTION, uid)
    }
}

impl fmt::Display for DocPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.id)
    }
}

/// Point-in-time read of a subscribed document. `data` is `None` when the document does
/// not exist.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub path: DocPath,
    pub data: Option<Document>,
}

impl Snapshot {
    pub fn new(path: DocPath, data: Option<Document>) -> Self {
        Self { path, data }
    }

    pub fn exists(&self) -> bool {
        self.data.is_some()
    }
}

pub type SnapshotResult = Result<Snapshot, StoreError>;

/// Standing subscription to one document. Dropping it stops delivery.
pub struct Subscription {
    path: DocPath,
    rx: mpsc::Receiver<SnapshotResult>,
    task: Option<JoinHandle<()>>,
}

impl Subscription {
    /// Creates a subscription fed through the returned sender.
    pub fn channel(path: DocPath) -> (mpsc::Sender<SnapshotResult>, Self) {
        let (tx, rx) = mpsc::channel(SUBSCRIPTION_BUFFER);
        (
            tx,
            Self {
                path,
                rx,
                task: None,
            },
        )
    }

    /// Ties the lifetime of the feeding task to this subscription.
    pub fn with_task(mut self, task: JoinHandle<()>) -> Self {
        self.task = Some(task);
        self
    }

    pub fn path(&self) -> &DocPath {
        &self.path
    }

    /// Next snapshot or delivery error. `None` once the feed has ended.
    pub async fn next(&mut self) -> Option<SnapshotResult> {
        self.rx.recv().await
    }

    pub fn unsubscribe(self) {
        tracing::debug!(path = %self.path, "unsubscribing");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get_document(&self, path: &DocPath) -> Result<Option<Document>, StoreError>;

    /// Replace the whole document.
    async fn set_document(&self, path: &DocPath, data: Document) -> Result<(), StoreError>;

    /// Merge top-level fields into the document, creating it when absent.
    async fn update_document(&self, path: &DocPath, fields: Document) -> Result<(), StoreError>;

    /// Store a new document under a generated id and return the id.
    async fn add_document(&self, collection: &str, data: Document) -> Result<String, StoreError>;

    /// The first item delivered is the document's current state.
    async fn subscribe_document(&self, path: &DocPath) -> Result<Subscription, StoreError>;
}

/// Serialize a value that must be a JSON object into a [`Document`].
pub fn to_document<T: serde::Serialize>(value: &T) -> Result<Document, StoreError> {
    match serde_json::to_value(value)? {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::Serialization(serde::ser::Error::custom(format!(
            "expected a JSON object, got {}",
            other
        )))),
    }
}

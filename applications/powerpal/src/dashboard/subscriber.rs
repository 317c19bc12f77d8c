use tracing::{debug, warn};

use crate::error::StoreError;
use crate::models::Device;
use crate::store::{DocPath, DocumentStore, Snapshot, Subscription, LOADS_FIELD};

/// Outcome of one delivered snapshot.
#[derive(Debug)]
pub enum ListUpdate {
    /// The local list was replaced.
    Replaced,
    /// The document is missing or has no usable `loads` array. The list is unchanged.
    NoData,
    /// Delivery failed. The last known list stays in place.
    Stale(StoreError),
}

/// Mirror of the device list held in one document.
pub struct LiveListSubscriber {
    subscription: Subscription,
    devices: Vec<Device>,
    /// Bumped every time a snapshot replaces the list.
    generation: u64,
}

impl LiveListSubscriber {
    /// Opens the subscription and applies the document's current state before returning.
    pub async fn open(store: &dyn DocumentStore, path: &DocPath) -> Result<Self, StoreError> {
        let subscription = store.subscribe_document(path).await?;
        let mut subscriber = Self {
            subscription,
            devices: Vec::new(),
            generation: 0,
        };

        if let Some(update) = subscriber.recv().await {
            debug!(%path, ?update, devices = subscriber.devices.len(), "initial snapshot");
        }
        Ok(subscriber)
    }

    pub fn devices(&self) -> &[Device] {
        &self.devices
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Adopt a list that was just written, unless a snapshot has replaced the list since
    /// `basis`. Returns whether the list was adopted.
    pub fn adopt(&mut self, devices: Vec<Device>, basis: u64) -> bool {
        if self.generation != basis {
            return false;
        }
        self.devices = devices;
        true
    }

    /// Wait for the next snapshot and apply it. `None` once the feed has ended.
    pub async fn recv(&mut self) -> Option<ListUpdate> {
        let update = match self.subscription.next().await? {
            Ok(snapshot) => match extract_loads(&snapshot) {
                Some(devices) => {
                    self.devices = devices;
                    self.generation += 1;
                    ListUpdate::Replaced
                }
                None => ListUpdate::NoData,
            },
            Err(e) => {
                warn!(path = %self.subscription.path(), error = %e, "subscription error, keeping last known list");
                ListUpdate::Stale(e)
            }
        };
        Some(update)
    }

    pub fn close(self) {
        self.subscription.unsubscribe();
    }
}

/// Devices in the snapshot's `loads` field, if the document exists and that field is an
/// array of devices.
pub fn extract_loads(snapshot: &Snapshot) -> Option<Vec<Device>> {
    let loads = snapshot.data.as_ref()?.get(LOADS_FIELD)?;
    if !loads.is_array() {
        return None;
    }

    match serde_json::from_value(loads.clone()) {
        Ok(devices) => Some(devices),
        Err(e) => {
            warn!(path = %snapshot.path, error = %e, "ignoring malformed loads array");
            None
        }
    }
}

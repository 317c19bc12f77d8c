use std::sync::Arc;
use tracing::{debug, info};

use super::controller::{write_loads, ControllerError, EditController, PendingWrite};
use super::guard::{GuardDecision, SessionGuard};
use super::subscriber::{ListUpdate, LiveListSubscriber};
use crate::aggregate::{device_cards, DashboardSummary, DeviceCard};
use crate::auth::{AuthGateway, UserIdentity};
use crate::error::StoreError;
use crate::models::{Device, DeviceField};
use crate::store::{DocPath, DocumentStore};

pub enum Activation {
    Redirect(&'static str),
    Active(DashboardSession),
}

#[derive(Debug)]
pub enum SessionEvent {
    List(ListUpdate),
    /// The user signed out or the session expired.
    Ended,
    /// The store stopped delivering snapshots.
    FeedClosed,
}

/// One live dashboard view: guard, live list and edit controller wired together.
pub struct DashboardSession {
    store: Arc<dyn DocumentStore>,
    path: DocPath,
    guard: SessionGuard,
    subscriber: LiveListSubscriber,
    controller: EditController,
    /// Subscriber generation the pending write was built from.
    write_basis: u64,
}

impl DashboardSession {
    /// The document subscription is only opened once the guard lets the session through.
    pub async fn activate(
        auth: &dyn AuthGateway,
        store: Arc<dyn DocumentStore>,
        token: Option<&str>,
    ) -> Result<Activation, StoreError> {
        let guard = match SessionGuard::activate(auth, token).await {
            GuardDecision::Redirect { to } => return Ok(Activation::Redirect(to)),
            GuardDecision::Proceed(guard) => guard,
        };

        let path = DocPath::latest_loads();
        let subscriber = LiveListSubscriber::open(store.as_ref(), &path).await?;
        info!(uid = %guard.identity().uid, devices = subscriber.devices().len(), "dashboard session active");

        Ok(Activation::Active(Self {
            store,
            path,
            guard,
            subscriber,
            controller: EditController::new(),
            write_basis: 0,
        }))
    }

    pub fn identity(&self) -> &UserIdentity {
        self.guard.identity()
    }

    pub fn devices(&self) -> &[Device] {
        self.subscriber.devices()
    }

    pub fn controller(&self) -> &EditController {
        &self.controller
    }

    pub fn store(&self) -> Arc<dyn DocumentStore> {
        self.store.clone()
    }

    pub fn path(&self) -> &DocPath {
        &self.path
    }

    pub fn summary(&self) -> DashboardSummary {
        DashboardSummary::from_devices(self.devices())
    }

    pub fn cards(&self) -> Vec<DeviceCard> {
        device_cards(self.devices())
    }

    pub fn begin_edit(&mut self, index: usize) -> Result<(), ControllerError> {
        self.controller.begin_edit(self.subscriber.devices(), index)
    }

    pub fn change_field(&mut self, field: DeviceField, raw: &str) -> Result<(), ControllerError> {
        self.controller.change_field(field, raw)
    }

    pub fn cancel(&mut self) -> Result<(), ControllerError> {
        self.controller.cancel()
    }

    pub fn change_new_device_field(
        &mut self,
        field: DeviceField,
        raw: &str,
    ) -> Result<(), ControllerError> {
        self.controller.change_new_device_field(field, raw)
    }

    pub fn prepare_save(&mut self) -> Result<PendingWrite, ControllerError> {
        let write = self.controller.prepare_save(self.subscriber.devices())?;
        self.write_basis = self.subscriber.generation();
        Ok(write)
    }

    pub fn prepare_add(&mut self) -> Result<PendingWrite, ControllerError> {
        let write = self.controller.prepare_add(self.subscriber.devices())?;
        self.write_basis = self.subscriber.generation();
        Ok(write)
    }

    /// Settles a prepared write. On success the written list is shown unless a snapshot
    /// arrived while the write was in flight; that snapshot is newer and stays.
    pub fn complete(
        &mut self,
        write: PendingWrite,
        result: Result<(), StoreError>,
    ) -> Result<(), ControllerError> {
        let devices = self.controller.complete(write, result)?;
        if !self.subscriber.adopt(devices, self.write_basis) {
            debug!(uid = %self.guard.identity().uid, "snapshot arrived during write, keeping it");
        }
        Ok(())
    }

    pub async fn save(&mut self) -> Result<(), ControllerError> {
        let write = self.prepare_save()?;
        let result = write_loads(self.store.as_ref(), &self.path, &write.devices).await;
        self.complete(write, result)
    }

    pub async fn add(&mut self) -> Result<(), ControllerError> {
        let write = self.prepare_add()?;
        let result = write_loads(self.store.as_ref(), &self.path, &write.devices).await;
        self.complete(write, result)
    }

    /// Waits for the next snapshot or the end of the session.
    pub async fn next_event(&mut self) -> SessionEvent {
        tokio::select! {
            _ = self.guard.session_ended() => SessionEvent::Ended,
            update = self.subscriber.recv() => match update {
                Some(update) => SessionEvent::List(update),
                None => SessionEvent::FeedClosed,
            },
        }
    }

    /// Cancels the subscription and unregisters from auth state.
    pub fn teardown(self) {
        debug!(uid = %self.guard.identity().uid, "dashboard session closed");
        self.subscriber.close();
    }
}

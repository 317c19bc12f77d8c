//! Edit and add state machine for the device list.
//!
//! Every successful change rewrites the whole `loads` array of the shared document.
//! Writes are split into `prepare_*`, [`write_loads`] and [`EditController::complete`]
//! so a caller can keep serving snapshots while the write is in flight.

use thiserror::Error;
use tracing::{debug, warn};

use crate::error::{StoreError, ValidationError};
use crate::models::{Device, DeviceField};
use crate::store::{DocPath, Document, DocumentStore, LOADS_FIELD};

#[derive(Error, Debug)]
pub enum ControllerError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("failed to save loads: {0}")]
    Store(#[from] StoreError),

    #[error("no device at index {index} (list has {len})")]
    IndexOutOfRange { index: usize, len: usize },

    #[error("no device is being edited")]
    NotEditing,

    #[error("a write is already in progress")]
    WriteInFlight,
}

#[derive(Debug, Clone, PartialEq)]
pub enum EditState {
    Idle,
    Editing { index: usize, draft: Device },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    Save { index: usize },
    Add,
}

/// A whole-list write that has been prepared but not yet confirmed.
#[derive(Debug, Clone)]
pub struct PendingWrite {
    pub kind: WriteKind,
    pub devices: Vec<Device>,
}

#[derive(Debug)]
pub struct EditController {
    state: EditState,
    new_device: Device,
    pending: Option<WriteKind>,
}

impl Default for EditController {
    fn default() -> Self {
        Self::new()
    }
}

impl EditController {
    pub fn new() -> Self {
        Self {
            state: EditState::Idle,
            new_device: Device::default(),
            pending: None,
        }
    }

    pub fn state(&self) -> &EditState {
        &self.state
    }

    pub fn new_device(&self) -> &Device {
        &self.new_device
    }

    pub fn pending(&self) -> Option<WriteKind> {
        self.pending
    }

    fn ensure_not_saving(&self) -> Result<(), ControllerError> {
        match self.pending {
            Some(WriteKind::Save { .. }) => Err(ControllerError::WriteInFlight),
            _ => Ok(()),
        }
    }

    /// Starts editing a copy of `devices[index]`. Replaces any edit already open.
    pub fn begin_edit(&mut self, devices: &[Device], index: usize) -> Result<(), ControllerError> {
        self.ensure_not_saving()?;
        let device = devices.get(index).ok_or(ControllerError::IndexOutOfRange {
            index,
            len: devices.len(),
        })?;

        self.state = EditState::Editing {
            index,
            draft: device.clone(),
        };
        Ok(())
    }

    pub fn change_field(&mut self, field: DeviceField, raw: &str) -> Result<(), ControllerError> {
        self.ensure_not_saving()?;
        match &mut self.state {
            EditState::Editing { draft, .. } => Ok(draft.set_field(field, raw)?),
            EditState::Idle => Err(ControllerError::NotEditing),
        }
    }

    pub fn cancel(&mut self) -> Result<(), ControllerError> {
        self.ensure_not_saving()?;
        match self.state {
            EditState::Editing { .. } => {
                self.state = EditState::Idle;
                Ok(())
            }
            EditState::Idle => Err(ControllerError::NotEditing),
        }
    }

    pub fn change_new_device_field(
        &mut self,
        field: DeviceField,
        raw: &str,
    ) -> Result<(), ControllerError> {
        if self.pending == Some(WriteKind::Add) {
            return Err(ControllerError::WriteInFlight);
        }
        Ok(self.new_device.set_field(field, raw)?)
    }

    /// Builds `devices` with the draft substituted at its index.
    pub fn prepare_save(&mut self, devices: &[Device]) -> Result<PendingWrite, ControllerError> {
        if self.pending.is_some() {
            return Err(ControllerError::WriteInFlight);
        }
        let EditState::Editing { index, draft } = &self.state else {
            return Err(ControllerError::NotEditing);
        };
        let index = *index;
        if index >= devices.len() {
            return Err(ControllerError::IndexOutOfRange {
                index,
                len: devices.len(),
            });
        }

        let mut updated = devices.to_vec();
        updated[index] = draft.clone();

        let kind = WriteKind::Save { index };
        self.pending = Some(kind);
        Ok(PendingWrite {
            kind,
            devices: updated,
        })
    }

    /// Builds `devices` with the new-device buffer appended.
    pub fn prepare_add(&mut self, devices: &[Device]) -> Result<PendingWrite, ControllerError> {
        if self.pending.is_some() {
            return Err(ControllerError::WriteInFlight);
        }

        let mut updated = devices.to_vec();
        updated.push(self.new_device.clone());

        self.pending = Some(WriteKind::Add);
        Ok(PendingWrite {
            kind: WriteKind::Add,
            devices: updated,
        })
    }

    /// Settles a prepared write. On success returns the list that was written; on
    /// failure the edit (or the new-device buffer) is kept so the user can retry.
    pub fn complete(
        &mut self,
        write: PendingWrite,
        result: Result<(), StoreError>,
    ) -> Result<Vec<Device>, ControllerError> {
        self.pending = None;

        if let Err(e) = result {
            warn!(kind = ?write.kind, error = %e, "loads write failed");
            return Err(e.into());
        }

        match write.kind {
            WriteKind::Save { index } => {
                debug!(index, "device saved");
                self.state = EditState::Idle;
            }
            WriteKind::Add => {
                debug!(devices = write.devices.len(), "device added");
                self.new_device = Device::default();
            }
        }
        Ok(write.devices)
    }

    /// Saves the open edit in one whole-document write.
    pub async fn save(
        &mut self,
        store: &dyn DocumentStore,
        path: &DocPath,
        devices: &[Device],
    ) -> Result<Vec<Device>, ControllerError> {
        let write = self.prepare_save(devices)?;
        let result = write_loads(store, path, &write.devices).await;
        self.complete(write, result)
    }

    /// Appends the new-device buffer in one whole-document write.
    pub async fn add(
        &mut self,
        store: &dyn DocumentStore,
        path: &DocPath,
        devices: &[Device],
    ) -> Result<Vec<Device>, ControllerError> {
        let write = self.prepare_add(devices)?;
        let result = write_loads(store, path, &write.devices).await;
        self.complete(write, result)
    }
}

/// Overwrites the `loads` field of `path` with `devices`. Other fields are kept.
pub async fn write_loads(
    store: &dyn DocumentStore,
    path: &DocPath,
    devices: &[Device],
) -> Result<(), StoreError> {
    let mut fields = Document::new();
    fields.insert(LOADS_FIELD.to_string(), serde_json::to_value(devices)?);
    store.update_document(path, fields).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DeviceStatus;
    use crate::store::InMemoryStore;

    fn fan() -> Device {
        Device {
            name: "Fan".into(),
            power: 0.2,
            voltage: 230.0,
            current: 0.9,
            efficiency: 80.0,
            status: DeviceStatus::Active,
        }
    }

    #[test]
    fn test_begin_edit_then_cancel() {
        let devices = vec![fan()];
        let mut controller = EditController::new();

        controller.begin_edit(&devices, 0).unwrap();
        controller.change_field(DeviceField::Name, "Ceiling fan").unwrap();
        controller.cancel().unwrap();

        assert_eq!(controller.state(), &EditState::Idle);
        assert_eq!(devices, vec![fan()]);
    }

    #[test]
    fn test_begin_edit_out_of_range() {
        let mut controller = EditController::new();
        let err = controller.begin_edit(&[fan()], 1).unwrap_err();
        assert!(matches!(
            err,
            ControllerError::IndexOutOfRange { index: 1, len: 1 }
        ));
        assert_eq!(controller.state(), &EditState::Idle);
    }

    #[test]
    fn test_invalid_number_keeps_draft() {
        let devices = vec![fan()];
        let mut controller = EditController::new();
        controller.begin_edit(&devices, 0).unwrap();

        let err = controller.change_field(DeviceField::Power, "abc").unwrap_err();
        assert!(matches!(err, ControllerError::Validation(_)));

        let EditState::Editing { draft, .. } = controller.state() else {
            panic!("expected editing state");
        };
        assert_eq!(draft.power, 0.2);
    }

    #[test]
    fn test_field_change_requires_editing() {
        let mut controller = EditController::new();
        assert!(matches!(
            controller.change_field(DeviceField::Name, "x"),
            Err(ControllerError::NotEditing)
        ));
        assert!(matches!(controller.cancel(), Err(ControllerError::NotEditing)));
    }

    #[test]
    fn test_second_write_rejected_while_pending() {
        let devices = vec![fan()];
        let mut controller = EditController::new();
        controller.begin_edit(&devices, 0).unwrap();

        let write = controller.prepare_save(&devices).unwrap();
        assert!(matches!(
            controller.prepare_save(&devices),
            Err(ControllerError::WriteInFlight)
        ));
        assert!(matches!(
            controller.prepare_add(&devices),
            Err(ControllerError::WriteInFlight)
        ));
        assert!(matches!(controller.cancel(), Err(ControllerError::WriteInFlight)));

        // The new-device buffer is independent of a pending save.
        controller
            .change_new_device_field(DeviceField::Name, "Heater")
            .unwrap();

        controller.complete(write, Ok(())).unwrap();
        assert_eq!(controller.pending(), None);
        assert_eq!(controller.state(), &EditState::Idle);
    }

    #[test]
    fn test_save_on_shrunk_list_stays_editing() {
        let mut controller = EditController::new();
        controller.begin_edit(&[fan(), fan()], 1).unwrap();

        let err = controller.prepare_save(&[fan()]).unwrap_err();
        assert!(matches!(err, ControllerError::IndexOutOfRange { index: 1, len: 1 }));
        assert!(matches!(controller.state(), EditState::Editing { index: 1, .. }));
        assert_eq!(controller.pending(), None);
    }

    #[tokio::test]
    async fn test_save_writes_whole_list() {
        let store = InMemoryStore::new();
        let path = DocPath::latest_loads();
        let devices = vec![fan(), Device::default()];
        let mut controller = EditController::new();

        controller.begin_edit(&devices, 1).unwrap();
        controller.change_field(DeviceField::Name, "Oven").unwrap();
        controller.change_field(DeviceField::Power, "2").unwrap();
        let saved = controller.save(&store, &path, &devices).await.unwrap();

        assert_eq!(saved[0], fan());
        assert_eq!(saved[1].name, "Oven");
        assert_eq!(saved[1].power, 2.0);
        assert_eq!(controller.state(), &EditState::Idle);

        let stored = store.get_document(&path).await.unwrap().unwrap();
        assert_eq!(stored[LOADS_FIELD][1]["name"], "Oven");
    }

    #[tokio::test]
    async fn test_failed_add_keeps_buffer() {
        let store = InMemoryStore::new();
        store.set_offline(true);
        let path = DocPath::latest_loads();
        let mut controller = EditController::new();
        controller
            .change_new_device_field(DeviceField::Name, "Heater")
            .unwrap();

        let err = controller.add(&store, &path, &[]).await.unwrap_err();
        assert!(matches!(err, ControllerError::Store(StoreError::Write { .. })));
        assert_eq!(controller.new_device().name, "Heater");
        assert_eq!(controller.pending(), None);
    }
}

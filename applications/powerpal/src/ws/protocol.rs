use serde::{Deserialize, Serialize};

use crate::aggregate::{device_cards, DashboardSummary, DeviceCard};
use crate::dashboard::{ControllerError, EditController, EditState};
use crate::models::{Device, DeviceField};

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    BeginEdit { index: usize },
    EditField { field: DeviceField, value: String },
    Save,
    Cancel,
    NewDeviceField { field: DeviceField, value: String },
    AddLoad,
    Ping,
}

#[derive(Debug, Clone, Serialize)]
pub struct EditingView {
    pub index: usize,
    pub draft: Device,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Snapshot {
        timestamp: String,
        devices: Vec<DeviceCard>,
        summary: DashboardSummary,
    },
    EditState {
        editing: Option<EditingView>,
        new_device: Device,
        pending: bool,
    },
    Error {
        message: String,
        code: String,
    },
    Redirect {
        to: String,
    },
    Pong {
        timestamp: String,
    },
}

impl ServerMessage {
    pub fn snapshot(devices: &[Device]) -> Self {
        ServerMessage::Snapshot {
            timestamp: chrono::Utc::now().to_rfc3339(),
            devices: device_cards(devices),
            summary: DashboardSummary::from_devices(devices),
        }
    }

    pub fn edit_state(controller: &EditController) -> Self {
        let editing = match controller.state() {
            EditState::Editing { index, draft } => Some(EditingView {
                index: *index,
                draft: draft.clone(),
            }),
            EditState::Idle => None,
        };
        ServerMessage::EditState {
            editing,
            new_device: controller.new_device().clone(),
            pending: controller.pending().is_some(),
        }
    }

    pub fn pong() -> Self {
        let now = chrono::Utc::now().to_rfc3339();
        ServerMessage::Pong { timestamp: now }
    }

    pub fn error(message: impl Into<String>, code: impl Into<String>) -> Self {
        ServerMessage::Error {
            message: message.into(),
            code: code.into(),
        }
    }

    pub fn redirect(to: impl Into<String>) -> Self {
        ServerMessage::Redirect { to: to.into() }
    }

    pub fn controller_error(err: &ControllerError) -> Self {
        let (message, code) = match err {
            ControllerError::Validation(e) => (e.to_string(), "VALIDATION"),
            ControllerError::Store(_) => ("Failed to save loads. Try again.".to_string(), "SAVE_FAILED"),
            ControllerError::IndexOutOfRange { .. } => (err.to_string(), "INDEX_OUT_OF_RANGE"),
            ControllerError::NotEditing => (err.to_string(), "NOT_EDITING"),
            ControllerError::WriteInFlight => (err.to_string(), "WRITE_IN_FLIGHT"),
        };
        Self::error(message, code)
    }
}

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::aggregate::{DashboardSummary, DeviceCard};
use crate::error::ValidationError;
use crate::models::{Device, DeviceField};

/// Free-text device fields as typed into a form, keyed by field name.
pub type DeviceFieldsRequest = BTreeMap<String, String>;

/// Resolve field names, rejecting unknown ones before anything is applied.
pub fn parse_fields(
    fields: &DeviceFieldsRequest,
) -> Result<Vec<(DeviceField, &str)>, ValidationError> {
    fields
        .iter()
        .map(|(name, value)| Ok((name.parse::<DeviceField>()?, value.as_str())))
        .collect()
}

#[derive(Debug, Serialize)]
pub struct LoadsResponse {
    pub devices: Vec<DeviceCard>,
    pub summary: DashboardSummary,
}

impl LoadsResponse {
    pub fn from_devices(devices: &[Device]) -> Self {
        Self {
            devices: crate::aggregate::device_cards(devices),
            summary: DashboardSummary::from_devices(devices),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct RecordedLoadResponse {
    pub id: String,
}

/// Full device list pushed by a metering device.
#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub loads: Vec<Device>,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub accepted: usize,
}

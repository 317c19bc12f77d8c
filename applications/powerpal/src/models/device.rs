use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::ValidationError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceStatus {
    Active,
    #[default]
    Standby,
}

impl DeviceStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceStatus::Active => "active",
            DeviceStatus::Standby => "standby",
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeviceStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "active" => Ok(DeviceStatus::Active),
            "standby" => Ok(DeviceStatus::Standby),
            other => Err(ValidationError::InvalidStatus(other.to_string())),
        }
    }
}

/// One monitored load. Devices carry no identifier; a device is addressed by its
/// position in the list stored at `realtime_data/latest`.
///
/// Fields missing from a pushed document fall back to their zero values.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Device {
    pub name: String,
    /// kW
    pub power: f64,
    /// V
    pub voltage: f64,
    /// A
    pub current: f64,
    /// 0-100, not range checked
    pub efficiency: f64,
    pub status: DeviceStatus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceField {
    Name,
    Power,
    Voltage,
    Current,
    Efficiency,
    Status,
}

impl DeviceField {
    pub const ALL: [DeviceField; 6] = [
        DeviceField::Name,
        DeviceField::Power,
        DeviceField::Voltage,
        DeviceField::Current,
        DeviceField::Efficiency,
        DeviceField::Status,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            DeviceField::Name => "name",
            DeviceField::Power => "power",
            DeviceField::Voltage => "voltage",
            DeviceField::Current => "current",
            DeviceField::Efficiency => "efficiency",
            DeviceField::Status => "status",
        }
    }
}

impl FromStr for DeviceField {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        DeviceField::ALL
            .into_iter()
            .find(|field| field.as_str() == s)
            .ok_or_else(|| ValidationError::UnknownField(s.to_string()))
    }
}

impl Device {
    /// Apply one free-text form value to this device.
    ///
    /// Numeric fields must parse to a finite number; `NaN` and infinities are rejected
    /// and the device is left untouched.
    pub fn set_field(&mut self, field: DeviceField, raw: &str) -> Result<(), ValidationError> {
        match field {
            DeviceField::Name => self.name = raw.to_string(),
            DeviceField::Status => self.status = raw.parse()?,
            DeviceField::Power => self.power = parse_number(field, raw)?,
            DeviceField::Voltage => self.voltage = parse_number(field, raw)?,
            DeviceField::Current => self.current = parse_number(field, raw)?,
            DeviceField::Efficiency => self.efficiency = parse_number(field, raw)?,
        }
        Ok(())
    }

    /// Current value of a field as it would appear in a form input.
    pub fn field_value(&self, field: DeviceField) -> String {
        match field {
            DeviceField::Name => self.name.clone(),
            DeviceField::Status => self.status.to_string(),
            DeviceField::Power => self.power.to_string(),
            DeviceField::Voltage => self.voltage.to_string(),
            DeviceField::Current => self.current.to_string(),
            DeviceField::Efficiency => self.efficiency.to_string(),
        }
    }
}

fn parse_number(field: DeviceField, raw: &str) -> Result<f64, ValidationError> {
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| ValidationError::InvalidNumber {
            field: field.as_str(),
            input: raw.to_string(),
        })
}

/// Profile written once at sign-up to `users/{uid}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub uid: String,
    pub email: String,
    /// RFC 3339
    pub created_at: String,
}

/// Entry written to the `loads` collection by the add-load form.
/// Nothing reads this collection back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoadRecord {
    #[serde(flatten)]
    pub device: Device,
    pub timestamp: DateTime<Utc>,
}

impl LoadRecord {
    /// Builds a record from the add-load form. Efficiency is truncated to whole percent.
    pub fn from_form(mut device: Device, timestamp: DateTime<Utc>) -> Self {
        device.efficiency = device.efficiency.trunc();
        Self { device, timestamp }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_reset_buffer() {
        let device = Device::default();
        assert_eq!(device.name, "");
        assert_eq!(device.power, 0.0);
        assert_eq!(device.voltage, 0.0);
        assert_eq!(device.current, 0.0);
        assert_eq!(device.efficiency, 0.0);
        assert_eq!(device.status, DeviceStatus::Standby);
    }

    #[test]
    fn test_set_numeric_field() {
        let mut device = Device::default();
        device.set_field(DeviceField::Power, " 1.5 ").unwrap();
        device.set_field(DeviceField::Voltage, "230").unwrap();
        assert_eq!(device.power, 1.5);
        assert_eq!(device.voltage, 230.0);
    }

    #[test]
    fn test_set_field_rejects_nan_and_garbage() {
        let mut device = Device {
            power: 2.0,
            ..Device::default()
        };

        for input in ["", "abc", "NaN", "inf", "1.2.3"] {
            let err = device.set_field(DeviceField::Power, input).unwrap_err();
            assert!(matches!(err, ValidationError::InvalidNumber { field: "power", .. }));
        }
        assert_eq!(device.power, 2.0);
    }

    #[test]
    fn test_name_accepts_any_text() {
        let mut device = Device::default();
        device.set_field(DeviceField::Name, "").unwrap();
        device.set_field(DeviceField::Name, "Heater 2").unwrap();
        assert_eq!(device.name, "Heater 2");
    }

    #[test]
    fn test_status_parse() {
        let mut device = Device::default();
        device.set_field(DeviceField::Status, "active").unwrap();
        assert_eq!(device.status, DeviceStatus::Active);
        assert!(device.set_field(DeviceField::Status, "on").is_err());
    }

    #[test]
    fn test_field_names() {
        assert_eq!("efficiency".parse::<DeviceField>().unwrap(), DeviceField::Efficiency);
        assert!("uid".parse::<DeviceField>().is_err());
    }

    #[test]
    fn test_partial_document_decodes_with_defaults() {
        let device: Device =
            serde_json::from_value(serde_json::json!({"name": "Pump", "power": 0.75})).unwrap();
        assert_eq!(device.name, "Pump");
        assert_eq!(device.power, 0.75);
        assert_eq!(device.status, DeviceStatus::Standby);
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let device = Device {
            status: DeviceStatus::Active,
            ..Device::default()
        };
        let json = serde_json::to_value(&device).unwrap();
        assert_eq!(json["status"], "active");
    }

    #[test]
    fn test_profile_uses_camel_case() {
        let profile = UserProfile {
            uid: "u1".into(),
            email: "a@b.co".into(),
            created_at: "2025-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_value(&profile).unwrap();
        assert!(json.get("createdAt").is_some());
    }

    #[test]
    fn test_load_record_truncates_efficiency() {
        let device = Device {
            efficiency: 87.9,
            ..Device::default()
        };
        let record = LoadRecord::from_form(device, Utc::now());
        assert_eq!(record.device.efficiency, 87.0);

        let json = serde_json::to_value(&record).unwrap();
        assert!(json.get("timestamp").is_some());
        assert_eq!(json["efficiency"], 87.0);
    }
}

//! Dashboard figures derived from the current device list.
//!
//! All functions are pure and cheap enough to recompute on every render.

use serde::Serialize;

use crate::models::Device;

/// Flat electricity rate in $/kWh.
pub const COST_PER_KWH: f64 = 0.18;

/// Nominal capacity shared by every device when computing load factor.
pub const NOMINAL_CAPACITY_KW: f64 = 2.5;

/// Round to two decimals.
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Round to the nearest integer, halves toward positive infinity.
fn round_half_up(value: f64) -> f64 {
    let floor = value.floor();
    if value - floor >= 0.5 {
        floor + 1.0
    } else {
        floor
    }
}

pub fn total_consumption(devices: &[Device]) -> f64 {
    round2(devices.iter().map(|d| d.power).sum())
}

pub fn estimated_cost(devices: &[Device]) -> f64 {
    round2(total_consumption(devices) * COST_PER_KWH)
}

/// Device power as a whole percentage of [`NOMINAL_CAPACITY_KW`].
pub fn load_factor(device: &Device) -> i64 {
    round_half_up(device.power / NOMINAL_CAPACITY_KW * 100.0) as i64
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeviceCard {
    pub index: usize,
    #[serde(flatten)]
    pub device: Device,
    pub load_factor: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSummary {
    pub total_consumption_kwh: f64,
    pub active_power_kw: f64,
    pub estimated_cost: f64,
    pub cost_per_kwh: f64,
    pub device_count: usize,
}

impl DashboardSummary {
    pub fn from_devices(devices: &[Device]) -> Self {
        let total = total_consumption(devices);
        Self {
            total_consumption_kwh: total,
            active_power_kw: total,
            estimated_cost: estimated_cost(devices),
            cost_per_kwh: COST_PER_KWH,
            device_count: devices.len(),
        }
    }
}

pub fn device_cards(devices: &[Device]) -> Vec<DeviceCard> {
    devices
        .iter()
        .enumerate()
        .map(|(index, device)| DeviceCard {
            index,
            device: device.clone(),
            load_factor: load_factor(device),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn device(power: f64) -> Device {
        Device {
            name: format!("load-{}", power),
            power,
            ..Device::default()
        }
    }

    #[test]
    fn test_total_of_empty_list_is_zero() {
        assert_eq!(total_consumption(&[]), 0.0);
        assert_eq!(estimated_cost(&[]), 0.0);
    }

    #[test]
    fn test_total_rounds_to_two_decimals() {
        let devices = vec![device(0.1), device(0.2), device(1.234)];
        assert_eq!(total_consumption(&devices), 1.53);
    }

    #[test]
    fn test_total_is_idempotent() {
        let devices = vec![device(1.5), device(0.75), device(2.125)];
        let first = total_consumption(&devices);
        let second = total_consumption(&devices);
        assert_eq!(first, second);
        assert_eq!(first, 4.38);
    }

    #[test]
    fn test_cost_uses_rounded_total() {
        let devices = vec![device(1.5), device(2.0)];
        assert_eq!(total_consumption(&devices), 3.5);
        assert_eq!(estimated_cost(&devices), 0.63);
    }

    #[test]
    fn test_load_factor() {
        assert_eq!(load_factor(&device(2.5)), 100);
        assert_eq!(load_factor(&device(1.5)), 60);
        assert_eq!(load_factor(&device(0.0)), 0);
        assert_eq!(load_factor(&device(3.75)), 150);
    }

    #[test]
    fn test_summary() {
        let devices = vec![device(1.0), device(0.5)];
        let summary = DashboardSummary::from_devices(&devices);
        assert_eq!(summary.total_consumption_kwh, 1.5);
        assert_eq!(summary.active_power_kw, 1.5);
        assert_eq!(summary.estimated_cost, 0.27);
        assert_eq!(summary.device_count, 2);
    }

    #[test]
    fn test_device_cards_keep_positions() {
        let devices = vec![device(2.5), device(1.25)];
        let cards = device_cards(&devices);
        assert_eq!(cards[0].index, 0);
        assert_eq!(cards[0].load_factor, 100);
        assert_eq!(cards[1].index, 1);
        assert_eq!(cards[1].load_factor, 50);
    }
}

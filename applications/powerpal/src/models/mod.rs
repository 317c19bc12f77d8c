pub mod device;

pub use device::{Device, DeviceField, DeviceStatus, LoadRecord, UserProfile};

//! Adapters binding the firmware to ESP-IDF services.

pub mod mqtt;
pub mod nvs;
pub mod time;

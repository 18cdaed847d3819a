//! Hardware output drivers.
//!
//! Each driver has an ESP-IDF path (`target_os = "espidf"`) and a
//! simulation path for host tests. Engines only see the port traits.

pub mod ledc;
pub mod relay;
pub mod strip;
pub mod task_pin;
pub mod watchdog;

//! Connectivity: Wi-Fi supervision and time sync.

pub mod sntp;
pub mod supervisor;

//! UltraNode firmware library.
//!
//! Exposes the pure-logic modules for integration testing and external
//! inspection. All ESP-IDF-specific code is guarded by
//! `#[cfg(target_os = "espidf")]` within each module.

#![deny(unused_must_use)]

pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod health;
pub mod net;
pub mod ports;
pub mod reconcile;
pub mod state;

pub mod adapters;
pub mod drivers;

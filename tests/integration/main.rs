//! Integration test driver for `tests/integration/` submodule.
//!
//! Each `mod` below maps to a file that exercises a specific subsystem
//! against the simulation drivers.  All tests run on the host (x86_64)
//! with no real hardware required.

#![cfg(not(target_os = "espidf"))]

mod command_tests;
mod engine_tests;
mod mock_hw;
mod persistence_tests;

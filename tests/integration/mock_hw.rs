//! Shared fixtures for the integration tests.
//!
//! The simulation drivers live in the library (`drivers::strip::sim`,
//! `drivers::ledc::sim`); this module only adds the test configurations
//! and an in-memory storage backend.

use std::collections::HashMap;

use ultranode::config::NodeConfig;
use ultranode::ports::{StorageError, StoragePort};

/// Two small addressable strips, one RGB strip, two white channels and
/// one relay — large enough to exercise channel independence, small
/// enough to keep frame assertions readable.
pub fn test_config() -> NodeConfig {
    let mut cfg = NodeConfig::default();

    cfg.ws_strips[0].enabled = true;
    cfg.ws_strips[0].gpio = 16;
    cfg.ws_strips[0].pixels = 8;
    cfg.ws_strips[1].enabled = true;
    cfg.ws_strips[1].gpio = 17;
    cfg.ws_strips[1].pixels = 4;

    cfg.rgb_strips[0].enabled = true;
    cfg.rgb_strips[0].gpio_r = 25;
    cfg.rgb_strips[0].gpio_g = 26;
    cfg.rgb_strips[0].gpio_b = 27;

    cfg.white_channels[0].enabled = true;
    cfg.white_channels[0].gpio = 19;
    cfg.white_channels[1].enabled = true;
    cfg.white_channels[1].gpio = 21;

    cfg.relays[0].enabled = true;
    cfg.relays[0].gpio = 32;

    // Fast render so tests settle within a few tens of milliseconds.
    cfg.ws_fps = 100;
    cfg.pwm_smooth_hz = 200;
    cfg
}

pub struct MemStorage {
    store: HashMap<String, Vec<u8>>,
}

impl MemStorage {
    pub fn new() -> Self {
        Self {
            store: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }
}

impl StoragePort for MemStorage {
    fn read(&self, ns: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError> {
        match self.store.get(&format!("{ns}::{key}")) {
            Some(v) => {
                let n = v.len().min(buf.len());
                buf[..n].copy_from_slice(&v[..n]);
                Ok(n)
            }
            None => Err(StorageError::NotFound),
        }
    }

    fn write(&mut self, ns: &str, key: &str, data: &[u8]) -> Result<(), StorageError> {
        self.store.insert(format!("{ns}::{key}"), data.to_vec());
        Ok(())
    }

    fn delete(&mut self, ns: &str, key: &str) -> Result<(), StorageError> {
        self.store.remove(&format!("{ns}::{key}"));
        Ok(())
    }

    fn exists(&self, ns: &str, key: &str) -> bool {
        self.store.contains_key(&format!("{ns}::{key}"))
    }
}

/// Poll `probe` every few milliseconds until it returns true or the
/// budget runs out. Keeps the frame-timing assertions robust on loaded
/// CI machines.
pub fn wait_until(mut probe: impl FnMut() -> bool) -> bool {
    for _ in 0..200 {
        if probe() {
            return true;
        }
        std::thread::sleep(std::time::Duration::from_millis(5));
    }
    false
}

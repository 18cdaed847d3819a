//! Port traits — the boundary between the engines/monitors and hardware.
//!
//! ```text
//!   Driver (espidf or mock) ──▶ Port trait ──▶ engine / monitor
//! ```
//!
//! Drivers under [`crate::drivers`] and adapters under [`crate::adapters`]
//! implement these traits; the engines and the health monitor consume them
//! as boxed trait objects so the core stays host-testable.

use crate::error::DriverError;

// ───────────────────────────────────────────────────────────────
// Addressable strip output
// ───────────────────────────────────────────────────────────────

/// One WS2812 strip. Pixel writes stage into a device-side buffer;
/// nothing reaches the wire until [`refresh`](StripOutput::refresh).
///
/// `refresh` may block for the full bus transmission (~30 µs/pixel),
/// so callers must not hold engine locks across it.
pub trait StripOutput: Send {
    /// Stage one pixel. `index` past the end of the strip is ignored.
    fn set_pixel(&mut self, index: usize, r: u8, g: u8, b: u8);

    /// Transmit the staged buffer.
    fn refresh(&mut self) -> Result<(), DriverError>;

    /// Stage black on every pixel.
    fn clear(&mut self);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Creates strip outputs from config at engine start.
pub trait StripFactory {
    fn open(&mut self, gpio: u8, pixels: u16) -> Result<Box<dyn StripOutput>, DriverError>;
}

// ───────────────────────────────────────────────────────────────
// PWM output
// ───────────────────────────────────────────────────────────────

/// One LEDC PWM channel, 12-bit duty resolution.
pub trait PwmOutput: Send {
    /// Set duty in the 0..=4095 range. Values above the range are clamped.
    fn set_duty(&mut self, duty: u16) -> Result<(), DriverError>;

    /// Drive the line low and release it. Called on engine stop and on
    /// the unwind path when a sibling channel fails to start.
    fn pull_low(&mut self);
}

/// Creates PWM outputs from config at engine start.
pub trait PwmFactory {
    fn open(&mut self, gpio: u8) -> Result<Box<dyn PwmOutput>, DriverError>;
}

// ───────────────────────────────────────────────────────────────
// Relay output
// ───────────────────────────────────────────────────────────────

/// One relay GPIO. Polarity handling lives in the driver.
pub trait RelayOutput: Send {
    fn set(&mut self, on: bool) -> Result<(), DriverError>;
    fn is_on(&self) -> bool;
}

// ───────────────────────────────────────────────────────────────
// Storage port (NVS / flash)
// ───────────────────────────────────────────────────────────────

/// Persistent key-value storage.
///
/// Keys are namespaced to prevent collisions between subsystems.
/// Write operations MUST be atomic — no partial writes on power loss.
/// The ESP-IDF NVS API guarantees this natively; the in-memory
/// simulation achieves it trivially.
pub trait StoragePort: Send {
    /// Read a value. Returns the number of bytes written to `buf`.
    fn read(&self, namespace: &str, key: &str, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Write a value atomically.
    fn write(&mut self, namespace: &str, key: &str, data: &[u8]) -> Result<(), StorageError>;

    /// Delete a key. Returns `Ok(())` even if the key didn't exist.
    fn delete(&mut self, namespace: &str, key: &str) -> Result<(), StorageError>;

    /// Check whether a key exists without reading it.
    fn exists(&self, namespace: &str, key: &str) -> bool;
}

/// Errors from [`StoragePort`] operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageError {
    /// Requested key does not exist.
    NotFound,
    /// Storage partition is full.
    Full,
    /// Generic I/O error.
    IoError,
}

impl core::fmt::Display for StorageError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            Self::NotFound => write!(f, "key not found"),
            Self::Full => write!(f, "storage full"),
            Self::IoError => write!(f, "I/O error"),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Recovery port (health monitor → supervisor)
// ───────────────────────────────────────────────────────────────

/// Recovery actions the health monitor may request.
///
/// The monitor never touches Wi-Fi or MQTT directly; it requests and the
/// supervisory loop executes, so policy stays testable without hardware.
pub trait RecoveryPort: Send {
    /// Tear down and re-establish the Wi-Fi connection.
    fn recover_wifi(&mut self);

    /// Restart the MQTT client on the existing connection.
    fn restart_mqtt(&mut self);

    /// Reboot the node. Does not return on device.
    fn reboot(&mut self, reason: &'static str);
}

// ───────────────────────────────────────────────────────────────
// Time port
// ───────────────────────────────────────────────────────────────

/// Monotonic uptime source, mockable for the health-policy tests.
pub trait UptimePort: Send {
    fn uptime_secs(&self) -> u64;
}

//! Monotonic uptime source.
//!
//! On device this reads the esp_timer microsecond counter, which starts
//! at boot and never goes backwards. The host build measures from
//! adapter construction so tests get the same semantics.

use crate::ports::UptimePort;

#[cfg(target_os = "espidf")]
pub struct UptimeAdapter;

#[cfg(target_os = "espidf")]
impl UptimeAdapter {
    pub fn new() -> Self {
        Self
    }
}

#[cfg(target_os = "espidf")]
impl Default for UptimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(target_os = "espidf")]
impl UptimePort for UptimeAdapter {
    fn uptime_secs(&self) -> u64 {
        // esp_timer_get_time counts microseconds since boot.
        let us = unsafe { esp_idf_svc::sys::esp_timer_get_time() };
        (us / 1_000_000) as u64
    }
}

#[cfg(not(target_os = "espidf"))]
pub struct UptimeAdapter {
    started: std::time::Instant,
}

#[cfg(not(target_os = "espidf"))]
impl UptimeAdapter {
    pub fn new() -> Self {
        Self {
            started: std::time::Instant::now(),
        }
    }
}

#[cfg(not(target_os = "espidf"))]
impl Default for UptimeAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(target_os = "espidf"))]
impl UptimePort for UptimeAdapter {
    fn uptime_secs(&self) -> u64 {
        self.started.elapsed().as_secs()
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn starts_near_zero() {
        let t = UptimeAdapter::new();
        assert!(t.uptime_secs() < 2);
    }
}

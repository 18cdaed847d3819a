//! Task Watchdog Timer (TWDT) driver.
//!
//! Only the supervisory loop is subscribed: it ticks every 100 ms, so a
//! missed 10 s window means the loop itself is wedged and a reboot is
//! the only way back. Render, refresh and poll tasks are deliberately
//! not subscribed; a stalled engine shows up in the health monitor's
//! heap and connectivity checks instead.

#[cfg(target_os = "espidf")]
use esp_idf_svc::sys::*;

#[cfg(target_os = "espidf")]
use log::{info, warn};

/// 100× the supervisory tick. Generous enough to survive an NVS commit
/// burst inside one iteration.
const TIMEOUT_MS: u32 = 10_000;

pub struct Watchdog {
    #[cfg(target_os = "espidf")]
    subscribed: bool,
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new()
    }
}

impl Watchdog {
    /// Configure the TWDT and subscribe the calling task.
    pub fn new() -> Self {
        #[cfg(target_os = "espidf")]
        {
            unsafe {
                let cfg = esp_task_wdt_config_t {
                    timeout_ms: TIMEOUT_MS,
                    idle_core_mask: 0,
                    trigger_panic: true,
                };
                let ret = esp_task_wdt_reconfigure(&cfg);
                if ret != ESP_OK {
                    warn!("twdt: reconfigure returned {} (already configured?)", ret);
                }

                let ret = esp_task_wdt_add(core::ptr::null_mut());
                let subscribed = ret == ESP_OK;
                if subscribed {
                    info!("twdt: supervisory loop subscribed, {} ms window", TIMEOUT_MS);
                } else {
                    warn!("twdt: subscribe failed ({}), loop runs unguarded", ret);
                }

                Self { subscribed }
            }
        }

        #[cfg(not(target_os = "espidf"))]
        {
            log::debug!("twdt(sim): no-op");
            Self {}
        }
    }

    /// Reset the window. Called once per supervisory tick.
    pub fn feed(&self) {
        #[cfg(target_os = "espidf")]
        {
            if self.subscribed {
                unsafe {
                    esp_task_wdt_reset();
                }
            }
        }
    }
}

#[cfg(target_os = "espidf")]
impl Drop for Watchdog {
    /// Unsubscribe on teardown; a task that exits while still
    /// subscribed trips the TWDT on its next expiry.
    fn drop(&mut self) {
        if self.subscribed {
            unsafe {
                esp_task_wdt_delete(core::ptr::null_mut());
            }
        }
    }
}

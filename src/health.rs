//! Health monitor.
//!
//! Watches connectivity, heap, and clock staleness, and requests recovery
//! through [`RecoveryPort`] when thresholds trip. The monitor never
//! touches Wi-Fi or MQTT itself, so the policy runs identically under
//! test and on device.
//!
//! Policy table (all durations configurable via [`NodeConfig`]):
//!
//! | condition | action |
//! |---|---|
//! | Wi-Fi offline ≥ 15 min | recover Wi-Fi, max one attempt per 10 min |
//! | Wi-Fi offline ≥ 6 h after 4 attempts | reboot (once) |
//! | MQTT offline ≥ 5 min while Wi-Fi up | restart client, rate-limited |
//! | MQTT offline ≥ 2 h after 6 restarts | cycle Wi-Fi (once per episode) |
//! | free heap < 20 KB for 5 consecutive checks | reboot |
//! | clock unsynced ≥ 24 h | warn + recover Wi-Fi |
//! | clock unsynced ≥ 7 d | reboot |
//! | SNTP task spawn failing | throttled warn only, never reboot |
//!
//! Rate-limiting counters update in the same lock scope as the decision,
//! so two overlapping checks can never double-fire an attempt.

use std::sync::Mutex;

use log::{error, info, warn};

use crate::config::NodeConfig;
use crate::net::sntp::SntpRetrySnapshot;
use crate::ports::RecoveryPort;

// ─── Policy constants (copied out of NodeConfig at build) ─────

#[derive(Debug, Clone, Copy)]
struct Policy {
    wifi_offline_secs: u64,
    wifi_cooldown_secs: u64,
    wifi_max_attempts: u32,
    wifi_escalate_secs: u64,
    mqtt_offline_secs: u64,
    mqtt_max_attempts: u32,
    mqtt_escalate_secs: u64,
    heap_min_bytes: u32,
    heap_max_strikes: u32,
    time_warn_secs: u64,
    time_error_secs: u64,
    metrics_log_secs: u64,
}

impl Policy {
    fn from_config(cfg: &NodeConfig) -> Self {
        Self {
            wifi_offline_secs: u64::from(cfg.wifi_offline_secs),
            wifi_cooldown_secs: u64::from(cfg.wifi_recovery_cooldown_secs),
            wifi_max_attempts: cfg.wifi_max_attempts,
            wifi_escalate_secs: u64::from(cfg.wifi_escalate_secs),
            mqtt_offline_secs: u64::from(cfg.mqtt_offline_secs),
            mqtt_max_attempts: cfg.mqtt_max_attempts,
            mqtt_escalate_secs: u64::from(cfg.mqtt_escalate_secs),
            heap_min_bytes: cfg.heap_min_bytes,
            heap_max_strikes: cfg.heap_max_strikes,
            time_warn_secs: u64::from(cfg.time_warn_secs),
            time_error_secs: u64::from(cfg.time_error_secs),
            metrics_log_secs: u64::from(cfg.metrics_log_secs),
        }
    }
}

// ─── Snapshot ─────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default)]
struct Snapshot {
    wifi_connected: bool,
    wifi_last_change: u64,
    wifi_recovery_attempts: u32,
    wifi_last_recovery: Option<u64>,
    mqtt_connected: bool,
    mqtt_last_change: u64,
    mqtt_restart_attempts: u32,
    mqtt_last_restart: Option<u64>,
    mqtt_escalated: bool,
    heap_strikes: u32,
    reboot_requested: bool,
    last_metrics_log: u64,
    last_sntp_log: u64,
}

/// Public view of the counters, for status reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HealthStats {
    pub wifi_connected: bool,
    pub mqtt_connected: bool,
    pub wifi_recovery_attempts: u32,
    pub mqtt_restart_attempts: u32,
    pub heap_strikes: u32,
}

pub struct HealthMonitor {
    policy: Policy,
    inner: Mutex<Snapshot>,
}

impl HealthMonitor {
    pub fn new(cfg: &NodeConfig) -> Self {
        Self {
            policy: Policy::from_config(cfg),
            inner: Mutex::new(Snapshot::default()),
        }
    }

    /// Wi-Fi link change notification from the supervisor.
    pub fn note_wifi(&self, connected: bool, uptime_secs: u64) {
        let mut s = self.inner.lock().unwrap();
        if s.wifi_connected != connected {
            s.wifi_connected = connected;
            s.wifi_last_change = uptime_secs;
            if connected {
                s.wifi_recovery_attempts = 0;
                s.wifi_last_recovery = None;
            }
        }
    }

    /// MQTT connection change notification from the client adapter.
    pub fn note_mqtt(&self, connected: bool, uptime_secs: u64) {
        let mut s = self.inner.lock().unwrap();
        if s.mqtt_connected != connected {
            s.mqtt_connected = connected;
            s.mqtt_last_change = uptime_secs;
            if connected {
                s.mqtt_restart_attempts = 0;
                s.mqtt_last_restart = None;
                s.mqtt_escalated = false;
            }
        }
    }

    pub fn stats(&self) -> HealthStats {
        let s = self.inner.lock().unwrap();
        HealthStats {
            wifi_connected: s.wifi_connected,
            mqtt_connected: s.mqtt_connected,
            wifi_recovery_attempts: s.wifi_recovery_attempts,
            mqtt_restart_attempts: s.mqtt_restart_attempts,
            heap_strikes: s.heap_strikes,
        }
    }

    /// One periodic check. Call every `health_period_secs`.
    pub fn check(
        &self,
        uptime_secs: u64,
        free_heap_bytes: u32,
        time_sync_age_secs: Option<u64>,
        sntp: SntpRetrySnapshot,
        recovery: &mut dyn RecoveryPort,
    ) {
        let p = self.policy;
        let mut s = self.inner.lock().unwrap();

        // Heap: consecutive strikes, reset on any healthy reading.
        if free_heap_bytes < p.heap_min_bytes {
            s.heap_strikes += 1;
            warn!(
                "health: free heap {} B below {} B floor (strike {}/{})",
                free_heap_bytes, p.heap_min_bytes, s.heap_strikes, p.heap_max_strikes
            );
            if s.heap_strikes >= p.heap_max_strikes && !s.reboot_requested {
                s.reboot_requested = true;
                error!("health: heap exhausted, rebooting");
                recovery.reboot("heap exhausted");
            }
        } else {
            s.heap_strikes = 0;
        }

        // Wi-Fi offline: recover, then escalate to reboot.
        if !s.wifi_connected {
            let offline = uptime_secs.saturating_sub(s.wifi_last_change);
            if offline >= p.wifi_escalate_secs
                && s.wifi_recovery_attempts >= p.wifi_max_attempts
                && !s.reboot_requested
            {
                s.reboot_requested = true;
                error!(
                    "health: Wi-Fi offline {} s after {} recovery attempts, rebooting",
                    offline, s.wifi_recovery_attempts
                );
                recovery.reboot("wifi offline");
            } else if offline >= p.wifi_offline_secs
                && s.wifi_last_recovery
                    .is_none_or(|t| uptime_secs.saturating_sub(t) >= p.wifi_cooldown_secs)
            {
                s.wifi_recovery_attempts += 1;
                s.wifi_last_recovery = Some(uptime_secs);
                warn!(
                    "health: Wi-Fi offline {} s, recovery attempt {}",
                    offline, s.wifi_recovery_attempts
                );
                recovery.recover_wifi();
            }
        }

        // MQTT offline only matters while the network is up.
        if s.wifi_connected && !s.mqtt_connected {
            let offline = uptime_secs.saturating_sub(s.mqtt_last_change);
            if offline >= p.mqtt_escalate_secs
                && s.mqtt_restart_attempts >= p.mqtt_max_attempts
                && !s.mqtt_escalated
            {
                s.mqtt_escalated = true;
                warn!(
                    "health: MQTT offline {} s after {} restarts, cycling Wi-Fi",
                    offline, s.mqtt_restart_attempts
                );
                recovery.recover_wifi();
            } else if offline >= p.mqtt_offline_secs
                && s.mqtt_last_restart
                    .is_none_or(|t| uptime_secs.saturating_sub(t) >= p.mqtt_offline_secs)
            {
                s.mqtt_restart_attempts += 1;
                s.mqtt_last_restart = Some(uptime_secs);
                warn!(
                    "health: MQTT offline {} s, restart attempt {}",
                    offline, s.mqtt_restart_attempts
                );
                recovery.restart_mqtt();
            }
        }

        // Clock staleness. A never-synced clock ages from boot.
        let age = time_sync_age_secs.unwrap_or(uptime_secs);
        if age >= p.time_error_secs {
            if !s.reboot_requested {
                s.reboot_requested = true;
                error!("health: clock unsynced for {} s, rebooting", age);
                recovery.reboot("clock stale");
            }
        } else if age >= p.time_warn_secs
            && s.wifi_last_recovery
                .is_none_or(|t| uptime_secs.saturating_sub(t) >= p.wifi_cooldown_secs)
        {
            s.wifi_recovery_attempts += 1;
            s.wifi_last_recovery = Some(uptime_secs);
            warn!("health: clock unsynced for {} s, cycling Wi-Fi", age);
            recovery.recover_wifi();
        }

        // SNTP spawn failures: log, throttled; never recover or reboot.
        if sntp.attempts > 0
            && uptime_secs.saturating_sub(s.last_sntp_log) >= p.metrics_log_secs
        {
            s.last_sntp_log = uptime_secs;
            warn!(
                "health: SNTP resync task failing to start ({} attempts, first at {:?} s)",
                sntp.attempts, sntp.first_failure_uptime
            );
        }

        // Periodic metrics line.
        if uptime_secs.saturating_sub(s.last_metrics_log) >= p.metrics_log_secs {
            s.last_metrics_log = uptime_secs;
            info!(
                "health: uptime {} s, heap {} B, wifi {} (attempts {}), mqtt {} (restarts {})",
                uptime_secs,
                free_heap_bytes,
                if s.wifi_connected { "up" } else { "down" },
                s.wifi_recovery_attempts,
                if s.mqtt_connected { "up" } else { "down" },
                s.mqtt_restart_attempts,
            );
        }
    }
}

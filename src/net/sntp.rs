//! SNTP time synchronisation.
//!
//! Two pure pieces drive the policy:
//!
//! - [`SntpRetry`] handles the resync task failing to spawn: retries on
//!   its own backoff (5 s doubling to 60 s) and keeps attempt counters
//!   plus first/last failure timestamps for the health monitor. Spawn
//!   failure is an inconvenience, never a reboot cause.
//! - [`TimeSync`] records when the clock last synchronised so the health
//!   monitor can grade staleness.
//!
//! The `espidf` side owns an `EspSntp` handle and a periodic resync task.

use std::sync::Mutex;

use super::supervisor::Backoff;

// ─── Spawn-retry state machine ────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SntpRetrySnapshot {
    pub attempts: u32,
    pub first_failure_uptime: Option<u64>,
    pub last_failure_uptime: Option<u64>,
}

pub struct SntpRetry {
    backoff: Backoff,
    attempts: u32,
    first_failure_uptime: Option<u64>,
    last_failure_uptime: Option<u64>,
}

impl SntpRetry {
    pub fn new(floor_secs: u32, cap_secs: u32) -> Self {
        Self {
            backoff: Backoff::new(floor_secs.saturating_mul(1000), cap_secs.saturating_mul(1000)),
            attempts: 0,
            first_failure_uptime: None,
            last_failure_uptime: None,
        }
    }

    /// Record a failed spawn at `uptime_secs`; returns the delay in
    /// milliseconds before the next attempt.
    pub fn on_spawn_failure(&mut self, uptime_secs: u64) -> u32 {
        self.attempts += 1;
        if self.first_failure_uptime.is_none() {
            self.first_failure_uptime = Some(uptime_secs);
        }
        self.last_failure_uptime = Some(uptime_secs);
        self.backoff.next()
    }

    /// A successful spawn clears the failure streak.
    pub fn on_spawn_success(&mut self) {
        self.backoff.reset();
        self.attempts = 0;
        self.first_failure_uptime = None;
        self.last_failure_uptime = None;
    }

    pub fn snapshot(&self) -> SntpRetrySnapshot {
        SntpRetrySnapshot {
            attempts: self.attempts,
            first_failure_uptime: self.first_failure_uptime,
            last_failure_uptime: self.last_failure_uptime,
        }
    }
}

// ─── Time-sync tracking ───────────────────────────────────────

/// Last successful clock sync, shared between the sync callback and the
/// health monitor.
pub struct TimeSync {
    last_sync_uptime: Mutex<Option<u64>>,
}

impl TimeSync {
    pub fn new() -> Self {
        Self {
            last_sync_uptime: Mutex::new(None),
        }
    }

    pub fn mark_synced(&self, uptime_secs: u64) {
        *self.last_sync_uptime.lock().unwrap() = Some(uptime_secs);
    }

    /// Seconds since the last sync, `None` if the clock never synced.
    pub fn age_secs(&self, uptime_secs: u64) -> Option<u64> {
        self.last_sync_uptime
            .lock()
            .unwrap()
            .map(|t| uptime_secs.saturating_sub(t))
    }
}

impl Default for TimeSync {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Device-side service ──────────────────────────────────────

#[cfg(target_os = "espidf")]
pub mod device {
    //! Owns the `EspSntp` handle and re-arms it periodically. If the
    //! resync task cannot be spawned the retry machine schedules another
    //! attempt from the supervisory loop.

    use std::sync::Arc;
    use std::time::Duration;

    use esp_idf_svc::sntp::{EspSntp, SyncStatus};
    use log::{info, warn};

    use super::TimeSync;
    use crate::config::NodeConfig;
    use crate::drivers::task_pin::{spawn_on_core, Core};
    use crate::error::{CommsError, Error, Result};
    use crate::ports::UptimePort;

    pub struct SntpService {
        _task: std::thread::JoinHandle<()>,
    }

    impl SntpService {
        pub fn start(
            cfg: &NodeConfig,
            time_sync: Arc<TimeSync>,
            uptime: Arc<dyn UptimePort + Sync>,
        ) -> Result<Self> {
            let resync = Duration::from_secs(u64::from(cfg.sntp_resync_secs));
            let task = spawn_on_core(Core::Pro, 3, 6, "sntp\0", move || {
                let sntp = match EspSntp::new_default() {
                    Ok(s) => s,
                    Err(e) => {
                        warn!("sntp: init failed: {:?}", e);
                        return;
                    }
                };
                loop {
                    // Poll until the current sync round completes.
                    for _ in 0..120 {
                        if sntp.get_sync_status() == SyncStatus::Completed {
                            time_sync.mark_synced(uptime.uptime_secs());
                            info!("sntp: clock synchronised");
                            break;
                        }
                        std::thread::sleep(Duration::from_secs(1));
                    }
                    std::thread::sleep(resync);
                }
            })
            .map_err(|_| Error::from(CommsError::SntpStartFailed))?;
            Ok(Self { _task: task })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_backoff_doubles_to_cap() {
        let mut r = SntpRetry::new(5, 60);
        assert_eq!(r.on_spawn_failure(100), 5_000);
        assert_eq!(r.on_spawn_failure(110), 10_000);
        assert_eq!(r.on_spawn_failure(130), 20_000);
        assert_eq!(r.on_spawn_failure(170), 40_000);
        assert_eq!(r.on_spawn_failure(250), 60_000);
        assert_eq!(r.on_spawn_failure(330), 60_000);
    }

    #[test]
    fn retry_tracks_first_and_last_failure() {
        let mut r = SntpRetry::new(5, 60);
        r.on_spawn_failure(100);
        r.on_spawn_failure(200);
        r.on_spawn_failure(300);
        let s = r.snapshot();
        assert_eq!(s.attempts, 3);
        assert_eq!(s.first_failure_uptime, Some(100));
        assert_eq!(s.last_failure_uptime, Some(300));
    }

    #[test]
    fn success_clears_streak() {
        let mut r = SntpRetry::new(5, 60);
        r.on_spawn_failure(100);
        r.on_spawn_failure(200);
        r.on_spawn_success();
        let s = r.snapshot();
        assert_eq!(s.attempts, 0);
        assert_eq!(s.first_failure_uptime, None);
        assert_eq!(r.on_spawn_failure(400), 5_000);
    }

    #[test]
    fn sync_age_counts_from_mark() {
        let t = TimeSync::new();
        assert_eq!(t.age_secs(1_000), None);
        t.mark_synced(1_000);
        assert_eq!(t.age_secs(1_000), Some(0));
        assert_eq!(t.age_secs(4_600), Some(3_600));
    }
}

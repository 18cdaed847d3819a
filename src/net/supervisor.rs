//! Wi-Fi station supervisor.
//!
//! The reconnect policy is a pure state machine (`ConnectionTracker` over
//! `Backoff`) so it is testable without radio hardware: every drop doubles
//! the retry delay from the floor up to the cap, and a successful IP
//! acquisition resets it. `LinkStatus` gives waiters event-group style
//! `wait_for_ip` semantics, and `RestartGate` serialises restart requests
//! with a bounded wait so concurrent recovery paths cannot stack tear-downs.
//!
//! The device-side loop (`espidf` only) polls the driver, feeds the
//! tracker, and sleeps whatever delay it dictates.

use std::sync::{Condvar, Mutex};
use std::time::Duration;

use log::{info, warn};

use crate::error::CommsError;

// ─── Backoff ──────────────────────────────────────────────────

/// Exponential backoff: returns the current delay and doubles it, capped.
#[derive(Debug, Clone)]
pub struct Backoff {
    floor_ms: u32,
    cap_ms: u32,
    current_ms: u32,
}

impl Backoff {
    pub fn new(floor_ms: u32, cap_ms: u32) -> Self {
        Self {
            floor_ms,
            cap_ms,
            current_ms: floor_ms,
        }
    }

    /// Delay to use for the next attempt.
    pub fn next(&mut self) -> u32 {
        let d = self.current_ms;
        self.current_ms = self.current_ms.saturating_mul(2).min(self.cap_ms);
        d
    }

    pub fn reset(&mut self) {
        self.current_ms = self.floor_ms;
    }

    pub fn current(&self) -> u32 {
        self.current_ms
    }
}

// ─── Connection tracker ───────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiState {
    Idle,
    Connecting,
    Connected,
    Disconnected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiEvent {
    Started,
    Connected,
    GotIp,
    Disconnected,
}

/// What the driving loop should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WifiAction {
    /// Issue a connect to the driver now.
    Connect,
    /// Sleep this long, then issue a connect.
    ReconnectAfterMs(u32),
    /// Link is fully up; nothing to do.
    None,
}

pub struct ConnectionTracker {
    state: WifiState,
    backoff: Backoff,
    drops: u32,
}

impl ConnectionTracker {
    pub fn new(backoff_floor_ms: u32, backoff_cap_ms: u32) -> Self {
        Self {
            state: WifiState::Idle,
            backoff: Backoff::new(backoff_floor_ms, backoff_cap_ms),
            drops: 0,
        }
    }

    pub fn state(&self) -> WifiState {
        self.state
    }

    /// Total disconnect events since boot.
    pub fn drops(&self) -> u32 {
        self.drops
    }

    pub fn on_event(&mut self, event: WifiEvent) -> WifiAction {
        match event {
            WifiEvent::Started => {
                self.state = WifiState::Connecting;
                WifiAction::Connect
            }
            WifiEvent::Connected => {
                self.state = WifiState::Connecting;
                WifiAction::None
            }
            WifiEvent::GotIp => {
                self.state = WifiState::Connected;
                self.backoff.reset();
                WifiAction::None
            }
            WifiEvent::Disconnected => {
                let was_up = self.state == WifiState::Connected;
                self.state = WifiState::Disconnected;
                self.drops += 1;
                let delay = self.backoff.next();
                if was_up {
                    warn!("wifi: link dropped, reconnecting in {} ms", delay);
                } else {
                    info!("wifi: connect failed, retrying in {} ms", delay);
                }
                WifiAction::ReconnectAfterMs(delay)
            }
        }
    }
}

// ─── Link status (event-group style) ──────────────────────────

/// Shared up/down flag with blocking waits, the Rust shape of an event
/// group CONNECTED bit.
pub struct LinkStatus {
    up: Mutex<bool>,
    cv: Condvar,
}

impl LinkStatus {
    pub fn new() -> Self {
        Self {
            up: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn set_up(&self, up: bool) {
        *self.up.lock().unwrap() = up;
        self.cv.notify_all();
    }

    pub fn is_up(&self) -> bool {
        *self.up.lock().unwrap()
    }

    /// Block until the link is up or the timeout elapses.
    pub fn wait_for_ip(&self, timeout: Duration) -> bool {
        let guard = self.up.lock().unwrap();
        let (guard, _) = self
            .cv
            .wait_timeout_while(guard, timeout, |up| !*up)
            .unwrap();
        *guard
    }
}

impl Default for LinkStatus {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Restart gate ─────────────────────────────────────────────

/// Serialises Wi-Fi restarts. A second caller waits a bounded time for
/// the in-flight restart to finish, then gives up with `RestartLocked`.
pub struct RestartGate {
    busy: Mutex<bool>,
    cv: Condvar,
}

impl RestartGate {
    pub fn new() -> Self {
        Self {
            busy: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    /// Claim the gate, waiting up to `wait` for a holder to release it.
    pub fn begin(&self, wait: Duration) -> Result<(), CommsError> {
        let guard = self.busy.lock().unwrap();
        let (mut guard, timeout) = self
            .cv
            .wait_timeout_while(guard, wait, |busy| *busy)
            .unwrap();
        if timeout.timed_out() && *guard {
            return Err(CommsError::RestartLocked);
        }
        *guard = true;
        Ok(())
    }

    pub fn end(&self) {
        *self.busy.lock().unwrap() = false;
        self.cv.notify_all();
    }
}

impl Default for RestartGate {
    fn default() -> Self {
        Self::new()
    }
}

// ─── Device-side loop ─────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub mod device {
    //! Polling supervisor over `EspWifi`. Runs on the protocol core.

    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::nvs::EspDefaultNvsPartition;
    use esp_idf_svc::wifi::{ClientConfiguration, Configuration, EspWifi};
    use log::{error, info};

    use super::{ConnectionTracker, LinkStatus, RestartGate, WifiAction, WifiEvent};
    use crate::config::NodeConfig;
    use crate::drivers::task_pin::{spawn_on_core, Core};
    use crate::error::{CommsError, Error, Result};

    pub struct WifiCredentials {
        pub ssid: heapless::String<32>,
        pub password: heapless::String<64>,
    }

    pub struct WifiSupervisor {
        pub link: Arc<LinkStatus>,
        pub gate: Arc<RestartGate>,
        restart_req: Arc<AtomicBool>,
        restart_wait: Duration,
        task: Option<std::thread::JoinHandle<()>>,
    }

    impl WifiSupervisor {
        /// Bring the station up and keep it up. The returned handle's
        /// `link` can be waited on for the first IP.
        pub fn start(
            cfg: &NodeConfig,
            creds: WifiCredentials,
            modem: Modem,
            sysloop: EspSystemEventLoop,
            nvs: EspDefaultNvsPartition,
        ) -> Result<Self> {
            let mut wifi = EspWifi::new(modem, sysloop, Some(nvs))
                .map_err(|_| Error::from(CommsError::WifiStartFailed))?;
            wifi.set_configuration(&Configuration::Client(ClientConfiguration {
                ssid: creds.ssid.clone(),
                password: creds.password.clone(),
                ..Default::default()
            }))
            .map_err(|_| Error::from(CommsError::WifiStartFailed))?;
            wifi.start()
                .map_err(|_| Error::from(CommsError::WifiStartFailed))?;

            let link = Arc::new(LinkStatus::new());
            let gate = Arc::new(RestartGate::new());
            let restart_req = Arc::new(AtomicBool::new(false));

            let mut tracker =
                ConnectionTracker::new(cfg.wifi_backoff_floor_ms, cfg.wifi_backoff_cap_ms);
            let link2 = Arc::clone(&link);
            let req2 = Arc::clone(&restart_req);
            let task = spawn_on_core(Core::Pro, 5, 8, "wifi_super\0", move || {
                run(&mut wifi, &mut tracker, &link2, &req2);
            })
            .map_err(|_| Error::from(CommsError::WifiStartFailed))?;

            Ok(Self {
                link,
                gate,
                restart_req,
                restart_wait: Duration::from_millis(u64::from(cfg.wifi_restart_wait_ms)),
                task: Some(task),
            })
        }

        /// Request a full reconnect cycle, serialised through the gate.
        pub fn restart(&self) -> Result<()> {
            self.gate.begin(self.restart_wait)?;
            self.restart_req.store(true, Ordering::Relaxed);
            // The polling loop picks the request up within one poll tick
            // and clears the link; the gate reopens once it reconnects.
            self.gate.end();
            Ok(())
        }
    }

    fn run(
        wifi: &mut EspWifi<'static>,
        tracker: &mut ConnectionTracker,
        link: &LinkStatus,
        restart_req: &AtomicBool,
    ) {
        let mut action = tracker.on_event(WifiEvent::Started);
        loop {
            match action {
                WifiAction::Connect => {
                    if let Err(e) = wifi.connect() {
                        error!("wifi: connect error: {:?}", e);
                        action = tracker.on_event(WifiEvent::Disconnected);
                        continue;
                    }
                    action = tracker.on_event(WifiEvent::Connected);
                }
                WifiAction::ReconnectAfterMs(ms) => {
                    std::thread::sleep(Duration::from_millis(u64::from(ms)));
                    action = WifiAction::Connect;
                }
                WifiAction::None => {
                    std::thread::sleep(Duration::from_secs(1));
                    if restart_req.swap(false, Ordering::Relaxed) {
                        info!("wifi: restart requested");
                        link.set_up(false);
                        let _ = wifi.disconnect();
                        action = tracker.on_event(WifiEvent::Disconnected);
                        continue;
                    }
                    let up = wifi.is_up().unwrap_or(false);
                    let was_up = link.is_up();
                    if up && !was_up {
                        link.set_up(true);
                        action = tracker.on_event(WifiEvent::GotIp);
                        info!("wifi: got IP");
                    } else if !up && was_up {
                        link.set_up(false);
                        action = tracker.on_event(WifiEvent::Disconnected);
                    } else if !up && tracker.state() == super::WifiState::Connecting {
                        // still associating; poll again
                        action = WifiAction::None;
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Instant;

    #[test]
    fn backoff_doubles_to_cap() {
        let mut b = Backoff::new(1_000, 30_000);
        let seq: Vec<u32> = (0..7).map(|_| b.next()).collect();
        assert_eq!(seq, vec![1_000, 2_000, 4_000, 8_000, 16_000, 30_000, 30_000]);
    }

    #[test]
    fn backoff_reset_returns_to_floor() {
        let mut b = Backoff::new(1_000, 30_000);
        for _ in 0..5 {
            b.next();
        }
        b.reset();
        assert_eq!(b.next(), 1_000);
    }

    #[test]
    fn tracker_reconnects_with_growing_delay() {
        let mut t = ConnectionTracker::new(1_000, 30_000);
        assert_eq!(t.on_event(WifiEvent::Started), WifiAction::Connect);
        assert_eq!(
            t.on_event(WifiEvent::Disconnected),
            WifiAction::ReconnectAfterMs(1_000)
        );
        assert_eq!(
            t.on_event(WifiEvent::Disconnected),
            WifiAction::ReconnectAfterMs(2_000)
        );
        assert_eq!(t.drops(), 2);
    }

    #[test]
    fn got_ip_resets_backoff() {
        let mut t = ConnectionTracker::new(1_000, 30_000);
        t.on_event(WifiEvent::Started);
        t.on_event(WifiEvent::Disconnected);
        t.on_event(WifiEvent::Disconnected);
        t.on_event(WifiEvent::GotIp);
        assert_eq!(t.state(), WifiState::Connected);
        assert_eq!(
            t.on_event(WifiEvent::Disconnected),
            WifiAction::ReconnectAfterMs(1_000)
        );
    }

    #[test]
    fn wait_for_ip_times_out_when_down() {
        let link = LinkStatus::new();
        let start = Instant::now();
        assert!(!link.wait_for_ip(Duration::from_millis(20)));
        assert!(start.elapsed() >= Duration::from_millis(20));
    }

    #[test]
    fn wait_for_ip_returns_immediately_when_up() {
        let link = LinkStatus::new();
        link.set_up(true);
        assert!(link.wait_for_ip(Duration::from_secs(60)));
    }

    #[test]
    fn wait_for_ip_wakes_on_set_up() {
        let link = Arc::new(LinkStatus::new());
        let l2 = Arc::clone(&link);
        let t = std::thread::spawn(move || l2.wait_for_ip(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(10));
        link.set_up(true);
        assert!(t.join().unwrap());
    }

    #[test]
    fn restart_gate_blocks_second_caller() {
        let gate = RestartGate::new();
        gate.begin(Duration::from_millis(1)).unwrap();
        assert_eq!(
            gate.begin(Duration::from_millis(10)),
            Err(CommsError::RestartLocked)
        );
        gate.end();
        assert!(gate.begin(Duration::from_millis(1)).is_ok());
    }

    #[test]
    fn restart_gate_bounded_wait_succeeds_after_release() {
        let gate = Arc::new(RestartGate::new());
        gate.begin(Duration::from_millis(1)).unwrap();
        let g2 = Arc::clone(&gate);
        let t = std::thread::spawn(move || g2.begin(Duration::from_secs(5)));
        std::thread::sleep(Duration::from_millis(10));
        gate.end();
        assert!(t.join().unwrap().is_ok());
    }
}

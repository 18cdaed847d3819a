//! UltraNode Firmware — Main Entry Point
//!
//! Hexagonal layout: engines and policy are pure logic behind port
//! traits; the ESP-IDF adapters and drivers form the outer ring.
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                      Adapters (outer ring)                     │
//! │                                                                │
//! │  MqttService     NvsAdapter      UptimeAdapter                 │
//! │  (commands/acks) (config+state)  (UptimePort)                  │
//! │  WifiSupervisor  SntpService                                   │
//! │  (station)       (clock sync)                                  │
//! │                                                                │
//! │  ──────────────── Port Trait Boundary ───────────────────      │
//! │                                                                │
//! │  ┌────────────────────────────────────────────────────────┐    │
//! │  │  WsEngine · RgbEngine · WhiteEngine · RelayBank        │    │
//! │  │  reconcile · StateStore · HealthMonitor                │    │
//! │  └────────────────────────────────────────────────────────┘    │
//! │                                                                │
//! │  Supervisory loop: event queue · state flush · watchdog        │
//! └────────────────────────────────────────────────────────────────┘
//! ```
#![deny(unused_must_use)]

#[cfg(target_os = "espidf")]
mod firmware {
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use anyhow::Result;
    use log::{error, info, warn};

    use ultranode::adapters::mqtt::device::{CommandHandler, MqttService};
    use ultranode::adapters::nvs::NvsAdapter;
    use ultranode::adapters::time::UptimeAdapter;
    use ultranode::drivers::ledc::Esp32PwmFactory;
    use ultranode::drivers::relay::{bank_from_config, RelayBank};
    use ultranode::drivers::strip::Esp32StripFactory;
    use ultranode::drivers::watchdog::Watchdog;
    use ultranode::engine::rgb::RgbEngine;
    use ultranode::engine::white::WhiteEngine;
    use ultranode::engine::ws::WsEngine;
    use ultranode::events::{drain_events, push_event, Event};
    use ultranode::health::HealthMonitor;
    use ultranode::net::sntp::device::SntpService;
    use ultranode::net::sntp::{SntpRetry, TimeSync};
    use ultranode::net::supervisor::device::{WifiCredentials, WifiSupervisor};
    use ultranode::ports::{RecoveryPort, UptimePort};
    use ultranode::reconcile::{self, Family};
    use ultranode::state::{self, StateStore};

    const LOOP_TICK_MS: u64 = 100;
    const WIFI_IP_WAIT_SECS: u64 = 30;
    const MQTT_ATTEMPT_SPACING_SECS: u64 = 30;

    // ── Recovery bridge ───────────────────────────────────────
    //
    // The health monitor requests; the supervisory loop executes.  This
    // impl translates requests into queue events so the check can run
    // from its own task without holding any adapter handle.

    struct EventRecovery;

    impl RecoveryPort for EventRecovery {
        fn recover_wifi(&mut self) {
            push_event(Event::RecoverWifi);
        }

        fn restart_mqtt(&mut self) {
            push_event(Event::RestartMqtt);
        }

        fn reboot(&mut self, reason: &'static str) {
            error!("reboot requested: {}", reason);
            push_event(Event::RebootRequested);
        }
    }

    fn load_credentials(nvs: &NvsAdapter) -> Option<WifiCredentials> {
        let mut ssid_buf = [0u8; 32];
        let mut pass_buf = [0u8; 64];
        let ssid_len = nvs.read_credential("wifi_ssid", &mut ssid_buf).ok()?;
        let pass_len = nvs.read_credential("wifi_pass", &mut pass_buf).unwrap_or(0);

        let mut ssid = heapless::String::new();
        ssid.push_str(core::str::from_utf8(&ssid_buf[..ssid_len]).ok()?)
            .ok()?;
        let mut password = heapless::String::new();
        password
            .push_str(core::str::from_utf8(&pass_buf[..pass_len]).ok()?)
            .ok()?;
        Some(WifiCredentials { ssid, password })
    }

    fn free_heap_bytes() -> u32 {
        unsafe { esp_idf_svc::sys::esp_get_free_heap_size() }
    }

    pub fn run() -> Result<()> {
        // ── 1. ESP-IDF bootstrap ──────────────────────────────
        esp_idf_svc::sys::link_patches();
        esp_idf_logger::init()?;

        info!("╔══════════════════════════════════════╗");
        info!("║  UltraNode v{}                      ║", env!("CARGO_PKG_VERSION"));
        info!("╚══════════════════════════════════════╝");

        let watchdog = Watchdog::new();
        let uptime = UptimeAdapter::new();

        // ── 2. Config from NVS (or defaults) ──────────────────
        let mut nvs = NvsAdapter::new()
            .map_err(|e| anyhow::anyhow!("NVS init failed: {}", e))?;
        let config = nvs.load_config();

        // ── 3. Light engines ──────────────────────────────────
        //
        // Each family starts independently; a dead channel or a failed
        // peripheral never takes down its siblings.
        let mut ws = WsEngine::new();
        {
            let mut strips = Esp32StripFactory::new();
            if let Err(e) = ws.start(&config, &mut strips) {
                warn!("ws engine not started: {}", e);
            }
        }

        let mut rgb = RgbEngine::new();
        let mut white = WhiteEngine::new();
        match Esp32PwmFactory::new(config.ledc_freq_hz) {
            Ok(mut pwm) => {
                if let Err(e) = rgb.start(&config, &mut pwm) {
                    warn!("rgb engine not started: {}", e);
                }
                if let Err(e) = white.start(&config, &mut pwm) {
                    warn!("white engine not started: {}", e);
                }
            }
            Err(e) => warn!("LEDC timer init failed, PWM engines offline: {}", e),
        }

        let ws = Arc::new(ws);
        let rgb = Arc::new(rgb);
        let white = Arc::new(white);
        let relays: Arc<Mutex<RelayBank>> = Arc::new(Mutex::new(bank_from_config(&config)));

        // ── 4. Replay persisted channel state ─────────────────
        let store = Arc::new(Mutex::new(StateStore::new(config.state_flush_delay_ms)));
        state::replay(&nvs, |family, channel, payload| {
            let res = match family {
                Family::Ws => reconcile::apply_ws(&ws, payload),
                Family::Rgb => reconcile::apply_rgb(&rgb, payload),
                Family::White => reconcile::apply_white(&white, payload),
                Family::Relay => reconcile::apply_relay(&mut relays.lock().unwrap(), payload),
            };
            match res {
                Ok(_) => info!("state: restored {}/{}", family.as_str(), channel),
                Err(e) => warn!("state: replay {}/{} failed: {}", family.as_str(), channel, e),
            }
        });

        // ── 5. Wi-Fi station ──────────────────────────────────
        let sysloop = esp_idf_svc::eventloop::EspSystemEventLoop::take()?;
        let nvs_partition = esp_idf_svc::nvs::EspDefaultNvsPartition::take()?;
        let peripherals = esp_idf_svc::hal::peripherals::Peripherals::take()?;

        let wifi = match load_credentials(&nvs) {
            Some(creds) => {
                match WifiSupervisor::start(&config, creds, peripherals.modem, sysloop, nvs_partition)
                {
                    Ok(sup) => {
                        if !sup.link.wait_for_ip(Duration::from_secs(WIFI_IP_WAIT_SECS)) {
                            warn!("wifi: no IP after {}s, supervisor keeps retrying", WIFI_IP_WAIT_SECS);
                        }
                        Some(sup)
                    }
                    Err(e) => {
                        warn!("wifi: supervisor start failed, running offline: {}", e);
                        None
                    }
                }
            }
            None => {
                warn!("wifi: no credentials provisioned, running offline");
                None
            }
        };

        // ── 6. SNTP ───────────────────────────────────────────
        let time_sync = Arc::new(TimeSync::new());
        let uptime_port: Arc<dyn UptimePort + Sync> = Arc::new(UptimeAdapter::new());
        let mut sntp_retry = SntpRetry::new(config.sntp_retry_floor_secs, config.sntp_retry_cap_secs);
        let mut sntp: Option<SntpService> = None;
        let mut sntp_next_attempt_ms: u64 = 0;
        if wifi.is_some() {
            match SntpService::start(&config, time_sync.clone(), uptime_port.clone()) {
                Ok(s) => {
                    sntp_retry.on_spawn_success();
                    sntp = Some(s);
                }
                Err(e) => {
                    let delay = sntp_retry.on_spawn_failure(uptime.uptime_secs());
                    sntp_next_attempt_ms = uptime.uptime_secs() * 1000 + u64::from(delay);
                    warn!("sntp: start failed ({}), retrying in {} ms", e, delay);
                }
            }
        }

        // ── 7. MQTT command transport ─────────────────────────
        let handler: Arc<CommandHandler> = {
            let ws = ws.clone();
            let rgb = rgb.clone();
            let white = white.clone();
            let relays = relays.clone();
            let store = store.clone();
            Arc::new(move |family, payload: &str| {
                let res = match family {
                    Family::Ws => reconcile::apply_ws(&ws, payload),
                    Family::Rgb => reconcile::apply_rgb(&rgb, payload),
                    Family::White => reconcile::apply_white(&white, payload),
                    Family::Relay => {
                        reconcile::apply_relay(&mut relays.lock().unwrap(), payload)
                    }
                };
                match res {
                    Ok(ack) => {
                        let channel = serde_json::from_str::<serde_json::Value>(payload)
                            .map(|v| reconcile::target_channel(&v))
                            .unwrap_or(0);
                        store.lock().unwrap().record(family, channel, payload);
                        Some(ack)
                    }
                    Err(e) => {
                        warn!("{}: command rejected: {}", family.as_str(), e);
                        None
                    }
                }
            })
        };

        let mut mqtt: Option<MqttService> = None;
        let mut mqtt_next_attempt_secs: u64 = 0;

        // ── 8. Health monitor ─────────────────────────────────
        let health = HealthMonitor::new(&config);
        let mut recovery = EventRecovery;
        let mut next_health_secs = u64::from(config.health_period_secs);
        let mut wifi_was_up = false;

        info!("System ready. Entering supervisory loop.");

        // ── 9. Supervisory loop ───────────────────────────────
        loop {
            std::thread::sleep(Duration::from_millis(LOOP_TICK_MS));
            watchdog.feed();
            let now_secs = uptime.uptime_secs();

            // Wi-Fi link edge detection.
            let wifi_up = wifi.as_ref().is_some_and(|w| w.link.is_up());
            if wifi_up != wifi_was_up {
                wifi_was_up = wifi_up;
                push_event(if wifi_up { Event::WifiUp } else { Event::WifiDown });
            }

            // MQTT session lifecycle: start once the link is up, recreate
            // after RestartMqtt tore the old client down.
            if mqtt.is_none() && wifi_up && now_secs >= mqtt_next_attempt_secs {
                match MqttService::start(&config, handler.clone()) {
                    Ok(svc) => mqtt = Some(svc),
                    Err(e) => {
                        mqtt_next_attempt_secs = now_secs + MQTT_ATTEMPT_SPACING_SECS;
                        warn!("mqtt: start failed ({}), next attempt in {}s", e, MQTT_ATTEMPT_SPACING_SECS);
                    }
                }
            }

            // SNTP spawn retry.
            if sntp.is_none() && wifi_up && now_secs * 1000 >= sntp_next_attempt_ms {
                match SntpService::start(&config, time_sync.clone(), uptime_port.clone()) {
                    Ok(s) => {
                        sntp_retry.on_spawn_success();
                        sntp = Some(s);
                    }
                    Err(e) => {
                        let delay = sntp_retry.on_spawn_failure(now_secs);
                        sntp_next_attempt_ms = now_secs * 1000 + u64::from(delay);
                        warn!("sntp: start failed ({}), retrying in {} ms", e, delay);
                    }
                }
            }

            // Process all pending events.
            drain_events(|event| match event {
                Event::WifiUp => health.note_wifi(true, now_secs),
                Event::WifiDown => health.note_wifi(false, now_secs),
                Event::MqttUp => health.note_mqtt(true, now_secs),
                Event::MqttDown => health.note_mqtt(false, now_secs),

                Event::RecoverWifi => {
                    if let Some(sup) = &wifi {
                        match sup.restart() {
                            Ok(()) => info!("wifi: recovery cycle started"),
                            Err(e) => warn!("wifi: recovery skipped: {}", e),
                        }
                    }
                }

                Event::RestartMqtt => {
                    info!("mqtt: restarting client");
                    mqtt = None; // dropped here; poll task exits with it
                    mqtt_next_attempt_secs = 0;
                }

                Event::RebootRequested => {
                    store.lock().unwrap().flush_all(&mut nvs);
                    error!("rebooting now");
                    unsafe { esp_idf_svc::sys::esp_restart() };
                }

                Event::StateDirty => {
                    // Flushed below on the debounce deadline.
                }
            });

            // Debounced state persistence.
            store.lock().unwrap().tick(&mut nvs);

            // Periodic health check.
            if now_secs >= next_health_secs {
                next_health_secs = now_secs + u64::from(config.health_period_secs);
                health.check(
                    now_secs,
                    free_heap_bytes(),
                    time_sync.age_secs(now_secs),
                    sntp_retry.snapshot(),
                    &mut recovery,
                );
            }
        }
    }
}

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::run()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    eprintln!("ultranode targets the ESP32; host builds expose the library only");
}

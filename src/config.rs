//! Node configuration parameters
//!
//! All tunable parameters for an UltraNode lighting controller.
//! Values can be overridden via NVS; defaults match a two-strip,
//! single-PWM-bank reference board.

use serde::{Deserialize, Serialize};

/// Maximum addressable (WS2812) strips per node.
pub const WS_MAX_STRIPS: usize = 2;
/// Maximum RGB PWM strips per node.
pub const RGB_MAX_STRIPS: usize = 4;
/// Maximum single-channel white PWM outputs per node.
pub const WHITE_MAX_CHANNELS: usize = 4;
/// Maximum relay outputs per node.
pub const RELAY_MAX_CHANNELS: usize = 4;

/// One addressable strip.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WsStripConfig {
    pub enabled: bool,
    /// Data GPIO.
    pub gpio: u8,
    /// Pixel count.
    pub pixels: u16,
}

/// One RGB PWM strip (three LEDC channels).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RgbStripConfig {
    pub enabled: bool,
    pub gpio_r: u8,
    pub gpio_g: u8,
    pub gpio_b: u8,
}

/// One white PWM channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WhiteChannelConfig {
    pub enabled: bool,
    pub gpio: u8,
}

/// One relay output.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct RelayConfig {
    pub enabled: bool,
    pub gpio: u8,
    /// Relay board drives the load on a low level.
    pub active_low: bool,
}

/// Core node configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeConfig {
    // --- Channels ---
    pub ws_strips: [WsStripConfig; WS_MAX_STRIPS],
    pub rgb_strips: [RgbStripConfig; RGB_MAX_STRIPS],
    pub white_channels: [WhiteChannelConfig; WHITE_MAX_CHANNELS],
    pub relays: [RelayConfig; RELAY_MAX_CHANNELS],

    // --- Render timing ---
    /// Addressable strip render rate (frames/second)
    pub ws_fps: u32,
    /// PWM smoothing rate for rgb and white engines (updates/second)
    pub pwm_smooth_hz: u32,
    /// LEDC carrier frequency (Hz)
    pub ledc_freq_hz: u32,

    // --- MQTT ---
    /// Broker URI, e.g. `mqtt://192.168.1.10:1883`
    pub mqtt_broker_uri: heapless::String<64>,
    /// Client identifier
    pub mqtt_client_id: heapless::String<32>,
    /// Topic prefix; commands arrive on `<prefix>/<family>/set`
    pub mqtt_topic_prefix: heapless::String<32>,

    // --- Wi-Fi supervisor ---
    /// First reconnect delay after a drop (milliseconds)
    pub wifi_backoff_floor_ms: u32,
    /// Reconnect delay cap (milliseconds)
    pub wifi_backoff_cap_ms: u32,
    /// Bounded wait for a concurrent restart to finish (milliseconds)
    pub wifi_restart_wait_ms: u32,

    // --- SNTP ---
    /// Periodic resync interval (seconds)
    pub sntp_resync_secs: u32,
    /// First retry after the resync task fails to spawn (seconds)
    pub sntp_retry_floor_secs: u32,
    /// Spawn-retry cap (seconds)
    pub sntp_retry_cap_secs: u32,

    // --- State persistence ---
    /// Debounce window before flushing last-command state to NVS (ms)
    pub state_flush_delay_ms: u32,

    // --- Health monitor ---
    /// Health check interval (seconds)
    pub health_period_secs: u32,
    /// Wi-Fi offline duration before requesting recovery (seconds)
    pub wifi_offline_secs: u32,
    /// Minimum spacing between Wi-Fi recovery attempts (seconds)
    pub wifi_recovery_cooldown_secs: u32,
    /// Wi-Fi recovery attempts before reboot escalation
    pub wifi_max_attempts: u32,
    /// Wi-Fi offline duration before reboot escalation (seconds)
    pub wifi_escalate_secs: u32,
    /// MQTT offline duration before requesting a client restart (seconds)
    pub mqtt_offline_secs: u32,
    /// MQTT restarts before escalating to a Wi-Fi cycle
    pub mqtt_max_attempts: u32,
    /// MQTT offline duration before Wi-Fi cycle escalation (seconds)
    pub mqtt_escalate_secs: u32,
    /// Free-heap floor (bytes)
    pub heap_min_bytes: u32,
    /// Consecutive low-heap checks before reboot
    pub heap_max_strikes: u32,
    /// Time-sync age that logs a warning and cycles Wi-Fi (seconds)
    pub time_warn_secs: u32,
    /// Time-sync age that reboots the node (seconds)
    pub time_error_secs: u32,
    /// Metrics log line spacing (seconds)
    pub metrics_log_secs: u32,
}

fn str_into<const N: usize>(s: &str) -> heapless::String<N> {
    let mut out = heapless::String::new();
    let _ = out.push_str(s);
    out
}

impl Default for NodeConfig {
    fn default() -> Self {
        const WS_OFF: WsStripConfig = WsStripConfig {
            enabled: false,
            gpio: 0,
            pixels: 0,
        };
        const RGB_OFF: RgbStripConfig = RgbStripConfig {
            enabled: false,
            gpio_r: 0,
            gpio_g: 0,
            gpio_b: 0,
        };
        const WHITE_OFF: WhiteChannelConfig = WhiteChannelConfig {
            enabled: false,
            gpio: 0,
        };
        const RELAY_OFF: RelayConfig = RelayConfig {
            enabled: false,
            gpio: 0,
            active_low: true,
        };

        Self {
            ws_strips: [
                WsStripConfig {
                    enabled: true,
                    gpio: 16,
                    pixels: 300,
                },
                WS_OFF,
            ],
            rgb_strips: [
                RgbStripConfig {
                    enabled: true,
                    gpio_r: 25,
                    gpio_g: 26,
                    gpio_b: 27,
                },
                RGB_OFF,
                RGB_OFF,
                RGB_OFF,
            ],
            white_channels: [
                WhiteChannelConfig {
                    enabled: true,
                    gpio: 19,
                },
                WHITE_OFF,
                WHITE_OFF,
                WHITE_OFF,
            ],
            relays: [
                RelayConfig {
                    enabled: true,
                    gpio: 32,
                    active_low: true,
                },
                RELAY_OFF,
                RELAY_OFF,
                RELAY_OFF,
            ],

            // Render timing
            ws_fps: 60,
            pwm_smooth_hz: 200,
            ledc_freq_hz: 5000,

            // MQTT
            mqtt_broker_uri: str_into("mqtt://192.168.1.10:1883"),
            mqtt_client_id: str_into("ultranode"),
            mqtt_topic_prefix: str_into("ultranode"),

            // Wi-Fi supervisor
            wifi_backoff_floor_ms: 1_000,
            wifi_backoff_cap_ms: 30_000,
            wifi_restart_wait_ms: 10_000,

            // SNTP
            sntp_resync_secs: 3_600,
            sntp_retry_floor_secs: 5,
            sntp_retry_cap_secs: 60,

            // State persistence
            state_flush_delay_ms: 3_000,

            // Health monitor
            health_period_secs: 60,
            wifi_offline_secs: 900,            // 15 min
            wifi_recovery_cooldown_secs: 600,  // 10 min
            wifi_max_attempts: 4,
            wifi_escalate_secs: 21_600, // 6 h
            mqtt_offline_secs: 300,     // 5 min
            mqtt_max_attempts: 6,
            mqtt_escalate_secs: 7_200, // 2 h
            heap_min_bytes: 20 * 1024,
            heap_max_strikes: 5,
            time_warn_secs: 86_400,    // 24 h
            time_error_secs: 604_800,  // 7 d
            metrics_log_secs: 900,     // 15 min
        }
    }
}

impl NodeConfig {
    /// Render tick period for the ws engine.
    pub fn ws_tick_ms(&self) -> u32 {
        1_000 / self.ws_fps.max(1)
    }

    /// Smoothing tick period for the PWM engines.
    pub fn pwm_tick_ms(&self) -> u32 {
        1_000 / self.pwm_smooth_hz.max(1)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_sane() {
        let c = NodeConfig::default();
        assert!(c.ws_fps > 0 && c.ws_fps <= 120);
        assert!(c.pwm_smooth_hz > 0);
        assert!(c.wifi_backoff_floor_ms < c.wifi_backoff_cap_ms);
        assert!(c.sntp_retry_floor_secs < c.sntp_retry_cap_secs);
        assert!(c.wifi_offline_secs > c.health_period_secs);
        assert!(c.time_warn_secs < c.time_error_secs);
        assert!(c.heap_min_bytes > 0);
        assert!(c.mqtt_broker_uri.starts_with("mqtt://"));
        assert!(!c.mqtt_topic_prefix.is_empty());
    }

    #[test]
    fn tick_periods() {
        let c = NodeConfig::default();
        assert_eq!(c.ws_tick_ms(), 16); // 60 FPS, integer floor
        assert_eq!(c.pwm_tick_ms(), 5); // 200 Hz
    }

    #[test]
    fn escalation_thresholds_ordered() {
        let c = NodeConfig::default();
        assert!(
            c.wifi_offline_secs < c.wifi_escalate_secs,
            "recovery must trigger before reboot escalation"
        );
        assert!(
            c.mqtt_offline_secs < c.mqtt_escalate_secs,
            "client restart must trigger before Wi-Fi cycle"
        );
    }

    #[test]
    fn serde_roundtrip() {
        let c = NodeConfig::default();
        let json = serde_json::to_string(&c).unwrap();
        let c2: NodeConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(c.ws_strips[0].pixels, c2.ws_strips[0].pixels);
        assert_eq!(c.wifi_backoff_cap_ms, c2.wifi_backoff_cap_ms);
        assert_eq!(c.heap_max_strikes, c2.heap_max_strikes);
    }

    #[test]
    fn postcard_roundtrip() {
        let c = NodeConfig::default();
        let bytes = postcard::to_allocvec(&c).unwrap();
        let c2: NodeConfig = postcard::from_bytes(&bytes).unwrap();
        assert_eq!(c.ws_fps, c2.ws_fps);
        assert_eq!(c.relays[0].gpio, c2.relays[0].gpio);
    }
}

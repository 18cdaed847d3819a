//! Unified error types for the UltraNode firmware.
//!
//! A single `Error` enum that every subsystem converts into, keeping the
//! supervisory loop's error handling uniform. All variants are `Copy` so
//! they cross task boundaries without allocation.

use core::fmt;

// ─── Top-level firmware error ─────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// An effect engine failed to start, stop, or mutate channel state.
    Engine(EngineError),
    /// A hardware output driver failed.
    Driver(DriverError),
    /// A communication subsystem failed.
    Comms(CommsError),
    /// Peripheral or service initialisation failed.
    Init(&'static str),
    /// Configuration is invalid or could not be loaded.
    Config(&'static str),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Engine(e) => write!(f, "engine: {e}"),
            Self::Driver(e) => write!(f, "driver: {e}"),
            Self::Comms(e) => write!(f, "comms: {e}"),
            Self::Init(msg) => write!(f, "init: {msg}"),
            Self::Config(msg) => write!(f, "config: {msg}"),
        }
    }
}

impl std::error::Error for Error {}

// ─── Engine errors ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineError {
    /// Channel index out of range or channel not enabled.
    ChannelDisabled,
    /// No effect with the requested name in the registry.
    UnknownEffect,
    /// Render or refresh task could not be spawned.
    TaskSpawnFailed,
    /// Engine already running.
    AlreadyRunning,
    /// Engine not running.
    NotRunning,
}

impl fmt::Display for EngineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ChannelDisabled => write!(f, "channel disabled or out of range"),
            Self::UnknownEffect => write!(f, "unknown effect"),
            Self::TaskSpawnFailed => write!(f, "task spawn failed"),
            Self::AlreadyRunning => write!(f, "already running"),
            Self::NotRunning => write!(f, "not running"),
        }
    }
}

impl From<EngineError> for Error {
    fn from(e: EngineError) -> Self {
        Self::Engine(e)
    }
}

// ─── Driver errors ────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverError {
    /// LED strip device creation failed (SPI/DMA setup).
    StripInitFailed,
    /// LEDC timer or channel configuration failed.
    PwmInitFailed,
    /// PWM duty write failed.
    PwmWriteFailed,
    /// GPIO level write failed.
    GpioWriteFailed,
    /// Bus transmission to the strip failed.
    RefreshFailed,
}

impl fmt::Display for DriverError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::StripInitFailed => write!(f, "LED strip init failed"),
            Self::PwmInitFailed => write!(f, "LEDC init failed"),
            Self::PwmWriteFailed => write!(f, "PWM write failed"),
            Self::GpioWriteFailed => write!(f, "GPIO write failed"),
            Self::RefreshFailed => write!(f, "strip refresh failed"),
        }
    }
}

impl From<DriverError> for Error {
    fn from(e: DriverError) -> Self {
        Self::Driver(e)
    }
}

// ─── Communications errors ────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommsError {
    WifiStartFailed,
    WifiConnectFailed,
    WifiTimeout,
    /// Another task already holds the Wi-Fi restart guard.
    RestartLocked,
    MqttStartFailed,
    MqttPublishFailed,
    SntpStartFailed,
}

impl fmt::Display for CommsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::WifiStartFailed => write!(f, "Wi-Fi start failed"),
            Self::WifiConnectFailed => write!(f, "Wi-Fi connect failed"),
            Self::WifiTimeout => write!(f, "Wi-Fi wait timed out"),
            Self::RestartLocked => write!(f, "Wi-Fi restart already in progress"),
            Self::MqttStartFailed => write!(f, "MQTT client start failed"),
            Self::MqttPublishFailed => write!(f, "MQTT publish failed"),
            Self::SntpStartFailed => write!(f, "SNTP start failed"),
        }
    }
}

impl From<CommsError> for Error {
    fn from(e: CommsError) -> Self {
        Self::Comms(e)
    }
}

// ─── Result alias ─────────────────────────────────────────────

pub type Result<T> = core::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_category() {
        let e: Error = EngineError::UnknownEffect.into();
        assert_eq!(e.to_string(), "engine: unknown effect");

        let e: Error = DriverError::PwmWriteFailed.into();
        assert_eq!(e.to_string(), "driver: PWM write failed");

        let e = Error::Init("nvs partition");
        assert_eq!(e.to_string(), "init: nvs partition");
    }

    #[test]
    fn errors_are_copy() {
        fn assert_copy<T: Copy>() {}
        assert_copy::<Error>();
        assert_copy::<EngineError>();
        assert_copy::<CommsError>();
    }
}

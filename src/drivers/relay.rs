//! Relay GPIO outputs.
//!
//! Relays are plain on/off lines behind any `embedded-hal` output pin,
//! so the same wrapper drives an ESP-IDF `PinDriver` on device and a
//! recording pin in tests. Boards with opto-isolated relay inputs are
//! active-low; polarity is handled here so the rest of the firmware only
//! speaks logical on/off.

use embedded_hal::digital::OutputPin;
use log::{error, warn};

use crate::config::{NodeConfig, RELAY_MAX_CHANNELS};
use crate::error::{DriverError, EngineError, Result};
use crate::ports::RelayOutput;

// ─── Generic pin-backed relay ─────────────────────────────────

pub struct GpioRelay<P: OutputPin + Send> {
    pin: P,
    active_low: bool,
    on: bool,
}

impl<P: OutputPin + Send> GpioRelay<P> {
    /// Wrap a pin, driving it to the released state immediately.
    pub fn new(mut pin: P, active_low: bool) -> core::result::Result<Self, DriverError> {
        let level_off = active_low;
        set_level(&mut pin, level_off)?;
        Ok(Self {
            pin,
            active_low,
            on: false,
        })
    }
}

fn set_level<P: OutputPin>(pin: &mut P, high: bool) -> core::result::Result<(), DriverError> {
    let res = if high { pin.set_high() } else { pin.set_low() };
    res.map_err(|_| DriverError::GpioWriteFailed)
}

impl<P: OutputPin + Send> RelayOutput for GpioRelay<P> {
    fn set(&mut self, on: bool) -> core::result::Result<(), DriverError> {
        set_level(&mut self.pin, on != self.active_low)?;
        self.on = on;
        Ok(())
    }

    fn is_on(&self) -> bool {
        self.on
    }
}

// ─── Bank ─────────────────────────────────────────────────────

/// The node's relay channels, indexed like every other channel family.
pub struct RelayBank {
    slots: [Option<Box<dyn RelayOutput>>; RELAY_MAX_CHANNELS],
}

impl RelayBank {
    pub fn empty() -> Self {
        Self {
            slots: core::array::from_fn(|_| None),
        }
    }

    pub fn insert(&mut self, channel: usize, relay: Box<dyn RelayOutput>) {
        if let Some(slot) = self.slots.get_mut(channel) {
            *slot = Some(relay);
        }
    }

    pub fn set(&mut self, channel: usize, on: bool) -> Result<()> {
        let relay = self
            .slots
            .get_mut(channel)
            .and_then(Option::as_mut)
            .ok_or(EngineError::ChannelDisabled)?;
        relay.set(on)?;
        Ok(())
    }

    pub fn is_on(&self, channel: usize) -> bool {
        self.slots
            .get(channel)
            .and_then(Option::as_ref)
            .is_some_and(|r| r.is_on())
    }

    /// Release every relay. For shutdown paths.
    pub fn all_off(&mut self) {
        for (i, slot) in self.slots.iter_mut().enumerate() {
            if let Some(relay) = slot {
                if let Err(e) = relay.set(false) {
                    error!("relay: channel {} release failed: {}", i, e);
                }
            }
        }
    }
}

// ─── ESP-IDF construction ─────────────────────────────────────

#[cfg(target_os = "espidf")]
pub fn bank_from_config(cfg: &NodeConfig) -> RelayBank {
    use esp_idf_hal::gpio::{AnyOutputPin, PinDriver};

    let mut bank = RelayBank::empty();
    for (i, rc) in cfg.relays.iter().enumerate() {
        if !rc.enabled {
            continue;
        }
        // SAFETY: each relay GPIO is claimed by exactly one bank slot.
        let pin = unsafe { AnyOutputPin::new(i32::from(rc.gpio)) };
        match PinDriver::output(pin) {
            Ok(drv) => match GpioRelay::new(drv, rc.active_low) {
                Ok(relay) => bank.insert(i, Box::new(relay)),
                Err(e) => warn!("relay: channel {} init failed: {}", i, e),
            },
            Err(e) => warn!("relay: channel {} gpio claim failed: {:?}", i, e),
        }
    }
    bank
}

#[cfg(not(target_os = "espidf"))]
pub fn bank_from_config(cfg: &NodeConfig) -> RelayBank {
    let mut bank = RelayBank::empty();
    for (i, rc) in cfg.relays.iter().enumerate() {
        if !rc.enabled {
            continue;
        }
        match GpioRelay::new(sim::SimPin::default(), rc.active_low) {
            Ok(relay) => bank.insert(i, Box::new(relay)),
            Err(e) => warn!("relay: channel {} init failed: {}", i, e),
        }
    }
    bank
}

// ─── Simulation pin ───────────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub mod sim {
    use std::sync::{Arc, Mutex};

    /// Recording `embedded-hal` pin for host tests.
    #[derive(Default, Clone)]
    pub struct SimPin {
        pub level: Arc<Mutex<bool>>,
    }

    impl embedded_hal::digital::ErrorType for SimPin {
        type Error = core::convert::Infallible;
    }

    impl embedded_hal::digital::OutputPin for SimPin {
        fn set_low(&mut self) -> Result<(), Self::Error> {
            *self.level.lock().unwrap() = false;
            Ok(())
        }

        fn set_high(&mut self) -> Result<(), Self::Error> {
            *self.level.lock().unwrap() = true;
            Ok(())
        }
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::sim::SimPin;
    use super::*;

    #[test]
    fn active_low_polarity() {
        let pin = SimPin::default();
        let level = pin.level.clone();
        let mut relay = GpioRelay::new(pin, true).unwrap();
        assert!(*level.lock().unwrap()); // released = high
        relay.set(true).unwrap();
        assert!(!*level.lock().unwrap()); // energised = low
        assert!(relay.is_on());
    }

    #[test]
    fn active_high_polarity() {
        let pin = SimPin::default();
        let level = pin.level.clone();
        let mut relay = GpioRelay::new(pin, false).unwrap();
        assert!(!*level.lock().unwrap());
        relay.set(true).unwrap();
        assert!(*level.lock().unwrap());
    }

    #[test]
    fn bank_rejects_missing_channel() {
        let mut bank = RelayBank::empty();
        assert!(bank.set(0, true).is_err());
        assert!(!bank.is_on(0));
    }

    #[test]
    fn bank_all_off_releases_everything() {
        let mut bank = RelayBank::empty();
        let p0 = SimPin::default();
        let p1 = SimPin::default();
        bank.insert(0, Box::new(GpioRelay::new(p0, true).unwrap()));
        bank.insert(1, Box::new(GpioRelay::new(p1, true).unwrap()));
        bank.set(0, true).unwrap();
        bank.set(1, true).unwrap();
        bank.all_off();
        assert!(!bank.is_on(0));
        assert!(!bank.is_on(1));
    }
}

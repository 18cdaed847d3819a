//! WS2812 strip driver.
//!
//! On device the strip is driven over RMT: each refresh encodes the
//! staged GRB buffer into a pulse train and transmits it blocking, which
//! is why the refresh task owns these outputs and no engine lock is held
//! across a call. The simulation backend records the last transmitted
//! frame for inspection.

use crate::error::DriverError;
use crate::ports::{StripFactory, StripOutput};

// ─── ESP-IDF backend ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp_impl::Esp32StripFactory;

#[cfg(target_os = "espidf")]
mod esp_impl {
    use std::time::Duration;

    use esp_idf_hal::gpio::AnyOutputPin;
    use esp_idf_hal::rmt::config::TransmitConfig;
    use esp_idf_hal::rmt::{PinState, Pulse, TxRmtDriver, VariableLengthSignal, CHANNEL0, CHANNEL1};
    use log::info;

    use super::*;

    // WS2812 bit timing (ns), within datasheet tolerance.
    const T0H_NS: u64 = 350;
    const T0L_NS: u64 = 800;
    const T1H_NS: u64 = 700;
    const T1L_NS: u64 = 600;

    struct Esp32Strip {
        tx: TxRmtDriver<'static>,
        buf: Vec<(u8, u8, u8)>,
        t0: (Pulse, Pulse),
        t1: (Pulse, Pulse),
    }

    impl StripOutput for Esp32Strip {
        fn set_pixel(&mut self, index: usize, r: u8, g: u8, b: u8) {
            if let Some(px) = self.buf.get_mut(index) {
                *px = (r, g, b);
            }
        }

        fn refresh(&mut self) -> Result<(), DriverError> {
            let mut signal = VariableLengthSignal::new();
            for &(r, g, b) in &self.buf {
                // WS2812 wire order is GRB, MSB first.
                for byte in [g, r, b] {
                    for bit in (0..8).rev() {
                        let pulses = if byte >> bit & 1 == 1 { &self.t1 } else { &self.t0 };
                        signal
                            .push([&pulses.0, &pulses.1])
                            .map_err(|_| DriverError::RefreshFailed)?;
                    }
                }
            }
            self.tx
                .start_blocking(&signal)
                .map_err(|_| DriverError::RefreshFailed)
        }

        fn clear(&mut self) {
            self.buf.fill((0, 0, 0));
        }

        fn len(&self) -> usize {
            self.buf.len()
        }
    }

    /// Allocates RMT channels in order; the ESP32 has enough for both
    /// supported strips.
    pub struct Esp32StripFactory {
        next_channel: u8,
    }

    impl Esp32StripFactory {
        pub fn new() -> Self {
            Self { next_channel: 0 }
        }
    }

    impl Default for Esp32StripFactory {
        fn default() -> Self {
            Self::new()
        }
    }

    impl StripFactory for Esp32StripFactory {
        fn open(&mut self, gpio: u8, pixels: u16) -> Result<Box<dyn StripOutput>, DriverError> {
            let config = TransmitConfig::new().clock_divider(1);
            // SAFETY: each RMT channel and data GPIO is handed to exactly
            // one strip; the factory allocates channels monotonically and
            // config validation rejects duplicate pins.
            let pin = unsafe { AnyOutputPin::new(i32::from(gpio)) };
            let tx = match self.next_channel {
                0 => TxRmtDriver::new(unsafe { CHANNEL0::new() }, pin, &config),
                1 => TxRmtDriver::new(unsafe { CHANNEL1::new() }, pin, &config),
                _ => return Err(DriverError::StripInitFailed),
            }
            .map_err(|_| DriverError::StripInitFailed)?;
            self.next_channel += 1;

            let ticks_hz = tx.counter_clock().map_err(|_| DriverError::StripInitFailed)?;
            let pulse = |state, ns| {
                Pulse::new_with_duration(ticks_hz, state, &Duration::from_nanos(ns))
                    .map_err(|_| DriverError::StripInitFailed)
            };
            let t0 = (pulse(PinState::High, T0H_NS)?, pulse(PinState::Low, T0L_NS)?);
            let t1 = (pulse(PinState::High, T1H_NS)?, pulse(PinState::Low, T1L_NS)?);

            info!("strip: RMT channel {} on gpio {}", self.next_channel - 1, gpio);
            Ok(Box::new(Esp32Strip {
                tx,
                buf: vec![(0, 0, 0); usize::from(pixels)],
                t0,
                t1,
            }))
        }
    }
}

// ─── Simulation backend ───────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub use sim_impl::{SimStrip, SimStripFactory};

#[cfg(not(target_os = "espidf"))]
mod sim_impl {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Host stand-in that records the last refreshed frame.
    pub struct SimStrip {
        staged: Vec<(u8, u8, u8)>,
        shown: Arc<Mutex<Vec<(u8, u8, u8)>>>,
    }

    impl SimStrip {
        pub fn new(pixels: u16) -> (Self, Arc<Mutex<Vec<(u8, u8, u8)>>>) {
            let shown = Arc::new(Mutex::new(vec![(0, 0, 0); usize::from(pixels)]));
            (
                Self {
                    staged: vec![(0, 0, 0); usize::from(pixels)],
                    shown: Arc::clone(&shown),
                },
                shown,
            )
        }
    }

    impl StripOutput for SimStrip {
        fn set_pixel(&mut self, index: usize, r: u8, g: u8, b: u8) {
            if let Some(px) = self.staged.get_mut(index) {
                *px = (r, g, b);
            }
        }

        fn refresh(&mut self) -> Result<(), DriverError> {
            self.shown.lock().unwrap().copy_from_slice(&self.staged);
            Ok(())
        }

        fn clear(&mut self) {
            self.staged.fill((0, 0, 0));
        }

        fn len(&self) -> usize {
            self.staged.len()
        }
    }

    /// Factory handing out [`SimStrip`]s and keeping the observation side
    /// of each one.
    pub struct SimStripFactory {
        pub opened: Vec<(u8, Arc<Mutex<Vec<(u8, u8, u8)>>>)>,
        /// GPIOs that should fail to open, for fault-injection tests.
        pub fail_gpios: Vec<u8>,
    }

    impl SimStripFactory {
        pub fn new() -> Self {
            Self {
                opened: Vec::new(),
                fail_gpios: Vec::new(),
            }
        }
    }

    impl Default for SimStripFactory {
        fn default() -> Self {
            Self::new()
        }
    }

    impl StripFactory for SimStripFactory {
        fn open(&mut self, gpio: u8, pixels: u16) -> Result<Box<dyn StripOutput>, DriverError> {
            if self.fail_gpios.contains(&gpio) {
                return Err(DriverError::StripInitFailed);
            }
            let (strip, shown) = SimStrip::new(pixels);
            self.opened.push((gpio, shown));
            Ok(Box::new(strip))
        }
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn sim_strip_shows_only_after_refresh() {
        let (mut strip, shown) = SimStrip::new(3);
        strip.set_pixel(1, 10, 20, 30);
        assert_eq!(shown.lock().unwrap()[1], (0, 0, 0));
        strip.refresh().unwrap();
        assert_eq!(shown.lock().unwrap()[1], (10, 20, 30));
    }

    #[test]
    fn out_of_range_pixel_ignored() {
        let (mut strip, _) = SimStrip::new(2);
        strip.set_pixel(5, 1, 2, 3);
        strip.refresh().unwrap();
        assert_eq!(strip.len(), 2);
    }

    #[test]
    fn factory_fault_injection() {
        let mut f = SimStripFactory::new();
        f.fail_gpios.push(16);
        assert!(f.open(16, 10).is_err());
        assert!(f.open(17, 10).is_ok());
        assert_eq!(f.opened.len(), 1);
    }
}

//! LEDC PWM channel driver (12-bit duty).
//!
//! One shared LEDC timer at the configured carrier frequency; channels
//! are allocated in order across the rgb and white engines (the ESP32
//! has eight, enough for one rgb strip plus four white channels, or any
//! smaller mix). The simulation backend records duty writes.

use crate::error::DriverError;
use crate::ports::{PwmFactory, PwmOutput};

pub const DUTY_MAX: u16 = 4095;

// ─── ESP-IDF backend ──────────────────────────────────────────

#[cfg(target_os = "espidf")]
pub use esp_impl::Esp32PwmFactory;

#[cfg(target_os = "espidf")]
mod esp_impl {
    use std::sync::Arc;

    use esp_idf_hal::gpio::AnyOutputPin;
    use esp_idf_hal::ledc::config::TimerConfig;
    use esp_idf_hal::ledc::{
        LedcDriver, LedcTimerDriver, Resolution, CHANNEL0, CHANNEL1, CHANNEL2, CHANNEL3, CHANNEL4,
        CHANNEL5, CHANNEL6, CHANNEL7, TIMER0,
    };
    use esp_idf_hal::prelude::*;
    use log::info;

    use super::*;

    struct Esp32Pwm {
        drv: LedcDriver<'static>,
    }

    impl PwmOutput for Esp32Pwm {
        fn set_duty(&mut self, duty: u16) -> Result<(), DriverError> {
            let duty = duty.min(DUTY_MAX);
            self.drv
                .set_duty(u32::from(duty))
                .map_err(|_| DriverError::PwmWriteFailed)
        }

        fn pull_low(&mut self) {
            let _ = self.drv.set_duty(0);
        }
    }

    pub struct Esp32PwmFactory {
        timer: Arc<LedcTimerDriver<'static>>,
        next_channel: u8,
    }

    impl Esp32PwmFactory {
        pub fn new(freq_hz: u32) -> Result<Self, DriverError> {
            let config = TimerConfig::default()
                .frequency(freq_hz.Hz())
                .resolution(Resolution::Bits12);
            // SAFETY: the factory is the only owner of TIMER0 and of the
            // LEDC channels it allocates below.
            let timer = LedcTimerDriver::new(unsafe { TIMER0::new() }, &config)
                .map_err(|_| DriverError::PwmInitFailed)?;
            Ok(Self {
                timer: Arc::new(timer),
                next_channel: 0,
            })
        }
    }

    impl PwmFactory for Esp32PwmFactory {
        fn open(&mut self, gpio: u8) -> Result<Box<dyn PwmOutput>, DriverError> {
            // SAFETY: see `new` — one channel and one pin per output.
            let pin = unsafe { AnyOutputPin::new(i32::from(gpio)) };
            let drv = match self.next_channel {
                0 => LedcDriver::new(unsafe { CHANNEL0::new() }, &*self.timer, pin),
                1 => LedcDriver::new(unsafe { CHANNEL1::new() }, &*self.timer, pin),
                2 => LedcDriver::new(unsafe { CHANNEL2::new() }, &*self.timer, pin),
                3 => LedcDriver::new(unsafe { CHANNEL3::new() }, &*self.timer, pin),
                4 => LedcDriver::new(unsafe { CHANNEL4::new() }, &*self.timer, pin),
                5 => LedcDriver::new(unsafe { CHANNEL5::new() }, &*self.timer, pin),
                6 => LedcDriver::new(unsafe { CHANNEL6::new() }, &*self.timer, pin),
                7 => LedcDriver::new(unsafe { CHANNEL7::new() }, &*self.timer, pin),
                _ => return Err(DriverError::PwmInitFailed),
            }
            .map_err(|_| DriverError::PwmInitFailed)?;
            info!("ledc: channel {} on gpio {}", self.next_channel, gpio);
            self.next_channel += 1;
            Ok(Box::new(Esp32Pwm { drv }))
        }
    }
}

// ─── Simulation backend ───────────────────────────────────────

#[cfg(not(target_os = "espidf"))]
pub use sim_impl::{SimPwm, SimPwmFactory};

#[cfg(not(target_os = "espidf"))]
mod sim_impl {
    use std::sync::{Arc, Mutex};

    use super::*;

    /// Host stand-in that exposes the last written duty.
    pub struct SimPwm {
        duty: Arc<Mutex<u16>>,
    }

    impl PwmOutput for SimPwm {
        fn set_duty(&mut self, duty: u16) -> Result<(), DriverError> {
            *self.duty.lock().unwrap() = duty.min(DUTY_MAX);
            Ok(())
        }

        fn pull_low(&mut self) {
            *self.duty.lock().unwrap() = 0;
        }
    }

    pub struct SimPwmFactory {
        pub opened: Vec<(u8, Arc<Mutex<u16>>)>,
        /// GPIOs that should fail to open, for fault-injection tests.
        pub fail_gpios: Vec<u8>,
    }

    impl SimPwmFactory {
        pub fn new() -> Self {
            Self {
                opened: Vec::new(),
                fail_gpios: Vec::new(),
            }
        }

        /// Last duty written to the n-th opened output.
        pub fn duty(&self, n: usize) -> u16 {
            *self.opened[n].1.lock().unwrap()
        }
    }

    impl Default for SimPwmFactory {
        fn default() -> Self {
            Self::new()
        }
    }

    impl PwmFactory for SimPwmFactory {
        fn open(&mut self, gpio: u8) -> Result<Box<dyn PwmOutput>, DriverError> {
            if self.fail_gpios.contains(&gpio) {
                return Err(DriverError::PwmInitFailed);
            }
            let duty = Arc::new(Mutex::new(0));
            self.opened.push((gpio, Arc::clone(&duty)));
            Ok(Box::new(SimPwm { duty }))
        }
    }
}

#[cfg(all(test, not(target_os = "espidf")))]
mod tests {
    use super::*;

    #[test]
    fn duty_clamped_to_12_bits() {
        let mut f = SimPwmFactory::new();
        let mut o = f.open(19).unwrap();
        o.set_duty(60_000).unwrap();
        assert_eq!(f.duty(0), DUTY_MAX);
    }

    #[test]
    fn pull_low_zeroes_duty() {
        let mut f = SimPwmFactory::new();
        let mut o = f.open(19).unwrap();
        o.set_duty(1234).unwrap();
        o.pull_low();
        assert_eq!(f.duty(0), 0);
    }
}

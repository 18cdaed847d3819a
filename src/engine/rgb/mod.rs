//! RGB PWM strip engine.
//!
//! Up to four analog RGB strips on LEDC, smoothed at 200 Hz. One task per
//! engine computes the current colour per channel under the lock, then
//! writes duty cycles outside it. The task exclusively owns the PWM
//! outputs and returns them through its join handle at stop, after
//! pulling every line low.
//!
//! Opening a strip is all-or-nothing per channel: if the green line fails
//! after red opened, red is pulled low again and the channel disabled;
//! other channels are unaffected.

pub mod effects;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, info, warn};

use crate::config::{NodeConfig, RGB_MAX_STRIPS};
use crate::drivers::task_pin::{spawn_on_core, Core};
use crate::engine::clock::FrameClock;
use crate::engine::gamma;
use crate::engine::{Rgb, MAX_PARAMS};
use crate::error::{EngineError, Result};
use crate::ports::{PwmFactory, PwmOutput};

use effects::{rgb_effects, rgb_lookup};

// ─── Channel state ────────────────────────────────────────────

pub struct RgbChannel {
    pub(crate) enabled: bool,
    pub(crate) effect: usize,
    pub(crate) brightness: u8,
    pub(crate) frame_pos: u32,
    pub(crate) color: Rgb,
    pub(crate) params: [i64; MAX_PARAMS],
    pub(crate) tick_ms: u32,
    /// Linear colour computed by the last render.
    pub(crate) out: Rgb,
}

impl RgbChannel {
    fn idle() -> Self {
        Self {
            enabled: false,
            effect: 0,
            brightness: 255,
            frame_pos: 0,
            color: Rgb::new(255, 255, 255),
            params: [0; MAX_PARAMS],
            tick_ms: 5,
            out: Rgb::BLACK,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RgbStatus {
    pub enabled: bool,
    pub effect: heapless::String<16>,
    pub brightness: u8,
    pub color: Rgb,
    pub smooth_hz: u32,
}

struct Shared {
    channels: Mutex<[RgbChannel; RGB_MAX_STRIPS]>,
    shutdown: AtomicBool,
}

type StripOutputs = (usize, [Box<dyn PwmOutput>; 3]);

// ─── Engine ───────────────────────────────────────────────────

pub struct RgbEngine {
    shared: Arc<Shared>,
    task: Option<std::thread::JoinHandle<Vec<StripOutputs>>>,
    smooth_hz: u32,
}

impl RgbEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                channels: Mutex::new(core::array::from_fn(|_| RgbChannel::idle())),
                shutdown: AtomicBool::new(false),
            }),
            task: None,
            smooth_hz: 200,
        }
    }

    pub fn running(&self) -> bool {
        self.task.is_some()
    }

    pub fn start(&mut self, cfg: &NodeConfig, factory: &mut dyn PwmFactory) -> Result<()> {
        if self.running() {
            return Ok(());
        }
        self.smooth_hz = cfg.pwm_smooth_hz;
        let tick_ms = cfg.pwm_tick_ms();

        let mut outputs: Vec<StripOutputs> = Vec::new();
        {
            let mut channels = self.shared.channels.lock().unwrap();
            for (i, sc) in cfg.rgb_strips.iter().enumerate() {
                let ch = &mut channels[i];
                *ch = RgbChannel::idle();
                ch.tick_ms = tick_ms;
                if !sc.enabled {
                    continue;
                }
                match open_strip(factory, sc.gpio_r, sc.gpio_g, sc.gpio_b) {
                    Ok(outs) => {
                        ch.enabled = true;
                        outputs.push((i, outs));
                        info!("rgb: strip {} up on gpio {}/{}/{}", i, sc.gpio_r, sc.gpio_g, sc.gpio_b);
                    }
                    Err(e) => {
                        error!("rgb: strip {} failed to open: {}, disabling", i, e);
                    }
                }
            }
        }

        if outputs.is_empty() {
            warn!("rgb: no strips available, engine idle");
            return Ok(());
        }

        self.shared.shutdown.store(false, Ordering::Relaxed);

        // Hand the outputs over through a slot so a failed spawn can take
        // them back and pull every line low.
        let handoff = Arc::new(Mutex::new(Some(outputs)));
        let shared = Arc::clone(&self.shared);
        let taken = Arc::clone(&handoff);
        match spawn_on_core(Core::App, 4, 4, "rgb_smooth\0", move || {
            let Some(outputs) = taken.lock().unwrap().take() else {
                return Vec::new();
            };
            smooth_loop(&shared, outputs, tick_ms)
        }) {
            Ok(h) => {
                self.task = Some(h);
                info!("rgb: engine started at {} Hz", self.smooth_hz);
                Ok(())
            }
            Err(_) => {
                if let Some(mut outputs) = handoff.lock().unwrap().take() {
                    for (_, outs) in &mut outputs {
                        for o in outs.iter_mut() {
                            o.pull_low();
                        }
                    }
                }
                Err(EngineError::TaskSpawnFailed.into())
            }
        }
    }

    pub fn stop(&mut self) {
        let Some(task) = self.task.take() else {
            return;
        };
        self.shared.shutdown.store(true, Ordering::Relaxed);
        // Outputs come back already pulled low.
        let _ = task.join();
        let mut channels = self.shared.channels.lock().unwrap();
        for ch in channels.iter_mut() {
            ch.enabled = false;
        }
        info!("rgb: engine stopped");
    }

    // ── Control API ──

    pub fn set_effect(&self, strip: usize, name: &str) -> Result<()> {
        let idx = rgb_lookup(name).ok_or(EngineError::UnknownEffect)?;
        let mut channels = self.shared.channels.lock().unwrap();
        let ch = channel_mut(&mut channels, strip)?;
        ch.effect = idx;
        ch.frame_pos = 0;
        (rgb_effects()[idx].init)(ch);
        Ok(())
    }

    pub fn set_brightness(&self, strip: usize, brightness: u8) -> Result<()> {
        let mut channels = self.shared.channels.lock().unwrap();
        channel_mut(&mut channels, strip)?.brightness = brightness;
        Ok(())
    }

    pub fn set_color(&self, strip: usize, color: Rgb) -> Result<()> {
        let mut channels = self.shared.channels.lock().unwrap();
        channel_mut(&mut channels, strip)?.color = color;
        Ok(())
    }

    pub fn apply_params(&self, strip: usize, params: &[i64]) -> Result<()> {
        let mut channels = self.shared.channels.lock().unwrap();
        let ch = channel_mut(&mut channels, strip)?;
        (rgb_effects()[ch.effect].apply_params)(ch, params);
        Ok(())
    }

    /// Snapshot one channel. Fails for a disabled or out-of-range index,
    /// same as the mutators.
    pub fn status(&self, strip: usize) -> Result<RgbStatus> {
        let channels = self.shared.channels.lock().unwrap();
        let ch = channels
            .get(strip)
            .filter(|ch| ch.enabled)
            .ok_or(EngineError::ChannelDisabled)?;
        let mut effect = heapless::String::new();
        let _ = effect.push_str(rgb_effects()[ch.effect].name);
        Ok(RgbStatus {
            enabled: ch.enabled,
            effect,
            brightness: ch.brightness,
            color: ch.color,
            smooth_hz: self.smooth_hz,
        })
    }
}

impl Default for RgbEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for RgbEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn channel_mut<'a>(
    channels: &'a mut [RgbChannel; RGB_MAX_STRIPS],
    strip: usize,
) -> core::result::Result<&'a mut RgbChannel, EngineError> {
    channels
        .get_mut(strip)
        .filter(|ch| ch.enabled)
        .ok_or(EngineError::ChannelDisabled)
}

/// Open the three lines of one strip, unwinding on partial failure.
fn open_strip(
    factory: &mut dyn PwmFactory,
    gpio_r: u8,
    gpio_g: u8,
    gpio_b: u8,
) -> core::result::Result<[Box<dyn PwmOutput>; 3], crate::error::DriverError> {
    let mut r = factory.open(gpio_r)?;
    let mut g = match factory.open(gpio_g) {
        Ok(g) => g,
        Err(e) => {
            r.pull_low();
            return Err(e);
        }
    };
    match factory.open(gpio_b) {
        Ok(b) => Ok([r, g, b]),
        Err(e) => {
            r.pull_low();
            g.pull_low();
            Err(e)
        }
    }
}

// ─── Task body ────────────────────────────────────────────────

fn smooth_loop(
    shared: &Shared,
    mut outputs: Vec<StripOutputs>,
    tick_ms: u32,
) -> Vec<StripOutputs> {
    let mut clock = FrameClock::from_millis(tick_ms);
    let mut duties: Vec<[u16; 3]> = vec![[0; 3]; outputs.len()];

    while !shared.shutdown.load(Ordering::Relaxed) {
        clock.wait();
        {
            let mut channels = shared.channels.lock().unwrap();
            for (slot, (idx, _)) in outputs.iter().enumerate() {
                let ch = &mut channels[*idx];
                if !ch.enabled {
                    continue;
                }
                (rgb_effects()[ch.effect].render)(ch);
                duties[slot] = [
                    gamma::duty12(gamma::correct(ch.out.r, ch.brightness)),
                    gamma::duty12(gamma::correct(ch.out.g, ch.brightness)),
                    gamma::duty12(gamma::correct(ch.out.b, ch.brightness)),
                ];
            }
        }
        for (slot, (idx, outs)) in outputs.iter_mut().enumerate() {
            for (line, o) in outs.iter_mut().enumerate() {
                if let Err(e) = o.set_duty(duties[slot][line]) {
                    error!("rgb: strip {} line {} write failed: {}", idx, line, e);
                }
            }
        }
    }

    for (_, outs) in &mut outputs {
        for o in outs.iter_mut() {
            o.pull_low();
        }
    }
    outputs
}

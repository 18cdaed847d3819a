//! White-channel PWM engine.
//!
//! Up to four single-line white outputs on LEDC, smoothed at 200 Hz.
//! Same task shape as the rgb engine: one smoothing task owns the PWM
//! outputs, renders levels under the channel lock, writes duties outside
//! it, and pulls every line low on the way out.

pub mod effects;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use log::{error, info, warn};

use crate::config::{NodeConfig, WHITE_MAX_CHANNELS};
use crate::drivers::task_pin::{spawn_on_core, Core};
use crate::engine::clock::FrameClock;
use crate::engine::gamma;
use crate::engine::MAX_PARAMS;
use crate::error::{EngineError, Result};
use crate::ports::{PwmFactory, PwmOutput};

use effects::{white_effects, white_lookup};

// ─── Channel state ────────────────────────────────────────────

pub struct WhiteChannel {
    pub(crate) enabled: bool,
    pub(crate) effect: usize,
    pub(crate) brightness: u8,
    pub(crate) frame_pos: u32,
    pub(crate) params: [i64; MAX_PARAMS],
    pub(crate) tick_ms: u32,
    /// Linear level computed by the last render.
    pub(crate) level: u8,
    /// Level captured when a fade-out effect starts.
    pub(crate) start_level: u8,
}

impl WhiteChannel {
    fn idle() -> Self {
        Self {
            enabled: false,
            effect: 0,
            brightness: 255,
            frame_pos: 0,
            params: [0; MAX_PARAMS],
            tick_ms: 5,
            level: 0,
            start_level: 0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhiteStatus {
    pub enabled: bool,
    pub effect: heapless::String<16>,
    pub brightness: u8,
    pub smooth_hz: u32,
}

struct Shared {
    channels: Mutex<[WhiteChannel; WHITE_MAX_CHANNELS]>,
    shutdown: AtomicBool,
}

type ChannelOutput = (usize, Box<dyn PwmOutput>);

// ─── Engine ───────────────────────────────────────────────────

pub struct WhiteEngine {
    shared: Arc<Shared>,
    task: Option<std::thread::JoinHandle<Vec<ChannelOutput>>>,
    smooth_hz: u32,
}

impl WhiteEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                channels: Mutex::new(core::array::from_fn(|_| WhiteChannel::idle())),
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

        let mut outputs: Vec<ChannelOutput> = Vec::new();
        {
            let mut channels = self.shared.channels.lock().unwrap();
            for (i, cc) in cfg.white_channels.iter().enumerate() {
                let ch = &mut channels[i];
                *ch = WhiteChannel::idle();
                ch.tick_ms = tick_ms;
                if !cc.enabled {
                    continue;
                }
                match factory.open(cc.gpio) {
                    Ok(out) => {
                        ch.enabled = true;
                        outputs.push((i, out));
                        info!("white: channel {} up on gpio {}", i, cc.gpio);
                    }
                    Err(e) => {
                        error!("white: channel {} failed to open: {}, disabling", i, e);
                    }
                }
            }
        }

        if outputs.is_empty() {
            warn!("white: no channels available, engine idle");
            return Ok(());
        }

        self.shared.shutdown.store(false, Ordering::Relaxed);

        let handoff = Arc::new(Mutex::new(Some(outputs)));
        let shared = Arc::clone(&self.shared);
        let taken = Arc::clone(&handoff);
        match spawn_on_core(Core::App, 4, 4, "white_smooth\0", move || {
            let Some(outputs) = taken.lock().unwrap().take() else {
                return Vec::new();
            };
            smooth_loop(&shared, outputs, tick_ms)
        }) {
            Ok(h) => {
                self.task = Some(h);
                info!("white: engine started at {} Hz", self.smooth_hz);
                Ok(())
            }
            Err(_) => {
                if let Some(mut outputs) = handoff.lock().unwrap().take() {
                    for (_, o) in &mut outputs {
                        o.pull_low();
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
        let _ = task.join();
        let mut channels = self.shared.channels.lock().unwrap();
        for ch in channels.iter_mut() {
            ch.enabled = false;
        }
        info!("white: engine stopped");
    }

    // ── Control API ──

    pub fn set_effect(&self, channel: usize, name: &str) -> Result<()> {
        let idx = white_lookup(name).ok_or(EngineError::UnknownEffect)?;
        let mut channels = self.shared.channels.lock().unwrap();
        let ch = channel_mut(&mut channels, channel)?;
        ch.effect = idx;
        ch.frame_pos = 0;
        (white_effects()[idx].init)(ch);
        Ok(())
    }

    pub fn set_brightness(&self, channel: usize, brightness: u8) -> Result<()> {
        let mut channels = self.shared.channels.lock().unwrap();
        channel_mut(&mut channels, channel)?.brightness = brightness;
        Ok(())
    }

    pub fn apply_params(&self, channel: usize, params: &[i64]) -> Result<()> {
        let mut channels = self.shared.channels.lock().unwrap();
        let ch = channel_mut(&mut channels, channel)?;
        (white_effects()[ch.effect].apply_params)(ch, params);
        Ok(())
    }

    /// Snapshot one channel. Fails for a disabled or out-of-range index,
    /// same as the mutators.
    pub fn status(&self, channel: usize) -> Result<WhiteStatus> {
        let channels = self.shared.channels.lock().unwrap();
        let ch = channels
            .get(channel)
            .filter(|ch| ch.enabled)
            .ok_or(EngineError::ChannelDisabled)?;
        let mut effect = heapless::String::new();
        let _ = effect.push_str(white_effects()[ch.effect].name);
        Ok(WhiteStatus {
            enabled: ch.enabled,
            effect,
            brightness: ch.brightness,
            smooth_hz: self.smooth_hz,
        })
    }
}

impl Default for WhiteEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WhiteEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn channel_mut<'a>(
    channels: &'a mut [WhiteChannel; WHITE_MAX_CHANNELS],
    channel: usize,
) -> core::result::Result<&'a mut WhiteChannel, EngineError> {
    channels
        .get_mut(channel)
        .filter(|ch| ch.enabled)
        .ok_or(EngineError::ChannelDisabled)
}

// ─── Task body ────────────────────────────────────────────────

fn smooth_loop(
    shared: &Shared,
    mut outputs: Vec<ChannelOutput>,
    tick_ms: u32,
) -> Vec<ChannelOutput> {
    let mut clock = FrameClock::from_millis(tick_ms);
    let mut duties: Vec<u16> = vec![0; outputs.len()];

    while !shared.shutdown.load(Ordering::Relaxed) {
        clock.wait();
        {
            let mut channels = shared.channels.lock().unwrap();
            for (slot, (idx, _)) in outputs.iter().enumerate() {
                let ch = &mut channels[*idx];
                if !ch.enabled {
                    continue;
                }
                (white_effects()[ch.effect].render)(ch);
                duties[slot] = gamma::duty12(gamma::correct(ch.level, ch.brightness));
            }
        }
        for (slot, (idx, o)) in outputs.iter_mut().enumerate() {
            if let Err(e) = o.set_duty(duties[slot]) {
                error!("white: channel {} write failed: {}", idx, e);
            }
        }
    }

    for (_, o) in &mut outputs {
        o.pull_low();
    }
    outputs
}

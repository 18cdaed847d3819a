//! Addressable (WS2812) strip engine.
//!
//! Two cooperating tasks:
//!
//! - **render** (60 FPS, absolute-deadline paced): runs the active effect
//!   per channel under the channel lock, applies gamma then brightness,
//!   copies the result into the pending-frame slot and notifies the
//!   refresh signal. Signals coalesce, so at most one refresh is ever
//!   queued behind a slow transmission.
//! - **refresh** (higher priority): exclusively owns the strip outputs.
//!   Waits on the signal, snapshots dirty frames under a short lock, then
//!   transmits outside all locks. Returns the outputs through its join
//!   handle at stop so they can be blanked and dropped exactly once.
//!
//! Start and stop are idempotent. A strip that fails to open is logged
//! and its channel disabled; the remaining channels run normally.

pub mod effects;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use log::{error, info, warn};

use crate::config::{NodeConfig, WS_MAX_STRIPS};
use crate::drivers::task_pin::{spawn_on_core, Core};
use crate::engine::clock::FrameClock;
use crate::engine::gamma;
use crate::engine::sync::RefreshSignal;
use crate::engine::{Rgb, XorShift32, MAX_PARAMS};
use crate::error::{EngineError, Result};
use crate::ports::{StripFactory, StripOutput};

use effects::{ws_effects, ws_lookup};

// ─── Channel state ────────────────────────────────────────────

pub struct WsChannel {
    pub(crate) enabled: bool,
    pub(crate) pixels: usize,
    pub(crate) effect: usize,
    pub(crate) brightness: u8,
    pub(crate) frame_pos: u32,
    pub(crate) color: Rgb,
    pub(crate) params: [i64; MAX_PARAMS],
    pub(crate) tick_ms: u32,
    pub(crate) rng: XorShift32,
    /// Linear-colour staging frame, allocated once at engine start.
    pub(crate) frame: Vec<Rgb>,
    /// Per-pixel intensity scratch for sparkle-type effects.
    pub(crate) levels: Vec<u8>,
}

impl WsChannel {
    fn idle() -> Self {
        Self {
            enabled: false,
            pixels: 0,
            effect: 0,
            brightness: 255,
            frame_pos: 0,
            color: Rgb::new(255, 255, 255),
            params: [0; MAX_PARAMS],
            tick_ms: 16,
            rng: XorShift32::new(0x5eed),
            frame: Vec::new(),
            levels: Vec::new(),
        }
    }
}

/// Snapshot of one channel for status reporting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WsStatus {
    pub enabled: bool,
    pub effect: heapless::String<16>,
    pub brightness: u8,
    pub pixels: u16,
    pub color: Rgb,
    pub fps: u32,
}

// ─── Shared state between tasks ───────────────────────────────

struct PendingFrames {
    /// Output-ready (gamma + brightness applied) frames per channel.
    frames: [Vec<(u8, u8, u8)>; WS_MAX_STRIPS],
    dirty: [bool; WS_MAX_STRIPS],
}

struct Shared {
    channels: Mutex<[WsChannel; WS_MAX_STRIPS]>,
    pending: Mutex<PendingFrames>,
    signal: RefreshSignal,
    shutdown: AtomicBool,
}

// ─── Engine ───────────────────────────────────────────────────

pub struct WsEngine {
    shared: Arc<Shared>,
    render_task: Option<std::thread::JoinHandle<()>>,
    refresh_task: Option<std::thread::JoinHandle<Vec<(usize, Box<dyn StripOutput>)>>>,
    fps: u32,
}

impl WsEngine {
    pub fn new() -> Self {
        Self {
            shared: Arc::new(Shared {
                channels: Mutex::new(core::array::from_fn(|_| WsChannel::idle())),
                pending: Mutex::new(PendingFrames {
                    frames: core::array::from_fn(|_| Vec::new()),
                    dirty: [false; WS_MAX_STRIPS],
                }),
                signal: RefreshSignal::new(),
                shutdown: AtomicBool::new(false),
            }),
            render_task: None,
            refresh_task: None,
            fps: 60,
        }
    }

    pub fn running(&self) -> bool {
        self.render_task.is_some()
    }

    /// Open configured strips and spawn the render/refresh tasks.
    /// A no-op when already running.
    pub fn start(&mut self, cfg: &NodeConfig, factory: &mut dyn StripFactory) -> Result<()> {
        if self.running() {
            return Ok(());
        }
        self.fps = cfg.ws_fps;
        let tick_ms = cfg.ws_tick_ms();

        let mut strips: Vec<(usize, Box<dyn StripOutput>)> = Vec::new();
        {
            let mut channels = self.shared.channels.lock().unwrap();
            let mut pending = self.shared.pending.lock().unwrap();
            for (i, sc) in cfg.ws_strips.iter().enumerate() {
                let ch = &mut channels[i];
                *ch = WsChannel::idle();
                ch.tick_ms = tick_ms;
                if !sc.enabled || sc.pixels == 0 {
                    continue;
                }
                match factory.open(sc.gpio, sc.pixels) {
                    Ok(strip) => {
                        ch.enabled = true;
                        ch.pixels = sc.pixels as usize;
                        ch.frame = vec![Rgb::BLACK; ch.pixels];
                        ch.levels = vec![0; ch.pixels];
                        ch.rng = XorShift32::new(0x5eed ^ ((i as u32 + 1) << 8));
                        pending.frames[i] = vec![(0, 0, 0); ch.pixels];
                        pending.dirty[i] = false;
                        strips.push((i, strip));
                        info!("ws: strip {} up, gpio {}, {} px", i, sc.gpio, sc.pixels);
                    }
                    Err(e) => {
                        error!("ws: strip {} failed to open: {}, disabling", i, e);
                    }
                }
            }
        }

        if strips.is_empty() {
            warn!("ws: no strips available, engine idle");
            return Ok(());
        }

        self.shared.shutdown.store(false, Ordering::Relaxed);

        // Hand the strips over through a slot so a failed spawn can take
        // them back and blank them.
        let handoff = Arc::new(Mutex::new(Some(strips)));
        let shared = Arc::clone(&self.shared);
        let taken = Arc::clone(&handoff);
        let refresh = spawn_on_core(Core::App, 6, 4, "ws_refresh\0", move || {
            let Some(strips) = taken.lock().unwrap().take() else {
                return Vec::new();
            };
            refresh_loop(&shared, strips)
        });
        let refresh = match refresh {
            Ok(h) => h,
            Err(_) => {
                if let Some(mut strips) = handoff.lock().unwrap().take() {
                    for (_, strip) in &mut strips {
                        strip.clear();
                        let _ = strip.refresh();
                    }
                }
                return Err(EngineError::TaskSpawnFailed.into());
            }
        };

        let shared = Arc::clone(&self.shared);
        let render = spawn_on_core(Core::App, 5, 6, "ws_render\0", move || {
            render_loop(&shared, tick_ms);
        });
        let render = match render {
            Ok(h) => h,
            Err(_) => {
                // Unwind the refresh task so the strips are blanked.
                self.shared.shutdown.store(true, Ordering::Relaxed);
                self.shared.signal.notify();
                let _ = refresh.join();
                return Err(EngineError::TaskSpawnFailed.into());
            }
        };

        self.render_task = Some(render);
        self.refresh_task = Some(refresh);
        info!("ws: engine started at {} FPS", self.fps);
        Ok(())
    }

    /// Stop both tasks and blank the strips. A no-op when not running.
    pub fn stop(&mut self) {
        let Some(render) = self.render_task.take() else {
            return;
        };
        self.shared.shutdown.store(true, Ordering::Relaxed);
        let _ = render.join();
        self.shared.signal.notify();
        if let Some(refresh) = self.refresh_task.take() {
            // Strips come back already blanked; dropping releases the bus.
            let _ = refresh.join();
        }
        let mut channels = self.shared.channels.lock().unwrap();
        for ch in channels.iter_mut() {
            ch.enabled = false;
        }
        info!("ws: engine stopped");
    }

    // ── Control API (called from reconciliation) ──

    pub fn set_effect(&self, strip: usize, name: &str) -> Result<()> {
        let idx = ws_lookup(name).ok_or(EngineError::UnknownEffect)?;
        let mut channels = self.shared.channels.lock().unwrap();
        let ch = channel_mut(&mut channels, strip)?;
        ch.effect = idx;
        ch.frame_pos = 0;
        (ws_effects()[idx].init)(ch);
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
        (ws_effects()[ch.effect].apply_params)(ch, params);
        Ok(())
    }

    /// Snapshot one channel. Fails for a disabled or out-of-range index,
    /// same as the mutators.
    pub fn status(&self, strip: usize) -> Result<WsStatus> {
        let channels = self.shared.channels.lock().unwrap();
        let ch = channels
            .get(strip)
            .filter(|ch| ch.enabled)
            .ok_or(EngineError::ChannelDisabled)?;
        let mut effect = heapless::String::new();
        let _ = effect.push_str(ws_effects()[ch.effect].name);
        Ok(WsStatus {
            enabled: ch.enabled,
            effect,
            brightness: ch.brightness,
            pixels: ch.pixels as u16,
            color: ch.color,
            fps: self.fps,
        })
    }
}

impl Default for WsEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WsEngine {
    fn drop(&mut self) {
        self.stop();
    }
}

fn channel_mut<'a>(
    channels: &'a mut [WsChannel; WS_MAX_STRIPS],
    strip: usize,
) -> core::result::Result<&'a mut WsChannel, EngineError> {
    channels
        .get_mut(strip)
        .filter(|ch| ch.enabled)
        .ok_or(EngineError::ChannelDisabled)
}

// ─── Task bodies ──────────────────────────────────────────────

fn render_loop(shared: &Shared, tick_ms: u32) {
    let mut clock = FrameClock::from_millis(tick_ms);
    while !shared.shutdown.load(Ordering::Relaxed) {
        clock.wait();
        {
            let mut channels = shared.channels.lock().unwrap();
            let mut pending = shared.pending.lock().unwrap();
            for (i, ch) in channels.iter_mut().enumerate() {
                if !ch.enabled {
                    continue;
                }
                (ws_effects()[ch.effect].render)(ch);
                let out = &mut pending.frames[i];
                for (dst, src) in out.iter_mut().zip(ch.frame.iter()) {
                    *dst = (
                        gamma::correct(src.r, ch.brightness),
                        gamma::correct(src.g, ch.brightness),
                        gamma::correct(src.b, ch.brightness),
                    );
                }
                pending.dirty[i] = true;
            }
        }
        shared.signal.notify();
    }
}

fn refresh_loop(
    shared: &Shared,
    mut strips: Vec<(usize, Box<dyn StripOutput>)>,
) -> Vec<(usize, Box<dyn StripOutput>)> {
    // Scratch copies so transmission happens outside the pending lock.
    let mut scratch: Vec<Vec<(u8, u8, u8)>> =
        strips.iter().map(|(_, s)| vec![(0, 0, 0); s.len()]).collect();

    loop {
        let signalled = shared.signal.wait_timeout(Duration::from_millis(100));
        if signalled {
            for (slot, (idx, strip)) in strips.iter_mut().enumerate() {
                let fresh = {
                    let mut pending = shared.pending.lock().unwrap();
                    if pending.dirty[*idx] {
                        pending.dirty[*idx] = false;
                        scratch[slot].copy_from_slice(&pending.frames[*idx]);
                        true
                    } else {
                        false
                    }
                };
                if fresh {
                    for (px, &(r, g, b)) in scratch[slot].iter().enumerate() {
                        strip.set_pixel(px, r, g, b);
                    }
                    if let Err(e) = strip.refresh() {
                        error!("ws: strip {} refresh failed: {}", idx, e);
                    }
                }
            }
        }
        if shared.shutdown.load(Ordering::Relaxed) {
            break;
        }
    }

    for (_, strip) in &mut strips {
        strip.clear();
        let _ = strip.refresh();
    }
    strips
}

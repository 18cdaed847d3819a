//! WS2812 effect registry.
//!
//! Fixed set of effects; each entry bundles an `init` (reset per-channel
//! state and load default params), a per-frame `render` into the linear
//! staging frame, and an `apply_params` that clamps incoming values.
//! Renders advance `frame_pos` themselves.

use crate::engine::{store_params, Rgb, MAX_PARAMS};

use super::WsChannel;

pub struct WsEffect {
    pub name: &'static str,
    pub init: fn(&mut WsChannel),
    pub render: fn(&mut WsChannel),
    pub apply_params: fn(&mut WsChannel, &[i64]),
}

static WS_EFFECTS: [WsEffect; 8] = [
    WsEffect {
        name: "solid",
        init: |_| {},
        render: render_solid,
        apply_params: |_, _| {},
    },
    WsEffect {
        name: "breathe",
        init: init_breathe,
        render: render_breathe,
        apply_params: params_breathe,
    },
    WsEffect {
        name: "rainbow",
        init: init_rainbow,
        render: render_rainbow,
        apply_params: params_rainbow,
    },
    WsEffect {
        name: "twinkle",
        init: init_twinkle,
        render: render_twinkle,
        apply_params: params_twinkle,
    },
    WsEffect {
        name: "theater_chase",
        init: init_chase,
        render: render_chase,
        apply_params: params_chase,
    },
    WsEffect {
        name: "wipe",
        init: init_wipe,
        render: render_wipe,
        apply_params: params_wipe,
    },
    WsEffect {
        name: "gradient_scroll",
        init: |_| {},
        render: render_gradient_scroll,
        apply_params: |_, _| {},
    },
    WsEffect {
        name: "triple_wave",
        init: init_triple_wave,
        render: render_triple_wave,
        apply_params: params_triple_wave,
    },
];

pub fn ws_effects() -> &'static [WsEffect] {
    &WS_EFFECTS
}

/// Registry index for a name, `None` if unknown.
pub fn ws_lookup(name: &str) -> Option<usize> {
    WS_EFFECTS.iter().position(|e| e.name == name)
}

// ─── Shared helpers ───────────────────────────────────────────

/// Triangle wave, 0..=255 over `period` frames.
fn tri(phase: u32, period: u32) -> u8 {
    let period = period.max(2);
    let phase = phase % period;
    let half = period / 2;
    if phase < half {
        (255 * phase / half) as u8
    } else {
        (255 * (period - phase) / half).min(255) as u8
    }
}

/// Position on the RGB colour wheel (0..=255).
fn wheel(pos: u8) -> Rgb {
    match pos {
        0..=84 => Rgb::new(255 - pos * 3, pos * 3, 0),
        85..=169 => {
            let p = pos - 85;
            Rgb::new(0, 255 - p * 3, p * 3)
        }
        _ => {
            let p = pos - 170;
            Rgb::new(p * 3, 0, 255 - p * 3)
        }
    }
}

fn scale(c: Rgb, level: u8) -> Rgb {
    Rgb::new(
        ((u16::from(c.r) * u16::from(level)) / 255) as u8,
        ((u16::from(c.g) * u16::from(level)) / 255) as u8,
        ((u16::from(c.b) * u16::from(level)) / 255) as u8,
    )
}

fn clamp(v: i64, lo: i64, hi: i64) -> i64 {
    v.max(lo).min(hi)
}

// ─── solid ────────────────────────────────────────────────────

fn render_solid(ch: &mut WsChannel) {
    let c = ch.color;
    ch.frame.fill(c);
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

// ─── breathe: params[0] = period ms ──────────────────────────

fn init_breathe(ch: &mut WsChannel) {
    ch.params[0] = 4000;
}

fn params_breathe(ch: &mut WsChannel, params: &[i64]) {
    store_params(&mut ch.params, params);
    ch.params[0] = clamp(ch.params[0], 200, 60_000);
}

fn render_breathe(ch: &mut WsChannel) {
    let period_frames = (ch.params[0] as u32 / ch.tick_ms.max(1)).max(2);
    let level = tri(ch.frame_pos, period_frames);
    let c = scale(ch.color, level);
    ch.frame.fill(c);
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

// ─── rainbow: params[0] = hue step per frame ─────────────────

fn init_rainbow(ch: &mut WsChannel) {
    ch.params[0] = 1;
}

fn params_rainbow(ch: &mut WsChannel, params: &[i64]) {
    store_params(&mut ch.params, params);
    ch.params[0] = clamp(ch.params[0], 1, 32);
}

fn render_rainbow(ch: &mut WsChannel) {
    let step = ch.params[0] as u32;
    let base = ch.frame_pos.wrapping_mul(step);
    let len = ch.frame.len().max(1);
    for (i, px) in ch.frame.iter_mut().enumerate() {
        let pos = ((i * 256 / len) as u32 + base) & 0xFF;
        *px = wheel(pos as u8);
    }
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

// ─── twinkle: params[0] = density, params[1] = fade ──────────

fn init_twinkle(ch: &mut WsChannel) {
    ch.params[0] = 4;
    ch.params[1] = 16;
    ch.levels.fill(0);
}

fn params_twinkle(ch: &mut WsChannel, params: &[i64]) {
    store_params(&mut ch.params, params);
    ch.params[0] = clamp(ch.params[0], 1, 32);
    ch.params[1] = clamp(ch.params[1], 1, 128);
}

fn render_twinkle(ch: &mut WsChannel) {
    let fade = ch.params[1] as u8;
    for lvl in ch.levels.iter_mut() {
        *lvl = lvl.saturating_sub(fade);
    }
    let len = ch.levels.len();
    if len > 0 {
        for _ in 0..ch.params[0] {
            let i = ch.rng.next() as usize % len;
            if ch.levels[i] == 0 {
                ch.levels[i] = 255;
            }
        }
    }
    let color = ch.color;
    for (px, &lvl) in ch.frame.iter_mut().zip(ch.levels.iter()) {
        *px = scale(color, lvl);
    }
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

// ─── theater_chase: params[0] = frames per step ──────────────

fn init_chase(ch: &mut WsChannel) {
    ch.params[0] = 3;
}

fn params_chase(ch: &mut WsChannel, params: &[i64]) {
    store_params(&mut ch.params, params);
    ch.params[0] = clamp(ch.params[0], 1, 60);
}

fn render_chase(ch: &mut WsChannel) {
    let speed = ch.params[0] as u32;
    let offset = (ch.frame_pos / speed) % 3;
    let color = ch.color;
    for (i, px) in ch.frame.iter_mut().enumerate() {
        *px = if (i as u32 + offset) % 3 == 0 {
            color
        } else {
            Rgb::BLACK
        };
    }
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

// ─── wipe: params[0] = frames per pixel ──────────────────────

fn init_wipe(ch: &mut WsChannel) {
    ch.params[0] = 1;
}

fn params_wipe(ch: &mut WsChannel, params: &[i64]) {
    store_params(&mut ch.params, params);
    ch.params[0] = clamp(ch.params[0], 1, 60);
}

fn render_wipe(ch: &mut WsChannel) {
    let speed = ch.params[0] as u32;
    let len = ch.frame.len().max(1) as u32;
    let steps = ch.frame_pos / speed;
    let filling = (steps / len) % 2 == 0;
    let edge = (steps % len) as usize;
    let color = ch.color;
    for (i, px) in ch.frame.iter_mut().enumerate() {
        let ahead = i <= edge;
        *px = match (filling, ahead) {
            (true, true) | (false, false) => color,
            _ => Rgb::BLACK,
        };
    }
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

// ─── gradient_scroll: fixed palette scrolled one pixel per frame ──

fn render_gradient_scroll(ch: &mut WsChannel) {
    let len = ch.frame.len().max(1) as u32;
    for (i, px) in ch.frame.iter_mut().enumerate() {
        let k = (i as u32 + ch.frame_pos) % len;
        *px = Rgb::new(
            ((k * 2) % 256) as u8,
            (255 - (k * 2) % 256) as u8,
            ((k * 5) % 256) as u8,
        );
    }
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

// ─── triple_wave: params = up to 3 × [r, g, b, freq, velocity] ───
//
// freq is whole cycles across the strip; velocity is thousandths of a
// cycle advanced per frame (signed, so waves can travel either way).
// Unconfigured, the effect renders black until params arrive.

const WAVE_FIELDS: usize = 5;
const MAX_WAVES: usize = 3;
const WAVE_COUNT_SLOT: usize = MAX_PARAMS - 1;

fn init_triple_wave(ch: &mut WsChannel) {
    ch.params = [0; MAX_PARAMS];
}

fn params_triple_wave(ch: &mut WsChannel, params: &[i64]) {
    store_params(&mut ch.params, params);
    let count = (params.len() / WAVE_FIELDS).min(MAX_WAVES);
    for w in 0..count {
        let base = w * WAVE_FIELDS;
        ch.params[base] = clamp(ch.params[base], 0, 255);
        ch.params[base + 1] = clamp(ch.params[base + 1], 0, 255);
        ch.params[base + 2] = clamp(ch.params[base + 2], 0, 255);
        ch.params[base + 3] = clamp(ch.params[base + 3], 1, 64);
        ch.params[base + 4] = clamp(ch.params[base + 4], -1000, 1000);
    }
    ch.params[WAVE_COUNT_SLOT] = count as i64;
}

fn render_triple_wave(ch: &mut WsChannel) {
    let count = ch.params[WAVE_COUNT_SLOT].clamp(0, MAX_WAVES as i64) as usize;
    let len = ch.frame.len().max(1) as f32;
    let t = ch.frame_pos as f32;
    for (i, px) in ch.frame.iter_mut().enumerate() {
        let pos = i as f32 / len;
        let (mut r, mut g, mut b) = (0.0f32, 0.0f32, 0.0f32);
        for w in 0..count {
            let base = w * WAVE_FIELDS;
            let freq = ch.params[base + 3] as f32;
            let vel = ch.params[base + 4] as f32 / 1000.0;
            let s = (core::f32::consts::TAU * (freq * pos + t * vel)).sin() * 0.5 + 0.5;
            r += s * ch.params[base] as f32;
            g += s * ch.params[base + 1] as f32;
            b += s * ch.params[base + 2] as f32;
        }
        *px = Rgb::new(r.min(255.0) as u8, g.min(255.0) as u8, b.min(255.0) as u8);
    }
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{XorShift32, MAX_PARAMS};

    fn test_channel(pixels: usize) -> WsChannel {
        WsChannel {
            enabled: true,
            pixels,
            effect: 0,
            brightness: 255,
            frame_pos: 0,
            color: Rgb::new(200, 100, 50),
            params: [0; MAX_PARAMS],
            tick_ms: 16,
            rng: XorShift32::new(1),
            frame: vec![Rgb::BLACK; pixels],
            levels: vec![0; pixels],
        }
    }

    #[test]
    fn lookup_finds_all_names() {
        for e in ws_effects() {
            assert!(ws_lookup(e.name).is_some());
        }
        assert!(ws_lookup("nope").is_none());
    }

    #[test]
    fn solid_fills_with_channel_color() {
        let mut ch = test_channel(10);
        render_solid(&mut ch);
        assert!(ch.frame.iter().all(|&c| c == Rgb::new(200, 100, 50)));
        assert_eq!(ch.frame_pos, 1);
    }

    #[test]
    fn breathe_starts_dark_and_peaks_mid_period() {
        let mut ch = test_channel(4);
        init_breathe(&mut ch);
        ch.params[0] = 320; // 20 frames at 16 ms
        render_breathe(&mut ch);
        assert_eq!(ch.frame[0], Rgb::BLACK);
        ch.frame_pos = 10;
        render_breathe(&mut ch);
        assert!(ch.frame[0].r > 150);
    }

    #[test]
    fn breathe_params_clamped() {
        let mut ch = test_channel(4);
        params_breathe(&mut ch, &[5]);
        assert_eq!(ch.params[0], 200);
        params_breathe(&mut ch, &[1_000_000]);
        assert_eq!(ch.params[0], 60_000);
    }

    #[test]
    fn rainbow_spreads_hues_across_strip() {
        let mut ch = test_channel(128);
        init_rainbow(&mut ch);
        render_rainbow(&mut ch);
        assert_ne!(ch.frame[0], ch.frame[64]);
    }

    #[test]
    fn wheel_covers_all_positions() {
        for pos in 0..=255u8 {
            let c = wheel(pos);
            assert!(c.r > 0 || c.g > 0 || c.b > 0);
        }
    }

    #[test]
    fn chase_lights_every_third_pixel() {
        let mut ch = test_channel(9);
        init_chase(&mut ch);
        render_chase(&mut ch);
        let lit = ch.frame.iter().filter(|&&c| c != Rgb::BLACK).count();
        assert_eq!(lit, 3);
    }

    #[test]
    fn twinkle_decays_without_ignition() {
        let mut ch = test_channel(8);
        init_twinkle(&mut ch);
        ch.params[0] = 1;
        ch.levels[3] = 200;
        render_twinkle(&mut ch);
        // decay runs before ignition, and ignition only touches dark pixels
        assert_eq!(ch.levels[3], 184);
    }

    #[test]
    fn wipe_fills_then_clears() {
        let mut ch = test_channel(4);
        init_wipe(&mut ch);
        render_wipe(&mut ch);
        assert_ne!(ch.frame[0], Rgb::BLACK);
        assert_eq!(ch.frame[3], Rgb::BLACK);
        // after a full fill pass the wipe starts clearing
        ch.frame_pos = 4;
        render_wipe(&mut ch);
        assert_eq!(ch.frame[0], Rgb::BLACK);
        assert_ne!(ch.frame[3], Rgb::BLACK);
    }

    #[test]
    fn gradient_scroll_shifts_one_pixel_per_frame() {
        let mut ch = test_channel(4);
        render_gradient_scroll(&mut ch);
        assert_eq!(ch.frame[0], Rgb::new(0, 255, 0));
        let second = ch.frame[1];
        render_gradient_scroll(&mut ch);
        assert_eq!(ch.frame[0], second);
    }

    #[test]
    fn triple_wave_is_dark_until_params_arrive() {
        let mut ch = test_channel(8);
        init_triple_wave(&mut ch);
        render_triple_wave(&mut ch);
        assert!(ch.frame.iter().all(|&c| c == Rgb::BLACK));
    }

    #[test]
    fn triple_wave_renders_configured_wave() {
        let mut ch = test_channel(8);
        init_triple_wave(&mut ch);
        params_triple_wave(&mut ch, &[255, 0, 0, 1, 0]);
        assert_eq!(ch.params[WAVE_COUNT_SLOT], 1);
        render_triple_wave(&mut ch);
        // one full cycle across the strip: crest at 1/4, trough at 3/4
        assert!(ch.frame[2].r > 250);
        assert!(ch.frame[6].r < 5);
        assert_eq!(ch.frame[2].g, 0);
    }

    #[test]
    fn triple_wave_params_clamped_and_counted() {
        let mut ch = test_channel(4);
        params_triple_wave(&mut ch, &[999, -5, 300, 0, 5000, 10, 20, 30, 2, -9999]);
        assert_eq!(ch.params[WAVE_COUNT_SLOT], 2);
        assert_eq!(&ch.params[..5], &[255, 0, 255, 1, 1000]);
        assert_eq!(&ch.params[5..10], &[10, 20, 30, 2, -1000]);
    }

    #[test]
    fn tri_is_symmetric() {
        assert_eq!(tri(0, 20), 0);
        assert_eq!(tri(10, 20), 255);
        assert_eq!(tri(5, 20), tri(15, 20));
    }
}

//! RGB PWM effect registry.

use crate::engine::{store_params, Rgb};

use super::RgbChannel;

pub struct RgbEffect {
    pub name: &'static str,
    pub init: fn(&mut RgbChannel),
    pub render: fn(&mut RgbChannel),
    pub apply_params: fn(&mut RgbChannel, &[i64]),
}

static RGB_EFFECTS: [RgbEffect; 2] = [
    RgbEffect {
        name: "solid",
        init: |_| {},
        render: render_solid,
        apply_params: |_, _| {},
    },
    RgbEffect {
        name: "color_swell",
        init: init_swell,
        render: render_swell,
        apply_params: params_swell,
    },
];

pub fn rgb_effects() -> &'static [RgbEffect] {
    &RGB_EFFECTS
}

pub fn rgb_lookup(name: &str) -> Option<usize> {
    RGB_EFFECTS.iter().position(|e| e.name == name)
}

fn scale(c: Rgb, level: u8) -> Rgb {
    Rgb::new(
        ((u16::from(c.r) * u16::from(level)) / 255) as u8,
        ((u16::from(c.g) * u16::from(level)) / 255) as u8,
        ((u16::from(c.b) * u16::from(level)) / 255) as u8,
    )
}

// ─── solid ────────────────────────────────────────────────────

fn render_solid(ch: &mut RgbChannel) {
    ch.out = ch.color;
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

// ─── color_swell: params = [start, end, duration_ms] ─────────
//
// Ramps the colour from `start` to `end` level over the duration, then
// holds the end level.

fn init_swell(ch: &mut RgbChannel) {
    ch.params[0] = 0;
    ch.params[1] = 255;
    ch.params[2] = 1000;
}

fn params_swell(ch: &mut RgbChannel, params: &[i64]) {
    store_params(&mut ch.params, params);
    ch.params[0] = ch.params[0].clamp(0, 255);
    ch.params[1] = ch.params[1].clamp(0, 255);
    ch.params[2] = ch.params[2].clamp(50, 60_000);
    ch.frame_pos = 0;
}

fn render_swell(ch: &mut RgbChannel) {
    let start = ch.params[0] as i32;
    let end = ch.params[1] as i32;
    let frames = (ch.params[2] as u32 / ch.tick_ms.max(1)).max(1) as i32;
    let pos = (ch.frame_pos as i32).min(frames);
    let level = start + (end - start) * pos / frames;
    ch.out = scale(ch.color, level as u8);
    if (ch.frame_pos as i32) < frames {
        ch.frame_pos += 1;
    }
}

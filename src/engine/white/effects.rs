//! White PWM effect registry.
//!
//! Effects compute a linear level; the engine maps it through gamma and
//! brightness before the duty write.

use crate::engine::store_params;

use super::WhiteChannel;

pub struct WhiteEffect {
    pub name: &'static str,
    pub init: fn(&mut WhiteChannel),
    pub render: fn(&mut WhiteChannel),
    pub apply_params: fn(&mut WhiteChannel, &[i64]),
}

static WHITE_EFFECTS: [WhiteEffect; 5] = [
    WhiteEffect {
        name: "solid",
        init: |_| {},
        render: render_solid,
        apply_params: |_, _| {},
    },
    WhiteEffect {
        name: "breathe",
        init: init_breathe,
        render: render_breathe,
        apply_params: params_breathe,
    },
    WhiteEffect {
        name: "swell",
        init: init_swell,
        render: render_swell,
        apply_params: params_swell,
    },
    WhiteEffect {
        name: "blink",
        init: init_blink,
        render: render_blink,
        apply_params: params_blink,
    },
    WhiteEffect {
        name: "graceful_off",
        init: init_graceful,
        render: render_graceful,
        apply_params: params_graceful,
    },
];

pub fn white_effects() -> &'static [WhiteEffect] {
    &WHITE_EFFECTS
}

pub fn white_lookup(name: &str) -> Option<usize> {
    WHITE_EFFECTS.iter().position(|e| e.name == name)
}

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

// ─── solid ────────────────────────────────────────────────────

fn render_solid(ch: &mut WhiteChannel) {
    ch.level = 255;
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

// ─── breathe: params[0] = period ms ──────────────────────────

fn init_breathe(ch: &mut WhiteChannel) {
    ch.params[0] = 4000;
}

fn params_breathe(ch: &mut WhiteChannel, params: &[i64]) {
    store_params(&mut ch.params, params);
    ch.params[0] = ch.params[0].clamp(200, 60_000);
}

fn render_breathe(ch: &mut WhiteChannel) {
    let period_frames = (ch.params[0] as u32 / ch.tick_ms.max(1)).max(2);
    ch.level = tri(ch.frame_pos, period_frames);
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

// ─── swell: params = [start, end, duration_ms] ───────────────

fn init_swell(ch: &mut WhiteChannel) {
    ch.params[0] = 0;
    ch.params[1] = 255;
    ch.params[2] = 1000;
}

fn params_swell(ch: &mut WhiteChannel, params: &[i64]) {
    store_params(&mut ch.params, params);
    ch.params[0] = ch.params[0].clamp(0, 255);
    ch.params[1] = ch.params[1].clamp(0, 255);
    ch.params[2] = ch.params[2].clamp(50, 60_000);
    ch.frame_pos = 0;
}

fn render_swell(ch: &mut WhiteChannel) {
    let start = ch.params[0] as i32;
    let end = ch.params[1] as i32;
    let frames = (ch.params[2] as u32 / ch.tick_ms.max(1)).max(1) as i32;
    let pos = (ch.frame_pos as i32).min(frames);
    ch.level = (start + (end - start) * pos / frames) as u8;
    if (ch.frame_pos as i32) < frames {
        ch.frame_pos += 1;
    }
}

// ─── blink: params = [on_ms, off_ms] ─────────────────────────

fn init_blink(ch: &mut WhiteChannel) {
    ch.params[0] = 500;
    ch.params[1] = 500;
}

fn params_blink(ch: &mut WhiteChannel, params: &[i64]) {
    store_params(&mut ch.params, params);
    ch.params[0] = ch.params[0].clamp(50, 60_000);
    ch.params[1] = ch.params[1].clamp(50, 60_000);
}

fn render_blink(ch: &mut WhiteChannel) {
    let tick = ch.tick_ms.max(1);
    let on_frames = (ch.params[0] as u32 / tick).max(1);
    let off_frames = (ch.params[1] as u32 / tick).max(1);
    let phase = ch.frame_pos % (on_frames + off_frames);
    ch.level = if phase < on_frames { 255 } else { 0 };
    ch.frame_pos = ch.frame_pos.wrapping_add(1);
}

// ─── graceful_off: params[0] = fade ms ───────────────────────
//
// Ramps from the level at the moment the effect was selected down to
// zero, then holds dark. Used as the "off" path so a lit room never
// snaps to black.

fn init_graceful(ch: &mut WhiteChannel) {
    ch.params[0] = 2000;
    ch.start_level = ch.level;
}

fn params_graceful(ch: &mut WhiteChannel, params: &[i64]) {
    store_params(&mut ch.params, params);
    ch.params[0] = ch.params[0].clamp(100, 60_000);
}

fn render_graceful(ch: &mut WhiteChannel) {
    let frames = (ch.params[0] as u32 / ch.tick_ms.max(1)).max(1);
    let pos = ch.frame_pos.min(frames);
    let start = u32::from(ch.start_level);
    ch.level = (start * (frames - pos) / frames) as u8;
    if ch.frame_pos < frames {
        ch.frame_pos += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::MAX_PARAMS;

    fn test_channel() -> WhiteChannel {
        WhiteChannel {
            enabled: true,
            effect: 0,
            brightness: 255,
            frame_pos: 0,
            params: [0; MAX_PARAMS],
            tick_ms: 5,
            level: 0,
            start_level: 0,
        }
    }

    #[test]
    fn lookup_finds_all_names() {
        for e in white_effects() {
            assert!(white_lookup(e.name).is_some());
        }
        assert!(white_lookup("rainbow").is_none());
    }

    #[test]
    fn solid_is_full_level() {
        let mut ch = test_channel();
        render_solid(&mut ch);
        assert_eq!(ch.level, 255);
    }

    #[test]
    fn blink_alternates() {
        let mut ch = test_channel();
        init_blink(&mut ch);
        ch.params[0] = 25; // 5 frames on
        ch.params[1] = 25; // 5 frames off
        let mut seen_on = false;
        let mut seen_off = false;
        for _ in 0..10 {
            render_blink(&mut ch);
            match ch.level {
                255 => seen_on = true,
                0 => seen_off = true,
                other => panic!("blink produced level {other}"),
            }
        }
        assert!(seen_on && seen_off);
    }

    #[test]
    fn blink_duty_split() {
        let mut ch = test_channel();
        init_blink(&mut ch);
        ch.params[0] = 15; // 3 frames on
        ch.params[1] = 35; // 7 frames off
        let on = (0..10)
            .map(|_| {
                render_blink(&mut ch);
                ch.level
            })
            .filter(|&l| l == 255)
            .count();
        assert_eq!(on, 3);
    }

    #[test]
    fn graceful_off_fades_from_current_level() {
        let mut ch = test_channel();
        ch.level = 200;
        init_graceful(&mut ch);
        ch.params[0] = 50; // 10 frames
        render_graceful(&mut ch);
        assert_eq!(ch.level, 200); // frame 0
        for _ in 0..20 {
            render_graceful(&mut ch);
        }
        assert_eq!(ch.level, 0); // held dark
    }

    #[test]
    fn graceful_off_from_dark_stays_dark() {
        let mut ch = test_channel();
        ch.level = 0;
        init_graceful(&mut ch);
        for _ in 0..5 {
            render_graceful(&mut ch);
        }
        assert_eq!(ch.level, 0);
    }

    #[test]
    fn swell_ramps_up() {
        let mut ch = test_channel();
        init_swell(&mut ch);
        ch.params[2] = 50; // 10 frames
        for _ in 0..20 {
            render_swell(&mut ch);
        }
        assert_eq!(ch.level, 255);
    }

    #[test]
    fn breathe_period_clamped() {
        let mut ch = test_channel();
        params_breathe(&mut ch, &[1]);
        assert_eq!(ch.params[0], 200);
    }
}

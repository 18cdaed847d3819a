//! Effect engines.
//!
//! Three families share one design: a static effect registry, per-channel
//! render state behind a short-held mutex, and a fixed-rate tick task with
//! absolute-deadline pacing. The pipeline per tick is
//! render (linear colour) → gamma → brightness → output.
//!
//! - [`ws`]: addressable WS2812 strips, 60 FPS, with a decoupled
//!   higher-priority refresh task that owns the strip bus.
//! - [`rgb`]: RGB PWM triplets on LEDC, 200 Hz smoothing.
//! - [`white`]: single-channel white PWM on LEDC, 200 Hz smoothing.

pub mod clock;
pub mod gamma;
pub mod rgb;
pub mod sync;
pub mod white;
pub mod ws;

/// Maximum `params` values an effect consumes; extras are ignored.
/// Sized for the largest consumer, `triple_wave` (three five-value wave
/// configs plus a count slot).
pub const MAX_PARAMS: usize = 16;

/// Linear (pre-gamma) colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const BLACK: Self = Self { r: 0, g: 0, b: 0 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }
}

/// Copy incoming params over a channel's param block, ignoring extras.
pub(crate) fn store_params(slot: &mut [i64; MAX_PARAMS], params: &[i64]) {
    for (dst, src) in slot.iter_mut().zip(params.iter()) {
        *dst = *src;
    }
}

/// Small xorshift PRNG for sparkle-type effects. Deterministic per seed,
/// no heap, good enough for visuals.
#[derive(Debug, Clone, Copy)]
pub(crate) struct XorShift32(u32);

impl XorShift32 {
    pub(crate) fn new(seed: u32) -> Self {
        Self(if seed == 0 { 0x9e37_79b9 } else { seed })
    }

    pub(crate) fn next(&mut self) -> u32 {
        let mut x = self.0;
        x ^= x << 13;
        x ^= x >> 17;
        x ^= x << 5;
        self.0 = x;
        x
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn store_params_ignores_extras() {
        let mut slot = [0i64; MAX_PARAMS];
        let incoming: Vec<i64> = (1..=(MAX_PARAMS as i64 + 2)).collect();
        store_params(&mut slot, &incoming);
        assert_eq!(slot.to_vec(), incoming[..MAX_PARAMS].to_vec());
    }

    #[test]
    fn store_params_partial_leaves_rest() {
        let mut slot = [9i64; MAX_PARAMS];
        store_params(&mut slot, &[7]);
        assert_eq!(slot[0], 7);
        assert!(slot[1..].iter().all(|&v| v == 9));
    }

    #[test]
    fn xorshift_never_sticks_at_zero() {
        let mut rng = XorShift32::new(0);
        for _ in 0..1000 {
            assert_ne!(rng.next(), 0);
        }
    }
}

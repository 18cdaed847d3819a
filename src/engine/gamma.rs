//! Gamma correction and brightness scaling.
//!
//! The render pipeline works in linear colour; the last step before an
//! output write maps through a 2.2 gamma table and then scales by the
//! channel brightness with truncating integer division. Order matters:
//! gamma first, brightness second.

use std::sync::OnceLock;

static GAMMA_TABLE: OnceLock<[u8; 256]> = OnceLock::new();

fn table() -> &'static [u8; 256] {
    GAMMA_TABLE.get_or_init(|| {
        let mut t = [0u8; 256];
        for (i, v) in t.iter_mut().enumerate() {
            *v = ((i as f32 / 255.0).powf(2.2) * 255.0 + 0.5) as u8;
        }
        t
    })
}

/// Map a linear 8-bit value through the 2.2 gamma curve.
#[inline]
pub fn gamma8(v: u8) -> u8 {
    table()[v as usize]
}

/// Scale a (post-gamma) value by brightness, truncating.
#[inline]
pub fn scale_brightness(v: u8, brightness: u8) -> u8 {
    ((u16::from(v) * u16::from(brightness)) / 255) as u8
}

/// Full output mapping for one component.
#[inline]
pub fn correct(v: u8, brightness: u8) -> u8 {
    scale_brightness(gamma8(v), brightness)
}

/// Map an 8-bit post-correction value onto a 12-bit LEDC duty.
#[inline]
pub fn duty12(v: u8) -> u16 {
    (u32::from(v) * 4095 / 255) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_fixed() {
        assert_eq!(gamma8(0), 0);
        assert_eq!(gamma8(255), 255);
    }

    #[test]
    fn midpoint_value() {
        // (128/255)^2.2 * 255 rounds to 56
        assert_eq!(gamma8(128), 56);
    }

    #[test]
    fn monotonic() {
        for v in 1..=255u8 {
            assert!(gamma8(v) >= gamma8(v - 1));
        }
    }

    #[test]
    fn brightness_truncates() {
        // 56 * 128 / 255 = 28 with integer division
        assert_eq!(scale_brightness(56, 128), 28);
        assert_eq!(correct(128, 128), 28);
    }

    #[test]
    fn brightness_zero_blanks() {
        for v in 0..=255u8 {
            assert_eq!(scale_brightness(v, 0), 0);
        }
    }

    #[test]
    fn brightness_full_is_identity() {
        for v in 0..=255u8 {
            assert_eq!(scale_brightness(v, 255), v);
        }
    }

    #[test]
    fn duty_endpoints() {
        assert_eq!(duty12(0), 0);
        assert_eq!(duty12(255), 4095);
    }
}

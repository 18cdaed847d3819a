//! Command reconciliation.
//!
//! Turns JSON command payloads into engine control calls. The contract is
//! forgiving: malformed or out-of-range fields are clamped or skipped and
//! the rest of the command still applies; a command is only rejected
//! wholesale when the payload is not JSON at all or names a dead channel.
//! Each apply returns an acknowledgment snapshot built from the state the
//! engine actually holds afterwards.

use log::warn;
use serde_json::{json, Value};

use crate::drivers::relay::RelayBank;
use crate::engine::rgb::RgbEngine;
use crate::engine::white::WhiteEngine;
use crate::engine::ws::WsEngine;
use crate::engine::{Rgb, MAX_PARAMS};
use crate::error::{EngineError, Result};

/// Channel family, used for state-persistence keys and topic routing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Family {
    Ws,
    Rgb,
    White,
    Relay,
}

impl Family {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ws => "ws",
            Self::Rgb => "rgb",
            Self::White => "white",
            Self::Relay => "relay",
        }
    }
}

// ─── Colour helpers ───────────────────────────────────────────

/// Parse `"#rrggbb"` (leading `#` optional).
pub fn hex_to_rgb(s: &str) -> Option<Rgb> {
    let hex = s.strip_prefix('#').unwrap_or(s);
    if hex.len() != 6 {
        return None;
    }
    let r = u8::from_str_radix(&hex[0..2], 16).ok()?;
    let g = u8::from_str_radix(&hex[2..4], 16).ok()?;
    let b = u8::from_str_radix(&hex[4..6], 16).ok()?;
    Some(Rgb::new(r, g, b))
}

pub fn rgb_to_hex(c: Rgb) -> heapless::String<8> {
    let mut s = heapless::String::new();
    let _ = core::fmt::write(&mut s, format_args!("#{:02x}{:02x}{:02x}", c.r, c.g, c.b));
    s
}

// ─── Field extraction ─────────────────────────────────────────

/// Channel index from `strip` or `channel`, defaulting to 0.
pub fn target_channel(cmd: &Value) -> usize {
    cmd.get("strip")
        .or_else(|| cmd.get("channel"))
        .and_then(Value::as_u64)
        .unwrap_or(0) as usize
}

/// Brightness clamped into 0..=255; `None` when absent or non-numeric.
fn brightness_of(cmd: &Value) -> Option<u8> {
    cmd.get("brightness")
        .and_then(Value::as_i64)
        .map(|b| b.clamp(0, 255) as u8)
}

/// Lower a `params` array to integers, skipping non-numeric entries.
fn params_of(cmd: &Value) -> Option<heapless::Vec<i64, MAX_PARAMS>> {
    let arr = cmd.get("params")?.as_array()?;
    let mut out = heapless::Vec::new();
    for v in arr {
        if let Some(n) = v.as_i64() {
            if out.push(n).is_err() {
                break;
            }
        }
    }
    Some(out)
}

fn parse(payload: &str) -> Result<Value> {
    serde_json::from_str(payload).map_err(|_| crate::error::Error::Config("payload is not JSON"))
}

// ─── Per-family apply ─────────────────────────────────────────

pub fn apply_ws(engine: &WsEngine, payload: &str) -> Result<Value> {
    let cmd = parse(payload)?;
    let strip = target_channel(&cmd);

    if let Some(name) = cmd.get("effect").and_then(Value::as_str) {
        if let Err(e) = engine.set_effect(strip, name) {
            match e {
                crate::error::Error::Engine(EngineError::UnknownEffect) => {
                    warn!("ws: unknown effect '{}', keeping current", name);
                }
                other => return Err(other),
            }
        }
    }
    if let Some(b) = brightness_of(&cmd) {
        engine.set_brightness(strip, b)?;
    }
    if let Some(hex) = cmd.get("color").and_then(Value::as_str) {
        match hex_to_rgb(hex) {
            Some(c) => engine.set_color(strip, c)?,
            None => warn!("ws: bad color '{}', ignored", hex),
        }
    }
    if let Some(params) = params_of(&cmd) {
        engine.apply_params(strip, &params)?;
    }

    let st = engine.status(strip)?;
    Ok(json!({
        "strip": strip,
        "enabled": st.enabled,
        "effect": st.effect.as_str(),
        "brightness": st.brightness,
        "pixels": st.pixels,
        "color": rgb_to_hex(st.color).as_str(),
        "fps": st.fps,
    }))
}

pub fn apply_rgb(engine: &RgbEngine, payload: &str) -> Result<Value> {
    let cmd = parse(payload)?;
    let strip = target_channel(&cmd);

    if let Some(name) = cmd.get("effect").and_then(Value::as_str) {
        if let Err(e) = engine.set_effect(strip, name) {
            match e {
                crate::error::Error::Engine(EngineError::UnknownEffect) => {
                    warn!("rgb: unknown effect '{}', keeping current", name);
                }
                other => return Err(other),
            }
        }
    }
    if let Some(b) = brightness_of(&cmd) {
        engine.set_brightness(strip, b)?;
    }
    if let Some(hex) = cmd.get("color").and_then(Value::as_str) {
        match hex_to_rgb(hex) {
            Some(c) => engine.set_color(strip, c)?,
            None => warn!("rgb: bad color '{}', ignored", hex),
        }
    }
    if let Some(params) = params_of(&cmd) {
        engine.apply_params(strip, &params)?;
    }

    let st = engine.status(strip)?;
    Ok(json!({
        "strip": strip,
        "enabled": st.enabled,
        "effect": st.effect.as_str(),
        "brightness": st.brightness,
        "color": rgb_to_hex(st.color).as_str(),
        "smooth_hz": st.smooth_hz,
    }))
}

pub fn apply_white(engine: &WhiteEngine, payload: &str) -> Result<Value> {
    let cmd = parse(payload)?;
    let channel = target_channel(&cmd);

    if let Some(name) = cmd.get("effect").and_then(Value::as_str) {
        if let Err(e) = engine.set_effect(channel, name) {
            match e {
                crate::error::Error::Engine(EngineError::UnknownEffect) => {
                    warn!("white: unknown effect '{}', keeping current", name);
                }
                other => return Err(other),
            }
        }
    }
    if let Some(b) = brightness_of(&cmd) {
        engine.set_brightness(channel, b)?;
    }
    if let Some(params) = params_of(&cmd) {
        engine.apply_params(channel, &params)?;
    }

    let st = engine.status(channel)?;
    Ok(json!({
        "channel": channel,
        "enabled": st.enabled,
        "effect": st.effect.as_str(),
        "brightness": st.brightness,
        "smooth_hz": st.smooth_hz,
    }))
}

pub fn apply_relay(bank: &mut RelayBank, payload: &str) -> Result<Value> {
    let cmd = parse(payload)?;
    let channel = target_channel(&cmd);
    if let Some(on) = cmd.get("on").and_then(Value::as_bool) {
        bank.set(channel, on)?;
    }
    Ok(json!({
        "channel": channel,
        "on": bank.is_on(channel),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_parses_with_and_without_hash() {
        assert_eq!(hex_to_rgb("#ff8800"), Some(Rgb::new(255, 136, 0)));
        assert_eq!(hex_to_rgb("FF8800"), Some(Rgb::new(255, 136, 0)));
    }

    #[test]
    fn hex_rejects_garbage() {
        assert_eq!(hex_to_rgb(""), None);
        assert_eq!(hex_to_rgb("#ff88"), None);
        assert_eq!(hex_to_rgb("#gg0000"), None);
        assert_eq!(hex_to_rgb("#ff8800ff"), None);
    }

    #[test]
    fn hex_roundtrip() {
        let c = Rgb::new(18, 52, 86);
        assert_eq!(hex_to_rgb(rgb_to_hex(c).as_str()), Some(c));
    }

    #[test]
    fn target_channel_accepts_both_keys() {
        let v: Value = serde_json::from_str(r#"{"strip": 1}"#).unwrap();
        assert_eq!(target_channel(&v), 1);
        let v: Value = serde_json::from_str(r#"{"channel": 3}"#).unwrap();
        assert_eq!(target_channel(&v), 3);
        let v: Value = serde_json::from_str(r#"{}"#).unwrap();
        assert_eq!(target_channel(&v), 0);
    }

    #[test]
    fn brightness_clamped() {
        let v: Value = serde_json::from_str(r#"{"brightness": 999}"#).unwrap();
        assert_eq!(brightness_of(&v), Some(255));
        let v: Value = serde_json::from_str(r#"{"brightness": -4}"#).unwrap();
        assert_eq!(brightness_of(&v), Some(0));
        let v: Value = serde_json::from_str(r#"{"brightness": "high"}"#).unwrap();
        assert_eq!(brightness_of(&v), None);
    }

    #[test]
    fn params_skip_non_numeric() {
        let v: Value = serde_json::from_str(r#"{"params": [1, "x", 2.5, 3]}"#).unwrap();
        let p = params_of(&v).unwrap();
        assert_eq!(&p[..], &[1, 3]);
    }

    #[test]
    fn params_absent_is_none() {
        let v: Value = serde_json::from_str(r#"{}"#).unwrap();
        assert!(params_of(&v).is_none());
    }
}

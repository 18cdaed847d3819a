//! Engine lifecycle tests against the simulation drivers.
//!
//! These run the real render/refresh/smoothing tasks on host threads and
//! assert on the frames and duties the drivers actually received.

use ultranode::drivers::ledc::SimPwmFactory;
use ultranode::drivers::strip::SimStripFactory;
use ultranode::engine::rgb::RgbEngine;
use ultranode::engine::white::WhiteEngine;
use ultranode::engine::ws::WsEngine;
use ultranode::engine::Rgb;

use crate::mock_hw::{test_config, wait_until};

// ─── Addressable strips ───────────────────────────────────────

#[test]
fn ws_renders_default_solid_white() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();
    assert!(engine.running());
    assert_eq!(factory.opened.len(), 2);

    let shown = factory.opened[0].1.clone();
    assert!(wait_until(|| shown.lock().unwrap()[0] == (255, 255, 255)));
    engine.stop();
}

#[test]
fn ws_brightness_scales_after_gamma() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();

    engine.set_color(0, Rgb::new(255, 0, 0)).unwrap();
    engine.set_brightness(0, 128).unwrap();

    // gamma(255) = 255, then 255 * 128 / 255 = 128.
    let shown = factory.opened[0].1.clone();
    assert!(wait_until(|| shown.lock().unwrap()[0] == (128, 0, 0)));
    engine.stop();
}

#[test]
fn ws_stop_blanks_strips_and_is_idempotent() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();

    let shown = factory.opened[0].1.clone();
    assert!(wait_until(|| shown.lock().unwrap()[0] != (0, 0, 0)));

    engine.stop();
    assert!(!engine.running());
    assert!(shown.lock().unwrap().iter().all(|&px| px == (0, 0, 0)));

    // Second stop must be a no-op.
    engine.stop();
}

#[test]
fn ws_start_is_idempotent() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();
    engine.start(&cfg, &mut factory).unwrap();
    // No second set of strips opened.
    assert_eq!(factory.opened.len(), 2);
    engine.stop();
}

#[test]
fn ws_failed_strip_does_not_take_down_siblings() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    factory.fail_gpios.push(16); // strip 0

    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();
    assert!(engine.running());

    assert!(engine.status(0).is_err());
    assert!(engine.status(1).unwrap().enabled);
    assert!(engine.set_effect(0, "rainbow").is_err());
    engine.set_effect(1, "rainbow").unwrap();

    // The surviving strip still renders.
    let shown = factory.opened[0].1.clone();
    assert!(wait_until(|| shown.lock().unwrap().iter().any(|&px| px != (0, 0, 0))));
    engine.stop();
}

#[test]
fn ws_status_fails_like_mutators_for_dead_channels() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    factory.fail_gpios.push(16); // strip 0 never opens
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();

    assert!(engine.status(0).is_err());
    assert!(engine.status(99).is_err());
    assert!(engine.status(1).is_ok());

    engine.stop();
    // After stop every channel is disabled again.
    assert!(engine.status(1).is_err());
}

#[test]
fn ws_unknown_effect_rejected() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();
    assert!(engine.set_effect(0, "disco_inferno").is_err());
    assert_eq!(engine.status(0).unwrap().effect.as_str(), "solid");
    engine.stop();
}

// ─── RGB PWM strips ───────────────────────────────────────────

#[test]
fn rgb_solid_drives_per_line_duties() {
    let cfg = test_config();
    let mut factory = SimPwmFactory::new();
    let mut engine = RgbEngine::new();
    engine.start(&cfg, &mut factory).unwrap();
    assert_eq!(factory.opened.len(), 3); // r, g, b lines

    engine.set_color(0, Rgb::new(255, 0, 0)).unwrap();
    assert!(wait_until(|| factory.duty(0) == 4095 && factory.duty(1) == 0));
    assert_eq!(factory.duty(2), 0);
    engine.stop();
}

#[test]
fn rgb_stop_pulls_lines_low() {
    let cfg = test_config();
    let mut factory = SimPwmFactory::new();
    let mut engine = RgbEngine::new();
    engine.start(&cfg, &mut factory).unwrap();
    assert!(wait_until(|| factory.duty(0) > 0));
    engine.stop();
    assert_eq!(factory.duty(0), 0);
    assert_eq!(factory.duty(1), 0);
    assert_eq!(factory.duty(2), 0);
}

#[test]
fn rgb_failed_line_disables_whole_strip() {
    let cfg = test_config();
    let mut factory = SimPwmFactory::new();
    factory.fail_gpios.push(26); // green line

    let mut engine = RgbEngine::new();
    engine.start(&cfg, &mut factory).unwrap();
    assert!(engine.status(0).is_err());
    assert!(engine.set_color(0, Rgb::new(1, 2, 3)).is_err());
    // The red line that opened before the failure was pulled low again.
    assert_eq!(factory.duty(0), 0);
    engine.stop();
}

// ─── White PWM channels ───────────────────────────────────────

#[test]
fn white_channels_run_independently() {
    let cfg = test_config();
    let mut factory = SimPwmFactory::new();
    let mut engine = WhiteEngine::new();
    engine.start(&cfg, &mut factory).unwrap();
    assert_eq!(factory.opened.len(), 2);

    engine.set_brightness(1, 0).unwrap();
    // Channel 0 at full solid, channel 1 dimmed to zero.
    assert!(wait_until(|| factory.duty(0) == 4095));
    assert!(wait_until(|| factory.duty(1) == 0));
    engine.stop();
}

#[test]
fn white_graceful_off_reaches_dark() {
    let cfg = test_config();
    let mut factory = SimPwmFactory::new();
    let mut engine = WhiteEngine::new();
    engine.start(&cfg, &mut factory).unwrap();

    assert!(wait_until(|| factory.duty(0) == 4095));
    engine.set_effect(0, "graceful_off").unwrap();
    engine.apply_params(0, &[100]).unwrap();
    assert!(wait_until(|| factory.duty(0) == 0));
    engine.stop();
}

#[test]
fn white_disabled_channel_rejects_commands() {
    let cfg = test_config();
    let mut factory = SimPwmFactory::new();
    let mut engine = WhiteEngine::new();
    engine.start(&cfg, &mut factory).unwrap();
    assert!(engine.set_brightness(3, 10).is_err());
    engine.stop();
}

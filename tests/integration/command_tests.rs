//! Command path tests: JSON payload → reconciliation → engine → ack.

use ultranode::adapters::mqtt::route_command;
use ultranode::drivers::ledc::SimPwmFactory;
use ultranode::drivers::relay::bank_from_config;
use ultranode::drivers::strip::SimStripFactory;
use ultranode::engine::white::WhiteEngine;
use ultranode::engine::ws::WsEngine;
use ultranode::reconcile::{self, Family};

use crate::mock_hw::test_config;

#[test]
fn ws_command_applies_and_acks_engine_state() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();

    let ack = reconcile::apply_ws(
        &engine,
        r##"{"strip":0,"effect":"rainbow","brightness":64,"color":"#10a040","params":[4]}"##,
    )
    .unwrap();

    assert_eq!(ack["strip"], 0);
    assert_eq!(ack["effect"], "rainbow");
    assert_eq!(ack["brightness"], 64);
    assert_eq!(ack["color"], "#10a040");
    assert_eq!(engine.status(0).unwrap().brightness, 64);
    engine.stop();
}

#[test]
fn unknown_effect_keeps_current_but_applies_rest() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();

    let ack = reconcile::apply_ws(
        &engine,
        r#"{"strip":0,"effect":"no_such_thing","brightness":42}"#,
    )
    .unwrap();

    assert_eq!(ack["effect"], "solid");
    assert_eq!(ack["brightness"], 42);
    engine.stop();
}

#[test]
fn bad_color_is_ignored_not_fatal() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();

    let ack = reconcile::apply_ws(&engine, r##"{"strip":0,"color":"#zzz"}"##).unwrap();
    assert_eq!(ack["color"], "#ffffff"); // default colour untouched
    engine.stop();
}

#[test]
fn command_to_dead_channel_is_rejected() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    factory.fail_gpios.push(16);
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();

    assert!(reconcile::apply_ws(&engine, r#"{"strip":0,"brightness":10}"#).is_err());
    engine.stop();
}

#[test]
fn non_json_payload_is_rejected() {
    let cfg = test_config();
    let mut factory = SimStripFactory::new();
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();
    assert!(reconcile::apply_ws(&engine, "brightness=64").is_err());
    engine.stop();
}

#[test]
fn white_command_defaults_to_channel_zero() {
    let cfg = test_config();
    let mut factory = SimPwmFactory::new();
    let mut engine = WhiteEngine::new();
    engine.start(&cfg, &mut factory).unwrap();

    let ack = reconcile::apply_white(&engine, r#"{"effect":"breathe"}"#).unwrap();
    assert_eq!(ack["channel"], 0);
    assert_eq!(ack["effect"], "breathe");
    engine.stop();
}

#[test]
fn relay_command_toggles_and_acks() {
    let cfg = test_config();
    let mut bank = bank_from_config(&cfg);

    let ack = reconcile::apply_relay(&mut bank, r#"{"channel":0,"on":true}"#).unwrap();
    assert_eq!(ack["on"], true);
    assert!(bank.is_on(0));

    let ack = reconcile::apply_relay(&mut bank, r#"{"channel":0,"on":false}"#).unwrap();
    assert_eq!(ack["on"], false);

    // Channel 1 is not configured.
    assert!(reconcile::apply_relay(&mut bank, r#"{"channel":1,"on":true}"#).is_err());
}

#[test]
fn topic_routing_matches_command_families() {
    let cfg = test_config();
    let prefix = cfg.mqtt_topic_prefix.as_str();
    assert_eq!(
        route_command(prefix, &format!("{prefix}/ws/set")),
        Some(Family::Ws)
    );
    assert_eq!(
        route_command(prefix, &format!("{prefix}/relay/set")),
        Some(Family::Relay)
    );
    assert_eq!(route_command(prefix, &format!("{prefix}/ws/state")), None);
}

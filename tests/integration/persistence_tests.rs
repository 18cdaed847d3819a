//! Persistence round-trip: command → debounced flush → boot replay.

use std::time::Duration;

use ultranode::drivers::strip::SimStripFactory;
use ultranode::engine::ws::WsEngine;
use ultranode::reconcile::{self, Family};
use ultranode::state::{self, StateStore};

use crate::mock_hw::{test_config, MemStorage};

#[test]
fn flush_waits_for_the_debounce_window() {
    let mut store = StateStore::new(80);
    let mut storage = MemStorage::new();

    store.record(Family::Ws, 0, r#"{"brightness":10}"#);
    assert_eq!(store.tick(&mut storage), 0);
    assert_eq!(storage.len(), 0);

    std::thread::sleep(Duration::from_millis(100));
    assert_eq!(store.tick(&mut storage), 1);
    assert_eq!(storage.len(), 1);
}

#[test]
fn command_burst_costs_one_write_with_last_payload() {
    let mut store = StateStore::new(40);
    let mut storage = MemStorage::new();

    for b in 1..=5 {
        store.record(Family::Ws, 0, &format!(r#"{{"strip":0,"brightness":{b}}}"#));
    }
    std::thread::sleep(Duration::from_millis(60));
    assert_eq!(store.tick(&mut storage), 1);

    let mut seen = Vec::new();
    state::replay(&storage, |_, _, payload| seen.push(payload.to_owned()));
    assert_eq!(seen, vec![r#"{"strip":0,"brightness":5}"#.to_owned()]);
}

#[test]
fn replayed_state_restores_a_fresh_engine() {
    let cfg = test_config();

    // Session one: apply a command and flush it.
    let mut storage = MemStorage::new();
    {
        let mut factory = SimStripFactory::new();
        let mut engine = WsEngine::new();
        engine.start(&cfg, &mut factory).unwrap();
        let payload = r#"{"strip":0,"effect":"breathe","brightness":90}"#;
        reconcile::apply_ws(&engine, payload).unwrap();

        let mut store = StateStore::new(0);
        store.record(Family::Ws, 0, payload);
        assert_eq!(store.flush_all(&mut storage), 1);
        engine.stop();
    }

    // Session two: boot replay brings the channel back.
    let mut factory = SimStripFactory::new();
    let mut engine = WsEngine::new();
    engine.start(&cfg, &mut factory).unwrap();
    state::replay(&storage, |family, _, payload| {
        if family == Family::Ws {
            reconcile::apply_ws(&engine, payload).unwrap();
        }
    });

    let st = engine.status(0).unwrap();
    assert_eq!(st.effect.as_str(), "breathe");
    assert_eq!(st.brightness, 90);
    engine.stop();
}

#[test]
fn replay_skips_channels_without_stored_state() {
    let storage = MemStorage::new();
    let mut calls = 0;
    state::replay(&storage, |_, _, _| calls += 1);
    assert_eq!(calls, 0);
}

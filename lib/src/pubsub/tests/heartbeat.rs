use chrono::Duration;

use crate::pubsub::{heartbeat::*, models::*};
use crate::types::*;

use super::*;

fn generator(behavior: HeartbeatBehavior) -> HeartbeatGenerator {
    HeartbeatGenerator::new(Duration::milliseconds(1000), behavior)
}

fn value_of(heartbeat: Option<Heartbeat>) -> DataValue {
    match heartbeat {
        Some(Heartbeat::Value(v)) => v,
        other => panic!("expected a heartbeat value, got {:?}", other),
    }
}

#[test]
fn idle_until_first_value() {
    let mut h = generator(HeartbeatBehavior::WATCHDOG_LKV);
    assert_eq!(h.state(), HeartbeatState::Idle);
    assert!(h.poll(at_ms(5000)).is_none());
}

#[test]
fn watchdog_lkv_fires_once() {
    let mut h = generator(HeartbeatBehavior::WATCHDOG_LKV);
    let v = DataValue::new_at(7i32, t0());
    h.on_value(&v, t0());
    assert_eq!(h.state(), HeartbeatState::Armed);
    assert!(h.poll(at_ms(999)).is_none());
    assert_eq!(value_of(h.poll(at_ms(1000))), v);
    assert_eq!(h.state(), HeartbeatState::Overdue);
    assert!(h.poll(at_ms(2000)).is_none());
    assert!(h.poll(at_ms(10000)).is_none());

    // A real value rearms it
    h.on_value(&DataValue::new_at(8i32, at_ms(10500)), at_ms(10500));
    assert!(h.poll(at_ms(11499)).is_none());
    assert!(h.poll(at_ms(11500)).is_some());
}

#[test]
fn periodic_lkv_fires_every_interval() {
    let mut h = generator(HeartbeatBehavior::PERIODIC_LKV);
    h.on_value(&DataValue::new_at(1i32, t0()), t0());
    for i in 1..=5 {
        assert!(h.poll(at_ms(i * 1000 - 1)).is_none());
        assert!(h.poll(at_ms(i * 1000)).is_some(), "heartbeat {}", i);
    }
    assert_eq!(h.state(), HeartbeatState::Armed);
}

#[test]
fn periodic_skips_missed_intervals() {
    let mut h = generator(HeartbeatBehavior::PERIODIC_LKV);
    h.on_value(&DataValue::new_at(1i32, t0()), t0());
    assert!(h.poll(at_ms(3500)).is_some());
    assert_eq!(h.due(), Some(at_ms(4000)));
}

#[test]
fn watchdog_lkg_needs_good_value() {
    let mut h = generator(HeartbeatBehavior::WATCHDOG_LKG);
    h.on_value(&DataValue::new_status(StatusCode::BadNoCommunication, t0()), t0());
    assert!(h.poll(at_ms(1000)).is_none());

    let good = DataValue::new_at(3i32, at_ms(1100));
    h.on_value(&good, at_ms(1100));
    h.on_value(&DataValue::new_status(StatusCode::BadNoCommunication, at_ms(1200)), at_ms(1200));
    assert_eq!(value_of(h.poll(at_ms(2200))), good);
}

#[test]
fn updated_timestamps() {
    let mut h = generator(HeartbeatBehavior::WATCHDOG_LKV_WITH_UPDATED_TIMESTAMPS);
    h.on_value(&DataValue::new_at(1i32, t0()), t0());
    let v = value_of(h.poll(at_ms(1000)));
    assert_eq!(v.source_timestamp, Some(at_ms(1000)));
    assert_eq!(v.server_timestamp, Some(at_ms(1000)));
    assert_eq!(v.value, Some(Variant::Int32(1)));
}

#[test]
fn diagnostics_only() {
    let mut h = generator(HeartbeatBehavior::WATCHDOG_LKV_DIAGNOSTICS_ONLY);
    h.on_value(&DataValue::new_at(1i32, t0()), t0());
    assert_eq!(h.poll(at_ms(1000)), Some(Heartbeat::Diagnostic));
    assert!(h.poll(at_ms(2000)).is_none());
}

#[test]
fn reset_returns_to_idle() {
    let mut h = generator(HeartbeatBehavior::PERIODIC_LKV);
    h.on_value(&DataValue::new_at(1i32, t0()), t0());
    h.reset();
    assert_eq!(h.state(), HeartbeatState::Idle);
    assert!(h.poll(at_ms(1000)).is_none());
}

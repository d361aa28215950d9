use crate::pubsub::{field_filter::*, models::*};
use crate::types::*;

use super::*;

fn filter(v: PublishedDataSetVariableModel) -> FieldFilter {
    FieldFilter::new(&v).unwrap()
}

#[test]
fn first_value_is_emitted() {
    let mut f = filter(variable("v"));
    let (emit, value) = f.apply(None, DataValue::new_at(1i32, t0()));
    assert!(emit);
    assert_eq!(value.value, Some(Variant::Int32(1)));
}

#[test]
fn status_value_trigger() {
    let mut f = filter(variable("v"));
    let previous = DataValue::new_at(1i32, t0());
    // Same value, newer timestamp
    assert!(!f.apply(Some(&previous), DataValue::new_at(1i32, at_ms(10))).0);
    assert!(f.apply(Some(&previous), DataValue::new_at(2i32, at_ms(10))).0);
    let mut bad = DataValue::new_at(1i32, at_ms(10));
    bad.status = Some(StatusCode::BadNoCommunication);
    assert!(f.apply(Some(&previous), bad).0);
}

#[test]
fn status_trigger_ignores_value() {
    let mut v = variable("v");
    v.data_change_trigger = Some(DataChangeTriggerType::Status);
    let mut f = filter(v);
    let previous = DataValue::new_at(1i32, t0());
    assert!(!f.apply(Some(&previous), DataValue::new_at(2i32, at_ms(10))).0);
    let mut uncertain = DataValue::new_at(1i32, at_ms(10));
    uncertain.status = Some(StatusCode::UncertainLastUsableValue);
    assert!(f.apply(Some(&previous), uncertain).0);
}

#[test]
fn status_value_timestamp_trigger() {
    let mut v = variable("v");
    v.data_change_trigger = Some(DataChangeTriggerType::StatusValueTimestamp);
    let mut f = filter(v);
    let previous = DataValue::new_at(1i32, t0());
    assert!(f.apply(Some(&previous), DataValue::new_at(1i32, at_ms(10))).0);
    assert!(!f.apply(Some(&previous), DataValue::new_at(1i32, t0())).0);
}

#[test]
fn absolute_deadband() {
    let mut v = variable("v");
    v.deadband_type = Some(DeadbandType::Absolute);
    v.deadband_value = Some(0.5);
    let mut f = filter(v);
    let previous = DataValue::new_at(10.0f64, t0());
    assert!(!f.apply(Some(&previous), DataValue::new_at(10.4f64, at_ms(1))).0);
    assert!(!f.apply(Some(&previous), DataValue::new_at(9.6f64, at_ms(1))).0);
    assert!(f.apply(Some(&previous), DataValue::new_at(10.5f64, at_ms(1))).0);
    assert!(f.apply(Some(&previous), DataValue::new_at(9.0f64, at_ms(1))).0);
}

#[test]
fn percent_deadband_uses_range() {
    let mut v = variable("v");
    v.deadband_type = Some(DeadbandType::Percent);
    v.deadband_value = Some(10.0);
    v.engineering_units_range = Some(EngineeringUnitsRange {
        low: 0.0,
        high: 200.0,
    });
    let mut f = filter(v);
    assert_eq!(f.deadband().unwrap().threshold(), 20.0);
    let previous = DataValue::new_at(100i32, t0());
    assert!(!f.apply(Some(&previous), DataValue::new_at(119i32, at_ms(1))).0);
    assert!(f.apply(Some(&previous), DataValue::new_at(120i32, at_ms(1))).0);
}

#[test]
fn percent_deadband_without_range_is_absolute() {
    let mut v = variable("v");
    v.deadband_type = Some(DeadbandType::Percent);
    v.deadband_value = Some(5.0);
    let f = filter(v);
    assert_eq!(f.deadband().unwrap().threshold(), 5.0);
}

#[test]
fn invalid_deadband() {
    let mut v = variable("v");
    v.deadband_type = Some(DeadbandType::Percent);
    v.deadband_value = Some(150.0);
    assert_eq!(
        FieldFilter::new(&v).unwrap_err(),
        StatusCode::BadMonitoredItemFilterInvalid
    );
    v.deadband_type = Some(DeadbandType::Absolute);
    v.deadband_value = Some(-1.0);
    assert!(FieldFilter::new(&v).is_err());
}

#[test]
fn skip_first_only_skips_once() {
    let mut v = variable("v");
    v.skip_first = Some(true);
    let mut f = filter(v);
    assert!(!f.apply(None, DataValue::new_at(1i32, t0())).0);
    assert!(f.apply(None, DataValue::new_at(1i32, at_ms(1))).0);
    f.activate();
    assert!(!f.apply(None, DataValue::new_at(1i32, at_ms(2))).0);
}

#[test]
fn skip_first_wins_over_substitution() {
    let mut v = variable("v");
    v.skip_first = Some(true);
    v.substitute_value = Some(Variant::Int32(-1));
    let mut f = filter(v);
    assert!(!f.apply(None, DataValue::new_status(StatusCode::BadNoCommunication, t0())).0);
}

#[test]
fn substitution_is_always_emitted() {
    let mut v = variable("v");
    v.substitute_value = Some(Variant::Double(0.0));
    v.deadband_type = Some(DeadbandType::Absolute);
    v.deadband_value = Some(100.0);
    let mut f = filter(v);
    let previous = DataValue::new_at(0.0f64, t0());
    let (emit, value) = f.apply(
        Some(&previous),
        DataValue::new_status(StatusCode::BadNoCommunication, at_ms(1)),
    );
    assert!(emit);
    assert_eq!(value.value, Some(Variant::Double(0.0)));
    assert_eq!(value.status, Some(StatusCode::UncertainSubstituteValue));
}

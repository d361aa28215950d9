use std::str::FromStr;

use chrono::Duration;

use crate::types::*;

#[test]
fn date_time_ticks() {
    let epoch = DateTime::epoch();
    assert!(epoch.is_null());
    assert_eq!(epoch.ticks(), 0);

    let dt = DateTime::ymd_hms(2000, 1, 1, 0, 0, 0);
    let ticks = dt.ticks();
    assert_eq!(DateTime::from(ticks), dt);

    let later = dt + Duration::milliseconds(1500);
    assert_eq!(later.ticks() - ticks, 15_000_000);
    assert_eq!(later - dt, Duration::milliseconds(1500));
    assert!(later > dt);
}

#[test]
fn date_time_precision() {
    // Sub-tick nanos are truncated
    let dt = DateTime::ymd_hms(2020, 3, 24, 23, 30, 55) + Duration::nanoseconds(123_456_789);
    assert_eq!(dt.as_chrono().timestamp_subsec_nanos(), 123_456_700);
}

#[test]
fn date_time_string() {
    let dt = DateTime::from_str("2020-03-24T23:30:55.9891469Z").unwrap();
    assert_eq!(dt.to_string(), "2020-03-24T23:30:55.989146900Z");
    assert_eq!(DateTime::from_str(&dt.to_string()).unwrap(), dt);
    assert!(DateTime::from_str("yesterday").is_err());

    let json = serde_json::to_string(&dt).unwrap();
    assert_eq!(serde_json::from_str::<DateTime>(&json).unwrap(), dt);
}

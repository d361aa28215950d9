// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `DateTime`.

use std::{
    cmp::Ordering,
    fmt,
    io::{Read, Write},
    ops::{Add, Sub},
    str::FromStr,
};

use chrono::{Duration, SecondsFormat, TimeZone, Timelike, Utc};
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

use crate::types::encoding::*;

const NANOS_PER_SECOND: i64 = 1_000_000_000;
const NANOS_PER_TICK: i64 = 100;
const TICKS_PER_SECOND: i64 = NANOS_PER_SECOND / NANOS_PER_TICK;

const MIN_YEAR: i32 = 1601;

pub type DateTimeUtc = chrono::DateTime<Utc>;

/// A date/time value. This is a wrapper around the chrono type holding 100 nanosecond (tick)
/// precision, the resolution of the OPC UA binary encoding.
#[derive(PartialEq, Eq, Debug, Clone, Copy, Hash)]
pub struct DateTime {
    date_time: DateTimeUtc,
}

/// Serialized as an ISO 8601 string, the form used by the JSON message mapping
impl Serialize for DateTime {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for DateTime {
    fn deserialize<D>(deserializer: D) -> Result<DateTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        DateTime::from_str(&s).map_err(|_| D::Error::custom("Cannot parse date time"))
    }
}

/// DateTime encoded as 64-bit signed int
impl BinaryEncoder<DateTime> for DateTime {
    fn byte_len(&self) -> usize {
        8
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_i64(stream, self.ticks())
    }

    fn decode<S: Read>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        Ok(DateTime::from(read_i64(stream)?))
    }
}

impl Default for DateTime {
    fn default() -> Self {
        DateTime::epoch()
    }
}

impl Add<Duration> for DateTime {
    type Output = Self;

    fn add(self, duration: Duration) -> Self {
        DateTime::from(self.date_time + duration)
    }
}

impl Sub<DateTime> for DateTime {
    type Output = Duration;

    fn sub(self, other: Self) -> Duration {
        self.date_time - other.date_time
    }
}

impl Sub<Duration> for DateTime {
    type Output = Self;

    fn sub(self, duration: Duration) -> Self {
        DateTime::from(self.date_time - duration)
    }
}

impl PartialOrd for DateTime {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for DateTime {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date_time.cmp(&other.date_time)
    }
}

impl From<DateTimeUtc> for DateTime {
    fn from(date_time: DateTimeUtc) -> Self {
        // Truncate to tick precision so binary and JSON encodings agree
        let nanos = (date_time.nanosecond() / NANOS_PER_TICK as u32) * NANOS_PER_TICK as u32;
        let date_time = date_time.with_nanosecond(nanos).unwrap_or(date_time);
        DateTime { date_time }
    }
}

impl From<i64> for DateTime {
    fn from(ticks: i64) -> Self {
        let secs = ticks.div_euclid(TICKS_PER_SECOND);
        let nanos = ticks.rem_euclid(TICKS_PER_SECOND) * NANOS_PER_TICK;
        let duration = Duration::seconds(secs) + Duration::nanoseconds(nanos);
        Self::from(Self::epoch_chrono() + duration)
    }
}

impl From<DateTime> for DateTimeUtc {
    fn from(value: DateTime) -> Self {
        value.date_time
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{}",
            self.date_time.to_rfc3339_opts(SecondsFormat::AutoSi, true)
        )
    }
}

impl FromStr for DateTime {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        chrono::DateTime::parse_from_rfc3339(s)
            .map(|dt| DateTime::from(dt.with_timezone(&Utc)))
            .map_err(|e| {
                error!("Cannot parse date {}, error = {}", s, e);
            })
    }
}

impl DateTime {
    /// Constructs from the current time
    pub fn now() -> DateTime {
        DateTime::from(Utc::now())
    }

    /// Constructs a date time for the epoch
    pub fn epoch() -> DateTime {
        DateTime::from(Self::epoch_chrono())
    }

    /// Tests if the date time is null (i.e. equal to epoch)
    pub fn is_null(&self) -> bool {
        self.ticks() == 0
    }

    /// Constructs from a year, month, day, hour, minute, second. Out of range values give the epoch.
    pub fn ymd_hms(year: i32, month: u32, day: u32, hour: u32, minute: u32, second: u32) -> DateTime {
        Utc.with_ymd_and_hms(year, month, day, hour, minute, second)
            .single()
            .map(DateTime::from)
            .unwrap_or_default()
    }

    /// Returns the time in ticks, of 100 nanosecond intervals since the OPC UA epoch
    pub fn ticks(&self) -> i64 {
        let duration = self.date_time.signed_duration_since(Self::epoch_chrono());
        // Asking for the whole duration in nanos overflows, so seconds and nanos are split
        let seconds_part = Duration::seconds(duration.num_seconds());
        let nanos = (duration - seconds_part).num_nanoseconds().unwrap_or(0);
        seconds_part.num_seconds() * TICKS_PER_SECOND + nanos / NANOS_PER_TICK
    }

    /// Time as chrono
    pub fn as_chrono(&self) -> DateTimeUtc {
        self.date_time
    }

    /// The OPC UA epoch - Jan 1 1601 00:00:00
    fn epoch_chrono() -> DateTimeUtc {
        Utc.with_ymd_and_hms(MIN_YEAR, 1, 1, 0, 0, 0)
            .single()
            .unwrap_or(chrono::DateTime::<Utc>::MIN_UTC)
    }
}

// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{fmt, str::FromStr, time::Duration};

use crate::error::PublisherError;

/// A time span written as `[d.]hh:mm:ss[.fffffff]`, e.g. `00:00:01.500`
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct Timespan(pub Duration);

impl From<Duration> for Timespan {
    fn from(value: Duration) -> Self {
        Timespan(value)
    }
}

impl From<Timespan> for Duration {
    fn from(value: Timespan) -> Self {
        value.0
    }
}

impl fmt::Display for Timespan {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.0.as_secs();
        let days = total / 86_400;
        let hours = (total % 86_400) / 3600;
        let minutes = (total % 3600) / 60;
        let seconds = total % 60;
        if days > 0 {
            write!(f, "{}.", days)?;
        }
        write!(f, "{:02}:{:02}:{:02}", hours, minutes, seconds)?;
        let millis = self.0.subsec_millis();
        if millis > 0 {
            write!(f, ".{:03}", millis)?;
        }
        Ok(())
    }
}

impl FromStr for Timespan {
    type Err = PublisherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PublisherError::InvalidConfiguration(format!("{} is not a timespan", s));
        let parts: Vec<&str> = s.trim().split(':').collect();
        if parts.len() != 3 {
            return Err(invalid());
        }
        let (days, hours) = match parts[0].split_once('.') {
            Some((d, h)) => (d.parse::<u64>().map_err(|_| invalid())?, h),
            None => (0, parts[0]),
        };
        let hours = hours.parse::<u64>().map_err(|_| invalid())?;
        let minutes = parts[1].parse::<u64>().map_err(|_| invalid())?;
        let (seconds, fraction) = match parts[2].split_once('.') {
            Some((s, f)) => (s, Some(f)),
            None => (parts[2], None),
        };
        let seconds = seconds.parse::<u64>().map_err(|_| invalid())?;
        if minutes > 59 || seconds > 59 {
            return Err(invalid());
        }
        let nanos = match fraction {
            Some(f) if !f.is_empty() && f.len() <= 9 && f.chars().all(|c| c.is_ascii_digit()) => {
                // Right pad to nanosecond precision
                format!("{:0<9}", f).parse::<u32>().map_err(|_| invalid())?
            }
            Some(_) => return Err(invalid()),
            None => 0,
        };
        let secs = days * 86_400 + hours * 3600 + minutes * 60 + seconds;
        Ok(Timespan(Duration::new(secs, nanos)))
    }
}

impl serde::Serialize for Timespan {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> serde::Deserialize<'de> for Timespan {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = <String as serde::Deserialize>::deserialize(deserializer)?;
        Timespan::from_str(&s).map_err(serde::de::Error::custom)
    }
}

impl Timespan {
    pub fn from_millis(millis: u64) -> Timespan {
        Timespan(Duration::from_millis(millis))
    }

    pub fn as_duration(&self) -> Duration {
        self.0
    }
}

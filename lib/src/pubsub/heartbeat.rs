// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Synthetic values for fields whose source has gone quiet.

use chrono::Duration;

use crate::pubsub::models::HeartbeatBehavior;
use crate::types::*;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum HeartbeatState {
    /// No value seen yet
    Idle,
    /// Timer running since the last real value
    Armed,
    /// Timer expired and no real value since
    Overdue,
}

/// What a heartbeat produces when it fires
#[derive(Debug, Clone, PartialEq)]
pub enum Heartbeat {
    Value(DataValue),
    /// Counted in diagnostics only
    Diagnostic,
}

#[derive(Debug)]
pub struct HeartbeatGenerator {
    interval: Duration,
    behavior: HeartbeatBehavior,
    state: HeartbeatState,
    due: Option<DateTime>,
    last_value: Option<DataValue>,
    last_good_value: Option<DataValue>,
}

impl HeartbeatGenerator {
    pub fn new(interval: Duration, behavior: HeartbeatBehavior) -> HeartbeatGenerator {
        HeartbeatGenerator {
            interval,
            behavior,
            state: HeartbeatState::Idle,
            due: None,
            last_value: None,
            last_good_value: None,
        }
    }

    pub fn state(&self) -> HeartbeatState {
        self.state
    }

    pub fn behavior(&self) -> HeartbeatBehavior {
        self.behavior
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// When the heartbeat fires next, if armed
    pub fn due(&self) -> Option<DateTime> {
        self.due
    }

    /// A real value was reported, restart the timer
    pub fn on_value(&mut self, value: &DataValue, now: DateTime) {
        if value.is_good() {
            self.last_good_value = Some(value.clone());
        }
        self.last_value = Some(value.clone());
        self.state = HeartbeatState::Armed;
        self.due = Some(now + self.interval);
    }

    /// Forget everything, as after the writer restarted
    pub fn reset(&mut self) {
        self.state = HeartbeatState::Idle;
        self.due = None;
        self.last_value = None;
        self.last_good_value = None;
    }

    /// Fires the heartbeat if it is due
    pub fn poll(&mut self, now: DateTime) -> Option<Heartbeat> {
        if self.state != HeartbeatState::Armed || self.interval <= Duration::zero() {
            return None;
        }
        let due = self.due?;
        if due > now {
            return None;
        }

        if self.behavior.is_periodic() {
            // Keep the cadence of the original arming, skipping intervals missed entirely
            let mut next = due + self.interval;
            while next <= now {
                next = next + self.interval;
            }
            self.due = Some(next);
        } else {
            self.state = HeartbeatState::Overdue;
            self.due = None;
        }

        if self.behavior.is_diagnostics_only() {
            return Some(Heartbeat::Diagnostic);
        }

        let source = if self.behavior.is_last_known_good() {
            self.last_good_value.as_ref()
        } else {
            self.last_value.as_ref()
        };
        let mut value = source?.clone();
        if self.behavior.updates_timestamps() {
            value.source_timestamp = Some(now);
            value.source_picoseconds = None;
            value.server_timestamp = Some(now);
            value.server_picoseconds = None;
        }
        Some(Heartbeat::Value(value))
    }
}

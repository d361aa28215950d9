// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Plain enumerations of the schema. Each serializes as its canonical name.

use std::fmt;

/// Which changes of a monitored value trigger a notification
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataChangeTriggerType {
    /// Only a change of the status code
    Status,
    /// A change of value or status code
    #[default]
    StatusValue,
    /// A change of value, status code or source timestamp
    StatusValueTimestamp,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DeadbandType {
    Absolute,
    Percent,
}

/// Order of data set messages within a network message
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataSetOrderingType {
    #[default]
    Undefined,
    AscendingWriterId,
    AscendingWriterIdSingle,
}

/// When a subscription counts as late given the state of its monitored items
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MonitoredItemWatchdogCondition {
    #[default]
    WhenAllAreLate,
    WhenAnyIsLate,
}

/// What happens when a subscription watchdog trips
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SubscriptionWatchdogBehavior {
    /// Log and count
    #[default]
    Diagnostic,
    /// Recreate the subscription and restart the writer
    Reset,
    /// Abort the process
    FailFast,
    /// Exit the process with a fixed exit code
    ExitProcess,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum MonitoringMode {
    Disabled,
    Sampling,
    #[default]
    Reporting,
}

/// Lifecycle transitions announced to the event target
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RuntimeStateEventType {
    RestartAnnouncement,
    Running,
    ShutdownAnnouncement,
    Stopped,
}

/// Delivery guarantee requested from the broker
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BrokerTransportQualityOfService {
    #[default]
    NotSpecified,
    BestEffort,
    AtLeastOnce,
    AtMostOnce,
    ExactlyOnce,
}

/// Where periodic diagnostics are written
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DiagnosticsTarget {
    #[default]
    Log,
    Events,
}

macro_rules! display_as_debug {
    ($($t:ty),*) => {
        $(
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                fmt::Debug::fmt(self, f)
            }
        }
        )*
    };
}

display_as_debug!(
    DataChangeTriggerType,
    DeadbandType,
    DataSetOrderingType,
    MonitoredItemWatchdogCondition,
    SubscriptionWatchdogBehavior,
    MonitoringMode,
    RuntimeStateEventType,
    BrokerTransportQualityOfService,
    DiagnosticsTarget
);

// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Diagnostics snapshots and runtime lifecycle events.

use crate::types::*;

use super::*;

/// Version of the runtime state event layout
pub const RUNTIME_STATE_EVENT_VERSION: u32 = 1;

/// Snapshot of the counters of one writer group
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct WriterGroupDiagnosticModel {
    pub writer_group_id: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub writer_group_name: Option<String>,
    /// When the snapshot was taken
    pub timestamp: DateTime,
    /// When counting started
    pub ingestion_start: DateTime,
    /// Seconds between start and the snapshot
    pub ingestion_duration: f64,
    /// Notifications delivered to the writers
    pub ingress_data_changes: u64,
    /// Values within the notifications
    pub ingress_value_changes: u64,
    pub ingress_events: u64,
    pub ingress_event_notifications: u64,
    /// Values suppressed by trigger, deadband or skip first
    pub ingress_filtered: u64,
    pub ingress_heartbeats: u64,
    /// Heartbeats counted instead of sent
    pub ingress_diagnostic_heartbeats: u64,
    pub ingress_data_changes_per_sec: f64,
    /// Data set messages packed into network messages
    pub encoder_notifications_processed: u64,
    /// Data set messages or fields that could not be sent
    pub encoder_notifications_dropped: u64,
    pub encoder_network_messages_processed: u64,
    pub encoder_meta_data_messages_processed: u64,
    pub encoder_errors: u64,
    /// Worst observed fraction of data set messages that had to be split
    pub encoder_max_message_split_ratio: f64,
    pub encoder_avg_notifications_message: f64,
    pub encoder_avg_message_body_size: f64,
    /// Encoded messages waiting for the sink
    pub outgress_input_buffer_count: u64,
    /// Encoded messages dropped because the outbound queue was full
    pub outgress_input_buffer_dropped: u64,
    pub outgress_message_count: u64,
    /// Messages the sink refused
    pub outgress_message_dropped: u64,
    pub sent_messages_per_sec: f64,
    pub writers_in_error: u64,
    pub watchdog_late_monitored_items: u64,
    pub watchdog_subscription_trips: u64,
    pub watchdog_resets: u64,
}

/// Announces a lifecycle transition of the publisher
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct RuntimeStateEventModel {
    pub message_type: RuntimeStateEventType,
    pub message_version: u32,
    pub timestamp_utc: DateTime,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub publisher_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub version: Option<String>,
}

impl RuntimeStateEventModel {
    pub fn new(message_type: RuntimeStateEventType, publisher_id: &str, now: DateTime) -> Self {
        Self {
            message_type,
            message_version: RUNTIME_STATE_EVENT_VERSION,
            timestamp_utc: now,
            publisher_id: Some(publisher_id.to_string()),
            version: Some(env!("CARGO_PKG_VERSION").to_string()),
        }
    }
}

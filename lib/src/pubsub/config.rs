// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Publisher configuration, usually loaded from a YAML file.

use std::collections::HashSet;

use crate::core::config::Config;
use crate::pubsub::{data_set_writer::WriterDefaults, models::*};

/// Default interval between diagnostics reports in milliseconds
pub const DEFAULT_DIAGNOSTICS_INTERVAL: u64 = 60_000;

#[derive(Debug, PartialEq, Serialize, Deserialize, Clone)]
pub struct PublisherConfig {
    /// Identifies the publisher in network messages and topics
    pub publisher_id: String,
    #[serde(default)]
    pub writer_groups: Vec<WriterGroupModel>,
    /// Interval between diagnostics reports in milliseconds, zero disables them
    #[serde(default = "default_diagnostics_interval")]
    pub diagnostics_interval_ms: u64,
    #[serde(default)]
    pub diagnostics_target: DiagnosticsTarget,
    /// Topic runtime state events and diagnostics events are published to
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub events_topic: Option<String>,
    /// Heartbeat interval of fields that do not set one, in milliseconds
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_heartbeat_interval_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_heartbeat_behavior: Option<HeartbeatBehavior>,
    /// Watchdog of writers that do not configure one
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_watchdog: Option<WatchdogSettingsModel>,
}

fn default_diagnostics_interval() -> u64 {
    DEFAULT_DIAGNOSTICS_INTERVAL
}

impl Default for PublisherConfig {
    fn default() -> Self {
        Self {
            publisher_id: "OPCUARustPublisher".into(),
            writer_groups: Vec::new(),
            diagnostics_interval_ms: DEFAULT_DIAGNOSTICS_INTERVAL,
            diagnostics_target: DiagnosticsTarget::default(),
            events_topic: None,
            default_heartbeat_interval_ms: None,
            default_heartbeat_behavior: None,
            default_watchdog: None,
        }
    }
}

impl Config for PublisherConfig {
    fn is_valid(&self) -> bool {
        let mut valid = true;
        if self.publisher_id.is_empty() {
            error!("Publisher id is empty");
            valid = false;
        }
        let mut group_ids = HashSet::new();
        for group in &self.writer_groups {
            if !group_ids.insert(group.writer_group_id) {
                error!("Writer group id {} is used more than once", group.writer_group_id);
                valid = false;
            }
            let encoding = group.message_encoding().base();
            if encoding.bits().count_ones() != 1 {
                error!(
                    "Writer group {} must use exactly one message encoding, not {}",
                    group.writer_group_id,
                    group.message_encoding()
                );
                valid = false;
            }
            if group.use_array_envelope()
                && !matches!(encoding, MessageEncoding::JSON | MessageEncoding::XML)
            {
                error!(
                    "Writer group {} uses an array envelope, which {} does not support",
                    group.writer_group_id, encoding
                );
                valid = false;
            }
            let mut writer_ids = HashSet::new();
            for writer in &group.data_set_writers {
                if !writer_ids.insert(writer.data_set_writer_id) {
                    error!(
                        "Data set writer id {} is used more than once in writer group {}",
                        writer.data_set_writer_id, group.writer_group_id
                    );
                    valid = false;
                }
            }
        }
        valid
    }
}

impl PublisherConfig {
    pub fn new<S>(publisher_id: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            publisher_id: publisher_id.into(),
            ..Default::default()
        }
    }

    pub fn events_topic(&self) -> String {
        self.events_topic
            .clone()
            .unwrap_or_else(|| format!("{}/events", self.publisher_id))
    }

    pub fn writer_defaults(&self) -> WriterDefaults {
        WriterDefaults {
            heartbeat_interval: self.default_heartbeat_interval_ms,
            heartbeat_behavior: self.default_heartbeat_behavior,
            watchdog: self.default_watchdog.clone(),
        }
    }
}

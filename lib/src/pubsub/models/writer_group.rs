// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Writer and writer group configuration.

use std::time::Duration;

use super::*;

/// Default publishing interval of a writer group in milliseconds
pub const DEFAULT_PUBLISHING_INTERVAL: u64 = 1000;
/// Default maximum encoded size of a network message in bytes
pub const DEFAULT_MAX_NETWORK_MESSAGE_SIZE: u32 = 256 * 1024;
/// Default capacity of the outbound queue of a writer group
pub const DEFAULT_PUBLISH_QUEUE_SIZE: u32 = 4096;

/// Settings of the queue or topic messages are published to
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PublishingQueueSettingsModel {
    /// Topic or queue name
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub queue_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub requested_delivery_guarantee: Option<BrokerTransportQualityOfService>,
    /// Time to live of messages in milliseconds
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub ttl: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub retain: Option<bool>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct DataSetWriterMessageSettingsModel {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_set_message_content_mask: Option<DataSetMessageContentFlags>,
}

/// Watchdog settings of the subscription behind a writer
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct WatchdogSettingsModel {
    /// Time without notification after which a monitored item is late, in milliseconds
    pub monitored_item_watchdog_timeout: u64,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub monitored_item_watchdog_condition: Option<MonitoredItemWatchdogCondition>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub watchdog_behavior: Option<SubscriptionWatchdogBehavior>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct DataSetWriterModel {
    /// Numeric id, unique within the writer group
    pub data_set_writer_id: u16,
    /// String id of the writer
    pub id: String,
    /// The published data set. A writer without one is in error state.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_set: Option<PublishedDataSetModel>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_set_field_content_mask: Option<DataSetFieldContentFlags>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message_settings: Option<DataSetWriterMessageSettingsModel>,
    /// Every Nth publishing cycle is a key frame. Zero or unset never forces one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key_frame_count: Option<u32>,
    /// Interval in milliseconds between metadata messages. Zero sends metadata on change only,
    /// unset never sends metadata.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub meta_data_update_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub watchdog: Option<WatchdogSettingsModel>,
    /// Endpoint the data is read from, published with the EndpointUrl field flag
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub endpoint_url: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub application_uri: Option<String>,
    /// Subscription id assigned by the subscription layer
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub subscription_id: Option<u32>,
}

impl DataSetWriterModel {
    pub fn field_content_mask(&self) -> DataSetFieldContentFlags {
        self.data_set_field_content_mask.unwrap_or_default()
    }

    pub fn message_content_mask(&self) -> DataSetMessageContentFlags {
        self.message_settings
            .as_ref()
            .and_then(|s| s.data_set_message_content_mask)
            .unwrap_or_default()
    }

    pub fn name(&self) -> String {
        self.data_set
            .as_ref()
            .and_then(|d| d.name.clone())
            .unwrap_or_else(|| self.id.clone())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct WriterGroupMessageSettingsModel {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub network_message_content_mask: Option<NetworkMessageContentFlags>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_set_ordering: Option<DataSetOrderingType>,
    /// Wrap the network messages of a cycle into one array
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub use_array_envelope: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub group_version: Option<u32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct WriterGroupModel {
    pub writer_group_id: u16,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data_set_writers: Vec<DataSetWriterModel>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message_type: Option<MessageEncoding>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub message_settings: Option<WriterGroupMessageSettingsModel>,
    /// Publishing interval in milliseconds
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub publishing_interval: Option<u64>,
    /// Publishing interval as a timespan, takes precedence over `publishing_interval`
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub publishing_interval_timespan: Option<Timespan>,
    /// Keep alive time in milliseconds
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub keep_alive_time: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub max_network_message_size: Option<u32>,
    /// Number of pending notifications that triggers an early publish
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub notification_publish_threshold: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub publish_queue_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub publishing_queue: Option<PublishingQueueSettingsModel>,
}

impl WriterGroupModel {
    pub fn name(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("WriterGroup{}", self.writer_group_id))
    }

    pub fn message_encoding(&self) -> MessageEncoding {
        self.message_type.unwrap_or_default()
    }

    pub fn network_message_content_mask(&self) -> NetworkMessageContentFlags {
        self.message_settings
            .as_ref()
            .and_then(|s| s.network_message_content_mask)
            .unwrap_or_default()
    }

    pub fn data_set_ordering(&self) -> DataSetOrderingType {
        self.message_settings
            .as_ref()
            .and_then(|s| s.data_set_ordering)
            .unwrap_or_default()
    }

    pub fn use_array_envelope(&self) -> bool {
        self.message_settings
            .as_ref()
            .and_then(|s| s.use_array_envelope)
            .unwrap_or(false)
    }

    pub fn group_version(&self) -> u32 {
        self.message_settings
            .as_ref()
            .and_then(|s| s.group_version)
            .unwrap_or(0)
    }

    /// The effective publishing interval. The timespan wins when both forms are set.
    pub fn publishing_interval(&self) -> Duration {
        match (self.publishing_interval_timespan, self.publishing_interval) {
            (Some(timespan), Some(millis)) => {
                if timespan.as_duration() != Duration::from_millis(millis) {
                    warn!(
                        "Writer group {} sets publishing interval {}ms and timespan {}, using the timespan",
                        self.writer_group_id, millis, timespan
                    );
                }
                timespan.as_duration()
            }
            (Some(timespan), None) => timespan.as_duration(),
            (None, Some(millis)) => Duration::from_millis(millis),
            (None, None) => Duration::from_millis(DEFAULT_PUBLISHING_INTERVAL),
        }
    }

    pub fn keep_alive_time(&self) -> Option<Duration> {
        self.keep_alive_time
            .filter(|t| *t > 0)
            .map(Duration::from_millis)
    }

    pub fn max_network_message_size(&self) -> usize {
        self.max_network_message_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_MAX_NETWORK_MESSAGE_SIZE) as usize
    }

    pub fn notification_publish_threshold(&self) -> usize {
        self.notification_publish_threshold.unwrap_or(0) as usize
    }

    pub fn publish_queue_size(&self) -> usize {
        self.publish_queue_size
            .filter(|s| *s > 0)
            .unwrap_or(DEFAULT_PUBLISH_QUEUE_SIZE) as usize
    }
}

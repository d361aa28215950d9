// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Published data set configuration. Optional members are present-if-set: an unset member is
//! omitted from the serialized form rather than written as null.

use std::collections::BTreeMap;

use crate::types::*;

use super::*;

/// Engineering units range of an analog item, used by percent deadband
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EngineeringUnitsRange {
    pub low: f64,
    pub high: f64,
}

impl EngineeringUnitsRange {
    pub fn span(&self) -> f64 {
        (self.high - self.low).abs()
    }
}

/// A variable published as one field of a data set, together with its sampling policy
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedDataSetVariableModel {
    /// Identifier of the field within the data set
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    /// Node id of the variable
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub published_variable_node_id: Option<String>,
    /// Browse path from the node to the actual variable
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub browse_path: Option<Vec<String>>,
    /// Attribute to monitor, Value when unset
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub attribute: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub index_range: Option<String>,
    /// Sampling interval hint in milliseconds
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub sampling_interval_hint: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_change_trigger: Option<DataChangeTriggerType>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deadband_type: Option<DeadbandType>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub deadband_value: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub engineering_units_range: Option<EngineeringUnitsRange>,
    /// Heartbeat interval in milliseconds
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub heartbeat_interval: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub heartbeat_behavior: Option<HeartbeatBehavior>,
    /// Suppress the first value reported after activation
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub skip_first: Option<bool>,
    /// Value reported in place of a bad or empty read
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub substitute_value: Option<Variant>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub monitoring_mode: Option<MonitoringMode>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub queue_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub discard_new: Option<bool>,
    /// Ids of fields reported whenever this field reports
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub triggering: Option<Vec<String>>,
    /// Promote the field into the network message header
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub promoted: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub published_variable_display_name: Option<String>,
}

impl PublishedDataSetVariableModel {
    pub fn new<S>(id: S, node_id: S) -> Self
    where
        S: Into<String>,
    {
        Self {
            id: Some(id.into()),
            published_variable_node_id: Some(node_id.into()),
            ..Default::default()
        }
    }

    /// The name of the field in the payload: display name, else id, else node id
    pub fn field_name(&self) -> String {
        self.published_variable_display_name
            .as_ref()
            .or(self.id.as_ref())
            .or(self.published_variable_node_id.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    /// The key notifications are addressed to: id, else node id
    pub fn field_id(&self) -> String {
        self.id
            .as_ref()
            .or(self.published_variable_node_id.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

/// An event notifier published as a data set, one message per event
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedDataSetEventModel {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub event_notifier: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub browse_path: Option<Vec<String>>,
    /// Names of the selected event fields, in payload order
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub selected_fields: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub type_definition_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub queue_size: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub published_event_name: Option<String>,
}

impl PublishedDataSetEventModel {
    pub fn field_id(&self) -> String {
        self.id
            .as_ref()
            .or(self.event_notifier.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

/// A method call whose results are published as a field
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedDataSetMethodModel {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub object_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub method_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub input_arguments: Option<Vec<Variant>>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub published_method_display_name: Option<String>,
}

impl PublishedDataSetMethodModel {
    pub fn field_name(&self) -> String {
        self.published_method_display_name
            .as_ref()
            .or(self.id.as_ref())
            .or(self.method_id.as_ref())
            .cloned()
            .unwrap_or_default()
    }

    pub fn field_id(&self) -> String {
        self.id
            .as_ref()
            .or(self.method_id.as_ref())
            .cloned()
            .unwrap_or_default()
    }
}

/// The source of a published data set. Exactly one kind of source is set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub enum PublishedDataSetSource {
    PublishedVariables(Vec<PublishedDataSetVariableModel>),
    PublishedEvents(Vec<PublishedDataSetEventModel>),
    PublishedMethods(Vec<PublishedDataSetMethodModel>),
}

impl Default for PublishedDataSetSource {
    fn default() -> Self {
        PublishedDataSetSource::PublishedVariables(Vec::new())
    }
}

impl PublishedDataSetSource {
    pub fn is_empty(&self) -> bool {
        match self {
            PublishedDataSetSource::PublishedVariables(v) => v.is_empty(),
            PublishedDataSetSource::PublishedEvents(v) => v.is_empty(),
            PublishedDataSetSource::PublishedMethods(v) => v.is_empty(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "PascalCase")]
pub struct PublishedDataSetModel {
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub name: Option<String>,
    #[serde(default)]
    pub data_set_source: PublishedDataSetSource,
    /// Constant fields appended to every message when the field content mask asks for them
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub extension_fields: Option<BTreeMap<String, Variant>>,
    /// Send a keep alive data set message when nothing changed
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub send_keep_alive: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_set_class_id: Option<Guid>,
}

// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::{fmt, str::FromStr, sync::Arc};

use crate::error::PublisherError;
use crate::pubsub::{meta_data::*, models::*};
use crate::types::*;

/// Message type strings of network and data set messages
pub mod message_type {
    pub const DATA: &str = "ua-data";
    pub const META_DATA: &str = "ua-metadata";
    pub const KEY_FRAME: &str = "ua-keyframe";
    pub const DELTA_FRAME: &str = "ua-deltaframe";
    pub const EVENT: &str = "ua-event";
    pub const KEEP_ALIVE: &str = "ua-keepalive";
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum DataSetMessageType {
    /// Every field of the data set
    KeyFrame,
    /// Only the fields that changed
    DeltaFrame,
    Event,
    /// No fields, signals the writer is alive
    KeepAlive,
}

impl DataSetMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DataSetMessageType::KeyFrame => message_type::KEY_FRAME,
            DataSetMessageType::DeltaFrame => message_type::DELTA_FRAME,
            DataSetMessageType::Event => message_type::EVENT,
            DataSetMessageType::KeepAlive => message_type::KEEP_ALIVE,
        }
    }
}

impl fmt::Display for DataSetMessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DataSetMessageType {
    type Err = PublisherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            message_type::KEY_FRAME => Ok(DataSetMessageType::KeyFrame),
            message_type::DELTA_FRAME => Ok(DataSetMessageType::DeltaFrame),
            message_type::EVENT => Ok(DataSetMessageType::Event),
            message_type::KEEP_ALIVE => Ok(DataSetMessageType::KeepAlive),
            s => Err(PublisherError::Decoding(format!(
                "{} is not a data set message type",
                s
            ))),
        }
    }
}

/// One field of a data set message
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataSetField {
    /// Position of the field in the data set
    pub index: u16,
    pub name: String,
    pub value: DataValue,
    pub node_id: Option<String>,
    pub display_name: Option<String>,
    pub subscription_id: Option<u32>,
    /// Also carried in the network message header
    pub promoted: bool,
}

impl DataSetField {
    pub fn new<S>(index: u16, name: S, value: DataValue) -> Self
    where
        S: Into<String>,
    {
        Self {
            index,
            name: name.into(),
            value,
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Fields(Vec<DataSetField>),
    /// A single field data set degraded to its bare value
    Value(DataSetField),
}

impl Default for Payload {
    fn default() -> Self {
        Payload::Fields(Vec::new())
    }
}

impl Payload {
    pub fn fields(&self) -> &[DataSetField] {
        match self {
            Payload::Fields(fields) => fields,
            Payload::Value(field) => std::slice::from_ref(field),
        }
    }

    pub fn len(&self) -> usize {
        self.fields().len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields().is_empty()
    }
}

/// One data set's values for one publishing cycle. Never changed once created.
#[derive(Debug, Clone, PartialEq)]
pub struct DataSetMessage {
    pub data_set_writer_id: u16,
    pub data_set_writer_name: String,
    pub sequence_number: u32,
    pub message_type: DataSetMessageType,
    pub timestamp: DateTime,
    pub picoseconds: u16,
    /// Worst status of the fields
    pub status: StatusCode,
    pub meta_data_version: ConfigurationVersion,
    pub field_content_mask: DataSetFieldContentFlags,
    pub message_content_mask: DataSetMessageContentFlags,
    pub payload: Payload,
    pub endpoint_url: Option<String>,
    pub application_uri: Option<String>,
    /// Layout of the data set, needed by schema based encodings
    pub meta_data: Option<Arc<DataSetMetaData>>,
}

impl Default for DataSetMessage {
    fn default() -> Self {
        Self {
            data_set_writer_id: 0,
            data_set_writer_name: String::new(),
            sequence_number: 0,
            message_type: DataSetMessageType::KeyFrame,
            timestamp: DateTime::epoch(),
            picoseconds: 0,
            status: StatusCode::Good,
            meta_data_version: ConfigurationVersion::default(),
            field_content_mask: DataSetFieldContentFlags::default(),
            message_content_mask: DataSetMessageContentFlags::default(),
            payload: Payload::default(),
            endpoint_url: None,
            application_uri: None,
            meta_data: None,
        }
    }
}

impl DataSetMessage {
    /// A copy of this message carrying only the supplied fields
    pub fn with_fields(&self, fields: Vec<DataSetField>) -> DataSetMessage {
        DataSetMessage {
            status: worst_status(fields.iter().map(|f| f.value.status())),
            payload: Payload::Fields(fields),
            ..self.clone()
        }
    }
}

/// The worst of the status codes, bad before uncertain before good
pub fn worst_status<I>(statuses: I) -> StatusCode
where
    I: IntoIterator<Item = StatusCode>,
{
    let mut worst = StatusCode::Good;
    for status in statuses {
        if status.is_bad() {
            return status;
        } else if status.is_uncertain() && worst.is_good() {
            worst = status;
        }
    }
    worst
}

// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

use std::sync::Arc;

use crate::pubsub::{data_set_message::*, meta_data::*, models::*};
use crate::types::*;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NetworkMessageType {
    Data,
    MetaData,
}

impl NetworkMessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkMessageType::Data => message_type::DATA,
            NetworkMessageType::MetaData => message_type::META_DATA,
        }
    }
}

/// The metadata of one writer, carried by a `ua-metadata` network message
#[derive(Debug, Clone, PartialEq)]
pub struct DataSetMetaDataMessage {
    pub data_set_writer_id: u16,
    pub data_set_writer_name: String,
    pub meta_data: Arc<DataSetMetaData>,
}

/// The outermost envelope, holding the data set messages of a writer group.
#[derive(Debug, Clone, PartialEq)]
pub struct NetworkMessage {
    pub message_id: Guid,
    pub message_type: NetworkMessageType,
    pub publisher_id: String,
    pub writer_group_id: u16,
    pub writer_group_name: String,
    pub group_version: u32,
    pub network_message_number: u16,
    pub sequence_number: u16,
    pub timestamp: DateTime,
    pub picoseconds: u16,
    pub data_set_class_id: Option<Guid>,
    pub content_mask: NetworkMessageContentFlags,
    pub messages: Vec<DataSetMessage>,
    /// Only set when the message carries a single data set message
    pub promoted_fields: Vec<DataSetField>,
    pub meta_data: Option<DataSetMetaDataMessage>,
}

impl Default for NetworkMessage {
    fn default() -> Self {
        Self {
            message_id: Guid::null(),
            message_type: NetworkMessageType::Data,
            publisher_id: String::new(),
            writer_group_id: 0,
            writer_group_name: String::new(),
            group_version: 0,
            network_message_number: 0,
            sequence_number: 0,
            timestamp: DateTime::epoch(),
            picoseconds: 0,
            data_set_class_id: None,
            content_mask: NetworkMessageContentFlags::default(),
            messages: Vec::new(),
            promoted_fields: Vec::new(),
            meta_data: None,
        }
    }
}

impl NetworkMessage {
    /// A data message for the supplied data set messages. Promoted fields are taken from the
    /// message when there is exactly one and the mask asks for them.
    pub fn new_data(header: &NetworkMessage, messages: Vec<DataSetMessage>) -> NetworkMessage {
        let promoted_fields = if messages.len() == 1
            && header
                .content_mask
                .contains(NetworkMessageContentFlags::PROMOTED_FIELDS)
        {
            messages[0]
                .payload
                .fields()
                .iter()
                .filter(|f| f.promoted)
                .cloned()
                .collect()
        } else {
            Vec::new()
        };
        let data_set_class_id = header.data_set_class_id;
        NetworkMessage {
            message_id: Guid::new(),
            message_type: NetworkMessageType::Data,
            data_set_class_id,
            messages,
            promoted_fields,
            meta_data: None,
            ..header.clone()
        }
    }

    pub fn new_meta_data(header: &NetworkMessage, meta_data: DataSetMetaDataMessage) -> NetworkMessage {
        NetworkMessage {
            message_id: Guid::new(),
            message_type: NetworkMessageType::MetaData,
            messages: Vec::new(),
            promoted_fields: Vec::new(),
            meta_data: Some(meta_data),
            ..header.clone()
        }
    }

    /// Number of data set messages, or 1 for a metadata message
    pub fn notification_count(&self) -> usize {
        match self.message_type {
            NetworkMessageType::Data => self.messages.len(),
            NetworkMessageType::MetaData => 1,
        }
    }
}

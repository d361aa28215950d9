// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The JSON message mapping.

use std::{str::FromStr, sync::Arc};

use serde_json::{Map, Value};

use crate::error::PublisherError;
use crate::pubsub::{data_set_message::*, meta_data::*, models::*, network_message::*};
use crate::types::{variant_json::*, *};

const VALUE: &str = "Value";
const STATUS: &str = "Status";
const SOURCE_TIMESTAMP: &str = "SourceTimestamp";
const SOURCE_PICOSECONDS: &str = "SourcePicoseconds";
const SERVER_TIMESTAMP: &str = "ServerTimestamp";
const SERVER_PICOSECONDS: &str = "ServerPicoseconds";
const NODE_ID: &str = "NodeId";
const DISPLAY_NAME: &str = "DisplayName";
const ENDPOINT_URL: &str = "EndpointUrl";
const APPLICATION_URI: &str = "ApplicationUri";
const SUBSCRIPTION_ID: &str = "SubscriptionId";

/// Members that mark an object as a DataValue rather than a reversible variant
const DATA_VALUE_MEMBERS: [&str; 11] = [
    VALUE,
    STATUS,
    SOURCE_TIMESTAMP,
    SOURCE_PICOSECONDS,
    SERVER_TIMESTAMP,
    SERVER_PICOSECONDS,
    NODE_ID,
    DISPLAY_NAME,
    ENDPOINT_URL,
    APPLICATION_URI,
    SUBSCRIPTION_ID,
];

pub(super) fn encode(message: &NetworkMessage, reversible: bool) -> Result<Value, PublisherError> {
    match message.message_type {
        NetworkMessageType::Data => Ok(encode_data(message, reversible)),
        NetworkMessageType::MetaData => encode_meta_data(message),
    }
}

fn encode_data(message: &NetworkMessage, reversible: bool) -> Value {
    let mask = message.content_mask;
    let mut messages = message
        .messages
        .iter()
        .map(|m| encode_data_set_message(m, message, reversible))
        .collect::<Vec<_>>();
    let messages = if mask.contains(NetworkMessageContentFlags::SINGLE_DATA_SET_MESSAGE)
        && messages.len() == 1
    {
        messages.remove(0)
    } else {
        Value::Array(messages)
    };

    if !mask.contains(NetworkMessageContentFlags::NETWORK_MESSAGE_HEADER) {
        return messages;
    }

    let mut o = Map::new();
    o.insert("MessageId".into(), Value::from(message.message_id.to_string()));
    o.insert("MessageType".into(), Value::from(message.message_type.as_str()));
    if mask.contains(NetworkMessageContentFlags::PUBLISHER_ID) {
        o.insert("PublisherId".into(), Value::from(message.publisher_id.as_str()));
    }
    if mask.contains(NetworkMessageContentFlags::WRITER_GROUP_ID) {
        o.insert("WriterGroupId".into(), Value::from(message.writer_group_id));
    }
    if mask.contains(NetworkMessageContentFlags::GROUP_VERSION) {
        o.insert("GroupVersion".into(), Value::from(message.group_version));
    }
    if mask.contains(NetworkMessageContentFlags::NETWORK_MESSAGE_NUMBER) {
        o.insert(
            "NetworkMessageNumber".into(),
            Value::from(message.network_message_number),
        );
    }
    if mask.contains(NetworkMessageContentFlags::SEQUENCE_NUMBER) {
        o.insert("SequenceNumber".into(), Value::from(message.sequence_number));
    }
    if mask.contains(NetworkMessageContentFlags::TIMESTAMP) {
        o.insert("Timestamp".into(), Value::from(message.timestamp.to_string()));
    }
    if mask.contains(NetworkMessageContentFlags::PICOSECONDS) {
        o.insert("Picoseconds".into(), Value::from(message.picoseconds));
    }
    if mask.contains(NetworkMessageContentFlags::DATA_SET_CLASS_ID) {
        if let Some(class_id) = message.data_set_class_id {
            o.insert("DataSetClassId".into(), Value::from(class_id.to_string()));
        }
    }
    if mask.contains(NetworkMessageContentFlags::PROMOTED_FIELDS) && !message.promoted_fields.is_empty() {
        let mut promoted = Map::new();
        for f in &message.promoted_fields {
            if let Some(ref v) = f.value.value {
                if !v.is_empty() {
                    promoted.insert(f.name.clone(), variant_to_json(v, reversible));
                }
            }
        }
        o.insert("PromotedFields".into(), Value::Object(promoted));
    }
    o.insert("Messages".into(), messages);
    Value::Object(o)
}

fn encode_data_set_message(
    dsm: &DataSetMessage,
    network_message: &NetworkMessage,
    reversible: bool,
) -> Value {
    let payload = encode_payload(dsm, reversible);
    if !network_message
        .content_mask
        .contains(NetworkMessageContentFlags::DATA_SET_MESSAGE_HEADER)
    {
        return payload.unwrap_or_else(|| Value::Object(Map::new()));
    }

    let mask = dsm.message_content_mask;
    let mut o = Map::new();
    if mask.contains(DataSetMessageContentFlags::DATA_SET_WRITER_ID) {
        o.insert("DataSetWriterId".into(), Value::from(dsm.data_set_writer_id));
    }
    if mask.contains(DataSetMessageContentFlags::DATA_SET_WRITER_NAME) {
        o.insert(
            "DataSetWriterName".into(),
            Value::from(dsm.data_set_writer_name.as_str()),
        );
    }
    if mask.contains(DataSetMessageContentFlags::PUBLISHER_ID) {
        o.insert(
            "PublisherId".into(),
            Value::from(network_message.publisher_id.as_str()),
        );
    }
    if mask.contains(DataSetMessageContentFlags::WRITER_GROUP_NAME) {
        o.insert(
            "WriterGroupName".into(),
            Value::from(network_message.writer_group_name.as_str()),
        );
    }
    if mask.contains(DataSetMessageContentFlags::SEQUENCE_NUMBER) {
        o.insert("SequenceNumber".into(), Value::from(dsm.sequence_number));
    }
    let mut version = Map::new();
    if mask.intersects(DataSetMessageContentFlags::META_DATA_VERSION | DataSetMessageContentFlags::MAJOR_VERSION) {
        version.insert(
            "MajorVersion".into(),
            Value::from(dsm.meta_data_version.major_version),
        );
    }
    if mask.intersects(DataSetMessageContentFlags::META_DATA_VERSION | DataSetMessageContentFlags::MINOR_VERSION) {
        version.insert(
            "MinorVersion".into(),
            Value::from(dsm.meta_data_version.minor_version),
        );
    }
    if !version.is_empty() {
        o.insert("MetaDataVersion".into(), Value::Object(version));
    }
    if mask.contains(DataSetMessageContentFlags::TIMESTAMP) {
        o.insert("Timestamp".into(), Value::from(dsm.timestamp.to_string()));
    }
    if mask.contains(DataSetMessageContentFlags::PICO_SECONDS) {
        o.insert("Picoseconds".into(), Value::from(dsm.picoseconds));
    }
    if mask.contains(DataSetMessageContentFlags::STATUS) && !dsm.status.is_good() {
        o.insert(STATUS.into(), status_code_to_json(dsm.status, reversible));
    }
    if mask.contains(DataSetMessageContentFlags::MESSAGE_TYPE) {
        o.insert("MessageType".into(), Value::from(dsm.message_type.as_str()));
    }
    if let Some(payload) = payload {
        o.insert("Payload".into(), payload);
    }
    Value::Object(o)
}

/// The payload, absent for keep alive messages
fn encode_payload(dsm: &DataSetMessage, reversible: bool) -> Option<Value> {
    match dsm.payload {
        // A lone value is written bare, which keeps it apart from a field named "Value"
        Payload::Value(ref field) => encode_field(field, dsm, reversible).map(|v| match v {
            Value::Object(mut o) if o.len() == 1 && o.contains_key(VALUE) => {
                o.remove(VALUE).unwrap_or(Value::Null)
            }
            v => v,
        }),
        Payload::Fields(_) if dsm.message_type == DataSetMessageType::KeepAlive => None,
        Payload::Fields(ref fields) => {
            let mut o = Map::new();
            for field in fields {
                if let Some(v) = encode_field(field, dsm, reversible) {
                    o.insert(field.name.clone(), v);
                }
            }
            Some(Value::Object(o))
        }
    }
}

/// A field as a bare value, a variant or a DataValue object, depending on the field content
/// mask. `None` when there is nothing to write.
fn encode_field(field: &DataSetField, dsm: &DataSetMessage, reversible: bool) -> Option<Value> {
    let mask = dsm.field_content_mask;
    let value = field.value.value.as_ref().filter(|v| !v.is_empty());

    if mask.contains(DataSetFieldContentFlags::RAW_DATA) {
        return value.map(|v| variant_body_to_json(v, false));
    }
    if mask.data_value_parts().is_empty() && mask.identity_parts().is_empty() {
        return value.map(|v| variant_to_json(v, reversible));
    }

    let dv = &field.value;
    let mut o = Map::new();
    if let Some(v) = value {
        o.insert(VALUE.into(), variant_to_json(v, reversible));
    }
    if mask.contains(DataSetFieldContentFlags::STATUS_CODE) {
        if let Some(status) = dv.status.filter(|s| !s.is_good()) {
            o.insert(STATUS.into(), status_code_to_json(status, reversible));
        }
    }
    if mask.contains(DataSetFieldContentFlags::SOURCE_TIMESTAMP) {
        if let Some(ts) = dv.source_timestamp {
            o.insert(SOURCE_TIMESTAMP.into(), Value::from(ts.to_string()));
        }
    }
    if mask.contains(DataSetFieldContentFlags::SOURCE_PICO_SECONDS) {
        if let Some(p) = dv.source_picoseconds {
            o.insert(SOURCE_PICOSECONDS.into(), Value::from(p));
        }
    }
    if mask.contains(DataSetFieldContentFlags::SERVER_TIMESTAMP) {
        if let Some(ts) = dv.server_timestamp {
            o.insert(SERVER_TIMESTAMP.into(), Value::from(ts.to_string()));
        }
    }
    if mask.contains(DataSetFieldContentFlags::SERVER_PICO_SECONDS) {
        if let Some(p) = dv.server_picoseconds {
            o.insert(SERVER_PICOSECONDS.into(), Value::from(p));
        }
    }
    if mask.contains(DataSetFieldContentFlags::NODE_ID) {
        if let Some(ref node_id) = field.node_id {
            o.insert(NODE_ID.into(), Value::from(node_id.as_str()));
        }
    }
    if mask.contains(DataSetFieldContentFlags::DISPLAY_NAME) {
        if let Some(ref display_name) = field.display_name {
            o.insert(DISPLAY_NAME.into(), Value::from(display_name.as_str()));
        }
    }
    if mask.contains(DataSetFieldContentFlags::ENDPOINT_URL) {
        if let Some(ref url) = dsm.endpoint_url {
            o.insert(ENDPOINT_URL.into(), Value::from(url.as_str()));
        }
    }
    if mask.contains(DataSetFieldContentFlags::APPLICATION_URI) {
        if let Some(ref uri) = dsm.application_uri {
            o.insert(APPLICATION_URI.into(), Value::from(uri.as_str()));
        }
    }
    if mask.contains(DataSetFieldContentFlags::SUBSCRIPTION_ID) {
        if let Some(id) = field.subscription_id {
            o.insert(SUBSCRIPTION_ID.into(), Value::from(id));
        }
    }
    if o.is_empty() {
        None
    } else {
        Some(Value::Object(o))
    }
}

fn encode_meta_data(message: &NetworkMessage) -> Result<Value, PublisherError> {
    let meta_data = message.meta_data.as_ref().ok_or_else(|| {
        PublisherError::Encoding(StatusCode::BadEncodingError)
    })?;
    let mut o = Map::new();
    o.insert("MessageId".into(), Value::from(message.message_id.to_string()));
    o.insert("MessageType".into(), Value::from(message.message_type.as_str()));
    o.insert("PublisherId".into(), Value::from(message.publisher_id.as_str()));
    o.insert("DataSetWriterId".into(), Value::from(meta_data.data_set_writer_id));
    o.insert(
        "DataSetWriterName".into(),
        Value::from(meta_data.data_set_writer_name.as_str()),
    );
    o.insert("MetaData".into(), serde_json::to_value(meta_data.meta_data.as_ref())?);
    Ok(Value::Object(o))
}

fn decode_error(what: &str, v: &Value) -> PublisherError {
    PublisherError::Decoding(format!("{} is not a valid {}", v, what))
}

/// Decodes a network message, an envelope of them, or the bare data set messages written when
/// the network message header is off.
pub(super) fn decode(
    value: &Value,
    content_mask: NetworkMessageContentFlags,
    reversible: bool,
) -> Result<Vec<NetworkMessage>, PublisherError> {
    let has_header = content_mask.contains(NetworkMessageContentFlags::NETWORK_MESSAGE_HEADER);
    match value {
        Value::Array(values) if has_header => values
            .iter()
            .map(|v| decode_network_message(v, content_mask, reversible))
            .collect(),
        v if has_header => Ok(vec![decode_network_message(v, content_mask, reversible)?]),
        v => {
            let messages = decode_messages(v, content_mask, reversible)?;
            Ok(vec![NetworkMessage {
                content_mask,
                messages,
                ..Default::default()
            }])
        }
    }
}

fn decode_network_message(
    value: &Value,
    content_mask: NetworkMessageContentFlags,
    reversible: bool,
) -> Result<NetworkMessage, PublisherError> {
    let o = value
        .as_object()
        .ok_or_else(|| decode_error("network message", value))?;
    let str_member = |name: &str| o.get(name).and_then(|v| v.as_str());
    let u64_member = |name: &str| o.get(name).and_then(|v| v.as_u64());

    let message_id = match str_member("MessageId") {
        Some(id) => Guid::from_str(id).map_err(|_| decode_error("message id", value))?,
        None => Guid::null(),
    };
    let mut message = NetworkMessage {
        message_id,
        publisher_id: str_member("PublisherId").unwrap_or_default().to_string(),
        writer_group_id: u64_member("WriterGroupId").unwrap_or(0) as u16,
        group_version: u64_member("GroupVersion").unwrap_or(0) as u32,
        network_message_number: u64_member("NetworkMessageNumber").unwrap_or(0) as u16,
        sequence_number: u64_member("SequenceNumber").unwrap_or(0) as u16,
        picoseconds: u64_member("Picoseconds").unwrap_or(0) as u16,
        content_mask,
        ..Default::default()
    };
    if let Some(ts) = str_member("Timestamp") {
        message.timestamp = DateTime::from_str(ts).map_err(|_| decode_error("timestamp", value))?;
    }
    if let Some(class_id) = str_member("DataSetClassId") {
        message.data_set_class_id =
            Some(Guid::from_str(class_id).map_err(|_| decode_error("class id", value))?);
    }

    match str_member("MessageType") {
        Some(message_type::META_DATA) => {
            let meta_data = o
                .get("MetaData")
                .ok_or_else(|| decode_error("metadata message", value))?;
            let meta_data: DataSetMetaData = serde_json::from_value(meta_data.clone())?;
            message.message_type = NetworkMessageType::MetaData;
            message.meta_data = Some(DataSetMetaDataMessage {
                data_set_writer_id: u64_member("DataSetWriterId").unwrap_or(0) as u16,
                data_set_writer_name: str_member("DataSetWriterName")
                    .unwrap_or_default()
                    .to_string(),
                meta_data: Arc::new(meta_data),
            });
        }
        _ => {
            let messages = o
                .get("Messages")
                .ok_or_else(|| decode_error("data message", value))?;
            message.messages = decode_messages(messages, content_mask, reversible)?;
            if let Some(Value::Object(promoted)) = o.get("PromotedFields") {
                message.promoted_fields = promoted
                    .iter()
                    .enumerate()
                    .map(|(i, (name, v))| {
                        let mut field = decode_field(i as u16, name, v, reversible)?;
                        field.promoted = true;
                        Ok(field)
                    })
                    .collect::<Result<Vec<_>, PublisherError>>()?;
            }
        }
    }
    Ok(message)
}

fn decode_messages(
    value: &Value,
    content_mask: NetworkMessageContentFlags,
    reversible: bool,
) -> Result<Vec<DataSetMessage>, PublisherError> {
    match value {
        Value::Array(values) => values
            .iter()
            .map(|v| decode_data_set_message(v, content_mask, reversible))
            .collect(),
        v => Ok(vec![decode_data_set_message(v, content_mask, reversible)?]),
    }
}

fn decode_data_set_message(
    value: &Value,
    content_mask: NetworkMessageContentFlags,
    reversible: bool,
) -> Result<DataSetMessage, PublisherError> {
    if !content_mask.contains(NetworkMessageContentFlags::DATA_SET_MESSAGE_HEADER) {
        let payload = decode_payload(value, reversible)?;
        return Ok(DataSetMessage {
            status: worst_status(payload.fields().iter().map(|f| f.value.status())),
            payload,
            ..Default::default()
        });
    }

    let o = value
        .as_object()
        .ok_or_else(|| decode_error("data set message", value))?;
    let u64_member = |name: &str| o.get(name).and_then(|v| v.as_u64());
    let mut dsm = DataSetMessage {
        data_set_writer_id: u64_member("DataSetWriterId").unwrap_or(0) as u16,
        data_set_writer_name: o
            .get("DataSetWriterName")
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string(),
        sequence_number: u64_member("SequenceNumber").unwrap_or(0) as u32,
        picoseconds: u64_member("Picoseconds").unwrap_or(0) as u16,
        ..Default::default()
    };
    if let Some(Value::Object(version)) = o.get("MetaDataVersion") {
        let member = |name: &str| version.get(name).and_then(|v| v.as_u64()).unwrap_or(0) as u32;
        dsm.meta_data_version = ConfigurationVersion::new(member("MajorVersion"), member("MinorVersion"));
    }
    if let Some(ts) = o.get("Timestamp").and_then(|v| v.as_str()) {
        dsm.timestamp = DateTime::from_str(ts).map_err(|_| decode_error("timestamp", value))?;
    }
    if let Some(status) = o.get(STATUS) {
        dsm.status = status_code_from_json(status)?;
    }
    if let Some(message_type) = o.get("MessageType").and_then(|v| v.as_str()) {
        dsm.message_type = DataSetMessageType::from_str(message_type)?;
    }
    dsm.payload = match o.get("Payload") {
        Some(payload) => decode_payload(payload, reversible)?,
        None => Payload::default(),
    };
    Ok(dsm)
}

fn decode_payload(value: &Value, reversible: bool) -> Result<Payload, PublisherError> {
    match value {
        Value::Object(o) if !is_variant_object(o, reversible) && !is_data_value_object(o, reversible) => {
            Ok(Payload::Fields(
                o.iter()
                    .enumerate()
                    .map(|(i, (name, v))| decode_field(i as u16, name, v, reversible))
                    .collect::<Result<Vec<_>, _>>()?,
            ))
        }
        v => Ok(Payload::Value(decode_field(0, VALUE, v, reversible)?)),
    }
}

/// True for a reversible variant `{"Type": n, "Body": ...}`
fn is_variant_object(o: &Map<String, Value>, reversible: bool) -> bool {
    reversible
        && o.get("Type").map_or(false, Value::is_u64)
        && o.keys().all(|k| k == "Type" || k == "Body")
}

/// True if the payload object is one DataValue rather than a map of fields. Every member must
/// be a DataValue member holding what that member holds, so a field map whose field names
/// happen to be member names is not mistaken for a DataValue. An object with only a `Value`
/// member is a field map, a single value is never written that way.
fn is_data_value_object(o: &Map<String, Value>, reversible: bool) -> bool {
    o.keys().any(|k| k != VALUE)
        && o.iter().all(|(k, v)| match k.as_str() {
            VALUE => true,
            STATUS if reversible => v.is_u64(),
            STATUS => v.get("Code").map_or(false, Value::is_u64),
            SOURCE_TIMESTAMP | SERVER_TIMESTAMP => {
                v.as_str()
                    .map_or(false, |t| chrono::DateTime::parse_from_rfc3339(t).is_ok())
            }
            SOURCE_PICOSECONDS | SERVER_PICOSECONDS | SUBSCRIPTION_ID => v.is_u64(),
            NODE_ID | DISPLAY_NAME | ENDPOINT_URL | APPLICATION_URI => v.is_string(),
            _ => false,
        })
}

fn decode_variant(v: &Value, reversible: bool) -> Result<Variant, PublisherError> {
    match v {
        Value::Object(o) if reversible && o.contains_key("Type") => variant_from_json_reversible(v),
        v => Ok(variant_from_json_raw(v)),
    }
}

fn decode_field(index: u16, name: &str, v: &Value, reversible: bool) -> Result<DataSetField, PublisherError> {
    let mut field = DataSetField::new(index, name, DataValue::default());
    match v {
        Value::Object(o)
            if !is_variant_object(o, reversible)
                && o.keys().all(|k| DATA_VALUE_MEMBERS.contains(&k.as_str())) =>
        {
            let timestamp = |member: &str| -> Result<Option<DateTime>, PublisherError> {
                o.get(member)
                    .and_then(|t| t.as_str())
                    .map(|t| DateTime::from_str(t).map_err(|_| decode_error("timestamp", v)))
                    .transpose()
            };
            let picoseconds = |member: &str| o.get(member).and_then(|p| p.as_i64()).map(|p| p as i16);
            field.value = DataValue {
                value: o.get(VALUE).map(|v| decode_variant(v, reversible)).transpose()?,
                status: o.get(STATUS).map(status_code_from_json).transpose()?,
                source_timestamp: timestamp(SOURCE_TIMESTAMP)?,
                source_picoseconds: picoseconds(SOURCE_PICOSECONDS),
                server_timestamp: timestamp(SERVER_TIMESTAMP)?,
                server_picoseconds: picoseconds(SERVER_PICOSECONDS),
            };
            field.node_id = o.get(NODE_ID).and_then(|v| v.as_str()).map(str::to_string);
            field.display_name = o.get(DISPLAY_NAME).and_then(|v| v.as_str()).map(str::to_string);
            field.subscription_id = o.get(SUBSCRIPTION_ID).and_then(|v| v.as_u64()).map(|v| v as u32);
        }
        v => {
            field.value.value = Some(decode_variant(v, reversible)?);
        }
    }
    Ok(field)
}

// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The XML message mapping. Header parts are attributes, fields are elements carrying their
//! built-in type so the document is self describing.

use std::fmt::Write;

use crate::error::PublisherError;
use crate::pubsub::{data_set_message::*, models::*, network_message::*};
use crate::types::{variant_json::variant_body_to_json, *};

const XML_DECLARATION: &str = r#"<?xml version="1.0" encoding="utf-8"?>"#;

/// Escapes text for use in element content and attribute values
fn escape(s: &str) -> String {
    let mut escaped = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c => escaped.push(c),
        }
    }
    escaped
}

struct Element {
    name: &'static str,
    attributes: Vec<(&'static str, String)>,
}

impl Element {
    fn new(name: &'static str) -> Self {
        Self {
            name,
            attributes: Vec::new(),
        }
    }

    fn attr<T: ToString>(&mut self, name: &'static str, value: T) -> &mut Self {
        self.attributes.push((name, value.to_string()));
        self
    }

    fn open(&self, out: &mut String, empty: bool) {
        out.push('<');
        out.push_str(self.name);
        for (name, value) in &self.attributes {
            let _ = write!(out, r#" {}="{}""#, name, escape(value));
        }
        out.push_str(if empty { "/>" } else { ">" });
    }

    fn close(&self, out: &mut String) {
        let _ = write!(out, "</{}>", self.name);
    }
}

pub(super) fn encode(message: &NetworkMessage) -> Result<String, PublisherError> {
    let mut out = String::from(XML_DECLARATION);
    write_network_message(&mut out, message)?;
    Ok(out)
}

pub(super) fn encode_envelope(messages: &[NetworkMessage]) -> Result<String, PublisherError> {
    let mut out = String::from(XML_DECLARATION);
    out.push_str("<NetworkMessages>");
    for m in messages {
        write_network_message(&mut out, m)?;
    }
    out.push_str("</NetworkMessages>");
    Ok(out)
}

fn write_network_message(out: &mut String, message: &NetworkMessage) -> Result<(), PublisherError> {
    let mask = message.content_mask;
    let mut e = Element::new("NetworkMessage");
    e.attr("MessageId", message.message_id)
        .attr("MessageType", message.message_type.as_str());
    if mask.contains(NetworkMessageContentFlags::PUBLISHER_ID) {
        e.attr("PublisherId", &message.publisher_id);
    }
    if mask.contains(NetworkMessageContentFlags::WRITER_GROUP_ID) {
        e.attr("WriterGroupId", message.writer_group_id);
    }
    if mask.contains(NetworkMessageContentFlags::GROUP_VERSION) {
        e.attr("GroupVersion", message.group_version);
    }
    if mask.contains(NetworkMessageContentFlags::NETWORK_MESSAGE_NUMBER) {
        e.attr("NetworkMessageNumber", message.network_message_number);
    }
    if mask.contains(NetworkMessageContentFlags::SEQUENCE_NUMBER) {
        e.attr("SequenceNumber", message.sequence_number);
    }
    if mask.contains(NetworkMessageContentFlags::TIMESTAMP) {
        e.attr("Timestamp", message.timestamp);
    }
    if mask.contains(NetworkMessageContentFlags::PICOSECONDS) {
        e.attr("Picoseconds", message.picoseconds);
    }
    if mask.contains(NetworkMessageContentFlags::DATA_SET_CLASS_ID) {
        if let Some(class_id) = message.data_set_class_id {
            e.attr("DataSetClassId", class_id);
        }
    }
    e.open(out, false);

    match message.message_type {
        NetworkMessageType::MetaData => {
            let meta_data = message
                .meta_data
                .as_ref()
                .ok_or(PublisherError::Encoding(StatusCode::BadEncodingError))?;
            write_meta_data(out, meta_data);
        }
        NetworkMessageType::Data => {
            if mask.contains(NetworkMessageContentFlags::PROMOTED_FIELDS) && !message.promoted_fields.is_empty() {
                out.push_str("<PromotedFields>");
                for f in &message.promoted_fields {
                    write_field(out, f, DataSetFieldContentFlags::RAW_DATA, None);
                }
                out.push_str("</PromotedFields>");
            }
            for dsm in &message.messages {
                write_data_set_message(out, dsm, message);
            }
        }
    }
    e.close(out);
    Ok(())
}

fn write_data_set_message(out: &mut String, dsm: &DataSetMessage, message: &NetworkMessage) {
    let mut e = Element::new("DataSetMessage");
    if message
        .content_mask
        .contains(NetworkMessageContentFlags::DATA_SET_MESSAGE_HEADER)
    {
        let mask = dsm.message_content_mask;
        if mask.contains(DataSetMessageContentFlags::DATA_SET_WRITER_ID) {
            e.attr("DataSetWriterId", dsm.data_set_writer_id);
        }
        if mask.contains(DataSetMessageContentFlags::DATA_SET_WRITER_NAME) {
            e.attr("DataSetWriterName", &dsm.data_set_writer_name);
        }
        if mask.contains(DataSetMessageContentFlags::PUBLISHER_ID) {
            e.attr("PublisherId", &message.publisher_id);
        }
        if mask.contains(DataSetMessageContentFlags::WRITER_GROUP_NAME) {
            e.attr("WriterGroupName", &message.writer_group_name);
        }
        if mask.contains(DataSetMessageContentFlags::SEQUENCE_NUMBER) {
            e.attr("SequenceNumber", dsm.sequence_number);
        }
        if mask.intersects(DataSetMessageContentFlags::META_DATA_VERSION | DataSetMessageContentFlags::MAJOR_VERSION) {
            e.attr("MajorVersion", dsm.meta_data_version.major_version);
        }
        if mask.intersects(DataSetMessageContentFlags::META_DATA_VERSION | DataSetMessageContentFlags::MINOR_VERSION) {
            e.attr("MinorVersion", dsm.meta_data_version.minor_version);
        }
        if mask.contains(DataSetMessageContentFlags::TIMESTAMP) {
            e.attr("Timestamp", dsm.timestamp);
        }
        if mask.contains(DataSetMessageContentFlags::PICO_SECONDS) {
            e.attr("Picoseconds", dsm.picoseconds);
        }
        if mask.contains(DataSetMessageContentFlags::STATUS) && !dsm.status.is_good() {
            e.attr("Status", dsm.status.name());
        }
        if mask.contains(DataSetMessageContentFlags::MESSAGE_TYPE) {
            e.attr("MessageType", dsm.message_type.as_str());
        }
    }
    let fields = dsm.payload.fields();
    e.open(out, fields.is_empty());
    if !fields.is_empty() {
        for f in fields {
            write_field(out, f, dsm.field_content_mask, Some(dsm));
        }
        e.close(out);
    }
}

fn write_field(
    out: &mut String,
    field: &DataSetField,
    mask: DataSetFieldContentFlags,
    dsm: Option<&DataSetMessage>,
) {
    let value = field.value.value.as_ref().filter(|v| !v.is_empty());
    let dv = &field.value;
    let mut e = Element::new("Field");
    e.attr("Name", &field.name);
    if let Some(v) = value {
        e.attr("Type", v.type_id());
        if v.is_array() {
            e.attr("ValueRank", 1);
        }
    }
    if !mask.contains(DataSetFieldContentFlags::RAW_DATA) {
        if mask.contains(DataSetFieldContentFlags::STATUS_CODE) {
            if let Some(status) = dv.status.filter(|s| !s.is_good()) {
                e.attr("Status", status.name());
            }
        }
        if mask.contains(DataSetFieldContentFlags::SOURCE_TIMESTAMP) {
            if let Some(ts) = dv.source_timestamp {
                e.attr("SourceTimestamp", ts);
            }
        }
        if mask.contains(DataSetFieldContentFlags::SOURCE_PICO_SECONDS) {
            if let Some(p) = dv.source_picoseconds {
                e.attr("SourcePicoseconds", p);
            }
        }
        if mask.contains(DataSetFieldContentFlags::SERVER_TIMESTAMP) {
            if let Some(ts) = dv.server_timestamp {
                e.attr("ServerTimestamp", ts);
            }
        }
        if mask.contains(DataSetFieldContentFlags::SERVER_PICO_SECONDS) {
            if let Some(p) = dv.server_picoseconds {
                e.attr("ServerPicoseconds", p);
            }
        }
        if mask.contains(DataSetFieldContentFlags::NODE_ID) {
            if let Some(ref node_id) = field.node_id {
                e.attr("NodeId", node_id);
            }
        }
        if mask.contains(DataSetFieldContentFlags::DISPLAY_NAME) {
            if let Some(ref display_name) = field.display_name {
                e.attr("DisplayName", display_name);
            }
        }
        if let Some(dsm) = dsm {
            if mask.contains(DataSetFieldContentFlags::ENDPOINT_URL) {
                if let Some(ref url) = dsm.endpoint_url {
                    e.attr("EndpointUrl", url);
                }
            }
            if mask.contains(DataSetFieldContentFlags::APPLICATION_URI) {
                if let Some(ref uri) = dsm.application_uri {
                    e.attr("ApplicationUri", uri);
                }
            }
        }
        if mask.contains(DataSetFieldContentFlags::SUBSCRIPTION_ID) {
            if let Some(id) = field.subscription_id {
                e.attr("SubscriptionId", id);
            }
        }
    }
    match value {
        None => e.open(out, true),
        Some(v) => {
            e.open(out, false);
            write_value(out, v);
            e.close(out);
        }
    }
}

fn write_value(out: &mut String, v: &Variant) {
    match v {
        Variant::Array(a) => {
            for v in &a.values {
                out.push_str("<Item>");
                write_value(out, v);
                out.push_str("</Item>");
            }
        }
        Variant::StatusCode(status) => out.push_str(&status.name()),
        v => match variant_body_to_json(v, false) {
            serde_json::Value::String(s) => out.push_str(&escape(&s)),
            json => out.push_str(&escape(&json.to_string())),
        },
    }
}

fn write_meta_data(out: &mut String, message: &DataSetMetaDataMessage) {
    let meta_data = &message.meta_data;
    let mut e = Element::new("DataSetMetaData");
    e.attr("DataSetWriterId", message.data_set_writer_id)
        .attr("DataSetWriterName", &message.data_set_writer_name)
        .attr("Name", &meta_data.name)
        .attr("MajorVersion", meta_data.configuration_version.major_version)
        .attr("MinorVersion", meta_data.configuration_version.minor_version);
    if let Some(class_id) = meta_data.data_set_class_id {
        e.attr("DataSetClassId", class_id);
    }
    e.open(out, meta_data.fields.is_empty());
    if meta_data.fields.is_empty() {
        return;
    }
    for f in &meta_data.fields {
        let mut field = Element::new("Field");
        field
            .attr("Name", &f.name)
            .attr("ValueRank", f.value_rank)
            .attr("DataSetFieldId", f.data_set_field_id);
        if let Some(built_in_type) = f.built_in_type {
            field.attr("BuiltInType", built_in_type);
        }
        field.open(out, true);
    }
    e.close(out);
}

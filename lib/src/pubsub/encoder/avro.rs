// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Avro binary encoding of network messages. The layout of a data set is derived from its
//! metadata, so a data set message without metadata, or with a field whose type is still
//! unknown, cannot be encoded.
//!
//! Every field is a `["null", T]` union so delta frames can leave fields out. Messages of
//! different writers are written as a union of one record per writer, in order of first
//! appearance. Metadata messages are JSON and carry the record schema of their data set.

use serde_json::{json, Map, Value};

use crate::error::PublisherError;
use crate::pubsub::{data_set_message::*, meta_data::*, models::*, network_message::*};
use crate::types::*;

pub(super) fn encode(message: &NetworkMessage) -> Result<Vec<u8>, PublisherError> {
    match message.message_type {
        NetworkMessageType::MetaData => encode_meta_data(message),
        NetworkMessageType::Data => {
            let mut out = Vec::with_capacity(256);
            encode_data(&mut out, message)?;
            Ok(out)
        }
    }
}

/// The Avro record schema of a data set
pub(crate) fn schema(meta_data: &DataSetMetaData, field_mask: DataSetFieldContentFlags) -> Result<Value, PublisherError> {
    let fields = meta_data
        .fields
        .iter()
        .map(|f| {
            let type_id = f.built_in_type.ok_or_else(|| unknown_type(&f.name))?;
            let mut value = primitive_schema(type_id);
            if f.value_rank >= 0 {
                value = json!({ "type": "array", "items": value });
            }
            let value = field_schema(value, field_mask);
            Ok(json!({ "name": avro_name(&f.name), "type": ["null", value], "default": null }))
        })
        .collect::<Result<Vec<_>, PublisherError>>()?;
    Ok(json!({
        "type": "record",
        "name": avro_name(&meta_data.name),
        "namespace": "org.opcfoundation.ua.pubsub",
        "fields": fields,
    }))
}

fn unknown_type(field: &str) -> PublisherError {
    PublisherError::UnsupportedEncoding(format!("type of field {} is not known yet", field))
}

/// Avro names are restricted to `[A-Za-z_][A-Za-z0-9_]*`
fn avro_name(name: &str) -> String {
    let mut result: String = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    if !result.starts_with(|c: char| c.is_ascii_alphabetic() || c == '_') {
        result.insert(0, '_');
    }
    result
}

fn primitive_schema(type_id: VariantTypeId) -> Value {
    let name = match type_id {
        VariantTypeId::Boolean => "boolean",
        VariantTypeId::SByte
        | VariantTypeId::Byte
        | VariantTypeId::Int16
        | VariantTypeId::UInt16
        | VariantTypeId::Int32 => "int",
        VariantTypeId::UInt32
        | VariantTypeId::Int64
        | VariantTypeId::UInt64
        | VariantTypeId::StatusCode
        | VariantTypeId::DateTime => "long",
        VariantTypeId::Float => "float",
        VariantTypeId::Double => "double",
        VariantTypeId::ByteString => "bytes",
        VariantTypeId::String | VariantTypeId::Guid => "string",
        VariantTypeId::Empty => "null",
    };
    Value::String(name.into())
}

/// Wraps the value schema in a data value record when the mask selects data value parts
fn field_schema(value: Value, field_mask: DataSetFieldContentFlags) -> Value {
    if field_mask.contains(DataSetFieldContentFlags::RAW_DATA) || field_mask.data_value_parts().is_empty() {
        return value;
    }
    let mut fields = vec![json!({ "name": "Value", "type": value })];
    for (flag, name, t) in data_value_parts() {
        if field_mask.contains(flag) {
            fields.push(json!({ "name": name, "type": ["null", t], "default": null }));
        }
    }
    json!({ "type": "record", "name": "DataValue", "fields": fields })
}

fn data_value_parts() -> [(DataSetFieldContentFlags, &'static str, &'static str); 5] {
    [
        (DataSetFieldContentFlags::STATUS_CODE, "StatusCode", "long"),
        (DataSetFieldContentFlags::SOURCE_TIMESTAMP, "SourceTimestamp", "long"),
        (DataSetFieldContentFlags::SOURCE_PICO_SECONDS, "SourcePicoseconds", "int"),
        (DataSetFieldContentFlags::SERVER_TIMESTAMP, "ServerTimestamp", "long"),
        (DataSetFieldContentFlags::SERVER_PICO_SECONDS, "ServerPicoseconds", "int"),
    ]
}

fn encode_meta_data(message: &NetworkMessage) -> Result<Vec<u8>, PublisherError> {
    let meta_data = message
        .meta_data
        .as_ref()
        .ok_or(PublisherError::Encoding(StatusCode::BadEncodingError))?;
    let field_mask = DataSetFieldContentFlags::RAW_DATA;
    let mut value = Map::new();
    value.insert("MessageId".into(), json!(message.message_id.to_string()));
    value.insert("MessageType".into(), json!(message.message_type.as_str()));
    if message.content_mask.contains(NetworkMessageContentFlags::PUBLISHER_ID) {
        value.insert("PublisherId".into(), json!(message.publisher_id));
    }
    value.insert("DataSetWriterId".into(), json!(meta_data.data_set_writer_id));
    value.insert("DataSetWriterName".into(), json!(meta_data.data_set_writer_name));
    value.insert("MetaData".into(), serde_json::to_value(meta_data.meta_data.as_ref())?);
    value.insert("Schema".into(), schema(&meta_data.meta_data, field_mask)?);
    Ok(serde_json::to_vec(&Value::Object(value))?)
}

fn encode_data(out: &mut Vec<u8>, message: &NetworkMessage) -> Result<(), PublisherError> {
    let mask = message.content_mask;
    if mask.contains(NetworkMessageContentFlags::NETWORK_MESSAGE_HEADER) {
        write_string(out, &message.message_id.to_string());
        write_string(out, message.message_type.as_str());
        if mask.contains(NetworkMessageContentFlags::PUBLISHER_ID) {
            write_string(out, &message.publisher_id);
        }
        if mask.contains(NetworkMessageContentFlags::WRITER_GROUP_ID) {
            write_long(out, message.writer_group_id as i64);
        }
        if mask.contains(NetworkMessageContentFlags::GROUP_VERSION) {
            write_long(out, message.group_version as i64);
        }
        if mask.contains(NetworkMessageContentFlags::NETWORK_MESSAGE_NUMBER) {
            write_long(out, message.network_message_number as i64);
        }
        if mask.contains(NetworkMessageContentFlags::SEQUENCE_NUMBER) {
            write_long(out, message.sequence_number as i64);
        }
        if mask.contains(NetworkMessageContentFlags::TIMESTAMP) {
            write_long(out, message.timestamp.ticks());
        }
        if mask.contains(NetworkMessageContentFlags::PICOSECONDS) {
            write_long(out, message.picoseconds as i64);
        }
    }

    // Union branches, one per writer in order of first appearance
    let mut writers: Vec<u16> = Vec::new();
    for dsm in &message.messages {
        if !writers.contains(&dsm.data_set_writer_id) {
            writers.push(dsm.data_set_writer_id);
        }
    }

    if !message.messages.is_empty() {
        write_long(out, message.messages.len() as i64);
        for dsm in &message.messages {
            if writers.len() > 1 {
                let branch = writers
                    .iter()
                    .position(|w| *w == dsm.data_set_writer_id)
                    .unwrap_or_default();
                write_long(out, branch as i64);
            }
            encode_data_set_message(out, dsm, mask)?;
        }
    }
    write_long(out, 0);
    Ok(())
}

fn encode_data_set_message(
    out: &mut Vec<u8>,
    dsm: &DataSetMessage,
    network_mask: NetworkMessageContentFlags,
) -> Result<(), PublisherError> {
    let meta_data = dsm.meta_data.as_ref().ok_or_else(|| {
        PublisherError::UnsupportedEncoding(format!(
            "writer {} has no metadata to derive a schema from",
            dsm.data_set_writer_name
        ))
    })?;

    if network_mask.contains(NetworkMessageContentFlags::DATA_SET_MESSAGE_HEADER) {
        let mask = dsm.message_content_mask;
        if mask.contains(DataSetMessageContentFlags::DATA_SET_WRITER_ID) {
            write_long(out, dsm.data_set_writer_id as i64);
        }
        if mask.contains(DataSetMessageContentFlags::SEQUENCE_NUMBER) {
            write_long(out, dsm.sequence_number as i64);
        }
        if mask.contains(DataSetMessageContentFlags::META_DATA_VERSION) {
            write_long(out, dsm.meta_data_version.major_version as i64);
            write_long(out, dsm.meta_data_version.minor_version as i64);
        }
        if mask.contains(DataSetMessageContentFlags::TIMESTAMP) {
            write_long(out, dsm.timestamp.ticks());
        }
        if mask.contains(DataSetMessageContentFlags::STATUS) {
            write_long(out, dsm.status.bits() as i64);
        }
        if mask.contains(DataSetMessageContentFlags::MESSAGE_TYPE) {
            write_string(out, dsm.message_type.as_str());
        }
    }

    let fields = dsm.payload.fields();
    for (i, meta) in meta_data.fields.iter().enumerate() {
        let field = fields.iter().find(|f| f.index as usize == i);
        match field {
            None => write_long(out, 0),
            Some(field) => {
                write_long(out, 1);
                encode_field(out, field, meta, dsm.field_content_mask)?;
            }
        }
    }
    Ok(())
}

fn encode_field(
    out: &mut Vec<u8>,
    field: &DataSetField,
    meta: &FieldMetaData,
    field_mask: DataSetFieldContentFlags,
) -> Result<(), PublisherError> {
    let type_id = meta.built_in_type.ok_or_else(|| unknown_type(&meta.name))?;
    let value = field.value.value.as_ref().unwrap_or(&Variant::Empty);
    if meta.value_rank >= 0 {
        match value {
            Variant::Array(a) => {
                if !a.values.is_empty() {
                    write_long(out, a.values.len() as i64);
                    for v in &a.values {
                        write_value(out, v, type_id)?;
                    }
                }
                write_long(out, 0);
            }
            Variant::Empty => write_long(out, 0),
            v => return Err(mismatch(&meta.name, type_id, v)),
        }
    } else {
        write_value(out, value, type_id)?;
    }

    if !field_mask.contains(DataSetFieldContentFlags::RAW_DATA) {
        let dv = &field.value;
        for (flag, _, _) in data_value_parts() {
            if !field_mask.contains(flag) {
                continue;
            }
            let part = if flag == DataSetFieldContentFlags::STATUS_CODE {
                dv.status.map(|s| s.bits() as i64)
            } else if flag == DataSetFieldContentFlags::SOURCE_TIMESTAMP {
                dv.source_timestamp.map(|t| t.ticks())
            } else if flag == DataSetFieldContentFlags::SOURCE_PICO_SECONDS {
                dv.source_picoseconds.map(|p| p as i64)
            } else if flag == DataSetFieldContentFlags::SERVER_TIMESTAMP {
                dv.server_timestamp.map(|t| t.ticks())
            } else {
                dv.server_picoseconds.map(|p| p as i64)
            };
            match part {
                None => write_long(out, 0),
                Some(part) => {
                    write_long(out, 1);
                    write_long(out, part);
                }
            }
        }
    }
    Ok(())
}

fn mismatch(name: &str, expected: VariantTypeId, value: &Variant) -> PublisherError {
    error!(
        "Field {} holds a {} but its schema says {}",
        name,
        value.type_id(),
        expected
    );
    PublisherError::Encoding(StatusCode::BadTypeMismatch)
}

fn write_value(out: &mut Vec<u8>, value: &Variant, type_id: VariantTypeId) -> Result<(), PublisherError> {
    match (value, type_id) {
        // A missing value of a typed field is written as the type's zero
        (Variant::Empty, t) => write_zero(out, t),
        (Variant::Boolean(v), VariantTypeId::Boolean) => out.push(*v as u8),
        (Variant::SByte(v), VariantTypeId::SByte) => write_long(out, *v as i64),
        (Variant::Byte(v), VariantTypeId::Byte) => write_long(out, *v as i64),
        (Variant::Int16(v), VariantTypeId::Int16) => write_long(out, *v as i64),
        (Variant::UInt16(v), VariantTypeId::UInt16) => write_long(out, *v as i64),
        (Variant::Int32(v), VariantTypeId::Int32) => write_long(out, *v as i64),
        (Variant::UInt32(v), VariantTypeId::UInt32) => write_long(out, *v as i64),
        (Variant::Int64(v), VariantTypeId::Int64) => write_long(out, *v),
        (Variant::UInt64(v), VariantTypeId::UInt64) => write_long(out, *v as i64),
        (Variant::Float(v), VariantTypeId::Float) => out.extend_from_slice(&v.to_le_bytes()),
        (Variant::Double(v), VariantTypeId::Double) => out.extend_from_slice(&v.to_le_bytes()),
        (Variant::String(v), VariantTypeId::String) => write_string(out, v),
        (Variant::DateTime(v), VariantTypeId::DateTime) => write_long(out, v.ticks()),
        (Variant::Guid(v), VariantTypeId::Guid) => write_string(out, &v.to_string()),
        (Variant::ByteString(v), VariantTypeId::ByteString) => write_bytes(out, v),
        (Variant::StatusCode(v), VariantTypeId::StatusCode) => write_long(out, v.bits() as i64),
        (v, t) => return Err(mismatch("value", t, v)),
    }
    Ok(())
}

fn write_zero(out: &mut Vec<u8>, type_id: VariantTypeId) {
    match type_id {
        VariantTypeId::Empty => {}
        VariantTypeId::Boolean => out.push(0),
        VariantTypeId::Float => out.extend_from_slice(&0f32.to_le_bytes()),
        VariantTypeId::Double => out.extend_from_slice(&0f64.to_le_bytes()),
        VariantTypeId::Guid => write_string(out, &Guid::null().to_string()),
        // Strings and byte strings are length prefixed so zero is an empty one
        _ => write_long(out, 0),
    }
}

/// Zigzag encoded variable length integer, used for both int and long
fn write_long(out: &mut Vec<u8>, v: i64) {
    let mut n = ((v << 1) ^ (v >> 63)) as u64;
    while n & !0x7f != 0 {
        out.push(((n & 0x7f) | 0x80) as u8);
        n >>= 7;
    }
    out.push(n as u8);
}

fn write_bytes(out: &mut Vec<u8>, v: &[u8]) {
    write_long(out, v.len() as i64);
    out.extend_from_slice(v);
}

fn write_string(out: &mut Vec<u8>, v: &str) {
    write_bytes(out, v.as_bytes());
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zigzag() {
        let encoded = |v| {
            let mut out = Vec::new();
            write_long(&mut out, v);
            out
        };
        assert_eq!(encoded(0), vec![0x00]);
        assert_eq!(encoded(-1), vec![0x01]);
        assert_eq!(encoded(1), vec![0x02]);
        assert_eq!(encoded(-64), vec![0x7f]);
        assert_eq!(encoded(64), vec![0x80, 0x01]);
    }

    #[test]
    fn names() {
        assert_eq!(avro_name("Temperature"), "Temperature");
        assert_eq!(avro_name("ns=2;s=Pump.Speed"), "ns_2_s_Pump_Speed");
        assert_eq!(avro_name("1st"), "_1st");
    }
}

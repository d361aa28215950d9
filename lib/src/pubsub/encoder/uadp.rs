// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The binary (UADP) message mapping. The layout follows the UADP header structure, flags bytes
//! announcing the optional parts that follow, with the little endian primitives of the binary
//! encoding. Data set message headers are always written since the flags byte is mandatory.

use std::{io::Cursor, sync::Arc};

use crate::error::PublisherError;
use crate::pubsub::{data_set_message::*, meta_data::*, models::*, network_message::*};
use crate::types::*;

const UADP_VERSION: u8 = 0x01;
const UADP_VERSION_MASK: u8 = 0x0f;

// Network message flags
const NM_PUBLISHER_ID: u8 = 0x10;
const NM_GROUP_HEADER: u8 = 0x20;
const NM_PAYLOAD_HEADER: u8 = 0x40;
const NM_EXTENDED_FLAGS1: u8 = 0x80;

const EXT1_PUBLISHER_ID_STRING: u8 = 0x03;
const EXT1_DATA_SET_CLASS_ID: u8 = 0x08;
const EXT1_TIMESTAMP: u8 = 0x20;
const EXT1_PICOSECONDS: u8 = 0x40;
const EXT1_EXTENDED_FLAGS2: u8 = 0x80;

const EXT2_PROMOTED_FIELDS: u8 = 0x02;
const EXT2_DISCOVERY_RESPONSE: u8 = 0x08;

const GROUP_WRITER_GROUP_ID: u8 = 0x01;
const GROUP_GROUP_VERSION: u8 = 0x02;
const GROUP_NETWORK_MESSAGE_NUMBER: u8 = 0x04;
const GROUP_SEQUENCE_NUMBER: u8 = 0x08;

const DISCOVERY_RESPONSE_META_DATA: u8 = 0x02;

// Data set message flags
const DSM_VALID: u8 = 0x01;
const DSM_FIELD_RAW: u8 = 0x02;
const DSM_FIELD_DATA_VALUE: u8 = 0x04;
const DSM_SEQUENCE_NUMBER: u8 = 0x08;
const DSM_STATUS: u8 = 0x10;
const DSM_MAJOR_VERSION: u8 = 0x20;
const DSM_MINOR_VERSION: u8 = 0x40;
const DSM_FLAGS2: u8 = 0x80;

const DSM2_TYPE_MASK: u8 = 0x0f;
const DSM2_TIMESTAMP: u8 = 0x10;
const DSM2_PICOSECONDS: u8 = 0x20;

fn message_type_id(message_type: DataSetMessageType) -> u8 {
    match message_type {
        DataSetMessageType::KeyFrame => 0,
        DataSetMessageType::DeltaFrame => 1,
        DataSetMessageType::Event => 2,
        DataSetMessageType::KeepAlive => 3,
    }
}

fn message_type_from_id(id: u8) -> EncodingResult<DataSetMessageType> {
    match id {
        0 => Ok(DataSetMessageType::KeyFrame),
        1 => Ok(DataSetMessageType::DeltaFrame),
        2 => Ok(DataSetMessageType::Event),
        3 => Ok(DataSetMessageType::KeepAlive),
        _ => {
            error!("Invalid data set message type {}", id);
            Err(StatusCode::BadDecodingError)
        }
    }
}

pub(super) fn encode(message: &NetworkMessage) -> Result<Vec<u8>, PublisherError> {
    let mut stream = Vec::with_capacity(256);
    encode_header(&mut stream, message)?;
    match message.message_type {
        NetworkMessageType::Data => encode_payload(&mut stream, message)?,
        NetworkMessageType::MetaData => {
            let meta_data = message
                .meta_data
                .as_ref()
                .ok_or(StatusCode::BadEncodingError)?;
            encode_meta_data(&mut stream, meta_data)?;
        }
    }
    Ok(stream)
}

fn encode_header(stream: &mut Vec<u8>, message: &NetworkMessage) -> EncodingResult<()> {
    let mask = message.content_mask;
    let group_flags = group_flags(mask);
    let is_meta_data = message.message_type == NetworkMessageType::MetaData;
    let has_promoted = !is_meta_data
        && mask.contains(NetworkMessageContentFlags::PROMOTED_FIELDS)
        && !message.promoted_fields.is_empty();

    let mut flags = UADP_VERSION | NM_EXTENDED_FLAGS1;
    if mask.contains(NetworkMessageContentFlags::PUBLISHER_ID) {
        flags |= NM_PUBLISHER_ID;
    }
    if group_flags != 0 {
        flags |= NM_GROUP_HEADER;
    }
    if !is_meta_data && mask.contains(NetworkMessageContentFlags::PAYLOAD_HEADER) {
        flags |= NM_PAYLOAD_HEADER;
    }
    let mut ext1 = EXT1_PUBLISHER_ID_STRING;
    let class_id = message
        .data_set_class_id
        .filter(|_| mask.contains(NetworkMessageContentFlags::DATA_SET_CLASS_ID));
    if class_id.is_some() {
        ext1 |= EXT1_DATA_SET_CLASS_ID;
    }
    if mask.contains(NetworkMessageContentFlags::TIMESTAMP) {
        ext1 |= EXT1_TIMESTAMP;
    }
    if mask.contains(NetworkMessageContentFlags::PICOSECONDS) {
        ext1 |= EXT1_PICOSECONDS;
    }
    let mut ext2 = 0;
    if has_promoted {
        ext2 |= EXT2_PROMOTED_FIELDS;
    }
    if is_meta_data {
        ext2 |= EXT2_DISCOVERY_RESPONSE;
    }
    if ext2 != 0 {
        ext1 |= EXT1_EXTENDED_FLAGS2;
    }

    write_u8(stream, flags)?;
    write_u8(stream, ext1)?;
    if ext2 != 0 {
        write_u8(stream, ext2)?;
    }
    if flags & NM_PUBLISHER_ID != 0 {
        write_string(stream, Some(message.publisher_id.as_str()))?;
    }
    if let Some(class_id) = class_id {
        class_id.encode(stream)?;
    }
    if group_flags != 0 {
        write_u8(stream, group_flags)?;
        if group_flags & GROUP_WRITER_GROUP_ID != 0 {
            write_u16(stream, message.writer_group_id)?;
        }
        if group_flags & GROUP_GROUP_VERSION != 0 {
            write_u32(stream, message.group_version)?;
        }
        if group_flags & GROUP_NETWORK_MESSAGE_NUMBER != 0 {
            write_u16(stream, message.network_message_number)?;
        }
        if group_flags & GROUP_SEQUENCE_NUMBER != 0 {
            write_u16(stream, message.sequence_number)?;
        }
    }
    if flags & NM_PAYLOAD_HEADER != 0 {
        if message.messages.len() > u8::MAX as usize {
            error!("Too many data set messages ({}) for one network message", message.messages.len());
            return Err(StatusCode::BadEncodingLimitsExceeded);
        }
        write_u8(stream, message.messages.len() as u8)?;
        for m in &message.messages {
            write_u16(stream, m.data_set_writer_id)?;
        }
    }
    if ext1 & EXT1_TIMESTAMP != 0 {
        message.timestamp.encode(stream)?;
    }
    if ext1 & EXT1_PICOSECONDS != 0 {
        write_u16(stream, message.picoseconds)?;
    }
    if has_promoted {
        let mut promoted = Vec::new();
        for f in &message.promoted_fields {
            f.value.value.clone().unwrap_or_default().encode(&mut promoted)?;
        }
        let size = u16::try_from(promoted.len()).map_err(|_| StatusCode::BadEncodingLimitsExceeded)?;
        write_u16(stream, size)?;
        stream.extend_from_slice(&promoted);
    }
    Ok(())
}

fn group_flags(mask: NetworkMessageContentFlags) -> u8 {
    let mut flags = 0;
    if mask.contains(NetworkMessageContentFlags::GROUP_HEADER) {
        if mask.contains(NetworkMessageContentFlags::WRITER_GROUP_ID) {
            flags |= GROUP_WRITER_GROUP_ID;
        }
        if mask.contains(NetworkMessageContentFlags::GROUP_VERSION) {
            flags |= GROUP_GROUP_VERSION;
        }
        if mask.contains(NetworkMessageContentFlags::NETWORK_MESSAGE_NUMBER) {
            flags |= GROUP_NETWORK_MESSAGE_NUMBER;
        }
        if mask.contains(NetworkMessageContentFlags::SEQUENCE_NUMBER) {
            flags |= GROUP_SEQUENCE_NUMBER;
        }
    }
    flags
}

fn encode_payload(stream: &mut Vec<u8>, message: &NetworkMessage) -> EncodingResult<()> {
    let encoded = message
        .messages
        .iter()
        .map(encode_data_set_message)
        .collect::<EncodingResult<Vec<_>>>()?;
    // Sizes let a reader skip messages it is not interested in
    if message.content_mask.contains(NetworkMessageContentFlags::PAYLOAD_HEADER) && encoded.len() > 1 {
        for m in &encoded {
            if m.len() > u16::MAX as usize {
                return Err(StatusCode::BadEncodingLimitsExceeded);
            }
            write_u16(stream, m.len() as u16)?;
        }
    }
    for m in encoded {
        stream.extend_from_slice(&m);
    }
    Ok(())
}

fn encode_data_set_message(dsm: &DataSetMessage) -> EncodingResult<Vec<u8>> {
    let mask = dsm.message_content_mask;
    let field_mask = dsm.field_content_mask;
    let mut flags1 = DSM_VALID | DSM_FLAGS2;
    if field_mask.contains(DataSetFieldContentFlags::RAW_DATA) {
        flags1 |= DSM_FIELD_RAW;
    } else if !field_mask.data_value_parts().is_empty() {
        flags1 |= DSM_FIELD_DATA_VALUE;
    }
    if mask.contains(DataSetMessageContentFlags::SEQUENCE_NUMBER) {
        flags1 |= DSM_SEQUENCE_NUMBER;
    }
    if mask.contains(DataSetMessageContentFlags::STATUS) {
        flags1 |= DSM_STATUS;
    }
    if mask.intersects(DataSetMessageContentFlags::META_DATA_VERSION | DataSetMessageContentFlags::MAJOR_VERSION) {
        flags1 |= DSM_MAJOR_VERSION;
    }
    if mask.intersects(DataSetMessageContentFlags::META_DATA_VERSION | DataSetMessageContentFlags::MINOR_VERSION) {
        flags1 |= DSM_MINOR_VERSION;
    }
    let mut flags2 = message_type_id(dsm.message_type);
    if mask.contains(DataSetMessageContentFlags::TIMESTAMP) {
        flags2 |= DSM2_TIMESTAMP;
    }
    if mask.contains(DataSetMessageContentFlags::PICO_SECONDS) {
        flags2 |= DSM2_PICOSECONDS;
    }

    let mut stream = Vec::with_capacity(64);
    write_u8(&mut stream, flags1)?;
    write_u8(&mut stream, flags2)?;
    if flags1 & DSM_SEQUENCE_NUMBER != 0 {
        write_u16(&mut stream, dsm.sequence_number as u16)?;
    }
    if flags2 & DSM2_TIMESTAMP != 0 {
        dsm.timestamp.encode(&mut stream)?;
    }
    if flags2 & DSM2_PICOSECONDS != 0 {
        write_u16(&mut stream, dsm.picoseconds)?;
    }
    if flags1 & DSM_STATUS != 0 {
        write_u16(&mut stream, (dsm.status.bits() >> 16) as u16)?;
    }
    if flags1 & DSM_MAJOR_VERSION != 0 {
        write_u32(&mut stream, dsm.meta_data_version.major_version)?;
    }
    if flags1 & DSM_MINOR_VERSION != 0 {
        write_u32(&mut stream, dsm.meta_data_version.minor_version)?;
    }

    let fields = dsm.payload.fields();
    match dsm.message_type {
        DataSetMessageType::KeepAlive => {}
        DataSetMessageType::DeltaFrame => {
            write_u16(&mut stream, fields.len() as u16)?;
            for f in fields {
                write_u16(&mut stream, f.index)?;
                encode_field(&mut stream, f, flags1, field_mask)?;
            }
        }
        DataSetMessageType::KeyFrame | DataSetMessageType::Event => {
            write_u16(&mut stream, fields.len() as u16)?;
            for f in fields {
                encode_field(&mut stream, f, flags1, field_mask)?;
            }
        }
    }
    Ok(stream)
}

fn encode_field(
    stream: &mut Vec<u8>,
    field: &DataSetField,
    flags1: u8,
    mask: DataSetFieldContentFlags,
) -> EncodingResult<usize> {
    if flags1 & DSM_FIELD_DATA_VALUE != 0 {
        let dv = &field.value;
        let masked = DataValue {
            value: dv.value.clone(),
            status: dv
                .status
                .filter(|_| mask.contains(DataSetFieldContentFlags::STATUS_CODE)),
            source_timestamp: dv
                .source_timestamp
                .filter(|_| mask.contains(DataSetFieldContentFlags::SOURCE_TIMESTAMP)),
            source_picoseconds: dv
                .source_picoseconds
                .filter(|_| mask.contains(DataSetFieldContentFlags::SOURCE_PICO_SECONDS)),
            server_timestamp: dv
                .server_timestamp
                .filter(|_| mask.contains(DataSetFieldContentFlags::SERVER_TIMESTAMP)),
            server_picoseconds: dv
                .server_picoseconds
                .filter(|_| mask.contains(DataSetFieldContentFlags::SERVER_PICO_SECONDS)),
        };
        masked.encode(stream)
    } else {
        field.value.value.clone().unwrap_or_default().encode(stream)
    }
}

fn encode_meta_data(stream: &mut Vec<u8>, message: &DataSetMetaDataMessage) -> EncodingResult<()> {
    let meta_data = &message.meta_data;
    write_u8(stream, DISCOVERY_RESPONSE_META_DATA)?;
    write_u16(stream, message.data_set_writer_id)?;
    write_string(stream, Some(message.data_set_writer_name.as_str()))?;
    write_string(stream, Some(meta_data.name.as_str()))?;
    meta_data.data_set_class_id.unwrap_or_default().encode(stream)?;
    write_u16(stream, meta_data.fields.len() as u16)?;
    for f in &meta_data.fields {
        write_string(stream, Some(f.name.as_str()))?;
        write_u8(stream, f.built_in_type.map(|t| t.id()).unwrap_or(0))?;
        write_i32(stream, f.value_rank)?;
        f.data_set_field_id.encode(stream)?;
    }
    write_u32(stream, meta_data.configuration_version.major_version)?;
    write_u32(stream, meta_data.configuration_version.minor_version)?;
    Ok(())
}

pub(super) fn decode(bytes: &[u8]) -> Result<NetworkMessage, PublisherError> {
    let options = DecodingOptions::default();
    let mut stream = Cursor::new(bytes);
    let message = decode_network_message(&mut stream, &options)?;
    Ok(message)
}

fn decode_network_message(
    stream: &mut Cursor<&[u8]>,
    options: &DecodingOptions,
) -> EncodingResult<NetworkMessage> {
    let flags = read_u8(stream)?;
    if flags & UADP_VERSION_MASK != UADP_VERSION {
        error!("Unsupported UADP version {}", flags & UADP_VERSION_MASK);
        return Err(StatusCode::BadDecodingError);
    }
    let ext1 = if flags & NM_EXTENDED_FLAGS1 != 0 {
        read_u8(stream)?
    } else {
        0
    };
    let ext2 = if ext1 & EXT1_EXTENDED_FLAGS2 != 0 {
        read_u8(stream)?
    } else {
        0
    };

    let mut mask = NetworkMessageContentFlags::NETWORK_MESSAGE_HEADER
        | NetworkMessageContentFlags::DATA_SET_MESSAGE_HEADER;
    let mut message = NetworkMessage::default();
    if flags & NM_PUBLISHER_ID != 0 {
        mask |= NetworkMessageContentFlags::PUBLISHER_ID;
        message.publisher_id = read_string(stream, options)?.unwrap_or_default();
    }
    if ext1 & EXT1_DATA_SET_CLASS_ID != 0 {
        mask |= NetworkMessageContentFlags::DATA_SET_CLASS_ID;
        message.data_set_class_id = Some(Guid::decode(stream, options)?);
    }
    if flags & NM_GROUP_HEADER != 0 {
        mask |= NetworkMessageContentFlags::GROUP_HEADER;
        let group_flags = read_u8(stream)?;
        if group_flags & GROUP_WRITER_GROUP_ID != 0 {
            mask |= NetworkMessageContentFlags::WRITER_GROUP_ID;
            message.writer_group_id = read_u16(stream)?;
        }
        if group_flags & GROUP_GROUP_VERSION != 0 {
            mask |= NetworkMessageContentFlags::GROUP_VERSION;
            message.group_version = read_u32(stream)?;
        }
        if group_flags & GROUP_NETWORK_MESSAGE_NUMBER != 0 {
            mask |= NetworkMessageContentFlags::NETWORK_MESSAGE_NUMBER;
            message.network_message_number = read_u16(stream)?;
        }
        if group_flags & GROUP_SEQUENCE_NUMBER != 0 {
            mask |= NetworkMessageContentFlags::SEQUENCE_NUMBER;
            message.sequence_number = read_u16(stream)?;
        }
    }
    let writer_ids = if flags & NM_PAYLOAD_HEADER != 0 {
        mask |= NetworkMessageContentFlags::PAYLOAD_HEADER;
        let count = read_u8(stream)?;
        (0..count)
            .map(|_| read_u16(stream))
            .collect::<EncodingResult<Vec<_>>>()?
    } else {
        Vec::new()
    };
    if ext1 & EXT1_TIMESTAMP != 0 {
        mask |= NetworkMessageContentFlags::TIMESTAMP;
        message.timestamp = DateTime::decode(stream, options)?;
    }
    if ext1 & EXT1_PICOSECONDS != 0 {
        mask |= NetworkMessageContentFlags::PICOSECONDS;
        message.picoseconds = read_u16(stream)?;
    }
    if ext2 & EXT2_PROMOTED_FIELDS != 0 {
        mask |= NetworkMessageContentFlags::PROMOTED_FIELDS;
        let size = read_u16(stream)? as u64;
        let end = stream.position() + size;
        let mut index = 0;
        while stream.position() < end {
            let value = Variant::decode(stream, options)?;
            let mut field = DataSetField::new(index, index.to_string(), DataValue::from(value));
            field.promoted = true;
            message.promoted_fields.push(field);
            index += 1;
        }
    }
    message.content_mask = mask;

    if ext2 & EXT2_DISCOVERY_RESPONSE != 0 {
        message.message_type = NetworkMessageType::MetaData;
        message.meta_data = Some(decode_meta_data(stream, options)?);
        return Ok(message);
    }

    if writer_ids.len() > 1 {
        // Sizes are only needed to skip messages
        for _ in 0..writer_ids.len() {
            read_u16(stream)?;
        }
    }
    let end = stream.get_ref().len() as u64;
    let mut i = 0;
    while stream.position() < end && (writer_ids.is_empty() || i < writer_ids.len()) {
        let mut dsm = decode_data_set_message(stream, options)?;
        if let Some(writer_id) = writer_ids.get(i) {
            dsm.data_set_writer_id = *writer_id;
        }
        message.messages.push(dsm);
        i += 1;
    }
    Ok(message)
}

fn decode_data_set_message(
    stream: &mut Cursor<&[u8]>,
    options: &DecodingOptions,
) -> EncodingResult<DataSetMessage> {
    let flags1 = read_u8(stream)?;
    if flags1 & DSM_VALID == 0 {
        error!("Data set message is not valid");
        return Err(StatusCode::BadDecodingError);
    }
    let flags2 = if flags1 & DSM_FLAGS2 != 0 {
        read_u8(stream)?
    } else {
        0
    };
    let mut mask = DataSetMessageContentFlags::empty();
    let mut dsm = DataSetMessage {
        message_type: message_type_from_id(flags2 & DSM2_TYPE_MASK)?,
        ..Default::default()
    };
    if flags1 & DSM_SEQUENCE_NUMBER != 0 {
        mask |= DataSetMessageContentFlags::SEQUENCE_NUMBER;
        dsm.sequence_number = read_u16(stream)? as u32;
    }
    if flags2 & DSM2_TIMESTAMP != 0 {
        mask |= DataSetMessageContentFlags::TIMESTAMP;
        dsm.timestamp = DateTime::decode(stream, options)?;
    }
    if flags2 & DSM2_PICOSECONDS != 0 {
        mask |= DataSetMessageContentFlags::PICO_SECONDS;
        dsm.picoseconds = read_u16(stream)?;
    }
    if flags1 & DSM_STATUS != 0 {
        mask |= DataSetMessageContentFlags::STATUS;
        dsm.status = StatusCode::from_bits_truncate((read_u16(stream)? as u32) << 16);
    }
    if flags1 & DSM_MAJOR_VERSION != 0 {
        mask |= DataSetMessageContentFlags::MAJOR_VERSION;
        dsm.meta_data_version.major_version = read_u32(stream)?;
    }
    if flags1 & DSM_MINOR_VERSION != 0 {
        mask |= DataSetMessageContentFlags::MINOR_VERSION;
        dsm.meta_data_version.minor_version = read_u32(stream)?;
    }
    dsm.message_content_mask = mask;
    dsm.field_content_mask = if flags1 & DSM_FIELD_RAW != 0 {
        DataSetFieldContentFlags::RAW_DATA
    } else if flags1 & DSM_FIELD_DATA_VALUE != 0 {
        DataSetFieldContentFlags::default()
    } else {
        DataSetFieldContentFlags::empty()
    };

    let mut fields = Vec::new();
    match dsm.message_type {
        DataSetMessageType::KeepAlive => {}
        DataSetMessageType::DeltaFrame => {
            let count = read_u16(stream)?;
            for _ in 0..count {
                let index = read_u16(stream)?;
                fields.push(decode_field(stream, options, index, flags1)?);
            }
        }
        DataSetMessageType::KeyFrame | DataSetMessageType::Event => {
            let count = read_u16(stream)?;
            for index in 0..count {
                fields.push(decode_field(stream, options, index, flags1)?);
            }
        }
    }
    dsm.payload = Payload::Fields(fields);
    Ok(dsm)
}

/// Field names are not carried by the binary mapping, fields are named by their index
fn decode_field(
    stream: &mut Cursor<&[u8]>,
    options: &DecodingOptions,
    index: u16,
    flags1: u8,
) -> EncodingResult<DataSetField> {
    let value = if flags1 & DSM_FIELD_DATA_VALUE != 0 {
        DataValue::decode(stream, options)?
    } else {
        match Variant::decode(stream, options)? {
            Variant::Empty => DataValue::default(),
            v => DataValue::from(v),
        }
    };
    Ok(DataSetField::new(index, index.to_string(), value))
}

fn decode_meta_data(
    stream: &mut Cursor<&[u8]>,
    options: &DecodingOptions,
) -> EncodingResult<DataSetMetaDataMessage> {
    let response_type = read_u8(stream)?;
    if response_type != DISCOVERY_RESPONSE_META_DATA {
        error!("Unsupported discovery response type {}", response_type);
        return Err(StatusCode::BadDecodingError);
    }
    let data_set_writer_id = read_u16(stream)?;
    let data_set_writer_name = read_string(stream, options)?.unwrap_or_default();
    let name = read_string(stream, options)?.unwrap_or_default();
    let class_id = Guid::decode(stream, options)?;
    let count = read_u16(stream)?;
    let mut fields = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let mut field = FieldMetaData::new(read_string(stream, options)?.unwrap_or_default(), None);
        field.built_in_type = match read_u8(stream)? {
            0 => None,
            id => Some(VariantTypeId::try_from(id)?),
        };
        field.value_rank = read_i32(stream)?;
        field.data_set_field_id = Guid::decode(stream, options)?;
        fields.push(field);
    }
    let class_id = if class_id.is_null() { None } else { Some(class_id) };
    let mut meta_data = DataSetMetaData::new(name, class_id, fields);
    meta_data.configuration_version =
        ConfigurationVersion::new(read_u32(stream)?, read_u32(stream)?);
    Ok(DataSetMetaDataMessage {
        data_set_writer_id,
        data_set_writer_name,
        meta_data: Arc::new(meta_data),
    })
}

// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `DataValue`.

use std::io::{Read, Write};

use crate::types::{
    date_time::*, encoding::*, status_code::StatusCode, variant::Variant,
};

bitflags! {
    struct DataValueFlags: u8 {
        /// False if the Value is Null.
        const HAS_VALUE = 0x1;
        /// False if the StatusCode is Good.
        const HAS_STATUS = 0x2;
        /// False if the Source Timestamp is DateTime.MinValue.
        const HAS_SOURCE_TIMESTAMP = 0x4;
        /// False if the Server Timestamp is DateTime.MinValue.
        const HAS_SERVER_TIMESTAMP = 0x8;
        /// False if the Source Picoseconds is 0.
        const HAS_SOURCE_PICOSECONDS = 0x10;
        /// False if the Server Picoseconds is 0.
        const HAS_SERVER_PICOSECONDS = 0x20;
    }
}

/// A data value is a sampled value of a variable together with its status and timestamps.
/// Every part is optional, an unset part is absent from the encoded form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DataValue {
    /// The value. BaseDataType
    pub value: Option<Variant>,
    /// The status associated with the value. Absent means Good.
    pub status: Option<StatusCode>,
    /// The source timestamp associated with the value.
    pub source_timestamp: Option<DateTime>,
    /// The number of 10 picosecond intervals for the SourceTimestamp.
    pub source_picoseconds: Option<i16>,
    /// The Server timestamp associated with the value.
    pub server_timestamp: Option<DateTime>,
    /// The number of 10 picosecond intervals for the ServerTimestamp.
    pub server_picoseconds: Option<i16>,
}

impl BinaryEncoder<DataValue> for DataValue {
    fn byte_len(&self) -> usize {
        let mut size = 1;
        if let Some(ref value) = self.value {
            size += value.byte_len();
        }
        if self.status.is_some() {
            size += 4;
        }
        if self.source_timestamp.is_some() {
            size += 8;
            if self.source_picoseconds.is_some() {
                size += 2;
            }
        }
        if self.server_timestamp.is_some() {
            size += 8;
            if self.server_picoseconds.is_some() {
                size += 2;
            }
        }
        size
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let encoding_mask = self.encoding_mask();
        let mut size = write_u8(stream, encoding_mask.bits())?;
        if let Some(ref value) = self.value {
            size += value.encode(stream)?;
        }
        if let Some(ref status) = self.status {
            size += status.encode(stream)?;
        }
        if let Some(ref source_timestamp) = self.source_timestamp {
            size += source_timestamp.encode(stream)?;
            if let Some(picos) = self.source_picoseconds {
                size += write_i16(stream, picos)?;
            }
        }
        if let Some(ref server_timestamp) = self.server_timestamp {
            size += server_timestamp.encode(stream)?;
            if let Some(picos) = self.server_picoseconds {
                size += write_i16(stream, picos)?;
            }
        }
        Ok(size)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        let encoding_mask = DataValueFlags::from_bits_truncate(read_u8(stream)?);
        let value = if encoding_mask.contains(DataValueFlags::HAS_VALUE) {
            Some(Variant::decode(stream, decoding_options)?)
        } else {
            None
        };
        let status = if encoding_mask.contains(DataValueFlags::HAS_STATUS) {
            Some(StatusCode::decode(stream, decoding_options)?)
        } else {
            None
        };
        let mut data_value = DataValue {
            value,
            status,
            ..Default::default()
        };
        // Picoseconds only follow their timestamp
        if encoding_mask.contains(DataValueFlags::HAS_SOURCE_TIMESTAMP) {
            data_value.source_timestamp = Some(DateTime::decode(stream, decoding_options)?);
            if encoding_mask.contains(DataValueFlags::HAS_SOURCE_PICOSECONDS) {
                data_value.source_picoseconds = Some(read_i16(stream)?);
            }
        }
        if encoding_mask.contains(DataValueFlags::HAS_SERVER_TIMESTAMP) {
            data_value.server_timestamp = Some(DateTime::decode(stream, decoding_options)?);
            if encoding_mask.contains(DataValueFlags::HAS_SERVER_PICOSECONDS) {
                data_value.server_picoseconds = Some(read_i16(stream)?);
            }
        }
        Ok(data_value)
    }
}

impl From<Variant> for DataValue {
    fn from(v: Variant) -> Self {
        DataValue {
            value: Some(v),
            ..Default::default()
        }
    }
}

macro_rules! data_value_from {
    ($($t:ty),*) => {
        $(
        impl From<$t> for DataValue {
            fn from(v: $t) -> Self {
                Self::from(Variant::from(v))
            }
        }
        )*
    };
}

data_value_from!(bool, i8, u8, i16, u16, i32, u32, i64, u64, f32, f64, String, &str);

impl DataValue {
    /// Creates a data value with the supplied value, good status and both timestamps set to `now`
    pub fn new_at<V>(value: V, now: DateTime) -> DataValue
    where
        V: Into<Variant>,
    {
        DataValue {
            value: Some(value.into()),
            status: Some(StatusCode::Good),
            source_timestamp: Some(now),
            server_timestamp: Some(now),
            ..Default::default()
        }
    }

    /// Creates a data value holding only a status, e.g. a failed read
    pub fn new_status(status: StatusCode, now: DateTime) -> DataValue {
        DataValue {
            value: None,
            status: Some(status),
            source_timestamp: None,
            server_timestamp: Some(now),
            ..Default::default()
        }
    }

    /// The status of the value. An absent status is Good.
    pub fn status(&self) -> StatusCode {
        self.status.unwrap_or(StatusCode::Good)
    }

    /// Tests if the value has a non-empty value
    pub fn has_value(&self) -> bool {
        matches!(self.value, Some(ref v) if !v.is_empty())
    }

    /// The value counts as good when its status is good, or when it carries a value and the
    /// status is not bad.
    pub fn is_good(&self) -> bool {
        match self.status {
            None => self.has_value(),
            Some(status) => status.is_good() || (self.has_value() && !status.is_bad()),
        }
    }

    /// Bad status or nothing to report
    pub fn is_bad_or_empty(&self) -> bool {
        self.status().is_bad() || !self.has_value()
    }

    /// The timestamp that best describes when the value was sampled
    pub fn timestamp(&self) -> Option<DateTime> {
        self.source_timestamp.or(self.server_timestamp)
    }

    fn encoding_mask(&self) -> DataValueFlags {
        let mut encoding_mask = DataValueFlags::empty();
        if self.value.is_some() {
            encoding_mask |= DataValueFlags::HAS_VALUE;
        }
        if self.status.is_some() {
            encoding_mask |= DataValueFlags::HAS_STATUS;
        }
        if self.source_timestamp.is_some() {
            encoding_mask |= DataValueFlags::HAS_SOURCE_TIMESTAMP;
            if self.source_picoseconds.is_some() {
                encoding_mask |= DataValueFlags::HAS_SOURCE_PICOSECONDS;
            }
        }
        if self.server_timestamp.is_some() {
            encoding_mask |= DataValueFlags::HAS_SERVER_TIMESTAMP;
            if self.server_picoseconds.is_some() {
                encoding_mask |= DataValueFlags::HAS_SERVER_PICOSECONDS;
            }
        }
        encoding_mask
    }
}

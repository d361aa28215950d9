// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Flags style enumerations. Each is a bitmask with named constants. Human-readable formats
//! (JSON, YAML) carry them as the comma separated set of their names, compact formats carry
//! the numeric mask. Both forms are accepted on input.

use std::{fmt, str::FromStr};

use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::error::PublisherError;

/// Implements names, Display, FromStr and serde for a bitflags type. Names are matched in the
/// order given so composite names must precede their parts.
macro_rules! flag_names {
    ($t:ident, $empty:expr, [$($name:expr => $flag:ident),* $(,)?]) => {
        impl $t {
            /// Name of the empty set
            pub const EMPTY_NAME: &'static str = $empty;
            /// Names in match order, composites first
            pub const NAMES: &'static [(&'static str, $t)] = &[$(($name, $t::$flag)),*];
        }

        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_empty() {
                    return write!(f, "{}", Self::EMPTY_NAME);
                }
                let mut remaining = *self;
                let mut first = true;
                for (name, flag) in Self::NAMES {
                    if !flag.is_empty() && remaining.contains(*flag) {
                        if !first {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", name)?;
                        first = false;
                        remaining.remove(*flag);
                    }
                }
                Ok(())
            }
        }

        impl FromStr for $t {
            type Err = PublisherError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                let mut result = $t::empty();
                for token in s.split(|c| c == ',' || c == '|').map(str::trim) {
                    if token.is_empty() || token.eq_ignore_ascii_case(Self::EMPTY_NAME) {
                        continue;
                    }
                    if let Some((_, flag)) = Self::NAMES
                        .iter()
                        .find(|(name, _)| name.eq_ignore_ascii_case(token))
                    {
                        result |= *flag;
                    } else if let Ok(bits) = token.parse::<u32>() {
                        result |= $t::from_bits_truncate(bits as _);
                    } else {
                        return Err(PublisherError::InvalidConfiguration(format!(
                            "{} is not a valid {}",
                            token,
                            stringify!($t)
                        )));
                    }
                }
                Ok(result)
            }
        }

        impl Serialize for $t {
            fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
            where
                S: Serializer,
            {
                if serializer.is_human_readable() {
                    serializer.collect_str(self)
                } else {
                    serializer.serialize_u64(self.bits() as u64)
                }
            }
        }

        impl<'de> Deserialize<'de> for $t {
            fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
            where
                D: Deserializer<'de>,
            {
                struct FlagsVisitor;

                impl<'de> Visitor<'de> for FlagsVisitor {
                    type Value = $t;

                    fn expecting(&self, formatter: &mut fmt::Formatter) -> fmt::Result {
                        write!(formatter, "a {} name list or bitmask", stringify!($t))
                    }

                    fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
                    where
                        E: de::Error,
                    {
                        Ok($t::from_bits_truncate(v as _))
                    }

                    fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
                    where
                        E: de::Error,
                    {
                        Ok($t::from_bits_truncate(v as _))
                    }

                    fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
                    where
                        E: de::Error,
                    {
                        $t::from_str(v).map_err(E::custom)
                    }
                }

                deserializer.deserialize_any(FlagsVisitor)
            }
        }
    };
}

bitflags! {
    /// The encoding of network messages. Exactly one base encoding (Uadp, Json, Xml, Avro) is
    /// combined with the optional reversible and gzip modifiers.
    pub struct MessageEncoding: u32 {
        const UADP = 0x1;
        const JSON = 0x2;
        const XML = 0x4;
        const AVRO = 0x8;
        const IS_REVERSIBLE = 0x10;
        const IS_GZIP_COMPRESSED = 0x20;
        const JSON_REVERSIBLE = Self::JSON.bits | Self::IS_REVERSIBLE.bits;
        const JSON_GZIP = Self::JSON.bits | Self::IS_GZIP_COMPRESSED.bits;
        const AVRO_GZIP = Self::AVRO.bits | Self::IS_GZIP_COMPRESSED.bits;
        const JSON_REVERSIBLE_GZIP = Self::JSON_REVERSIBLE.bits | Self::IS_GZIP_COMPRESSED.bits;
    }
}

flag_names!(MessageEncoding, "None", [
    "JsonReversibleGzip" => JSON_REVERSIBLE_GZIP,
    "JsonReversible" => JSON_REVERSIBLE,
    "JsonGzip" => JSON_GZIP,
    "AvroGzip" => AVRO_GZIP,
    "Uadp" => UADP,
    "Json" => JSON,
    "Xml" => XML,
    "Avro" => AVRO,
    "IsReversible" => IS_REVERSIBLE,
    "IsGzipCompressed" => IS_GZIP_COMPRESSED,
]);

impl Default for MessageEncoding {
    fn default() -> Self {
        MessageEncoding::JSON
    }
}

impl MessageEncoding {
    /// The base encodings present in the mask
    pub fn base(&self) -> MessageEncoding {
        *self & (MessageEncoding::UADP | MessageEncoding::JSON | MessageEncoding::XML | MessageEncoding::AVRO)
    }

    pub fn is_reversible(&self) -> bool {
        self.contains(MessageEncoding::IS_REVERSIBLE)
    }

    pub fn is_gzip_compressed(&self) -> bool {
        self.contains(MessageEncoding::IS_GZIP_COMPRESSED)
    }
}

bitflags! {
    /// Synthetic value behavior of a field that received no update within its heartbeat
    /// interval. The empty set is `WatchdogLKV`: emit the last known value once.
    pub struct HeartbeatBehavior: u32 {
        /// Only the last good value is emitted
        const WATCHDOG_LKG = 0x1;
        /// Keep emitting every interval until a real value arrives
        const PERIODIC_LKV = 0x2;
        const PERIODIC_LKG = Self::PERIODIC_LKV.bits | Self::WATCHDOG_LKG.bits;
        /// Synthetic values carry the emission time rather than the sample time
        const WATCHDOG_LKV_WITH_UPDATED_TIMESTAMPS = 0x4;
        /// No value is emitted, only a diagnostics counter moves
        const WATCHDOG_LKV_DIAGNOSTICS_ONLY = 0x8;
    }
}

flag_names!(HeartbeatBehavior, "WatchdogLKV", [
    "PeriodicLKG" => PERIODIC_LKG,
    "WatchdogLKG" => WATCHDOG_LKG,
    "PeriodicLKV" => PERIODIC_LKV,
    "WatchdogLKVWithUpdatedTimestamps" => WATCHDOG_LKV_WITH_UPDATED_TIMESTAMPS,
    "WatchdogLKVDiagnosticsOnly" => WATCHDOG_LKV_DIAGNOSTICS_ONLY,
]);

impl Default for HeartbeatBehavior {
    fn default() -> Self {
        HeartbeatBehavior::empty()
    }
}

impl HeartbeatBehavior {
    pub const WATCHDOG_LKV: HeartbeatBehavior = HeartbeatBehavior { bits: 0 };

    pub fn is_periodic(&self) -> bool {
        self.contains(HeartbeatBehavior::PERIODIC_LKV)
    }

    pub fn is_last_known_good(&self) -> bool {
        self.contains(HeartbeatBehavior::WATCHDOG_LKG)
    }

    pub fn updates_timestamps(&self) -> bool {
        self.contains(HeartbeatBehavior::WATCHDOG_LKV_WITH_UPDATED_TIMESTAMPS)
    }

    pub fn is_diagnostics_only(&self) -> bool {
        self.contains(HeartbeatBehavior::WATCHDOG_LKV_DIAGNOSTICS_ONLY)
    }
}

bitflags! {
    /// Optional parts of a network message
    pub struct NetworkMessageContentFlags: u32 {
        const PUBLISHER_ID = 0x1;
        const GROUP_HEADER = 0x2;
        const WRITER_GROUP_ID = 0x4;
        const GROUP_VERSION = 0x8;
        const NETWORK_MESSAGE_NUMBER = 0x10;
        const SEQUENCE_NUMBER = 0x20;
        const PAYLOAD_HEADER = 0x40;
        const TIMESTAMP = 0x80;
        const PICOSECONDS = 0x100;
        const DATA_SET_CLASS_ID = 0x200;
        const PROMOTED_FIELDS = 0x400;
        const NETWORK_MESSAGE_HEADER = 0x800;
        const DATA_SET_MESSAGE_HEADER = 0x1000;
        const SINGLE_DATA_SET_MESSAGE = 0x2000;
        const REPLY_TO = 0x4000;
    }
}

flag_names!(NetworkMessageContentFlags, "None", [
    "PublisherId" => PUBLISHER_ID,
    "GroupHeader" => GROUP_HEADER,
    "WriterGroupId" => WRITER_GROUP_ID,
    "GroupVersion" => GROUP_VERSION,
    "NetworkMessageNumber" => NETWORK_MESSAGE_NUMBER,
    "SequenceNumber" => SEQUENCE_NUMBER,
    "PayloadHeader" => PAYLOAD_HEADER,
    "Timestamp" => TIMESTAMP,
    "Picoseconds" => PICOSECONDS,
    "DataSetClassId" => DATA_SET_CLASS_ID,
    "PromotedFields" => PROMOTED_FIELDS,
    "NetworkMessageHeader" => NETWORK_MESSAGE_HEADER,
    "DataSetMessageHeader" => DATA_SET_MESSAGE_HEADER,
    "SingleDataSetMessage" => SINGLE_DATA_SET_MESSAGE,
    "ReplyTo" => REPLY_TO,
]);

impl Default for NetworkMessageContentFlags {
    fn default() -> Self {
        NetworkMessageContentFlags::PUBLISHER_ID
            | NetworkMessageContentFlags::WRITER_GROUP_ID
            | NetworkMessageContentFlags::NETWORK_MESSAGE_HEADER
            | NetworkMessageContentFlags::DATA_SET_MESSAGE_HEADER
    }
}

bitflags! {
    /// Optional header parts of a data set message
    pub struct DataSetMessageContentFlags: u32 {
        const TIMESTAMP = 0x1;
        const PICO_SECONDS = 0x2;
        const STATUS = 0x4;
        const META_DATA_VERSION = 0x8;
        const MAJOR_VERSION = 0x10;
        const MINOR_VERSION = 0x20;
        const SEQUENCE_NUMBER = 0x40;
        const DATA_SET_WRITER_ID = 0x80;
        const DATA_SET_WRITER_NAME = 0x100;
        const MESSAGE_TYPE = 0x200;
        const PUBLISHER_ID = 0x400;
        const WRITER_GROUP_NAME = 0x800;
    }
}

flag_names!(DataSetMessageContentFlags, "None", [
    "Timestamp" => TIMESTAMP,
    "PicoSeconds" => PICO_SECONDS,
    "Status" => STATUS,
    "MetaDataVersion" => META_DATA_VERSION,
    "MajorVersion" => MAJOR_VERSION,
    "MinorVersion" => MINOR_VERSION,
    "SequenceNumber" => SEQUENCE_NUMBER,
    "DataSetWriterId" => DATA_SET_WRITER_ID,
    "DataSetWriterName" => DATA_SET_WRITER_NAME,
    "MessageType" => MESSAGE_TYPE,
    "PublisherId" => PUBLISHER_ID,
    "WriterGroupName" => WRITER_GROUP_NAME,
]);

impl Default for DataSetMessageContentFlags {
    fn default() -> Self {
        DataSetMessageContentFlags::DATA_SET_WRITER_ID
            | DataSetMessageContentFlags::SEQUENCE_NUMBER
            | DataSetMessageContentFlags::META_DATA_VERSION
            | DataSetMessageContentFlags::TIMESTAMP
            | DataSetMessageContentFlags::STATUS
            | DataSetMessageContentFlags::MESSAGE_TYPE
    }
}

bitflags! {
    /// Optional parts of each field of a data set message. With none of the value flags the
    /// field is a Variant, with `RAW_DATA` it is the bare value, otherwise it is a DataValue
    /// holding the selected parts. The upper flags add per field identification.
    pub struct DataSetFieldContentFlags: u32 {
        const STATUS_CODE = 0x1;
        const SOURCE_TIMESTAMP = 0x2;
        const SERVER_TIMESTAMP = 0x4;
        const SOURCE_PICO_SECONDS = 0x8;
        const SERVER_PICO_SECONDS = 0x10;
        const RAW_DATA = 0x20;
        const SINGLE_FIELD_DEGRADE_TO_VALUE = 0x40;
        const NODE_ID = 0x10000;
        const DISPLAY_NAME = 0x20000;
        const ENDPOINT_URL = 0x40000;
        const APPLICATION_URI = 0x80000;
        const EXTENSION_FIELDS = 0x100000;
        const SUBSCRIPTION_ID = 0x200000;
    }
}

flag_names!(DataSetFieldContentFlags, "None", [
    "StatusCode" => STATUS_CODE,
    "SourceTimestamp" => SOURCE_TIMESTAMP,
    "ServerTimestamp" => SERVER_TIMESTAMP,
    "SourcePicoSeconds" => SOURCE_PICO_SECONDS,
    "ServerPicoSeconds" => SERVER_PICO_SECONDS,
    "RawData" => RAW_DATA,
    "SingleFieldDegradeToValue" => SINGLE_FIELD_DEGRADE_TO_VALUE,
    "NodeId" => NODE_ID,
    "DisplayName" => DISPLAY_NAME,
    "EndpointUrl" => ENDPOINT_URL,
    "ApplicationUri" => APPLICATION_URI,
    "ExtensionFields" => EXTENSION_FIELDS,
    "SubscriptionId" => SUBSCRIPTION_ID,
]);

impl Default for DataSetFieldContentFlags {
    fn default() -> Self {
        DataSetFieldContentFlags::STATUS_CODE | DataSetFieldContentFlags::SOURCE_TIMESTAMP
    }
}

impl DataSetFieldContentFlags {
    /// Flags selecting parts of the DataValue
    pub fn data_value_parts(&self) -> DataSetFieldContentFlags {
        *self
            & (DataSetFieldContentFlags::STATUS_CODE
                | DataSetFieldContentFlags::SOURCE_TIMESTAMP
                | DataSetFieldContentFlags::SERVER_TIMESTAMP
                | DataSetFieldContentFlags::SOURCE_PICO_SECONDS
                | DataSetFieldContentFlags::SERVER_PICO_SECONDS)
    }

    /// Flags adding identification of the field
    pub fn identity_parts(&self) -> DataSetFieldContentFlags {
        *self
            & (DataSetFieldContentFlags::NODE_ID
                | DataSetFieldContentFlags::DISPLAY_NAME
                | DataSetFieldContentFlags::ENDPOINT_URL
                | DataSetFieldContentFlags::APPLICATION_URI
                | DataSetFieldContentFlags::SUBSCRIPTION_ID)
    }
}

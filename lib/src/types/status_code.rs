// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the `StatusCode` type and the subset of named codes used by the publisher.

use std::{
    error::Error,
    fmt,
    fmt::Formatter,
    io::{self, Read, Write},
};

use serde::{
    de::{self, Visitor},
    Deserialize, Deserializer, Serialize, Serializer,
};

use crate::types::encoding::*;

bitflags! {
    /// A 32-bit status code. The top 16 bits hold the code, the bottom 16 bits carry info bits.
    pub struct StatusCode: u32 {
        const IS_ERROR = 0x8000_0000;
        const IS_UNCERTAIN = 0x4000_0000;
        const STATUS_MASK = 0xffff_0000;
        const BIT_MASK = 0x0000_ffff;

        #[allow(non_upper_case_globals)]
        const Good = 0;
        #[allow(non_upper_case_globals)]
        const GoodNoData = 0x00A5_0000;
        #[allow(non_upper_case_globals)]
        const UncertainLastUsableValue = 0x4090_0000;
        #[allow(non_upper_case_globals)]
        const UncertainSubstituteValue = 0x4091_0000;
        #[allow(non_upper_case_globals)]
        const BadUnexpectedError = 0x8001_0000;
        #[allow(non_upper_case_globals)]
        const BadInternalError = 0x8002_0000;
        #[allow(non_upper_case_globals)]
        const BadEncodingError = 0x8006_0000;
        #[allow(non_upper_case_globals)]
        const BadDecodingError = 0x8007_0000;
        #[allow(non_upper_case_globals)]
        const BadEncodingLimitsExceeded = 0x8008_0000;
        #[allow(non_upper_case_globals)]
        const BadTimeout = 0x800A_0000;
        #[allow(non_upper_case_globals)]
        const BadShutdown = 0x800C_0000;
        #[allow(non_upper_case_globals)]
        const BadNoCommunication = 0x8031_0000;
        #[allow(non_upper_case_globals)]
        const BadWaitingForInitialData = 0x8032_0000;
        #[allow(non_upper_case_globals)]
        const BadNodeIdInvalid = 0x8033_0000;
        #[allow(non_upper_case_globals)]
        const BadNodeIdUnknown = 0x8034_0000;
        #[allow(non_upper_case_globals)]
        const BadDataEncodingUnsupported = 0x8039_0000;
        #[allow(non_upper_case_globals)]
        const BadNotSupported = 0x803D_0000;
        #[allow(non_upper_case_globals)]
        const BadMonitoredItemFilterInvalid = 0x8043_0000;
        #[allow(non_upper_case_globals)]
        const BadTypeMismatch = 0x8074_0000;
        #[allow(non_upper_case_globals)]
        const BadConfigurationError = 0x8089_0000;
    }
}

const NAMES: &[(StatusCode, &str)] = &[
    (StatusCode::Good, "Good"),
    (StatusCode::GoodNoData, "GoodNoData"),
    (StatusCode::UncertainLastUsableValue, "UncertainLastUsableValue"),
    (StatusCode::UncertainSubstituteValue, "UncertainSubstituteValue"),
    (StatusCode::BadUnexpectedError, "BadUnexpectedError"),
    (StatusCode::BadInternalError, "BadInternalError"),
    (StatusCode::BadEncodingError, "BadEncodingError"),
    (StatusCode::BadDecodingError, "BadDecodingError"),
    (StatusCode::BadEncodingLimitsExceeded, "BadEncodingLimitsExceeded"),
    (StatusCode::BadTimeout, "BadTimeout"),
    (StatusCode::BadShutdown, "BadShutdown"),
    (StatusCode::BadNoCommunication, "BadNoCommunication"),
    (StatusCode::BadWaitingForInitialData, "BadWaitingForInitialData"),
    (StatusCode::BadNodeIdInvalid, "BadNodeIdInvalid"),
    (StatusCode::BadNodeIdUnknown, "BadNodeIdUnknown"),
    (StatusCode::BadDataEncodingUnsupported, "BadDataEncodingUnsupported"),
    (StatusCode::BadNotSupported, "BadNotSupported"),
    (StatusCode::BadMonitoredItemFilterInvalid, "BadMonitoredItemFilterInvalid"),
    (StatusCode::BadTypeMismatch, "BadTypeMismatch"),
    (StatusCode::BadConfigurationError, "BadConfigurationError"),
];

// The bitflags! macro implements Debug for StatusCode but it fouls the display because status
// codes are a combination of bits and unique values.

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut Formatter) -> fmt::Result {
        // Displays the StatusCode as it's name, or its name+bitflags
        let bits = self.bitflags();
        if bits.is_empty() {
            write!(f, "{}", self.name())
        } else {
            write!(f, "{}+{:#06x}", self.name(), bits.bits())
        }
    }
}

impl BinaryEncoder<StatusCode> for StatusCode {
    fn byte_len(&self) -> usize {
        4
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        write_u32(stream, self.bits())
    }

    fn decode<S: Read>(stream: &mut S, _: &DecodingOptions) -> EncodingResult<Self> {
        Ok(StatusCode::from_bits_truncate(read_u32(stream)?))
    }
}

impl Error for StatusCode {}

impl StatusCode {
    /// Returns the bit flags of the status code, i.e. it masks out the actual status code value
    pub fn bitflags(&self) -> StatusCode {
        *self & StatusCode::BIT_MASK
    }

    /// Returns the status only, i.e. it masks out any bit flags that come with the status code
    pub fn status(&self) -> StatusCode {
        *self & StatusCode::STATUS_MASK
    }

    /// Tests if the status code is bad
    pub fn is_bad(&self) -> bool {
        self.contains(StatusCode::IS_ERROR)
    }

    /// Tests if the status code is uncertain
    pub fn is_uncertain(&self) -> bool {
        self.contains(StatusCode::IS_UNCERTAIN)
    }

    /// Tests if the status code is good (i.e. not bad or uncertain)
    pub fn is_good(&self) -> bool {
        !self.is_bad() && !self.is_uncertain()
    }

    /// The symbolic name of the code, or its hex value when the code is not one of the named ones.
    pub fn name(&self) -> String {
        let status = self.status();
        NAMES
            .iter()
            .find(|(code, _)| *code == status)
            .map(|(_, name)| name.to_string())
            .unwrap_or_else(|| format!("{:#010x}", status.bits()))
    }
}

impl From<StatusCode> for io::Error {
    fn from(e: StatusCode) -> io::Error {
        io::Error::new(io::ErrorKind::Other, format!("StatusCode {}", e))
    }
}

// Serialize / Deserialize are manually implemented because bitflags! doesn't do it.

impl Serialize for StatusCode {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u32(self.bits())
    }
}

struct StatusCodeVisitor;

impl<'de> Visitor<'de> for StatusCodeVisitor {
    type Value = u32;

    fn expecting(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_str("an unsigned 32-bit integer")
    }

    fn visit_u32<E>(self, value: u32) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        Ok(value)
    }

    fn visit_u64<E>(self, value: u64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        u32::try_from(value).map_err(|_| E::custom("status code out of range"))
    }

    fn visit_i64<E>(self, value: i64) -> Result<Self::Value, E>
    where
        E: de::Error,
    {
        u32::try_from(value).map_err(|_| E::custom("status code out of range"))
    }
}

impl<'de> Deserialize<'de> for StatusCode {
    fn deserialize<D>(deserializer: D) -> Result<Self, <D as Deserializer<'de>>::Error>
    where
        D: Deserializer<'de>,
    {
        Ok(StatusCode::from_bits_truncate(
            deserializer.deserialize_u32(StatusCodeVisitor)?,
        ))
    }
}

#[test]
fn status_code() {
    assert!(StatusCode::Good.is_good());
    assert!(!StatusCode::Good.is_bad());
    assert!(!StatusCode::Good.is_uncertain());

    assert!(StatusCode::UncertainLastUsableValue.is_uncertain());
    assert!(!StatusCode::UncertainLastUsableValue.is_bad());
    assert!(!StatusCode::UncertainLastUsableValue.is_good());

    assert!(StatusCode::BadDecodingError.is_bad());
    assert!(!StatusCode::BadDecodingError.is_uncertain());
    assert!(!StatusCode::BadDecodingError.is_good());

    assert_eq!(StatusCode::BadWaitingForInitialData.name(), "BadWaitingForInitialData");
    assert_eq!(
        StatusCode::from_bits_truncate(0x8032_0400).status(),
        StatusCode::BadWaitingForInitialData
    );
    assert_eq!(
        StatusCode::from_bits_truncate(0x8032_0400).bitflags().bits(),
        0x400
    );
}

// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `Variant` and its built-in type ids.

use std::{
    fmt,
    io::{Read, Write},
    str::FromStr,
};

use crate::types::{
    date_time::DateTime, encoding::*, guid::Guid, status_code::StatusCode,
};

/// The built-in type ids a `Variant` can hold. The discriminant is the OPC UA built-in type id
/// which is also the encoding byte of the binary variant.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum VariantTypeId {
    Empty = 0,
    Boolean = 1,
    SByte = 2,
    Byte = 3,
    Int16 = 4,
    UInt16 = 5,
    Int32 = 6,
    UInt32 = 7,
    Int64 = 8,
    UInt64 = 9,
    Float = 10,
    Double = 11,
    String = 12,
    DateTime = 13,
    Guid = 14,
    ByteString = 15,
    StatusCode = 19,
}

impl TryFrom<u8> for VariantTypeId {
    type Error = StatusCode;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Ok(match value {
            0 => VariantTypeId::Empty,
            1 => VariantTypeId::Boolean,
            2 => VariantTypeId::SByte,
            3 => VariantTypeId::Byte,
            4 => VariantTypeId::Int16,
            5 => VariantTypeId::UInt16,
            6 => VariantTypeId::Int32,
            7 => VariantTypeId::UInt32,
            8 => VariantTypeId::Int64,
            9 => VariantTypeId::UInt64,
            10 => VariantTypeId::Float,
            11 => VariantTypeId::Double,
            12 => VariantTypeId::String,
            13 => VariantTypeId::DateTime,
            14 => VariantTypeId::Guid,
            15 => VariantTypeId::ByteString,
            19 => VariantTypeId::StatusCode,
            _ => {
                error!("Unsupported variant type id {}", value);
                return Err(StatusCode::BadDecodingError);
            }
        })
    }
}

impl fmt::Display for VariantTypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

impl FromStr for VariantTypeId {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "Empty" => VariantTypeId::Empty,
            "Boolean" => VariantTypeId::Boolean,
            "SByte" => VariantTypeId::SByte,
            "Byte" => VariantTypeId::Byte,
            "Int16" => VariantTypeId::Int16,
            "UInt16" => VariantTypeId::UInt16,
            "Int32" => VariantTypeId::Int32,
            "UInt32" => VariantTypeId::UInt32,
            "Int64" => VariantTypeId::Int64,
            "UInt64" => VariantTypeId::UInt64,
            "Float" => VariantTypeId::Float,
            "Double" => VariantTypeId::Double,
            "String" => VariantTypeId::String,
            "DateTime" => VariantTypeId::DateTime,
            "Guid" => VariantTypeId::Guid,
            "ByteString" => VariantTypeId::ByteString,
            "StatusCode" => VariantTypeId::StatusCode,
            _ => return Err(()),
        })
    }
}

impl VariantTypeId {
    /// The encoding byte / built-in type id
    pub fn id(&self) -> u8 {
        *self as u8
    }

    pub fn is_numeric(&self) -> bool {
        matches!(
            self,
            VariantTypeId::SByte
                | VariantTypeId::Byte
                | VariantTypeId::Int16
                | VariantTypeId::UInt16
                | VariantTypeId::Int32
                | VariantTypeId::UInt32
                | VariantTypeId::Int64
                | VariantTypeId::UInt64
                | VariantTypeId::Float
                | VariantTypeId::Double
        )
    }
}

/// A single dimension array of values sharing one built-in type.
#[derive(Debug, Clone, PartialEq)]
pub struct Array {
    pub value_type: VariantTypeId,
    pub values: Vec<Variant>,
}

/// A `Variant` holds a built-in OPC UA data type, or an array of them.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    /// Empty type has no value. It is equivalent to a Null value (part 6 5.1.6)
    #[default]
    Empty,
    Boolean(bool),
    SByte(i8),
    Byte(u8),
    Int16(i16),
    UInt16(u16),
    Int32(i32),
    UInt32(u32),
    Int64(i64),
    UInt64(u64),
    Float(f32),
    Double(f64),
    String(String),
    DateTime(Box<DateTime>),
    Guid(Box<Guid>),
    ByteString(Vec<u8>),
    StatusCode(StatusCode),
    Array(Box<Array>),
}

macro_rules! from_scalar {
    ($t:ty, $variant:ident) => {
        impl From<$t> for Variant {
            fn from(v: $t) -> Self {
                Variant::$variant(v)
            }
        }
    };
}

from_scalar!(bool, Boolean);
from_scalar!(i8, SByte);
from_scalar!(u8, Byte);
from_scalar!(i16, Int16);
from_scalar!(u16, UInt16);
from_scalar!(i32, Int32);
from_scalar!(u32, UInt32);
from_scalar!(i64, Int64);
from_scalar!(u64, UInt64);
from_scalar!(f32, Float);
from_scalar!(f64, Double);
from_scalar!(String, String);
from_scalar!(StatusCode, StatusCode);

impl<'a> From<&'a str> for Variant {
    fn from(v: &'a str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<DateTime> for Variant {
    fn from(v: DateTime) -> Self {
        Variant::DateTime(Box::new(v))
    }
}

impl From<Guid> for Variant {
    fn from(v: Guid) -> Self {
        Variant::Guid(Box::new(v))
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Variant::Empty => write!(f, "null"),
            Variant::Boolean(v) => write!(f, "{}", v),
            Variant::SByte(v) => write!(f, "{}", v),
            Variant::Byte(v) => write!(f, "{}", v),
            Variant::Int16(v) => write!(f, "{}", v),
            Variant::UInt16(v) => write!(f, "{}", v),
            Variant::Int32(v) => write!(f, "{}", v),
            Variant::UInt32(v) => write!(f, "{}", v),
            Variant::Int64(v) => write!(f, "{}", v),
            Variant::UInt64(v) => write!(f, "{}", v),
            Variant::Float(v) => write!(f, "{}", v),
            Variant::Double(v) => write!(f, "{}", v),
            Variant::String(v) => write!(f, "{}", v),
            Variant::DateTime(v) => write!(f, "{}", v),
            Variant::Guid(v) => write!(f, "{}", v),
            Variant::ByteString(v) => write!(f, "{:02x?}", v),
            Variant::StatusCode(v) => write!(f, "{}", v),
            Variant::Array(a) => {
                write!(f, "[")?;
                for (i, v) in a.values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", v)?;
                }
                write!(f, "]")
            }
        }
    }
}

impl Variant {
    /// Creates an array variant. All values must be of the supplied type.
    pub fn new_array(value_type: VariantTypeId, values: Vec<Variant>) -> Variant {
        Variant::Array(Box::new(Array { value_type, values }))
    }

    /// The built-in type of the variant. For arrays it is the element type.
    pub fn type_id(&self) -> VariantTypeId {
        match self {
            Variant::Empty => VariantTypeId::Empty,
            Variant::Boolean(_) => VariantTypeId::Boolean,
            Variant::SByte(_) => VariantTypeId::SByte,
            Variant::Byte(_) => VariantTypeId::Byte,
            Variant::Int16(_) => VariantTypeId::Int16,
            Variant::UInt16(_) => VariantTypeId::UInt16,
            Variant::Int32(_) => VariantTypeId::Int32,
            Variant::UInt32(_) => VariantTypeId::UInt32,
            Variant::Int64(_) => VariantTypeId::Int64,
            Variant::UInt64(_) => VariantTypeId::UInt64,
            Variant::Float(_) => VariantTypeId::Float,
            Variant::Double(_) => VariantTypeId::Double,
            Variant::String(_) => VariantTypeId::String,
            Variant::DateTime(_) => VariantTypeId::DateTime,
            Variant::Guid(_) => VariantTypeId::Guid,
            Variant::ByteString(_) => VariantTypeId::ByteString,
            Variant::StatusCode(_) => VariantTypeId::StatusCode,
            Variant::Array(a) => a.value_type,
        }
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, Variant::Empty)
    }

    pub fn is_array(&self) -> bool {
        matches!(self, Variant::Array(_))
    }

    /// Returns the scalar value as a double if it is numeric. Used for deadband comparisons.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Variant::SByte(v) => Some(v as f64),
            Variant::Byte(v) => Some(v as f64),
            Variant::Int16(v) => Some(v as f64),
            Variant::UInt16(v) => Some(v as f64),
            Variant::Int32(v) => Some(v as f64),
            Variant::UInt32(v) => Some(v as f64),
            Variant::Int64(v) => Some(v as f64),
            Variant::UInt64(v) => Some(v as f64),
            Variant::Float(v) => Some(v as f64),
            Variant::Double(v) => Some(v),
            _ => None,
        }
    }

    fn byte_len_body(&self) -> usize {
        match self {
            Variant::Empty => 0,
            Variant::Boolean(_) | Variant::SByte(_) | Variant::Byte(_) => 1,
            Variant::Int16(_) | Variant::UInt16(_) => 2,
            Variant::Int32(_) | Variant::UInt32(_) | Variant::Float(_) => 4,
            Variant::StatusCode(_) => 4,
            Variant::Int64(_) | Variant::UInt64(_) | Variant::Double(_) => 8,
            Variant::DateTime(_) => 8,
            Variant::Guid(_) => 16,
            Variant::String(v) => byte_len_string(Some(v.as_str())),
            Variant::ByteString(v) => 4 + v.len(),
            Variant::Array(a) => 4 + a.values.iter().map(|v| v.byte_len_body()).sum::<usize>(),
        }
    }

    fn encode_body(&self, stream: &mut dyn Write) -> EncodingResult<usize> {
        match self {
            Variant::Empty => Ok(0),
            Variant::Boolean(v) => write_u8(stream, u8::from(*v)),
            Variant::SByte(v) => write_i8(stream, *v),
            Variant::Byte(v) => write_u8(stream, *v),
            Variant::Int16(v) => write_i16(stream, *v),
            Variant::UInt16(v) => write_u16(stream, *v),
            Variant::Int32(v) => write_i32(stream, *v),
            Variant::UInt32(v) => write_u32(stream, *v),
            Variant::Int64(v) => write_i64(stream, *v),
            Variant::UInt64(v) => write_u64(stream, *v),
            Variant::Float(v) => write_f32(stream, *v),
            Variant::Double(v) => write_f64(stream, *v),
            Variant::String(v) => write_string(stream, Some(v.as_str())),
            Variant::DateTime(v) => write_i64(stream, v.ticks()),
            Variant::Guid(v) => {
                process_encode_io_result(stream.write_all(v.as_bytes()).map(|_| 16))
            }
            Variant::ByteString(v) => write_byte_string(stream, Some(v.as_slice())),
            Variant::StatusCode(v) => write_u32(stream, v.bits()),
            Variant::Array(a) => {
                if a.values.iter().any(|v| v.type_id() != a.value_type || v.is_array()) {
                    error!("Array contains values that are not of type {}", a.value_type);
                    return Err(StatusCode::BadEncodingError);
                }
                let mut size = write_i32(stream, a.values.len() as i32)?;
                for v in &a.values {
                    size += v.encode_body(stream)?;
                }
                Ok(size)
            }
        }
    }

    fn decode_body(
        type_id: VariantTypeId,
        stream: &mut dyn Read,
        decoding_options: &DecodingOptions,
    ) -> EncodingResult<Variant> {
        Ok(match type_id {
            VariantTypeId::Empty => Variant::Empty,
            VariantTypeId::Boolean => Variant::Boolean(read_u8(stream)? != 0),
            VariantTypeId::SByte => Variant::SByte(read_i8(stream)?),
            VariantTypeId::Byte => Variant::Byte(read_u8(stream)?),
            VariantTypeId::Int16 => Variant::Int16(read_i16(stream)?),
            VariantTypeId::UInt16 => Variant::UInt16(read_u16(stream)?),
            VariantTypeId::Int32 => Variant::Int32(read_i32(stream)?),
            VariantTypeId::UInt32 => Variant::UInt32(read_u32(stream)?),
            VariantTypeId::Int64 => Variant::Int64(read_i64(stream)?),
            VariantTypeId::UInt64 => Variant::UInt64(read_u64(stream)?),
            VariantTypeId::Float => Variant::Float(read_f32(stream)?),
            VariantTypeId::Double => Variant::Double(read_f64(stream)?),
            VariantTypeId::String => match read_string(stream, decoding_options)? {
                Some(s) => Variant::String(s),
                None => Variant::Empty,
            },
            VariantTypeId::DateTime => Variant::from(DateTime::from(read_i64(stream)?)),
            VariantTypeId::Guid => {
                let mut bytes = [0u8; 16];
                process_decode_io_result(stream.read_exact(&mut bytes))?;
                Variant::from(Guid::from(uuid::Uuid::from_bytes(bytes)))
            }
            VariantTypeId::ByteString => {
                match read_byte_string(stream, decoding_options.max_byte_string_length)? {
                    Some(b) => Variant::ByteString(b),
                    None => Variant::Empty,
                }
            }
            VariantTypeId::StatusCode => {
                Variant::StatusCode(StatusCode::from_bits_truncate(read_u32(stream)?))
            }
        })
    }
}

const ARRAY_VALUES_BIT: u8 = 0x80;

/// Binary variant: an encoding byte holding the type id (and array bit) followed by the body
impl BinaryEncoder<Variant> for Variant {
    fn byte_len(&self) -> usize {
        1 + self.byte_len_body()
    }

    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize> {
        let mut encoding_mask = self.type_id().id();
        if self.is_array() {
            encoding_mask |= ARRAY_VALUES_BIT;
        }
        let size = write_u8(stream, encoding_mask)?;
        Ok(size + self.encode_body(stream)?)
    }

    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<Self> {
        let encoding_mask = read_u8(stream)?;
        let type_id = VariantTypeId::try_from(encoding_mask & !ARRAY_VALUES_BIT)?;
        if encoding_mask & ARRAY_VALUES_BIT != 0 {
            let len = read_i32(stream)?;
            if len < 0 || len as usize > decoding_options.max_array_length {
                error!("Array length {} is invalid or exceeds decoding limit", len);
                return Err(StatusCode::BadDecodingError);
            }
            let mut values = Vec::with_capacity(len as usize);
            for _ in 0..len {
                values.push(Self::decode_body(type_id, stream, decoding_options)?);
            }
            Ok(Variant::new_array(type_id, values))
        } else {
            Self::decode_body(type_id, stream, decoding_options)
        }
    }
}

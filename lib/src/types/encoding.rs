// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the `BinaryEncoder` trait and helpers for reading and writing of scalar values and
//! other primitives in the little endian layout used by the binary message mapping.

use std::{
    fmt::Debug,
    io::{Cursor, Read, Result, Write},
};

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};

use crate::types::{constants, status_code::StatusCode};

pub type EncodingResult<T> = std::result::Result<T, StatusCode>;

/// Limits applied while decoding a stream.
#[derive(Clone, Debug)]
pub struct DecodingOptions {
    /// Maximum size of a message in bytes. 0 means no limit.
    pub max_message_size: usize,
    /// Maximum length in bytes (not chars!) of a string.
    pub max_string_length: usize,
    /// Maximum length in bytes of a byte string.
    pub max_byte_string_length: usize,
    /// Maximum number of array elements.
    pub max_array_length: usize,
}

impl Default for DecodingOptions {
    fn default() -> Self {
        DecodingOptions {
            max_message_size: constants::MAX_MESSAGE_SIZE,
            max_string_length: constants::MAX_STRING_LENGTH,
            max_byte_string_length: constants::MAX_BYTE_STRING_LENGTH,
            max_array_length: constants::MAX_ARRAY_LENGTH,
        }
    }
}

/// OPC UA Binary Encoding interface. Anything that encodes to binary must implement this. It provides
/// functions to calculate the size in bytes of the struct (for allocating memory), encoding to a stream
/// and decoding from a stream.
pub trait BinaryEncoder<T> {
    /// Returns the exact byte length of the structure as it would be if `encode` were called.
    fn byte_len(&self) -> usize;
    /// Encodes the instance to the write stream.
    fn encode<S: Write>(&self, stream: &mut S) -> EncodingResult<usize>;
    /// Decodes an instance from the read stream. Limits in the decoding options are enforced and
    /// exceeding them yields `BadDecodingError`.
    fn decode<S: Read>(stream: &mut S, decoding_options: &DecodingOptions) -> EncodingResult<T>;

    /// Convenience method for encoding straight into an array of bytes.
    fn encode_to_vec(&self) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::with_capacity(self.byte_len()));
        let _ = self.encode(&mut buffer);
        buffer.into_inner()
    }
}

/// Converts an IO encoding error (and logs when in error) into an EncodingResult
pub fn process_encode_io_result(result: Result<usize>) -> EncodingResult<usize> {
    result.map_err(|err| {
        trace!("Encoding error - {:?}", err);
        StatusCode::BadEncodingError
    })
}

/// Converts an IO decoding error (and logs when in error) into an EncodingResult
pub fn process_decode_io_result<T>(result: Result<T>) -> EncodingResult<T>
where
    T: Debug,
{
    result.map_err(|err| {
        trace!("Decoding error - {:?}", err);
        StatusCode::BadDecodingError
    })
}

macro_rules! write_scalar {
    ($name:ident, $t:ty, $write:ident, $size:expr) => {
        pub fn $name(stream: &mut dyn Write, value: $t) -> EncodingResult<usize> {
            process_encode_io_result(stream.$write::<LittleEndian>(value).map(|_| $size))
        }
    };
}

macro_rules! read_scalar {
    ($name:ident, $t:ty, $read:ident) => {
        pub fn $name(stream: &mut dyn Read) -> EncodingResult<$t> {
            process_decode_io_result(stream.$read::<LittleEndian>())
        }
    };
}

write_scalar!(write_i16, i16, write_i16, 2);
write_scalar!(write_u16, u16, write_u16, 2);
write_scalar!(write_i32, i32, write_i32, 4);
write_scalar!(write_u32, u32, write_u32, 4);
write_scalar!(write_i64, i64, write_i64, 8);
write_scalar!(write_u64, u64, write_u64, 8);
write_scalar!(write_f32, f32, write_f32, 4);
write_scalar!(write_f64, f64, write_f64, 8);

read_scalar!(read_i16, i16, read_i16);
read_scalar!(read_u16, u16, read_u16);
read_scalar!(read_i32, i32, read_i32);
read_scalar!(read_u32, u32, read_u32);
read_scalar!(read_i64, i64, read_i64);
read_scalar!(read_u64, u64, read_u64);
read_scalar!(read_f32, f32, read_f32);
read_scalar!(read_f64, f64, read_f64);

/// Writes an unsigned byte to the stream
pub fn write_u8(stream: &mut dyn Write, value: u8) -> EncodingResult<usize> {
    process_encode_io_result(stream.write_u8(value).map(|_| 1))
}

/// Writes a signed byte to the stream
pub fn write_i8(stream: &mut dyn Write, value: i8) -> EncodingResult<usize> {
    process_encode_io_result(stream.write_i8(value).map(|_| 1))
}

/// Read an unsigned byte from the stream
pub fn read_u8(stream: &mut dyn Read) -> EncodingResult<u8> {
    process_decode_io_result(stream.read_u8())
}

/// Read a signed byte from the stream
pub fn read_i8(stream: &mut dyn Read) -> EncodingResult<i8> {
    process_decode_io_result(stream.read_i8())
}

/// Writes a length prefixed byte sequence, `None` is written as length -1
pub fn write_byte_string(stream: &mut dyn Write, value: Option<&[u8]>) -> EncodingResult<usize> {
    match value {
        Some(bytes) => {
            let size = write_i32(stream, bytes.len() as i32)?;
            Ok(size + process_encode_io_result(stream.write_all(bytes).map(|_| bytes.len()))?)
        }
        None => write_i32(stream, -1),
    }
}

/// Reads a length prefixed byte sequence, enforcing the supplied length limit
pub fn read_byte_string(stream: &mut dyn Read, limit: usize) -> EncodingResult<Option<Vec<u8>>> {
    let len = read_i32(stream)?;
    if len == -1 {
        Ok(None)
    } else if len < -1 {
        error!("Byte string length is negative value and invalid");
        Err(StatusCode::BadDecodingError)
    } else if len as usize > limit {
        error!("Byte string length {} exceeds decoding limit {}", len, limit);
        Err(StatusCode::BadDecodingError)
    } else {
        let mut buf = vec![0u8; len as usize];
        process_decode_io_result(stream.read_exact(&mut buf))?;
        Ok(Some(buf))
    }
}

/// Writes a length prefixed UTF-8 string, `None` is the null string
pub fn write_string(stream: &mut dyn Write, value: Option<&str>) -> EncodingResult<usize> {
    write_byte_string(stream, value.map(|v| v.as_bytes()))
}

/// Reads a length prefixed UTF-8 string
pub fn read_string(
    stream: &mut dyn Read,
    decoding_options: &DecodingOptions,
) -> EncodingResult<Option<String>> {
    match read_byte_string(stream, decoding_options.max_string_length)? {
        Some(bytes) => String::from_utf8(bytes).map(Some).map_err(|_| {
            error!("Decoded string was not valid UTF-8");
            StatusCode::BadDecodingError
        }),
        None => Ok(None),
    }
}

/// Length in bytes of a length prefixed string
pub fn byte_len_string(value: Option<&str>) -> usize {
    4 + value.map(|v| v.len()).unwrap_or(0)
}

// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! The OPC UA built-in types the publishing engine carries through its pipeline, together with
//! their binary and JSON encodings.

pub mod constants {
    /// Maximum number of elements in an array
    pub const MAX_ARRAY_LENGTH: usize = 100_000;
    /// Maximum size of a string in chars
    pub const MAX_STRING_LENGTH: usize = 65_535;
    /// Maximum size of a byte string in bytes
    pub const MAX_BYTE_STRING_LENGTH: usize = 65_535;
    /// Maximum size of a decoded message in bytes
    pub const MAX_MESSAGE_SIZE: usize = 65_535 * 16;
}

pub mod data_value;
pub mod date_time;
pub mod encoding;
pub mod guid;
pub mod node_id;
pub mod status_code;
pub mod variant;
pub mod variant_json;

pub use self::{
    data_value::*, date_time::*, encoding::*, guid::*, node_id::*, status_code::StatusCode,
    variant::*,
};

#[cfg(test)]
mod tests;

// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Errors raised by the publishing engine. Per field and per item problems never surface here,
//! they travel as `StatusCode` values attached to the data they concern.

use thiserror::Error;

use crate::types::StatusCode;

#[derive(Error, Debug)]
pub enum PublisherError {
    /// The requested message encoding cannot be produced, e.g. Avro without a schema.
    #[error("unsupported encoding: {0}")]
    UnsupportedEncoding(String),
    /// Encoding of a network message failed.
    #[error("encoding failed with {0}")]
    Encoding(StatusCode),
    /// A message could not be decoded.
    #[error("decoding failed: {0}")]
    Decoding(String),
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
    #[error("unknown writer group {0}")]
    UnknownWriterGroup(u16),
    #[error("unknown data set writer {0}")]
    UnknownWriter(u16),
    #[error("unknown field {0}")]
    UnknownField(String),
    /// The writer group is stopping and no longer accepts notifications.
    #[error("writer group {0} is not accepting notifications")]
    NotAccepting(u16),
    #[error("configuration error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl From<StatusCode> for PublisherError {
    fn from(status: StatusCode) -> Self {
        PublisherError::Encoding(status)
    }
}

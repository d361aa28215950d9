// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Serialization of network messages in one of the message mappings, JSON, UADP, XML or Avro,
//! optionally gzip compressed.
//!
//! Content masks decide which optional parts of a message are written. A part that is not
//! selected is absent from the output, never written as null or a default value.

use std::io::{Read, Write};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};

use crate::error::PublisherError;
use crate::pubsub::{models::*, network_message::*};

mod avro;
mod json;
pub(crate) mod packer;
mod uadp;
mod xml;

pub const CONTENT_TYPE_JSON: &str = "application/json";
pub const CONTENT_TYPE_UADP: &str = "application/opcua+uadp";
pub const CONTENT_TYPE_XML: &str = "application/xml";
pub const CONTENT_TYPE_AVRO: &str = "application/avro";
pub const CONTENT_ENCODING_GZIP: &str = "gzip";

/// Gzip header and trailer
const GZIP_FRAMING: usize = 18;

/// Encodes and decodes network messages for one message encoding
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Encoder {
    encoding: MessageEncoding,
}

impl Encoder {
    /// Creates an encoder. The encoding must name exactly one of the base encodings.
    pub fn new(encoding: MessageEncoding) -> Result<Encoder, PublisherError> {
        let base = encoding.base();
        if base.bits().count_ones() != 1 {
            error!("Message encoding {} does not name exactly one encoding", encoding);
            return Err(PublisherError::UnsupportedEncoding(encoding.to_string()));
        }
        if encoding.is_reversible() && base != MessageEncoding::JSON {
            debug!("Encoding {} is reversible by nature, flag is ignored", base);
        }
        Ok(Encoder { encoding })
    }

    pub fn encoding(&self) -> MessageEncoding {
        self.encoding
    }

    /// Content type of an encoded message
    pub fn content_type(&self, message_type: NetworkMessageType) -> &'static str {
        match self.encoding.base() {
            MessageEncoding::UADP => CONTENT_TYPE_UADP,
            MessageEncoding::XML => CONTENT_TYPE_XML,
            // Avro metadata carries the schema, which is JSON
            MessageEncoding::AVRO if message_type == NetworkMessageType::Data => CONTENT_TYPE_AVRO,
            _ => CONTENT_TYPE_JSON,
        }
    }

    pub fn content_encoding(&self) -> Option<&'static str> {
        if self.encoding.is_gzip_compressed() {
            Some(CONTENT_ENCODING_GZIP)
        } else {
            None
        }
    }

    /// True if several network messages can be wrapped into one array envelope
    pub fn supports_envelope(&self) -> bool {
        matches!(self.encoding.base(), MessageEncoding::JSON | MessageEncoding::XML)
    }

    /// Encodes a network message, compressing it if the encoding asks for it
    pub fn encode(&self, message: &NetworkMessage) -> Result<Vec<u8>, PublisherError> {
        let body = self.encode_uncompressed(message)?;
        self.compress(body)
    }

    /// Encodes several network messages into one array envelope
    pub fn encode_envelope(&self, messages: &[NetworkMessage]) -> Result<Vec<u8>, PublisherError> {
        let body = match self.encoding.base() {
            MessageEncoding::JSON => {
                let values = messages
                    .iter()
                    .map(|m| json::encode(m, self.encoding.is_reversible()))
                    .collect::<Result<Vec<_>, _>>()?;
                serde_json::to_vec(&serde_json::Value::Array(values))?
            }
            MessageEncoding::XML => xml::encode_envelope(messages)?.into_bytes(),
            base => {
                return Err(PublisherError::UnsupportedEncoding(format!(
                    "{} messages cannot be wrapped in an array envelope",
                    base
                )))
            }
        };
        self.compress(body)
    }

    /// Size of the message as `encode` writes it, the bound used when packing messages. Gzip
    /// framing makes small bodies larger, so compressed messages are measured compressed.
    pub fn estimate_size(&self, message: &NetworkMessage) -> Result<usize, PublisherError> {
        self.encode(message).map(|bytes| bytes.len())
    }

    /// Size of the encoded message before compression
    pub(crate) fn body_size(&self, message: &NetworkMessage) -> Result<usize, PublisherError> {
        self.encode_uncompressed(message).map(|body| body.len())
    }

    /// Largest size a body of `body_size` bytes can take once encoded. Deflate grows data it
    /// cannot compress by a few bytes per block and gzip adds its header and trailer.
    pub(crate) fn size_bound(&self, body_size: usize) -> usize {
        if self.encoding.is_gzip_compressed() {
            body_size + (body_size >> 12) + (body_size >> 14) + (body_size >> 25) + 13 + GZIP_FRAMING
        } else {
            body_size
        }
    }

    /// Decodes what `encode` or `encode_envelope` produced. The content mask is the one the
    /// message was encoded with, since it decides the layout. XML and Avro cannot be decoded.
    pub fn decode(
        &self,
        bytes: &[u8],
        content_mask: NetworkMessageContentFlags,
    ) -> Result<Vec<NetworkMessage>, PublisherError> {
        let body = if self.encoding.is_gzip_compressed() {
            let mut body = Vec::new();
            GzDecoder::new(bytes).read_to_end(&mut body)?;
            body
        } else {
            bytes.to_vec()
        };
        match self.encoding.base() {
            MessageEncoding::JSON => {
                let value: serde_json::Value = serde_json::from_slice(&body)?;
                json::decode(&value, content_mask, self.encoding.is_reversible())
            }
            MessageEncoding::UADP => uadp::decode(&body).map(|m| vec![m]),
            base => Err(PublisherError::UnsupportedEncoding(format!(
                "{} messages cannot be decoded",
                base
            ))),
        }
    }

    fn encode_uncompressed(&self, message: &NetworkMessage) -> Result<Vec<u8>, PublisherError> {
        match self.encoding.base() {
            MessageEncoding::JSON => {
                let value = json::encode(message, self.encoding.is_reversible())?;
                Ok(serde_json::to_vec(&value)?)
            }
            MessageEncoding::UADP => uadp::encode(message),
            MessageEncoding::XML => xml::encode(message).map(String::into_bytes),
            MessageEncoding::AVRO => avro::encode(message),
            base => Err(PublisherError::UnsupportedEncoding(base.to_string())),
        }
    }

    fn compress(&self, body: Vec<u8>) -> Result<Vec<u8>, PublisherError> {
        if self.encoding.is_gzip_compressed() {
            let mut encoder = GzEncoder::new(Vec::with_capacity(body.len() / 2), Compression::default());
            encoder.write_all(&body)?;
            Ok(encoder.finish()?)
        } else {
            Ok(body)
        }
    }
}

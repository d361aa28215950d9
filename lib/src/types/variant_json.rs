// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! JSON forms of `Variant` and `StatusCode`, reversible and non-reversible, as used by the JSON
//! message mapping.
//!
//! The reversible form of a variant is an object `{"Type": <built-in type id>, "Body": <value>}`
//! and decodes back to the identical typed value. The non-reversible form is the bare body.
//! 64-bit integers are written as strings so consumers with double precision numbers do not
//! lose digits.

use std::str::FromStr;

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};

use crate::error::PublisherError;
use crate::types::{
    date_time::DateTime, guid::Guid, status_code::StatusCode, variant::*,
};

const NAN: &str = "NaN";
const INFINITY: &str = "Infinity";
const NEG_INFINITY: &str = "-Infinity";

fn float_to_json(v: f64) -> Value {
    if v.is_nan() {
        Value::from(NAN)
    } else if v.is_infinite() {
        Value::from(if v > 0.0 { INFINITY } else { NEG_INFINITY })
    } else {
        Value::from(v)
    }
}

fn float_from_json(v: &Value) -> Option<f64> {
    match v {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => match s.as_str() {
            NAN => Some(f64::NAN),
            INFINITY => Some(f64::INFINITY),
            NEG_INFINITY => Some(f64::NEG_INFINITY),
            _ => None,
        },
        _ => None,
    }
}

/// Writes a status code. The reversible form is the numeric code, the non-reversible form is an
/// object carrying the code and its symbolic name.
pub fn status_code_to_json(status: StatusCode, reversible: bool) -> Value {
    if reversible {
        Value::from(status.bits())
    } else {
        json!({
            "Code": status.bits(),
            "Symbol": status.name(),
        })
    }
}

pub fn status_code_from_json(v: &Value) -> Result<StatusCode, PublisherError> {
    let code = match v {
        Value::Object(o) => o.get("Code").and_then(|c| c.as_u64()),
        v => v.as_u64(),
    };
    code.and_then(|c| u32::try_from(c).ok())
        .map(StatusCode::from_bits_truncate)
        .ok_or_else(|| PublisherError::Decoding(format!("{} is not a status code", v)))
}

/// The body of a variant, i.e. the value without any type information.
pub fn variant_body_to_json(v: &Variant, reversible: bool) -> Value {
    match v {
        Variant::Empty => Value::Null,
        Variant::Boolean(v) => Value::from(*v),
        Variant::SByte(v) => Value::from(*v),
        Variant::Byte(v) => Value::from(*v),
        Variant::Int16(v) => Value::from(*v),
        Variant::UInt16(v) => Value::from(*v),
        Variant::Int32(v) => Value::from(*v),
        Variant::UInt32(v) => Value::from(*v),
        Variant::Int64(v) => Value::from(v.to_string()),
        Variant::UInt64(v) => Value::from(v.to_string()),
        Variant::Float(v) => float_to_json(*v as f64),
        Variant::Double(v) => float_to_json(*v),
        Variant::String(v) => Value::from(v.as_str()),
        Variant::DateTime(v) => Value::from(v.to_string()),
        Variant::Guid(v) => Value::from(v.to_string()),
        Variant::ByteString(v) => Value::from(STANDARD.encode(v)),
        Variant::StatusCode(v) => status_code_to_json(*v, reversible),
        Variant::Array(a) => Value::Array(
            a.values
                .iter()
                .map(|v| variant_body_to_json(v, reversible))
                .collect(),
        ),
    }
}

/// Writes a variant in its reversible or non-reversible form. An empty variant is `null`, callers
/// omit the member rather than writing it.
pub fn variant_to_json(v: &Variant, reversible: bool) -> Value {
    if v.is_empty() {
        Value::Null
    } else if reversible {
        let mut m = Map::new();
        m.insert("Type".into(), Value::from(v.type_id().id()));
        m.insert("Body".into(), variant_body_to_json(v, true));
        Value::Object(m)
    } else {
        variant_body_to_json(v, false)
    }
}

fn type_error(type_id: VariantTypeId, v: &Value) -> PublisherError {
    PublisherError::Decoding(format!("{} is not a valid {} body", v, type_id))
}

/// Reads the body of a variant whose type is known, either from the reversible `Type` member
/// or from data set metadata.
pub fn variant_body_from_json(type_id: VariantTypeId, v: &Value) -> Result<Variant, PublisherError> {
    if let Value::Array(values) = v {
        let values = values
            .iter()
            .map(|v| scalar_body_from_json(type_id, v))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Variant::new_array(type_id, values))
    } else {
        scalar_body_from_json(type_id, v)
    }
}

fn scalar_body_from_json(type_id: VariantTypeId, v: &Value) -> Result<Variant, PublisherError> {
    let err = || type_error(type_id, v);
    let int = |v: &Value| v.as_i64().ok_or_else(err);
    let variant = match type_id {
        VariantTypeId::Empty => Variant::Empty,
        VariantTypeId::Boolean => Variant::Boolean(v.as_bool().ok_or_else(err)?),
        VariantTypeId::SByte => Variant::SByte(i8::try_from(int(v)?).map_err(|_| err())?),
        VariantTypeId::Byte => Variant::Byte(u8::try_from(int(v)?).map_err(|_| err())?),
        VariantTypeId::Int16 => Variant::Int16(i16::try_from(int(v)?).map_err(|_| err())?),
        VariantTypeId::UInt16 => Variant::UInt16(u16::try_from(int(v)?).map_err(|_| err())?),
        VariantTypeId::Int32 => Variant::Int32(i32::try_from(int(v)?).map_err(|_| err())?),
        VariantTypeId::UInt32 => Variant::UInt32(u32::try_from(int(v)?).map_err(|_| err())?),
        VariantTypeId::Int64 => Variant::Int64(match v {
            Value::String(s) => i64::from_str(s).map_err(|_| err())?,
            v => int(v)?,
        }),
        VariantTypeId::UInt64 => Variant::UInt64(match v {
            Value::String(s) => u64::from_str(s).map_err(|_| err())?,
            v => v.as_u64().ok_or_else(err)?,
        }),
        VariantTypeId::Float => Variant::Float(float_from_json(v).ok_or_else(err)? as f32),
        VariantTypeId::Double => Variant::Double(float_from_json(v).ok_or_else(err)?),
        VariantTypeId::String => Variant::String(v.as_str().ok_or_else(err)?.to_string()),
        VariantTypeId::DateTime => {
            let s = v.as_str().ok_or_else(err)?;
            Variant::from(DateTime::from_str(s).map_err(|_| err())?)
        }
        VariantTypeId::Guid => {
            let s = v.as_str().ok_or_else(err)?;
            Variant::from(Guid::from_str(s).map_err(|_| err())?)
        }
        VariantTypeId::ByteString => {
            let s = v.as_str().ok_or_else(err)?;
            Variant::ByteString(STANDARD.decode(s).map_err(|_| err())?)
        }
        VariantTypeId::StatusCode => Variant::StatusCode(status_code_from_json(v)?),
    };
    Ok(variant)
}

/// Reads a reversible variant `{"Type": n, "Body": ...}`. A missing body is an empty variant.
pub fn variant_from_json_reversible(v: &Value) -> Result<Variant, PublisherError> {
    let o = v
        .as_object()
        .ok_or_else(|| PublisherError::Decoding(format!("{} is not a reversible variant", v)))?;
    let type_id = o
        .get("Type")
        .and_then(|t| t.as_u64())
        .and_then(|t| u8::try_from(t).ok())
        .ok_or_else(|| PublisherError::Decoding(format!("{} has no variant Type", v)))?;
    let type_id = VariantTypeId::try_from(type_id)
        .map_err(|_| PublisherError::Decoding(format!("unsupported variant Type {}", type_id)))?;
    match o.get("Body") {
        None | Some(Value::Null) => Ok(Variant::Empty),
        Some(body) => variant_body_from_json(type_id, body),
    }
}

/// Reads a non-reversible value where the type is unknown. Numbers become `Int64` when integral
/// and `Double` otherwise, the original type is not recoverable.
pub fn variant_from_json_raw(v: &Value) -> Variant {
    match v {
        Value::Null => Variant::Empty,
        Value::Bool(b) => Variant::Boolean(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Variant::Int64(i)
            } else if let Some(u) = n.as_u64() {
                Variant::UInt64(u)
            } else {
                Variant::Double(n.as_f64().unwrap_or(f64::NAN))
            }
        }
        Value::String(s) => Variant::String(s.clone()),
        Value::Array(values) => {
            let values: Vec<Variant> = values.iter().map(variant_from_json_raw).collect();
            let value_type = values
                .first()
                .map(|v| v.type_id())
                .unwrap_or(VariantTypeId::Empty);
            if values.iter().all(|v| v.type_id() == value_type) {
                Variant::new_array(value_type, values)
            } else {
                Variant::new_array(
                    VariantTypeId::String,
                    values.iter().map(|v| Variant::String(v.to_string())).collect(),
                )
            }
        }
        Value::Object(_) => Variant::String(v.to_string()),
    }
}

/// Variants serialize in the reversible JSON form so configuration files preserve their types.
impl Serialize for Variant {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        variant_to_json(self, true).serialize(serializer)
    }
}

/// Accepts either the reversible form or a plain scalar.
impl<'de> Deserialize<'de> for Variant {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let v = Value::deserialize(deserializer)?;
        match v {
            Value::Object(ref o) if o.contains_key("Type") => {
                variant_from_json_reversible(&v).map_err(D::Error::custom)
            }
            v => Ok(variant_from_json_raw(&v)),
        }
    }
}

// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Contains the implementation of `NodeId`.

use std::{fmt, str::FromStr};

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{de::Error, Deserialize, Deserializer, Serialize, Serializer};

use crate::types::{guid::Guid, status_code::StatusCode};

/// The kind of identifier, numeric, string, guid or byte
#[derive(Eq, PartialEq, Clone, Debug, Hash)]
pub enum Identifier {
    Numeric(u32),
    String(String),
    Guid(Guid),
    ByteString(Vec<u8>),
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Identifier::Numeric(v) => write!(f, "i={}", *v),
            Identifier::String(v) => write!(f, "s={}", v),
            Identifier::Guid(v) => write!(f, "g={}", v),
            Identifier::ByteString(v) => write!(f, "b={}", STANDARD.encode(v)),
        }
    }
}

impl FromStr for Identifier {
    type Err = StatusCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.len() < 2 || !s.is_char_boundary(2) {
            return Err(StatusCode::BadNodeIdInvalid);
        }
        let (k, v) = s.split_at(2);
        match k {
            "i=" => v
                .parse::<u32>()
                .map(Identifier::Numeric)
                .map_err(|_| StatusCode::BadNodeIdInvalid),
            "s=" => Ok(Identifier::String(v.to_string())),
            "g=" => Guid::from_str(v)
                .map(Identifier::Guid)
                .map_err(|_| StatusCode::BadNodeIdInvalid),
            "b=" => STANDARD
                .decode(v)
                .map(Identifier::ByteString)
                .map_err(|_| StatusCode::BadNodeIdInvalid),
            _ => Err(StatusCode::BadNodeIdInvalid),
        }
    }
}

/// An identifier for a node in the address space of an OPC UA Server.
#[derive(PartialEq, Eq, Clone, Debug, Hash)]
pub struct NodeId {
    /// The index for a namespace
    pub namespace: u16,
    /// The identifier for the node in the address space
    pub identifier: Identifier,
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.namespace != 0 {
            write!(f, "ns={};{}", self.namespace, self.identifier)
        } else {
            write!(f, "{}", self.identifier)
        }
    }
}

impl FromStr for NodeId {
    type Err = StatusCode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        use regex::Regex;

        // ns=<namespaceindex>;<type>=<value> where type is one of i, s, g or b. The namespace
        // part is omitted for namespace 0.
        lazy_static! {
            static ref RE: Regex = Regex::new(r"^(ns=(?P<ns>[0-9]+);)?(?P<t>[isgb]=.+)$").unwrap();
        }

        let captures = RE.captures(s).ok_or(StatusCode::BadNodeIdInvalid)?;
        let namespace = if let Some(ns) = captures.name("ns") {
            ns.as_str()
                .parse::<u16>()
                .map_err(|_| StatusCode::BadNodeIdInvalid)?
        } else {
            0
        };
        let t = captures.name("t").ok_or(StatusCode::BadNodeIdInvalid)?;
        Identifier::from_str(t.as_str()).map(|identifier| NodeId {
            namespace,
            identifier,
        })
    }
}

impl Serialize for NodeId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for NodeId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        NodeId::from_str(&s).map_err(|_| D::Error::custom(format!("{} is not a node id", s)))
    }
}

impl<'a> From<(u16, &'a str)> for NodeId {
    fn from(v: (u16, &'a str)) -> Self {
        Self::new(v.0, Identifier::String(v.1.to_string()))
    }
}

impl From<(u16, u32)> for NodeId {
    fn from(v: (u16, u32)) -> Self {
        Self::new(v.0, Identifier::Numeric(v.1))
    }
}

impl NodeId {
    pub fn new(namespace: u16, identifier: Identifier) -> NodeId {
        NodeId {
            namespace,
            identifier,
        }
    }

    /// Returns a null node id
    pub fn null() -> NodeId {
        NodeId::new(0, Identifier::Numeric(0))
    }

    /// Test if the node id is null, i.e. 0 namespace and 0 identifier
    pub fn is_null(&self) -> bool {
        self.namespace == 0 && self.identifier == Identifier::Numeric(0)
    }
}

// OPCUA for Rust
// SPDX-License-Identifier: MPL-2.0
// Copyright (C) 2017-2024 Adam Lock

//! Data set metadata and its configuration version.

use std::fmt;

use crate::types::*;

/// Version of a data set layout. Incompatible changes bump the major version and reset the
/// minor version, additive changes bump the minor version only.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "PascalCase")]
pub struct ConfigurationVersion {
    pub major_version: u32,
    pub minor_version: u32,
}

impl Default for ConfigurationVersion {
    fn default() -> Self {
        Self {
            major_version: 1,
            minor_version: 0,
        }
    }
}

impl fmt::Display for ConfigurationVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major_version, self.minor_version)
    }
}

impl ConfigurationVersion {
    pub fn new(major_version: u32, minor_version: u32) -> Self {
        Self {
            major_version,
            minor_version,
        }
    }

    fn bump_major(&mut self) {
        self.major_version = self.major_version.wrapping_add(1);
        self.minor_version = 0;
    }

    fn bump_minor(&mut self) {
        self.minor_version = self.minor_version.wrapping_add(1);
    }
}

/// Value rank of a scalar field
pub const VALUE_RANK_SCALAR: i32 = -1;
/// Value rank of a one dimensional array field
pub const VALUE_RANK_ONE_DIMENSION: i32 = 1;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct FieldMetaData {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
    /// Built-in type, unknown until the first value arrives
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub built_in_type: Option<VariantTypeId>,
    pub value_rank: i32,
    pub data_set_field_id: Guid,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub published_variable: Option<String>,
}

impl FieldMetaData {
    pub fn new<S>(name: S, published_variable: Option<String>) -> Self
    where
        S: Into<String>,
    {
        Self {
            name: name.into(),
            description: None,
            built_in_type: None,
            value_rank: VALUE_RANK_SCALAR,
            data_set_field_id: Guid::new(),
            published_variable,
        }
    }

    /// Same name and compatible type. An unknown type is compatible with any type.
    fn is_compatible(&self, other: &FieldMetaData) -> bool {
        self.name == other.name
            && match (self.built_in_type, other.built_in_type) {
                (Some(a), Some(b)) => a == b && self.value_rank == other.value_rank,
                _ => true,
            }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct DataSetMetaData {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data_set_class_id: Option<Guid>,
    pub fields: Vec<FieldMetaData>,
    pub configuration_version: ConfigurationVersion,
}

impl DataSetMetaData {
    pub fn new<S>(name: S, data_set_class_id: Option<Guid>, fields: Vec<FieldMetaData>) -> Self
    where
        S: Into<String>,
    {
        Self {
            name: name.into(),
            data_set_class_id,
            fields,
            configuration_version: ConfigurationVersion::default(),
        }
    }

    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|f| f.name == name)
    }

    /// Replaces the field list. Removed, renamed, reordered or retyped fields bump the major
    /// version, appended fields bump the minor version. Learned types and field ids of fields
    /// that survive are kept. Returns true if the version changed.
    pub fn update_fields(&mut self, fields: Vec<FieldMetaData>) -> bool {
        let old = std::mem::take(&mut self.fields);
        let prefix_kept = fields.len() >= old.len()
            && old.iter().zip(fields.iter()).all(|(o, n)| o.is_compatible(n));

        self.fields = fields
            .into_iter()
            .map(|mut f| {
                if let Some(existing) = old.iter().find(|o| o.name == f.name) {
                    f.data_set_field_id = existing.data_set_field_id;
                    if f.built_in_type.is_none() {
                        f.built_in_type = existing.built_in_type;
                        f.value_rank = existing.value_rank;
                    }
                }
                f
            })
            .collect();

        if !prefix_kept {
            self.configuration_version.bump_major();
            true
        } else if self.fields.len() > old.len() {
            self.configuration_version.bump_minor();
            true
        } else {
            false
        }
    }

    /// Records the type of a field from an observed value. Learning an unknown type is additive,
    /// a value of a different type is an incompatible change. Returns true if the version changed.
    pub fn learn_type(&mut self, index: usize, value: &Variant) -> bool {
        if value.is_empty() {
            return false;
        }
        let Some(field) = self.fields.get_mut(index) else {
            return false;
        };
        let type_id = value.type_id();
        let value_rank = if value.is_array() {
            VALUE_RANK_ONE_DIMENSION
        } else {
            VALUE_RANK_SCALAR
        };
        match field.built_in_type {
            None => {
                field.built_in_type = Some(type_id);
                field.value_rank = value_rank;
                self.configuration_version.bump_minor();
                true
            }
            Some(t) if t != type_id || field.value_rank != value_rank => {
                debug!(
                    "Field {} changed type from {} to {}",
                    field.name, t, type_id
                );
                field.built_in_type = Some(type_id);
                field.value_rank = value_rank;
                self.configuration_version.bump_major();
                true
            }
            Some(_) => false,
        }
    }
}

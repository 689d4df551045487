//! dynapi core types: schemas, custom object payloads and status errors.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};

pub mod error;

pub use error::{ApiError, Status, StoreError};

/// Identity and bookkeeping shared by registry-managed objects.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ObjectMeta {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uid: Option<String>,
    /// Bumped on every successful update; 0 means "unset" on writes.
    #[serde(default)]
    pub resource_version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creation_timestamp: Option<String>,
}

impl ObjectMeta {
    pub fn named(name: impl Into<String>) -> Self {
        Self { name: name.into(), ..Default::default() }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    String,
    Number,
    Bool,
    Object,
    Array,
    #[default]
    #[serde(other)]
    Any,
}

impl FieldType {
    /// Map an OpenAPI v3 `type` keyword onto a field type.
    pub fn from_openapi(ty: &str) -> Self {
        match ty {
            "string" => FieldType::String,
            "integer" | "number" => FieldType::Number,
            "boolean" => FieldType::Bool,
            "object" => FieldType::Object,
            "array" => FieldType::Array,
            _ => FieldType::Any,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Field {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: FieldType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchemaSpec {
    #[serde(default)]
    pub fields: Vec<Field>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Version {
    pub name: String,
    #[serde(default)]
    pub spec: SchemaSpec,
}

/// A named, versioned resource type definition.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct Schema {
    pub metadata: ObjectMeta,
    #[serde(default)]
    pub versions: Vec<Version>,
}

impl Schema {
    pub fn new(name: impl Into<String>, versions: Vec<Version>) -> Self {
        Self { metadata: ObjectMeta::named(name), versions }
    }

    pub fn name(&self) -> &str { &self.metadata.name }

    pub fn version_names(&self) -> impl Iterator<Item = &str> {
        self.versions.iter().map(|v| v.name.as_str())
    }
}

/// Return the spec of the first version named `version`.
///
/// Later entries with the same name are unreachable.
pub fn find_version<'a>(schema: &'a Schema, version: &str) -> Option<&'a SchemaSpec> {
    schema.versions.iter().find(|v| v.name == version).map(|v| &v.spec)
}

/// One stored instance of a schema-defined object.
///
/// `data` is the submitted document verbatim, never a re-serialization.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CustomObjectData {
    pub name: String,
    pub version: String,
    pub data: String,
}

pub mod prelude {
    pub use super::{find_version, ApiError, CustomObjectData, Field, FieldType, ObjectMeta, Schema, SchemaSpec, Status, StoreError, Version};
}

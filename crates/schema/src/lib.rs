//! dynapi schema registry: CRUD + watch over `Schema` definitions.
//!
//! Two implementations live here:
//! - [`StoreSchemaRegistry`] persists schemas in any `ObjectStore` under `schemas/<name>`.
//! - [`CrdSchemaRegistry`] serves schemas read-only from a cluster's CustomResourceDefinitions.

#![forbid(unsafe_code)]

use dynapi_core::{ApiError, Schema};
use futures::stream::BoxStream;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

pub mod crd;
pub mod store;

pub use crd::{schema_from_crd, CrdSchemaRegistry};
pub use store::StoreSchemaRegistry;

/// Change notification emitted by [`SchemaRegistry::watch`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub enum SchemaEvent {
    Added(Schema),
    Modified(Schema),
    Deleted(Schema),
}

impl SchemaEvent {
    pub fn schema(&self) -> &Schema {
        match self {
            SchemaEvent::Added(s) | SchemaEvent::Modified(s) | SchemaEvent::Deleted(s) => s,
        }
    }
}

pub type SchemaWatch = BoxStream<'static, Result<SchemaEvent, ApiError>>;

/// Anything that knows how to store Schema objects.
#[async_trait::async_trait]
pub trait SchemaRegistry: Send + Sync {
    async fn list(&self) -> Result<Vec<Schema>, ApiError>;
    /// Stream of changes made after the call.
    async fn watch(&self) -> Result<SchemaWatch, ApiError>;
    async fn get(&self, name: &str) -> Result<Schema, ApiError>;
    async fn create(&self, schema: Schema) -> Result<Schema, ApiError>;
    async fn update(&self, schema: Schema) -> Result<Schema, ApiError>;
    async fn delete(&self, name: &str) -> Result<(), ApiError>;
}

static DNS_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").expect("static regex")
});

/// Reject names that cannot serve as a single path segment / DNS label.
pub fn validate_name(name: &str) -> Result<(), ApiError> {
    if name.is_empty() || name.len() > 63 || !DNS_LABEL.is_match(name) {
        return Err(ApiError::bad_request(format!(
            "invalid schema name {:?}: must be a lowercase DNS label (a-z, 0-9, '-'), at most 63 chars",
            name
        )));
    }
    Ok(())
}

/// Structural checks applied on create and update. Field contents are not validated.
pub fn validate_schema(schema: &Schema) -> Result<(), ApiError> {
    validate_name(schema.name())?;
    if schema.versions.is_empty() {
        return Err(ApiError::bad_request(format!("schema {} declares no versions", schema.name())));
    }
    let mut seen: Vec<&str> = Vec::with_capacity(schema.versions.len());
    for v in schema.versions.iter() {
        if v.name.is_empty() || v.name.contains('/') {
            return Err(ApiError::bad_request(format!("invalid version name {:?}", v.name)));
        }
        if seen.contains(&v.name.as_str()) {
            return Err(ApiError::bad_request(format!("duplicate version {} in schema {}", v.name, schema.name())));
        }
        seen.push(&v.name);
    }
    Ok(())
}

//! dynapi store: key-value adapter seam, in-memory adapter and the custom object registry.

#![forbid(unsafe_code)]

use std::time::Duration;

pub use dynapi_core::StoreError;

pub mod codec;
pub mod mem;
pub mod registry;

pub use codec::{JsonCodec, ObjectCodec};
pub use mem::MemStore;
pub use registry::{make_key, make_schema_key, CustomObjectRegistry, KvObjectRegistry};

/// One child entry returned by a prefix listing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KvEntry {
    pub key: String,
    pub value: Vec<u8>,
}

/// Opaque key-value operations consumed by the registries.
///
/// Keys are `/`-separated paths. `list_prefix(dir)` returns the direct children of `dir`
/// (keys of the form `dir/<leaf>`), ordered by key; a directory with no children lists
/// as empty. Implementations must be safe to share across concurrent requests.
#[async_trait::async_trait]
pub trait ObjectStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError>;
    /// `ttl` of `None` stores the value without expiry.
    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError>;
    async fn delete(&self, key: &str) -> Result<(), StoreError>;
    async fn list_prefix(&self, dir: &str) -> Result<Vec<KvEntry>, StoreError>;
}

/// True when `key` is a direct child of `dir`.
pub fn is_direct_child(dir: &str, key: &str) -> bool {
    match key.strip_prefix(dir).and_then(|rest| rest.strip_prefix('/')) {
        Some(leaf) => !leaf.is_empty() && !leaf.contains('/'),
        None => false,
    }
}

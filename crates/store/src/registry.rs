//! Schema-agnostic object registry over an `ObjectStore`.
//!
//! Objects live at `custom/<schema>/<name>`; every object of a schema shares the
//! `custom/<schema>` prefix, which is the only index.

use std::sync::Arc;
use std::time::Instant;

use dynapi_core::CustomObjectData;
use metrics::{counter, histogram};
use tracing::debug;

use crate::{JsonCodec, ObjectCodec, ObjectStore, StoreError};

pub fn make_schema_key(schema: &str) -> String {
    format!("custom/{}", schema)
}

pub fn make_key(schema: &str, name: &str) -> String {
    format!("{}/{}", make_schema_key(schema), name)
}

#[async_trait::async_trait]
pub trait CustomObjectRegistry: Send + Sync {
    async fn get(&self, schema: &str, name: &str) -> Result<CustomObjectData, StoreError>;
    /// Blind overwrite: concurrent writers to the same name race, last write wins.
    async fn set(&self, schema: &str, name: &str, data: &CustomObjectData) -> Result<(), StoreError>;
    async fn delete(&self, schema: &str, name: &str) -> Result<(), StoreError>;
    /// Fails on the first undecodable entry rather than returning a partial list.
    async fn list(&self, schema: &str) -> Result<Vec<CustomObjectData>, StoreError>;
}

pub struct KvObjectRegistry {
    store: Arc<dyn ObjectStore>,
    codec: Arc<dyn ObjectCodec>,
}

impl KvObjectRegistry {
    pub fn new(store: Arc<dyn ObjectStore>, codec: Arc<dyn ObjectCodec>) -> Self {
        Self { store, codec }
    }

    pub fn with_json(store: Arc<dyn ObjectStore>) -> Self { Self::new(store, Arc::new(JsonCodec)) }

    fn decode(&self, key: &str, raw: &[u8]) -> Result<CustomObjectData, StoreError> {
        self.codec.decode(raw).map_err(|message| StoreError::Decode { key: key.to_string(), message })
    }
}

#[async_trait::async_trait]
impl CustomObjectRegistry for KvObjectRegistry {
    async fn get(&self, schema: &str, name: &str) -> Result<CustomObjectData, StoreError> {
        let key = make_key(schema, name);
        let raw = self.store.get(&key).await?;
        self.decode(&key, &raw)
    }

    async fn set(&self, schema: &str, name: &str, data: &CustomObjectData) -> Result<(), StoreError> {
        let key = make_key(schema, name);
        let encoded = self
            .codec
            .encode(data)
            .map_err(|message| StoreError::Encode { key: key.clone(), message })?;
        self.store.set(&key, encoded, None).await?;
        counter!("registry_set_total").increment(1);
        debug!(%key, version = %data.version, "custom object stored");
        Ok(())
    }

    async fn delete(&self, schema: &str, name: &str) -> Result<(), StoreError> {
        let key = make_key(schema, name);
        self.store.delete(&key).await?;
        counter!("registry_delete_total").increment(1);
        debug!(%key, "custom object deleted");
        Ok(())
    }

    async fn list(&self, schema: &str) -> Result<Vec<CustomObjectData>, StoreError> {
        let started = Instant::now();
        let entries = self.store.list_prefix(&make_schema_key(schema)).await?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            out.push(self.decode(&entry.key, &entry.value)?);
        }
        histogram!("registry_list_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }
}

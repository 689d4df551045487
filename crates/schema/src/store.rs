//! Schema registry persisted in an `ObjectStore` under `schemas/<name>`.

use std::sync::Arc;

use dynapi_core::{ApiError, Schema, StoreError};
use dynapi_store::ObjectStore;
use futures::StreamExt;
use tokio::sync::{broadcast, Mutex};
use tracing::{info, warn};

use crate::{validate_schema, SchemaEvent, SchemaRegistry, SchemaWatch};

const SCHEMA_DIR: &str = "schemas";

fn schema_key(name: &str) -> String { format!("{}/{}", SCHEMA_DIR, name) }

pub struct StoreSchemaRegistry {
    store: Arc<dyn ObjectStore>,
    events: broadcast::Sender<SchemaEvent>,
    // Serializes read-modify-write sequences issued through this registry.
    writes: Mutex<()>,
}

impl StoreSchemaRegistry {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        let cap = std::env::var("DYNAPI_WATCH_CAP").ok().and_then(|s| s.parse::<usize>().ok()).unwrap_or(256);
        let (events, _) = broadcast::channel(cap.max(1));
        Self { store, events, writes: Mutex::new(()) }
    }

    async fn load(&self, name: &str) -> Result<Option<Schema>, ApiError> {
        let key = schema_key(name);
        match self.store.get(&key).await {
            Ok(raw) => serde_json::from_slice(&raw).map(Some).map_err(|e| {
                warn!(%key, error = %e, "stored schema is not decodable");
                ApiError::Internal(format!("schema {} could not be decoded", name))
            }),
            Err(StoreError::NotFound(_)) => Ok(None),
            Err(e) => Err(store_failure(e)),
        }
    }

    async fn save(&self, schema: &Schema) -> Result<(), ApiError> {
        let raw = serde_json::to_vec(schema).map_err(|e| ApiError::Internal(e.to_string()))?;
        self.store.set(&schema_key(schema.name()), raw, None).await.map_err(store_failure)
    }

    fn publish(&self, ev: SchemaEvent) {
        // No subscribers is not an error.
        let _ = self.events.send(ev);
    }
}

fn store_failure(e: StoreError) -> ApiError {
    warn!(error = %e, "schema store operation failed");
    ApiError::from(e)
}

#[async_trait::async_trait]
impl SchemaRegistry for StoreSchemaRegistry {
    async fn list(&self) -> Result<Vec<Schema>, ApiError> {
        let entries = self.store.list_prefix(SCHEMA_DIR).await.map_err(store_failure)?;
        let mut out = Vec::with_capacity(entries.len());
        for entry in entries.iter() {
            let schema: Schema = serde_json::from_slice(&entry.value).map_err(|e| {
                warn!(key = %entry.key, error = %e, "stored schema is not decodable");
                ApiError::Internal(format!("schema at {} could not be decoded", entry.key))
            })?;
            out.push(schema);
        }
        Ok(out)
    }

    async fn watch(&self) -> Result<SchemaWatch, ApiError> {
        let rx = self.events.subscribe();
        let stream = futures::stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(ev) => return Some((Ok(ev), rx)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "schema watcher lagged; events dropped");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        });
        Ok(stream.boxed())
    }

    async fn get(&self, name: &str) -> Result<Schema, ApiError> {
        self.load(name).await?.ok_or_else(|| ApiError::not_found("schema", name))
    }

    async fn create(&self, mut schema: Schema) -> Result<Schema, ApiError> {
        validate_schema(&schema)?;
        let _guard = self.writes.lock().await;
        if self.load(schema.name()).await?.is_some() {
            return Err(ApiError::Conflict(format!("schema {} already exists", schema.name())));
        }
        schema.metadata.uid = Some(uuid::Uuid::new_v4().to_string());
        schema.metadata.creation_timestamp = Some(chrono::Utc::now().to_rfc3339());
        schema.metadata.resource_version = 1;
        self.save(&schema).await?;
        info!(schema = %schema.name(), versions = schema.versions.len(), "schema created");
        self.publish(SchemaEvent::Added(schema.clone()));
        Ok(schema)
    }

    async fn update(&self, mut schema: Schema) -> Result<Schema, ApiError> {
        validate_schema(&schema)?;
        let _guard = self.writes.lock().await;
        let current = self.load(schema.name()).await?.ok_or_else(|| ApiError::not_found("schema", schema.name()))?;
        let requested = schema.metadata.resource_version;
        if requested != 0 && requested != current.metadata.resource_version {
            return Err(ApiError::Conflict(format!(
                "schema {} was modified (resource version {} != {})",
                schema.name(), requested, current.metadata.resource_version
            )));
        }
        schema.metadata.uid = current.metadata.uid;
        schema.metadata.creation_timestamp = current.metadata.creation_timestamp;
        schema.metadata.resource_version = current.metadata.resource_version + 1;
        self.save(&schema).await?;
        info!(schema = %schema.name(), rv = schema.metadata.resource_version, "schema updated");
        self.publish(SchemaEvent::Modified(schema.clone()));
        Ok(schema)
    }

    async fn delete(&self, name: &str) -> Result<(), ApiError> {
        let _guard = self.writes.lock().await;
        let current = self.load(name).await?.ok_or_else(|| ApiError::not_found("schema", name))?;
        match self.store.delete(&schema_key(name)).await {
            Ok(()) => {}
            Err(StoreError::NotFound(_)) => return Err(ApiError::not_found("schema", name)),
            Err(e) => return Err(store_failure(e)),
        }
        info!(schema = %name, "schema deleted");
        self.publish(SchemaEvent::Deleted(current));
        Ok(())
    }
}

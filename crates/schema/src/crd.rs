//! Read-only schema source backed by the cluster's CustomResourceDefinitions.
//!
//! Schema name is the CRD plural; versions are the served CRD versions in declaration
//! order; fields are the top-level properties of `spec` in each version's
//! `openAPIV3Schema` (falling back to the root properties minus the envelope).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use dynapi_core::{ApiError, Field, FieldType, ObjectMeta, Schema, SchemaSpec, Version};
use futures::StreamExt;
use k8s_openapi::apiextensions_apiserver::pkg::apis::apiextensions::v1 as apiextv1;
use kube::{
    api::Api,
    runtime::{
        reflector::{self, Store},
        watcher::{self, Event},
        WatchStreamExt,
    },
    Client,
};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::{SchemaEvent, SchemaRegistry, SchemaWatch};

const ENVELOPE: [&str; 4] = ["apiVersion", "kind", "metadata", "status"];

/// How long a lookup waits for the first full CRD listing.
const CACHE_SYNC_TIMEOUT: Duration = Duration::from_secs(30);

type Crd = apiextv1::CustomResourceDefinition;

/// Local copy of every CRD, kept current by a background reflector.
struct CrdCache {
    store: Store<Crd>,
    task: Option<JoinHandle<()>>,
}

impl CrdCache {
    fn spawn(api: Api<Crd>) -> Self {
        let (store, writer) = reflector::store();
        let stream = reflector::reflector(writer, watcher::watcher(api, watcher::Config::default()).default_backoff());
        let task = tokio::spawn(stream.for_each(|ev| async move {
            if let Err(e) = ev {
                warn!(error = %e, "CRD cache watch failed; retrying");
            }
        }));
        Self { store, task: Some(task) }
    }

    async fn crds(&self) -> Result<Vec<Arc<Crd>>, ApiError> {
        match tokio::time::timeout(CACHE_SYNC_TIMEOUT, self.store.wait_until_ready()).await {
            Ok(Ok(())) => Ok(self.store.state()),
            Ok(Err(_)) => Err(ApiError::Internal("CRD cache stopped before its first sync".into())),
            Err(_) => Err(ApiError::Internal("CRD cache not synced".into())),
        }
    }

    async fn schemas(&self) -> Result<Vec<Schema>, ApiError> {
        let mut out: Vec<Schema> = self.crds().await?.iter().map(|crd| schema_from_crd(crd)).collect();
        out.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(out)
    }

    // CRD objects are named <plural>.<group>; match on plural to keep the lookup group-free.
    async fn schema(&self, name: &str) -> Result<Schema, ApiError> {
        self.crds()
            .await?
            .iter()
            .find(|crd| crd.spec.names.plural == name)
            .map(|crd| schema_from_crd(crd))
            .ok_or_else(|| ApiError::not_found("schema", name))
    }
}

impl Drop for CrdCache {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

/// Reads come from a reflector cache; `watch` opens its own watcher.
pub struct CrdSchemaRegistry {
    client: Client,
    cache: CrdCache,
}

impl CrdSchemaRegistry {
    /// Starts the CRD reflector; must be called inside a tokio runtime.
    pub fn new(client: Client) -> Self {
        let cache = CrdCache::spawn(Api::all(client.clone()));
        Self { client, cache }
    }

    pub async fn try_default() -> anyhow::Result<Self> {
        Ok(Self::new(dynapi_kubehub::get_kube_client().await?))
    }

    fn api(&self) -> Api<Crd> { Api::all(self.client.clone()) }
}

fn read_only() -> ApiError {
    ApiError::bad_request("CRD-backed schemas are read-only; change the CustomResourceDefinition instead")
}

fn props_to_fields(props: &BTreeMap<String, apiextv1::JSONSchemaProps>, skip_envelope: bool) -> Vec<Field> {
    props
        .iter()
        .filter(|(k, _)| !(skip_envelope && ENVELOPE.contains(&k.as_str())))
        .map(|(k, v)| Field { name: k.clone(), ty: v.type_.as_deref().map(FieldType::from_openapi).unwrap_or_default() })
        .collect()
}

fn spec_for(version: &apiextv1::CustomResourceDefinitionVersion) -> SchemaSpec {
    let root = match version.schema.as_ref().and_then(|s| s.open_api_v3_schema.as_ref()) {
        Some(r) => r,
        None => return SchemaSpec::default(),
    };
    let props = match root.properties.as_ref() {
        Some(p) => p,
        None => return SchemaSpec::default(),
    };
    let fields = match props.get("spec").and_then(|s| s.properties.as_ref()) {
        Some(spec_props) => props_to_fields(spec_props, false),
        None => props_to_fields(props, true),
    };
    SchemaSpec { fields }
}

/// Convert a CRD into a `Schema`, keeping only served versions.
pub fn schema_from_crd(crd: &apiextv1::CustomResourceDefinition) -> Schema {
    let versions = crd
        .spec
        .versions
        .iter()
        .filter(|v| v.served)
        .map(|v| Version { name: v.name.clone(), spec: spec_for(v) })
        .collect();
    let metadata = ObjectMeta {
        name: crd.spec.names.plural.clone(),
        uid: crd.metadata.uid.clone(),
        resource_version: crd.metadata.resource_version.as_deref().and_then(|s| s.parse().ok()).unwrap_or(0),
        creation_timestamp: crd.metadata.creation_timestamp.as_ref().map(|t| t.0.to_rfc3339()),
    };
    Schema { metadata, versions }
}

#[async_trait::async_trait]
impl SchemaRegistry for CrdSchemaRegistry {
    async fn list(&self) -> Result<Vec<Schema>, ApiError> {
        let out = self.cache.schemas().await?;
        debug!(count = out.len(), "listed CRD schemas");
        Ok(out)
    }

    async fn watch(&self) -> Result<SchemaWatch, ApiError> {
        let stream = watcher::watcher(self.api(), watcher::Config::default())
            .map(|ev| -> Vec<Result<SchemaEvent, ApiError>> {
                match ev {
                    Ok(Event::Applied(crd)) => vec![Ok(SchemaEvent::Modified(schema_from_crd(&crd)))],
                    Ok(Event::Deleted(crd)) => vec![Ok(SchemaEvent::Deleted(schema_from_crd(&crd)))],
                    Ok(Event::Restarted(list)) => {
                        debug!(count = list.len(), "CRD watch restart");
                        list.iter().map(|crd| Ok(SchemaEvent::Added(schema_from_crd(crd)))).collect()
                    }
                    Err(e) => vec![Err(ApiError::Internal(format!("CRD watch failed: {}", e)))],
                }
            })
            .flat_map(futures::stream::iter);
        Ok(stream.boxed())
    }

    async fn get(&self, name: &str) -> Result<Schema, ApiError> { self.cache.schema(name).await }

    async fn create(&self, _schema: Schema) -> Result<Schema, ApiError> { Err(read_only()) }

    async fn update(&self, _schema: Schema) -> Result<Schema, ApiError> { Err(read_only()) }

    async fn delete(&self, _name: &str) -> Result<(), ApiError> { Err(read_only()) }
}

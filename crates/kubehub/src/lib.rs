//! dynapi kubehub: shared kube client and API discovery.

#![forbid(unsafe_code)]

use anyhow::{Context, Result};
use kube::{
    discovery::{Discovery, Scope},
    Client,
};
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::info;

static CLIENT: OnceCell<Client> = OnceCell::const_new();

/// Process-wide kube client, built from the default kubeconfig / in-cluster env on first use.
pub async fn get_kube_client() -> Result<Client> {
    let client = CLIENT
        .get_or_try_init(|| async { Client::try_default().await.context("building kube client") })
        .await?;
    Ok(client.clone())
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct DiscoveredResource {
    pub group: String,
    pub version: String,
    pub kind: String,
    /// Lowercase plural used in URLs, e.g. `pods`.
    pub plural: String,
    pub namespaced: bool,
}

/// Discover served resources (incl. CRDs) using kube Discovery.
pub async fn discover() -> Result<Vec<DiscoveredResource>> {
    let client = get_kube_client().await?;
    let discovery = Discovery::new(client).run().await.context("running API discovery")?;
    let mut out = Vec::new();
    for group in discovery.groups() {
        for version in group.versions() {
            for (ar, caps) in group.versioned_resources(version) {
                out.push(DiscoveredResource {
                    group: ar.group.clone(),
                    version: ar.version.clone(),
                    kind: ar.kind.clone(),
                    plural: ar.plural.clone(),
                    namespaced: matches!(caps.scope, Scope::Namespaced),
                });
            }
        }
    }
    // Stable-ish order
    out.sort_by(|a, b| a.group.cmp(&b.group).then(a.version.cmp(&b.version)).then(a.kind.cmp(&b.kind)));
    info!(count = out.len(), "discovery complete");
    Ok(out)
}

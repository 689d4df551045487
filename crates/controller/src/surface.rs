use std::collections::BTreeSet;

use anyhow::{bail, Result};
use arc_swap::ArcSwap;
use dynapi_core::Schema;
use tracing::{debug, info};

use crate::{api_path, schema_path};

/// Whatever makes a schema's endpoints reachable.
#[async_trait::async_trait]
pub trait ApiSurfaceManager: Send + Sync {
    async fn install(&self, schema: &Schema) -> Result<()>;
    async fn remove(&self, path: &str) -> Result<()>;
    async fn has(&self, schema: &Schema) -> Result<bool>;
    /// Paths of every installed API.
    async fn list_installed(&self) -> Vec<String>;
}

type Paths = BTreeSet<String>;

/// In-process surface: the set of installed API paths that request routing consults on every call.
///
/// Readers take a lock-free snapshot; writers replace the whole set.
#[derive(Default)]
pub struct InstalledApis {
    paths: ArcSwap<Paths>,
}

impl InstalledApis {
    pub fn new() -> Self { Self::default() }

    pub fn is_installed(&self, schema: &str) -> bool {
        self.paths.load().contains(&schema_path(schema))
    }
}

#[async_trait::async_trait]
impl ApiSurfaceManager for InstalledApis {
    async fn install(&self, schema: &Schema) -> Result<()> {
        let path = api_path(schema)?;
        self.paths.rcu(|cur| {
            let mut next = Paths::clone(cur);
            next.insert(path.clone());
            next
        });
        info!(%path, versions = schema.versions.len(), "api installed");
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        let mut removed = false;
        self.paths.rcu(|cur| {
            let mut next = Paths::clone(cur);
            removed = next.remove(path);
            next
        });
        if !removed {
            bail!("api {} is not installed", path);
        }
        info!(%path, "api removed");
        Ok(())
    }

    async fn has(&self, schema: &Schema) -> Result<bool> {
        let path = api_path(schema)?;
        let hit = self.paths.load().contains(&path);
        debug!(%path, hit, "api lookup");
        Ok(hit)
    }

    async fn list_installed(&self) -> Vec<String> {
        self.paths.load().iter().cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn install_remove_and_lookup() {
        let apis = InstalledApis::new();
        let widgets = Schema::new("widgets", vec![]);
        assert!(!apis.has(&widgets).await.unwrap());

        apis.install(&widgets).await.unwrap();
        assert!(apis.has(&widgets).await.unwrap());
        assert!(apis.is_installed("widgets"));
        assert!(!apis.is_installed("gadgets"));
        assert_eq!(apis.list_installed().await, vec!["/custom/widgets".to_string()]);

        apis.remove("/custom/widgets").await.unwrap();
        assert!(apis.list_installed().await.is_empty());
        assert!(!apis.is_installed("widgets"));
        assert!(apis.remove("/custom/widgets").await.is_err());
    }

    #[tokio::test]
    async fn reinstall_is_idempotent() {
        let apis = InstalledApis::new();
        apis.install(&Schema::new("widgets", vec![])).await.unwrap();
        apis.install(&Schema::new("widgets", vec![])).await.unwrap();
        apis.install(&Schema::new("gadgets", vec![])).await.unwrap();
        assert_eq!(apis.list_installed().await, vec!["/custom/gadgets".to_string(), "/custom/widgets".to_string()]);
    }

    #[tokio::test]
    async fn invalid_schema_name_is_not_installed() {
        let apis = InstalledApis::new();
        assert!(apis.install(&Schema::new("Bad/Name", vec![])).await.is_err());
        assert!(apis.list_installed().await.is_empty());
    }
}

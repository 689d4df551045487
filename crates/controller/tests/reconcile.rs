use std::collections::BTreeSet;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use dynapi_controller::{ApiSurfaceManager, InstalledApis, ThirdPartyController, MIN_SYNC_INTERVAL};
use dynapi_core::{Schema, Version};
use dynapi_schema::{SchemaRegistry, StoreSchemaRegistry};
use dynapi_store::MemStore;

/// Surface that records paths in memory and counts mutating calls.
#[derive(Default)]
struct FakeSurface {
    paths: Mutex<BTreeSet<String>>,
    installs: AtomicUsize,
    removes: AtomicUsize,
    lists: AtomicUsize,
    fail_install: Option<String>,
    fail_remove: Option<String>,
}

impl FakeSurface {
    fn with_paths(paths: &[&str]) -> Self {
        let fake = Self::default();
        fake.paths.lock().unwrap().extend(paths.iter().map(|p| p.to_string()));
        fake
    }

    fn paths(&self) -> Vec<String> { self.paths.lock().unwrap().iter().cloned().collect() }
    fn installs(&self) -> usize { self.installs.load(Ordering::SeqCst) }
    fn removes(&self) -> usize { self.removes.load(Ordering::SeqCst) }
}

#[async_trait::async_trait]
impl ApiSurfaceManager for FakeSurface {
    async fn install(&self, schema: &Schema) -> Result<()> {
        self.installs.fetch_add(1, Ordering::SeqCst);
        if self.fail_install.as_deref() == Some(schema.name()) {
            bail!("install refused");
        }
        self.paths.lock().unwrap().insert(format!("/custom/{}", schema.name()));
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<()> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        if self.fail_remove.as_deref() == Some(path) {
            bail!("remove refused");
        }
        self.paths.lock().unwrap().remove(path);
        Ok(())
    }

    async fn has(&self, schema: &Schema) -> Result<bool> {
        Ok(self.paths.lock().unwrap().contains(&format!("/custom/{}", schema.name())))
    }

    async fn list_installed(&self) -> Vec<String> {
        self.lists.fetch_add(1, Ordering::SeqCst);
        self.paths()
    }
}

async fn registry_with(names: &[&str]) -> Arc<StoreSchemaRegistry> {
    let reg = Arc::new(StoreSchemaRegistry::new(Arc::new(MemStore::new())));
    for n in names {
        reg.create(Schema::new(*n, vec![Version { name: "v1".into(), spec: Default::default() }])).await.unwrap();
    }
    reg
}

fn paths(names: &[&str]) -> Vec<String> {
    let mut out: Vec<String> = names.iter().map(|n| format!("/custom/{}", n)).collect();
    out.sort();
    out
}

#[tokio::test]
async fn converges_from_empty() {
    let surface = Arc::new(FakeSurface::default());
    let ctl = ThirdPartyController::new(registry_with(&["gadgets", "widgets"]).await, surface.clone());

    let report = ctl.sync_loop().await.unwrap();
    assert_eq!(surface.paths(), paths(&["gadgets", "widgets"]));
    assert_eq!(report.installed.len(), 2);
    assert!(report.removed.is_empty());
}

#[tokio::test]
async fn converges_from_superset() {
    let surface = Arc::new(FakeSurface::with_paths(&["/custom/widgets", "/custom/stale", "/custom/old"]));
    let ctl = ThirdPartyController::new(registry_with(&["widgets"]).await, surface.clone());

    let report = ctl.sync_loop().await.unwrap();
    assert_eq!(surface.paths(), paths(&["widgets"]));
    assert!(report.installed.is_empty());
    assert_eq!(report.removed, vec!["/custom/old".to_string(), "/custom/stale".to_string()]);
    assert_eq!(surface.installs(), 0);
}

#[tokio::test]
async fn second_cycle_is_a_noop() {
    let surface = Arc::new(FakeSurface::with_paths(&["/custom/stale"]));
    let ctl = ThirdPartyController::new(registry_with(&["a", "b", "c"]).await, surface.clone());

    ctl.sync_loop().await.unwrap();
    let (installs, removes) = (surface.installs(), surface.removes());
    let report = ctl.sync_loop().await.unwrap();
    assert!(report.is_noop());
    assert_eq!(surface.installs(), installs);
    assert_eq!(surface.removes(), removes);
}

#[tokio::test]
async fn install_failure_aborts_the_cycle() {
    // schemas list in key order: a, broken, c
    let surface = Arc::new(FakeSurface { fail_install: Some("broken".into()), ..FakeSurface::with_paths(&["/custom/stale"]) });
    let ctl = ThirdPartyController::new(registry_with(&["a", "broken", "c"]).await, surface.clone());

    let err = ctl.sync_loop().await.unwrap_err();
    assert!(format!("{:#}", err).contains("broken"), "{:#}", err);
    // nothing after the failing schema ran, removal phase included
    assert_eq!(surface.paths(), paths(&["a", "stale"]));
    assert_eq!(surface.lists.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn removal_failure_does_not_stop_the_cycle() {
    let surface = Arc::new(FakeSurface {
        fail_remove: Some("/custom/stuck".into()),
        ..FakeSurface::with_paths(&["/custom/gone", "/custom/stuck", "/custom/zzz"])
    });
    let ctl = ThirdPartyController::new(registry_with(&["widgets"]).await, surface.clone());

    let report = ctl.sync_loop().await.unwrap();
    assert_eq!(report.failed_removals, vec!["/custom/stuck".to_string()]);
    assert_eq!(report.removed, vec!["/custom/gone".to_string(), "/custom/zzz".to_string()]);
    assert_eq!(surface.paths(), paths(&["stuck", "widgets"]));
}

#[tokio::test]
async fn tracks_registry_changes_with_in_memory_surface() {
    let reg = registry_with(&["widgets"]).await;
    let apis = Arc::new(InstalledApis::new());
    let ctl = ThirdPartyController::new(reg.clone(), apis.clone());

    ctl.sync_loop().await.unwrap();
    assert!(apis.is_installed("widgets"));

    reg.create(Schema::new("gadgets", vec![Version { name: "v1".into(), spec: Default::default() }])).await.unwrap();
    reg.delete("widgets").await.unwrap();
    ctl.sync_loop().await.unwrap();
    assert!(apis.is_installed("gadgets"));
    assert!(!apis.is_installed("widgets"));
}

#[tokio::test(start_paused = true)]
async fn scheduled_task_runs_once_per_period_until_stopped() {
    let surface = Arc::new(FakeSurface::default());
    let ctl = Arc::new(ThirdPartyController::new(registry_with(&["widgets"]).await, surface.clone()));

    let handle = ctl.spawn(Duration::from_secs(10));
    // ticks at 0s, 10s and 20s
    tokio::time::sleep(Duration::from_secs(25)).await;
    handle.stop().await;
    assert_eq!(surface.lists.load(Ordering::SeqCst), 3);
    assert_eq!(surface.installs(), 1);

    tokio::time::sleep(Duration::from_secs(60)).await;
    assert_eq!(surface.lists.load(Ordering::SeqCst), 3);
}

#[tokio::test(start_paused = true)]
async fn failing_cycles_keep_the_schedule_alive() {
    let surface = Arc::new(FakeSurface { fail_install: Some("widgets".into()), ..FakeSurface::default() });
    let ctl = Arc::new(ThirdPartyController::new(registry_with(&["widgets"]).await, surface.clone()));

    let handle = ctl.spawn(Duration::from_secs(10));
    tokio::time::sleep(Duration::from_secs(35)).await;
    handle.stop().await;
    assert_eq!(surface.installs(), 4);
}

#[tokio::test(start_paused = true)]
async fn zero_period_runs_at_minimum_interval() {
    let surface = Arc::new(FakeSurface::default());
    let ctl = Arc::new(ThirdPartyController::new(registry_with(&["widgets"]).await, surface.clone()));

    let handle = ctl.spawn(Duration::ZERO);
    // ticks at 0s, 1s and 2s
    tokio::time::sleep(MIN_SYNC_INTERVAL * 2 + Duration::from_millis(500)).await;
    handle.stop().await;
    assert_eq!(surface.lists.load(Ordering::SeqCst), 3);
    assert_eq!(surface.paths(), paths(&["widgets"]));
}

use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use dynapi_core::Schema;
use dynapi_schema::SchemaRegistry;
use metrics::{counter, histogram};
use rustc_hash::FxHashSet;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::{api_path, ApiSurfaceManager, MIN_SYNC_INTERVAL};

/// What one reconciliation cycle changed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub installed: Vec<String>,
    pub removed: Vec<String>,
    /// Stale paths whose removal failed; retried next cycle.
    pub failed_removals: Vec<String>,
}

impl SyncReport {
    pub fn is_noop(&self) -> bool {
        self.installed.is_empty() && self.removed.is_empty() && self.failed_removals.is_empty()
    }
}

pub struct ThirdPartyController {
    schemas: Arc<dyn SchemaRegistry>,
    surface: Arc<dyn ApiSurfaceManager>,
}

impl ThirdPartyController {
    pub fn new(schemas: Arc<dyn SchemaRegistry>, surface: Arc<dyn ApiSurfaceManager>) -> Self {
        Self { schemas, surface }
    }

    /// Install `schema`'s API unless it is already present. Returns whether an install happened.
    pub async fn sync_one(&self, schema: &Schema) -> Result<bool> {
        if self.surface.has(schema).await.with_context(|| format!("checking api for schema {}", schema.name()))? {
            return Ok(false);
        }
        self.surface
            .install(schema)
            .await
            .with_context(|| format!("installing api for schema {}", schema.name()))?;
        counter!("controller_installs_total").increment(1);
        Ok(true)
    }

    /// One full reconciliation pass.
    ///
    /// The first install failure aborts the pass; schemas after it wait for the next one.
    /// Removal failures are logged and the pass carries on.
    pub async fn sync_loop(&self) -> Result<SyncReport> {
        let schemas = self.schemas.list().await.context("listing schemas")?;
        let mut report = SyncReport::default();
        let mut desired: FxHashSet<String> = FxHashSet::default();
        for schema in schemas.iter() {
            let path = api_path(schema)?;
            if self.sync_one(schema).await? {
                report.installed.push(path.clone());
            }
            desired.insert(path);
        }

        for path in self.surface.list_installed().await {
            if desired.contains(&path) {
                continue;
            }
            match self.surface.remove(&path).await {
                Ok(()) => {
                    counter!("controller_removals_total").increment(1);
                    report.removed.push(path);
                }
                Err(e) => {
                    warn!(%path, error = %e, "removing stale api failed");
                    report.failed_removals.push(path);
                }
            }
        }
        Ok(report)
    }

    async fn cycle(&self) {
        let started = Instant::now();
        counter!("controller_cycles_total").increment(1);
        match self.sync_loop().await {
            Ok(report) if report.is_noop() => debug!("api surface in sync"),
            Ok(report) => info!(
                installed = report.installed.len(),
                removed = report.removed.len(),
                failed_removals = report.failed_removals.len(),
                "api surface reconciled"
            ),
            Err(e) => {
                counter!("controller_cycle_errors_total").increment(1);
                error!(error = format!("{:#}", e), "third party api sync failed");
            }
        }
        histogram!("controller_cycle_ms").record(started.elapsed().as_secs_f64() * 1000.0);
    }

    /// Run a cycle now and then every `period` until the returned handle is stopped.
    ///
    /// Cycles never overlap; a slow cycle delays the next tick. Periods below
    /// [`MIN_SYNC_INTERVAL`] are raised to it.
    pub fn spawn(self: Arc<Self>, period: Duration) -> ControllerHandle {
        if period < MIN_SYNC_INTERVAL {
            warn!(requested_ms = period.as_millis() as u64, "sync period too short; using minimum");
        }
        let period = period.max(MIN_SYNC_INTERVAL);
        let (stop_tx, mut stop_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            info!(period_ms = period.as_millis() as u64, "controller starting");
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    _ = &mut stop_rx => break,
                    _ = ticker.tick() => self.cycle().await,
                }
            }
            info!("controller stopped");
        });
        ControllerHandle { stop: Some(stop_tx), task: Some(task) }
    }
}

/// Owner of a running controller task.
pub struct ControllerHandle {
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl ControllerHandle {
    /// Signal the task and wait for the in-flight cycle, if any, to finish.
    pub async fn stop(mut self) {
        if let Some(tx) = self.stop.take() { let _ = tx.send(()); }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                warn!(error = %e, "controller task ended abnormally");
            }
        }
    }
}

impl Drop for ControllerHandle {
    fn drop(&mut self) {
        if let Some(tx) = self.stop.take() { let _ = tx.send(()); }
    }
}

//! In-memory `ObjectStore` used by tests and single-process deployments.

use std::collections::BTreeMap;
use std::sync::RwLock;
use std::time::{Duration, Instant};

use anyhow::anyhow;
use tracing::trace;

use crate::{is_direct_child, KvEntry, ObjectStore, StoreError};

#[derive(Debug, Clone)]
struct Slot {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn live(&self, now: Instant) -> bool { self.expires_at.map(|t| t > now).unwrap_or(true) }
}

/// Ordered map behind a `RwLock`; per-key operations are serialized by the lock.
#[derive(Debug, Default)]
pub struct MemStore {
    map: RwLock<BTreeMap<String, Slot>>,
}

impl MemStore {
    pub fn new() -> Self { Self::default() }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.map.read().map(|m| m.values().filter(|s| s.live(now)).count()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool { self.len() == 0 }

    /// Write raw bytes directly, bypassing any codec (test seeding).
    pub fn insert_raw(&self, key: &str, value: impl Into<Vec<u8>>) {
        if let Ok(mut m) = self.map.write() {
            m.insert(key.to_string(), Slot { value: value.into(), expires_at: None });
        }
    }
}

fn poisoned() -> StoreError { StoreError::Backend(anyhow!("memstore lock poisoned")) }

#[async_trait::async_trait]
impl ObjectStore for MemStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let m = self.map.read().map_err(|_| poisoned())?;
        match m.get(key) {
            Some(slot) if slot.live(Instant::now()) => Ok(slot.value.clone()),
            _ => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
        let mut m = self.map.write().map_err(|_| poisoned())?;
        let expires_at = ttl.filter(|d| !d.is_zero()).map(|d| Instant::now() + d);
        trace!(key, bytes = value.len(), "memstore set");
        m.insert(key.to_string(), Slot { value, expires_at });
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let mut m = self.map.write().map_err(|_| poisoned())?;
        match m.remove(key) {
            Some(slot) if slot.live(Instant::now()) => Ok(()),
            _ => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn list_prefix(&self, dir: &str) -> Result<Vec<KvEntry>, StoreError> {
        let m = self.map.read().map_err(|_| poisoned())?;
        let now = Instant::now();
        let start = format!("{}/", dir);
        let out = m
            .range(start.clone()..)
            .take_while(|(k, _)| k.starts_with(&start))
            .filter(|(k, slot)| is_direct_child(dir, k) && slot.live(now))
            .map(|(k, slot)| KvEntry { key: k.clone(), value: slot.value.clone() })
            .collect();
        Ok(out)
    }
}

//! dynapi persistence: SQLite-backed `ObjectStore` adapter.
//! Keep code tiny and predictable.

#![forbid(unsafe_code)]

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{anyhow, Context};
use dynapi_store::{is_direct_child, KvEntry, ObjectStore, StoreError};
use metrics::{counter, histogram};
use rusqlite::OptionalExtension;
use tracing::debug;

/// SQLite-backed store. Simple, synchronous; one connection guarded by a mutex.
pub struct SqliteStore {
    db: Mutex<rusqlite::Connection>,
}

impl SqliteStore {
    pub fn open_default() -> anyhow::Result<Self> {
        let path = std::env::var("DYNAPI_DB_PATH").unwrap_or_else(|_| default_db_path());
        Self::open(&path)
    }

    pub fn open(path: &str) -> anyhow::Result<Self> {
        let db = rusqlite::Connection::open(path).with_context(|| format!("opening sqlite db at {}", path))?;
        db.pragma_update(None, "journal_mode", &"WAL").ok();
        db.pragma_update(None, "synchronous", &"NORMAL").ok();
        Self::init(db)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::init(rusqlite::Connection::open_in_memory().context("opening in-memory sqlite")?)
    }

    fn init(db: rusqlite::Connection) -> anyhow::Result<Self> {
        let started = std::time::Instant::now();
        db.execute(
            "CREATE TABLE IF NOT EXISTS kv (
                key        TEXT PRIMARY KEY,
                value      BLOB NOT NULL,
                expires_at INTEGER
            )",
            [],
        ).context("creating kv table")?;
        histogram!("persist_open_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        Ok(Self { db: Mutex::new(db) })
    }

    fn conn(&self) -> Result<std::sync::MutexGuard<'_, rusqlite::Connection>, StoreError> {
        self.db.lock().map_err(|_| StoreError::Backend(anyhow!("sqlite connection lock poisoned")))
    }
}

fn backend(e: rusqlite::Error, what: &str) -> StoreError {
    StoreError::Backend(anyhow::Error::new(e).context(what.to_string()))
}

fn live(expires_at: Option<i64>, now: i64) -> bool { expires_at.map(|t| t > now).unwrap_or(true) }

fn expiry_for(ttl: Option<Duration>) -> Option<i64> {
    let ttl = ttl.filter(|d| !d.is_zero())?;
    // Whole seconds, rounded up so sub-second ttls still expire in the future.
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    Some(now_ts() + secs as i64)
}

#[async_trait::async_trait]
impl ObjectStore for SqliteStore {
    async fn get(&self, key: &str) -> Result<Vec<u8>, StoreError> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        let row: Option<(Vec<u8>, Option<i64>)> = db
            .query_row("SELECT value, expires_at FROM kv WHERE key = ?1", [key], |row| Ok((row.get(0)?, row.get(1)?)))
            .optional()
            .map_err(|e| backend(e, "reading kv row"))?;
        histogram!("persist_get_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        match row {
            Some((value, exp)) if live(exp, now_ts()) => Ok(value),
            Some(_) => {
                debug!(key, "dropping expired key");
                db.execute("DELETE FROM kv WHERE key = ?1", [key]).map_err(|e| backend(e, "expiring kv row"))?;
                Err(StoreError::NotFound(key.to_string()))
            }
            None => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<(), StoreError> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        db.execute(
            "INSERT INTO kv(key, value, expires_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, expires_at = excluded.expires_at",
            rusqlite::params![key, value, expiry_for(ttl)],
        ).map_err(|e| backend(e, "writing kv row"))?;
        histogram!("persist_put_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        counter!("persist_put_total").increment(1);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), StoreError> {
        let db = self.conn()?;
        let exp: Option<Option<i64>> = db
            .query_row("SELECT expires_at FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()
            .map_err(|e| backend(e, "reading kv row"))?;
        db.execute("DELETE FROM kv WHERE key = ?1", [key]).map_err(|e| backend(e, "deleting kv row"))?;
        match exp {
            Some(exp) if live(exp, now_ts()) => Ok(()),
            _ => Err(StoreError::NotFound(key.to_string())),
        }
    }

    async fn list_prefix(&self, dir: &str) -> Result<Vec<KvEntry>, StoreError> {
        let started = std::time::Instant::now();
        let db = self.conn()?;
        // '/' + 1 == '0', so [dir/, dir0) covers every key under dir/.
        let lo = format!("{}/", dir);
        let hi = format!("{}0", dir);
        let mut stmt = db
            .prepare("SELECT key, value, expires_at FROM kv WHERE key >= ?1 AND key < ?2 ORDER BY key")
            .map_err(|e| backend(e, "preparing kv scan"))?;
        let mut rows = stmt.query([&lo, &hi]).map_err(|e| backend(e, "scanning kv"))?;
        let now = now_ts();
        let mut out = Vec::new();
        while let Some(row) = rows.next().map_err(|e| backend(e, "scanning kv"))? {
            let key: String = row.get(0).map_err(|e| backend(e, "reading key"))?;
            let exp: Option<i64> = row.get(2).map_err(|e| backend(e, "reading expiry"))?;
            if !is_direct_child(dir, &key) || !live(exp, now) { continue; }
            let value: Vec<u8> = row.get(1).map_err(|e| backend(e, "reading value"))?;
            out.push(KvEntry { key, value });
        }
        histogram!("persist_list_ms").record(started.elapsed().as_secs_f64() * 1000.0);
        Ok(out)
    }
}

fn default_db_path() -> String {
    if let Some(home) = std::env::var_os("HOME") {
        let mut p = std::path::PathBuf::from(home);
        p.push(".dynapi");
        let _ = std::fs::create_dir_all(&p);
        p.push("dynapi.db");
        return p.to_string_lossy().to_string();
    }
    // Fallback to current directory
    "dynapi.db".to_string()
}

pub fn now_ts() -> i64 {
    // seconds since epoch
    let now = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default();
    now.as_secs() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use dynapi_core::CustomObjectData;
    use dynapi_store::{CustomObjectRegistry, KvObjectRegistry};
    use std::sync::Arc;

    /// Unique on-disk db path; the file and its WAL/SHM siblings go away on drop.
    struct TempDb(String);

    impl TempDb {
        fn new() -> Self {
            let nanos = std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap().as_nanos();
            let f = format!("dynapi-test-{}-{}.db", std::process::id(), nanos);
            Self(std::env::temp_dir().join(f).to_string_lossy().to_string())
        }

        fn path(&self) -> &str { &self.0 }

        fn files(&self) -> [String; 3] {
            [self.0.clone(), format!("{}-wal", self.0), format!("{}-shm", self.0)]
        }
    }

    impl Drop for TempDb {
        fn drop(&mut self) {
            for f in self.files() { let _ = std::fs::remove_file(f); }
        }
    }

    #[tokio::test]
    async fn set_get_delete_roundtrip() {
        let s = SqliteStore::open_in_memory().unwrap();
        s.set("custom/w/a", b"1".to_vec(), None).await.unwrap();
        s.set("custom/w/a", b"2".to_vec(), None).await.unwrap();
        assert_eq!(s.get("custom/w/a").await.unwrap(), b"2");
        s.delete("custom/w/a").await.unwrap();
        assert!(s.get("custom/w/a").await.unwrap_err().is_not_found());
        assert!(s.delete("custom/w/a").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn list_prefix_scans_direct_children_only() {
        let s = SqliteStore::open_in_memory().unwrap();
        for k in ["custom/w/b", "custom/w/a", "custom/w2/x", "custom/w/a/deep", "custom/w-x/y"] {
            s.set(k, k.as_bytes().to_vec(), None).await.unwrap();
        }
        let keys: Vec<_> = s.list_prefix("custom/w").await.unwrap().into_iter().map(|e| e.key).collect();
        assert_eq!(keys, vec!["custom/w/a".to_string(), "custom/w/b".to_string()]);
    }

    #[tokio::test]
    async fn expired_rows_are_not_found() {
        let s = SqliteStore::open_in_memory().unwrap();
        {
            let db = s.conn().unwrap();
            db.execute("INSERT INTO kv(key, value, expires_at) VALUES ('t/old', x'00', 1)", []).unwrap();
        }
        assert!(s.get("t/old").await.unwrap_err().is_not_found());
        assert!(s.list_prefix("t").await.unwrap().is_empty());
        s.set("t/new", b"v".to_vec(), Some(Duration::from_millis(500))).await.unwrap();
        assert_eq!(s.get("t/new").await.unwrap(), b"v");
    }

    #[tokio::test]
    async fn registry_persists_across_reopen() {
        let db = TempDb::new();
        {
            let reg = KvObjectRegistry::with_json(Arc::new(SqliteStore::open(db.path()).unwrap()));
            let obj = CustomObjectData { name: "w1".into(), version: "v1".into(), data: r#"{"name":"w1"}"#.into() };
            reg.set("widgets", "w1", &obj).await.unwrap();
        }
        {
            let reg = KvObjectRegistry::with_json(Arc::new(SqliteStore::open(db.path()).unwrap()));
            let got = reg.get("widgets", "w1").await.unwrap();
            assert_eq!(got.data, r#"{"name":"w1"}"#);
        }
        let files = db.files();
        assert!(std::path::Path::new(&files[0]).exists());
        drop(db);
        for f in files.iter() {
            assert!(!std::path::Path::new(f).exists(), "left behind: {}", f);
        }
    }
}

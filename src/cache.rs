use crate::error::Result;
use chrono::{Duration, Utc};
use rusqlite::{params, Connection};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::sync::Mutex;
use tracing::{debug, warn};

/// One row as returned by the persistent store.
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// Unix timestamp of the insert
    pub inserted_at: i64,
    pub payload: String,
}

/// Persistent keyed storage consumed by [`ExpiringCache`]. Keys are
/// addressed by (key, table) where `table` is a logical partition name.
pub trait CacheStore: Send + Sync {
    fn insert(&self, payload: &str, key: &str, table: &str) -> Result<()>;
    /// Exact-match select; no wildcard semantics.
    fn select_exact(&self, key: &str, table: &str) -> Result<Vec<StoredEntry>>;
    fn delete(&self, key: &str, table: &str) -> Result<()>;
}

/// Sqlite-backed store. One `cache_entries` table holds every partition;
/// `tbl` is the partition column.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open_at_path<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        if let Some(parent) = db_path.as_ref().parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(db_path)?;
        conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;
            CREATE TABLE IF NOT EXISTS cache_entries (
                key          TEXT NOT NULL,
                tbl          TEXT NOT NULL,
                inserted_at  INTEGER NOT NULL,
                payload      TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS cache_entries_key ON cache_entries (key, tbl);
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cache_entries (
                key          TEXT NOT NULL,
                tbl          TEXT NOT NULL,
                inserted_at  INTEGER NOT NULL,
                payload      TEXT NOT NULL
            );
            "#,
        )?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

impl CacheStore for SqliteStore {
    fn insert(&self, payload: &str, key: &str, table: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        // plain insert: de-duplication is the caller's contract, not ours
        conn.execute(
            "INSERT INTO cache_entries (key, tbl, inserted_at, payload) VALUES (?1, ?2, ?3, ?4)",
            params![key, table, Utc::now().timestamp(), payload],
        )?;
        Ok(())
    }

    fn select_exact(&self, key: &str, table: &str) -> Result<Vec<StoredEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn
            .prepare("SELECT inserted_at, payload FROM cache_entries WHERE key = ?1 AND tbl = ?2")?;
        let mut rows = stmt.query(params![key, table])?;
        let mut entries = Vec::new();
        while let Some(row) = rows.next()? {
            entries.push(StoredEntry {
                inserted_at: row.get(0)?,
                payload: row.get(1)?,
            });
        }
        Ok(entries)
    }

    fn delete(&self, key: &str, table: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "DELETE FROM cache_entries WHERE key = ?1 AND tbl = ?2",
            params![key, table],
        )?;
        Ok(())
    }
}

/// Serialized wrapper around a cached payload carrying its time-to-live.
#[derive(Debug, Serialize, Deserialize)]
struct CacheEnvelope {
    expiration_secs: i64,
    data: Value,
}

/// Keyed store of normalized payloads with per-entry expiration.
///
/// Constructed explicitly and handed to the service; lifecycle is owned by
/// the caller. With `enabled` false every lookup misses and every store is a
/// no-op, so callers must never assume caching occurred.
pub struct ExpiringCache {
    store: Box<dyn CacheStore>,
    enabled: bool,
    default_expiration: Duration,
}

impl ExpiringCache {
    pub fn new(store: Box<dyn CacheStore>) -> Self {
        Self {
            store,
            enabled: true,
            default_expiration: Duration::days(30),
        }
    }

    pub fn disabled(store: Box<dyn CacheStore>) -> Self {
        Self {
            enabled: false,
            ..Self::new(store)
        }
    }

    pub fn with_default_expiration(mut self, expiration: Duration) -> Self {
        self.default_expiration = expiration;
        self
    }

    /// Returns the cached payload under (notes, table), or `None` on a miss.
    ///
    /// Expired entries, undecodable entries and ambiguous states (more than
    /// one row under a key that should be unique) are deleted and reported
    /// as misses; none of them surface as errors.
    pub fn lookup<T: DeserializeOwned>(&self, notes: &[&str], table: &str) -> Result<Option<T>> {
        if !self.enabled {
            return Ok(None);
        }
        let key = notes.join(",");

        let entries = self.store.select_exact(&key, table)?;
        if entries.len() > 1 {
            // shouldn't ever have multiple results
            warn!(key = %key, table, count = entries.len(), "ambiguous cache state, clearing");
            self.store.delete(&key, table)?;
            return Ok(None);
        }
        let Some(entry) = entries.into_iter().next() else {
            debug!(key = %key, table, "cache miss");
            return Ok(None);
        };

        let envelope: CacheEnvelope = match serde_json::from_str(&entry.payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(key = %key, table, error = %e, "undecodable cache entry, deleting");
                self.store.delete(&key, table)?;
                return Ok(None);
            }
        };

        if self.is_expired(entry.inserted_at, envelope.expiration_secs) {
            debug!(key = %key, table, "cache entry expired, deleting");
            self.store.delete(&key, table)?;
            return Ok(None);
        }

        match serde_json::from_value(envelope.data) {
            Ok(data) => {
                debug!(key = %key, table, "cache hit");
                Ok(Some(data))
            }
            Err(e) => {
                warn!(key = %key, table, error = %e, "cached payload has wrong shape, deleting");
                self.store.delete(&key, table)?;
                Ok(None)
            }
        }
    }

    /// Inserts `payload` under (notes, table) with the given expiration
    /// (default 30 days). Does not de-duplicate: callers must check
    /// [`lookup`](Self::lookup) first to avoid duplicate entries.
    pub fn store<T: Serialize>(
        &self,
        payload: &T,
        notes: &[&str],
        table: &str,
        expiration: Option<Duration>,
    ) -> Result<()> {
        if !self.enabled {
            return Ok(());
        }
        let key = notes.join(",");
        let envelope = CacheEnvelope {
            expiration_secs: expiration
                .unwrap_or(self.default_expiration)
                .num_seconds(),
            data: serde_json::to_value(payload)?,
        };

        debug!(key = %key, table, "caching");
        self.store
            .insert(&serde_json::to_string(&envelope)?, &key, table)
    }

    fn is_expired(&self, inserted_at: i64, expiration_secs: i64) -> bool {
        Utc::now().timestamp() >= inserted_at + expiration_secs
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn memory_cache() -> ExpiringCache {
        ExpiringCache::new(Box::new(SqliteStore::open_in_memory().unwrap()))
    }

    #[test]
    fn round_trips_a_payload_before_expiration() {
        let cache = memory_cache();
        cache
            .store(&vec!["a".to_string(), "b".to_string()], &["x"], "t", None)
            .unwrap();

        let cached: Option<Vec<String>> = cache.lookup(&["x"], "t").unwrap();
        assert_eq!(cached, Some(vec!["a".to_string(), "b".to_string()]));
    }

    #[test]
    fn zero_duration_entries_expire_immediately() {
        let cache = memory_cache();
        cache
            .store(&"payload", &["x"], "t", Some(Duration::zero()))
            .unwrap();

        let cached: Option<String> = cache.lookup(&["x"], "t").unwrap();
        assert_eq!(cached, None);

        // the expired row was deleted, not just skipped
        cache.store(&"fresh", &["x"], "t", None).unwrap();
        let cached: Option<String> = cache.lookup(&["x"], "t").unwrap();
        assert_eq!(cached, Some("fresh".to_string()));
    }

    #[test]
    fn disabled_cache_never_hits() {
        let cache = ExpiringCache::disabled(Box::new(SqliteStore::open_in_memory().unwrap()));
        cache.store(&"payload", &["x"], "t", None).unwrap();

        let cached: Option<String> = cache.lookup(&["x"], "t").unwrap();
        assert_eq!(cached, None);
    }

    #[test]
    fn ambiguous_state_clears_and_misses() {
        let store = SqliteStore::open_in_memory().unwrap();
        let envelope = serde_json::to_string(&CacheEnvelope {
            expiration_secs: 3600,
            data: serde_json::json!("payload"),
        })
        .unwrap();
        store.insert(&envelope, "x", "t").unwrap();
        store.insert(&envelope, "x", "t").unwrap();

        let cache = ExpiringCache::new(Box::new(store));
        let cached: Option<String> = cache.lookup(&["x"], "t").unwrap();
        assert_eq!(cached, None);

        // both rows are gone after the self-heal
        let cached: Option<String> = cache.lookup(&["x"], "t").unwrap();
        assert_eq!(cached, None);
        cache.store(&"fresh", &["x"], "t", None).unwrap();
        let cached: Option<String> = cache.lookup(&["x"], "t").unwrap();
        assert_eq!(cached, Some("fresh".to_string()));
    }

    #[test]
    fn malformed_payload_is_a_miss_plus_deletion() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.insert("not json at all", "x", "t").unwrap();

        let cache = ExpiringCache::new(Box::new(store));
        let cached: Option<String> = cache.lookup(&["x"], "t").unwrap();
        assert_eq!(cached, None);

        cache.store(&"fresh", &["x"], "t", None).unwrap();
        let cached: Option<String> = cache.lookup(&["x"], "t").unwrap();
        assert_eq!(cached, Some("fresh".to_string()));
    }

    #[test]
    fn notes_join_into_one_lookup_key() {
        let cache = memory_cache();
        cache.store(&"payload", &["a", "b"], "t", None).unwrap();

        let joined: Option<String> = cache.lookup(&["a", "b"], "t").unwrap();
        assert_eq!(joined, Some("payload".to_string()));

        let different: Option<String> = cache.lookup(&["a"], "t").unwrap();
        assert_eq!(different, None);
    }
}

//! Caches owned by the data layer.
//!
//! Every cache is an explicit object constructed once and passed by
//! reference; none of them is global state.
//!
//! | Cache                  | Lives      | Key                              |
//! |------------------------|------------|----------------------------------|
//! | [`ResolvedCache`]      | memory     | (module context, table)          |
//! | [`DiskTableStore`]     | disk       | SHA256 of source content         |
//! | [`SchemaCache`]        | memory+disk| (table, content+mtime hash)      |
//! | [`RelationshipCache`]  | disk       | structural fingerprint           |
//!
//! The relationship cache is a small SQLite key-value store ([`KvStore`])
//! holding JSON values.
//!
//! # Key Format
//!
//! ```text
//! relationships:fingerprint   -> "ab12..."
//! relationships:edges         -> [Relationship, ...]
//! relationships:report        -> ValidationReport
//! ```

mod hash;
mod relationship_cache;
mod resolved;
mod schema_cache;

pub use hash::{compute_hash, file_hash, name_hash, sha256_hex};
pub use relationship_cache::{
    CachedRelationships, RelationshipCache, RelationshipCacheStats, RELATIONSHIP_DB,
};
pub use resolved::{DiskTableStore, ResolvedCache, ResolvedCacheStats, ResolvedKey};
pub use schema_cache::{SchemaCache, SchemaCacheStats, SchemaIndexEntry};

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};
use serde::{de::DeserializeOwned, Serialize};

use crate::table::codec::CodecError;

/// Current store schema version. Bump this when the stored format changes.
const CACHE_VERSION: i32 = 1;

/// Errors that can occur during cache operations.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Corrupted table cache file: {0}")]
    Codec(#[from] CodecError),

    #[error("Corrupted cache entry: {0}")]
    Corrupted(String),
}

pub type CacheResult<T> = Result<T, CacheError>;

/// SQLite-backed key-value store with JSON values.
///
/// - No TTL: entries persist until overwritten or cleared
/// - Versioned: auto-clears on version mismatch
pub struct KvStore {
    conn: Mutex<Connection>,
}

impl KvStore {
    /// Open or create the store at `path`.
    pub fn open(path: &Path) -> CacheResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;

        Ok(store)
    }

    /// Open an in-memory store (for testing).
    pub fn open_in_memory() -> CacheResult<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn conn(&self) -> std::sync::MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Initialize the schema and check version.
    fn init(&self) -> CacheResult<()> {
        let conn = self.conn();
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS cache (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS meta (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL
            );
            ",
        )?;

        let stored_version: Option<i32> = conn
            .query_row("SELECT value FROM meta WHERE key = 'version'", [], |row| {
                let s: String = row.get(0)?;
                Ok(s.parse().unwrap_or(0))
            })
            .optional()?;

        match stored_version {
            Some(v) if v == CACHE_VERSION => {}
            Some(v) => {
                tracing::info!(
                    "cache store version {} does not match {}, clearing",
                    v,
                    CACHE_VERSION
                );
                conn.execute("DELETE FROM cache", [])?;
                Self::set_version(&conn)?;
            }
            None => Self::set_version(&conn)?,
        }

        Ok(())
    }

    fn set_version(conn: &Connection) -> CacheResult<()> {
        conn.execute(
            "INSERT OR REPLACE INTO meta (key, value) VALUES ('version', ?)",
            params![CACHE_VERSION.to_string()],
        )?;
        Ok(())
    }

    /// Get a value. A stored value that no longer deserializes is reported
    /// as [`CacheError::Json`]; callers treat it as corrupted.
    pub fn get<T: DeserializeOwned>(&self, key: &str) -> CacheResult<Option<T>> {
        let json: Option<String> = self
            .conn()
            .query_row(
                "SELECT value FROM cache WHERE key = ?",
                params![key],
                |row| row.get(0),
            )
            .optional()?;

        match json {
            Some(s) => Ok(Some(serde_json::from_str(&s)?)),
            None => Ok(None),
        }
    }

    /// Set a value.
    pub fn set<T: Serialize>(&self, key: &str, value: &T) -> CacheResult<()> {
        let json = serde_json::to_string(value)?;
        self.conn().execute(
            "INSERT OR REPLACE INTO cache (key, value) VALUES (?, ?)",
            params![key, json],
        )?;
        Ok(())
    }

    /// Write several values in one transaction.
    pub fn set_many(&self, entries: &[(&str, String)]) -> CacheResult<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        for (key, json) in entries {
            tx.execute(
                "INSERT OR REPLACE INTO cache (key, value) VALUES (?, ?)",
                params![key, json],
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    /// Delete a value.
    pub fn delete(&self, key: &str) -> CacheResult<bool> {
        let rows = self
            .conn()
            .execute("DELETE FROM cache WHERE key = ?", params![key])?;
        Ok(rows > 0)
    }

    /// Delete all entries matching a key prefix.
    pub fn delete_prefix(&self, prefix: &str) -> CacheResult<usize> {
        let pattern = format!("{}%", prefix);
        let rows = self
            .conn()
            .execute("DELETE FROM cache WHERE key LIKE ?", params![pattern])?;
        Ok(rows)
    }

    /// Clear all entries (but keep metadata).
    pub fn clear_all(&self) -> CacheResult<()> {
        self.conn().execute("DELETE FROM cache", [])?;
        Ok(())
    }

    /// List all keys matching a prefix.
    pub fn keys_with_prefix(&self, prefix: &str) -> CacheResult<Vec<String>> {
        let pattern = format!("{}%", prefix);
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT key FROM cache WHERE key LIKE ? ORDER BY key")?;
        let keys = stmt
            .query_map(params![pattern], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Get store statistics.
    pub fn stats(&self) -> CacheResult<KvStats> {
        let conn = self.conn();
        let entry_count: i64 = conn.query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;

        let total_size: i64 = conn.query_row(
            "SELECT COALESCE(SUM(LENGTH(value)), 0) FROM cache",
            [],
            |row| row.get(0),
        )?;

        Ok(KvStats {
            entry_count: entry_count as usize,
            total_size_bytes: total_size as usize,
        })
    }
}

/// Key-value store statistics.
#[derive(Debug, Clone, Default)]
pub struct KvStats {
    /// Number of entries in the store.
    pub entry_count: usize,
    /// Total size of all values in bytes.
    pub total_size_bytes: usize,
}

/// Helper for generating store keys.
pub struct CacheKey;

impl CacheKey {
    pub const RELATIONSHIP_PREFIX: &'static str = "relationships:";

    /// Key for the structural fingerprint the relationships were computed for.
    pub fn relationship_fingerprint() -> &'static str {
        "relationships:fingerprint"
    }

    /// Key for the detected edge list.
    pub fn relationship_edges() -> &'static str {
        "relationships:edges"
    }

    /// Key for the last validation report.
    pub fn relationship_report() -> &'static str {
        "relationships:report"
    }
}

/// Point-in-time statistics of every cache.
#[derive(Debug, Clone, Default)]
pub struct CacheStatistics {
    pub resolved: ResolvedCacheStats,
    pub schemas: SchemaCacheStats,
    pub relationships: RelationshipCacheStats,
    /// Resolved string references held in memory.
    pub strings: usize,
}

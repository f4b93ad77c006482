//! Resolved-table caches.
//!
//! [`ResolvedCache`] holds the winning copy of each table in memory, keyed
//! by (module context, table) and bounded by a byte budget. Reads take a
//! shared lock and bump recency through an atomic; insert, evict and clear
//! take the write lock.
//!
//! [`DiskTableStore`] keeps parsed tables on disk, keyed by the SHA256 of
//! the source text, in the checksummed [`codec`](crate::table::codec)
//! format.

use std::collections::HashMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

use super::CacheResult;
use crate::source::{ModuleContext, ResolvedTable};
use crate::table::{codec, TableData};

/// Cache key: module context (or `"none"`) and lowercased table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResolvedKey {
    pub context: String,
    pub table: String,
}

impl ResolvedKey {
    pub const NO_CONTEXT: &'static str = "none";

    pub fn new(context: Option<&ModuleContext>, table: &str) -> Self {
        Self {
            context: context
                .map(|c| c.as_str().to_string())
                .unwrap_or_else(|| Self::NO_CONTEXT.to_string()),
            table: table.to_lowercase(),
        }
    }
}

struct Entry {
    value: Arc<ResolvedTable>,
    size: usize,
    last_access: AtomicU64,
}

impl Entry {
    /// An entry is in use while anything besides the cache holds its table.
    fn in_use(&self) -> bool {
        Arc::strong_count(&self.value) > 1
    }
}

/// Resolved-table cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ResolvedCacheStats {
    pub entries: usize,
    pub bytes: usize,
    pub budget: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    /// Persisted tables rejected on load and re-parsed from source.
    pub corrupted: u64,
}

/// In-memory LRU cache of resolved tables with a byte budget.
pub struct ResolvedCache {
    entries: RwLock<HashMap<ResolvedKey, Entry>>,
    budget: usize,
    bytes: AtomicUsize,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl ResolvedCache {
    pub fn new(budget: usize) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            budget,
            bytes: AtomicUsize::new(0),
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    fn tick(&self) -> u64 {
        self.clock.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn get(&self, key: &ResolvedKey) -> Option<Arc<ResolvedTable>> {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(entry) => {
                entry.last_access.store(self.tick(), Ordering::Relaxed);
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(Arc::clone(&entry.value))
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Insert a resolved table, evicting least recently used entries that
    /// are not in use until it fits.
    ///
    /// Returns false when the table was not cached: it is larger than the
    /// whole budget, or every evictable entry is in use.
    pub fn insert(&self, key: ResolvedKey, value: Arc<ResolvedTable>) -> bool {
        let size = value.table.approx_size_bytes();
        if size > self.budget {
            tracing::debug!(
                "table '{}' ({} bytes) exceeds cache budget of {} bytes, not cached",
                key.table,
                size,
                self.budget
            );
            return false;
        }

        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());

        if let Some(old) = entries.remove(&key) {
            self.bytes.fetch_sub(old.size, Ordering::Relaxed);
        }

        while self.bytes.load(Ordering::Relaxed) + size > self.budget {
            let victim = entries
                .iter()
                .filter(|(_, entry)| !entry.in_use())
                .min_by_key(|(_, entry)| entry.last_access.load(Ordering::Relaxed))
                .map(|(k, _)| k.clone());

            let Some(victim) = victim else {
                tracing::debug!(
                    "no evictable entry for table '{}', not cached",
                    key.table
                );
                return false;
            };

            if let Some(evicted) = entries.remove(&victim) {
                self.bytes.fetch_sub(evicted.size, Ordering::Relaxed);
                self.evictions.fetch_add(1, Ordering::Relaxed);
                tracing::debug!("evicted '{}' ({})", victim.table, victim.context);
            }
        }

        self.bytes.fetch_add(size, Ordering::Relaxed);
        entries.insert(
            key,
            Entry {
                value,
                size,
                last_access: AtomicU64::new(self.tick()),
            },
        );
        true
    }

    pub fn invalidate(&self, key: &ResolvedKey) -> bool {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        match entries.remove(key) {
            Some(entry) => {
                self.bytes.fetch_sub(entry.size, Ordering::Relaxed);
                true
            }
            None => false,
        }
    }

    pub fn clear(&self) {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.clear();
        self.bytes.store(0, Ordering::Relaxed);
    }

    pub fn stats(&self) -> ResolvedCacheStats {
        let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
        ResolvedCacheStats {
            entries: entries.len(),
            bytes: self.bytes.load(Ordering::Relaxed),
            budget: self.budget,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            corrupted: 0,
        }
    }

    /// Copy of the current keys and entry sizes, sorted by key.
    pub fn snapshot(&self) -> Vec<(ResolvedKey, usize)> {
        let mut out: Vec<(ResolvedKey, usize)> = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            entries.iter().map(|(k, e)| (k.clone(), e.size)).collect()
        };
        out.sort();
        out
    }
}

/// Parsed tables persisted by content hash.
#[derive(Debug, Clone)]
pub struct DiskTableStore {
    dir: PathBuf,
}

impl DiskTableStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Only lowercase hex digests name files; anything else is refused so a
    /// key can never escape the store directory.
    fn path_for(&self, content_hash: &str) -> Option<PathBuf> {
        let valid = !content_hash.is_empty()
            && content_hash
                .chars()
                .all(|c| c.is_ascii_digit() || ('a'..='f').contains(&c));
        valid.then(|| self.dir.join(format!("{}.bin", content_hash)))
    }

    /// Load a parsed table. A file that fails to decode is an error; the
    /// caller decides whether to discard it.
    pub async fn get(&self, content_hash: &str) -> CacheResult<Option<TableData>> {
        let Some(path) = self.path_for(content_hash) else {
            return Ok(None);
        };
        let bytes = match tokio::fs::read(&path).await {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        Ok(Some(codec::decode(&bytes)?))
    }

    /// Persist a parsed table. Written to a temporary file then renamed.
    pub async fn put(&self, content_hash: &str, table: &TableData) -> CacheResult<()> {
        let Some(path) = self.path_for(content_hash) else {
            return Ok(());
        };
        let bytes = codec::encode(table)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let tmp = path.with_extension("bin.tmp");
        tokio::fs::write(&tmp, &bytes).await?;
        tokio::fs::rename(&tmp, &path).await?;
        Ok(())
    }

    pub async fn remove(&self, content_hash: &str) -> CacheResult<()> {
        let Some(path) = self.path_for(content_hash) else {
            return Ok(());
        };
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Delete every persisted table.
    pub async fn clear(&self) -> CacheResult<()> {
        match tokio::fs::remove_dir_all(&self.dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

//! Persisted relationship results.
//!
//! Edges are keyed by a structural fingerprint: the SHA256 of every
//! (table, columns) pair, sorted by table. While the fingerprint matches,
//! detection is skipped and the stored edges are reused. Validation always
//! runs again because rows may have changed under the same columns.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use super::{compute_hash, CacheError, CacheKey, CacheResult, KvStore};
use crate::relationships::{Relationship, ValidationReport};

/// File name of the relationship store inside the cache directory.
pub const RELATIONSHIP_DB: &str = "relationships.db";

/// Stored relationship results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedRelationships {
    pub edges: Vec<Relationship>,
    pub report: Option<ValidationReport>,
}

/// Relationship cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RelationshipCacheStats {
    pub hits: u64,
    pub misses: u64,
    pub corrupted: u64,
    /// Bytes of stored JSON.
    pub stored_bytes: usize,
}

pub struct RelationshipCache {
    store: KvStore,
    max_broken: usize,
    hits: AtomicU64,
    misses: AtomicU64,
    corrupted: AtomicU64,
}

impl RelationshipCache {
    /// Open `relationships.db` under `dir`.
    pub fn open(dir: &Path, max_broken: usize) -> CacheResult<Self> {
        Ok(Self::with_store(KvStore::open(&dir.join(RELATIONSHIP_DB))?, max_broken))
    }

    pub fn in_memory(max_broken: usize) -> CacheResult<Self> {
        Ok(Self::with_store(KvStore::open_in_memory()?, max_broken))
    }

    fn with_store(store: KvStore, max_broken: usize) -> Self {
        Self {
            store,
            max_broken,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            corrupted: AtomicU64::new(0),
        }
    }

    /// Fingerprint of a set of (table, columns) pairs. Order-independent.
    pub fn fingerprint<'a, I>(tables: I) -> CacheResult<String>
    where
        I: IntoIterator<Item = (&'a str, Vec<&'a str>)>,
    {
        let mut shape: Vec<(String, Vec<&str>)> = tables
            .into_iter()
            .map(|(table, columns)| (table.to_lowercase(), columns))
            .collect();
        shape.sort();
        Ok(compute_hash(&shape)?)
    }

    /// Stored results, if they were computed for `fingerprint`.
    ///
    /// An unreadable entry counts as corrupted and is dropped.
    pub fn get(&self, fingerprint: &str) -> CacheResult<Option<CachedRelationships>> {
        match self.load(fingerprint) {
            Ok(Some(cached)) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Ok(Some(cached))
            }
            Ok(None) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                Ok(None)
            }
            Err(CacheError::Json(e)) => {
                self.corrupted.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("discarding corrupted relationship cache: {}", e);
                self.clear()?;
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn load(&self, fingerprint: &str) -> CacheResult<Option<CachedRelationships>> {
        let stored: Option<String> = self.store.get(CacheKey::relationship_fingerprint())?;
        if stored.as_deref() != Some(fingerprint) {
            return Ok(None);
        }
        let Some(edges) = self.store.get(CacheKey::relationship_edges())? else {
            return Ok(None);
        };
        let report = self.store.get(CacheKey::relationship_report())?;
        Ok(Some(CachedRelationships { edges, report }))
    }

    /// Replace the stored results.
    pub fn put(
        &self,
        fingerprint: &str,
        edges: &[Relationship],
        report: &ValidationReport,
    ) -> CacheResult<()> {
        let mut report = report.clone();
        report.broken_references.truncate(self.max_broken);

        self.store.set_many(&[
            (
                CacheKey::relationship_fingerprint(),
                serde_json::to_string(fingerprint)?,
            ),
            (CacheKey::relationship_edges(), serde_json::to_string(edges)?),
            (CacheKey::relationship_report(), serde_json::to_string(&report)?),
        ])
    }

    /// The last stored report, whatever its fingerprint.
    pub fn last_report(&self) -> CacheResult<Option<ValidationReport>> {
        match self.store.get(CacheKey::relationship_report()) {
            Ok(report) => Ok(report),
            Err(CacheError::Json(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn clear(&self) -> CacheResult<()> {
        self.store.delete_prefix(CacheKey::RELATIONSHIP_PREFIX)?;
        Ok(())
    }

    pub fn stats(&self) -> RelationshipCacheStats {
        RelationshipCacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            corrupted: self.corrupted.load(Ordering::Relaxed),
            stored_bytes: self
                .store
                .stats()
                .map(|s| s.total_size_bytes)
                .unwrap_or(0),
        }
    }
}

//! Persisted schema descriptors.
//!
//! # Layout
//!
//! ```text
//! <dir>/
//!   index.json                        table -> {hash, size, timestamp}
//!   classes_<hash>.schema.json        SchemaDescriptor as JSON text
//!   feat_<hash>.schema.json
//! ```
//!
//! The hash covers the source file's bytes and modification time, or the
//! table name alone when the table has no backing file. One variant is
//! kept per table. A descriptor is only ever parsed as data and rebuilt
//! through the [`Synthesizer`]; one that fails to parse or to match its
//! table is counted as corrupted and regenerated. A lookup also checks the
//! header it was given, so a changed column list under an unchanged hash is
//! resynthesized rather than served stale.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use super::{CacheError, CacheResult};
use crate::sanitize::sanitize;
use crate::schema::{RecordSchema, SchemaDescriptor, Synthesizer, DESCRIPTOR_VERSION};

const INDEX_FILE: &str = "index.json";
const DESCRIPTOR_SUFFIX: &str = ".schema.json";

/// One `index.json` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaIndexEntry {
    pub hash: String,
    /// Descriptor size in bytes.
    pub size: u64,
    /// Seconds since the Unix epoch when the descriptor was written.
    pub timestamp: u64,
}

/// Schema cache statistics.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaCacheStats {
    /// Schemas held in memory.
    pub entries: usize,
    /// Descriptors listed in the index.
    pub persisted: usize,
    pub hits: u64,
    pub misses: u64,
    /// Descriptors rewritten over a stale or corrupted variant.
    pub regenerations: u64,
    pub corrupted: u64,
}

/// Schema cache: shared schemas in memory, descriptor text on disk.
pub struct SchemaCache {
    dir: Option<PathBuf>,
    memory: RwLock<HashMap<(String, String), Arc<RecordSchema>>>,
    index: Mutex<BTreeMap<String, SchemaIndexEntry>>,
    hits: AtomicU64,
    misses: AtomicU64,
    regenerations: AtomicU64,
    corrupted: AtomicU64,
}

impl SchemaCache {
    /// Open the cache rooted at `dir`, creating it if needed.
    pub fn open(dir: impl Into<PathBuf>) -> CacheResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;

        let cache = Self::with_dir(Some(dir.clone()));
        match read_index(&dir) {
            Ok(index) => *cache.index.lock().unwrap_or_else(|e| e.into_inner()) = index,
            Err(e) => {
                cache.corrupted.fetch_add(1, Ordering::Relaxed);
                tracing::warn!("discarding corrupted schema index in {}: {}", dir.display(), e);
            }
        }
        Ok(cache)
    }

    /// A cache that never touches disk.
    pub fn in_memory() -> Self {
        Self::with_dir(None)
    }

    fn with_dir(dir: Option<PathBuf>) -> Self {
        Self {
            dir,
            memory: RwLock::new(HashMap::new()),
            index: Mutex::new(BTreeMap::new()),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            regenerations: AtomicU64::new(0),
            corrupted: AtomicU64::new(0),
        }
    }

    pub fn dir(&self) -> Option<&Path> {
        self.dir.as_deref()
    }

    /// Path of the descriptor for (`table`, `hash`).
    pub fn descriptor_path(&self, table: &str, hash: &str) -> Option<PathBuf> {
        self.dir.as_ref().map(|dir| dir.join(file_name(table, hash)))
    }

    /// The schema for `table`, from memory, from its persisted descriptor,
    /// or freshly synthesized.
    pub fn get_or_synthesize(
        &self,
        synthesizer: &Synthesizer,
        table: &str,
        hash: &str,
        columns: &[String],
    ) -> CacheResult<Arc<RecordSchema>> {
        let table = table.to_lowercase();
        let key = (table.clone(), hash.to_string());

        {
            let memory = self.memory.read().unwrap_or_else(|e| e.into_inner());
            if let Some(schema) = memory.get(&key).filter(|s| s.has_columns(columns)) {
                self.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(schema));
            }
        }

        let indexed = {
            let index = self.index.lock().unwrap_or_else(|e| e.into_inner());
            index.get(&table).map(|entry| entry.hash.clone())
        };

        if indexed.as_deref() == Some(hash) {
            match self.load(synthesizer, &table, hash, columns) {
                Ok(Some(schema)) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    self.remember(key, Arc::clone(&schema));
                    return Ok(schema);
                }
                Ok(None) => {
                    tracing::debug!("schema cache for '{}' has a different header", table);
                }
                Err(reason) => {
                    self.corrupted.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "regenerating corrupted schema cache for '{}': {}",
                        table,
                        reason
                    );
                }
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        if indexed.is_some() {
            self.regenerations.fetch_add(1, Ordering::Relaxed);
        }

        let schema = synthesizer.synthesize(&table, columns);
        self.persist(&table, hash, &schema, indexed.as_deref())?;
        self.remember(key, Arc::clone(&schema));
        Ok(schema)
    }

    fn load(
        &self,
        synthesizer: &Synthesizer,
        table: &str,
        hash: &str,
        columns: &[String],
    ) -> Result<Option<Arc<RecordSchema>>, String> {
        let path = self
            .descriptor_path(table, hash)
            .ok_or_else(|| "no cache directory".to_string())?;
        let text = fs::read_to_string(&path).map_err(|e| e.to_string())?;
        let descriptor: SchemaDescriptor =
            serde_json::from_str(&text).map_err(|e| e.to_string())?;
        // Same hash, different header: stale rather than corrupt.
        if descriptor.version == DESCRIPTOR_VERSION
            && descriptor.table.eq_ignore_ascii_case(table)
            && descriptor.columns != columns
        {
            return Ok(None);
        }
        synthesizer
            .from_descriptor(&descriptor, table, columns)
            .map(Some)
            .map_err(|e| e.to_string())
    }

    fn remember(&self, key: (String, String), schema: Arc<RecordSchema>) {
        let mut memory = self.memory.write().unwrap_or_else(|e| e.into_inner());
        memory.retain(|(table, _), _| table != &key.0);
        memory.insert(key, schema);
    }

    fn persist(
        &self,
        table: &str,
        hash: &str,
        schema: &RecordSchema,
        previous: Option<&str>,
    ) -> CacheResult<()> {
        let Some(dir) = &self.dir else {
            return Ok(());
        };

        let text = serde_json::to_string_pretty(&schema.descriptor())?;
        write_atomic(&dir.join(file_name(table, hash)), text.as_bytes())?;

        if let Some(old) = previous.filter(|old| *old != hash) {
            remove_if_exists(&dir.join(file_name(table, old)))?;
        }

        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        index.insert(
            table.to_string(),
            SchemaIndexEntry {
                hash: hash.to_string(),
                size: text.len() as u64,
                timestamp: now_secs(),
            },
        );
        let index_text = serde_json::to_string_pretty(&*index)?;
        write_atomic(&dir.join(INDEX_FILE), index_text.as_bytes())?;
        Ok(())
    }

    /// Copy of the persisted index.
    pub fn index(&self) -> BTreeMap<String, SchemaIndexEntry> {
        self.index.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Drop every schema, in memory and on disk.
    pub fn clear(&self) -> CacheResult<()> {
        self.memory
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
        let mut index = self.index.lock().unwrap_or_else(|e| e.into_inner());
        index.clear();

        let Some(dir) = &self.dir else {
            return Ok(());
        };
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(e.into()),
        };
        for entry in entries {
            let entry = entry?;
            let name = entry.file_name();
            let name = name.to_string_lossy();
            if name.ends_with(DESCRIPTOR_SUFFIX) || name == INDEX_FILE {
                remove_if_exists(&entry.path())?;
            }
        }
        Ok(())
    }

    pub fn stats(&self) -> SchemaCacheStats {
        SchemaCacheStats {
            entries: self.memory.read().unwrap_or_else(|e| e.into_inner()).len(),
            persisted: self.index.lock().unwrap_or_else(|e| e.into_inner()).len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            regenerations: self.regenerations.load(Ordering::Relaxed),
            corrupted: self.corrupted.load(Ordering::Relaxed),
        }
    }
}

fn file_name(table: &str, hash: &str) -> String {
    format!("{}_{}{}", sanitize(table).to_lowercase(), hash, DESCRIPTOR_SUFFIX)
}

fn read_index(dir: &Path) -> CacheResult<BTreeMap<String, SchemaIndexEntry>> {
    match fs::read_to_string(dir.join(INDEX_FILE)) {
        Ok(text) => Ok(serde_json::from_str(&text)?),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(BTreeMap::new()),
        Err(e) => Err(CacheError::Io(e)),
    }
}

fn write_atomic(path: &Path, bytes: &[u8]) -> CacheResult<()> {
    let tmp = path.with_extension("tmp");
    fs::write(&tmp, bytes)?;
    fs::rename(&tmp, path)?;
    Ok(())
}

fn remove_if_exists(path: &Path) -> CacheResult<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e.into()),
    }
}

fn now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

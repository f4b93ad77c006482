//! Override-chain resolution with caching.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::SystemTime;

use super::{
    ModuleContext, ModuleResolver, SourceCopy, SourceId, SourceProvider, SourceResult,
};
use crate::cache::{
    file_hash, name_hash, sha256_hex, CacheError, DiskTableStore, ResolvedCache,
    ResolvedCacheStats, ResolvedKey,
};
use crate::sanitize::strip_table_suffix;
use crate::table::TableData;

/// The winning copy of a table for one module context.
#[derive(Debug)]
pub struct ResolvedTable {
    pub table: Arc<TableData>,
    pub source: SourceId,
    pub path: Option<PathBuf>,
    pub modified: Option<SystemTime>,
    /// Key of this table's schema in the schema cache: content and mtime
    /// when backed by a file, the table name otherwise.
    pub schema_hash: String,
}

impl ResolvedTable {
    /// A resolved table with no backing file.
    pub fn new(table: TableData, source: SourceId) -> Self {
        let schema_hash = name_hash(table.name());
        Self {
            table: Arc::new(table),
            source,
            path: None,
            modified: None,
            schema_hash,
        }
    }

    fn from_copy(table: TableData, copy: &SourceCopy) -> Self {
        let schema_hash = match &copy.path {
            Some(_) => file_hash(&copy.content, copy.modified),
            None => name_hash(table.name()),
        };
        Self {
            table: Arc::new(table),
            source: copy.id.clone(),
            path: copy.path.clone(),
            modified: copy.modified,
            schema_hash,
        }
    }
}

/// Outcome of resolving one table.
#[derive(Debug, Clone)]
pub enum Resolution {
    Found(Arc<ResolvedTable>),
    /// Absent from every layer.
    NotFound,
}

impl Resolution {
    pub fn is_found(&self) -> bool {
        matches!(self, Resolution::Found(_))
    }

    pub fn found(self) -> Option<Arc<ResolvedTable>> {
        match self {
            Resolution::Found(t) => Some(t),
            Resolution::NotFound => None,
        }
    }
}

enum ContextState {
    /// Ask the module resolver.
    Unset,
    Explicit(Option<ModuleContext>),
}

/// Resolves tables across the layered sources for the active module.
pub struct SourceResolver {
    provider: Arc<dyn SourceProvider>,
    modules: Arc<dyn ModuleResolver>,
    cache: ResolvedCache,
    disk: Option<DiskTableStore>,
    context: RwLock<ContextState>,
    malformed: AtomicUsize,
    corrupted: AtomicU64,
    diagnostics: Mutex<Vec<String>>,
}

impl SourceResolver {
    pub fn new(
        provider: Arc<dyn SourceProvider>,
        modules: Arc<dyn ModuleResolver>,
        cache_budget: usize,
    ) -> Self {
        Self {
            provider,
            modules,
            cache: ResolvedCache::new(cache_budget),
            disk: None,
            context: RwLock::new(ContextState::Unset),
            malformed: AtomicUsize::new(0),
            corrupted: AtomicU64::new(0),
            diagnostics: Mutex::new(Vec::new()),
        }
    }

    /// Persist parsed tables under `store`.
    pub fn with_disk_store(mut self, store: DiskTableStore) -> Self {
        self.disk = Some(store);
        self
    }

    /// Set the active module. Entries cached under the previous context are
    /// kept but no longer reachable.
    pub fn set_module_context(&self, context: Option<ModuleContext>) {
        tracing::info!(
            "module context set to {}",
            context
                .as_ref()
                .map(|c| c.as_str())
                .unwrap_or(ResolvedKey::NO_CONTEXT)
        );
        let mut state = self.context.write().unwrap_or_else(|e| e.into_inner());
        *state = ContextState::Explicit(context);
    }

    /// The active module: the explicit one if set, else the module resolver's.
    pub fn module_context(&self) -> Option<ModuleContext> {
        let state = self.context.read().unwrap_or_else(|e| e.into_inner());
        match &*state {
            ContextState::Explicit(ctx) => ctx.clone(),
            ContextState::Unset => self.modules.resolve_current_module(),
        }
    }

    /// Names of every table visible under the active module.
    pub async fn list_tables(&self) -> SourceResult<Vec<String>> {
        let ctx = self.module_context();
        self.provider.list_tables(ctx.as_ref()).await
    }

    /// Resolve `table` to its highest-precedence parseable copy.
    pub async fn resolve(&self, table: &str) -> SourceResult<Resolution> {
        let name = strip_table_suffix(table).to_lowercase();
        let ctx = self.module_context();
        let key = ResolvedKey::new(ctx.as_ref(), &name);

        if let Some(hit) = self.cache.get(&key) {
            return Ok(Resolution::Found(hit));
        }

        let copies = self.provider.list_sources(&name, ctx.as_ref()).await?;

        for copy in copies.iter().rev() {
            match self.parse_copy(&name, copy).await {
                Some(parsed) => {
                    tracing::debug!("resolved '{}' from {}", name, copy.id);
                    let resolved = Arc::new(ResolvedTable::from_copy(parsed, copy));
                    self.cache.insert(key, Arc::clone(&resolved));
                    return Ok(Resolution::Found(resolved));
                }
                None => continue,
            }
        }

        tracing::debug!("table '{}' not found in any source", name);
        Ok(Resolution::NotFound)
    }

    /// Parse one copy, consulting the persisted table store first. Returns
    /// `None` when the copy is malformed.
    async fn parse_copy(&self, name: &str, copy: &SourceCopy) -> Option<TableData> {
        let content_hash = self.disk.as_ref().map(|_| sha256_hex(&copy.content));

        if let (Some(disk), Some(hash)) = (&self.disk, &content_hash) {
            match disk.get(hash).await {
                Ok(Some(table)) if table.name() == name => return Some(table),
                Ok(_) => {}
                Err(CacheError::Codec(e)) => {
                    self.corrupted.fetch_add(1, Ordering::Relaxed);
                    tracing::warn!(
                        "discarding corrupted table cache for '{}': {}",
                        name,
                        e
                    );
                    if let Err(e) = disk.remove(hash).await {
                        tracing::warn!("failed to remove table cache file: {}", e);
                    }
                }
                Err(e) => tracing::warn!("table cache read failed for '{}': {}", name, e),
            }
        }

        match TableData::parse(name, &copy.content) {
            Ok(table) => {
                if let (Some(disk), Some(hash)) = (&self.disk, &content_hash) {
                    if let Err(e) = disk.put(hash, &table).await {
                        tracing::warn!("failed to persist table '{}': {}", name, e);
                    }
                }
                Some(table)
            }
            Err(e) => {
                self.malformed.fetch_add(1, Ordering::Relaxed);
                let message = format!("malformed source {} for '{}': {}", copy.id, name, e);
                tracing::warn!("{}", message);
                self.diagnostics
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .push(message);
                None
            }
        }
    }

    /// Forget the cached copy of `table` under the active module.
    pub fn invalidate(&self, table: &str) -> bool {
        let ctx = self.module_context();
        let name = strip_table_suffix(table);
        self.cache.invalidate(&ResolvedKey::new(ctx.as_ref(), name))
    }

    /// Forget every cached table in memory.
    pub fn clear(&self) {
        self.cache.clear();
    }

    /// Delete every persisted parsed table.
    pub async fn clear_persisted(&self) -> Result<(), CacheError> {
        match &self.disk {
            Some(disk) => disk.clear().await,
            None => Ok(()),
        }
    }

    /// Malformed source copies seen so far.
    pub fn malformed_count(&self) -> usize {
        self.malformed.load(Ordering::Relaxed)
    }

    /// Drain the diagnostics recorded since the last call.
    pub fn take_diagnostics(&self) -> Vec<String> {
        std::mem::take(&mut *self.diagnostics.lock().unwrap_or_else(|e| e.into_inner()))
    }

    pub fn cache(&self) -> &ResolvedCache {
        &self.cache
    }

    pub fn stats(&self) -> ResolvedCacheStats {
        ResolvedCacheStats {
            corrupted: self.corrupted.load(Ordering::Relaxed),
            ..self.cache.stats()
        }
    }
}

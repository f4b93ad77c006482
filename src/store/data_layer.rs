//! [`DataLayer`]: the entry point hosts talk to.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::Instant;

use futures::future::join_all;
use tokio::sync::Mutex as AsyncMutex;
use tokio::task::JoinHandle;

use super::{normalize, LoadError, LoadResult, LoadSummary, TableStore};
use crate::cache::{CacheStatistics, DiskTableStore, RelationshipCache, SchemaCache};
use crate::config::Settings;
use crate::relationships::{
    ColumnPurposeProvider, Relationship, RelationshipDetector, RelationshipGraph, TableSet,
    ValidationReport, Validator,
};
use crate::schema::{Record, RecordBuilder, RecordTable, StringResolver, StringTable, Synthesizer};
use crate::source::{
    DirectorySources, FixedModule, ModuleContext, ModuleResolver, PreloadReport, Resolution,
    ResolvedTable, SourceProvider, SourceResolver,
};

/// Configures and builds a [`DataLayer`].
#[must_use = "DataLayerBuilder has no effect until build() is called"]
pub struct DataLayerBuilder {
    provider: Arc<dyn SourceProvider>,
    modules: Arc<dyn ModuleResolver>,
    strings: Option<Arc<dyn StringResolver>>,
    purposes: Option<Arc<dyn ColumnPurposeProvider>>,
    settings: Settings,
    persist: bool,
}

impl DataLayerBuilder {
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    pub fn module_resolver(mut self, modules: Arc<dyn ModuleResolver>) -> Self {
        self.modules = modules;
        self
    }

    pub fn string_resolver(mut self, strings: Arc<dyn StringResolver>) -> Self {
        self.strings = Some(strings);
        self
    }

    pub fn column_purposes(mut self, purposes: Arc<dyn ColumnPurposeProvider>) -> Self {
        self.purposes = Some(purposes);
        self
    }

    /// Keep every cache in memory; nothing is written under `cache.dir`.
    pub fn in_memory(mut self) -> Self {
        self.persist = false;
        self
    }

    pub fn build(self) -> LoadResult<DataLayer> {
        let settings = self.settings;
        settings.validate()?;

        let mut resolver =
            SourceResolver::new(self.provider, self.modules, settings.cache.max_bytes);

        let (schemas, relationship_cache) = if self.persist {
            let dir = settings.cache.cache_dir()?;
            std::fs::create_dir_all(&dir).map_err(|e| LoadError::CacheUnavailable(e.into()))?;
            tracing::debug!("cache directory: {}", dir.display());

            if settings.cache.persist_resolved {
                resolver = resolver.with_disk_store(DiskTableStore::new(dir.join("resolved")));
            }
            (
                SchemaCache::open(dir.join("schemas"))?,
                RelationshipCache::open(&dir, settings.relationships.max_broken_references)?,
            )
        } else {
            (
                SchemaCache::in_memory(),
                RelationshipCache::in_memory(settings.relationships.max_broken_references)?,
            )
        };

        let strings = match self.strings {
            Some(resolver) => StringTable::with_resolver(resolver),
            None => StringTable::new(),
        };

        let mut detector = RelationshipDetector::new(settings.relationships.sample_rows);
        if let Some(purposes) = self.purposes {
            detector = detector.with_purposes(purposes);
        }
        let validator = Validator::new(
            settings.relationships.strict,
            settings.relationships.max_broken_references,
        );

        Ok(DataLayer {
            settings,
            resolver: Arc::new(resolver),
            synthesizer: Synthesizer::new(),
            schemas,
            relationship_cache,
            strings,
            detector,
            validator,
            store: RwLock::new(Arc::new(TableStore::default())),
            generation: AtomicU64::new(0),
            load_lock: AsyncMutex::new(()),
        })
    }
}

/// Resolves, types and relates tables, and serves the published result.
pub struct DataLayer {
    settings: Settings,
    resolver: Arc<SourceResolver>,
    synthesizer: Synthesizer,
    schemas: SchemaCache,
    relationship_cache: RelationshipCache,
    strings: StringTable,
    detector: RelationshipDetector,
    validator: Validator,
    store: RwLock<Arc<TableStore>>,
    generation: AtomicU64,
    /// Serializes loads; readers never take it.
    load_lock: AsyncMutex<()>,
}

impl DataLayer {
    pub fn builder(provider: Arc<dyn SourceProvider>) -> DataLayerBuilder {
        DataLayerBuilder {
            provider,
            modules: Arc::new(FixedModule::default()),
            strings: None,
            purposes: None,
            settings: Settings::default(),
            persist: true,
        }
    }

    /// Read sources from the directories in `settings`, caching under
    /// `cache.dir`.
    pub fn from_settings(settings: Settings) -> LoadResult<Self> {
        let sources = DirectorySources::from_settings(&settings)?;
        Self::builder(Arc::new(sources)).settings(settings).build()
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The current published generation.
    pub fn snapshot(&self) -> Arc<TableStore> {
        Arc::clone(&self.store.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// Every record of `name`; empty when the table is not loaded.
    pub fn get_table(&self, name: &str) -> Arc<[Record]> {
        self.snapshot().records(name)
    }

    /// Row `row_id` of `name`.
    pub fn get_by_id(&self, name: &str, row_id: usize) -> Option<Record> {
        self.snapshot()
            .table(name)
            .and_then(|t| t.get(row_id).cloned())
    }

    pub fn table(&self, name: &str) -> Option<Arc<RecordTable>> {
        self.snapshot().table(name).cloned()
    }

    pub fn table_names(&self) -> Vec<String> {
        self.snapshot()
            .table_names()
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Switch the active module. The published tables stay as they are
    /// until the next load.
    pub fn set_module_context(&self, context: Option<ModuleContext>) {
        self.resolver.set_module_context(context);
    }

    pub fn module_context(&self) -> Option<ModuleContext> {
        self.resolver.module_context()
    }

    pub fn report(&self) -> Option<ValidationReport> {
        self.snapshot().report().cloned()
    }

    pub fn relationships(&self) -> Vec<Relationship> {
        self.snapshot().relationships().to_vec()
    }

    pub fn summary(&self) -> Option<LoadSummary> {
        self.snapshot().summary().cloned()
    }

    pub fn graph(&self) -> RelationshipGraph {
        self.snapshot().graph()
    }

    pub fn resolver(&self) -> &Arc<SourceResolver> {
        &self.resolver
    }

    pub fn cache_stats(&self) -> CacheStatistics {
        CacheStatistics {
            resolved: self.resolver.stats(),
            schemas: self.schemas.stats(),
            relationships: self.relationship_cache.stats(),
            strings: self.strings.len(),
        }
    }

    /// Resolve the configured preload tables, bounded by the configured
    /// deadline.
    pub async fn preload(&self) -> PreloadReport {
        let preload = &self.settings.preload;
        if preload.tables.is_empty() {
            return PreloadReport::default();
        }
        self.resolver
            .preload(preload.tables.clone(), preload.timeout())
            .await
    }

    /// Load every table visible under the active module.
    pub async fn load_all(&self) -> LoadResult<LoadSummary> {
        match self.resolver.list_tables().await {
            Ok(tables) => self.load(&tables).await,
            Err(e) => {
                tracing::warn!("failed to list tables: {}", e);
                self.load_with::<String>(&[], vec![format!("failed to list tables: {}", e)])
                    .await
            }
        }
    }

    /// Load `tables` and publish them together with the tables already
    /// published.
    pub async fn load<S: AsRef<str>>(&self, tables: &[S]) -> LoadResult<LoadSummary> {
        self.load_with(tables, Vec::new()).await
    }

    /// Run [`DataLayer::load`] (or [`DataLayer::load_all`] for `None`) on
    /// the runtime.
    pub fn spawn_load(
        self: &Arc<Self>,
        tables: Option<Vec<String>>,
    ) -> JoinHandle<LoadResult<LoadSummary>> {
        let layer = Arc::clone(self);
        tokio::spawn(async move {
            match tables {
                Some(tables) => layer.load(&tables).await,
                None => layer.load_all().await,
            }
        })
    }

    async fn load_with<S: AsRef<str>>(
        &self,
        requested: &[S],
        mut diagnostics: Vec<String>,
    ) -> LoadResult<LoadSummary> {
        let _guard = self.load_lock.lock().await;
        let started = Instant::now();
        let malformed_before = self.resolver.malformed_count();

        let names: BTreeSet<String> = requested.iter().map(|t| normalize(t.as_ref())).collect();
        tracing::debug!("loading {} tables", names.len());

        let resolutions = join_all(names.iter().map(|name| self.resolver.resolve(name))).await;

        let mut tables: TableSet = self.snapshot().tables().clone();
        let mut not_found = Vec::new();
        let mut tables_loaded = 0;
        let mut rows_loaded = 0;

        for (name, resolution) in names.iter().zip(resolutions) {
            match resolution {
                Ok(Resolution::Found(resolved)) => {
                    let table = self.materialize(name, &resolved, &mut diagnostics)?;
                    tables_loaded += 1;
                    rows_loaded += table.records().len();
                    tables.insert(name.clone(), Arc::new(table));
                }
                Ok(Resolution::NotFound) => {
                    tables.remove(name);
                    not_found.push(name.clone());
                }
                Err(e) => {
                    tracing::warn!("failed to resolve '{}': {}", name, e);
                    diagnostics.push(format!("failed to resolve '{}': {}", name, e));
                    not_found.push(name.clone());
                }
            }
        }
        diagnostics.extend(self.resolver.take_diagnostics());

        let (edges, report) = if self.settings.relationships.enabled {
            let (edges, report) = self.relate(&tables, &mut diagnostics).await?;
            (edges, Some(report))
        } else {
            (Vec::new(), None)
        };

        let summary = LoadSummary {
            tables_loaded,
            rows_loaded,
            tables_not_found: not_found,
            malformed_sources: self
                .resolver
                .malformed_count()
                .saturating_sub(malformed_before),
            relationships: report.as_ref().map_or(0, |r| r.total_relationships),
            broken_references: report.as_ref().map_or(0, |r| r.broken_count),
            diagnostics,
            elapsed: started.elapsed(),
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let published = Arc::new(TableStore::new(
            generation,
            tables,
            edges,
            report,
            summary.clone(),
        ));
        *self.store.write().unwrap_or_else(|e| e.into_inner()) = published;

        tracing::info!("load complete (generation {}): {}", generation, summary);
        Ok(summary)
    }

    fn materialize(
        &self,
        name: &str,
        resolved: &ResolvedTable,
        diagnostics: &mut Vec<String>,
    ) -> LoadResult<RecordTable> {
        let data = &resolved.table;
        let schema = self.schemas.get_or_synthesize(
            &self.synthesizer,
            name,
            &resolved.schema_hash,
            data.columns(),
        )?;

        if data.ragged_rows() > 0 {
            diagnostics.push(format!(
                "'{}': {} rows with a mismatched cell count",
                name,
                data.ragged_rows()
            ));
        }

        let records = RecordBuilder::new(Arc::clone(&schema), data.columns(), &self.strings)
            .build_all(data);
        tracing::debug!("materialized '{}': {} rows", name, records.len());

        Ok(RecordTable::new(schema, records, Some(resolved.source.clone())))
    }

    /// Edges from the relationship cache when the column sets are unchanged,
    /// else from detection; then validation against the current rows.
    async fn relate(
        &self,
        tables: &TableSet,
        diagnostics: &mut Vec<String>,
    ) -> LoadResult<(Vec<Relationship>, ValidationReport)> {
        let fingerprint = RelationshipCache::fingerprint(
            tables
                .iter()
                .map(|(name, table)| (name.as_str(), table.schema().original_names())),
        )?;

        let cached = match self.relationship_cache.get(&fingerprint) {
            Ok(cached) => cached,
            Err(e) => {
                tracing::warn!("relationship cache read failed: {}", e);
                diagnostics.push(format!("relationship cache read failed: {}", e));
                None
            }
        };

        let edges = match cached {
            Some(cached) => {
                tracing::debug!("reusing {} cached relationships", cached.edges.len());
                cached.edges
            }
            None => self.detector.detect(tables),
        };

        let report = self.validator.validate_async(&edges, tables).await;
        self.relationship_cache.put(&fingerprint, &edges, &report)?;
        Ok((edges, report))
    }

    /// Drop every cached artifact, in memory and on disk. Published tables
    /// stay readable.
    pub async fn clear_cache(&self) -> LoadResult<()> {
        let _guard = self.load_lock.lock().await;
        self.resolver.clear();
        self.resolver.clear_persisted().await?;
        self.schemas.clear()?;
        self.relationship_cache.clear()?;
        self.strings.clear();
        tracing::info!("caches cleared");
        Ok(())
    }

    /// Clear every cache, then reload everything.
    pub async fn rebuild_cache(&self) -> LoadResult<LoadSummary> {
        self.clear_cache().await?;
        self.load_all().await
    }
}

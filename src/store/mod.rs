//! The data layer: resolve, synthesize, materialize, relate, publish.
//!
//! ```text
//!   load(tables)
//!       │
//!       ▼ [source]        highest-precedence copy per table
//!   ResolvedTable
//!       │
//!       ▼ [schema]        descriptor cache, then synthesizer
//!   RecordSchema ──► RecordBuilder ──► RecordTable
//!       │
//!       ▼ [relationships] cached edges or detection, then validation
//!   ValidationReport
//!       │
//!       ▼
//!   TableStore            swapped in under a write lock
//! ```
//!
//! Readers hold an `Arc<TableStore>`; a load builds a new generation and
//! replaces the pointer, so in-flight reads never see a partial load.

mod data_layer;

pub use data_layer::{DataLayer, DataLayerBuilder};

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;

use crate::cache::CacheError;
use crate::config::SettingsError;
use crate::relationships::{Relationship, RelationshipGraph, TableSet, ValidationReport};
use crate::schema::{Record, RecordTable};

/// Errors that abort a load or prevent the data layer from starting.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Cache unavailable: {0}")]
    CacheUnavailable(#[from] CacheError),

    #[error("Configuration error: {0}")]
    Settings(#[from] SettingsError),

    #[error("Load task failed: {0}")]
    TaskFailed(String),
}

pub type LoadResult<T> = Result<T, LoadError>;

/// What a load did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoadSummary {
    pub tables_loaded: usize,
    pub rows_loaded: usize,
    pub tables_not_found: Vec<String>,
    pub malformed_sources: usize,
    /// Relationship edges validated.
    pub relationships: usize,
    pub broken_references: usize,
    /// Recoverable problems met during the load.
    pub diagnostics: Vec<String>,
    pub elapsed: Duration,
}

impl fmt::Display for LoadSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} tables, {} rows, {} relationships ({} broken references)",
            self.tables_loaded, self.rows_loaded, self.relationships, self.broken_references
        )?;
        if !self.tables_not_found.is_empty() {
            write!(f, ", {} not found", self.tables_not_found.len())?;
        }
        if self.malformed_sources > 0 {
            write!(f, ", {} malformed sources skipped", self.malformed_sources)?;
        }
        write!(f, " in {:.2?}", self.elapsed)
    }
}

/// One published generation of materialized tables.
#[derive(Debug, Default)]
pub struct TableStore {
    generation: u64,
    tables: TableSet,
    relationships: Vec<Relationship>,
    report: Option<ValidationReport>,
    summary: Option<LoadSummary>,
}

impl TableStore {
    pub(crate) fn new(
        generation: u64,
        tables: TableSet,
        relationships: Vec<Relationship>,
        report: Option<ValidationReport>,
        summary: LoadSummary,
    ) -> Self {
        Self {
            generation,
            tables,
            relationships,
            report,
            summary: Some(summary),
        }
    }

    /// Zero for the empty store the data layer starts with.
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn tables(&self) -> &TableSet {
        &self.tables
    }

    pub fn table(&self, name: &str) -> Option<&Arc<RecordTable>> {
        self.tables.get(&normalize(name))
    }

    /// Every record of `name`; empty when the table was not loaded.
    pub fn records(&self, name: &str) -> Arc<[Record]> {
        self.table(name)
            .map(|t| t.records())
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    pub fn table_names(&self) -> Vec<&str> {
        self.tables.keys().map(String::as_str).collect()
    }

    /// Row counts per table.
    pub fn row_counts(&self) -> BTreeMap<&str, usize> {
        self.tables
            .iter()
            .map(|(name, table)| (name.as_str(), table.records().len()))
            .collect()
    }

    pub fn relationships(&self) -> &[Relationship] {
        &self.relationships
    }

    pub fn report(&self) -> Option<&ValidationReport> {
        self.report.as_ref()
    }

    pub fn summary(&self) -> Option<&LoadSummary> {
        self.summary.as_ref()
    }

    pub fn graph(&self) -> RelationshipGraph {
        RelationshipGraph::new(self.tables.keys().map(String::as_str), &self.relationships)
    }
}

/// Store key for a table name.
pub(crate) fn normalize(name: &str) -> String {
    crate::sanitize::strip_table_suffix(name.trim()).to_lowercase()
}

//! Relationship detection.
//!
//! Per (table, column), in order:
//!
//! 1. The [`ColumnPurposeProvider`], when one is supplied and has an answer.
//! 2. Well-known column names (`favoredclass`, `prereqfeat*`, ...).
//! 3. A `*table` suffix: the column holds table names.
//! 4. An `*_id` / `*id` suffix whose prefix, or its plural, names a table.
//!
//! Lookup edges need at least one value that is neither null nor blank.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;

use super::{
    pluralize, ColumnPurpose, ColumnPurposeProvider, Relationship, RelationshipKind, TableSet,
};
use crate::sanitize::strip_table_suffix;
use crate::schema::RecordTable;

/// Column names with a fixed target table.
static WELL_KNOWN: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        (r"^favoredclass$", "classes"),
        (r"^weapontype$", "weapontypes"),
        (r"^(?:prereqfeat|orfeat|orreqfeat)", "feat"),
        (r"^reqskill", "skills"),
    ]
    .into_iter()
    .filter_map(|(pattern, target)| Regex::new(pattern).ok().map(|re| (re, target)))
    .collect()
});

static ID_SUFFIX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^(.+?)_*id$").ok());

static TABLE_SUFFIX: Lazy<Option<Regex>> = Lazy::new(|| Regex::new(r"^.+table$").ok());

/// Infers relationship edges from materialized tables.
pub struct RelationshipDetector {
    purposes: Option<Arc<dyn ColumnPurposeProvider>>,
    sample_rows: usize,
}

impl RelationshipDetector {
    pub fn new(sample_rows: usize) -> Self {
        Self {
            purposes: None,
            sample_rows,
        }
    }

    pub fn with_purposes(mut self, purposes: Arc<dyn ColumnPurposeProvider>) -> Self {
        self.purposes = Some(purposes);
        self
    }

    /// Every edge over `tables`, deduplicated and sorted.
    pub fn detect(&self, tables: &TableSet) -> Vec<Relationship> {
        let mut edges = BTreeSet::new();

        for (name, table) in tables {
            for (idx, field) in table.schema().fields().iter().enumerate() {
                self.detect_column(tables, name, table, idx, &field.original, &mut edges);
            }
        }

        tracing::debug!("detected {} relationships", edges.len());
        edges.into_iter().collect()
    }

    fn detect_column(
        &self,
        tables: &TableSet,
        table_name: &str,
        table: &RecordTable,
        idx: usize,
        column: &str,
        edges: &mut BTreeSet<Relationship>,
    ) {
        let lookup = |target: &str, edges: &mut BTreeSet<Relationship>| {
            if has_value(table, idx) {
                edges.insert(Relationship::new(
                    table_name,
                    column,
                    normalize_table(target),
                    RelationshipKind::Lookup,
                ));
            }
        };

        if let Some(purpose) = self
            .purposes
            .as_ref()
            .and_then(|p| p.get_column_purpose(table_name, column))
        {
            match purpose {
                ColumnPurpose::Lookup { target } => lookup(&target, edges),
                ColumnPurpose::TableName => self.table_name_edges(table_name, table, idx, column, edges),
                ColumnPurpose::Plain => {}
            }
            return;
        }

        let lower = column.to_lowercase();

        if let Some((_, target)) = WELL_KNOWN.iter().find(|(re, _)| re.is_match(&lower)) {
            lookup(target, edges);
            return;
        }

        if TABLE_SUFFIX.as_ref().is_some_and(|re| re.is_match(&lower)) {
            self.table_name_edges(table_name, table, idx, column, edges);
            return;
        }

        let prefix = ID_SUFFIX
            .as_ref()
            .and_then(|re| re.captures(&lower))
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str().trim_end_matches('_').to_string());
        if let Some(prefix) = prefix.filter(|p| !p.is_empty()) {
            let plural = pluralize(&prefix);
            let target = [prefix.as_str(), plural.as_str()]
                .into_iter()
                .find(|candidate| tables.contains_key(*candidate));
            if let Some(target) = target {
                lookup(target, edges);
            }
        }
    }

    /// One edge per distinct table name found in the sampled rows.
    fn table_name_edges(
        &self,
        table_name: &str,
        table: &RecordTable,
        idx: usize,
        column: &str,
        edges: &mut BTreeSet<Relationship>,
    ) {
        let mut seen = HashSet::new();
        for record in table.records().iter().take(self.sample_rows) {
            let cell = &record.values()[idx];
            if cell.is_blank() {
                continue;
            }
            let target = normalize_table(&cell.to_string());
            if seen.insert(target.clone()) {
                edges.insert(Relationship::new(
                    table_name,
                    column,
                    target,
                    RelationshipKind::TableName,
                ));
            }
        }
    }
}

/// Lowercased table name without the file suffix.
pub(crate) fn normalize_table(name: &str) -> String {
    strip_table_suffix(name.trim()).to_lowercase()
}

/// True if some row holds a non-null, non-blank value in column `idx`.
fn has_value(table: &RecordTable, idx: usize) -> bool {
    table
        .records()
        .iter()
        .any(|record| record.values().get(idx).is_some_and(|c| !c.is_blank()))
}

//! Relationship validation against materialized rows.

use std::collections::{BTreeSet, HashMap, HashSet};

use serde::{Deserialize, Serialize};

use super::graph::load_order;
use super::{Relationship, RelationshipKind, TableSet};
use crate::relationships::detector::normalize_table;
use crate::schema::RecordTable;
use crate::table::Cell;

/// Columns whose values count as row ids alongside the row index.
const ID_COLUMNS: &[&str] = &["id", "index", "idx"];

/// Value that means "no reference" in lookup columns.
const NO_REFERENCE: i64 = -1;

/// One value that does not resolve.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BrokenReference {
    pub table: String,
    pub column: String,
    pub row: usize,
    pub value: String,
}

/// Outcome of validating every edge.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub total_relationships: usize,
    pub valid_relationships: usize,
    /// The first broken references found, up to the configured limit.
    pub broken_references: Vec<BrokenReference>,
    /// Every broken reference, including those past the limit.
    pub broken_count: usize,
    pub missing_tables: BTreeSet<String>,
    pub load_order: Vec<String>,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.broken_count == 0 && self.missing_tables.is_empty()
    }
}

/// Checks edges against the rows of their tables.
#[derive(Debug, Clone)]
pub struct Validator {
    strict: bool,
    max_broken: usize,
}

impl Validator {
    /// `strict` treats non-numeric lookup values as broken.
    pub fn new(strict: bool, max_broken: usize) -> Self {
        Self { strict, max_broken }
    }

    pub fn validate(&self, edges: &[Relationship], tables: &TableSet) -> ValidationReport {
        let mut run = Run::new(self, tables);
        for edge in edges {
            run.check(edge);
        }
        run.finish(edges)
    }

    /// Same as [`Validator::validate`], yielding to the runtime after each
    /// source table.
    pub async fn validate_async(
        &self,
        edges: &[Relationship],
        tables: &TableSet,
    ) -> ValidationReport {
        let mut run = Run::new(self, tables);
        let mut current: Option<&str> = None;
        for edge in edges {
            if current.is_some_and(|t| t != edge.source_table) {
                tokio::task::yield_now().await;
            }
            current = Some(edge.source_table.as_str());
            run.check(edge);
        }
        run.finish(edges)
    }
}

struct Run<'a> {
    validator: &'a Validator,
    tables: &'a TableSet,
    /// Row ids per target table, built on first use.
    ids: HashMap<String, HashSet<i64>>,
    /// (table, column) pairs of table-name columns already checked, with
    /// whether they were clean.
    table_name_columns: HashMap<(String, String), bool>,
    report: ValidationReport,
}

impl<'a> Run<'a> {
    fn new(validator: &'a Validator, tables: &'a TableSet) -> Self {
        Self {
            validator,
            tables,
            ids: HashMap::new(),
            table_name_columns: HashMap::new(),
            report: ValidationReport::default(),
        }
    }

    fn check(&mut self, edge: &Relationship) {
        self.report.total_relationships += 1;

        let target_exists = self.tables.contains_key(&edge.target_table);
        if !target_exists {
            self.report.missing_tables.insert(edge.target_table.clone());
        }

        let Some(source) = self.tables.get(&edge.source_table) else {
            return;
        };
        let Some(idx) = source.schema().index_of_original(&edge.column) else {
            return;
        };

        let clean = match edge.kind {
            RelationshipKind::TableName => self.check_table_names(edge, source, idx),
            RelationshipKind::Lookup if target_exists => self.check_lookup(edge, source, idx),
            RelationshipKind::Lookup => false,
        };

        if target_exists && clean {
            self.report.valid_relationships += 1;
        }
    }

    /// Every value must name a loaded table. Checked once per column.
    fn check_table_names(&mut self, edge: &Relationship, source: &RecordTable, idx: usize) -> bool {
        let key = (edge.source_table.clone(), edge.column.clone());
        if let Some(clean) = self.table_name_columns.get(&key) {
            return *clean;
        }

        let mut clean = true;
        for (row, record) in source.records().iter().enumerate() {
            let cell = &record.values()[idx];
            if cell.is_blank() {
                continue;
            }
            if !self.tables.contains_key(&normalize_table(&cell.to_string())) {
                clean = false;
                self.broken(edge, row, cell);
            }
        }

        self.table_name_columns.insert(key, clean);
        clean
    }

    fn check_lookup(&mut self, edge: &Relationship, source: &RecordTable, idx: usize) -> bool {
        if !self.ids.contains_key(&edge.target_table) {
            let ids = self
                .tables
                .get(&edge.target_table)
                .map(|t| row_ids(t))
                .unwrap_or_default();
            self.ids.insert(edge.target_table.clone(), ids);
        }

        let mut clean = true;
        for (row, record) in source.records().iter().enumerate() {
            let cell = &record.values()[idx];
            if cell.is_blank() {
                continue;
            }
            let resolves = match cell.as_i64() {
                Some(NO_REFERENCE) => true,
                Some(value) => self
                    .ids
                    .get(&edge.target_table)
                    .is_some_and(|ids| ids.contains(&value)),
                None => !self.validator.strict,
            };
            if !resolves {
                clean = false;
                self.broken(edge, row, cell);
            }
        }
        clean
    }

    fn broken(&mut self, edge: &Relationship, row: usize, cell: &Cell) {
        self.report.broken_count += 1;
        if self.report.broken_references.len() < self.validator.max_broken {
            self.report.broken_references.push(BrokenReference {
                table: edge.source_table.clone(),
                column: edge.column.clone(),
                row,
                value: cell.to_string(),
            });
        }
    }

    fn finish(mut self, edges: &[Relationship]) -> ValidationReport {
        self.report.load_order = load_order(self.tables.keys().map(String::as_str), edges);
        tracing::info!(
            "validated {} relationships: {} valid, {} broken references, {} missing tables",
            self.report.total_relationships,
            self.report.valid_relationships,
            self.report.broken_count,
            self.report.missing_tables.len()
        );
        self.report
    }
}

/// Row indices plus the values of any id-like column.
fn row_ids(table: &RecordTable) -> HashSet<i64> {
    let records = table.records();
    let mut ids: HashSet<i64> = (0..records.len() as i64).collect();
    let id_columns: Vec<usize> = ID_COLUMNS
        .iter()
        .filter_map(|c| table.schema().index_of_original(c))
        .collect();
    for record in records.iter() {
        for idx in &id_columns {
            if let Some(value) = record.values()[*idx].as_i64() {
                ids.insert(value);
            }
        }
    }
    ids
}

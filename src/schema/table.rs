//! Materialized tables of records.

use std::sync::Arc;

use super::{Record, RecordSchema};
use crate::source::SourceId;

/// Uniform read access to any materialized table, whatever its columns.
pub trait TableView {
    fn name(&self) -> &str;

    /// Original column names.
    fn columns(&self) -> Vec<&str>;

    fn row_count(&self) -> usize;

    fn row(&self, index: usize) -> Option<Record>;
}

/// Every record of one table plus the schema they share.
#[derive(Debug, Clone)]
pub struct RecordTable {
    schema: Arc<RecordSchema>,
    records: Arc<[Record]>,
    source: Option<SourceId>,
}

impl RecordTable {
    pub fn new(schema: Arc<RecordSchema>, records: Vec<Record>, source: Option<SourceId>) -> Self {
        Self {
            schema,
            records: records.into(),
            source,
        }
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    /// Shared slice of every record.
    pub fn records(&self) -> Arc<[Record]> {
        Arc::clone(&self.records)
    }

    pub fn get(&self, index: usize) -> Option<&Record> {
        self.records.get(index)
    }

    /// The source the table was resolved from.
    pub fn source(&self) -> Option<&SourceId> {
        self.source.as_ref()
    }
}

impl TableView for RecordTable {
    fn name(&self) -> &str {
        self.schema.table()
    }

    fn columns(&self) -> Vec<&str> {
        self.schema.original_names()
    }

    fn row_count(&self) -> usize {
        self.records.len()
    }

    fn row(&self, index: usize) -> Option<Record> {
        self.records.get(index).cloned()
    }
}

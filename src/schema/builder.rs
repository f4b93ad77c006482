//! Row materialization.

use std::sync::Arc;

use super::{Record, RecordSchema, StringTable};
use crate::table::{Cell, TableData};

/// Turns table rows into records of one schema.
///
/// The column-to-field map and the localized field list are computed once,
/// so [`RecordBuilder::build_all`] costs the same per row as a plain copy
/// plus reference lookups.
pub struct RecordBuilder<'a> {
    schema: Arc<RecordSchema>,
    strings: &'a StringTable,
    /// Field index for each table column.
    column_map: Vec<Option<usize>>,
    /// Per field: may hold a string reference.
    localized: Vec<bool>,
}

impl<'a> RecordBuilder<'a> {
    pub fn new(schema: Arc<RecordSchema>, columns: &[String], strings: &'a StringTable) -> Self {
        let column_map = schema.column_map(columns);
        let mut localized = vec![false; schema.field_count()];
        for idx in schema.localized_fields() {
            localized[idx] = true;
        }
        Self {
            schema,
            strings,
            column_map,
            localized,
        }
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    /// Materialize one row.
    pub fn build_row(&self, row: &[Cell]) -> Record {
        let mut values = vec![Cell::Null; self.schema.field_count()];
        let mut string_refs = Vec::new();

        for (cell, field) in row.iter().zip(&self.column_map) {
            let Some(field) = *field else {
                continue;
            };
            if self.localized[field] {
                if let Some(ref_id) = string_reference(cell) {
                    string_refs.push((field, ref_id));
                    if let Some(text) = self.strings.resolve(ref_id) {
                        values[field] = Cell::Text(text.to_string());
                        continue;
                    }
                }
            }
            values[field] = cell.clone();
        }

        Record::from_parts(Arc::clone(&self.schema), values, string_refs)
    }

    /// Materialize every row of `table`, in row order.
    pub fn build_all(&self, table: &TableData) -> Vec<Record> {
        table.rows().iter().map(|row| self.build_row(row)).collect()
    }
}

/// Reference id held by a cell, if its value is in the reference range.
fn string_reference(cell: &Cell) -> Option<u32> {
    let value = match cell {
        Cell::Int(n) => *n,
        Cell::Text(s) => s.trim().parse::<i64>().ok()?,
        Cell::Null => return None,
    };
    StringTable::is_reference(value).then_some(value as u32)
}

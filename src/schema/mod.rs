//! Runtime record schemas.
//!
//! Tables declare no schema of their own; the header line is the schema.
//! The [`Synthesizer`] turns a table name and its column list into a
//! [`RecordSchema`] once per run, and every row of the table becomes a
//! [`Record`]: a shared schema plus a flat array of cells.
//!
//! ```text
//!   TableData ──columns──▶ Synthesizer ──▶ Arc<RecordSchema>
//!       │                                        │
//!       └──rows──▶ RecordBuilder (+ StringTable) ─┴─▶ Vec<Record> ─▶ RecordTable
//! ```
//!
//! A schema can be written out as a [`SchemaDescriptor`], a small JSON
//! document. Reading one back always goes through the synthesizer, which
//! rejects any descriptor that disagrees with what it would build itself.

mod builder;
mod record;
mod strings;
mod synthesizer;
mod table;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

pub use builder::RecordBuilder;
pub use record::{FieldError, KeyMode, Record};
pub use strings::{StringResolver, StringTable, MAX_STRING_REF};
pub use synthesizer::Synthesizer;
pub use table::{RecordTable, TableView};

/// Descriptor format version.
pub const DESCRIPTOR_VERSION: u32 = 1;

/// Columns whose values may be string references.
pub const LOCALIZED_COLUMNS: &[&str] = &[
    "name",
    "description",
    "plural",
    "lower",
    "label",
    "displaynametext",
    "desc",
    "tooltip",
    "help",
];

/// Display column candidates, most preferred first.
pub const DISPLAY_PREFERENCE: &[&str] = &["id", "index", "idx", "row"];

pub fn is_localized_column(column: &str) -> bool {
    let lower = column.to_lowercase();
    LOCALIZED_COLUMNS.contains(&lower.as_str())
}

/// Errors raised when a persisted descriptor does not match its table.
#[derive(Debug, thiserror::Error)]
pub enum DescriptorError {
    #[error("unsupported descriptor version {0}")]
    UnsupportedVersion(u32),

    #[error("descriptor is for table '{found}', expected '{expected}'")]
    TableMismatch { expected: String, found: String },

    #[error("descriptor {0} do not match the table")]
    Mismatch(&'static str),
}

/// One field of a record schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDescriptor {
    /// Column name as it appears in the table header.
    pub original: String,
    /// Sanitized identifier.
    pub name: String,
    /// Values may be string references.
    pub localized: bool,
}

/// A synthesized record type.
#[derive(Debug)]
pub struct RecordSchema {
    table: String,
    type_name: String,
    fields: Vec<FieldDescriptor>,
    by_name: HashMap<String, usize>,
    /// First field per exact original name.
    by_original: HashMap<String, usize>,
    /// First field per lowercased original name.
    by_original_lower: HashMap<String, usize>,
    display: Option<usize>,
}

impl RecordSchema {
    pub(crate) fn new(
        table: String,
        type_name: String,
        fields: Vec<FieldDescriptor>,
        display: Option<usize>,
    ) -> Self {
        let mut by_name = HashMap::with_capacity(fields.len());
        let mut by_original = HashMap::with_capacity(fields.len());
        let mut by_original_lower = HashMap::with_capacity(fields.len());
        for (idx, field) in fields.iter().enumerate() {
            by_name.insert(field.name.clone(), idx);
            by_original.entry(field.original.clone()).or_insert(idx);
            by_original_lower
                .entry(field.original.to_lowercase())
                .or_insert(idx);
        }
        Self {
            table,
            type_name,
            fields,
            by_name,
            by_original,
            by_original_lower,
            display,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Sanitized field names in column order.
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Original column names in column order.
    pub fn original_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.original.as_str()).collect()
    }

    /// Field index by sanitized name, then by exact original name, then by
    /// case-insensitive original name, then by case-insensitive sanitized
    /// name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        if let Some(idx) = self.by_name.get(name) {
            return Some(*idx);
        }
        self.index_of_original(name).or_else(|| {
            self.fields
                .iter()
                .position(|f| f.name.eq_ignore_ascii_case(name))
        })
    }

    /// Field index by original column name, exact match first.
    pub fn index_of_original(&self, column: &str) -> Option<usize> {
        self.by_original
            .get(column)
            .or_else(|| self.by_original_lower.get(&column.to_lowercase()))
            .copied()
    }

    /// Whether `columns` is exactly this schema's source header.
    pub fn has_columns<S: AsRef<str>>(&self, columns: &[S]) -> bool {
        columns.len() == self.fields.len()
            && columns
                .iter()
                .zip(&self.fields)
                .all(|(c, f)| c.as_ref() == f.original)
    }

    /// Field for each of `columns`, in order. The schema's own column list
    /// maps by position. Any other list claims fields by name, each field
    /// at most once: first an unclaimed field with the exact original name,
    /// then one matching case-insensitively.
    pub fn column_map<S: AsRef<str>>(&self, columns: &[S]) -> Vec<Option<usize>> {
        if self.has_columns(columns) {
            return (0..columns.len()).map(Some).collect();
        }

        let mut claimed = vec![false; self.fields.len()];
        columns
            .iter()
            .map(|column| {
                let column = column.as_ref();
                let idx = self
                    .fields
                    .iter()
                    .enumerate()
                    .position(|(i, f)| !claimed[i] && f.original == column)
                    .or_else(|| {
                        self.fields.iter().enumerate().position(|(i, f)| {
                            !claimed[i] && f.original.eq_ignore_ascii_case(column)
                        })
                    })?;
                claimed[idx] = true;
                Some(idx)
            })
            .collect()
    }

    pub fn display_index(&self) -> Option<usize> {
        self.display
    }

    pub fn display_field(&self) -> Option<&FieldDescriptor> {
        self.display.and_then(|idx| self.fields.get(idx))
    }

    /// Indices of localized fields.
    pub fn localized_fields(&self) -> Vec<usize> {
        self.fields
            .iter()
            .enumerate()
            .filter(|(_, f)| f.localized)
            .map(|(idx, _)| idx)
            .collect()
    }

    /// Serializable form of this schema.
    pub fn descriptor(&self) -> SchemaDescriptor {
        SchemaDescriptor {
            version: DESCRIPTOR_VERSION,
            table: self.table.clone(),
            type_name: self.type_name.clone(),
            columns: self.fields.iter().map(|f| f.original.clone()).collect(),
            fields: self.fields.iter().map(|f| f.name.clone()).collect(),
            display_field: self.display_field().map(|f| f.name.clone()),
            localized: self
                .fields
                .iter()
                .filter(|f| f.localized)
                .map(|f| f.name.clone())
                .collect(),
        }
    }
}

impl PartialEq for RecordSchema {
    fn eq(&self, other: &Self) -> bool {
        self.table == other.table && self.type_name == other.type_name && self.fields == other.fields
    }
}

/// Plain-data description of a [`RecordSchema`], persisted as JSON text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SchemaDescriptor {
    pub version: u32,
    pub table: String,
    pub type_name: String,
    /// Original column names.
    pub columns: Vec<String>,
    /// Sanitized field names, parallel to `columns`.
    pub fields: Vec<String>,
    pub display_field: Option<String>,
    pub localized: Vec<String>,
}

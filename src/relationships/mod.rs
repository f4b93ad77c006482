//! Cross-table relationships.
//!
//! Tables reference each other by row index or by table name, but nothing
//! declares it. Edges are inferred from column names and values, checked
//! against the materialized rows, and used to order loading.
//!
//! ```text
//!  materialized tables ──▶ RelationshipDetector ──▶ Vec<Relationship>
//!                                                        │
//!                      Validator ◀───────────────────────┤
//!                          │                             ▼
//!                          ▼                    RelationshipGraph
//!                   ValidationReport ◀── load_order ──┘  └── to_dot
//! ```
//!
//! Edges are derived data. Nothing here is authoritative and a broken
//! reference is reported, never raised.

mod detector;
mod graph;
mod inflection;
mod validator;

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::schema::RecordTable;

pub use detector::RelationshipDetector;
pub use graph::{load_order, RelationshipGraph};
pub use inflection::{pluralize, singularize};
pub use validator::{BrokenReference, ValidationReport, Validator};

/// Materialized tables by lowercased name.
pub type TableSet = BTreeMap<String, Arc<RecordTable>>;

/// How a column refers to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RelationshipKind {
    /// Values are row ids in the target table.
    Lookup,
    /// Values are table names.
    TableName,
}

/// A directed edge from a (table, column) to a target table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Relationship {
    pub source_table: String,
    pub column: String,
    pub target_table: String,
    pub kind: RelationshipKind,
}

impl Relationship {
    pub fn new(
        source_table: impl Into<String>,
        column: impl Into<String>,
        target_table: impl Into<String>,
        kind: RelationshipKind,
    ) -> Self {
        Self {
            source_table: source_table.into(),
            column: column.into(),
            target_table: target_table.into(),
            kind,
        }
    }
}

impl fmt::Display for Relationship {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let arrow = match self.kind {
            RelationshipKind::Lookup => "->",
            RelationshipKind::TableName => "~>",
        };
        write!(
            f,
            "{}.{} {} {}",
            self.source_table, self.column, arrow, self.target_table
        )
    }
}

/// What a column holds, as declared by a [`ColumnPurposeProvider`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColumnPurpose {
    Lookup { target: String },
    TableName,
    /// Not a reference.
    Plain,
}

/// Externally supplied column semantics. Consulted before any heuristic.
pub trait ColumnPurposeProvider: Send + Sync {
    fn get_column_purpose(&self, table: &str, column: &str) -> Option<ColumnPurpose>;
}

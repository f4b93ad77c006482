//! Column-oriented game-rule tables.
//!
//! A [`TableData`] is the raw, schema-less form of a table: an ordered list
//! of column names and a dense list of rows, each row a list of [`Cell`]s.
//! The schema is whatever the header line says; nothing else is known until
//! the table is materialized into records by [`crate::schema`].
//!
//! Tables are read from the `2DA V2.0` text format ([`parser`]) and may be
//! persisted in a checksummed binary form ([`codec`]).

pub mod codec;
mod parser;

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

pub use parser::ParseError;

/// The reserved null sentinel.
pub const NULL_SENTINEL: &str = "****";

/// One table cell.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Cell {
    /// The null sentinel.
    Null,
    /// An integer whose canonical decimal rendering equals the source text.
    Int(i64),
    /// Any other scalar, kept verbatim.
    Text(String),
}

impl Cell {
    /// Classify raw cell text.
    ///
    /// Only canonical integers become [`Cell::Int`] (`"12"` but not `"012"` or
    /// `"+12"`), so rendering a cell always reproduces its source text.
    pub fn parse(raw: &str) -> Self {
        if raw == NULL_SENTINEL || raw.is_empty() {
            return Cell::Null;
        }
        match raw.parse::<i64>() {
            Ok(n) if n.to_string() == raw => Cell::Int(n),
            _ => Cell::Text(raw.to_string()),
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Cell::Null)
    }

    /// True for the null sentinel and for whitespace-only text.
    pub fn is_blank(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Int(_) => false,
            Cell::Text(s) => s.trim().is_empty(),
        }
    }

    /// Integer value, parsing text when needed (hex `0x` prefix accepted).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Cell::Null => None,
            Cell::Int(n) => Some(*n),
            Cell::Text(s) => parse_int(s),
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Cell::Null => None,
            Cell::Int(n) => Some(*n as f64),
            Cell::Text(s) => s.trim().parse().ok(),
        }
    }

    /// Borrowed text for text cells.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Cell::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Source text of the cell; `None` for null.
    pub fn to_raw(&self) -> Option<String> {
        match self {
            Cell::Null => None,
            Cell::Int(n) => Some(n.to_string()),
            Cell::Text(s) => Some(s.clone()),
        }
    }

    /// Approximate heap footprint, used for cache budgeting.
    pub(crate) fn approx_size(&self) -> usize {
        std::mem::size_of::<Cell>()
            + match self {
                Cell::Text(s) => s.capacity(),
                _ => 0,
            }
    }
}

impl fmt::Display for Cell {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Cell::Null => write!(f, "{}", NULL_SENTINEL),
            Cell::Int(n) => write!(f, "{}", n),
            Cell::Text(s) => write!(f, "{}", s),
        }
    }
}

/// Parse a decimal or `0x`-prefixed hexadecimal integer.
pub fn parse_int(s: &str) -> Option<i64> {
    let s = s.trim();
    if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        return i64::from_str_radix(hex, 16).ok();
    }
    s.parse().ok()
}

/// A materialized table: columns plus dense rows.
#[derive(Debug, Clone, PartialEq)]
pub struct TableData {
    name: String,
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
    default_value: Option<String>,
    ragged_rows: usize,
    column_lookup: HashMap<String, usize>,
}

impl TableData {
    /// Build a table from columns and rows. Short rows are padded with null,
    /// long rows are truncated and counted as ragged.
    pub fn new(name: impl Into<String>, columns: Vec<String>, rows: Vec<Vec<Cell>>) -> Self {
        let width = columns.len();
        let mut ragged_rows = 0;
        let rows = rows
            .into_iter()
            .map(|mut row| {
                if row.len() > width {
                    ragged_rows += 1;
                    row.truncate(width);
                }
                row.resize(width, Cell::Null);
                row
            })
            .collect();

        let mut column_lookup = HashMap::with_capacity(width);
        for (idx, col) in columns.iter().enumerate() {
            column_lookup.entry(col.to_lowercase()).or_insert(idx);
        }

        Self {
            name: name.into(),
            columns,
            rows,
            default_value: None,
            ragged_rows,
            column_lookup,
        }
    }

    /// Build a table from raw string cells (`None` or `"****"` is null).
    pub fn from_strings<C, R>(name: impl Into<String>, columns: &[C], rows: &[R]) -> Self
    where
        C: AsRef<str>,
        R: AsRef<[Option<&'static str>]>,
    {
        let columns = columns.iter().map(|c| c.as_ref().to_string()).collect();
        let rows = rows
            .iter()
            .map(|row| {
                row.as_ref()
                    .iter()
                    .map(|cell| cell.map(Cell::parse).unwrap_or(Cell::Null))
                    .collect()
            })
            .collect();
        Self::new(name, columns, rows)
    }

    /// Parse `2DA V2.0` text.
    pub fn parse(name: impl Into<String>, bytes: &[u8]) -> Result<Self, ParseError> {
        parser::parse_2da(name.into(), bytes)
    }

    pub(crate) fn with_default_value(mut self, default_value: Option<String>) -> Self {
        self.default_value = default_value;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn row(&self, idx: usize) -> Option<&[Cell]> {
        self.rows.get(idx).map(|r| r.as_slice())
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn default_value(&self) -> Option<&str> {
        self.default_value.as_deref()
    }

    /// Number of rows that carried more cells than the header declares.
    pub fn ragged_rows(&self) -> usize {
        self.ragged_rows
    }

    /// Case-insensitive column lookup.
    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.column_lookup.get(&column.to_lowercase()).copied()
    }

    pub fn cell(&self, row: usize, column: usize) -> Option<&Cell> {
        self.rows.get(row).and_then(|r| r.get(column))
    }

    /// Iterate one column's cells in row order.
    pub fn column_cells(&self, column: usize) -> impl Iterator<Item = &Cell> + '_ {
        self.rows.iter().filter_map(move |r| r.get(column))
    }

    /// Approximate in-memory size in bytes.
    pub fn approx_size_bytes(&self) -> usize {
        let header: usize = self.columns.iter().map(|c| c.capacity() + 24).sum();
        let body: usize = self
            .rows
            .iter()
            .map(|r| 24 + r.iter().map(Cell::approx_size).sum::<usize>())
            .sum();
        self.name.capacity() + header + body
    }

    /// Render back to `2DA V2.0` text.
    pub fn to_2da_string(&self) -> String {
        let mut out = String::from("2DA V2.0\n");
        match &self.default_value {
            Some(d) => out.push_str(&format!("DEFAULT: {}\n", d)),
            None => out.push('\n'),
        }
        out.push_str("   ");
        for col in &self.columns {
            out.push(' ');
            out.push_str(col);
        }
        out.push('\n');
        for (idx, row) in self.rows.iter().enumerate() {
            out.push_str(&idx.to_string());
            for cell in row {
                out.push(' ');
                match cell {
                    Cell::Text(s) if s.contains(char::is_whitespace) => {
                        out.push('"');
                        out.push_str(s);
                        out.push('"');
                    }
                    other => out.push_str(&other.to_string()),
                }
            }
            out.push('\n');
        }
        out
    }
}

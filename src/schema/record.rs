//! Record instances.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use super::RecordSchema;
use crate::table::Cell;

/// Errors raised by record field access.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FieldError {
    #[error("unknown field '{field}' on {type_name}, valid fields: {}", .valid.join(", "))]
    UnknownField {
        type_name: String,
        field: String,
        valid: Vec<String>,
    },
}

/// Which names [`Record::to_map`] uses as keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    Original,
    Sanitized,
}

/// One materialized row: a shared schema and a flat array of cells.
#[derive(Debug, Clone, PartialEq)]
pub struct Record {
    schema: Arc<RecordSchema>,
    values: Vec<Cell>,
    /// (field index, reference id) for fields whose value was a string
    /// reference.
    string_refs: Vec<(usize, u32)>,
}

impl Record {
    pub(crate) fn from_parts(
        schema: Arc<RecordSchema>,
        values: Vec<Cell>,
        string_refs: Vec<(usize, u32)>,
    ) -> Self {
        Self {
            schema,
            values,
            string_refs,
        }
    }

    /// Build a record from (original column name, raw value) pairs.
    ///
    /// Unknown keys are dropped; fields without a pair are null.
    pub fn from_pairs<'a, I>(schema: Arc<RecordSchema>, pairs: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let (keys, raws): (Vec<&str>, Vec<&str>) = pairs.into_iter().unzip();
        let mut values = vec![Cell::Null; schema.field_count()];
        for (field, raw) in schema.column_map(&keys).into_iter().zip(raws) {
            if let Some(idx) = field {
                values[idx] = Cell::parse(raw);
            }
        }
        Self::from_parts(schema, values, Vec::new())
    }

    pub fn schema(&self) -> &Arc<RecordSchema> {
        &self.schema
    }

    pub fn values(&self) -> &[Cell] {
        &self.values
    }

    fn index(&self, name: &str) -> Result<usize, FieldError> {
        self.schema
            .index_of(name)
            .ok_or_else(|| FieldError::UnknownField {
                type_name: self.schema.type_name().to_string(),
                field: name.to_string(),
                valid: self
                    .schema
                    .field_names()
                    .into_iter()
                    .map(str::to_string)
                    .collect(),
            })
    }

    /// Field value by sanitized or original name.
    pub fn get(&self, name: &str) -> Result<&Cell, FieldError> {
        let idx = self.index(name)?;
        Ok(&self.values[idx])
    }

    /// Field value as text; `None` for null.
    pub fn get_str(&self, name: &str) -> Result<Option<String>, FieldError> {
        Ok(self.get(name)?.to_raw())
    }

    /// Field value as an integer; `None` for null or non-numeric values.
    pub fn get_i64(&self, name: &str) -> Result<Option<i64>, FieldError> {
        Ok(self.get(name)?.as_i64())
    }

    /// Assign a known field. Clears any string reference it carried.
    pub fn set(&mut self, name: &str, value: Cell) -> Result<(), FieldError> {
        let idx = self.index(name)?;
        self.values[idx] = value;
        self.string_refs.retain(|(field, _)| *field != idx);
        Ok(())
    }

    /// The string reference a localized field was resolved from.
    pub fn string_ref(&self, name: &str) -> Result<Option<u32>, FieldError> {
        let idx = self.index(name)?;
        Ok(self
            .string_refs
            .iter()
            .find(|(field, _)| *field == idx)
            .map(|(_, id)| *id))
    }

    /// Field values keyed by original or sanitized name.
    pub fn to_map(&self, mode: KeyMode) -> BTreeMap<String, Cell> {
        self.schema
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(field, value)| {
                let key = match mode {
                    KeyMode::Original => field.original.clone(),
                    KeyMode::Sanitized => field.name.clone(),
                };
                (key, value.clone())
            })
            .collect()
    }

    /// JSON object keyed by sanitized name.
    pub fn to_json(&self) -> serde_json::Value {
        let map: serde_json::Map<String, serde_json::Value> = self
            .schema
            .fields()
            .iter()
            .zip(&self.values)
            .map(|(field, value)| {
                let json = match value {
                    Cell::Null => serde_json::Value::Null,
                    Cell::Int(n) => serde_json::Value::from(*n),
                    Cell::Text(s) => serde_json::Value::from(s.as_str()),
                };
                (field.name.clone(), json)
            })
            .collect();
        serde_json::Value::Object(map)
    }
}

impl fmt::Display for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.schema.display_index() {
            Some(idx) => write!(
                f,
                "{}({}={})",
                self.schema.type_name(),
                self.schema.fields()[idx].name,
                self.values[idx]
            ),
            None => write!(f, "{}()", self.schema.type_name()),
        }
    }
}

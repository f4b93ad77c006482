//! Record schema synthesis.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use super::{
    is_localized_column, DescriptorError, FieldDescriptor, RecordSchema, SchemaDescriptor,
    DESCRIPTOR_VERSION, DISPLAY_PREFERENCE,
};
use crate::sanitize::{
    is_valid_identifier, sanitize_table_name, sanitize_unique_columns, strip_table_suffix,
};

#[derive(Debug, Default)]
struct TypeNames {
    /// Lowercased type name to owning table.
    owners: HashMap<String, String>,
    /// Table to assigned type name.
    assigned: HashMap<String, String>,
}

/// Builds record schemas and hands out collision-free type names.
#[derive(Debug, Default)]
pub struct Synthesizer {
    names: Mutex<TypeNames>,
}

impl Synthesizer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Type name for `table`, stable for the life of the synthesizer.
    ///
    /// A name already owned by another table gets `_2`, `_3`, ... appended.
    pub fn type_name_for(&self, table: &str) -> String {
        let table = strip_table_suffix(table).to_lowercase();
        let mut names = self.names.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(name) = names.assigned.get(&table) {
            return name.clone();
        }

        let base = sanitize_table_name(&table);
        let mut candidate = base.clone();
        let mut n = 2;
        while names
            .owners
            .get(&candidate.to_lowercase())
            .is_some_and(|owner| owner != &table)
        {
            candidate = format!("{}_{}", base, n);
            n += 1;
        }

        names.owners.insert(candidate.to_lowercase(), table.clone());
        names.assigned.insert(table, candidate.clone());
        candidate
    }

    /// Build the schema for `table` with the given header columns.
    pub fn synthesize(&self, table: &str, columns: &[String]) -> Arc<RecordSchema> {
        let type_name = self.type_name_for(table);
        let sanitized = sanitize_unique_columns(columns);

        let fields: Vec<FieldDescriptor> = columns
            .iter()
            .zip(sanitized)
            .map(|(original, name)| FieldDescriptor {
                localized: is_localized_column(original),
                original: original.clone(),
                name,
            })
            .collect();

        let display = choose_display(columns);
        tracing::debug!(
            "synthesized {} for '{}' with {} fields",
            type_name,
            table,
            fields.len()
        );

        Arc::new(RecordSchema::new(
            strip_table_suffix(table).to_lowercase(),
            type_name,
            fields,
            display,
        ))
    }

    /// Rebuild a schema from a persisted descriptor.
    ///
    /// The descriptor is only accepted when it is exactly what
    /// [`Synthesizer::synthesize`] produces for `table` and `columns`.
    pub fn from_descriptor(
        &self,
        descriptor: &SchemaDescriptor,
        table: &str,
        columns: &[String],
    ) -> Result<Arc<RecordSchema>, DescriptorError> {
        if descriptor.version != DESCRIPTOR_VERSION {
            return Err(DescriptorError::UnsupportedVersion(descriptor.version));
        }
        if !descriptor.table.eq_ignore_ascii_case(table) {
            return Err(DescriptorError::TableMismatch {
                expected: table.to_lowercase(),
                found: descriptor.table.clone(),
            });
        }
        if descriptor.columns != columns {
            return Err(DescriptorError::Mismatch("columns"));
        }
        if !is_valid_identifier(&descriptor.type_name) {
            return Err(DescriptorError::Mismatch("type name"));
        }

        let schema = self.synthesize(table, columns);
        let fresh = schema.descriptor();
        if descriptor.type_name != fresh.type_name {
            return Err(DescriptorError::Mismatch("type name"));
        }
        if descriptor.fields != fresh.fields {
            return Err(DescriptorError::Mismatch("fields"));
        }
        if descriptor.display_field != fresh.display_field {
            return Err(DescriptorError::Mismatch("display field"));
        }
        if descriptor.localized != fresh.localized {
            return Err(DescriptorError::Mismatch("localized fields"));
        }
        Ok(schema)
    }

    /// Forget every assigned type name.
    pub fn reset(&self) {
        let mut names = self.names.lock().unwrap_or_else(|e| e.into_inner());
        *names = TypeNames::default();
    }
}

/// First column named like an id, in preference order, else the first column.
fn choose_display(columns: &[String]) -> Option<usize> {
    if columns.is_empty() {
        return None;
    }
    DISPLAY_PREFERENCE
        .iter()
        .find_map(|wanted| {
            columns
                .iter()
                .position(|c| c.eq_ignore_ascii_case(wanted))
        })
        .or(Some(0))
}

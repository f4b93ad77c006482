//! In-memory source provider.
//!
//! Useful for embedding tables in a host application and for tests. Every
//! call to `list_sources` counts as one source read.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;

use super::{ModuleContext, SourceCopy, SourceId, SourceLayer, SourceProvider, SourceResult};
use crate::sanitize::strip_table_suffix;

/// Layer key: global layers have no module.
type LayerKey = (SourceLayer, Option<String>);

#[derive(Debug, Default)]
pub struct MemorySources {
    layers: Mutex<BTreeMap<LayerKey, HashMap<String, Vec<u8>>>>,
    reads: AtomicUsize,
}

impl MemorySources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`MemorySources::put`].
    pub fn with_table(self, layer: SourceLayer, table: &str, content: impl Into<Vec<u8>>) -> Self {
        self.put(layer, table, content);
        self
    }

    /// Define `table` in a global layer, replacing any previous copy there.
    pub fn put(&self, layer: SourceLayer, table: &str, content: impl Into<Vec<u8>>) {
        self.put_entry((layer, None), table, content.into());
    }

    /// Define `table` in a layer that only applies under `module`.
    pub fn put_module(
        &self,
        module: &str,
        layer: SourceLayer,
        table: &str,
        content: impl Into<Vec<u8>>,
    ) {
        self.put_entry((layer, Some(module.to_string())), table, content.into());
    }

    /// Remove `table` from a global layer. Returns true if it was present.
    pub fn remove(&self, layer: SourceLayer, table: &str) -> bool {
        let mut layers = self.layers.lock().unwrap_or_else(|e| e.into_inner());
        layers
            .get_mut(&(layer, None))
            .map(|tables| tables.remove(&key(table)).is_some())
            .unwrap_or(false)
    }

    /// Number of `list_sources` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn reset_read_count(&self) {
        self.reads.store(0, Ordering::SeqCst);
    }

    fn put_entry(&self, layer: LayerKey, table: &str, content: Vec<u8>) {
        let mut layers = self.layers.lock().unwrap_or_else(|e| e.into_inner());
        layers.entry(layer).or_default().insert(key(table), content);
    }
}

fn key(table: &str) -> String {
    strip_table_suffix(table).to_lowercase()
}

fn visible(layer_module: &Option<String>, module: Option<&ModuleContext>) -> bool {
    match layer_module {
        None => true,
        Some(name) => module.is_some_and(|m| m.as_str() == name),
    }
}

#[async_trait]
impl SourceProvider for MemorySources {
    async fn list_sources(
        &self,
        table: &str,
        module: Option<&ModuleContext>,
    ) -> SourceResult<Vec<SourceCopy>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        let wanted = key(table);
        let layers = self.layers.lock().unwrap_or_else(|e| e.into_inner());

        // BTreeMap order is precedence order.
        let copies = layers
            .iter()
            .filter(|((_, layer_module), _)| visible(layer_module, module))
            .filter_map(|((layer, layer_module), tables)| {
                tables.get(&wanted).map(|content| {
                    let label = match layer_module {
                        Some(m) => format!("memory:{}:{}", m, layer),
                        None => format!("memory:{}", layer),
                    };
                    SourceCopy::new(SourceId::new(*layer, 0, label), content.clone())
                })
            })
            .collect();

        Ok(copies)
    }

    async fn list_tables(&self, module: Option<&ModuleContext>) -> SourceResult<Vec<String>> {
        let layers = self.layers.lock().unwrap_or_else(|e| e.into_inner());
        let names: BTreeSet<String> = layers
            .iter()
            .filter(|((_, layer_module), _)| visible(layer_module, module))
            .flat_map(|(_, tables)| tables.keys().cloned())
            .collect();
        Ok(names.into_iter().collect())
    }
}

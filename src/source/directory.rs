//! Filesystem source provider: one directory per layer, one `<table>.2da`
//! file per table.
//!
//! Module-attached archives are expected to be extracted already; each one
//! is just another directory in the module's layer list.

use std::collections::{BTreeSet, HashMap};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;

use super::{
    ModuleContext, SourceCopy, SourceError, SourceId, SourceLayer, SourceProvider, SourceResult,
};
use crate::config::{Settings, SettingsError};
use crate::sanitize::{strip_table_suffix, TABLE_FILE_SUFFIX};

/// Layered directories read from disk.
#[derive(Debug, Clone, Default)]
pub struct DirectorySources {
    layers: Vec<(SourceId, PathBuf)>,
    modules: HashMap<String, Vec<(SourceId, PathBuf)>>,
}

impl DirectorySources {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build from the `[sources]` and `[modules.*]` settings.
    pub fn from_settings(settings: &Settings) -> Result<Self, SettingsError> {
        let mut sources = Self::new();
        for (layer, dir) in settings.sources.resolved_layers()? {
            sources = sources.with_layer(layer, dir);
        }
        for (name, module) in &settings.modules {
            for (layer, dir) in module.resolved_layers()? {
                sources = sources.with_module_layer(name, layer, dir);
            }
        }
        Ok(sources)
    }

    /// Add a global layer directory. Later directories of the same layer
    /// take precedence over earlier ones.
    pub fn with_layer(mut self, layer: SourceLayer, dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let ordinal = self.layers.iter().filter(|(id, _)| id.layer == layer).count();
        let id = SourceId::new(layer, ordinal, dir.display().to_string());
        self.layers.push((id, dir));
        self.layers.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    /// Add a directory that only applies when `module` is active.
    pub fn with_module_layer(
        mut self,
        module: &str,
        layer: SourceLayer,
        dir: impl Into<PathBuf>,
    ) -> Self {
        let dir = dir.into();
        let entries = self.modules.entry(module.to_string()).or_default();
        let ordinal = entries.iter().filter(|(id, _)| id.layer == layer).count();
        let id = SourceId::new(layer, ordinal, dir.display().to_string());
        entries.push((id, dir));
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        self
    }

    fn layers_for(&self, module: Option<&ModuleContext>) -> Vec<&(SourceId, PathBuf)> {
        let mut layers: Vec<&(SourceId, PathBuf)> = self.layers.iter().collect();
        if let Some(entries) = module.and_then(|m| self.modules.get(m.as_str())) {
            layers.extend(entries.iter());
        }
        layers.sort_by(|a, b| a.0.cmp(&b.0));
        layers
    }
}

#[async_trait]
impl SourceProvider for DirectorySources {
    async fn list_sources(
        &self,
        table: &str,
        module: Option<&ModuleContext>,
    ) -> SourceResult<Vec<SourceCopy>> {
        let mut copies = Vec::new();

        for (id, dir) in self.layers_for(module) {
            let Some(path) = find_table_file(dir, table).await? else {
                continue;
            };

            let content = match tokio::fs::read(&path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(
                        "skipping unreadable source {} for table '{}': {}",
                        path.display(),
                        table,
                        e
                    );
                    continue;
                }
            };
            let modified = tokio::fs::metadata(&path)
                .await
                .ok()
                .and_then(|m| m.modified().ok());

            copies.push(SourceCopy {
                id: id.clone(),
                content,
                path: Some(path),
                modified,
            });
        }

        Ok(copies)
    }

    async fn list_tables(&self, module: Option<&ModuleContext>) -> SourceResult<Vec<String>> {
        let mut names = BTreeSet::new();

        for (_, dir) in self.layers_for(module) {
            let mut entries = match tokio::fs::read_dir(dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    return Err(SourceError::Io {
                        path: dir.clone(),
                        source: e,
                    })
                }
            };

            while let Some(entry) = entries.next_entry().await.map_err(|e| SourceError::Io {
                path: dir.clone(),
                source: e,
            })? {
                let file_name = entry.file_name();
                let Some(file_name) = file_name.to_str() else {
                    continue;
                };
                let stem = strip_table_suffix(file_name);
                if stem.len() != file_name.len() && !stem.is_empty() {
                    names.insert(stem.to_lowercase());
                }
            }
        }

        Ok(names.into_iter().collect())
    }
}

/// Locate `<table>.2da` in `dir`, matching the file name case-insensitively.
async fn find_table_file(dir: &Path, table: &str) -> SourceResult<Option<PathBuf>> {
    let stem = strip_table_suffix(table).to_lowercase();
    let wanted = format!("{}{}", stem, TABLE_FILE_SUFFIX);

    let exact = dir.join(&wanted);
    if tokio::fs::metadata(&exact).await.is_ok_and(|m| m.is_file()) {
        return Ok(Some(exact));
    }

    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(SourceError::Io {
                path: dir.to_path_buf(),
                source: e,
            })
        }
    };

    while let Some(entry) = entries.next_entry().await.map_err(|e| SourceError::Io {
        path: dir.to_path_buf(),
        source: e,
    })? {
        if entry
            .file_name()
            .to_str()
            .is_some_and(|name| name.eq_ignore_ascii_case(&wanted))
        {
            return Ok(Some(entry.path()));
        }
    }

    Ok(None)
}

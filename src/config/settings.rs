//! TOML-based configuration for Tessera.
//!
//! Supports a config file (tessera.toml) with environment variable expansion
//! in every path value.
//!
//! Example configuration:
//! ```toml
//! [sources]
//! base = "${GAME_HOME}/data/2da"
//! expansions = ["${GAME_HOME}/x1/2da", "${GAME_HOME}/x2/2da"]
//! enhanced_overlay = "${GAME_HOME}/enhanced/2da"
//! workshop = ["./workshop/mod_a"]
//! user_override = "${HOME}/game/override"
//!
//! [modules.my_module]
//! archives = ["./modules/my_module/hak1"]
//! override_dir = "./modules/my_module/override"
//!
//! [cache]
//! dir = "./.tessera-cache"
//! max_bytes = 67108864
//! persist_resolved = true
//!
//! [preload]
//! tables = ["classes", "feat", "skills"]
//! timeout_ms = 5000
//!
//! [relationships]
//! enabled = true
//! sample_rows = 50
//! strict = false
//! max_broken_references = 100
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::source::SourceLayer;

/// Default byte budget of the resolved-table cache (64 MiB).
const DEFAULT_CACHE_BYTES: usize = 64 * 1024 * 1024;

/// Error type for settings.
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    #[error("Config file not found: {0}")]
    FileNotFound(PathBuf),

    #[error("Failed to read config file: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Missing environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Module not found: {0}")]
    ModuleNotFound(String),

    #[error("Failed to determine cache directory")]
    NoCacheDir,

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Root configuration structure.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct Settings {
    /// Layered source directories.
    pub sources: SourcesSettings,

    /// Per-module source directories, keyed by module name.
    pub modules: HashMap<String, ModuleSettings>,

    /// Cache configuration.
    pub cache: CacheSettings,

    /// Startup preload configuration.
    pub preload: PreloadSettings,

    /// Relationship detection and validation.
    pub relationships: RelationshipSettings,
}

/// Source layer directories, lowest precedence first.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct SourcesSettings {
    /// Base game tables.
    pub base: Option<String>,

    /// Expansion directories, in release order (at most two are used).
    pub expansions: Vec<String>,

    /// Enhanced-edition overlay.
    pub enhanced_overlay: Option<String>,

    /// Workshop override directories, in declared order.
    pub workshop: Vec<String>,

    /// User override directory.
    pub user_override: Option<String>,
}

impl SourcesSettings {
    /// Expand every configured path and tag it with its layer, lowest
    /// precedence first. Module layers are not included.
    pub fn resolved_layers(&self) -> Result<Vec<(SourceLayer, PathBuf)>, SettingsError> {
        let mut layers = Vec::new();

        if let Some(base) = &self.base {
            layers.push((SourceLayer::Base, expand_path(base)?));
        }

        let expansion_layers = [SourceLayer::Expansion1, SourceLayer::Expansion2];
        if self.expansions.len() > expansion_layers.len() {
            return Err(SettingsError::InvalidConfig(format!(
                "at most {} expansions are supported, got {}",
                expansion_layers.len(),
                self.expansions.len()
            )));
        }
        for (layer, dir) in expansion_layers.iter().zip(&self.expansions) {
            layers.push((*layer, expand_path(dir)?));
        }

        if let Some(overlay) = &self.enhanced_overlay {
            layers.push((SourceLayer::EnhancedOverlay, expand_path(overlay)?));
        }

        for dir in &self.workshop {
            layers.push((SourceLayer::Workshop, expand_path(dir)?));
        }

        if let Some(user) = &self.user_override {
            layers.push((SourceLayer::UserOverride, expand_path(user)?));
        }

        Ok(layers)
    }
}

/// Module-specific source directories.
#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct ModuleSettings {
    /// Extracted module-attached archives, in declared order.
    pub archives: Vec<String>,

    /// Module-embedded override directory.
    pub override_dir: Option<String>,
}

impl ModuleSettings {
    /// Expand paths, lowest precedence first.
    pub fn resolved_layers(&self) -> Result<Vec<(SourceLayer, PathBuf)>, SettingsError> {
        let mut layers = Vec::new();
        for dir in &self.archives {
            layers.push((SourceLayer::ModuleArchive, expand_path(dir)?));
        }
        if let Some(dir) = &self.override_dir {
            layers.push((SourceLayer::ModuleOverride, expand_path(dir)?));
        }
        Ok(layers)
    }
}

/// Cache configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CacheSettings {
    /// Cache directory (defaults to `<user cache dir>/tessera`).
    pub dir: Option<String>,

    /// Byte budget of the in-memory resolved-table cache.
    pub max_bytes: usize,

    /// Persist parsed tables so unchanged sources skip parsing next run.
    pub persist_resolved: bool,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            dir: None,
            max_bytes: DEFAULT_CACHE_BYTES,
            persist_resolved: true,
        }
    }
}

impl CacheSettings {
    /// Resolve the cache directory.
    pub fn cache_dir(&self) -> Result<PathBuf, SettingsError> {
        if let Some(dir) = &self.dir {
            return expand_path(dir);
        }
        dirs::cache_dir()
            .map(|base| base.join("tessera"))
            .ok_or(SettingsError::NoCacheDir)
    }
}

/// Startup preload configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct PreloadSettings {
    /// Tables to resolve eagerly at startup.
    pub tables: Vec<String>,

    /// Deadline for the whole preload, in milliseconds.
    pub timeout_ms: u64,
}

impl Default for PreloadSettings {
    fn default() -> Self {
        Self {
            tables: Vec::new(),
            timeout_ms: 5000,
        }
    }
}

impl PreloadSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

/// Relationship detection and validation settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RelationshipSettings {
    /// Run detection and validation after a load.
    pub enabled: bool,

    /// Rows sampled from table-name-valued columns.
    pub sample_rows: usize,

    /// Treat non-numeric lookup values as broken references.
    pub strict: bool,

    /// Maximum broken references kept in a report.
    pub max_broken_references: usize,
}

impl Default for RelationshipSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            sample_rows: 50,
            strict: false,
            max_broken_references: 100,
        }
    }
}

impl Settings {
    /// Load settings from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(SettingsError::FileNotFound(path.to_path_buf()));
        }

        let content = fs::read_to_string(path)?;
        let settings: Settings = toml::from_str(&content)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from the default config file locations.
    ///
    /// Searches in order:
    /// 1. Environment variable `TESSERA_CONFIG`
    /// 2. `./tessera.toml`
    /// 3. `~/.config/tessera/config.toml`
    pub fn load() -> Result<Self, SettingsError> {
        if let Ok(path) = env::var("TESSERA_CONFIG") {
            return Self::from_file(&path);
        }

        let local_config = PathBuf::from("tessera.toml");
        if local_config.exists() {
            return Self::from_file(&local_config);
        }

        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("tessera").join("config.toml");
            if user_config.exists() {
                return Self::from_file(&user_config);
            }
        }

        Ok(Settings::default())
    }

    /// Reject settings that cannot work.
    pub fn validate(&self) -> Result<(), SettingsError> {
        if self.cache.max_bytes == 0 {
            return Err(SettingsError::InvalidConfig(
                "cache.max_bytes must be greater than zero".to_string(),
            ));
        }
        if self.relationships.sample_rows == 0 {
            return Err(SettingsError::InvalidConfig(
                "relationships.sample_rows must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get a module by name.
    pub fn get_module(&self, name: &str) -> Result<&ModuleSettings, SettingsError> {
        self.modules
            .get(name)
            .ok_or_else(|| SettingsError::ModuleNotFound(name.to_string()))
    }
}

fn expand_path(s: &str) -> Result<PathBuf, SettingsError> {
    expand_env_vars(s).map(PathBuf::from)
}

/// Expand environment variables in a string.
///
/// Supports `${VAR}` and `$VAR` syntax.
pub fn expand_env_vars(s: &str) -> Result<String, SettingsError> {
    let mut result = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' {
            if chars.peek() == Some(&'{') {
                chars.next(); // consume '{'
                let mut var_name = String::new();
                for ch in chars.by_ref() {
                    if ch == '}' {
                        break;
                    }
                    var_name.push(ch);
                }
                let value = env::var(&var_name)
                    .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                result.push_str(&value);
            } else {
                // $VAR ends at the first non-alphanumeric/underscore
                let mut var_name = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_alphanumeric() || ch == '_' {
                        var_name.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                if var_name.is_empty() {
                    result.push('$');
                } else {
                    let value = env::var(&var_name)
                        .map_err(|_| SettingsError::MissingEnvVar(var_name.clone()))?;
                    result.push_str(&value);
                }
            }
        } else {
            result.push(c);
        }
    }

    Ok(result)
}

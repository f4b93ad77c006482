//! Configuration module for Tessera.
//!
//! Handles the TOML settings file and environment variable expansion.

mod settings;

pub use settings::{
    expand_env_vars, CacheSettings, ModuleSettings, PreloadSettings, RelationshipSettings,
    Settings, SettingsError, SourcesSettings,
};

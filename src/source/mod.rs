//! Layered table sources and override-chain resolution.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                       SourceResolver                            │
//! │  ┌───────────────────────────────────────────────────────────┐  │
//! │  │  ResolvedCache (memory)    │  DiskTableStore (optional)   │  │
//! │  │  - (context, table) keys   │  - parsed tables by content  │  │
//! │  │  - byte budget, LRU        │  - fail-closed codec         │  │
//! │  └───────────────────────────────────────────────────────────┘  │
//! └─────────────────────────────────────────────────────────────────┘
//!                           │ list_sources(table, module)
//!                           ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                      SourceProvider                             │
//! │     DirectorySources (filesystem)  │  MemorySources (embedded)  │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Precedence, lowest first:
//!
//! ```text
//! Base < Expansion1 < Expansion2 < EnhancedOverlay < Workshop
//!      < UserOverride < ModuleArchive < ModuleOverride
//! ```

mod directory;
mod memory;
mod preload;
mod resolver;

use std::fmt;
use std::path::PathBuf;
use std::time::SystemTime;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use directory::DirectorySources;
pub use memory::MemorySources;
pub use preload::PreloadReport;
pub use resolver::{Resolution, ResolvedTable, SourceResolver};

/// Result type for source operations.
pub type SourceResult<T> = Result<T, SourceError>;

/// Errors raised by source providers.
///
/// Absence is never an error: a table missing from a layer is simply not
/// listed.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("source provider failed: {0}")]
    Provider(String),
}

/// One layer of the override chain. Declaration order is precedence order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum SourceLayer {
    Base,
    Expansion1,
    Expansion2,
    EnhancedOverlay,
    Workshop,
    UserOverride,
    ModuleArchive,
    ModuleOverride,
}

impl SourceLayer {
    /// True for layers that only apply under a module context.
    pub fn is_module_layer(&self) -> bool {
        matches!(self, Self::ModuleArchive | Self::ModuleOverride)
    }
}

impl fmt::Display for SourceLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Base => "base",
            Self::Expansion1 => "expansion1",
            Self::Expansion2 => "expansion2",
            Self::EnhancedOverlay => "enhanced",
            Self::Workshop => "workshop",
            Self::UserOverride => "override",
            Self::ModuleArchive => "module-archive",
            Self::ModuleOverride => "module-override",
        };
        write!(f, "{}", name)
    }
}

/// Identifies one physical source. Ordered by layer, then by the declared
/// position within the layer.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SourceId {
    pub layer: SourceLayer,
    pub ordinal: usize,
    pub label: String,
}

impl SourceId {
    pub fn new(layer: SourceLayer, ordinal: usize, label: impl Into<String>) -> Self {
        Self {
            layer,
            ordinal,
            label: label.into(),
        }
    }
}

impl fmt::Display for SourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]:{}", self.layer, self.ordinal, self.label)
    }
}

/// One copy of a table found in one source.
#[derive(Debug, Clone)]
pub struct SourceCopy {
    pub id: SourceId,
    pub content: Vec<u8>,
    /// Backing file, when the source is a plain file.
    pub path: Option<PathBuf>,
    pub modified: Option<SystemTime>,
}

impl SourceCopy {
    pub fn new(id: SourceId, content: Vec<u8>) -> Self {
        Self {
            id,
            content,
            path: None,
            modified: None,
        }
    }
}

/// Active game module. Selects module layers and namespaces cache keys.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ModuleContext(String);

impl ModuleContext {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ModuleContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Locates every copy of a table across the layers.
#[async_trait]
pub trait SourceProvider: Send + Sync {
    /// Every copy of `table` visible under `module`, lowest precedence first.
    async fn list_sources(
        &self,
        table: &str,
        module: Option<&ModuleContext>,
    ) -> SourceResult<Vec<SourceCopy>>;

    /// Names of every table visible under `module`, lowercased and sorted.
    async fn list_tables(&self, module: Option<&ModuleContext>) -> SourceResult<Vec<String>>;
}

/// Supplies the host's current module, if any.
pub trait ModuleResolver: Send + Sync {
    fn resolve_current_module(&self) -> Option<ModuleContext>;
}

/// A module resolver that always returns the same answer.
#[derive(Debug, Clone, Default)]
pub struct FixedModule(pub Option<ModuleContext>);

impl ModuleResolver for FixedModule {
    fn resolve_current_module(&self) -> Option<ModuleContext> {
        self.0.clone()
    }
}

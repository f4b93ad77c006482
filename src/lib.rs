//! # Tessera
//!
//! A schema-on-read engine for layered game-rule tables.
//!
//! ## Architecture
//!
//! Tables arrive as `2DA` text from a stack of override layers. None of
//! them declares a schema; record types are synthesized from whatever
//! columns the winning copy carries.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │        Source Layers (base .. module override)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [source]
//! ┌─────────────────────────────────────────────────────────┐
//! │        ResolvedTable (highest-precedence parse)         │
//! │        + resolved cache (byte budget, preload)          │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [sanitize + schema]
//! ┌─────────────────────────────────────────────────────────┐
//! │        RecordSchema + Records                           │
//! │        + schema descriptor cache                        │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [relationships]
//! ┌─────────────────────────────────────────────────────────┐
//! │        Edges, ValidationReport, load order              │
//! └─────────────────────────────────────────────────────────┘
//!                          │
//!                          ▼ [store]
//! ┌─────────────────────────────────────────────────────────┐
//! │        TableStore (immutable, atomically published)     │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod cache;
pub mod config;
pub mod relationships;
pub mod sanitize;
pub mod schema;
pub mod source;
pub mod store;
pub mod table;

pub use store::{DataLayer, DataLayerBuilder, LoadError, LoadSummary, TableStore};

/// Re-exports for convenient usage.
pub mod prelude {
    pub use crate::config::Settings;
    pub use crate::relationships::{
        ColumnPurpose, ColumnPurposeProvider, Relationship, RelationshipKind, ValidationReport,
    };
    pub use crate::schema::{KeyMode, Record, RecordTable, StringResolver, TableView};
    pub use crate::source::{
        DirectorySources, MemorySources, ModuleContext, ModuleResolver, SourceLayer,
        SourceProvider,
    };
    pub use crate::store::{DataLayer, LoadSummary};
    pub use crate::table::{Cell, TableData};
}

//! Schema evolution tracking.
//!
//! The [`SchemaEvolutionTracker`] keeps a field-level history of every
//! version of a kind, the deprecations introduced along the way, and a
//! record of each migration planned or executed against it. Persistence is
//! behind [`SchemaStorage`].

pub mod error;
pub mod storage;
pub mod tracker;
pub mod types;

pub use error::EvolutionError;
pub use storage::{InMemorySchemaStorage, SchemaStorage, SledSchemaStorage};
pub use tracker::SchemaEvolutionTracker;
pub use types::{
    ChangeKind, DeprecatedPath, FieldChange, FieldDiff, FieldDiffKind, FieldInfo,
    MigrationRecord, MigrationReport, RecordStatus, SchemaEvolution, VersionInfo,
};

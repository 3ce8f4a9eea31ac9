//! CLI errors.

use std::path::PathBuf;
use thiserror::Error;

use kubeshift_core::{EvolutionError, MigrationError, ResourceType};

#[derive(Debug, Error)]
pub enum CliError {
    /// Fixture file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Fixture file is not a JSON array of resources.
    #[error("invalid fixtures in {path}: {source}")]
    Fixtures {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A `--rename` argument is not `from=to`.
    #[error("invalid field mapping '{0}', expected from=to")]
    Mapping(String),

    /// No fixture has the plan's source type.
    #[error("no resources of type {0} in fixtures")]
    NoResources(ResourceType),

    /// History database could not be opened.
    #[error("failed to open history database {path}: {source}")]
    Database {
        path: PathBuf,
        #[source]
        source: sled::Error,
    },

    #[error(transparent)]
    Migration(#[from] MigrationError),

    #[error(transparent)]
    History(#[from] EvolutionError),
}

impl CliError {
    /// Process exit code for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Migration(MigrationError::RiskTooHigh { .. })
            | CliError::Migration(MigrationError::ValidationFailed { .. }) => 3,
            _ => 1,
        }
    }
}

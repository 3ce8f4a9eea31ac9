//! Crate-level error type.

use thiserror::Error;

use crate::convert::ConversionError;
use crate::evolution::EvolutionError;
use crate::migration::{BackupError, MigrationError};
use crate::resource::ParseError;
use crate::status::StatusError;
use crate::store::StoreError;
use crate::version::VersionError;

/// Any error surfaced by this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// Plan-level migration failure.
    #[error(transparent)]
    Migration(#[from] MigrationError),

    /// Resource store failure.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Converter failure.
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// Status reporter misuse.
    #[error(transparent)]
    Status(#[from] StatusError),

    /// Schema history failure.
    #[error(transparent)]
    Evolution(#[from] EvolutionError),

    /// Backup store failure.
    #[error(transparent)]
    Backup(#[from] BackupError),

    /// Malformed resource type or identity.
    #[error(transparent)]
    Parse(#[from] ParseError),

    /// Malformed API version.
    #[error(transparent)]
    Version(#[from] VersionError),

    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

//! Schema tracker errors.

use thiserror::Error;

use crate::resource::GroupKind;

#[derive(Debug, Error)]
pub enum EvolutionError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Record could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// No history has been recorded for the kind.
    #[error("no schema history for {0}")]
    UnknownKind(GroupKind),

    /// The kind has history, but not for this version.
    #[error("no schema recorded for {kind} version {version}")]
    UnknownVersion { kind: GroupKind, version: String },
}

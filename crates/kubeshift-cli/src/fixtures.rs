//! Resource fixtures: a JSON array of resources loaded into an in-memory store.

use std::path::Path;

use kubeshift_core::{InMemoryResourceStore, Resource};

use crate::error::CliError;

pub fn load(path: &Path) -> Result<Vec<Resource>, CliError> {
    let content = std::fs::read_to_string(path).map_err(|source| CliError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    serde_json::from_str(&content).map_err(|source| CliError::Fixtures {
        path: path.to_path_buf(),
        source,
    })
}

/// Load fixtures into a fresh store. Objects without a uid get one.
pub fn load_store(path: &Path) -> Result<InMemoryResourceStore, CliError> {
    let resources = load(path)?;
    tracing::debug!(path = %path.display(), resources = resources.len(), "fixtures loaded");
    Ok(InMemoryResourceStore::with_resources(resources))
}

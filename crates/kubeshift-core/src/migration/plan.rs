//! Migration plans and the plan file format.
//!
//! A plan is the portable boundary between an independent planning phase
//! and execution. It serializes to a camelCase JSON document:
//!
//! ```json
//! {
//!   "sourceType": "observability.io/v1beta1/Platform",
//!   "targetType": "observability.io/v1/Platform",
//!   "resources": ["monitoring/platform", "team-a/platform"],
//!   "batchSize": 10,
//!   "dryRun": false,
//!   "parallel": true,
//!   "maxConcurrency": 3
//! }
//! ```

use super::error::MigrationError;
use crate::resource::{ResourceIdentity, ResourceType};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

/// Default resources per batch.
pub const DEFAULT_BATCH_SIZE: usize = 10;

/// Default conversions in flight within a batch.
pub const DEFAULT_MAX_CONCURRENCY: usize = 3;

fn default_batch_size() -> usize {
    DEFAULT_BATCH_SIZE
}

fn default_max_concurrency() -> usize {
    DEFAULT_MAX_CONCURRENCY
}

fn default_parallel() -> bool {
    true
}

/// An immutable description of a migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationPlan {
    pub source_type: ResourceType,
    pub target_type: ResourceType,
    /// Resources in execution order.
    pub resources: Vec<ResourceIdentity>,
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,
    #[serde(default)]
    pub dry_run: bool,
    #[serde(default = "default_parallel")]
    pub parallel: bool,
    #[serde(default = "default_max_concurrency")]
    pub max_concurrency: usize,
}

impl MigrationPlan {
    /// Create a plan with default batching and concurrency.
    pub fn new(
        source_type: ResourceType,
        target_type: ResourceType,
        resources: Vec<ResourceIdentity>,
    ) -> Self {
        Self {
            source_type,
            target_type,
            resources,
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            parallel: true,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    /// Check the plan's shape.
    pub fn validate(&self) -> Result<(), MigrationError> {
        if self.batch_size == 0 {
            return Err(MigrationError::invalid_plan("batch size must be at least 1"));
        }
        if self.max_concurrency == 0 {
            return Err(MigrationError::invalid_plan(
                "max concurrency must be at least 1",
            ));
        }
        if self.source_type == self.target_type {
            return Err(MigrationError::invalid_plan(format!(
                "source and target are both {}",
                self.source_type
            )));
        }
        if self.source_type.group_kind() != self.target_type.group_kind() {
            return Err(MigrationError::invalid_plan(format!(
                "cannot migrate {} to a different kind {}",
                self.source_type.group_kind(),
                self.target_type.group_kind()
            )));
        }

        let mut seen = BTreeSet::new();
        for identity in &self.resources {
            if !seen.insert(identity) {
                return Err(MigrationError::invalid_plan(format!(
                    "resource {identity} appears more than once"
                )));
            }
        }
        Ok(())
    }

    /// Conversions allowed in flight within one batch.
    pub fn effective_concurrency(&self) -> usize {
        if self.parallel {
            self.max_concurrency.max(1)
        } else {
            1
        }
    }

    /// Resources split into execution batches.
    pub fn batches(&self) -> std::slice::Chunks<'_, ResourceIdentity> {
        self.resources.chunks(self.batch_size.max(1))
    }

    pub fn batch_count(&self) -> usize {
        self.resources.len().div_ceil(self.batch_size.max(1))
    }

    /// Distinct namespaces referenced by the plan.
    pub fn namespaces(&self) -> BTreeSet<&str> {
        self.resources.iter().map(|id| id.namespace.as_str()).collect()
    }

    /// Same policy over a different resource list.
    pub fn with_resources(&self, resources: Vec<ResourceIdentity>) -> Self {
        Self {
            resources,
            ..self.clone()
        }
    }

    pub fn from_json(json: &str) -> Result<Self, MigrationError> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn to_json(&self) -> Result<String, MigrationError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Read and validate a plan file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, MigrationError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| MigrationError::PlanFile {
            path: path.to_path_buf(),
            source,
        })?;
        let plan = Self::from_json(&json)?;
        plan.validate()?;
        Ok(plan)
    }

    /// Write the plan as pretty-printed JSON.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<(), MigrationError> {
        let path = path.as_ref();
        std::fs::write(path, self.to_json()?).map_err(|source| MigrationError::PlanFile {
            path: path.to_path_buf(),
            source,
        })
    }
}

/// Options for building a plan from the store.
#[derive(Debug, Clone)]
pub struct PlanOptions {
    /// Restrict enumeration to one namespace.
    pub namespace: Option<String>,
    pub batch_size: usize,
    pub dry_run: bool,
    pub parallel: bool,
    pub max_concurrency: usize,
}

impl Default for PlanOptions {
    fn default() -> Self {
        Self {
            namespace: None,
            batch_size: DEFAULT_BATCH_SIZE,
            dry_run: false,
            parallel: true,
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
        }
    }
}

impl PlanOptions {
    pub fn with_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = Some(namespace.into());
        self
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size;
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }
}

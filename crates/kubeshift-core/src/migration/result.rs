//! Outcome of a migration run.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use super::diff::ResourceDiff;
use super::id::MigrationId;
use crate::convert::{ConversionError, DataLossEstimate};
use crate::resource::ResourceIdentity;
use crate::risk::RiskAnalysis;
use crate::status::ProgressCounts;
use crate::store::StoreError;
use crate::validation::ValidationReport;

use super::backup::BackupError;

/// Step at which a resource failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePhase {
    Fetch,
    Convert,
    Backup,
    Write,
    Restore,
}

impl fmt::Display for FailurePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailurePhase::Fetch => write!(f, "fetch"),
            FailurePhase::Convert => write!(f, "convert"),
            FailurePhase::Backup => write!(f, "backup"),
            FailurePhase::Write => write!(f, "write"),
            FailurePhase::Restore => write!(f, "restore"),
        }
    }
}

/// Category of a resource-level failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FailureKind {
    /// A bounded wait expired.
    Timeout,
    /// The write carried a stale resource version.
    Conflict,
    /// The store could not be reached.
    Unavailable,
    /// The converter rejected the resource.
    Conversion,
    /// The resource is at neither the source nor the target version.
    UnexpectedVersion,
    /// Backup storage failed.
    Backup,
    /// Any other store failure.
    Store,
}

/// Classifies errors from the steps of a resource migration.
pub(crate) trait StepError: fmt::Display {
    fn failure_kind(&self) -> FailureKind;

    fn is_retryable(&self) -> bool {
        matches!(
            self.failure_kind(),
            FailureKind::Timeout | FailureKind::Conflict | FailureKind::Unavailable
        )
    }
}

impl StepError for StoreError {
    fn failure_kind(&self) -> FailureKind {
        match self {
            StoreError::Conflict { .. } => FailureKind::Conflict,
            StoreError::Unavailable(_) => FailureKind::Unavailable,
            _ => FailureKind::Store,
        }
    }
}

impl StepError for ConversionError {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Conversion
    }
}

impl StepError for BackupError {
    fn failure_kind(&self) -> FailureKind {
        FailureKind::Backup
    }
}

/// Why a single resource did not migrate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceFailure {
    pub resource: ResourceIdentity,
    pub phase: FailurePhase,
    pub kind: FailureKind,
    pub message: String,
    pub retryable: bool,
    /// Attempts made, including the failing one.
    pub attempts: u32,
}

impl ResourceFailure {
    pub fn new(
        resource: ResourceIdentity,
        phase: FailurePhase,
        kind: FailureKind,
        message: impl Into<String>,
    ) -> Self {
        Self {
            resource,
            phase,
            kind,
            message: message.into(),
            retryable: false,
            attempts: 1,
        }
    }

    pub(crate) fn from_step<E: StepError>(
        resource: &ResourceIdentity,
        phase: FailurePhase,
        error: &E,
    ) -> Self {
        Self {
            resource: resource.clone(),
            phase,
            kind: error.failure_kind(),
            message: error.to_string(),
            retryable: error.is_retryable(),
            attempts: 1,
        }
    }

    pub(crate) fn timeout(resource: &ResourceIdentity, phase: FailurePhase, after: Duration) -> Self {
        Self {
            resource: resource.clone(),
            phase,
            kind: FailureKind::Timeout,
            message: format!("{phase} timed out after {after:?}"),
            retryable: true,
            attempts: 1,
        }
    }
}

impl fmt::Display for ResourceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed during {}: {}", self.resource, self.phase, self.message)
    }
}

/// Why a resource was skipped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SkipReason {
    NotFound,
    AlreadyMigrated,
}

/// What a dry run would have written for one resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DryRunOutcome {
    pub resource: ResourceIdentity,
    pub diff: ResourceDiff,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data_loss: Option<DataLossEstimate>,
    pub cache_hit: bool,
}

/// Final summary of an `execute` call.
///
/// When the run completes, `successful_count + failed_count + skipped_count
/// == total_resources`. A cancelled run only counts resources that finished.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationResult {
    pub migration_id: MigrationId,
    pub total_resources: usize,
    pub successful_count: usize,
    pub failed_count: usize,
    pub skipped_count: usize,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
    pub errors: Vec<ResourceFailure>,
    pub migrated: Vec<ResourceIdentity>,
    pub skipped: Vec<(ResourceIdentity, SkipReason)>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dry_run_outcomes: Vec<DryRunOutcome>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_validation: Option<ValidationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_validation: Option<ValidationReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub risk: Option<RiskAnalysis>,
    pub cache_hits: usize,
    pub dry_run: bool,
    pub cancelled: bool,
}

impl MigrationResult {
    pub fn new(migration_id: MigrationId, total_resources: usize, dry_run: bool) -> Self {
        Self {
            migration_id,
            total_resources,
            successful_count: 0,
            failed_count: 0,
            skipped_count: 0,
            duration: Duration::ZERO,
            errors: Vec::new(),
            migrated: Vec::new(),
            skipped: Vec::new(),
            dry_run_outcomes: Vec::new(),
            pre_validation: None,
            post_validation: None,
            risk: None,
            cache_hits: 0,
            dry_run,
            cancelled: false,
        }
    }

    pub fn processed_count(&self) -> usize {
        self.successful_count + self.failed_count + self.skipped_count
    }

    /// Whether every resource reached a terminal outcome.
    pub fn is_complete(&self) -> bool {
        !self.cancelled && self.processed_count() == self.total_resources
    }

    /// Completed without any failure and without being cancelled.
    pub fn is_success(&self) -> bool {
        self.is_complete() && self.failed_count == 0
    }

    /// Counters in the form the status reporter consumes.
    pub fn counts(&self) -> ProgressCounts {
        ProgressCounts {
            successful: self.successful_count,
            failed: self.failed_count,
            skipped: self.skipped_count,
        }
    }

    pub fn failure_for(&self, resource: &ResourceIdentity) -> Option<&ResourceFailure> {
        self.errors.iter().find(|f| &f.resource == resource)
    }
}

mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

/// Outcome of a rollback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RollbackSummary {
    pub migration_id: MigrationId,
    /// Restored over an existing object.
    pub restored: Vec<ResourceIdentity>,
    /// Recreated because the object no longer existed.
    pub recreated: Vec<ResourceIdentity>,
    pub failures: Vec<ResourceFailure>,
    #[serde(with = "duration_millis")]
    pub duration: Duration,
}

impl RollbackSummary {
    pub fn new(migration_id: MigrationId) -> Self {
        Self {
            migration_id,
            restored: Vec::new(),
            recreated: Vec::new(),
            failures: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn restored_count(&self) -> usize {
        self.restored.len() + self.recreated.len()
    }
}

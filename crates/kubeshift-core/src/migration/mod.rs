//! Migration planning and execution.
//!
//! A [`MigrationPlan`] is built by [`MigrationExecutor::plan_migration`] or
//! loaded from a plan file, executed batch by batch with
//! [`MigrationExecutor::execute`], and undone from [`Backup`]s with
//! [`MigrationExecutor::rollback`].

pub mod backup;
pub mod config;
pub mod diff;
pub mod error;
pub mod executor;
pub mod id;
pub mod plan;
pub mod result;

pub use backup::{Backup, BackupError, BackupProvenance, BackupStore, InMemoryBackupStore, SledBackupStore};
pub use config::{MigrationConfig, RetryPolicy, DEFAULT_INITIAL_BACKOFF, DEFAULT_MAX_BACKOFF};
pub use diff::{ChangedField, FieldChangeKind, ResourceDiff};
pub use error::MigrationError;
pub use executor::MigrationExecutor;
pub use id::MigrationId;
pub use plan::{MigrationPlan, PlanOptions, DEFAULT_BATCH_SIZE, DEFAULT_MAX_CONCURRENCY};
pub use result::{
    DryRunOutcome, FailureKind, FailurePhase, MigrationResult, ResourceFailure, RollbackSummary,
    SkipReason,
};

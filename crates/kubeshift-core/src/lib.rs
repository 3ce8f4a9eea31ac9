//! kubeshift core - validation, ordering, execution and tracking of custom
//! resource schema migrations.
//!
//! A caller builds a [`MigrationPlan`], scores it with the [`RiskAnalyzer`],
//! and hands it to the [`MigrationExecutor`] together with a
//! [`MigrationContext`]. The executor pre-validates through the
//! [`ValidationEngine`], orders and memoizes through the
//! [`ConversionOptimizer`], reports live progress through a
//! [`StatusReporter`], and records the run with the
//! [`SchemaEvolutionTracker`].

pub mod convert;
pub mod error;
pub mod evolution;
pub mod labels;
pub mod migration;
pub mod optimize;
pub mod resource;
pub mod risk;
pub mod status;
pub mod store;
pub mod validation;
pub mod version;

pub use convert::{Conversion, ConversionError, Converter, DataLossEstimate, FieldMappingConverter};
pub use error::{Error, Result};
pub use evolution::{
    ChangeKind, DeprecatedPath, EvolutionError, FieldChange, FieldDiff, FieldInfo,
    InMemorySchemaStorage, MigrationRecord, MigrationReport, RecordStatus, SchemaEvolution,
    SchemaEvolutionTracker, SchemaStorage, SledSchemaStorage, VersionInfo,
};
pub use migration::{
    Backup, BackupError, BackupStore, DryRunOutcome, FailureKind, FailurePhase,
    InMemoryBackupStore, MigrationConfig, MigrationError, MigrationExecutor, MigrationId,
    MigrationPlan, MigrationResult, PlanOptions, ResourceDiff, ResourceFailure, RetryPolicy,
    RollbackSummary, SledBackupStore,
};
pub use optimize::{ConversionCache, ConversionOptimizer, DependencyClass, OptimizerConfig, OrderingStrategy};
pub use resource::{GroupKind, ObjectMeta, Resource, ResourceIdentity, ResourceType};
pub use risk::{RiskAnalysis, RiskAnalyzer, RiskFactor, RiskFactorKind, RiskLevel};
pub use status::{
    ChannelStatusHandler, MigrationContext, MigrationPhase, MigrationStatus, ReporterConfig,
    ResourceState, StatusHandler, StatusRegistry, StatusReporter, TracingStatusHandler,
};
pub use store::{InMemoryResourceStore, ResourceStore, StoreError};
pub use validation::{Severity, ValidationEngine, ValidationReport, ValidationRule};
pub use version::{ApiVersion, Stability};

/// Microseconds since the Unix epoch.
pub(crate) fn current_timestamp() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_micros() as u64)
        .unwrap_or_default()
}

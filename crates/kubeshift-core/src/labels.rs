//! Well-known label and annotation keys.

/// Label stamped on every resource written by a migration.
pub const MIGRATED_LABEL: &str = "migration.kubeshift.io/migrated";

/// Annotation recording the version a resource was migrated from.
pub const SOURCE_VERSION_ANNOTATION: &str = "migration.kubeshift.io/source-version";

/// Annotation recording the uid observed before the migration write.
pub const ORIGINAL_UID_ANNOTATION: &str = "migration.kubeshift.io/original-uid";

/// Annotation present when the pre-migration resource carried a status.
pub const HAD_STATUS_ANNOTATION: &str = "migration.kubeshift.io/had-status";

/// Annotation recording the migration id that last wrote the resource.
pub const MIGRATION_ID_ANNOTATION: &str = "migration.kubeshift.io/migration-id";

/// Annotation marking a resource as stored at a deprecated API version.
pub const DEPRECATED_VERSION_ANNOTATION: &str = "deprecated.kubernetes.io/api-version";

/// Explicit dependency class used when ordering a batch.
///
/// Accepted values: `configmap`, `secret`, `service`, `workload`, `other`.
pub const DEPENDENCY_CLASS_LABEL: &str = "kubeshift.io/dependency-class";

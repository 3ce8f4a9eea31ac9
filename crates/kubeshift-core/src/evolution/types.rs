//! Schema history data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::migration::{MigrationId, MigrationPlan, MigrationResult};
use crate::resource::GroupKind;

/// A field as declared by one schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldInfo {
    /// Declared type, e.g. `string` or `object`.
    pub field_type: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,
    #[serde(default)]
    pub deprecated: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement: Option<String>,
}

impl FieldInfo {
    pub fn new(field_type: impl Into<String>) -> Self {
        Self {
            field_type: field_type.into(),
            description: String::new(),
            deprecated: false,
            replacement: None,
        }
    }
}

/// Field set of one schema version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionInfo {
    pub version: String,
    pub recorded_at: DateTime<Utc>,
    /// Fields keyed by dotted path.
    pub fields: BTreeMap<String, FieldInfo>,
}

/// What happened to a field between two versions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ChangeKind {
    Added {
        field_type: String,
        #[serde(default)]
        description: String,
    },
    Removed,
    Modified {
        field_type: String,
    },
    Deprecated {
        /// Path that replaces the deprecated one, if any.
        #[serde(default)]
        replacement: Option<String>,
        /// Version in which the field is expected to disappear.
        #[serde(default)]
        removed_in: Option<String>,
        /// Migration hint shown to users.
        #[serde(default)]
        hint: String,
    },
}

/// One recorded field change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldChange {
    pub path: String,
    #[serde(flatten)]
    pub kind: ChangeKind,
}

impl FieldChange {
    pub fn added(path: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Added {
                field_type: field_type.into(),
                description: String::new(),
            },
        }
    }

    pub fn removed(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Removed,
        }
    }

    pub fn modified(path: impl Into<String>, field_type: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Modified {
                field_type: field_type.into(),
            },
        }
    }

    pub fn deprecated(
        path: impl Into<String>,
        replacement: Option<&str>,
        hint: impl Into<String>,
    ) -> Self {
        Self {
            path: path.into(),
            kind: ChangeKind::Deprecated {
                replacement: replacement.map(str::to_string),
                removed_in: None,
                hint: hint.into(),
            },
        }
    }
}

/// A deprecated field path with its migration guidance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeprecatedPath {
    pub path: String,
    pub deprecated_since: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub removed_in: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_path: Option<String>,
    #[serde(default)]
    pub hint: String,
}

/// Outcome class of a recorded migration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordStatus {
    Planned,
    Completed,
    Failed,
    PartiallyCompleted,
}

impl RecordStatus {
    /// Classify a finished run.
    pub fn of(result: &MigrationResult) -> Self {
        if result.failed_count == 0 && !result.cancelled {
            RecordStatus::Completed
        } else if result.successful_count == 0 && result.failed_count > 0 {
            RecordStatus::Failed
        } else {
            RecordStatus::PartiallyCompleted
        }
    }
}

impl fmt::Display for RecordStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RecordStatus::Planned => "Planned",
            RecordStatus::Completed => "Completed",
            RecordStatus::Failed => "Failed",
            RecordStatus::PartiallyCompleted => "PartiallyCompleted",
        };
        f.write_str(name)
    }
}

/// History entry for one planned or executed migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migration_id: Option<MigrationId>,
    pub group_kind: GroupKind,
    pub from_version: String,
    pub to_version: String,
    pub recorded_at: DateTime<Utc>,
    pub status: RecordStatus,
    pub total_resources: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub duration_ms: u64,
    pub dry_run: bool,
}

impl MigrationRecord {
    pub fn planned(plan: &MigrationPlan) -> Self {
        Self {
            migration_id: None,
            group_kind: plan.source_type.group_kind(),
            from_version: plan.source_type.version.clone(),
            to_version: plan.target_type.version.clone(),
            recorded_at: Utc::now(),
            status: RecordStatus::Planned,
            total_resources: plan.resources.len(),
            successful: 0,
            failed: 0,
            skipped: 0,
            duration_ms: 0,
            dry_run: plan.dry_run,
        }
    }

    pub fn finished(plan: &MigrationPlan, result: &MigrationResult) -> Self {
        Self {
            migration_id: Some(result.migration_id),
            status: RecordStatus::of(result),
            successful: result.successful_count,
            failed: result.failed_count,
            skipped: result.skipped_count,
            duration_ms: result.duration.as_millis() as u64,
            dry_run: result.dry_run,
            ..Self::planned(plan)
        }
    }
}

/// Recorded history of one kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemaEvolution {
    pub group_kind: GroupKind,
    /// Versions in the order they were first recorded.
    pub versions: Vec<VersionInfo>,
    pub migrations: Vec<MigrationRecord>,
    pub deprecated_paths: Vec<DeprecatedPath>,
    pub current_version: Option<String>,
}

impl SchemaEvolution {
    pub fn new(group_kind: GroupKind) -> Self {
        Self {
            group_kind,
            versions: Vec::new(),
            migrations: Vec::new(),
            deprecated_paths: Vec::new(),
            current_version: None,
        }
    }

    pub fn version(&self, version: &str) -> Option<&VersionInfo> {
        self.versions.iter().find(|v| v.version == version)
    }

    pub(crate) fn version_index(&self, version: &str) -> Option<usize> {
        self.versions.iter().position(|v| v.version == version)
    }
}

/// How a field differs between two recorded versions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FieldDiffKind {
    Added,
    Removed,
    TypeModified,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldDiff {
    pub path: String,
    pub kind: FieldDiffKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub to_type: Option<String>,
}

/// Field-level comparison of two versions of a kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub group_kind: GroupKind,
    pub from_version: String,
    pub to_version: String,
    pub generated_at: DateTime<Utc>,
    /// Sorted by path.
    pub changes: Vec<FieldDiff>,
    pub newly_deprecated: Vec<DeprecatedPath>,
    pub recommendations: Vec<String>,
}

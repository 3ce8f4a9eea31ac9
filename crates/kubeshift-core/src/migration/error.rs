//! Migration error types.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

use super::backup::BackupError;
use crate::resource::ResourceType;
use crate::risk::RiskLevel;
use crate::status::StatusError;
use crate::store::StoreError;
use crate::validation::ValidationReport;

/// Plan-level migration errors.
///
/// Per-resource failures are never reported through this type; they are
/// collected in the run's result instead.
#[derive(Debug, Error)]
pub enum MigrationError {
    /// The plan is malformed.
    #[error("invalid plan: {reason}")]
    InvalidPlan {
        /// What is wrong with the plan.
        reason: String,
    },

    /// Resources of the source type could not be listed.
    #[error("failed to enumerate {resource_type}: {source}")]
    Enumerate {
        /// Type being listed.
        resource_type: ResourceType,
        #[source]
        source: StoreError,
    },

    /// Plan risk exceeds what is allowed without force.
    #[error("plan risk is {level}, above the allowed {allowed}; use force to proceed")]
    RiskTooHigh {
        /// Assessed level.
        level: RiskLevel,
        /// Configured maximum.
        allowed: RiskLevel,
    },

    /// Pre-migration validation found errors.
    #[error("pre-migration validation failed with {failed_checks} failing check(s)")]
    ValidationFailed {
        /// Number of failed checks.
        failed_checks: usize,
        /// The full report.
        report: Box<ValidationReport>,
    },

    /// A bounded wait expired.
    #[error("{operation} timed out after {after:?}")]
    Timeout {
        /// What was being waited for.
        operation: String,
        /// The bound that expired.
        after: Duration,
    },

    /// The run was cancelled before it could start.
    #[error("migration cancelled")]
    Cancelled,

    /// Reporter misuse.
    #[error("status error: {0}")]
    Status(#[from] StatusError),

    /// Backup store failure.
    #[error("backup error: {0}")]
    Backup(#[from] BackupError),

    /// Plan file could not be read or written.
    #[error("plan file {path}: {source}")]
    PlanFile {
        /// File path.
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Plan document could not be parsed or produced.
    #[error("plan serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl MigrationError {
    pub fn invalid_plan(reason: impl Into<String>) -> Self {
        MigrationError::InvalidPlan {
            reason: reason.into(),
        }
    }

    /// Whether the error is the caller's to fix by adjusting input or forcing.
    pub fn is_blocking_gate(&self) -> bool {
        matches!(
            self,
            MigrationError::RiskTooHigh { .. } | MigrationError::ValidationFailed { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MigrationError::RiskTooHigh {
            level: RiskLevel::High,
            allowed: RiskLevel::Medium,
        };
        assert_eq!(
            err.to_string(),
            "plan risk is high, above the allowed medium; use force to proceed"
        );
        assert!(err.is_blocking_gate());

        let err = MigrationError::invalid_plan("batch size must be at least 1");
        assert_eq!(err.to_string(), "invalid plan: batch size must be at least 1");
        assert!(!err.is_blocking_gate());
    }

    #[test]
    fn test_enumerate_keeps_source() {
        use std::error::Error as _;
        let err = MigrationError::Enumerate {
            resource_type: ResourceType::new("g", "v1", "K"),
            source: StoreError::Unavailable("down".to_string()),
        };
        assert!(err.source().is_some());
        assert!(err.to_string().contains("g/v1/K"));
    }
}

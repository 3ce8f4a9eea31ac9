//! The validation rule seam.

use super::report::Severity;
use crate::resource::Resource;
use async_trait::async_trait;
use thiserror::Error;

/// Why a rule rejected a resource.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct RuleFailure {
    pub message: String,
}

impl RuleFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// An independent predicate over a single resource.
#[async_trait]
pub trait ValidationRule: Send + Sync {
    /// Stable rule name, reported with every failure.
    fn name(&self) -> &str;

    fn description(&self) -> &str;

    /// Severity attached to failures of this rule.
    fn severity(&self) -> Severity {
        Severity::Medium
    }

    /// Suggested fix attached to failures of this rule.
    fn remediation(&self) -> &str {
        "Fix the issue before proceeding with migration"
    }

    async fn validate(&self, resource: &Resource) -> Result<(), RuleFailure>;
}

//! Validation report types.

use crate::resource::{GroupKind, ResourceIdentity};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// How serious a failing rule is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Low => write!(f, "low"),
            Severity::Medium => write!(f, "medium"),
            Severity::High => write!(f, "high"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// One failing rule against one resource.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationError {
    pub resource: ResourceIdentity,
    pub rule: String,
    pub message: String,
    pub severity: Severity,
    pub remediation: String,
}

/// A non-blocking finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationWarning {
    pub resource: ResourceIdentity,
    pub rule: String,
    pub message: String,
}

/// Per-kind tally of validated resources.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationSummary {
    pub total_resources: usize,
    pub valid_resources: usize,
    pub invalid_resources: usize,
    pub errors: usize,
    pub warnings: usize,
}

/// Everything learned about one resource, merged into a report at once.
#[derive(Debug, Clone)]
pub(crate) struct ResourceOutcome {
    pub kind: GroupKind,
    pub passed: usize,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
}

impl ResourceOutcome {
    pub fn new(kind: GroupKind) -> Self {
        Self {
            kind,
            passed: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }
}

/// Result of validating a plan.
///
/// `valid` is kept equal to `failed_checks == 0`; warnings never affect it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub valid: bool,
    pub total_checks: usize,
    pub passed_checks: usize,
    pub failed_checks: usize,
    pub errors: Vec<ValidationError>,
    pub warnings: Vec<ValidationWarning>,
    /// Keyed by the kind's display form (`Kind.group`).
    pub summary: BTreeMap<String, ValidationSummary>,
    /// Set when validation stopped early on cancellation.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub interrupted: bool,
}

impl Default for ValidationReport {
    fn default() -> Self {
        Self::new()
    }
}

impl ValidationReport {
    pub fn new() -> Self {
        Self {
            valid: true,
            total_checks: 0,
            passed_checks: 0,
            failed_checks: 0,
            errors: Vec::new(),
            warnings: Vec::new(),
            summary: BTreeMap::new(),
            interrupted: false,
        }
    }

    /// Record a passing check.
    pub fn record_pass(&mut self) {
        self.total_checks += 1;
        self.passed_checks += 1;
    }

    /// Record a failing check.
    pub fn record_error(&mut self, error: ValidationError) {
        self.total_checks += 1;
        self.failed_checks += 1;
        self.errors.push(error);
        self.valid = false;
    }

    /// Record a warning. Does not count as a check.
    pub fn record_warning(&mut self, warning: ValidationWarning) {
        self.warnings.push(warning);
    }

    pub(crate) fn merge(&mut self, outcome: ResourceOutcome) {
        let entry = self.summary.entry(outcome.kind.to_string()).or_default();
        entry.total_resources += 1;
        if outcome.errors.is_empty() {
            entry.valid_resources += 1;
        } else {
            entry.invalid_resources += 1;
        }
        entry.errors += outcome.errors.len();
        entry.warnings += outcome.warnings.len();

        for _ in 0..outcome.passed {
            self.record_pass();
        }
        for error in outcome.errors {
            self.record_error(error);
        }
        for warning in outcome.warnings {
            self.record_warning(warning);
        }
    }

    pub fn is_valid(&self) -> bool {
        self.failed_checks == 0
    }

    /// Whether this report stops a migration from proceeding.
    ///
    /// Warnings alone never block; errors block unless `force` is set.
    pub fn blocks(&self, force: bool) -> bool {
        !self.is_valid() && !force
    }

    /// Highest severity among the recorded errors.
    pub fn max_severity(&self) -> Option<Severity> {
        self.errors.iter().map(|e| e.severity).max()
    }

    pub fn errors_for(&self, resource: &ResourceIdentity) -> Vec<&ValidationError> {
        self.errors.iter().filter(|e| &e.resource == resource).collect()
    }

    pub fn warnings_for(&self, resource: &ResourceIdentity) -> Vec<&ValidationWarning> {
        self.warnings.iter().filter(|w| &w.resource == resource).collect()
    }
}

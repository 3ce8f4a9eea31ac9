//! Validation engine.
//!
//! Runs pluggable rules against every resource of a plan, before and after
//! a migration, and aggregates the findings into a [`ValidationReport`].
//!
//! | Stage | Rules | Failure severity |
//! |-------|-------|------------------|
//! | Pre-migration | per kind, fallback: existence + schema-shape | rule-defined, Medium by default |
//! | Post-migration | data-integrity, resource-consistency, status-shape | High |
//!
//! A resource missing from the store is a warning, never an error.
//! Warnings never affect validity.

pub mod engine;
pub mod report;
pub mod rule;
pub mod rules;

pub use engine::{ValidationConfig, ValidationEngine, DEFAULT_VALIDATION_CONCURRENCY};
pub use report::{Severity, ValidationError, ValidationReport, ValidationSummary, ValidationWarning};
pub use rule::{RuleFailure, ValidationRule};
pub use rules::{
    DataIntegrityRule, JsonKind, QuotaShapeRule, RequiredFieldsRule, ResourceConsistencyRule,
    ResourceExistsRule, SchemaConformanceRule, SchemaShapeRule, StatusShapeRule,
    VersionCompatibilityRule,
};

//! Concurrent rule evaluation over a plan's resources.

use super::report::{ResourceOutcome, Severity, ValidationError, ValidationReport, ValidationWarning};
use super::rule::ValidationRule;
use super::rules::{
    DataIntegrityRule, QuotaShapeRule, RequiredFieldsRule, ResourceConsistencyRule,
    ResourceExistsRule, SchemaConformanceRule, SchemaShapeRule, StatusShapeRule,
    VersionCompatibilityRule,
};
use crate::migration::MigrationPlan;
use crate::resource::{GroupKind, ResourceIdentity, ResourceType};
use crate::store::ResourceStore;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Default number of resources validated at once.
pub const DEFAULT_VALIDATION_CONCURRENCY: usize = 10;

/// Validation engine configuration.
#[derive(Debug, Clone)]
pub struct ValidationConfig {
    /// Upper bound on concurrent store fetches.
    pub max_concurrency: usize,
    /// Bound on each store fetch.
    pub fetch_timeout: Option<Duration>,
}

impl Default for ValidationConfig {
    fn default() -> Self {
        Self {
            max_concurrency: DEFAULT_VALIDATION_CONCURRENCY,
            fetch_timeout: None,
        }
    }
}

impl ValidationConfig {
    pub fn with_max_concurrency(mut self, max_concurrency: usize) -> Self {
        self.max_concurrency = max_concurrency;
        self
    }

    pub fn with_fetch_timeout(mut self, timeout: Duration) -> Self {
        self.fetch_timeout = Some(timeout);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stage {
    Pre,
    Post,
}

type RuleList = Vec<Arc<dyn ValidationRule>>;

/// Runs pre- and post-migration rules against a plan.
///
/// Pre-migration rules are registered per kind, in order; kinds without
/// registered rules fall back to existence and schema-shape checks.
/// Post-migration rules apply to every kind.
pub struct ValidationEngine {
    store: Arc<dyn ResourceStore>,
    config: ValidationConfig,
    rules: HashMap<GroupKind, RuleList>,
    fallback: RuleList,
    post: RuleList,
}

impl ValidationEngine {
    pub fn new(store: Arc<dyn ResourceStore>) -> Self {
        Self::with_config(store, ValidationConfig::default())
    }

    pub fn with_config(store: Arc<dyn ResourceStore>, config: ValidationConfig) -> Self {
        Self {
            store,
            config,
            rules: HashMap::new(),
            fallback: vec![Arc::new(ResourceExistsRule), Arc::new(SchemaShapeRule)],
            post: vec![
                Arc::new(DataIntegrityRule),
                Arc::new(ResourceConsistencyRule),
                Arc::new(StatusShapeRule),
            ],
        }
    }

    /// Append a pre-migration rule for a kind.
    pub fn register_rule(&mut self, kind: GroupKind, rule: Arc<dyn ValidationRule>) {
        self.rules.entry(kind).or_default().push(rule);
    }

    /// Append a post-migration rule applied to every kind.
    pub fn register_post_rule(&mut self, rule: Arc<dyn ValidationRule>) {
        self.post.push(rule);
    }

    /// Register the default pre-migration rule set for a resource type.
    pub fn register_default_rules(&mut self, resource_type: &ResourceType) {
        let kind = resource_type.group_kind();
        self.register_rule(kind.clone(), Arc::new(ResourceExistsRule));
        self.register_rule(kind.clone(), Arc::new(VersionCompatibilityRule));
        self.register_rule(kind.clone(), Arc::new(QuotaShapeRule::default()));
        self.register_rule(
            kind.clone(),
            Arc::new(RequiredFieldsRule::new(["spec.components"])),
        );
        self.register_rule(
            kind,
            Arc::new(SchemaConformanceRule::new(resource_type.clone())),
        );
    }

    /// Names of the pre-migration rules that apply to a kind, in order.
    pub fn rule_names(&self, kind: &GroupKind) -> Vec<String> {
        self.rules_for(Stage::Pre, kind)
            .iter()
            .map(|rule| rule.name().to_string())
            .collect()
    }

    /// Check every planned resource at the source type.
    pub async fn validate_pre_migration(
        &self,
        plan: &MigrationPlan,
        cancel: &CancellationToken,
    ) -> ValidationReport {
        self.run(plan, &plan.resources, Stage::Pre, cancel).await
    }

    /// Check every planned resource at the target type.
    pub async fn validate_post_migration(
        &self,
        plan: &MigrationPlan,
        cancel: &CancellationToken,
    ) -> ValidationReport {
        self.run(plan, &plan.resources, Stage::Post, cancel).await
    }

    /// Post-migration check restricted to a subset of the plan.
    pub async fn validate_post_migration_of(
        &self,
        plan: &MigrationPlan,
        resources: &[ResourceIdentity],
        cancel: &CancellationToken,
    ) -> ValidationReport {
        self.run(plan, resources, Stage::Post, cancel).await
    }

    async fn run(
        &self,
        plan: &MigrationPlan,
        resources: &[ResourceIdentity],
        stage: Stage,
        cancel: &CancellationToken,
    ) -> ValidationReport {
        let report = Mutex::new(ValidationReport::new());
        let width = self.config.max_concurrency.max(1);

        let mut checks = stream::iter(resources)
            .map(|identity| {
                let report = &report;
                async move {
                    let outcome = self.check_resource(plan, identity, stage).await;
                    report.lock().merge(outcome);
                }
            })
            .buffer_unordered(width);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    tracing::warn!(stage = ?stage, "validation cancelled");
                    report.lock().interrupted = true;
                    break;
                }
                next = checks.next() => {
                    if next.is_none() {
                        break;
                    }
                }
            }
        }
        drop(checks);

        let report = report.into_inner();
        tracing::debug!(
            stage = ?stage,
            total = report.total_checks,
            failed = report.failed_checks,
            warnings = report.warnings.len(),
            "validation finished"
        );
        report
    }

    async fn check_resource(
        &self,
        plan: &MigrationPlan,
        identity: &ResourceIdentity,
        stage: Stage,
    ) -> ResourceOutcome {
        let resource_type = match stage {
            Stage::Pre => &plan.source_type,
            Stage::Post => &plan.target_type,
        };
        let kind = resource_type.group_kind();
        let mut outcome = ResourceOutcome::new(kind.clone());

        let fetch = self.store.get(resource_type, identity);
        let fetched = match self.config.fetch_timeout {
            Some(limit) => match tokio::time::timeout(limit, fetch).await {
                Ok(fetched) => fetched,
                Err(_) => {
                    outcome.errors.push(ValidationError {
                        resource: identity.clone(),
                        rule: "fetch-timeout".to_string(),
                        message: format!("fetch timed out after {limit:?}"),
                        severity: Severity::Critical,
                        remediation: "Raise the fetch timeout or retry when the resource store is less loaded"
                            .to_string(),
                    });
                    return outcome;
                }
            },
            None => fetch.await,
        };

        let resource = match fetched {
            Ok(resource) => resource,
            Err(e) if e.is_not_found() => {
                outcome.warnings.push(ValidationWarning {
                    resource: identity.clone(),
                    rule: "resource-exists".to_string(),
                    message: format!("{kind} {identity} not found; it will be skipped"),
                });
                return outcome;
            }
            Err(e) => {
                outcome.errors.push(ValidationError {
                    resource: identity.clone(),
                    rule: "resource-exists".to_string(),
                    message: format!("failed to fetch resource: {e}"),
                    severity: Severity::Critical,
                    remediation: "Check connectivity to the resource store and retry".to_string(),
                });
                return outcome;
            }
        };

        if stage == Stage::Pre && resource.resource_type == plan.target_type {
            outcome.warnings.push(ValidationWarning {
                resource: identity.clone(),
                rule: "already-migrated".to_string(),
                message: format!("already at {}; it will be skipped", plan.target_type),
            });
            return outcome;
        }

        if stage == Stage::Post && resource.resource_type != plan.target_type {
            outcome.errors.push(ValidationError {
                resource: identity.clone(),
                rule: "target-version".to_string(),
                message: format!(
                    "stored at {}, expected {}",
                    resource.resource_type, plan.target_type
                ),
                severity: Severity::High,
                remediation: "Re-run the migration for this resource".to_string(),
            });
            return outcome;
        }

        for rule in self.rules_for(stage, &kind) {
            match rule.validate(&resource).await {
                Ok(()) => outcome.passed += 1,
                Err(failure) => outcome.errors.push(ValidationError {
                    resource: identity.clone(),
                    rule: rule.name().to_string(),
                    message: failure.message,
                    severity: rule.severity(),
                    remediation: rule.remediation().to_string(),
                }),
            }
        }
        outcome
    }

    fn rules_for(&self, stage: Stage, kind: &GroupKind) -> &[Arc<dyn ValidationRule>] {
        match stage {
            Stage::Pre => self.rules.get(kind).unwrap_or(&self.fallback).as_slice(),
            Stage::Post => self.post.as_slice(),
        }
    }
}

//! Plan construction, batch execution and rollback.

use std::collections::{BTreeMap, BTreeSet};
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use tokio_util::sync::CancellationToken;

use super::backup::{Backup, BackupStore, InMemoryBackupStore};
use super::config::MigrationConfig;
use super::diff::ResourceDiff;
use super::error::MigrationError;
use super::id::MigrationId;
use super::plan::{MigrationPlan, PlanOptions};
use super::result::{
    DryRunOutcome, FailureKind, FailurePhase, MigrationResult, ResourceFailure, RollbackSummary,
    SkipReason, StepError,
};
use crate::convert::Converter;
use crate::evolution::SchemaEvolutionTracker;
use crate::labels::{
    HAD_STATUS_ANNOTATION, MIGRATED_LABEL, MIGRATION_ID_ANNOTATION, ORIGINAL_UID_ANNOTATION,
    SOURCE_VERSION_ANNOTATION,
};
use crate::optimize::ConversionOptimizer;
use crate::resource::{Resource, ResourceIdentity, ResourceType};
use crate::risk::RiskAnalyzer;
use crate::status::{MigrationContext, MigrationPhase, ResourceState, StatusError, StatusReporter};
use crate::store::ResourceStore;
use crate::validation::ValidationEngine;

/// Terminal outcome of one resource within a run.
enum Outcome {
    Migrated { cache_hit: bool },
    DryRun(DryRunOutcome),
    Skipped(SkipReason),
    Failed(ResourceFailure),
    Cancelled,
}

/// Result of a bounded store or converter call.
enum Step<T> {
    Done(T),
    TimedOut(Duration),
    Cancelled,
}

impl<T, E: StepError> Step<Result<T, E>> {
    /// `Ok(None)` means the run was cancelled while waiting.
    fn resolve(
        self,
        identity: &ResourceIdentity,
        phase: FailurePhase,
    ) -> Result<Option<T>, ResourceFailure> {
        match self {
            Step::Done(Ok(value)) => Ok(Some(value)),
            Step::Done(Err(e)) => Err(ResourceFailure::from_step(identity, phase, &e)),
            Step::TimedOut(after) => Err(ResourceFailure::timeout(identity, phase, after)),
            Step::Cancelled => Ok(None),
        }
    }
}

/// Per-run state shared by the resource tasks.
struct Run<'a> {
    id: MigrationId,
    plan: &'a MigrationPlan,
    reporter: &'a StatusReporter,
    cancel: &'a CancellationToken,
}

/// Executes migration plans against a resource store.
///
/// Resource-level failures never abort a run; they are collected in the
/// [`MigrationResult`]. Only plan-level problems (malformed plans, blocked
/// gates, reporter misuse) are returned as errors.
pub struct MigrationExecutor {
    store: Arc<dyn ResourceStore>,
    converter: Arc<dyn Converter>,
    validator: Arc<ValidationEngine>,
    optimizer: Arc<ConversionOptimizer>,
    risk: RiskAnalyzer,
    tracker: Option<Arc<SchemaEvolutionTracker>>,
    backups: Arc<dyn BackupStore>,
    config: MigrationConfig,
}

impl MigrationExecutor {
    /// Create an executor with a fallback-rule validator over the same
    /// store, a default optimizer and in-memory backups.
    pub fn new(
        store: Arc<dyn ResourceStore>,
        converter: Arc<dyn Converter>,
        config: MigrationConfig,
    ) -> Self {
        Self {
            validator: Arc::new(ValidationEngine::new(store.clone())),
            store,
            converter,
            optimizer: Arc::new(ConversionOptimizer::default()),
            risk: RiskAnalyzer::default(),
            tracker: None,
            backups: Arc::new(InMemoryBackupStore::new()),
            config,
        }
    }

    pub fn with_validator(mut self, validator: Arc<ValidationEngine>) -> Self {
        self.validator = validator;
        self
    }

    pub fn with_optimizer(mut self, optimizer: Arc<ConversionOptimizer>) -> Self {
        self.optimizer = optimizer;
        self
    }

    pub fn with_tracker(mut self, tracker: Arc<SchemaEvolutionTracker>) -> Self {
        self.tracker = Some(tracker);
        self
    }

    pub fn with_backup_store(mut self, backups: Arc<dyn BackupStore>) -> Self {
        self.backups = backups;
        self
    }

    pub fn with_risk_analyzer(mut self, risk: RiskAnalyzer) -> Self {
        self.risk = risk;
        self
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn optimizer(&self) -> &Arc<ConversionOptimizer> {
        &self.optimizer
    }

    pub fn backups(&self) -> &Arc<dyn BackupStore> {
        &self.backups
    }

    /// Build a plan from every stored resource at `source_type`.
    pub async fn plan_migration(
        &self,
        source_type: &ResourceType,
        target_type: &ResourceType,
        options: &PlanOptions,
    ) -> Result<MigrationPlan, MigrationError> {
        let listed = self
            .store
            .list(source_type, options.namespace.as_deref())
            .await
            .map_err(|source| MigrationError::Enumerate {
                resource_type: source_type.clone(),
                source,
            })?;

        let mut seen = BTreeSet::new();
        let candidates: Vec<Resource> = listed
            .into_iter()
            .filter(|r| r.resource_type == *source_type)
            .filter(|r| seen.insert(r.identity()))
            .collect();

        let resources = self
            .optimizer
            .optimize_batch(candidates)
            .iter()
            .map(Resource::identity)
            .collect();

        let plan = MigrationPlan::new(source_type.clone(), target_type.clone(), resources)
            .with_batch_size(options.batch_size)
            .with_dry_run(options.dry_run)
            .with_parallel(options.parallel)
            .with_max_concurrency(options.max_concurrency);
        plan.validate()?;

        tracing::info!(
            source = %plan.source_type,
            target = %plan.target_type,
            resources = plan.resources.len(),
            batches = plan.batch_count(),
            dry_run = plan.dry_run,
            "migration planned"
        );

        if let Some(tracker) = &self.tracker {
            if let Err(e) = tracker.record_migration_plan(&plan).await {
                tracing::warn!(error = %e, "failed to record migration plan");
            }
        }
        Ok(plan)
    }

    /// Execute a plan.
    ///
    /// Batches run strictly in order; within a batch up to
    /// [`MigrationPlan::effective_concurrency`] resources are in flight.
    /// Cancelling the context stops the run between steps; when that leaves
    /// resources unprocessed the result has `cancelled` set and counts only
    /// finished resources.
    pub async fn execute(
        &self,
        ctx: &MigrationContext,
        plan: &MigrationPlan,
    ) -> Result<MigrationResult, MigrationError> {
        plan.validate()?;
        if ctx.is_cancelled() {
            return Err(MigrationError::Cancelled);
        }

        let started = Instant::now();
        let reporter = ctx.reporter().as_ref();
        ctx.reporter().start(plan)?;

        let mut result = MigrationResult::new(ctx.id(), plan.resources.len(), plan.dry_run);
        tracing::info!(
            migration_id = %ctx.id(),
            resources = plan.resources.len(),
            batches = plan.batch_count(),
            dry_run = plan.dry_run,
            "migration started"
        );

        let risk = self.risk.analyze(plan);
        let risk_level = risk.overall_risk;
        result.risk = Some(risk);
        if risk_level > self.config.max_allowed_risk && !plan.dry_run {
            if !self.config.force {
                tracing::warn!(
                    migration_id = %ctx.id(),
                    risk = %risk_level,
                    allowed = %self.config.max_allowed_risk,
                    "migration blocked by risk"
                );
                let reason = format!("risk {risk_level} exceeds {}", self.config.max_allowed_risk);
                report(reporter.mark_failed(&reason));
                report(reporter.finish());
                return Err(MigrationError::RiskTooHigh {
                    level: risk_level,
                    allowed: self.config.max_allowed_risk,
                });
            }
            report(reporter.add_warning(
                format!("proceeding despite {risk_level} risk (forced)"),
                None,
            ));
        }

        if self.config.pre_validation {
            reporter.set_phase(MigrationPhase::Validating)?;
            let validation = self.validator.validate_pre_migration(plan, ctx.cancel_token()).await;
            let blocked = validation.blocks(self.config.force) && !plan.dry_run;
            if !validation.is_valid() {
                report(reporter.add_warning(
                    format!("pre-migration validation found {} error(s)", validation.failed_checks),
                    None,
                ));
            }
            if blocked {
                tracing::warn!(
                    migration_id = %ctx.id(),
                    failed_checks = validation.failed_checks,
                    "migration blocked by pre-migration validation"
                );
                report(reporter.mark_failed("pre-migration validation failed"));
                report(reporter.finish());
                return Err(MigrationError::ValidationFailed {
                    failed_checks: validation.failed_checks,
                    report: Box::new(validation),
                });
            }
            result.pre_validation = Some(validation);
        }

        reporter.set_phase(MigrationPhase::Migrating)?;
        let verify = self.config.post_validation && !plan.dry_run;
        if verify {
            reporter.expect_verification()?;
        }

        let run = Run {
            id: ctx.id(),
            plan,
            reporter,
            cancel: ctx.cancel_token(),
        };

        for (index, batch) in plan.batches().enumerate() {
            if run.cancel.is_cancelled() {
                break;
            }
            report(reporter.begin_batch(index + 1));
            tracing::debug!(
                migration_id = %run.id,
                batch = index + 1,
                size = batch.len(),
                "batch started"
            );

            let mut outcomes = stream::iter(batch)
                .map(|identity| {
                    let run = &run;
                    async move { (identity, self.migrate_resource(run, identity).await) }
                })
                .buffer_unordered(plan.effective_concurrency());

            while let Some((identity, outcome)) = outcomes.next().await {
                self.record_outcome(&run, &mut result, identity, outcome);
            }
        }

        // A token that fires after the last outcome abandons nothing.
        let abandoned = result.processed_count() < result.total_resources;
        if run.cancel.is_cancelled() && abandoned {
            result.cancelled = true;
            tracing::warn!(
                migration_id = %run.id,
                processed = result.processed_count(),
                total = result.total_resources,
                "migration cancelled"
            );
            report(reporter.mark_failed("migration cancelled"));
        } else {
            report(reporter.update_progress(result.counts()));

            if verify {
                let verify_cancel = if run.cancel.is_cancelled() {
                    CancellationToken::new()
                } else {
                    run.cancel.clone()
                };
                let validation = self
                    .validator
                    .validate_post_migration_of(plan, &result.migrated, &verify_cancel)
                    .await;
                report(reporter.complete_verification(validation.is_valid()));
                if !validation.is_valid() {
                    tracing::warn!(
                        migration_id = %run.id,
                        failed_checks = validation.failed_checks,
                        "post-migration validation failed"
                    );
                }
                result.post_validation = Some(validation);
            }
        }

        result.duration = started.elapsed();
        report(reporter.finish());

        tracing::info!(
            migration_id = %run.id,
            successful = result.successful_count,
            failed = result.failed_count,
            skipped = result.skipped_count,
            cache_hits = result.cache_hits,
            duration_ms = result.duration.as_millis() as u64,
            "migration finished"
        );

        if !plan.dry_run {
            if let Some(tracker) = &self.tracker {
                if let Err(e) = tracker.record_migration_result(plan, &result).await {
                    tracing::warn!(error = %e, "failed to record migration result");
                }
            }
        }
        Ok(result)
    }

    fn record_outcome(
        &self,
        run: &Run<'_>,
        result: &mut MigrationResult,
        identity: &ResourceIdentity,
        outcome: Outcome,
    ) {
        match outcome {
            Outcome::Migrated { cache_hit } => {
                result.successful_count += 1;
                result.cache_hits += usize::from(cache_hit);
                result.migrated.push(identity.clone());
                report(run.reporter.update_resource_status(identity, ResourceState::Completed, None));
            }
            Outcome::DryRun(outcome) => {
                result.successful_count += 1;
                result.cache_hits += usize::from(outcome.cache_hit);
                result.dry_run_outcomes.push(outcome);
                report(run.reporter.update_resource_status(identity, ResourceState::Completed, None));
            }
            Outcome::Skipped(reason) => {
                result.skipped_count += 1;
                result.skipped.push((identity.clone(), reason));
                let note = match reason {
                    SkipReason::NotFound => "not found",
                    SkipReason::AlreadyMigrated => "already at target version",
                };
                report(run.reporter.update_resource_status(
                    identity,
                    ResourceState::Skipped,
                    Some(note),
                ));
            }
            Outcome::Failed(failure) => {
                tracing::warn!(
                    migration_id = %run.id,
                    resource = %identity,
                    phase = %failure.phase,
                    attempts = failure.attempts,
                    error = %failure.message,
                    "resource migration failed"
                );
                result.failed_count += 1;
                report(run.reporter.update_resource_status(
                    identity,
                    ResourceState::Failed,
                    Some(&failure.message),
                ));
                result.errors.push(failure);
            }
            Outcome::Cancelled => {
                tracing::debug!(migration_id = %run.id, resource = %identity, "resource cancelled");
            }
        }
    }

    /// Migrate one resource, retrying retryable failures per policy.
    async fn migrate_resource(&self, run: &Run<'_>, identity: &ResourceIdentity) -> Outcome {
        let retry = &self.config.retry;
        let mut attempt = 1;
        loop {
            if run.cancel.is_cancelled() {
                return Outcome::Cancelled;
            }
            report(run.reporter.update_resource_status(identity, ResourceState::InProgress, None));

            match self.attempt_resource(run, identity).await {
                Ok(outcome) => return outcome,
                Err(failure) if failure.retryable && retry.should_retry(attempt) => {
                    let delay = retry.backoff(attempt);
                    tracing::debug!(
                        migration_id = %run.id,
                        resource = %identity,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %failure.message,
                        "retrying resource"
                    );
                    report(run.reporter.update_resource_status(
                        identity,
                        ResourceState::Retrying,
                        Some(&failure.message),
                    ));
                    tokio::select! {
                        biased;
                        _ = run.cancel.cancelled() => return Outcome::Cancelled,
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(mut failure) => {
                    failure.attempts = attempt;
                    return Outcome::Failed(failure);
                }
            }
        }
    }

    async fn attempt_resource(
        &self,
        run: &Run<'_>,
        identity: &ResourceIdentity,
    ) -> Result<Outcome, ResourceFailure> {
        let plan = run.plan;

        let fetched = self
            .bounded(Some(run.cancel), self.store.get(&plan.source_type, identity))
            .await;
        let current = match fetched {
            Step::Done(Err(e)) if e.is_not_found() => {
                tracing::debug!(resource = %identity, "resource not found, skipping");
                return Ok(Outcome::Skipped(SkipReason::NotFound));
            }
            other => match other.resolve(identity, FailurePhase::Fetch)? {
                Some(resource) => resource,
                None => return Ok(Outcome::Cancelled),
            },
        };

        if current.resource_type == plan.target_type {
            return Ok(Outcome::Skipped(SkipReason::AlreadyMigrated));
        }
        if current.resource_type != plan.source_type {
            return Err(ResourceFailure::new(
                identity.clone(),
                FailurePhase::Fetch,
                FailureKind::UnexpectedVersion,
                format!(
                    "stored at {}, expected {}",
                    current.resource_type, plan.source_type
                ),
            ));
        }

        let (conversion, cache_hit) =
            match self.optimizer.optimize_conversion(&current, &plan.target_type) {
                Some(cached) => (cached, true),
                None => {
                    let converted = self
                        .bounded(
                            Some(run.cancel),
                            self.converter.convert(&current, &plan.target_type),
                        )
                        .await
                        .resolve(identity, FailurePhase::Convert)?;
                    let Some(conversion) = converted else {
                        return Ok(Outcome::Cancelled);
                    };
                    self.optimizer
                        .cache_conversion(&current, &plan.target_type, conversion.clone());
                    (conversion, false)
                }
            };

        if conversion.resource.resource_type != plan.target_type {
            return Err(ResourceFailure::new(
                identity.clone(),
                FailurePhase::Convert,
                FailureKind::Conversion,
                format!(
                    "converter produced {}, expected {}",
                    conversion.resource.resource_type, plan.target_type
                ),
            ));
        }
        if let Some(loss) = conversion.data_loss.as_ref().filter(|l| !l.is_empty()) {
            tracing::debug!(
                resource = %identity,
                lost_fields = loss.lost_fields.len(),
                "conversion loses data"
            );
        }

        if plan.dry_run {
            return Ok(Outcome::DryRun(DryRunOutcome {
                resource: identity.clone(),
                diff: ResourceDiff::between(&current, &conversion.resource),
                data_loss: conversion.data_loss,
                cache_hit,
            }));
        }

        // Last point at which the run may stop for this resource.
        if run.cancel.is_cancelled() {
            return Ok(Outcome::Cancelled);
        }

        let backup = Backup::capture(&current, run.id, plan);
        self.backups
            .save(backup)
            .await
            .map_err(|e| ResourceFailure::from_step(identity, FailurePhase::Backup, &e))?;

        let migrated = stamp(conversion.resource, &current, run.id, &plan.source_type);
        self.bounded(None, self.store.update(migrated))
            .await
            .resolve(identity, FailurePhase::Write)?;

        tracing::debug!(
            migration_id = %run.id,
            resource = %identity,
            cache_hit,
            "resource migrated"
        );
        Ok(Outcome::Migrated { cache_hit })
    }

    /// Await `fut` under the configured operation timeout and, when given,
    /// the cancellation token.
    async fn bounded<T>(
        &self,
        cancel: Option<&CancellationToken>,
        fut: impl Future<Output = T>,
    ) -> Step<T> {
        let limited = async {
            match self.config.operation_timeout {
                Some(limit) => match tokio::time::timeout(limit, fut).await {
                    Ok(value) => Step::Done(value),
                    Err(_) => Step::TimedOut(limit),
                },
                None => Step::Done(fut.await),
            }
        };
        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Step::Cancelled,
                step = limited => step,
            },
            None => limited.await,
        }
    }

    /// Restore every resource `result`'s run migrated from its latest backup.
    ///
    /// Backups whose write never landed are ignored, so objects the run did
    /// not change keep whatever other writers put there. Objects that still
    /// exist are overwritten at their current resource version; deleted
    /// objects are recreated. Failures are collected, not returned.
    pub async fn rollback(
        &self,
        ctx: &MigrationContext,
        plan: &MigrationPlan,
        result: &MigrationResult,
    ) -> Result<RollbackSummary, MigrationError> {
        let started = Instant::now();
        let reporter = ctx.reporter();
        if reporter.phase() == Some(MigrationPhase::Failed) {
            reporter.set_phase(MigrationPhase::RollingBack)?;
        }

        let planned: BTreeSet<&ResourceIdentity> = plan.resources.iter().collect();
        let written: BTreeSet<&ResourceIdentity> = result.migrated.iter().collect();
        let mut latest: BTreeMap<ResourceIdentity, Backup> = BTreeMap::new();
        for backup in self.backups.list(result.migration_id).await? {
            let identity = backup.identity();
            if planned.contains(&identity) && written.contains(&identity) {
                latest.insert(identity, backup);
            }
        }

        tracing::info!(
            migration_id = %result.migration_id,
            resources = latest.len(),
            "rollback started"
        );

        let mut summary = RollbackSummary::new(result.migration_id);
        for (identity, backup) in latest {
            match self.restore(&plan.target_type, &identity, backup).await {
                Ok(true) => summary.recreated.push(identity),
                Ok(false) => summary.restored.push(identity),
                Err(failure) => {
                    tracing::warn!(
                        resource = %identity,
                        error = %failure.message,
                        "failed to restore resource"
                    );
                    summary.failures.push(failure);
                }
            }
        }
        summary.duration = started.elapsed();

        report(reporter.record_rollback(format!(
            "rolled back {} resource(s), {} failure(s)",
            summary.restored_count(),
            summary.failures.len()
        )));
        tracing::info!(
            migration_id = %result.migration_id,
            restored = summary.restored.len(),
            recreated = summary.recreated.len(),
            failed = summary.failures.len(),
            "rollback finished"
        );
        Ok(summary)
    }

    /// Returns whether the object had to be recreated.
    async fn restore(
        &self,
        resource_type: &ResourceType,
        identity: &ResourceIdentity,
        backup: Backup,
    ) -> Result<bool, ResourceFailure> {
        let mut restored = backup.resource;
        let current = self
            .bounded(None, self.store.get(resource_type, identity))
            .await;
        match current {
            Step::Done(Err(e)) if e.is_not_found() => {
                restored.metadata.resource_version.clear();
                self.bounded(None, self.store.create(restored))
                    .await
                    .resolve(identity, FailurePhase::Restore)?;
                Ok(true)
            }
            other => {
                let Some(current) = other.resolve(identity, FailurePhase::Restore)? else {
                    return Ok(false);
                };
                restored.metadata.resource_version = current.metadata.resource_version;
                self.bounded(None, self.store.update(restored))
                    .await
                    .resolve(identity, FailurePhase::Restore)?;
                Ok(false)
            }
        }
    }
}

/// Prepare a converted resource for writing over `current`.
fn stamp(
    mut migrated: Resource,
    current: &Resource,
    migration_id: MigrationId,
    source_type: &ResourceType,
) -> Resource {
    migrated.metadata.uid = current.metadata.uid.clone();
    migrated.metadata.resource_version = current.metadata.resource_version.clone();
    migrated
        .metadata
        .labels
        .insert(MIGRATED_LABEL.to_string(), "true".to_string());

    let annotations = &mut migrated.metadata.annotations;
    annotations.insert(
        SOURCE_VERSION_ANNOTATION.to_string(),
        source_type.version.clone(),
    );
    annotations.insert(
        ORIGINAL_UID_ANNOTATION.to_string(),
        current.metadata.uid.clone(),
    );
    annotations.insert(MIGRATION_ID_ANNOTATION.to_string(), migration_id.to_hex());
    if current.status.is_some() {
        annotations.insert(HAD_STATUS_ANNOTATION.to_string(), "true".to_string());
    }
    migrated
}

/// Reporter updates are best-effort once a run is under way.
fn report(outcome: Result<(), StatusError>) {
    if let Err(e) = outcome {
        tracing::debug!(error = %e, "status update dropped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::convert::FieldMappingConverter;
    use crate::status::ReporterConfig;
    use crate::store::InMemoryResourceStore;
    use serde_json::json;

    fn v1beta1() -> ResourceType {
        ResourceType::new("observability.io", "v1beta1", "Platform")
    }

    fn v1() -> ResourceType {
        ResourceType::new("observability.io", "v1", "Platform")
    }

    fn platform(ns: &str, name: &str) -> Resource {
        Resource::new(v1beta1(), ResourceIdentity::new(ns, name))
            .with_spec(json!({"retention": "7d", "replicas": 1}))
            .with_status(json!({"phase": "Ready"}))
    }

    fn executor(store: Arc<InMemoryResourceStore>, config: MigrationConfig) -> MigrationExecutor {
        let converter = FieldMappingConverter::new(v1beta1(), v1()).rename("retention", "storage.retention");
        MigrationExecutor::new(store, Arc::new(converter), config)
    }

    fn context() -> MigrationContext {
        MigrationContext::new(ReporterConfig::default())
    }

    #[tokio::test]
    async fn test_plan_migration_lists_source_version() {
        let store = Arc::new(InMemoryResourceStore::with_resources([
            platform("b", "one"),
            platform("a", "two"),
            Resource::new(v1(), ResourceIdentity::new("a", "done")),
        ]));
        let executor = executor(store, MigrationConfig::default());

        let plan = executor
            .plan_migration(&v1beta1(), &v1(), &PlanOptions::default().with_batch_size(5))
            .await
            .unwrap();
        assert_eq!(plan.resources.len(), 2);
        assert_eq!(plan.batch_size, 5);
        assert!(!plan.resources.contains(&ResourceIdentity::new("a", "done")));

        let scoped = executor
            .plan_migration(&v1beta1(), &v1(), &PlanOptions::default().with_namespace("b"))
            .await
            .unwrap();
        assert_eq!(scoped.resources, vec![ResourceIdentity::new("b", "one")]);
    }

    #[tokio::test]
    async fn test_plan_migration_rejects_bad_options() {
        let store = Arc::new(InMemoryResourceStore::new());
        let executor = executor(store, MigrationConfig::default());
        let err = executor
            .plan_migration(&v1beta1(), &v1(), &PlanOptions::default().with_batch_size(0))
            .await
            .unwrap_err();
        assert!(matches!(err, MigrationError::InvalidPlan { .. }));
    }

    #[tokio::test]
    async fn test_execute_migrates_and_stamps() {
        let store = Arc::new(InMemoryResourceStore::with_resources([
            platform("team-a", "p1"),
            platform("team-b", "p2"),
        ]));
        let executor = executor(store.clone(), MigrationConfig::default());
        let plan = MigrationPlan::new(
            v1beta1(),
            v1(),
            vec![
                ResourceIdentity::new("team-a", "p1"),
                ResourceIdentity::new("team-b", "p2"),
            ],
        );

        let ctx = context();
        let result = executor.execute(&ctx, &plan).await.unwrap();
        assert!(result.is_success());
        assert_eq!(result.successful_count, 2);
        assert!(result.post_validation.as_ref().unwrap().is_valid());

        let stored = store
            .get(&v1(), &ResourceIdentity::new("team-a", "p1"))
            .await
            .unwrap();
        assert_eq!(stored.resource_type, v1());
        assert_eq!(stored.spec["storage"]["retention"], "7d");
        assert_eq!(stored.label(MIGRATED_LABEL), Some("true"));
        assert_eq!(
            stored.annotation(MIGRATION_ID_ANNOTATION),
            Some(ctx.id().to_hex().as_str())
        );
        assert_eq!(executor.backups().list(ctx.id()).await.unwrap().len(), 2);

        let status = ctx.reporter().snapshot().unwrap();
        assert_eq!(status.phase, MigrationPhase::Completed);
    }

    #[tokio::test]
    async fn test_missing_resource_is_skipped() {
        let store = Arc::new(InMemoryResourceStore::with_resources([platform("a", "p1")]));
        let executor = executor(store, MigrationConfig::default());
        let plan = MigrationPlan::new(
            v1beta1(),
            v1(),
            vec![ResourceIdentity::new("a", "p1"), ResourceIdentity::new("a", "gone")],
        );

        let result = executor.execute(&context(), &plan).await.unwrap();
        assert_eq!(result.successful_count, 1);
        assert_eq!(result.skipped_count, 1);
        assert_eq!(
            result.skipped,
            vec![(ResourceIdentity::new("a", "gone"), SkipReason::NotFound)]
        );
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn test_dry_run_does_not_write() {
        let store = Arc::new(InMemoryResourceStore::with_resources([platform("a", "p1")]));
        let before = store.snapshot();
        let executor = executor(store.clone(), MigrationConfig::default());
        let plan = MigrationPlan::new(v1beta1(), v1(), vec![ResourceIdentity::new("a", "p1")])
            .with_dry_run(true);

        let result = executor.execute(&context(), &plan).await.unwrap();
        assert_eq!(store.snapshot(), before);
        assert_eq!(result.dry_run_outcomes.len(), 1);
        let diff = &result.dry_run_outcomes[0].diff;
        assert!(diff.changes.iter().any(|c| c.path == "spec.storage"));
        assert!(result.post_validation.is_none());
        assert!(executor.backups().list(result.migration_id).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_second_run_hits_conversion_cache() {
        let store = Arc::new(InMemoryResourceStore::with_resources([platform("a", "p1")]));
        let executor = executor(store, MigrationConfig::default());
        let plan = MigrationPlan::new(v1beta1(), v1(), vec![ResourceIdentity::new("a", "p1")])
            .with_dry_run(true);

        let first = executor.execute(&context(), &plan).await.unwrap();
        let second = executor.execute(&context(), &plan).await.unwrap();
        assert_eq!(first.cache_hits, 0);
        assert_eq!(second.cache_hits, 1);
        assert!(second.dry_run_outcomes[0].cache_hit);
    }

    #[tokio::test]
    async fn test_risk_gate_blocks_production() {
        let store = Arc::new(InMemoryResourceStore::with_resources([platform("production", "p1")]));
        let executor = executor(store.clone(), MigrationConfig::default());
        let plan = MigrationPlan::new(
            v1beta1(),
            v1(),
            vec![ResourceIdentity::new("production", "p1")],
        );

        let ctx = context();
        let err = executor.execute(&ctx, &plan).await.unwrap_err();
        assert!(matches!(err, MigrationError::RiskTooHigh { .. }));
        assert_eq!(ctx.reporter().phase(), Some(MigrationPhase::Failed));

        let forced = MigrationExecutor::new(
            store,
            Arc::new(FieldMappingConverter::new(v1beta1(), v1())),
            MigrationConfig::default().with_force(true),
        );
        let result = forced.execute(&context(), &plan).await.unwrap();
        assert_eq!(result.successful_count, 1);
    }

    #[tokio::test]
    async fn test_reused_context_is_rejected() {
        let store = Arc::new(InMemoryResourceStore::with_resources([platform("a", "p1")]));
        let executor = executor(store, MigrationConfig::default());
        let plan = MigrationPlan::new(v1beta1(), v1(), vec![ResourceIdentity::new("a", "p1")]);
        let ctx = context();
        executor.execute(&ctx, &plan).await.unwrap();
        let err = executor.execute(&ctx, &plan).await.unwrap_err();
        assert!(matches!(err, MigrationError::Status(StatusError::AlreadyStarted)));
    }

    #[tokio::test]
    async fn test_cancelled_context_never_starts() {
        let store = Arc::new(InMemoryResourceStore::with_resources([platform("a", "p1")]));
        let executor = executor(store, MigrationConfig::default());
        let plan = MigrationPlan::new(v1beta1(), v1(), vec![ResourceIdentity::new("a", "p1")]);
        let ctx = context();
        ctx.cancel();
        assert!(matches!(
            executor.execute(&ctx, &plan).await,
            Err(MigrationError::Cancelled)
        ));
    }

    #[tokio::test]
    async fn test_rollback_restores_source_version() {
        let store = Arc::new(InMemoryResourceStore::with_resources([platform("a", "p1")]));
        let original = store
            .get(&v1beta1(), &ResourceIdentity::new("a", "p1"))
            .await
            .unwrap();
        let executor = executor(store.clone(), MigrationConfig::default());
        let plan = MigrationPlan::new(v1beta1(), v1(), vec![ResourceIdentity::new("a", "p1")]);

        let ctx = context();
        let result = executor.execute(&ctx, &plan).await.unwrap();
        let summary = executor.rollback(&ctx, &plan, &result).await.unwrap();
        assert!(summary.is_success());
        assert_eq!(summary.restored, vec![ResourceIdentity::new("a", "p1")]);

        let restored = store
            .get(&v1beta1(), &ResourceIdentity::new("a", "p1"))
            .await
            .unwrap();
        assert_eq!(restored.resource_type, v1beta1());
        assert_eq!(restored.spec, original.spec);
        assert_eq!(restored.status, original.status);
        assert_eq!(restored.metadata.labels, original.metadata.labels);
    }

    #[tokio::test]
    async fn test_rollback_recreates_deleted_resource() {
        let store = Arc::new(InMemoryResourceStore::with_resources([platform("a", "p1")]));
        let executor = executor(store.clone(), MigrationConfig::default());
        let plan = MigrationPlan::new(v1beta1(), v1(), vec![ResourceIdentity::new("a", "p1")]);

        let ctx = context();
        let result = executor.execute(&ctx, &plan).await.unwrap();
        store
            .delete(&v1(), &ResourceIdentity::new("a", "p1"))
            .await
            .unwrap();

        let summary = executor.rollback(&ctx, &plan, &result).await.unwrap();
        assert_eq!(summary.recreated, vec![ResourceIdentity::new("a", "p1")]);
        assert!(store
            .get(&v1beta1(), &ResourceIdentity::new("a", "p1"))
            .await
            .is_ok());
    }
}

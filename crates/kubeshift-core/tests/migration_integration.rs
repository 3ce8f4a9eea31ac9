//! End-to-end tests for planning, executing and rolling back migrations.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use kubeshift_core::migration::SkipReason;
use kubeshift_core::status::ResourceState;
use kubeshift_core::validation::Severity;
use kubeshift_core::{
    ChannelStatusHandler, Conversion, ConversionError, Converter, FailureKind, FailurePhase,
    FieldMappingConverter, InMemoryResourceStore, MigrationConfig, MigrationContext,
    MigrationExecutor, MigrationPhase, MigrationPlan, PlanOptions, RecordStatus, ReporterConfig,
    Resource, ResourceIdentity, ResourceStore, ResourceType, RetryPolicy, SchemaEvolutionTracker,
    StoreError, ValidationEngine,
};
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

fn v1beta1() -> ResourceType {
    ResourceType::new("observability.io", "v1beta1", "Platform")
}

fn v1() -> ResourceType {
    ResourceType::new("observability.io", "v1", "Platform")
}

fn platform(ns: &str, name: &str, retention: &str) -> Resource {
    Resource::new(v1beta1(), ResourceIdentity::new(ns, name))
        .with_spec(json!({
            "retention": retention,
            "components": {"prometheus": {"resources": {"cpu": "1"}}}
        }))
        .with_status(json!({"phase": "Ready"}))
        .with_label("team", ns)
}

fn mapping() -> FieldMappingConverter {
    FieldMappingConverter::new(v1beta1(), v1()).rename("retention", "storage.retention")
}

fn quiet_context() -> MigrationContext {
    MigrationContext::new(ReporterConfig::default().with_update_interval(Duration::ZERO))
}

fn plan_of(names: &[(&str, &str)]) -> MigrationPlan {
    MigrationPlan::new(
        v1beta1(),
        v1(),
        names
            .iter()
            .map(|(ns, name)| ResourceIdentity::new(*ns, *name))
            .collect(),
    )
}

/// Delegates to a [`FieldMappingConverter`] but fails the named resources.
struct FailingConverter {
    inner: FieldMappingConverter,
    failing: HashSet<String>,
}

#[async_trait]
impl Converter for FailingConverter {
    async fn convert(
        &self,
        source: &Resource,
        target: &ResourceType,
    ) -> Result<Conversion, ConversionError> {
        if self.failing.contains(&source.metadata.name) {
            return Err(ConversionError::Failed {
                identity: source.identity(),
                reason: "unsupported layout".to_string(),
            });
        }
        self.inner.convert(source, target).await
    }
}

/// Cancels a token once it has converted `after` resources.
struct CancellingConverter {
    inner: FieldMappingConverter,
    calls: AtomicUsize,
    after: usize,
    token: CancellationToken,
}

#[async_trait]
impl Converter for CancellingConverter {
    async fn convert(
        &self,
        source: &Resource,
        target: &ResourceType,
    ) -> Result<Conversion, ConversionError> {
        if self.calls.fetch_add(1, Ordering::SeqCst) + 1 >= self.after {
            self.token.cancel();
        }
        self.inner.convert(source, target).await
    }
}

/// Takes far longer than any reasonable operation timeout.
struct SlowConverter {
    inner: FieldMappingConverter,
}

#[async_trait]
impl Converter for SlowConverter {
    async fn convert(
        &self,
        source: &Resource,
        target: &ResourceType,
    ) -> Result<Conversion, ConversionError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        self.inner.convert(source, target).await
    }
}

/// Rejects the first `conflicts` updates with a conflict.
struct FlakyStore {
    inner: InMemoryResourceStore,
    conflicts: AtomicUsize,
}

#[async_trait]
impl ResourceStore for FlakyStore {
    async fn get(
        &self,
        resource_type: &ResourceType,
        identity: &ResourceIdentity,
    ) -> Result<Resource, StoreError> {
        self.inner.get(resource_type, identity).await
    }

    async fn list(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Vec<Resource>, StoreError> {
        self.inner.list(resource_type, namespace).await
    }

    async fn create(&self, resource: Resource) -> Result<Resource, StoreError> {
        self.inner.create(resource).await
    }

    async fn update(&self, resource: Resource) -> Result<Resource, StoreError> {
        let remaining = self.conflicts.load(Ordering::SeqCst);
        if remaining > 0 {
            self.conflicts.store(remaining - 1, Ordering::SeqCst);
            return Err(StoreError::Conflict {
                identity: resource.identity(),
                expected: resource.metadata.resource_version.clone(),
                actual: "999".to_string(),
            });
        }
        self.inner.update(resource).await
    }

    async fn delete(
        &self,
        resource_type: &ResourceType,
        identity: &ResourceIdentity,
    ) -> Result<(), StoreError> {
        self.inner.delete(resource_type, identity).await
    }
}

/// Another controller rewrites `contended` just before our first update to it.
struct RacingStore {
    inner: InMemoryResourceStore,
    contended: String,
    raced: AtomicBool,
}

#[async_trait]
impl ResourceStore for RacingStore {
    async fn get(
        &self,
        resource_type: &ResourceType,
        identity: &ResourceIdentity,
    ) -> Result<Resource, StoreError> {
        self.inner.get(resource_type, identity).await
    }

    async fn list(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Vec<Resource>, StoreError> {
        self.inner.list(resource_type, namespace).await
    }

    async fn create(&self, resource: Resource) -> Result<Resource, StoreError> {
        self.inner.create(resource).await
    }

    async fn update(&self, resource: Resource) -> Result<Resource, StoreError> {
        if resource.metadata.name == self.contended && !self.raced.swap(true, Ordering::SeqCst) {
            let theirs = self
                .inner
                .get(&v1beta1(), &resource.identity())
                .await?
                .with_spec(json!({"retention": "90d", "owner": "other-controller"}));
            self.inner.insert(theirs);
        }
        self.inner.update(resource).await
    }

    async fn delete(
        &self,
        resource_type: &ResourceType,
        identity: &ResourceIdentity,
    ) -> Result<(), StoreError> {
        self.inner.delete(resource_type, identity).await
    }
}

/// Cancels a token right after every successful update.
struct CancelAfterWriteStore {
    inner: InMemoryResourceStore,
    token: CancellationToken,
}

#[async_trait]
impl ResourceStore for CancelAfterWriteStore {
    async fn get(
        &self,
        resource_type: &ResourceType,
        identity: &ResourceIdentity,
    ) -> Result<Resource, StoreError> {
        self.inner.get(resource_type, identity).await
    }

    async fn list(
        &self,
        resource_type: &ResourceType,
        namespace: Option<&str>,
    ) -> Result<Vec<Resource>, StoreError> {
        self.inner.list(resource_type, namespace).await
    }

    async fn create(&self, resource: Resource) -> Result<Resource, StoreError> {
        self.inner.create(resource).await
    }

    async fn update(&self, resource: Resource) -> Result<Resource, StoreError> {
        let updated = self.inner.update(resource).await?;
        self.token.cancel();
        Ok(updated)
    }

    async fn delete(
        &self,
        resource_type: &ResourceType,
        identity: &ResourceIdentity,
    ) -> Result<(), StoreError> {
        self.inner.delete(resource_type, identity).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Call {
    Start(usize),
    End(usize),
}

/// Records when each conversion starts and ends, tagged with its batch.
struct TrackingConverter {
    inner: FieldMappingConverter,
    batch_of: std::collections::HashMap<String, usize>,
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    calls: Mutex<Vec<Call>>,
}

impl TrackingConverter {
    fn new(plan: &MigrationPlan) -> Self {
        let batch_of = plan
            .batches()
            .enumerate()
            .flat_map(|(batch, ids)| ids.iter().map(move |id| (id.name.clone(), batch)))
            .collect();
        Self {
            inner: mapping(),
            batch_of,
            in_flight: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Asserts no call of a batch started before the previous batch drained.
    fn assert_batches_sequential(&self, batch_size: usize) {
        let mut ended: std::collections::HashMap<usize, usize> = Default::default();
        for call in self.calls.lock().iter() {
            match *call {
                Call::Start(batch) if batch > 0 => {
                    assert_eq!(
                        ended.get(&(batch - 1)).copied().unwrap_or(0),
                        batch_size,
                        "batch {batch} started before batch {} finished",
                        batch - 1
                    );
                }
                Call::Start(_) => {}
                Call::End(batch) => *ended.entry(batch).or_default() += 1,
            }
        }
    }
}

#[async_trait]
impl Converter for TrackingConverter {
    async fn convert(
        &self,
        source: &Resource,
        target: &ResourceType,
    ) -> Result<Conversion, ConversionError> {
        let batch = self.batch_of[&source.metadata.name];
        self.calls.lock().push(Call::Start(batch));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(Duration::from_millis(10)).await;
        let converted = self.inner.convert(source, target).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.calls.lock().push(Call::End(batch));
        converted
    }
}

#[tokio::test]
async fn test_pre_validation_warns_on_missing_resource() {
    let store = Arc::new(InMemoryResourceStore::with_resources([platform("a", "present", "7d")]));
    let mut engine = ValidationEngine::new(store);
    engine.register_default_rules(&v1beta1());

    let plan = plan_of(&[("a", "present"), ("a", "missing")]);
    let report = engine
        .validate_pre_migration(&plan, &CancellationToken::new())
        .await;

    let missing = ResourceIdentity::new("a", "missing");
    assert_eq!(report.warnings_for(&missing).len(), 1);
    assert!(report.errors_for(&missing).is_empty());
    assert!(report.is_valid());
    assert_eq!(report.valid, report.failed_checks == 0);
}

#[tokio::test]
async fn test_pre_validation_blocks_until_forced() {
    let deprecated = platform("a", "old", "7d")
        .with_annotation("deprecated.kubernetes.io/api-version", "v1alpha1");
    let store = Arc::new(InMemoryResourceStore::with_resources([deprecated]));
    let mut engine = ValidationEngine::new(store.clone());
    engine.register_default_rules(&v1beta1());
    let engine = Arc::new(engine);

    let plan = plan_of(&[("a", "old")]);
    let blocked = MigrationExecutor::new(store.clone(), Arc::new(mapping()), MigrationConfig::default())
        .with_validator(engine.clone());
    let ctx = quiet_context();
    let err = blocked.execute(&ctx, &plan).await.unwrap_err();
    match err {
        kubeshift_core::MigrationError::ValidationFailed { report, .. } => {
            assert!(!report.is_valid());
            assert!(report
                .errors
                .iter()
                .any(|e| e.rule == "version-compatibility" && e.severity >= Severity::Medium));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(ctx.reporter().phase(), Some(MigrationPhase::Failed));

    let forced = MigrationExecutor::new(
        store,
        Arc::new(mapping()),
        MigrationConfig::default().with_force(true),
    )
    .with_validator(engine);
    let result = forced.execute(&quiet_context(), &plan).await.unwrap();
    assert_eq!(result.successful_count, 1);
    assert!(!result.pre_validation.unwrap().is_valid());
}

#[tokio::test]
async fn test_counts_add_up_to_total() {
    let store = Arc::new(InMemoryResourceStore::with_resources([
        platform("a", "ok-1", "7d"),
        platform("a", "ok-2", "7d"),
        platform("b", "broken", "7d"),
        Resource::new(v1(), ResourceIdentity::new("b", "done")).with_spec(json!({"x": 1})),
    ]));
    let converter = FailingConverter {
        inner: mapping(),
        failing: ["broken".to_string()].into_iter().collect(),
    };
    let executor = MigrationExecutor::new(store, Arc::new(converter), MigrationConfig::default());
    let plan = plan_of(&[
        ("a", "ok-1"),
        ("a", "ok-2"),
        ("b", "broken"),
        ("b", "done"),
        ("b", "gone"),
    ])
    .with_batch_size(2);

    let result = executor.execute(&quiet_context(), &plan).await.unwrap();
    assert!(result.is_complete());
    assert_eq!(
        result.successful_count + result.failed_count + result.skipped_count,
        result.total_resources
    );
    assert_eq!(result.successful_count, 2);
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.skipped_count, 2);

    let failure = result.failure_for(&ResourceIdentity::new("b", "broken")).unwrap();
    assert_eq!(failure.phase, FailurePhase::Convert);
    assert_eq!(failure.kind, FailureKind::Conversion);
    assert!(!failure.retryable);

    let reasons: HashSet<SkipReason> = result.skipped.iter().map(|(_, r)| *r).collect();
    assert!(reasons.contains(&SkipReason::NotFound));
    assert!(reasons.contains(&SkipReason::AlreadyMigrated));
}

#[tokio::test]
async fn test_rollback_restores_partially_failed_run() {
    let originals = [
        platform("a", "first", "7d"),
        platform("a", "second", "14d"),
        platform("a", "third", "30d"),
    ];
    let store = Arc::new(InMemoryResourceStore::with_resources(originals.clone()));
    let converter = FailingConverter {
        inner: mapping(),
        failing: ["third".to_string()].into_iter().collect(),
    };
    let executor = MigrationExecutor::new(store.clone(), Arc::new(converter), MigrationConfig::default());
    let plan = plan_of(&[("a", "first"), ("a", "second"), ("a", "third")]);

    let ctx = quiet_context();
    let result = executor.execute(&ctx, &plan).await.unwrap();
    assert_eq!(result.successful_count, 2);
    assert_eq!(result.failed_count, 1);

    let migrated = store
        .get(&v1(), &ResourceIdentity::new("a", "first"))
        .await
        .unwrap();
    assert_eq!(migrated.resource_type, v1());

    let summary = executor.rollback(&ctx, &plan, &result).await.unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.restored_count(), 2);

    for original in &originals {
        let restored = store
            .get(&v1beta1(), &original.identity())
            .await
            .unwrap();
        assert_eq!(restored.resource_type, original.resource_type);
        assert_eq!(restored.spec, original.spec);
        assert_eq!(restored.status, original.status);
        assert_eq!(restored.metadata.labels, original.metadata.labels);
        assert_eq!(restored.metadata.annotations, original.metadata.annotations);
    }
}

#[tokio::test]
async fn test_conflicts_are_retried() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryResourceStore::with_resources([platform("a", "contended", "7d")]),
        conflicts: AtomicUsize::new(2),
    });
    let config = MigrationConfig::default()
        .with_retry(RetryPolicy::exponential(3).with_initial_backoff(Duration::from_millis(1)));
    let executor = MigrationExecutor::new(store.clone(), Arc::new(mapping()), config);
    let plan = plan_of(&[("a", "contended")]);

    let ctx = quiet_context();
    let result = executor.execute(&ctx, &plan).await.unwrap();
    assert_eq!(result.successful_count, 1);

    let status = ctx.reporter().snapshot().unwrap();
    let resource = status.resource(&ResourceIdentity::new("a", "contended")).unwrap();
    assert_eq!(resource.state, ResourceState::Completed);
    assert_eq!(resource.retry_count, 2);
}

#[tokio::test]
async fn test_conflict_without_retry_fails() {
    let store = Arc::new(FlakyStore {
        inner: InMemoryResourceStore::with_resources([platform("a", "contended", "7d")]),
        conflicts: AtomicUsize::new(1),
    });
    let executor = MigrationExecutor::new(store, Arc::new(mapping()), MigrationConfig::default());
    let result = executor
        .execute(&quiet_context(), &plan_of(&[("a", "contended")]))
        .await
        .unwrap();

    let failure = &result.errors[0];
    assert_eq!(failure.phase, FailurePhase::Write);
    assert_eq!(failure.kind, FailureKind::Conflict);
    assert!(failure.retryable);
    assert_eq!(failure.attempts, 1);
}

#[tokio::test]
async fn test_cancellation_stops_before_write() {
    let store = Arc::new(InMemoryResourceStore::with_resources([
        platform("a", "p1", "7d"),
        platform("a", "p2", "7d"),
        platform("a", "p3", "7d"),
        platform("a", "p4", "7d"),
    ]));
    let ctx = quiet_context();
    let converter = CancellingConverter {
        inner: mapping(),
        calls: AtomicUsize::new(0),
        after: 2,
        token: ctx.cancel_token().clone(),
    };
    let executor = MigrationExecutor::new(store.clone(), Arc::new(converter), MigrationConfig::default());
    let plan = plan_of(&[("a", "p1"), ("a", "p2"), ("a", "p3"), ("a", "p4")])
        .with_parallel(false)
        .with_batch_size(2);

    let result = executor.execute(&ctx, &plan).await.unwrap();
    assert!(result.cancelled);
    assert!(!result.is_complete());
    assert_eq!(result.successful_count, 1);
    assert_eq!(result.processed_count(), 1);

    let untouched = store
        .get(&v1beta1(), &ResourceIdentity::new("a", "p2"))
        .await
        .unwrap();
    assert_eq!(untouched.resource_type, v1beta1());
    assert_eq!(executor.backups().list(ctx.id()).await.unwrap().len(), 1);
    assert_eq!(ctx.reporter().phase(), Some(MigrationPhase::Failed));
}

#[tokio::test(start_paused = true)]
async fn test_operation_timeout() {
    let store = Arc::new(InMemoryResourceStore::with_resources([platform("a", "slow", "7d")]));
    let config = MigrationConfig::default().with_operation_timeout(Duration::from_millis(50));
    let executor = MigrationExecutor::new(
        store.clone(),
        Arc::new(SlowConverter { inner: mapping() }),
        config,
    );

    let result = executor
        .execute(&quiet_context(), &plan_of(&[("a", "slow")]))
        .await
        .unwrap();
    assert_eq!(result.failed_count, 1);
    let failure = &result.errors[0];
    assert_eq!(failure.kind, FailureKind::Timeout);
    assert_eq!(failure.phase, FailurePhase::Convert);

    let stored = store
        .get(&v1beta1(), &ResourceIdentity::new("a", "slow"))
        .await
        .unwrap();
    assert_eq!(stored.resource_type, v1beta1());
}

#[tokio::test]
async fn test_post_validation_catches_emptied_spec() {
    let store = Arc::new(InMemoryResourceStore::with_resources([platform("a", "p1", "7d")]));
    let converter = FieldMappingConverter::new(v1beta1(), v1())
        .drop_field("retention")
        .drop_field("components");
    let executor = MigrationExecutor::new(store, Arc::new(converter), MigrationConfig::default());

    let ctx = quiet_context();
    let result = executor.execute(&ctx, &plan_of(&[("a", "p1")])).await.unwrap();
    assert_eq!(result.successful_count, 1);
    let post = result.post_validation.unwrap();
    assert!(!post.is_valid());
    assert!(post.errors.iter().any(|e| e.rule == "data-integrity"));
    assert_eq!(ctx.reporter().phase(), Some(MigrationPhase::Failed));
}

#[tokio::test]
async fn test_planned_run_is_tracked_and_observed() {
    let store = Arc::new(InMemoryResourceStore::with_resources([
        platform("kube-system", "core", "7d"),
        platform("default", "web", "7d"),
    ]));
    let tracker = Arc::new(SchemaEvolutionTracker::new());
    let executor = MigrationExecutor::new(store, Arc::new(mapping()), MigrationConfig::default())
        .with_tracker(tracker.clone());

    let plan = executor
        .plan_migration(&v1beta1(), &v1(), &PlanOptions::default())
        .await
        .unwrap();
    assert_eq!(plan.resources.len(), 2);

    let ctx = quiet_context();
    let (handler, mut updates) = ChannelStatusHandler::new(8);
    ctx.reporter().add_handler(Arc::new(handler));

    let result = executor.execute(&ctx, &plan).await.unwrap();
    assert!(result.is_success());

    let last = tokio::time::timeout(Duration::from_secs(5), updates.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(last.phase, MigrationPhase::Completed);
    assert_eq!(last.progress.percent_complete, 100.0);

    let history = tracker.history(0).await.unwrap();
    let statuses: Vec<RecordStatus> = history.iter().map(|r| r.status).collect();
    assert_eq!(statuses, [RecordStatus::Planned, RecordStatus::Completed]);
    assert_eq!(history[1].migration_id, Some(ctx.id()));
}

#[tokio::test]
async fn test_rollback_keeps_concurrent_writes() {
    let store = Arc::new(RacingStore {
        inner: InMemoryResourceStore::with_resources([
            platform("a", "calm", "7d"),
            platform("a", "contended", "7d"),
        ]),
        contended: "contended".to_string(),
        raced: AtomicBool::new(false),
    });
    let executor = MigrationExecutor::new(store.clone(), Arc::new(mapping()), MigrationConfig::default());
    let plan = plan_of(&[("a", "calm"), ("a", "contended")]);

    let ctx = quiet_context();
    let result = executor.execute(&ctx, &plan).await.unwrap();
    assert_eq!(result.successful_count, 1);
    assert_eq!(result.failed_count, 1);
    assert_eq!(result.errors[0].kind, FailureKind::Conflict);

    let summary = executor.rollback(&ctx, &plan, &result).await.unwrap();
    assert!(summary.is_success());
    assert_eq!(summary.restored, vec![ResourceIdentity::new("a", "calm")]);

    let theirs = store
        .get(&v1beta1(), &ResourceIdentity::new("a", "contended"))
        .await
        .unwrap();
    assert_eq!(theirs.spec, json!({"retention": "90d", "owner": "other-controller"}));

    let calm = store
        .get(&v1beta1(), &ResourceIdentity::new("a", "calm"))
        .await
        .unwrap();
    assert_eq!(calm.resource_type, v1beta1());
    assert_eq!(calm.spec["retention"], "7d");
}

#[tokio::test]
async fn test_cancel_after_last_write_completes_the_run() {
    let ctx = quiet_context();
    let store = Arc::new(CancelAfterWriteStore {
        inner: InMemoryResourceStore::with_resources([platform("a", "only", "7d")]),
        token: ctx.cancel_token().clone(),
    });
    let tracker = Arc::new(SchemaEvolutionTracker::new());
    let executor = MigrationExecutor::new(store, Arc::new(mapping()), MigrationConfig::default())
        .with_tracker(tracker.clone());

    let result = executor.execute(&ctx, &plan_of(&[("a", "only")])).await.unwrap();
    assert!(ctx.is_cancelled());
    assert!(!result.cancelled);
    assert_eq!(result.successful_count, 1);
    assert!(result.post_validation.as_ref().unwrap().is_valid());
    assert_eq!(ctx.reporter().phase(), Some(MigrationPhase::Completed));

    let history = tracker.history(0).await.unwrap();
    assert_eq!(history.last().unwrap().status, RecordStatus::Completed);
}

#[tokio::test(start_paused = true)]
async fn test_batches_are_sequential_and_bounded() {
    let names: Vec<String> = (0..9).map(|i| format!("p{i}")).collect();
    let resources: Vec<Resource> = names.iter().map(|n| platform("a", n, "7d")).collect();
    let pairs: Vec<(&str, &str)> = names.iter().map(|n| ("a", n.as_str())).collect();

    let plan = plan_of(&pairs).with_batch_size(3).with_max_concurrency(2);
    let store = Arc::new(InMemoryResourceStore::with_resources(resources.clone()));
    let converter = Arc::new(TrackingConverter::new(&plan));
    let executor = MigrationExecutor::new(store, converter.clone(), MigrationConfig::default());

    let result = executor.execute(&quiet_context(), &plan).await.unwrap();
    assert_eq!(result.successful_count, 9);
    assert_eq!(converter.peak.load(Ordering::SeqCst), 2);
    converter.assert_batches_sequential(3);

    let plan = plan.with_parallel(false);
    let store = Arc::new(InMemoryResourceStore::with_resources(resources));
    let converter = Arc::new(TrackingConverter::new(&plan));
    let executor = MigrationExecutor::new(store, converter.clone(), MigrationConfig::default());

    let result = executor.execute(&quiet_context(), &plan).await.unwrap();
    assert_eq!(result.successful_count, 9);
    assert_eq!(converter.peak.load(Ordering::SeqCst), 1);
    converter.assert_batches_sequential(3);
}

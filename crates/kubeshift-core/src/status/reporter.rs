//! Live migration status and periodic observer notification.

use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use futures::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use super::handler::StatusHandler;
use super::histogram::DurationHistogram;
use super::report::StatusReport;
use super::types::{
    EventLevel, EventType, MigrationEvent, MigrationMetrics, MigrationPhase, MigrationProgress,
    MigrationStatus, ProgressCounts, ResourceMigrationStatus, ResourceState,
};
use crate::migration::{MigrationId, MigrationPlan};
use crate::resource::ResourceIdentity;

/// Status reporter errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StatusError {
    /// `start` has not been called.
    #[error("no migration has been started on this reporter")]
    NotStarted,

    /// `start` was already called; a reporter tracks exactly one run.
    #[error("migration already started on this reporter")]
    AlreadyStarted,

    /// The resource is not part of the plan.
    #[error("resource {0} is not part of the plan")]
    UnknownResource(ResourceIdentity),

    /// Explicit phase change out of order.
    #[error("invalid phase transition from {from} to {to}")]
    InvalidTransition {
        from: MigrationPhase,
        to: MigrationPhase,
    },

    /// A status handler reported a failure.
    #[error("status handler failed: {0}")]
    Handler(String),
}

/// Reporter configuration.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Period of metric recomputation and handler notification.
    /// Zero disables the periodic task.
    pub update_interval: Duration,
    /// Bound on a single handler call.
    pub handler_timeout: Duration,
    /// Events retained; older events are dropped first.
    pub max_events: usize,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            update_interval: Duration::from_secs(5),
            handler_timeout: Duration::from_secs(10),
            max_events: 1000,
        }
    }
}

impl ReporterConfig {
    pub fn with_update_interval(mut self, interval: Duration) -> Self {
        self.update_interval = interval;
        self
    }

    pub fn with_handler_timeout(mut self, timeout: Duration) -> Self {
        self.handler_timeout = timeout;
        self
    }

    pub fn with_max_events(mut self, max_events: usize) -> Self {
        self.max_events = max_events;
        self
    }
}

#[derive(Clone)]
struct HandlerSlot {
    handler: Arc<dyn StatusHandler>,
    busy: Arc<AtomicBool>,
}

struct LiveState {
    status: MigrationStatus,
    clock: Instant,
    durations: DurationHistogram,
    expect_verification: bool,
}

#[derive(Default)]
struct Inner {
    live: Option<LiveState>,
    handlers: Vec<HandlerSlot>,
}

/// Tracks the live status of one migration run.
///
/// All mutable state sits behind one lock that is never held across an
/// await point. Snapshots are copies. Each handler has at most one call in
/// flight, so a stalled handler only ever delays itself.
pub struct StatusReporter {
    id: MigrationId,
    config: ReporterConfig,
    inner: Mutex<Inner>,
    ticker: CancellationToken,
}

impl StatusReporter {
    /// Create a reporter. The periodic task stops when `cancel` fires.
    pub fn new(id: MigrationId, config: ReporterConfig, cancel: CancellationToken) -> Self {
        Self {
            id,
            config,
            inner: Mutex::new(Inner::default()),
            ticker: cancel.child_token(),
        }
    }

    pub fn id(&self) -> MigrationId {
        self.id
    }

    pub fn config(&self) -> &ReporterConfig {
        &self.config
    }

    /// Register an observer. The same handler may be registered more than once.
    pub fn add_handler(&self, handler: Arc<dyn StatusHandler>) {
        self.inner.lock().handlers.push(HandlerSlot {
            handler,
            busy: Arc::new(AtomicBool::new(false)),
        });
    }

    pub fn handler_count(&self) -> usize {
        self.inner.lock().handlers.len()
    }

    /// Begin tracking `plan`: every resource starts Pending and the phase
    /// is Initializing. Spawns the periodic task when a runtime is present.
    pub fn start(self: &Arc<Self>, plan: &MigrationPlan) -> Result<(), StatusError> {
        {
            let mut inner = self.inner.lock();
            if inner.live.is_some() {
                return Err(StatusError::AlreadyStarted);
            }

            let now = Utc::now();
            let mut status = MigrationStatus {
                id: self.id,
                plan: plan.clone(),
                phase: MigrationPhase::Initializing,
                progress: MigrationProgress {
                    total_resources: plan.resources.len(),
                    total_batches: plan.batch_count(),
                    ..Default::default()
                },
                resource_statuses: plan
                    .resources
                    .iter()
                    .map(|id| (id.clone(), ResourceMigrationStatus::pending()))
                    .collect(),
                metrics: MigrationMetrics::default(),
                events: Vec::new(),
                started_at: now,
                updated_at: now,
            };
            push_event(
                &mut status,
                self.config.max_events,
                EventType::Started,
                EventLevel::Info,
                format!(
                    "Migration started: {} resource(s) from {} to {}",
                    plan.resources.len(),
                    plan.source_type,
                    plan.target_type
                ),
                None,
            );
            inner.live = Some(LiveState {
                status,
                clock: Instant::now(),
                durations: DurationHistogram::new(),
                expect_verification: false,
            });
        }

        tracing::info!(
            migration_id = %self.id,
            resources = plan.resources.len(),
            "status reporting started"
        );
        self.spawn_ticker();
        Ok(())
    }

    fn spawn_ticker(self: &Arc<Self>) {
        let period = self.config.update_interval;
        if period.is_zero() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(migration_id = %self.id, "no runtime, periodic status disabled");
            return;
        };

        let weak = Arc::downgrade(self);
        let token = self.ticker.clone();
        runtime.spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            // The first tick completes immediately.
            interval.tick().await;
            loop {
                tokio::select! {
                    biased;
                    _ = token.cancelled() => break,
                    _ = interval.tick() => {
                        let Some(reporter) = weak.upgrade() else { break };
                        reporter.tick();
                    }
                }
            }
        });
    }

    fn with_live<T>(&self, f: impl FnOnce(&mut LiveState) -> T) -> Result<T, StatusError> {
        let mut inner = self.inner.lock();
        let live = inner.live.as_mut().ok_or(StatusError::NotStarted)?;
        let value = f(live);
        live.status.updated_at = Utc::now();
        Ok(value)
    }

    /// Current phase, if started.
    pub fn phase(&self) -> Option<MigrationPhase> {
        self.inner.lock().live.as_ref().map(|live| live.status.phase)
    }

    /// Explicitly change the phase.
    pub fn set_phase(&self, phase: MigrationPhase) -> Result<(), StatusError> {
        let max_events = self.config.max_events;
        self.with_live(|live| {
            let current = live.status.phase;
            if current == phase {
                return Ok(());
            }
            if !current.can_transition(phase) {
                return Err(StatusError::InvalidTransition {
                    from: current,
                    to: phase,
                });
            }
            change_phase(&mut live.status, max_events, phase);
            Ok(())
        })?
    }

    /// Record that the current batch is `batch` (1-based).
    pub fn begin_batch(&self, batch: usize) -> Result<(), StatusError> {
        self.with_live(|live| live.status.progress.current_batch = batch)
    }

    /// Transition one resource and re-derive progress and phase.
    pub fn update_resource_status(
        &self,
        identity: &ResourceIdentity,
        state: ResourceState,
        message: Option<&str>,
    ) -> Result<(), StatusError> {
        let max_events = self.config.max_events;
        self.with_live(|live| {
            let now = Utc::now();
            let entry = live
                .status
                .resource_statuses
                .get_mut(identity)
                .ok_or_else(|| StatusError::UnknownResource(identity.clone()))?;

            let previous = entry.state;
            entry.state = state;
            match state {
                ResourceState::Pending => {}
                ResourceState::InProgress => {
                    entry.start_time.get_or_insert(now);
                }
                ResourceState::Retrying => {
                    entry.retry_count += 1;
                    entry.error = message.map(str::to_string);
                }
                ResourceState::Completed | ResourceState::Failed | ResourceState::Skipped => {
                    let start = *entry.start_time.get_or_insert(now);
                    entry.end_time = Some(now);
                    if state == ResourceState::Failed {
                        entry.error = message.map(str::to_string);
                    }
                    if state != ResourceState::Skipped {
                        let elapsed = (now - start).num_milliseconds().max(0) as u64;
                        live.durations.observe(elapsed);
                    }
                }
            }

            let (event_type, level) = match state {
                ResourceState::Completed | ResourceState::Failed => {
                    let level = if state == ResourceState::Failed {
                        EventLevel::Error
                    } else {
                        EventLevel::Info
                    };
                    (EventType::ResourceDone, level)
                }
                ResourceState::Retrying => (EventType::Progress, EventLevel::Warning),
                _ => (EventType::Progress, EventLevel::Info),
            };
            let mut text = format!("Resource {identity} transitioned from {previous} to {state}");
            if let Some(message) = message {
                text.push_str(": ");
                text.push_str(message);
            }
            tracing::debug!(
                migration_id = %live.status.id,
                resource = %identity,
                from = %previous,
                to = %state,
                "resource status changed"
            );
            push_event(
                &mut live.status,
                max_events,
                event_type,
                level,
                text,
                Some(identity.clone()),
            );

            if previous.is_terminal() || state.is_terminal() {
                let counts = count_states(&live.status);
                derive_phase(live, max_events, counts);
            }
            Ok(())
        })?
    }

    /// Overwrite the terminal counters and re-derive the phase.
    pub fn update_progress(&self, counts: ProgressCounts) -> Result<(), StatusError> {
        let max_events = self.config.max_events;
        self.with_live(|live| derive_phase(live, max_events, counts))
    }

    /// Stop phase derivation at Verifying once every resource is processed.
    pub fn expect_verification(&self) -> Result<(), StatusError> {
        self.with_live(|live| live.expect_verification = true)
    }

    /// Finish the Verifying phase.
    pub fn complete_verification(&self, success: bool) -> Result<(), StatusError> {
        let max_events = self.config.max_events;
        self.with_live(|live| {
            let current = live.status.phase;
            if current != MigrationPhase::Verifying {
                return Err(StatusError::InvalidTransition {
                    from: current,
                    to: MigrationPhase::Completed,
                });
            }
            let next = if success && live.status.progress.failed_resources == 0 {
                MigrationPhase::Completed
            } else {
                MigrationPhase::Failed
            };
            if !success {
                push_event(
                    &mut live.status,
                    max_events,
                    EventType::Error,
                    EventLevel::Error,
                    "Post-migration validation failed".to_string(),
                    None,
                );
            }
            change_phase(&mut live.status, max_events, next);
            Ok(())
        })?
    }

    /// Move to Failed from any non-terminal phase.
    pub fn mark_failed(&self, reason: &str) -> Result<(), StatusError> {
        let max_events = self.config.max_events;
        self.with_live(|live| {
            push_event(
                &mut live.status,
                max_events,
                EventType::Error,
                EventLevel::Error,
                reason.to_string(),
                None,
            );
            if !live.status.phase.is_terminal() {
                change_phase(&mut live.status, max_events, MigrationPhase::Failed);
            }
        })
    }

    pub fn add_warning(
        &self,
        message: impl Into<String>,
        resource: Option<&ResourceIdentity>,
    ) -> Result<(), StatusError> {
        let message = message.into();
        let max_events = self.config.max_events;
        self.with_live(|live| {
            tracing::warn!(migration_id = %live.status.id, "{message}");
            push_event(
                &mut live.status,
                max_events,
                EventType::Warning,
                EventLevel::Warning,
                message,
                resource.cloned(),
            );
        })
    }

    pub fn add_error(
        &self,
        message: impl Into<String>,
        resource: Option<&ResourceIdentity>,
    ) -> Result<(), StatusError> {
        let message = message.into();
        let max_events = self.config.max_events;
        self.with_live(|live| {
            push_event(
                &mut live.status,
                max_events,
                EventType::Error,
                EventLevel::Error,
                message,
                resource.cloned(),
            );
        })
    }

    pub fn record_rollback(&self, message: impl Into<String>) -> Result<(), StatusError> {
        let message = message.into();
        let max_events = self.config.max_events;
        self.with_live(|live| {
            push_event(
                &mut live.status,
                max_events,
                EventType::Rollback,
                EventLevel::Info,
                message,
                None,
            );
        })
    }

    /// Copy of the current status with fresh metrics.
    pub fn snapshot(&self) -> Result<MigrationStatus, StatusError> {
        let mut inner = self.inner.lock();
        let live = inner.live.as_mut().ok_or(StatusError::NotStarted)?;
        refresh_metrics(live);
        Ok(live.status.clone())
    }

    pub fn generate_report(&self) -> Result<StatusReport, StatusError> {
        Ok(StatusReport::from_status(&self.snapshot()?))
    }

    /// Recompute metrics and notify every handler.
    pub fn tick(&self) {
        let (status, handlers) = {
            let mut inner = self.inner.lock();
            let Some(live) = inner.live.as_mut() else {
                return;
            };
            refresh_metrics(live);
            let status = Arc::new(live.status.clone());
            (status, inner.handlers.clone())
        };
        self.dispatch(status, handlers);
    }

    fn dispatch(&self, status: Arc<MigrationStatus>, handlers: Vec<HandlerSlot>) {
        if handlers.is_empty() {
            return;
        }
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::debug!(migration_id = %self.id, "no runtime, skipping handler dispatch");
            return;
        };

        for slot in handlers {
            if slot.busy.swap(true, Ordering::AcqRel) {
                tracing::debug!(
                    migration_id = %self.id,
                    handler = slot.handler.name(),
                    "handler still busy, skipping tick"
                );
                continue;
            }

            let status = status.clone();
            let timeout = self.config.handler_timeout;
            runtime.spawn(async move {
                let HandlerSlot { handler, busy } = slot;
                let call = AssertUnwindSafe(handler.handle_status_update(&status)).catch_unwind();
                match tokio::time::timeout(timeout, call).await {
                    Ok(Ok(Ok(()))) => {}
                    Ok(Ok(Err(e))) => {
                        tracing::warn!(handler = handler.name(), error = %e, "status handler failed");
                    }
                    Ok(Err(_)) => {
                        tracing::error!(handler = handler.name(), "status handler panicked");
                    }
                    Err(_) => {
                        tracing::warn!(
                            handler = handler.name(),
                            timeout_ms = timeout.as_millis() as u64,
                            "status handler timed out"
                        );
                    }
                }
                busy.store(false, Ordering::Release);
            });
        }
    }

    /// Final metrics refresh and notification; stops the periodic task.
    pub fn finish(&self) -> Result<(), StatusError> {
        if self.inner.lock().live.is_none() {
            return Err(StatusError::NotStarted);
        }
        self.tick();
        self.stop();
        Ok(())
    }

    /// Stop the periodic task without a final notification.
    pub fn stop(&self) {
        self.ticker.cancel();
    }
}

impl Drop for StatusReporter {
    fn drop(&mut self) {
        self.ticker.cancel();
    }
}

fn push_event(
    status: &mut MigrationStatus,
    max_events: usize,
    event_type: EventType,
    level: EventLevel,
    message: String,
    resource: Option<ResourceIdentity>,
) {
    if max_events == 0 {
        return;
    }
    if status.events.len() >= max_events {
        let overflow = status.events.len() + 1 - max_events;
        status.events.drain(..overflow);
    }
    status.events.push(MigrationEvent {
        timestamp: Utc::now(),
        event_type,
        level,
        message,
        resource,
    });
}

fn change_phase(status: &mut MigrationStatus, max_events: usize, next: MigrationPhase) {
    let previous = status.phase;
    if previous == next {
        return;
    }
    status.phase = next;
    tracing::info!(migration_id = %status.id, from = %previous, to = %next, "migration phase changed");

    let (event_type, level) = match next {
        MigrationPhase::Completed => (EventType::Completed, EventLevel::Info),
        MigrationPhase::Failed => (EventType::Completed, EventLevel::Error),
        MigrationPhase::RollingBack => (EventType::Rollback, EventLevel::Warning),
        _ => (EventType::Progress, EventLevel::Info),
    };
    push_event(
        status,
        max_events,
        event_type,
        level,
        format!("Phase changed from {previous} to {next}"),
        None,
    );
}

fn count_states(status: &MigrationStatus) -> ProgressCounts {
    let mut counts = ProgressCounts::default();
    for resource in status.resource_statuses.values() {
        match resource.state {
            ResourceState::Completed => counts.successful += 1,
            ResourceState::Failed => counts.failed += 1,
            ResourceState::Skipped => counts.skipped += 1,
            _ => {}
        }
    }
    counts
}

/// Migrating while resources remain; Completed or Failed once all are
/// processed, unless verification is still expected.
fn derive_phase(live: &mut LiveState, max_events: usize, counts: ProgressCounts) {
    let status = &mut live.status;
    status.progress.apply(counts);
    if status.phase.is_terminal() {
        return;
    }

    let progress = &status.progress;
    let next = if progress.processed_resources < progress.total_resources {
        MigrationPhase::Migrating
    } else if live.expect_verification {
        MigrationPhase::Verifying
    } else if progress.failed_resources == 0 {
        MigrationPhase::Completed
    } else {
        MigrationPhase::Failed
    };
    if status.phase.can_transition(next) {
        change_phase(status, max_events, next);
    }
}

fn refresh_metrics(live: &mut LiveState) {
    let elapsed = live.clock.elapsed().as_secs_f64();
    let retries = live.status.total_retries();
    let progress = &live.status.progress;
    let processed = progress.processed_resources as f64;

    let resources_per_second = if elapsed > 0.0 { processed / elapsed } else { 0.0 };
    let eta_seconds = if progress.remaining() == 0 {
        Some(0.0)
    } else if resources_per_second > 0.0 {
        Some(progress.remaining() as f64 / resources_per_second)
    } else {
        None
    };

    live.status.metrics = MigrationMetrics {
        elapsed_seconds: elapsed,
        resources_per_second,
        success_rate: if processed > 0.0 {
            progress.successful_resources as f64 / processed * 100.0
        } else {
            0.0
        },
        retry_rate: if processed > 0.0 {
            retries as f64 / processed
        } else {
            0.0
        },
        average_resource_ms: live.durations.mean(),
        p50_resource_ms: live.durations.p50(),
        p99_resource_ms: live.durations.p99(),
        eta_seconds,
    };
}

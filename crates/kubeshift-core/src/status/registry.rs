//! Caller-owned migration contexts and the registry of live reporters.

use dashmap::DashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::reporter::{ReporterConfig, StatusReporter};
use super::types::MigrationStatus;
use crate::migration::MigrationId;

/// Everything one migration run needs besides the plan: its id, its
/// cancellation token and its reporter.
#[derive(Clone)]
pub struct MigrationContext {
    id: MigrationId,
    cancel: CancellationToken,
    reporter: Arc<StatusReporter>,
}

impl MigrationContext {
    pub fn new(config: ReporterConfig) -> Self {
        Self::with_cancel(config, CancellationToken::new())
    }

    /// Create a context cancelled together with `cancel`.
    pub fn with_cancel(config: ReporterConfig, cancel: CancellationToken) -> Self {
        let id = MigrationId::generate();
        Self {
            id,
            reporter: Arc::new(StatusReporter::new(id, config, cancel.clone())),
            cancel,
        }
    }

    pub fn id(&self) -> MigrationId {
        self.id
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn reporter(&self) -> &Arc<StatusReporter> {
        &self.reporter
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// Live reporters keyed by migration id.
#[derive(Default)]
pub struct StatusRegistry {
    reporters: DashMap<MigrationId, Arc<StatusReporter>>,
}

impl StatusRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a context and register its reporter.
    pub fn create(&self, config: ReporterConfig) -> MigrationContext {
        let ctx = MigrationContext::new(config);
        self.register(&ctx);
        ctx
    }

    pub fn register(&self, ctx: &MigrationContext) {
        self.reporters.insert(ctx.id(), ctx.reporter().clone());
    }

    pub fn get(&self, id: &MigrationId) -> Option<Arc<StatusReporter>> {
        self.reporters.get(id).map(|entry| entry.value().clone())
    }

    /// Snapshot of a started migration.
    pub fn snapshot(&self, id: &MigrationId) -> Option<MigrationStatus> {
        self.get(id)?.snapshot().ok()
    }

    pub fn remove(&self, id: &MigrationId) -> Option<Arc<StatusReporter>> {
        self.reporters.remove(id).map(|(_, reporter)| reporter)
    }

    /// Ids of migrations that have started and not reached a terminal phase.
    pub fn active(&self) -> Vec<MigrationId> {
        let mut ids: Vec<MigrationId> = self
            .reporters
            .iter()
            .filter(|entry| matches!(entry.value().phase(), Some(phase) if !phase.is_terminal()))
            .map(|entry| *entry.key())
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.reporters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reporters.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::migration::MigrationPlan;
    use crate::resource::{ResourceIdentity, ResourceType};
    use crate::status::MigrationPhase;
    use std::time::Duration;

    fn plan() -> MigrationPlan {
        MigrationPlan::new(
            ResourceType::new("observability.io", "v1beta1", "Platform"),
            ResourceType::new("observability.io", "v1", "Platform"),
            vec![ResourceIdentity::new("ns", "p")],
        )
    }

    #[tokio::test]
    async fn test_registry_tracks_concurrent_migrations() {
        let registry = StatusRegistry::new();
        let config = ReporterConfig::default().with_update_interval(Duration::ZERO);
        let first = registry.create(config.clone());
        let second = registry.create(config);
        assert_ne!(first.id(), second.id());
        assert_eq!(registry.len(), 2);

        first.reporter().start(&plan()).unwrap();
        second.reporter().start(&plan()).unwrap();
        second.reporter().set_phase(MigrationPhase::Completed).unwrap();

        assert_eq!(registry.active(), vec![first.id()]);
        assert_eq!(
            registry.snapshot(&second.id()).unwrap().phase,
            MigrationPhase::Completed
        );

        registry.remove(&first.id());
        assert!(registry.get(&first.id()).is_none());
        assert!(registry.active().is_empty());
    }

    #[test]
    fn test_context_cancel() {
        let parent = CancellationToken::new();
        let ctx = MigrationContext::with_cancel(ReporterConfig::default(), parent.clone());
        assert!(!ctx.is_cancelled());
        parent.cancel();
        assert!(ctx.is_cancelled());
    }
}

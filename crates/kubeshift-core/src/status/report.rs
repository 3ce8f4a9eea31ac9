//! Human-readable status reports.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::types::{
    EventLevel, MigrationEvent, MigrationMetrics, MigrationPhase, MigrationProgress,
    MigrationStatus, ResourceState,
};
use crate::migration::MigrationId;
use crate::resource::ResourceIdentity;

/// Point-in-time report derived from a [`MigrationStatus`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub id: MigrationId,
    pub phase: MigrationPhase,
    pub started_at: DateTime<Utc>,
    pub generated_at: DateTime<Utc>,
    pub progress: MigrationProgress,
    pub metrics: MigrationMetrics,
    pub summary: String,
    pub resources_by_state: BTreeMap<ResourceState, Vec<ResourceIdentity>>,
    /// Error-level events, oldest first.
    pub errors: Vec<MigrationEvent>,
}

impl StatusReport {
    pub fn from_status(status: &MigrationStatus) -> Self {
        let mut resources_by_state: BTreeMap<ResourceState, Vec<ResourceIdentity>> = BTreeMap::new();
        for (identity, resource) in &status.resource_statuses {
            resources_by_state
                .entry(resource.state)
                .or_default()
                .push(identity.clone());
        }

        Self {
            id: status.id,
            phase: status.phase,
            started_at: status.started_at,
            generated_at: Utc::now(),
            progress: status.progress.clone(),
            metrics: status.metrics.clone(),
            summary: summarize(status),
            resources_by_state,
            errors: status
                .events
                .iter()
                .filter(|e| e.level == EventLevel::Error)
                .cloned()
                .collect(),
        }
    }

    pub fn resources_in(&self, state: ResourceState) -> &[ResourceIdentity] {
        self.resources_by_state
            .get(&state)
            .map(Vec::as_slice)
            .unwrap_or_default()
    }
}

fn summarize(status: &MigrationStatus) -> String {
    let progress = &status.progress;
    let metrics = &status.metrics;
    format!(
        "Migration {}: {}\n\
         Progress: {}/{} resources ({:.1}%)\n\
         Success: {}, Failed: {}, Skipped: {}\n\
         Duration: {:.0}s, Rate: {:.2} resources/sec\n\
         Success Rate: {:.1}%, Retry Rate: {:.2}",
        status.id,
        status.phase,
        progress.processed_resources,
        progress.total_resources,
        progress.percent_complete,
        progress.successful_resources,
        progress.failed_resources,
        progress.skipped_resources,
        metrics.elapsed_seconds,
        metrics.resources_per_second,
        metrics.success_rate,
        metrics.retry_rate,
    )
}

#[cfg(test)]
mod tests {
    use crate::migration::{MigrationId, MigrationPlan};
    use crate::resource::{ResourceIdentity, ResourceType};
    use crate::status::{ReporterConfig, ResourceState, StatusReporter};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    #[tokio::test]
    async fn test_report_groups_resources() {
        let plan = MigrationPlan::new(
            ResourceType::new("observability.io", "v1beta1", "Platform"),
            ResourceType::new("observability.io", "v1", "Platform"),
            vec![
                ResourceIdentity::new("a", "one"),
                ResourceIdentity::new("a", "two"),
                ResourceIdentity::new("b", "three"),
            ],
        );
        let reporter = Arc::new(StatusReporter::new(
            MigrationId::generate(),
            ReporterConfig::default().with_update_interval(Duration::ZERO),
            CancellationToken::new(),
        ));
        reporter.start(&plan).unwrap();
        reporter
            .update_resource_status(&plan.resources[0], ResourceState::Completed, None)
            .unwrap();
        reporter
            .update_resource_status(&plan.resources[1], ResourceState::Failed, Some("conflict"))
            .unwrap();

        let report = reporter.generate_report().unwrap();
        assert_eq!(report.resources_in(ResourceState::Completed), &plan.resources[..1]);
        assert_eq!(report.resources_in(ResourceState::Failed), &plan.resources[1..2]);
        assert_eq!(report.resources_in(ResourceState::Pending), &plan.resources[2..]);
        assert!(report.resources_in(ResourceState::Skipped).is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(report.summary.contains("Progress: 2/3 resources (66.7%)"));
        assert!(report.summary.contains("Success: 1, Failed: 1, Skipped: 0"));
    }
}

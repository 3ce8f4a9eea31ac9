//! Live status data model.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use crate::migration::{MigrationId, MigrationPlan};
use crate::resource::ResourceIdentity;

/// Phase of a migration run.
///
/// Phases advance monotonically through
/// `Initializing < Validating < Migrating < Verifying < {Completed, Failed}`.
/// `RollingBack` is only reachable from `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum MigrationPhase {
    Initializing,
    Validating,
    Migrating,
    Verifying,
    Completed,
    Failed,
    RollingBack,
}

impl MigrationPhase {
    fn rank(self) -> u8 {
        match self {
            MigrationPhase::Initializing => 0,
            MigrationPhase::Validating => 1,
            MigrationPhase::Migrating => 2,
            MigrationPhase::Verifying => 3,
            MigrationPhase::Completed | MigrationPhase::Failed => 4,
            MigrationPhase::RollingBack => 5,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            MigrationPhase::Completed | MigrationPhase::Failed | MigrationPhase::RollingBack
        )
    }

    /// Whether an explicit change from `self` to `next` is allowed.
    pub fn can_transition(self, next: MigrationPhase) -> bool {
        match (self, next) {
            (MigrationPhase::Failed, MigrationPhase::RollingBack) => true,
            (_, MigrationPhase::RollingBack) => false,
            (current, _) if current.is_terminal() => false,
            (current, next) => next.rank() >= current.rank(),
        }
    }
}

impl fmt::Display for MigrationPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            MigrationPhase::Initializing => "Initializing",
            MigrationPhase::Validating => "Validating",
            MigrationPhase::Migrating => "Migrating",
            MigrationPhase::Verifying => "Verifying",
            MigrationPhase::Completed => "Completed",
            MigrationPhase::Failed => "Failed",
            MigrationPhase::RollingBack => "RollingBack",
        };
        f.write_str(name)
    }
}

/// State of one resource within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ResourceState {
    Pending,
    InProgress,
    Retrying,
    Completed,
    Failed,
    Skipped,
}

impl ResourceState {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ResourceState::Completed | ResourceState::Failed | ResourceState::Skipped
        )
    }
}

impl fmt::Display for ResourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ResourceState::Pending => "Pending",
            ResourceState::InProgress => "InProgress",
            ResourceState::Retrying => "Retrying",
            ResourceState::Completed => "Completed",
            ResourceState::Failed => "Failed",
            ResourceState::Skipped => "Skipped",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceMigrationStatus {
    pub state: ResourceState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResourceMigrationStatus {
    pub(crate) fn pending() -> Self {
        Self {
            state: ResourceState::Pending,
            start_time: None,
            end_time: None,
            retry_count: 0,
            error: None,
        }
    }

    /// Time between the first attempt and the terminal state.
    pub fn duration(&self) -> Option<chrono::Duration> {
        Some(self.end_time? - self.start_time?)
    }
}

/// Terminal resource counts reported by the executor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProgressCounts {
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
}

impl ProgressCounts {
    pub fn processed(&self) -> usize {
        self.successful + self.failed + self.skipped
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationProgress {
    pub total_resources: usize,
    pub processed_resources: usize,
    pub successful_resources: usize,
    pub failed_resources: usize,
    pub skipped_resources: usize,
    pub percent_complete: f64,
    pub current_batch: usize,
    pub total_batches: usize,
}

impl MigrationProgress {
    pub(crate) fn apply(&mut self, counts: ProgressCounts) {
        self.successful_resources = counts.successful;
        self.failed_resources = counts.failed;
        self.skipped_resources = counts.skipped;
        self.processed_resources = counts.processed();
        self.percent_complete = if self.total_resources == 0 {
            100.0
        } else {
            self.processed_resources as f64 / self.total_resources as f64 * 100.0
        };
    }

    pub fn remaining(&self) -> usize {
        self.total_resources.saturating_sub(self.processed_resources)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationMetrics {
    pub elapsed_seconds: f64,
    pub resources_per_second: f64,
    /// Percent of processed resources that succeeded.
    pub success_rate: f64,
    /// Retries per processed resource.
    pub retry_rate: f64,
    pub average_resource_ms: f64,
    pub p50_resource_ms: u64,
    pub p99_resource_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eta_seconds: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventType {
    Started,
    Progress,
    ResourceDone,
    Warning,
    Error,
    Completed,
    Rollback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum EventLevel {
    Info,
    Warning,
    Error,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationEvent {
    pub timestamp: DateTime<Utc>,
    pub event_type: EventType,
    pub level: EventLevel,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource: Option<ResourceIdentity>,
}

/// Snapshot of a migration run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationStatus {
    pub id: MigrationId,
    pub plan: MigrationPlan,
    pub phase: MigrationPhase,
    pub progress: MigrationProgress,
    pub resource_statuses: BTreeMap<ResourceIdentity, ResourceMigrationStatus>,
    pub metrics: MigrationMetrics,
    /// Most recent events, oldest first.
    pub events: Vec<MigrationEvent>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MigrationStatus {
    pub fn resource(&self, identity: &ResourceIdentity) -> Option<&ResourceMigrationStatus> {
        self.resource_statuses.get(identity)
    }

    pub fn total_retries(&self) -> u64 {
        self.resource_statuses
            .values()
            .map(|s| u64::from(s.retry_count))
            .sum()
    }
}

//! Status and metrics reporting.
//!
//! A [`StatusReporter`] holds the live [`MigrationStatus`] of one run,
//! recomputes metrics on an interval and fans snapshots out to registered
//! [`StatusHandler`]s. A [`MigrationContext`] bundles the reporter with the
//! run's id and cancellation token; a [`StatusRegistry`] indexes contexts
//! when several migrations run at once.

pub mod handler;
pub mod histogram;
pub mod registry;
pub mod report;
pub mod reporter;
pub mod types;

pub use handler::{ChannelStatusHandler, StatusHandler, TracingStatusHandler};
pub use histogram::DurationHistogram;
pub use registry::{MigrationContext, StatusRegistry};
pub use report::StatusReport;
pub use reporter::{ReporterConfig, StatusError, StatusReporter};
pub use types::{
    EventLevel, EventType, MigrationEvent, MigrationMetrics, MigrationPhase, MigrationProgress,
    MigrationStatus, ProgressCounts, ResourceMigrationStatus, ResourceState,
};

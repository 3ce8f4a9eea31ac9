//! Status observers.

use async_trait::async_trait;
use tokio::sync::mpsc;

use super::reporter::StatusError;
use super::types::MigrationStatus;

/// Receives periodic status snapshots.
///
/// Each handler is invoked on its own task with a timeout. A handler that
/// is still running when the next tick fires misses that tick.
#[async_trait]
pub trait StatusHandler: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    async fn handle_status_update(&self, status: &MigrationStatus) -> Result<(), StatusError>;
}

/// Logs a one-line summary of every snapshot.
#[derive(Debug, Default)]
pub struct TracingStatusHandler;

#[async_trait]
impl StatusHandler for TracingStatusHandler {
    fn name(&self) -> &str {
        "tracing"
    }

    async fn handle_status_update(&self, status: &MigrationStatus) -> Result<(), StatusError> {
        tracing::info!(
            migration_id = %status.id,
            phase = %status.phase,
            processed = status.progress.processed_resources,
            total = status.progress.total_resources,
            failed = status.progress.failed_resources,
            rate = status.metrics.resources_per_second,
            "migration status"
        );
        Ok(())
    }
}

/// Forwards snapshots into a bounded channel.
///
/// A full channel drops the snapshot rather than waiting.
pub struct ChannelStatusHandler {
    sender: mpsc::Sender<MigrationStatus>,
}

impl ChannelStatusHandler {
    /// Create a handler and the receiving end of its channel.
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<MigrationStatus>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }
}

#[async_trait]
impl StatusHandler for ChannelStatusHandler {
    fn name(&self) -> &str {
        "channel"
    }

    async fn handle_status_update(&self, status: &MigrationStatus) -> Result<(), StatusError> {
        self.sender
            .try_send(status.clone())
            .map_err(|e| StatusError::Handler(format!("channel: {e}")))
    }
}

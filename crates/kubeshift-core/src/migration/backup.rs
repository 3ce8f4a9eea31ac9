//! Pre-mutation snapshots.
//!
//! The executor saves a [`Backup`] of every resource immediately before
//! writing its converted form. Rollback restores the latest backup taken by
//! a run.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::id::MigrationId;
use super::plan::MigrationPlan;
use crate::resource::{GroupKind, Resource, ResourceIdentity, ResourceType};

/// Backup store errors.
#[derive(Debug, Error)]
pub enum BackupError {
    /// Storage layer error.
    #[error("storage error: {0}")]
    Storage(#[from] sled::Error),

    /// Backup could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Where a backup came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupProvenance {
    pub migration_id: MigrationId,
    pub source_type: ResourceType,
    pub target_type: ResourceType,
    pub original_uid: String,
    pub original_resource_version: String,
}

/// Immutable snapshot of a resource before mutation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Backup {
    pub resource: Resource,
    pub taken_at: DateTime<Utc>,
    pub provenance: BackupProvenance,
}

impl Backup {
    /// Snapshot `resource` as it is about to be migrated by `plan`.
    pub fn capture(resource: &Resource, migration_id: MigrationId, plan: &MigrationPlan) -> Self {
        Self {
            resource: resource.clone(),
            taken_at: Utc::now(),
            provenance: BackupProvenance {
                migration_id,
                source_type: plan.source_type.clone(),
                target_type: plan.target_type.clone(),
                original_uid: resource.metadata.uid.clone(),
                original_resource_version: resource.metadata.resource_version.clone(),
            },
        }
    }

    pub fn identity(&self) -> ResourceIdentity {
        self.resource.identity()
    }

    pub fn group_kind(&self) -> GroupKind {
        self.resource.group_kind()
    }
}

/// Persistence for backups. Append-only.
#[async_trait]
pub trait BackupStore: Send + Sync {
    async fn save(&self, backup: Backup) -> Result<(), BackupError>;

    /// Most recently saved backup of a resource, across all runs.
    async fn latest(
        &self,
        kind: &GroupKind,
        identity: &ResourceIdentity,
    ) -> Result<Option<Backup>, BackupError>;

    /// Every backup taken by one run, in save order.
    async fn list(&self, migration_id: MigrationId) -> Result<Vec<Backup>, BackupError>;
}

/// In-memory backup store.
#[derive(Debug, Default)]
pub struct InMemoryBackupStore {
    backups: RwLock<Vec<Backup>>,
}

impl InMemoryBackupStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.backups.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.backups.read().is_empty()
    }
}

#[async_trait]
impl BackupStore for InMemoryBackupStore {
    async fn save(&self, backup: Backup) -> Result<(), BackupError> {
        self.backups.write().push(backup);
        Ok(())
    }

    async fn latest(
        &self,
        kind: &GroupKind,
        identity: &ResourceIdentity,
    ) -> Result<Option<Backup>, BackupError> {
        Ok(self
            .backups
            .read()
            .iter()
            .rev()
            .find(|b| b.group_kind() == *kind && b.identity() == *identity)
            .cloned())
    }

    async fn list(&self, migration_id: MigrationId) -> Result<Vec<Backup>, BackupError> {
        Ok(self
            .backups
            .read()
            .iter()
            .filter(|b| b.provenance.migration_id == migration_id)
            .cloned()
            .collect())
    }
}

/// Sled-backed backup store.
///
/// Backups live in one tree keyed by migration id and sequence number; a
/// second tree indexes them by resource.
pub struct SledBackupStore {
    db: sled::Db,
    backups: sled::Tree,
    by_resource: sled::Tree,
}

impl SledBackupStore {
    /// Tree holding encoded backups.
    pub const TREE_NAME: &'static str = "migration:backups";

    /// Tree indexing backups by resource.
    pub const INDEX_TREE_NAME: &'static str = "migration:backups:by-resource";

    /// Open or create the backup trees.
    pub fn open(db: &sled::Db) -> Result<Self, BackupError> {
        Ok(Self {
            db: db.clone(),
            backups: db.open_tree(Self::TREE_NAME)?,
            by_resource: db.open_tree(Self::INDEX_TREE_NAME)?,
        })
    }

    fn backup_key(migration_id: &MigrationId, seq: u64) -> Vec<u8> {
        let mut key = Vec::with_capacity(24);
        key.extend_from_slice(migration_id.as_bytes());
        key.extend_from_slice(&seq.to_be_bytes());
        key
    }

    fn resource_prefix(kind: &GroupKind, identity: &ResourceIdentity) -> Vec<u8> {
        let mut prefix = format!("{kind}/{identity}").into_bytes();
        prefix.push(0);
        prefix
    }
}

#[async_trait]
impl BackupStore for SledBackupStore {
    async fn save(&self, backup: Backup) -> Result<(), BackupError> {
        let seq = self.db.generate_id()?;
        let key = Self::backup_key(&backup.provenance.migration_id, seq);
        let value = serde_json::to_vec(&backup)?;

        let mut index_key = Self::resource_prefix(&backup.group_kind(), &backup.identity());
        index_key.extend_from_slice(&seq.to_be_bytes());

        self.backups.insert(&key, value)?;
        self.by_resource.insert(index_key, key)?;
        Ok(())
    }

    async fn latest(
        &self,
        kind: &GroupKind,
        identity: &ResourceIdentity,
    ) -> Result<Option<Backup>, BackupError> {
        let prefix = Self::resource_prefix(kind, identity);
        let Some(entry) = self.by_resource.scan_prefix(prefix).next_back() else {
            return Ok(None);
        };
        let (_, backup_key) = entry?;
        match self.backups.get(backup_key)? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn list(&self, migration_id: MigrationId) -> Result<Vec<Backup>, BackupError> {
        let mut backups = Vec::new();
        for entry in self.backups.scan_prefix(migration_id.as_bytes()) {
            let (_, value) = entry?;
            backups.push(serde_json::from_slice(&value)?);
        }
        Ok(backups)
    }
}

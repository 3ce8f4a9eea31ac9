//! Persistence for schema history.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::HashMap;

use super::error::EvolutionError;
use super::types::{MigrationRecord, SchemaEvolution};
use crate::resource::GroupKind;

/// Pluggable storage for evolutions and migration history.
#[async_trait]
pub trait SchemaStorage: Send + Sync {
    /// Replace the stored evolution of a kind.
    async fn save_evolution(&self, evolution: &SchemaEvolution) -> Result<(), EvolutionError>;

    async fn load_evolution(
        &self,
        kind: &GroupKind,
    ) -> Result<Option<SchemaEvolution>, EvolutionError>;

    /// Append one history record.
    async fn save_migration_history(&self, record: &MigrationRecord) -> Result<(), EvolutionError>;

    /// The most recent `limit` records, oldest first. Zero means all.
    async fn load_migration_history(&self, limit: usize) -> Result<Vec<MigrationRecord>, EvolutionError>;
}

#[derive(Default)]
struct Stored {
    evolutions: HashMap<GroupKind, SchemaEvolution>,
    history: Vec<MigrationRecord>,
}

/// In-memory schema storage.
#[derive(Default)]
pub struct InMemorySchemaStorage {
    inner: RwLock<Stored>,
}

impl InMemorySchemaStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SchemaStorage for InMemorySchemaStorage {
    async fn save_evolution(&self, evolution: &SchemaEvolution) -> Result<(), EvolutionError> {
        self.inner
            .write()
            .evolutions
            .insert(evolution.group_kind.clone(), evolution.clone());
        Ok(())
    }

    async fn load_evolution(
        &self,
        kind: &GroupKind,
    ) -> Result<Option<SchemaEvolution>, EvolutionError> {
        Ok(self.inner.read().evolutions.get(kind).cloned())
    }

    async fn save_migration_history(&self, record: &MigrationRecord) -> Result<(), EvolutionError> {
        self.inner.write().history.push(record.clone());
        Ok(())
    }

    async fn load_migration_history(&self, limit: usize) -> Result<Vec<MigrationRecord>, EvolutionError> {
        let inner = self.inner.read();
        let history = &inner.history;
        let start = match limit {
            0 => 0,
            n => history.len().saturating_sub(n),
        };
        Ok(history[start..].to_vec())
    }
}

/// Sled-backed schema storage.
///
/// Evolutions are keyed by `Kind.group`; history records by a monotonic
/// big-endian sequence so iteration order is insertion order.
pub struct SledSchemaStorage {
    db: sled::Db,
    evolutions: sled::Tree,
    history: sled::Tree,
}

impl SledSchemaStorage {
    /// Tree holding one evolution per kind.
    pub const EVOLUTIONS_TREE: &'static str = "schema:evolutions";

    /// Tree holding migration history records.
    pub const HISTORY_TREE: &'static str = "schema:history";

    pub fn open(db: &sled::Db) -> Result<Self, EvolutionError> {
        Ok(Self {
            db: db.clone(),
            evolutions: db.open_tree(Self::EVOLUTIONS_TREE)?,
            history: db.open_tree(Self::HISTORY_TREE)?,
        })
    }

    /// Flush pending writes to disk.
    pub fn flush(&self) -> Result<(), EvolutionError> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl SchemaStorage for SledSchemaStorage {
    async fn save_evolution(&self, evolution: &SchemaEvolution) -> Result<(), EvolutionError> {
        let key = evolution.group_kind.to_string();
        self.evolutions
            .insert(key.as_bytes(), serde_json::to_vec(evolution)?)?;
        Ok(())
    }

    async fn load_evolution(
        &self,
        kind: &GroupKind,
    ) -> Result<Option<SchemaEvolution>, EvolutionError> {
        match self.evolutions.get(kind.to_string().as_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn save_migration_history(&self, record: &MigrationRecord) -> Result<(), EvolutionError> {
        let seq = self.db.generate_id()?;
        self.history
            .insert(seq.to_be_bytes(), serde_json::to_vec(record)?)?;
        Ok(())
    }

    async fn load_migration_history(&self, limit: usize) -> Result<Vec<MigrationRecord>, EvolutionError> {
        let take = if limit == 0 { usize::MAX } else { limit };
        let mut records = Vec::new();
        for entry in self.history.iter().rev().take(take) {
            let (_, value) = entry?;
            records.push(serde_json::from_slice(&value)?);
        }
        records.reverse();
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evolution::types::RecordStatus;
    use crate::migration::MigrationPlan;
    use crate::resource::{ResourceIdentity, ResourceType};

    fn record(count: usize) -> MigrationRecord {
        MigrationRecord::planned(&MigrationPlan::new(
            ResourceType::new("observability.io", "v1beta1", "Platform"),
            ResourceType::new("observability.io", "v1", "Platform"),
            (0..count)
                .map(|i| ResourceIdentity::new("ns", format!("p-{i}")))
                .collect(),
        ))
    }

    async fn exercise(storage: &dyn SchemaStorage) {
        let kind = GroupKind::new("observability.io", "Platform");
        assert!(storage.load_evolution(&kind).await.unwrap().is_none());

        let mut evolution = SchemaEvolution::new(kind.clone());
        evolution.current_version = Some("v1".to_string());
        storage.save_evolution(&evolution).await.unwrap();
        assert_eq!(storage.load_evolution(&kind).await.unwrap(), Some(evolution));

        for count in 1..=4 {
            storage.save_migration_history(&record(count)).await.unwrap();
        }
        let recent = storage.load_migration_history(2).await.unwrap();
        let totals: Vec<usize> = recent.iter().map(|r| r.total_resources).collect();
        assert_eq!(totals, [3, 4]);
        assert_eq!(storage.load_migration_history(0).await.unwrap().len(), 4);
        assert_eq!(storage.load_migration_history(10).await.unwrap().len(), 4);
        assert_eq!(recent[0].status, RecordStatus::Planned);
    }

    #[tokio::test]
    async fn test_in_memory_storage() {
        exercise(&InMemorySchemaStorage::new()).await;
    }

    #[tokio::test]
    async fn test_sled_storage() {
        let temp_dir = tempfile::tempdir().unwrap();
        let db = sled::open(temp_dir.path()).unwrap();
        exercise(&SledSchemaStorage::open(&db).unwrap()).await;
    }

    #[tokio::test]
    async fn test_sled_history_survives_reopen() {
        let temp_dir = tempfile::tempdir().unwrap();
        {
            let db = sled::open(temp_dir.path()).unwrap();
            let storage = SledSchemaStorage::open(&db).unwrap();
            storage.save_migration_history(&record(7)).await.unwrap();
            storage.flush().unwrap();
        }
        let db = sled::open(temp_dir.path()).unwrap();
        let storage = SledSchemaStorage::open(&db).unwrap();
        let history = storage.load_migration_history(0).await.unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].total_resources, 7);
    }
}

//! Field-level schema history and migration records per kind.

use chrono::Utc;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info};

use super::error::EvolutionError;
use super::storage::{InMemorySchemaStorage, SchemaStorage};
use super::types::{
    ChangeKind, DeprecatedPath, FieldChange, FieldDiff, FieldDiffKind, FieldInfo,
    MigrationRecord, MigrationReport, SchemaEvolution, VersionInfo,
};
use crate::migration::{MigrationPlan, MigrationResult};
use crate::resource::GroupKind;

/// Tracks how each kind's schema evolves and which migrations ran.
///
/// Evolutions are loaded from storage on first use and cached. Every
/// mutation is written through before the call returns.
pub struct SchemaEvolutionTracker {
    storage: Arc<dyn SchemaStorage>,
    cache: Mutex<HashMap<GroupKind, SchemaEvolution>>,
}

impl SchemaEvolutionTracker {
    /// Tracker backed by in-memory storage.
    pub fn new() -> Self {
        Self::with_storage(Arc::new(InMemorySchemaStorage::new()))
    }

    pub fn with_storage(storage: Arc<dyn SchemaStorage>) -> Self {
        Self {
            storage,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// Record the field changes that turn `from` into `to`.
    ///
    /// `to` starts as a copy of `from`'s field set the first time it is seen.
    /// An unknown `from` is recorded as an empty version.
    pub async fn track_schema_change(
        &self,
        kind: &GroupKind,
        from: &str,
        to: &str,
        changes: &[FieldChange],
    ) -> Result<(), EvolutionError> {
        let mut cache = self.cache.lock().await;
        let evolution = self.load_into(&mut cache, kind).await?;

        let now = Utc::now();
        let base = match evolution.version_index(from) {
            Some(index) => evolution.versions[index].fields.clone(),
            None => {
                evolution.versions.push(VersionInfo {
                    version: from.to_string(),
                    recorded_at: now,
                    fields: Default::default(),
                });
                Default::default()
            }
        };
        let index = match evolution.version_index(to) {
            Some(index) => index,
            None => {
                evolution.versions.push(VersionInfo {
                    version: to.to_string(),
                    recorded_at: now,
                    fields: base,
                });
                evolution.versions.len() - 1
            }
        };

        for change in changes {
            let fields = &mut evolution.versions[index].fields;
            match &change.kind {
                ChangeKind::Added {
                    field_type,
                    description,
                } => {
                    let mut info = FieldInfo::new(field_type.clone());
                    info.description = description.clone();
                    fields.insert(change.path.clone(), info);
                }
                ChangeKind::Removed => {
                    fields.remove(&change.path);
                }
                ChangeKind::Modified { field_type } => {
                    fields
                        .entry(change.path.clone())
                        .and_modify(|info| info.field_type = field_type.clone())
                        .or_insert_with(|| FieldInfo::new(field_type.clone()));
                }
                ChangeKind::Deprecated {
                    replacement,
                    removed_in,
                    hint,
                } => {
                    if let Some(info) = fields.get_mut(&change.path) {
                        info.deprecated = true;
                        info.replacement = replacement.clone();
                    }
                    let known = evolution
                        .deprecated_paths
                        .iter()
                        .any(|d| d.path == change.path && d.deprecated_since == to);
                    if !known {
                        evolution.deprecated_paths.push(DeprecatedPath {
                            path: change.path.clone(),
                            deprecated_since: to.to_string(),
                            removed_in: removed_in.clone(),
                            migration_path: replacement.clone(),
                            hint: hint.clone(),
                        });
                    }
                }
            }
        }
        evolution.current_version = Some(to.to_string());

        self.storage.save_evolution(evolution).await?;
        info!(
            kind = %kind,
            from,
            to,
            changes = changes.len(),
            "Recorded schema change"
        );
        Ok(())
    }

    /// Record that a migration was planned.
    pub async fn record_migration_plan(&self, plan: &MigrationPlan) -> Result<(), EvolutionError> {
        self.append(MigrationRecord::planned(plan)).await
    }

    /// Record the outcome of an executed migration.
    pub async fn record_migration_result(
        &self,
        plan: &MigrationPlan,
        result: &MigrationResult,
    ) -> Result<(), EvolutionError> {
        self.append(MigrationRecord::finished(plan, result)).await
    }

    async fn append(&self, record: MigrationRecord) -> Result<(), EvolutionError> {
        let mut cache = self.cache.lock().await;
        let evolution = self.load_into(&mut cache, &record.group_kind).await?;
        evolution.migrations.push(record.clone());
        self.storage.save_evolution(evolution).await?;
        self.storage.save_migration_history(&record).await?;
        debug!(
            kind = %record.group_kind,
            status = %record.status,
            total = record.total_resources,
            "Recorded migration"
        );
        Ok(())
    }

    /// The most recent `limit` history records across kinds, oldest first.
    pub async fn history(&self, limit: usize) -> Result<Vec<MigrationRecord>, EvolutionError> {
        self.storage.load_migration_history(limit).await
    }

    pub async fn evolution(&self, kind: &GroupKind) -> Result<Option<SchemaEvolution>, EvolutionError> {
        let mut cache = self.cache.lock().await;
        if let Some(evolution) = cache.get(kind) {
            return Ok(Some(evolution.clone()));
        }
        match self.storage.load_evolution(kind).await? {
            Some(evolution) => {
                cache.insert(kind.clone(), evolution.clone());
                Ok(Some(evolution))
            }
            None => Ok(None),
        }
    }

    pub async fn deprecated_fields(&self, kind: &GroupKind) -> Result<Vec<DeprecatedPath>, EvolutionError> {
        self.evolution(kind)
            .await?
            .map(|evolution| evolution.deprecated_paths)
            .ok_or_else(|| EvolutionError::UnknownKind(kind.clone()))
    }

    /// Compare the recorded field sets of two versions.
    pub async fn generate_migration_report(
        &self,
        kind: &GroupKind,
        from: &str,
        to: &str,
    ) -> Result<MigrationReport, EvolutionError> {
        let evolution = self
            .evolution(kind)
            .await?
            .ok_or_else(|| EvolutionError::UnknownKind(kind.clone()))?;
        let version = |v: &str| {
            evolution
                .version(v)
                .ok_or_else(|| EvolutionError::UnknownVersion {
                    kind: kind.clone(),
                    version: v.to_string(),
                })
        };
        let old = version(from)?;
        let new = version(to)?;

        let mut changes = Vec::new();
        for (path, info) in &new.fields {
            match old.fields.get(path) {
                None => changes.push(FieldDiff {
                    path: path.clone(),
                    kind: FieldDiffKind::Added,
                    from_type: None,
                    to_type: Some(info.field_type.clone()),
                }),
                Some(previous) if previous.field_type != info.field_type => {
                    changes.push(FieldDiff {
                        path: path.clone(),
                        kind: FieldDiffKind::TypeModified,
                        from_type: Some(previous.field_type.clone()),
                        to_type: Some(info.field_type.clone()),
                    })
                }
                Some(_) => {}
            }
        }
        for (path, info) in &old.fields {
            if !new.fields.contains_key(path) {
                changes.push(FieldDiff {
                    path: path.clone(),
                    kind: FieldDiffKind::Removed,
                    from_type: Some(info.field_type.clone()),
                    to_type: None,
                });
            }
        }
        changes.sort_by(|a, b| a.path.cmp(&b.path));

        let newly_deprecated: Vec<DeprecatedPath> = evolution
            .deprecated_paths
            .iter()
            .filter(|d| d.deprecated_since == to)
            .cloned()
            .collect();

        Ok(MigrationReport {
            group_kind: kind.clone(),
            from_version: from.to_string(),
            to_version: to.to_string(),
            generated_at: Utc::now(),
            recommendations: recommendations(&changes, &newly_deprecated),
            changes,
            newly_deprecated,
        })
    }

    async fn load_into<'a>(
        &self,
        cache: &'a mut HashMap<GroupKind, SchemaEvolution>,
        kind: &GroupKind,
    ) -> Result<&'a mut SchemaEvolution, EvolutionError> {
        if !cache.contains_key(kind) {
            let evolution = self
                .storage
                .load_evolution(kind)
                .await?
                .unwrap_or_else(|| SchemaEvolution::new(kind.clone()));
            cache.insert(kind.clone(), evolution);
        }
        Ok(cache
            .entry(kind.clone())
            .or_insert_with(|| SchemaEvolution::new(kind.clone())))
    }
}

impl Default for SchemaEvolutionTracker {
    fn default() -> Self {
        Self::new()
    }
}

fn recommendations(changes: &[FieldDiff], deprecated: &[DeprecatedPath]) -> Vec<String> {
    let mut out = Vec::new();
    if !changes.is_empty() {
        out.push(format!("Review {} field change(s) before migration", changes.len()));
    }
    let removed = changes
        .iter()
        .filter(|c| c.kind == FieldDiffKind::Removed)
        .count();
    if removed > 0 {
        out.push(format!(
            "{removed} field(s) are removed; values stored there will not be carried over"
        ));
    }
    if !deprecated.is_empty() {
        out.push(format!(
            "Update {} deprecated field reference(s)",
            deprecated.len()
        ));
        for path in deprecated {
            match &path.migration_path {
                Some(target) => out.push(format!("Move {} to {}", path.path, target)),
                None if !path.hint.is_empty() => out.push(format!("{}: {}", path.path, path.hint)),
                None => {}
            }
        }
    }
    out.push("Create backup before migration".to_string());
    out.push("Test migration in non-production environment first".to_string());
    out
}

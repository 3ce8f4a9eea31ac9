//! Field-level diff between a resource and its converted form.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::resource::Resource;

/// How one field changed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "change", rename_all = "camelCase")]
pub enum FieldChangeKind {
    Added { value: Value },
    Removed { value: Value },
    Modified { from: Value, to: Value },
}

/// One changed field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChangedField {
    /// Dotted path from the resource root, e.g. `spec.storage.retention`.
    pub path: String,
    #[serde(flatten)]
    pub kind: FieldChangeKind,
}

/// Diff of spec and status between two versions of a resource.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDiff {
    pub from_version: String,
    pub to_version: String,
    pub changes: Vec<ChangedField>,
}

impl ResourceDiff {
    /// Compare `before` with `after`; changes are sorted by path.
    pub fn between(before: &Resource, after: &Resource) -> Self {
        let mut changes = Vec::new();
        diff_values("spec", &before.spec, &after.spec, &mut changes);

        let empty = Value::Null;
        let before_status = before.status.as_ref().unwrap_or(&empty);
        let after_status = after.status.as_ref().unwrap_or(&empty);
        diff_values("status", before_status, after_status, &mut changes);

        changes.sort_by(|a, b| a.path.cmp(&b.path));
        Self {
            from_version: before.resource_type.version.clone(),
            to_version: after.resource_type.version.clone(),
            changes,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    pub fn added(&self) -> impl Iterator<Item = &ChangedField> {
        self.changes
            .iter()
            .filter(|c| matches!(c.kind, FieldChangeKind::Added { .. }))
    }

    pub fn removed(&self) -> impl Iterator<Item = &ChangedField> {
        self.changes
            .iter()
            .filter(|c| matches!(c.kind, FieldChangeKind::Removed { .. }))
    }

    pub fn modified(&self) -> impl Iterator<Item = &ChangedField> {
        self.changes
            .iter()
            .filter(|c| matches!(c.kind, FieldChangeKind::Modified { .. }))
    }
}

fn diff_values(path: &str, before: &Value, after: &Value, out: &mut Vec<ChangedField>) {
    match (before, after) {
        (Value::Object(a), Value::Object(b)) => {
            for (key, old) in a {
                let child = format!("{path}.{key}");
                match b.get(key) {
                    Some(new) => diff_values(&child, old, new, out),
                    None => out.push(ChangedField {
                        path: child,
                        kind: FieldChangeKind::Removed { value: old.clone() },
                    }),
                }
            }
            for (key, new) in b {
                if !a.contains_key(key) {
                    out.push(ChangedField {
                        path: format!("{path}.{key}"),
                        kind: FieldChangeKind::Added { value: new.clone() },
                    });
                }
            }
        }
        (Value::Null, Value::Null) => {}
        (Value::Null, new) => out.push(ChangedField {
            path: path.to_string(),
            kind: FieldChangeKind::Added { value: new.clone() },
        }),
        (old, Value::Null) => out.push(ChangedField {
            path: path.to_string(),
            kind: FieldChangeKind::Removed { value: old.clone() },
        }),
        (old, new) if old != new => out.push(ChangedField {
            path: path.to_string(),
            kind: FieldChangeKind::Modified {
                from: old.clone(),
                to: new.clone(),
            },
        }),
        _ => {}
    }
}

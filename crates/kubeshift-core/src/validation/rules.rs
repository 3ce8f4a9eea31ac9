//! Built-in validation rules.
//!
//! Pre-migration rules check the source resources; post-migration rules
//! check what the executor wrote.

use super::report::Severity;
use super::rule::{RuleFailure, ValidationRule};
use crate::labels::{
    DEPRECATED_VERSION_ANNOTATION, HAD_STATUS_ANNOTATION, MIGRATED_LABEL, ORIGINAL_UID_ANNOTATION,
};
use crate::resource::{Resource, ResourceType};
use async_trait::async_trait;
use serde_json::Value;

const POST_MIGRATION_REMEDIATION: &str =
    "Review resource configuration and re-run migration if necessary";

/// The resource could be fetched.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceExistsRule;

#[async_trait]
impl ValidationRule for ResourceExistsRule {
    fn name(&self) -> &str {
        "resource-exists"
    }

    fn description(&self) -> &str {
        "Resource must exist in the store"
    }

    async fn validate(&self, resource: &Resource) -> Result<(), RuleFailure> {
        if resource.metadata.name.is_empty() {
            return Err(RuleFailure::new("resource has no name"));
        }
        Ok(())
    }
}

/// Minimal shape every resource must have: an object spec and a kind.
#[derive(Debug, Clone, Copy, Default)]
pub struct SchemaShapeRule;

#[async_trait]
impl ValidationRule for SchemaShapeRule {
    fn name(&self) -> &str {
        "schema-shape"
    }

    fn description(&self) -> &str {
        "Resource must have a kind, an API version and an object spec"
    }

    async fn validate(&self, resource: &Resource) -> Result<(), RuleFailure> {
        if resource.resource_type.kind.is_empty() || resource.resource_type.version.is_empty() {
            return Err(RuleFailure::new("resource type is incomplete"));
        }
        if !resource.spec.is_object() {
            return Err(RuleFailure::new("spec must be an object"));
        }
        Ok(())
    }
}

/// Rejects resources flagged as stored at a deprecated API version.
#[derive(Debug, Clone, Copy, Default)]
pub struct VersionCompatibilityRule;

#[async_trait]
impl ValidationRule for VersionCompatibilityRule {
    fn name(&self) -> &str {
        "version-compatibility"
    }

    fn description(&self) -> &str {
        "Resource must not use a deprecated API version"
    }

    async fn validate(&self, resource: &Resource) -> Result<(), RuleFailure> {
        match resource.annotation(DEPRECATED_VERSION_ANNOTATION) {
            Some(version) => Err(RuleFailure::new(format!(
                "resource uses deprecated API version {version}"
            ))),
            None => Ok(()),
        }
    }
}

/// Every declared sub-component carries a resource specification.
#[derive(Debug, Clone)]
pub struct QuotaShapeRule {
    components_path: String,
}

impl Default for QuotaShapeRule {
    fn default() -> Self {
        Self::new("spec.components")
    }
}

impl QuotaShapeRule {
    pub fn new(components_path: impl Into<String>) -> Self {
        Self {
            components_path: components_path.into(),
        }
    }
}

#[async_trait]
impl ValidationRule for QuotaShapeRule {
    fn name(&self) -> &str {
        "quota-shape"
    }

    fn description(&self) -> &str {
        "Every component must declare resource requirements"
    }

    async fn validate(&self, resource: &Resource) -> Result<(), RuleFailure> {
        let Some(components) = resource.field(&self.components_path) else {
            return Ok(());
        };
        let Some(components) = components.as_object() else {
            return Err(RuleFailure::new(format!(
                "{} must be an object",
                self.components_path
            )));
        };

        let mut missing: Vec<&str> = components
            .iter()
            .filter(|(_, component)| component.get("resources").is_none())
            .map(|(name, _)| name.as_str())
            .collect();
        missing.sort_unstable();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RuleFailure::new(format!(
                "components without resource requirements: {}",
                missing.join(", ")
            )))
        }
    }
}

/// Listed dotted paths must be present.
#[derive(Debug, Clone)]
pub struct RequiredFieldsRule {
    paths: Vec<String>,
}

impl RequiredFieldsRule {
    pub fn new<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

#[async_trait]
impl ValidationRule for RequiredFieldsRule {
    fn name(&self) -> &str {
        "required-fields"
    }

    fn description(&self) -> &str {
        "Required fields must be present"
    }

    async fn validate(&self, resource: &Resource) -> Result<(), RuleFailure> {
        let missing: Vec<&str> = self
            .paths
            .iter()
            .filter(|path| matches!(resource.field(path), None | Some(Value::Null)))
            .map(String::as_str)
            .collect();

        if missing.is_empty() {
            Ok(())
        } else {
            Err(RuleFailure::new(format!(
                "missing required fields: {}",
                missing.join(", ")
            )))
        }
    }
}

/// JSON kind expected at a path by [`SchemaConformanceRule`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JsonKind {
    Object,
    Array,
    String,
    Number,
    Bool,
}

impl JsonKind {
    fn matches(self, value: &Value) -> bool {
        match self {
            JsonKind::Object => value.is_object(),
            JsonKind::Array => value.is_array(),
            JsonKind::String => value.is_string(),
            JsonKind::Number => value.is_number(),
            JsonKind::Bool => value.is_boolean(),
        }
    }
}

/// The resource is of the expected type and its typed fields conform.
#[derive(Debug, Clone)]
pub struct SchemaConformanceRule {
    expected: ResourceType,
    fields: Vec<(String, JsonKind)>,
}

impl SchemaConformanceRule {
    pub fn new(expected: ResourceType) -> Self {
        Self {
            expected,
            fields: Vec::new(),
        }
    }

    /// Require that `path`, when present, holds a value of `kind`.
    pub fn with_field(mut self, path: impl Into<String>, kind: JsonKind) -> Self {
        self.fields.push((path.into(), kind));
        self
    }
}

#[async_trait]
impl ValidationRule for SchemaConformanceRule {
    fn name(&self) -> &str {
        "schema-conformance"
    }

    fn description(&self) -> &str {
        "Resource must conform to the schema of its type"
    }

    async fn validate(&self, resource: &Resource) -> Result<(), RuleFailure> {
        if resource.resource_type.group_kind() != self.expected.group_kind() {
            return Err(RuleFailure::new(format!(
                "expected kind {}, found {}",
                self.expected.group_kind(),
                resource.group_kind()
            )));
        }
        if !resource.spec.is_object() {
            return Err(RuleFailure::new("spec must be an object"));
        }
        for (path, kind) in &self.fields {
            if let Some(value) = resource.field(path) {
                if !kind.matches(value) {
                    return Err(RuleFailure::new(format!(
                        "field {path} should be {kind:?}"
                    )));
                }
            }
        }
        Ok(())
    }
}

/// Converted spec is non-empty and status survived the write.
#[derive(Debug, Clone, Copy, Default)]
pub struct DataIntegrityRule;

#[async_trait]
impl ValidationRule for DataIntegrityRule {
    fn name(&self) -> &str {
        "data-integrity"
    }

    fn description(&self) -> &str {
        "Migrated resource keeps a non-empty spec and its status"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn remediation(&self) -> &str {
        POST_MIGRATION_REMEDIATION
    }

    async fn validate(&self, resource: &Resource) -> Result<(), RuleFailure> {
        let empty = match &resource.spec {
            Value::Object(map) => map.is_empty(),
            Value::Null => true,
            _ => false,
        };
        if empty {
            return Err(RuleFailure::new("spec is empty after migration"));
        }
        if resource.annotation(HAD_STATUS_ANNOTATION).is_some() && resource.status.is_none() {
            return Err(RuleFailure::new("status was lost during migration"));
        }
        Ok(())
    }
}

/// Identity is preserved and the migration marker is present.
#[derive(Debug, Clone, Copy, Default)]
pub struct ResourceConsistencyRule;

#[async_trait]
impl ValidationRule for ResourceConsistencyRule {
    fn name(&self) -> &str {
        "resource-consistency"
    }

    fn description(&self) -> &str {
        "Migrated resource keeps its identity and carries the migration marker"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn remediation(&self) -> &str {
        POST_MIGRATION_REMEDIATION
    }

    async fn validate(&self, resource: &Resource) -> Result<(), RuleFailure> {
        if resource.metadata.uid.is_empty() {
            return Err(RuleFailure::new("resource has no uid"));
        }
        if resource.metadata.resource_version.is_empty() {
            return Err(RuleFailure::new("resource has no resource version"));
        }
        if let Some(original) = resource.annotation(ORIGINAL_UID_ANNOTATION) {
            if original != resource.metadata.uid {
                return Err(RuleFailure::new(format!(
                    "uid changed during migration ({original} -> {})",
                    resource.metadata.uid
                )));
            }
        }
        if resource.label(MIGRATED_LABEL).is_none() {
            return Err(RuleFailure::new(format!("missing label {MIGRATED_LABEL}")));
        }
        Ok(())
    }
}

/// A present `status.phase` must be a non-empty string.
#[derive(Debug, Clone, Copy, Default)]
pub struct StatusShapeRule;

#[async_trait]
impl ValidationRule for StatusShapeRule {
    fn name(&self) -> &str {
        "status-shape"
    }

    fn description(&self) -> &str {
        "Status phase, when present, must be set"
    }

    fn severity(&self) -> Severity {
        Severity::High
    }

    fn remediation(&self) -> &str {
        POST_MIGRATION_REMEDIATION
    }

    async fn validate(&self, resource: &Resource) -> Result<(), RuleFailure> {
        match resource.field("status.phase") {
            None => Ok(()),
            Some(Value::String(phase)) if !phase.is_empty() => Ok(()),
            Some(_) => Err(RuleFailure::new("status.phase is empty")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::ResourceIdentity;
    use serde_json::json;

    fn resource(spec: Value) -> Resource {
        Resource::new(
            ResourceType::new("observability.io", "v1beta1", "Platform"),
            ResourceIdentity::new("ns", "a"),
        )
        .with_spec(spec)
    }

    #[tokio::test]
    async fn test_version_compatibility() {
        let rule = VersionCompatibilityRule;
        assert!(rule.validate(&resource(json!({}))).await.is_ok());
        let flagged = resource(json!({})).with_annotation(DEPRECATED_VERSION_ANNOTATION, "v1alpha1");
        let err = rule.validate(&flagged).await.unwrap_err();
        assert!(err.message.contains("v1alpha1"));
    }

    #[tokio::test]
    async fn test_quota_shape() {
        let rule = QuotaShapeRule::default();
        assert!(rule.validate(&resource(json!({}))).await.is_ok());

        let ok = resource(json!({"components": {"prometheus": {"resources": {"cpu": "1"}}}}));
        assert!(rule.validate(&ok).await.is_ok());

        let bad = resource(json!({"components": {
            "prometheus": {"resources": {}},
            "loki": {},
            "grafana": {"replicas": 1}
        }}));
        let err = rule.validate(&bad).await.unwrap_err();
        assert_eq!(
            err.message,
            "components without resource requirements: grafana, loki"
        );
    }

    #[tokio::test]
    async fn test_required_fields() {
        let rule = RequiredFieldsRule::new(["spec.components", "replicas"]);
        let err = rule
            .validate(&resource(json!({"replicas": 1, "components": null})))
            .await
            .unwrap_err();
        assert_eq!(err.message, "missing required fields: spec.components");
        assert!(rule
            .validate(&resource(json!({"replicas": 1, "components": {}})))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_schema_conformance() {
        let t = ResourceType::new("observability.io", "v1beta1", "Platform");
        let rule = SchemaConformanceRule::new(t).with_field("replicas", JsonKind::Number);
        assert!(rule.validate(&resource(json!({"replicas": 2}))).await.is_ok());
        assert!(rule.validate(&resource(json!({"replicas": "2"}))).await.is_err());
        assert!(rule.validate(&resource(json!("not-an-object"))).await.is_err());
    }

    #[tokio::test]
    async fn test_data_integrity() {
        let rule = DataIntegrityRule;
        assert!(rule.validate(&resource(json!({}))).await.is_err());
        assert!(rule.validate(&resource(json!({"a": 1}))).await.is_ok());

        let lost_status = resource(json!({"a": 1})).with_annotation(HAD_STATUS_ANNOTATION, "true");
        assert!(rule.validate(&lost_status).await.is_err());
        assert!(rule
            .validate(&lost_status.with_status(json!({"phase": "Ready"})))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_resource_consistency() {
        let rule = ResourceConsistencyRule;
        let mut r = resource(json!({"a": 1}));
        assert!(rule.validate(&r).await.is_err());

        r.metadata.uid = "uid-1".to_string();
        r.metadata.resource_version = "7".to_string();
        let err = rule.validate(&r).await.unwrap_err();
        assert!(err.message.contains(MIGRATED_LABEL));

        let r = r
            .with_label(MIGRATED_LABEL, "true")
            .with_annotation(ORIGINAL_UID_ANNOTATION, "uid-1");
        assert!(rule.validate(&r).await.is_ok());

        let moved = r.with_annotation(ORIGINAL_UID_ANNOTATION, "uid-0");
        assert!(rule.validate(&moved).await.is_err());
    }

    #[tokio::test]
    async fn test_status_shape() {
        let rule = StatusShapeRule;
        assert!(rule.validate(&resource(json!({}))).await.is_ok());
        let empty = resource(json!({})).with_status(json!({"phase": ""}));
        assert!(rule.validate(&empty).await.is_err());
        let ready = resource(json!({})).with_status(json!({"phase": "Ready"}));
        assert!(rule.validate(&ready).await.is_ok());
    }

    #[test]
    fn test_post_rules_are_high_severity() {
        assert_eq!(DataIntegrityRule.severity(), Severity::High);
        assert_eq!(ResourceConsistencyRule.severity(), Severity::High);
        assert_eq!(StatusShapeRule.severity(), Severity::High);
        assert_eq!(VersionCompatibilityRule.severity(), Severity::Medium);
    }
}

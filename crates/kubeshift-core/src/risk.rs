//! Migration risk scoring.
//!
//! Risk is a pure function of the plan. Each signal that fires adds a
//! [`RiskFactor`]; the overall level is High if any factor is High, Medium
//! if at least two factors are Medium, and Low otherwise.

use crate::migration::MigrationPlan;
use crate::version::version_gap;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// Plans with more resources than this carry a resource-count factor.
pub const DEFAULT_RESOURCE_COUNT_THRESHOLD: usize = 100;

/// Risk level of a factor or a whole plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RiskLevel {
    Low,
    Medium,
    High,
}

impl fmt::Display for RiskLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RiskLevel::Low => write!(f, "low"),
            RiskLevel::Medium => write!(f, "medium"),
            RiskLevel::High => write!(f, "high"),
        }
    }
}

/// Which signal produced a factor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum RiskFactorKind {
    ResourceCount,
    VersionGap,
    ProductionNamespace,
}

/// One scored signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskFactor {
    pub kind: RiskFactorKind,
    pub description: String,
    pub level: RiskLevel,
    pub mitigation: String,
}

impl RiskFactor {
    pub fn new(kind: RiskFactorKind, level: RiskLevel, description: impl Into<String>) -> Self {
        Self {
            kind,
            description: description.into(),
            level,
            mitigation: String::new(),
        }
    }

    pub fn with_mitigation(mut self, mitigation: impl Into<String>) -> Self {
        self.mitigation = mitigation.into();
        self
    }
}

/// Risk assessment of a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RiskAnalysis {
    pub overall_risk: RiskLevel,
    pub factors: Vec<RiskFactor>,
}

impl RiskAnalysis {
    pub fn from_factors(factors: Vec<RiskFactor>) -> Self {
        Self {
            overall_risk: aggregate(&factors),
            factors,
        }
    }

    pub fn factor(&self, kind: RiskFactorKind) -> Option<&RiskFactor> {
        self.factors.iter().find(|f| f.kind == kind)
    }
}

/// Combine factor levels into an overall level.
pub fn aggregate(factors: &[RiskFactor]) -> RiskLevel {
    if factors.iter().any(|f| f.level == RiskLevel::High) {
        return RiskLevel::High;
    }
    let medium = factors
        .iter()
        .filter(|f| f.level == RiskLevel::Medium)
        .count();
    if medium >= 2 {
        RiskLevel::Medium
    } else {
        RiskLevel::Low
    }
}

/// Scores plans.
#[derive(Debug, Clone)]
pub struct RiskAnalyzer {
    resource_count_threshold: usize,
    production_namespaces: BTreeSet<String>,
}

impl Default for RiskAnalyzer {
    fn default() -> Self {
        Self {
            resource_count_threshold: DEFAULT_RESOURCE_COUNT_THRESHOLD,
            production_namespaces: ["production", "prod"]
                .into_iter()
                .map(String::from)
                .collect(),
        }
    }
}

impl RiskAnalyzer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_resource_count_threshold(mut self, threshold: usize) -> Self {
        self.resource_count_threshold = threshold;
        self
    }

    /// Add a namespace treated as production.
    pub fn with_production_namespace(mut self, namespace: impl Into<String>) -> Self {
        self.production_namespaces.insert(namespace.into());
        self
    }

    pub fn analyze(&self, plan: &MigrationPlan) -> RiskAnalysis {
        let mut factors = Vec::new();

        let count = plan.resources.len();
        if count > self.resource_count_threshold {
            factors.push(
                RiskFactor::new(
                    RiskFactorKind::ResourceCount,
                    RiskLevel::Medium,
                    format!("Large number of resources to migrate: {count}"),
                )
                .with_mitigation("Consider migrating in smaller batches"),
            );
        }

        let from = &plan.source_type.version;
        let to = &plan.target_type.version;
        match version_gap(from, to) {
            Ok(gap) if gap > 1 => factors.push(
                RiskFactor::new(
                    RiskFactorKind::VersionGap,
                    RiskLevel::High,
                    format!("Migrating across {gap} version steps ({from} -> {to})"),
                )
                .with_mitigation("Consider intermediate version migrations"),
            ),
            Ok(_) => {}
            Err(e) => factors.push(
                RiskFactor::new(
                    RiskFactorKind::VersionGap,
                    RiskLevel::High,
                    format!("Cannot compare versions {from} and {to}: {e}"),
                )
                .with_mitigation("Verify the source and target versions before migrating"),
            ),
        }

        let production: BTreeSet<&str> = plan
            .resources
            .iter()
            .map(|id| id.namespace.as_str())
            .filter(|ns| self.production_namespaces.contains(*ns))
            .collect();
        if !production.is_empty() {
            let namespaces: Vec<&str> = production.into_iter().collect();
            factors.push(
                RiskFactor::new(
                    RiskFactorKind::ProductionNamespace,
                    RiskLevel::High,
                    format!("Migrating resources in production namespaces: {}", namespaces.join(", ")),
                )
                .with_mitigation("Ensure proper backup and rollback procedures"),
            );
        }

        let analysis = RiskAnalysis::from_factors(factors);
        tracing::debug!(
            overall = %analysis.overall_risk,
            factors = analysis.factors.len(),
            resources = count,
            "risk analyzed"
        );
        analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceIdentity, ResourceType};

    fn plan(from: &str, to: &str, resources: Vec<ResourceIdentity>) -> MigrationPlan {
        MigrationPlan::new(
            ResourceType::new("observability.io", from, "Platform"),
            ResourceType::new("observability.io", to, "Platform"),
            resources,
        )
    }

    fn many(count: usize, namespace: &str) -> Vec<ResourceIdentity> {
        (0..count)
            .map(|i| ResourceIdentity::new(namespace, format!("p-{i}")))
            .collect()
    }

    #[test]
    fn test_small_adjacent_plan_is_low() {
        let analysis = RiskAnalyzer::default().analyze(&plan("v1beta1", "v1", many(5, "team-a")));
        assert_eq!(analysis.overall_risk, RiskLevel::Low);
        assert!(analysis.factors.is_empty());
    }

    #[test]
    fn test_resource_count_alone_is_low() {
        let analysis = RiskAnalyzer::default().analyze(&plan("v1beta1", "v1", many(101, "team-a")));
        let factor = analysis.factor(RiskFactorKind::ResourceCount).unwrap();
        assert_eq!(factor.level, RiskLevel::Medium);
        assert_eq!(factor.mitigation, "Consider migrating in smaller batches");
        assert_eq!(analysis.overall_risk, RiskLevel::Low);

        let at_threshold = RiskAnalyzer::default().analyze(&plan("v1beta1", "v1", many(100, "a")));
        assert!(at_threshold.factor(RiskFactorKind::ResourceCount).is_none());
    }

    #[test]
    fn test_version_gap_is_high() {
        let analysis = RiskAnalyzer::default().analyze(&plan("v1alpha1", "v1", many(1, "a")));
        assert_eq!(analysis.overall_risk, RiskLevel::High);
        assert_eq!(
            analysis.factor(RiskFactorKind::VersionGap).unwrap().level,
            RiskLevel::High
        );
    }

    #[test]
    fn test_unparseable_version_is_high() {
        let analysis = RiskAnalyzer::default().analyze(&plan("v1", "latest", many(1, "a")));
        assert_eq!(analysis.overall_risk, RiskLevel::High);
    }

    #[test]
    fn test_production_namespace_exact_match() {
        let mut resources = many(2, "team-a");
        resources.push(ResourceIdentity::new("production", "p"));
        let analysis = RiskAnalyzer::default().analyze(&plan("v1beta1", "v1", resources));
        assert_eq!(analysis.overall_risk, RiskLevel::High);

        let lookalike = RiskAnalyzer::default()
            .analyze(&plan("v1beta1", "v1", many(2, "preproduction")));
        assert_eq!(lookalike.overall_risk, RiskLevel::Low);
    }

    #[test]
    fn test_combined_signals_are_high() {
        let mut resources = many(149, "team-a");
        resources.push(ResourceIdentity::new("production", "p"));
        let analysis = RiskAnalyzer::default().analyze(&plan("v1alpha1", "v1", resources));
        assert_eq!(analysis.overall_risk, RiskLevel::High);
        assert_eq!(analysis.factors.len(), 3);
    }

    #[test]
    fn test_aggregate_rules() {
        let medium = || RiskFactor::new(RiskFactorKind::ResourceCount, RiskLevel::Medium, "m");
        assert_eq!(aggregate(&[]), RiskLevel::Low);
        assert_eq!(aggregate(&[medium()]), RiskLevel::Low);
        assert_eq!(aggregate(&[medium(), medium()]), RiskLevel::Medium);
        assert_eq!(
            aggregate(&[
                medium(),
                RiskFactor::new(RiskFactorKind::VersionGap, RiskLevel::High, "h")
            ]),
            RiskLevel::High
        );
    }
}

//! Ordering strategies for a batch of resources.
//!
//! Each strategy maps a resource to a sort key. Strategies compose by
//! registration order: the combined key is the tuple of every strategy's
//! key, so a later strategy only reorders resources that all earlier
//! strategies consider equal. Sorting is stable throughout.

use crate::labels::DEPENDENCY_CLASS_LABEL;
use crate::resource::{Resource, ResourceIdentity};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Synthetic namespace group for cluster-scoped resources.
pub const CLUSTER_SCOPED_GROUP: &str = "cluster-scoped";

/// Priority assigned to namespaces missing from the table.
pub const UNLISTED_PRIORITY: u32 = 999;

/// Dependency class of a resource, in emission order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DependencyClass {
    ConfigMap,
    Secret,
    Service,
    Workload,
    Other,
}

impl DependencyClass {
    /// Classify by name when no explicit class is available.
    ///
    /// Matches `config`, `secret` and `service` anywhere in the name, in that
    /// order; any other name is a workload. An empty name is `Other`.
    pub fn from_name(name: &str) -> Self {
        if name.is_empty() {
            return DependencyClass::Other;
        }
        let name = name.to_ascii_lowercase();
        if name.contains("config") {
            DependencyClass::ConfigMap
        } else if name.contains("secret") {
            DependencyClass::Secret
        } else if name.contains("service") {
            DependencyClass::Service
        } else {
            DependencyClass::Workload
        }
    }
}

impl fmt::Display for DependencyClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DependencyClass::ConfigMap => write!(f, "configmap"),
            DependencyClass::Secret => write!(f, "secret"),
            DependencyClass::Service => write!(f, "service"),
            DependencyClass::Workload => write!(f, "workload"),
            DependencyClass::Other => write!(f, "other"),
        }
    }
}

impl FromStr for DependencyClass {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "configmap" | "config" => Ok(DependencyClass::ConfigMap),
            "secret" => Ok(DependencyClass::Secret),
            "service" => Ok(DependencyClass::Service),
            "workload" => Ok(DependencyClass::Workload),
            "other" => Ok(DependencyClass::Other),
            other => Err(format!("unknown dependency class '{other}'")),
        }
    }
}

/// Something that can be placed in an ordered batch.
pub trait Orderable {
    fn identity(&self) -> ResourceIdentity;

    /// Explicit dependency class, if the caller supplied one.
    fn dependency_class(&self) -> Option<DependencyClass> {
        None
    }
}

impl Orderable for ResourceIdentity {
    fn identity(&self) -> ResourceIdentity {
        self.clone()
    }
}

impl Orderable for Resource {
    fn identity(&self) -> ResourceIdentity {
        Resource::identity(self)
    }

    fn dependency_class(&self) -> Option<DependencyClass> {
        self.label(DEPENDENCY_CLASS_LABEL)?.parse().ok()
    }
}

/// An identity with a caller-supplied class.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    pub identity: ResourceIdentity,
    pub class: DependencyClass,
}

impl Orderable for Classified {
    fn identity(&self) -> ResourceIdentity {
        self.identity.clone()
    }

    fn dependency_class(&self) -> Option<DependencyClass> {
        Some(self.class)
    }
}

/// Namespace priority table; lower values sort first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriorityTable {
    priorities: HashMap<String, u32>,
}

impl Default for PriorityTable {
    fn default() -> Self {
        Self::new([
            ("kube-system", 1),
            ("kube-public", 2),
            ("default", 3),
            ("kubeshift-system", 4),
            ("observability", 5),
            ("monitoring", 6),
        ])
    }
}

impl PriorityTable {
    pub fn new<'a>(entries: impl IntoIterator<Item = (&'a str, u32)>) -> Self {
        Self {
            priorities: entries
                .into_iter()
                .map(|(ns, p)| (ns.to_string(), p))
                .collect(),
        }
    }

    pub fn priority(&self, namespace: &str) -> u32 {
        self.priorities
            .get(namespace)
            .copied()
            .unwrap_or(UNLISTED_PRIORITY)
    }
}

/// Sort key produced by one strategy.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum OrderKey {
    Class(DependencyClass),
    Group(String),
    Size(usize),
    Priority(u32, String),
}

/// One ordering rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderingStrategy {
    /// Dependencies first: configmaps, secrets, services, workloads, other.
    Dependency,
    /// Group by namespace, lexicographically.
    NamespaceGrouping,
    /// Shorter `namespace/name` identities first.
    Size,
    /// Namespace priority, then name.
    Priority(PriorityTable),
}

impl OrderingStrategy {
    pub fn name(&self) -> &'static str {
        match self {
            OrderingStrategy::Dependency => "dependency",
            OrderingStrategy::NamespaceGrouping => "namespace-grouping",
            OrderingStrategy::Size => "size",
            OrderingStrategy::Priority(_) => "priority",
        }
    }

    pub fn key<T: Orderable>(&self, item: &T) -> OrderKey {
        let identity = item.identity();
        match self {
            OrderingStrategy::Dependency => OrderKey::Class(
                item.dependency_class()
                    .unwrap_or_else(|| DependencyClass::from_name(&identity.name)),
            ),
            OrderingStrategy::NamespaceGrouping => OrderKey::Group(if identity.is_cluster_scoped() {
                CLUSTER_SCOPED_GROUP.to_string()
            } else {
                identity.namespace
            }),
            OrderingStrategy::Size => {
                OrderKey::Size(identity.namespace.len() + 1 + identity.name.len())
            }
            OrderingStrategy::Priority(table) => {
                OrderKey::Priority(table.priority(&identity.namespace), identity.name)
            }
        }
    }

    /// Apply this strategy alone.
    pub fn apply<T: Orderable>(&self, items: &mut [T]) {
        items.sort_by_cached_key(|item| self.key(item));
    }
}

/// The default registry, in contract order.
pub fn default_strategies() -> Vec<OrderingStrategy> {
    vec![
        OrderingStrategy::Dependency,
        OrderingStrategy::NamespaceGrouping,
        OrderingStrategy::Size,
        OrderingStrategy::Priority(PriorityTable::default()),
    ]
}

/// Apply strategies in registration order.
pub fn apply_all<T: Orderable>(strategies: &[OrderingStrategy], items: &mut [T]) {
    items.sort_by_cached_key(|item| {
        strategies
            .iter()
            .map(|strategy| strategy.key(item))
            .collect::<Vec<_>>()
    });
}

//! Optimization and cache layer.
//!
//! Orders a resource set for safe, cheap migration and memoizes recent
//! conversions.
//!
//! Strategies run in registration order, each refining the order left by
//! the ones before it:
//!
//! | # | Strategy | Key |
//! |---|----------|-----|
//! | 1 | Dependency | configmap, secret, service, workload, other |
//! | 2 | Namespace grouping | namespace (`cluster-scoped` when empty) |
//! | 3 | Size | length of `namespace/name` |
//! | 4 | Priority | namespace priority table, then name |

pub mod cache;
pub mod optimizer;
pub mod strategy;

pub use cache::{CacheKey, CacheStats, CachedConversion, ConversionCache, DEFAULT_CACHE_CAPACITY};
pub use optimizer::{ConversionOptimizer, OptimizerConfig, OptimizerMetrics};
pub use strategy::{
    apply_all, default_strategies, Classified, DependencyClass, OrderKey, OrderingStrategy,
    Orderable, PriorityTable, CLUSTER_SCOPED_GROUP, UNLISTED_PRIORITY,
};

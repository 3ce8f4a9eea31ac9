//! Batch ordering and conversion memoization.

use super::cache::{CacheKey, ConversionCache, DEFAULT_CACHE_CAPACITY};
use super::strategy::{apply_all, default_strategies, OrderingStrategy, Orderable, PriorityTable};
use crate::convert::Conversion;
use crate::resource::{Resource, ResourceType};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};

/// Optimizer configuration.
#[derive(Debug, Clone)]
pub struct OptimizerConfig {
    pub cache_capacity: usize,
    /// Strategies in application order.
    pub strategies: Vec<OrderingStrategy>,
}

impl Default for OptimizerConfig {
    fn default() -> Self {
        Self {
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            strategies: default_strategies(),
        }
    }
}

impl OptimizerConfig {
    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    pub fn with_strategies(mut self, strategies: Vec<OrderingStrategy>) -> Self {
        self.strategies = strategies;
        self
    }

    /// Replace the priority table used by the priority strategy.
    pub fn with_priority_table(mut self, table: PriorityTable) -> Self {
        for strategy in &mut self.strategies {
            if let OrderingStrategy::Priority(existing) = strategy {
                *existing = table.clone();
            }
        }
        self
    }
}

/// Point-in-time optimizer counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizerMetrics {
    pub batches_optimized: u64,
    pub resources_ordered: u64,
    pub conversions_cached: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub cache_evictions: u64,
    pub cache_hit_rate: f64,
    pub cache_entries: usize,
}

/// Orders batches and memoizes conversions.
pub struct ConversionOptimizer {
    cache: ConversionCache,
    strategies: Vec<OrderingStrategy>,
    batches_optimized: AtomicU64,
    resources_ordered: AtomicU64,
    conversions_cached: AtomicU64,
}

impl Default for ConversionOptimizer {
    fn default() -> Self {
        Self::new(OptimizerConfig::default())
    }
}

impl ConversionOptimizer {
    pub fn new(config: OptimizerConfig) -> Self {
        Self {
            cache: ConversionCache::new(config.cache_capacity),
            strategies: config.strategies,
            batches_optimized: AtomicU64::new(0),
            resources_ordered: AtomicU64::new(0),
            conversions_cached: AtomicU64::new(0),
        }
    }

    /// Deterministically reorder a batch.
    pub fn optimize_batch<T: Orderable>(&self, mut items: Vec<T>) -> Vec<T> {
        apply_all(&self.strategies, &mut items);
        self.batches_optimized.fetch_add(1, Ordering::Relaxed);
        self.resources_ordered
            .fetch_add(items.len() as u64, Ordering::Relaxed);
        tracing::debug!(
            resources = items.len(),
            strategies = self.strategies.len(),
            "batch optimized"
        );
        items
    }

    /// Cached conversion of `source` to `target`, if any.
    pub fn optimize_conversion(&self, source: &Resource, target: &ResourceType) -> Option<Conversion> {
        self.cache.get(&CacheKey::new(source, target))
    }

    /// Remember a conversion of `source` to `target`.
    pub fn cache_conversion(&self, source: &Resource, target: &ResourceType, conversion: Conversion) {
        self.cache
            .put(CacheKey::new(source, target), source.clone(), conversion);
        self.conversions_cached.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache(&self) -> &ConversionCache {
        &self.cache
    }

    pub fn strategies(&self) -> &[OrderingStrategy] {
        &self.strategies
    }

    pub fn metrics(&self) -> OptimizerMetrics {
        let stats = self.cache.stats();
        OptimizerMetrics {
            batches_optimized: self.batches_optimized.load(Ordering::Relaxed),
            resources_ordered: self.resources_ordered.load(Ordering::Relaxed),
            conversions_cached: self.conversions_cached.load(Ordering::Relaxed),
            cache_hits: stats.hits(),
            cache_misses: stats.misses(),
            cache_evictions: stats.evictions(),
            cache_hit_rate: stats.hit_rate(),
            cache_entries: self.cache.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::labels::DEPENDENCY_CLASS_LABEL;
    use crate::resource::ResourceIdentity;

    #[test]
    fn test_optimize_batch_dependency_order() {
        let optimizer = ConversionOptimizer::default();
        let ordered = optimizer.optimize_batch(vec![
            ResourceIdentity::new("x", "secret-a"),
            ResourceIdentity::new("x", "myapp-deploy"),
            ResourceIdentity::new("x", "config-b"),
        ]);
        let names: Vec<&str> = ordered.iter().map(|id| id.name.as_str()).collect();
        assert_eq!(names, ["config-b", "secret-a", "myapp-deploy"]);
        assert_eq!(optimizer.metrics().batches_optimized, 1);
        assert_eq!(optimizer.metrics().resources_ordered, 3);
    }

    #[test]
    fn test_optimize_batch_honors_class_label() {
        let t = ResourceType::new("observability.io", "v1beta1", "Platform");
        let optimizer = ConversionOptimizer::default();
        let ordered = optimizer.optimize_batch(vec![
            Resource::new(t.clone(), ResourceIdentity::new("x", "config-watcher"))
                .with_label(DEPENDENCY_CLASS_LABEL, "workload"),
            Resource::new(t, ResourceIdentity::new("x", "tls-material"))
                .with_label(DEPENDENCY_CLASS_LABEL, "secret"),
        ]);
        assert_eq!(ordered[0].metadata.name, "tls-material");
    }

    #[test]
    fn test_optimize_batch_is_deterministic() {
        let optimizer = ConversionOptimizer::default();
        let input: Vec<ResourceIdentity> = (0..20)
            .map(|i| ResourceIdentity::new(format!("ns-{}", i % 3), format!("svc-{i}")))
            .collect();
        let mut reversed = input.clone();
        reversed.reverse();
        let a = optimizer.optimize_batch(input);
        let b = optimizer.optimize_batch(reversed);
        assert_eq!(a, b);
    }

    #[test]
    fn test_conversion_round_trip_through_cache() {
        let optimizer = ConversionOptimizer::default();
        let source_type = ResourceType::new("observability.io", "v1beta1", "Platform");
        let target_type = source_type.with_version("v1");
        let source = Resource::new(source_type, ResourceIdentity::new("ns", "a"));

        assert!(optimizer.optimize_conversion(&source, &target_type).is_none());

        let mut converted = source.clone();
        converted.resource_type = target_type.clone();
        optimizer.cache_conversion(&source, &target_type, Conversion::lossless(converted.clone()));

        let hit = optimizer.optimize_conversion(&source, &target_type).unwrap();
        assert_eq!(hit.resource, converted);

        let metrics = optimizer.metrics();
        assert_eq!(metrics.cache_hits, 1);
        assert_eq!(metrics.cache_misses, 1);
        assert_eq!(metrics.conversions_cached, 1);
        assert!((metrics.cache_hit_rate - 0.5).abs() < f64::EPSILON);
    }
}

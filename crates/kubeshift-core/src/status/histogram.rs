//! Fixed-bucket histogram of resource migration durations.

/// Bucket boundaries in milliseconds.
const BUCKETS_MS: [u64; 12] = [
    10,     // 10 milliseconds
    25,     // 25 milliseconds
    50,     // 50 milliseconds
    100,    // 100 milliseconds
    250,    // 250 milliseconds
    500,    // 500 milliseconds
    1_000,  // 1 second
    2_500,  // 2.5 seconds
    5_000,  // 5 seconds
    10_000, // 10 seconds
    30_000, // 30 seconds
    60_000, // 1 minute
];

/// Duration histogram with percentile support.
///
/// Lives inside the reporter's live state, so it needs no synchronization
/// of its own.
#[derive(Debug, Clone, Default)]
pub struct DurationHistogram {
    /// Counts per bucket; values above the last boundary land in the last bucket.
    counts: [u64; BUCKETS_MS.len()],
    sum_ms: u64,
    count: u64,
    max_ms: u64,
}

impl DurationHistogram {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a value in milliseconds.
    pub fn observe(&mut self, value_ms: u64) {
        self.sum_ms = self.sum_ms.saturating_add(value_ms);
        self.count += 1;
        self.max_ms = self.max_ms.max(value_ms);

        let index = BUCKETS_MS
            .iter()
            .position(|&boundary| value_ms <= boundary)
            .unwrap_or(BUCKETS_MS.len() - 1);
        self.counts[index] += 1;
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn max(&self) -> u64 {
        self.max_ms
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        self.sum_ms as f64 / self.count as f64
    }

    /// Approximate percentile (e.g. 0.50 for P50).
    ///
    /// Returns the upper boundary of the bucket containing the percentile.
    pub fn percentile(&self, p: f64) -> u64 {
        if self.count == 0 {
            return 0;
        }

        let target = ((self.count as f64 * p).ceil() as u64).max(1);
        let mut cumulative = 0u64;
        for (i, count) in self.counts.iter().enumerate() {
            cumulative += count;
            if cumulative >= target {
                return BUCKETS_MS[i];
            }
        }
        BUCKETS_MS[BUCKETS_MS.len() - 1]
    }

    pub fn p50(&self) -> u64 {
        self.percentile(0.50)
    }

    pub fn p99(&self) -> u64 {
        self.percentile(0.99)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_histogram() {
        let h = DurationHistogram::new();
        assert_eq!(h.count(), 0);
        assert_eq!(h.p50(), 0);
        assert_eq!(h.mean(), 0.0);
    }

    #[test]
    fn test_percentiles() {
        let mut h = DurationHistogram::new();
        for _ in 0..98 {
            h.observe(5);
        }
        h.observe(400);
        h.observe(90_000);

        assert_eq!(h.count(), 100);
        assert_eq!(h.p50(), 10);
        assert_eq!(h.p99(), 500);
        assert_eq!(h.percentile(1.0), 60_000);
        assert_eq!(h.max(), 90_000);
    }
}

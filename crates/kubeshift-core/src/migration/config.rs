//! Executor configuration and retry policy.

use crate::risk::RiskLevel;
use std::time::Duration;

/// Default initial delay between attempts.
pub const DEFAULT_INITIAL_BACKOFF: Duration = Duration::from_millis(100);

/// Default upper bound on the delay between attempts.
pub const DEFAULT_MAX_BACKOFF: Duration = Duration::from_secs(5);

/// How retryable per-resource failures are retried.
///
/// Retryable failures are store conflicts, store unavailability and
/// timeouts. The default policy makes a single attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Total attempts per resource, including the first. At least 1.
    pub max_attempts: u32,
    pub initial_backoff: Duration,
    pub multiplier: f64,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::none()
    }
}

impl RetryPolicy {
    /// Never retry.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff: DEFAULT_INITIAL_BACKOFF,
            multiplier: 2.0,
            max_backoff: DEFAULT_MAX_BACKOFF,
        }
    }

    /// Exponential backoff with up to `max_attempts` attempts.
    pub fn exponential(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            ..Self::none()
        }
    }

    pub fn with_initial_backoff(mut self, backoff: Duration) -> Self {
        self.initial_backoff = backoff;
        self
    }

    pub fn with_multiplier(mut self, multiplier: f64) -> Self {
        self.multiplier = multiplier;
        self
    }

    pub fn with_max_backoff(mut self, backoff: Duration) -> Self {
        self.max_backoff = backoff;
        self
    }

    /// Delay before attempt `attempt + 1`, where `attempt` starts at 1.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1) as i32;
        let factor = self.multiplier.max(1.0).powi(exponent);
        let delay = self.initial_backoff.as_secs_f64() * factor;
        if !delay.is_finite() || delay >= self.max_backoff.as_secs_f64() {
            return self.max_backoff;
        }
        Duration::from_secs_f64(delay)
    }

    pub fn should_retry(&self, attempt: u32) -> bool {
        attempt < self.max_attempts
    }
}

/// Configuration for migration execution.
#[derive(Debug, Clone)]
pub struct MigrationConfig {
    /// Run pre-migration validation before touching the store.
    pub pre_validation: bool,
    /// Run post-migration validation over migrated resources.
    pub post_validation: bool,
    /// Proceed despite blocking validation reports and excess risk.
    pub force: bool,
    /// Highest risk level allowed to execute without `force`.
    pub max_allowed_risk: RiskLevel,
    pub retry: RetryPolicy,
    /// Bound on each store and converter call.
    pub operation_timeout: Option<Duration>,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            pre_validation: true,
            post_validation: true,
            force: false,
            max_allowed_risk: RiskLevel::Medium,
            retry: RetryPolicy::none(),
            operation_timeout: None,
        }
    }
}

impl MigrationConfig {
    pub fn with_pre_validation(mut self, enabled: bool) -> Self {
        self.pre_validation = enabled;
        self
    }

    pub fn with_post_validation(mut self, enabled: bool) -> Self {
        self.post_validation = enabled;
        self
    }

    pub fn with_force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn with_max_allowed_risk(mut self, level: RiskLevel) -> Self {
        self.max_allowed_risk = level;
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_operation_timeout(mut self, timeout: Duration) -> Self {
        self.operation_timeout = Some(timeout);
        self
    }
}

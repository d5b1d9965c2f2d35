//! Bootstrap Retry Policy
//!
//! Linear backoff with optional jitter for the market-data bootstrap
//! sequence. Each delay is capped by `max_delay`, and the sum of all delays
//! handed out is capped by `total_budget`, so a bootstrap that exhausts its
//! attempts finishes within seconds.

use std::time::Duration;

use rand::Rng;

/// Configuration for bootstrap retry delays.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryConfig {
    /// Delay before the first retry.
    pub initial_delay: Duration,
    /// Amount added to the delay for every further retry.
    pub step: Duration,
    /// Upper bound for a single delay.
    pub max_delay: Duration,
    /// Jitter factor as a fraction (e.g., 0.1 = ±10% randomization).
    /// Non-positive or non-finite values disable jitter.
    pub jitter_factor: f64,
    /// Upper bound for the sum of all delays.
    pub total_budget: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            step: Duration::from_secs(1),
            max_delay: Duration::from_secs(3),
            jitter_factor: 0.0,
            total_budget: Duration::from_secs(10),
        }
    }
}

impl RetryConfig {
    /// Create a new configuration with custom values.
    #[must_use]
    pub const fn new(
        initial_delay: Duration,
        step: Duration,
        max_delay: Duration,
        jitter_factor: f64,
        total_budget: Duration,
    ) -> Self {
        Self {
            initial_delay,
            step,
            max_delay,
            jitter_factor,
            total_budget,
        }
    }

    /// Constant delay with no jitter.
    #[must_use]
    pub const fn constant(delay: Duration, total_budget: Duration) -> Self {
        Self {
            initial_delay: delay,
            step: Duration::ZERO,
            max_delay: delay,
            jitter_factor: 0.0,
            total_budget,
        }
    }

    /// Sum of delays a bootstrap with `max_attempts` attempts can wait,
    /// ignoring jitter.
    #[must_use]
    pub fn worst_case_total(&self, max_attempts: u32) -> Duration {
        let retries = max_attempts.saturating_sub(1);
        let mut total = Duration::ZERO;
        for retry in 0..retries {
            total = total.saturating_add(self.base_delay(retry));
            if total >= self.total_budget {
                return self.total_budget;
            }
        }
        total
    }

    fn base_delay(&self, retry_index: u32) -> Duration {
        self.step
            .saturating_mul(retry_index)
            .saturating_add(self.initial_delay)
            .min(self.max_delay)
    }
}

/// Stateful retry policy for one bootstrap sequence.
///
/// # Example
///
/// ```rust
/// use market_data_init::domain::retry::{RetryConfig, RetryPolicy};
/// use std::time::Duration;
///
/// let mut policy = RetryPolicy::new(RetryConfig::default());
///
/// assert_eq!(policy.next_delay(), Duration::from_secs(1));
/// assert_eq!(policy.next_delay(), Duration::from_secs(2));
/// assert_eq!(policy.retry_count(), 2);
/// ```
#[derive(Debug)]
pub struct RetryPolicy {
    config: RetryConfig,
    retry_count: u32,
    spent: Duration,
}

impl RetryPolicy {
    /// Create a new retry policy.
    #[must_use]
    pub const fn new(config: RetryConfig) -> Self {
        Self {
            config,
            retry_count: 0,
            spent: Duration::ZERO,
        }
    }

    /// Delay before the next retry.
    ///
    /// Returns `Duration::ZERO` once the total budget is spent.
    pub fn next_delay(&mut self) -> Duration {
        let base = self.config.base_delay(self.retry_count);
        self.retry_count = self.retry_count.saturating_add(1);

        let delay = self.apply_jitter(base).min(self.remaining_budget());
        self.spent = self.spent.saturating_add(delay);
        delay
    }

    /// Budget not yet handed out.
    #[must_use]
    pub fn remaining_budget(&self) -> Duration {
        self.config.total_budget.saturating_sub(self.spent)
    }

    /// Number of delays handed out.
    #[must_use]
    pub const fn retry_count(&self) -> u32 {
        self.retry_count
    }

    fn apply_jitter(&self, duration: Duration) -> Duration {
        let factor = self.config.jitter_factor;
        if !factor.is_finite() || factor <= 0.0 || duration.is_zero() {
            return duration;
        }

        #[allow(clippy::cast_precision_loss)]
        let base_millis = duration.as_millis() as f64;
        let jitter_range = base_millis * factor;
        let mut rng = rand::rng();
        let jitter: f64 = rng.random_range(-jitter_range..=jitter_range);
        let adjusted_millis = (base_millis + jitter).max(1.0);

        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let adjusted_u64 = adjusted_millis as u64;
        Duration::from_millis(adjusted_u64)
    }
}

//! Service Configuration Settings
//!
//! Configuration types for the initializer service, loaded from environment
//! variables.

use std::time::Duration;

use crate::domain::retry::RetryConfig;
use crate::domain::snapshot::Symbol;

/// Default ceiling on bootstrap fetch attempts.
pub const MAX_INIT_ATTEMPTS: u32 = 3;

/// Bootstrap retry settings.
#[derive(Debug, Clone)]
pub struct InitializerSettings {
    /// Bootstrap attempt ceiling.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub retry_delay_initial: Duration,
    /// Delay added for every further retry.
    pub retry_delay_step: Duration,
    /// Upper bound for a single retry delay.
    pub retry_delay_max: Duration,
    /// Upper bound for the sum of retry delays.
    pub retry_total_budget: Duration,
    /// Jitter fraction applied to each delay.
    pub retry_jitter: f64,
}

impl Default for InitializerSettings {
    fn default() -> Self {
        let retry = RetryConfig::default();
        Self {
            max_attempts: MAX_INIT_ATTEMPTS,
            retry_delay_initial: retry.initial_delay,
            retry_delay_step: retry.step,
            retry_delay_max: retry.max_delay,
            retry_total_budget: retry.total_budget,
            retry_jitter: retry.jitter_factor,
        }
    }
}

impl InitializerSettings {
    /// Retry configuration for the bootstrap sequence.
    #[must_use]
    pub const fn retry_config(&self) -> RetryConfig {
        RetryConfig::new(
            self.retry_delay_initial,
            self.retry_delay_step,
            self.retry_delay_max,
            self.retry_jitter,
            self.retry_total_budget,
        )
    }
}

/// Upstream price feed settings.
#[derive(Debug, Clone)]
pub struct FeedSettings {
    /// 24h ticker endpoint.
    pub url: String,
    /// Symbols to track.
    pub symbols: Vec<Symbol>,
    /// Interval between background refreshes.
    pub poll_interval: Duration,
    /// Per-request timeout.
    pub request_timeout: Duration,
    /// Maximum feed errors kept in a snapshot (0 = unbounded).
    pub max_error_history: usize,
}

impl Default for FeedSettings {
    fn default() -> Self {
        Self {
            url: "https://api.binance.com/api/v3/ticker/24hr".to_string(),
            symbols: ["BTCUSDT", "ETHUSDT", "BNBUSDT", "SOLUSDT", "XRPUSDT"]
                .into_iter()
                .map(String::from)
                .collect(),
            poll_interval: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
            max_error_history: 10,
        }
    }
}

/// Server port settings.
#[derive(Debug, Clone)]
pub struct ServerSettings {
    /// Health check HTTP port.
    pub health_port: u16,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self { health_port: 8083 }
    }
}

/// Complete service configuration.
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Bootstrap settings.
    pub initializer: InitializerSettings,
    /// Price feed settings.
    pub feed: FeedSettings,
    /// Server port settings.
    pub server: ServerSettings,
}

impl AppConfig {
    /// Create configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if a value that has no usable fallback is invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Create configuration from an arbitrary key lookup.
    ///
    /// Unparseable numeric values fall back to their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if `MAX_INIT_ATTEMPTS` or `MARKET_FEED_POLL_INTERVAL_MS`
    /// is zero, `INIT_RETRY_JITTER` is not finite, or the symbol list is empty.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let env = Env(lookup);
        let init_defaults = InitializerSettings::default();
        let feed_defaults = FeedSettings::default();

        let max_attempts = env.parse("MAX_INIT_ATTEMPTS", init_defaults.max_attempts);
        if max_attempts == 0 {
            return Err(ConfigError::InvalidValue {
                key: "MAX_INIT_ATTEMPTS".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let jitter: f64 = env.parse("INIT_RETRY_JITTER", init_defaults.retry_jitter);
        if !jitter.is_finite() {
            return Err(ConfigError::InvalidValue {
                key: "INIT_RETRY_JITTER".to_string(),
                reason: "must be a finite number".to_string(),
            });
        }
        let jitter = jitter.clamp(0.0, 1.0);

        let initializer = InitializerSettings {
            max_attempts,
            retry_delay_initial: env.millis(
                "INIT_RETRY_DELAY_INITIAL_MS",
                init_defaults.retry_delay_initial,
            ),
            retry_delay_step: env.millis("INIT_RETRY_DELAY_STEP_MS", init_defaults.retry_delay_step),
            retry_delay_max: env.millis("INIT_RETRY_DELAY_MAX_MS", init_defaults.retry_delay_max),
            retry_total_budget: env.millis(
                "INIT_RETRY_TOTAL_BUDGET_MS",
                init_defaults.retry_total_budget,
            ),
            retry_jitter: jitter,
        };

        let url = match env.get("MARKET_FEED_URL") {
            Some(url) if url.trim().is_empty() => {
                return Err(ConfigError::EmptyValue("MARKET_FEED_URL".to_string()));
            }
            Some(url) => url.trim().to_string(),
            None => feed_defaults.url,
        };

        let symbols = match env.get("MARKET_FEED_SYMBOLS") {
            Some(raw) => parse_symbols(&raw),
            None => feed_defaults.symbols,
        };
        if symbols.is_empty() {
            return Err(ConfigError::EmptyValue("MARKET_FEED_SYMBOLS".to_string()));
        }

        let poll_interval = env.millis("MARKET_FEED_POLL_INTERVAL_MS", feed_defaults.poll_interval);
        if poll_interval.is_zero() {
            return Err(ConfigError::InvalidValue {
                key: "MARKET_FEED_POLL_INTERVAL_MS".to_string(),
                reason: "must be at least 1".to_string(),
            });
        }

        let feed = FeedSettings {
            url,
            symbols,
            poll_interval,
            request_timeout: env.millis("MARKET_FEED_TIMEOUT_MS", feed_defaults.request_timeout),
            max_error_history: env.parse("MARKET_FEED_MAX_ERRORS", feed_defaults.max_error_history),
        };

        let server = ServerSettings {
            health_port: env.parse("HEALTH_PORT", ServerSettings::default().health_port),
        };

        Ok(Self {
            initializer,
            feed,
            server,
        })
    }
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Environment variable has empty value.
    #[error("environment variable {0} cannot be empty")]
    EmptyValue(String),
    /// Environment variable has a value that cannot be used.
    #[error("invalid value for {key}: {reason}")]
    InvalidValue {
        /// Variable name.
        key: String,
        /// Why the value was rejected.
        reason: String,
    },
}

struct Env<F>(F);

impl<F: Fn(&str) -> Option<String>> Env<F> {
    fn get(&self, key: &str) -> Option<String> {
        (self.0)(key)
    }

    fn parse<T: std::str::FromStr>(&self, key: &str, default: T) -> T {
        self.get(key)
            .and_then(|v| v.trim().parse().ok())
            .unwrap_or(default)
    }

    fn millis(&self, key: &str, default: Duration) -> Duration {
        self.get(key)
            .and_then(|v| v.trim().parse::<u64>().ok())
            .map_or(default, Duration::from_millis)
    }
}

fn parse_symbols(raw: &str) -> Vec<Symbol> {
    let mut symbols: Vec<Symbol> = Vec::new();
    for symbol in raw.split(',').map(|s| s.trim().to_uppercase()) {
        if !symbol.is_empty() && !symbols.contains(&symbol) {
            symbols.push(symbol);
        }
    }
    symbols
}

//! Market Snapshot Types
//!
//! The market-data cache is exposed as an immutable [`MarketSnapshot`].
//! Every refresh produces a new snapshot value that replaces the previous
//! one; nothing mutates a published snapshot in place.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

// =============================================================================
// Types
// =============================================================================

/// A trading symbol (e.g. `BTCUSDT`, `EURUSD`).
pub type Symbol = String;

/// Snapshot handle shared between the feed, the initializer and observers.
pub type SharedSnapshot = Arc<MarketSnapshot>;

/// Price data for one symbol.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PriceData {
    /// Symbol this price belongs to.
    pub symbol: Symbol,
    /// Last traded price.
    pub price: Decimal,
    /// Price change over the last 24 hours, in percent.
    pub change_percent_24h: Decimal,
    /// Traded volume over the last 24 hours.
    pub volume_24h: Decimal,
    /// Highest price over the last 24 hours.
    pub high_24h: Decimal,
    /// Lowest price over the last 24 hours.
    pub low_24h: Decimal,
}

impl PriceData {
    /// Create price data from a last price; 24h change and volume start at zero.
    #[must_use]
    pub fn new(symbol: impl Into<Symbol>, price: Decimal) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            change_percent_24h: Decimal::ZERO,
            volume_24h: Decimal::ZERO,
            high_24h: price,
            low_24h: price,
        }
    }
}

/// Category of a feed failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedErrorKind {
    /// Transport failure (DNS, connect, reset).
    Network,
    /// Request exceeded its timeout.
    Timeout,
    /// Upstream answered with a non-success status.
    Status,
    /// Upstream body could not be decoded.
    Parse,
    /// Upstream answered but carried no usable prices.
    Empty,
}

impl FeedErrorKind {
    /// Label used in logs and metrics.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Network => "network",
            Self::Timeout => "timeout",
            Self::Status => "status",
            Self::Parse => "parse",
            Self::Empty => "empty",
        }
    }
}

/// One feed failure carried inside a snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedErrorRecord {
    /// Failure category.
    pub kind: FeedErrorKind,
    /// Human readable description.
    pub message: String,
    /// When the failure was observed.
    pub occurred_at: DateTime<Utc>,
}

impl FeedErrorRecord {
    /// Create a record stamped at `occurred_at`.
    #[must_use]
    pub fn new(kind: FeedErrorKind, message: impl Into<String>, occurred_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            message: message.into(),
            occurred_at,
        }
    }
}

// =============================================================================
// Market Snapshot
// =============================================================================

/// Point-in-time view of the market-data cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketSnapshot {
    /// Prices keyed by symbol.
    pub prices: HashMap<Symbol, PriceData>,
    /// True until the first fetch attempt completes.
    pub is_loading: bool,
    /// When this snapshot was produced.
    pub last_update: DateTime<Utc>,
    /// Feed errors since the last successful fetch, oldest first.
    pub errors: Vec<FeedErrorRecord>,
}

impl Default for MarketSnapshot {
    fn default() -> Self {
        Self::loading()
    }
}

impl MarketSnapshot {
    /// Snapshot of a cache that has not completed any fetch yet.
    #[must_use]
    pub fn loading() -> Self {
        Self {
            prices: HashMap::new(),
            is_loading: true,
            last_update: DateTime::<Utc>::UNIX_EPOCH,
            errors: Vec::new(),
        }
    }

    /// Snapshot produced by a successful fetch.
    #[must_use]
    pub fn loaded(prices: HashMap<Symbol, PriceData>, last_update: DateTime<Utc>) -> Self {
        Self {
            prices,
            is_loading: false,
            last_update,
            errors: Vec::new(),
        }
    }

    /// Build the snapshot that follows a failed fetch.
    ///
    /// Last-good prices are kept and `error` is appended. When
    /// `max_errors` is non-zero the oldest records are dropped so that at
    /// most `max_errors` remain.
    #[must_use]
    pub fn with_failure(
        &self,
        error: FeedErrorRecord,
        last_update: DateTime<Utc>,
        max_errors: usize,
    ) -> Self {
        let mut errors = self.errors.clone();
        errors.push(error);
        if max_errors > 0 && errors.len() > max_errors {
            let excess = errors.len() - max_errors;
            errors.drain(..excess);
        }

        Self {
            prices: self.prices.clone(),
            is_loading: false,
            last_update,
            errors,
        }
    }

    /// Whether the snapshot can be handed to the application as "ready".
    ///
    /// Usable means at least one price and no outstanding feed errors.
    #[must_use]
    pub fn is_usable(&self) -> bool {
        !self.prices.is_empty() && self.errors.is_empty()
    }

    /// Whether the snapshot carries feed errors.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }

    /// Price data for `symbol`, if present.
    #[must_use]
    pub fn price(&self, symbol: &str) -> Option<&PriceData> {
        self.prices.get(symbol)
    }

    /// Number of symbols with a price.
    #[must_use]
    pub fn symbol_count(&self) -> usize {
        self.prices.len()
    }

    /// Most recent feed error.
    #[must_use]
    pub fn last_error(&self) -> Option<&FeedErrorRecord> {
        self.errors.last()
    }
}

/// Timestamp for a snapshot that follows one stamped `previous`.
///
/// Snapshot timestamps strictly increase even when the wall clock does not
/// advance between two refreshes.
#[must_use]
pub fn next_update_time(previous: DateTime<Utc>) -> DateTime<Utc> {
    let now = Utc::now();
    if now > previous {
        now
    } else {
        previous + TimeDelta::microseconds(1)
    }
}

// =============================================================================
// Tests
// =============================================================================

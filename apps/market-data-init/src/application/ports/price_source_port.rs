//! Price Source Port (Driven Port)
//!
//! Interface for the remote endpoint a market-data service polls.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::domain::snapshot::{FeedErrorKind, PriceData, Symbol};

/// Prices keyed by symbol, as returned by one fetch.
pub type PriceTable = HashMap<Symbol, PriceData>;

/// Price source error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PriceSourceError {
    /// Transport failure.
    #[error("price source network error: {message}")]
    Network {
        /// Error details.
        message: String,
    },

    /// Request exceeded its timeout.
    #[error("price source request timed out")]
    Timeout,

    /// Non-success HTTP status.
    #[error("price source returned status {status}: {body}")]
    Status {
        /// HTTP status code.
        status: u16,
        /// Response body (may be empty).
        body: String,
    },

    /// Body could not be decoded.
    #[error("price source response could not be parsed: {message}")]
    Parse {
        /// Error details.
        message: String,
    },

    /// Response carried none of the requested symbols.
    #[error("price source returned no prices")]
    Empty,
}

impl PriceSourceError {
    /// Snapshot error category for this failure.
    #[must_use]
    pub const fn kind(&self) -> FeedErrorKind {
        match self {
            Self::Network { .. } => FeedErrorKind::Network,
            Self::Timeout => FeedErrorKind::Timeout,
            Self::Status { .. } => FeedErrorKind::Status,
            Self::Parse { .. } => FeedErrorKind::Parse,
            Self::Empty => FeedErrorKind::Empty,
        }
    }
}

/// Port for fetching current prices.
#[async_trait]
pub trait PriceSource: Send + Sync {
    /// Fetch current prices for the configured symbols.
    async fn fetch_prices(&self) -> Result<PriceTable, PriceSourceError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_kinds() {
        assert_eq!(
            PriceSourceError::Network {
                message: "reset".to_string()
            }
            .kind(),
            FeedErrorKind::Network
        );
        assert_eq!(PriceSourceError::Timeout.kind(), FeedErrorKind::Timeout);
        assert_eq!(
            PriceSourceError::Status {
                status: 503,
                body: String::new()
            }
            .kind(),
            FeedErrorKind::Status
        );
        assert_eq!(PriceSourceError::Empty.kind(), FeedErrorKind::Empty);
    }

    #[test]
    fn error_messages() {
        let err = PriceSourceError::Status {
            status: 429,
            body: "rate limited".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "price source returned status 429: rate limited"
        );
    }
}

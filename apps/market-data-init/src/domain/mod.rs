//! Domain Layer - Market snapshot types and bootstrap lifecycle rules.
//!
//! Everything here is pure: no I/O, no runtime, no global state.

/// Market snapshot types (prices, feed errors).
pub mod snapshot;

/// Initialization state machine.
pub mod lifecycle;

/// Retry backoff policy for the bootstrap sequence.
pub mod retry;

//! Initialization Lifecycle
//!
//! State machine for one initializer instance:
//!
//! ```text
//! UNINITIALIZED --(begin)--> BOOTSTRAPPING
//! BOOTSTRAPPING --(usable fetch)--> READY
//! BOOTSTRAPPING --(failed, attempt < max)--> BOOTSTRAPPING (attempt + 1)
//! BOOTSTRAPPING --(failed, attempt >= max)--> READY (degraded)
//! ANY --(terminate)--> TERMINATED
//! ```
//!
//! `ready` flips at most once per instance and `attempt` never decreases.

use serde::Serialize;

/// Phase of an initializer instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitializerPhase {
    /// Constructed, bootstrap not started.
    #[default]
    Uninitialized,
    /// Fetch attempts in progress.
    Bootstrapping,
    /// Market data delivered and readiness reported.
    Ready,
    /// Cleaned up; no further notifications.
    Terminated,
}

impl InitializerPhase {
    /// Phase name for logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Uninitialized => "uninitialized",
            Self::Bootstrapping => "bootstrapping",
            Self::Ready => "ready",
            Self::Terminated => "terminated",
        }
    }
}

impl std::fmt::Display for InitializerPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected lifecycle transition.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    /// `max_attempts` must be at least one.
    #[error("max attempts must be at least 1")]
    InvalidMaxAttempts,
    /// Attempts are 1-based.
    #[error("attempt must be at least 1")]
    InvalidAttempt,
    /// Transition not allowed from the current phase.
    #[error("cannot {action} while {phase}")]
    InvalidTransition {
        /// Requested action.
        action: &'static str,
        /// Phase at the time of the request.
        phase: InitializerPhase,
    },
}

/// Bootstrap bookkeeping owned by one initializer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InitializationState {
    attempt: u32,
    max_attempts: u32,
    ready: bool,
    degraded: bool,
    phase: InitializerPhase,
}

impl Default for InitializationState {
    fn default() -> Self {
        Self::new()
    }
}

impl InitializationState {
    /// Fresh state: attempt 1, not ready.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            attempt: 1,
            max_attempts: 0,
            ready: false,
            degraded: false,
            phase: InitializerPhase::Uninitialized,
        }
    }

    /// Enter `Bootstrapping` at `attempt` with ceiling `max_attempts`.
    ///
    /// # Errors
    ///
    /// Fails on a zero argument or when the bootstrap already started.
    pub fn begin(&mut self, attempt: u32, max_attempts: u32) -> Result<(), LifecycleError> {
        if max_attempts == 0 {
            return Err(LifecycleError::InvalidMaxAttempts);
        }
        if attempt == 0 {
            return Err(LifecycleError::InvalidAttempt);
        }
        if self.phase != InitializerPhase::Uninitialized {
            return Err(LifecycleError::InvalidTransition {
                action: "begin bootstrap",
                phase: self.phase,
            });
        }

        self.attempt = attempt;
        self.max_attempts = max_attempts;
        self.phase = InitializerPhase::Bootstrapping;
        Ok(())
    }

    /// Move to the next attempt after a scheduled retry fires.
    ///
    /// # Errors
    ///
    /// Only valid while bootstrapping.
    pub fn advance(&mut self) -> Result<u32, LifecycleError> {
        if self.phase != InitializerPhase::Bootstrapping {
            return Err(LifecycleError::InvalidTransition {
                action: "advance attempt",
                phase: self.phase,
            });
        }
        self.attempt = self.attempt.saturating_add(1);
        Ok(self.attempt)
    }

    /// Enter `Ready`. `degraded` marks fail-open readiness.
    ///
    /// # Errors
    ///
    /// Only valid while bootstrapping, which also makes it a one-shot.
    pub fn mark_ready(&mut self, degraded: bool) -> Result<(), LifecycleError> {
        if self.phase != InitializerPhase::Bootstrapping {
            return Err(LifecycleError::InvalidTransition {
                action: "mark ready",
                phase: self.phase,
            });
        }
        self.ready = true;
        self.degraded = degraded;
        self.phase = InitializerPhase::Ready;
        Ok(())
    }

    /// Enter `Terminated`. Idempotent; returns true on the first call.
    pub fn terminate(&mut self) -> bool {
        if self.phase == InitializerPhase::Terminated {
            return false;
        }
        self.phase = InitializerPhase::Terminated;
        true
    }

    /// Whether the in-flight attempt is the last one allowed.
    #[must_use]
    pub const fn is_final_attempt(&self) -> bool {
        self.attempt >= self.max_attempts
    }

    /// Current 1-based attempt.
    #[must_use]
    pub const fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Attempt ceiling supplied at `begin`.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Whether readiness has been reported.
    #[must_use]
    pub const fn is_ready(&self) -> bool {
        self.ready
    }

    /// Whether readiness was reached by exhausting attempts.
    #[must_use]
    pub const fn is_degraded(&self) -> bool {
        self.degraded
    }

    /// Current phase.
    #[must_use]
    pub const fn phase(&self) -> InitializerPhase {
        self.phase
    }
}

//! Retry policies for remote and storage failures.
//!
//! Rate-limit responses are not governed by these policies: they carry their
//! own delay and are always retried after exactly that delay.

use std::time::Duration;

/// Default backoff after a transient failure (1 second).
pub const DEFAULT_TRANSIENT_BACKOFF_MS: u64 = 1_000;

/// Default number of attempts for an on-demand lookup, including the first.
pub const DEFAULT_ON_DEMAND_ATTEMPTS: u32 = 3;

/// How an operation handles transient failures.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RetryPolicy {
    /// Bounded number of attempts with a constant delay between them.
    ///
    /// Used for lookups a caller is waiting on.
    Fixed {
        /// Maximum number of attempts (including the initial attempt).
        max_attempts: u32,
        /// Delay between attempts.
        delay: Duration,
    },

    /// Retry without limit after a constant delay.
    ///
    /// Used by the unattended background loop.
    Unbounded {
        /// Delay between attempts.
        delay: Duration,
    },
}

impl RetryPolicy {
    /// Creates a fixed retry policy.
    pub fn fixed(max_attempts: u32, delay: Duration) -> Self {
        Self::Fixed {
            max_attempts,
            delay,
        }
    }

    /// Creates an unbounded retry policy.
    pub fn unbounded(delay: Duration) -> Self {
        Self::Unbounded { delay }
    }

    /// Delay before retry number `attempt` (1-based, 1 is the first retry),
    /// or `None` when no further attempt is allowed.
    pub fn delay_for_attempt(&self, attempt: u32) -> Option<Duration> {
        match self {
            Self::Fixed {
                max_attempts,
                delay,
            } => (attempt < *max_attempts).then_some(*delay),
            Self::Unbounded { delay } => Some(*delay),
        }
    }
}

//! Memory-pressure retry loop
//!
//! An attempt that fails because an allocation failed is retried after the
//! caller's resources have been dropped and a relief hint has been sent.
//! Every other failure ends the loop immediately.

use crate::error::{BgRemovalError, Result};
use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Hint that the process should free memory before the next attempt
pub trait MemoryRelief: Send + Sync {
    /// Called after attempt `attempt` failed with memory pressure and before
    /// attempt `attempt + 1` starts
    fn request_relief(&self, attempt: u32, cause: &str);
}

/// Relief hint that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMemoryRelief;

impl MemoryRelief for NoOpMemoryRelief {
    fn request_relief(&self, _attempt: u32, _cause: &str) {}
}

/// Relief hint that only logs
///
/// A Rust process has no collector to poke; by the time the hint fires the
/// failed attempt's buffers have already been dropped.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMemoryRelief;

impl MemoryRelief for TracingMemoryRelief {
    fn request_relief(&self, attempt: u32, cause: &str) {
        warn!(attempt, cause, "memory relief requested before next attempt");
    }
}

/// Transitions of one retry run
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum AttemptPhase {
    Attempting { attempt: u32 },
    Succeeded { attempts: u32 },
    MemoryPressureRetry { attempt: u32, cause: String },
    Exhausted { attempts: u32, cause: String },
    OtherFailure { attempt: u32 },
}

impl AttemptPhase {
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::Succeeded { .. } | Self::Exhausted { .. } | Self::OtherFailure { .. }
        )
    }
}

/// Bookkeeping for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptState {
    attempt: u32,
    last_cause: Option<String>,
}

impl AttemptState {
    fn new() -> Self {
        Self {
            attempt: 1,
            last_cause: None,
        }
    }

    fn advance(&mut self, cause: String) {
        self.attempt += 1;
        self.last_cause = Some(cause);
    }

    #[must_use]
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    #[must_use]
    pub fn last_cause(&self) -> Option<&str> {
        self.last_cause.as_deref()
    }
}

/// A successful value with the number of attempts it took
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attempted<T> {
    pub value: T,
    pub attempts: u32,
}

/// Drives attempts until success, a non-memory failure, or exhaustion
#[derive(Clone)]
pub struct RetryController {
    max_attempts: u32,
    relief: Arc<dyn MemoryRelief>,
}

impl std::fmt::Debug for RetryController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryController")
            .field("max_attempts", &self.max_attempts)
            .finish_non_exhaustive()
    }
}

impl RetryController {
    /// `max_attempts` below 1 is treated as 1
    #[must_use]
    pub fn new(max_attempts: u32, relief: Arc<dyn MemoryRelief>) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            relief,
        }
    }

    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run `attempt_fn` with attempt numbers starting at 1
    ///
    /// # Errors
    /// - `OutOfMemory` when every allowed attempt hit memory pressure
    /// - The first non-memory error, unchanged
    pub fn run<T, F>(&self, attempt_fn: F) -> Result<Attempted<T>>
    where
        F: FnMut(u32) -> Result<T>,
    {
        self.run_observed(attempt_fn, |_| {})
    }

    /// Like [`run`](Self::run), reporting every transition to `observer`
    ///
    /// # Errors
    /// - Same as [`run`](Self::run)
    pub fn run_observed<T, F, O>(&self, mut attempt_fn: F, mut observer: O) -> Result<Attempted<T>>
    where
        F: FnMut(u32) -> Result<T>,
        O: FnMut(&AttemptPhase),
    {
        let mut state = AttemptState::new();

        loop {
            let attempt = state.attempt();
            debug!(attempt, max_attempts = self.max_attempts, "starting attempt");
            observer(&AttemptPhase::Attempting { attempt });

            match attempt_fn(attempt) {
                Ok(value) => {
                    if attempt > 1 {
                        info!(attempt, "attempt succeeded after memory pressure");
                    }
                    observer(&AttemptPhase::Succeeded { attempts: attempt });
                    return Ok(Attempted {
                        value,
                        attempts: attempt,
                    });
                },
                Err(error) if error.is_memory_pressure() => {
                    let cause = error.to_string();
                    drop(error);

                    if attempt >= self.max_attempts {
                        warn!(attempts = attempt, %cause, "memory pressure persisted, giving up");
                        observer(&AttemptPhase::Exhausted {
                            attempts: attempt,
                            cause: cause.clone(),
                        });
                        return Err(BgRemovalError::OutOfMemory {
                            attempts: attempt,
                            cause,
                        });
                    }

                    warn!(attempt, %cause, "memory pressure, retrying");
                    observer(&AttemptPhase::MemoryPressureRetry {
                        attempt,
                        cause: cause.clone(),
                    });
                    self.relief.request_relief(attempt, &cause);
                    state.advance(cause);
                },
                Err(error) => {
                    debug!(attempt, code = error.code(), "attempt failed without retry");
                    observer(&AttemptPhase::OtherFailure { attempt });
                    return Err(error);
                },
            }
        }
    }
}

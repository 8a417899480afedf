//! Retry policy collaborator and the flush retry state machine.

use std::time::Duration;

use tracing::warn;

use crate::error::FsError;

/// One retry budget, created per logical operation.
pub trait RetrySession: Send {
    /// Whether another attempt of `op` is permitted after `err`.
    ///
    /// A `true` answer consumes budget; callers must only ask when they
    /// intend to actually retry.
    fn should_retry(&mut self, op: &str, err: &FsError) -> bool;
}

/// Hands out retry sessions. Shared across the mount.
pub trait RetryPolicy: Send + Sync {
    fn start_operation(&self) -> Box<dyn RetrySession>;
}

/// Stock policy: a fixed number of attempts per operation, first try
/// included.
#[derive(Debug, Clone, Copy)]
pub struct AttemptBudget {
    max_attempts: u32,
}

impl AttemptBudget {
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self { max_attempts }
    }
}

impl RetryPolicy for AttemptBudget {
    fn start_operation(&self) -> Box<dyn RetrySession> {
        Box::new(BudgetSession {
            retries_left: self.max_attempts.saturating_sub(1),
        })
    }
}

struct BudgetSession {
    retries_left: u32,
}

impl RetrySession for BudgetSession {
    fn should_retry(&mut self, op: &str, err: &FsError) -> bool {
        if self.retries_left == 0 {
            return false;
        }
        self.retries_left -= 1;
        warn!(
            op,
            error = %err,
            retries_left = self.retries_left,
            "transient failure, retrying"
        );
        true
    }
}

/// Where a flush retry loop currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushState {
    /// An upload attempt is in flight.
    Attempting { attempt: u32 },
    /// Waiting out the pause before the next attempt.
    Backoff { attempt: u32 },
    /// The retry budget ran out on a transient failure.
    Exhausted,
    /// Terminal: the loop has a final answer (success or a non-retryable
    /// error).
    Done,
}

/// What the caller must do after reporting an attempt's outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlushStep {
    /// Finished; return the attempt's result as-is.
    Done,
    /// The error is final; return it.
    Fail,
    /// Reset the backend connection, wait this long, call
    /// [`FlushDriver::resume`], then attempt again.
    RetryAfter(Duration),
}

/// Explicit state machine driving the flush retry loop.
///
/// Pure by construction: it never sleeps and performs no I/O. The caller owns
/// the side effects (connection reset, backoff wait) each step prescribes,
/// which keeps the retry decisions unit-testable without a runtime.
pub struct FlushDriver {
    state: FlushState,
    session: Box<dyn RetrySession>,
    backoff: Duration,
}

impl FlushDriver {
    pub fn new(policy: &dyn RetryPolicy, backoff: Duration) -> Self {
        Self {
            state: FlushState::Attempting { attempt: 1 },
            session: policy.start_operation(),
            backoff,
        }
    }

    #[must_use]
    pub fn state(&self) -> FlushState {
        self.state
    }

    /// Feeds one attempt's outcome in and yields the next step.
    ///
    /// Only transient errors consult the retry session; every other error is
    /// terminal on first sight.
    pub fn on_attempt(&mut self, op: &str, outcome: Result<(), &FsError>) -> FlushStep {
        let FlushState::Attempting { attempt } = self.state else {
            debug_assert!(false, "on_attempt outside an attempt: {:?}", self.state);
            return FlushStep::Fail;
        };
        match outcome {
            Ok(()) => {
                self.state = FlushState::Done;
                FlushStep::Done
            }
            Err(err) if err.is_transient() => {
                if self.session.should_retry(op, err) {
                    self.state = FlushState::Backoff { attempt };
                    FlushStep::RetryAfter(self.backoff)
                } else {
                    self.state = FlushState::Exhausted;
                    FlushStep::Fail
                }
            }
            Err(_) => {
                self.state = FlushState::Done;
                FlushStep::Fail
            }
        }
    }

    /// Marks the backoff wait complete and the next attempt underway.
    pub fn resume(&mut self) {
        if let FlushState::Backoff { attempt } = self.state {
            self.state = FlushState::Attempting {
                attempt: attempt + 1,
            };
        } else {
            debug_assert!(false, "resume outside backoff: {:?}", self.state);
        }
    }
}

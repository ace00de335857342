//! Run-wide cancellation signal.
//!
//! A [`CancellationToken`] is created once per run, optionally with a
//! deadline, and cloned into every handler context. Handlers and shell
//! commands poll it between blocking operations; the orchestrator cannot
//! interrupt a handler that never looks.

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken as SignalToken;

use crate::error::{Result, RolloutError};

/// Cloneable cancellation signal shared by all workers of a run.
///
/// The explicit signal is a [`tokio_util::sync::CancellationToken`]; the
/// deadline is checked against the wall clock on every poll.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    signal: SignalToken,
    deadline: Option<Instant>,
}

impl CancellationToken {
    /// Create a token with no deadline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token that trips at `deadline`.
    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            signal: SignalToken::new(),
            deadline: Some(deadline),
        }
    }

    /// Create a token that trips `timeout` from now.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    /// Request cancellation.
    pub fn cancel(&self) {
        self.signal.cancel();
    }

    /// Whether cancellation was requested or the deadline has passed.
    pub fn is_cancelled(&self) -> bool {
        self.signal.is_cancelled()
            || self
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }

    /// The run deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Time left before the deadline (zero once it has passed).
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// Return `Err(Cancelled)` if the token has tripped.
    pub fn check(&self) -> Result<()> {
        if !self.is_cancelled() {
            return Ok(());
        }
        let reason = if self.signal.is_cancelled() {
            "run was cancelled"
        } else {
            "run deadline exceeded"
        };
        Err(RolloutError::Cancelled {
            reason: reason.to_string(),
        })
    }
}

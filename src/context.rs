use std::fmt;
use std::time::Duration;

use tokio::time::{Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Why a wait was abandoned before every action finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The caller cancelled the token (e.g. Ctrl-C).
    Cancelled,
    /// The deadline elapsed.
    DeadlineExceeded,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::Cancelled => write!(f, "cancelled"),
            StopReason::DeadlineExceeded => write!(f, "timed out"),
        }
    }
}

/// Cancellation signal plus an optional deadline for one wait call.
#[derive(Debug, Clone)]
pub struct WaitContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl WaitContext {
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    pub fn with_deadline(token: CancellationToken, deadline: Instant) -> Self {
        Self {
            token,
            deadline: Some(deadline),
        }
    }

    pub fn with_timeout(token: CancellationToken, timeout: Duration) -> Self {
        Self::with_deadline(token, Instant::now() + timeout)
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// The reason the context is done, if it already is.
    pub fn stop_reason(&self) -> Option<StopReason> {
        if self.token.is_cancelled() {
            Some(StopReason::Cancelled)
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Some(StopReason::DeadlineExceeded)
        } else {
            None
        }
    }

    pub fn is_done(&self) -> bool {
        self.stop_reason().is_some()
    }

    /// Resolves once the token is cancelled or the deadline elapses.
    pub async fn done(&self) -> StopReason {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    biased;
                    () = self.token.cancelled() => StopReason::Cancelled,
                    () = sleep_until(deadline) => StopReason::DeadlineExceeded,
                }
            }
            None => {
                self.token.cancelled().await;
                StopReason::Cancelled
            }
        }
    }
}

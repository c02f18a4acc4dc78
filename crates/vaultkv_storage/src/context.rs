//! Per-operation cancellation and deadlines.

use crate::error::{StorageError, StorageResult};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline scope passed to every storage operation.
///
/// A `Context` is cheap to clone; clones share the same cancellation
/// token. Child contexts are cancelled when their parent is, but
/// cancelling a child leaves the parent untouched.
///
/// Layers call [`Context::check`] before starting I/O. If the context
/// ends while I/O is running, the I/O completes and its result is
/// discarded in favour of the cancellation error.
#[derive(Debug, Clone, Default)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Returns a context that is never cancelled and has no deadline.
    #[must_use]
    pub fn background() -> Self {
        Self::default()
    }

    /// Returns a child context that expires after `timeout`.
    #[must_use]
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Returns a child context that expires at `deadline`.
    ///
    /// The earlier of the parent's deadline and `deadline` wins.
    #[must_use]
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(existing) if existing < deadline => existing,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Returns a child context sharing this context's deadline.
    #[must_use]
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Cancels this context and all of its children.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the deadline, if any.
    #[must_use]
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once the context is cancelled or past its deadline.
    #[must_use]
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Fails with the reason the context ended, if it has.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError::Canceled`] or [`StorageError::DeadlineExceeded`].
    pub fn check(&self) -> StorageResult<()> {
        if self.token.is_cancelled() {
            return Err(StorageError::Canceled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(StorageError::DeadlineExceeded),
            _ => Ok(()),
        }
    }
}

//! error.rs
//! Error and result types returned by throttler operations.

use core::fmt;
use thiserror::Error;

/// Reasons a throttler refuses an operation.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleError {
    /// The call was made from inside this throttler's own callback.
    ///
    /// The callback runs while the internal lock is held, so honoring the call
    /// would deadlock. Push into a different throttler, or hand the value to
    /// another thread, instead.
    #[error("throttler callback attempted to re-enter the same throttler")]
    Reentrant,

    /// The throttler has been shut down and accepts no more values.
    #[error("throttler has been shut down")]
    Closed,
}

/// A rejected push. Carries the value back to the caller.
#[derive(Error)]
#[error("push rejected: {kind}")]
pub struct PushError<T> {
    kind: ThrottleError,
    value: T,
}

impl<T> PushError<T> {
    pub(crate) fn new(kind: ThrottleError, value: T) -> Self {
        Self { kind, value }
    }

    /// Why the push was rejected.
    #[inline]
    pub fn kind(&self) -> ThrottleError {
        self.kind
    }

    /// Recovers the value that was not accepted.
    #[inline]
    pub fn into_inner(self) -> T {
        self.value
    }
}

// Skips the value so `T` needs no `Debug` bound.
impl<T> fmt::Debug for PushError<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PushError")
            .field("kind", &self.kind)
            .finish_non_exhaustive()
    }
}

/// Result type for [`try_push`](crate::Throttle::try_push).
pub type PushResult<T> = Result<(), PushError<T>>;

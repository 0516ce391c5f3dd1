//! Core trait for throttlers.
//!
//! This module defines the producer-side interface shared by throttler
//! implementations, so callers can hold a `Box<dyn Throttle<T>>` or an
//! `Arc<dyn Throttle<T>>` without naming the concrete type.

use crate::PushResult;

/// The producer-side interface of a throttler.
///
/// Implementors accept values from any number of threads and forward them to a
/// consumer at a bounded rate.
pub trait Throttle<T>: Send + Sync {
    /// Hands a value to the throttler.
    ///
    /// # Panics
    /// Panics when called from inside the same throttler's callback.
    fn push(&self, value: T);

    /// Hands a value to the throttler, returning it on refusal.
    ///
    /// # Returns
    /// * `Ok(())` if the value was dispatched or buffered
    /// * `Err(PushError)` with [`ThrottleError::Reentrant`](crate::ThrottleError::Reentrant)
    ///   or [`ThrottleError::Closed`](crate::ThrottleError::Closed)
    fn try_push(&self, value: T) -> PushResult<T>;

    /// Returns `true` while a window is running.
    fn is_throttling(&self) -> bool;

    /// Returns the number of values waiting for the next flush.
    fn pending(&self) -> usize;
}

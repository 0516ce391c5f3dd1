use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, error, trace, warn};

use crate::dispatch_guard::{self, DispatchGuard};
use crate::throttle::Throttle;
use crate::{PushError, PushResult, ThrottleError};

/// Window used by [`BatchThrottlerConfig::default`].
pub const DEFAULT_WINDOW: Duration = Duration::from_millis(100);

/// Name given to countdown threads unless configured otherwise.
pub const DEFAULT_THREAD_NAME: &str = "rate-guard-throttle";

type Callback<T> = Box<dyn FnMut(&[T]) + Send>;

/// Batching throttler with a leading-edge dispatch and a trailing drain.
///
/// Values pushed from any number of threads are handed to a single callback.
/// The callback fires at most once per `window`:
///
/// - The first value pushed while idle is dispatched at once, on the pushing
///   thread, as a one-element batch. A window then starts.
/// - Values pushed while a window is running are buffered.
/// - When the window ends, the buffered values are dispatched together in push
///   order and a new window starts. If nothing was buffered the throttler goes
///   back to idle.
///
/// # Callback contract
///
/// The callback runs while the throttler's internal lock is held. This keeps
/// batches strictly ordered and never lets two invocations overlap, but a slow
/// callback delays every concurrent [`push`](Self::push). Calling any method of
/// the same throttler from inside its callback is refused:
/// [`try_push`](Self::try_push) returns [`ThrottleError::Reentrant`] and the
/// other methods panic. Pushing into a different throttler is fine.
///
/// # Countdown
///
/// Each throttling period is served by one background thread that waits out the
/// window, flushes, and re-arms until it finds the buffer empty. Dropping the
/// throttler does not stop a running countdown; buffered values are still
/// delivered. Use [`shutdown`](Self::shutdown) to stop early.
///
/// # Example
///
/// ```rust
/// use std::sync::mpsc;
/// use std::time::Duration;
/// use rate_guard_throttle::BatchThrottler;
///
/// let (tx, rx) = mpsc::channel();
/// let throttler = BatchThrottler::new(Duration::from_millis(50), move |batch: &[u32]| {
///     tx.send(batch.to_vec()).unwrap();
/// });
///
/// throttler.push(1); // dispatched immediately
/// throttler.push(2); // buffered
/// throttler.push(3); // buffered
///
/// assert_eq!(rx.recv().unwrap(), vec![1]);
/// assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), vec![2, 3]);
/// ```
pub struct BatchThrottler<T> {
    shared: Arc<Shared<T>>,
}

/// State shared between the handle and its countdown thread.
struct Shared<T> {
    /// Minimum time between two callback invocations
    window: Duration,
    /// Name of spawned countdown threads
    thread_name: String,
    /// Internal state protected by mutex for thread safety
    state: Mutex<BatchThrottlerState<T>>,
    /// Wakes the countdown early on shutdown
    wakeup: Condvar,
}

/// Internal state of the batch throttler
struct BatchThrottlerState<T> {
    /// Values pushed during the current window, in lock order
    buffer: Vec<T>,
    /// Consumer of batches
    callback: Callback<T>,
    /// Whether a countdown is running (throttling) or not (idle)
    countdown_active: bool,
    /// Set once by shutdown
    closed: bool,
}

/// What [`BatchThrottler::shutdown`] does with values still buffered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownMode {
    /// Dispatch pending values in one final batch.
    Flush,
    /// Drop pending values without dispatching them.
    Discard,
}

impl<T> Shared<T> {
    fn id(&self) -> usize {
        self as *const Self as usize
    }

    fn lock(&self) -> MutexGuard<'_, BatchThrottlerState<T>> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Locks the state for a caller that is not this throttler's own callback.
    fn lock_from(&self, operation: &str) -> MutexGuard<'_, BatchThrottlerState<T>> {
        if dispatch_guard::is_dispatching(self.id()) {
            panic!(
                "BatchThrottler::{} called from inside the same throttler's callback; \
                 this would deadlock",
                operation
            );
        }
        self.lock()
    }
}

impl<T> BatchThrottlerState<T> {
    /// Hands the buffered values to the callback and empties the buffer.
    ///
    /// The batch is taken out before the call so a panicking callback leaves
    /// the buffer empty.
    fn dispatch(&mut self, id: usize) {
        let mut batch = std::mem::take(&mut self.buffer);
        {
            let _guard = DispatchGuard::enter(id);
            (self.callback)(&batch);
        }
        batch.clear();
        self.buffer = batch;
    }
}

impl<T: Send + 'static> BatchThrottler<T> {
    /// Creates a new throttler with the given window and callback.
    ///
    /// # Parameters
    ///
    /// * `window` - Minimum time between two callback invocations. A zero
    ///   window dispatches every value immediately as its own batch. A window
    ///   too long to express as an [`Instant`] never ends; values pushed after
    ///   the first are only delivered by [`shutdown`](Self::shutdown).
    /// * `callback` - Receives each non-empty batch in push order.
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use rate_guard_throttle::BatchThrottler;
    ///
    /// let throttler = BatchThrottler::new(Duration::from_secs(1), |batch: &[String]| {
    ///     println!("processing {:?}", batch);
    /// });
    /// throttler.push("hello".to_string());
    /// ```
    pub fn new<F>(window: Duration, callback: F) -> Self
    where
        F: FnMut(&[T]) + Send + 'static,
    {
        Self::with_config(BatchThrottlerConfig::new(window), callback)
    }

    /// Creates a new throttler from a configuration.
    pub fn with_config<F>(config: BatchThrottlerConfig, callback: F) -> Self
    where
        F: FnMut(&[T]) + Send + 'static,
    {
        BatchThrottler {
            shared: Arc::new(Shared {
                window: config.window,
                // std refuses thread names containing NUL
                thread_name: config.thread_name.replace('\0', ""),
                state: Mutex::new(BatchThrottlerState {
                    buffer: Vec::new(),
                    callback: Box::new(callback),
                    countdown_active: false,
                    closed: false,
                }),
                wakeup: Condvar::new(),
            }),
        }
    }

    /// Hands a value to the throttler.
    ///
    /// While idle the value is dispatched before this call returns, on the
    /// calling thread. While throttling it is buffered for the next flush.
    /// Values pushed after [`shutdown`](Self::shutdown) are dropped with a
    /// warning.
    ///
    /// # Panics
    ///
    /// Panics when called from inside this throttler's callback, and
    /// propagates a panic raised by the callback itself.
    pub fn push(&self, value: T) {
        match self.try_push(value) {
            Ok(()) => {}
            Err(err) => match err.kind() {
                ThrottleError::Reentrant => panic!(
                    "BatchThrottler::push called from inside the same throttler's callback; \
                     this would deadlock"
                ),
                ThrottleError::Closed => {
                    warn!("value pushed after shutdown was dropped");
                }
            },
        }
    }

    /// Hands a value to the throttler without panicking on misuse.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The value was dispatched or buffered
    /// * `Err` with [`ThrottleError::Reentrant`] - Called from inside this throttler's callback
    /// * `Err` with [`ThrottleError::Closed`] - The throttler has been shut down
    ///
    /// The rejected value can be recovered with [`PushError::into_inner`].
    ///
    /// # Example
    ///
    /// ```rust
    /// use std::time::Duration;
    /// use rate_guard_throttle::{BatchThrottler, ShutdownMode, ThrottleError};
    ///
    /// let throttler = BatchThrottler::new(Duration::from_millis(10), |_: &[u8]| {});
    /// assert!(throttler.try_push(1).is_ok());
    ///
    /// throttler.shutdown(ShutdownMode::Discard).unwrap();
    /// let err = throttler.try_push(2).unwrap_err();
    /// assert_eq!(err.kind(), ThrottleError::Closed);
    /// assert_eq!(err.into_inner(), 2);
    /// ```
    pub fn try_push(&self, value: T) -> PushResult<T> {
        let id = self.shared.id();
        if dispatch_guard::is_dispatching(id) {
            return Err(PushError::new(ThrottleError::Reentrant, value));
        }

        let mut state = self.shared.lock();
        if state.closed {
            return Err(PushError::new(ThrottleError::Closed, value));
        }

        state.buffer.push(value);
        if state.countdown_active {
            trace!(pending = state.buffer.len(), "value buffered");
            return Ok(());
        }

        // Idle: leading-edge dispatch on the caller's thread.
        state.dispatch(id);
        if !self.shared.window.is_zero() {
            self.start_countdown(&mut state);
        }
        Ok(())
    }

    /// Returns `true` while a window is running.
    ///
    /// # Panics
    ///
    /// Panics when called from inside this throttler's callback.
    pub fn is_throttling(&self) -> bool {
        self.shared.lock_from("is_throttling").countdown_active
    }

    /// Returns the number of values buffered for the next flush.
    ///
    /// # Panics
    ///
    /// Panics when called from inside this throttler's callback.
    pub fn pending(&self) -> usize {
        self.shared.lock_from("pending").buffer.len()
    }

    /// Returns the configured window.
    #[inline]
    pub fn window(&self) -> Duration {
        self.shared.window
    }

    /// Stops the throttler.
    ///
    /// Any running countdown is woken and retires without dispatching. Values
    /// still buffered are either dispatched in one final batch on the calling
    /// thread or dropped, depending on `mode`. Further pushes are refused.
    ///
    /// # Returns
    ///
    /// * `Ok(n)` - `n` buffered values were flushed or discarded
    /// * `Err(ThrottleError::Closed)` - The throttler was already shut down
    /// * `Err(ThrottleError::Reentrant)` - Called from inside this throttler's callback
    pub fn shutdown(&self, mode: ShutdownMode) -> Result<usize, ThrottleError> {
        let id = self.shared.id();
        if dispatch_guard::is_dispatching(id) {
            return Err(ThrottleError::Reentrant);
        }

        let mut state = self.shared.lock();
        if state.closed {
            return Err(ThrottleError::Closed);
        }
        state.closed = true;

        let pending = state.buffer.len();
        if pending > 0 {
            match mode {
                ShutdownMode::Flush => state.dispatch(id),
                ShutdownMode::Discard => state.buffer.clear(),
            }
        }
        state.countdown_active = false;
        self.shared.wakeup.notify_all();
        debug!(pending, ?mode, "throttler shut down");
        Ok(pending)
    }

    /// Moves the throttler from idle to throttling by spawning its countdown.
    fn start_countdown(&self, state: &mut BatchThrottlerState<T>) {
        let shared = Arc::clone(&self.shared);
        let deadline = window_end(self.shared.window);
        let spawned = thread::Builder::new()
            .name(self.shared.thread_name.clone())
            .spawn(move || run_countdown(shared, deadline));

        match spawned {
            Ok(_) => {
                state.countdown_active = true;
                debug!(
                    window_ms = self.shared.window.as_millis() as u64,
                    "throttling started"
                );
            }
            Err(err) => {
                // Stay idle: the next push dispatches immediately again.
                error!(error = %err, "failed to spawn throttler countdown thread");
            }
        }
    }
}

/// End of a window starting now. `None` when the window reaches past the
/// representable future, in which case it never ends.
fn window_end(window: Duration) -> Option<Instant> {
    Instant::now().checked_add(window)
}

/// Body of the countdown thread: wait, flush or go idle, re-arm.
fn run_countdown<T>(shared: Arc<Shared<T>>, mut deadline: Option<Instant>) {
    let id = shared.id();
    let mut state = shared.lock();
    loop {
        // Lock is released while waiting.
        while !state.closed {
            state = match deadline {
                Some(at) => {
                    let now = Instant::now();
                    if now >= at {
                        break;
                    }
                    shared
                        .wakeup
                        .wait_timeout(state, at - now)
                        .map(|(guard, _)| guard)
                        .unwrap_or_else(|poisoned| poisoned.into_inner().0)
                }
                // Only shutdown ends an unbounded window.
                None => shared
                    .wakeup
                    .wait(state)
                    .unwrap_or_else(PoisonError::into_inner),
            };
        }

        if state.closed {
            trace!("countdown retired by shutdown");
            return;
        }

        if state.buffer.is_empty() {
            state.countdown_active = false;
            debug!("throttling ended, throttler idle");
            return;
        }

        let batch_len = state.buffer.len();
        trace!(batch_len, "flushing buffered values");
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| state.dispatch(id)));
        if outcome.is_err() {
            error!(batch_len, "throttler callback panicked; batch dropped");
        }
        deadline = window_end(shared.window);
    }
}

impl<T: Send + 'static> Throttle<T> for BatchThrottler<T> {
    #[inline(always)]
    fn push(&self, value: T) {
        self.push(value)
    }

    #[inline(always)]
    fn try_push(&self, value: T) -> PushResult<T> {
        self.try_push(value)
    }

    #[inline(always)]
    fn is_throttling(&self) -> bool {
        self.is_throttling()
    }

    #[inline(always)]
    fn pending(&self) -> usize {
        self.pending()
    }
}

impl<T> std::fmt::Debug for BatchThrottler<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BatchThrottler")
            .field("window", &self.shared.window)
            .field("thread_name", &self.shared.thread_name)
            .finish_non_exhaustive()
    }
}

/// Configuration structure for creating a `BatchThrottler`.
#[derive(Debug, Clone)]
pub struct BatchThrottlerConfig {
    /// Minimum time between two callback invocations.
    pub window: Duration,
    /// Name of the countdown threads.
    pub thread_name: String,
}

impl BatchThrottlerConfig {
    /// Creates a new configuration instance with the default thread name.
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            thread_name: DEFAULT_THREAD_NAME.to_string(),
        }
    }

    /// Sets the name given to countdown threads.
    ///
    /// NUL bytes are removed from the name when the throttler is built.
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = name.into();
        self
    }
}

impl Default for BatchThrottlerConfig {
    fn default() -> Self {
        Self::new(DEFAULT_WINDOW)
    }
}

impl<T, F> From<(BatchThrottlerConfig, F)> for BatchThrottler<T>
where
    T: Send + 'static,
    F: FnMut(&[T]) + Send + 'static,
{
    /// Builds a throttler from a configuration and its callback.
    ///
    /// # Example
    ///
    /// ```
    /// use std::time::Duration;
    /// use rate_guard_throttle::{BatchThrottler, BatchThrottlerConfig};
    ///
    /// let config = BatchThrottlerConfig::new(Duration::from_millis(250))
    ///     .with_thread_name("ui-refresh");
    ///
    /// let throttler: BatchThrottler<u64> = (config, |_: &[u64]| {}).into();
    /// assert_eq!(throttler.window(), Duration::from_millis(250));
    /// ```
    #[inline(always)]
    fn from((config, callback): (BatchThrottlerConfig, F)) -> Self {
        BatchThrottler::with_config(config, callback)
    }
}

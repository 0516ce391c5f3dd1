//! A batching throttler for Rust applications.
//!
//! This library forwards values pushed from any number of threads to a single
//! consumer callback, invoking it at most once per fixed time window. Values
//! arriving while the window is running are coalesced into one batch.
//!
//! # Quick Start
//!
//! ```rust
//! use std::sync::{Arc, Mutex};
//! use std::time::Duration;
//! use rate_guard_throttle::BatchThrottler;
//!
//! let seen = Arc::new(Mutex::new(Vec::new()));
//! let sink = Arc::clone(&seen);
//!
//! // Invoke the callback at most once every 100ms
//! let throttler = BatchThrottler::new(Duration::from_millis(100), move |batch: &[u32]| {
//!     sink.lock().unwrap().push(batch.to_vec());
//! });
//!
//! // The first value of an idle period is dispatched before push returns
//! throttler.push(1);
//! assert_eq!(*seen.lock().unwrap(), vec![vec![1]]);
//!
//! // Later values wait for the window to end
//! throttler.push(2);
//! assert_eq!(throttler.pending(), 1);
//! ```
//!
//! # Dispatch Policy
//!
//! ## Leading edge
//! A value pushed while the throttler is idle is handed to the callback at once,
//! on the pushing thread, and a window starts.
//!
//! ## Trailing drain
//! Values pushed while the window runs are buffered. When it ends, they are
//! dispatched together in push order and a new window starts. A window that ends
//! with nothing buffered returns the throttler to idle.
//!
//! # Core Concepts
//!
//! ## Thread Safety
//! Every throttler keeps its state behind a single mutex. The callback runs while
//! that mutex is held, so invocations never overlap and batch order always
//! matches the order in which `push` calls took the lock.
//!
//! ## Error Handling
//! [`push`](BatchThrottler::push) cannot fail in normal use.
//! [`try_push`](BatchThrottler::try_push) returns [`PushResult`], which reports:
//! - **[`Reentrant`](ThrottleError::Reentrant)** - Called from inside the same throttler's callback
//! - **[`Closed`](ThrottleError::Closed)** - The throttler was shut down
//!
//! ## Logging
//! State transitions are reported through [`tracing`]. The library never installs
//! a subscriber.

mod dispatch_guard;
pub mod error;
pub mod throttle;
pub mod throttlers;

pub use error::{PushError, PushResult, ThrottleError};
pub use throttle::Throttle;
pub use throttlers::{BatchThrottler, BatchThrottlerConfig, ShutdownMode};

//! Throttler implementations.
//!
//! Each throttler here is a thread-safe, self-scheduling dispatcher that can be
//! shared between producer threads behind an [`Arc`](std::sync::Arc).
//!
//! - **[`BatchThrottler`]** - Dispatches the first value at once, then coalesces
//!   everything pushed during the following window into one batch

pub mod batch_throttler;
pub use batch_throttler::BatchThrottler;
pub use batch_throttler::BatchThrottlerConfig;
pub use batch_throttler::ShutdownMode;
pub use batch_throttler::{DEFAULT_THREAD_NAME, DEFAULT_WINDOW};

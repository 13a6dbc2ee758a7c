//! Bounded-concurrency bulk delivery with per-recipient retries.
//!
//! # Architecture
//!
//! - [`ConcurrencyLimiter`]: FIFO admission gate capping how many operations
//!   run at once.
//! - [`RetryPolicy`]: re-runs a failing operation with linearly growing delays.
//! - [`BulkDispatcher`]: one task per recipient, each passing through the
//!   batch's limiter and the retry policy, aggregated into a [`BulkReport`].
//!
//! # Quick Start
//!
//! ```ignore
//! let dispatcher = BulkDispatcher::new(mailer, RetryPolicy::default());
//!
//! // one limiter per batch
//! let limiter = ConcurrencyLimiter::new(5)?;
//! let report = dispatcher
//!     .dispatch(&limiter, recipients, |to| {
//!         Email::builder().to(to).subject("News").html(body.clone()).build()
//!     })
//!     .await;
//!
//! println!("sent {}, failed {}", report.sent, report.failed.len());
//! ```

mod bulk;
mod limiter;
mod retry;

pub use bulk::{BulkDispatcher, BulkReport, FailedRecipient, SendOutcome, SendTask};
pub use limiter::{ConcurrencyLimiter, LimiterError};
pub use retry::RetryPolicy;

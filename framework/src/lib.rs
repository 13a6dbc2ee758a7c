pub mod config;
pub mod dispatch;
pub mod error;
pub mod mail;
mod serve;

pub use config::EnvConfig;
pub use dispatch::{BulkDispatcher, BulkReport, ConcurrencyLimiter, RetryPolicy};
pub use mail::{Delivery, Email, MailError, Mailer, MemoryMailer, SmtpMailer};
pub use serve::{serve, shutdown_signal};

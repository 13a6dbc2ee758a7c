//! Email sending over a pooled SMTP transport.
//!
//! This module is a thin layer over [lettre](https://lettre.rs): an owned
//! [`Email`] value, a [`Mailer`] trait for anything that can deliver one, and
//! two implementations.
//!
//! - [`SmtpMailer`] keeps a pool of SMTP connections shared by every caller.
//! - [`MemoryMailer`] records messages in memory and can be told to fail, for
//!   development and tests.
//!
//! # Environment Variables
//!
//! [`MailerConfig`] reads:
//!
//! | Variable | Required | Description |
//! |----------|----------|-------------|
//! | `SMTP_HOST` | Yes | SMTP server hostname |
//! | `SMTP_PORT` | No | Port (default: 587) |
//! | `SMTP_USERNAME` | Yes | Username for authentication |
//! | `SMTP_PASSWORD` | Yes | Password for authentication |
//! | `SMTP_FROM` | Yes | Default sender, e.g. `"Admin <admin@example.com>"` |
//! | `SMTP_TLS` | No | `starttls` (default), `tls`, or `none` |
//! | `SMTP_TIMEOUT` | No | Connection timeout in seconds (default: 10) |
//! | `SMTP_POOL_SIZE` | No | Maximum pooled connections (default: 10) |

mod mailer;
mod memory;
mod message;

pub use mailer::{Delivery, Mailer, MailerConfig, SmtpMailer};
pub use memory::MemoryMailer;
pub use message::{is_valid_address, Email, EmailBody, EmailBuilder};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MailError {
    #[error("missing required config: {0}")]
    MissingConfig(String),

    #[error("invalid email address: {0}")]
    InvalidAddress(String),

    #[error("failed to build message: {0}")]
    Build(String),

    #[error("SMTP error: {0}")]
    Smtp(String),
}

//! Mailer trait and pooled SMTP implementation.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use lettre::message::{Mailbox, MultiPart, SinglePart};
use lettre::transport::smtp::authentication::Credentials;
use lettre::transport::smtp::PoolConfig;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Email, EmailBody, MailError};
use crate::config::EnvConfig;

/// Async email sending trait.
///
/// Implementations must be cheap to share: one instance serves every
/// concurrent request.
#[async_trait]
pub trait Mailer: Send + Sync + 'static {
    /// Send an email, returning the identifier stamped on the message.
    async fn send(&self, email: &Email) -> Result<Delivery, MailError>;
}

#[async_trait]
impl<M: Mailer + ?Sized> Mailer for Arc<M> {
    async fn send(&self, email: &Email) -> Result<Delivery, MailError> {
        (**self).send(email).await
    }
}

/// A message accepted by the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Delivery {
    /// Value of the `Message-ID` header, angle brackets included.
    pub message_id: String,
}

/// Configuration for [`SmtpMailer`].
#[derive(Debug, Clone, Deserialize)]
pub struct MailerConfig {
    /// SMTP server hostname.
    #[serde(rename = "smtp_host")]
    pub host: String,

    /// SMTP server port (default: 587).
    #[serde(rename = "smtp_port", default = "default_port")]
    pub port: u16,

    #[serde(rename = "smtp_username")]
    pub username: String,

    #[serde(rename = "smtp_password")]
    pub password: String,

    /// Default sender mailbox.
    #[serde(rename = "smtp_from")]
    pub from: String,

    /// TLS mode: "starttls" (default), "tls", or "none".
    #[serde(rename = "smtp_tls", default = "default_tls")]
    pub tls: String,

    /// Connection timeout in seconds (default: 10).
    #[serde(rename = "smtp_timeout", default = "default_timeout")]
    pub timeout: u64,

    /// Upper bound on pooled connections (default: 10).
    #[serde(rename = "smtp_pool_size", default = "default_pool_size")]
    pub pool_size: u32,
}

fn default_port() -> u16 {
    587
}

fn default_tls() -> String {
    "starttls".to_string()
}

fn default_timeout() -> u64 {
    10
}

fn default_pool_size() -> u32 {
    10
}

impl MailerConfig {
    /// Load from `SMTP_*` environment variables and check the credentials.
    pub fn from_env() -> Result<Self, MailError> {
        let config = <Self as EnvConfig>::from_env()
            .map_err(|e| MailError::MissingConfig(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly authenticate.
    pub fn validate(&self) -> Result<(), MailError> {
        let required = [
            ("smtp_host", &self.host),
            ("smtp_username", &self.username),
            ("smtp_password", &self.password),
            ("smtp_from", &self.from),
        ];
        for (name, value) in required {
            if value.trim().is_empty() {
                return Err(MailError::MissingConfig(name.to_string()));
            }
        }
        if self.pool_size == 0 {
            return Err(MailError::MissingConfig(
                "smtp_pool_size must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// SMTP mailer backed by a pooled lettre transport.
///
/// Cloning is cheap; clones share the same connection pool.
#[derive(Clone)]
pub struct SmtpMailer {
    transport: Arc<AsyncSmtpTransport<Tokio1Executor>>,
    from: Mailbox,
    pool_size: u32,
}

impl SmtpMailer {
    /// Create a mailer from `SMTP_*` environment variables.
    pub fn from_env() -> Result<Self, MailError> {
        Self::from_config(MailerConfig::from_env()?)
    }

    /// Create a mailer from explicit configuration.
    ///
    /// No connection is opened here; see [`SmtpMailer::verify`].
    pub fn from_config(config: MailerConfig) -> Result<Self, MailError> {
        config.validate()?;

        let from: Mailbox = config
            .from
            .parse()
            .map_err(|_| MailError::InvalidAddress(config.from.clone()))?;

        let builder = match config.tls.as_str() {
            "none" => AsyncSmtpTransport::<Tokio1Executor>::builder_dangerous(&config.host),
            "tls" => AsyncSmtpTransport::<Tokio1Executor>::relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
            _ => AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)
                .map_err(|e| MailError::Smtp(e.to_string()))?,
        };

        let transport = builder
            .port(config.port)
            .timeout(Some(Duration::from_secs(config.timeout)))
            .credentials(Credentials::new(config.username, config.password))
            .pool_config(PoolConfig::new().max_size(config.pool_size))
            .build();

        Ok(Self {
            transport: Arc::new(transport),
            from,
            pool_size: config.pool_size,
        })
    }

    /// Maximum number of pooled connections.
    pub fn pool_size(&self) -> u32 {
        self.pool_size
    }

    /// Open a connection and authenticate, failing if the server is unusable.
    pub async fn verify(&self) -> Result<(), MailError> {
        match self.transport.test_connection().await {
            Ok(true) => Ok(()),
            Ok(false) => Err(MailError::Smtp("server refused the connection".into())),
            Err(e) => Err(MailError::Smtp(e.to_string())),
        }
    }

    /// Build a lettre Message from our Email type, stamping a fresh Message-ID.
    fn build_message(&self, email: &Email) -> Result<(Message, String), MailError> {
        let message_id = format!("<{}@{}>", Uuid::new_v4(), self.from.email.domain());
        let mut builder = Message::builder()
            .from(self.from.clone())
            .message_id(Some(message_id.clone()));

        for to in &email.to {
            let mailbox: Mailbox = to
                .parse()
                .map_err(|_| MailError::InvalidAddress(to.clone()))?;
            builder = builder.to(mailbox);
        }

        if let Some(reply_to) = &email.reply_to {
            let mailbox: Mailbox = reply_to
                .parse()
                .map_err(|_| MailError::InvalidAddress(reply_to.clone()))?;
            builder = builder.reply_to(mailbox);
        }

        builder = builder.subject(&email.subject);

        let message = match &email.body {
            EmailBody::Text(text) => builder.body(text.clone()),
            EmailBody::Html(html) => builder.singlepart(SinglePart::html(html.clone())),
            EmailBody::Multipart { text, html } => builder.multipart(
                MultiPart::alternative_plain_html(text.clone(), html.clone()),
            ),
        }
        .map_err(|e| MailError::Build(e.to_string()))?;

        Ok((message, message_id))
    }
}

#[async_trait]
impl Mailer for SmtpMailer {
    async fn send(&self, email: &Email) -> Result<Delivery, MailError> {
        let (message, message_id) = self.build_message(email)?;

        self.transport
            .send(message)
            .await
            .map_err(|e| MailError::Smtp(e.to_string()))?;

        Ok(Delivery { message_id })
    }
}

use std::num::NonZeroU32;
use std::time::Duration;

use sendgate::dispatch::RetryPolicy;
use sendgate::mail::is_valid_address;
use serde::Deserialize;

use crate::routes::RouteLimits;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error(transparent)]
    Env(#[from] sendgate::config::ConfigError),

    #[error("ADMIN_EMAIL is not a valid address: {0:?}")]
    AdminEmail(String),

    #[error("BULK_CONCURRENCY must be at least 1")]
    Concurrency,
}

/// Server settings read from the environment.
#[derive(Clone, Debug, Deserialize)]
pub struct Config {
    #[serde(default = "default_port")]
    pub port: u16,

    /// Recipient of contact-form messages.
    pub admin_email: String,

    /// Sends in flight per bulk request. Capped at the SMTP pool size.
    #[serde(default = "default_bulk_concurrency")]
    pub bulk_concurrency: usize,

    #[serde(default = "default_send_max_retries")]
    pub send_max_retries: u32,

    #[serde(default = "default_send_retry_delay_ms")]
    pub send_retry_delay_ms: u64,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Requests allowed per client IP per minute.
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: NonZeroU32,
}

fn default_port() -> u16 {
    5000
}

fn default_bulk_concurrency() -> usize {
    5
}

fn default_send_max_retries() -> u32 {
    2
}

fn default_send_retry_delay_ms() -> u64 {
    500
}

fn default_request_timeout_secs() -> u64 {
    60
}

fn default_rate_limit_per_minute() -> NonZeroU32 {
    NonZeroU32::new(60).unwrap_or(NonZeroU32::MIN)
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let config: Config = sendgate::EnvConfig::from_env()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_address(self.admin_email.trim()) {
            return Err(ConfigError::AdminEmail(self.admin_email.clone()));
        }
        if self.bulk_concurrency == 0 {
            return Err(ConfigError::Concurrency);
        }
        Ok(())
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            self.send_max_retries,
            Duration::from_millis(self.send_retry_delay_ms),
        )
    }

    pub fn route_limits(&self) -> RouteLimits {
        RouteLimits {
            request_timeout: Duration::from_secs(self.request_timeout_secs),
            requests_per_minute: self.rate_limit_per_minute,
        }
    }

    /// Bulk concurrency limited so a batch never asks for more connections
    /// than the transport pool holds.
    pub fn bulk_ceiling(&self, pool_size: u32) -> usize {
        let pool_size = usize::try_from(pool_size).unwrap_or(usize::MAX);
        if self.bulk_concurrency > pool_size {
            tracing::warn!(
                requested = self.bulk_concurrency,
                pool_size,
                "BULK_CONCURRENCY exceeds SMTP_POOL_SIZE, using the pool size"
            );
            pool_size
        } else {
            self.bulk_concurrency
        }
    }
}

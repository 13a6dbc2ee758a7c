use std::net::Ipv4Addr;
use std::sync::Arc;

use anyhow::Context as _;
use sendgate::mail::{MailerConfig, SmtpMailer};
use sendgate_server::{app, AppState, Config};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let config = Config::from_env().context("invalid server configuration")?;
    let mailer_config = MailerConfig::from_env().context("SMTP credentials are required")?;

    let mailer = SmtpMailer::from_config(mailer_config).context("could not build SMTP transport")?;
    mailer
        .verify()
        .await
        .context("SMTP server did not accept the configured credentials")?;
    tracing::info!(pool_size = mailer.pool_size(), "SMTP transport ready");

    let bulk_ceiling = config.bulk_ceiling(mailer.pool_size());
    let state = AppState::new(
        Arc::new(mailer),
        config.admin_email.trim(),
        bulk_ceiling,
        config.retry_policy(),
    );

    let routes = app(state, config.route_limits());
    sendgate::serve((Ipv4Addr::UNSPECIFIED, config.port), routes)
        .await
        .context("error running HTTP server")?;
    Ok(())
}

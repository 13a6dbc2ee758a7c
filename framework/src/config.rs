//! Environment-backed configuration.
//!
//! Any `Deserialize` type can be loaded from the process environment. Keys are
//! matched case-insensitively, so `SMTP_HOST` populates a field named
//! `smtp_host`. A `.env` file in the working directory is loaded first when
//! present.

use serde::de::DeserializeOwned;

pub use config::ConfigError;

pub trait EnvConfig: Sized {
    fn from_env() -> Result<Self, ConfigError>;
    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError>;
}

impl<D> EnvConfig for D
where
    D: DeserializeOwned,
{
    fn from_env() -> Result<Self, ConfigError> {
        load(config::Environment::default())
    }

    fn from_env_with_prefix(prefix: &str) -> Result<Self, ConfigError> {
        load(config::Environment::with_prefix(prefix))
    }
}

fn load<D: DeserializeOwned>(source: config::Environment) -> Result<D, ConfigError> {
    dotenvy::dotenv().ok();

    config::Config::builder()
        .add_source(source)
        .build()?
        .try_deserialize()
}

use anyhow::Context;
use serde::{Deserialize, de::DeserializeOwned};

use crate::{
    auth::Credentials,
    connector::{DEFAULT_BANK_IDENTIFIERS, RunOptions},
};

const ENV_PREFIX: &str = "AMELI_";

fn default_months_back() -> u32 {
    6
}

/// The `AMELI_*` env vars a run is configured from.
#[derive(Debug, Deserialize)]
pub struct ConnectorConfig {
    pub login: String,
    pub password: String,
    /// Comma-separated labels the bank uses for this insurer's transfers.
    pub bank_identifier: Option<String>,
    /// A one-time code, for runs that cannot prompt.
    pub otp: Option<String>,
    #[serde(default = "default_months_back")]
    pub months_back: u32,
}

impl ConnectorConfig {
    pub fn credentials(&self) -> Credentials {
        Credentials {
            login: self.login.clone(),
            password: self.password.clone(),
        }
    }

    pub fn bank_identifiers(&self) -> Vec<String> {
        let configured: Vec<String> = self
            .bank_identifier
            .iter()
            .flat_map(|value| value.split(','))
            .map(|identifier| identifier.trim().to_string())
            .filter(|identifier| !identifier.is_empty())
            .collect();
        if configured.is_empty() {
            DEFAULT_BANK_IDENTIFIERS.iter().map(|s| s.to_string()).collect()
        } else {
            configured
        }
    }

    pub fn run_options(&self) -> RunOptions {
        RunOptions {
            months_back: self.months_back,
            bank_identifiers: self.bank_identifiers(),
        }
    }
}

// Extension trait.
pub trait LoadFromEnv: DeserializeOwned {
    fn load_from_env() -> anyhow::Result<Self> {
        // Don't throw an error if .env file doesn't exist.
        let _ = dotenv::dotenv();
        let config = envy::prefixed(ENV_PREFIX)
            .from_env::<Self>()
            .context("failed to load env variables into config struct")?;
        Ok(config)
    }
}

impl<T: DeserializeOwned> LoadFromEnv for T {}

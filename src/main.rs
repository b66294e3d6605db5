use ameli_scraper::{
    ConnectorError, ConnectorResult, Connector, OtpProvider, RequestClient,
    config::{ConnectorConfig, LoadFromEnv},
};
use anyhow::Context;
use async_trait::async_trait;
use dotenv::dotenv;
use log::{LevelFilter, error, info, warn};
use tokio::io::{AsyncBufReadExt, BufReader};

/// Uses the code from the config when there is one, otherwise asks on stdin.
struct PromptOtp {
    preset: Option<String>,
}

#[async_trait]
impl OtpProvider for PromptOtp {
    async fn otp_code(&self) -> ConnectorResult<String> {
        if let Some(code) = &self.preset {
            return Ok(code.clone());
        }
        eprintln!("Enter the code sent by e-mail:");
        let mut line = String::new();
        let read = BufReader::new(tokio::io::stdin()).read_line(&mut line).await;
        match read {
            Ok(_) => Ok(line.trim().to_string()),
            Err(err) => Err(ConnectorError::LoginFailed(format!("could not read the code: {err}"))),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    env_logger::Builder::new()
        .filter_level(LevelFilter::Info)
        .parse_default_env()
        .init();

    let config = ConnectorConfig::load_from_env()?;
    let otp = PromptOtp {
        preset: config.otp.clone(),
    };

    let mut connector = Connector::new(RequestClient::new()?);
    let output = match connector
        .run(&config.credentials(), Some(&otp as &dyn OtpProvider), &config.run_options())
        .await
    {
        Ok(output) => output,
        Err(err) => {
            error!("{} ({})", err, err.code());
            return Err(err).context("run aborted");
        }
    };

    if let Err(err) = connector.logout().await {
        warn!("Logout failed: {err}");
    }

    info!(
        "Collected {} bills and {} files",
        output.bills.len(),
        output.files.len()
    );
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

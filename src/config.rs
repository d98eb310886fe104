//! Runtime configuration from environment variables (`.env` supported via
//! dotenv in the binary).

use std::env;

use anyhow::{bail, Context};

const DEFAULT_LOOKBACK_SECS: u64 = 24 * 60 * 60;

#[derive(Clone)]
pub struct Config {
    pub login: String,
    pub password: String,
    /// Window bounding which transactions are requested per run, in seconds.
    pub lookback_secs: u64,
    pub webdriver_url: String,
    /// Full collector endpoints, base address already joined in.
    pub send_account_url: String,
    pub send_payment_url: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let login = env::var("LOGIN").context("LOGIN is not set")?;
        let password = env::var("PASSWORD").context("PASSWORD is not set")?;
        let host = env::var("SERVER_URL").context("SERVER_URL is not set")?;
        let scheme = env::var("SERVER_SCHEME").unwrap_or_else(|_| "http".to_string());
        let port = env::var("SERVER_PORT").unwrap_or_else(|_| "80".to_string());
        let account_path = env::var("SEND_ACCOUNT_URL").context("SEND_ACCOUNT_URL is not set")?;
        let payment_path = env::var("SEND_PAYMENT_URL").context("SEND_PAYMENT_URL is not set")?;

        let base = validate_url(&format!("{scheme}://{host}:{port}"))?;

        Ok(Self {
            login,
            password,
            lookback_secs: lookback_from(env_u64("HOURS"), env_u64("DAYS")),
            webdriver_url: env::var("WEBDRIVER_URL")
                .unwrap_or_else(|_| "http://localhost:4444".to_string()),
            send_account_url: format!("{base}{account_path}"),
            send_payment_url: format!("{base}{payment_path}"),
        })
    }
}

fn env_u64(key: &str) -> u64 {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(0)
}

/// Converts the lookback window to seconds, defaulting to one day when both
/// knobs are zero or unset.
pub fn lookback_from(hours: u64, days: u64) -> u64 {
    let seconds = hours * 3600 + days * 86400;
    if seconds == 0 {
        DEFAULT_LOOKBACK_SECS
    } else {
        seconds
    }
}

/// Requires a scheme and a non-empty host.
fn validate_url(url: &str) -> anyhow::Result<String> {
    let Some((scheme, rest)) = url.split_once("://") else {
        bail!("bad url {url:?}: missing scheme");
    };
    if scheme.is_empty() || rest.is_empty() || rest.starts_with(':') || rest.starts_with('/') {
        bail!("bad url {url:?}: missing host");
    }
    Ok(url.to_string())
}

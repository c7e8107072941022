use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};

/// Placeholder secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me",
    "change-me-to-a-random-string",
    "dev-secret-change-me",
    "secret",
];

/// Startup configuration. Built once and handed to the services that need it.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub database_path: PathBuf,
    /// Single allowed origin for credentialed CORS; permissive when unset.
    pub cors_origin: Option<String>,
    pub tokens: TokenConfig,
    pub media: MediaConfig,
}

#[derive(Debug, Clone)]
pub struct TokenConfig {
    pub access_secret: String,
    pub access_ttl: Duration,
    pub refresh_secret: String,
    pub refresh_ttl: Duration,
}

#[derive(Debug, Clone)]
pub struct MediaConfig {
    /// Where multipart uploads are staged before they reach the media store.
    pub temp_dir: PathBuf,
    pub storage_dir: PathBuf,
    pub public_url: String,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port: u16 = var("PORT", "8000")
            .parse()
            .context("PORT must be a port number")?;

        let tokens = TokenConfig {
            access_secret: secret(&lookup, "ACCESS_TOKEN_SECRET")?,
            access_ttl: ttl(&var("ACCESS_TOKEN_EXPIRY", "1d"), "ACCESS_TOKEN_EXPIRY")?,
            refresh_secret: secret(&lookup, "REFRESH_TOKEN_SECRET")?,
            refresh_ttl: ttl(&var("REFRESH_TOKEN_EXPIRY", "10d"), "REFRESH_TOKEN_EXPIRY")?,
        };
        if tokens.access_secret == tokens.refresh_secret {
            bail!("ACCESS_TOKEN_SECRET and REFRESH_TOKEN_SECRET must differ");
        }

        let media = MediaConfig {
            temp_dir: var("MEDIA_TEMP_DIR", "./public/temp").into(),
            storage_dir: var("MEDIA_STORAGE_DIR", "./media").into(),
            public_url: var("MEDIA_PUBLIC_URL", &format!("http://localhost:{port}/media"))
                .trim_end_matches('/')
                .to_string(),
        };

        Ok(Self {
            host: var("HOST", "0.0.0.0"),
            port,
            database_path: var("DATABASE_PATH", "vidtube.db").into(),
            cors_origin: lookup("CORS_ORIGIN").filter(|o| !o.trim().is_empty() && o != "*"),
            tokens,
            media,
        })
    }
}

fn secret<F>(lookup: &F, key: &str) -> Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    let value = lookup(key).unwrap_or_default();
    if value.is_empty() || PLACEHOLDER_SECRETS.contains(&value.as_str()) {
        bail!("{key} is unset or still a placeholder");
    }
    Ok(value)
}

/// Longest accepted token lifetime.
const MAX_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

fn ttl(raw: &str, key: &str) -> Result<Duration> {
    let ttl = humantime::parse_duration(raw.trim())
        .with_context(|| format!("{key} must be a duration such as 15m, 1d or 10d"))?;
    if ttl.is_zero() {
        bail!("{key} must be greater than zero");
    }
    if ttl > MAX_TTL {
        bail!("{key} must be at most 365d");
    }
    Ok(ttl)
}

use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, bail};

/// Placeholder signing secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &["change-me-to-a-random-string", "dev-secret-change-me"];

/// Process configuration, read once at startup.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub picture_dir: PathBuf,
    pub addr: SocketAddr,
    pub token_ttl_days: i64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let jwt_secret = get("GELBFELD_JWT_SECRET").unwrap_or_default();
        if jwt_secret.is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("GELBFELD_JWT_SECRET is unset or still a placeholder");
        }

        let host = get("GELBFELD_HOST").unwrap_or_else(|| "0.0.0.0".into());
        let port: u16 = get("GELBFELD_PORT")
            .unwrap_or_else(|| "3000".into())
            .parse()
            .context("GELBFELD_PORT must be a port number")?;
        let addr: SocketAddr = format!("{}:{}", host, port)
            .parse()
            .context("GELBFELD_HOST must be an IP address")?;

        let token_ttl_days: i64 = get("GELBFELD_TOKEN_TTL_DAYS")
            .map(|v| v.parse::<i64>())
            .transpose()
            .context("GELBFELD_TOKEN_TTL_DAYS must be a whole number of days")?
            .unwrap_or(30);
        if token_ttl_days <= 0 {
            bail!("GELBFELD_TOKEN_TTL_DAYS must be positive");
        }

        Ok(Self {
            jwt_secret,
            db_path: get("GELBFELD_DB_PATH").unwrap_or_else(|| "gelbfeld.db".into()).into(),
            picture_dir: get("GELBFELD_PICTURE_DIR").unwrap_or_else(|| "./pictures".into()).into(),
            addr,
            token_ttl_days,
        })
    }
}

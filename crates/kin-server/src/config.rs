use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, bail};

/// Placeholder JWT secrets that MUST NOT be used.
const PLACEHOLDER_SECRETS: &[&str] = &[
    "change-me-to-a-random-string",
    "dev-secret-change-me",
];

/// Server settings, read from `KIN_*` environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub jwt_secret: String,
    pub db_path: PathBuf,
    pub host: String,
    pub port: u16,
    pub cache_ttl: Duration,
    /// `None` means permissive CORS.
    pub cors_origins: Option<Vec<String>>,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let jwt_secret = get("KIN_JWT_SECRET").unwrap_or_default();
        if jwt_secret.trim().is_empty() || PLACEHOLDER_SECRETS.contains(&jwt_secret.as_str()) {
            bail!("KIN_JWT_SECRET is unset or still a placeholder; set it in your .env file");
        }

        let port: u16 = match get("KIN_PORT") {
            Some(raw) => raw.parse().with_context(|| format!("invalid KIN_PORT '{}'", raw))?,
            None => 5000,
        };
        let cache_ttl_secs: u64 = match get("KIN_CACHE_TTL_SECS") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid KIN_CACHE_TTL_SECS '{}'", raw))?,
            None => 60,
        };
        let cors_origins = get("KIN_CORS_ORIGINS")
            .map(|raw| {
                raw.split(',')
                    .map(|o| o.trim().to_string())
                    .filter(|o| !o.is_empty())
                    .collect::<Vec<_>>()
            })
            .filter(|origins| !origins.is_empty());

        Ok(Self {
            jwt_secret,
            db_path: get("KIN_DB_PATH").unwrap_or_else(|| "kin.db".into()).into(),
            host: get("KIN_HOST").unwrap_or_else(|| "0.0.0.0".into()),
            port,
            cache_ttl: Duration::from_secs(cache_ttl_secs),
            cors_origins,
        })
    }

    pub fn addr(&self) -> anyhow::Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid listen address {}:{}", self.host, self.port))
    }
}

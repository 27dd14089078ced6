use std::env;
use std::net::SocketAddr;

use anyhow::{bail, Context};

const DEV_SECRET_KEY: &str = "chorequest-development-secret-key";

/// Process configuration, read from the environment (and `.env`).
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub secret_key: String,
    pub bind_addr: SocketAddr,
    pub token_ttl_secs: u64,
    pub reset_url_base: String,
    pub cors_origin: Option<String>,
}

const DEFAULT_TOKEN_TTL_MINUTES: u64 = 7 * 24 * 60;

/// Token lifetime in seconds from a `TOKEN_TTL_MINUTES` value.
fn token_ttl_secs(minutes: Option<&str>) -> anyhow::Result<u64> {
    let minutes: u64 = match minutes {
        Some(v) => v.parse().context("TOKEN_TTL_MINUTES must be a number")?,
        None => DEFAULT_TOKEN_TTL_MINUTES,
    };
    minutes
        .checked_mul(60)
        .context("TOKEN_TTL_MINUTES is too large")
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        let secret_key = match env::var("SECRET_KEY") {
            Ok(key) if !key.is_empty() => key,
            _ if cfg!(debug_assertions) => {
                tracing::warn!("SECRET_KEY not set, using the development key");
                DEV_SECRET_KEY.to_string()
            }
            _ => bail!("SECRET_KEY must be set"),
        };

        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:8000".into())
            .parse()
            .context("BIND_ADDR must be a socket address")?;

        let token_ttl_secs = token_ttl_secs(env::var("TOKEN_TTL_MINUTES").ok().as_deref())?;

        Ok(Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite://chorequest.db".into()),
            secret_key,
            bind_addr,
            token_ttl_secs,
            reset_url_base: env::var("RESET_URL_BASE")
                .unwrap_or_else(|_| "http://localhost:4200/reset-password".into()),
            cors_origin: env::var("CORS_ORIGIN").ok().filter(|o| !o.is_empty()),
        })
    }

    #[cfg(test)]
    pub fn for_tests() -> Self {
        Self {
            database_url: "sqlite::memory:".into(),
            secret_key: "test-secret".into(),
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
            token_ttl_secs: 3600,
            reset_url_base: "http://localhost:4200/reset-password".into(),
            cors_origin: None,
        }
    }
}

use anyhow::{Context, Result};
use dotenvy::dotenv;
use std::env;

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub database_max_connections: u32,
    pub redis_url: String,
    pub redis_max_connections: u32,
    pub bind_addr: String,
    pub port: u16,
    /// Reserved: not used by the current Bearer-api-key auth path.
    pub jwt_secret: String,
    pub quota_standard_per_minute: u32,
    pub quota_premium_per_minute: u32,
    pub quota_batch_per_minute: u32,
    pub scheduler_worker_count: usize,
    pub scheduler_poll_timeout_secs: u64,
    pub scheduler_pause_poll_secs: u64,
    pub webhook_timeout_secs: u64,
    pub webhook_max_retries: u32,
    pub request_timeout_secs: u64,
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> Result<T> {
    match env::var(key) {
        Ok(v) => v
            .parse()
            .with_context(|| format!("{key} must be a valid value")),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables, falling back to `.env` in development.
    pub fn from_env() -> Result<Self> {
        let _ = dotenv();

        Ok(Self {
            database_url: env::var("DATABASE_URL").context("DATABASE_URL must be set")?,
            database_max_connections: env_or("DATABASE_MAX_CONNECTIONS", 100)?,
            redis_url: env::var("REDIS_URL")
                .unwrap_or_else(|_| "redis://localhost:6379".to_string()),
            redis_max_connections: env_or("REDIS_MAX_CONNECTIONS", 100)?,
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_or("PORT", 8080)?,
            jwt_secret: env::var("JWT_SECRET").unwrap_or_default(),
            quota_standard_per_minute: env_or("QUOTA_STANDARD_PER_MINUTE", 100)?,
            quota_premium_per_minute: env_or("QUOTA_PREMIUM_PER_MINUTE", 1000)?,
            quota_batch_per_minute: env_or("QUOTA_BATCH_PER_MINUTE", 20)?,
            scheduler_worker_count: env_or("SCHEDULER_WORKER_COUNT", 10)?,
            scheduler_poll_timeout_secs: env_or("SCHEDULER_POLL_TIMEOUT_SECS", 2)?,
            scheduler_pause_poll_secs: env_or("SCHEDULER_PAUSE_POLL_SECS", 1)?,
            webhook_timeout_secs: env_or("WEBHOOK_TIMEOUT_SECS", 30)?,
            webhook_max_retries: env_or("WEBHOOK_MAX_RETRIES", 5)?,
            request_timeout_secs: env_or("REQUEST_TIMEOUT_SECS", 15)?,
        })
    }
}

//! Queue-index connection setup.
//!
//! A single `redis::aio::ConnectionManager` is shared across all handlers and
//! workers: it multiplexes concurrent commands over one auto-reconnecting
//! connection, giving bounded, shared access without a separate pooling crate.

use anyhow::{Context, Result};
use redis::aio::ConnectionManager;
use redis::Client;

pub type RedisConn = ConnectionManager;

pub async fn connect(redis_url: &str) -> Result<RedisConn> {
    let client = Client::open(redis_url).context("invalid REDIS_URL")?;
    client
        .get_connection_manager()
        .await
        .context("failed to connect to redis")
}

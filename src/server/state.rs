//! Shared application state threaded through every axum handler via
//! `State<AppState>`.

use std::sync::Arc;

use sqlx::PgPool;

use crate::domains::auth::SlidingWindowLimiter;
use crate::kernel::{PauseFlag, RedisConn};
use crate::Config;

/// Cheap to clone: the pool and Redis connection manager are themselves
/// handles, and the pause flag is shared via `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub db: PgPool,
    pub redis: RedisConn,
    pub quota: SlidingWindowLimiter,
    pub pause: Arc<PauseFlag>,
    pub config: Arc<Config>,
}

impl AppState {
    pub fn new(db: PgPool, redis: RedisConn, config: Config) -> Self {
        let quota = SlidingWindowLimiter::new(crate::domains::auth::QuotaLimits {
            standard_per_minute: config.quota_standard_per_minute,
            premium_per_minute: config.quota_premium_per_minute,
            batch_per_minute: config.quota_batch_per_minute,
        });

        Self {
            db,
            redis,
            quota,
            pause: Arc::new(PauseFlag::default()),
            config: Arc::new(config),
        }
    }
}

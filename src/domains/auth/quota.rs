//! Sliding-window request quota.
//!
//! Backed by a Redis sorted set per `(principal, class)`: members are unique
//! per-request tokens scored by their arrival timestamp. Each call expires
//! entries older than `now - WINDOW_SECS`, counts what remains, and either
//! rejects or inserts `now`. This state must survive process restarts within
//! its TTL, so it lives in the shared queue-index store rather than
//! per-process memory.

use crate::common::ApiError;
use crate::kernel::RedisConn;
use redis::AsyncCommands;
use uuid::Uuid;

const WINDOW_SECS: i64 = 60;
/// Grace period added to the key TTL to tolerate clock skew between requests.
const TTL_GRACE_SECS: i64 = 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuotaClass {
    Standard,
    Premium,
    Batch,
}

impl QuotaClass {
    fn key_segment(self) -> &'static str {
        match self {
            QuotaClass::Standard => "standard",
            QuotaClass::Premium => "premium",
            QuotaClass::Batch => "batch",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct QuotaLimits {
    pub standard_per_minute: u32,
    pub premium_per_minute: u32,
    pub batch_per_minute: u32,
}

impl QuotaLimits {
    pub fn limit_for(&self, class: QuotaClass) -> u32 {
        match class {
            QuotaClass::Standard => self.standard_per_minute,
            QuotaClass::Premium => self.premium_per_minute,
            QuotaClass::Batch => self.batch_per_minute,
        }
    }
}

#[derive(Clone)]
pub struct SlidingWindowLimiter {
    limits: QuotaLimits,
}

impl SlidingWindowLimiter {
    pub fn new(limits: QuotaLimits) -> Self {
        Self { limits }
    }

    /// Check the principal's window for `class` and record this request if
    /// under the limit. Returns `Err(ApiError::RateLimitExceeded)` on the
    /// (N+1)-th request within 60 seconds, for limit N.
    pub async fn check_and_record(
        &self,
        redis: &mut RedisConn,
        principal_id: &str,
        class: QuotaClass,
    ) -> Result<(), ApiError> {
        let limit = self.limits.limit_for(class) as isize;
        let key = format!("quota:{}:{}", principal_id, class.key_segment());
        let now_ms = chrono::Utc::now().timestamp_millis();
        let window_start = now_ms - WINDOW_SECS * 1000;

        let _: () = redis
            .zrembyscore(&key, i64::MIN, window_start)
            .await?;

        let count: isize = redis.zcard(&key).await?;
        if count >= limit {
            return Err(ApiError::RateLimitExceeded);
        }

        let member = format!("{now_ms}-{}", Uuid::new_v4());
        let _: () = redis.zadd(&key, member, now_ms).await?;
        let _: () = redis
            .expire(&key, WINDOW_SECS + TTL_GRACE_SECS)
            .await?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_for_picks_right_class() {
        let limits = QuotaLimits {
            standard_per_minute: 100,
            premium_per_minute: 1000,
            batch_per_minute: 20,
        };
        assert_eq!(limits.limit_for(QuotaClass::Standard), 100);
        assert_eq!(limits.limit_for(QuotaClass::Premium), 1000);
        assert_eq!(limits.limit_for(QuotaClass::Batch), 20);
    }
}

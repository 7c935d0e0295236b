//! Priority queue index.
//!
//! A Redis sorted set keyed by `score = -priority`, so `ZPOPMIN`/`BZPOPMIN`
//! yields the highest-priority member first. The sorted set doubles as its
//! own membership set (`ZSCORE`/`ZRANK` already answer "is this queued" in
//! O(log n)), so no second key is kept in sync with it here.

use redis::AsyncCommands;

use crate::common::{ApiError, TaskId};
use crate::kernel::RedisConn;

const QUEUE_KEY: &str = "mlqueue:v1:queue";

pub struct QueueIndex;

impl QueueIndex {
    /// Insert or rescore a task. `score = -priority` so higher priority sorts first.
    /// Idempotent: re-enqueuing an already-queued id just updates its score.
    pub async fn enqueue(redis: &mut RedisConn, task_id: &TaskId, priority: i32) -> Result<(), ApiError> {
        let score = -(priority as f64);
        let _: () = redis.zadd(QUEUE_KEY, task_id.as_str(), score).await?;
        Ok(())
    }

    /// Alias for `enqueue` — rescoring and enqueuing are the same ZADD operation.
    pub async fn rescore(redis: &mut RedisConn, task_id: &TaskId, priority: i32) -> Result<(), ApiError> {
        Self::enqueue(redis, task_id, priority).await
    }

    /// Block up to `timeout` for the lowest-scored (highest-priority) member.
    /// Returns `None` on timeout. At-most-once across concurrent callers: Redis
    /// pops the member atomically, so no two workers can receive the same id.
    pub async fn blocking_pop(
        redis: &mut RedisConn,
        timeout: std::time::Duration,
    ) -> Result<Option<TaskId>, ApiError> {
        let popped: Option<(String, String, f64)> = redis
            .bzpopmin(QUEUE_KEY, timeout.as_secs_f64())
            .await?;
        Ok(popped.map(|(_key, member, _score)| TaskId::from(member)))
    }

    pub async fn length(redis: &mut RedisConn) -> Result<i64, ApiError> {
        Ok(redis.zcard(QUEUE_KEY).await?)
    }

    /// 0-indexed position by ascending score (lowest score / highest priority = 0).
    /// Returns `-1` if the task is not currently queued.
    pub async fn rank(redis: &mut RedisConn, task_id: &TaskId) -> Result<i64, ApiError> {
        let rank: Option<i64> = redis.zrank(QUEUE_KEY, task_id.as_str()).await?;
        Ok(rank.unwrap_or(-1))
    }

    /// Idempotent: removing an absent id is a no-op, not an error.
    pub async fn remove(redis: &mut RedisConn, task_id: &TaskId) -> Result<(), ApiError> {
        let _: i64 = redis.zrem(QUEUE_KEY, task_id.as_str()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    // `QueueIndex` requires a live Redis connection; its contract is covered by
    // the integration tests under `tests/` using the testcontainers harness.
}

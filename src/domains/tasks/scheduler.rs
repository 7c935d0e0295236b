//! V1 scheduler: a fixed-size worker pool draining the shared priority queue.
//!
//! A poll loop selected over `shutdown.cancelled()`, joined at shutdown via
//! `CancellationToken`. V1 tasks are fungible — every worker just pops the
//! next id and runs the same simulated executor.

use std::sync::Arc;
use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::model::TaskStatus;
use super::queue_index::QueueIndex;
use super::store;
use super::webhooks::{dispatch_event, TaskEventKind};
use crate::kernel::{PauseFlag, RedisConn};

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub worker_count: usize,
    pub poll_timeout: Duration,
    pub pause_poll_interval: Duration,
    pub webhook_max_retries: u32,
}

/// Launch the configured number of worker loops. Returns their join handles;
/// callers `tokio::join!`/`join_all` them after cancelling `shutdown` to
/// implement the documented graceful-shutdown procedure.
pub fn spawn_workers(
    config: SchedulerConfig,
    pool: PgPool,
    redis: RedisConn,
    http: reqwest::Client,
    pause: Arc<PauseFlag>,
    shutdown: CancellationToken,
) -> Vec<tokio::task::JoinHandle<()>> {
    (0..config.worker_count)
        .map(|worker_id| {
            let config = config.clone();
            let pool = pool.clone();
            let redis = redis.clone();
            let http = http.clone();
            let pause = pause.clone();
            let shutdown = shutdown.clone();
            tokio::spawn(async move {
                run_worker(worker_id, config, pool, redis, http, pause, shutdown).await
            })
        })
        .collect()
}

async fn run_worker(
    worker_id: usize,
    config: SchedulerConfig,
    pool: PgPool,
    mut redis: RedisConn,
    http: reqwest::Client,
    pause: Arc<PauseFlag>,
    shutdown: CancellationToken,
) {
    info!(worker_id, "scheduler worker starting");

    loop {
        if shutdown.is_cancelled() {
            break;
        }

        if pause.is_paused() {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(config.pause_poll_interval) => {}
            }
            continue;
        }

        let popped = tokio::select! {
            _ = shutdown.cancelled() => break,
            popped = QueueIndex::blocking_pop(&mut redis, config.poll_timeout) => popped,
        };

        let task_id = match popped {
            Ok(Some(id)) => id,
            Ok(None) => continue,
            Err(e) => {
                error!(worker_id, error = %e, "blocking pop failed");
                tokio::time::sleep(Duration::from_secs(1)).await;
                continue;
            }
        };

        process_task(worker_id, &pool, &http, &task_id, config.webhook_max_retries).await;
    }

    info!(worker_id, "scheduler worker stopped");
}

/// Load, transition to running, execute, persist the terminal transition.
/// Every early return here corresponds to a documented edge case, not a bug:
/// a vanished row is logged and skipped, not retried.
async fn process_task(
    worker_id: usize,
    pool: &PgPool,
    http: &reqwest::Client,
    task_id: &crate::common::TaskId,
    webhook_max_retries: u32,
) {
    let task = match store::find_any(pool, task_id).await {
        Ok(Some(t)) => t,
        Ok(None) => {
            debug!(worker_id, %task_id, "task vanished between pop and load, skipping");
            return;
        }
        Err(e) => {
            error!(worker_id, %task_id, error = %e, "failed to load task");
            return;
        }
    };

    let running = match store::mark_running(pool, task_id).await {
        Ok(Some(t)) => t,
        Ok(None) => {
            debug!(worker_id, %task_id, "task no longer queued, skipping");
            return;
        }
        Err(e) => {
            error!(worker_id, %task_id, error = %e, "failed to mark task running");
            return;
        }
    };

    debug!(worker_id, %task_id, "task started");
    dispatch_event(
        pool.clone(),
        http.clone(),
        running.owner_id,
        task_id.clone(),
        TaskEventKind::Started,
        TaskStatus::Running,
        None,
        webhook_max_retries,
    );

    // Simulated executor: real deployments substitute the actual training
    // dispatch here. The contract this scheduler must uphold is exactly one
    // terminal transition per task per worker.
    tokio::time::sleep(Duration::from_millis(50 * (worker_id as u64 + 1))).await;

    let result = serde_json::json!({"simulated": true, "worker_id": worker_id});
    match store::mark_terminal_if_running(pool, task_id, TaskStatus::Completed, Some(result.clone()), None).await
    {
        Ok(Some(t)) => {
            debug!(worker_id, %task_id, "task completed");
            dispatch_event(
                pool.clone(),
                http.clone(),
                t.owner_id,
                task_id.clone(),
                TaskEventKind::Completed,
                TaskStatus::Completed,
                Some(result),
                webhook_max_retries,
            );
        }
        Ok(None) => {
            // A concurrent Cancel already moved this row out of `running`;
            // we do not overwrite it.
            warn!(worker_id, %task_id, "task was cancelled before completion, not overwriting");
        }
        Err(e) => {
            error!(worker_id, %task_id, error = %e, "failed to persist terminal transition");
        }
    }
}

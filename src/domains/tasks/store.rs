//! Durable storage for V1 tasks.
//!
//! Every read and write filters by `owner_id = principal.id`: a row visible
//! to one principal is a plain "not found" to another.

use serde_json::Value as Json;
use sqlx::PgPool;

use super::model::{Task, TaskStatus};
use crate::common::pagination::{validate_sort_column, ValidatedPageParams};
use crate::common::TaskId;
use crate::domains::auth::principal::PrincipalId;

const SORT_COLUMNS: &[&str] = &["created_at", "priority", "status", "name"];

pub struct NewTask {
    pub owner_id: PrincipalId,
    pub name: String,
    pub config: Json,
    pub priority: i32,
    pub metadata: Json,
}

pub async fn create(pool: &PgPool, new: NewTask) -> Result<Task, sqlx::Error> {
    let id = TaskId::new();
    sqlx::query_as::<_, Task>(
        r#"
        INSERT INTO tasks (id, owner_id, name, config, priority, status, metadata, created_at)
        VALUES ($1, $2, $3, $4, $5, 'queued', $6, now())
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(new.owner_id)
    .bind(new.name)
    .bind(new.config)
    .bind(new.priority)
    .bind(new.metadata)
    .fetch_one(pool)
    .await
}

pub async fn find(pool: &PgPool, id: &TaskId, owner_id: PrincipalId) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await
}

/// Load a task without owner filtering, used only by the scheduler which
/// already took ownership of the id off the shared queue index.
pub async fn find_any(pool: &PgPool, id: &TaskId) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list(
    pool: &PgPool,
    owner_id: PrincipalId,
    status: Option<TaskStatus>,
    page: &ValidatedPageParams,
) -> Result<(Vec<Task>, i64), sqlx::Error> {
    let sort = validate_sort_column(&page.sort, SORT_COLUMNS);

    let total: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM tasks WHERE owner_id = $1 AND ($2::task_status IS NULL OR status = $2)",
    )
    .bind(owner_id)
    .bind(status)
    .fetch_one(pool)
    .await?;

    // `sort` is allow-listed above, so interpolation here is not injectable.
    let query = format!(
        r#"
        SELECT * FROM tasks
        WHERE owner_id = $1 AND ($2::task_status IS NULL OR status = $2)
        ORDER BY "{sort}" DESC
        LIMIT $3 OFFSET $4
        "#
    );
    let items = sqlx::query_as::<_, Task>(&query)
        .bind(owner_id)
        .bind(status)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    Ok((items, total))
}

/// Outcome of an operation gated on a task's current status, so callers can
/// tell "not found/not owned" apart from "found but in the wrong state"
/// without collapsing both into the same `None`.
pub enum GatedTaskOutcome<T> {
    Ok(T),
    NotFound,
    WrongStatus(TaskStatus),
}

/// Permitted only when `status IN (queued, pending)`.
pub async fn update_priority(
    pool: &PgPool,
    id: &TaskId,
    owner_id: PrincipalId,
    priority: i32,
) -> Result<GatedTaskOutcome<Task>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(existing) = existing else {
        tx.rollback().await?;
        return Ok(GatedTaskOutcome::NotFound);
    };
    if !matches!(existing.status, TaskStatus::Queued | TaskStatus::Pending) {
        tx.rollback().await?;
        return Ok(GatedTaskOutcome::WrongStatus(existing.status));
    }

    let updated = sqlx::query_as::<_, Task>("UPDATE tasks SET priority = $2 WHERE id = $1 RETURNING *")
        .bind(id)
        .bind(priority)
        .fetch_one(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(GatedTaskOutcome::Ok(updated))
}

/// Permitted unless already `completed`/`cancelled`; succeeds even while
/// `running` — the at-most-once dispatch hazard is resolved by the
/// scheduler's compare-and-set on the *terminal* transition, not here.
pub async fn cancel(
    pool: &PgPool,
    id: &TaskId,
    owner_id: PrincipalId,
    reason: &str,
) -> Result<GatedTaskOutcome<Task>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, Task>("SELECT * FROM tasks WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?;

    let Some(existing) = existing else {
        tx.rollback().await?;
        return Ok(GatedTaskOutcome::NotFound);
    };
    if matches!(existing.status, TaskStatus::Completed | TaskStatus::Cancelled) {
        tx.rollback().await?;
        return Ok(GatedTaskOutcome::WrongStatus(existing.status));
    }

    let updated = sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks
        SET status = 'cancelled', error_message = $2, completed_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(reason)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(GatedTaskOutcome::Ok(updated))
}

pub async fn upload_result(
    pool: &PgPool,
    id: &TaskId,
    owner_id: PrincipalId,
    result: Json,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks
        SET status = 'completed', result = $3, completed_at = now()
        WHERE id = $1 AND owner_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(result)
    .fetch_optional(pool)
    .await
}

/// Worker-side: `queued -> running`. Returns `None` if the row vanished
/// between pop and load (cancel-deleted) — the caller logs and continues.
pub async fn mark_running(pool: &PgPool, id: &TaskId) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks
        SET status = 'running', started_at = now()
        WHERE id = $1 AND status = 'queued'
        RETURNING *
        "#,
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}

/// Worker-side terminal transition, compare-and-set on `status = running`. If
/// the row was already moved to `cancelled` by a concurrent `Cancel`, this is
/// a no-op and returns `None`, so the cancellation is never overwritten.
pub async fn mark_terminal_if_running(
    pool: &PgPool,
    id: &TaskId,
    status: TaskStatus,
    result: Option<Json>,
    error_message: Option<String>,
) -> Result<Option<Task>, sqlx::Error> {
    sqlx::query_as::<_, Task>(
        r#"
        UPDATE tasks
        SET status = $2, result = COALESCE($3, result), error_message = $4, completed_at = now()
        WHERE id = $1 AND status = 'running'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(status)
    .bind(result)
    .bind(error_message)
    .fetch_optional(pool)
    .await
}

//! V1 Task REST API. Every handler is owner-scoped via the
//! [`AuthedPrincipal`] extension inserted by `auth_middleware`.

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::model::{Task, TaskStatus};
use super::queue_index::QueueIndex;
use super::store::{self, GatedTaskOutcome};
use super::webhooks::{dispatch_event, NewWebhookSink, TaskEventKind, WebhookSink};
use super::webhooks::store as webhook_store;
use crate::common::pagination::{Page, PageParams};
use crate::common::{ApiError, ApiResult, TaskId};
use crate::domains::auth::AuthedPrincipal;
use crate::server::state::AppState;

/// Everything except batch-create, which metres at a different quota class
/// and so is wired separately in [`batch_router`] so `app.rs` can layer it
/// with its own quota middleware.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v1/tasks", post(create_task).get(list_tasks))
        .route("/v1/tasks/:id", get(get_task))
        .route("/v1/tasks/:id/priority", put(update_priority))
        .route("/v1/tasks/:id/cancel", post(cancel_task))
        .route("/v1/tasks/:id/result", post(upload_result))
        .route("/v1/webhooks", post(create_webhook).get(list_webhooks))
        .route("/v1/webhooks/:id", axum::routing::delete(delete_webhook))
        .route("/v1/scheduler/pause", post(pause_scheduler))
        .route("/v1/scheduler/resume", post(resume_scheduler))
}

/// Batch-create only; always metered at the batch quota class regardless of
/// principal tier.
pub fn batch_router() -> Router<AppState> {
    Router::new().route("/v1/tasks/batch", post(batch_create_tasks))
}

#[derive(Debug, Deserialize)]
pub struct CreateTaskRequest {
    pub name: String,
    pub config: JsonValue,
    #[serde(default)]
    pub priority: Option<i32>,
    #[serde(default)]
    pub metadata: Option<JsonValue>,
}

#[derive(Debug, Serialize)]
pub struct CreateTaskResponse {
    pub id: TaskId,
    pub queue_position: i64,
}

async fn create_task(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Json(req): Json<CreateTaskRequest>,
) -> ApiResult<(StatusCode, Json<CreateTaskResponse>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::InvalidConfig("name must not be empty".into()));
    }
    if !req.config.is_object() {
        return Err(ApiError::InvalidConfig("config must be a JSON object".into()));
    }
    let priority = req.priority.unwrap_or(0);

    let task = store::create(
        &state.db,
        store::NewTask {
            owner_id: principal.id,
            name: req.name,
            config: req.config,
            priority,
            metadata: req.metadata.unwrap_or_else(|| serde_json::json!({})),
        },
    )
    .await?;

    let mut redis = state.redis.clone();
    if let Err(e) = QueueIndex::enqueue(&mut redis, &task.id, priority).await {
        // Best-effort rollback of the queue-index insert so the row doesn't
        // hang around queued forever with nothing to ever pop it.
        let _ = store::cancel(&state.db, &task.id, principal.id, "enqueue failed").await;
        return Err(e);
    }
    let queue_position = QueueIndex::rank(&mut redis, &task.id).await.unwrap_or(-1);

    dispatch_event(
        state.db.clone(),
        reqwest::Client::new(),
        principal.id,
        task.id.clone(),
        TaskEventKind::Queued,
        TaskStatus::Queued,
        None,
        state.config.webhook_max_retries,
    );

    Ok((
        StatusCode::CREATED,
        Json(CreateTaskResponse {
            id: task.id,
            queue_position,
        }),
    ))
}

#[derive(Debug, Deserialize)]
pub struct BatchCreateRequest {
    pub tasks: Vec<CreateTaskRequest>,
}

#[derive(Debug, Serialize)]
pub struct BatchCreateResponse {
    pub created_count: usize,
    pub ids: Vec<TaskId>,
}

/// Per-item best-effort; a single item's failure is skipped, not propagated —
/// there is no transactional guarantee across items.
async fn batch_create_tasks(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Json(req): Json<BatchCreateRequest>,
) -> ApiResult<(StatusCode, Json<BatchCreateResponse>)> {
    let mut ids = Vec::with_capacity(req.tasks.len());
    let mut redis = state.redis.clone();

    for item in req.tasks {
        if item.name.trim().is_empty() || !item.config.is_object() {
            continue;
        }
        let priority = item.priority.unwrap_or(0);

        let task = match store::create(
            &state.db,
            store::NewTask {
                owner_id: principal.id,
                name: item.name,
                config: item.config,
                priority,
                metadata: item.metadata.unwrap_or_else(|| serde_json::json!({})),
            },
        )
        .await
        {
            Ok(t) => t,
            Err(_) => continue,
        };

        if QueueIndex::enqueue(&mut redis, &task.id, priority).await.is_err() {
            let _ = store::cancel(&state.db, &task.id, principal.id, "enqueue failed").await;
            continue;
        }

        dispatch_event(
            state.db.clone(),
            reqwest::Client::new(),
            principal.id,
            task.id.clone(),
            TaskEventKind::Queued,
            TaskStatus::Queued,
            None,
            state.config.webhook_max_retries,
        );
        ids.push(task.id);
    }

    Ok((
        StatusCode::CREATED,
        Json(BatchCreateResponse {
            created_count: ids.len(),
            ids,
        }),
    ))
}

async fn get_task(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(id): Path<TaskId>,
) -> ApiResult<Json<Task>> {
    let task = store::find(&state.db, &id, principal.id)
        .await?
        .ok_or(ApiError::TaskNotFound)?;
    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct ListTasksQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub status: Option<TaskStatus>,
}

async fn list_tasks(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Query(query): Query<ListTasksQuery>,
) -> ApiResult<Json<Page<Task>>> {
    let page = query.page.validated();
    let (items, total) = store::list(&state.db, principal.id, query.status, &page).await?;
    Ok(Json(Page::new(items, total, &page)))
}

#[derive(Debug, Deserialize)]
pub struct UpdatePriorityRequest {
    pub priority: i32,
}

#[derive(Debug, Serialize)]
pub struct UpdatePriorityResponse {
    pub task: Task,
    pub queue_position: i64,
}

async fn update_priority(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(id): Path<TaskId>,
    Json(req): Json<UpdatePriorityRequest>,
) -> ApiResult<Json<UpdatePriorityResponse>> {
    let task = match store::update_priority(&state.db, &id, principal.id, req.priority).await? {
        GatedTaskOutcome::Ok(task) => task,
        GatedTaskOutcome::NotFound => return Err(ApiError::TaskNotFound),
        GatedTaskOutcome::WrongStatus(_) => return Err(ApiError::TaskAlreadyRunning),
    };

    let mut redis = state.redis.clone();
    QueueIndex::rescore(&mut redis, &task.id, req.priority).await?;
    let queue_position = QueueIndex::rank(&mut redis, &task.id).await.unwrap_or(-1);

    Ok(Json(UpdatePriorityResponse { task, queue_position }))
}

#[derive(Debug, Deserialize, Default)]
pub struct CancelRequest {
    #[serde(default)]
    pub reason: Option<String>,
}

async fn cancel_task(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(id): Path<TaskId>,
    body: Option<Json<CancelRequest>>,
) -> ApiResult<Json<Task>> {
    let reason = body
        .and_then(|Json(r)| r.reason)
        .unwrap_or_else(|| "cancelled by owner".to_string());

    let task = match store::cancel(&state.db, &id, principal.id, &reason).await? {
        GatedTaskOutcome::Ok(task) => task,
        GatedTaskOutcome::NotFound => return Err(ApiError::TaskNotFound),
        GatedTaskOutcome::WrongStatus(_) => return Err(ApiError::TaskAlreadyCompleted),
    };

    let mut redis = state.redis.clone();
    let _ = QueueIndex::remove(&mut redis, &task.id).await;

    dispatch_event(
        state.db.clone(),
        reqwest::Client::new(),
        principal.id,
        task.id.clone(),
        TaskEventKind::Cancelled,
        TaskStatus::Cancelled,
        None,
        state.config.webhook_max_retries,
    );

    Ok(Json(task))
}

#[derive(Debug, Deserialize)]
pub struct UploadResultRequest {
    pub result: JsonValue,
    #[serde(default)]
    pub artifacts: Option<JsonValue>,
}

async fn upload_result(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(id): Path<TaskId>,
    Json(req): Json<UploadResultRequest>,
) -> ApiResult<Json<Task>> {
    let mut result = req.result;
    if let Some(artifacts) = req.artifacts {
        if let (Some(result_obj), Some(artifacts_obj)) = (result.as_object_mut(), artifacts.as_object()) {
            result_obj.insert("artifacts".to_string(), serde_json::Value::Object(artifacts_obj.clone()));
        }
    }

    let task = store::upload_result(&state.db, &id, principal.id, result.clone())
        .await?
        .ok_or(ApiError::TaskNotFound)?;

    let mut redis = state.redis.clone();
    let _ = QueueIndex::remove(&mut redis, &task.id).await;

    dispatch_event(
        state.db.clone(),
        reqwest::Client::new(),
        principal.id,
        task.id.clone(),
        TaskEventKind::Completed,
        TaskStatus::Completed,
        Some(result),
        state.config.webhook_max_retries,
    );

    Ok(Json(task))
}

// --- Webhook sink CRUD ---

#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub url: String,
    #[serde(default)]
    pub events: Vec<String>,
}

async fn create_webhook(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Json(req): Json<CreateWebhookRequest>,
) -> ApiResult<(StatusCode, Json<WebhookSink>)> {
    if !req.url.starts_with("http://") && !req.url.starts_with("https://") {
        return Err(ApiError::Validation("url must be http(s)".into()));
    }
    let sink = webhook_store::create(
        &state.db,
        NewWebhookSink {
            owner_id: principal.id,
            url: req.url,
            events: req.events,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(sink)))
}

async fn list_webhooks(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
) -> ApiResult<Json<Vec<WebhookSink>>> {
    Ok(Json(webhook_store::list(&state.db, principal.id).await?))
}

async fn delete_webhook(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(id): Path<super::webhooks::WebhookSinkId>,
) -> ApiResult<Json<serde_json::Value>> {
    let deleted = webhook_store::delete(&state.db, id, principal.id).await?;
    if !deleted {
        return Err(ApiError::Validation("webhook sink not found".into()));
    }
    Ok(Json(serde_json::json!({"success": true})))
}

// --- Scheduler control ---

#[derive(Debug, Serialize)]
pub struct SchedulerStateResponse {
    pub paused: bool,
}

async fn pause_scheduler(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(_principal)): Extension<AuthedPrincipal>,
) -> Json<SchedulerStateResponse> {
    state.pause.pause();
    Json(SchedulerStateResponse { paused: true })
}

async fn resume_scheduler(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(_principal)): Extension<AuthedPrincipal>,
) -> Json<SchedulerStateResponse> {
    state.pause.resume();
    Json(SchedulerStateResponse { paused: false })
}

#[cfg(test)]
mod tests {
    // Every handler here needs a live `AppState` (db pool + redis connection
    // manager); their contracts are covered by the integration tests under
    // `tests/`.
}

//! V2 REST surface — Group/Unit CRUD, heartbeat, sync, and the
//! client-driven queue lifecycle (start/complete/fail/reorder).

use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post, put};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use super::model::{Group, QueueStatus, TrainingQueue, TrainingUnit};
use super::store::{self, GatedQueueOutcome, NewGroup, NewQueue, NewUnit, QueueUpdate, ReorderOutcome, UnitUpdate};
use crate::common::pagination::{Page, PageParams};
use crate::common::{ApiError, ApiResult};
use crate::domains::auth::AuthedPrincipal;
use crate::domains::hierarchy::model::{CreatedBy, GroupId, TrainingQueueId, TrainingUnitId};
use crate::server::state::AppState;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/v2/groups", post(create_group).get(list_groups))
        .route("/v2/groups/:group_id", get(get_group).delete(delete_group))
        .route("/v2/groups/:group_id/units", post(create_unit))
        .route(
            "/v2/groups/:group_id/units/:unit_id",
            get(get_unit).put(update_unit).delete(delete_unit),
        )
        .route("/v2/groups/:group_id/units/:unit_id/queues", get(list_unit_queues))
        .route("/v2/units/:unit_id/heartbeat", post(heartbeat_unit))
        .route("/v2/units/:unit_id/sync", get(sync_unit))
        .route("/v2/units/:unit_id/queues", post(create_queue))
        .route("/v2/units/:unit_id/queues/batch", post(batch_create_queues))
        .route("/v2/units/:unit_id/reorder", post(reorder_queues))
        .route("/v2/queues/:queue_id", put(update_queue).delete(delete_queue))
        .route("/v2/queues/:queue_id/start", post(start_queue))
        .route("/v2/queues/:queue_id/complete", post(complete_queue))
        .route("/v2/queues/:queue_id/fail", post(fail_queue))
}

// --- Groups ---

#[derive(Debug, Deserialize)]
pub struct CreateGroupRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
}

async fn create_group(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Json(req): Json<CreateGroupRequest>,
) -> ApiResult<(StatusCode, Json<Group>)> {
    if req.name.trim().is_empty() {
        return Err(ApiError::Validation("name must not be empty".into()));
    }
    let group = store::create_group(
        &state.db,
        NewGroup {
            owner_id: principal.id,
            name: req.name,
            description: req.description,
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(group)))
}

async fn list_groups(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
) -> ApiResult<Json<Vec<Group>>> {
    Ok(Json(store::list_groups(&state.db, principal.id).await?))
}

async fn get_group(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<Json<Group>> {
    let group = store::find_group(&state.db, group_id, principal.id)
        .await?
        .ok_or(ApiError::GroupNotFound)?;
    Ok(Json(group))
}

async fn delete_group(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(group_id): Path<GroupId>,
) -> ApiResult<Json<JsonValue>> {
    let deleted = store::delete_group(&state.db, group_id, principal.id).await?;
    if !deleted {
        return Err(ApiError::GroupNotFound);
    }
    Ok(Json(serde_json::json!({"success": true})))
}

// --- Training Units ---

#[derive(Debug, Deserialize)]
pub struct CreateUnitRequest {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<JsonValue>,
}

async fn create_unit(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(group_id): Path<GroupId>,
    Json(req): Json<CreateUnitRequest>,
) -> ApiResult<(StatusCode, Json<TrainingUnit>)> {
    store::find_group(&state.db, group_id, principal.id)
        .await?
        .ok_or(ApiError::GroupNotFound)?;

    let unit = store::create_unit(
        &state.db,
        NewUnit {
            group_id,
            owner_id: principal.id,
            name: req.name,
            description: req.description,
            config: req.config.unwrap_or_else(|| serde_json::json!({})),
        },
    )
    .await?;
    Ok((StatusCode::CREATED, Json(unit)))
}

async fn get_unit(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path((_group_id, unit_id)): Path<(GroupId, TrainingUnitId)>,
) -> ApiResult<Json<TrainingUnit>> {
    let unit = store::find_unit(&state.db, unit_id, principal.id)
        .await?
        .ok_or(ApiError::UnitNotFound)?;
    Ok(Json(unit))
}

#[derive(Debug, Deserialize)]
pub struct UpdateUnitRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub config: Option<JsonValue>,
}

async fn update_unit(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path((_group_id, unit_id)): Path<(GroupId, TrainingUnitId)>,
    Json(req): Json<UpdateUnitRequest>,
) -> ApiResult<Json<TrainingUnit>> {
    let unit = store::update_unit(
        &state.db,
        unit_id,
        principal.id,
        UnitUpdate {
            name: req.name,
            description: req.description,
            config: req.config,
        },
    )
    .await?
    .ok_or(ApiError::UnitNotFound)?;
    Ok(Json(unit))
}

async fn delete_unit(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path((_group_id, unit_id)): Path<(GroupId, TrainingUnitId)>,
) -> ApiResult<Json<JsonValue>> {
    let deleted = store::delete_unit(&state.db, unit_id, principal.id).await?;
    if !deleted {
        return Err(ApiError::UnitNotFound);
    }
    Ok(Json(serde_json::json!({"success": true})))
}

async fn heartbeat_unit(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(unit_id): Path<TrainingUnitId>,
) -> ApiResult<Json<TrainingUnit>> {
    let unit = store::heartbeat_unit(&state.db, unit_id, principal.id)
        .await?
        .ok_or(ApiError::UnitNotFound)?;
    Ok(Json(unit))
}

#[derive(Debug, Deserialize)]
pub struct SyncQuery {
    pub client_version: i64,
}

#[derive(Debug, Serialize)]
pub struct SyncResponse {
    pub need_sync: bool,
    pub cloud_version: i64,
    pub unit: TrainingUnit,
    pub queues: Vec<TrainingQueue>,
}

async fn sync_unit(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(unit_id): Path<TrainingUnitId>,
    Query(query): Query<SyncQuery>,
) -> ApiResult<Json<SyncResponse>> {
    let result = store::sync_unit(&state.db, unit_id, principal.id, query.client_version)
        .await?
        .ok_or(ApiError::UnitNotFound)?;
    Ok(Json(SyncResponse {
        need_sync: result.need_sync,
        cloud_version: result.cloud_version,
        unit: result.unit,
        queues: result.queues,
    }))
}

// --- Training Queues ---

#[derive(Debug, Deserialize)]
pub struct CreateQueueRequest {
    pub name: String,
    #[serde(default)]
    pub parameters: Option<JsonValue>,
}

async fn create_queue(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(unit_id): Path<TrainingUnitId>,
    Json(req): Json<CreateQueueRequest>,
) -> ApiResult<(StatusCode, Json<TrainingQueue>)> {
    let queue = store::create_queue(
        &state.db,
        unit_id,
        principal.id,
        NewQueue {
            name: req.name,
            parameters: req.parameters.unwrap_or_else(|| serde_json::json!({})),
            created_by: CreatedBy::Client,
        },
    )
    .await?
    .ok_or(ApiError::UnitNotFound)?;
    Ok((StatusCode::CREATED, Json(queue)))
}

#[derive(Debug, Deserialize)]
pub struct BatchCreateQueuesRequest {
    pub queues: Vec<CreateQueueRequest>,
}

async fn batch_create_queues(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(unit_id): Path<TrainingUnitId>,
    Json(req): Json<BatchCreateQueuesRequest>,
) -> ApiResult<(StatusCode, Json<Vec<TrainingQueue>>)> {
    let items = req
        .queues
        .into_iter()
        .map(|q| NewQueue {
            name: q.name,
            parameters: q.parameters.unwrap_or_else(|| serde_json::json!({})),
            created_by: CreatedBy::Client,
        })
        .collect();

    let queues = store::batch_create_queues(&state.db, unit_id, principal.id, items)
        .await?
        .ok_or(ApiError::UnitNotFound)?;
    Ok((StatusCode::CREATED, Json(queues)))
}

#[derive(Debug, Deserialize)]
pub struct ListQueuesQuery {
    #[serde(flatten)]
    pub page: PageParams,
    pub status: Option<QueueStatus>,
}

/// Parity list endpoint with the same query conventions as the V1 list.
async fn list_unit_queues(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path((_group_id, unit_id)): Path<(GroupId, TrainingUnitId)>,
    Query(query): Query<ListQueuesQuery>,
) -> ApiResult<Json<Page<TrainingQueue>>> {
    let page = query.page.validated();
    let (items, total) = store::list_queues_for_unit(&state.db, unit_id, principal.id, query.status, &page).await?;
    Ok(Json(Page::new(items, total, &page)))
}

#[derive(Debug, Deserialize)]
pub struct UpdateQueueRequest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub parameters: Option<JsonValue>,
}

async fn update_queue(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(queue_id): Path<TrainingQueueId>,
    Json(req): Json<UpdateQueueRequest>,
) -> ApiResult<Json<TrainingQueue>> {
    match store::update_queue(
        &state.db,
        queue_id,
        principal.id,
        QueueUpdate {
            name: req.name,
            parameters: req.parameters,
        },
    )
    .await?
    {
        GatedQueueOutcome::Ok(queue) => Ok(Json(queue)),
        GatedQueueOutcome::NotFound => Err(ApiError::QueueNotFound),
        GatedQueueOutcome::WrongStatus(status) => Err(ApiError::InvalidQueueStatus(format!(
            "cannot update a queue in status {status:?}"
        ))),
    }
}

async fn delete_queue(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(queue_id): Path<TrainingQueueId>,
) -> ApiResult<Json<JsonValue>> {
    match store::delete_queue(&state.db, queue_id, principal.id).await? {
        GatedQueueOutcome::Ok(()) => Ok(Json(serde_json::json!({"success": true}))),
        GatedQueueOutcome::NotFound => Err(ApiError::QueueNotFound),
        GatedQueueOutcome::WrongStatus(status) => Err(ApiError::InvalidQueueStatus(format!(
            "cannot delete a queue in status {status:?}"
        ))),
    }
}

async fn start_queue(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(queue_id): Path<TrainingQueueId>,
) -> ApiResult<Json<TrainingQueue>> {
    let queue = store::start_queue(&state.db, queue_id, principal.id)
        .await?
        .ok_or(ApiError::QueueNotFound)?;
    Ok(Json(queue))
}

#[derive(Debug, Deserialize)]
pub struct CompleteQueueRequest {
    #[serde(default)]
    pub result: Option<JsonValue>,
    #[serde(default)]
    pub metrics: Option<JsonValue>,
}

async fn complete_queue(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(queue_id): Path<TrainingQueueId>,
    Json(req): Json<CompleteQueueRequest>,
) -> ApiResult<Json<TrainingQueue>> {
    let queue = store::complete_queue(&state.db, queue_id, principal.id, req.result, req.metrics)
        .await?
        .ok_or(ApiError::QueueNotFound)?;
    Ok(Json(queue))
}

#[derive(Debug, Deserialize)]
pub struct FailQueueRequest {
    pub error_msg: String,
}

async fn fail_queue(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(queue_id): Path<TrainingQueueId>,
    Json(req): Json<FailQueueRequest>,
) -> ApiResult<Json<TrainingQueue>> {
    let queue = store::fail_queue(&state.db, queue_id, principal.id, req.error_msg)
        .await?
        .ok_or(ApiError::QueueNotFound)?;
    Ok(Json(queue))
}

#[derive(Debug, Deserialize)]
pub struct ReorderRequest {
    pub queue_ids: Vec<TrainingQueueId>,
}

async fn reorder_queues(
    State(state): State<AppState>,
    Extension(AuthedPrincipal(principal)): Extension<AuthedPrincipal>,
    Path(unit_id): Path<TrainingUnitId>,
    Json(req): Json<ReorderRequest>,
) -> ApiResult<Json<JsonValue>> {
    match store::reorder_queues(&state.db, unit_id, principal.id, req.queue_ids).await? {
        ReorderOutcome::Ok => Ok(Json(serde_json::json!({"success": true}))),
        ReorderOutcome::UnitNotFound => Err(ApiError::UnitNotFound),
        ReorderOutcome::NotFound(_) => Err(ApiError::QueueNotFound),
        ReorderOutcome::CrossUnit(_) => Err(ApiError::QueueCrossUnit),
        ReorderOutcome::NotPending(id) => {
            Err(ApiError::InvalidQueueStatus(format!("queue {id} is not pending")))
        }
    }
}

#[cfg(test)]
mod tests {
    // Every handler here needs a live `AppState`; their contracts are
    // covered by the integration tests under `tests/`.
}

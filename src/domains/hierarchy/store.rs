//! V2 durable store: Group/TrainingUnit/TrainingQueue CRUD, version cursor,
//! heartbeat liveness, and the reorder protocol.

use chrono::{Duration, Utc};
use serde_json::Value as Json;
use sqlx::PgPool;

use super::model::{
    ConnectionStatus, CreatedBy, Group, GroupId, QueueStatus, TrainingQueue, TrainingQueueId,
    TrainingUnit, TrainingUnitId,
};
use crate::common::pagination::{validate_sort_column, ValidatedPageParams};
use crate::domains::auth::principal::PrincipalId;

/// Liveness window: a unit is `connected` iff a heartbeat landed within this
/// many seconds of now.
pub const T_LIVE: Duration = Duration::seconds(10);

const QUEUE_SORT_COLUMNS: &[&str] = &["created_at", "order", "status", "name"];

// --- Groups ---

pub struct NewGroup {
    pub owner_id: PrincipalId,
    pub name: String,
    pub description: Option<String>,
}

pub async fn create_group(pool: &PgPool, new: NewGroup) -> Result<Group, sqlx::Error> {
    sqlx::query_as::<_, Group>(
        r#"
        INSERT INTO groups (id, owner_id, name, description, created_at, updated_at)
        VALUES ($1, $2, $3, $4, now(), now())
        RETURNING *
        "#,
    )
    .bind(GroupId::new())
    .bind(new.owner_id)
    .bind(new.name)
    .bind(new.description)
    .fetch_one(pool)
    .await
}

pub async fn find_group(pool: &PgPool, id: GroupId, owner_id: PrincipalId) -> Result<Option<Group>, sqlx::Error> {
    sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_groups(pool: &PgPool, owner_id: PrincipalId) -> Result<Vec<Group>, sqlx::Error> {
    sqlx::query_as::<_, Group>("SELECT * FROM groups WHERE owner_id = $1 ORDER BY created_at DESC")
        .bind(owner_id)
        .fetch_all(pool)
        .await
}

/// Cascades to units and queues via `ON DELETE CASCADE` foreign keys.
pub async fn delete_group(pool: &PgPool, id: GroupId, owner_id: PrincipalId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM groups WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// --- Training Units ---

pub struct NewUnit {
    pub group_id: GroupId,
    pub owner_id: PrincipalId,
    pub name: String,
    pub description: Option<String>,
    pub config: Json,
}

pub async fn create_unit(pool: &PgPool, new: NewUnit) -> Result<TrainingUnit, sqlx::Error> {
    sqlx::query_as::<_, TrainingUnit>(
        r#"
        INSERT INTO training_units
            (id, group_id, owner_id, name, description, config, version, status, connection_status, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, 0, 'idle', 'disconnected', now(), now())
        RETURNING *
        "#,
    )
    .bind(TrainingUnitId::new())
    .bind(new.group_id)
    .bind(new.owner_id)
    .bind(new.name)
    .bind(new.description)
    .bind(new.config)
    .fetch_one(pool)
    .await
}

/// Lazily coerces a stale `connection_status` before returning, persisting
/// the transition.
pub async fn find_unit(
    pool: &PgPool,
    id: TrainingUnitId,
    owner_id: PrincipalId,
) -> Result<Option<TrainingUnit>, sqlx::Error> {
    let unit = sqlx::query_as::<_, TrainingUnit>(
        "SELECT * FROM training_units WHERE id = $1 AND owner_id = $2",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await?;

    match unit {
        Some(unit) => Ok(Some(coerce_liveness(pool, unit).await?)),
        None => Ok(None),
    }
}

/// If the unit's heartbeat is stale, persist `connection_status =
/// disconnected` and return the updated row; otherwise return it unchanged.
pub async fn coerce_liveness(pool: &PgPool, unit: TrainingUnit) -> Result<TrainingUnit, sqlx::Error> {
    let stale = match unit.last_heartbeat {
        None => true,
        Some(hb) => Utc::now() - hb > T_LIVE,
    };

    if stale && unit.connection_status == ConnectionStatus::Connected {
        sqlx::query_as::<_, TrainingUnit>(
            "UPDATE training_units SET connection_status = 'disconnected' WHERE id = $1 RETURNING *",
        )
        .bind(unit.id)
        .fetch_one(pool)
        .await
    } else {
        Ok(unit)
    }
}

pub struct UnitUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub config: Option<Json>,
}

/// Bumps `version` by exactly one via an atomic `version = version + 1` —
/// never read-modify-write.
pub async fn update_unit(
    pool: &PgPool,
    id: TrainingUnitId,
    owner_id: PrincipalId,
    update: UnitUpdate,
) -> Result<Option<TrainingUnit>, sqlx::Error> {
    sqlx::query_as::<_, TrainingUnit>(
        r#"
        UPDATE training_units
        SET name = COALESCE($3, name),
            description = COALESCE($4, description),
            config = COALESCE($5, config),
            version = version + 1,
            updated_at = now()
        WHERE id = $1 AND owner_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(update.name)
    .bind(update.description)
    .bind(update.config)
    .fetch_optional(pool)
    .await
}

pub async fn heartbeat_unit(
    pool: &PgPool,
    id: TrainingUnitId,
    owner_id: PrincipalId,
) -> Result<Option<TrainingUnit>, sqlx::Error> {
    sqlx::query_as::<_, TrainingUnit>(
        r#"
        UPDATE training_units
        SET last_heartbeat = now(), connection_status = 'connected', updated_at = now()
        WHERE id = $1 AND owner_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(pool)
    .await
}

pub async fn delete_unit(pool: &PgPool, id: TrainingUnitId, owner_id: PrincipalId) -> Result<bool, sqlx::Error> {
    let result = sqlx::query("DELETE FROM training_units WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .execute(pool)
        .await?;
    Ok(result.rows_affected() > 0)
}

// --- Training Queues ---

pub struct NewQueue {
    pub name: String,
    pub parameters: Json,
    pub created_by: CreatedBy,
}

/// Create a single queue: `order = max(existing) + 1` and bump unit.version
/// by one, in the same transaction.
pub async fn create_queue(
    pool: &PgPool,
    unit_id: TrainingUnitId,
    owner_id: PrincipalId,
    new: NewQueue,
) -> Result<Option<TrainingQueue>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let bumped = bump_unit_version(&mut tx, unit_id, owner_id).await?;
    if bumped.is_none() {
        tx.rollback().await?;
        return Ok(None);
    }

    let next_order = next_order_for_unit(&mut tx, unit_id).await?;
    let queue = sqlx::query_as::<_, TrainingQueue>(
        r#"
        INSERT INTO training_queues
            (id, unit_id, owner_id, name, parameters, "order", status, created_by, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, now(), now())
        RETURNING *
        "#,
    )
    .bind(TrainingQueueId::new())
    .bind(unit_id)
    .bind(owner_id)
    .bind(new.name)
    .bind(new.parameters)
    .bind(next_order)
    .bind(new.created_by)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(Some(queue))
}

/// Batch-create k queues with one version bump for the whole batch, not one
/// per child.
pub async fn batch_create_queues(
    pool: &PgPool,
    unit_id: TrainingUnitId,
    owner_id: PrincipalId,
    items: Vec<NewQueue>,
) -> Result<Option<Vec<TrainingQueue>>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let bumped = bump_unit_version(&mut tx, unit_id, owner_id).await?;
    if bumped.is_none() {
        tx.rollback().await?;
        return Ok(None);
    }

    let mut next_order = next_order_for_unit(&mut tx, unit_id).await?;
    let mut created = Vec::with_capacity(items.len());
    for item in items {
        let queue = sqlx::query_as::<_, TrainingQueue>(
            r#"
            INSERT INTO training_queues
                (id, unit_id, owner_id, name, parameters, "order", status, created_by, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, 'pending', $7, now(), now())
            RETURNING *
            "#,
        )
        .bind(TrainingQueueId::new())
        .bind(unit_id)
        .bind(owner_id)
        .bind(item.name)
        .bind(item.parameters)
        .bind(next_order)
        .bind(item.created_by)
        .fetch_one(&mut *tx)
        .await?;
        created.push(queue);
        next_order += 1;
    }

    tx.commit().await?;
    Ok(Some(created))
}

async fn bump_unit_version(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    unit_id: TrainingUnitId,
    owner_id: PrincipalId,
) -> Result<Option<()>, sqlx::Error> {
    let result = sqlx::query(
        "UPDATE training_units SET version = version + 1, updated_at = now() WHERE id = $1 AND owner_id = $2",
    )
    .bind(unit_id)
    .bind(owner_id)
    .execute(&mut **tx)
    .await?;
    Ok((result.rows_affected() > 0).then_some(()))
}

async fn next_order_for_unit(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    unit_id: TrainingUnitId,
) -> Result<i32, sqlx::Error> {
    let max_order: Option<i32> =
        sqlx::query_scalar("SELECT max(\"order\") FROM training_queues WHERE unit_id = $1")
            .bind(unit_id)
            .fetch_one(&mut **tx)
            .await?;
    Ok(max_order.map(|o| o + 1).unwrap_or(0))
}

pub async fn find_queue(
    pool: &PgPool,
    id: TrainingQueueId,
    owner_id: PrincipalId,
) -> Result<Option<TrainingQueue>, sqlx::Error> {
    sqlx::query_as::<_, TrainingQueue>("SELECT * FROM training_queues WHERE id = $1 AND owner_id = $2")
        .bind(id)
        .bind(owner_id)
        .fetch_optional(pool)
        .await
}

pub async fn list_queues_for_unit(
    pool: &PgPool,
    unit_id: TrainingUnitId,
    owner_id: PrincipalId,
    status: Option<QueueStatus>,
    page: &ValidatedPageParams,
) -> Result<(Vec<TrainingQueue>, i64), sqlx::Error> {
    let sort = validate_sort_column(&page.sort, QUEUE_SORT_COLUMNS);

    let total: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM training_queues WHERE unit_id = $1 AND owner_id = $2 AND ($3::queue_status IS NULL OR status = $3)",
    )
    .bind(unit_id)
    .bind(owner_id)
    .bind(status)
    .fetch_one(pool)
    .await?;

    // `sort` is allow-listed above; interpolation here is not injectable.
    // Quoted because `order` is itself a reserved SQL keyword.
    let query = format!(
        r#"
        SELECT * FROM training_queues
        WHERE unit_id = $1 AND owner_id = $2 AND ($3::queue_status IS NULL OR status = $3)
        ORDER BY "{sort}" ASC
        LIMIT $4 OFFSET $5
        "#
    );
    let items = sqlx::query_as::<_, TrainingQueue>(&query)
        .bind(unit_id)
        .bind(owner_id)
        .bind(status)
        .bind(page.limit)
        .bind(page.offset)
        .fetch_all(pool)
        .await?;

    Ok((items, total))
}

/// All queues of a unit ordered by `order asc` — the authoritative execution
/// order returned alongside a sync response.
pub async fn list_all_queues_ordered(
    pool: &PgPool,
    unit_id: TrainingUnitId,
) -> Result<Vec<TrainingQueue>, sqlx::Error> {
    sqlx::query_as::<_, TrainingQueue>(
        "SELECT * FROM training_queues WHERE unit_id = $1 ORDER BY \"order\" ASC",
    )
    .bind(unit_id)
    .fetch_all(pool)
    .await
}

pub struct QueueUpdate {
    pub name: Option<String>,
    pub parameters: Option<Json>,
}

/// Outcome of an operation gated on a queue's current status, so callers can
/// tell "not found" apart from "found but in the wrong state" without
/// overloading `sqlx::Error`.
pub enum GatedQueueOutcome<T> {
    Ok(T),
    NotFound,
    WrongStatus(QueueStatus),
}

/// Only `pending` queues may be updated; `order` is never touched here —
/// use `reorder_queues`.
pub async fn update_queue(
    pool: &PgPool,
    id: TrainingQueueId,
    owner_id: PrincipalId,
    update: QueueUpdate,
) -> Result<GatedQueueOutcome<TrainingQueue>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, TrainingQueue>(
        "SELECT * FROM training_queues WHERE id = $1 AND owner_id = $2",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(existing) = existing else {
        tx.rollback().await?;
        return Ok(GatedQueueOutcome::NotFound);
    };
    if existing.status != QueueStatus::Pending {
        tx.rollback().await?;
        return Ok(GatedQueueOutcome::WrongStatus(existing.status));
    }

    bump_unit_version(&mut tx, existing.unit_id, owner_id).await?;

    let updated = sqlx::query_as::<_, TrainingQueue>(
        r#"
        UPDATE training_queues
        SET name = COALESCE($2, name), parameters = COALESCE($3, parameters), updated_at = now()
        WHERE id = $1
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(update.name)
    .bind(update.parameters)
    .fetch_one(&mut *tx)
    .await?;

    tx.commit().await?;
    Ok(GatedQueueOutcome::Ok(updated))
}

/// `running` queues cannot be deleted. Does not compact remaining `order`
/// values — an accepted gap in contiguity.
pub async fn delete_queue(
    pool: &PgPool,
    id: TrainingQueueId,
    owner_id: PrincipalId,
) -> Result<GatedQueueOutcome<()>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let existing = sqlx::query_as::<_, TrainingQueue>(
        "SELECT * FROM training_queues WHERE id = $1 AND owner_id = $2",
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(&mut *tx)
    .await?;

    let Some(existing) = existing else {
        tx.rollback().await?;
        return Ok(GatedQueueOutcome::NotFound);
    };
    if existing.status == QueueStatus::Running {
        tx.rollback().await?;
        return Ok(GatedQueueOutcome::WrongStatus(existing.status));
    }

    bump_unit_version(&mut tx, existing.unit_id, owner_id).await?;
    sqlx::query("DELETE FROM training_queues WHERE id = $1")
        .bind(id)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(GatedQueueOutcome::Ok(()))
}

/// Permitted only from `pending`. Also sets the parent unit's status to
/// `running`.
pub async fn start_queue(
    pool: &PgPool,
    id: TrainingQueueId,
    owner_id: PrincipalId,
) -> Result<Option<TrainingQueue>, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let queue = sqlx::query_as::<_, TrainingQueue>(
        r#"
        UPDATE training_queues
        SET status = 'running', started_at = now(), updated_at = now()
        WHERE id = $1 AND owner_id = $2 AND status = 'pending'
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .fetch_optional(&mut *tx)
    .await?;

    if let Some(queue) = &queue {
        sqlx::query("UPDATE training_units SET status = 'running', updated_at = now() WHERE id = $1")
            .bind(queue.unit_id)
            .execute(&mut *tx)
            .await?;
    }

    tx.commit().await?;
    Ok(queue)
}

/// Does not restrict prior state — a completion can overwrite a queue in any
/// status, a hazard deliberately preserved.
pub async fn complete_queue(
    pool: &PgPool,
    id: TrainingQueueId,
    owner_id: PrincipalId,
    result: Option<Json>,
    metrics: Option<Json>,
) -> Result<Option<TrainingQueue>, sqlx::Error> {
    sqlx::query_as::<_, TrainingQueue>(
        r#"
        UPDATE training_queues
        SET status = 'completed', completed_at = now(), result = $3, metrics = $4, updated_at = now()
        WHERE id = $1 AND owner_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(result)
    .bind(metrics)
    .fetch_optional(pool)
    .await
}

pub async fn fail_queue(
    pool: &PgPool,
    id: TrainingQueueId,
    owner_id: PrincipalId,
    error_msg: String,
) -> Result<Option<TrainingQueue>, sqlx::Error> {
    sqlx::query_as::<_, TrainingQueue>(
        r#"
        UPDATE training_queues
        SET status = 'failed', completed_at = now(), error_msg = $3, updated_at = now()
        WHERE id = $1 AND owner_id = $2
        RETURNING *
        "#,
    )
    .bind(id)
    .bind(owner_id)
    .bind(error_msg)
    .fetch_optional(pool)
    .await
}

/// The reorder protocol, wrapped in a single transaction so either all new
/// orders apply or none do.
pub async fn reorder_queues(
    pool: &PgPool,
    unit_id: TrainingUnitId,
    owner_id: PrincipalId,
    queue_ids: Vec<TrainingQueueId>,
) -> Result<ReorderOutcome, sqlx::Error> {
    let mut tx = pool.begin().await?;

    let mut queues = Vec::with_capacity(queue_ids.len());
    for id in &queue_ids {
        let queue = sqlx::query_as::<_, TrainingQueue>(
            "SELECT * FROM training_queues WHERE id = $1 AND owner_id = $2",
        )
        .bind(*id)
        .bind(owner_id)
        .fetch_optional(&mut *tx)
        .await?;

        let Some(queue) = queue else {
            tx.rollback().await?;
            return Ok(ReorderOutcome::NotFound(*id));
        };
        if queue.unit_id != unit_id {
            tx.rollback().await?;
            return Ok(ReorderOutcome::CrossUnit(*id));
        }
        if queue.status != QueueStatus::Pending {
            tx.rollback().await?;
            return Ok(ReorderOutcome::NotPending(*id));
        }
        queues.push(queue);
    }

    let non_pending_count: i64 = sqlx::query_scalar(
        "SELECT count(*) FROM training_queues WHERE unit_id = $1 AND status != 'pending'",
    )
    .bind(unit_id)
    .fetch_one(&mut *tx)
    .await?;

    for (i, id) in queue_ids.iter().enumerate() {
        let new_order = non_pending_count as i32 + i as i32;
        sqlx::query("UPDATE training_queues SET \"order\" = $2, updated_at = now() WHERE id = $1")
            .bind(*id)
            .bind(new_order)
            .execute(&mut *tx)
            .await?;
    }

    let bumped = bump_unit_version(&mut tx, unit_id, owner_id).await?;
    if bumped.is_none() {
        tx.rollback().await?;
        return Ok(ReorderOutcome::UnitNotFound);
    }

    tx.commit().await?;
    Ok(ReorderOutcome::Ok)
}

pub enum ReorderOutcome {
    Ok,
    UnitNotFound,
    NotFound(TrainingQueueId),
    CrossUnit(TrainingQueueId),
    NotPending(TrainingQueueId),
}

/// `{need_sync, cloud_version, unit, queues}`.
pub struct SyncResult {
    pub need_sync: bool,
    pub cloud_version: i64,
    pub unit: TrainingUnit,
    pub queues: Vec<TrainingQueue>,
}

pub async fn sync_unit(
    pool: &PgPool,
    unit_id: TrainingUnitId,
    owner_id: PrincipalId,
    client_version: i64,
) -> Result<Option<SyncResult>, sqlx::Error> {
    let Some(unit) = find_unit(pool, unit_id, owner_id).await? else {
        return Ok(None);
    };
    let queues = list_all_queues_ordered(pool, unit_id).await?;

    Ok(Some(SyncResult {
        need_sync: unit.version > client_version,
        cloud_version: unit.version,
        unit,
        queues,
    }))
}

//! V2 hierarchy data model: Group → TrainingUnit → TrainingQueue.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;

use crate::common::Id;
use crate::domains::auth::principal::PrincipalId;

pub struct GroupMarker;
pub type GroupId = Id<GroupMarker>;

pub struct TrainingUnitMarker;
pub type TrainingUnitId = Id<TrainingUnitMarker>;

pub struct TrainingQueueMarker;
pub type TrainingQueueId = Id<TrainingQueueMarker>;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Group {
    pub id: GroupId,
    pub owner_id: PrincipalId,
    pub name: String,
    pub description: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "unit_status", rename_all = "snake_case")]
pub enum UnitStatus {
    Idle,
    Running,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "connection_status", rename_all = "snake_case")]
pub enum ConnectionStatus {
    Connected,
    Disconnected,
}

/// Invariants: `version` strictly increases on any mutation a client must
/// refresh for; `connection_status = connected` iff a heartbeat landed within
/// `T_live` (10s) of now — see [`super::store::coerce_liveness`].
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrainingUnit {
    pub id: TrainingUnitId,
    pub group_id: GroupId,
    pub owner_id: PrincipalId,
    pub name: String,
    pub description: Option<String>,
    pub config: Json,
    pub version: i64,
    pub status: UnitStatus,
    pub connection_status: ConnectionStatus,
    pub last_heartbeat: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "queue_status", rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    Running,
    Completed,
    Failed,
    Cancelled,
}

impl QueueStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            QueueStatus::Completed | QueueStatus::Failed | QueueStatus::Cancelled
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "created_by", rename_all = "snake_case")]
pub enum CreatedBy {
    Client,
    Web,
}

/// Invariants: `order` is unique per unit; non-terminal `pending` queues
/// occupy the highest-order suffix; `status = running => started_at` set;
/// terminal statuses => `completed_at` set.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct TrainingQueue {
    pub id: TrainingQueueId,
    pub unit_id: TrainingUnitId,
    pub owner_id: PrincipalId,
    pub name: String,
    pub parameters: Json,
    pub order: i32,
    pub status: QueueStatus,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub result: Option<Json>,
    pub metrics: Option<Json>,
    pub error_msg: Option<String>,
    pub created_by: CreatedBy,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

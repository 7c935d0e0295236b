//! Event fan-out and webhook sink registration.
//!
//! Delivery is asynchronous per sink: the triggering request (or worker
//! transition) spawns a detached dispatch task per matching sink rather than
//! blocking on it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value as Json;
use sqlx::PgPool;
use tracing::warn;

use crate::common::{Id, TaskId};
use crate::domains::auth::principal::PrincipalId;
use crate::domains::tasks::model::TaskStatus;

pub struct WebhookSinkMarker;
pub type WebhookSinkId = Id<WebhookSinkMarker>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskEventKind {
    Queued,
    Started,
    Completed,
    Failed,
    Cancelled,
}

impl TaskEventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskEventKind::Queued => "queued",
            TaskEventKind::Started => "started",
            TaskEventKind::Completed => "completed",
            TaskEventKind::Failed => "failed",
            TaskEventKind::Cancelled => "cancelled",
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct WebhookPayload {
    pub event: String,
    pub task_id: TaskId,
    pub status: TaskStatus,
    pub timestamp: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Json>,
}

/// A registered delivery target. `events` empty means "subscribe to all".
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct WebhookSink {
    pub id: WebhookSinkId,
    pub owner_id: PrincipalId,
    pub url: String,
    pub events: Vec<String>,
    pub active: bool,
    pub created_at: DateTime<Utc>,
}

impl WebhookSink {
    fn subscribes_to(&self, kind: TaskEventKind) -> bool {
        self.active && (self.events.is_empty() || self.events.iter().any(|e| e == kind.as_str()))
    }
}

pub struct NewWebhookSink {
    pub owner_id: PrincipalId,
    pub url: String,
    pub events: Vec<String>,
}

pub mod store {
    use super::*;

    pub async fn create(pool: &PgPool, new: NewWebhookSink) -> Result<WebhookSink, sqlx::Error> {
        sqlx::query_as::<_, WebhookSink>(
            r#"
            INSERT INTO webhook_sinks (id, owner_id, url, events, active, created_at)
            VALUES ($1, $2, $3, $4, true, now())
            RETURNING *
            "#,
        )
        .bind(WebhookSinkId::new())
        .bind(new.owner_id)
        .bind(new.url)
        .bind(new.events)
        .fetch_one(pool)
        .await
    }

    pub async fn list(pool: &PgPool, owner_id: PrincipalId) -> Result<Vec<WebhookSink>, sqlx::Error> {
        sqlx::query_as::<_, WebhookSink>(
            "SELECT * FROM webhook_sinks WHERE owner_id = $1 ORDER BY created_at DESC",
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await
    }

    /// Active sinks scoped to an owner, used by the dispatcher hot path.
    pub async fn list_active_for_owner(
        pool: &PgPool,
        owner_id: PrincipalId,
    ) -> Result<Vec<WebhookSink>, sqlx::Error> {
        sqlx::query_as::<_, WebhookSink>(
            "SELECT * FROM webhook_sinks WHERE owner_id = $1 AND active = true",
        )
        .bind(owner_id)
        .fetch_all(pool)
        .await
    }

    pub async fn delete(
        pool: &PgPool,
        id: WebhookSinkId,
        owner_id: PrincipalId,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM webhook_sinks WHERE id = $1 AND owner_id = $2")
            .bind(id)
            .bind(owner_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Fan out one task lifecycle event to every matching, active sink owned by
/// `owner_id`. Spawns one detached delivery task per sink so the caller
/// (request handler or scheduler worker) never blocks on network I/O.
pub fn dispatch_event(
    pool: PgPool,
    http: reqwest::Client,
    owner_id: PrincipalId,
    task_id: TaskId,
    kind: TaskEventKind,
    status: TaskStatus,
    result: Option<Json>,
    max_retries: u32,
) {
    tokio::spawn(async move {
        let sinks = match store::list_active_for_owner(&pool, owner_id).await {
            Ok(sinks) => sinks,
            Err(e) => {
                warn!(error = %e, "failed to load webhook sinks for fan-out");
                return;
            }
        };

        let payload = WebhookPayload {
            event: kind.as_str().to_string(),
            task_id,
            status,
            timestamp: Utc::now(),
            result,
        };

        for sink in sinks.into_iter().filter(|s| s.subscribes_to(kind)) {
            let http = http.clone();
            let payload = payload.clone();
            tokio::spawn(async move {
                deliver_with_retry(&http, &sink.url, &payload, max_retries).await;
            });
        }
    });
}

/// At-least-once delivery with `sleep = attempt^2 seconds` backoff. Gives up
/// silently after `max_retries` — receivers that never ack are an operator
/// concern, not a scheduler-blocking one.
async fn deliver_with_retry(
    http: &reqwest::Client,
    url: &str,
    payload: &WebhookPayload,
    max_retries: u32,
) {
    for attempt in 1..=max_retries.max(1) {
        match http.post(url).json(payload).send().await {
            Ok(resp) if resp.status().is_success() => return,
            Ok(resp) => {
                warn!(url, status = %resp.status(), attempt, "webhook delivery rejected");
            }
            Err(e) => {
                warn!(url, error = %e, attempt, "webhook delivery failed");
            }
        }

        if attempt < max_retries {
            let delay = std::time::Duration::from_secs((attempt * attempt) as u64);
            tokio::time::sleep(delay).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink(events: &[&str], active: bool) -> WebhookSink {
        WebhookSink {
            id: WebhookSinkId::new(),
            owner_id: PrincipalId::new(),
            url: "https://example.test/hook".into(),
            events: events.iter().map(|s| s.to_string()).collect(),
            active,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn empty_events_subscribes_to_all() {
        let s = sink(&[], true);
        assert!(s.subscribes_to(TaskEventKind::Completed));
        assert!(s.subscribes_to(TaskEventKind::Failed));
    }

    #[test]
    fn filtered_events_subscribe_selectively() {
        let s = sink(&["completed"], true);
        assert!(s.subscribes_to(TaskEventKind::Completed));
        assert!(!s.subscribes_to(TaskEventKind::Failed));
    }

    #[test]
    fn inactive_sink_never_subscribes() {
        let s = sink(&[], false);
        assert!(!s.subscribes_to(TaskEventKind::Completed));
    }
}

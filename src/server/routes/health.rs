//! `/health` — reports store and queue-index connectivity, not itself
//! rate-limited or authenticated.

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use crate::server::state::AppState;

#[derive(Serialize)]
pub struct HealthResponse {
    status: String,
    database: ComponentHealth,
    queue_index: ComponentHealth,
}

#[derive(Serialize)]
pub struct ComponentHealth {
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<HealthResponse>) {
    let db_health = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        sqlx::query("SELECT 1").execute(&state.db),
    )
    .await
    {
        Ok(Ok(_)) => ComponentHealth { status: "ok".into(), error: None },
        Ok(Err(e)) => ComponentHealth { status: "error".into(), error: Some(e.to_string()) },
        Err(_) => ComponentHealth { status: "error".into(), error: Some("query timeout (>5s)".into()) },
    };

    let mut redis = state.redis.clone();
    let redis_health = match tokio::time::timeout(
        std::time::Duration::from_secs(5),
        redis::cmd("PING").query_async::<_, String>(&mut redis),
    )
    .await
    {
        Ok(Ok(_)) => ComponentHealth { status: "ok".into(), error: None },
        Ok(Err(e)) => ComponentHealth { status: "error".into(), error: Some(e.to_string()) },
        Err(_) => ComponentHealth { status: "error".into(), error: Some("ping timeout (>5s)".into()) },
    };

    let healthy = db_health.status == "ok" && redis_health.status == "ok";
    let status_code = if healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    (
        status_code,
        Json(HealthResponse {
            status: if healthy { "healthy" } else { "unhealthy" }.to_string(),
            database: db_health,
            queue_index: redis_health,
        }),
    )
}

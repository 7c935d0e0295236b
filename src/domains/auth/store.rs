//! Principal lookups against the durable store.

use super::principal::Principal;
use sqlx::PgPool;

/// Resolve a bearer token by exact match against `principals.api_key`.
///
/// Mismatch or absence is `Ok(None)`; the caller maps that to
/// `ApiError::InvalidToken`.
pub async fn find_by_api_key(pool: &PgPool, api_key: &str) -> Result<Option<Principal>, sqlx::Error> {
    sqlx::query_as::<_, Principal>(
        r#"
        SELECT id, email, api_key, tier
        FROM principals
        WHERE api_key = $1
        "#,
    )
    .bind(api_key)
    .fetch_optional(pool)
    .await
}

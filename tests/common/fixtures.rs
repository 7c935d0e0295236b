//! Row fixtures for integration tests.

use mlqueue_core::domains::auth::principal::{PrincipalId, Tier};
use sqlx::PgPool;
use uuid::Uuid;

/// Insert a principal with a random api key and return `(id, api_key)`.
pub async fn insert_principal(pool: &PgPool, tier: Tier) -> (PrincipalId, String) {
    let id = PrincipalId::new();
    let api_key = format!("test_{}", Uuid::new_v4());
    let email = format!("{}@example.test", Uuid::new_v4());

    sqlx::query("INSERT INTO principals (id, email, api_key, tier) VALUES ($1, $2, $3, $4)")
        .bind(id)
        .bind(email)
        .bind(&api_key)
        .bind(tier)
        .execute(pool)
        .await
        .expect("failed to insert test principal");

    (id, api_key)
}

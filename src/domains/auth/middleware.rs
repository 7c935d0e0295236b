//! Axum middleware wiring the identity & quota gate in front of every
//! mutating endpoint and every read beyond `/health`.

use axum::extract::{Extension, Request, State};
use axum::middleware::Next;
use axum::response::Response;

use super::principal::Principal;
use super::quota::QuotaClass;
use super::store::find_by_api_key;
use crate::common::ApiError;
use crate::server::state::AppState;

/// The authenticated principal, inserted into request extensions by
/// [`auth_middleware`] for downstream handlers to extract.
#[derive(Clone)]
pub struct AuthedPrincipal(pub Principal);

/// Resolve `Authorization: Bearer <token>` against the principal table.
///
/// Missing header -> `AUTH_REQUIRED`; present-but-unknown token ->
/// `INVALID_TOKEN`. Both are 401s.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let header = request
        .headers()
        .get(axum::http::header::AUTHORIZATION)
        .ok_or(ApiError::AuthRequired)?;
    let header = header.to_str().map_err(|_| ApiError::InvalidToken)?;
    let token = header.strip_prefix("Bearer ").ok_or(ApiError::InvalidToken)?;

    let principal = find_by_api_key(&state.db, token)
        .await?
        .ok_or(ApiError::InvalidToken)?;

    request.extensions_mut().insert(AuthedPrincipal(principal));
    Ok(next.run(request).await)
}

/// Per-route quota check. `class` selects the limit tier: batch endpoints
/// always use the batch class regardless of principal tier; everyone else
/// uses their tier's class.
pub fn quota_middleware(
    class_override: Option<QuotaClass>,
) -> impl Fn(State<AppState>, Request, Next) -> futures::future::BoxFuture<'static, Result<Response, ApiError>>
       + Clone {
    move |State(state): State<AppState>, request: Request, next: Next| {
        let class_override = class_override;
        Box::pin(async move {
            let principal = request
                .extensions()
                .get::<AuthedPrincipal>()
                .map(|p| p.0.clone())
                .ok_or(ApiError::AuthRequired)?;

            let class = class_override.unwrap_or(match principal.tier {
                super::principal::Tier::Premium => QuotaClass::Premium,
                super::principal::Tier::Standard => QuotaClass::Standard,
            });

            let mut redis = state.redis.clone();
            state
                .quota
                .check_and_record(&mut redis, &principal.id.to_string(), class)
                .await?;

            Ok(next.run(request).await)
        })
    }
}

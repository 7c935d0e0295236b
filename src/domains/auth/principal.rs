//! Principal identity: `Principal {id, email, api_key, tier}`.

use crate::common::Id;
use serde::{Deserialize, Serialize};

/// Marker type for `Id<PrincipalMarker>`.
pub struct PrincipalMarker;

pub type PrincipalId = Id<PrincipalMarker>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(type_name = "tier", rename_all = "snake_case")]
pub enum Tier {
    Standard,
    Premium,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct Principal {
    pub id: PrincipalId,
    pub email: String,
    pub api_key: String,
    pub tier: Tier,
}

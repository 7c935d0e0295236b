//! Offset-based list pagination with a common query-string convention:
//! `limit` (default 100), `offset`, `sort` (default `created_at`).
//!
//! Every REST list endpoint here returns a flat `{items, total}` page rather
//! than a cursor-based connection.

use serde::{Deserialize, Serialize};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 500;

/// Raw query-string pagination parameters.
#[derive(Debug, Clone, Deserialize)]
pub struct PageParams {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
    pub sort: Option<String>,
}

impl PageParams {
    /// Clamp to `[1, MAX_LIMIT]`, default `offset` to 0, default `sort` to `created_at`.
    pub fn validated(&self) -> ValidatedPageParams {
        let limit = self.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
        let offset = self.offset.unwrap_or(0).max(0);
        let sort = self
            .sort
            .clone()
            .unwrap_or_else(|| "created_at".to_string());
        ValidatedPageParams {
            limit,
            offset,
            sort,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ValidatedPageParams {
    pub limit: i64,
    pub offset: i64,
    pub sort: String,
}

/// A page of results alongside the total row count (for client-side pagination UI).
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
}

impl<T> Page<T> {
    pub fn new(items: Vec<T>, total: i64, params: &ValidatedPageParams) -> Self {
        Self {
            items,
            total,
            limit: params.limit,
            offset: params.offset,
        }
    }
}

/// Allow-list a sort column against a fixed set of known-safe names, since
/// `sort` arrives as free text and is interpolated into SQL order-by clauses.
pub fn validate_sort_column<'a>(sort: &'a str, allowed: &[&'a str]) -> &'a str {
    allowed.iter().find(|a| **a == sort).copied().unwrap_or("created_at")
}

//! Identity & quota gate: resolves bearer tokens to principals and meters
//! requests per sliding window.

pub mod middleware;
pub mod principal;
pub mod quota;
pub mod store;

pub use middleware::{auth_middleware, quota_middleware, AuthedPrincipal};
pub use principal::{Principal, PrincipalMarker, Tier};
pub use quota::{QuotaClass, QuotaLimits, SlidingWindowLimiter};

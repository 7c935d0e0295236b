//! V1: cloud-dispatch priority-queue task execution.
//!
//! Durable store (`store`, `model`) + priority index (`queue_index`) +
//! worker pool (`scheduler`) + REST API (`routes`) + event fan-out
//! (`webhooks`).

pub mod model;
pub mod queue_index;
pub mod routes;
pub mod scheduler;
pub mod store;
pub mod webhooks;

pub use model::{Task, TaskStatus};

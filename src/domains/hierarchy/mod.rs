//! V2: client-driven Group → TrainingUnit → TrainingQueue hierarchy with
//! version-cursor sync and heartbeat liveness.

pub mod model;
pub mod routes;
pub mod store;

pub use model::{Group, TrainingQueue, TrainingUnit};

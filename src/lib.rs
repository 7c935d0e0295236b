// MLQueue core — dual execution-control subsystem for queued ML training jobs.
//
// V1 is a cloud-dispatch model: the service itself pulls work off a shared
// priority queue and drives it through a worker pool. V2 is client-driven:
// external processes own execution while this crate owns ordering, state,
// and synchronization metadata. Both sit behind a shared identity/quota gate.

pub mod common;
pub mod config;
pub mod domains;
pub mod kernel;
pub mod server;

pub use config::Config;

//! Infrastructure layer: database pool, queue-index connection, process-local
//! scheduler controls. Business rules live in `domains::*`.

pub mod db;
pub mod pause;
pub mod redis_conn;

pub use pause::PauseFlag;
pub use redis_conn::RedisConn;

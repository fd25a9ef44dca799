//! Custom Resource Definitions (CRDs) for redis-operator.
//!
//! - `RedisReplication`: Deploy and manage a Redis master/replica topology,
//!   optionally with a sentinel tier

mod redis_replication;

pub use redis_replication::*;

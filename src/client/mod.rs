//! Redis client module for replication and sentinel management.
//!
//! This module provides a thin wrapper around the `fred` Redis client for
//! the handful of commands the controller issues against individual nodes.
//!
//! ## Architecture
//!
//! - `redis_client`: single-node client (INFO, REPLICAOF, SENTINEL)
//! - `parsing`: pure parsers for INFO and sentinel replies
//! - `types`: roles and connection settings
//!
//! ## Example
//!
//! ```rust,ignore
//! use redis_operator::client::RedisClient;
//!
//! let client = RedisClient::connect_single("10.0.0.7", 6379, Some("pw")).await?;
//! let info = client.info_replication().await?;
//! client.close().await?;
//! ```

pub mod parsing;
pub mod redis_client;
pub mod types;

pub use parsing::{ParseError, ReplicationInfo};
pub use redis_client::{RedisClient, RedisError};
pub use types::{NodeRole, RedisTarget, SentinelMaster};

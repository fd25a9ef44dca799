//! Store-protocol operations used by the controller.
//!
//! Redis nodes are addressed by pod IP plus the shared [`RedisTarget`];
//! sentinels by pod IP alone, always on [`SENTINEL_PORT`] without AUTH.
//! The monitored group is always [`SENTINEL_MASTER_NAME`].

use async_trait::async_trait;
use tracing::debug;

use crate::client::{RedisClient, RedisError, RedisTarget, SentinelMaster};
use crate::controller::error::{Error, Result};
use crate::crd::{SENTINEL_MASTER_NAME, SENTINEL_PORT};

#[async_trait]
pub trait RedisOps: Send + Sync {
    /// Raw `INFO replication` text of a Redis node
    async fn info_replication(&self, host: &str, target: &RedisTarget) -> Result<String>;

    /// Promote a Redis node to master
    async fn replica_of_no_one(&self, host: &str, target: &RedisTarget) -> Result<()>;

    /// Point a Redis node at `master_host` on the target's port
    async fn replica_of(&self, host: &str, target: &RedisTarget, master_host: &str)
    -> Result<()>;

    /// Master address the sentinel at `sentinel_host` monitors, if any
    async fn sentinel_get_master_addr(&self, sentinel_host: &str)
    -> Result<Option<SentinelMaster>>;

    async fn sentinel_remove(&self, sentinel_host: &str) -> Result<()>;

    async fn sentinel_monitor(
        &self,
        sentinel_host: &str,
        master_host: &str,
        master_port: u16,
        quorum: i32,
    ) -> Result<()>;

    async fn sentinel_set_auth_pass(&self, sentinel_host: &str, password: &str) -> Result<()>;
}

/// [`RedisOps`] over short-lived fred connections.
///
/// Every call opens its own connection and closes it before returning.
#[derive(Debug, Default, Clone, Copy)]
pub struct FredRedisOps;

impl FredRedisOps {
    pub fn new() -> Self {
        Self
    }

    async fn connect(&self, host: &str, port: u16, password: Option<&str>) -> Result<RedisClient> {
        RedisClient::connect_single(host, port, password)
            .await
            .map_err(|e| Error::redis(format!("{host}:{port}"), e))
    }

    async fn redis(&self, host: &str, target: &RedisTarget) -> Result<RedisClient> {
        self.connect(host, target.port, target.password.as_deref())
            .await
    }

    async fn sentinel(&self, host: &str) -> Result<RedisClient> {
        self.connect(host, SENTINEL_PORT, None).await
    }
}

/// Close `client` and attach its address to any command error.
async fn finish<T>(client: RedisClient, result: Result<T, RedisError>) -> Result<T> {
    let address = client.address();
    if let Err(e) = client.close().await {
        debug!(node = %address, error = %e, "Failed to close connection");
    }
    result.map_err(|e| Error::redis(address, e))
}

#[async_trait]
impl RedisOps for FredRedisOps {
    async fn info_replication(&self, host: &str, target: &RedisTarget) -> Result<String> {
        let client = self.redis(host, target).await?;
        let result = client.info_replication().await;
        finish(client, result).await
    }

    async fn replica_of_no_one(&self, host: &str, target: &RedisTarget) -> Result<()> {
        let client = self.redis(host, target).await?;
        let result = client.replica_of_no_one().await;
        finish(client, result).await
    }

    async fn replica_of(
        &self,
        host: &str,
        target: &RedisTarget,
        master_host: &str,
    ) -> Result<()> {
        let client = self.redis(host, target).await?;
        let result = client.replica_of(master_host, target.port).await;
        finish(client, result).await
    }

    async fn sentinel_get_master_addr(
        &self,
        sentinel_host: &str,
    ) -> Result<Option<SentinelMaster>> {
        let client = self.sentinel(sentinel_host).await?;
        let result = client.sentinel_get_master_addr(SENTINEL_MASTER_NAME).await;
        finish(client, result).await
    }

    async fn sentinel_remove(&self, sentinel_host: &str) -> Result<()> {
        let client = self.sentinel(sentinel_host).await?;
        let result = client.sentinel_remove(SENTINEL_MASTER_NAME).await;
        finish(client, result).await
    }

    async fn sentinel_monitor(
        &self,
        sentinel_host: &str,
        master_host: &str,
        master_port: u16,
        quorum: i32,
    ) -> Result<()> {
        let client = self.sentinel(sentinel_host).await?;
        let result = client
            .sentinel_monitor(SENTINEL_MASTER_NAME, master_host, master_port, quorum)
            .await;
        finish(client, result).await
    }

    async fn sentinel_set_auth_pass(&self, sentinel_host: &str, password: &str) -> Result<()> {
        let client = self.sentinel(sentinel_host).await?;
        let result = client
            .sentinel_set_auth_pass(SENTINEL_MASTER_NAME, password)
            .await;
        finish(client, result).await
    }
}

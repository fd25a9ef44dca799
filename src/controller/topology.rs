//! Role-changing commands.
//!
//! Every mutation here is safe to repeat: promoting a master or
//! re-pointing a replica at the master it already follows changes nothing.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::info;

use crate::client::RedisTarget;
use crate::controller::error::{Error, Result};
use crate::controller::pods::{pod_ip, sort_by_age};
use crate::controller::redis_ops::RedisOps;

/// Issues role changes to Redis nodes and monitor changes to sentinels.
pub struct TopologyMutator<'a> {
    redis: &'a dyn RedisOps,
    target: &'a RedisTarget,
}

impl<'a> TopologyMutator<'a> {
    pub fn new(redis: &'a dyn RedisOps, target: &'a RedisTarget) -> Self {
        Self { redis, target }
    }

    /// Promote the node at `ip`.
    pub async fn set_as_master(&self, ip: &str) -> Result<()> {
        info!(node = %ip, "Promoting node to master");
        self.redis.replica_of_no_one(ip, self.target).await
    }

    /// Make the node at `ip` replicate `master_ip`.
    pub async fn set_as_slave(&self, ip: &str, master_ip: &str) -> Result<()> {
        info!(node = %ip, master = %master_ip, "Attaching node as replica");
        self.redis.replica_of(ip, self.target, master_ip).await
    }

    /// Point the sentinel at `sentinel_ip` at `master_ip`.
    ///
    /// Any existing group is removed first. The group's auth-pass is set when
    /// the Redis tier has a password.
    pub async fn set_sentinel_monitor(
        &self,
        sentinel_ip: &str,
        master_ip: &str,
        quorum: i32,
    ) -> Result<()> {
        info!(sentinel = %sentinel_ip, master = %master_ip, quorum, "Setting sentinel monitor");
        self.redis.sentinel_remove(sentinel_ip).await?;
        self.redis
            .sentinel_monitor(sentinel_ip, master_ip, self.target.port, quorum)
            .await?;
        if let Some(password) = self.target.password.as_deref() {
            self.redis
                .sentinel_set_auth_pass(sentinel_ip, password)
                .await?;
        }
        Ok(())
    }

    /// Bootstrap election: the oldest pod becomes master and every other pod
    /// replicates it, in age order. Existing roles are overridden.
    ///
    /// Returns the elected master's address. Stops at the first failure.
    pub async fn set_oldest_as_master(&self, mut pods: Vec<Pod>) -> Result<String> {
        sort_by_age(&mut pods);
        let mut nodes = pods
            .iter()
            .filter_map(|pod| pod_ip(pod).map(|ip| (pod.name_any(), ip)));

        let (master_pod, master_ip) = nodes.next().ok_or(Error::NoReadyPods)?;
        info!(pod = %master_pod, node = %master_ip, "Electing oldest pod as master");
        self.set_as_master(master_ip).await?;

        for (_, ip) in nodes {
            self.set_as_slave(ip, master_ip).await?;
        }
        Ok(master_ip.to_string())
    }
}

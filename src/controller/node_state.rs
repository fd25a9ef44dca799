//! Live topology queries against Redis and sentinel processes.
//!
//! Roles are always read from the nodes themselves. Pod labels are never
//! consulted.

use k8s_openapi::api::core::v1::Pod;
use tracing::debug;

use crate::client::{RedisError, RedisTarget, ReplicationInfo, SentinelMaster};
use crate::controller::error::{Error, Result};
use crate::controller::pods::pod_ip;
use crate::controller::redis_ops::RedisOps;
use crate::crd::RedisReplication;
use crate::resources::configmap::UNSET_MONITOR_ADDRESS;

/// Connection target for the Redis tier of `obj`.
pub fn redis_target(obj: &RedisReplication) -> Result<RedisTarget> {
    let port = obj.spec.redis_port().map_err(Error::Validation)?;
    Ok(RedisTarget::new(
        port,
        obj.spec.password().map(str::to_string),
    ))
}

/// What a sentinel reports for the monitored group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MonitorRecord {
    /// Nothing configured yet: no group, or the placeholder address.
    Unset,
    Master(SentinelMaster),
}

impl MonitorRecord {
    /// Interpret a `get-master-addr-by-name` reply.
    pub fn from_reply(reply: Option<SentinelMaster>) -> Self {
        match reply {
            Some(master) if master.host != UNSET_MONITOR_ADDRESS && !master.host.is_empty() => {
                MonitorRecord::Master(master)
            }
            _ => MonitorRecord::Unset,
        }
    }

    /// The monitored address, unless unset.
    pub fn address(&self) -> Option<&str> {
        match self {
            MonitorRecord::Unset => None,
            MonitorRecord::Master(master) => Some(&master.host),
        }
    }

    /// Whether this record already points at `master_ip`.
    pub fn points_at(&self, master_ip: &str) -> bool {
        self.address() == Some(master_ip)
    }
}

/// Reads replication and monitor facts from live nodes.
pub struct NodeStateReader<'a> {
    redis: &'a dyn RedisOps,
    target: &'a RedisTarget,
}

impl<'a> NodeStateReader<'a> {
    pub fn new(redis: &'a dyn RedisOps, target: &'a RedisTarget) -> Self {
        Self { redis, target }
    }

    fn address(&self, ip: &str) -> String {
        format!("{ip}:{}", self.target.port)
    }

    fn parse(&self, ip: &str, info: &str) -> Result<ReplicationInfo> {
        ReplicationInfo::parse(info)
            .map_err(|e| Error::redis(self.address(ip), RedisError::Parse(e)))
    }

    /// Whether the node at `ip` reports `role:master`.
    pub async fn is_master(&self, ip: &str) -> Result<bool> {
        let info = self.redis.info_replication(ip, self.target).await?;
        Ok(self.parse(ip, &info)?.is_master())
    }

    /// Addresses of the pods whose node currently reports `role:master`.
    ///
    /// The first failing query aborts the scan.
    pub async fn get_master_ips(&self, pods: &[Pod]) -> Result<Vec<String>> {
        let mut masters = Vec::new();
        for ip in pods.iter().filter_map(pod_ip) {
            if self.is_master(ip).await? {
                masters.push(ip.to_string());
            }
        }
        debug!(masters = ?masters, "Observed masters");
        Ok(masters)
    }

    /// Address the node at `ip` currently follows, or `None` if it follows
    /// nothing (masters, or replicas not yet attached).
    pub async fn get_replication_of_master_host(&self, ip: &str) -> Result<Option<String>> {
        let info = self.redis.info_replication(ip, self.target).await?;
        let replication = self.parse(ip, &info)?;
        debug!(
            node = %ip,
            master = ?replication.master_host,
            master_port = ?replication.master_port,
            link = ?replication.master_link_status,
            "Read replication state"
        );
        Ok(replication.master_host)
    }

    /// Monitor record of the sentinel at `sentinel_ip`.
    pub async fn get_sentinel_monitor(&self, sentinel_ip: &str) -> Result<MonitorRecord> {
        let reply = self.redis.sentinel_get_master_addr(sentinel_ip).await?;
        Ok(MonitorRecord::from_reply(reply))
    }
}

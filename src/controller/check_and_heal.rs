//! Master-count consistency check and healing.
//!
//! The decision is a pure function of phase, mode and the number of nodes
//! reporting `role:master`:
//!
//! | masters | creating  | running, master-slave | running, sentinel        |
//! |---------|-----------|-----------------------|--------------------------|
//! | 0       | bootstrap | `NoMaster`            | `MasterBeingElected`     |
//! | 1       | converged | converged             | converged                |
//! | ≥2      | bootstrap | `MultipleMasters`     | demote to endorsed master|
//!
//! Any phase other than `creating` follows the running columns.

use tracing::{info, warn};

use crate::controller::error::{Error, Result};
use crate::controller::kube_ops::KubeOps;
use crate::controller::node_state::{NodeStateReader, redis_target};
use crate::controller::pods::{pod_ip, ready_redis_pods, ready_sentinel_pods};
use crate::controller::redis_ops::RedisOps;
use crate::controller::topology::TopologyMutator;
use crate::crd::{ClusterMode, RedisPhase, RedisReplication};

/// What the checker decided to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealPlan {
    /// Exactly one master.
    Converged,
    /// Elect the oldest ready pod, overriding every existing role.
    Bootstrap,
    /// Plain mode lost its master.
    NoMaster,
    /// Sentinels are expected to promote a replica.
    MasterBeingElected,
    /// Plain mode split-brain.
    MultipleMasters,
    /// Demote every master except the one the sentinels endorse.
    DemoteToEndorsed,
}

pub fn plan_heal(phase: RedisPhase, mode: ClusterMode, master_count: usize) -> HealPlan {
    if master_count == 1 {
        return HealPlan::Converged;
    }
    if phase == RedisPhase::Creating {
        return HealPlan::Bootstrap;
    }
    match (mode, master_count) {
        (ClusterMode::Sentinel, 0) => HealPlan::MasterBeingElected,
        (ClusterMode::Sentinel, _) => HealPlan::DemoteToEndorsed,
        (_, 0) => HealPlan::NoMaster,
        (_, _) => HealPlan::MultipleMasters,
    }
}

/// Result of a successful check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealOutcome {
    /// Nothing to do.
    Converged,
    /// A bootstrap election ran.
    Bootstrapped { master: String },
    /// Extra masters were attached to the endorsed one.
    Demoted {
        endorsed: String,
        demoted: Vec<String>,
    },
}

/// Runs the consistency check and, where allowed, heals.
pub struct ConsistencyChecker<'a> {
    kube: &'a dyn KubeOps,
    redis: &'a dyn RedisOps,
}

impl<'a> ConsistencyChecker<'a> {
    pub fn new(kube: &'a dyn KubeOps, redis: &'a dyn RedisOps) -> Self {
        Self { kube, redis }
    }

    /// Check the master count of `obj` given its current `phase`.
    pub async fn check_and_heal(
        &self,
        obj: &RedisReplication,
        phase: RedisPhase,
    ) -> Result<HealOutcome> {
        let target = redis_target(obj)?;
        let reader = NodeStateReader::new(self.redis, &target);
        let mutator = TopologyMutator::new(self.redis, &target);

        let pods = ready_redis_pods(self.kube, obj).await?;
        let masters = reader.get_master_ips(&pods).await?;
        let plan = plan_heal(phase, obj.spec.cluster_mode, masters.len());
        info!(masters = masters.len(), phase = %phase, plan = ?plan, "Checked number of masters");

        match plan {
            HealPlan::Converged => Ok(HealOutcome::Converged),
            HealPlan::Bootstrap => {
                let master = mutator.set_oldest_as_master(pods).await?;
                Ok(HealOutcome::Bootstrapped { master })
            }
            HealPlan::NoMaster => Err(Error::NoMaster),
            HealPlan::MasterBeingElected => Err(Error::MasterBeingElected),
            HealPlan::MultipleMasters => Err(Error::MultipleMasters(masters.len())),
            HealPlan::DemoteToEndorsed => {
                let Some(endorsed) = self.endorsed_master(obj, &reader).await? else {
                    // No sentinel has a real address yet
                    warn!(masters = ?masters, "Split brain without an endorsed master");
                    return Err(Error::MasterBeingElected);
                };
                let mut demoted = Vec::new();
                for master in masters.iter().filter(|m| **m != endorsed) {
                    mutator.set_as_slave(master, &endorsed).await?;
                    demoted.push(master.clone());
                }
                warn!(endorsed = %endorsed, demoted = ?demoted, "Healed split brain");
                Ok(HealOutcome::Demoted { endorsed, demoted })
            }
        }
    }

    /// First real address reported by a ready sentinel, in listing order.
    ///
    /// Sentinels reporting the unset marker are skipped. The remaining
    /// sentinels are not consulted once one answers.
    async fn endorsed_master(
        &self,
        obj: &RedisReplication,
        reader: &NodeStateReader<'_>,
    ) -> Result<Option<String>> {
        for pod in ready_sentinel_pods(self.kube, obj).await? {
            let Some(ip) = pod_ip(&pod) else {
                continue;
            };
            if let Some(address) = reader.get_sentinel_monitor(ip).await?.address() {
                return Ok(Some(address.to_string()));
            }
        }
        Ok(None)
    }
}

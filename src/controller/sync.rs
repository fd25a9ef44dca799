//! Sync orchestration.
//!
//! Each cluster mode maps to a fixed list of steps. A pass runs the list in
//! order and stops at the first failing step, returning its error as-is.

use tracing::{debug, instrument};

use crate::controller::check_and_heal::{ConsistencyChecker, HealOutcome};
use crate::controller::ensure::Ensure;
use crate::controller::error::{Error, Result};
use crate::controller::kube_ops::KubeOps;
use crate::controller::redis_ops::RedisOps;
use crate::crd::{ClusterMode, RedisPhase, RedisReplication};

/// One step of a sync pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncStep {
    EnsureConfigMaps,
    EnsureStatefulSet,
    EnsureRedisPodsReady,
    EnsurePodOwners,
    EnsureServices,
    CheckAndHeal,
    EnsureReplicasFollowMaster,
    EnsureRoleLabels,
    EnsureSentinelDeployment,
    EnsureSentinelPodsReady,
    EnsureSentinelMonitors,
}

impl SyncStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStep::EnsureConfigMaps => "ensure_config_maps",
            SyncStep::EnsureStatefulSet => "ensure_stateful_set",
            SyncStep::EnsureRedisPodsReady => "ensure_redis_pods_ready",
            SyncStep::EnsurePodOwners => "ensure_pod_owners",
            SyncStep::EnsureServices => "ensure_services",
            SyncStep::CheckAndHeal => "check_and_heal",
            SyncStep::EnsureReplicasFollowMaster => "ensure_replicas_follow_master",
            SyncStep::EnsureRoleLabels => "ensure_role_labels",
            SyncStep::EnsureSentinelDeployment => "ensure_sentinel_deployment",
            SyncStep::EnsureSentinelPodsReady => "ensure_sentinel_pods_ready",
            SyncStep::EnsureSentinelMonitors => "ensure_sentinel_monitors",
        }
    }
}

impl std::fmt::Display for SyncStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Plain master/replica pipeline.
pub const MASTER_SLAVE_PIPELINE: &[SyncStep] = &[
    SyncStep::EnsureConfigMaps,
    SyncStep::EnsureStatefulSet,
    SyncStep::EnsureRedisPodsReady,
    SyncStep::EnsurePodOwners,
    SyncStep::EnsureServices,
    SyncStep::CheckAndHeal,
    SyncStep::EnsureReplicasFollowMaster,
    SyncStep::EnsureRoleLabels,
];

/// The plain pipeline followed by the sentinel tier.
pub const SENTINEL_PIPELINE: &[SyncStep] = &[
    SyncStep::EnsureConfigMaps,
    SyncStep::EnsureStatefulSet,
    SyncStep::EnsureRedisPodsReady,
    SyncStep::EnsurePodOwners,
    SyncStep::EnsureServices,
    SyncStep::CheckAndHeal,
    SyncStep::EnsureReplicasFollowMaster,
    SyncStep::EnsureRoleLabels,
    SyncStep::EnsureSentinelDeployment,
    SyncStep::EnsureSentinelPodsReady,
    SyncStep::EnsureSentinelMonitors,
    SyncStep::EnsureReplicasFollowMaster,
];

/// Steps for `mode`. `cluster` is not managed.
pub fn pipeline(mode: ClusterMode) -> Result<&'static [SyncStep]> {
    match mode {
        ClusterMode::MasterSlave => Ok(MASTER_SLAVE_PIPELINE),
        ClusterMode::Sentinel => Ok(SENTINEL_PIPELINE),
        ClusterMode::Cluster => Err(Error::UnsupportedMode(mode.to_string())),
    }
}

/// What a successful pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    /// Steps completed, in order.
    pub completed: Vec<SyncStep>,
    /// Outcome of the consistency check.
    pub heal: Option<HealOutcome>,
    /// Replicas re-pointed at the master, over all wiring steps.
    pub replicas_repointed: usize,
    /// Sentinels whose monitor was reset.
    pub sentinels_reconfigured: usize,
}

/// Runs the pipeline for one object.
pub struct Syncer<'a> {
    ensure: Ensure<'a>,
    checker: ConsistencyChecker<'a>,
}

impl<'a> Syncer<'a> {
    pub fn new(kube: &'a dyn KubeOps, redis: &'a dyn RedisOps) -> Self {
        Self {
            ensure: Ensure::new(kube, redis),
            checker: ConsistencyChecker::new(kube, redis),
        }
    }

    /// Run every step for the object's mode. `phase` is the phase recorded
    /// for this pass and only steers the consistency check.
    #[instrument(skip_all, fields(mode = %obj.spec.cluster_mode, phase = %phase))]
    pub async fn sync(&self, obj: &RedisReplication, phase: RedisPhase) -> Result<SyncReport> {
        let steps = pipeline(obj.spec.cluster_mode)?;
        let mut report = SyncReport::default();

        for step in steps {
            debug!(step = %step, "Running sync step");
            if let Err(e) = self.run_step(*step, obj, phase, &mut report).await {
                debug!(step = %step, error = %e, "Sync step failed");
                return Err(e);
            }
            report.completed.push(*step);
        }
        Ok(report)
    }

    async fn run_step(
        &self,
        step: SyncStep,
        obj: &RedisReplication,
        phase: RedisPhase,
        report: &mut SyncReport,
    ) -> Result<()> {
        match step {
            SyncStep::EnsureConfigMaps => self.ensure.ensure_config_maps(obj).await,
            SyncStep::EnsureStatefulSet => self.ensure.ensure_stateful_set(obj).await,
            SyncStep::EnsureRedisPodsReady => self.ensure.ensure_redis_pods_ready(obj).await,
            SyncStep::EnsurePodOwners => self.ensure.ensure_pod_owners(obj).await,
            SyncStep::EnsureServices => self.ensure.ensure_services(obj).await,
            SyncStep::CheckAndHeal => {
                report.heal = Some(self.checker.check_and_heal(obj, phase).await?);
                Ok(())
            }
            SyncStep::EnsureReplicasFollowMaster => {
                report.replicas_repointed += self.ensure.ensure_replicas_follow_master(obj).await?;
                Ok(())
            }
            SyncStep::EnsureRoleLabels => self.ensure.ensure_role_labels(obj).await,
            SyncStep::EnsureSentinelDeployment => {
                self.ensure.ensure_sentinel_deployment(obj).await
            }
            SyncStep::EnsureSentinelPodsReady => {
                self.ensure.ensure_sentinel_pods_ready(obj).await
            }
            SyncStep::EnsureSentinelMonitors => {
                report.sentinels_reconfigured += self.ensure.ensure_sentinel_monitors(obj).await?;
                Ok(())
            }
        }
    }
}

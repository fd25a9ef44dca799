//! Tests for the reconcile entry point: phase bookkeeping, the Ready
//! condition, metrics and requeue delays.

use std::sync::Arc;

use kube::runtime::controller::Action;
use redis_operator::controller::backoff::{DEFAULT_DELAY, PODS_PENDING_DELAY, TOPOLOGY_DELAY};
use redis_operator::controller::context::Context;
use redis_operator::controller::reconciler::reconcile;
use redis_operator::controller::status::{get_condition_reason, is_condition_true};
use redis_operator::crd::{ClusterMode, RedisPhase, RedisReplication, RedisReplicationStatus};
use redis_operator::health::{HealLabels, HealthState, ReasonLabels};

use crate::common::*;

const A: &str = "10.0.0.1";
const B: &str = "10.0.0.2";
const C: &str = "10.0.0.3";

struct Harness {
    kube: Arc<FakeKube>,
    redis: Arc<FakeRedis>,
    health: Arc<HealthState>,
    ctx: Arc<Context>,
}

impl Harness {
    fn new(kube: FakeKube, redis: FakeRedis) -> Self {
        let kube = Arc::new(kube);
        let redis = Arc::new(redis);
        let health = Arc::new(HealthState::new());
        let ctx = Arc::new(Context::with_ops(
            kube.clone(),
            redis.clone(),
            Some(health.clone()),
        ));
        Self {
            kube,
            redis,
            health,
            ctx,
        }
    }

    /// Three ready Redis pods, A the oldest, and the object stored.
    fn with_pods(obj: &RedisReplication, redis: FakeRedis) -> Self {
        let kube = FakeKube::new().with_replication(obj).with_pods([
            redis_pod(obj, 0, A, 1),
            redis_pod(obj, 1, B, 2),
            redis_pod(obj, 2, C, 3),
        ]);
        Self::new(kube, redis)
    }

    async fn reconcile(&self, obj: &RedisReplication) -> Action {
        reconcile(Arc::new(obj.clone()), self.ctx.clone())
            .await
            .unwrap()
    }

    fn status(&self) -> RedisReplicationStatus {
        self.kube.status("default", "cache").unwrap()
    }

    fn status_patches(&self) -> usize {
        self.kube
            .writes()
            .iter()
            .filter(|w| matches!(w, KubeWrite::PatchStatus { .. }))
            .count()
    }

    fn heal_count(&self, action: &str) -> u64 {
        self.health
            .metrics
            .heal_actions_total
            .get_or_create(&HealLabels {
                action: action.to_string(),
            })
            .get()
    }

    fn requeue_count(&self, reason: &str) -> u64 {
        self.health
            .metrics
            .requeues_total
            .get_or_create(&ReasonLabels {
                reason: reason.to_string(),
            })
            .get()
    }
}

#[tokio::test]
async fn test_cold_start_reconcile_marks_running() {
    let obj = RedisReplicationBuilder::new("cache").build();
    let h = Harness::with_pods(&obj, FakeRedis::new());

    let action = h.reconcile(&obj).await;

    assert_eq!(action, Action::await_change());
    let status = h.status();
    assert_eq!(status.phase, Some(RedisPhase::Running));
    assert_eq!(status.observed_generation, Some(1));
    assert!(is_condition_true(&status.conditions, "Ready"));
    assert_eq!(get_condition_reason(&status.conditions, "Ready"), Some("Converged"));
    assert_eq!(h.redis.masters(), vec![A.to_string()]);
    assert_eq!(h.heal_count("bootstrap"), 1);
}

#[tokio::test]
async fn test_converged_pass_writes_no_status() {
    let obj = RedisReplicationBuilder::new("cache").build();
    let h = Harness::with_pods(&obj, FakeRedis::new());
    h.reconcile(&obj).await;
    h.kube.clear_writes();
    h.redis.clear_calls();

    let action = h.reconcile(&obj).await;

    assert_eq!(action, Action::await_change());
    assert_eq!(h.status_patches(), 0);
    assert!(h.redis.calls().is_empty());
    assert!(h.kube.pod_updates().is_empty());
}

#[tokio::test]
async fn test_running_plain_mode_without_master_waits_for_operator() {
    let obj = RedisReplicationBuilder::new("cache")
        .phase(RedisPhase::Running)
        .build();
    let redis = FakeRedis::new()
        .with_replica(A, "10.0.0.99")
        .with_replica(B, "10.0.0.99")
        .with_replica(C, "10.0.0.99");
    let h = Harness::with_pods(&obj, redis);

    let action = h.reconcile(&obj).await;

    assert_eq!(action, Action::requeue(TOPOLOGY_DELAY));
    let status = h.status();
    assert_eq!(status.phase, Some(RedisPhase::Running));
    assert!(!is_condition_true(&status.conditions, "Ready"));
    assert_eq!(get_condition_reason(&status.conditions, "Ready"), Some("NoMaster"));
    assert!(h.redis.calls().is_empty());
    assert_eq!(h.requeue_count("NoMaster"), 1);
}

#[tokio::test]
async fn test_repeated_failure_keeps_condition() {
    let obj = RedisReplicationBuilder::new("cache")
        .phase(RedisPhase::Running)
        .build();
    let redis = FakeRedis::new()
        .with_master(A)
        .with_master(B)
        .with_replica(C, A);
    let h = Harness::with_pods(&obj, redis);

    h.reconcile(&obj).await;
    let first = h.status();
    h.kube.clear_writes();

    // The pass re-reads the object, so it sees the condition written above
    let action = h.reconcile(&obj).await;

    assert_eq!(action, Action::requeue(TOPOLOGY_DELAY));
    assert_eq!(h.status_patches(), 0);
    assert_eq!(
        h.status().conditions[0].last_transition_time,
        first.conditions[0].last_transition_time
    );
}

#[tokio::test]
async fn test_spec_change_moves_running_to_scaling() {
    let mut obj = RedisReplicationBuilder::new("cache")
        .phase(RedisPhase::Running)
        .build();
    obj.metadata.generation = Some(2);
    // One pod has not started yet
    let kube = FakeKube::new()
        .with_replication(&obj)
        .with_pods([redis_pod(&obj, 0, A, 1), redis_pod(&obj, 1, B, 2)]);
    let h = Harness::new(kube, FakeRedis::new().with_master(A).with_replica(B, A));

    let action = h.reconcile(&obj).await;

    assert_eq!(action, Action::requeue(PODS_PENDING_DELAY));
    let status = h.status();
    assert_eq!(status.phase, Some(RedisPhase::Scaling));
    assert_eq!(status.observed_generation, Some(1));
    assert_eq!(get_condition_reason(&status.conditions, "Ready"), Some("PodsNotReady"));
}

#[tokio::test]
async fn test_scaling_converges_back_to_running() {
    let mut obj = RedisReplicationBuilder::new("cache")
        .phase(RedisPhase::Scaling)
        .build();
    obj.metadata.generation = Some(2);
    let redis = FakeRedis::new()
        .with_master(A)
        .with_replica(B, A)
        .with_replica(C, A);
    let h = Harness::with_pods(&obj, redis);

    let action = h.reconcile(&obj).await;

    assert_eq!(action, Action::await_change());
    let status = h.status();
    assert_eq!(status.phase, Some(RedisPhase::Running));
    assert_eq!(status.observed_generation, Some(2));
    assert!(h.redis.calls().is_empty());
}

#[tokio::test]
async fn test_invalid_spec_is_reported() {
    let obj = RedisReplicationBuilder::new("cache").replicas(2).build();
    let h = Harness::with_pods(&obj, FakeRedis::new());

    let action = h.reconcile(&obj).await;

    assert_eq!(action, Action::requeue(DEFAULT_DELAY));
    let status = h.status();
    assert_eq!(status.phase, Some(RedisPhase::Creating));
    assert_eq!(get_condition_reason(&status.conditions, "Ready"), Some("InvalidSpec"));
    assert!(!h.kube.has_config_map("default", "cache"));
}

#[tokio::test]
async fn test_cluster_mode_is_reported_unsupported() {
    let obj = RedisReplicationBuilder::new("cache")
        .mode(ClusterMode::Cluster)
        .build();
    let h = Harness::with_pods(&obj, FakeRedis::new());

    let action = h.reconcile(&obj).await;

    assert_eq!(action, Action::requeue(DEFAULT_DELAY));
    let status = h.status();
    assert_eq!(
        get_condition_reason(&status.conditions, "Ready"),
        Some("UnsupportedMode")
    );
    assert!(h.redis.calls().is_empty());
}

#[tokio::test]
async fn test_deleted_object_is_ignored() {
    let obj = RedisReplicationBuilder::new("cache").build();
    let h = Harness::new(FakeKube::new(), FakeRedis::new());

    let action = h.reconcile(&obj).await;

    assert_eq!(action, Action::await_change());
    assert!(h.kube.writes().is_empty());
}

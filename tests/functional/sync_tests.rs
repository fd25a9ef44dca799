//! Tests for whole sync pipelines.

use kube::ResourceExt;
use redis_operator::controller::check_and_heal::HealOutcome;
use redis_operator::controller::error::Error;
use redis_operator::controller::sync::{MASTER_SLAVE_PIPELINE, SENTINEL_PIPELINE, Syncer};
use redis_operator::crd::{ClusterMode, RedisPhase, RedisReplication};
use redis_operator::resources::common::LABEL_ROLE;

use crate::common::*;

const A: &str = "10.0.0.1";
const B: &str = "10.0.0.2";
const C: &str = "10.0.0.3";

fn redis_pods(obj: &RedisReplication) -> FakeKube {
    FakeKube::new().with_pods([
        redis_pod(obj, 0, A, 1),
        redis_pod(obj, 1, B, 2),
        redis_pod(obj, 2, C, 3),
    ])
}

fn roles(kube: &FakeKube) -> Vec<Option<String>> {
    ["cache-0", "cache-1", "cache-2"]
        .iter()
        .map(|name| {
            kube.pod(name)
                .and_then(|p| p.labels().get(LABEL_ROLE).cloned())
        })
        .collect()
}

#[tokio::test]
async fn test_plain_cold_start_converges_in_one_pass() {
    let obj = RedisReplicationBuilder::new("cache").build();
    let kube = redis_pods(&obj);
    let redis = FakeRedis::new();

    let report = Syncer::new(&kube, &redis)
        .sync(&obj, RedisPhase::Creating)
        .await
        .unwrap();

    assert_eq!(report.completed, MASTER_SLAVE_PIPELINE);
    assert_eq!(
        report.heal,
        Some(HealOutcome::Bootstrapped {
            master: A.to_string()
        })
    );
    assert_eq!(report.replicas_repointed, 0);
    assert_eq!(redis.masters(), vec![A.to_string()]);
    assert_eq!(
        roles(&kube),
        vec![
            Some("master".to_string()),
            Some("replica".to_string()),
            Some("replica".to_string()),
        ]
    );
    assert!(kube.has_config_map("default", "cache"));
    assert!(kube.has_service("default", "cache-master"));
    assert!(kube.has_service("default", "cache-replica"));
}

#[tokio::test]
async fn test_sentinel_cold_start_points_every_sentinel_at_master() {
    let obj = RedisReplicationBuilder::new("cache")
        .mode(ClusterMode::Sentinel)
        .password("s3cret")
        .build();
    let kube = redis_pods(&obj).with_pods([
        sentinel_pod(&obj, "a", "10.0.1.1", 4),
        sentinel_pod(&obj, "b", "10.0.1.2", 5),
        sentinel_pod(&obj, "c", "10.0.1.3", 6),
    ]);
    let redis = FakeRedis::new();

    let report = Syncer::new(&kube, &redis)
        .sync(&obj, RedisPhase::Creating)
        .await
        .unwrap();

    assert_eq!(report.completed, SENTINEL_PIPELINE);
    assert_eq!(report.sentinels_reconfigured, 3);
    for sentinel in ["10.0.1.1", "10.0.1.2", "10.0.1.3"] {
        assert_eq!(redis.monitored(sentinel).as_deref(), Some(A), "{sentinel}");
    }
    assert!(kube.has_config_map("default", "cache-sentinel"));
    assert!(kube.has_deployment("default", "cache-sentinel"));
    assert!(kube.has_service("default", "cache-sentinel"));
}

#[tokio::test]
async fn test_second_pass_changes_nothing() {
    let obj = RedisReplicationBuilder::new("cache")
        .mode(ClusterMode::Sentinel)
        .build();
    let kube = redis_pods(&obj).with_pods([
        sentinel_pod(&obj, "a", "10.0.1.1", 4),
        sentinel_pod(&obj, "b", "10.0.1.2", 5),
        sentinel_pod(&obj, "c", "10.0.1.3", 6),
    ]);
    let redis = FakeRedis::new();
    let syncer = Syncer::new(&kube, &redis);

    syncer.sync(&obj, RedisPhase::Creating).await.unwrap();
    // The first pass ran before the sentinel Deployment existed
    syncer.sync(&obj, RedisPhase::Running).await.unwrap();
    kube.clear_writes();
    redis.clear_calls();

    let report = syncer.sync(&obj, RedisPhase::Running).await.unwrap();

    assert_eq!(report.heal, Some(HealOutcome::Converged));
    assert_eq!(report.replicas_repointed, 0);
    assert_eq!(report.sentinels_reconfigured, 0);
    assert!(redis.calls().is_empty());
    assert!(kube.pod_updates().is_empty());
    assert!(
        kube.writes()
            .iter()
            .all(|w| !matches!(w, KubeWrite::Create { .. }))
    );
}

#[tokio::test]
async fn test_replica_drift_is_repaired_while_running() {
    let obj = RedisReplicationBuilder::new("cache").build();
    let kube = redis_pods(&obj);
    let redis = FakeRedis::new()
        .with_master(A)
        .with_replica(B, A)
        .with_replica(C, "10.0.0.99");

    let report = Syncer::new(&kube, &redis)
        .sync(&obj, RedisPhase::Running)
        .await
        .unwrap();

    assert_eq!(report.heal, Some(HealOutcome::Converged));
    assert_eq!(report.replicas_repointed, 1);
    assert_eq!(redis.following(C).as_deref(), Some(A));
}

#[tokio::test]
async fn test_cluster_mode_is_unsupported() {
    let obj = RedisReplicationBuilder::new("cache")
        .mode(ClusterMode::Cluster)
        .build();
    let kube = redis_pods(&obj);
    let redis = FakeRedis::new();

    let err = Syncer::new(&kube, &redis)
        .sync(&obj, RedisPhase::Creating)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::UnsupportedMode(ref mode) if mode == "cluster"));
    assert!(kube.writes().is_empty());
    assert!(redis.calls().is_empty());
}

#[tokio::test]
async fn test_pipeline_stops_at_first_failing_step() {
    let obj = RedisReplicationBuilder::new("cache").build();
    // Only two of three pods exist
    let kube = FakeKube::new().with_pods([redis_pod(&obj, 0, A, 1), redis_pod(&obj, 1, B, 2)]);
    let redis = FakeRedis::new();

    let err = Syncer::new(&kube, &redis)
        .sync(&obj, RedisPhase::Creating)
        .await
        .unwrap_err();

    assert!(matches!(err, Error::PodsNotReady { ready: 2, .. }));
    assert!(kube.has_config_map("default", "cache"));
    assert!(!kube.has_service("default", "cache-master"));
    assert!(kube.pod_updates().is_empty());
    assert!(redis.calls().is_empty());
}

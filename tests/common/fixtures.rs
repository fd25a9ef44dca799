//! Test fixtures and builder patterns for RedisReplication and pods.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use redis_operator::crd::{
    ClusterMode, PodTemplates, RedisPhase, RedisReplication, RedisReplicationSpec,
    RedisReplicationStatus,
};
use redis_operator::resources::ResourceLabels;
use serde_json::json;

/// Builder for creating RedisReplication test fixtures.
///
/// # Example
/// ```
/// let resource = RedisReplicationBuilder::new("cache")
///     .namespace("test-ns")
///     .mode(ClusterMode::Sentinel)
///     .password("s3cret")
///     .build();
/// ```
#[derive(Clone, Debug)]
pub struct RedisReplicationBuilder {
    name: String,
    namespace: String,
    replicas: i32,
    mode: ClusterMode,
    sentinels: i32,
    image: String,
    config: BTreeMap<String, String>,
    generation: Option<i64>,
    uid: String,
    phase: Option<RedisPhase>,
}

impl RedisReplicationBuilder {
    /// Create a new builder with the given resource name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            namespace: "default".to_string(),
            replicas: 3,
            mode: ClusterMode::MasterSlave,
            sentinels: 3,
            image: "redis:7.2-alpine".to_string(),
            config: BTreeMap::from([("port".to_string(), "6379".to_string())]),
            generation: Some(1),
            uid: "11111111-2222-3333-4444-555555555555".to_string(),
            phase: None,
        }
    }

    pub fn namespace(mut self, namespace: impl Into<String>) -> Self {
        self.namespace = namespace.into();
        self
    }

    pub fn replicas(mut self, replicas: i32) -> Self {
        self.replicas = replicas;
        self
    }

    pub fn mode(mut self, mode: ClusterMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn sentinels(mut self, sentinels: i32) -> Self {
        self.sentinels = sentinels;
        self
    }

    pub fn image(mut self, image: impl Into<String>) -> Self {
        self.image = image.into();
        self
    }

    /// Set a raw redis.conf directive.
    pub fn config(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.insert(key.into(), value.into());
        self
    }

    pub fn password(self, password: impl Into<String>) -> Self {
        self.config("requirepass", password)
    }

    pub fn generation(mut self, generation: i64) -> Self {
        self.generation = Some(generation);
        self
    }

    /// Record `phase` as the status, observed at the current generation.
    pub fn phase(mut self, phase: RedisPhase) -> Self {
        self.phase = Some(phase);
        self
    }

    /// Build the RedisReplication resource.
    pub fn build(self) -> RedisReplication {
        let mut resource = RedisReplication::new(
            &self.name,
            RedisReplicationSpec {
                replicas: self.replicas,
                cluster_mode: self.mode,
                templates: PodTemplates {
                    image: self.image,
                    ..Default::default()
                },
                redis_config: self.config,
                sentinel_num: self.sentinels,
                volume_config: None,
            },
        );
        resource.metadata.namespace = Some(self.namespace);
        resource.metadata.uid = Some(self.uid);
        resource.metadata.generation = self.generation;
        resource.status = self.phase.map(|phase| RedisReplicationStatus {
            phase: Some(phase),
            observed_generation: self.generation,
            conditions: Vec::new(),
        });
        resource
    }
}

/// Ready pod with `labels`, `ip` and a creation time `minute` minutes
/// after a fixed epoch. Lower minutes are older.
pub fn ready_pod(name: &str, labels: BTreeMap<String, String>, ip: &str, minute: u32) -> Pod {
    serde_json::from_value(json!({
        "metadata": {
            "name": name,
            "namespace": "default",
            "labels": labels,
            "creationTimestamp": format!("2024-01-01T00:{minute:02}:00Z"),
        },
        "status": {
            "phase": "Running",
            "podIP": ip,
            "conditions": [{"type": "Ready", "status": "True"}],
        }
    }))
    .unwrap()
}

/// Pod that is still starting: no IP and not ready.
pub fn pending_pod(name: &str, labels: BTreeMap<String, String>, minute: u32) -> Pod {
    serde_json::from_value(json!({
        "metadata": {
            "name": name,
            "namespace": "default",
            "labels": labels,
            "creationTimestamp": format!("2024-01-01T00:{minute:02}:00Z"),
        },
        "status": {
            "phase": "Pending",
            "conditions": [{"type": "Ready", "status": "False"}],
        }
    }))
    .unwrap()
}

/// Ready Redis pod `<name>-<ordinal>` selected by the StatefulSet of `resource`.
pub fn redis_pod(resource: &RedisReplication, ordinal: usize, ip: &str, minute: u32) -> Pod {
    let name = format!("{}-{ordinal}", resource.metadata.name.as_deref().unwrap_or_default());
    let mut pod = ready_pod(&name, ResourceLabels::redis(resource).selector(), ip, minute);
    pod.metadata.namespace = resource.metadata.namespace.clone();
    pod
}

/// Ready sentinel pod selected by the sentinel Deployment of `resource`.
pub fn sentinel_pod(resource: &RedisReplication, suffix: &str, ip: &str, minute: u32) -> Pod {
    let name = format!(
        "{}-sentinel-{suffix}",
        resource.metadata.name.as_deref().unwrap_or_default()
    );
    let mut pod = ready_pod(&name, ResourceLabels::sentinel(resource).selector(), ip, minute);
    pod.metadata.namespace = resource.metadata.namespace.clone();
    pod
}

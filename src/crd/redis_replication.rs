//! RedisReplication Custom Resource Definition.
//!
//! Describes a Redis master/replica topology, optionally watched by a
//! sentinel tier that performs automatic failover.

use std::collections::BTreeMap;

use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// RedisReplication is a custom resource for deploying a replicated Redis.
///
/// Example:
/// ```yaml
/// apiVersion: redisoperator.smoketurner.com/v1alpha1
/// kind: RedisReplication
/// metadata:
///   name: cache
/// spec:
///   replicas: 3
///   clusterMode: sentinel
///   sentinelNum: 3
///   templates:
///     image: redis:7.2-alpine
///   redisConfig:
///     port: "6379"
///     requirepass: s3cret
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "redisoperator.smoketurner.com",
    version = "v1alpha1",
    kind = "RedisReplication",
    plural = "redisreplications",
    shortname = "rr",
    status = "RedisReplicationStatus",
    namespaced,
    printcolumn = r#"{"name":"ClusterMode", "type":"string", "jsonPath":".spec.clusterMode"}"#,
    printcolumn = r#"{"name":"Replicas", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Phase", "type":"string", "jsonPath":".status.phase"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct RedisReplicationSpec {
    /// Number of Redis pods (minimum 3). One is master, the rest replicate it.
    #[serde(default = "default_replicas")]
    pub replicas: i32,

    /// Topology mode.
    #[serde(default)]
    pub cluster_mode: ClusterMode,

    /// Pod template settings.
    pub templates: PodTemplates,

    /// Raw redis.conf directives. Must contain `port`.
    #[serde(default)]
    pub redis_config: BTreeMap<String, String>,

    /// Number of sentinel pods in `sentinel` mode (default 3).
    #[serde(default = "default_sentinel_num")]
    pub sentinel_num: i32,

    /// Persistent volume claim template for the data directory.
    /// An emptyDir is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume_config: Option<VolumeConfig>,
}

fn default_replicas() -> i32 {
    3
}

fn default_sentinel_num() -> i32 {
    3
}

/// Topology mode of a RedisReplication.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
pub enum ClusterMode {
    /// Plain master/replica replication.
    #[default]
    #[serde(rename = "master-slave")]
    MasterSlave,
    /// Master/replica replication watched by sentinels.
    #[serde(rename = "sentinel")]
    Sentinel,
    /// Redis Cluster. Accepted by the schema but not managed.
    #[serde(rename = "cluster")]
    Cluster,
}

impl std::fmt::Display for ClusterMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ClusterMode::MasterSlave => write!(f, "master-slave"),
            ClusterMode::Sentinel => write!(f, "sentinel"),
            ClusterMode::Cluster => write!(f, "cluster"),
        }
    }
}

/// Container settings shared by the Redis and sentinel pods.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct PodTemplates {
    /// Image for the sentinel init container (default: busybox:1.36).
    #[serde(default = "default_init_image")]
    pub init_image: String,

    /// Redis image, used for both redis-server and sentinel.
    pub image: String,

    /// Image pull policy (default: IfNotPresent).
    #[serde(default = "default_image_pull_policy")]
    pub image_pull_policy: String,

    /// Resource requests and limits for the Redis container.
    #[serde(default)]
    pub resources: ResourceRequirementsSpec,
}

impl Default for PodTemplates {
    fn default() -> Self {
        Self {
            init_image: default_init_image(),
            image: String::new(),
            image_pull_policy: default_image_pull_policy(),
            resources: ResourceRequirementsSpec::default(),
        }
    }
}

fn default_init_image() -> String {
    "busybox:1.36".to_string()
}

fn default_image_pull_policy() -> String {
    "IfNotPresent".to_string()
}

/// Resource requests and limits as quantity strings keyed by resource name.
#[derive(Clone, Debug, Default, Eq, PartialEq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ResourceRequirementsSpec {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub requests: BTreeMap<String, String>,

    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub limits: BTreeMap<String, String>,
}

/// Claim template for the Redis data directory.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct VolumeConfig {
    /// Access modes (default: ReadWriteOnce).
    #[serde(default = "default_access_modes")]
    pub access_modes: Vec<String>,

    /// Storage class. The cluster default is used when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storage_class_name: Option<String>,

    /// Requested storage, e.g. `requests: {storage: 1Gi}`.
    #[serde(default)]
    pub resources: ResourceRequirementsSpec,
}

fn default_access_modes() -> Vec<String> {
    vec!["ReadWriteOnce".to_string()]
}

/// Status of a RedisReplication.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct RedisReplicationStatus {
    /// Current lifecycle phase. Unset until the first reconcile.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub phase: Option<RedisPhase>,

    /// The generation most recently marked running.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    /// Conditions describing the current state.
    #[serde(default)]
    pub conditions: Vec<Condition>,
}

/// Lifecycle phase of a RedisReplication.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum RedisPhase {
    /// Resources are being created and no master has been elected yet.
    Creating,
    /// The spec changed after the topology converged.
    Scaling,
    /// The last pass converged without error.
    Running,
    /// Reserved. Never entered by the controller.
    Failed,
}

impl std::fmt::Display for RedisPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RedisPhase::Creating => write!(f, "creating"),
            RedisPhase::Scaling => write!(f, "scaling"),
            RedisPhase::Running => write!(f, "running"),
            RedisPhase::Failed => write!(f, "failed"),
        }
    }
}

/// Condition describes the state of a RedisReplication at a certain point.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Condition {
    /// Type of condition.
    pub r#type: String,
    /// Status of the condition ("True", "False", "Unknown").
    pub status: String,
    /// Machine-readable reason for the condition's last transition.
    pub reason: String,
    /// Human-readable message indicating details about last transition.
    pub message: String,
    /// Last time the condition transitioned from one status to another.
    pub last_transition_time: String,
    /// The generation of the resource this condition was observed for.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

impl Condition {
    /// Create a new condition.
    pub fn new(
        condition_type: &str,
        status: bool,
        reason: &str,
        message: &str,
        generation: Option<i64>,
    ) -> Self {
        Self {
            r#type: condition_type.to_string(),
            status: if status {
                "True".to_string()
            } else {
                "False".to_string()
            },
            reason: reason.to_string(),
            message: message.to_string(),
            last_transition_time: jiff::Timestamp::now().to_string(),
            observed_generation: generation,
        }
    }

    /// Create a "Ready" condition.
    pub fn ready(ready: bool, reason: &str, message: &str, generation: Option<i64>) -> Self {
        Self::new("Ready", ready, reason, message, generation)
    }
}

/// Port sentinels listen on.
pub const SENTINEL_PORT: u16 = 26379;

/// Name of the master group every sentinel monitors.
pub const SENTINEL_MASTER_NAME: &str = "mymaster";

/// Data directory used when `redisConfig` has no `dir`.
pub const DEFAULT_DATA_DIR: &str = "/data";

/// Minimum number of Redis pods.
pub const MIN_REPLICAS: i32 = 3;

impl RedisReplicationSpec {
    /// Parse the listening port from `redisConfig`.
    pub fn redis_port(&self) -> Result<u16, String> {
        let raw = self
            .redis_config
            .get("port")
            .ok_or_else(|| "redisConfig must contain 'port'".to_string())?;
        match raw.trim().parse::<u16>() {
            Ok(0) | Err(_) => Err(format!("redisConfig port '{raw}' is not a valid port")),
            Ok(port) => Ok(port),
        }
    }

    /// Password from `requirepass`, if set and non-empty.
    pub fn password(&self) -> Option<&str> {
        self.redis_config
            .get("requirepass")
            .map(String::as_str)
            .filter(|p| !p.is_empty())
    }

    /// Data directory from `dir`, falling back to [`DEFAULT_DATA_DIR`].
    pub fn data_dir(&self) -> &str {
        self.redis_config
            .get("dir")
            .map(String::as_str)
            .filter(|d| !d.is_empty())
            .unwrap_or(DEFAULT_DATA_DIR)
    }

    /// Sentinel quorum: a strict majority of the sentinel tier.
    pub fn sentinel_quorum(&self) -> i32 {
        self.sentinel_num.max(1) / 2 + 1
    }

    /// Whether a sentinel tier is managed for this object.
    pub fn has_sentinels(&self) -> bool {
        self.cluster_mode == ClusterMode::Sentinel
    }

    /// Check the fields the controller relies on.
    pub fn validate(&self) -> Result<(), String> {
        if self.replicas < MIN_REPLICAS {
            return Err(format!(
                "replicas must be at least {MIN_REPLICAS}, got {}",
                self.replicas
            ));
        }
        if self.templates.image.len() < 5 {
            return Err(format!(
                "templates.image '{}' must be at least 5 characters",
                self.templates.image
            ));
        }
        self.redis_port()?;
        if self.has_sentinels() && self.sentinel_num < 1 {
            return Err(format!(
                "sentinelNum must be at least 1, got {}",
                self.sentinel_num
            ));
        }
        Ok(())
    }
}

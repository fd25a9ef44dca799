//! ConfigMap generation for redis.conf and sentinel.conf.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::ConfigMap;

use crate::crd::{DEFAULT_DATA_DIR, RedisReplication, RedisReplicationSpec, SENTINEL_MASTER_NAME};
use crate::resources::common::{ResourceLabels, object_meta, redis_name, sentinel_name};

/// Key (and file name) of the rendered Redis configuration.
pub const REDIS_CONF_FILE: &str = "redis.conf";
/// Key (and file name) of the rendered sentinel configuration.
pub const SENTINEL_CONF_FILE: &str = "sentinel.conf";

/// Address sentinels monitor until the controller points them at a master.
pub const UNSET_MONITOR_ADDRESS: &str = "127.0.0.1";

/// Render redis.conf as sorted `key value` lines.
///
/// Empty values are dropped, `requirepass` is mirrored into `masterauth`
/// when the latter is absent, and `dir` falls back to the default data
/// directory so it always matches the data volume mount.
pub fn render_redis_conf(spec: &RedisReplicationSpec) -> String {
    let mut config: BTreeMap<String, String> = spec.redis_config.clone();

    if let Some(password) = config.get("requirepass").cloned()
        && !config.contains_key("masterauth")
    {
        config.insert("masterauth".to_string(), password);
    }
    if config.get("dir").is_none_or(|d| d.is_empty()) {
        config.insert("dir".to_string(), DEFAULT_DATA_DIR.to_string());
    }
    // Pods are reached by IP from other pods and the operator.
    config
        .entry("protected-mode".to_string())
        .or_insert_with(|| "no".to_string());

    config
        .iter()
        .filter(|(_, value)| !value.is_empty())
        .map(|(key, value)| format!("{key} {value}\n"))
        .collect()
}

/// Render sentinel.conf with the unset monitor marker.
///
/// The `monitor` line must precede the other `sentinel` directives for the
/// same group or sentinel refuses to load the file.
pub fn render_sentinel_conf(spec: &RedisReplicationSpec, redis_port: u16) -> String {
    let mut lines = vec![
        "protected-mode no".to_string(),
        format!(
            "sentinel monitor {SENTINEL_MASTER_NAME} {UNSET_MONITOR_ADDRESS} {redis_port} {}",
            spec.sentinel_quorum()
        ),
        format!("sentinel down-after-milliseconds {SENTINEL_MASTER_NAME} 30000"),
        format!("sentinel failover-timeout {SENTINEL_MASTER_NAME} 180000"),
        format!("sentinel parallel-syncs {SENTINEL_MASTER_NAME} 1"),
    ];
    if let Some(password) = spec.password() {
        lines.push(format!("sentinel auth-pass {SENTINEL_MASTER_NAME} {password}"));
    }
    let mut rendered = lines.join("\n");
    rendered.push('\n');
    rendered
}

/// Generate the ConfigMap holding redis.conf.
pub fn generate_redis_config_map(resource: &RedisReplication) -> ConfigMap {
    let labels = ResourceLabels::redis(resource);
    ConfigMap {
        metadata: object_meta(resource, redis_name(resource), &labels),
        data: Some(BTreeMap::from([(
            REDIS_CONF_FILE.to_string(),
            render_redis_conf(&resource.spec),
        )])),
        ..Default::default()
    }
}

/// Generate the ConfigMap holding sentinel.conf.
pub fn generate_sentinel_config_map(resource: &RedisReplication, redis_port: u16) -> ConfigMap {
    let labels = ResourceLabels::sentinel(resource);
    ConfigMap {
        metadata: object_meta(resource, sentinel_name(resource), &labels),
        data: Some(BTreeMap::from([(
            SENTINEL_CONF_FILE.to_string(),
            render_sentinel_conf(&resource.spec, redis_port),
        )])),
        ..Default::default()
    }
}

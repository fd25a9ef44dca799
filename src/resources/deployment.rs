//! Deployment generation for the sentinel tier.
//!
//! Sentinel rewrites its config file at runtime, so an init container copies
//! sentinel.conf from the read-only ConfigMap mount into a writable emptyDir.

use k8s_openapi::api::apps::v1::{Deployment, DeploymentSpec};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, PodSpec,
    PodTemplateSpec, Volume, VolumeMount,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};

use crate::crd::{RedisReplication, SENTINEL_PORT};
use crate::resources::common::{ResourceLabels, RoleLabel, object_meta, sentinel_name};
use crate::resources::configmap::SENTINEL_CONF_FILE;
use crate::resources::statefulset::tcp_probe;

/// Writable directory sentinel runs from.
pub const SENTINEL_DATA_PATH: &str = "/sentinel";
const SENTINEL_CONFIG_MOUNT_PATH: &str = "/sentinel-template";
const CONFIG_VOLUME_NAME: &str = "sentinel-conf-template";
const DATA_VOLUME_NAME: &str = "sentinel-data";

/// Generate the Deployment running `sentinelNum` sentinels.
pub fn generate_sentinel_deployment(resource: &RedisReplication) -> Deployment {
    let labels = ResourceLabels::sentinel(resource);
    let pod_labels = labels.clone().with_role(RoleLabel::Sentinel);
    let templates = &resource.spec.templates;

    let init_container = Container {
        name: "copy-config".to_string(),
        image: Some(templates.init_image.clone()),
        image_pull_policy: Some(templates.image_pull_policy.clone()),
        command: Some(vec![
            "sh".to_string(),
            "-c".to_string(),
            format!(
                "cp {SENTINEL_CONFIG_MOUNT_PATH}/{SENTINEL_CONF_FILE} {SENTINEL_DATA_PATH}/{SENTINEL_CONF_FILE}"
            ),
        ]),
        volume_mounts: Some(vec![
            VolumeMount {
                name: CONFIG_VOLUME_NAME.to_string(),
                mount_path: SENTINEL_CONFIG_MOUNT_PATH.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: DATA_VOLUME_NAME.to_string(),
                mount_path: SENTINEL_DATA_PATH.to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    let container = Container {
        name: "sentinel".to_string(),
        image: Some(templates.image.clone()),
        image_pull_policy: Some(templates.image_pull_policy.clone()),
        command: Some(vec![
            "redis-server".to_string(),
            format!("{SENTINEL_DATA_PATH}/{SENTINEL_CONF_FILE}"),
            "--sentinel".to_string(),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some("sentinel".to_string()),
            container_port: i32::from(SENTINEL_PORT),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        readiness_probe: Some(tcp_probe(SENTINEL_PORT)),
        volume_mounts: Some(vec![VolumeMount {
            name: DATA_VOLUME_NAME.to_string(),
            mount_path: SENTINEL_DATA_PATH.to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    };

    Deployment {
        metadata: object_meta(resource, sentinel_name(resource), &labels),
        spec: Some(DeploymentSpec {
            replicas: Some(resource.spec.sentinel_num),
            selector: LabelSelector {
                match_labels: Some(labels.selector()),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(pod_labels.to_map()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    init_containers: Some(vec![init_container]),
                    containers: vec![container],
                    volumes: Some(vec![
                        Volume {
                            name: CONFIG_VOLUME_NAME.to_string(),
                            config_map: Some(ConfigMapVolumeSource {
                                name: sentinel_name(resource),
                                ..Default::default()
                            }),
                            ..Default::default()
                        },
                        Volume {
                            name: DATA_VOLUME_NAME.to_string(),
                            empty_dir: Some(EmptyDirVolumeSource::default()),
                            ..Default::default()
                        },
                    ]),
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

//! StatefulSet generation for the Redis tier.
//!
//! - Stable pod names, one Redis process per pod
//! - `OnDelete` updates so the controller never races a rolling restart
//! - redis.conf mounted from the ConfigMap
//! - Data directory on a claim template or an emptyDir

use std::collections::BTreeMap;

use k8s_openapi::api::apps::v1::{StatefulSet, StatefulSetSpec, StatefulSetUpdateStrategy};
use k8s_openapi::api::core::v1::{
    ConfigMapVolumeSource, Container, ContainerPort, EmptyDirVolumeSource, KeyToPath,
    PersistentVolumeClaim, PersistentVolumeClaimSpec, PodSpec, PodTemplateSpec, Probe,
    ResourceRequirements, TCPSocketAction, Volume, VolumeMount, VolumeResourceRequirements,
};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::crd::{RedisReplication, ResourceRequirementsSpec, VolumeConfig};
use crate::resources::common::{ResourceLabels, object_meta, redis_name};
use crate::resources::configmap::REDIS_CONF_FILE;

/// Directory redis.conf is mounted into.
pub const REDIS_CONF_MOUNT_PATH: &str = "/redis/conf";
/// Name of the data volume (claim template or emptyDir).
pub const DATA_VOLUME_NAME: &str = "data";
const CONFIG_VOLUME_NAME: &str = "redis-conf";
const REDIS_CONTAINER_NAME: &str = "redis";

/// Generate the StatefulSet running the Redis tier.
pub fn generate_statefulset(resource: &RedisReplication, redis_port: u16) -> StatefulSet {
    let labels = ResourceLabels::redis(resource);
    let spec = &resource.spec;

    let volume_claim_templates = spec
        .volume_config
        .as_ref()
        .map(|volume| vec![generate_pvc_template(volume)]);

    let mut volumes = vec![Volume {
        name: CONFIG_VOLUME_NAME.to_string(),
        config_map: Some(ConfigMapVolumeSource {
            name: redis_name(resource),
            items: Some(vec![KeyToPath {
                key: REDIS_CONF_FILE.to_string(),
                path: REDIS_CONF_FILE.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }];
    if volume_claim_templates.is_none() {
        volumes.push(Volume {
            name: DATA_VOLUME_NAME.to_string(),
            empty_dir: Some(EmptyDirVolumeSource::default()),
            ..Default::default()
        });
    }

    let container = Container {
        name: REDIS_CONTAINER_NAME.to_string(),
        image: Some(spec.templates.image.clone()),
        image_pull_policy: Some(spec.templates.image_pull_policy.clone()),
        command: Some(vec![
            "redis-server".to_string(),
            format!("{REDIS_CONF_MOUNT_PATH}/{REDIS_CONF_FILE}"),
        ]),
        ports: Some(vec![ContainerPort {
            name: Some("redis".to_string()),
            container_port: i32::from(redis_port),
            protocol: Some("TCP".to_string()),
            ..Default::default()
        }]),
        readiness_probe: Some(tcp_probe(redis_port)),
        resources: resource_requirements(&spec.templates.resources),
        volume_mounts: Some(vec![
            VolumeMount {
                name: CONFIG_VOLUME_NAME.to_string(),
                mount_path: REDIS_CONF_MOUNT_PATH.to_string(),
                ..Default::default()
            },
            VolumeMount {
                name: DATA_VOLUME_NAME.to_string(),
                mount_path: spec.data_dir().to_string(),
                ..Default::default()
            },
        ]),
        ..Default::default()
    };

    StatefulSet {
        metadata: object_meta(resource, redis_name(resource), &labels),
        spec: Some(StatefulSetSpec {
            replicas: Some(spec.replicas),
            service_name: Some(redis_name(resource)),
            selector: LabelSelector {
                match_labels: Some(labels.selector()),
                ..Default::default()
            },
            // Role changes are driven by the controller, never by restarts
            update_strategy: Some(StatefulSetUpdateStrategy {
                type_: Some("OnDelete".to_string()),
                ..Default::default()
            }),
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    labels: Some(labels.selector()),
                    ..Default::default()
                }),
                spec: Some(PodSpec {
                    containers: vec![container],
                    volumes: Some(volumes),
                    ..Default::default()
                }),
            },
            volume_claim_templates,
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// TCP readiness probe on the given port.
pub(crate) fn tcp_probe(port: u16) -> Probe {
    Probe {
        tcp_socket: Some(TCPSocketAction {
            port: IntOrString::Int(i32::from(port)),
            ..Default::default()
        }),
        initial_delay_seconds: Some(5),
        period_seconds: Some(5),
        timeout_seconds: Some(3),
        failure_threshold: Some(3),
        ..Default::default()
    }
}

fn quantities(values: &BTreeMap<String, String>) -> Option<BTreeMap<String, Quantity>> {
    if values.is_empty() {
        return None;
    }
    Some(
        values
            .iter()
            .map(|(name, value)| (name.clone(), Quantity(value.clone())))
            .collect(),
    )
}

/// Convert the CRD resource block into container requirements.
pub(crate) fn resource_requirements(spec: &ResourceRequirementsSpec) -> Option<ResourceRequirements> {
    if spec.requests.is_empty() && spec.limits.is_empty() {
        return None;
    }
    Some(ResourceRequirements {
        requests: quantities(&spec.requests),
        limits: quantities(&spec.limits),
        ..Default::default()
    })
}

fn generate_pvc_template(volume: &VolumeConfig) -> PersistentVolumeClaim {
    PersistentVolumeClaim {
        metadata: ObjectMeta {
            name: Some(DATA_VOLUME_NAME.to_string()),
            ..Default::default()
        },
        spec: Some(PersistentVolumeClaimSpec {
            access_modes: Some(volume.access_modes.clone()),
            storage_class_name: volume.storage_class_name.clone(),
            resources: Some(VolumeResourceRequirements {
                requests: quantities(&volume.resources.requests),
                limits: quantities(&volume.resources.limits),
                ..Default::default()
            }),
            ..Default::default()
        }),
        ..Default::default()
    }
}

//! Ready-node discovery.
//!
//! Pods are always re-listed from the API; nothing here is cached between
//! reconciles.

use std::collections::BTreeMap;

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::debug;

use crate::controller::error::{Error, Result};
use crate::controller::kube_ops::KubeOps;
use crate::crd::RedisReplication;
use crate::resources::ResourceLabels;
use crate::resources::common::{redis_name, sentinel_name};

/// Running, not terminating, Ready condition true and an IP assigned.
pub fn is_pod_ready(pod: &Pod) -> bool {
    if pod.metadata.deletion_timestamp.is_some() {
        return false;
    }
    let Some(status) = pod.status.as_ref() else {
        return false;
    };
    if status.phase.as_deref() != Some("Running") {
        return false;
    }
    let ready = status
        .conditions
        .iter()
        .flatten()
        .any(|c| c.type_ == "Ready" && c.status == "True");
    ready && pod_ip(pod).is_some()
}

/// The pod's IP address, if assigned.
pub fn pod_ip(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|s| s.pod_ip.as_deref())
        .filter(|ip| !ip.is_empty())
}

/// Sort oldest first. Ties and missing timestamps fall back to the name.
pub fn sort_by_age(pods: &mut [Pod]) {
    pods.sort_by(|a, b| {
        let a_ts = a.metadata.creation_timestamp.as_ref().map(|t| t.0);
        let b_ts = b.metadata.creation_timestamp.as_ref().map(|t| t.0);
        // Pods without a timestamp sort last
        a_ts.is_none()
            .cmp(&b_ts.is_none())
            .then(a_ts.cmp(&b_ts))
            .then_with(|| a.name_any().cmp(&b.name_any()))
    });
}

/// Ready Redis pods, selected through the StatefulSet's selector.
///
/// Fails with not-found when the StatefulSet does not exist yet.
pub async fn ready_redis_pods(kube: &dyn KubeOps, obj: &RedisReplication) -> Result<Vec<Pod>> {
    let namespace = obj.namespace().unwrap_or_default();
    let name = redis_name(obj);
    let sts = kube
        .get_stateful_set(&namespace, &name)
        .await?
        .ok_or(Error::NotFound {
            kind: "StatefulSet",
            name,
        })?;
    let selector = sts
        .spec
        .and_then(|s| s.selector.match_labels)
        .unwrap_or_else(|| ResourceLabels::redis(obj).selector());
    ready_pods(kube, &namespace, &selector).await
}

/// Ready sentinel pods, selected through the Deployment's selector.
///
/// Fails with not-found when the Deployment does not exist yet.
pub async fn ready_sentinel_pods(
    kube: &dyn KubeOps,
    obj: &RedisReplication,
) -> Result<Vec<Pod>> {
    let namespace = obj.namespace().unwrap_or_default();
    let name = sentinel_name(obj);
    let deployment = kube
        .get_deployment(&namespace, &name)
        .await?
        .ok_or(Error::NotFound {
            kind: "Deployment",
            name,
        })?;
    let selector = deployment
        .spec
        .and_then(|s| s.selector.match_labels)
        .unwrap_or_else(|| ResourceLabels::sentinel(obj).selector());
    ready_pods(kube, &namespace, &selector).await
}

async fn ready_pods(
    kube: &dyn KubeOps,
    namespace: &str,
    selector: &BTreeMap<String, String>,
) -> Result<Vec<Pod>> {
    let pods = kube.list_pods(namespace, selector).await?;
    let total = pods.len();
    let ready: Vec<Pod> = pods.into_iter().filter(is_pod_ready).collect();
    debug!(namespace = %namespace, total, ready = ready.len(), "Listed pods");
    Ok(ready)
}

//! Idempotent resource convergence.
//!
//! Every `ensure_*` reads the current object, creates it when absent and
//! otherwise applies the freshly generated body. Nothing is deleted here;
//! garbage collection follows the controlling owner references.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::error::{Error, Result};
use crate::controller::kube_ops::KubeOps;
use crate::controller::node_state::{NodeStateReader, redis_target};
use crate::controller::pods::{pod_ip, ready_redis_pods, ready_sentinel_pods};
use crate::controller::redis_ops::RedisOps;
use crate::controller::topology::TopologyMutator;
use crate::crd::RedisReplication;
use crate::resources::common::{
    LABEL_ROLE, ResourceLabels, RoleLabel, has_secondary_owner, secondary_owner_reference,
};
use crate::resources::configmap::{generate_redis_config_map, generate_sentinel_config_map};
use crate::resources::deployment::generate_sentinel_deployment;
use crate::resources::services::generate_services;
use crate::resources::statefulset::generate_statefulset;

/// The single master in `masters`, or `MultipleMasters` otherwise.
///
/// Zero masters also fails, so the next pass re-runs the consistency check.
pub fn single_master(masters: &[String]) -> Result<&str> {
    match masters {
        [master] => Ok(master),
        other => Err(Error::MultipleMasters(other.len())),
    }
}

/// Convergence operations for one RedisReplication.
pub struct Ensure<'a> {
    kube: &'a dyn KubeOps,
    redis: &'a dyn RedisOps,
}

impl<'a> Ensure<'a> {
    pub fn new(kube: &'a dyn KubeOps, redis: &'a dyn RedisOps) -> Self {
        Self { kube, redis }
    }

    /// redis.conf, plus sentinel.conf in sentinel mode.
    pub async fn ensure_config_maps(&self, obj: &RedisReplication) -> Result<()> {
        let namespace = obj.namespace().unwrap_or_default();
        let port = redis_target(obj)?.port;

        let mut desired = vec![generate_redis_config_map(obj)];
        if obj.spec.has_sentinels() {
            desired.push(generate_sentinel_config_map(obj, port));
        }

        for config_map in &desired {
            let name = config_map.name_any();
            match self.kube.get_config_map(&namespace, &name).await? {
                None => {
                    info!(name = %name, "Creating ConfigMap");
                    self.kube.create_config_map(&namespace, config_map).await?;
                }
                Some(_) => self.kube.update_config_map(&namespace, config_map).await?,
            }
        }
        Ok(())
    }

    pub async fn ensure_stateful_set(&self, obj: &RedisReplication) -> Result<()> {
        let namespace = obj.namespace().unwrap_or_default();
        let port = redis_target(obj)?.port;
        let sts = generate_statefulset(obj, port);
        let name = sts.name_any();

        match self.kube.get_stateful_set(&namespace, &name).await? {
            None => {
                info!(name = %name, "Creating StatefulSet");
                self.kube.create_stateful_set(&namespace, &sts).await
            }
            Some(_) => self.kube.update_stateful_set(&namespace, &sts).await,
        }
    }

    /// Fails with `PodsNotReady` until every desired Redis pod is ready.
    pub async fn ensure_redis_pods_ready(&self, obj: &RedisReplication) -> Result<()> {
        let ready = ready_redis_pods(self.kube, obj).await?.len();
        let desired = usize::try_from(obj.spec.replicas).unwrap_or_default();
        if ready != desired {
            return Err(Error::PodsNotReady {
                tier: "redis",
                ready,
                desired,
            });
        }
        Ok(())
    }

    /// Add the non-controlling owner reference to every ready pod that
    /// lacks one. Pods already carrying it are left alone.
    ///
    /// A sentinel Deployment that does not exist yet contributes no pods;
    /// it is only created later in the same pipeline.
    pub async fn ensure_pod_owners(&self, obj: &RedisReplication) -> Result<()> {
        let mut pods = ready_redis_pods(self.kube, obj).await?;
        if obj.spec.has_sentinels() {
            match ready_sentinel_pods(self.kube, obj).await {
                Ok(sentinels) => pods.extend(sentinels),
                Err(e) if e.is_not_found() => debug!("Sentinel Deployment not created yet"),
                Err(e) => return Err(e),
            }
        }

        let namespace = obj.namespace().unwrap_or_default();
        for mut pod in pods {
            if has_secondary_owner(&pod.metadata, obj) {
                continue;
            }
            debug!(pod = %pod.name_any(), "Adding secondary owner reference");
            pod.metadata
                .owner_references
                .get_or_insert_with(Vec::new)
                .push(secondary_owner_reference(obj));
            self.kube.update_pod(&namespace, &pod).await?;
        }
        Ok(())
    }

    /// One Service per role. Every Service is converged, not just the first.
    pub async fn ensure_services(&self, obj: &RedisReplication) -> Result<()> {
        let namespace = obj.namespace().unwrap_or_default();
        let port = redis_target(obj)?.port;

        for service in generate_services(obj, port) {
            let name = service.name_any();
            match self.kube.get_service(&namespace, &name).await? {
                None => {
                    info!(name = %name, "Creating Service");
                    self.kube.create_service(&namespace, &service).await?;
                }
                Some(_) => self.kube.update_service(&namespace, &service).await?,
            }
        }
        Ok(())
    }

    /// Point every non-master Redis pod at the single master.
    ///
    /// Nodes already following it are skipped. Returns how many nodes were
    /// re-pointed.
    pub async fn ensure_replicas_follow_master(&self, obj: &RedisReplication) -> Result<usize> {
        let target = redis_target(obj)?;
        let reader = NodeStateReader::new(self.redis, &target);
        let mutator = TopologyMutator::new(self.redis, &target);

        let pods = ready_redis_pods(self.kube, obj).await?;
        let masters = reader.get_master_ips(&pods).await?;
        let master = single_master(&masters)?;

        let mut repointed = 0;
        for ip in pods.iter().filter_map(pod_ip) {
            if ip == master {
                continue;
            }
            let following = reader.get_replication_of_master_host(ip).await?;
            if following.as_deref() == Some(master) {
                continue;
            }
            mutator.set_as_slave(ip, master).await?;
            repointed += 1;
        }
        Ok(repointed)
    }

    /// Label each ready Redis pod with its live role.
    ///
    /// Pods whose label already matches are not written. The first failure
    /// aborts the remaining pods.
    pub async fn ensure_role_labels(&self, obj: &RedisReplication) -> Result<()> {
        let target = redis_target(obj)?;
        let reader = NodeStateReader::new(self.redis, &target);
        let namespace = obj.namespace().unwrap_or_default();

        for mut pod in ready_redis_pods(self.kube, obj).await? {
            let Some(ip) = pod_ip(&pod).map(str::to_string) else {
                continue;
            };
            let role = if reader.is_master(&ip).await? {
                RoleLabel::Master
            } else {
                RoleLabel::Replica
            };
            if current_role(&pod) == Some(role) {
                continue;
            }
            debug!(pod = %pod.name_any(), role = %role.as_str(), "Updating role label");
            pod.metadata
                .labels
                .get_or_insert_with(Default::default)
                .insert(LABEL_ROLE.to_string(), role.as_str().to_string());
            self.kube.update_pod(&namespace, &pod).await?;
        }
        Ok(())
    }

    pub async fn ensure_sentinel_deployment(&self, obj: &RedisReplication) -> Result<()> {
        let namespace = obj.namespace().unwrap_or_default();
        let deployment = generate_sentinel_deployment(obj);
        let name = deployment.name_any();

        match self.kube.get_deployment(&namespace, &name).await? {
            None => {
                info!(name = %name, "Creating sentinel Deployment");
                self.kube.create_deployment(&namespace, &deployment).await
            }
            Some(_) => self.kube.update_deployment(&namespace, &deployment).await,
        }
    }

    /// Fails with `PodsNotReady` until every desired sentinel pod is ready.
    pub async fn ensure_sentinel_pods_ready(&self, obj: &RedisReplication) -> Result<()> {
        let ready = ready_sentinel_pods(self.kube, obj).await?.len();
        let desired = usize::try_from(obj.spec.sentinel_num).unwrap_or_default();
        if ready != desired {
            return Err(Error::PodsNotReady {
                tier: "sentinel",
                ready,
                desired,
            });
        }
        Ok(())
    }

    /// Point every ready sentinel at the single master.
    ///
    /// Sentinels that are unset or watch another address are reconfigured.
    /// Returns how many were.
    pub async fn ensure_sentinel_monitors(&self, obj: &RedisReplication) -> Result<usize> {
        let target = redis_target(obj)?;
        let reader = NodeStateReader::new(self.redis, &target);
        let mutator = TopologyMutator::new(self.redis, &target);

        let redis_pods = ready_redis_pods(self.kube, obj).await?;
        let masters = reader.get_master_ips(&redis_pods).await?;
        let master = single_master(&masters)?;
        let quorum = obj.spec.sentinel_quorum();

        let mut reconfigured = 0;
        for pod in ready_sentinel_pods(self.kube, obj).await? {
            let Some(ip) = pod_ip(&pod) else {
                continue;
            };
            if reader.get_sentinel_monitor(ip).await?.points_at(master) {
                continue;
            }
            mutator.set_sentinel_monitor(ip, master, quorum).await?;
            reconfigured += 1;
        }
        Ok(reconfigured)
    }
}

fn current_role(pod: &Pod) -> Option<RoleLabel> {
    pod.metadata
        .labels
        .as_ref()
        .and_then(ResourceLabels::from_map)
        .and_then(|labels| labels.role)
}
